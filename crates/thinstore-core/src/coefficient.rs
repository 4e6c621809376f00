//! Overcommit coefficient engine
//!
//! Computes the advertised-to-physical ratio as a weighted heuristic:
//!
//! ```text
//! coefficient = clamp(base
//!                     + compression_weight * compression_efficiency
//!                     + (offload_bonus if any bytes are offloaded)
//!                     + locality_weight * mean(related-files score),
//!                     min_coefficient, max_coefficient)
//! ```
//!
//! The result is a policy target. It does not reflect a compression ratio
//! actually achieved, and overselling without the frozen-tier offload path
//! can exhaust the physical medium.

use std::collections::HashMap;
use thinstore_common::VirtualFile;
use thinstore_common::config::OvercommitConfig;

/// Inputs gathered from the file table for one recompute
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CoefficientInputs {
    /// Fraction of bytes saved across compressed files, in `[0, 1]`
    pub compression_efficiency: f64,
    /// Bytes currently held only by the offload target
    pub offloaded_bytes: u64,
    /// Mean related-files score, in `[0, 1]`
    pub locality: f64,
}

impl CoefficientInputs {
    /// Gather inputs from the current set of files
    pub fn from_files<'a, I>(files: I) -> Self
    where
        I: IntoIterator<Item = &'a VirtualFile> + Clone,
    {
        Self {
            compression_efficiency: compression_efficiency(files.clone()),
            offloaded_bytes: offloaded_bytes(files.clone()),
            locality: locality_score(files.into_iter().map(|f| f.virtual_path.as_str())),
        }
    }
}

/// Per-term result of a recompute
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CoefficientBreakdown {
    pub base: f64,
    pub compression_boost: f64,
    pub offload_boost: f64,
    pub locality_boost: f64,
    /// Sum of the terms before clamping
    pub candidate: f64,
    /// Clamped coefficient
    pub coefficient: f64,
}

/// Coefficient policy
#[derive(Debug, Clone)]
pub struct CoefficientEngine {
    config: OvercommitConfig,
}

impl CoefficientEngine {
    pub const fn new(config: OvercommitConfig) -> Self {
        Self { config }
    }


    /// Compute a clamped coefficient from the given inputs
    #[must_use]
    pub fn compute(&self, inputs: CoefficientInputs) -> CoefficientBreakdown {
        let c = &self.config;
        let base = c.base;
        let compression_boost = inputs.compression_efficiency.clamp(0.0, 1.0) * c.compression_weight;
        let offload_boost = if inputs.offloaded_bytes > 0 {
            c.offload_bonus
        } else {
            0.0
        };
        let locality_boost = inputs.locality.clamp(0.0, 1.0) * c.locality_weight;
        let candidate = base + compression_boost + offload_boost + locality_boost;

        CoefficientBreakdown {
            base,
            compression_boost,
            offload_boost,
            locality_boost,
            candidate,
            coefficient: self.clamp(candidate),
        }
    }

    /// Coefficient after one growth step, capped at the maximum
    #[must_use]
    pub fn grown(&self, current: f64) -> f64 {
        self.clamp(current * self.config.growth_step)
    }

    /// Clamp to the configured range
    #[must_use]
    pub fn clamp(&self, coefficient: f64) -> f64 {
        coefficient.clamp(self.config.min_coefficient, self.config.max_coefficient)
    }
}

/// Fraction of bytes the compression advisor expects to save, weighted by
/// size, over files marked compressed. Zero when none are.
pub fn compression_efficiency<'a>(files: impl IntoIterator<Item = &'a VirtualFile>) -> f64 {
    let (saved, total) = files
        .into_iter()
        .filter(|f| f.is_compressed && f.physical_size > 0)
        .fold((0.0_f64, 0.0_f64), |(saved, total), f| {
            let size = to_f64(f.physical_size);
            (saved + size * f.estimated_reduction, total + size)
        });
    if total <= 0.0 { 0.0 } else { saved / total }
}

/// Bytes held only by the offload target
pub fn offloaded_bytes<'a>(files: impl IntoIterator<Item = &'a VirtualFile>) -> u64 {
    files
        .into_iter()
        .filter(|f| f.is_offloaded())
        .map(|f| f.physical_size)
        .sum()
}

/// Mean over files of the fraction of other files sharing a directory or
/// an extension. Files without an extension only relate by directory.
pub fn locality_score<'a>(paths: impl IntoIterator<Item = &'a str>) -> f64 {
    let keys: Vec<(&str, &str)> = paths
        .into_iter()
        .map(|p| {
            (
                thinstore_common::virtual_directory(p),
                thinstore_common::virtual_extension(p),
            )
        })
        .collect();
    if keys.len() < 2 {
        return 0.0;
    }

    let mut by_dir: HashMap<&str, usize> = HashMap::new();
    let mut by_ext: HashMap<&str, usize> = HashMap::new();
    let mut by_both: HashMap<(&str, &str), usize> = HashMap::new();
    for &(dir, ext) in &keys {
        *by_dir.entry(dir).or_default() += 1;
        *by_both.entry((dir, ext)).or_default() += 1;
        if !ext.is_empty() {
            *by_ext.entry(ext).or_default() += 1;
        }
    }

    let others = to_f64((keys.len() - 1) as u64);
    let total: f64 = keys
        .iter()
        .map(|&(dir, ext)| {
            let same_dir = by_dir[dir] - 1;
            let same_ext_elsewhere = if ext.is_empty() {
                0
            } else {
                by_ext[ext] - by_both[&(dir, ext)]
            };
            to_f64((same_dir + same_ext_elsewhere) as u64) / others
        })
        .sum();
    total / to_f64(keys.len() as u64)
}

#[allow(clippy::cast_precision_loss)]
pub(crate) const fn to_f64(value: u64) -> f64 {
    value as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn engine() -> CoefficientEngine {
        CoefficientEngine::new(OvercommitConfig::default())
    }

    fn file(path: &str, size: u64) -> VirtualFile {
        let mut f = VirtualFile::new(path.into(), PathBuf::from(path), size);
        f.physical_size = size;
        f.resident = true;
        f
    }

    #[test]
    fn test_empty_inputs_yield_base() {
        let breakdown = engine().compute(CoefficientInputs::default());
        assert!((breakdown.coefficient - 2.0).abs() < f64::EPSILON);
        assert!((breakdown.candidate - 2.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_all_boosts() {
        let breakdown = engine().compute(CoefficientInputs {
            compression_efficiency: 0.5,
            offloaded_bytes: 1,
            locality: 1.0,
        });
        assert!((breakdown.compression_boost - 0.15).abs() < 1e-9);
        assert!((breakdown.offload_boost - 1.5).abs() < 1e-9);
        assert!((breakdown.locality_boost - 0.5).abs() < 1e-9);
        assert!((breakdown.coefficient - 4.15).abs() < 1e-9);
    }

    #[test]
    fn test_result_is_clamped() {
        let config = OvercommitConfig {
            base: 20.0,
            ..OvercommitConfig::default()
        };
        let breakdown = CoefficientEngine::new(config).compute(CoefficientInputs::default());
        assert!((breakdown.candidate - 20.0).abs() < f64::EPSILON);
        assert!((breakdown.coefficient - 10.0).abs() < f64::EPSILON);

        let config = OvercommitConfig {
            base: 0.5,
            ..OvercommitConfig::default()
        };
        let breakdown = CoefficientEngine::new(config).compute(CoefficientInputs::default());
        assert!((breakdown.coefficient - 1.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_growth_is_capped() {
        let engine = engine();
        assert!((engine.grown(2.0) - 2.2).abs() < 1e-9);
        assert!((engine.grown(9.5) - 10.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_compression_efficiency_weighted_by_size() {
        let mut a = file("a.log", 300);
        a.is_compressed = true;
        a.estimated_reduction = 0.5;
        let mut b = file("b.log", 100);
        b.is_compressed = true;
        b.estimated_reduction = 0.9;
        let c = file("c.bin", 1000);

        let eff = compression_efficiency([&a, &b, &c]);
        assert!((eff - (150.0 + 90.0) / 400.0).abs() < 1e-9);
        assert!(compression_efficiency([&c]).abs() < f64::EPSILON);
    }

    #[test]
    fn test_offloaded_bytes_counts_non_resident() {
        let mut a = file("a", 100);
        a.remote_location = Some("r1".into());
        a.resident = false;
        let mut b = file("b", 50);
        b.remote_location = Some("r2".into());
        let c = file("c", 10);
        assert_eq!(offloaded_bytes([&a, &b, &c]), 100);
    }

    #[test]
    fn test_locality_score() {
        assert!(locality_score(["solo.txt"]).abs() < f64::EPSILON);
        assert!((locality_score(["d/a.txt", "d/b.txt"]) - 1.0).abs() < f64::EPSILON);
        assert!(locality_score(["x/a", "y/b"]).abs() < f64::EPSILON);

        // a.txt relates to b.txt (dir) and c.txt (ext); b relates to a; c relates to a.
        let score = locality_score(["d/a.txt", "d/b.md", "e/c.txt"]);
        assert!((score - (1.0 + 0.5 + 0.5) / 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_inputs_from_files() {
        let mut a = file("d/a.txt", 100);
        a.is_compressed = true;
        a.estimated_reduction = 0.4;
        let b = file("d/b.txt", 100);
        let files = vec![a, b];
        let inputs = CoefficientInputs::from_files(files.iter());
        assert!((inputs.compression_efficiency - 0.4).abs() < 1e-9);
        assert_eq!(inputs.offloaded_bytes, 0);
        assert!((inputs.locality - 1.0).abs() < f64::EPSILON);
    }
}
