//! Collaborator contracts consumed by the storage manager
//!
//! The manager never compresses, encrypts or scores files itself. It asks a
//! [`CompressionAdvisor`] for an estimated size reduction and an encryption
//! flag, and a [`PriorityScorer`] for a priority derived from access history.

use chrono::{Duration, Utc};
use thinstore_common::{AccessHistory, MAX_PRIORITY};

/// Compression/encryption collaborator
pub trait CompressionAdvisor: Send + Sync {
    /// Estimated fraction of bytes a compressor would save, in `[0, 1]`
    fn estimate_reduction(&self, data: &[u8]) -> f64;

    /// Check if the file at `path` holds encrypted contents
    fn is_encrypted(&self, path: &str) -> bool;
}

/// Priority/recency collaborator
pub trait PriorityScorer: Send + Sync {
    /// Priority for `path` given its recent accesses, in `[0, 2]`
    fn score(&self, path: &str, history: &AccessHistory) -> f64;
}

/// Bytes sampled when estimating entropy
const ENTROPY_SAMPLE_BYTES: usize = 64 * 1024;

/// Estimates compressibility from the Shannon entropy of a byte sample
///
/// Encrypted files are recognised by extension.
#[derive(Debug, Clone)]
pub struct EntropyAdvisor {
    encrypted_extensions: Vec<String>,
}

impl Default for EntropyAdvisor {
    fn default() -> Self {
        Self {
            encrypted_extensions: vec!["enc".into(), "gpg".into(), "age".into()],
        }
    }
}

impl EntropyAdvisor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the list of extensions treated as encrypted
    pub fn with_encrypted_extensions<I, S>(mut self, extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.encrypted_extensions = extensions.into_iter().map(Into::into).collect();
        self
    }
}

impl CompressionAdvisor for EntropyAdvisor {
    #[allow(clippy::cast_precision_loss)]
    fn estimate_reduction(&self, data: &[u8]) -> f64 {
        let sample = &data[..data.len().min(ENTROPY_SAMPLE_BYTES)];
        if sample.is_empty() {
            return 0.0;
        }

        let mut counts = [0u32; 256];
        for &b in sample {
            counts[b as usize] += 1;
        }
        let len = sample.len() as f64;
        let entropy: f64 = counts
            .iter()
            .filter(|&&c| c > 0)
            .map(|&c| {
                let p = f64::from(c) / len;
                -p * p.log2()
            })
            .sum();

        (1.0 - entropy / 8.0).clamp(0.0, 1.0)
    }

    fn is_encrypted(&self, path: &str) -> bool {
        let ext = thinstore_common::virtual_extension(path);
        !ext.is_empty()
            && self
                .encrypted_extensions
                .iter()
                .any(|e| e.eq_ignore_ascii_case(ext))
    }
}

/// Scores files by how often they were accessed recently
///
/// `score = base + step * accesses within window`, clamped to `[0, 2]`.
#[derive(Debug, Clone)]
pub struct FrequencyScorer {
    window: Duration,
    base: f64,
    step: f64,
}

impl Default for FrequencyScorer {
    fn default() -> Self {
        Self {
            window: Duration::hours(24),
            base: 1.0,
            step: 0.1,
        }
    }
}

impl FrequencyScorer {
    pub const fn new(window: Duration, base: f64, step: f64) -> Self {
        Self { window, base, step }
    }
}

impl PriorityScorer for FrequencyScorer {
    #[allow(clippy::cast_precision_loss)]
    fn score(&self, _path: &str, history: &AccessHistory) -> f64 {
        let recent = history.accesses_since(Utc::now() - self.window);
        (self.base + self.step * recent as f64).clamp(0.0, MAX_PRIORITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uniform_bytes_are_highly_compressible() {
        let advisor = EntropyAdvisor::new();
        let reduction = advisor.estimate_reduction(&[0u8; 4096]);
        assert!((reduction - 1.0).abs() < f64::EPSILON);
        assert!(advisor.estimate_reduction(&[]).abs() < f64::EPSILON);
    }

    #[test]
    fn test_all_byte_values_are_incompressible() {
        let advisor = EntropyAdvisor::new();
        let data: Vec<u8> = (0..=255u8).cycle().take(256 * 16).collect();
        assert!(advisor.estimate_reduction(&data) < 1e-9);
    }

    #[test]
    fn test_text_is_partially_compressible() {
        let advisor = EntropyAdvisor::new();
        let text = "the quick brown fox jumps over the lazy dog ".repeat(50);
        let reduction = advisor.estimate_reduction(text.as_bytes());
        assert!(reduction > 0.3 && reduction < 0.8, "reduction = {reduction}");
    }

    #[test]
    fn test_encrypted_extensions() {
        let advisor = EntropyAdvisor::new();
        assert!(advisor.is_encrypted("vault/keys.GPG"));
        assert!(advisor.is_encrypted("backup.age"));
        assert!(!advisor.is_encrypted("notes.txt"));
        assert!(!advisor.is_encrypted("enc"));

        let custom = EntropyAdvisor::new().with_encrypted_extensions(["sealed"]);
        assert!(custom.is_encrypted("x.sealed"));
        assert!(!custom.is_encrypted("x.gpg"));
    }

    #[test]
    fn test_frequency_scorer() {
        let scorer = FrequencyScorer::default();
        let mut history = AccessHistory::new();
        assert!((scorer.score("a", &history) - 1.0).abs() < f64::EPSILON);

        let now = Utc::now();
        history.record(now - Duration::hours(48));
        for _ in 0..3 {
            history.record(now);
        }
        assert!((scorer.score("a", &history) - 1.3).abs() < 1e-9);

        for _ in 0..20 {
            history.record(now);
        }
        assert!((scorer.score("a", &history) - 2.0).abs() < f64::EPSILON);
    }
}
