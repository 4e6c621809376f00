//! Virtual file table
//!
//! The authoritative map from virtual path to [`VirtualFile`], together with
//! the [`CapacityLedger`]. Both live behind the manager's single table lock,
//! so every update to a file and to the quota is observed atomically.

use crate::ledger::CapacityLedger;
use std::collections::HashMap;
use std::collections::hash_map::Values;
use thinstore_common::{Error, Result, StorageQuota, VirtualFile};

/// Files and capacity, guarded together
#[derive(Debug)]
pub struct FileTable {
    files: HashMap<String, VirtualFile>,
    ledger: CapacityLedger,
}

impl FileTable {
    pub fn new(ledger: CapacityLedger) -> Self {
        Self {
            files: HashMap::new(),
            ledger,
        }
    }

    pub const fn ledger(&self) -> &CapacityLedger {
        &self.ledger
    }

    pub const fn ledger_mut(&mut self) -> &mut CapacityLedger {
        &mut self.ledger
    }

    pub const fn quota(&self) -> StorageQuota {
        self.ledger.quota()
    }

    pub fn get(&self, path: &str) -> Option<&VirtualFile> {
        self.files.get(path)
    }

    pub fn get_mut(&mut self, path: &str) -> Option<&mut VirtualFile> {
        self.files.get_mut(path)
    }

    /// Get a file or fail with `NotFound`
    pub fn require(&self, path: &str) -> Result<&VirtualFile> {
        self.files
            .get(path)
            .ok_or_else(|| Error::NotFound(path.to_string()))
    }

    /// Get a file mutably or fail with `NotFound`
    pub fn require_mut(&mut self, path: &str) -> Result<&mut VirtualFile> {
        self.files
            .get_mut(path)
            .ok_or_else(|| Error::NotFound(path.to_string()))
    }

    pub fn contains(&self, path: &str) -> bool {
        self.files.contains_key(path)
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.files.len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn files(&self) -> Values<'_, String, VirtualFile> {
        self.files.values()
    }

    /// Add a new file, reserving its virtual size
    pub fn insert(&mut self, file: VirtualFile) -> Result<()> {
        if self.files.contains_key(&file.virtual_path) {
            return Err(Error::AlreadyExists(file.virtual_path));
        }
        self.ledger.reserve_virtual(file.virtual_size)?;
        self.ledger.charge_physical(file.resident_bytes());
        self.files.insert(file.virtual_path.clone(), file);
        Ok(())
    }

    /// Remove a file, returning its virtual and resident bytes to the ledger
    pub fn remove(&mut self, path: &str) -> Result<VirtualFile> {
        let file = self
            .files
            .remove(path)
            .ok_or_else(|| Error::NotFound(path.to_string()))?;
        self.ledger.release_virtual(file.virtual_size);
        self.ledger.release_physical(file.resident_bytes());
        Ok(file)
    }

    /// Re-key a file without touching the ledger
    pub fn rekey(&mut self, old_path: &str, new_path: &str) -> Result<&mut VirtualFile> {
        if self.files.contains_key(new_path) {
            return Err(Error::AlreadyExists(new_path.to_string()));
        }
        let mut file = self
            .files
            .remove(old_path)
            .ok_or_else(|| Error::NotFound(old_path.to_string()))?;
        file.virtual_path = new_path.to_string();
        Ok(self.files.entry(new_path.to_string()).or_insert(file))
    }

    /// Paths starting with `prefix`, sorted
    pub fn paths_with_prefix(&self, prefix: &str) -> Vec<String> {
        let mut paths: Vec<String> = self
            .files
            .keys()
            .filter(|p| p.starts_with(prefix))
            .cloned()
            .collect();
        paths.sort();
        paths
    }

    /// Number of files per tier, indexed by `Tier::index`
    pub fn tier_counts(&self) -> [usize; 4] {
        let mut counts = [0usize; 4];
        for file in self.files.values() {
            counts[file.tier.index()] += 1;
        }
        counts
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use thinstore_common::Tier;

    fn table() -> FileTable {
        FileTable::new(CapacityLedger::new(1000, 2.0, 1.5, 10.0))
    }

    fn file(path: &str, size: u64) -> VirtualFile {
        VirtualFile::new(path.into(), PathBuf::from(format!("/r/hot/{path}")), size)
    }

    #[test]
    fn test_insert_reserves_virtual() {
        let mut table = table();
        table.insert(file("a", 1500)).unwrap();
        assert_eq!(table.quota().virtual_used, 1500);

        assert!(matches!(
            table.insert(file("a", 1)),
            Err(Error::AlreadyExists(_))
        ));
        assert!(matches!(
            table.insert(file("b", 501)),
            Err(Error::QuotaExceeded { .. })
        ));
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_remove_releases_quota() {
        let mut table = table();
        table.insert(file("a", 100)).unwrap();
        {
            let f = table.require_mut("a").unwrap();
            f.physical_size = 40;
            f.resident = true;
        }
        table.ledger_mut().charge_physical(40);

        let removed = table.remove("a").unwrap();
        assert_eq!(removed.virtual_size, 100);
        assert_eq!(table.quota().virtual_used, 0);
        assert_eq!(table.quota().physical_used, 0);
        assert!(matches!(table.remove("a"), Err(Error::NotFound(_))));
    }

    #[test]
    fn test_rekey() {
        let mut table = table();
        table.insert(file("a", 10)).unwrap();
        table.insert(file("b", 10)).unwrap();

        assert!(matches!(table.rekey("a", "b"), Err(Error::AlreadyExists(_))));
        assert!(matches!(table.rekey("zz", "c"), Err(Error::NotFound(_))));

        let moved = table.rekey("a", "c").unwrap();
        assert_eq!(moved.virtual_path, "c");
        assert!(!table.contains("a"));
        assert!(table.contains("c"));
        assert_eq!(table.quota().virtual_used, 20);
    }

    #[test]
    fn test_listing_and_counts() {
        let mut table = table();
        for p in ["docs/b", "docs/a", "img/x"] {
            table.insert(file(p, 1)).unwrap();
        }
        table.require_mut("img/x").unwrap().tier = Tier::Cold;

        assert_eq!(table.paths_with_prefix("docs/"), vec!["docs/a", "docs/b"]);
        assert_eq!(table.paths_with_prefix("").len(), 3);
        assert_eq!(table.tier_counts(), [2, 0, 1, 0]);
    }
}
