//! Capacity ledger
//!
//! Pure bookkeeping of physical and virtual capacity. The ledger never
//! touches the medium; callers charge and release bytes as they change it.

use thinstore_common::{Error, Result, StorageQuota};

/// Physical/virtual capacity accounting with the current overcommit coefficient
#[derive(Debug, Clone)]
pub struct CapacityLedger {
    quota: StorageQuota,
    min_coefficient: f64,
    max_coefficient: f64,
}

impl CapacityLedger {
    /// Create a ledger with nothing used
    pub fn new(physical_limit: u64, coefficient: f64, min: f64, max: f64) -> Self {
        let mut ledger = Self {
            quota: StorageQuota {
                physical_limit,
                physical_used: 0,
                virtual_limit: 0,
                virtual_used: 0,
                overcommit_coefficient: 0.0,
            },
            min_coefficient: min,
            max_coefficient: max,
        };
        ledger.set_coefficient(coefficient);
        ledger
    }

    /// Snapshot of the current quota
    #[must_use]
    pub const fn quota(&self) -> StorageQuota {
        self.quota
    }

    /// Current overcommit coefficient
    #[must_use]
    pub const fn coefficient(&self) -> f64 {
        self.quota.overcommit_coefficient
    }

    /// Apply a coefficient (clamped to the configured range) and derive
    /// `virtual_limit = floor(physical_limit * coefficient)`.
    ///
    /// A limit below `virtual_used` is accepted; existing files are kept and
    /// further reservations fail until usage drops back under the limit.
    /// Returns the applied coefficient.
    pub fn set_coefficient(&mut self, coefficient: f64) -> f64 {
        let applied = coefficient.clamp(self.min_coefficient, self.max_coefficient);
        self.quota.overcommit_coefficient = applied;
        self.quota.virtual_limit = virtual_limit_for(self.quota.physical_limit, applied);
        applied
    }

    /// Check if `size` more virtual bytes fit under the limit
    #[must_use]
    pub fn can_reserve_virtual(&self, size: u64) -> bool {
        self.quota
            .virtual_used
            .checked_add(size)
            .is_some_and(|total| total <= self.quota.virtual_limit)
    }

    /// Reserve virtual bytes for a new file
    pub fn reserve_virtual(&mut self, size: u64) -> Result<()> {
        if !self.can_reserve_virtual(size) {
            return Err(Error::QuotaExceeded {
                requested: size,
                available: self.quota.virtual_available(),
            });
        }
        self.quota.virtual_used += size;
        Ok(())
    }

    /// Return virtual bytes of a deleted file
    pub fn release_virtual(&mut self, size: u64) {
        self.quota.virtual_used = self.quota.virtual_used.saturating_sub(size);
    }

    /// Check if `additional` more physical bytes fit on the medium
    #[must_use]
    pub fn has_physical(&self, additional: u64) -> bool {
        self.quota
            .physical_used
            .checked_add(additional)
            .is_some_and(|total| total <= self.quota.physical_limit)
    }

    /// Fail with `InsufficientPhysicalSpace` unless `additional` bytes fit
    pub fn check_physical(&self, additional: u64) -> Result<()> {
        if self.has_physical(additional) {
            Ok(())
        } else {
            Err(Error::InsufficientPhysicalSpace {
                required: additional,
                available: self.quota.physical_available(),
            })
        }
    }

    /// Account bytes that became resident on the medium
    pub fn charge_physical(&mut self, bytes: u64) {
        self.quota.physical_used = self.quota.physical_used.saturating_add(bytes);
    }

    /// Account bytes removed from the medium
    pub fn release_physical(&mut self, bytes: u64) {
        self.quota.physical_used = self.quota.physical_used.saturating_sub(bytes);
    }
}

#[allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]
fn virtual_limit_for(physical_limit: u64, coefficient: f64) -> u64 {
    (physical_limit as f64 * coefficient).floor() as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    const GIB: u64 = 1024 * 1024 * 1024;

    fn ledger() -> CapacityLedger {
        CapacityLedger::new(GIB, 2.0, 1.5, 10.0)
    }

    #[test]
    fn test_virtual_limit_follows_coefficient() {
        let mut ledger = ledger();
        assert_eq!(ledger.quota().virtual_limit, 2 * GIB);

        ledger.set_coefficient(2.5);
        assert_eq!(ledger.quota().virtual_limit, GIB * 5 / 2);

        let odd = CapacityLedger::new(1000, 1.7777, 1.5, 10.0);
        assert_eq!(odd.quota().virtual_limit, 1777);
    }

    #[test]
    fn test_coefficient_is_clamped() {
        let mut ledger = ledger();
        assert!((ledger.set_coefficient(42.0) - 10.0).abs() < f64::EPSILON);
        assert_eq!(ledger.quota().virtual_limit, 10 * GIB);
        assert!((ledger.set_coefficient(0.2) - 1.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_virtual_reservation() {
        let mut ledger = ledger();
        ledger.reserve_virtual(GIB + GIB / 2).unwrap();

        let err = ledger.reserve_virtual(GIB).unwrap_err();
        assert!(matches!(
            err,
            Error::QuotaExceeded { requested, available } if requested == GIB && available == GIB / 2
        ));

        ledger.release_virtual(GIB + GIB / 2);
        assert_eq!(ledger.quota().virtual_used, 0);
        assert!(!ledger.can_reserve_virtual(u64::MAX));
    }

    #[test]
    fn test_shrunk_limit_grandfathers_usage() {
        let mut ledger = ledger();
        ledger.reserve_virtual(2 * GIB).unwrap();
        ledger.set_coefficient(1.5);

        let quota = ledger.quota();
        assert!(quota.virtual_used > quota.virtual_limit);
        assert_eq!(quota.virtual_available(), 0);
        assert!(ledger.reserve_virtual(1).is_err());
    }

    #[test]
    fn test_physical_accounting() {
        let mut ledger = ledger();
        assert!(ledger.has_physical(GIB));
        assert!(!ledger.has_physical(GIB + 1));

        ledger.charge_physical(GIB - 10);
        assert!(ledger.check_physical(10).is_ok());
        assert!(matches!(
            ledger.check_physical(11),
            Err(Error::InsufficientPhysicalSpace { required: 11, available: 10 })
        ));

        ledger.release_physical(GIB);
        assert_eq!(ledger.quota().physical_used, 0);
    }
}
