//! thinstore Core
//!
//! The oversubscribed tiered storage manager. It presents a file namespace
//! whose advertised (virtual) capacity exceeds the physical medium and keeps
//! that oversell honest by migrating files between tiers and releasing the
//! local bytes of frozen files once they are confirmed offloaded.
//!
//! # Architecture
//!
//! ```text
//!             create / write / read / delete / move
//!                            │
//! ┌──────────────────────────▼──────────────────────────┐
//! │                   StorageManager                     │
//! │                                                      │
//! │  table lock ─────────────────────┐   cache lock      │
//! │  ┌──────────────┐ ┌────────────┐ │  ┌─────────────┐  │
//! │  │  FileTable   │ │  Capacity  │ │  │  ReadCache  │  │
//! │  │ VirtualFiles │ │   Ledger   │ │  │ (LRU bytes) │  │
//! │  └──────────────┘ └────────────┘ │  └─────────────┘  │
//! │  CoefficientEngine · TierPolicy ─┘                   │
//! └───────┬──────────────────┬─────────────────┬─────────┘
//!         │                  │                 │
//!   recompute loop    rebalance loop      trim loop
//!         │                  │
//!   collaborators:   TierLayout (root/{hot,warm,cold,frozen})
//!   advisor, scorer,  OffloadTarget (upload/download/exists/delete)
//!   metrics sink
//! ```
//!
//! Lock order: the table lock is always taken before the cache lock.

pub mod background;
pub mod cache;
pub mod coefficient;
pub mod collaborators;
pub mod ledger;
pub mod manager;
pub mod metrics;
pub mod offload;
pub mod placement;
pub mod table;

pub use background::{BackgroundTasks, Intervals};
pub use cache::{CacheStats, ReadCache, TrimReport};
pub use coefficient::{CoefficientBreakdown, CoefficientEngine, CoefficientInputs};
pub use collaborators::{CompressionAdvisor, EntropyAdvisor, FrequencyScorer, PriorityScorer};
pub use ledger::CapacityLedger;
pub use manager::{RebalanceReport, StorageManager, StorageManagerBuilder};
pub use metrics::{MetricsSink, RecorderSink};
pub use offload::{LocalDirOffload, OffloadError, OffloadTarget};
pub use placement::{TierLayout, TierPolicy};
pub use table::FileTable;

/// Estimated reduction at or above which a file counts as compressed
pub const COMPRESSIBLE_THRESHOLD: f64 = 0.1;
