//! Hardware object lifecycle primitives shared by the agent's managers.
//!
//! - [`ObjectRegistry`]: reference-counted dedup of hardware objects by
//!   logical identity, with warm-boot adoption
//! - [`RefMap`]: the counting map underneath, which never auto-vivifies
//! - [`WarmBootCache`]: surviving objects from a previous agent instance
//! - [`OrchError`]: the error taxonomy every manager reports in
//!
//! # Example
//!
//! ```
//! use sonic_orch_common::{ObjectRegistry, Origin, ReleaseOutcome};
//! use sonic_sai::types::LagKind;
//! use sonic_sai::{FakeSai, SaiObjectType};
//! use sonic_types::AggregatePortId;
//! use std::sync::Arc;
//!
//! let sai = Arc::new(FakeSai::new());
//! let mut lags: ObjectRegistry<AggregatePortId, LagKind> = ObjectRegistry::new("lag", sai.clone());
//!
//! let a = lags.acquire(&AggregatePortId(1), &[]).unwrap();
//! let b = lags.acquire(&AggregatePortId(1), &[]).unwrap();
//! assert_eq!((a.origin, b.origin), (Origin::Created, Origin::Shared));
//! assert_eq!(a.oid, b.oid);
//!
//! lags.release(a.oid).unwrap();
//! assert!(matches!(lags.release(b.oid).unwrap(), ReleaseOutcome::Destroyed(_)));
//! assert_eq!(sai.object_count(SaiObjectType::Lag), 0);
//! ```

mod error;
mod ref_map;
mod store;
mod warm_boot;

pub use error::{classify_remove, OrchError, OrchResult, RemoveOutcome};
pub use ref_map::{RefMap, RefMapError, Released};
pub use store::{Acquired, ObjectRegistry, Origin, RegistryKey, ReleaseOutcome};
pub use warm_boot::{Discrepancy, DiscrepancyKind, WarmBootCache};
