//! ASIC driver capability for the hardware sync agent.
//!
//! The agent never talks to a vendor SDK directly. Everything it needs from
//! the forwarding ASIC goes through the [`SaiDriver`] trait, which only
//! exposes create/remove/get/set plus the two lookups warm boot and the
//! link-down path depend on.
//!
//! - [`types`]: type-safe object ids and the runtime object type
//! - [`error`]: SAI status codes and the error type
//! - [`api`]: the driver trait and attribute model
//! - [`fake`]: an in-memory driver used by tests and simulation mode
//!
//! # Example
//!
//! ```
//! use sonic_sai::{FakeSai, SaiAttribute, SaiDriver, SaiObjectType};
//!
//! let sai = FakeSai::new();
//! let lag = sai
//!     .create(SaiObjectType::Lag, &[SaiAttribute::Label("aggport1".into())])
//!     .unwrap();
//! assert_eq!(sai.object_count(SaiObjectType::Lag), 1);
//! sai.remove(lag).unwrap();
//! assert!(sai.remove(lag).unwrap_err().is_not_found());
//! ```

pub mod api;
pub mod error;
pub mod fake;
pub mod types;

pub use api::{
    ExistingObject, FloodBlockMask, GroupMembership, MatchKey, PacketAction, SaiAttrId,
    SaiAttribute, SaiDriver, SaiDriverExt,
};
pub use error::{SaiError, SaiResult, SaiStatus};
pub use fake::{FakeSai, SaiCall};
pub use types::{
    BridgePortOid, FdbEntryOid, LagMemberOid, LagOid, NextHopGroupMemberOid, NextHopGroupOid,
    NextHopOid, PortOid, RawSaiObjectId, RouteEntryOid, RouterInterfaceOid, SaiObjectId,
    SaiObjectKind, SaiObjectType, VirtualRouterOid,
};
