//! SAI error types and status handling.
//!
//! Driver calls return [`SaiResult`]. Callers in the agent only ever branch
//! on one property of a failure: whether the object was already gone
//! ([`SaiError::is_not_found`]). Everything else is a resource fault.

use crate::types::{RawSaiObjectId, SaiObjectType};
use std::fmt;
use thiserror::Error;

/// SAI status codes matching the SAI C API.
///
/// These values correspond to `sai_status_t` in the SAI header files.
#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SaiStatus {
    Success = 0,
    Failure = -1,
    NotSupported = -2,
    NoMemory = -3,
    InsufficientResources = -4,
    InvalidParameter = -5,
    ItemAlreadyExists = -6,
    ItemNotFound = -7,
    TableFull = -13,
    ObjectInUse = -17,
    InvalidObjectId = -19,
    InvalidAttribute = -24,
}

impl SaiStatus {
    /// Creates a SaiStatus from a raw i32 value.
    pub fn from_raw(status: i32) -> Self {
        match status {
            0 => SaiStatus::Success,
            -2 => SaiStatus::NotSupported,
            -3 => SaiStatus::NoMemory,
            -4 => SaiStatus::InsufficientResources,
            -5 => SaiStatus::InvalidParameter,
            -6 => SaiStatus::ItemAlreadyExists,
            -7 => SaiStatus::ItemNotFound,
            -13 => SaiStatus::TableFull,
            -17 => SaiStatus::ObjectInUse,
            -19 => SaiStatus::InvalidObjectId,
            -24 => SaiStatus::InvalidAttribute,
            _ => SaiStatus::Failure,
        }
    }

    pub fn is_success(&self) -> bool {
        *self == SaiStatus::Success
    }
}

impl fmt::Display for SaiStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SaiStatus::Success => "SAI_STATUS_SUCCESS",
            SaiStatus::Failure => "SAI_STATUS_FAILURE",
            SaiStatus::NotSupported => "SAI_STATUS_NOT_SUPPORTED",
            SaiStatus::NoMemory => "SAI_STATUS_NO_MEMORY",
            SaiStatus::InsufficientResources => "SAI_STATUS_INSUFFICIENT_RESOURCES",
            SaiStatus::InvalidParameter => "SAI_STATUS_INVALID_PARAMETER",
            SaiStatus::ItemAlreadyExists => "SAI_STATUS_ITEM_ALREADY_EXISTS",
            SaiStatus::ItemNotFound => "SAI_STATUS_ITEM_NOT_FOUND",
            SaiStatus::TableFull => "SAI_STATUS_TABLE_FULL",
            SaiStatus::ObjectInUse => "SAI_STATUS_OBJECT_IN_USE",
            SaiStatus::InvalidObjectId => "SAI_STATUS_INVALID_OBJECT_ID",
            SaiStatus::InvalidAttribute => "SAI_STATUS_INVALID_ATTRIBUTE",
        };
        f.write_str(s)
    }
}

/// Error type for SAI operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SaiError {
    /// The driver returned a non-success status for an operation on a type.
    #[error("{op} {object_type} failed: {status}")]
    Status {
        op: &'static str,
        object_type: SaiObjectType,
        status: SaiStatus,
    },

    /// The object id does not name a live object.
    #[error("object 0x{oid:x} not found")]
    NotFound { oid: RawSaiObjectId },

    /// The attribute is not valid for the object it was read from.
    #[error("attribute {attr} not present on object 0x{oid:x}")]
    MissingAttribute { oid: RawSaiObjectId, attr: String },
}

impl SaiError {
    /// Wraps a status returned for `op` on `object_type`.
    pub fn from_status(op: &'static str, object_type: SaiObjectType, status: SaiStatus) -> Self {
        SaiError::Status {
            op,
            object_type,
            status,
        }
    }

    pub fn not_found(oid: RawSaiObjectId) -> Self {
        SaiError::NotFound { oid }
    }

    /// Returns the underlying SAI status.
    pub fn status(&self) -> SaiStatus {
        match self {
            SaiError::Status { status, .. } => *status,
            SaiError::NotFound { .. } => SaiStatus::ItemNotFound,
            SaiError::MissingAttribute { .. } => SaiStatus::InvalidAttribute,
        }
    }

    /// True when the target object was already absent.
    ///
    /// Remove paths racing each other rely on this to treat a second delete
    /// of the same object as success.
    pub fn is_not_found(&self) -> bool {
        self.status() == SaiStatus::ItemNotFound
    }

    /// Returns true if this error is retryable by re-applying the whole delta.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.status(),
            SaiStatus::InsufficientResources | SaiStatus::NoMemory | SaiStatus::TableFull
        )
    }
}

/// Result type for SAI operations.
pub type SaiResult<T> = Result<T, SaiError>;
