//! Error taxonomy for the pairing handler.
//!
//! Client-caused failures carry codes in the `100xxx` range, store failures
//! in the `200xxx` range. Both travel back to the device as
//! `{error, errorCode}`; see [`PairingError::to_reply`].

use crate::schema::SchemaViolation;
use serde_json::{Value, json};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, PairingError>;

/// Store operation that failed, which fixes the wire error code.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StoreOp {
    CollectionAccess,
    Lookup,
    Insert,
    Update,
}

impl StoreOp {
    pub fn code(&self) -> u32 {
        match self {
            StoreOp::CollectionAccess => 200001,
            StoreOp::Lookup => 200002,
            StoreOp::Insert => 200003,
            StoreOp::Update => 200004,
        }
    }
}

/// Failure reported by a document store backend.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("collection '{0}' is not available")]
    CollectionUnavailable(String),
    #[error("duplicate key '{0}'")]
    DuplicateKey(String),
    #[error("cannot apply update at '{path}': {reason}")]
    InvalidUpdate { path: String, reason: String },
    #[error("store backend error: {0}")]
    Backend(String),
}

#[derive(Debug, Error)]
pub enum PairingError {
    #[error("document failed schema validation")]
    Validation(Vec<SchemaViolation>),
    #[error("The device does not exist.")]
    DeviceNotFound,
    #[error("The application has not been registered on this device.")]
    ApplicationNotRegistered,
    #[error("The application does not exist.")]
    ApplicationNotFound,
    #[error("This message has expired.")]
    MessageExpired,
    #[error("The message type parameter ('system/{0}') is not valid.")]
    UnknownMessageType(String),
    #[error("Invalid device name!")]
    InvalidDeviceName,
    #[error("Invalid product name!")]
    InvalidProductName,
    #[error("Invalid verification code")]
    InvalidVerificationCode,
    #[error("The application status is not pending with this request id and verification code.")]
    SessionMismatch,
    #[error("{source}")]
    Persistence {
        op: StoreOp,
        #[source]
        source: StoreError,
    },
}

impl PairingError {
    pub fn persistence(op: StoreOp) -> impl FnOnce(StoreError) -> PairingError {
        move |source| PairingError::Persistence { op, source }
    }

    /// Single free-form validation failure (e.g. a document that passed the
    /// shape check but still failed to decode).
    pub fn invalid(instance_path: &str, message: impl Into<String>) -> Self {
        PairingError::Validation(vec![SchemaViolation {
            instance_path: instance_path.to_string(),
            schema_path: String::new(),
            message: message.into(),
        }])
    }

    pub fn code(&self) -> u32 {
        match self {
            PairingError::Validation(_) => 100003,
            PairingError::DeviceNotFound => 100011,
            PairingError::ApplicationNotRegistered => 100012,
            PairingError::ApplicationNotFound => 100016,
            PairingError::MessageExpired => 100017,
            PairingError::UnknownMessageType(_) => 100018,
            PairingError::InvalidDeviceName => 100019,
            PairingError::InvalidProductName => 100020,
            PairingError::InvalidVerificationCode => 100030,
            PairingError::SessionMismatch => 100031,
            PairingError::Persistence { op, .. } => op.code(),
        }
    }

    pub fn is_persistence(&self) -> bool {
        matches!(self, PairingError::Persistence { .. })
    }

    /// Wire payload: `{error, errorCode}`. Validation failures carry the
    /// structured violations instead of a message.
    pub fn to_reply(&self) -> Value {
        let error = match self {
            PairingError::Validation(violations) => json!(violations),
            other => Value::String(other.to_string()),
        };
        json!({ "error": error, "errorCode": self.code() })
    }
}

impl From<Vec<SchemaViolation>> for PairingError {
    fn from(violations: Vec<SchemaViolation>) -> Self {
        PairingError::Validation(violations)
    }
}
