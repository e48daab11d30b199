//! Error taxonomy shared by every Roster crate

use thiserror::Error;

use crate::device::DeviceKind;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Error, Debug)]
pub enum Error {
    /// No registry entry under this name
    #[error("no device registered under name \"{0}\"")]
    UnknownName(String),
    /// The name exists, but holds no device of this kind
    #[error("device \"{name}\" has no {kind} entry")]
    UnknownKind { name: String, kind: DeviceKind },
    /// Address lookup found nothing on any queried source
    #[error("no {}device was found for address \"{address}\"", kind_prefix(.kind))]
    DeviceNotFound {
        address: String,
        kind: Option<DeviceKind>,
    },
    #[error("no discovery source registered for {0} devices")]
    SourceNotRegistered(DeviceKind),

    #[error("key kind {expected} does not match the device's kind {actual}")]
    KindMismatch {
        expected: DeviceKind,
        actual: DeviceKind,
    },
    #[error("invalid device kind: \"{0}\"")]
    InvalidKind(String),
    #[error("invalid mac address format: \"{0}\"")]
    InvalidMacAddress(String),
    #[error("invalid value: {0}")]
    InvalidValue(String),
    #[error("invalid filter: {0}")]
    InvalidFilter(String),

    /// The enumeration or probe executable could not be started at all
    #[error("{backend} backend unavailable: {reason}")]
    BackendUnavailable { backend: String, reason: String },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

fn kind_prefix(kind: &Option<DeviceKind>) -> String {
    kind.map(|k| format!("{k}-")).unwrap_or_default()
}

impl Error {
    pub fn backend_unavailable(backend: impl Into<String>, reason: impl ToString) -> Self {
        Self::BackendUnavailable {
            backend: backend.into(),
            reason: reason.to_string(),
        }
    }

    /// Unknown registry key, unregistered source or nothing at an address
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::UnknownName(_)
                | Self::UnknownKind { .. }
                | Self::DeviceNotFound { .. }
                | Self::SourceNotRegistered(_)
        )
    }

    /// Wrong kind for a key, wrong value type or a malformed field
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::KindMismatch { .. }
                | Self::InvalidKind(_)
                | Self::InvalidMacAddress(_)
                | Self::InvalidValue(_)
                | Self::InvalidFilter(_)
        )
    }
}
