//! Protocol messages for patch exchange.

use patchsync_core::{FileId, FormatError, Patch};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A consolidated local patch sent to the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeRequest {
    /// Correlates the response with this request
    pub request_id: Uuid,
    /// File the patch belongs to
    pub file_id: FileId,
    /// Patch in wire form
    pub patch: String,
}

impl ChangeRequest {
    /// Create a request carrying `patch`.
    #[must_use]
    pub fn new(file_id: FileId, patch: &Patch) -> Self {
        Self {
            request_id: Uuid::new_v4(),
            file_id,
            patch: patch.to_string(),
        }
    }

    /// Parse the carried patch.
    ///
    /// # Errors
    ///
    /// Returns error if the patch text is malformed.
    pub fn patch(&self) -> Result<Patch, FormatError> {
        self.patch.parse()
    }

    /// Serialize to CBOR bytes.
    ///
    /// # Errors
    ///
    /// Returns error if serialization fails.
    pub fn to_cbor(&self) -> Result<Vec<u8>, MessageError> {
        encode(self)
    }

    /// Deserialize from CBOR bytes.
    ///
    /// # Errors
    ///
    /// Returns error if deserialization fails.
    pub fn from_cbor(bytes: &[u8]) -> Result<Self, MessageError> {
        decode(bytes)
    }
}

/// Outcome of a change request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseStatus {
    /// The patch was committed
    Ok,
    /// The server refused the patch
    Rejected,
}

/// The server's answer to a [`ChangeRequest`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeResponse {
    /// Request this answers
    pub request_id: Uuid,
    /// Whether the patch was committed
    pub status: ResponseStatus,
    /// Document version after the commit
    pub version: i64,
    /// Patches from other clients committed before this one, oldest first
    pub missing_patches: Vec<String>,
    /// Reason given for a rejection
    pub message: Option<String>,
}

impl ChangeResponse {
    /// A successful response.
    #[must_use]
    pub fn ok(request_id: Uuid, version: i64, missing: &[Patch]) -> Self {
        Self {
            request_id,
            status: ResponseStatus::Ok,
            version,
            missing_patches: missing.iter().map(ToString::to_string).collect(),
            message: None,
        }
    }

    /// A rejection with a reason.
    #[must_use]
    pub fn rejected(request_id: Uuid, version: i64, message: impl Into<String>) -> Self {
        Self {
            request_id,
            status: ResponseStatus::Rejected,
            version,
            missing_patches: Vec::new(),
            message: Some(message.into()),
        }
    }

    /// Whether the patch was committed.
    #[must_use]
    pub fn is_ok(&self) -> bool {
        self.status == ResponseStatus::Ok
    }

    /// Parse the missing patches.
    ///
    /// # Errors
    ///
    /// Returns error if any patch text is malformed.
    pub fn missing_patches(&self) -> Result<Vec<Patch>, FormatError> {
        self.missing_patches.iter().map(|p| p.parse()).collect()
    }

    /// Serialize to CBOR bytes.
    ///
    /// # Errors
    ///
    /// Returns error if serialization fails.
    pub fn to_cbor(&self) -> Result<Vec<u8>, MessageError> {
        encode(self)
    }

    /// Deserialize from CBOR bytes.
    ///
    /// # Errors
    ///
    /// Returns error if deserialization fails.
    pub fn from_cbor(bytes: &[u8]) -> Result<Self, MessageError> {
        decode(bytes)
    }
}

/// A change committed by another client, pushed by the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeNotification {
    /// File the change belongs to
    pub file_id: FileId,
    /// Patch in wire form
    pub patch: String,
    /// Document version after the change
    pub version: i64,
}

impl ChangeNotification {
    /// Create a notification for `patch` resulting in `version`.
    #[must_use]
    pub fn new(file_id: FileId, patch: &Patch, version: i64) -> Self {
        Self {
            file_id,
            patch: patch.to_string(),
            version,
        }
    }

    /// Parse the carried patch.
    ///
    /// # Errors
    ///
    /// Returns error if the patch text is malformed.
    pub fn patch(&self) -> Result<Patch, FormatError> {
        self.patch.parse()
    }

    /// Serialize to CBOR bytes.
    ///
    /// # Errors
    ///
    /// Returns error if serialization fails.
    pub fn to_cbor(&self) -> Result<Vec<u8>, MessageError> {
        encode(self)
    }

    /// Deserialize from CBOR bytes.
    ///
    /// # Errors
    ///
    /// Returns error if deserialization fails.
    pub fn from_cbor(bytes: &[u8]) -> Result<Self, MessageError> {
        decode(bytes)
    }
}

fn encode<T: Serialize>(message: &T) -> Result<Vec<u8>, MessageError> {
    let mut bytes = Vec::new();
    ciborium::into_writer(message, &mut bytes)
        .map_err(|e| MessageError::Serialize(e.to_string()))?;
    Ok(bytes)
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, MessageError> {
    ciborium::from_reader(bytes).map_err(|e| MessageError::Deserialize(e.to_string()))
}

/// Errors for message serialization/deserialization.
#[derive(Debug, Clone, thiserror::Error)]
pub enum MessageError {
    /// Serialization failed
    #[error("serialization failed: {0}")]
    Serialize(String),
    /// Deserialization failed
    #[error("deserialization failed: {0}")]
    Deserialize(String),
}
