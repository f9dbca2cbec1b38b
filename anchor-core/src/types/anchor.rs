//! Anchor identifiers.
//!
//! An anchor is a content-addressed bundle of DID operations awaiting
//! confirmation. Its identifier is opaque to this subsystem and is supplied
//! by the caller, typically as the anchor's content fingerprint.

use std::fmt;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors produced when decoding an anchor id from its index form.
#[derive(Error, Debug)]
pub enum AnchorIdError {
    #[error("invalid base64url anchor index value: {0}")]
    InvalidEncoding(#[from] base64::DecodeError),

    #[error("anchor index value is not valid UTF-8: {0}")]
    InvalidUtf8(#[from] std::string::FromUtf8Error),
}

/// Opaque identifier of an anchor.
///
/// The identifier doubles as a secondary-index key in the witness store, so
/// it is encoded with unpadded URL-safe base64 before being used as a tag
/// value. [`AnchorId::encoded`] and [`AnchorId::from_encoded`] convert
/// between the two forms.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AnchorId(String);

impl AnchorId {
    /// Wrap a caller-supplied anchor identifier.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The raw identifier as supplied by the caller.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Index-safe form: unpadded URL-safe base64 of the raw identifier.
    pub fn encoded(&self) -> String {
        URL_SAFE_NO_PAD.encode(self.0.as_bytes())
    }

    /// Recover an anchor id from its index form.
    pub fn from_encoded(value: &str) -> Result<Self, AnchorIdError> {
        let bytes = URL_SAFE_NO_PAD.decode(value)?;
        Ok(Self(String::from_utf8(bytes)?))
    }
}

impl fmt::Display for AnchorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for AnchorId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for AnchorId {
    fn from(id: String) -> Self {
        Self(id)
    }
}
