//! Witness classes, identities and per-anchor records.

use std::fmt;

use serde::{Deserialize, Serialize};
use url::Url;

/// The two disjoint witness classes.
///
/// Quorum requirements are configured independently per class; a peer
/// belongs to exactly one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WitnessType {
    /// Peers discovered from the anchor's own operation batch.
    Batch,
    /// Peers configured on the node as system-wide witnesses.
    System,
}

impl fmt::Display for WitnessType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Batch => f.write_str("batch"),
            Self::System => f.write_str("system"),
        }
    }
}

/// A peer eligible to countersign anchors.
///
/// The URI is the identity key: all comparisons between witnesses use its
/// canonical string form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Witness {
    #[serde(rename = "type")]
    pub witness_type: WitnessType,
    pub uri: Url,
    /// Whether the peer operates a transparency log.
    #[serde(default)]
    pub has_log: bool,
}

impl Witness {
    pub fn new(witness_type: WitnessType, uri: Url, has_log: bool) -> Self {
        Self {
            witness_type,
            uri,
            has_log,
        }
    }
}

/// Per-anchor, per-witness entry stored by the witness store.
///
/// At most one record exists for a given `(anchor, uri)` pair within an
/// anchor. The proof stays empty until the witness delivers one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WitnessRecord {
    #[serde(rename = "type")]
    pub witness_type: WitnessType,
    pub uri: Url,
    #[serde(default)]
    pub has_log: bool,
    /// True once the selector has chosen this witness for the anchor.
    #[serde(default)]
    pub selected: bool,
    /// Opaque proof bytes as delivered by the transport; empty means the
    /// witness has not signed yet.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub proof: Vec<u8>,
}

impl WitnessRecord {
    /// Fresh record for a witness, with no proof on file.
    pub fn new(witness: &Witness, selected: bool) -> Self {
        Self {
            witness_type: witness.witness_type,
            uri: witness.uri.clone(),
            has_log: witness.has_log,
            selected,
            proof: Vec::new(),
        }
    }

    /// Whether a proof has been recorded for this witness.
    pub fn has_proof(&self) -> bool {
        !self.proof.is_empty()
    }

    /// The witness identity this record belongs to.
    pub fn witness(&self) -> Witness {
        Witness {
            witness_type: self.witness_type,
            uri: self.uri.clone(),
            has_log: self.has_log,
        }
    }
}
