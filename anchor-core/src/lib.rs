//! Core data model for a DID anchoring node.
//!
//! This crate holds the vocabulary shared between the witness subsystem and
//! the drivers that feed it: witness classes and identities, per-anchor
//! witness records, and the anchor identifier with its index-safe encoding.
//! It carries no I/O; everything here is plain serde-serializable data.

pub mod types;

pub use types::{AnchorId, AnchorIdError, Witness, WitnessRecord, WitnessType};
