//! Shared types for anchors and their witnesses.

pub mod anchor;
pub mod witness;

pub use anchor::{AnchorId, AnchorIdError};
pub use witness::{Witness, WitnessRecord, WitnessType};
