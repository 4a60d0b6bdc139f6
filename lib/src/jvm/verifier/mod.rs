//! Types the JVM verifier assigns to locals and stack slots
//!
//! Every jump target in a method (and every exception handler) needs a stack map frame listing
//! the verification type of each local and stack entry. [`VerificationType`] is the lattice those
//! frames are built from, [`Frame`] knows how to compress itself against the previous frame, and
//! the stack shuffling helpers are shared with [`crate::analysis`], which does the inference.

mod frame;
mod types;

pub use frame::*;
pub use types::*;
