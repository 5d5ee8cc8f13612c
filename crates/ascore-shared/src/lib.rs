//! Leaf types for the access-security core.
//!
//! Everything here is free of dependencies on the rest of `ascore`, mirroring
//! how a shared crate in a larger authorization workspace carries only the
//! vocabulary types (access levels, tri-state flags, interned strings) that
//! both the parser and the evaluator need without pulling either of them in.

pub mod access;
pub mod error;
pub mod intern;
pub mod tristate;

pub use access::{AccessRight, TrapMask};
pub use error::ParsingError;
pub use intern::{InternId, InternTable};
pub use tristate::Tristate;
