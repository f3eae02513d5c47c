//! Git Module
//!
//! Read-only git status/log tools exposed to the automaton. Mutating git
//! operations are not part of this runtime's tool surface.

pub mod tools;
