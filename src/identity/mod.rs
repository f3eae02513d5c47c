//! Automaton Identity Module
//!
//! Local identity handle and API-key bookkeeping. Cryptographic identity
//! issuance is delegated to the external chain registry.

pub mod provision;
pub mod wallet;
