//! Conway Module
//!
//! Sandbox and chain API clients, credits management, and inference
//! for communicating with Conway's control plane.

pub mod chain_client;
pub mod credits;
pub mod inference;
pub mod sandbox_client;
