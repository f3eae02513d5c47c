//! Registry Module
//!
//! ERC-8004 on-chain agent registration, agent card generation,
//! and agent discovery via the Identity Registry on Base.

pub mod erc8004;
pub mod agent_card;
pub mod discovery;
