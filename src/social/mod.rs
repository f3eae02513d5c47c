//! Social Module
//!
//! Peer-to-peer messaging between automatons using a relay server.
//! Requests are authenticated with the automaton's Conway API key.

pub mod client;
