//! Provider-agnostic LLM gateway: driver trait + three families (C3),
//! model capability cache (C2), token estimation (C1), and the client that
//! ties them together (C4).

pub mod capability;
pub mod client;
pub mod error;
pub mod provider;
pub mod tokenizer;
pub mod types;
