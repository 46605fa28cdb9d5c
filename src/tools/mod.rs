//! Tool registry and executor (C5): built-in tools, permission filtering,
//! path safety, and command approval gating.

pub mod builtin;
pub mod executor;
pub mod path_safety;
pub mod registry;
