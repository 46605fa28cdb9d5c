//! Observability (§4.9): trace spans, metrics, and budget enforcement.
//!
//! The teacher has no direct equivalent to this module; it follows the
//! `tracing`-centric idiom used throughout the pack for the logging side
//! (see `crates/mira-server/src/background/embeddings.rs` for the
//! batch-write-task shape this module's async span writer borrows), and
//! introduces span/metric/budget bookkeeping as new code per the design.

pub mod budget;
pub mod metrics;
pub mod tracer;
