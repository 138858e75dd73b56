//! Property-based tests for output invariants

mod compiler_sanitize;
mod idempotence;
mod truncation;
