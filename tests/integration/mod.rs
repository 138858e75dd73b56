//! Integration tests for the blogforge pipeline

mod config_integration;
mod pipeline_end_to_end;
mod scheduler_failures;
mod store_integration;
mod support;
