//! Per-section model alternation.
//!
//! The selector is the only shared mutable state in the generation core. It is an explicit
//! object handed to every runner instead of a process-wide toggle.

use crate::section::SectionSpec;
use crate::types::SectionId;
use parking_lot::Mutex;
use std::collections::HashMap;

/// Model routing for one invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelChoice {
    pub primary: String,
    /// The candidate not selected this time; `None` for single-model sections.
    pub fallback: Option<String>,
}

/// Alternates between a section's two candidate models across invocations.
#[derive(Debug, Default)]
pub struct ModelSelector {
    counters: Mutex<HashMap<SectionId, u64>>,
}

impl ModelSelector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pick the model for the next invocation of `spec`.
    ///
    /// Invocations 1, 3, 5, ... get the primary model and 2, 4, 6, ... the alternate. The
    /// counter read and increment happen under one lock, so concurrent callers never share a
    /// slot.
    pub fn select(&self, spec: &SectionSpec) -> ModelChoice {
        let Some(alternate) = spec.fallback_model.as_deref() else {
            return ModelChoice {
                primary: spec.primary_model.clone(),
                fallback: None,
            };
        };

        let slot = {
            let mut counters = self.counters.lock();
            let counter = counters.entry(spec.id.clone()).or_insert(0);
            let slot = *counter;
            *counter += 1;
            slot
        };

        if slot % 2 == 0 {
            ModelChoice {
                primary: spec.primary_model.clone(),
                fallback: Some(alternate.to_string()),
            }
        } else {
            ModelChoice {
                primary: alternate.to_string(),
                fallback: Some(spec.primary_model.clone()),
            }
        }
    }

    /// Number of alternating selections made so far for `section`.
    pub fn invocations(&self, section: &SectionId) -> u64 {
        self.counters.lock().get(section).copied().unwrap_or(0)
    }
}
