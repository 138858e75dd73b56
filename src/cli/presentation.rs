//! CLI presentation: text formatters per command.

use crate::pipeline::PipelineOutcome;
use crate::progress::PipelineProgress;
use crate::section::{OutputContract, SectionCatalog};
use crate::store::ArtifactRecord;
use chrono::{DateTime, Utc};
use comfy_table::presets::UTF8_FULL;
use comfy_table::Table;
use owo_colors::OwoColorize;
use std::path::Path;

const MESSAGE_PREVIEW_CHARS: usize = 60;

fn heading(title: &str) -> String {
    format!("{}", title.bold().underline())
}

fn format_timestamp(millis: u64) -> String {
    i64::try_from(millis)
        .ok()
        .and_then(DateTime::<Utc>::from_timestamp_millis)
        .map(|at| at.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| millis.to_string())
}

fn contract_name(contract: OutputContract) -> &'static str {
    match contract {
        OutputContract::JsonEnvelope => "json_envelope",
        OutputContract::PlainText => "plain_text",
    }
}

/// First line of the message, shortened for a table cell.
fn preview(message: &str) -> String {
    let first = message.lines().next().unwrap_or_default().trim();
    if first.chars().count() <= MESSAGE_PREVIEW_CHARS {
        return first.to_string();
    }
    let mut short: String = first.chars().take(MESSAGE_PREVIEW_CHARS - 3).collect();
    short.push_str("...");
    short
}

pub fn format_sections(catalog: &SectionCatalog) -> String {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_header(vec![
        "Section", "Block", "Primary", "Fallback", "Chars", "Contract",
    ]);
    for spec in catalog.iter() {
        table.add_row(vec![
            spec.id.to_string(),
            spec.block_tag.clone(),
            spec.primary_model.clone(),
            spec.fallback_model.clone().unwrap_or_else(|| "-".to_string()),
            format!("{}-{}", spec.min_chars, spec.max_chars),
            contract_name(spec.contract).to_string(),
        ]);
    }
    format!("{}\n{}", heading("Sections"), table)
}

pub fn format_progress(progress: &PipelineProgress) -> String {
    let mut out = format!(
        "{}\nStarted: {}\nUpdated: {}\n",
        heading(&format!("Run {}", progress.run_id)),
        format_timestamp(progress.started_at_ms),
        format_timestamp(progress.updated_at_ms),
    );
    for flag in &progress.stages {
        let marker = if flag.complete {
            format!("{}", "done".green())
        } else {
            format!("{}", "pending".yellow())
        };
        out.push_str(&format!("  {:<24} {}\n", flag.stage, marker));
    }
    out.push_str(&format!(
        "{}/{} stages complete",
        progress.completed_count(),
        progress.stages.len()
    ));
    out
}

pub fn format_artifacts(records: &[ArtifactRecord]) -> String {
    if records.is_empty() {
        return "No artifacts recorded.".to_string();
    }
    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_header(vec!["Recorded", "Hash", "Chars", "Message"]);
    for record in records {
        let short_hash: String = record.content_hash.chars().take(12).collect();
        table.add_row(vec![
            format_timestamp(record.recorded_at_ms),
            short_hash,
            record.chars().to_string(),
            preview(&record.user_message),
        ]);
    }
    format!("{}\n{}", heading("Artifacts"), table)
}

/// Summary printed when the document itself went to a file.
pub fn format_run_summary(outcome: &PipelineOutcome, written_to: &Path) -> String {
    let mut out = format!(
        "Run {}: {} chars written to {}",
        outcome.run_id,
        outcome.artifact.chars(),
        written_to.display()
    );
    let fallbacks = outcome.report.fallback_count();
    if fallbacks > 0 {
        out.push_str(&format!(
            "\n{}",
            format!("{} section(s) used fallback content", fallbacks).yellow()
        ));
    }
    for warning in &outcome.artifact.warnings {
        out.push_str(&format!("\nwarning: {}", warning));
    }
    out
}
