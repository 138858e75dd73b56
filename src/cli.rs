//! CLI domain: parse, route, request files, output and presentation only.
//! No pipeline orchestration; a single route table dispatches to the library.

mod output;
mod parse;
mod presentation;
mod request;
mod route;

pub use output::map_error;
pub use parse::{parse_key_value, Cli, Commands};
pub use presentation::{format_artifacts, format_progress, format_run_summary, format_sections};
pub use request::RequestFile;
pub use route::RunContext;
