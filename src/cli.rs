//! CLI domain: parse, route and output only.
//! Orchestration lives in the library; the route table wires it to commands.

mod output;
mod parse;
mod route;

pub use output::{
    format_scenarios_text, format_validation_errors, format_validation_report, map_error,
};
pub use parse::{Cli, Commands};
pub use route::{parse_input, RunContext};
