//! Command-line smoke entry for `collett_core`.
//!
//! # Responsibility
//! - Without arguments, print core health and version.
//! - With a project folder, open it and print its outline as JSON.

use collett_core::{default_log_level, init_logging, Project, LOG_LEVEL_ENV};
use log::error;
use std::process::ExitCode;

fn main() -> ExitCode {
    let level = std::env::var(LOG_LEVEL_ENV).unwrap_or_else(|_| default_log_level().to_string());
    let log_dir = std::env::temp_dir().join("collett-logs");
    if let Err(err) = init_logging(&level, &log_dir) {
        eprintln!("collett: logging disabled: {err}");
    }

    let Some(path) = std::env::args_os().nth(1) else {
        println!("collett_core ping={}", collett_core::ping());
        println!("collett_core version={}", collett_core::core_version());
        return ExitCode::SUCCESS;
    };

    let project = match Project::open(&path) {
        Ok(project) => project,
        Err(err) => {
            error!("event=cli_open module=cli status=error error={}", err);
            eprintln!("collett: {err}");
            return ExitCode::FAILURE;
        }
    };

    let outline = project.model().snapshot();
    project.close();
    match serde_json::to_string_pretty(&outline) {
        Ok(json) => {
            println!("{json}");
            ExitCode::SUCCESS
        }
        Err(err) => {
            eprintln!("collett: could not render outline: {err}");
            ExitCode::FAILURE
        }
    }
}
