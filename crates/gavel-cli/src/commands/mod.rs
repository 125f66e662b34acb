pub mod audit;
pub mod check;
pub mod completions;
pub mod get;
pub mod init;
pub mod list;
pub mod submit;

use gavel_core::{AuditSink, Engine, SystemClock};
use std::path::Path;

pub const EXIT_SUCCESS: u8 = 0;
pub const EXIT_REJECTED: u8 = 1;
pub const EXIT_REQUEST_ERROR: u8 = 2;
pub const EXIT_STORE_ERROR: u8 = 3;
pub const EXIT_FAILURE: u8 = 4;

pub fn json_pretty(value: &impl serde::Serialize) -> Result<String, String> {
    serde_json::to_string_pretty(value).map_err(|e| format!("JSON serialization failed: {e}"))
}

pub fn open_engine(store_path: &Path, audit: Box<dyn AuditSink>) -> Result<Engine, String> {
    Engine::open(store_path, Box::new(SystemClock), audit)
        .map_err(|e| format!("store error: {e}"))
}

pub fn colorize_status(status: &str) -> String {
    use console::Style;
    match status {
        "draft" | "planned" => Style::new().yellow().apply_to(status).to_string(),
        "approved" | "pass" => Style::new().green().apply_to(status).to_string(),
        "running" => Style::new().cyan().bold().apply_to(status).to_string(),
        "completed" => Style::new().blue().apply_to(status).to_string(),
        "rejected" | "fail" => Style::new().red().apply_to(status).to_string(),
        other => other.to_owned(),
    }
}

pub fn print_violations(violations: &[gavel_core::Violation]) {
    eprintln!("rejected: {} violation(s)", violations.len());
    for v in violations {
        eprintln!("  {v}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_pretty_serializes_value() {
        let val = serde_json::json!({"key": "value"});
        let result = json_pretty(&val).unwrap();
        assert!(result.contains("\"key\""));
    }

    #[test]
    fn colorize_status_known_states() {
        assert!(colorize_status("draft").contains("draft"));
        assert!(colorize_status("approved").contains("approved"));
        assert!(colorize_status("rejected").contains("rejected"));
        assert!(colorize_status("completed").contains("completed"));
    }

    #[test]
    fn colorize_status_unknown_passthrough() {
        assert_eq!(colorize_status("-"), "-");
    }

    #[test]
    fn exit_codes_are_distinct() {
        let codes = [
            EXIT_SUCCESS,
            EXIT_REJECTED,
            EXIT_REQUEST_ERROR,
            EXIT_STORE_ERROR,
            EXIT_FAILURE,
        ];
        for (i, a) in codes.iter().enumerate() {
            for b in &codes[i + 1..] {
                assert_ne!(a, b);
            }
        }
    }

    #[test]
    fn open_engine_without_store_fails_with_store_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = open_engine(dir.path(), Box::new(gavel_core::TracingAuditSink));
        assert!(result.is_err());
        assert!(result.unwrap_err().starts_with("store error:"));
    }
}
