use super::{json_pretty, open_engine, print_violations, EXIT_REJECTED, EXIT_SUCCESS};
use gavel_core::{Evaluation, TracingAuditSink};
use gavel_schema::parse_request_file;
use std::path::Path;

/// Dry-run evaluation: reports the outcome without committing or auditing.
pub fn run(store_path: &Path, request_path: &Path, json: bool) -> Result<u8, String> {
    let request = parse_request_file(request_path).map_err(|e| format!("request error: {e}"))?;
    let engine = open_engine(store_path, Box::new(TracingAuditSink))?;
    let evaluation = engine
        .evaluate(&request)
        .map_err(|e| format!("store error: {e}"))?;

    if json {
        println!("{}", json_pretty(&evaluation)?);
    } else {
        match &evaluation {
            Evaluation::Accepted { writes } => {
                println!("accepted: {} write(s) would be committed", writes.len());
            }
            Evaluation::Rejected { violations } => print_violations(violations),
        }
    }
    Ok(if evaluation.is_accepted() {
        EXIT_SUCCESS
    } else {
        EXIT_REJECTED
    })
}
