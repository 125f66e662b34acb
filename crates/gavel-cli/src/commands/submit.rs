use super::{json_pretty, open_engine, print_violations, EXIT_REJECTED, EXIT_SUCCESS};
use gavel_core::{Evaluation, JsonlAuditSink};
use gavel_schema::parse_request_file;
use gavel_store::StoreLayout;
use std::path::Path;

pub fn run(store_path: &Path, request_path: &Path, json: bool) -> Result<u8, String> {
    let request = parse_request_file(request_path).map_err(|e| format!("request error: {e}"))?;
    let audit_log = StoreLayout::new(store_path).audit_log_path();
    let engine = open_engine(store_path, Box::new(JsonlAuditSink::new(audit_log)))?;
    let evaluation = engine
        .submit(&request)
        .map_err(|e| format!("store error: {e}"))?;

    if json {
        println!("{}", json_pretty(&evaluation)?);
    } else {
        match &evaluation {
            Evaluation::Accepted { writes } => {
                println!("accepted: {} write(s) committed", writes.len());
                for write in writes {
                    println!("  {} {} '{}'", write.id, write.kind(), write.name());
                }
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
