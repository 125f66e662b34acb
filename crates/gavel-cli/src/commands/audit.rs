use super::{json_pretty, open_engine, EXIT_SUCCESS};
use gavel_core::TracingAuditSink;
use std::path::Path;

pub fn run(store_path: &Path, limit: Option<usize>, json: bool) -> Result<u8, String> {
    let engine = open_engine(store_path, Box::new(TracingAuditSink))?;
    let mut entries = engine
        .audit_entries()
        .map_err(|e| format!("store error: {e}"))?;

    if let Some(limit) = limit {
        let skip = entries.len().saturating_sub(limit);
        entries.drain(..skip);
    }

    if json {
        println!("{}", json_pretty(&entries)?);
    } else if entries.is_empty() {
        println!("audit log is empty");
    } else {
        println!(
            "{:<28} {:<8} {:<10} {:<10} RESOURCE",
            "OP_ID", "OP", "KIND", "OUTCOME"
        );
        for entry in &entries {
            let resource = entry
                .resource_id
                .as_ref()
                .map_or("-", |id| id.as_str());
            println!(
                "{:<28} {:<8} {:<10} {:<10} {}",
                entry.op_id,
                entry.operation.to_string(),
                entry.kind.to_string(),
                format!("{:?}", entry.outcome).to_lowercase(),
                resource
            );
            for violation in &entry.violations {
                println!("    {violation}");
            }
        }
    }
    Ok(EXIT_SUCCESS)
}
