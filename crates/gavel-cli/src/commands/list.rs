use super::{colorize_status, json_pretty, open_engine, EXIT_SUCCESS};
use gavel_core::TracingAuditSink;
use gavel_schema::{ResourceId, ResourceKind};
use gavel_store::ListFilter;
use std::path::Path;

pub fn run(
    store_path: &Path,
    kind: Option<&str>,
    design: Option<&str>,
    include_deleted: bool,
    json: bool,
) -> Result<u8, String> {
    let kind = kind
        .map(str::parse::<ResourceKind>)
        .transpose()
        .map_err(|e| format!("request error: {e}"))?;
    let filter = ListFilter {
        kind,
        design_id: design.map(ResourceId::new),
        include_deleted,
    };

    let engine = open_engine(store_path, Box::new(TracingAuditSink))?;
    let records = engine
        .list(&filter)
        .map_err(|e| format!("store error: {e}"))?;

    if json {
        println!("{}", json_pretty(&records)?);
    } else if records.is_empty() {
        println!("no resources found");
    } else {
        println!(
            "{:<18} {:<10} {:<24} {:<10} UPDATED",
            "ID", "KIND", "NAME", "STATUS"
        );
        for record in &records {
            let mut status = colorize_status(&record.status_str());
            if record.is_deleted() {
                status = format!("{status} (deleted)");
            }
            println!(
                "{:<18} {:<10} {:<24} {:<10} {}",
                record.id,
                record.kind().to_string(),
                record.name(),
                status,
                record.meta.updated_at
            );
        }
    }
    Ok(EXIT_SUCCESS)
}
