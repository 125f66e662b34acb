use super::{colorize_status, json_pretty, open_engine, EXIT_FAILURE, EXIT_SUCCESS};
use gavel_core::TracingAuditSink;
use gavel_schema::{Resource, ResourceBody};
use std::path::Path;

pub fn run(store_path: &Path, id: &str, include_deleted: bool, json: bool) -> Result<u8, String> {
    let engine = open_engine(store_path, Box::new(TracingAuditSink))?;
    let Some(record) = engine
        .get_resource(id, include_deleted)
        .map_err(|e| format!("store error: {e}"))?
    else {
        eprintln!("no resource matching '{id}'");
        return Ok(EXIT_FAILURE);
    };

    if json {
        println!("{}", json_pretty(&record)?);
    } else {
        print_record(&record);
    }
    Ok(EXIT_SUCCESS)
}

fn print_record(record: &Resource) {
    println!("id:         {}", record.id);
    println!("kind:       {}", record.kind());
    println!("name:       {}", record.name());
    match &record.body {
        ResourceBody::Design(d) => {
            println!("status:     {}", colorize_status(&d.status.to_string()));
            println!("revision:   {}", d.revision);
            println!("capacity:   {}", d.capacity);
            if let Some(wingspan) = &d.wingspan {
                println!("wingspan:   {wingspan}");
            }
            if let Some(description) = &d.description {
                println!("description: {description}");
            }
        }
        ResourceBody::Component(c) => {
            match &c.design_id {
                Some(design_id) => println!("design:     {design_id}"),
                None => println!("design:     (none)"),
            }
            println!("class:      {}", c.classification);
            println!("weight:     {}", c.weight);
        }
        ResourceBody::Test(t) => {
            println!("design:     {}", t.design_id);
            println!("category:   {}", t.category);
            println!("status:     {}", colorize_status(&t.status.to_string()));
            if let Some(outcome) = t.outcome {
                println!("outcome:    {}", colorize_status(&outcome.to_string()));
            }
        }
    }
    println!("created:    {}", record.meta.created_at);
    println!("updated:    {}", record.meta.updated_at);
    if let Some(deleted_at) = &record.meta.deleted_at {
        println!("deleted:    {deleted_at}");
    }
}
