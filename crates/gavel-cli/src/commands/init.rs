use super::{json_pretty, EXIT_SUCCESS};
use gavel_store::StoreLayout;
use std::path::Path;

pub fn run(store_path: &Path, json: bool) -> Result<u8, String> {
    let layout = StoreLayout::new(store_path);
    layout
        .initialize()
        .map_err(|e| format!("store error: {e}"))?;

    if json {
        println!(
            "{}",
            json_pretty(&serde_json::json!({
                "status": "initialized",
                "store": store_path.display().to_string(),
            }))?
        );
    } else {
        println!("initialized store at {}", store_path.display());
    }
    Ok(EXIT_SUCCESS)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_creates_store_layout() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(run(dir.path(), false).unwrap(), EXIT_SUCCESS);
        assert!(dir.path().join("store").join("resources").is_dir());
        assert!(dir.path().join("store").join("version").is_file());
    }

    #[test]
    fn init_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        run(dir.path(), false).unwrap();
        assert_eq!(run(dir.path(), true).unwrap(), EXIT_SUCCESS);
    }
}
