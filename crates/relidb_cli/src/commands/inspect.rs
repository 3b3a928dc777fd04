//! Inspect command implementation.

use relidb_storage::{Backend, FileBackend};
use std::path::Path;

const ENTRIES: &[u8] = b"entries";
const RELATIONSHIPS: &[u8] = b"relationships";
const LOOKUPS: &[u8] = b"lookups";

/// Runs the inspect command over the store file at `<path>/<name>.bdb`.
pub fn run(path: &Path, name: &str) -> Result<(), Box<dyn std::error::Error>> {
    let store_file = path.join(format!("{name}.bdb"));
    if !store_file.exists() {
        return Err(format!("store file not found: {}", store_file.display()).into());
    }

    let backend = FileBackend::open(&store_file)?;
    let tx = backend.begin_read()?;

    println!("Store: {}", store_file.display());
    println!("================");
    println!();
    println!("entries: {} keys", tx.key_count(&[ENTRIES])?);
    println!();

    println!("relationships:");
    for relationship in tx.child_buckets(&[RELATIONSHIPS])? {
        let relationship: &[u8] = &relationship;
        let mut members = 0usize;
        let mut ids = 0usize;
        for id in tx.child_buckets(&[RELATIONSHIPS, relationship])? {
            let id: &[u8] = &id;
            ids += 1;
            members += tx.key_count(&[RELATIONSHIPS, relationship, id])?;
        }
        println!(
            "  {:24} {} ids, {} members",
            String::from_utf8_lossy(relationship),
            ids,
            members
        );
    }
    println!();

    println!("lookups:");
    for lookup in tx.child_buckets(&[LOOKUPS])? {
        let lookup: &[u8] = &lookup;
        let mut keys = 0usize;
        let mut ids = 0usize;
        for id in tx.child_buckets(&[LOOKUPS, lookup])? {
            let id: &[u8] = &id;
            ids += 1;
            keys += tx.key_count(&[LOOKUPS, lookup, id])?;
        }
        println!(
            "  {:24} {} ids, {} keys",
            String::from_utf8_lossy(lookup),
            ids,
            keys
        );
    }

    Ok(())
}
