//! Dump-journal command implementation.

use relidb_journal::{parse_log_key, read_committed, Journal, JournalRecord};
use serde::Serialize;
use std::path::Path;

/// Change-log record representation for output.
#[derive(Debug, Serialize)]
pub struct RecordInfo {
    /// Segment file the record came from.
    pub segment: String,
    /// Record kind (`write` or `delete`).
    pub kind: &'static str,
    /// Bucket label parsed from the log key.
    pub bucket: String,
    /// Inner key parsed from the log key.
    pub key: String,
    /// Payload size in bytes (writes only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload_size: Option<usize>,
}

/// Runs the dump-journal command over the segments for `name` under
/// `path`.
pub fn run(
    path: &Path,
    name: &str,
    limit: Option<usize>,
    format: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let segments = Journal::segment_paths(path, name)?;
    if segments.is_empty() {
        return Err(format!("no journal segments for {name} under {}", path.display()).into());
    }

    let max_records = limit.unwrap_or(usize::MAX);
    let mut records = Vec::new();

    'segments: for segment in &segments {
        let segment_name = segment
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        for record in read_committed(segment)? {
            if records.len() >= max_records {
                break 'segments;
            }
            records.push(describe(&segment_name, &record));
        }
    }

    match format {
        "json" => println!("{}", serde_json::to_string_pretty(&records)?),
        _ => print_text_output(&records),
    }

    Ok(())
}

fn describe(segment: &str, record: &JournalRecord) -> RecordInfo {
    let (kind, log_key, payload_size): (&str, &[u8], Option<usize>) = match record {
        JournalRecord::Write { key, payload } => ("write", key, Some(payload.len())),
        JournalRecord::Delete { key } => ("delete", key, None),
        JournalRecord::Commit { .. } => ("commit", &[], None),
    };

    let (bucket, key) = match parse_log_key(log_key) {
        Ok((bucket, key)) => (
            String::from_utf8_lossy(bucket).into_owned(),
            String::from_utf8_lossy(key).into_owned(),
        ),
        Err(_) => (String::new(), String::from_utf8_lossy(log_key).into_owned()),
    };

    RecordInfo {
        segment: segment.to_string(),
        kind,
        bucket,
        key,
        payload_size,
    }
}

fn print_text_output(records: &[RecordInfo]) {
    println!("Change-log records ({} total)", records.len());
    println!("================");
    println!();

    for record in records {
        print!(
            "[{}] {:6} {}::{}",
            record.segment, record.kind, record.bucket, record.key
        );
        if let Some(size) = record.payload_size {
            print!(" payload={size} bytes");
        }
        println!();
    }
}
