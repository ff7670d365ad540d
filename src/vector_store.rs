// =============================================================================
// Vector Store loader — bulk historical-vector ingestion at startup
// =============================================================================
//
// Generalises `runtime_config.rs`'s load-from-disk pattern (read, parse,
// warn-and-continue on failure) into a bulk loader pulling from either an
// HTTP endpoint or a local JSONL file, feeding Pattern Memory once at
// startup. Malformed records are skipped and counted, never fatal.
// =============================================================================

use std::path::Path;

use tracing::{info, warn};

use crate::vector::Vector;

#[derive(Debug, Default)]
pub struct LoadReport {
    pub loaded: usize,
    pub skipped: usize,
}

/// Loads vectors from a local newline-delimited JSON file. Each line is one
/// `Vector`; a line that fails to parse is skipped and counted rather than
/// aborting the whole load.
pub fn load_jsonl(path: impl AsRef<Path>) -> (Vec<Vector>, LoadReport) {
    let path = path.as_ref();
    let mut report = LoadReport::default();
    let mut vectors = Vec::new();

    let content = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "vector store file unreadable, starting with empty memory");
            return (vectors, report);
        }
    };

    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match serde_json::from_str::<Vector>(line) {
            Ok(v) => {
                vectors.push(v);
                report.loaded += 1;
            }
            Err(e) => {
                warn!(error = %e, "skipping malformed vector record");
                report.skipped += 1;
            }
        }
    }

    info!(loaded = report.loaded, skipped = report.skipped, path = %path.display(), "vector store load complete");
    (vectors, report)
}

/// Loads vectors from the upstream vector-store HTTP service. `since` and
/// `instrument` are optional narrowing filters forwarded as query params.
pub async fn load_remote(
    base_url: &str,
    instrument: Option<&str>,
) -> Result<(Vec<Vector>, LoadReport), reqwest::Error> {
    let client = reqwest::Client::new();
    let mut url = format!("{base_url}/api/vectors");
    if let Some(instrument) = instrument {
        url = format!("{url}?instrument={instrument}");
    }

    let resp = client.get(&url).send().await?;
    let raw: Vec<serde_json::Value> = resp.json().await?;

    let mut report = LoadReport::default();
    let mut vectors = Vec::new();
    for value in raw {
        match serde_json::from_value::<Vector>(value) {
            Ok(v) => {
                vectors.push(v);
                report.loaded += 1;
            }
            Err(e) => {
                warn!(error = %e, "skipping malformed remote vector record");
                report.skipped += 1;
            }
        }
    }
    info!(loaded = report.loaded, skipped = report.skipped, "remote vector store load complete");
    Ok((vectors, report))
}
