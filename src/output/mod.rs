//! Write-once persistence of run reports

use crate::error::PersistError;
use crate::request::ResearchRequest;
use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

pub const REPORT_KEY: &str = "report_path";
pub const RAW_KEY: &str = "raw_labeled_path";

/// Filename stem shared by both reports of one run:
/// `{UTC timestamp}_{subreddit slug}_{8 hex}`
pub fn run_stem(request: &ResearchRequest, now: DateTime<Utc>) -> String {
    let mut hasher = Sha256::new();
    hasher.update(serde_json::to_vec(request).unwrap_or_default());
    hasher.update(uuid::Uuid::new_v4().as_bytes());
    let digest = hasher.finalize();
    let tag: String = digest[..4].iter().map(|b| format!("{:02x}", b)).collect();

    format!(
        "{}_{}_{}",
        now.format("%Y%m%d-%H%M%S"),
        slug(&request.subreddit),
        tag
    )
}

fn slug(subreddit: &str) -> String {
    let slug: String = subreddit
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_lowercase()
            } else {
                '-'
            }
        })
        .collect();
    let slug = slug.trim_matches('-');
    if slug.is_empty() {
        "all".to_string()
    } else {
        slug.to_string()
    }
}

/// Write the raw report and, when present, the narrative report.
///
/// Files are created with `create_new` and never overwritten. If a later
/// write fails, files already written by this call are removed.
pub fn write_reports(
    output_dir: &Path,
    stem: &str,
    narrative: Option<&str>,
    raw: &str,
) -> Result<BTreeMap<String, PathBuf>, PersistError> {
    fs::create_dir_all(output_dir).map_err(|e| PersistError::CreateDir {
        path: output_dir.to_path_buf(),
        source: e,
    })?;

    let mut outputs = BTreeMap::new();

    let raw_path = output_dir.join(format!("{}_raw_labeled.md", stem));
    write_new(&raw_path, raw)?;
    outputs.insert(RAW_KEY.to_string(), raw_path.clone());

    if let Some(narrative) = narrative {
        let report_path = output_dir.join(format!("{}_report.md", stem));
        if let Err(e) = write_new(&report_path, narrative) {
            if let Err(cleanup) = fs::remove_file(&raw_path) {
                warn!("Failed to remove {:?} after write error: {}", raw_path, cleanup);
            }
            return Err(e);
        }
        outputs.insert(REPORT_KEY.to_string(), report_path);
    }

    info!("Wrote {} report(s) to {:?}", outputs.len(), output_dir);
    Ok(outputs)
}

fn write_new(path: &Path, content: &str) -> Result<(), PersistError> {
    let to_err = |source| PersistError::WriteReport {
        path: path.to_path_buf(),
        source,
    };

    let mut file = OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
        .map_err(to_err)?;
    if let Err(e) = file.write_all(content.as_bytes()).and_then(|_| file.sync_all()) {
        drop(file);
        let _ = fs::remove_file(path);
        return Err(to_err(e));
    }
    Ok(())
}
