//! JSON output of run summaries.
//!
//! Files are organized by date with edition names:
//! ```text
//! json_output_dir/
//! └── 2025-05-06/
//!     ├── morning.json
//!     ├── afternoon.json
//!     └── evening.json
//! ```
//!
//! A later run in the same edition overwrites the earlier file.

use crate::models::RunSummary;
use chrono::{Local, NaiveDate};
use std::error::Error;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{error, info, instrument};

/// Write a [`RunSummary`] to `{json_output_dir}/{date}/{edition}.json`.
///
/// Uses the current local date and [`crate::utils::time_of_day`] edition.
/// Returns the path written.
pub async fn write_summary(
    summary: &RunSummary,
    json_output_dir: &str,
) -> Result<PathBuf, Box<dyn Error>> {
    let today = Local::now().date_naive();
    let edition = crate::utils::time_of_day();
    write_summary_for(summary, json_output_dir, today, &edition).await
}

#[instrument(level = "info", skip_all, fields(%json_output_dir, %date, %edition))]
pub async fn write_summary_for(
    summary: &RunSummary,
    json_output_dir: &str,
    date: NaiveDate,
    edition: &str,
) -> Result<PathBuf, Box<dyn Error>> {
    let json = serde_json::to_string_pretty(summary)?;

    let full_json_dir = Path::new(json_output_dir).join(date.to_string());
    if let Err(e) = fs::create_dir_all(&full_json_dir).await {
        error!(dir = %full_json_dir.display(), error = %e, "Failed to create JSON dir");
        return Err(e.into());
    }

    let output_json_filename = full_json_dir.join(format!("{edition}.json"));
    fs::write(&output_json_filename, json).await?;
    info!(path = %output_json_filename.display(), "Wrote run summary");

    Ok(output_json_filename)
}
