//! JSON report output.
//!
//! The file carries the report fields at top level next to the keyword and
//! an RFC 3339 generation timestamp:
//!
//! ```text
//! {"keyword": "...", "generated_at": "...", "main_summary": "...", ...}
//! ```

use super::{file_stem, output_path};
use crate::models::Report;
use chrono::{DateTime, Local};
use serde::Serialize;
use std::error::Error;
use tokio::fs;
use tracing::{error, info, instrument};

#[derive(Debug, Serialize)]
struct ReportFile<'a> {
    keyword: &'a str,
    generated_at: String,
    #[serde(flatten)]
    report: &'a Report,
}

pub fn report_to_json(
    keyword: &str,
    report: &Report,
    generated_at: DateTime<Local>,
) -> Result<String, serde_json::Error> {
    serde_json::to_string_pretty(&ReportFile {
        keyword,
        generated_at: generated_at.to_rfc3339(),
        report,
    })
}

/// Write a [`Report`] as pretty-printed JSON.
///
/// Creates `json_output_dir` if needed and writes one file named after the
/// keyword slug and the generation time.
///
/// # Arguments
///
/// * `keyword` - The search keyword the report was built for
/// * `report` - The consolidated report
/// * `json_output_dir` - Directory for JSON output
/// * `generated_at` - Timestamp recorded in the file and used in its name
///
/// # Returns
///
/// The path written.
///
/// # Errors
///
/// Fails if serialization, directory creation or the file write fails.
///
/// # Output Path
///
/// The file is written to: `{json_output_dir}/{slug}_{YYYYmmdd_HHMMSS}.json`
#[instrument(level = "info", skip_all, fields(json_output_dir = %json_output_dir))]
pub async fn write_report(
    keyword: &str,
    report: &Report,
    json_output_dir: &str,
    generated_at: DateTime<Local>,
) -> Result<String, Box<dyn Error>> {
    let json = report_to_json(keyword, report, generated_at)?;

    if let Err(e) = fs::create_dir_all(json_output_dir).await {
        error!(%json_output_dir, error = %e, "Failed to create JSON dir");
        return Err(e.into());
    }

    let path = output_path(json_output_dir, &file_stem(keyword, generated_at), "json");
    info!(%path, "Writing JSON");
    fs::write(&path, json).await?;
    info!(%path, "Wrote JSON report");

    Ok(path)
}
