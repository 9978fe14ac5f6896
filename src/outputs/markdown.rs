//! Markdown rendering of a [`Report`].

use super::{file_stem, output_path};
use crate::models::Report;
use chrono::{DateTime, Local};
use std::error::Error;
use tokio::fs;
use tracing::{error, info, instrument};

/// Render the report as a standalone Markdown document.
///
/// Empty sections are omitted; the summary and sources are always present.
pub fn report_to_markdown(keyword: &str, report: &Report, generated_at: DateTime<Local>) -> String {
    let mut md = String::new();

    md.push_str(&format!("# News digest: {}\n\n", keyword.trim()));
    md.push_str(&format!(
        "_Generated {} from {} sources._\n\n",
        generated_at.format("%Y-%m-%d %H:%M"),
        report.sources.len()
    ));

    md.push_str("## Summary\n\n");
    md.push_str(report.main_summary.trim());
    md.push_str("\n\n");

    if !report.key_sub_themes.is_empty() {
        md.push_str("## Key themes\n\n");
        for theme in &report.key_sub_themes {
            md.push_str(&format!("- {theme}\n"));
        }
        md.push('\n');
    }

    if !report.key_entities.is_empty() {
        md.push_str("## Key entities\n\n");
        md.push_str(&report.key_entities.join(", "));
        md.push_str("\n\n");
    }

    if !report.timeline.is_empty() {
        md.push_str("## Timeline\n\n| Date | Event | Source |\n|---|---|---|\n");
        for event in &report.timeline {
            md.push_str(&format!(
                "| {} | {} | {} |\n",
                table_cell(&event.date),
                table_cell(&event.event),
                table_cell(&event.source)
            ));
        }
        md.push('\n');
    }

    md.push_str("## Sources\n\n");
    for (i, url) in report.sources.iter().enumerate() {
        md.push_str(&format!("{}. <{}>\n", i + 1, url));
    }

    md
}

/// Pipes and newlines would break the table row.
fn table_cell(s: &str) -> String {
    s.replace('|', "\\|").replace(['\n', '\r'], " ")
}

/// Write a [`Report`] as a Markdown document.
///
/// # Arguments
///
/// * `keyword` - The search keyword, used in the heading and file name
/// * `report` - The consolidated report
/// * `markdown_output_dir` - Directory for Markdown output
/// * `generated_at` - Timestamp shown in the document and used in its name
///
/// # Returns
///
/// The path written.
///
/// # Errors
///
/// Fails if the directory cannot be created or the file cannot be written.
///
/// # Output Path
///
/// The file is written to: `{markdown_output_dir}/{slug}_{YYYYmmdd_HHMMSS}.md`
#[instrument(level = "info", skip_all, fields(markdown_output_dir = %markdown_output_dir))]
pub async fn write_report(
    keyword: &str,
    report: &Report,
    markdown_output_dir: &str,
    generated_at: DateTime<Local>,
) -> Result<String, Box<dyn Error>> {
    let md = report_to_markdown(keyword, report, generated_at);

    if let Err(e) = fs::create_dir_all(markdown_output_dir).await {
        error!(%markdown_output_dir, error = %e, "Failed to create Markdown dir");
        return Err(e.into());
    }

    let path = output_path(markdown_output_dir, &file_stem(keyword, generated_at), "md");
    info!(%path, "Writing Markdown");
    if let Err(e) = fs::write(&path, md).await {
        error!(%path, error = %e, "Failed writing Markdown");
        return Err(e.into());
    }
    info!(%path, "Wrote Markdown report");

    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::TimelineEvent;
    use chrono::TimeZone;

    fn at() -> DateTime<Local> {
        Local.with_ymd_and_hms(2026, 10, 16, 9, 30, 0).unwrap()
    }

    #[test]
    fn test_full_report_sections() {
        let report = Report {
            main_summary: "The Fed raised rates.".to_string(),
            key_sub_themes: vec!["Markets".to_string(), "Inflation".to_string()],
            key_entities: vec!["Federal Reserve".to_string(), "ECB".to_string()],
            timeline: vec![TimelineEvent {
                date: "2026-09-17".to_string(),
                event: "Hike | 25bp".to_string(),
                source: "https://a.example/1".to_string(),
            }],
            sources: vec![
                "https://a.example/1".to_string(),
                "https://b.example/2".to_string(),
            ],
        };
        let md = report_to_markdown("fed", &report, at());

        assert!(md.starts_with("# News digest: fed\n"));
        assert!(md.contains("_Generated 2026-10-16 09:30 from 2 sources._"));
        assert!(md.contains("## Summary\n\nThe Fed raised rates.\n"));
        assert!(md.contains("- Markets\n- Inflation\n"));
        assert!(md.contains("Federal Reserve, ECB"));
        assert!(md.contains("| 2026-09-17 | Hike \\| 25bp | https://a.example/1 |"));
        assert!(md.contains("1. <https://a.example/1>\n2. <https://b.example/2>\n"));
    }

    #[test]
    fn test_empty_sections_are_omitted() {
        let report = Report {
            main_summary: "Quiet day.".to_string(),
            key_sub_themes: vec![],
            key_entities: vec![],
            timeline: vec![],
            sources: vec!["https://a.example/1".to_string()],
        };
        let md = report_to_markdown("fed", &report, at());
        assert!(!md.contains("## Key themes"));
        assert!(!md.contains("## Timeline"));
        assert!(md.contains("## Sources"));
    }
}
