//! Report writers.
//!
//! - [`json`]: the [`Report`](crate::models::Report) plus run metadata, for machines
//! - [`markdown`]: a readable rendering of the same report
//!
//! Both name their file after the keyword slug and the generation time:
//!
//! ```text
//! reports/
//! ├── federal_reserve_20261016_091502.json
//! └── federal_reserve_20261016_091502.md
//! ```

pub mod json;
pub mod markdown;

use crate::utils::slugify;
use chrono::{DateTime, Local};

/// `<slug>_<YYYYmmdd_HHMMSS>`, shared by every output format.
pub fn file_stem(keyword: &str, generated_at: DateTime<Local>) -> String {
    format!("{}_{}", slugify(keyword), generated_at.format("%Y%m%d_%H%M%S"))
}

/// Join `dir`, `stem` and `extension` without doubling the separator.
pub(crate) fn output_path(dir: &str, stem: &str, extension: &str) -> String {
    format!("{}/{}.{}", dir.trim_end_matches('/'), stem, extension)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_file_stem() {
        let at = Local.with_ymd_and_hms(2026, 10, 16, 9, 15, 2).unwrap();
        assert_eq!(file_stem("Federal Reserve!", at), "federal_reserve_20261016_091502");
        assert_eq!(file_stem("  ", at), "report_20261016_091502");
    }

    #[test]
    fn test_output_path() {
        assert_eq!(output_path("reports/", "a_1", "md"), "reports/a_1.md");
        assert_eq!(output_path("reports", "a_1", "json"), "reports/a_1.json");
    }
}
