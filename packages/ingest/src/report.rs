//! Plain-text summaries printed at the end of each command.
//!
//! Every `render_*` function returns the full text so it can be tested;
//! percentages that have no total are left out rather than printed as
//! zero.

use nyc_crime_analytics_models::{
    CategoryShare, CleanDistribution, RawQualityReport, RetentionSummary,
};
use nyc_crime_complaint_models::RejectionReason;
use nyc_crime_database::meta::SyncStatus;
use nyc_crime_ingest_models::{CleanResult, DownloadOutcome, DownloadResult};

const RULE_WIDTH: usize = 60;

fn rule() -> String {
    "=".repeat(RULE_WIDTH)
}

fn heading(lines: &mut Vec<String>, title: &str) {
    lines.push(String::new());
    lines.push(rule());
    lines.push(title.to_string());
    lines.push(rule());
}

/// Formats an optional percentage as `" (12.3%)"`, or nothing.
fn pct(value: Option<f64>) -> String {
    value.map(|p| format!(" ({p:.1}%)")).unwrap_or_default()
}

fn shares(lines: &mut Vec<String>, title: &str, shares: &[CategoryShare]) {
    lines.push(String::new());
    lines.push(format!("{title}:"));
    if shares.is_empty() {
        lines.push("  (none)".to_string());
    }
    for share in shares {
        lines.push(format!(
            "  {:<30} {:>10}{}",
            share.key,
            share.count,
            pct(share.percentage)
        ));
    }
}

const fn rejection_label(reason: RejectionReason) -> &'static str {
    match reason {
        RejectionReason::Missing => "Missing fields",
        RejectionReason::Duplicate => "Duplicates",
        RejectionReason::InvalidCoordinates => "Invalid coordinates",
    }
}

/// Summary of a download run.
#[must_use]
pub fn render_download(result: &DownloadResult, stored: u64) -> String {
    let mut lines = Vec::new();
    heading(&mut lines, "Download session finished");
    lines.push(format!("Started at offset:      {:>10}", result.starting_offset));
    lines.push(format!("New records added:      {:>10}", result.records_added));
    lines.push(format!("Pages stored:           {:>10}", result.pages));
    lines.push(format!("Total records in store: {stored:>10}"));

    match &result.outcome {
        DownloadOutcome::Completed => lines.push("Reached the end of the data.".to_string()),
        DownloadOutcome::LimitReached => lines.push(format!(
            "Stopped at the record limit; run again to continue from offset {}.",
            result.next_offset
        )),
        DownloadOutcome::Interrupted {
            offset,
            attempts,
            error,
        } => {
            lines.push(format!("Failed after {attempts} attempts: {error}"));
            lines.push(format!("Run again to resume from offset {offset}."));
        }
    }

    lines.push(rule());
    lines.join("\n")
}

/// Counters and retention of a cleaning pass.
#[must_use]
pub fn render_clean(result: &CleanResult, retention: &RetentionSummary) -> String {
    let mut lines = Vec::new();
    heading(&mut lines, "Cleaning summary");
    lines.push(format!("Original records:         {:>10}", retention.original));
    lines.push(format!("Examined records:         {:>10}", result.examined));
    lines.push(format!("Cleaned records:          {:>10}", retention.cleaned));
    lines.push(String::new());
    lines.push("Removed:".to_string());
    for &reason in RejectionReason::ALL {
        lines.push(format!(
            "  - {:<21} {:>10}",
            format!("{}:", rejection_label(reason)),
            result.rejected_for(reason)
        ));
    }
    lines.push(format!(
        "  - Total removed:        {:>10}{}",
        retention.removed,
        pct(retention.removed_percentage)
    ));
    if let Some(retained) = retention.retained_percentage {
        lines.push(format!("Retention rate:           {retained:>9.1}%"));
    }
    lines.join("\n")
}

/// Distribution of the clean collection.
#[must_use]
pub fn render_distribution(distribution: &CleanDistribution) -> String {
    let mut lines = Vec::new();
    heading(&mut lines, "Cleaned data distribution");
    lines.push(format!("Records: {}", distribution.total));
    shares(&mut lines, "By borough", &distribution.by_borough);
    shares(&mut lines, "By law category", &distribution.by_law_category);
    shares(&mut lines, "Top offenses", &distribution.top_offenses);

    lines.push(String::new());
    lines.push("Coordinate sample:".to_string());
    for (i, sample) in distribution.coordinate_sample.iter().enumerate() {
        lines.push(format!(
            "  {}. {} {}: lat={:.6}, lon={:.6}",
            i + 1,
            sample.complaint_id,
            sample.borough,
            sample.latitude,
            sample.longitude
        ));
    }
    lines.push(rule());
    lines.join("\n")
}

/// Raw collection quality audit.
#[must_use]
pub fn render_quality(report: &RawQualityReport) -> String {
    let mut lines = Vec::new();
    heading(&mut lines, "Data quality assessment");
    lines.push(format!("Total records: {}", report.total));

    lines.push(String::new());
    lines.push("Missing values:".to_string());
    for field in &report.missing {
        let mark = if field.missing == 0 { "ok" } else { "!!" };
        lines.push(format!(
            "  {mark} {:<20} {:>10} missing{}",
            field.field,
            field.missing,
            pct(field.percentage)
        ));
    }

    lines.push(String::new());
    lines.push(format!(
        "Invalid coordinates:     {:>10}{}",
        report.invalid_coordinates,
        pct(report.invalid_coordinates_percentage)
    ));
    lines.push(format!("Duplicate complaint IDs: {:>10}", report.duplicate_ids));

    shares(&mut lines, "By borough", &report.by_borough);
    shares(&mut lines, "By law category", &report.by_law_category);

    lines.push(String::new());
    lines.push("Date range:".to_string());
    lines.push(format!(
        "  Earliest: {}",
        report.earliest_date.as_deref().unwrap_or("n/a")
    ));
    lines.push(format!(
        "  Latest:   {}",
        report.latest_date.as_deref().unwrap_or("n/a")
    ));

    lines.push(String::new());
    lines.push("Recommendations:".to_string());
    let recommendations = report.recommendations();
    if recommendations.is_empty() {
        lines.push("  No issues found in critical fields.".to_string());
    }
    for recommendation in recommendations {
        lines.push(format!("  - {recommendation}"));
    }
    lines.push(rule());
    lines.join("\n")
}

/// Download state and collection sizes.
#[must_use]
pub fn render_status(dataset: &str, status: &SyncStatus, clean: u64) -> String {
    let mut lines = Vec::new();
    heading(&mut lines, dataset);
    lines.push(format!("Raw records:     {:>10}", status.record_count));
    lines.push(format!(
        "Next offset:     {:>10}",
        status
            .next_offset
            .map_or_else(|| "-".to_string(), |o| o.to_string())
    ));
    lines.push(format!(
        "Last synced:     {}",
        status.last_synced_at.as_deref().unwrap_or("never")
    ));
    lines.push(format!(
        "Fully synced:    {}",
        if status.fully_synced { "yes" } else { "no" }
    ));
    lines.push(format!("Clean records:   {clean:>10}"));
    lines.push(rule());
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_clean_summary_omits_percentages() {
        let text = render_clean(&CleanResult::default(), &RetentionSummary::new(0, 0));
        assert!(!text.contains('%'));
        assert!(!text.contains("Retention rate"));
    }

    #[test]
    fn clean_summary_shows_retention() {
        let result = CleanResult {
            examined: 4,
            accepted: 3,
            missing: 1,
            invalid_coordinates: 0,
            duplicate: 0,
        };
        let text = render_clean(&result, &RetentionSummary::new(4, 3));
        assert!(text.contains("  - Missing fields:                1"));
        assert!(text.contains("  - Duplicates:                    0"));
        assert!(text.contains("(25.0%)"));
        assert!(text.contains("75.0%"));
    }

    #[test]
    fn interrupted_download_names_resume_offset() {
        let result = DownloadResult {
            starting_offset: 0,
            next_offset: 10_000,
            records_added: 10_000,
            pages: 2,
            outcome: DownloadOutcome::Interrupted {
                offset: 10_000,
                attempts: 5,
                error: "timed out".to_string(),
            },
        };
        let text = render_download(&result, 10_000);
        assert!(text.contains("resume from offset 10000"));
        assert!(text.contains("Failed after 5 attempts: timed out"));
    }

    #[test]
    fn status_without_cursor() {
        let status = SyncStatus {
            record_count: 0,
            next_offset: None,
            last_synced_at: None,
            fully_synced: false,
        };
        let text = render_status("NYPD complaints", &status, 0);
        assert!(text.contains("never"));
        assert!(text.contains("Fully synced:    no"));
    }
}
