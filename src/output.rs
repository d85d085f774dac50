//! CLI output formatting.
//!
//! # Run report
//!
//! Printed once the pipeline has drained. One section per component, each
//! line a counter, in pipeline order:
//!
//! ```text
//! Indexed 1\ (/home/me/Pictures) in 12.4s, 161.3 files/s
//!
//! Scan
//!     Folders scanned: 42
//!     Files scanned: 2101
//!     Supported files: 2000
//!     Signature failures: 0
//! ...
//! ```
//!
//! # Alias list
//!
//! ```text
//! 1  /home/me/Pictures
//!     Added: 2019-05-01 10:00:00 UTC
//!     Last indexed: 2024-02-11 08:30:12 UTC
//! ```
//!
//! # Architecture
//!
//! Each report has a `format_*` function (returns `Vec<String>`) for
//! testability and a `print_*` wrapper that writes to stdout. Format
//! functions are pure: no I/O, no side effects.

use chrono::{DateTime, Utc};

use crate::alias::{AliasEntry, alias_prefix};
use crate::byday::{ByDay, MonthDay};
use crate::indexer::RunSummary;
use crate::stats::Counter;

/// Return indentation string: 4 spaces per depth level.
fn indent(depth: usize) -> String {
    "    ".repeat(depth)
}

fn counter_line(label: &str, counter: &Counter) -> String {
    format!("{}{}: {}", indent(1), label, counter.get())
}

fn section(lines: &mut Vec<String>, title: &str, counters: &[(&str, &Counter)]) {
    lines.push(String::new());
    lines.push(title.to_string());
    lines.extend(counters.iter().map(|(label, c)| counter_line(label, c)));
}

fn timestamp(at: &DateTime<Utc>) -> String {
    at.format("%Y-%m-%d %H:%M:%S UTC").to_string()
}

pub fn format_run_report(summary: &RunSummary) -> Vec<String> {
    let stats = &summary.stats;
    let secs = summary.elapsed.as_secs_f64();
    let files = stats.scan.supported_files.get();
    let rate = if secs > 0.0 { files as f64 / secs } else { 0.0 };

    let mut lines = vec![format!(
        "{} {} ({}) in {:.1}s, {:.1} files/s",
        if summary.dry_run { "Dry run of" } else { "Indexed" },
        alias_prefix(&summary.alias),
        summary.root.display(),
        secs,
        rate
    )];

    section(
        &mut lines,
        "Scan",
        &[
            ("Folders scanned", &stats.scan.directories_scanned),
            ("Files scanned", &stats.scan.files_scanned),
            ("Supported files", &stats.scan.supported_files),
            ("Signature failures", &stats.scan.signature_failures),
        ],
    );
    section(
        &mut lines,
        "Metadata",
        &[
            ("Extractor invocations", &stats.extract.invocations),
            ("Extractor failures", &stats.extract.failures),
        ],
    );
    section(
        &mut lines,
        "Location",
        &[
            ("Lookups", &stats.location.lookups),
            ("Failures", &stats.location.failures),
            ("Server errors", &stats.location.server_errors),
            ("Malformed responses", &stats.location.malformed),
            ("Cache hits", &stats.location.cache_hits),
        ],
    );
    section(
        &mut lines,
        "Thumbnails",
        &[
            ("Images generated", &stats.thumbnails.generated_image),
            ("Image failures", &stats.thumbnails.failed_image),
            ("Videos generated", &stats.thumbnails.generated_video),
            ("Video failures", &stats.thumbnails.failed_video),
            ("Unsupported by backend", &stats.thumbnails.unsupported),
            ("Copied", &stats.thumbnails.copied),
            ("Already current", &stats.thumbnails.skipped_current),
            ("Check failures", &stats.thumbnails.failed_checks),
        ],
    );
    section(
        &mut lines,
        "Index",
        &[
            ("Files indexed", &stats.index.indexed),
            ("Duplicates ignored", &stats.index.duplicates),
            ("Unchanged", &stats.index.unchanged),
            ("Failed commits", &stats.index.failed_commits),
            ("Changed", &stats.index.changed),
            ("Added", &stats.index.added),
            ("Media scanned", &stats.index.media_scanned),
            ("Removed", &stats.index.removed),
        ],
    );

    if !summary.stages.is_empty() {
        lines.push(String::new());
        lines.push("Stages".to_string());
        for stage in &summary.stages {
            lines.push(format!(
                "{}{} ({} workers): {}",
                indent(1),
                stage.name,
                stage.workers,
                stage.processed
            ));
        }
    }
    lines
}

pub fn print_run_report(summary: &RunSummary) {
    for line in format_run_report(summary) {
        println!("{}", line);
    }
}

pub fn format_aliases(entries: &[AliasEntry]) -> Vec<String> {
    if entries.is_empty() {
        return vec!["No aliases registered".to_string()];
    }
    let width = entries.iter().map(|e| e.alias.len()).max().unwrap_or(0);
    let mut lines = Vec::new();
    for entry in entries {
        lines.push(format!("{:<width$}  {}", entry.alias, entry.path));
        lines.push(format!("{}Added: {}", indent(1), timestamp(&entry.date_added)));
        lines.push(format!(
            "{}Last indexed: {}",
            indent(1),
            entry
                .date_last_indexed
                .as_ref()
                .map(timestamp)
                .unwrap_or_else(|| "never".to_string())
        ));
    }
    lines
}

pub fn print_aliases(entries: &[AliasEntry]) {
    for line in format_aliases(entries) {
        println!("{}", line);
    }
}

fn month_day(md: Option<MonthDay>) -> String {
    md.map(|md| format!("{:02}-{:02}", md.month, md.day))
        .unwrap_or_else(|| "none".to_string())
}

pub fn format_by_day(result: &ByDay) -> Vec<String> {
    let mut lines = vec![format!(
        "{:02}-{:02}: {} file(s)",
        result.month,
        result.day,
        result.matches.len()
    )];
    for media in &result.matches {
        let mut line = format!("{}{}  {}", indent(1), media.datetime.format("%Y-%m-%d %H:%M"), media.path);
        if let Some(place) = &media.placename {
            line.push_str(&format!("  ({place})"));
        }
        lines.push(line);
    }
    lines.push(format!("{}Previous: {}", indent(1), month_day(result.previous)));
    lines.push(format!("{}Next: {}", indent(1), month_day(result.next)));
    lines
}

pub fn print_by_day(result: &ByDay) {
    for line in format_by_day(result) {
        println!("{}", line);
    }
}
