//! Capture-time resolution and the derived calendar fields.
//!
//! ## Precedence
//!
//! The first source that parses wins:
//!
//! 1. QuickTime `CreateDate` (no offset, read as local time)
//! 2. QuickTime `ContentCreateDate` (with offset)
//! 3. EXIF `CreateDate`, then `DateTimeOriginal`, then `ModifyDate` (local time)
//! 4. File `FileModifyDate` (with offset)
//! 5. The filesystem modification time seen by the scanner
//! 6. Now
//!
//! A source that is present but unparseable adds a warning and the next one is
//! tried. Falling back to step 4 or later adds a warning too.
//!
//! ## Day of year
//!
//! `dayofyear` is computed on a fixed leap-year calendar: March 1st is always
//! day 61 and December 31st day 366. Every calendar date then has exactly one
//! number, regardless of the year it was taken in, which is what the by-day
//! lookup needs.

use chrono::{DateTime, Datelike, FixedOffset, Local, NaiveDateTime, TimeZone};

use super::decode;
use super::raw::{FieldValue, RawMetadata};
use super::resolve;

/// `2016:05:21 10:12:44`
pub const METADATA_DATE_FORMAT: &str = "%Y:%m:%d %H:%M:%S";
/// `2016:05:21 10:12:44-07:00`
pub const METADATA_DATE_OFFSET_FORMAT: &str = "%Y:%m:%d %H:%M:%S%:z";

/// Differences at or below this many seconds are not reported as a mismatch.
const MISMATCH_TOLERANCE_SECS: i64 = 2;

const CUMULATIVE_DAYS: [u16; 12] = [0, 31, 60, 91, 121, 152, 182, 213, 244, 274, 305, 335];

/// Parse a timestamp without an offset, interpreting it in the local zone.
pub fn parse_local(s: &str) -> Result<DateTime<FixedOffset>, chrono::ParseError> {
    let naive = NaiveDateTime::parse_from_str(s.trim(), METADATA_DATE_FORMAT)?;
    Ok(localize(naive))
}

/// Parse a timestamp carrying its own UTC offset.
pub fn parse_with_offset(s: &str) -> Result<DateTime<FixedOffset>, chrono::ParseError> {
    DateTime::parse_from_str(s.trim(), METADATA_DATE_OFFSET_FORMAT)
}

fn localize(naive: NaiveDateTime) -> DateTime<FixedOffset> {
    // A wall time inside a DST gap has no local instant; read it as UTC.
    Local
        .from_local_datetime(&naive)
        .earliest()
        .map(|dt| dt.fixed_offset())
        .unwrap_or_else(|| naive.and_utc().fixed_offset())
}

fn field_text(field: &str, value: Option<&FieldValue>, warnings: &mut Vec<String>) -> Option<String> {
    match decode::text(field, value) {
        Ok(text) => text,
        Err(warning) => {
            warnings.push(warning.to_string());
            None
        }
    }
}

/// Pick the capture time of a file.
///
/// `fs_modified` is the scanner's view of the modification time.
pub fn resolve_capture_time(
    raw: &RawMetadata,
    fs_modified: Option<DateTime<FixedOffset>>,
    warnings: &mut Vec<String>,
) -> DateTime<FixedOffset> {
    let file_modify = field_text("FileModifyDate", raw.file.file_modify_date.as_ref(), warnings)
        .and_then(|s| match parse_with_offset(&s) {
            Ok(dt) => Some(dt),
            Err(e) => {
                warnings.push(format!("Failed parsing FileModifyDate ({s}): {e}"));
                None
            }
        });

    let chosen = embedded_capture_time(raw, warnings).unwrap_or_else(|| {
        warnings.push("No usable date in metadata, using file timestamp".to_string());
        file_modify.or(fs_modified).unwrap_or_else(|| {
            warnings.push("No file timestamp available, using the current time".to_string());
            Local::now().fixed_offset()
        })
    });

    if let Some(modified) = file_modify {
        let diff = (modified - chosen).num_seconds().abs();
        if diff > MISMATCH_TOLERANCE_SECS {
            warnings.push(format!(
                "FileModifyDate ({modified}) differs from the capture date ({chosen}) by {diff} seconds"
            ));
        }
    }
    chosen
}

type Parser = fn(&str) -> Result<DateTime<FixedOffset>, chrono::ParseError>;

fn attempt(
    field: &str,
    value: Option<String>,
    parse: Parser,
    warnings: &mut Vec<String>,
) -> Option<DateTime<FixedOffset>> {
    let value = value?;
    match parse(&value) {
        Ok(dt) => Some(dt),
        Err(e) => {
            warnings.push(format!("Failed parsing {field} ({value}): {e}"));
            None
        }
    }
}

fn embedded_capture_time(
    raw: &RawMetadata,
    warnings: &mut Vec<String>,
) -> Option<DateTime<FixedOffset>> {
    let qt = &raw.quicktime;
    let qt_create = field_text("QuickTime:CreateDate", qt.create_date.as_ref(), warnings);
    if let Some(dt) = attempt("QuickTime:CreateDate", qt_create, parse_local, warnings) {
        return Some(dt);
    }
    let qt_content = field_text(
        "QuickTime:ContentCreateDate",
        qt.content_create_date.as_ref(),
        warnings,
    );
    if let Some(dt) = attempt(
        "QuickTime:ContentCreateDate",
        qt_content,
        parse_with_offset,
        warnings,
    ) {
        return Some(dt);
    }

    let exif = &raw.exif;
    let create = field_text("EXIF:CreateDate", exif.create_date.as_ref(), warnings);
    let original = field_text("EXIF:DateTimeOriginal", exif.date_time_original.as_ref(), warnings);
    let modify = field_text("EXIF:ModifyDate", exif.modify_date.as_ref(), warnings);
    let exif_date = resolve(&[create.as_deref(), original.as_deref(), modify.as_deref()]);
    attempt("EXIF date", exif_date, parse_local, warnings)
}

/// Day number on the fixed leap-year calendar (1..=366).
///
/// Out-of-range input is clamped to the nearest valid day.
pub fn day_of_year(month: u32, day: u32) -> u16 {
    let month = month.clamp(1, 12);
    CUMULATIVE_DAYS[(month - 1) as usize] + day.clamp(1, 31) as u16
}

/// Inverse of [`day_of_year`].
pub fn month_day(day_of_year: u16) -> (u32, u32) {
    let day_of_year = day_of_year.clamp(1, 366);
    let month = CUMULATIVE_DAYS
        .iter()
        .rposition(|&start| start < day_of_year)
        .unwrap_or(0);
    (
        month as u32 + 1,
        (day_of_year - CUMULATIVE_DAYS[month]) as u32,
    )
}

/// Calendar fields derived from a capture time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DateParts {
    /// `YYYYMMDD`
    pub date: String,
    /// `"January Jan"`
    pub month_name: String,
    /// `"Monday Mon"`
    pub day_name: String,
    pub day_of_year: u16,
}

impl DateParts {
    pub fn of(datetime: &DateTime<FixedOffset>) -> Self {
        Self {
            date: datetime.format("%Y%m%d").to_string(),
            month_name: datetime.format("%B %b").to_string(),
            day_name: datetime.format("%A %a").to_string(),
            day_of_year: day_of_year(datetime.month(), datetime.day()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::raw::{ExifGroup, FileGroup, QuickTimeGroup};

    fn text(s: &str) -> Option<FieldValue> {
        Some(FieldValue::Text(s.to_string()))
    }

    fn fixed(s: &str) -> DateTime<FixedOffset> {
        DateTime::parse_from_rfc3339(s).unwrap()
    }

    // =========================================================================
    // Day of year
    // =========================================================================

    #[test]
    fn fixed_leap_calendar() {
        assert_eq!(day_of_year(1, 1), 1);
        assert_eq!(day_of_year(2, 29), 60);
        assert_eq!(day_of_year(3, 1), 61);
        assert_eq!(day_of_year(12, 31), 366);
    }

    #[test]
    fn month_day_inverts_day_of_year() {
        for doy in 1..=366u16 {
            let (m, d) = month_day(doy);
            assert_eq!(day_of_year(m, d), doy, "day {doy}");
        }
        assert_eq!(month_day(61), (3, 1));
    }

    #[test]
    fn date_parts_names() {
        let parts = DateParts::of(&fixed("2016-05-21T10:12:44-07:00"));
        assert_eq!(parts.date, "20160521");
        assert_eq!(parts.month_name, "May May");
        assert_eq!(parts.day_name, "Saturday Sat");
        assert_eq!(parts.day_of_year, 142);

        let parts = DateParts::of(&fixed("2019-01-07T00:00:00+00:00"));
        assert_eq!(parts.month_name, "January Jan");
        assert_eq!(parts.day_name, "Monday Mon");
    }

    #[test]
    fn same_date_same_day_in_any_year() {
        let leap = DateParts::of(&fixed("2016-03-01T12:00:00+00:00"));
        let common = DateParts::of(&fixed("2017-03-01T12:00:00+00:00"));
        assert_eq!(leap.day_of_year, common.day_of_year);
    }

    // =========================================================================
    // Precedence
    // =========================================================================

    #[test]
    fn quicktime_create_date_wins() {
        let raw = RawMetadata {
            quicktime: QuickTimeGroup {
                create_date: text("2015:07:04 20:00:00"),
                content_create_date: text("2014:01:01 00:00:00+00:00"),
                ..Default::default()
            },
            exif: ExifGroup {
                create_date: text("2013:01:01 00:00:00"),
                ..Default::default()
            },
            ..Default::default()
        };
        let mut warnings = Vec::new();
        let dt = resolve_capture_time(&raw, None, &mut warnings);
        assert_eq!(
            dt.naive_local(),
            NaiveDateTime::parse_from_str("2015:07:04 20:00:00", METADATA_DATE_FORMAT).unwrap()
        );
        assert!(warnings.is_empty(), "{warnings:?}");
    }

    #[test]
    fn content_create_date_keeps_its_offset() {
        let raw = RawMetadata {
            quicktime: QuickTimeGroup {
                content_create_date: text("2014:02:03 04:05:06-08:00"),
                ..Default::default()
            },
            ..Default::default()
        };
        let mut warnings = Vec::new();
        let dt = resolve_capture_time(&raw, None, &mut warnings);
        assert_eq!(dt, fixed("2014-02-03T04:05:06-08:00"));
    }

    #[test]
    fn exif_dates_in_order() {
        let raw = RawMetadata {
            exif: ExifGroup {
                create_date: text("   "),
                date_time_original: text("2012:06:01 08:00:00"),
                modify_date: text("2012:06:02 08:00:00"),
                ..Default::default()
            },
            ..Default::default()
        };
        let mut warnings = Vec::new();
        let dt = resolve_capture_time(&raw, None, &mut warnings);
        assert_eq!(dt.format("%Y%m%d").to_string(), "20120601");
    }

    #[test]
    fn unparseable_source_warns_and_falls_through() {
        let raw = RawMetadata {
            exif: ExifGroup {
                create_date: text("0000:00:00 00:00:00"),
                ..Default::default()
            },
            file: FileGroup {
                file_modify_date: text("2011:03:04 05:06:07+01:00"),
                ..Default::default()
            },
            ..Default::default()
        };
        let mut warnings = Vec::new();
        let dt = resolve_capture_time(&raw, None, &mut warnings);
        assert_eq!(dt, fixed("2011-03-04T05:06:07+01:00"));
        assert_eq!(warnings.len(), 2, "{warnings:?}");
        assert!(warnings[0].starts_with("Failed parsing EXIF date"));
        assert!(warnings[1].starts_with("No usable date"));
    }

    #[test]
    fn filesystem_time_is_the_last_file_fallback() {
        let modified = fixed("2010-10-10T10:10:10+00:00");
        let mut warnings = Vec::new();
        let dt = resolve_capture_time(&RawMetadata::default(), Some(modified), &mut warnings);
        assert_eq!(dt, modified);
        assert_eq!(warnings.len(), 1);
    }

    #[test]
    fn no_source_at_all_uses_now() {
        let mut warnings = Vec::new();
        let before = Local::now().fixed_offset();
        let dt = resolve_capture_time(&RawMetadata::default(), None, &mut warnings);
        assert!(dt >= before - chrono::Duration::seconds(1));
        assert_eq!(warnings.len(), 2);
    }

    #[test]
    fn mismatch_beyond_tolerance_warns() {
        let raw = RawMetadata {
            quicktime: QuickTimeGroup {
                content_create_date: text("2014:02:03 04:05:06+00:00"),
                ..Default::default()
            },
            file: FileGroup {
                file_modify_date: text("2014:02:03 04:05:08+00:00"),
                ..Default::default()
            },
            ..Default::default()
        };
        let mut warnings = Vec::new();
        resolve_capture_time(&raw, None, &mut warnings);
        assert!(warnings.is_empty(), "2s is within tolerance: {warnings:?}");

        let raw = RawMetadata {
            file: FileGroup {
                file_modify_date: text("2014:02:03 05:05:06+00:00"),
                ..Default::default()
            },
            ..raw
        };
        resolve_capture_time(&raw, None, &mut warnings);
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].contains("differs from the capture date"));
    }
}
