use chrono::{NaiveDate, NaiveDateTime};

/// Column holding the practice date (`YYYY-MM-DD`).
pub const COLUMN_DATE: &str = "date";
/// Column holding the member (part) name from the roster.
pub const COLUMN_MEMBER: &str = "member";
/// Column holding the song title.
pub const COLUMN_SONG: &str = "song";
/// Column holding the practiced section of the song.
pub const COLUMN_SECTION: &str = "section";
/// Column holding the practice duration in minutes.
pub const COLUMN_DURATION: &str = "duration_minutes";
/// Column holding the self-assessed completion percentage.
pub const COLUMN_COMPLETION: &str = "completion_percent";
/// Column holding the free-form comment.
pub const COLUMN_COMMENT: &str = "comment";
/// Trailing key column holding the generated record id.
pub const COLUMN_ID: &str = "id";

/// The seven data columns, in storage order.
pub const COLUMNS: [&str; 7] = [
    COLUMN_DATE,
    COLUMN_MEMBER,
    COLUMN_SONG,
    COLUMN_SECTION,
    COLUMN_DURATION,
    COLUMN_COMPLETION,
    COLUMN_COMMENT,
];

/// `chrono` format of dates as they are written to the table.
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Practice time the report form starts at.
pub const DEFAULT_DURATION_MINUTES: u32 = 30;
/// Increment of the practice time input.
pub const DURATION_STEP_MINUTES: u32 = 10;
/// Completion the report form starts at.
pub const DEFAULT_COMPLETION_PERCENT: u8 = 50;

/// One practice-session report.
///
/// Records are only ever appended and removed as whole rows; there is no
/// in-place update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PracticeRecord {
    pub date: NaiveDate,
    pub member: String,
    pub song: String,
    pub section: String,
    pub duration_minutes: u32,
    pub completion_percent: u8,
    pub comment: String,
    /// Stable key, `None` when the table runs without an id column.
    pub id: Option<String>,
}

impl PracticeRecord {
    /// Stringify every field in column order, with the id last when present.
    pub fn to_row(&self) -> Vec<String> {
        let mut row = vec![
            self.date.format(DATE_FORMAT).to_string(),
            self.member.clone(),
            self.song.clone(),
            self.section.clone(),
            self.duration_minutes.to_string(),
            self.completion_percent.to_string(),
            self.comment.clone(),
        ];
        if let Some(id) = &self.id {
            row.push(id.clone());
        }
        row
    }
}

/// Canonical header row for a table, optionally with the id column.
pub fn header(with_ids: bool) -> Vec<String> {
    let mut header: Vec<String> = COLUMNS.iter().map(|c| c.to_string()).collect();
    if with_ids {
        header.push(COLUMN_ID.to_string());
    }
    header
}

/// Parse a stored date cell.
///
/// Besides the canonical `YYYY-MM-DD`, slash-separated dates and full
/// timestamps are accepted since people edit the sheet by hand.
///
/// # Examples
/// ```
/// use band_log::record::parse_date;
/// use chrono::NaiveDate;
///
/// let may_first = NaiveDate::from_ymd_opt(2024, 5, 1);
/// assert_eq!(parse_date("2024-05-01"), may_first);
/// assert_eq!(parse_date("2024/05/01"), may_first);
/// assert_eq!(parse_date("2024-05-01 18:30:00"), may_first);
/// assert_eq!(parse_date("yesterday"), None);
/// ```
pub fn parse_date(text: &str) -> Option<NaiveDate> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }
    NaiveDate::parse_from_str(text, DATE_FORMAT)
        .or_else(|_| NaiveDate::parse_from_str(text, "%Y/%m/%d"))
        .ok()
        .or_else(|| {
            NaiveDateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S")
                .ok()
                .map(|dt| dt.date())
        })
}

/// Coerce a stored cell to a number, treating anything unparseable as 0.
///
/// # Arguments
/// * `text` - Raw cell contents, surrounding whitespace is ignored
///
/// # Returns
/// The parsed value, or `0.0` for empty, non-numeric, infinite or NaN cells
///
/// # Examples
/// ```
/// use band_log::record::coerce_number;
///
/// assert_eq!(coerce_number(" 45 "), 45.0);
/// assert_eq!(coerce_number("about an hour"), 0.0);
/// assert_eq!(coerce_number("NaN"), 0.0);
/// ```
pub fn coerce_number(text: &str) -> f64 {
    match text.trim().parse::<f64>() {
        Ok(value) if value.is_finite() => value,
        _ => 0.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> PracticeRecord {
        PracticeRecord {
            date: NaiveDate::from_ymd_opt(2024, 5, 1).unwrap(),
            member: "Trumpet".to_string(),
            song: "Sing Sing Sing".to_string(),
            section: "Intro".to_string(),
            duration_minutes: 40,
            completion_percent: 70,
            comment: "BPM 120".to_string(),
            id: None,
        }
    }

    #[test]
    fn row_follows_column_order() {
        let row = sample().to_row();
        assert_eq!(
            row,
            vec!["2024-05-01", "Trumpet", "Sing Sing Sing", "Intro", "40", "70", "BPM 120"]
        );
        assert_eq!(row.len(), COLUMNS.len());
    }

    #[test]
    fn row_appends_id_last() {
        let record = PracticeRecord {
            id: Some("abc".to_string()),
            ..sample()
        };
        let row = record.to_row();
        assert_eq!(row.len(), 8);
        assert_eq!(row[7], "abc");
    }

    #[test]
    fn header_with_and_without_ids() {
        assert_eq!(header(false).len(), 7);
        assert_eq!(header(true).last().map(String::as_str), Some(COLUMN_ID));
    }

    #[test]
    fn dates_in_several_shapes() {
        let expected = NaiveDate::from_ymd_opt(2024, 5, 1);
        assert_eq!(parse_date("2024-05-01"), expected);
        assert_eq!(parse_date(" 2024/05/01 "), expected);
        assert_eq!(parse_date("2024-05-01 00:00:00"), expected);
        assert_eq!(parse_date("yesterday"), None);
        assert_eq!(parse_date(""), None);
    }

    #[test]
    fn numbers_coerce_to_zero() {
        assert_eq!(coerce_number("30"), 30.0);
        assert_eq!(coerce_number(" 12.5 "), 12.5);
        assert_eq!(coerce_number("bad"), 0.0);
        assert_eq!(coerce_number(""), 0.0);
        assert_eq!(coerce_number("NaN"), 0.0);
    }
}
