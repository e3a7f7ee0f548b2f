use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::Config;
use crate::record::{
    DEFAULT_COMPLETION_PERCENT, DEFAULT_DURATION_MINUTES, PracticeRecord, parse_date,
};
use crate::store::{StoreError, TableStore};

/// Raw values of the report form, exactly as submitted.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportForm {
    pub date: String,
    pub member: String,
    pub song: String,
    pub section: String,
    pub duration_minutes: String,
    pub completion_percent: String,
    pub comment: String,
}

/// Why a submission was turned away. The message is shown to the user.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Please enter the song name.")]
    MissingSong,
    #[error("Please enter the section you practiced.")]
    MissingSection,
    #[error("`{0}` is not a valid date (expected YYYY-MM-DD).")]
    InvalidDate(String),
    #[error("`{0}` is not one of the band's parts.")]
    UnknownMember(String),
    #[error("Practice time must be a whole number of minutes, got `{0}`.")]
    InvalidDuration(String),
    #[error("Completion must be a whole number between 0 and 100, got `{0}`.")]
    InvalidCompletion(String),
}

#[derive(Debug, Error)]
pub enum IntakeError {
    #[error(transparent)]
    Invalid(#[from] ValidationError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl ReportForm {
    /// Shape the raw form into a record.
    ///
    /// Song and section are checked first since those are the fields the
    /// form leaves to the user. Empty date, duration and completion take the
    /// form defaults.
    pub fn validate(&self, config: &Config, today: NaiveDate) -> Result<PracticeRecord, ValidationError> {
        let song = self.song.trim();
        if song.is_empty() {
            return Err(ValidationError::MissingSong);
        }
        let section = self.section.trim();
        if section.is_empty() {
            return Err(ValidationError::MissingSection);
        }

        let date = match self.date.trim() {
            "" => today,
            text => parse_date(text).ok_or_else(|| ValidationError::InvalidDate(text.to_string()))?,
        };

        let member = self.member.trim();
        if !config.is_member(member) {
            return Err(ValidationError::UnknownMember(member.to_string()));
        }

        let duration_minutes = match self.duration_minutes.trim() {
            "" => DEFAULT_DURATION_MINUTES,
            text => text
                .parse::<u32>()
                .map_err(|_| ValidationError::InvalidDuration(text.to_string()))?,
        };

        let completion_percent = match self.completion_percent.trim() {
            "" => DEFAULT_COMPLETION_PERCENT,
            text => text
                .parse::<u8>()
                .ok()
                .filter(|pct| *pct <= 100)
                .ok_or_else(|| ValidationError::InvalidCompletion(text.to_string()))?,
        };

        Ok(PracticeRecord {
            date,
            member: member.to_string(),
            song: song.to_string(),
            section: section.to_string(),
            duration_minutes,
            completion_percent,
            comment: self.comment.clone(),
            id: None,
        })
    }
}

/// Validate a submission and append it to the store.
///
/// Invalid forms never reach the store. A valid form results in exactly one
/// `append_row` call; the caller re-reads the table to see the new row.
///
/// # Arguments
/// * `store` - Table the row is appended to
/// * `config` - Roster and whether rows carry an id
/// * `form` - Raw field values as submitted
/// * `today` - Date used when the form leaves the date empty
///
/// # Returns
/// The record as written, including its generated id
///
/// # Errors
/// * `IntakeError::Invalid` if a field fails validation
/// * `IntakeError::Store` if the append fails
pub async fn submit<S: TableStore>(
    store: &S,
    config: &Config,
    form: &ReportForm,
    today: NaiveDate,
) -> Result<PracticeRecord, IntakeError> {
    let mut record = form.validate(config, today).map_err(|e| {
        info!(reason = %e, "report rejected");
        e
    })?;
    if config.record_ids {
        record.id = Some(Uuid::new_v4().to_string());
    }

    if let Err(e) = store.append_row(record.to_row()).await {
        warn!(table = store.name(), error = %e, "append failed");
        return Err(e.into());
    }
    info!(
        table = store.name(),
        member = %record.member,
        song = %record.song,
        section = %record.section,
        "report saved"
    );
    Ok(record)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use crate::table::{Table, cell};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Counts calls and remembers what was appended.
    #[derive(Default)]
    struct RecordingStore {
        calls: AtomicUsize,
        appended: Mutex<Vec<Vec<String>>>,
        fail: bool,
    }

    impl TableStore for RecordingStore {
        fn name(&self) -> &str {
            "recording"
        }

        async fn read_all(&self) -> Result<Table, StoreError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(Table::default())
        }

        async fn append_row(&self, values: Vec<String>) -> Result<(), StoreError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(StoreError::Write("quota exceeded".to_string()));
            }
            self.appended.lock().unwrap().push(values);
            Ok(())
        }

        async fn delete_row(&self, _position: usize) -> Result<(), StoreError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, 1).unwrap()
    }

    fn form() -> ReportForm {
        ReportForm {
            date: "2024-05-20".to_string(),
            member: "Trombone".to_string(),
            song: " In the Mood ".to_string(),
            section: "Chorus".to_string(),
            duration_minutes: "40".to_string(),
            completion_percent: "65".to_string(),
            comment: "tricky break at bar 32".to_string(),
        }
    }

    fn config_without_ids() -> Config {
        Config {
            record_ids: false,
            ..Config::default()
        }
    }

    #[tokio::test]
    async fn valid_report_appends_once_in_column_order() {
        let store = RecordingStore::default();
        submit(&store, &config_without_ids(), &form(), today()).await.unwrap();

        assert_eq!(store.calls.load(Ordering::SeqCst), 1);
        let appended = store.appended.lock().unwrap();
        assert_eq!(appended.len(), 1);
        assert_eq!(
            appended[0],
            vec![
                "2024-05-20",
                "Trombone",
                "In the Mood",
                "Chorus",
                "40",
                "65",
                "tricky break at bar 32"
            ]
        );
    }

    #[tokio::test]
    async fn ids_are_appended_after_the_data_columns() {
        let store = MemoryStore::new("log", Config::default().header());
        let record = submit(&store, &Config::default(), &form(), today()).await.unwrap();
        let id = record.id.expect("id generated");

        let table = store.read_all().await.unwrap();
        assert_eq!(table.len(), 1);
        assert_eq!(cell(&table.rows[0], "id"), id);
        assert_eq!(cell(&table.rows[0], "song"), "In the Mood");
    }

    #[tokio::test]
    async fn reports_on_a_localized_sheet_still_aggregate() {
        let localized = ["日付", "名前", "曲名", "練習箇所", "時間(分)", "進捗(%)", "コメント"]
            .iter()
            .map(|h| h.to_string())
            .collect();
        let store = MemoryStore::with_grid("band_app_db", Config::default().header(), vec![localized]);
        let report = ReportForm {
            member: "Trumpet".to_string(),
            song: "Take Five".to_string(),
            duration_minutes: "40".to_string(),
            completion_percent: "70".to_string(),
            ..form()
        };
        let record = submit(&store, &Config::default(), &report, today()).await.unwrap();

        let table = store.read_all().await.unwrap();
        assert_eq!(cell(&table.rows[0], "id"), record.id.unwrap_or_default());
        let minutes = crate::aggregate::member_totals(&table);
        assert_eq!(minutes.len(), 1);
        assert_eq!(minutes[0].label, "Trumpet");
        assert_eq!(minutes[0].value, 40.0);
        let progress = crate::aggregate::song_progress(&table);
        assert_eq!(progress[0].label, "Take Five");
        assert_eq!(progress[0].value, 70.0);
    }

    #[tokio::test]
    async fn blank_song_or_section_never_touches_the_store() {
        let store = RecordingStore::default();
        let config = Config::default();

        let blank_song = ReportForm {
            song: "   ".to_string(),
            ..form()
        };
        let err = submit(&store, &config, &blank_song, today()).await.unwrap_err();
        assert!(matches!(err, IntakeError::Invalid(ValidationError::MissingSong)));

        let blank_section = ReportForm {
            section: String::new(),
            ..form()
        };
        let err = submit(&store, &config, &blank_section, today()).await.unwrap_err();
        assert!(matches!(err, IntakeError::Invalid(ValidationError::MissingSection)));

        assert_eq!(store.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn empty_fields_take_form_defaults() {
        let raw = ReportForm {
            date: String::new(),
            duration_minutes: String::new(),
            completion_percent: String::new(),
            comment: String::new(),
            ..form()
        };
        let record = raw.validate(&Config::default(), today()).unwrap();
        assert_eq!(record.date, today());
        assert_eq!(record.duration_minutes, 30);
        assert_eq!(record.completion_percent, 50);
        assert_eq!(record.comment, "");
    }

    #[test]
    fn widget_ranges_are_enforced() {
        let config = Config::default();
        let check = |raw: ReportForm| raw.validate(&config, today()).unwrap_err();

        assert!(matches!(
            check(ReportForm { member: "Drums".to_string(), ..form() }),
            ValidationError::UnknownMember(_)
        ));
        assert!(matches!(
            check(ReportForm { duration_minutes: "-10".to_string(), ..form() }),
            ValidationError::InvalidDuration(_)
        ));
        assert!(matches!(
            check(ReportForm { completion_percent: "101".to_string(), ..form() }),
            ValidationError::InvalidCompletion(_)
        ));
        assert!(matches!(
            check(ReportForm { date: "next friday".to_string(), ..form() }),
            ValidationError::InvalidDate(_)
        ));
    }

    #[tokio::test]
    async fn store_failure_is_reported() {
        let store = RecordingStore {
            fail: true,
            ..RecordingStore::default()
        };
        let err = submit(&store, &Config::default(), &form(), today()).await.unwrap_err();
        assert!(matches!(err, IntakeError::Store(StoreError::Write(_))));
        assert_eq!(store.calls.load(Ordering::SeqCst), 1);
    }
}
