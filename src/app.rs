#![cfg(feature = "web")]
use axum::{
    Form, Json, Router,
    extract::{Query, State},
    http::{StatusCode, header},
    response::{Html, IntoResponse, Redirect, Response},
    routing::{get, post},
};
use axum_extra::extract::cookie::{Cookie, CookieJar};
use chrono::{Local, NaiveDate};
use handlebars::Handlebars;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use crate::aggregate::{Bar, Dashboard};
use crate::chart::{self, ChartOptions};
use crate::config::Config;
use crate::export;
use crate::history::{self, DeleteTarget};
use crate::intake::{self, IntakeError, ReportForm};
use crate::record::{DATE_FORMAT, DEFAULT_COMPLETION_PERCENT, DEFAULT_DURATION_MINUTES, DURATION_STEP_MINUTES};
use crate::store::{AnyStore, StoreError, TableStore};
use crate::table::Table;

const NOTICE_COOKIE: &str = "notice";

/// Shared state: the store, the configuration and the compiled templates.
pub struct AppState<S> {
    pub store: S,
    pub config: Config,
    templates: Handlebars<'static>,
}

impl<S: TableStore> AppState<S> {
    pub fn new(store: S, config: Config) -> Result<Self, handlebars::TemplateError> {
        let mut templates = Handlebars::new();
        templates.register_partial("header", include_str!("./static/header.hbs"))?;
        templates.register_partial("footer", include_str!("./static/footer.hbs"))?;
        templates.register_template_string("report", include_str!("./static/report.hbs"))?;
        templates.register_template_string("dashboard", include_str!("./static/dashboard.hbs"))?;
        templates.register_template_string("history", include_str!("./static/history.hbs"))?;

        Ok(Self {
            store,
            config,
            templates,
        })
    }

    fn render(&self, name: &str, mut data: serde_json::Value, notice: Option<Notice>) -> Response {
        if let Some(object) = data.as_object_mut() {
            object.insert("table_name".to_string(), json!(self.config.table_name));
            object.insert("notice".to_string(), json!(notice));
        }
        match self.templates.render(name, &data) {
            Ok(body) => Html(body).into_response(),
            Err(e) => {
                error!(template = name, error = %e, "template rendering failed");
                (StatusCode::INTERNAL_SERVER_ERROR, "Failed to render page").into_response()
            }
        }
    }

    /// Full table, or an empty one plus an error notice when the read fails.
    async fn load_table(&self) -> (Table, Option<Notice>) {
        match self.store.read_all().await {
            Ok(table) => (table, None),
            Err(e) => {
                warn!(table = self.store.name(), error = %e, "read failed");
                (
                    Table::empty(self.config.header()),
                    Some(Notice::error(format!("Failed to load data: {}", e))),
                )
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NoticeLevel {
    Success,
    Warning,
    Error,
}

/// A message surfaced at the top of the next rendered page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notice {
    pub level: NoticeLevel,
    pub message: String,
}

impl Notice {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Success,
            message: message.into(),
        }
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Warning,
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Error,
            message: message.into(),
        }
    }

    fn encode(&self) -> String {
        let level = match self.level {
            NoticeLevel::Success => "success",
            NoticeLevel::Warning => "warning",
            NoticeLevel::Error => "error",
        };
        format!("{}:{}", level, urlencoding::encode(&self.message))
    }

    fn decode(value: &str) -> Option<Self> {
        let (level, message) = value.split_once(':')?;
        let level = match level {
            "success" => NoticeLevel::Success,
            "warning" => NoticeLevel::Warning,
            "error" => NoticeLevel::Error,
            _ => return None,
        };
        Some(Self {
            level,
            message: urlencoding::decode(message).ok()?.into_owned(),
        })
    }
}

/// Leave a notice for the page the client is redirected to.
fn flash(jar: CookieJar, notice: Notice) -> CookieJar {
    jar.add(
        Cookie::build((NOTICE_COOKIE, notice.encode()))
            .path("/")
            .http_only(true),
    )
}

/// Pick up and clear a pending notice.
fn take_notice(jar: CookieJar) -> (CookieJar, Option<Notice>) {
    let notice = jar.get(NOTICE_COOKIE).and_then(|c| Notice::decode(c.value()));
    if notice.is_none() {
        return (jar, None);
    }
    (jar.remove(Cookie::build(NOTICE_COOKIE).path("/")), notice)
}

/// Build the router for the given state.
pub fn router<S: TableStore>(state: Arc<AppState<S>>) -> Router {
    Router::new()
        .route("/", get(serve_report_form::<S>))
        .route("/report", post(submit_report::<S>))
        .route("/dashboard", get(serve_dashboard::<S>))
        .route("/dashboard/members.png", get(member_chart::<S>))
        .route("/dashboard/songs.png", get(song_chart::<S>))
        .route("/history", get(serve_history::<S>))
        .route("/history/delete", post(delete_entry::<S>))
        .route("/api/records", get(get_records::<S>))
        .route("/api/summary", get(get_summary::<S>))
        .route("/export.csv", get(export_csv::<S>))
        .route("/export.xlsx", get(export_xlsx::<S>))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Open the configured store and serve until the process is stopped.
///
/// A store that cannot be opened at startup is not fatal: every page reports
/// the failure and the connection is retried on the next request.
pub async fn run(config: Config) -> anyhow::Result<()> {
    let store = AnyStore::from_config(&config)?;
    match store.open().await {
        Ok(()) => info!(table = store.name(), "store ready"),
        Err(e) => warn!(table = store.name(), error = %e, "store not reachable yet"),
    }

    let bind = config.bind.clone();
    let state = Arc::new(AppState::new(store, config)?);
    let app = router(state);

    let listener = TcpListener::bind(bind.as_str()).await?;
    info!("Listening on http://{}", bind);
    axum::serve(listener, app).await?;

    Ok(())
}

fn today() -> NaiveDate {
    Local::now().date_naive()
}

fn report_page<S: TableStore>(state: &AppState<S>, form: &ReportForm, notice: Option<Notice>) -> Response {
    let selected = if state.config.is_member(&form.member) {
        form.member.as_str()
    } else {
        state.config.members.first().map(String::as_str).unwrap_or_default()
    };
    let members: Vec<_> = state
        .config
        .members
        .iter()
        .map(|name| json!({ "name": name, "selected": name == selected }))
        .collect();

    state.render(
        "report",
        json!({
            "title": "Report",
            "nav_report": true,
            "members": members,
            "duration_step": DURATION_STEP_MINUTES,
            "form": form,
        }),
        notice,
    )
}

async fn serve_report_form<S: TableStore>(State(state): State<Arc<AppState<S>>>, jar: CookieJar) -> Response {
    let (jar, notice) = take_notice(jar);
    let form = ReportForm {
        date: today().format(DATE_FORMAT).to_string(),
        duration_minutes: DEFAULT_DURATION_MINUTES.to_string(),
        completion_percent: DEFAULT_COMPLETION_PERCENT.to_string(),
        ..ReportForm::default()
    };
    (jar, report_page(&state, &form, notice)).into_response()
}

async fn submit_report<S: TableStore>(
    State(state): State<Arc<AppState<S>>>,
    jar: CookieJar,
    Form(form): Form<ReportForm>,
) -> Response {
    match intake::submit(&state.store, &state.config, &form, today()).await {
        Ok(record) => {
            let notice = Notice::success(format!(
                "Saved to the spreadsheet! ({} - {})",
                record.song, record.section
            ));
            (flash(jar, notice), Redirect::to("/")).into_response()
        }
        Err(IntakeError::Invalid(e)) => report_page(&state, &form, Some(Notice::error(e.to_string()))),
        Err(IntakeError::Store(e)) => {
            report_page(&state, &form, Some(Notice::error(format!("Failed to save: {}", e))))
        }
    }
}

fn bar_rows(bars: &[Bar]) -> Vec<serde_json::Value> {
    bars.iter()
        .map(|b| json!({ "label": b.label, "value": format!("{:.1}", b.value) }))
        .collect()
}

async fn serve_dashboard<S: TableStore>(State(state): State<Arc<AppState<S>>>, jar: CookieJar) -> Response {
    let (jar, flashed) = take_notice(jar);
    let (table, failed) = state.load_table().await;
    let dashboard = Dashboard::from_table(&table);

    let page = state.render(
        "dashboard",
        json!({
            "title": "Dashboard",
            "nav_dashboard": true,
            "empty": table.is_empty(),
            "headers": dashboard.headers,
            "recent": dashboard.recent,
            "member_minutes": bar_rows(&dashboard.member_minutes),
            "song_progress": bar_rows(&dashboard.song_progress),
            "comments": dashboard.comments,
        }),
        failed.or(flashed),
    );
    (jar, page).into_response()
}

fn png_response(bars: &[Bar], options: &ChartOptions) -> Response {
    if bars.is_empty() {
        return StatusCode::NOT_FOUND.into_response();
    }
    match chart::bar_chart_png(bars, options) {
        Ok(png) => ([(header::CONTENT_TYPE, "image/png")], png).into_response(),
        Err(e) => {
            error!(chart = %options.title, error = %e, "chart rendering failed");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

async fn member_chart<S: TableStore>(State(state): State<Arc<AppState<S>>>) -> Response {
    let (table, _) = state.load_table().await;
    png_response(&Dashboard::from_table(&table).member_minutes, &ChartOptions::member_minutes())
}

async fn song_chart<S: TableStore>(State(state): State<Arc<AppState<S>>>) -> Response {
    let (table, _) = state.load_table().await;
    png_response(&Dashboard::from_table(&table).song_progress, &ChartOptions::song_progress())
}

#[derive(Deserialize)]
struct HistoryQuery {
    select: Option<String>,
}

async fn serve_history<S: TableStore>(
    State(state): State<Arc<AppState<S>>>,
    Query(params): Query<HistoryQuery>,
    jar: CookieJar,
) -> Response {
    let (jar, flashed) = take_notice(jar);
    let (table, failed) = state.load_table().await;

    let selected = params.select.and_then(|s| s.trim().parse::<usize>().ok());
    let confirm = selected.and_then(|position| history::confirmation(&table, position));
    let rows: Vec<_> = table
        .rows
        .iter()
        .enumerate()
        .map(|(position, row)| {
            json!({
                "position": position,
                "values": table.ordered_values(row),
                "selected": Some(position) == selected,
            })
        })
        .collect();

    let page = state.render(
        "history",
        json!({
            "title": "History",
            "nav_history": true,
            "empty": table.is_empty(),
            "headers": table.headers,
            "rows": rows,
            "confirm": confirm,
        }),
        failed.or(flashed),
    );
    (jar, page).into_response()
}

async fn delete_entry<S: TableStore>(
    State(state): State<Arc<AppState<S>>>,
    jar: CookieJar,
    Form(target): Form<DeleteTarget>,
) -> Response {
    let notice = match history::delete_record(&state.store, &target).await {
        Ok(()) => Notice::success("Deleted!"),
        // stale or out-of-range selection, nothing was removed
        Err(e @ StoreError::Delete(_)) => Notice::warning(e.to_string()),
        Err(e) => Notice::error(e.to_string()),
    };
    (flash(jar, notice), Redirect::to("/history")).into_response()
}

async fn get_records<S: TableStore>(State(state): State<Arc<AppState<S>>>) -> impl IntoResponse {
    let (table, notice) = state.load_table().await;
    Json(json!({ "table": table, "notice": notice }))
}

async fn get_summary<S: TableStore>(State(state): State<Arc<AppState<S>>>) -> impl IntoResponse {
    let (table, notice) = state.load_table().await;
    Json(json!({ "summary": Dashboard::from_table(&table), "notice": notice }))
}

async fn export_csv<S: TableStore>(State(state): State<Arc<AppState<S>>>) -> Response {
    match state.store.read_all().await {
        Ok(table) => (
            [
                (header::CONTENT_TYPE, "text/csv; charset=utf-8"),
                (header::CONTENT_DISPOSITION, "attachment; filename=\"practice_log.csv\""),
            ],
            export::to_csv(&table),
        )
            .into_response(),
        Err(e) => {
            warn!(error = %e, "export failed");
            (StatusCode::SERVICE_UNAVAILABLE, format!("Failed to load data: {}", e)).into_response()
        }
    }
}

async fn export_xlsx<S: TableStore>(State(state): State<Arc<AppState<S>>>) -> Response {
    let table = match state.store.read_all().await {
        Ok(table) => table,
        Err(e) => {
            warn!(error = %e, "export failed");
            return (StatusCode::SERVICE_UNAVAILABLE, format!("Failed to load data: {}", e)).into_response();
        }
    };
    match export::to_xlsx(&table) {
        Ok(bytes) => (
            [
                (
                    header::CONTENT_TYPE,
                    "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
                ),
                (header::CONTENT_DISPOSITION, "attachment; filename=\"practice_log.xlsx\""),
            ],
            bytes,
        )
            .into_response(),
        Err(e) => {
            error!(error = %e, "xlsx export failed");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn notices_survive_the_cookie() {
        let notice = Notice::success("Saved to the spreadsheet! (Take Five - A, B)");
        let encoded = notice.encode();
        assert!(!encoded.contains(' '));
        assert_eq!(Notice::decode(&encoded), Some(notice));
    }

    #[test]
    fn warnings_keep_their_level() {
        let notice = Notice::warning("could not delete the row: reload and try again");
        let decoded = Notice::decode(&notice.encode()).unwrap();
        assert_eq!(decoded.level, NoticeLevel::Warning);
    }

    #[test]
    fn garbage_cookies_are_ignored() {
        assert_eq!(Notice::decode("nonsense"), None);
        assert_eq!(Notice::decode("shout:hello"), None);
        assert_eq!(Notice::decode("info:hello"), None);
    }

    #[test]
    fn bar_values_are_rounded_for_display() {
        let rows = bar_rows(&[Bar {
            label: "S".to_string(),
            value: 66.666,
        }]);
        assert_eq!(rows[0]["value"], "66.7");
    }
}
