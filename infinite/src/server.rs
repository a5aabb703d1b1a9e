//! Read API for the frontend plus the reprocess trigger.

use std::sync::{Arc, OnceLock};

use anyhow::anyhow;
use chrono::{DateTime, NaiveDate, Utc};
use regex::Regex;
use rocket::fairing::{Fairing, Info, Kind};
use rocket::figment::Figment;
use rocket::http::{Header, Status};
use rocket::request::Request;
use rocket::response::{self, Responder, Response};
use rocket::serde::json::Json;
use rocket::{catch, catchers, get, options, post, routes, Build, FromForm, Rocket, State};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::fetch::apod::{refresh, ApodClient};
use crate::generator::prompt::SeoBrief;
use crate::generator::{ContentGenerator, WorkSelection};
use crate::model::{Article, ArticleKind, ContentSource, RawContentItem};
use crate::store::{ArticleStore, HomePage, Paginated, RawContentStore, DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE};

const HOME_PER_CATEGORY: usize = 4;

/// Application state stored inside Rocket managed state.
#[derive(Clone)]
pub struct AppState {
    pub raw: RawContentStore,
    pub articles: ArticleStore,
    pub generator: Arc<ContentGenerator>,
    pub apod: ApodClient,
    /// Include internal error details in responses (development only).
    pub expose_errors: bool,
}

/// JSON error body: `{ status, error, message }`.
#[derive(Debug, Clone, Serialize)]
pub struct ApiError {
    pub status: u16,
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl ApiError {
    pub fn new(status: Status, error: impl Into<String>) -> Self {
        Self {
            status: status.code,
            error: error.into(),
            message: None,
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn bad_request(error: impl Into<String>) -> Self {
        Self::new(Status::BadRequest, error)
    }

    pub fn not_found(error: impl Into<String>) -> Self {
        Self::new(Status::NotFound, error)
    }

    /// Details are only attached when the server runs with `expose_errors`.
    fn upstream(status: Status, error: &str, cause: &anyhow::Error, expose: bool) -> Self {
        error!(%status, error = %format!("{:#}", cause), "{}", error);
        let api = Self::new(status, error);
        if expose {
            api.with_message(format!("{:#}", cause))
        } else {
            api
        }
    }

    fn internal(cause: &anyhow::Error, expose: bool) -> Self {
        Self::upstream(Status::InternalServerError, "Internal server error", cause, expose)
    }
}

impl<'r> Responder<'r, 'static> for ApiError {
    fn respond_to(self, req: &'r Request<'_>) -> response::Result<'static> {
        let status = Status::from_code(self.status).unwrap_or(Status::InternalServerError);
        Response::build_from(Json(self).respond_to(req)?)
            .status(status)
            .ok()
    }
}

type ApiResult<T> = Result<Json<T>, ApiError>;

/// Permissive CORS headers on every response.
pub struct Cors;

#[rocket::async_trait]
impl Fairing for Cors {
    fn info(&self) -> Info {
        Info {
            name: "CORS headers",
            kind: Kind::Response,
        }
    }

    async fn on_response<'r>(&self, _req: &'r Request<'_>, res: &mut Response<'r>) {
        res.set_header(Header::new("Access-Control-Allow-Origin", "*"));
        res.set_header(Header::new("Access-Control-Allow-Methods", "GET, POST, OPTIONS"));
        res.set_header(Header::new("Access-Control-Allow-Headers", "Content-Type, Authorization"));
    }
}

#[options("/<_..>")]
fn preflight() -> Status {
    Status::NoContent
}

#[catch(default)]
fn default_catcher(status: Status, _req: &Request<'_>) -> ApiError {
    ApiError::new(status, status.reason_lossy())
}

#[get("/health")]
async fn health() -> &'static str {
    "OK"
}

#[get("/articles?<page>&<limit>")]
async fn list_articles(
    state: &State<AppState>,
    page: Option<usize>,
    limit: Option<usize>,
) -> ApiResult<Paginated<Article>> {
    state
        .articles
        .list_all(page, limit)
        .await
        .map(Json)
        .map_err(|e| ApiError::internal(&e, state.expose_errors))
}

#[get("/articles/latest?<limit>")]
async fn latest_articles(state: &State<AppState>, limit: Option<usize>) -> ApiResult<Vec<Article>> {
    let limit = limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE);
    state
        .articles
        .latest(limit)
        .await
        .map(Json)
        .map_err(|e| ApiError::internal(&e, state.expose_errors))
}

#[get("/articles/home?<per_category>")]
async fn home(state: &State<AppState>, per_category: Option<usize>) -> ApiResult<HomePage> {
    let per_category = per_category.unwrap_or(HOME_PER_CATEGORY).clamp(1, MAX_PAGE_SIZE);
    state
        .articles
        .home(per_category)
        .await
        .map(Json)
        .map_err(|e| ApiError::internal(&e, state.expose_errors))
}

#[get("/articles/slug/<slug>")]
async fn article_by_slug(state: &State<AppState>, slug: &str) -> ApiResult<Article> {
    match state.articles.find_by_slug(slug).await {
        Ok(Some(article)) => Ok(Json(article)),
        Ok(None) => Err(ApiError::not_found("Article not found")),
        Err(e) => Err(ApiError::internal(&e, state.expose_errors)),
    }
}

#[get("/articles/category/<category>?<page>&<limit>")]
async fn articles_by_category(
    state: &State<AppState>,
    category: &str,
    page: Option<usize>,
    limit: Option<usize>,
) -> ApiResult<Paginated<Article>> {
    state
        .articles
        .by_category(category, page, limit)
        .await
        .map(Json)
        .map_err(|e| ApiError::internal(&e, state.expose_errors))
}

#[derive(Debug, FromForm)]
struct SearchParams {
    q: Option<String>,
    category: Option<String>,
    #[field(name = "type")]
    kind: Option<String>,
    page: Option<usize>,
    limit: Option<usize>,
}

#[get("/articles/search?<params..>")]
async fn search_articles(state: &State<AppState>, params: SearchParams) -> ApiResult<Paginated<Article>> {
    let query = params.q.as_deref().map(str::trim).unwrap_or_default();
    if query.is_empty() {
        return Err(ApiError::bad_request("Search query is required"));
    }
    let kind = match params.kind.as_deref().filter(|k| !k.is_empty()) {
        Some(raw) => Some(
            raw.parse::<ArticleKind>()
                .map_err(|e| ApiError::bad_request("Invalid article type").with_message(e.to_string()))?,
        ),
        None => None,
    };
    let category = params.category.as_deref().filter(|c| !c.is_empty());

    state
        .articles
        .search(query, category, kind, params.page, params.limit)
        .await
        .map(Json)
        .map_err(|e| ApiError::internal(&e, state.expose_errors))
}

#[get("/articles/<id>")]
async fn article_by_id(state: &State<AppState>, id: &str) -> ApiResult<Article> {
    match state.articles.get_by_id(id).await {
        Ok(Some(article)) => Ok(Json(article)),
        Ok(None) => Err(ApiError::not_found("Article not found")),
        Err(e) => Err(ApiError::internal(&e, state.expose_errors)),
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReprocessRequest {
    #[serde(default)]
    pub date: Option<String>,
    #[serde(default)]
    pub generate_seo_article: bool,
    #[serde(default)]
    pub seo_article_config: Option<SeoBrief>,
}

#[derive(Debug, Serialize)]
pub struct ReprocessAccepted {
    pub message: String,
    pub date: NaiveDate,
    pub status: &'static str,
    pub timestamp: DateTime<Utc>,
}

/// `YYYY-MM-DD`, a real calendar day, and not after `today`.
pub fn parse_reprocess_date(raw: &str, today: NaiveDate) -> Result<NaiveDate, ApiError> {
    static DATE_RE: OnceLock<Regex> = OnceLock::new();
    let re = DATE_RE.get_or_init(|| Regex::new(r"^\d{4}-\d{2}-\d{2}$").unwrap());

    if !re.is_match(raw) {
        return Err(ApiError::bad_request("Invalid date format. Use YYYY-MM-DD"));
    }
    let date = NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .map_err(|_| ApiError::bad_request("Invalid date format. Use YYYY-MM-DD"))?;
    if date > today {
        return Err(ApiError::bad_request("Date cannot be in the future"));
    }
    Ok(date)
}

/// Existing content for the date: the API item first, then the RSS mirror.
async fn find_existing(raw: &RawContentStore, date: NaiveDate) -> anyhow::Result<Option<RawContentItem>> {
    for source in [ContentSource::Apod, ContentSource::ApodRss] {
        if let Some(item) = raw.find_by_source_date(source, date, None).await?.into_iter().next() {
            return Ok(Some(item));
        }
    }
    Ok(None)
}

#[post("/api/reprocess", format = "json", data = "<body>")]
async fn reprocess(
    state: &State<AppState>,
    body: Json<ReprocessRequest>,
) -> Result<(Status, Json<ReprocessAccepted>), ApiError> {
    let request = body.into_inner();
    let raw_date = request
        .date
        .as_deref()
        .ok_or_else(|| ApiError::bad_request("Missing required parameter: date"))?;
    let date = parse_reprocess_date(raw_date.trim(), Utc::now().date_naive())?;

    let existing = find_existing(&state.raw, date)
        .await
        .map_err(|e| ApiError::internal(&e, state.expose_errors))?
        .ok_or_else(|| ApiError::not_found("No content found for this date"))?;

    let fresh = state
        .apod
        .fetch_item(Some(date))
        .await
        .map_err(|e| ApiError::upstream(Status::BadGateway, "Failed to fetch NASA data", &e, state.expose_errors))?;
    let refreshed = refresh(&existing, fresh);
    state
        .raw
        .put(&refreshed)
        .await
        .map_err(|e| ApiError::internal(&e, state.expose_errors))?;

    let brief = request.seo_article_config.filter(|_| request.generate_seo_article);
    let selection = WorkSelection::Single {
        content_id: refreshed.content_id.clone(),
        source: refreshed.source,
        bypass_status: true,
        brief,
    };

    let generator = state.generator.clone();
    let content_id = refreshed.content_id.clone();
    tokio::spawn(async move {
        match generator.run(selection).await {
            Ok(report) => info!(%content_id, processed = report.processed, errors = report.errors, "reprocess finished"),
            Err(e) => warn!(%content_id, error = %format!("{:#}", e), "reprocess failed"),
        }
    });

    info!(%date, content_id = %refreshed.content_id, "reprocess accepted");
    Ok((
        Status::Accepted,
        Json(ReprocessAccepted {
            message: "Reprocessing started".to_string(),
            date,
            status: "processing",
            timestamp: Utc::now(),
        }),
    ))
}

/// Assemble the Rocket instance without launching it.
pub fn build_rocket(state: AppState, figment: Figment) -> Rocket<Build> {
    rocket::custom(figment)
        .manage(state)
        .attach(Cors)
        .mount(
            "/",
            routes![
                health,
                preflight,
                list_articles,
                latest_articles,
                home,
                article_by_slug,
                articles_by_category,
                search_articles,
                article_by_id,
                reprocess,
            ],
        )
        .register("/", catchers![default_catcher])
}

/// Launch the HTTP server on `bind:port`, blocking until it shuts down.
pub async fn launch(state: AppState, bind: Option<&str>, port: Option<u16>) -> anyhow::Result<()> {
    let mut fig = rocket::Config::figment();
    if let Some(bind) = bind {
        fig = fig.merge(("address", bind.to_string()));
    }
    if let Some(port) = port {
        fig = fig.merge(("port", port));
    }

    info!("Starting Rocket HTTP server");
    build_rocket(state, fig)
        .launch()
        .await
        .map_err(|e| anyhow!("Rocket failed: {}", e))?;

    info!("Rocket HTTP server has shut down");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn reprocess_date_rules() {
        let today = day(2025, 1, 7);
        assert_eq!(parse_reprocess_date("2025-01-07", today).unwrap(), today);
        assert_eq!(parse_reprocess_date("2024-12-31", today).unwrap(), day(2024, 12, 31));

        let future = parse_reprocess_date("2099-01-01", today).unwrap_err();
        assert_eq!(future.status, 400);
        assert_eq!(future.error, "Date cannot be in the future");

        for bad in ["2025-1-7", "07.01.2025", "2025-02-30", ""] {
            assert_eq!(parse_reprocess_date(bad, today).unwrap_err().status, 400, "{}", bad);
        }
    }

    #[test]
    fn api_error_body_hides_missing_message() {
        let body = serde_json::to_value(ApiError::not_found("Article not found")).unwrap();
        assert_eq!(body, serde_json::json!({"status": 404, "error": "Article not found"}));
    }
}
