//! api-server — HTTP boundary for the profile registry.
//!
//! Exposes the user list operations (list, submit, edit, delete) and the
//! country/state lookups that feed the profile form. Supports local dev with:
//! - Storage: SQLite file (default, `sqlite` feature) or in-memory.
//! - Country lookup: remote endpoint with an in-memory cache, or a fixed
//!   envelope via `COUNTRIES_API_OVERRIDE`.
//! - CORS: Configurable via CORS_ALLOW_ORIGIN (origin string) for the form frontend.
//!
//! Run:
//! ```bash
//! # pretty logs (default); PORT optional
//! cargo run -p api-server
//!
//! # throwaway storage, JSON logs
//! STORAGE_PROVIDER=memory LOG_FORMAT=json cargo run -p api-server
//! ```
//!
//! Configuration: See `config.rs` for all environment variables.

mod config;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::http::HeaderValue;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use countries_api::CountriesClient;
use domain::adapters::memory_blob::InMemoryBlobStore;
use domain::service::UserService;
use domain::{BlobStore, CoreError, UserPatch, UserRecord};
use serde::Serialize;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

// Blob store chosen at startup: memory or sqlite (feature-gated).
enum AnyBlob {
    Memory(InMemoryBlobStore),
    #[cfg(feature = "sqlite")]
    Sqlite(sqlite_adapter::SqliteBlobStore),
}

impl BlobStore for AnyBlob {
    fn get(&self, key: &str) -> Result<Option<String>, CoreError> {
        match self {
            AnyBlob::Memory(b) => b.get(key),
            #[cfg(feature = "sqlite")]
            AnyBlob::Sqlite(b) => b.get(key),
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<(), CoreError> {
        match self {
            AnyBlob::Memory(b) => b.set(key, value),
            #[cfg(feature = "sqlite")]
            AnyBlob::Sqlite(b) => b.set(key, value),
        }
    }
}

#[derive(Clone)]
struct AppState {
    users: Arc<UserService<AnyBlob>>,
    countries: Arc<CountriesClient>,
}

#[tokio::main]
async fn main() {
    // Load and validate config first (fail fast on misconfiguration)
    let cfg = match config::Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            std::process::exit(1);
        }
    };

    init_tracing(&cfg);
    cfg.warn_if_ephemeral();
    info!("{}", domain::about());

    let users = match UserService::load(build_blob_store(&cfg)) {
        Ok(svc) => svc,
        Err(e) => {
            error!(err = %e, "failed to load stored users");
            std::process::exit(1);
        }
    };
    let countries = match build_countries_client(&cfg) {
        Ok(c) => c,
        Err(e) => {
            error!(err = %e, "failed to build country lookup client");
            std::process::exit(1);
        }
    };
    let state = AppState {
        users: Arc::new(users),
        countries: Arc::new(countries),
    };

    // Request ID header name
    let x_request_id = axum::http::HeaderName::from_static("x-request-id");

    let mut app = routes()
        .layer(PropagateRequestIdLayer::new(x_request_id.clone()))
        .layer(
            TraceLayer::new_for_http().make_span_with(|request: &axum::http::Request<_>| {
                let request_id = request
                    .headers()
                    .get("x-request-id")
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or("-");
                tracing::info_span!(
                    "http_request",
                    method = %request.method(),
                    uri = %request.uri(),
                    request_id = %request_id,
                )
            }),
        )
        .layer(SetRequestIdLayer::new(x_request_id, MakeRequestUuid))
        .with_state(state);

    // CORS - already validated in Config::from_env()
    let cors = if cfg.cors_allow_origin == HeaderValue::from_static("*") {
        CorsLayer::permissive()
    } else {
        CorsLayer::new()
            .allow_origin(AllowOrigin::list([cfg.cors_allow_origin]))
            .allow_methods([
                axum::http::Method::GET,
                axum::http::Method::POST,
                axum::http::Method::PATCH,
                axum::http::Method::DELETE,
                axum::http::Method::OPTIONS,
            ])
            .allow_headers([axum::http::header::CONTENT_TYPE])
    };
    app = app.layer(cors);

    let addr: SocketAddr = ([0, 0, 0, 0], cfg.port).into();
    info!(%addr, "api-server listening");
    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(l) => l,
        Err(e) => {
            error!(err = %e, %addr, "bind failed");
            std::process::exit(1);
        }
    };
    if let Err(e) = axum::serve(listener, app).await {
        error!(err = %e, "server error");
        std::process::exit(1);
    }
}

fn routes() -> Router<AppState> {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/api/users", get(list_users).post(create_user))
        .route("/api/users/validate", post(validate_user))
        .route(
            "/api/users/:email",
            axum::routing::patch(update_user).delete(delete_user),
        )
        .route("/api/countries", get(list_countries))
        .route("/api/countries/:name/states", get(list_states))
}

fn init_tracing(cfg: &config::Config) {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let registry = tracing_subscriber::registry().with(env_filter);
    match cfg.log_format {
        config::LogFormat::Json => {
            registry
                .with(
                    fmt::layer()
                        .json()
                        .with_target(true)
                        .with_timer(fmt::time::SystemTime)
                        .with_writer(std::io::stdout),
                )
                .init();
        }
        config::LogFormat::Pretty => {
            registry
                .with(
                    fmt::layer()
                        .pretty()
                        .with_target(true)
                        .with_writer(std::io::stdout),
                )
                .init();
        }
    }
}

// Construct the blob store based on config and feature flags.
fn build_blob_store(cfg: &config::Config) -> AnyBlob {
    match cfg.storage_provider {
        #[cfg(feature = "sqlite")]
        config::StorageProvider::Sqlite => {
            let opened = match &cfg.db_path {
                Some(path) => sqlite_adapter::SqliteBlobStore::open_creating_dirs(path),
                None => sqlite_adapter::SqliteBlobStore::from_env(),
            };
            match opened {
                Ok(b) => AnyBlob::Sqlite(b),
                Err(e) => {
                    warn!(err = %e, "failed to open SQLite blob store; falling back to memory");
                    AnyBlob::Memory(InMemoryBlobStore::new())
                }
            }
        }
        _ => AnyBlob::Memory(InMemoryBlobStore::new()),
    }
}

fn build_countries_client(
    cfg: &config::Config,
) -> Result<CountriesClient, countries_api::LookupError> {
    match &cfg.countries_override {
        Some(json) => CountriesClient::fixture(json),
        None => CountriesClient::remote(cfg.countries_api_url.clone(), cfg.countries_cache_ttl),
    }
}

fn error_response(err: CoreError) -> Response {
    let status =
        StatusCode::from_u16(http_common::status_for(&err)).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    if status.is_server_error() {
        error!(err = %err, "request failed");
    }
    (status, Json(http_common::error_body(&err))).into_response()
}

#[derive(Serialize)]
struct UsersOut {
    users: Vec<UserRecord>,
    total: usize,
}

#[derive(Serialize)]
struct ValidationOut {
    valid: bool,
    errors: domain::ValidationErrors,
}

#[derive(Serialize)]
struct CountriesOut {
    countries: Vec<countries_api::Country>,
}

#[derive(Serialize)]
struct StatesOut {
    states: Vec<countries_api::State>,
}

async fn healthz() -> &'static str {
    "ok"
}

async fn list_users(State(state): State<AppState>) -> Response {
    match state.users.list() {
        Ok(users) => {
            let total = users.len();
            Json(UsersOut { users, total }).into_response()
        }
        Err(e) => error_response(e),
    }
}

async fn create_user(
    State(state): State<AppState>,
    Json(body): Json<UserRecord>,
) -> Response {
    match state.users.submit(body) {
        Ok(user) => (StatusCode::CREATED, Json(user)).into_response(),
        Err(e) => error_response(e),
    }
}

async fn validate_user(
    State(state): State<AppState>,
    Json(body): Json<UserRecord>,
) -> Json<ValidationOut> {
    let errors = state.users.check(&body);
    Json(ValidationOut {
        valid: errors.is_empty(),
        errors,
    })
}

async fn update_user(
    State(state): State<AppState>,
    Path(email): Path<String>,
    Json(patch): Json<UserPatch>,
) -> Response {
    match state.users.edit(&email, &patch) {
        Ok(user) => Json(user).into_response(),
        Err(e) => error_response(e),
    }
}

async fn delete_user(State(state): State<AppState>, Path(email): Path<String>) -> Response {
    match state.users.remove(&email) {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => error_response(e),
    }
}

async fn list_countries(State(state): State<AppState>) -> Json<CountriesOut> {
    Json(CountriesOut {
        countries: state.countries.countries().await,
    })
}

async fn list_states(State(state): State<AppState>, Path(name): Path<String>) -> Json<StatesOut> {
    Json(StatesOut {
        states: state.countries.states_for(&name).await,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use tower::util::ServiceExt;

    const COUNTRIES: &str = r#"{"error": false, "msg": "ok", "data": [
        {"name": "India", "states": [{"name": "Kerala"}, {"name": "Goa"}]}
    ]}"#;

    fn app() -> Router {
        let state = AppState {
            users: Arc::new(UserService::load(AnyBlob::Memory(InMemoryBlobStore::new())).unwrap()),
            countries: Arc::new(CountriesClient::fixture(COUNTRIES).unwrap()),
        };
        routes().with_state(state)
    }

    fn user_json(email: &str, last: &str) -> String {
        serde_json::json!({
            "firstname": "Alice", "lastname": last, "email": email,
            "mobileNumber": "9876543210", "addressOne": "1 Main Street", "addressTwo": "",
            "country": "India", "state": "Kerala", "city": "Kochi", "zipcode": "682001"
        })
        .to_string()
    }

    fn json_req(method: &str, uri: &str, body: String) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body))
            .unwrap()
    }

    async fn body_json(resp: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    async fn get_json(router: &Router, uri: &str) -> serde_json::Value {
        let resp = router
            .clone()
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        body_json(resp).await
    }

    #[tokio::test]
    async fn submit_replace_edit_delete_flow() {
        let router = app();

        // Submit two users, then resubmit the first with a new last name
        for (email, last) in [("a@example.com", "Smith"), ("b@example.com", "Brown"), ("a@example.com", "Jones")] {
            let resp = router
                .clone()
                .oneshot(json_req("POST", "/api/users", user_json(email, last)))
                .await
                .unwrap();
            assert_eq!(resp.status(), StatusCode::CREATED);
        }

        let listed = get_json(&router, "/api/users").await;
        assert_eq!(listed["total"], 2);
        assert_eq!(listed["users"][0]["email"], "a@example.com");
        assert_eq!(listed["users"][0]["lastname"], "Jones");

        // Edit a single field
        let resp = router
            .clone()
            .oneshot(json_req(
                "PATCH",
                "/api/users/b@example.com",
                r#"{"city": "Panaji", "state": "Goa"}"#.to_string(),
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let edited = body_json(resp).await;
        assert_eq!(edited["city"], "Panaji");
        assert_eq!(edited["lastname"], "Brown");

        // Delete, twice
        for _ in 0..2 {
            let resp = router
                .clone()
                .oneshot(
                    Request::builder()
                        .method("DELETE")
                        .uri("/api/users/a@example.com")
                        .body(Body::empty())
                        .unwrap(),
                )
                .await
                .unwrap();
            assert_eq!(resp.status(), StatusCode::NO_CONTENT);
        }
        let listed = get_json(&router, "/api/users").await;
        assert_eq!(listed["total"], 1);
        assert_eq!(listed["users"][0]["email"], "b@example.com");
    }

    #[tokio::test]
    async fn invalid_submit_returns_field_errors() {
        let router = app();
        let body = serde_json::json!({"firstname": "Al", "email": "not-an-email", "zipcode": "1234"}).to_string();
        let resp = router
            .clone()
            .oneshot(json_req("POST", "/api/users", body))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let out = body_json(resp).await;
        assert_eq!(out["error"]["code"], "validation_failed");
        let fields = &out["error"]["fields"];
        assert_eq!(fields["firstname"], "firstname must be at least 5 characters");
        assert_eq!(fields["email"], "Invalid email format");
        assert_eq!(fields["zipcode"], "Invalid zipcode format");
        assert_eq!(fields["city"], "City is required");

        let listed = get_json(&router, "/api/users").await;
        assert_eq!(listed["total"], 0);
    }

    #[tokio::test]
    async fn validate_endpoint_does_not_store() {
        let router = app();
        let resp = router
            .clone()
            .oneshot(json_req("POST", "/api/users/validate", user_json("a@example.com", "Smith")))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let out = body_json(resp).await;
        assert_eq!(out["valid"], true);
        assert_eq!(out["errors"], serde_json::json!({}));
        assert_eq!(get_json(&router, "/api/users").await["total"], 0);
    }

    #[tokio::test]
    async fn edit_errors_map_to_status_codes() {
        let router = app();
        for email in ["a@example.com", "b@example.com"] {
            router
                .clone()
                .oneshot(json_req("POST", "/api/users", user_json(email, "Smith")))
                .await
                .unwrap();
        }

        let missing = router
            .clone()
            .oneshot(json_req("PATCH", "/api/users/ghost@example.com", "{}".to_string()))
            .await
            .unwrap();
        assert_eq!(missing.status(), StatusCode::NOT_FOUND);

        let invalid = router
            .clone()
            .oneshot(json_req(
                "PATCH",
                "/api/users/a@example.com",
                r#"{"mobileNumber": "12345"}"#.to_string(),
            ))
            .await
            .unwrap();
        assert_eq!(invalid.status(), StatusCode::BAD_REQUEST);

        let clash = router
            .clone()
            .oneshot(json_req(
                "PATCH",
                "/api/users/a@example.com",
                r#"{"email": "b@example.com"}"#.to_string(),
            ))
            .await
            .unwrap();
        assert_eq!(clash.status(), StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn country_and_state_lookups() {
        let router = app();
        let countries = get_json(&router, "/api/countries").await;
        assert_eq!(countries["countries"][0]["name"], "India");

        let states = get_json(&router, "/api/countries/India/states").await;
        assert_eq!(states["states"].as_array().unwrap().len(), 2);

        let none = get_json(&router, "/api/countries/Atlantis/states").await;
        assert_eq!(none["states"], serde_json::json!([]));
    }
}
