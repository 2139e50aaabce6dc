//! countries-api — client for the public countries-with-states lookup.
//!
//! Purpose
//! - Feed the country and state pickers of the profile form.
//! - Lookup failures never block the form: `countries()` and `states_for()`
//!   log the error and answer with an empty list.
//!
//! API
//! - `CountriesClient::remote(url, ttl)` / `CountriesClient::fixture(json)`
//! - `fetch()` → `Result<Vec<Country>, LookupError>` for callers that care
//! - `countries()` / `states_for(name)` → plain lists, empty on failure
//!
//! Notes
//! - Successful remote responses are cached in memory for `ttl`.
//! - A fixture client serves a fixed envelope without touching the network
//!   (dev and tests).

use serde::{Deserialize, Serialize};
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Public endpoint used when no URL is configured.
pub const DEFAULT_URL: &str = "https://countriesnow.space/api/v0.1/countries/states";
pub const DEFAULT_TTL: Duration = Duration::from_secs(60 * 60);
const HTTP_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Country {
    pub name: String,
    #[serde(default)]
    pub states: Vec<State>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct State {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state_code: Option<String>,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum LookupError {
    #[error("network error: {0}")]
    Network(String),
    #[error("unexpected http status {0}")]
    Status(u16),
    #[error("invalid payload: {0}")]
    Decode(String),
    #[error("lookup api reported an error: {0}")]
    Api(String),
    #[error("http client setup failed: {0}")]
    Client(String),
}

#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(default)]
    error: bool,
    #[serde(default)]
    msg: String,
    #[serde(default)]
    data: Vec<Country>,
}

/// Decode the `{error, msg, data}` envelope returned by the lookup API.
pub fn parse_envelope(body: &str) -> Result<Vec<Country>, LookupError> {
    let env: Envelope = serde_json::from_str(body).map_err(|e| LookupError::Decode(e.to_string()))?;
    if env.error {
        return Err(LookupError::Api(env.msg));
    }
    Ok(env.data)
}

/// States of the country named exactly `name`, or empty when unknown.
pub fn states_of(countries: &[Country], name: &str) -> Vec<State> {
    countries
        .iter()
        .find(|c| c.name == name)
        .map(|c| c.states.clone())
        .unwrap_or_default()
}

enum Source {
    Remote {
        url: String,
        http: reqwest::Client,
        ttl: Duration,
    },
    Fixture(Vec<Country>),
}

struct Cache {
    fetched_at: Option<Instant>,
    countries: Vec<Country>,
}

impl Cache {
    fn fresh(&self, ttl: Duration, now: Instant) -> Option<&[Country]> {
        match self.fetched_at {
            Some(at) if now.duration_since(at) < ttl => Some(&self.countries),
            _ => None,
        }
    }
}

pub struct CountriesClient {
    source: Source,
    cache: Mutex<Cache>,
}

impl CountriesClient {
    /// Client for the HTTP endpoint at `url`, caching successes for `ttl`.
    pub fn remote(url: impl Into<String>, ttl: Duration) -> Result<Self, LookupError> {
        let http = reqwest::Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()
            .map_err(|e| LookupError::Client(e.to_string()))?;
        Ok(Self::with_source(Source::Remote {
            url: url.into(),
            http,
            ttl,
        }))
    }

    /// Client serving a fixed envelope (same shape as the API response).
    pub fn fixture(envelope_json: &str) -> Result<Self, LookupError> {
        Ok(Self::with_source(Source::Fixture(parse_envelope(envelope_json)?)))
    }

    fn with_source(source: Source) -> Self {
        Self {
            source,
            cache: Mutex::new(Cache {
                fetched_at: None,
                countries: Vec::new(),
            }),
        }
    }

    /// Fetch the country list, serving from cache while it is fresh.
    pub async fn fetch(&self) -> Result<Vec<Country>, LookupError> {
        let (url, http, ttl) = match &self.source {
            Source::Fixture(countries) => return Ok(countries.clone()),
            Source::Remote { url, http, ttl } => (url, http, *ttl),
        };

        if let Ok(cache) = self.cache.lock() {
            if let Some(hit) = cache.fresh(ttl, Instant::now()) {
                return Ok(hit.to_vec());
            }
        }

        // Fetch outside the lock
        let countries = fetch_remote(http, url).await?;
        debug!(count = countries.len(), "country list fetched");
        if let Ok(mut cache) = self.cache.lock() {
            cache.countries = countries.clone();
            cache.fetched_at = Some(Instant::now());
        }
        Ok(countries)
    }

    /// Country list for the picker; empty when the lookup fails.
    pub async fn countries(&self) -> Vec<Country> {
        match self.fetch().await {
            Ok(list) => list,
            Err(e) => {
                warn!(error = %e, "country lookup failed; serving empty list");
                Vec::new()
            }
        }
    }

    /// States of `country` for the picker; empty when unknown or on failure.
    pub async fn states_for(&self, country: &str) -> Vec<State> {
        states_of(&self.countries().await, country)
    }
}

async fn fetch_remote(http: &reqwest::Client, url: &str) -> Result<Vec<Country>, LookupError> {
    let resp = http
        .get(url)
        .send()
        .await
        .map_err(|e| LookupError::Network(e.to_string()))?;
    let status = resp.status();
    if !status.is_success() {
        return Err(LookupError::Status(status.as_u16()));
    }
    let body = resp
        .text()
        .await
        .map_err(|e| LookupError::Network(e.to_string()))?;
    parse_envelope(&body)
}
