//! App store metadata lookup.

use crate::config::Config;
use anyhow::{Context, Result};
use reqwest::blocking::Client;
use std::time::Duration;

/// Store lookup keyed by bundle identifier and country.
pub trait StoreService: Send + Sync {
    /// Searches the store for the application, returning zero or more
    /// matching records.
    fn lookup(&self, bundle_id: &str, country: &str) -> Result<Vec<StoreResult>>;
}

/// One application record from the store.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreResult {
    /// Application title.
    #[serde(default)]
    pub track_name: String,
    /// Bundle identifier.
    #[serde(default)]
    pub bundle_id: String,
    /// Seller name.
    #[serde(default)]
    pub seller_name: String,
    /// Developer name.
    #[serde(default)]
    pub artist_name: String,
    /// Published version.
    #[serde(default)]
    pub version: String,
    /// Category names.
    #[serde(default)]
    pub genres: Vec<String>,
    /// Device models the application supports.
    #[serde(default)]
    pub supported_devices: Vec<String>,
    /// Price in the store currency.
    #[serde(default)]
    pub price: f64,
    /// Store currency code.
    #[serde(default)]
    pub currency: String,
    /// Average user rating, when the application has one.
    #[serde(default)]
    pub average_user_rating: Option<f64>,
    /// Icon URL.
    #[serde(default)]
    pub artwork_url_512: Option<String>,
}

/// Envelope of the store lookup endpoint.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LookupResponse {
    #[serde(default)]
    result_count: u32,
    #[serde(default)]
    results: Vec<StoreResult>,
}

/// Production store client, iTunes lookup shaped.
pub struct ITunesClient {
    client: Client,
    url: String,
}

impl ITunesClient {
    /// Creates a new client from the configuration.
    pub fn new(config: &Config) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout()))
            .build()
            .unwrap_or_else(|_| Client::new());

        Self {
            client,
            url: config.store_url().to_owned(),
        }
    }
}

impl StoreService for ITunesClient {
    fn lookup(&self, bundle_id: &str, country: &str) -> Result<Vec<StoreResult>> {
        let response: LookupResponse = self
            .client
            .get(&self.url)
            .query(&[
                ("bundleId", bundle_id),
                ("country", country),
                ("entity", "software"),
            ])
            .send()
            .context("the store lookup request failed")?
            .error_for_status()
            .context("the store rejected the lookup request")?
            .json()
            .context("could not decode the store lookup response")?;

        debug!(
            "the store returned {} records for {}",
            response.result_count, bundle_id
        );
        Ok(response.results)
    }
}
