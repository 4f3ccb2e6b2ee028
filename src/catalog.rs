use reqwest::StatusCode;
use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use serde::{Deserialize, Serialize};

use crate::domain::CatalogItemRef;
use crate::error::LabError;

pub const DEFAULT_BASE_URL: &str = "https://pokeapi.co/api/v2/";

/// One page of the catalog listing endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogPage {
    pub results: Vec<CatalogItemRef>,
    #[serde(default)]
    pub count: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NamedResource {
    pub name: String,
    #[serde(default)]
    pub url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypeSlot {
    #[serde(default)]
    pub slot: Option<u32>,
    #[serde(rename = "type")]
    pub kind: NamedResource,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatSlot {
    pub base_stat: i64,
    #[serde(default)]
    pub effort: Option<i64>,
    pub stat: NamedResource,
}

/// The subset of a per-item detail response the pipeline reads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetailPayload {
    pub id: u64,
    pub name: String,
    #[serde(default)]
    pub types: Vec<TypeSlot>,
    #[serde(default)]
    pub stats: Vec<StatSlot>,
}

pub trait CatalogClient: Send + Sync {
    fn list(&self, limit: usize, offset: usize) -> Result<CatalogPage, LabError>;
    fn detail(&self, identifier: &str) -> Result<DetailPayload, LabError>;
}

/// Which response statuses count as success.
pub type StatusPredicate = fn(StatusCode) -> bool;

pub fn is_success_status(status: StatusCode) -> bool {
    status.is_success()
}

#[derive(Clone)]
pub struct CatalogHttpClient {
    client: Client,
    base_url: String,
    accept: StatusPredicate,
}

impl CatalogHttpClient {
    pub fn new(base_url: &str) -> Result<Self, LabError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("pokelab/{}", env!("CARGO_PKG_VERSION")))
                .map_err(|err| LabError::CatalogHttp(err.to_string()))?,
        );
        let client = Client::builder()
            .default_headers(headers)
            .build()
            .map_err(|err| LabError::CatalogHttp(err.to_string()))?;
        Ok(Self {
            client,
            base_url: normalize_base_url(base_url),
            accept: is_success_status,
        })
    }

    pub fn with_status_predicate(mut self, accept: StatusPredicate) -> Self {
        self.accept = accept;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn list_url(&self) -> String {
        format!("{}pokemon", self.base_url)
    }

    pub fn detail_url(&self, identifier: &str) -> String {
        format!("{}pokemon/{}", self.base_url, identifier)
    }

    fn handle_status(
        &self,
        response: reqwest::blocking::Response,
    ) -> Result<reqwest::blocking::Response, LabError> {
        if (self.accept)(response.status()) {
            return Ok(response);
        }
        let status = response.status().as_u16();
        let message = response
            .text()
            .unwrap_or_else(|_| "catalog request failed".to_string());
        Err(LabError::CatalogStatus { status, message })
    }
}

impl CatalogClient for CatalogHttpClient {
    fn list(&self, limit: usize, offset: usize) -> Result<CatalogPage, LabError> {
        let response = self
            .client
            .get(self.list_url())
            .query(&[("limit", limit), ("offset", offset)])
            .send()
            .map_err(|err| LabError::CatalogHttp(err.to_string()))?;
        let response = self.handle_status(response)?;
        response
            .json()
            .map_err(|err| LabError::CatalogDecode(err.to_string()))
    }

    fn detail(&self, identifier: &str) -> Result<DetailPayload, LabError> {
        let response = self
            .client
            .get(self.detail_url(identifier))
            .send()
            .map_err(|err| LabError::CatalogHttp(err.to_string()))?;
        let response = self.handle_status(response)?;
        response
            .json()
            .map_err(|err| LabError::CatalogDecode(err.to_string()))
    }
}

fn normalize_base_url(base_url: &str) -> String {
    let trimmed = base_url.trim();
    if trimmed.ends_with('/') {
        trimmed.to_string()
    } else {
        format!("{trimmed}/")
    }
}
