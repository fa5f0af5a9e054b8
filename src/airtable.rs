//! Airtable REST adapter (API v0).
//! Implements [`RecordStore`] over `https://api.airtable.com/v0/{base}/{table}`.
//! Auth is a static bearer token; requests carry the configured timeout.
//! No retries: a create that times out may still have landed remotely.

use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode, Url};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::store::{Fields, Query, Record, RecordStore, StoreError};

const API_VERSION: &str = "v0";

// *************** Request/Response Types ***************

#[derive(Serialize)]
struct FieldsBody {
    fields: Fields,
}

#[derive(Deserialize)]
struct ListResponse {
    records: Vec<Record>,
}

#[derive(Deserialize)]
struct ErrorResponse {
    error: ErrorBody,
}

/// Airtable reports errors either as an object or as a bare type string.
#[derive(Deserialize)]
#[serde(untagged)]
enum ErrorBody {
    Detailed {
        #[serde(rename = "type")]
        kind: String,
        #[serde(default)]
        message: Option<String>,
    },
    Kind(String),
}

// *************** Public API ***************

/// One Airtable base reached over HTTPS.
pub struct AirtableStore {
    client: Client,
    api_url: Url,
    api_key: String,
    base_id: String,
}

impl AirtableStore {
    pub fn new(
        api_url: &str,
        api_key: &str,
        base_id: &str,
        timeout: Duration,
    ) -> Result<Self, StoreError> {
        let api_url =
            Url::parse(api_url).map_err(|e| StoreError::InvalidUrl(format!("{api_url}: {e}")))?;
        if api_url.cannot_be_a_base() {
            return Err(StoreError::InvalidUrl(api_url.to_string()));
        }
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            api_url,
            api_key: api_key.to_string(),
            base_id: base_id.to_string(),
        })
    }

    /// Builds `{api_url}/v0/{base}/{table}[/{id}]` with each segment percent-encoded.
    fn table_url(&self, table: &str, record_id: Option<&str>) -> Result<Url, StoreError> {
        let mut url = self.api_url.clone();
        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|_| StoreError::InvalidUrl(self.api_url.to_string()))?;
            segments
                .pop_if_empty()
                .extend([API_VERSION, self.base_id.as_str(), table]);
            if let Some(id) = record_id {
                segments.push(id);
            }
        }
        Ok(url)
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        self.client
            .request(method, url)
            .bearer_auth(&self.api_key)
            .header(reqwest::header::ACCEPT, "application/json")
    }
}

#[async_trait]
impl RecordStore for AirtableStore {
    async fn select_first(
        &self,
        table: &str,
        query: &Query,
    ) -> Result<Option<Record>, StoreError> {
        let url = self.table_url(table, None)?;
        let response = self
            .request(Method::GET, url)
            .query(&[
                ("maxRecords", "1"),
                ("view", query.view.as_str()),
                ("filterByFormula", query.filter_formula.as_str()),
            ])
            .send()
            .await?;
        let list: ListResponse = decode(check_status(response).await?).await?;
        Ok(list.records.into_iter().next())
    }

    async fn find(&self, table: &str, id: &str) -> Result<Record, StoreError> {
        let url = self.table_url(table, Some(id))?;
        let response = self.request(Method::GET, url).send().await?;
        let response = check_record_status(response, table, id).await?;
        decode(response).await
    }

    async fn create(&self, table: &str, fields: Fields) -> Result<Record, StoreError> {
        let url = self.table_url(table, None)?;
        let response = self
            .request(Method::POST, url)
            .json(&FieldsBody { fields })
            .send()
            .await?;
        decode(check_status(response).await?).await
    }

    async fn update(
        &self,
        table: &str,
        id: &str,
        fields: Fields,
    ) -> Result<Record, StoreError> {
        let url = self.table_url(table, Some(id))?;
        let response = self
            .request(Method::PATCH, url)
            .json(&FieldsBody { fields })
            .send()
            .await?;
        let response = check_record_status(response, table, id).await?;
        decode(response).await
    }
}

// *************** Internal Functions ***************

async fn check_status(response: Response) -> Result<Response, StoreError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(StoreError::Status {
        status: status.as_u16(),
        message: error_message(&body),
    })
}

/// Like [`check_status`], but a 404 on a single record becomes [`StoreError::NotFound`].
async fn check_record_status(
    response: Response,
    table: &str,
    id: &str,
) -> Result<Response, StoreError> {
    if response.status() == StatusCode::NOT_FOUND {
        return Err(StoreError::NotFound {
            table: table.to_string(),
            id: id.to_string(),
        });
    }
    check_status(response).await
}

async fn decode<T: for<'de> Deserialize<'de>>(response: Response) -> Result<T, StoreError> {
    let body = response.bytes().await?;
    parse_body(&body)
}

fn parse_body<T: for<'de> Deserialize<'de>>(body: &[u8]) -> Result<T, StoreError> {
    serde_json::from_slice(body).map_err(|e| StoreError::Decode(e.to_string()))
}

/// Pulls a readable message out of an Airtable error body, falling back to the raw text.
fn error_message(body: &str) -> String {
    match serde_json::from_str::<ErrorResponse>(body) {
        Ok(ErrorResponse {
            error: ErrorBody::Detailed {
                kind,
                message: Some(message),
            },
        }) => format!("{kind}: {message}"),
        Ok(ErrorResponse {
            error: ErrorBody::Detailed { kind, message: None },
        }) => kind,
        Ok(ErrorResponse {
            error: ErrorBody::Kind(kind),
        }) => kind,
        Err(_) => body.trim().to_string(),
    }
}

// *************** Tests ***************
