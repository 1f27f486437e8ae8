//! HTTP client for an algod node
//!
//! Fetches suggested transaction parameters and reads contract boxes
//! through the node's REST API.

use crate::config::AlgodConfig;
use crate::ledger::NetworkParamsSource;
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use boxsig_errors::{Error, Result};
use boxsig_log::debug;
use boxsig_types::{BoxName, SuggestedParams, DEFAULT_VALIDITY_WINDOW};
use reqwest::{Client as HttpClient, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use url::Url;

/// Header carrying the node API token
pub const API_TOKEN_HEADER: &str = "X-Algo-API-Token";

/// Response of `GET /v2/transactions/params`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct TransactionParamsResponse {
    pub consensus_version: String,
    /// Suggested fee per byte
    pub fee: u64,
    pub genesis_hash: String,
    pub genesis_id: String,
    pub last_round: u64,
    pub min_fee: u64,
}

impl From<TransactionParamsResponse> for SuggestedParams {
    fn from(resp: TransactionParamsResponse) -> Self {
        SuggestedParams {
            fee_per_byte: resp.fee,
            min_fee: resp.min_fee,
            first_valid: resp.last_round,
            last_valid: resp.last_round.saturating_add(DEFAULT_VALIDITY_WINDOW),
            genesis_id: resp.genesis_id,
            genesis_hash: resp.genesis_hash,
        }
    }
}

/// Response of `GET /v2/applications/{id}/box`
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct BoxResponse {
    pub round: Option<u64>,
    /// Base64 box name
    pub name: String,
    /// Base64 box value
    pub value: String,
}

/// Algod REST client
#[derive(Debug, Clone)]
pub struct AlgodClient {
    base_url: Url,
    token: String,
    http_client: HttpClient,
}

impl AlgodClient {
    /// Create a client for the configured node
    pub fn new(config: &AlgodConfig) -> Result<Self> {
        let base_url = Url::parse(&config.url)
            .map_err(|e| Error::Config(format!("invalid algod url {}:: {e}", config.url)))?;
        let http_client = HttpClient::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| Error::Config(format!("cannot build http client:: {e}")))?;

        Ok(Self {
            base_url,
            token: config.token.clone(),
            http_client,
        })
    }

    /// URL of the suggested parameters endpoint
    pub fn params_url(&self) -> Result<Url> {
        self.endpoint("/v2/transactions/params")
    }

    /// URL reading box `name` of application `app_id`
    pub fn box_url(&self, app_id: u64, name: &BoxName) -> Result<Url> {
        let mut url = self.endpoint(&format!("/v2/applications/{app_id}/box"))?;
        url.query_pairs_mut()
            .append_pair("name", &format!("b64:{}", STANDARD.encode(name.as_bytes())));
        Ok(url)
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        self.base_url
            .join(path)
            .map_err(|e| Error::Config(format!("invalid algod path {path}:: {e}")))
    }

    // None on 404
    async fn get_json<T>(&self, url: Url) -> Result<Option<T>>
    where
        T: for<'de> Deserialize<'de>,
    {
        debug!(%url, "algod request");
        let response = self
            .http_client
            .get(url)
            .header(API_TOKEN_HEADER, &self.token)
            .send()
            .await
            .map_err(request_error)?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(status_error(status, &body));
        }
        response.json().await.map(Some).map_err(request_error)
    }

    /// Fetch suggested parameters
    pub async fn transaction_params(&self) -> Result<TransactionParamsResponse> {
        self.get_json(self.params_url()?)
            .await?
            .ok_or_else(|| Error::rejected("transaction params endpoint not found"))
    }

    /// Read a contract box, `None` when it does not exist
    pub async fn application_box(&self, app_id: u64, name: &BoxName) -> Result<Option<Vec<u8>>> {
        let Some(resp) = self.get_json::<BoxResponse>(self.box_url(app_id, name)?).await? else {
            return Ok(None);
        };
        STANDARD
            .decode(resp.value)
            .map(Some)
            .map_err(|e| Error::EncodingError(format!("box value is not base64:: {e}")))
    }
}

#[async_trait]
impl NetworkParamsSource for AlgodClient {
    async fn suggested_params(&self) -> Result<SuggestedParams> {
        Ok(self.transaction_params().await?.into())
    }
}

fn request_error(err: reqwest::Error) -> Error {
    if err.is_timeout() || err.is_connect() {
        Error::transient(format!("algod unreachable:: {err}"))
    } else {
        Error::rejected(format!("algod request failed:: {err}"))
    }
}

fn status_error(status: StatusCode, body: &str) -> Error {
    let reason = format!("algod returned {status}:: {body}");
    if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
        Error::transient(reason)
    } else {
        Error::rejected(reason)
    }
}
