//! Client for the external citizen/document centralizer.
//!
//! Any HTTP answer to `authenticateDocument` is a [`BusinessOutcome`], whatever
//! its status. Only failures to obtain an answer are [`TransportFailure`]s;
//! they are the one thing allowed to drive a requeue.

use std::future::Future;
use std::time::Duration;

use docauth_types::centralizer::{STATUS_NO_CONTENT, STATUS_OK};
use docauth_types::{BusinessOutcome, CitizenLookup};
use reqwest::Client as ReqwestClient;
use serde_json::{Value, json};

const VALIDATE_CITIZEN_PATH: &str = "/apis/validateCitizen";
const AUTHENTICATE_DOCUMENT_PATH: &str = "/apis/authenticateDocument";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportFailure {
    #[error("request to {url} failed: timeout after {timeout_secs}s")]
    Timeout { url: String, timeout_secs: u64 },

    #[error("request to {url} failed: {reason}")]
    Request { url: String, reason: String },

    #[error("unexpected status {status} from {url}")]
    UnexpectedStatus { url: String, status: u16 },

    #[error("failed to read response from {url}: {reason}")]
    Body { url: String, reason: String },
}

/// The two centralizer capabilities the proxy depends on.
///
/// Neither retries; retry policy belongs to the consumer's requeue.
pub trait Centralizer: Send + Sync + 'static {
    fn validate_citizen(
        &self,
        id_citizen: i64,
    ) -> impl Future<Output = Result<CitizenLookup, TransportFailure>> + Send;

    fn authenticate_document(
        &self,
        id_citizen: i64,
        url_document: &str,
        document_title: &str,
    ) -> impl Future<Output = Result<BusinessOutcome, TransportFailure>> + Send;
}

#[derive(Debug, Clone)]
pub struct HttpCentralizer {
    client: ReqwestClient,
    base_url: String,
    timeout: Duration,
}

impl HttpCentralizer {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = ReqwestClient::builder().timeout(timeout).build()?;
        Ok(Self::with_client(client, base_url, timeout))
    }

    fn with_client(client: ReqwestClient, base_url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            timeout,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn send_failure(&self, url: &str, err: reqwest::Error) -> TransportFailure {
        if err.is_timeout() {
            TransportFailure::Timeout {
                url: url.to_string(),
                timeout_secs: self.timeout.as_secs(),
            }
        } else {
            TransportFailure::Request {
                url: url.to_string(),
                reason: err.to_string(),
            }
        }
    }
}

impl Centralizer for HttpCentralizer {
    async fn validate_citizen(&self, id_citizen: i64) -> Result<CitizenLookup, TransportFailure> {
        let url = format!("{}/{}", self.url(VALIDATE_CITIZEN_PATH), id_citizen);

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| self.send_failure(&url, e))?;

        let status = response.status().as_u16();
        match status {
            STATUS_OK => {
                let body = response
                    .text()
                    .await
                    .map_err(|e| self.send_failure(&url, e))?;
                Ok(CitizenLookup {
                    exists: true,
                    status_code: status,
                    data: serde_json::from_str(&body).ok(),
                })
            }
            STATUS_NO_CONTENT => Ok(CitizenLookup {
                exists: false,
                status_code: status,
                data: None,
            }),
            _ => {
                tracing::warn!(url = %url, status, "Unexpected status from validateCitizen");
                Err(TransportFailure::UnexpectedStatus { url, status })
            }
        }
    }

    async fn authenticate_document(
        &self,
        id_citizen: i64,
        url_document: &str,
        document_title: &str,
    ) -> Result<BusinessOutcome, TransportFailure> {
        let url = self.url(AUTHENTICATE_DOCUMENT_PATH);
        let body = json!({
            "idCitizen": id_citizen,
            "UrlDocument": url_document,
            "documentTitle": document_title,
        });

        let response = self
            .client
            .put(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| self.send_failure(&url, e))?;

        let status = response.status().as_u16();
        let message = response.text().await.map_err(|e| match self.send_failure(&url, e) {
            TransportFailure::Request { url, reason } => TransportFailure::Body { url, reason },
            other => other,
        })?;
        let data = serde_json::from_str::<Value>(&message).ok();

        tracing::debug!(url = %url, status, "authenticateDocument answered");

        Ok(BusinessOutcome {
            success: status == STATUS_OK,
            status_code: status,
            message,
            data,
        })
    }
}
