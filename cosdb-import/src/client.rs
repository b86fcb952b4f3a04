//! Backend client for the bulk import endpoints
//!
//! [`ImportApi`] is the seam between the page logic and the transport.
//! [`HttpImportClient`] is the reqwest implementation; tests substitute
//! scripted implementations.

use async_trait::async_trait;
use cosdb_common::api::{
    ApiErrorBody, ImportJob, ImportKind, StartImportResponse, VerifyKeyRequest, VerifyKeyResponse,
};
use cosdb_common::config::ClientConfig;
use reqwest::multipart::{Form, Part};
use reqwest::{RequestBuilder, Response, StatusCode};
use std::time::Duration;

use crate::error::{ImportError, ImportResult};

const USER_AGENT: &str = concat!("cosdb-import/", env!("CARGO_PKG_VERSION"));

const VERIFY_KEY_PATH: &str = "/videos/import/verify-key/";
const START_IMPORT_PATH: &str = "/videos/import/start/";
const STATUS_PATH: &str = "/videos/import/status";
const TEMPLATE_PATH: &str = "/videos/import/template/";

/// Header carrying the import credential on status and template requests
pub const UPLOAD_KEY_HEADER: &str = "X-Upload-Key";

/// One file submission
#[derive(Debug, Clone)]
pub struct ImportRequest {
    pub file_name: String,
    pub contents: Vec<u8>,
    pub kind: ImportKind,
    pub validate_only: bool,
    pub upload_key: String,
}

/// Operations the import page needs from the backend
#[async_trait]
pub trait ImportApi: Send + Sync {
    /// Exchange a shared secret for an import credential
    async fn verify_key(&self, key: &str) -> ImportResult<VerifyKeyResponse>;

    /// Upload a file; returns the server job id
    async fn start_import(&self, request: ImportRequest) -> ImportResult<StartImportResponse>;

    /// Fetch the current state of a job
    async fn fetch_status(&self, task_id: &str, credential: &str) -> ImportResult<ImportJob>;

    /// Fetch the template document for a kind
    async fn download_template(&self, kind: ImportKind, credential: &str)
        -> ImportResult<Vec<u8>>;
}

/// reqwest-backed [`ImportApi`]
#[derive(Debug, Clone)]
pub struct HttpImportClient {
    http: reqwest::Client,
    base_url: String,
    access_token: Option<String>,
}

impl HttpImportClient {
    pub fn new(
        base_url: impl Into<String>,
        access_token: Option<String>,
        timeout: Duration,
    ) -> ImportResult<Self> {
        let http = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()
            .map_err(|e| ImportError::Network(e.to_string()))?;

        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            access_token,
        })
    }

    pub fn from_config(config: &ClientConfig) -> ImportResult<Self> {
        Self::new(
            config.api_url.clone(),
            config.access_token.clone(),
            config.request_timeout,
        )
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn authorize(&self, builder: RequestBuilder) -> RequestBuilder {
        match &self.access_token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    /// Map non-success statuses to errors, carrying the backend message
    async fn check(response: Response) -> ImportResult<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ApiErrorBody>(&body)
            .ok()
            .and_then(ApiErrorBody::into_message)
            .unwrap_or_else(|| {
                status
                    .canonical_reason()
                    .unwrap_or("request failed")
                    .to_string()
            });

        tracing::debug!(status = status.as_u16(), %message, "Backend returned error status");

        match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                Err(ImportError::Unauthorized(message))
            }
            _ => Err(ImportError::Rejected {
                status: status.as_u16(),
                message,
            }),
        }
    }
}

/// Content type for the uploaded spreadsheet, by extension
fn spreadsheet_mime(file_name: &str) -> &'static str {
    let lower = file_name.to_ascii_lowercase();
    if lower.ends_with(".csv") {
        "text/csv"
    } else if lower.ends_with(".xlsx") {
        "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet"
    } else if lower.ends_with(".xls") {
        "application/vnd.ms-excel"
    } else {
        "application/octet-stream"
    }
}

#[async_trait]
impl ImportApi for HttpImportClient {
    async fn verify_key(&self, key: &str) -> ImportResult<VerifyKeyResponse> {
        tracing::debug!(key_len = key.len(), "Verifying upload key");

        let body = VerifyKeyRequest {
            upload_key: key.to_string(),
        };
        let response = self
            .authorize(self.http.post(self.url(VERIFY_KEY_PATH)))
            .json(&body)
            .send()
            .await?;

        // A rejected key may come back as 4xx with a `{valid: false}` body
        let status = response.status();
        if status.is_client_error() && status != StatusCode::NOT_FOUND {
            let text = response.text().await.unwrap_or_default();
            if let Ok(parsed) = serde_json::from_str::<VerifyKeyResponse>(&text) {
                return Ok(parsed);
            }
            let message = serde_json::from_str::<ApiErrorBody>(&text)
                .ok()
                .and_then(ApiErrorBody::into_message)
                .unwrap_or_else(|| "invalid upload key".to_string());
            return Ok(VerifyKeyResponse {
                valid: false,
                token: None,
                message: Some(message),
            });
        }

        let response = Self::check(response).await?;
        Ok(response.json::<VerifyKeyResponse>().await?)
    }

    async fn start_import(&self, request: ImportRequest) -> ImportResult<StartImportResponse> {
        tracing::debug!(
            file = %request.file_name,
            bytes = request.contents.len(),
            kind = %request.kind,
            validate_only = request.validate_only,
            "Submitting import file"
        );

        let mime = spreadsheet_mime(&request.file_name);
        let part = Part::bytes(request.contents)
            .file_name(request.file_name)
            .mime_str(mime)?;
        let form = Form::new()
            .part("file", part)
            .text("import_type", request.kind.as_str())
            .text("validate_only", if request.validate_only { "true" } else { "false" })
            .text("upload_key", request.upload_key);

        let response = self
            .authorize(self.http.post(self.url(START_IMPORT_PATH)))
            .multipart(form)
            .send()
            .await?;
        let response = Self::check(response).await?;
        Ok(response.json::<StartImportResponse>().await?)
    }

    async fn fetch_status(&self, task_id: &str, credential: &str) -> ImportResult<ImportJob> {
        let url = self.url(&format!("{}/{}/", STATUS_PATH, task_id));
        let response = self
            .authorize(self.http.get(url))
            .header(UPLOAD_KEY_HEADER, credential)
            .send()
            .await?;
        let response = Self::check(response).await?;
        Ok(response.json::<ImportJob>().await?)
    }

    async fn download_template(
        &self,
        kind: ImportKind,
        credential: &str,
    ) -> ImportResult<Vec<u8>> {
        let response = self
            .authorize(self.http.get(self.url(TEMPLATE_PATH)))
            .query(&[("type", kind.as_str())])
            .header(UPLOAD_KEY_HEADER, credential)
            .send()
            .await?;
        let response = Self::check(response).await?;
        Ok(response.bytes().await?.to_vec())
    }
}
