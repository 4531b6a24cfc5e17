//! Memoria API client: a cloneable handle wrapping a `reqwest::Client` and
//! a base URL, built through a fluent builder. This service has no auth
//! surface (out of scope), so no `api_key`/`auth_header`
//! machinery is carried.

use reqwest::{Client, Response, StatusCode, Url};
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::instrument;

use crate::error::{ClientError, Result};
use crate::models::*;

#[derive(Clone)]
pub struct MemoriaClient {
    http: Client,
    base_url: Url,
}

impl std::fmt::Debug for MemoriaClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoriaClient")
            .field("base_url", &self.base_url)
            .finish()
    }
}

#[derive(Default)]
pub struct MemoriaClientBuilder {
    base_url: Option<String>,
    timeout: Option<Duration>,
    user_agent: Option<String>,
}

impl MemoriaClientBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn user_agent(mut self, agent: impl Into<String>) -> Self {
        self.user_agent = Some(agent.into());
        self
    }

    pub fn build(self) -> Result<MemoriaClient> {
        let base_url = self
            .base_url
            .unwrap_or_else(|| "http://localhost:8080".to_string());
        let base_url =
            Url::parse(&base_url).map_err(|e| ClientError::InvalidInput(e.to_string()))?;

        let timeout = self.timeout.unwrap_or(Duration::from_secs(60));
        let user_agent = self
            .user_agent
            .unwrap_or_else(|| format!("memoria-client/{}", env!("CARGO_PKG_VERSION")));

        let http = Client::builder()
            .timeout(timeout)
            .user_agent(user_agent)
            .build()?;

        Ok(MemoriaClient { http, base_url })
    }
}

impl MemoriaClient {
    pub fn builder() -> MemoriaClientBuilder {
        MemoriaClientBuilder::new()
    }

    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        Self::builder().base_url(base_url).build()
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn url(&self, path: &str) -> Result<Url> {
        self.base_url
            .join(path)
            .map_err(|e| ClientError::InvalidInput(e.to_string()))
    }

    async fn handle_response<T: DeserializeOwned>(&self, response: Response) -> Result<T> {
        let status = response.status();
        if status.is_success() {
            Ok(response.json().await?)
        } else {
            let body = response.text().await.unwrap_or_default();
            match status {
                StatusCode::NOT_FOUND => Err(ClientError::NotFound(body)),
                StatusCode::CONFLICT => Err(ClientError::Conflict(body)),
                _ => Err(ClientError::Api {
                    status: status.as_u16(),
                    message: body,
                }),
            }
        }
    }

    /// `POST /api/v1/upload`: one file plus the upload metadata envelope.
    #[instrument(skip(self, bytes))]
    pub async fn upload(
        &self,
        index: impl Into<String>,
        file_name: impl Into<String>,
        mime_type: impl Into<String>,
        bytes: Vec<u8>,
        metadata: UploadMetadata,
    ) -> Result<UploadResponse> {
        let metadata = UploadMetadata {
            index: index.into(),
            ..metadata
        };
        let metadata_json = serde_json::to_string(&metadata)?;

        let file_name = file_name.into();
        let mime_type = mime_type.into();
        let file_part = reqwest::multipart::Part::bytes(bytes)
            .file_name(file_name)
            .mime_str(&mime_type)
            .map_err(|e| ClientError::InvalidInput(e.to_string()))?;
        let metadata_part = reqwest::multipart::Part::text(metadata_json)
            .mime_str("application/json")
            .map_err(|e| ClientError::InvalidInput(e.to_string()))?;

        let form = reqwest::multipart::Form::new()
            .part("metadata", metadata_part)
            .part("file", file_part);

        let response = self
            .http
            .post(self.url("/api/v1/upload")?)
            .multipart(form)
            .send()
            .await?;
        self.handle_response(response).await
    }

    #[instrument(skip(self))]
    pub async fn upload_status(
        &self,
        index: &str,
        document_id: &str,
    ) -> Result<StatusProjection> {
        let mut url = self.url("/api/v1/upload-status")?;
        url.query_pairs_mut()
            .append_pair("index", index)
            .append_pair("documentId", document_id);

        let response = self.http.get(url).send().await?;
        self.handle_response(response).await
    }

    #[instrument(skip(self))]
    pub async fn delete_document(&self, index: &str, document_id: &str) -> Result<()> {
        let mut url = self.url("/api/v1/documents")?;
        url.query_pairs_mut()
            .append_pair("index", index)
            .append_pair("documentId", document_id);

        let response = self.http.delete(url).send().await?;
        if response.status().is_success() {
            Ok(())
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            Err(ClientError::Api {
                status: status.as_u16(),
                message: body,
            })
        }
    }

    #[instrument(skip(self))]
    pub async fn delete_index(&self, index: &str) -> Result<()> {
        let mut url = self.url("/api/v1/indexes")?;
        url.query_pairs_mut().append_pair("index", index);

        let response = self.http.delete(url).send().await?;
        if response.status().is_success() {
            Ok(())
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            Err(ClientError::Api {
                status: status.as_u16(),
                message: body,
            })
        }
    }

    #[instrument(skip(self))]
    pub async fn list_indexes(&self) -> Result<IndexesResponse> {
        let response = self.http.get(self.url("/api/v1/indexes")?).send().await?;
        self.handle_response(response).await
    }

    #[instrument(skip(self, request))]
    pub async fn search(&self, request: SearchRequest) -> Result<SearchResponse> {
        let response = self
            .http
            .post(self.url("/api/v1/search")?)
            .json(&request)
            .send()
            .await?;
        self.handle_response(response).await
    }

    #[instrument(skip(self, request))]
    pub async fn ask(&self, request: AskRequest) -> Result<AskResponse> {
        let response = self
            .http
            .post(self.url("/api/v1/ask")?)
            .json(&request)
            .send()
            .await?;
        self.handle_response(response).await
    }

    #[instrument(skip(self))]
    pub async fn health(&self) -> Result<HealthResponse> {
        let response = self.http.get(self.url("/health")?).send().await?;
        self.handle_response(response).await
    }

    #[instrument(skip(self))]
    pub async fn version(&self) -> Result<VersionResponse> {
        let response = self.http.get(self.url("/version")?).send().await?;
        self.handle_response(response).await
    }
}
