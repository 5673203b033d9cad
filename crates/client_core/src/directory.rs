//! Remote directory client: one request per logical operation, no retries.

use async_trait::async_trait;
use reqwest::{Client, Method};
use shared::{
    domain::{ServerDraft, ServerId},
    error::OperationError,
    protocol::DirectoryResponse,
};
use tracing::{debug, error};
use url::Url;

use crate::config::Settings;

pub type DirectoryResult = std::result::Result<DirectoryResponse, OperationError>;

#[async_trait]
pub trait DirectoryClient: Send + Sync {
    async fn list_servers(&self) -> DirectoryResult;
    async fn ping_server(&self, address: &str) -> DirectoryResult;
    async fn create_server(&self, draft: &ServerDraft) -> DirectoryResult;
    async fn delete_server(&self, id: ServerId) -> DirectoryResult;
}

pub struct HttpDirectoryClient {
    http: Client,
    base_url: Url,
}

impl HttpDirectoryClient {
    pub fn new(settings: &Settings) -> Self {
        Self::with_client(Client::new(), settings.api_url.clone())
    }

    pub fn with_client(http: Client, base_url: Url) -> Self {
        Self { http, base_url }
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url, OperationError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| OperationError::transport(format!("invalid api url '{}'", self.base_url)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn execute(
        &self,
        method: Method,
        segments: &[&str],
        draft: Option<&ServerDraft>,
    ) -> DirectoryResult {
        let url = self.endpoint(segments)?;
        let mut request = self.http.request(method.clone(), url.clone());
        if let Some(draft) = draft {
            request = request.json(draft);
        }

        let result = async {
            let response = request
                .send()
                .await
                .and_then(|r| r.error_for_status())
                .map_err(operation_error)?;
            response
                .json::<DirectoryResponse>()
                .await
                .map_err(operation_error)
        }
        .await;

        match &result {
            Ok(body) => debug!(
                %method,
                %url,
                status_code = body.status_code,
                message = %body.message,
                "directory: response"
            ),
            Err(err) => error!(
                %method,
                %url,
                status_code = err.status_code,
                error = %err.message,
                "directory: request failed"
            ),
        }
        result
    }
}

#[async_trait]
impl DirectoryClient for HttpDirectoryClient {
    async fn list_servers(&self) -> DirectoryResult {
        self.execute(Method::GET, &["server", "list"], None).await
    }

    async fn ping_server(&self, address: &str) -> DirectoryResult {
        self.execute(Method::GET, &["server", "ping", address], None)
            .await
    }

    async fn create_server(&self, draft: &ServerDraft) -> DirectoryResult {
        self.execute(Method::POST, &["server", "save"], Some(draft))
            .await
    }

    async fn delete_server(&self, id: ServerId) -> DirectoryResult {
        let id = id.to_string();
        self.execute(Method::DELETE, &["server", "delete", &id], None)
            .await
    }
}

/// Converts any transport outcome into the generic error, keeping the HTTP
/// status when there is one.
fn operation_error(err: reqwest::Error) -> OperationError {
    match err.status() {
        Some(status) => OperationError::new(status.as_u16(), err.to_string()),
        None => OperationError::transport(err.to_string()),
    }
}

#[cfg(test)]
#[path = "tests/directory_tests.rs"]
mod tests;
