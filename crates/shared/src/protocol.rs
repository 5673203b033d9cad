use serde::{Deserialize, Serialize};

use crate::{domain::Server, error::OperationError};

/// Envelope returned by every directory endpoint.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DirectoryResponse {
    #[serde(rename = "timeStamp", default, skip_serializing_if = "Option::is_none")]
    pub time_stamp: Option<String>,
    #[serde(default)]
    pub status_code: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default)]
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub developer_message: Option<String>,
    #[serde(default)]
    pub data: ResponseData,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub servers: Option<Vec<Server>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server: Option<Server>,
}

impl DirectoryResponse {
    pub fn with_servers(message: impl Into<String>, servers: Vec<Server>) -> Self {
        Self {
            status_code: 200,
            status: Some("OK".into()),
            message: message.into(),
            data: ResponseData {
                servers: Some(servers),
                server: None,
            },
            ..Self::default()
        }
    }

    pub fn with_server(message: impl Into<String>, server: Server) -> Self {
        Self {
            status_code: 200,
            status: Some("OK".into()),
            message: message.into(),
            data: ResponseData {
                servers: None,
                server: Some(server),
            },
            ..Self::default()
        }
    }

    pub fn message_only(message: impl Into<String>) -> Self {
        Self {
            status_code: 200,
            status: Some("OK".into()),
            message: message.into(),
            ..Self::default()
        }
    }

    pub fn require_servers(&self) -> Result<Vec<Server>, OperationError> {
        self.data
            .servers
            .clone()
            .ok_or_else(|| OperationError::missing_payload(self.status_code, "servers"))
    }

    pub fn require_server(&self) -> Result<Server, OperationError> {
        self.data
            .server
            .clone()
            .ok_or_else(|| OperationError::missing_payload(self.status_code, "server"))
    }
}
