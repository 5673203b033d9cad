use std::fmt;

use serde::{Deserialize, Serialize};

macro_rules! id_newtype {
    ($name:ident) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub i64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                fmt::Display::fmt(&self.0, f)
            }
        }
    };
}

id_newtype!(ServerId);

/// Reachability reported by the directory for a managed host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ServerStatus {
    #[serde(rename = "SERVER_UP", alias = "UP")]
    Up,
    #[serde(rename = "SERVER_DOWN", alias = "DOWN")]
    Down,
}

impl ServerStatus {
    pub fn label(self) -> &'static str {
        match self {
            Self::Up => "UP",
            Self::Down => "DOWN",
        }
    }
}

impl fmt::Display for ServerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.label())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Server {
    pub id: ServerId,
    #[serde(rename = "ipAddress", alias = "address")]
    pub address: String,
    pub name: String,
    #[serde(rename = "type", default)]
    pub kind: String,
    pub status: ServerStatus,
    #[serde(default)]
    pub memory: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpu: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disk: Option<String>,
    #[serde(default)]
    pub image_url: String,
}

/// Fields submitted when registering a new host; the directory assigns the id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerDraft {
    #[serde(rename = "ipAddress")]
    pub address: String,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub status: ServerStatus,
    pub memory: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpu: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disk: Option<String>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub image_url: String,
}

impl ServerDraft {
    pub fn new(address: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            name: name.into(),
            kind: String::new(),
            status: ServerStatus::Down,
            memory: String::new(),
            cpu: None,
            disk: None,
            image_url: String::new(),
        }
    }
}
