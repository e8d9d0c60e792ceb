use std::fmt;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("HTTP client initialization failed")]
    ClientInit {
        #[source]
        source: reqwest::Error,
    },
    #[error("Request to {url} failed")]
    Http {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("Service rejected request to {url}")]
    Api {
        url: String,
        status: u16,
        body: String,
    },
    #[error("Unexpected response from {url}")]
    Decode {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("JSON {action} error")]
    Json {
        action: StorageAction,
        path: Option<String>,
        #[source]
        source: serde_json::Error,
    },
    #[error("Storage {action} error")]
    StorageIo {
        action: StorageAction,
        path: Option<String>,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageAction {
    Load,
    Save,
}

impl fmt::Display for StorageAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageAction::Load => f.write_str("load"),
            StorageAction::Save => f.write_str("save"),
        }
    }
}

impl Error {
    pub fn user_summary(&self) -> String {
        match self {
            Error::ClientInit { .. } => "Could not initialize the HTTP client.".to_string(),
            Error::Http { .. } => "Could not reach the billing service.".to_string(),
            Error::Api { body, .. } => {
                let body = body.trim();
                if body.is_empty() {
                    "The billing service rejected the request.".to_string()
                } else {
                    format!("The billing service rejected the request: {body}")
                }
            }
            Error::Decode { .. } => "The billing service sent an unexpected response.".to_string(),
            Error::Json { action, .. } => format!("Failed to {action} settings data."),
            Error::StorageIo { action, .. } => format!("Failed to {action} a local file."),
        }
    }

    pub fn technical_detail(&self) -> String {
        match self {
            Error::ClientInit { source } => format!("HTTP client init failed: {source}"),
            Error::Http { url, source } => format!("Request to {url} failed: {source}"),
            Error::Api { url, status, body } => {
                let body = body.trim();
                if body.is_empty() {
                    format!("Service returned status {status} for {url}.")
                } else {
                    format!("Service returned status {status} for {url}: {body}")
                }
            }
            Error::Decode { url, source } => {
                format!("Response from {url} did not decode: {source}")
            }
            Error::Json {
                action,
                path,
                source,
            } => {
                let path = path
                    .as_ref()
                    .map(|value| format!(" path={value}."))
                    .unwrap_or_default();
                format!("JSON {action} error.{path} {source}")
            }
            Error::StorageIo {
                action,
                path,
                source,
            } => {
                let path = path
                    .as_ref()
                    .map(|value| format!(" path={value}."))
                    .unwrap_or_default();
                format!("Storage {action} error.{path} {source}")
            }
        }
    }
}
