//! Adapter error types.

use std::path::PathBuf;

use thiserror::Error;
use triage_core::PortError;

#[derive(Error, Debug)]
pub enum AdapterError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{service} returned HTTP {status}: {body}")]
    Status {
        service: &'static str,
        status: u16,
        body: String,
    },

    #[error("could not decode {what}: {detail}")]
    Decode { what: &'static str, detail: String },

    #[error("read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("parse {path}: {source}")]
    Toml {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("missing credential: set {0}")]
    MissingCredential(String),

    #[error("GraphQL errors: {0}")]
    Graphql(String),

    #[error("ticket {0} not found")]
    TicketNotFound(String),
}

pub type Result<T> = std::result::Result<T, AdapterError>;

impl AdapterError {
    pub(crate) fn decode(what: &'static str, detail: impl ToString) -> Self {
        Self::Decode {
            what,
            detail: detail.to_string(),
        }
    }
}

impl From<AdapterError> for PortError {
    fn from(err: AdapterError) -> Self {
        match &err {
            AdapterError::Http(e) if e.is_decode() => PortError::Malformed(err.to_string()),
            AdapterError::Http(_) => PortError::Transport(err.to_string()),
            AdapterError::Status { status, .. } if *status >= 500 || *status == 401 || *status == 403 => {
                PortError::Unavailable(err.to_string())
            }
            AdapterError::Status { .. } => PortError::Transport(err.to_string()),
            AdapterError::Decode { .. } | AdapterError::Json(_) | AdapterError::Graphql(_) => {
                PortError::Malformed(err.to_string())
            }
            AdapterError::Io { .. }
            | AdapterError::Toml { .. }
            | AdapterError::MissingCredential(_)
            | AdapterError::TicketNotFound(_) => PortError::Unavailable(err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_errors_and_auth_failures_are_unavailable() {
        let err = AdapterError::Status {
            service: "github",
            status: 503,
            body: "maintenance".to_string(),
        };
        assert!(matches!(PortError::from(err), PortError::Unavailable(_)));

        let err = AdapterError::Status {
            service: "linear",
            status: 401,
            body: String::new(),
        };
        assert!(matches!(PortError::from(err), PortError::Unavailable(_)));

        let err = AdapterError::Status {
            service: "github",
            status: 422,
            body: "bad base".to_string(),
        };
        assert!(matches!(PortError::from(err), PortError::Transport(_)));
    }

    #[test]
    fn undecodable_payloads_are_malformed() {
        let err = AdapterError::decode("ollama response", "no JSON object");
        let port: PortError = err.into();
        assert_eq!(
            port,
            PortError::Malformed("could not decode ollama response: no JSON object".to_string())
        );
        assert!(matches!(
            PortError::from(AdapterError::Graphql("bad filter".to_string())),
            PortError::Malformed(_)
        ));
    }
}
