use shared::error::{ErrorCode, Problem};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("request to {url} timed out")]
    Timeout { url: String },
    #[error("server answered {status} ({code:?}){}", problem_suffix(.problem))]
    Status {
        code: ErrorCode,
        status: u16,
        problem: Option<Problem>,
    },
    #[error("invalid response body from {url}: {source}")]
    Decode {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("invalid server url: {0}")]
    InvalidUrl(#[from] url::ParseError),
    #[error("{0}")]
    Validation(String),
}

fn problem_suffix(problem: &Option<Problem>) -> String {
    problem
        .as_ref()
        .and_then(Problem::summary)
        .map(|summary| format!(": {summary}"))
        .unwrap_or_default()
}

impl ServiceError {
    pub(crate) fn from_send(url: &str, source: reqwest::Error) -> Self {
        if source.is_timeout() {
            Self::Timeout {
                url: url.to_string(),
            }
        } else {
            Self::Transport {
                url: url.to_string(),
                source,
            }
        }
    }

    pub fn code(&self) -> Option<ErrorCode> {
        match self {
            Self::Status { code, .. } => Some(*code),
            _ => None,
        }
    }
}

#[derive(Debug, Error)]
pub enum ControllerError {
    #[error("list controller requires a running tokio runtime")]
    NoRuntime(#[from] tokio::runtime::TryCurrentError),
    #[error("page size must be greater than zero")]
    ZeroPageSize,
}
