use std::time::Duration;

use thiserror::Error;

/// Why an authentication URL could not be turned into a callback port.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UrlError {
    #[error("URL is not valid: {0}")]
    InvalidUrl(String),

    #[error("'redirect_uri' parameter not found in URL: {0}")]
    MissingRedirectUri(String),

    #[error("redirect_uri is not a valid URL: {0}")]
    InvalidRedirectUri(String),

    #[error("Port not found in redirect_uri: {0}")]
    PortNotFound(String),
}

/// Terminal failures of a login run. None of these are retried.
#[derive(Debug, Error)]
pub enum FlowError {
    #[error("remote command failed: {0}")]
    RemoteCommand(String),

    #[error("URL parsing error: {0}")]
    Parse(#[from] UrlError),

    #[error("SSH tunnel was not ready within {0:?}")]
    TunnelTimeout(Duration),

    #[error("operation aborted by the user")]
    UserAbort,

    #[error("process error: {0}")]
    Process(String),

    #[error("no AWS profiles found on the remote server")]
    NoProfiles,
}

pub type FlowResult<T> = Result<T, FlowError>;
