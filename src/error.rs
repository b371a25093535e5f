use oci_spec::{distribution::ErrorResponse, OciSpecError};
use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    //
    // Invalid user input
    //
    #[error("Invalid reference to image: {0}")]
    InvalidReference(String),
    #[error("Invalid registry domain: {0}")]
    InvalidDomain(String),
    #[error("Invalid name for repository: {0}")]
    InvalidName(String),
    #[error("Invalid tag: {0}")]
    InvalidTag(String),
    #[error("Invalid digest: {0}")]
    InvalidDigest(String),
    #[error("Invalid containerd namespace: {0}")]
    InvalidNamespace(String),
    #[error(transparent)]
    InvalidUrl(#[from] url::ParseError),
    #[error("Invalid credential: {0}")]
    InvalidCredential(String),

    //
    // Configuration
    //
    #[error("Malformed credential entry `{key}` in {path}: {reason}")]
    ConfigParse {
        path: PathBuf,
        key: String,
        reason: String,
    },
    #[error("No valid home directory path could be retrieved from the operating system.")]
    NoValidHomeDirectory,

    //
    // Error from OCI registry
    //
    #[error(transparent)]
    Network(Box<ureq::Transport>),
    #[error("Authorization failed: {0}")]
    Auth(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error(transparent)]
    Registry(#[from] ErrorResponse),
    #[error("Unexpected HTTP status {status} from {url}")]
    UnexpectedStatus { status: u16, url: String },
    #[error("Unsupported WWW-Authenticate header: {0}")]
    UnsupportedAuthHeader(String),
    #[error("Registry returned the same page again after `{0}`")]
    PaginationStalled(String),
    #[error("Catalog listing stopped after {} repositories: {source}", .repositories.len())]
    CatalogInterrupted {
        repositories: Vec<String>,
        source: Box<Error>,
    },
    #[error(transparent)]
    InvalidJson(#[from] serde_json::error::Error),

    //
    // Local backends
    //
    #[error("Backend could not be constructed: {0}")]
    Construction(String),
    #[error("Blocking call from a single-threaded async runtime, use a multi-threaded runtime or spawn_blocking")]
    AsyncContext,
    #[error("Operation not supported by this backend: {0}")]
    Unsupported(&'static str),
    #[error(transparent)]
    Daemon(#[from] bollard::errors::Error),
    #[error(transparent)]
    Runtime(#[from] tonic::Status),

    //
    // System error
    //
    #[error(transparent)]
    UnknownIo(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl From<OciSpecError> for Error {
    fn from(e: OciSpecError) -> Self {
        match e {
            OciSpecError::SerDe(e) => Error::InvalidJson(e),
            OciSpecError::Io(e) => Error::UnknownIo(e),
            e => Error::UnknownIo(std::io::Error::new(
                std::io::ErrorKind::Other,
                e.to_string(),
            )),
        }
    }
}

impl From<ureq::Error> for Error {
    fn from(e: ureq::Error) -> Self {
        match e {
            ureq::Error::Status(status, res) => {
                let url = res.get_url().to_string();
                match status {
                    401 | 403 => Error::Auth(url),
                    404 => Error::NotFound(url),
                    _ => match res.into_json::<ErrorResponse>() {
                        Ok(err) => Error::Registry(err),
                        Err(_) => Error::UnexpectedStatus { status, url },
                    },
                }
            }
            ureq::Error::Transport(e) => Error::Network(e.into()),
        }
    }
}
