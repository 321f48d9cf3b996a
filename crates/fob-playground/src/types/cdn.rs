//! CDN access for declaration downloads.

use async_trait::async_trait;
use thiserror::Error;

/// Response header carrying the URL of a package's declaration entry point.
pub const TYPES_HEADER: &str = "X-TypeScript-Types";

/// Errors talking to the CDN. Always degrade typing, never compilation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NetworkError {
    /// The request did not complete (DNS, TLS, connection reset, ...).
    #[error("request to '{url}' failed: {message}")]
    Request { url: String, message: String },

    /// The server answered with a non-success status.
    #[error("'{url}' returned HTTP {status}")]
    Status { url: String, status: u16 },

    /// The URL could not be parsed or joined.
    #[error("invalid URL '{0}'")]
    InvalidUrl(String),
}

/// Fetches declaration files and package metadata.
///
/// Implementations are shared across concurrent downloads, so both methods
/// take `&self`.
#[async_trait]
pub trait CdnClient: Send + Sync + std::fmt::Debug {
    /// `GET url` and return the body as text.
    async fn fetch_text(&self, url: &str) -> Result<String, NetworkError>;

    /// `GET url` and return the absolute URL advertised in the
    /// [`TYPES_HEADER`] response header, if any.
    async fn types_entry(&self, url: &str) -> Result<Option<String>, NetworkError>;
}

#[cfg(feature = "http")]
pub use http::HttpCdnClient;

#[cfg(feature = "http")]
mod http {
    use async_trait::async_trait;
    use tracing::debug;

    use super::{CdnClient, NetworkError, TYPES_HEADER};

    /// [`CdnClient`] over `reqwest`.
    #[derive(Debug, Clone, Default)]
    pub struct HttpCdnClient {
        client: reqwest::Client,
    }

    impl HttpCdnClient {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn with_client(client: reqwest::Client) -> Self {
            Self { client }
        }

        async fn get(&self, url: &str) -> Result<reqwest::Response, NetworkError> {
            debug!(url = %url, "GET");
            let response = self
                .client
                .get(url)
                .send()
                .await
                .map_err(|err| NetworkError::Request {
                    url: url.to_string(),
                    message: err.to_string(),
                })?;

            let status = response.status();
            if !status.is_success() {
                return Err(NetworkError::Status {
                    url: url.to_string(),
                    status: status.as_u16(),
                });
            }
            Ok(response)
        }
    }

    #[async_trait]
    impl CdnClient for HttpCdnClient {
        async fn fetch_text(&self, url: &str) -> Result<String, NetworkError> {
            self.get(url)
                .await?
                .text()
                .await
                .map_err(|err| NetworkError::Request {
                    url: url.to_string(),
                    message: err.to_string(),
                })
        }

        async fn types_entry(&self, url: &str) -> Result<Option<String>, NetworkError> {
            let response = self.get(url).await?;
            let Some(value) = response.headers().get(TYPES_HEADER) else {
                return Ok(None);
            };
            let value = value
                .to_str()
                .map_err(|_| NetworkError::InvalidUrl(format!("{value:?}")))?;

            // esm.sh answers with a root-relative path.
            response
                .url()
                .join(value)
                .map(|entry| Some(entry.to_string()))
                .map_err(|_| NetworkError::InvalidUrl(value.to_string()))
        }
    }
}
