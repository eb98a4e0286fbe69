//! Block blob client
//!
//! Talks to a block-based object store through a pre-authorized (SAS) URL.
//! Only the two write operations the uploader needs are exposed.
//!
//! # Example
//!
//! ```no_run
//! use blockblob_uploadr::blob::{BlobClient, BlobClientConfig};
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = BlobClientConfig::new("https://account.blob.core.windows.net/asset/video.mp4?sig=...");
//! let client = BlobClient::new(config)?;
//!
//! let file = tokio::fs::File::open("video.mp4").await?;
//! let uploaded = client
//!     .upload(&CancellationToken::new(), file, 4 * 1024 * 1024, 4)
//!     .await?;
//! println!("Uploaded {} bytes", uploaded);
//! # Ok(())
//! # }
//! ```
//!
//! # Tracing
//!
//! | Operation | Span Name | Attributes |
//! |-----------|-----------|------------|
//! | Put Block | `blob.put_block` | block_id, sequence, bytes, status_code |
//! | Put Block List | `blob.put_block_list` | blocks_count, bytes, status_code |

pub mod block_id;
pub mod block_list;
pub mod retry;

pub use block_id::{BlockId, BlockIdError, MAX_BLOCKS};
pub use block_list::{BlockList, BlockListError};
pub use retry::RetryConfig;

use crate::config::ClientConfig;
use crate::upload::{BlockStore, UploadCoordinator, UploadError, UploadOptions};
use async_trait::async_trait;
use bytes::Bytes;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_LENGTH, CONTENT_TYPE, DATE};
use reqwest::{Response, StatusCode, Url};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::io::AsyncRead;
use tokio_util::sync::CancellationToken;

/// Storage REST API version sent with every request
pub const API_VERSION: &str = "2017-04-17";

/// Default User-Agent
pub const DEFAULT_USER_AGENT: &str = concat!("blockblob-uploadr/", env!("CARGO_PKG_VERSION"));

const BLOB_TYPE_HEADER: &str = "x-ms-blob-type";
const VERSION_HEADER: &str = "x-ms-version";
const REQUEST_ID_HEADER: &str = "x-ms-client-request-id";
const ERROR_CODE_HEADER: &str = "x-ms-error-code";

/// Blob client errors
#[derive(Error, Debug)]
pub enum BlobClientError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Request error: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Storage rejected request with status {status}{}", describe_rejection(.code, .message))]
    RemoteRejected {
        status: u16,
        code: Option<String>,
        message: Option<String>,
    },

    #[error("Encoding error: {0}")]
    Encode(#[from] BlockListError),

    #[error("Request cancelled")]
    Cancelled,
}

fn describe_rejection(code: &Option<String>, message: &Option<String>) -> String {
    match (code, message) {
        (Some(code), Some(message)) => format!(" ({}: {})", code, message),
        (Some(code), None) => format!(" ({})", code),
        (None, Some(message)) => format!(" ({})", message),
        (None, None) => String::new(),
    }
}

impl BlobClientError {
    /// HTTP status of a terminal rejection, if that is what this is
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::RemoteRejected { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Blob client configuration
#[derive(Debug, Clone)]
pub struct BlobClientConfig {
    /// Target blob URL, already carrying its write authorization
    pub url: String,
    pub user_agent: Option<String>,
    /// Value of `x-ms-version`; defaults to [`API_VERSION`]
    pub api_version: Option<String>,
    pub retry: Option<RetryConfig>,
    pub timeout: Option<Duration>,
}

impl BlobClientConfig {
    /// Configuration with default retry policy and no request timeout
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            user_agent: None,
            api_version: None,
            retry: None,
            timeout: None,
        }
    }

    /// Configuration taking transport settings from the `client` config section
    pub fn from_config(url: impl Into<String>, client: &ClientConfig) -> Self {
        Self {
            url: url.into(),
            user_agent: Some(client.user_agent.clone()),
            api_version: Some(client.api_version.clone()),
            retry: Some(client.retry.clone()),
            timeout: client.timeout_seconds.map(Duration::from_secs),
        }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct StorageErrorDocument {
    code: Option<String>,
    message: Option<String>,
}

/// Client for one block blob
///
/// Cheap to clone; clones share the underlying connection pool.
#[derive(Debug, Clone)]
pub struct BlobClient {
    url: Url,
    http_client: reqwest::Client,
    retry: RetryConfig,
}

impl BlobClient {
    /// Create a new blob client
    pub fn new(config: BlobClientConfig) -> Result<Self, BlobClientError> {
        if config.url.trim().is_empty() {
            return Err(BlobClientError::InvalidArgument("missing upload URL".into()));
        }

        let url = Url::parse(&config.url)
            .map_err(|e| BlobClientError::InvalidArgument(format!("invalid upload URL: {}", e)))?;
        if url.scheme() != "http" && url.scheme() != "https" {
            return Err(BlobClientError::InvalidArgument(format!(
                "unsupported URL scheme '{}'",
                url.scheme()
            )));
        }

        let api_version = config.api_version.as_deref().unwrap_or(API_VERSION);
        let mut headers = HeaderMap::new();
        headers.insert(
            VERSION_HEADER,
            HeaderValue::from_str(api_version)
                .map_err(|e| BlobClientError::Config(format!("invalid API version: {}", e)))?,
        );

        let mut builder = reqwest::Client::builder()
            .default_headers(headers)
            .user_agent(
                config
                    .user_agent
                    .unwrap_or_else(|| DEFAULT_USER_AGENT.to_string()),
            );
        if let Some(timeout) = config.timeout {
            builder = builder.timeout(timeout);
        }
        let http_client = builder
            .build()
            .map_err(|e| BlobClientError::Config(e.to_string()))?;

        Ok(Self {
            url,
            http_client,
            retry: config.retry.unwrap_or_default(),
        })
    }

    /// Target URL without its query string, safe to log
    pub fn endpoint(&self) -> String {
        let mut url = self.url.clone();
        url.set_query(None);
        url.to_string()
    }

    pub fn retry_config(&self) -> &RetryConfig {
        &self.retry
    }

    fn block_url(&self, block_id: &BlockId) -> Url {
        let mut url = self.url.clone();
        url.query_pairs_mut()
            .append_pair("comp", "block")
            .append_pair("blockid", block_id.as_str());
        url
    }

    fn block_list_url(&self) -> Url {
        let mut url = self.url.clone();
        url.query_pairs_mut().append_pair("comp", "blocklist");
        url
    }

    fn put(&self, url: &Url) -> reqwest::RequestBuilder {
        self.http_client
            .put(url.clone())
            .header(DATE, now_rfc3339())
            .header(REQUEST_ID_HEADER, uuid::Uuid::new_v4().to_string())
    }

    /// Write one uncommitted block (Put Block)
    ///
    /// Sends the chunk with an explicit `Content-Length`. Transient failures
    /// are retried by the transport; anything other than `201 Created` after
    /// that is returned as [`BlobClientError::RemoteRejected`].
    #[tracing::instrument(
        name = "blob.put_block",
        skip(self, body, cancel),
        fields(
            blob.block_id = %block_id,
            blob.sequence = block_id.sequence(),
            http.method = "PUT",
            upload.bytes = body.len(),
            http.status_code = tracing::field::Empty
        ),
        err
    )]
    pub async fn put_block(
        &self,
        block_id: &BlockId,
        body: Bytes,
        cancel: &CancellationToken,
    ) -> Result<(), BlobClientError> {
        if body.is_empty() {
            return Err(BlobClientError::InvalidArgument("missing block body".into()));
        }

        let url = self.block_url(block_id);
        let response = retry::send_with_retry(&self.retry, cancel, "put_block", || {
            self.put(&url)
                .header(BLOB_TYPE_HEADER, "BlockBlob")
                .header(CONTENT_TYPE, "application/octet-stream")
                .header(CONTENT_LENGTH, body.len())
                .body(body.clone())
        })
        .await?;

        expect_created(response).await
    }

    /// Commit the given blocks, in order, as the blob's content (Put Block List)
    #[tracing::instrument(
        name = "blob.put_block_list",
        skip(self, block_list, cancel),
        fields(
            blob.blocks_count = block_list.len(),
            http.method = "PUT",
            upload.bytes = tracing::field::Empty,
            http.status_code = tracing::field::Empty
        ),
        err
    )]
    pub async fn put_block_list(
        &self,
        block_list: &BlockList,
        cancel: &CancellationToken,
    ) -> Result<(), BlobClientError> {
        let body = Bytes::from(block_list.to_xml()?);
        tracing::Span::current().record("upload.bytes", body.len());

        let url = self.block_list_url();
        let response = retry::send_with_retry(&self.retry, cancel, "put_block_list", || {
            self.put(&url)
                .header(CONTENT_TYPE, "application/xml")
                .header(CONTENT_LENGTH, body.len())
                .body(body.clone())
        })
        .await?;

        expect_created(response).await
    }

    /// Upload everything `reader` yields as this blob's content.
    ///
    /// Splits the stream into `chunk_size` blocks, writes them with `workers`
    /// concurrent requests and commits the block list only if every block
    /// succeeded. Returns the number of bytes uploaded.
    pub async fn upload<R>(
        &self,
        cancel: &CancellationToken,
        reader: R,
        chunk_size: usize,
        workers: usize,
    ) -> Result<u64, UploadError>
    where
        R: AsyncRead + Unpin + Send,
    {
        let options = UploadOptions {
            chunk_size,
            workers,
            ..UploadOptions::default()
        };
        let coordinator = UploadCoordinator::new(Arc::new(self.clone()), options)?;
        let outcome = coordinator.upload(reader, cancel).await?;
        Ok(outcome.total_bytes_uploaded)
    }
}

#[async_trait]
impl BlockStore for BlobClient {
    async fn put_block(
        &self,
        block_id: &BlockId,
        body: Bytes,
        cancel: &CancellationToken,
    ) -> Result<(), BlobClientError> {
        BlobClient::put_block(self, block_id, body, cancel).await
    }

    async fn put_block_list(
        &self,
        block_list: &BlockList,
        cancel: &CancellationToken,
    ) -> Result<(), BlobClientError> {
        BlobClient::put_block_list(self, block_list, cancel).await
    }
}

fn now_rfc3339() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true)
}

async fn expect_created(response: Response) -> Result<(), BlobClientError> {
    let status = response.status();
    tracing::Span::current().record("http.status_code", status.as_u16());

    if status == StatusCode::CREATED {
        return Ok(());
    }

    let header_code = response
        .headers()
        .get(ERROR_CODE_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let body = response.text().await.unwrap_or_default();
    let document = quick_xml::de::from_str::<StorageErrorDocument>(&body).ok();

    let (code, message) = match document {
        Some(doc) => (header_code.or(doc.code), doc.message),
        None => (header_code, None),
    };

    Err(BlobClientError::RemoteRejected {
        status: status.as_u16(),
        code,
        message,
    })
}
