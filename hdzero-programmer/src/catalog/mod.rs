//! Client of the HDZero release catalog.
//!
//! The catalog is a small JSON API:
//!
//! * `GET {base}/api/devices` returns `{"devices": [...]}`
//! * `GET {base}/api/firmwares/{device_id}` returns `{"firmwares": [...]}`
//!
//! Firmware files and device pictures are fetched from the URLs the catalog
//! hands out. Nothing is retried; every failure is reported once as a
//! [`CatalogError`].

mod model;

pub use model::{Device, DeviceId, FirmwareRelease};

use std::{path::PathBuf, time::Duration};

use serde::de::DeserializeOwned;
use tokio::io::AsyncWriteExt;

use crate::config::CatalogConfig;
use model::{DeviceList, FirmwareList};

/// Errors while talking to the catalog.
#[derive(Debug, thiserror::Error, docsplay::Display)]
pub enum CatalogError {
    /// Failed to set up the HTTP client: {0}
    Client(#[source] reqwest::Error),

    /// Request to {url} failed: {source}
    Request {
        /// The requested URL.
        url: String,
        /// The transport error.
        source: reqwest::Error,
    },

    /// {url} answered with HTTP status {status}
    Status {
        /// The requested URL.
        url: String,
        /// The status code received.
        status: reqwest::StatusCode,
    },

    /// Unexpected response from {url}: {source}
    Decode {
        /// The requested URL.
        url: String,
        /// The decoding error.
        source: reqwest::Error,
    },

    /// {url} sent no data for {seconds} s
    Stalled {
        /// The requested URL.
        url: String,
        /// The timeout that elapsed, in seconds.
        seconds: u64,
    },

    /// Failed to store the downloaded firmware: {0}
    Storage(#[from] std::io::Error),
}

/// Talks to the catalog API.
#[derive(Debug, Clone)]
pub struct CatalogClient {
    http: reqwest::Client,
    base: String,
    listing_timeout: Duration,
    download_timeout: Duration,
    image_timeout: Duration,
    download_dir: Option<PathBuf>,
}

impl CatalogClient {
    /// Creates a client for the catalog described by `config`.
    pub fn new(config: &CatalogConfig) -> Result<Self, CatalogError> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("hdzero-programmer/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(CatalogError::Client)?;

        Ok(Self {
            http,
            base: config.api_base.trim_end_matches('/').to_string(),
            listing_timeout: config.listing_timeout(),
            download_timeout: config.download_timeout(),
            image_timeout: config.image_timeout(),
            download_dir: None,
        })
    }

    /// Stores downloads in `dir` instead of the system temporary directory.
    pub fn with_download_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.download_dir = Some(dir.into());
        self
    }

    /// The base URL requests are made against, without a trailing slash.
    pub fn base_url(&self) -> &str {
        &self.base
    }

    /// Lists all devices.
    pub async fn devices(&self) -> Result<Vec<Device>, CatalogError> {
        let url = format!("{}/api/devices", self.base);
        let list: DeviceList = self.get_json(&url).await?;
        let devices = list.devices.unwrap_or_default();

        tracing::debug!("Catalog lists {} device(s)", devices.len());
        Ok(devices)
    }

    /// Lists the firmware releases of a device.
    pub async fn firmwares(&self, device: &DeviceId) -> Result<Vec<FirmwareRelease>, CatalogError> {
        let url = format!("{}/api/firmwares/{device}", self.base);
        let list: FirmwareList = self.get_json(&url).await?;
        let firmwares = list.firmwares.unwrap_or_default();

        tracing::debug!("Catalog lists {} firmware(s) for device {device}", firmwares.len());
        Ok(firmwares)
    }

    /// Downloads a firmware file into a temporary file and returns its path.
    ///
    /// `on_progress` receives the percentage downloaded after every chunk
    /// when the server announces the size, and always a final 100. The file
    /// is kept after the call; the caller owns it.
    ///
    /// The download timeout applies to receiving the response headers and to
    /// each chunk of the body, not to the whole transfer.
    pub async fn download(
        &self,
        url: &str,
        mut on_progress: impl FnMut(u8) + Send,
    ) -> Result<PathBuf, CatalogError> {
        tracing::info!("Downloading {url}");

        let mut response = self.stall_guard(url, self.send(url, None)).await??;
        let mut progress = DownloadProgress::new(response.content_length());

        let dir = self.download_dir.clone().unwrap_or_else(std::env::temp_dir);
        let temp = tempfile::Builder::new()
            .prefix("hdzero_dl_")
            .suffix(".bin")
            .tempfile_in(&dir)?;
        let mut file = tokio::fs::File::from_std(temp.reopen()?);

        while let Some(chunk) = self
            .stall_guard(url, response.chunk())
            .await?
            .map_err(|source| CatalogError::Request {
                url: url.to_string(),
                source,
            })?
        {
            file.write_all(&chunk).await?;
            if let Some(percent) = progress.advance(chunk.len()) {
                on_progress(percent);
            }
        }
        file.flush().await?;
        on_progress(100);

        let (_, path) = temp.keep().map_err(|error| error.error)?;
        tracing::info!("Downloaded {} bytes to {:?}", progress.read(), path);

        Ok(path)
    }

    /// Fetches a device picture.
    pub async fn device_image(&self, url: &str) -> Result<Vec<u8>, CatalogError> {
        let response = self.get(url, self.image_timeout).await?;
        let bytes = response.bytes().await.map_err(|source| CatalogError::Request {
            url: url.to_string(),
            source,
        })?;

        Ok(bytes.to_vec())
    }

    /// Fails with [`CatalogError::Stalled`] when `step` takes longer than the download timeout.
    async fn stall_guard<T>(
        &self,
        url: &str,
        step: impl Future<Output = T>,
    ) -> Result<T, CatalogError> {
        tokio::time::timeout(self.download_timeout, step)
            .await
            .map_err(|_| {
                tracing::warn!("{url} stalled for {:?}", self.download_timeout);
                CatalogError::Stalled {
                    url: url.to_string(),
                    seconds: self.download_timeout.as_secs(),
                }
            })
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T, CatalogError> {
        self.get(url, self.listing_timeout)
            .await?
            .json()
            .await
            .map_err(|source| CatalogError::Decode {
                url: url.to_string(),
                source,
            })
    }

    async fn get(&self, url: &str, timeout: Duration) -> Result<reqwest::Response, CatalogError> {
        self.send(url, Some(timeout)).await
    }

    /// Sends a GET request and checks the status. `timeout` bounds the whole
    /// request including its body.
    async fn send(
        &self,
        url: &str,
        timeout: Option<Duration>,
    ) -> Result<reqwest::Response, CatalogError> {
        tracing::debug!("GET {url}");

        let mut request = self.http.get(url);
        if let Some(timeout) = timeout {
            request = request.timeout(timeout);
        }
        let response = request
            .send()
            .await
            .map_err(|source| CatalogError::Request {
                url: url.to_string(),
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(CatalogError::Status {
                url: url.to_string(),
                status,
            });
        }

        Ok(response)
    }
}

/// Turns received byte counts into a download percentage.
#[derive(Debug)]
struct DownloadProgress {
    total: Option<u64>,
    read: u64,
}

impl DownloadProgress {
    fn new(total: Option<u64>) -> Self {
        Self {
            total: total.filter(|&total| total > 0),
            read: 0,
        }
    }

    /// Accounts for `len` more bytes. Returns the percentage if the size is known.
    fn advance(&mut self, len: usize) -> Option<u8> {
        self.read += len as u64;
        let total = self.total?;
        let percent = (self.read.saturating_mul(100) / total).min(100);
        Some(percent as u8)
    }

    fn read(&self) -> u64 {
        self.read
    }
}
