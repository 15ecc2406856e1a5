use crate::http::HttpClient;
use crate::runtime::Runtime;
use anyhow::{Context, Result, bail};
use log::info;
use std::path::{Path, PathBuf};

/// Where a variant URL points.
#[derive(Debug, Clone, PartialEq)]
pub enum Source {
    /// `http://` or `https://`
    Remote(String),
    /// `file://` URL or a bare filesystem path
    Local(PathBuf),
}

impl Source {
    pub fn parse(url: &str) -> Result<Self> {
        let lower = url.to_lowercase();
        if lower.starts_with("http://") || lower.starts_with("https://") {
            return Ok(Source::Remote(url.to_string()));
        }
        if let Some(path) = url.strip_prefix("file://") {
            if path.is_empty() {
                bail!("Empty file URL: {}", url);
            }
            return Ok(Source::Local(file_url_path(path)));
        }
        if let Some((scheme, _)) = url.split_once("://") {
            bail!("Unsupported URL scheme {:?} in {}", scheme, url);
        }
        if url.trim().is_empty() {
            bail!("Empty download URL");
        }
        Ok(Source::Local(PathBuf::from(url)))
    }
}

/// `file:///C:/x` names `C:/x` on Windows; everywhere else the path is kept as is.
fn file_url_path(path: &str) -> PathBuf {
    #[cfg(windows)]
    {
        let bytes = path.as_bytes();
        if bytes.len() > 2 && bytes[0] == b'/' && bytes[2] == b':' {
            return PathBuf::from(&path[1..]);
        }
    }
    PathBuf::from(path)
}

/// Fetches `url` into `dest`, from the network or the local filesystem.
#[tracing::instrument(skip(runtime, dest, http_client))]
pub async fn fetch<R: Runtime>(
    runtime: &R,
    url: &str,
    dest: &Path,
    http_client: &HttpClient,
) -> Result<u64> {
    match Source::parse(url)? {
        Source::Remote(url) => download_file(runtime, &url, dest, http_client).await,
        Source::Local(path) => {
            info!("Copying {:?}...", path);
            if !runtime.exists(&path) {
                bail!("Local artifact {:?} does not exist", path);
            }
            runtime
                .copy(&path, dest)
                .with_context(|| format!("Failed to copy {:?} to {:?}", path, dest))
        }
    }
}

/// Downloads a file from a URL to a temporary path with retry support.
#[tracing::instrument(skip(runtime, temp_path, http_client))]
pub async fn download_file<R: Runtime>(
    runtime: &R,
    url: &str,
    temp_path: &Path,
    http_client: &HttpClient,
) -> Result<u64> {
    info!("Downloading file from {}...", url);

    let temp_path = temp_path.to_path_buf();
    let bytes = http_client
        .download_file(url, || {
            runtime
                .create_file(&temp_path)
                .with_context(|| format!("Failed to create temporary file at {:?}", temp_path))
        })
        .await?;

    info!("Download complete.");
    Ok(bytes)
}
