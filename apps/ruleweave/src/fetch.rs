//! Content retrieval for documents and rulesets.
//!
//! URIs are plain filesystem paths, `file://` URLs or `http(s)://` URLs.
//! A `StaticAssets` table can shadow any URI with in-memory content.

use crate::error::FetchError;
use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use std::sync::{Arc, OnceLock};
use std::time::Duration;

/// Read raw text for a URI.
pub trait Fetcher: Send + Sync {
    fn fetch(&self, uri: &str) -> Result<String, FetchError>;
}

pub fn is_http(uri: &str) -> bool {
    uri.starts_with("http://") || uri.starts_with("https://")
}

/// Filesystem path for a `file://` URI or a plain path.
pub fn to_path(uri: &str) -> Result<PathBuf, FetchError> {
    if uri.starts_with("file://") {
        let parsed = url::Url::parse(uri).map_err(|e| FetchError::InvalidUri {
            uri: uri.to_string(),
            message: e.to_string(),
        })?;
        return parsed.to_file_path().map_err(|_| FetchError::InvalidUri {
            uri: uri.to_string(),
            message: "not a local file URL".to_string(),
        });
    }
    Ok(PathBuf::from(uri))
}

/// Resolve `reference` against the URI of the document containing it.
pub fn resolve_uri(base: Option<&str>, reference: &str) -> String {
    if is_http(reference) || reference.starts_with("file://") {
        return reference.to_string();
    }
    match base {
        Some(b) if is_http(b) => url::Url::parse(b)
            .and_then(|u| u.join(reference))
            .map(|u| u.to_string())
            .unwrap_or_else(|_| reference.to_string()),
        Some(b) => {
            let base_path = to_path(b).unwrap_or_else(|_| PathBuf::from(b));
            let reference = Path::new(reference);
            if reference.is_absolute() {
                return normalize(reference).to_string_lossy().into_owned();
            }
            let dir = base_path.parent().unwrap_or_else(|| Path::new(""));
            normalize(&dir.join(reference)).to_string_lossy().into_owned()
        }
        None => normalize(Path::new(reference)).to_string_lossy().into_owned(),
    }
}

/// Lexically normalize `.` and `..` components.
pub fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for comp in path.components() {
        match comp {
            Component::CurDir => {}
            Component::ParentDir => {
                let popped = matches!(out.components().next_back(), Some(Component::Normal(_)))
                    && out.pop();
                if !popped && !out.has_root() {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

#[derive(Debug, Default, Clone, Copy)]
pub struct FileFetcher;

impl Fetcher for FileFetcher {
    fn fetch(&self, uri: &str) -> Result<String, FetchError> {
        let path = to_path(uri)?;
        std::fs::read_to_string(&path).map_err(|source| FetchError::Io {
            uri: uri.to_string(),
            source,
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
/// HTTP client settings.
pub struct HttpOptions {
    pub timeout: Option<Duration>,
    pub proxy: Option<String>,
}

#[derive(Debug, Default)]
pub struct HttpFetcher {
    options: HttpOptions,
    client: OnceLock<Result<reqwest::blocking::Client, String>>,
}

impl HttpFetcher {
    pub fn new(options: HttpOptions) -> Self {
        Self {
            options,
            client: OnceLock::new(),
        }
    }

    fn client(&self, uri: &str) -> Result<&reqwest::blocking::Client, FetchError> {
        let built = self.client.get_or_init(|| {
            let mut builder = reqwest::blocking::Client::builder();
            if let Some(timeout) = self.options.timeout {
                builder = builder.timeout(timeout);
            }
            if let Some(proxy) = &self.options.proxy {
                let proxy = reqwest::Proxy::all(proxy.as_str()).map_err(|e| e.to_string())?;
                builder = builder.proxy(proxy);
            }
            builder.build().map_err(|e| e.to_string())
        });
        built.as_ref().map_err(|message| FetchError::Network {
            uri: uri.to_string(),
            message: message.clone(),
        })
    }
}

impl Fetcher for HttpFetcher {
    fn fetch(&self, uri: &str) -> Result<String, FetchError> {
        tracing::debug!(uri, "fetching over http");
        let response = self
            .client(uri)?
            .get(uri)
            .send()
            .map_err(|e| FetchError::Network {
                uri: uri.to_string(),
                message: e.to_string(),
            })?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Http {
                uri: uri.to_string(),
                status: status.as_u16(),
            });
        }
        response.text().map_err(|e| FetchError::Network {
            uri: uri.to_string(),
            message: e.to_string(),
        })
    }
}

#[derive(Debug, Clone, Default)]
/// In-memory content keyed by URI.
pub struct StaticAssets {
    entries: HashMap<String, String>,
}

impl StaticAssets {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, uri: impl Into<String>, content: impl Into<String>) {
        self.entries.insert(uri.into(), content.into());
    }

    /// Register `uri` with the content of a local file.
    pub fn insert_file(&mut self, uri: impl Into<String>, path: &Path) -> Result<(), FetchError> {
        let content = std::fs::read_to_string(path).map_err(|source| FetchError::Io {
            uri: path.display().to_string(),
            source,
        })?;
        self.insert(uri, content);
        Ok(())
    }

    pub fn get(&self, uri: &str) -> Option<&str> {
        self.entries.get(uri).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Fetcher for StaticAssets {
    fn fetch(&self, uri: &str) -> Result<String, FetchError> {
        self.get(uri).map(str::to_string).ok_or_else(|| FetchError::Io {
            uri: uri.to_string(),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "no such asset"),
        })
    }
}

/// Default fetcher: static assets first, then HTTP(S), then the filesystem.
#[derive(Debug, Default)]
pub struct HttpAndFileFetcher {
    assets: StaticAssets,
    http: HttpFetcher,
    file: FileFetcher,
}

impl HttpAndFileFetcher {
    pub fn new(assets: StaticAssets, http: HttpOptions) -> Self {
        Self {
            assets,
            http: HttpFetcher::new(http),
            file: FileFetcher,
        }
    }
}

impl Fetcher for HttpAndFileFetcher {
    fn fetch(&self, uri: &str) -> Result<String, FetchError> {
        if let Some(content) = self.assets.get(uri) {
            return Ok(content.to_string());
        }
        if is_http(uri) {
            self.http.fetch(uri)
        } else {
            self.file.fetch(uri)
        }
    }
}

/// Shared default fetcher.
pub fn default_fetcher() -> Arc<dyn Fetcher> {
    Arc::new(HttpAndFileFetcher::default())
}
