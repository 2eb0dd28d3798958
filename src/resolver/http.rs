use super::{ResolveError, TrackMetadata, TrackResolver};
use crate::audio::{ByteStream, DeclaredFormat};
use async_trait::async_trait;
use futures_util::TryStreamExt;
use reqwest::header::CONTENT_TYPE;
use reqwest::Client;
use std::io;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};
use url::Url;

const LOG_TARGET: &str = "r_jukebox::resolver::http";

/// Resolves direct `http(s)` links to audio files.
///
/// Free-text search is not supported: anything that is not an absolute
/// http(s) URL resolves to `NotFound`.
#[derive(Clone)]
pub struct HttpTrackResolver {
    client: Client,
}

impl HttpTrackResolver {
    pub fn new(timeout: Duration) -> Self {
        let client = match Client::builder().timeout(timeout).build() {
            Ok(client) => {
                debug!(target: LOG_TARGET, "HTTP client created with {:?} timeout", timeout);
                client
            }
            Err(e) => {
                warn!(target: LOG_TARGET, "Error creating HTTP client with timeout: {:?}. Falling back to default.", e);
                Client::new()
            }
        };
        Self { client }
    }

    pub fn with_client(client: Client) -> Self {
        Self { client }
    }
}

impl Default for HttpTrackResolver {
    fn default() -> Self {
        Self::new(Duration::from_secs(30))
    }
}

/// Parses `query` as a streamable URL.
pub(crate) fn parse_stream_url(query: &str) -> Result<Url, ResolveError> {
    let url = Url::parse(query.trim())
        .map_err(|_| ResolveError::NotFound(format!("no track matches '{}'", query.trim())))?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(ResolveError::NotFound(format!("unsupported scheme '{}'", other))),
    }
}

/// Display title from the last path segment, falling back to the host.
pub(crate) fn title_from_url(url: &Url) -> String {
    let segment = url
        .path_segments()
        .and_then(|mut segments| segments.rev().find(|s| !s.is_empty()))
        .map(|s| urlencoding::decode(s).map(|d| d.into_owned()).unwrap_or_else(|_| s.to_string()));

    match segment {
        Some(name) => match name.rsplit_once('.') {
            Some((stem, _ext)) if !stem.is_empty() => stem.to_string(),
            _ => name,
        },
        None => url.host_str().unwrap_or("unknown").to_string(),
    }
}

/// File extension of the URL path, lowercased.
pub(crate) fn extension_from_url(url: &Url) -> Option<String> {
    let last = url.path_segments()?.rev().find(|s| !s.is_empty())?;
    let (_, ext) = last.rsplit_once('.')?;
    if ext.is_empty() || ext.len() > 5 {
        return None;
    }
    Some(ext.to_ascii_lowercase())
}

/// Whether a `Content-Type` can plausibly carry decodable audio.
pub(crate) fn is_audio_content_type(mime: &str) -> bool {
    let essence = mime.split(';').next().unwrap_or("").trim().to_ascii_lowercase();
    essence.starts_with("audio/")
        || essence.starts_with("video/")
        || matches!(essence.as_str(), "application/ogg" | "application/octet-stream")
}

#[async_trait]
impl TrackResolver for HttpTrackResolver {
    #[instrument(skip(self))]
    async fn resolve(&self, query: &str) -> Result<TrackMetadata, ResolveError> {
        let url = parse_stream_url(query)?;
        let title = title_from_url(&url);
        debug!(target: LOG_TARGET, "Resolved '{}' to {} ({})", query, url, title);
        Ok(TrackMetadata {
            canonical_url: url.to_string(),
            title,
        })
    }

    #[instrument(skip(self))]
    async fn open_stream(&self, canonical_url: &str) -> Result<(ByteStream, DeclaredFormat), ResolveError> {
        let url = parse_stream_url(canonical_url).map_err(|e| ResolveError::Unavailable(e.to_string()))?;
        let response = self.client.get(url.clone()).send().await?;
        let response = response
            .error_for_status()
            .map_err(|e| ResolveError::Unavailable(format!("{} returned {}", url, e.status().map_or_else(|| e.to_string(), |s| s.to_string()))))?;

        let mime = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string());
        if let Some(mime) = &mime {
            if !is_audio_content_type(mime) {
                return Err(ResolveError::Unavailable(format!("{} is '{}', not audio", url, mime)));
            }
        }

        let mut declared = DeclaredFormat::default().with_byte_len(response.content_length());
        declared.mime_type = mime.map(|m| m.split(';').next().unwrap_or("").trim().to_string());
        declared.extension = extension_from_url(&url);
        info!(target: LOG_TARGET, "Opened stream {} (type {:?}, {:?} bytes)", url, declared.mime_type, declared.byte_len);

        let stream: ByteStream = Box::pin(
            response
                .bytes_stream()
                .map_err(|e| io::Error::new(io::ErrorKind::Other, e)),
        );
        Ok((stream, declared))
    }
}
