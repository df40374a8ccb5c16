//! Artifact download over the controller's HTTP server.
//!
//! Images announced by notifications live under the controller's HTTP root.
//! They are fetched on a separate HTTP request, independent of the
//! WebSocket link.

use crate::client::OriginClient;
use crate::error::{ClientError, Result};
use futures::StreamExt;
use reqwest::Url;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tracing::{debug, error, info};

/// Build `http://{host[:port]}/{remote_path}?t={timestamp}` from the
/// endpoint URL of the WebSocket link
pub fn artifact_url(endpoint: &str, remote_path: &str, timestamp: u64) -> Result<Url> {
    let mut url = Url::parse(endpoint)
        .map_err(|e| ClientError::Download(format!("invalid endpoint {}: {}", endpoint, e)))?;

    let scheme = if url.scheme() == "wss" { "https" } else { "http" };
    url.set_scheme(scheme)
        .map_err(|_| ClientError::Download(format!("cannot derive http url from {}", endpoint)))?;
    url.set_path(remote_path.trim_start_matches('/'));
    url.set_query(Some(&format!("t={}", timestamp)));
    url.set_fragment(None);
    Ok(url)
}

impl OriginClient {
    /// Stream `remote_path` from the controller into `save_path`.
    ///
    /// Parent directories are created as needed. The body lands in a
    /// `.part` sibling that is renamed into place once complete, so a failed
    /// transfer never leaves a truncated file at `save_path`. Returns the
    /// number of bytes written.
    pub async fn download_artifact(
        &self,
        remote_path: &str,
        save_path: impl AsRef<Path>,
    ) -> Result<u64> {
        let save_path = save_path.as_ref();
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();
        let url = artifact_url(&self.config().url, remote_path, timestamp)?;

        match fetch(self, &url, save_path).await {
            Ok(written) => {
                info!(
                    "Downloaded {} ({} bytes) to {}",
                    remote_path,
                    written,
                    save_path.display()
                );
                Ok(written)
            }
            Err(e) => {
                error!("Download of {} failed: {}", url, e);
                self.inner
                    .metrics
                    .record_error(format!("Download failed for {}: {}", remote_path, e));
                Err(e)
            }
        }
    }
}

async fn fetch(client: &OriginClient, url: &Url, save_path: &Path) -> Result<u64> {
    debug!("Fetching {}", url);
    let http = reqwest::Client::builder()
        .connect_timeout(client.config().connect_timeout)
        .build()?;

    let response = http.get(url.clone()).send().await?;
    let status = response.status();
    if !status.is_success() {
        return Err(ClientError::Download(format!("HTTP {} for {}", status, url)));
    }

    if let Some(parent) = save_path.parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent).await?;
        }
    }

    let partial = partial_path(save_path);
    let streamed = async {
        let mut file = File::create(&partial).await?;
        let mut body = response.bytes_stream();
        let mut written = 0u64;
        while let Some(chunk) = body.next().await {
            let chunk = chunk?;
            file.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        file.flush().await?;
        Ok::<_, ClientError>(written)
    }
    .await;

    match streamed {
        Ok(written) => {
            tokio::fs::rename(&partial, save_path).await?;
            Ok(written)
        }
        Err(e) => {
            if let Err(cleanup) = tokio::fs::remove_file(&partial).await {
                debug!("Could not remove {}: {}", partial.display(), cleanup);
            }
            Err(e)
        }
    }
}

/// Sibling of `save_path` holding an in-progress download
fn partial_path(save_path: &Path) -> PathBuf {
    let mut name = save_path.file_name().unwrap_or_default().to_os_string();
    name.push(".part");
    save_path.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{fast_config, http_responder, http_responder_with_length};

    #[test]
    fn test_artifact_url() {
        let url = artifact_url(
            "ws://192.168.1.10/SmartScope-1.0/mountControlEndpoint",
            "/Images/Temp/0.jpg",
            1700000000,
        )
        .unwrap();
        assert_eq!(
            url.as_str(),
            "http://192.168.1.10/Images/Temp/0.jpg?t=1700000000"
        );

        let url = artifact_url("ws://scope.local:8080/x", "a/b.tiff", 5).unwrap();
        assert_eq!(url.as_str(), "http://scope.local:8080/a/b.tiff?t=5");
    }

    #[tokio::test]
    async fn test_download_streams_body_to_file() {
        let (addr, requests, _server) = http_responder("200 OK", b"fake-jpeg-bytes").await;
        let client = OriginClient::new(fast_config(&format!(
            "ws://{}/SmartScope-1.0/mountControlEndpoint",
            addr
        )));

        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("obs").join("capture.jpg");
        let written = client
            .download_artifact("/Images/Temp/0.jpg", &target)
            .await
            .unwrap();

        assert_eq!(written, 15);
        assert_eq!(std::fs::read(&target).unwrap(), b"fake-jpeg-bytes");

        let requests = requests.lock().unwrap();
        assert!(requests[0].starts_with("GET /Images/Temp/0.jpg?t="));
    }

    #[tokio::test]
    async fn test_truncated_download_leaves_no_file() {
        // Advertises more bytes than it sends, then hangs up
        let (addr, _requests, _server) =
            http_responder_with_length("200 OK", b"short", 4096).await;
        let client = OriginClient::new(fast_config(&format!(
            "ws://{}/SmartScope-1.0/mountControlEndpoint",
            addr
        )));

        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("capture.jpg");
        let result = client.download_artifact("Images/Temp/1.jpg", &target).await;

        assert!(result.is_err());
        assert!(!target.exists());
        assert!(!partial_path(&target).exists());
    }

    #[test]
    fn test_partial_path_is_sibling() {
        let partial = partial_path(Path::new("/obs/capture.jpg"));
        assert_eq!(partial, Path::new("/obs/capture.jpg.part"));
    }

    #[tokio::test]
    async fn test_download_reports_http_error() {
        let (addr, _requests, _server) = http_responder("404 Not Found", b"missing").await;
        let client = OriginClient::new(fast_config(&format!(
            "ws://{}/SmartScope-1.0/mountControlEndpoint",
            addr
        )));

        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("missing.jpg");
        let err = client
            .download_artifact("Images/none.jpg", &target)
            .await
            .unwrap_err();

        assert!(matches!(err, ClientError::Download(_)));
        assert!(!target.exists());
        assert!(client
            .metrics_snapshot()
            .error_log
            .iter()
            .any(|e| e.error.contains("Download failed")));
    }
}
