use crate::domain::ports::ManifestTransport;
use crate::error::{FinderError, Result};
use async_trait::async_trait;
use std::path::PathBuf;
use url::Url;

/// Serves manifests from a local mirror laid out as `<root>/<host>/<path>`.
///
/// Non-default ports are part of the directory name (`<host>_<port>`). Used for
/// offline resolution and the CLI's `--manifests` mode.
#[derive(Debug, Clone)]
pub struct DirectoryTransport {
    root: PathBuf,
    max_bytes: usize,
}

impl DirectoryTransport {
    pub fn new(root: impl Into<PathBuf>, max_bytes: usize) -> Self {
        Self {
            root: root.into(),
            max_bytes,
        }
    }

    /// Local file backing `url`, if the URL can be mapped at all.
    pub fn path_for(&self, url: &Url) -> Option<PathBuf> {
        let host = url.host_str()?;
        let mut path = match url.port() {
            Some(port) => self.root.join(format!("{host}_{port}")),
            None => self.root.join(host),
        };
        let mut segments = 0;
        for segment in url.path_segments()?.filter(|s| !s.is_empty()) {
            if segment == "." || segment == ".." || segment.contains('\\') {
                return None;
            }
            path.push(segment);
            segments += 1;
        }
        if segments == 0 {
            path.push("index");
        }
        Some(path)
    }
}

#[async_trait]
impl ManifestTransport for DirectoryTransport {
    async fn fetch(&self, url: &Url) -> Result<Vec<u8>> {
        let path = self.path_for(url).ok_or_else(|| FinderError::Transport {
            url: url.to_string(),
            reason: "URL does not map to a local file".to_string(),
        })?;
        let transport_error = |e: std::io::Error| FinderError::Transport {
            url: url.to_string(),
            reason: format!("{}: {e}", path.display()),
        };

        let metadata = tokio::fs::metadata(&path).await.map_err(transport_error)?;
        if metadata.len() > self.max_bytes as u64 {
            return Err(FinderError::DocumentTooLarge {
                url: url.to_string(),
                limit: self.max_bytes,
            });
        }
        tokio::fs::read(&path).await.map_err(transport_error)
    }
}
