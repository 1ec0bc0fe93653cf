//! Prebuilt-binary install method: download, verify, drop into the install dir.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tempfile::NamedTempFile;
use tracing::{debug, info};

use super::{sha256_hex, InstallContext, InstallError};
use crate::catalog::ToolConfig;

/// Downloads ready-made binaries over HTTP(S). `file://` URLs are read from
/// disk, which covers local mirrors.
#[derive(Debug, Clone)]
pub struct PrebuiltInstaller {
    http_client: reqwest::Client,
}

impl Default for PrebuiltInstaller {
    fn default() -> Self {
        Self::new()
    }
}

impl PrebuiltInstaller {
    pub fn new() -> Self {
        let http_client = reqwest::Client::builder()
            .user_agent(concat!("toolchest/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self { http_client }
    }

    /// Fetch `url`, check it against `sha256` when given, and install it as
    /// `<install_dir>/<binary>`. Returns the installed path and the
    /// artifact's checksum.
    pub async fn fetch(
        &self,
        tool: &ToolConfig,
        url: &str,
        sha256: Option<&str>,
        ctx: &InstallContext,
    ) -> Result<(PathBuf, String), InstallError> {
        let mut cancel = ctx.cancel.clone();
        let bytes = tokio::select! {
            bytes = self.download(url) => bytes?,
            _ = cancel.cancelled() => return Err(InstallError::Cancelled),
        };

        let actual = sha256_hex(&bytes);
        if let Some(expected) = sha256 {
            if !expected.eq_ignore_ascii_case(&actual) {
                return Err(InstallError::ChecksumMismatch {
                    expected: expected.to_string(),
                    actual,
                });
            }
        }

        let dest = ctx.install_dir.join(tool.binary_name());
        let dir = ctx.install_dir.clone();
        let target = dest.clone();
        tokio::task::spawn_blocking(move || write_executable(&dir, &target, &bytes))
            .await
            .map_err(|e| InstallError::Panicked(e.to_string()))??;

        info!(tool_id = %tool.id, path = %dest.display(), "binary installed");
        Ok((dest, actual))
    }

    async fn download(&self, url: &str) -> Result<Vec<u8>, InstallError> {
        if let Some(path) = url.strip_prefix("file://") {
            debug!(path, "reading local artifact");
            return tokio::fs::read(path).await.map_err(|e| InstallError::Download {
                url: url.to_string(),
                detail: e.to_string(),
            });
        }

        let download_err = |detail: String| InstallError::Download {
            url: url.to_string(),
            detail,
        };
        let response = self
            .http_client
            .get(url)
            .send()
            .await
            .map_err(|e| download_err(e.to_string()))?;
        if !response.status().is_success() {
            return Err(download_err(format!("HTTP {}", response.status())));
        }
        let bytes = response
            .bytes()
            .await
            .map_err(|e| download_err(e.to_string()))?;
        Ok(bytes.to_vec())
    }
}

/// Temp file in the destination directory, then rename over `dest`.
fn write_executable(dir: &Path, dest: &Path, bytes: &[u8]) -> Result<(), InstallError> {
    std::fs::create_dir_all(dir)?;
    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(bytes)?;
    tmp.as_file().sync_all()?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        tmp.as_file()
            .set_permissions(std::fs::Permissions::from_mode(0o755))?;
    }
    tmp.persist(dest).map_err(|e| e.error)?;
    Ok(())
}
