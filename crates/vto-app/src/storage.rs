use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};
use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use log::{debug, info};
use vto_core::output::extension_for;
use vto_core::ImageRef;

const ASSET_EXTENSIONS: [&str; 4] = ["png", "jpg", "jpeg", "webp"];

/// Reads the bytes behind an image reference. Uploads resolve within the owner's own space.
#[async_trait]
pub trait ImageSource: Send + Sync {
    async fn read(&self, owner_id: &str, image: &ImageRef) -> Result<Vec<u8>>;

    /// Drop a transient input once it has been consumed. Permanent assets are left alone.
    async fn release(&self, owner_id: &str, image: &ImageRef) -> Result<()>;
}

/// Persists result buffers and hands back a reference clients can fetch
#[async_trait]
pub trait ResultSink: Send + Sync {
    async fn persist(&self, owner_id: &str, job_id: &str, slot: usize, bytes: &[u8], mime: &str) -> Result<String>;
}

/// Safe single path component: letters, digits, `-` and `_`
pub fn is_safe_component(value: &str) -> bool {
    !value.is_empty()
        && value.len() <= 128
        && value.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

/// Uploads live under `{upload_dir}/{owner}/`, assets under their own directory
#[derive(Debug, Clone)]
pub struct FsImageSource {
    upload_dir: PathBuf,
    assets_dir: PathBuf,
}

impl FsImageSource {
    pub fn new(upload_dir: impl Into<PathBuf>, assets_dir: impl Into<PathBuf>) -> Self {
        Self {
            upload_dir: upload_dir.into(),
            assets_dir: assets_dir.into(),
        }
    }

    /// Directory holding one owner's uploads
    pub fn owner_dir(upload_dir: &Path, owner_id: &str) -> Result<PathBuf> {
        if !is_safe_component(owner_id) {
            bail!("Invalid owner id: {}", owner_id);
        }
        Ok(upload_dir.join(owner_id))
    }

    /// Resolve an upload reference, refusing anything that escapes the owner's upload dir
    fn upload_path(&self, owner_id: &str, relative: &Path) -> Result<PathBuf> {
        let owner_dir = Self::owner_dir(&self.upload_dir, owner_id)?;
        let relative = relative.strip_prefix(&owner_dir).unwrap_or(relative);
        if relative.as_os_str().is_empty()
            || !relative.components().all(|c| matches!(c, Component::Normal(_)))
        {
            bail!("Invalid upload reference: {}", relative.display());
        }
        Ok(owner_dir.join(relative))
    }

    async fn asset_path(&self, id: &str) -> Result<PathBuf> {
        if !is_safe_component(id) {
            bail!("Invalid asset id: {}", id);
        }

        for ext in ASSET_EXTENSIONS {
            let candidate = self.assets_dir.join(format!("{}.{}", id, ext));
            if tokio::fs::try_exists(&candidate).await.unwrap_or(false) {
                return Ok(candidate);
            }
        }

        bail!("Default asset not found: {}", id)
    }
}

#[async_trait]
impl ImageSource for FsImageSource {
    async fn read(&self, owner_id: &str, image: &ImageRef) -> Result<Vec<u8>> {
        let path = match image {
            ImageRef::Upload(relative) => self.upload_path(owner_id, relative)?,
            ImageRef::Asset(id) => self.asset_path(id).await?,
        };

        let bytes = tokio::fs::read(&path)
            .await
            .with_context(|| format!("Failed to read {}", path.display()))?;

        if bytes.is_empty() {
            bail!("Image file is empty: {}", path.display());
        }

        debug!("Read {} bytes from {}", bytes.len(), path.display());
        Ok(bytes)
    }

    async fn release(&self, owner_id: &str, image: &ImageRef) -> Result<()> {
        let ImageRef::Upload(relative) = image else {
            return Ok(());
        };

        let path = self.upload_path(owner_id, relative)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => {
                debug!("Removed transient upload {}", path.display());
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e).with_context(|| format!("Failed to remove {}", path.display())),
        }
    }
}

/// Writes results to `{root}/{owner}/{job}-{slot}.{ext}`
#[derive(Debug, Clone)]
pub struct FsResultSink {
    root: PathBuf,
    public_prefix: String,
}

impl FsResultSink {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            public_prefix: "results".to_string(),
        }
    }
}

#[async_trait]
impl ResultSink for FsResultSink {
    async fn persist(&self, owner_id: &str, job_id: &str, slot: usize, bytes: &[u8], mime: &str) -> Result<String> {
        if !is_safe_component(owner_id) || !is_safe_component(job_id) {
            bail!("Refusing to store result for owner '{}' job '{}'", owner_id, job_id);
        }

        let file_name = format!("{}-{}.{}", job_id, slot, extension_for(mime));
        let dir = self.root.join(owner_id);
        tokio::fs::create_dir_all(&dir)
            .await
            .with_context(|| format!("Failed to create {}", dir.display()))?;

        let path = dir.join(&file_name);
        tokio::fs::write(&path, bytes)
            .await
            .with_context(|| format!("Failed to write {}", path.display()))?;

        info!("Stored {} bytes at {}", bytes.len(), path.display());
        Ok(format!("{}/{}/{}", self.public_prefix, owner_id, file_name))
    }
}
