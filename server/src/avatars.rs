//! Avatar image storage: one `<user_id>.png` per user under the images root.

use std::io;
use std::path::{Path, PathBuf};

use relaychat_protocol::{MAX_PAYLOAD_LEN, PNG_SIGNATURE};
use thiserror::Error;
use tokio::fs;
use tracing::warn;

const AVATAR_EXTENSION: &str = "png";

/// Reasons an uploaded avatar is refused. The connection stays open.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AvatarRejection {
    #[error("not a PNG image")]
    NotPng,

    #[error("announced {announced} bytes but received {received}")]
    SizeMismatch { announced: u64, received: usize },
}

/// Checks an upload against its announced size and the PNG signature.
pub fn validate_upload(announced: u64, bytes: &[u8]) -> Result<(), AvatarRejection> {
    if u64::try_from(bytes.len()).ok() != Some(announced) {
        return Err(AvatarRejection::SizeMismatch {
            announced,
            received: bytes.len(),
        });
    }
    if !bytes.starts_with(&PNG_SIGNATURE) {
        return Err(AvatarRejection::NotPng);
    }
    Ok(())
}

#[derive(Debug, Clone)]
pub struct AvatarStore {
    root: PathBuf,
}

impl AvatarStore {
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    #[must_use]
    pub fn path_for(&self, user_id: u32) -> PathBuf {
        self.root.join(format!("{user_id}.{AVATAR_EXTENSION}"))
    }

    /// Lists stored avatars sorted by user id. A missing root is an empty list.
    /// Files whose stem is not a user id are skipped, and so are files too large
    /// to fit in one packet.
    pub async fn list(&self) -> io::Result<Vec<(u32, PathBuf)>> {
        let mut entries = match fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };

        let mut avatars = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if !entry.file_type().await?.is_file()
                || path.extension().and_then(|e| e.to_str()) != Some(AVATAR_EXTENSION)
            {
                continue;
            }
            let Some(user_id) = path
                .file_stem()
                .and_then(|s| s.to_str())
                .and_then(|s| s.parse::<u32>().ok())
            else {
                continue;
            };
            let size = entry.metadata().await?.len();
            if size > MAX_PAYLOAD_LEN as u64 {
                warn!("Skipping avatar {}: {} bytes exceeds {}", path.display(), size, MAX_PAYLOAD_LEN);
                continue;
            }
            avatars.push((user_id, path));
        }

        avatars.sort_by_key(|(user_id, _)| *user_id);
        Ok(avatars)
    }

    pub async fn read(&self, path: &Path) -> io::Result<Vec<u8>> {
        fs::read(path).await
    }

    pub async fn write(&self, user_id: u32, bytes: &[u8]) -> io::Result<PathBuf> {
        fs::create_dir_all(&self.root).await?;
        let path = self.path_for(user_id);
        fs::write(&path, bytes).await?;
        Ok(path)
    }
}
