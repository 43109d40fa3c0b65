pub mod locator;
pub mod namer;
pub mod scanner;

use std::collections::HashMap;
use std::io;
use std::path::{Component, Path, PathBuf};
use std::sync::RwLock;
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::fs;

use crate::snapkeep::clients::WaClient;
use crate::snapkeep::status::{MediaHandle, StatusType};

/// Directory name, under a public media collection, that holds the app's
/// saved status copies.
pub const SAVES_DIR_NAME: &str = "Saved Statuses";

/// One available storage volume (internal storage, removable SD card).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageDevice {
    pub id: String,
    pub name: String,
    pub root: PathBuf,
    pub is_default: bool,
}

/// Which public media collection saved copies are written to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SaveLocation {
    Dcim,
    Pictures,
}

impl SaveLocation {
    /// Public directory name for the given status type. Videos saved to the
    /// `Pictures` location go to `Movies`, matching the platform's
    /// collection split.
    pub fn public_directory(&self, status_type: StatusType) -> &'static str {
        match (self, status_type) {
            (SaveLocation::Dcim, _) => "DCIM",
            (SaveLocation::Pictures, StatusType::Image) => "Pictures",
            (SaveLocation::Pictures, StatusType::Video) => "Movies",
        }
    }

    /// Saves directory relative to a volume root, e.g. `DCIM/Saved Statuses`.
    pub fn relative_saves_dir(&self, status_type: StatusType) -> String {
        format!("{}/{}", self.public_directory(status_type), SAVES_DIR_NAME)
    }
}

impl Default for SaveLocation {
    fn default() -> Self {
        SaveLocation::Dcim
    }
}

/// Media collection targeted by a mediated insert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaCollection {
    Images,
    Videos,
}

impl MediaCollection {
    pub fn for_type(status_type: StatusType) -> Self {
        match status_type {
            StatusType::Image => MediaCollection::Images,
            StatusType::Video => MediaCollection::Videos,
        }
    }
}

/// Broad-storage permission signal, supplied by the embedder's permission
/// layer. When this reports `false` the repository falls back to mediated
/// access through the [`DocumentGateway`].
pub trait PermissionGate: Send + Sync {
    fn has_storage_access(&self) -> bool;
}

/// Opaque handle to a granted document tree.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TreeHandle(pub String);

/// A directory entry as reported by a mediated listing.
#[derive(Debug, Clone)]
pub struct DocumentEntry {
    pub name: String,
    pub size: u64,
    /// Modification timestamp in epoch milliseconds.
    pub modified: i64,
    pub handle: MediaHandle,
}

/// Mediated storage surface: persisted document-tree grants for reading
/// client status directories, plus content insertion for writing saved
/// copies when broad storage access is unavailable.
///
/// The core consumes this opaquely; how grants are obtained and persisted is
/// the embedder's concern. All failures are plain `io::Error`s which the
/// repository layer turns into per-item outcomes or result codes.
#[async_trait]
pub trait DocumentGateway: Send + Sync {
    /// A previously granted tree for the client's status directory, or
    /// `None` when the user never granted one.
    fn status_tree(&self, client: WaClient) -> Option<TreeHandle>;

    async fn list(&self, tree: &TreeHandle) -> io::Result<Vec<DocumentEntry>>;

    async fn read(&self, handle: &MediaHandle) -> io::Result<Vec<u8>>;

    /// Inserts a new media entry and returns its handle. Fails with
    /// `AlreadyExists` when an entry of the same name is already present in
    /// the target path, so callers can retry under a fresh name.
    async fn create_media(
        &self,
        collection: MediaCollection,
        relative_path: &str,
        name: &str,
        mime: &str,
    ) -> io::Result<MediaHandle>;

    async fn write(&self, handle: &MediaHandle, data: &[u8]) -> io::Result<()>;

    /// Stamps an entry's modification time, in epoch milliseconds. Saved
    /// copies keep their source's timestamp so copy matching stays stable.
    async fn set_modified(&self, handle: &MediaHandle, millis: i64) -> io::Result<()>;

    /// Lists previously inserted media under a relative path. An absent
    /// directory is an empty listing, not an error.
    async fn list_media(
        &self,
        collection: MediaCollection,
        relative_path: &str,
    ) -> io::Result<Vec<DocumentEntry>>;

    async fn delete(&self, handle: &MediaHandle) -> io::Result<()>;
}

pub(crate) fn system_time_millis(time: SystemTime) -> i64 {
    time.duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

const CONTENT_SCHEME: &str = "content://snapkeep/";

/// Filesystem-backed [`DocumentGateway`] for tests and desktop embedding.
///
/// Trees and content handles resolve to paths under a single root directory;
/// content URIs use the `content://snapkeep/<relative-path>` form. A real
/// Android embedder replaces this with a SAF/MediaStore-backed gateway.
pub struct FsDocumentGateway {
    root: PathBuf,
    trees: RwLock<HashMap<WaClient, String>>,
}

impl FsDocumentGateway {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            trees: RwLock::new(HashMap::new()),
        }
    }

    /// Registers a tree grant for a client's status directory, given as a
    /// path relative to the gateway root.
    pub fn grant_status_tree(&self, client: WaClient, relative: &str) {
        let mut trees = self.trees.write().expect("tree lock poisoned");
        trees.insert(client, relative.trim_matches('/').to_string());
    }

    fn checked_relative(relative: &str) -> io::Result<&Path> {
        let path = Path::new(relative);
        let escapes = path
            .components()
            .any(|c| matches!(c, Component::ParentDir | Component::RootDir));
        if escapes {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("relative path escapes the gateway root: {relative}"),
            ));
        }
        Ok(path)
    }

    fn resolve(&self, handle: &MediaHandle) -> io::Result<PathBuf> {
        match handle {
            MediaHandle::File(path) => Ok(path.clone()),
            MediaHandle::Content(uri) => {
                let relative = uri.strip_prefix(CONTENT_SCHEME).ok_or_else(|| {
                    io::Error::new(
                        io::ErrorKind::InvalidInput,
                        format!("not a snapkeep content uri: {uri}"),
                    )
                })?;
                Ok(self.root.join(Self::checked_relative(relative)?))
            }
        }
    }

    fn content_handle(&self, relative: &str) -> MediaHandle {
        MediaHandle::Content(format!("{CONTENT_SCHEME}{relative}"))
    }

    async fn list_dir(&self, relative: &str) -> io::Result<Vec<DocumentEntry>> {
        let dir = self.root.join(Self::checked_relative(relative)?);
        if !dir.is_dir() {
            return Ok(Vec::new());
        }

        let mut entries = Vec::new();
        let mut reader = fs::read_dir(&dir).await?;
        while let Some(entry) = reader.next_entry().await? {
            let metadata = entry.metadata().await?;
            if !metadata.is_file() {
                continue;
            }
            let Some(name) = entry.file_name().to_str().map(str::to_string) else {
                continue;
            };
            let modified = metadata.modified().map(system_time_millis).unwrap_or(0);
            let handle = self.content_handle(&format!("{relative}/{name}"));
            entries.push(DocumentEntry {
                name,
                size: metadata.len(),
                modified,
                handle,
            });
        }
        Ok(entries)
    }
}

#[async_trait]
impl DocumentGateway for FsDocumentGateway {
    fn status_tree(&self, client: WaClient) -> Option<TreeHandle> {
        let trees = self.trees.read().expect("tree lock poisoned");
        trees.get(&client).map(|rel| TreeHandle(rel.clone()))
    }

    async fn list(&self, tree: &TreeHandle) -> io::Result<Vec<DocumentEntry>> {
        self.list_dir(&tree.0).await
    }

    async fn read(&self, handle: &MediaHandle) -> io::Result<Vec<u8>> {
        fs::read(self.resolve(handle)?).await
    }

    async fn create_media(
        &self,
        _collection: MediaCollection,
        relative_path: &str,
        name: &str,
        _mime: &str,
    ) -> io::Result<MediaHandle> {
        let relative = format!("{}/{}", relative_path.trim_matches('/'), name);
        let path = self.root.join(Self::checked_relative(&relative)?);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }

        // Reserve the name; a concurrent insert of the same name surfaces as
        // AlreadyExists for the caller's retry loop.
        fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await?;

        Ok(self.content_handle(&relative))
    }

    async fn write(&self, handle: &MediaHandle, data: &[u8]) -> io::Result<()> {
        fs::write(self.resolve(handle)?, data).await
    }

    async fn set_modified(&self, handle: &MediaHandle, millis: i64) -> io::Result<()> {
        let path = self.resolve(handle)?;
        let mtime = UNIX_EPOCH + std::time::Duration::from_millis(millis.max(0) as u64);
        let file = std::fs::File::options().write(true).open(path)?;
        file.set_modified(mtime)
    }

    async fn list_media(
        &self,
        _collection: MediaCollection,
        relative_path: &str,
    ) -> io::Result<Vec<DocumentEntry>> {
        self.list_dir(relative_path.trim_matches('/')).await
    }

    async fn delete(&self, handle: &MediaHandle) -> io::Result<()> {
        fs::remove_file(self.resolve(handle)?).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_save_location_public_directory() {
        assert_eq!(
            SaveLocation::Dcim.public_directory(StatusType::Image),
            "DCIM"
        );
        assert_eq!(
            SaveLocation::Dcim.public_directory(StatusType::Video),
            "DCIM"
        );
        assert_eq!(
            SaveLocation::Pictures.public_directory(StatusType::Image),
            "Pictures"
        );
        assert_eq!(
            SaveLocation::Pictures.public_directory(StatusType::Video),
            "Movies"
        );
    }

    #[test]
    fn test_relative_saves_dir() {
        assert_eq!(
            SaveLocation::Dcim.relative_saves_dir(StatusType::Image),
            "DCIM/Saved Statuses"
        );
    }

    #[tokio::test]
    async fn test_status_tree_requires_grant() {
        let temp_dir = TempDir::new().unwrap();
        let gateway = FsDocumentGateway::new(temp_dir.path());

        assert!(gateway.status_tree(WaClient::WhatsApp).is_none());

        gateway.grant_status_tree(WaClient::WhatsApp, "statuses");
        let tree = gateway.status_tree(WaClient::WhatsApp).unwrap();
        assert_eq!(tree.0, "statuses");
        assert!(gateway.status_tree(WaClient::WhatsAppBusiness).is_none());
    }

    #[tokio::test]
    async fn test_list_reports_file_metadata() {
        let temp_dir = TempDir::new().unwrap();
        let gateway = FsDocumentGateway::new(temp_dir.path());

        let dir = temp_dir.path().join("statuses");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("a.jpg"), b"abcd").unwrap();
        std::fs::create_dir_all(dir.join("subdir")).unwrap();

        gateway.grant_status_tree(WaClient::WhatsApp, "statuses");
        let tree = gateway.status_tree(WaClient::WhatsApp).unwrap();
        let entries = gateway.list(&tree).await.unwrap();

        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].name, "a.jpg");
        assert_eq!(entries[0].size, 4);
        assert!(entries[0].modified > 0);
    }

    #[tokio::test]
    async fn test_create_write_read_delete_roundtrip() {
        let temp_dir = TempDir::new().unwrap();
        let gateway = FsDocumentGateway::new(temp_dir.path());

        let handle = gateway
            .create_media(
                MediaCollection::Images,
                "DCIM/Saved Statuses",
                "a.jpg",
                "image/jpeg",
            )
            .await
            .unwrap();
        gateway.write(&handle, b"payload").await.unwrap();

        let listed = gateway
            .list_media(MediaCollection::Images, "DCIM/Saved Statuses")
            .await
            .unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(gateway.read(&handle).await.unwrap(), b"payload");

        gateway.delete(&handle).await.unwrap();
        let listed = gateway
            .list_media(MediaCollection::Images, "DCIM/Saved Statuses")
            .await
            .unwrap();
        assert!(listed.is_empty());
    }

    #[tokio::test]
    async fn test_set_modified_roundtrip() {
        let temp_dir = TempDir::new().unwrap();
        let gateway = FsDocumentGateway::new(temp_dir.path());

        let handle = gateway
            .create_media(MediaCollection::Images, "DCIM", "a.jpg", "image/jpeg")
            .await
            .unwrap();
        gateway.write(&handle, b"data").await.unwrap();
        gateway.set_modified(&handle, 1_700_000_000_123).await.unwrap();

        let listed = gateway
            .list_media(MediaCollection::Images, "DCIM")
            .await
            .unwrap();
        assert_eq!(listed[0].modified, 1_700_000_000_123);
    }

    #[tokio::test]
    async fn test_create_media_rejects_existing_name() {
        let temp_dir = TempDir::new().unwrap();
        let gateway = FsDocumentGateway::new(temp_dir.path());

        gateway
            .create_media(MediaCollection::Images, "DCIM", "a.jpg", "image/jpeg")
            .await
            .unwrap();
        let err = gateway
            .create_media(MediaCollection::Images, "DCIM", "a.jpg", "image/jpeg")
            .await
            .unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::AlreadyExists);
    }

    #[tokio::test]
    async fn test_content_uri_traversal_is_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let gateway = FsDocumentGateway::new(temp_dir.path());

        let handle = MediaHandle::Content(format!("{CONTENT_SCHEME}../outside.jpg"));
        let err = gateway.read(&handle).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
    }

    #[tokio::test]
    async fn test_list_media_missing_dir_is_empty() {
        let temp_dir = TempDir::new().unwrap();
        let gateway = FsDocumentGateway::new(temp_dir.path());

        let listed = gateway
            .list_media(MediaCollection::Videos, "Movies/Saved Statuses")
            .await
            .unwrap();
        assert!(listed.is_empty());
    }
}
