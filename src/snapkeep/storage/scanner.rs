use std::path::Path;
use std::sync::Arc;

use tokio::fs;

use crate::snapkeep::clients::WaClient;
use crate::snapkeep::error::Result;
use crate::snapkeep::status::{MediaHandle, Status, StatusOrigin, StatusType};
use crate::snapkeep::storage::locator::StatusLocation;
use crate::snapkeep::storage::{system_time_millis, DocumentGateway};

/// Enumerates status candidates at a resolved location and maps them to
/// [`Status`] records. Read-only and safe to invoke repeatedly; only file
/// metadata is touched, media bytes are never opened.
pub struct StatusScanner {
    gateway: Arc<dyn DocumentGateway>,
}

impl StatusScanner {
    pub fn new(gateway: Arc<dyn DocumentGateway>) -> Self {
        Self { gateway }
    }

    /// Scans a client status directory for statuses of the given type,
    /// sorted most recent first.
    pub async fn scan(
        &self,
        location: &StatusLocation,
        status_type: StatusType,
        client: Option<WaClient>,
    ) -> Result<Vec<Status>> {
        let client_package = client.map(|c| c.package_name().to_string());
        let mut statuses = match location {
            StatusLocation::Direct { dir } => {
                self.scan_dir(dir, status_type, client_package, false).await?
            }
            StatusLocation::Mediated { tree } => {
                let entries = self.gateway.list(tree).await?;
                entries
                    .into_iter()
                    .filter(|e| status_type.accepts_file_name(&e.name))
                    .map(|e| Status {
                        status_type,
                        name: e.name,
                        handle: e.handle,
                        date_modified: e.modified,
                        size: e.size,
                        client_package: client_package.clone(),
                        origin: StatusOrigin::Discovered,
                    })
                    .collect()
            }
        };
        sort_statuses(&mut statuses);
        Ok(statuses)
    }

    /// Scans the app's own saves directory into `Saved`-origin statuses,
    /// sorted most recent first. A missing directory is an empty result.
    pub async fn scan_saved(&self, dir: &Path, status_type: StatusType) -> Result<Vec<Status>> {
        let mut statuses = self.scan_dir(dir, status_type, None, true).await?;
        sort_statuses(&mut statuses);
        Ok(statuses)
    }

    async fn scan_dir(
        &self,
        dir: &Path,
        status_type: StatusType,
        client_package: Option<String>,
        saved: bool,
    ) -> Result<Vec<Status>> {
        if !dir.is_dir() {
            return Ok(Vec::new());
        }

        let mut statuses = Vec::new();
        let mut reader = fs::read_dir(dir).await?;
        while let Some(entry) = reader.next_entry().await? {
            let Some(name) = entry.file_name().to_str().map(str::to_string) else {
                continue;
            };
            if !status_type.accepts_file_name(&name) {
                continue;
            }
            let metadata = match entry.metadata().await {
                Ok(metadata) if metadata.is_file() => metadata,
                Ok(_) => continue,
                Err(e) => {
                    // Raced with an external deletion; skip the entry.
                    tracing::debug!(
                        target: "snapkeep::scanner",
                        "Skipping unreadable entry {}: {}",
                        name,
                        e
                    );
                    continue;
                }
            };

            let path = entry.path();
            let origin = if saved {
                StatusOrigin::Saved {
                    path: Some(path.clone()),
                }
            } else {
                StatusOrigin::Discovered
            };
            statuses.push(Status {
                status_type,
                name,
                handle: MediaHandle::File(path),
                date_modified: metadata.modified().map(system_time_millis).unwrap_or(0),
                size: metadata.len(),
                client_package: client_package.clone(),
                origin,
            });
        }
        Ok(statuses)
    }
}

/// Most recent first; name breaks timestamp ties so the ordering is stable
/// across scans.
pub(crate) fn sort_statuses(statuses: &mut [Status]) {
    statuses.sort_by(|a, b| {
        b.date_modified
            .cmp(&a.date_modified)
            .then_with(|| a.name.cmp(&b.name))
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapkeep::storage::FsDocumentGateway;
    use std::time::{Duration, SystemTime};
    use tempfile::TempDir;

    fn write_with_mtime(dir: &Path, name: &str, contents: &[u8], secs_ago: u64) {
        let path = dir.join(name);
        std::fs::write(&path, contents).unwrap();
        let mtime = SystemTime::now() - Duration::from_secs(secs_ago);
        let file = std::fs::File::options().write(true).open(&path).unwrap();
        file.set_modified(mtime).unwrap();
    }

    fn scanner_for(temp_dir: &TempDir) -> StatusScanner {
        StatusScanner::new(Arc::new(FsDocumentGateway::new(temp_dir.path())))
    }

    #[tokio::test]
    async fn test_scan_filters_by_type_and_exclusions() {
        let temp_dir = TempDir::new().unwrap();
        let dir = temp_dir.path().join("statuses");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("a.jpg"), b"1").unwrap();
        std::fs::write(dir.join("b.png"), b"22").unwrap();
        std::fs::write(dir.join("c.mp4"), b"333").unwrap();
        std::fs::write(dir.join(".nomedia"), b"").unwrap();

        let scanner = scanner_for(&temp_dir);
        let location = StatusLocation::Direct { dir };

        let images = scanner
            .scan(&location, StatusType::Image, Some(WaClient::WhatsApp))
            .await
            .unwrap();
        assert_eq!(images.len(), 2);
        assert!(images.iter().all(|s| s.status_type == StatusType::Image));
        assert!(
            images
                .iter()
                .all(|s| s.client_package.as_deref() == Some("com.whatsapp"))
        );

        let videos = scanner
            .scan(&location, StatusType::Video, Some(WaClient::WhatsApp))
            .await
            .unwrap();
        assert_eq!(videos.len(), 1);
        assert_eq!(videos[0].name, "c.mp4");
        assert_eq!(videos[0].size, 3);
    }

    #[tokio::test]
    async fn test_scan_orders_most_recent_first() {
        let temp_dir = TempDir::new().unwrap();
        let dir = temp_dir.path().join("statuses");
        std::fs::create_dir_all(&dir).unwrap();
        write_with_mtime(&dir, "old.jpg", b"1", 3600);
        write_with_mtime(&dir, "new.jpg", b"2", 60);

        let scanner = scanner_for(&temp_dir);
        let statuses = scanner
            .scan(
                &StatusLocation::Direct { dir },
                StatusType::Image,
                None,
            )
            .await
            .unwrap();
        assert_eq!(statuses[0].name, "new.jpg");
        assert_eq!(statuses[1].name, "old.jpg");
    }

    #[tokio::test]
    async fn test_equal_timestamps_tie_break_on_name() {
        let temp_dir = TempDir::new().unwrap();
        let dir = temp_dir.path().join("statuses");
        std::fs::create_dir_all(&dir).unwrap();
        write_with_mtime(&dir, "b.jpg", b"1", 600);
        write_with_mtime(&dir, "a.jpg", b"2", 600);

        let scanner = scanner_for(&temp_dir);
        let statuses = scanner
            .scan(
                &StatusLocation::Direct { dir },
                StatusType::Image,
                None,
            )
            .await
            .unwrap();
        let names: Vec<_> = statuses.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["a.jpg", "b.jpg"]);
    }

    #[tokio::test]
    async fn test_scan_mediated_location() {
        let temp_dir = TempDir::new().unwrap();
        let dir = temp_dir.path().join("statuses");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("a.jpg"), b"1234").unwrap();
        std::fs::write(dir.join(".nomedia"), b"").unwrap();

        let gateway = Arc::new(FsDocumentGateway::new(temp_dir.path()));
        gateway.grant_status_tree(WaClient::WhatsApp, "statuses");
        let tree = gateway.status_tree(WaClient::WhatsApp).unwrap();

        let scanner = StatusScanner::new(gateway);
        let statuses = scanner
            .scan(
                &StatusLocation::Mediated { tree },
                StatusType::Image,
                Some(WaClient::WhatsApp),
            )
            .await
            .unwrap();
        assert_eq!(statuses.len(), 1);
        assert_eq!(statuses[0].name, "a.jpg");
        assert_eq!(statuses[0].size, 4);
        assert!(matches!(statuses[0].handle, MediaHandle::Content(_)));
        assert!(!statuses[0].is_saved());
    }

    #[tokio::test]
    async fn test_scan_saved_maps_origin_and_path() {
        let temp_dir = TempDir::new().unwrap();
        let dir = temp_dir.path().join("DCIM/Saved Statuses");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("kept.jpg"), b"12").unwrap();

        let scanner = scanner_for(&temp_dir);
        let saved = scanner.scan_saved(&dir, StatusType::Image).await.unwrap();
        assert_eq!(saved.len(), 1);
        assert!(saved[0].is_saved());
        assert_eq!(saved[0].local_path(), Some(&dir.join("kept.jpg")));
    }

    #[tokio::test]
    async fn test_scan_saved_missing_dir_is_empty() {
        let temp_dir = TempDir::new().unwrap();
        let scanner = scanner_for(&temp_dir);
        let saved = scanner
            .scan_saved(&temp_dir.path().join("nope"), StatusType::Image)
            .await
            .unwrap();
        assert!(saved.is_empty());
    }
}
