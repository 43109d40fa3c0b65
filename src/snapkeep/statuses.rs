use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::{Duration, UNIX_EPOCH};

use dashmap::DashMap;
use futures::future::join_all;
use tokio::io::AsyncWriteExt;
use tokio::sync::{broadcast, watch, Semaphore};

use crate::snapkeep::clients::{ClientProber, WaClient};
use crate::snapkeep::error::{Result, SnapkeepError};
use crate::snapkeep::results::{ResultCode, ShareData, StatusQueryResult};
use crate::snapkeep::status::{MediaHandle, Status, StatusOrigin, StatusType};
use crate::snapkeep::storage::locator::{StorageLocator, Unresolvable};
use crate::snapkeep::storage::scanner::{sort_statuses, StatusScanner};
use crate::snapkeep::storage::{
    namer, DocumentGateway, MediaCollection, SaveLocation, StorageDevice, SAVES_DIR_NAME,
};

const SAVE_CONCURRENCY: usize = 4;
const CHANGES_BUFFER_SIZE: usize = 32;
const SCAN_BUFFER_SIZE: usize = 8;

/// Which root a scan targets: client-owned status directories or the app's
/// own saves directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScanSection {
    Client,
    Saved,
}

/// Fired after a successful save or delete so observers can re-scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusesChanged {
    pub status_type: StatusType,
}

/// Result of subscribing to scan results for one section/type: the latest
/// known result plus a receiver for subsequent ones. Dropping the receiver
/// is the only teardown required.
pub struct StatusStream {
    pub current: StatusQueryResult,
    pub updates: broadcast::Receiver<StatusQueryResult>,
}

/// Live "is this status already saved" view. The flag is re-evaluated
/// against the filesystem on every repository mutation.
pub struct SavedStateSubscription {
    pub is_saved: bool,
    pub updates: watch::Receiver<bool>,
}

/// The transactional surface for all status operations.
///
/// Scans per `(section, type)` key follow a last-result-wins policy: every
/// request bumps a generation counter and only the scan still holding the
/// newest generation publishes its result to subscribers. Bulk saves run
/// under bounded concurrency with per-item failure isolation.
pub struct StatusRepository {
    locator: StorageLocator,
    scanner: StatusScanner,
    gateway: Arc<dyn DocumentGateway>,
    prober: Arc<dyn ClientProber>,
    devices: RwLock<Vec<StorageDevice>>,
    selected_device_id: RwLock<Option<String>>,
    save_location: RwLock<SaveLocation>,
    save_permits: Semaphore,
    generations: DashMap<(ScanSection, StatusType), Arc<AtomicU64>>,
    latest: DashMap<(ScanSection, StatusType), StatusQueryResult>,
    streams: DashMap<(ScanSection, StatusType), broadcast::Sender<StatusQueryResult>>,
    changed: broadcast::Sender<StatusesChanged>,
}

impl StatusRepository {
    pub fn new(
        locator: StorageLocator,
        gateway: Arc<dyn DocumentGateway>,
        prober: Arc<dyn ClientProber>,
        devices: Vec<StorageDevice>,
    ) -> Self {
        let (changed, _) = broadcast::channel(CHANGES_BUFFER_SIZE);
        Self {
            locator,
            scanner: StatusScanner::new(gateway.clone()),
            gateway,
            prober,
            devices: RwLock::new(devices),
            selected_device_id: RwLock::new(None),
            save_location: RwLock::new(SaveLocation::default()),
            save_permits: Semaphore::new(SAVE_CONCURRENCY),
            generations: DashMap::new(),
            latest: DashMap::new(),
            streams: DashMap::new(),
            changed,
        }
    }

    // ----- scans -----

    /// Scans all installed clients' status directories for the given type.
    pub async fn statuses(&self, status_type: StatusType) -> StatusQueryResult {
        self.run_scan(ScanSection::Client, status_type).await
    }

    /// Scans the app's own saves directory for the given type.
    pub async fn saved_statuses(&self, status_type: StatusType) -> StatusQueryResult {
        self.run_scan(ScanSection::Saved, status_type).await
    }

    pub fn subscribe_statuses(&self, status_type: StatusType) -> StatusStream {
        self.subscribe(ScanSection::Client, status_type)
    }

    pub fn subscribe_saved_statuses(&self, status_type: StatusType) -> StatusStream {
        self.subscribe(ScanSection::Saved, status_type)
    }

    /// Change events fired after successful saves and deletes, for observers
    /// that re-trigger scans.
    pub fn subscribe_changes(&self) -> broadcast::Receiver<StatusesChanged> {
        self.changed.subscribe()
    }

    async fn run_scan(&self, section: ScanSection, status_type: StatusType) -> StatusQueryResult {
        let generation = self.begin_scan(section, status_type);
        self.publish(
            section,
            status_type,
            generation,
            StatusQueryResult::new(ResultCode::Loading),
        );

        let result = match section {
            ScanSection::Client => self.scan_clients(status_type).await,
            ScanSection::Saved => self.scan_saved(status_type).await,
        };

        if !self.publish(section, status_type, generation, result.clone()) {
            tracing::debug!(
                target: "snapkeep::statuses",
                "Discarding stale scan result for {:?}/{:?}",
                section,
                status_type
            );
        }
        result
    }

    async fn scan_clients(&self, status_type: StatusType) -> StatusQueryResult {
        let installed: Vec<WaClient> = WaClient::ALL
            .into_iter()
            .filter(|c| self.prober.is_installed(*c))
            .collect();
        if installed.is_empty() {
            return StatusQueryResult::new(ResultCode::NotInstalled);
        }

        let Some(device) = self.selected_device() else {
            tracing::warn!(target: "snapkeep::statuses", "No storage device available");
            return StatusQueryResult::new(ResultCode::NoStatuses);
        };

        let mut all = Vec::new();
        let mut permission_denied = false;
        for client in installed {
            match self.locator.locate_statuses(client, &device) {
                Ok(location) => {
                    match self.scanner.scan(&location, status_type, Some(client)).await {
                        Ok(statuses) => all.extend(statuses),
                        Err(e) => {
                            tracing::warn!(
                                target: "snapkeep::statuses",
                                "Failed to scan {} statuses: {}",
                                client.display_name(),
                                e
                            );
                        }
                    }
                }
                Err(Unresolvable::PermissionDenied) => permission_denied = true,
                Err(Unresolvable::Missing) => {}
            }
        }

        if !all.is_empty() {
            sort_statuses(&mut all);
            StatusQueryResult::success(all)
        } else if permission_denied {
            StatusQueryResult::new(ResultCode::PermissionError)
        } else {
            StatusQueryResult::new(ResultCode::NoStatuses)
        }
    }

    async fn scan_saved(&self, status_type: StatusType) -> StatusQueryResult {
        match self.saved_snapshot(status_type).await {
            Ok(statuses) if statuses.is_empty() => StatusQueryResult::new(ResultCode::NoStatuses),
            Ok(statuses) => StatusQueryResult::success(statuses),
            Err(e) => {
                tracing::warn!(
                    target: "snapkeep::statuses",
                    "Failed to list saved statuses: {}",
                    e
                );
                StatusQueryResult::new(ResultCode::PermissionError)
            }
        }
    }

    /// The saves directory contents as `Saved`-origin statuses, through
    /// whichever strategy is currently available.
    async fn saved_snapshot(&self, status_type: StatusType) -> Result<Vec<Status>> {
        let location = self.save_location();
        if self.locator.has_storage_access() {
            let Some(device) = self.selected_device() else {
                return Ok(Vec::new());
            };
            let dir = self.locator.saves_dir(status_type, location, &device);
            self.scanner.scan_saved(&dir, status_type).await
        } else {
            let entries = self
                .gateway
                .list_media(
                    MediaCollection::for_type(status_type),
                    &location.relative_saves_dir(status_type),
                )
                .await?;
            let mut statuses: Vec<Status> = entries
                .into_iter()
                .filter(|e| status_type.accepts_file_name(&e.name))
                .map(|e| Status {
                    status_type,
                    name: e.name,
                    handle: e.handle,
                    date_modified: e.modified,
                    size: e.size,
                    client_package: None,
                    origin: StatusOrigin::Saved { path: None },
                })
                .collect();
            sort_statuses(&mut statuses);
            Ok(statuses)
        }
    }

    // ----- saves -----

    /// Copies the status into the saves directory under a collision-free
    /// name. Returns the new location handle, or `None` on failure (which is
    /// a reportable outcome, never a panic).
    pub async fn save(&self, status: &Status, save_name: Option<&str>) -> Option<MediaHandle> {
        match self.try_save(status, save_name).await {
            Ok(handle) => {
                self.notify_changed(status.status_type);
                Some(handle)
            }
            Err(e) => {
                tracing::warn!(
                    target: "snapkeep::statuses",
                    "Failed to save status {}: {}",
                    status.name,
                    e
                );
                None
            }
        }
    }

    /// Saves a batch under bounded concurrency, continuing past individual
    /// failures. Returns the successful (status, new handle) pairs in input
    /// order; a partial result is distinguishable from a total failure by
    /// its length.
    pub async fn save_all(&self, statuses: &[Status]) -> Vec<(Status, MediaHandle)> {
        let tasks = statuses.iter().map(|status| async move {
            let Ok(_permit) = self.save_permits.acquire().await else {
                return None;
            };
            self.save(status, None)
                .await
                .map(|handle| (status.clone(), handle))
        });

        join_all(tasks).await.into_iter().flatten().collect()
    }

    async fn try_save(&self, status: &Status, save_name: Option<&str>) -> Result<MediaHandle> {
        let data = self.read_source(status).await?;
        let now = chrono::Utc::now().timestamp_millis();
        let status_type = status.status_type;
        let location = self.save_location();

        if self.locator.has_storage_access() {
            let device = self.selected_device().ok_or_else(|| {
                SnapkeepError::Configuration("no storage device available".to_string())
            })?;
            let dir = self.locator.saves_dir(status_type, location, &device);
            tokio::fs::create_dir_all(&dir).await?;

            // create_new re-checks existence at write time, so concurrent
            // saves cannot clobber each other even with a stale name view.
            let mut delta = 0;
            loop {
                let name = namer::candidate_name(status_type, save_name, now, delta);
                let path = dir.join(&name);
                match tokio::fs::OpenOptions::new()
                    .write(true)
                    .create_new(true)
                    .open(&path)
                    .await
                {
                    Ok(mut file) => {
                        file.write_all(&data).await?;
                        file.flush().await?;
                        self.stamp_modified(file, status).await;
                        return Ok(MediaHandle::File(path));
                    }
                    Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                        delta += 1;
                    }
                    Err(e) => return Err(e.into()),
                }
            }
        } else {
            let collection = MediaCollection::for_type(status_type);
            let relative = location.relative_saves_dir(status_type);
            let mut existing: HashSet<String> = self
                .gateway
                .list_media(collection, &relative)
                .await?
                .into_iter()
                .map(|e| e.name)
                .collect();

            loop {
                let name = namer::unique_name(status_type, save_name, now, &existing);
                match self
                    .gateway
                    .create_media(collection, &relative, &name, status_type.mime_type())
                    .await
                {
                    Ok(handle) => {
                        self.gateway.write(&handle, &data).await?;
                        if status.date_modified > 0 {
                            if let Err(e) = self
                                .gateway
                                .set_modified(&handle, status.date_modified)
                                .await
                            {
                                tracing::debug!(
                                    target: "snapkeep::statuses",
                                    "Could not stamp modified time: {}",
                                    e
                                );
                            }
                        }
                        return Ok(handle);
                    }
                    Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                        // Raced with a concurrent insert; widen the view and retry.
                        existing.insert(name);
                    }
                    Err(e) => return Err(e.into()),
                }
            }
        }
    }

    /// Saved copies keep the source's modification timestamp; that is what
    /// makes them recognizable as copies on later scans. Best effort.
    async fn stamp_modified(&self, file: tokio::fs::File, status: &Status) {
        if status.date_modified <= 0 {
            return;
        }
        let mtime = UNIX_EPOCH + Duration::from_millis(status.date_modified as u64);
        if let Err(e) = file.into_std().await.set_modified(mtime) {
            tracing::debug!(
                target: "snapkeep::statuses",
                "Could not stamp modified time: {}",
                e
            );
        }
    }

    async fn read_source(&self, status: &Status) -> Result<Vec<u8>> {
        match &status.handle {
            MediaHandle::File(path) => Ok(tokio::fs::read(path).await?),
            MediaHandle::Content(_) => Ok(self.gateway.read(&status.handle).await?),
        }
    }

    // ----- deletes -----

    /// Removes a previously saved status. Only app-owned (`Saved`) statuses
    /// are in contract; anything else is refused.
    pub async fn delete(&self, status: &Status) -> bool {
        match self.try_delete(status).await {
            Ok(()) => {
                self.notify_changed(status.status_type);
                true
            }
            Err(e) => {
                tracing::warn!(
                    target: "snapkeep::statuses",
                    "Failed to delete status {}: {}",
                    status.name,
                    e
                );
                false
            }
        }
    }

    /// Deletes a batch, continuing past individual failures. Returns the
    /// number of statuses actually removed.
    pub async fn delete_all(&self, statuses: &[Status]) -> usize {
        let mut deleted = 0;
        for status in statuses {
            if self.delete(status).await {
                deleted += 1;
            }
        }
        deleted
    }

    async fn try_delete(&self, status: &Status) -> Result<()> {
        if !status.is_saved() {
            return Err(SnapkeepError::InvalidStatus(
                "only saved statuses may be deleted".to_string(),
            ));
        }
        match &status.handle {
            MediaHandle::File(path) => {
                // The handle must live in a saves directory; the repository
                // never deletes from a client-owned root.
                if !path.components().any(|c| c.as_os_str() == SAVES_DIR_NAME) {
                    return Err(SnapkeepError::InvalidStatus(format!(
                        "refusing to delete outside the saves directory: {}",
                        path.display()
                    )));
                }
                tokio::fs::remove_file(path).await?;
            }
            MediaHandle::Content(_) => {
                self.gateway.delete(&status.handle).await?;
            }
        }
        Ok(())
    }

    // ----- share -----

    pub fn share(&self, status: &Status) -> ShareData {
        ShareData::from_statuses(std::slice::from_ref(status))
    }

    pub fn share_all(&self, statuses: &[Status]) -> ShareData {
        ShareData::from_statuses(statuses)
    }

    // ----- saved-state queries -----

    /// Whether the saves directory currently contains a copy of this status.
    /// Always consults live state, never a cached flag.
    pub async fn status_is_saved(&self, status: &Status) -> bool {
        match self.saved_snapshot(status.status_type).await {
            Ok(saved) => saved.iter().any(|s| s.same_content(status)),
            Err(_) => false,
        }
    }

    /// Live saved-state view: current flag plus a watch that re-evaluates on
    /// every repository mutation of the same type. The background task ends
    /// when either side of the subscription is dropped.
    pub async fn subscribe_saved_state(self: Arc<Self>, status: &Status) -> SavedStateSubscription {
        let is_saved = self.status_is_saved(status).await;
        let (tx, rx) = watch::channel(is_saved);
        let mut changes = self.changed.subscribe();
        let weak = Arc::downgrade(&self);
        let status = status.clone();

        tokio::spawn(async move {
            loop {
                match changes.recv().await {
                    Ok(event) => {
                        if event.status_type != status.status_type {
                            continue;
                        }
                        let Some(repository) = weak.upgrade() else {
                            break;
                        };
                        let is_saved = repository.status_is_saved(&status).await;
                        if tx.send(is_saved).is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });

        SavedStateSubscription {
            is_saved,
            updates: rx,
        }
    }

    // ----- settings -----

    pub fn storage_devices(&self) -> Vec<StorageDevice> {
        self.devices.read().expect("devices lock poisoned").clone()
    }

    pub fn set_storage_devices(&self, devices: Vec<StorageDevice>) {
        *self.devices.write().expect("devices lock poisoned") = devices;
    }

    pub fn select_storage_device(&self, id: &str) -> Result<()> {
        let known = self
            .devices
            .read()
            .expect("devices lock poisoned")
            .iter()
            .any(|d| d.id == id);
        if !known {
            return Err(SnapkeepError::UnknownStorageDevice(id.to_string()));
        }
        *self
            .selected_device_id
            .write()
            .expect("selected device lock poisoned") = Some(id.to_string());
        Ok(())
    }

    /// The user-selected device, the volume marked default, or the first
    /// known volume, in that order.
    pub fn selected_device(&self) -> Option<StorageDevice> {
        let devices = self.devices.read().expect("devices lock poisoned");
        let selected = self
            .selected_device_id
            .read()
            .expect("selected device lock poisoned");
        if let Some(id) = selected.as_deref() {
            if let Some(device) = devices.iter().find(|d| d.id == id) {
                return Some(device.clone());
            }
        }
        devices
            .iter()
            .find(|d| d.is_default)
            .or_else(|| devices.first())
            .cloned()
    }

    pub fn save_location(&self) -> SaveLocation {
        *self
            .save_location
            .read()
            .expect("save location lock poisoned")
    }

    pub fn set_save_location(&self, location: SaveLocation) {
        *self
            .save_location
            .write()
            .expect("save location lock poisoned") = location;
    }

    // ----- internals -----

    fn begin_scan(&self, section: ScanSection, status_type: StatusType) -> u64 {
        let counter = self
            .generations
            .entry((section, status_type))
            .or_insert_with(|| Arc::new(AtomicU64::new(0)))
            .clone();
        counter.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn is_current(&self, section: ScanSection, status_type: StatusType, generation: u64) -> bool {
        self.generations
            .get(&(section, status_type))
            .map(|counter| counter.load(Ordering::SeqCst) == generation)
            .unwrap_or(false)
    }

    /// Stores and emits a result unless a newer scan has started since
    /// `generation` was taken. Returns whether the result was published.
    fn publish(
        &self,
        section: ScanSection,
        status_type: StatusType,
        generation: u64,
        result: StatusQueryResult,
    ) -> bool {
        if !self.is_current(section, status_type, generation) {
            return false;
        }
        self.latest.insert((section, status_type), result.clone());
        if let Some(sender) = self.streams.get(&(section, status_type)) {
            if sender.send(result).is_err() && sender.receiver_count() == 0 {
                drop(sender);
                self.streams.remove(&(section, status_type));
            }
        }
        true
    }

    fn subscribe(&self, section: ScanSection, status_type: StatusType) -> StatusStream {
        let updates = self
            .streams
            .entry((section, status_type))
            .or_insert_with(|| broadcast::channel(SCAN_BUFFER_SIZE).0)
            .subscribe();
        let current = self
            .latest
            .get(&(section, status_type))
            .map(|r| r.value().clone())
            .unwrap_or_default();
        StatusStream { current, updates }
    }

    fn notify_changed(&self, status_type: StatusType) {
        let _ = self.changed.send(StatusesChanged { status_type });
    }
}
