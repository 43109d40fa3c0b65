use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use tokio::sync::broadcast;

pub mod clients;
pub mod countries;
pub mod database;
pub mod error;
pub mod messages;
pub mod results;
pub mod status;
pub mod statuses;
pub mod storage;

use crate::init_tracing;
use clients::{ClientProber, WaClient};
use countries::{Country, CountryProvider};
use database::Database;
use error::{Result, SnapkeepError};
use messages::{CaptureResult, Conversation, ConversationSubscription, MessageEntity, MessageStore};
use results::{DeletionResult, SaveResult, ShareData, StatusQueryResult};
use status::{Status, StatusType};
use statuses::{SavedStateSubscription, StatusRepository, StatusStream, StatusesChanged};
use storage::locator::StorageLocator;
use storage::{DocumentGateway, PermissionGate, SaveLocation, StorageDevice};

#[derive(Clone, Debug)]
pub struct SnapkeepConfig {
    /// Directory for application data
    pub data_dir: PathBuf,

    /// Directory for application logs
    pub logs_dir: PathBuf,
}

impl SnapkeepConfig {
    pub fn new(data_dir: &Path, logs_dir: &Path) -> Self {
        let env_suffix = if cfg!(debug_assertions) {
            "dev"
        } else {
            "release"
        };
        let formatted_data_dir = data_dir.join(env_suffix);
        let formatted_logs_dir = logs_dir.join(env_suffix);

        Self {
            data_dir: formatted_data_dir,
            logs_dir: formatted_logs_dir,
        }
    }
}

/// External collaborators, injected at initialization. Every platform
/// dependency of the core arrives here; there is no ambient lookup.
pub struct Collaborators {
    pub permission_gate: Arc<dyn PermissionGate>,
    pub document_gateway: Arc<dyn DocumentGateway>,
    pub client_prober: Arc<dyn ClientProber>,
    pub countries: Arc<dyn CountryProvider>,
    pub storage_devices: Vec<StorageDevice>,
}

/// The application core: status discovery/save/delete/share, the captured
/// message store, and country metadata, behind one surface consumed by the
/// presentation layer.
pub struct Snapkeep {
    pub config: SnapkeepConfig,
    database: Arc<Database>,
    statuses: Arc<StatusRepository>,
    messages: MessageStore,
    countries: Arc<dyn CountryProvider>,
    prober: Arc<dyn ClientProber>,
}

impl Snapkeep {
    /// Initializes the core with the provided configuration and
    /// collaborators.
    ///
    /// Sets up the data and log directories, configures logging, opens the
    /// database, and builds the status repository and message store.
    ///
    /// # Errors
    ///
    /// Returns an error if a directory cannot be created or the database
    /// cannot be opened/migrated. Missing storage permission is NOT an
    /// initialization error; it surfaces later as `PermissionError` results.
    pub async fn initialize(config: SnapkeepConfig, collaborators: Collaborators) -> Result<Self> {
        let data_dir = &config.data_dir;
        let logs_dir = &config.logs_dir;

        std::fs::create_dir_all(data_dir)
            .with_context(|| format!("Failed to create data directory: {:?}", data_dir))
            .map_err(SnapkeepError::from)?;
        std::fs::create_dir_all(logs_dir)
            .with_context(|| format!("Failed to create logs directory: {:?}", logs_dir))
            .map_err(SnapkeepError::from)?;

        // Only initialize tracing once
        init_tracing(logs_dir);

        tracing::debug!(
            target: "snapkeep::initialize",
            "Logging initialized in directory: {:?}",
            logs_dir
        );

        let database = Arc::new(Database::new(data_dir.join("snapkeep.sqlite")).await?);

        let locator = StorageLocator::new(
            collaborators.permission_gate,
            collaborators.document_gateway.clone(),
        );
        let statuses = Arc::new(StatusRepository::new(
            locator,
            collaborators.document_gateway,
            collaborators.client_prober.clone(),
            collaborators.storage_devices,
        ));
        let messages = MessageStore::new(database.clone());

        Ok(Self {
            config,
            database,
            statuses,
            messages,
            countries: collaborators.countries,
            prober: collaborators.client_prober,
        })
    }

    // ----- clients -----

    /// The known clients currently installed on the device.
    pub fn installed_clients(&self) -> Vec<WaClient> {
        WaClient::ALL
            .into_iter()
            .filter(|c| self.prober.is_installed(*c))
            .collect()
    }

    // ----- statuses -----

    pub async fn statuses(&self, status_type: StatusType) -> StatusQueryResult {
        self.statuses.statuses(status_type).await
    }

    pub async fn saved_statuses(&self, status_type: StatusType) -> StatusQueryResult {
        self.statuses.saved_statuses(status_type).await
    }

    pub fn subscribe_statuses(&self, status_type: StatusType) -> StatusStream {
        self.statuses.subscribe_statuses(status_type)
    }

    pub fn subscribe_saved_statuses(&self, status_type: StatusType) -> StatusStream {
        self.statuses.subscribe_saved_statuses(status_type)
    }

    pub fn subscribe_status_changes(&self) -> broadcast::Receiver<StatusesChanged> {
        self.statuses.subscribe_changes()
    }

    pub async fn status_is_saved(&self, status: &Status) -> bool {
        self.statuses.status_is_saved(status).await
    }

    pub async fn subscribe_saved_state(&self, status: &Status) -> SavedStateSubscription {
        self.statuses.clone().subscribe_saved_state(status).await
    }

    pub async fn save_status(&self, status: &Status, save_name: Option<&str>) -> SaveResult {
        let handle = self.statuses.save(status, save_name).await;
        SaveResult::single(status, handle)
    }

    pub async fn save_statuses(&self, statuses: &[Status]) -> SaveResult {
        let saved = self.statuses.save_all(statuses).await;
        SaveResult::completed(saved)
    }

    pub async fn delete_status(&self, status: &Status) -> DeletionResult {
        let success = self.statuses.delete(status).await;
        DeletionResult::single(status, success)
    }

    pub async fn delete_statuses(&self, statuses: &[Status]) -> DeletionResult {
        let deleted = self.statuses.delete_all(statuses).await;
        DeletionResult::new(statuses.to_vec(), deleted)
    }

    pub fn share_status(&self, status: &Status) -> ShareData {
        self.statuses.share(status)
    }

    pub fn share_statuses(&self, statuses: &[Status]) -> ShareData {
        self.statuses.share_all(statuses)
    }

    // ----- storage settings -----

    pub fn storage_devices(&self) -> Vec<StorageDevice> {
        self.statuses.storage_devices()
    }

    pub fn set_storage_devices(&self, devices: Vec<StorageDevice>) {
        self.statuses.set_storage_devices(devices);
    }

    pub fn select_storage_device(&self, id: &str) -> Result<()> {
        self.statuses.select_storage_device(id)
    }

    pub fn save_location(&self) -> SaveLocation {
        self.statuses.save_location()
    }

    pub fn set_save_location(&self, location: SaveLocation) {
        self.statuses.set_save_location(location);
    }

    // ----- messages -----

    /// Entry point for the notification capture service. The sender
    /// blacklist is applied before anything reaches the store.
    pub async fn capture_message(
        &self,
        sender_name: &str,
        content: &str,
        client_package: Option<&str>,
        time: i64,
    ) -> Result<CaptureResult> {
        self.messages
            .capture(sender_name, content, client_package, time)
            .await
    }

    pub async fn insert_message(&self, message: &MessageEntity) -> Result<i64> {
        self.messages.insert(message).await
    }

    pub async fn list_conversations(&self) -> Result<Vec<Conversation>> {
        self.messages.list_conversations().await
    }

    pub async fn subscribe_conversations(&self) -> Result<ConversationSubscription> {
        self.messages.subscribe_conversations().await
    }

    pub async fn received_messages(&self, sender: &Conversation) -> Result<Vec<MessageEntity>> {
        self.messages.list_messages(&sender.name).await
    }

    pub async fn remove_message(&self, message: &MessageEntity) -> Result<()> {
        self.messages.remove_message(message).await
    }

    pub async fn remove_messages(&self, messages: &[MessageEntity]) -> Result<()> {
        self.messages.remove_messages(messages).await
    }

    /// Deletes every message of the given conversations, optionally
    /// blacklisting the senders so they are not captured again.
    pub async fn delete_conversations(
        &self,
        conversations: &[Conversation],
        add_to_blacklist: bool,
    ) -> Result<()> {
        let senders: Vec<String> = conversations.iter().map(|c| c.name.clone()).collect();
        self.messages.delete_conversations(&senders).await?;
        if add_to_blacklist {
            for sender in &senders {
                self.messages.blacklist_sender(sender);
            }
        }
        Ok(())
    }

    pub async fn clear_messages(&self) -> Result<()> {
        self.messages.clear_messages().await
    }

    pub fn blacklisted_senders(&self) -> HashSet<String> {
        self.messages.blacklisted_senders()
    }

    pub fn set_blacklisted_senders(&self, senders: HashSet<String>) {
        self.messages.set_blacklisted_senders(senders);
    }

    pub fn blacklist_sender(&self, sender_name: &str) {
        self.messages.blacklist_sender(sender_name);
    }

    // ----- countries -----

    pub fn all_countries(&self) -> Vec<Country> {
        self.countries.all_countries()
    }

    pub fn default_country(&self) -> Country {
        self.countries.default_country()
    }

    pub fn set_default_country(&self, code: &str) {
        self.countries.set_default_country(code);
    }

    // ----- maintenance -----

    /// Deletes all data owned by this core: captured messages and log
    /// files. Saved status copies live in the user's public media
    /// collections and are intentionally left alone.
    pub async fn delete_all_data(&self) -> Result<()> {
        tracing::debug!(target: "snapkeep::delete_all_data", "Deleting all data");

        self.database.delete_all_data().await?;

        if self.config.logs_dir.exists() {
            for entry in std::fs::read_dir(&self.config.logs_dir)? {
                let entry = entry?;
                let path = entry.path();
                if path.is_file() {
                    std::fs::remove_file(path)?;
                } else if path.is_dir() {
                    std::fs::remove_dir_all(path)?;
                }
            }
        }

        Ok(())
    }
}

impl std::fmt::Debug for Snapkeep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Snapkeep")
            .field("config", &self.config)
            .field("database", &"<REDACTED>")
            .field("statuses", &"<REDACTED>")
            .field("messages", &"<REDACTED>")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapkeep::countries::StaticCountries;
    use crate::snapkeep::results::ResultCode;
    use crate::snapkeep::storage::FsDocumentGateway;
    use tempfile::TempDir;

    struct Gate(bool);

    impl PermissionGate for Gate {
        fn has_storage_access(&self) -> bool {
            self.0
        }
    }

    struct Prober(Vec<WaClient>);

    impl ClientProber for Prober {
        fn is_installed(&self, client: WaClient) -> bool {
            self.0.contains(&client)
        }
    }

    struct TestCore {
        snapkeep: Snapkeep,
        root: TempDir,
        _dirs: (TempDir, TempDir),
    }

    async fn create_test_core(installed: Vec<WaClient>) -> TestCore {
        let root = TempDir::new().expect("Failed to create temp storage root");
        let data_temp_dir = TempDir::new().expect("Failed to create temp data dir");
        let logs_temp_dir = TempDir::new().expect("Failed to create temp logs dir");

        let config = SnapkeepConfig::new(data_temp_dir.path(), logs_temp_dir.path());
        let collaborators = Collaborators {
            permission_gate: Arc::new(Gate(true)),
            document_gateway: Arc::new(FsDocumentGateway::new(root.path())),
            client_prober: Arc::new(Prober(installed)),
            countries: Arc::new(StaticCountries::new()),
            storage_devices: vec![StorageDevice {
                id: "internal".to_string(),
                name: "Internal storage".to_string(),
                root: root.path().to_path_buf(),
                is_default: true,
            }],
        };

        let snapkeep = Snapkeep::initialize(config, collaborators)
            .await
            .expect("Failed to initialize");
        TestCore {
            snapkeep,
            root,
            _dirs: (data_temp_dir, logs_temp_dir),
        }
    }

    fn seed_status(core: &TestCore, name: &str, contents: &[u8]) {
        let dir = core
            .root
            .path()
            .join(WaClient::WhatsApp.scoped_status_dir());
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join(name), contents).unwrap();
    }

    #[test]
    fn test_config_new() {
        let data_dir = std::path::Path::new("/test/data");
        let logs_dir = std::path::Path::new("/test/logs");

        let config = SnapkeepConfig::new(data_dir, logs_dir);

        if cfg!(debug_assertions) {
            assert_eq!(config.data_dir, data_dir.join("dev"));
            assert_eq!(config.logs_dir, logs_dir.join("dev"));
        } else {
            assert_eq!(config.data_dir, data_dir.join("release"));
            assert_eq!(config.logs_dir, logs_dir.join("release"));
        }
    }

    #[tokio::test]
    async fn test_initialization_creates_directories() {
        let core = create_test_core(vec![WaClient::WhatsApp]).await;
        assert!(core.snapkeep.config.data_dir.exists());
        assert!(core.snapkeep.config.logs_dir.exists());
    }

    #[tokio::test]
    async fn test_debug_format_redacts_internals() {
        let core = create_test_core(vec![]).await;
        let debug_str = format!("{:?}", core.snapkeep);
        assert!(debug_str.contains("Snapkeep"));
        assert!(debug_str.contains("config"));
        assert!(debug_str.contains("<REDACTED>"));
    }

    #[tokio::test]
    async fn test_installed_clients_filters_through_prober() {
        let core = create_test_core(vec![WaClient::WhatsAppBusiness]).await;
        assert_eq!(
            core.snapkeep.installed_clients(),
            vec![WaClient::WhatsAppBusiness]
        );
    }

    #[tokio::test]
    async fn test_save_statuses_reports_partial_result() {
        let core = create_test_core(vec![WaClient::WhatsApp]).await;
        seed_status(&core, "a.jpg", b"a");
        seed_status(&core, "b.jpg", b"bb");

        let discovered = core.snapkeep.statuses(StatusType::Image).await.statuses;
        assert_eq!(discovered.len(), 2);

        // One source vanishes; the batch still reports the other.
        let dir = core
            .root
            .path()
            .join(WaClient::WhatsApp.scoped_status_dir());
        std::fs::remove_file(dir.join("a.jpg")).unwrap();

        let result = core.snapkeep.save_statuses(&discovered).await;
        assert_eq!(result.saved, 1);
        assert_eq!(result.statuses.len(), 1);
        assert_eq!(result.handles.len(), 1);
        assert!(result.is_success());
    }

    #[tokio::test]
    async fn test_delete_statuses_partial_is_not_success() {
        let core = create_test_core(vec![WaClient::WhatsApp]).await;
        seed_status(&core, "a.jpg", b"a");
        seed_status(&core, "b.jpg", b"bb");

        let discovered = core.snapkeep.statuses(StatusType::Image).await.statuses;
        core.snapkeep.save_statuses(&discovered).await;

        let saved = core
            .snapkeep
            .saved_statuses(StatusType::Image)
            .await
            .statuses;
        assert_eq!(saved.len(), 2);

        std::fs::remove_file(saved[0].local_path().unwrap()).unwrap();

        let result = core.snapkeep.delete_statuses(&saved).await;
        assert_eq!(result.deleted, 1);
        assert_eq!(result.statuses.len(), 2);
        assert!(!result.is_success());
    }

    #[tokio::test]
    async fn test_save_single_reports_handle() {
        let core = create_test_core(vec![WaClient::WhatsApp]).await;
        seed_status(&core, "a.jpg", b"payload");

        let discovered = core.snapkeep.statuses(StatusType::Image).await.statuses;
        let result = core.snapkeep.save_status(&discovered[0], None).await;
        assert!(result.is_success());
        assert_eq!(result.handles.len(), 1);

        // The copy now shows up as saved.
        assert!(core.snapkeep.status_is_saved(&discovered[0]).await);
    }

    #[tokio::test]
    async fn test_statuses_without_clients_is_not_installed() {
        let core = create_test_core(vec![]).await;
        let result = core.snapkeep.statuses(StatusType::Image).await;
        assert_eq!(result.code, ResultCode::NotInstalled);
    }

    #[tokio::test]
    async fn test_capture_and_conversations_flow() {
        let core = create_test_core(vec![]).await;

        core.snapkeep
            .capture_message("Alice", "hello", Some("com.whatsapp"), 100)
            .await
            .unwrap();
        core.snapkeep
            .capture_message("Alice", "hello", Some("com.whatsapp"), 100)
            .await
            .unwrap();

        let conversations = core.snapkeep.list_conversations().await.unwrap();
        assert_eq!(conversations.len(), 1);

        let messages = core
            .snapkeep
            .received_messages(&conversations[0])
            .await
            .unwrap();
        assert_eq!(messages.len(), 1);
    }

    #[tokio::test]
    async fn test_delete_conversations_with_blacklist() {
        let core = create_test_core(vec![]).await;
        core.snapkeep
            .capture_message("Spammer", "buy", None, 100)
            .await
            .unwrap();

        let conversations = core.snapkeep.list_conversations().await.unwrap();
        core.snapkeep
            .delete_conversations(&conversations, true)
            .await
            .unwrap();

        assert!(core.snapkeep.list_conversations().await.unwrap().is_empty());
        assert!(core.snapkeep.blacklisted_senders().contains("Spammer"));

        // Captures from the blacklisted sender are now dropped.
        let result = core
            .snapkeep
            .capture_message("Spammer", "again", None, 200)
            .await
            .unwrap();
        assert_eq!(result, CaptureResult::Blacklisted);
    }

    #[tokio::test]
    async fn test_countries_passthrough() {
        let core = create_test_core(vec![]).await;
        assert!(!core.snapkeep.all_countries().is_empty());
        core.snapkeep.set_default_country("BR");
        assert_eq!(core.snapkeep.default_country().code, "BR");
    }

    #[tokio::test]
    async fn test_delete_all_data() {
        let core = create_test_core(vec![]).await;
        core.snapkeep
            .capture_message("Alice", "hello", None, 100)
            .await
            .unwrap();

        let test_log_file = core.snapkeep.config.logs_dir.join("test_log.txt");
        tokio::fs::write(&test_log_file, "test log").await.unwrap();

        core.snapkeep.delete_all_data().await.unwrap();

        assert!(core.snapkeep.list_conversations().await.unwrap().is_empty());
        assert!(!test_log_file.exists());
    }
}
