//! Status media discovery, saving and notification message capture core.
//!
//! This crate is the platform-independent engine behind a status saver app:
//! it locates status media produced by WhatsApp-family clients across
//! storage-access regimes, scans and deduplicates them, performs bulk
//! save/delete/share operations, and keeps a local store of messages
//! captured from client notifications. Platform specifics (permissions,
//! mediated storage, installed-package probing) are injected as
//! collaborator traits; see [`Collaborators`].

use std::path::Path;
use std::sync::{Mutex, OnceLock};

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{filter::EnvFilter, fmt::Layer, prelude::*, registry::Registry};

mod snapkeep;

pub use snapkeep::clients::{ClientProber, WaClient};
pub use snapkeep::countries::{Country, CountryProvider, StaticCountries};
pub use snapkeep::error::{Result, SnapkeepError};
pub use snapkeep::messages::{CaptureResult, Conversation, ConversationSubscription, MessageEntity};
pub use snapkeep::results::{DeletionResult, ResultCode, SaveResult, ShareData, StatusQueryResult};
pub use snapkeep::status::{MediaHandle, Status, StatusOrigin, StatusType};
pub use snapkeep::statuses::{SavedStateSubscription, ScanSection, StatusStream, StatusesChanged};
pub use snapkeep::storage::{
    DocumentEntry, DocumentGateway, FsDocumentGateway, MediaCollection, PermissionGate,
    SaveLocation, StorageDevice, TreeHandle, SAVES_DIR_NAME,
};
pub use snapkeep::{Collaborators, Snapkeep, SnapkeepConfig};

static TRACING_GUARDS: OnceLock<Mutex<Option<(WorkerGuard, WorkerGuard)>>> = OnceLock::new();
static TRACING_INIT: OnceLock<()> = OnceLock::new();

pub(crate) fn init_tracing(logs_dir: &Path) {
    TRACING_INIT.get_or_init(|| {
        let file_appender = tracing_appender::rolling::RollingFileAppender::builder()
            .rotation(tracing_appender::rolling::Rotation::DAILY)
            .filename_prefix("snapkeep")
            .filename_suffix("log")
            .build(logs_dir)
            .expect("Failed to create file appender");

        let (non_blocking_file, file_guard) = tracing_appender::non_blocking(file_appender);
        let (non_blocking_stdout, stdout_guard) = tracing_appender::non_blocking(std::io::stdout());

        TRACING_GUARDS
            .set(Mutex::new(Some((file_guard, stdout_guard))))
            .ok();

        let stdout_layer = Layer::new()
            .with_writer(non_blocking_stdout)
            .with_ansi(true)
            .with_target(true);

        let file_layer = Layer::new()
            .with_writer(non_blocking_file)
            .with_ansi(false)
            .with_target(true);

        Registry::default()
            .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
            .with(stdout_layer)
            .with(file_layer)
            .init();
    });
}
