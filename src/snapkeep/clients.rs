use serde::{Deserialize, Serialize};

/// A status-producing messaging client this crate knows how to read from.
///
/// Clients differ only in their package identifier and the directory naming
/// convention they use for status media. Which of them are actually present
/// on the device is answered by the embedder through [`ClientProber`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WaClient {
    WhatsApp,
    WhatsAppBusiness,
    OgWhatsApp,
}

impl WaClient {
    pub const ALL: [WaClient; 3] = [
        WaClient::WhatsApp,
        WaClient::WhatsAppBusiness,
        WaClient::OgWhatsApp,
    ];

    pub fn package_name(&self) -> &'static str {
        match self {
            WaClient::WhatsApp => "com.whatsapp",
            WaClient::WhatsAppBusiness => "com.whatsapp.w4b",
            WaClient::OgWhatsApp => "com.ogwhatsapp",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            WaClient::WhatsApp => "WhatsApp",
            WaClient::WhatsAppBusiness => "WhatsApp Business",
            WaClient::OgWhatsApp => "OGWhatsApp",
        }
    }

    /// The client's media directory name under a storage-volume root.
    fn media_dir_name(&self) -> &'static str {
        match self {
            WaClient::WhatsApp => "WhatsApp",
            WaClient::WhatsAppBusiness => "WhatsApp Business",
            WaClient::OgWhatsApp => "OGWhatsApp",
        }
    }

    /// Status directory relative to the volume root under the legacy
    /// broad-storage layout, e.g. `WhatsApp/Media/.Statuses`.
    pub fn legacy_status_dir(&self) -> String {
        format!("{}/Media/.Statuses", self.media_dir_name())
    }

    /// Status directory relative to the volume root under the scoped-storage
    /// layout, e.g. `Android/media/com.whatsapp/WhatsApp/Media/.Statuses`.
    pub fn scoped_status_dir(&self) -> String {
        format!(
            "Android/media/{}/{}/Media/.Statuses",
            self.package_name(),
            self.media_dir_name()
        )
    }
}

/// Installed-package enumerator, supplied by the embedder.
///
/// The core never probes the platform package manager itself; it only asks
/// this trait which known clients exist and whether they can be launched.
pub trait ClientProber: Send + Sync {
    fn is_installed(&self, client: WaClient) -> bool;

    /// Whether a launch intent can be resolved for the client. Installed
    /// clients are launchable unless the embedder says otherwise.
    fn can_launch(&self, client: WaClient) -> bool {
        self.is_installed(client)
    }
}
