//! Network Monitoring Abstraction
//!
//! Provides network connectivity and status information. The sync scheduler
//! uses it to hold back jobs whose network requirement (e.g. Wi-Fi for uploads)
//! is not currently met.

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Network connection type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NetworkType {
    /// Cellular/mobile data connection
    Cellular,
    /// WiFi connection
    WiFi,
    /// Ethernet connection
    Ethernet,
    /// Other or unknown connection type
    Other,
}

/// Network connection status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NetworkStatus {
    /// Connected to network
    Connected,
    /// Not connected to any network
    Disconnected,
    /// Connection status unknown or indeterminate
    Indeterminate,
}

/// Network information
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkInfo {
    pub status: NetworkStatus,
    pub network_type: Option<NetworkType>,
    /// Whether the connection is metered (has data limits/costs)
    pub is_metered: bool,
    /// Whether the connection is considered expensive by the OS
    pub is_expensive: bool,
}

impl NetworkInfo {
    /// Snapshot for a disconnected device
    pub fn disconnected() -> Self {
        Self {
            status: NetworkStatus::Disconnected,
            network_type: None,
            is_metered: false,
            is_expensive: false,
        }
    }

    /// Snapshot for an unmetered Wi-Fi connection
    pub fn wifi() -> Self {
        Self {
            status: NetworkStatus::Connected,
            network_type: Some(NetworkType::WiFi),
            is_metered: false,
            is_expensive: false,
        }
    }

    /// Snapshot for a metered cellular connection
    pub fn cellular() -> Self {
        Self {
            status: NetworkStatus::Connected,
            network_type: Some(NetworkType::Cellular),
            is_metered: true,
            is_expensive: true,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.status == NetworkStatus::Connected
    }

    /// Whether the connection is good enough for Wi-Fi-only work.
    ///
    /// Wi-Fi and Ethernet qualify. An `Other` connection qualifies only when
    /// the OS does not report it as metered.
    pub fn is_unmetered_link(&self) -> bool {
        if !self.is_connected() {
            return false;
        }
        match self.network_type {
            Some(NetworkType::WiFi) | Some(NetworkType::Ethernet) => true,
            Some(NetworkType::Other) => !self.is_metered,
            Some(NetworkType::Cellular) | None => false,
        }
    }
}

/// Network monitor trait
///
/// Provides network connectivity information to allow the core to:
/// - Defer sync jobs while offline
/// - Run uploads only on Wi-Fi
///
/// # Platform Support
///
/// - **Desktop**: connectivity probe with a polling change stream
/// - **iOS**: Network framework (`NWPathMonitor`)
/// - **Android**: ConnectivityManager callbacks
///
/// # Example
///
/// ```ignore
/// use bridge_traits::network::NetworkMonitor;
///
/// async fn can_upload(monitor: &dyn NetworkMonitor) -> bool {
///     monitor.is_wifi().await
/// }
/// ```
#[async_trait::async_trait]
pub trait NetworkMonitor: Send + Sync {
    /// Get current network information
    async fn get_network_info(&self) -> Result<NetworkInfo>;

    /// Check if currently connected to any network
    async fn is_connected(&self) -> bool {
        matches!(
            self.get_network_info().await,
            Ok(NetworkInfo {
                status: NetworkStatus::Connected,
                ..
            })
        )
    }

    /// Check if connected via WiFi
    async fn is_wifi(&self) -> bool {
        matches!(
            self.get_network_info().await,
            Ok(NetworkInfo {
                status: NetworkStatus::Connected,
                network_type: Some(NetworkType::WiFi),
                ..
            })
        )
    }

    /// Check if connection is metered
    async fn is_metered(&self) -> bool {
        matches!(
            self.get_network_info().await,
            Ok(NetworkInfo {
                is_metered: true,
                ..
            })
        )
    }

    /// Subscribe to network status changes
    ///
    /// Returns a stream of network info updates. Implementations should
    /// emit an event whenever network status changes.
    async fn subscribe_changes(&self) -> Result<Box<dyn NetworkChangeStream>>;
}

/// Stream of network status changes
#[async_trait::async_trait]
pub trait NetworkChangeStream: Send {
    /// Get the next network info update
    ///
    /// Returns `None` when the stream is closed.
    async fn next(&mut self) -> Option<NetworkInfo>;
}
