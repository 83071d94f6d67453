//! Network Monitoring Implementations

use async_trait::async_trait;
use bridge_traits::{
    error::Result,
    network::{NetworkChangeStream, NetworkInfo, NetworkMonitor, NetworkStatus, NetworkType},
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::debug;

const DEFAULT_PROBE_ADDR: &str = "8.8.8.8:53";
const PROBE_TIMEOUT: Duration = Duration::from_secs(5);
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Desktop network monitor implementation
///
/// Detects connectivity with a TCP probe. Desktop links are reported as an
/// unmetered `Other` connection, which satisfies Wi-Fi-only jobs.
///
/// Note: Platform-specific implementations (Linux netlink, macOS SystemConfiguration,
/// Windows WinAPI) would distinguish link types but require additional dependencies.
#[derive(Clone)]
pub struct DesktopNetworkMonitor {
    probe_addr: String,
    poll_interval: Duration,
}

impl DesktopNetworkMonitor {
    /// Create a new network monitor
    pub fn new() -> Self {
        Self {
            probe_addr: DEFAULT_PROBE_ADDR.to_string(),
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    /// Probe a different endpoint
    pub fn with_probe_addr(mut self, addr: impl Into<String>) -> Self {
        self.probe_addr = addr.into();
        self
    }

    /// Change how often the change stream re-probes
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    async fn check_connectivity(&self) -> NetworkStatus {
        match tokio::time::timeout(
            PROBE_TIMEOUT,
            tokio::net::TcpStream::connect(self.probe_addr.as_str()),
        )
        .await
        {
            Ok(Ok(_)) => NetworkStatus::Connected,
            Ok(Err(_)) | Err(_) => NetworkStatus::Disconnected,
        }
    }
}

impl Default for DesktopNetworkMonitor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl NetworkMonitor for DesktopNetworkMonitor {
    async fn get_network_info(&self) -> Result<NetworkInfo> {
        let status = self.check_connectivity().await;

        let info = NetworkInfo {
            status,
            network_type: (status == NetworkStatus::Connected).then_some(NetworkType::Other),
            is_metered: false,
            is_expensive: false,
        };

        debug!(status = ?status, "Network info updated");
        Ok(info)
    }

    async fn subscribe_changes(&self) -> Result<Box<dyn NetworkChangeStream>> {
        Ok(Box::new(PollingChangeStream {
            monitor: self.clone(),
            last_status: None,
        }))
    }
}

/// Change stream that re-probes on an interval and yields status transitions
struct PollingChangeStream {
    monitor: DesktopNetworkMonitor,
    last_status: Option<NetworkStatus>,
}

#[async_trait]
impl NetworkChangeStream for PollingChangeStream {
    async fn next(&mut self) -> Option<NetworkInfo> {
        loop {
            tokio::time::sleep(self.monitor.poll_interval).await;

            if let Ok(info) = self.monitor.get_network_info().await {
                if self.last_status != Some(info.status) {
                    self.last_status = Some(info.status);
                    return Some(info);
                }
            }
        }
    }
}

/// Network monitor fed by the host
///
/// Mobile shells receive connectivity callbacks from the OS and forward them
/// with [`PushNetworkMonitor::set`]. Tests use it to flip between Wi-Fi and
/// cellular deterministically.
#[derive(Clone)]
pub struct PushNetworkMonitor {
    tx: Arc<watch::Sender<NetworkInfo>>,
}

impl PushNetworkMonitor {
    pub fn new(initial: NetworkInfo) -> Self {
        let (tx, _rx) = watch::channel(initial);
        Self { tx: Arc::new(tx) }
    }

    /// Publish a new connectivity snapshot
    pub fn set(&self, info: NetworkInfo) {
        debug!(status = ?info.status, network_type = ?info.network_type, "Network pushed");
        self.tx.send_replace(info);
    }

    /// Last published snapshot
    pub fn current(&self) -> NetworkInfo {
        self.tx.borrow().clone()
    }
}

#[async_trait]
impl NetworkMonitor for PushNetworkMonitor {
    async fn get_network_info(&self) -> Result<NetworkInfo> {
        Ok(self.current())
    }

    async fn subscribe_changes(&self) -> Result<Box<dyn NetworkChangeStream>> {
        Ok(Box::new(PushChangeStream {
            rx: self.tx.subscribe(),
        }))
    }
}

struct PushChangeStream {
    rx: watch::Receiver<NetworkInfo>,
}

#[async_trait]
impl NetworkChangeStream for PushChangeStream {
    async fn next(&mut self) -> Option<NetworkInfo> {
        self.rx.changed().await.ok()?;
        let info = self.rx.borrow_and_update().clone();
        Some(info)
    }
}
