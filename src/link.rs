use tokio::time::{sleep, timeout, Duration};
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::gatt::{Central, GattLink, PeripheralAddress};

/// Slack on top of the scan window for the work a [`Central`] does around the
/// scan itself, such as listing already connected devices.
const SCAN_GRACE: Duration = Duration::from_secs(2);

/// How hard [`Link::ensure_connected`] tries before giving up.
#[derive(Debug, Clone, Copy)]
pub struct LinkSettings {
    pub attempts: u32,
    pub retry_delay: Duration,
}

impl Default for LinkSettings {
    fn default() -> Self {
        Self { attempts: 3, retry_delay: Duration::from_secs(2) }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkStatus {
    Disconnected,
    Connecting,
    Connected,
}

enum LinkState<L> {
    Disconnected,
    Connecting,
    Connected(L),
}

/// The connection to one peripheral.
///
/// A `Link` is owned by exactly one [`RpcClient`](crate::RpcClient), which
/// serialises access to it.
pub struct Link<C: Central> {
    central: C,
    address: PeripheralAddress,
    settings: LinkSettings,
    state: LinkState<C::Link>,
}

impl<C: Central> Link<C> {
    pub fn new(central: C, address: PeripheralAddress) -> Self {
        Self::with_settings(central, address, LinkSettings::default())
    }

    pub fn with_settings(central: C, address: PeripheralAddress, settings: LinkSettings) -> Self {
        Self { central, address, settings, state: LinkState::Disconnected }
    }

    pub fn address(&self) -> &PeripheralAddress {
        &self.address
    }

    pub fn status(&self) -> LinkStatus {
        match self.state {
            LinkState::Disconnected => LinkStatus::Disconnected,
            LinkState::Connecting => LinkStatus::Connecting,
            LinkState::Connected(_) => LinkStatus::Connected,
        }
    }

    /// Return the live connection, establishing one if needed.
    ///
    /// Makes up to `settings.attempts` scan + connect attempts, each bounded by
    /// `timeout`, sleeping `settings.retry_delay` between them.
    pub async fn ensure_connected(&mut self, timeout: Duration) -> Result<&C::Link> {
        let alive = match &self.state {
            LinkState::Connected(link) => link.is_connected().await,
            _ => false,
        };

        if !alive {
            if let LinkState::Connected(_) = self.state {
                warn!(address = %self.address, "connection dropped by peer");
                self.disconnect().await;
            }

            self.state = LinkState::Connecting;
            match self.connect_with_retry(timeout).await {
                Ok(link) => self.state = LinkState::Connected(link),
                Err(err) => {
                    self.state = LinkState::Disconnected;
                    return Err(err);
                }
            }
        }

        match &self.state {
            LinkState::Connected(link) => Ok(link),
            _ => Err(Error::Transport("link is not connected".into())),
        }
    }

    /// Drop the connection. Never fails: a peripheral that is already gone is disconnected enough.
    pub async fn disconnect(&mut self) {
        let previous = std::mem::replace(&mut self.state, LinkState::Disconnected);
        if let LinkState::Connected(link) = previous {
            match link.disconnect().await {
                Ok(()) => debug!(address = %self.address, "disconnected"),
                Err(err) => warn!(address = %self.address, error = %err, "disconnect failed, discarding connection anyway"),
            }
        }
    }

    async fn connect_with_retry(&self, limit: Duration) -> Result<C::Link> {
        let attempts = self.settings.attempts;
        for attempt in 1..=attempts {
            debug!(address = %self.address, attempt, attempts, "connecting");
            match self.try_connect(limit).await {
                Ok(link) => {
                    info!(address = %self.address, attempt, "connected");
                    return Ok(link);
                }
                Err(err) => warn!(address = %self.address, attempt, attempts, error = %err, "connection attempt failed"),
            }
            if attempt < attempts {
                sleep(self.settings.retry_delay).await;
            }
        }

        Err(Error::DeviceUnreachable { address: self.address.to_string(), attempts })
    }

    async fn try_connect(&self, limit: Duration) -> Result<C::Link> {
        let peripheral = timeout(limit + SCAN_GRACE, self.central.find(&self.address, limit))
            .await
            .map_err(|_| Error::Timeout { operation: "scan" })??
            .ok_or_else(|| Error::Transport(format!("{} not found during scan", self.address)))?;

        timeout(limit, self.central.connect(&peripheral))
            .await
            .map_err(|_| Error::Timeout { operation: "connect" })?
    }
}
