//! [`Central`] and [`GattLink`] over the platform Bluetooth stack, via `bluest`.

use async_trait::async_trait;
use bluest::Adapter;
use bluest::Characteristic;
use bluest::Device;
use bluest::Service;
use futures_util::StreamExt;
use tokio::time::timeout;
use tokio::time::Duration;
use tracing::debug;

use crate::error::{Error, Result};
use crate::gatt::{Central, GattLink, PeripheralAddress, RpcCharacteristic, SHELLY_SERVICE_UUID};

/// The default system Bluetooth adapter.
#[derive(Clone)]
pub struct BluestCentral {
    adapter: Adapter,
}

impl BluestCentral {
    /// Open the default adapter and wait until it is powered.
    pub async fn new() -> Result<Self> {
        let adapter = Adapter::default()
            .await
            .ok_or_else(|| Error::Transport("default adapter not found".into()))?;
        adapter.wait_available().await?;
        Ok(Self { adapter })
    }

    async fn scan_for(&self, address: &PeripheralAddress) -> Result<Device> {
        let mut adapter_events = self.adapter.scan(&[]).await?;
        while let Some(advertisement) = adapter_events.next().await {
            let id = format!("{:?}", advertisement.device.id());
            if address.matches_id(&id) {
                debug!(%address, rssi = ?advertisement.rssi, "peripheral advertised");
                return Ok(advertisement.device);
            }
        }
        Err(Error::Transport("scan stream ended".into()))
    }

    async fn rpc_service(device: &Device) -> Result<Service> {
        Ok(device
            .discover_services_with_uuid(SHELLY_SERVICE_UUID)
            .await?
            .first()
            .ok_or_else(|| Error::Protocol("the device does not expose the Shelly RPC service".into()))?
            .clone())
    }

    async fn characteristic(service: &Service, wanted: RpcCharacteristic) -> Result<Characteristic> {
        Ok(service
            .discover_characteristics_with_uuid(wanted.uuid())
            .await?
            .first()
            .ok_or_else(|| Error::Protocol(format!("the device does not expose the {wanted:?} characteristic")))?
            .clone())
    }
}

#[async_trait]
impl Central for BluestCentral {
    type Peripheral = Device;
    type Link = BluestLink;

    async fn find(&self, address: &PeripheralAddress, scan_timeout: Duration) -> Result<Option<Device>> {
        // A device that is already connected (by us or another process) does not advertise.
        for device in self.adapter.connected_devices().await? {
            if address.matches_id(&format!("{:?}", device.id())) {
                return Ok(Some(device));
            }
        }

        match timeout(scan_timeout, self.scan_for(address)).await {
            Ok(found) => found.map(Some),
            Err(_) => Ok(None),
        }
    }

    async fn connect(&self, device: &Device) -> Result<BluestLink> {
        if !device.is_connected().await {
            self.adapter.connect_device(device).await?;
        }

        let resolved = async {
            let service = Self::rpc_service(device).await?;
            let tx_control = Self::characteristic(&service, RpcCharacteristic::TxControl).await?;
            let data = Self::characteristic(&service, RpcCharacteristic::Data).await?;
            let rx_control = Self::characteristic(&service, RpcCharacteristic::RxControl).await?;
            Ok::<_, Error>((tx_control, data, rx_control))
        }
        .await;

        match resolved {
            Ok((tx_control, data, rx_control)) => Ok(BluestLink {
                adapter: self.adapter.clone(),
                device: device.clone(),
                tx_control,
                data,
                rx_control,
            }),
            Err(err) => {
                // Do not leave a half set up connection behind.
                if let Err(disconnect_err) = self.adapter.disconnect_device(device).await {
                    debug!(error = %disconnect_err, "disconnect after failed discovery");
                }
                Err(err)
            }
        }
    }
}

/// A connected Shelly device with its RPC characteristics resolved.
pub struct BluestLink {
    adapter: Adapter,
    device: Device,
    tx_control: Characteristic,
    data: Characteristic,
    rx_control: Characteristic,
}

impl BluestLink {
    fn characteristic(&self, which: RpcCharacteristic) -> &Characteristic {
        match which {
            RpcCharacteristic::TxControl => &self.tx_control,
            RpcCharacteristic::Data => &self.data,
            RpcCharacteristic::RxControl => &self.rx_control,
        }
    }
}

#[async_trait]
impl GattLink for BluestLink {
    async fn write(&self, which: RpcCharacteristic, value: &[u8]) -> Result<()> {
        self.characteristic(which).write(value).await?;
        Ok(())
    }

    async fn read(&self, which: RpcCharacteristic) -> Result<Vec<u8>> {
        Ok(self.characteristic(which).read().await?)
    }

    async fn is_connected(&self) -> bool {
        self.device.is_connected().await
    }

    async fn disconnect(&self) -> Result<()> {
        self.adapter.disconnect_device(&self.device).await?;
        Ok(())
    }
}
