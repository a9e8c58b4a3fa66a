//! The GATT primitives the RPC channel is built on.
//!
//! A Shelly device exposes its RPC channel as one service with three
//! characteristics:
//!
//! Characteristic | Direction        | Meaning
//! ---------------|------------------|-------------------------------------------------
//! TX control     | write            | big-endian u32 length of the request about to be written
//! data           | read and write   | request body on write, response body chunks on read
//! RX control     | read             | big-endian u32 length of the pending response
//!
//! [`Central`] finds and connects to a peripheral, [`GattLink`] is the resulting
//! connection. The real implementation lives in `bluest_gatt`.

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use bluest::Uuid;
use tokio::time::Duration;

use crate::error::{Error, Result};

/// The Shelly RPC GATT service.
pub const SHELLY_SERVICE_UUID: Uuid = Uuid::from_u128(0x5f6d4f53_5f52_5043_5f53_56435f49445f);
const RPC_DATA_UUID: Uuid = Uuid::from_u128(0x5f6d4f53_5f52_5043_5f64_6174615f5f5f);
const RPC_TX_CTL_UUID: Uuid = Uuid::from_u128(0x5f6d4f53_5f52_5043_5f74_785f63746c5f);
const RPC_RX_CTL_UUID: Uuid = Uuid::from_u128(0x5f6d4f53_5f52_5043_5f72_785f63746c5f);

/// One of the three characteristics of the RPC service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RpcCharacteristic {
    TxControl,
    Data,
    RxControl,
}

impl RpcCharacteristic {
    pub fn uuid(self) -> Uuid {
        match self {
            RpcCharacteristic::TxControl => RPC_TX_CTL_UUID,
            RpcCharacteristic::Data => RPC_DATA_UUID,
            RpcCharacteristic::RxControl => RPC_RX_CTL_UUID,
        }
    }
}

/// Hardware address of one peripheral, normalised to upper case `AA:BB:CC:DD:EE:FF`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PeripheralAddress(String);

impl PeripheralAddress {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether a platform device identifier refers to this address.
    ///
    /// Platform identifiers render addresses in different ways (`A0:DD:..`,
    /// `a0-dd-..`, wrapped in a type name), so only the hex digits are compared.
    pub fn matches_id(&self, id: &str) -> bool {
        let wanted = hex_digits(&self.0);
        hex_digits(id).contains(&wanted)
    }
}

fn hex_digits(s: &str) -> String {
    s.chars()
        .filter(char::is_ascii_hexdigit)
        .map(|c| c.to_ascii_uppercase())
        .collect()
}

impl FromStr for PeripheralAddress {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let octets: Vec<&str> = s.trim().split(':').collect();
        let valid = octets.len() == 6
            && octets
                .iter()
                .all(|o| o.len() == 2 && o.chars().all(|c| c.is_ascii_hexdigit()));
        if !valid {
            return Err(Error::Config(format!("invalid peripheral address: {s:?}")));
        }
        Ok(Self(octets.join(":").to_ascii_uppercase()))
    }
}

impl fmt::Display for PeripheralAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The scanning and connecting side of a BLE adapter.
#[async_trait]
pub trait Central: Send + Sync {
    type Peripheral: Send + Sync;
    type Link: GattLink;

    /// Scan for the given address for at most `timeout`. `Ok(None)` means it was not seen.
    async fn find(&self, address: &PeripheralAddress, timeout: Duration) -> Result<Option<Self::Peripheral>>;

    /// Connect to a discovered peripheral and resolve the RPC characteristics.
    async fn connect(&self, peripheral: &Self::Peripheral) -> Result<Self::Link>;
}

/// A connected peripheral exposing the RPC characteristics.
#[async_trait]
pub trait GattLink: Send + Sync {
    /// Write with response: returns only once the peripheral acknowledged the write.
    async fn write(&self, characteristic: RpcCharacteristic, value: &[u8]) -> Result<()>;

    async fn read(&self, characteristic: RpcCharacteristic) -> Result<Vec<u8>>;

    async fn is_connected(&self) -> bool;

    async fn disconnect(&self) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_address_normalises_case() {
        let address: PeripheralAddress = "a0:dd:6c:4b:9c:36".parse().unwrap();
        assert_eq!(address.as_str(), "A0:DD:6C:4B:9C:36");
    }

    #[test]
    fn test_parse_address_rejects_garbage() {
        assert!("A0:DD:6C:4B:9C".parse::<PeripheralAddress>().is_err());
        assert!("A0:DD:6C:4B:9C:3G".parse::<PeripheralAddress>().is_err());
        assert!("A0DD6C4B9C36".parse::<PeripheralAddress>().is_err());
    }

    #[test]
    fn test_matches_platform_ids() {
        let address: PeripheralAddress = "A0:DD:6C:4B:9C:36".parse().unwrap();
        assert!(address.matches_id("DeviceId(A0:DD:6C:4B:9C:36)"));
        assert!(address.matches_id("hci0/dev_a0_dd_6c_4b_9c_36"));
        assert!(!address.matches_id("DeviceId(A0:DD:6C:4B:9C:37)"));
    }

    #[test]
    fn test_characteristic_uuids_are_distinct() {
        assert_eq!(
            RpcCharacteristic::Data.uuid().to_string(),
            "5f6d4f53-5f52-5043-5f64-6174615f5f5f"
        );
        assert_ne!(RpcCharacteristic::TxControl.uuid(), RpcCharacteristic::RxControl.uuid());
    }
}
