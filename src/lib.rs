//! Poll a Shelly relay/sensor unit (tested with a Shelly Plus Uni) over Bluetooth Low Energy
//! and log what it reports.
//!
//! Shelly Gen2 devices expose their JSON-RPC API over a GATT service with three
//! characteristics. A request is framed by writing its length to one
//! characteristic and its body to another; the response length is then read
//! from a third and the body read back in MTU-sized chunks. The device is often
//! out of range or busy, so the client reconnects on every failure and the
//! polling loop backs off exponentially without ever giving up.
//!
//! Currently the following data is collected each cycle, where reported:
//!
//! - Voltmeter voltage (V)
//! - Switch output state, power, voltage and current
//! - Digital input state and voltage
//! - Device temperature
//! - Uptime, RAM and filesystem usage
//! - WiFi connectivity, RSSI and SSID, BLE enabled flag
//!
//! # Example
//!
//! ```no_run
//! # use std::time::Duration;
//! #
//! # #[tokio::main]
//! # pub async fn main(){
//!     let central = shellyread::BluestCentral::new().await.unwrap();
//!     let address = "A0:DD:6C:4B:9C:36".parse().unwrap();
//!     let client = shellyread::RpcClient::new(central, address);
//!     loop {
//!         let status = client.get_status(Duration::from_secs(5)).await.unwrap();
//!         println!("{status:?}");
//!         tokio::time::sleep(Duration::from_secs(30)).await;
//!     }
//! # }
//! ```

mod bluest_gatt;
pub mod config;
mod error;
pub mod framer;
pub mod gatt;
pub mod link;
pub mod logging;
mod message;
pub mod poller;
mod reading;
mod rpc_client;
pub mod sink;
#[cfg(test)]
mod testing;

pub use bluest_gatt::{BluestCentral, BluestLink};
pub use config::Config;
pub use error::{Error, Result};
pub use gatt::PeripheralAddress;
pub use message::rpc_message::{RpcErrorBody, RpcRequest, RpcResponse};
pub use message::status_message::StatusMessage;
pub use poller::{Poller, PollSettings};
pub use reading::Reading;
pub use rpc_client::RpcClient;
pub use sink::{NdjsonSink, ReadingSink};
