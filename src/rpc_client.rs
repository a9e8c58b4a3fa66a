//! Poll and control a Shelly device over its Bluetooth Low Energy RPC channel.
//!
//! The device speaks JSON-RPC. Each request is framed with a length header and
//! pushed through three GATT characteristics (see [`framer`](crate::framer)).
//! On top of that this client adds connection management, correlation ids and
//! response validation.

use rand::Rng;
use serde_json::{json, Value};
use tokio::sync::Mutex;
use tokio::time::Duration;
use tracing::{debug, warn};

use crate::error::Result;
use crate::framer;
use crate::gatt::{Central, PeripheralAddress};
use crate::link::{Link, LinkStatus};
use crate::message::rpc_message::{RpcRequest, RpcResponse};
use crate::message::status_message::{self, StatusMessage};

pub struct RpcClient<C: Central> {
    address: PeripheralAddress,
    connect_timeout: Duration,
    link: Mutex<Link<C>>,
}

impl<C: Central> RpcClient<C> {
    pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(5);
    pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

    pub fn new(central: C, address: PeripheralAddress) -> Self {
        Self::with_link(Link::new(central, address))
    }

    pub fn with_link(link: Link<C>) -> Self {
        Self {
            address: link.address().clone(),
            connect_timeout: Self::DEFAULT_CONNECT_TIMEOUT,
            link: Mutex::new(link),
        }
    }

    /// Bound for each scan and each connect attempt.
    pub fn with_connect_timeout(mut self, connect_timeout: Duration) -> Self {
        self.connect_timeout = connect_timeout;
        self
    }

    pub fn address(&self) -> &PeripheralAddress {
        &self.address
    }

    pub async fn link_status(&self) -> LinkStatus {
        self.link.lock().await.status()
    }

    /// Call `method` on the device and return its `result`.
    ///
    /// Calls are serialised: a second caller waits until the first one has
    /// finished, including any reconnect. If the call fails for any reason the
    /// connection is dropped, so the next call starts from a clean link.
    pub async fn call(&self, method: &str, params: Option<Value>, timeout: Duration) -> Result<Value> {
        let mut link = self.link.lock().await;
        let request = RpcRequest::new(next_request_id(), method, params);

        let outcome = Self::exchange(&mut link, &request, timeout, self.connect_timeout).await;
        if let Err(err) = &outcome {
            warn!(address = %self.address, method, kind = err.kind(), error = %err, "rpc call failed, dropping connection");
            link.disconnect().await;
        }
        outcome
    }

    async fn exchange(link: &mut Link<C>, request: &RpcRequest, timeout: Duration, connect_timeout: Duration) -> Result<Value> {
        let gatt = link.ensure_connected(connect_timeout).await?;
        let body = framer::send_and_receive(gatt, request, timeout).await?;
        debug!(id = request.id, %body, "rpc response");
        RpcResponse::parse(&body)?.into_result(request.id)
    }

    /// Drop the connection, if any.
    pub async fn disconnect(&self) {
        self.link.lock().await.disconnect().await;
    }

    pub async fn get_status(&self, timeout: Duration) -> Result<StatusMessage> {
        StatusMessage::new(self.call(status_message::METHOD, None, timeout).await?)
    }

    pub async fn get_device_info(&self, timeout: Duration) -> Result<Value> {
        self.call("Shelly.GetDeviceInfo", Some(json!({ "ident": true })), timeout).await
    }

    pub async fn get_config(&self, timeout: Duration) -> Result<Value> {
        self.call("Shelly.GetConfig", None, timeout).await
    }

    pub async fn switch_get_status(&self, id: u32, timeout: Duration) -> Result<Value> {
        self.call("Switch.GetStatus", Some(json!({ "id": id })), timeout).await
    }

    pub async fn switch_get_config(&self, id: u32, timeout: Duration) -> Result<Value> {
        self.call("Switch.GetConfig", Some(json!({ "id": id })), timeout).await
    }

    /// Apply a partial switch configuration, e.g. `{"auto_off": false}`.
    pub async fn switch_set_config(&self, id: u32, config: Value, timeout: Duration) -> Result<Value> {
        self.call("Switch.SetConfig", Some(json!({ "id": id, "config": config })), timeout).await
    }

    pub async fn switch_set(&self, id: u32, on: bool, timeout: Duration) -> Result<Value> {
        self.call("Switch.Set", Some(json!({ "id": id, "on": on })), timeout).await
    }
}

/// Only one call is ever in flight per link, so collisions between
/// sequential ids do not matter.
fn next_request_id() -> u32 {
    rand::thread_rng().gen_range(1..1_000_000_000)
}
