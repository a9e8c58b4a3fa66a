//! A scripted stand-in for the Bluetooth stack.
//!
//! `ScriptedCentral` hands out `ScriptedLink`s that share one `ScriptState`, so a
//! test can keep a handle, drive the code under test, then inspect every write,
//! read and connection change that happened.

use std::collections::VecDeque;
use std::future::pending;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::task::yield_now;
use tokio::time::{sleep, Duration};

use crate::error::{Error, Result};
use crate::gatt::{Central, GattLink, PeripheralAddress, RpcCharacteristic};
use crate::reading::Reading;
use crate::sink::ReadingSink;

pub(crate) type Responder = Box<dyn Fn(&Value) -> Value + Send>;

pub(crate) struct ScriptState {
    pub scans: u32,
    pub connects: u32,
    pub disconnects: u32,
    /// Upcoming scan outcomes; an empty queue means the device is found.
    pub scan_results: VecDeque<bool>,
    pub connect_failures: u32,
    pub connected: bool,
    pub disconnect_fails: bool,
    pub writes: Vec<(RpcCharacteristic, Vec<u8>)>,
    pub fail_write: Option<RpcCharacteristic>,
    pub rx_control: VecDeque<Vec<u8>>,
    pub data_reads: VecDeque<Result<Vec<u8>>>,
    pub data_read_count: u32,
    /// Builds the response to each request written to the data characteristic.
    pub responder: Option<Responder>,
    pub chunk_size: usize,
    /// This many upcoming scans never complete.
    pub hung_scans: u32,
    /// This many upcoming connects never complete.
    pub hung_connects: u32,
    /// Reads of this characteristic never complete.
    pub hung_reads: Option<RpcCharacteristic>,
    /// Time a missed scan spends before reporting, on top of its scan window.
    pub scan_lag: Duration,
    /// Time every data characteristic read takes.
    pub data_read_lag: Duration,
}

impl Default for ScriptState {
    fn default() -> Self {
        Self {
            scans: 0,
            connects: 0,
            disconnects: 0,
            scan_results: VecDeque::new(),
            connect_failures: 0,
            connected: false,
            disconnect_fails: false,
            writes: Vec::new(),
            fail_write: None,
            rx_control: VecDeque::new(),
            data_reads: VecDeque::new(),
            data_read_count: 0,
            responder: None,
            chunk_size: 20,
            hung_scans: 0,
            hung_connects: 0,
            hung_reads: None,
            scan_lag: Duration::ZERO,
            data_read_lag: Duration::ZERO,
        }
    }
}

impl ScriptState {
    /// Queue a response body exactly as the peripheral would deliver it.
    pub fn queue_response(&mut self, body: &[u8]) {
        self.rx_control.push_back((body.len() as u32).to_be_bytes().to_vec());
        let chunk_size = self.chunk_size;
        self.data_reads
            .extend(body.chunks(chunk_size).map(|chunk| Ok(chunk.to_vec())));
    }
}

#[derive(Clone, Default)]
pub(crate) struct ScriptedCentral {
    state: Arc<Mutex<ScriptState>>,
}

impl ScriptedCentral {
    pub fn new() -> Self {
        Self::default()
    }

    /// A peripheral that answers every request through `responder`.
    pub fn responding(responder: impl Fn(&Value) -> Value + Send + 'static) -> Self {
        let central = Self::new();
        central.state().responder = Some(Box::new(responder));
        central
    }

    /// A peripheral that answers every request successfully with `result`.
    pub fn answering(result: Value) -> Self {
        Self::responding(move |request| json!({ "id": request["id"], "src": "shellyplusuni-a0dd6c4b9c36", "dst": "user_1", "result": result }))
    }

    pub fn state(&self) -> MutexGuard<'_, ScriptState> {
        self.state.lock().unwrap()
    }
}

#[async_trait]
impl Central for ScriptedCentral {
    type Peripheral = PeripheralAddress;
    type Link = ScriptedLink;

    async fn find(&self, address: &PeripheralAddress, timeout: Duration) -> Result<Option<PeripheralAddress>> {
        let (hung, found, lag) = {
            let mut state = self.state();
            state.scans += 1;
            let hung = take_one(&mut state.hung_scans);
            (hung, state.scan_results.pop_front().unwrap_or(true), state.scan_lag)
        };
        if hung {
            pending::<()>().await;
        }
        if !found {
            sleep(lag + timeout).await;
        }
        Ok(found.then(|| address.clone()))
    }

    async fn connect(&self, _peripheral: &PeripheralAddress) -> Result<ScriptedLink> {
        let hung = {
            let mut state = self.state();
            state.connects += 1;
            take_one(&mut state.hung_connects)
        };
        if hung {
            pending::<()>().await;
        }

        let mut state = self.state();
        if state.connect_failures > 0 {
            state.connect_failures -= 1;
            return Err(Error::Transport("connection refused".into()));
        }
        state.connected = true;
        Ok(ScriptedLink { state: self.state.clone() })
    }
}

pub(crate) struct ScriptedLink {
    state: Arc<Mutex<ScriptState>>,
}

#[async_trait]
impl GattLink for ScriptedLink {
    async fn write(&self, characteristic: RpcCharacteristic, value: &[u8]) -> Result<()> {
        yield_now().await;
        let mut state = self.state.lock().unwrap();
        state.writes.push((characteristic, value.to_vec()));
        if state.fail_write == Some(characteristic) {
            return Err(Error::Transport("write not acknowledged".into()));
        }
        if characteristic == RpcCharacteristic::Data {
            let response = match &state.responder {
                Some(responder) => {
                    let request: Value = serde_json::from_slice(value)?;
                    Some(responder(&request))
                }
                None => None,
            };
            if let Some(response) = response {
                let body = serde_json::to_vec(&response)?;
                state.queue_response(&body);
            }
        }
        Ok(())
    }

    async fn read(&self, characteristic: RpcCharacteristic) -> Result<Vec<u8>> {
        yield_now().await;
        let (hung, lag) = {
            let state = self.state.lock().unwrap();
            let lag = match characteristic {
                RpcCharacteristic::Data => state.data_read_lag,
                _ => Duration::ZERO,
            };
            (state.hung_reads == Some(characteristic), lag)
        };
        if hung {
            pending::<()>().await;
        }
        if !lag.is_zero() {
            sleep(lag).await;
        }

        let mut state = self.state.lock().unwrap();
        match characteristic {
            RpcCharacteristic::RxControl => state
                .rx_control
                .pop_front()
                .ok_or_else(|| Error::Transport("rx control not readable".into())),
            RpcCharacteristic::Data => {
                state.data_read_count += 1;
                state.data_reads.pop_front().unwrap_or_else(|| Ok(Vec::new()))
            }
            RpcCharacteristic::TxControl => Err(Error::Transport("tx control is write only".into())),
        }
    }

    async fn is_connected(&self) -> bool {
        self.state.lock().unwrap().connected
    }

    async fn disconnect(&self) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.disconnects += 1;
        state.connected = false;
        if state.disconnect_fails {
            return Err(Error::Transport("already gone".into()));
        }
        Ok(())
    }
}

/// Collects readings in memory.
#[derive(Clone, Default)]
pub(crate) struct MemorySink {
    pub readings: Arc<Mutex<Vec<Reading>>>,
    pub fail: bool,
    pub panic: bool,
}

impl ReadingSink for MemorySink {
    fn append(&self, reading: &Reading) -> Result<()> {
        if self.panic {
            panic!("sink exploded");
        }
        if self.fail {
            return Err(Error::Storage(std::io::Error::new(std::io::ErrorKind::Other, "disk full")));
        }
        self.readings.lock().unwrap().push(reading.clone());
        Ok(())
    }
}

fn take_one(counter: &mut u32) -> bool {
    let hit = *counter > 0;
    *counter = counter.saturating_sub(1);
    hit
}

pub(crate) fn address() -> PeripheralAddress {
    "A0:DD:6C:4B:9C:36".parse().unwrap()
}
