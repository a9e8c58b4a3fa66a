//! Length-prefixed request/response framing over the RPC characteristics.
//!
//! A request is sent as:
//!
//! 1. the body length as a big-endian u32, written to the TX control characteristic
//! 2. the UTF-8 JSON body, written to the data characteristic
//!
//! and the response is received as:
//!
//! 1. the body length as a big-endian u32, read from the RX control characteristic
//! 2. the body, read from the data characteristic one MTU-sized chunk at a time
//!
//! All writes are acknowledged writes. The exchange is strictly half duplex: the
//! caller must not start another exchange before this one returns.

use std::future::Future;

use tokio::time::{timeout, Duration, Instant};
use tracing::debug;

use crate::error::{Error, Result};
use crate::gatt::{GattLink, RpcCharacteristic};
use crate::message::rpc_message::RpcRequest;

const LENGTH_HEADER_LEN: usize = 4;

/// Consecutive empty data reads tolerated before the transfer is declared stalled.
const MAX_EMPTY_READS: u32 = 3;

/// Largest response body accepted. The announced length comes from the
/// peripheral and is never used to size a buffer beyond this.
pub const MAX_RESPONSE_LEN: usize = 64 * 1024;

/// Send `request` and return the raw response body.
///
/// `limit` bounds every individual characteristic operation, and the response
/// body transfer as a whole.
pub async fn send_and_receive<L>(link: &L, request: &RpcRequest, limit: Duration) -> Result<String>
where
    L: GattLink + ?Sized,
{
    let body = request.to_bytes()?;
    let header = encode_length(body.len())?;
    debug!(id = request.id, method = %request.method, len = body.len(), header = %hex::encode(header), "sending request");

    bounded("tx control write", limit, link.write(RpcCharacteristic::TxControl, &header)).await?;
    bounded("request body write", limit, link.write(RpcCharacteristic::Data, &body)).await?;

    let raw = bounded("rx control read", limit, link.read(RpcCharacteristic::RxControl)).await?;
    let expected = decode_length(&raw)?;
    debug!(id = request.id, expected, header = %hex::encode(&raw), "response pending");
    if expected == 0 {
        return Err(Error::Framing("peripheral announced an empty response".into()));
    }
    if expected > MAX_RESPONSE_LEN {
        return Err(Error::Framing(format!(
            "peripheral announced {expected} bytes, more than the {MAX_RESPONSE_LEN} byte limit"
        )));
    }

    let response = read_body(link, expected, limit).await?;
    String::from_utf8(response).map_err(|_| Error::Framing("response body is not valid UTF-8".into()))
}

pub(crate) fn encode_length(len: usize) -> Result<[u8; LENGTH_HEADER_LEN]> {
    let len = u32::try_from(len).map_err(|_| Error::Framing(format!("request of {len} bytes is too large")))?;
    Ok(len.to_be_bytes())
}

pub(crate) fn decode_length(header: &[u8]) -> Result<usize> {
    let bytes: [u8; LENGTH_HEADER_LEN] = header
        .try_into()
        .map_err(|_| Error::Framing(format!("bad length header: 0x{}", hex::encode(header))))?;
    Ok(u32::from_be_bytes(bytes) as usize)
}

/// Accumulate data characteristic reads until `expected` bytes have arrived.
///
/// Any bytes beyond `expected` in the final chunk are dropped.
async fn read_body<L>(link: &L, expected: usize, limit: Duration) -> Result<Vec<u8>>
where
    L: GattLink + ?Sized,
{
    let deadline = Instant::now() + limit;
    let mut body = Vec::new();
    let mut empty_reads = 0;

    while body.len() < expected {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return Err(Error::Timeout { operation: "response body" });
        }

        let chunk = bounded("response body", remaining, link.read(RpcCharacteristic::Data)).await?;
        if chunk.is_empty() {
            empty_reads += 1;
            if empty_reads >= MAX_EMPTY_READS {
                return Err(Error::Framing(format!(
                    "response stalled after {} of {expected} bytes",
                    body.len()
                )));
            }
            continue;
        }

        empty_reads = 0;
        body.extend_from_slice(&chunk);
        debug!(read = chunk.len(), remaining = expected.saturating_sub(body.len()), "response chunk");
    }

    if body.len() > expected {
        debug!(surplus = body.len() - expected, "trimming response to announced length");
        body.truncate(expected);
    }

    Ok(body)
}

async fn bounded<T>(operation: &'static str, limit: Duration, op: impl Future<Output = Result<T>>) -> Result<T> {
    timeout(limit, op)
        .await
        .map_err(|_| Error::Timeout { operation })?
}
