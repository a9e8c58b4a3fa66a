use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};

/// The `src` every request identifies itself with.
pub(crate) const CLIENT_SOURCE: &str = "user_1";

/// A JSON-RPC request as the device expects it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RpcRequest {
    pub id: u32,
    pub src: &'static str,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl RpcRequest {
    /// Empty parameter objects are left off the wire, like absent ones.
    pub fn new(id: u32, method: &str, params: Option<Value>) -> Self {
        let params = params.filter(|p| !p.as_object().is_some_and(|o| o.is_empty()));
        Self { id, src: CLIENT_SOURCE, method: method.to_owned(), params }
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RpcErrorBody {
    #[serde(default)]
    pub code: i64,
    #[serde(default)]
    pub message: String,
}

/// A JSON-RPC response. Exactly one of `result` and `error` is expected.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RpcResponse {
    #[serde(default)]
    pub id: Option<u64>,
    #[serde(default)]
    pub result: Option<Value>,
    #[serde(default)]
    pub error: Option<RpcErrorBody>,
}

impl RpcResponse {
    pub fn parse(body: &str) -> Result<Self> {
        serde_json::from_str(body).map_err(|e| Error::Protocol(format!("malformed response: {e}")))
    }

    /// Check the response belongs to `request_id` and unwrap its result.
    pub fn into_result(self, request_id: u32) -> Result<Value> {
        if self.id != Some(u64::from(request_id)) {
            return Err(Error::Protocol(format!(
                "id mismatch: sent {request_id}, received {}",
                self.id.map_or_else(|| "none".to_owned(), |id| id.to_string())
            )));
        }

        match (self.error, self.result) {
            (Some(error), _) => Err(Error::Rpc { code: error.code, message: error.message }),
            (None, Some(result)) => Ok(result),
            (None, None) => Err(Error::Protocol("response carries neither result nor error".into())),
        }
    }
}
