//! JSON-RPC 2.0 client for the on-device UiAutomator server
//!
//! Every call is a single `POST` to `http://localhost:<port>/jsonrpc/0`; the
//! response envelope is unwrapped into either the `result` value or
//! [`Error::Remote`].

use droidscope_core::prelude::*;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Path the UiAutomator server serves JSON-RPC on
pub const RPC_PATH: &str = "/jsonrpc/0";

/// Exception name reported when the server omits one
pub const UNKNOWN_EXCEPTION: &str = "UnknownException";

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

/// Outgoing request envelope
#[derive(Debug, Serialize)]
pub struct RpcRequest<'a> {
    pub jsonrpc: &'static str,
    /// `<method> at <epoch millis>`, for log correlation only
    pub id: String,
    pub method: &'a str,
    pub params: &'a Value,
}

impl<'a> RpcRequest<'a> {
    pub fn new(method: &'a str, params: &'a Value) -> Self {
        Self {
            jsonrpc: "2.0",
            id: format!("{} at {}", method, chrono::Utc::now().timestamp_millis()),
            method,
            params,
        }
    }
}

/// Incoming response envelope
#[derive(Debug, Deserialize)]
pub struct RpcResponse {
    #[serde(default)]
    pub id: Option<Value>,
    #[serde(default)]
    pub result: Option<Value>,
    #[serde(default)]
    pub error: Option<RpcErrorBody>,
}

/// The `error` member of a failed response
#[derive(Debug, Deserialize)]
pub struct RpcErrorBody {
    #[serde(default)]
    pub code: Option<i64>,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub data: Option<RpcErrorData>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RpcErrorData {
    #[serde(default)]
    pub exception_type_name: Option<String>,
}

/// Unwrap a response envelope into its result, or a remote error.
pub fn response_to_result(response: RpcResponse) -> Result<Value> {
    if let Some(error) = response.error {
        let exception = error
            .data
            .and_then(|data| data.exception_type_name)
            .unwrap_or_else(|| UNKNOWN_EXCEPTION.to_string());
        return Err(Error::remote(exception, error.message));
    }
    Ok(response.result.unwrap_or(Value::Null))
}

// ---------------------------------------------------------------------------
// RpcClient
// ---------------------------------------------------------------------------

/// HTTP JSON-RPC client bound to one forwarded port.
#[derive(Debug, Clone)]
pub struct RpcClient {
    http: reqwest::Client,
    endpoint: String,
}

impl RpcClient {
    /// Client for `http://localhost:<port>/jsonrpc/0`.
    pub fn new(port: u16) -> Result<Self> {
        Self::with_endpoint(format!("http://localhost:{port}{RPC_PATH}"))
    }

    /// Client for an explicit endpoint URL.
    pub fn with_endpoint(endpoint: impl Into<String>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .build()
            .map_err(|e| Error::transport(format!("building HTTP client: {e}")))?;
        Ok(Self {
            http,
            endpoint: endpoint.into(),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Invoke `method` with positional `params`.
    ///
    /// # Errors
    ///
    /// [`Error::Remote`] if the server reports an exception, [`Error::Protocol`]
    /// for a body that is not a JSON-RPC envelope, [`Error::Transport`] if the
    /// request cannot be delivered.
    pub async fn call(&self, method: &str, params: Value) -> Result<Value> {
        let request = RpcRequest::new(method, &params);
        debug!("RPC -> {} ({})", request.method, request.id);

        let response = self
            .http
            .post(&self.endpoint)
            .json(&request)
            .send()
            .await
            .map_err(|e| Error::transport(format!("{} to {}: {}", method, self.endpoint, e)))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| Error::transport(format!("reading {method} response: {e}")))?;

        let envelope: RpcResponse = serde_json::from_str(&body).map_err(|e| {
            Error::protocol(format!(
                "{method} returned a non JSON-RPC body (HTTP {status}): {e}"
            ))
        })?;

        let result = response_to_result(envelope);
        match &result {
            Ok(_) => trace!("RPC <- {} ok", method),
            Err(e) => debug!("RPC <- {} failed: {}", method, e),
        }
        result
    }

    /// [`RpcClient::call`] with the result deserialized into `T`.
    pub async fn call_as<T: DeserializeOwned>(&self, method: &str, params: Value) -> Result<T> {
        let value = self.call(method, params).await?;
        Ok(serde_json::from_value(value)?)
    }
}
