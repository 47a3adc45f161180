//! Cross-language dispatch for non-native backends (§4.4, §6).
//!
//! Grounded in `original_source/client/caller_cakerabbit.go` (the `rust`/
//! msgpack-rpc-session path) and `original_source/client/xclient.go`'s
//! `callPySvc` (the `py`/JSON-RPC-over-HTTP path).

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use crate::error::GovernanceError;

const HTTP_TIMEOUT: Duration = Duration::from_secs(5);
const SESSION_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Deserialize)]
struct JsonRpcResponse {
    #[serde(default)]
    result: Option<serde_json::Value>,
}

/// Dispatches to a Python backend speaking JSON-RPC 2.0 over HTTP (§6).
///
/// `POST http://<addr>/api` with a 5-second timeout and an empty `params`
/// object; `result` is returned as a string (empty if the server omitted it
/// or returned a non-string value).
pub async fn call_py(addr: &str, service_path: &str, service_method: &str) -> Result<String, GovernanceError> {
    let client = reqwest::Client::builder()
        .timeout(HTTP_TIMEOUT)
        .build()
        .map_err(|e| GovernanceError::Unavailable(e.to_string()))?;

    let body = json!({
        "jsonrpc": "2.0",
        "method": format!("{service_path}.{service_method}"),
        "params": {},
        "id": "1",
    });

    let response = client
        .post(format!("http://{addr}/api"))
        .json(&body)
        .send()
        .await
        .map_err(|e| GovernanceError::Unavailable(e.to_string()))?;

    let parsed: JsonRpcResponse = response
        .json()
        .await
        .map_err(|e| GovernanceError::Unavailable(e.to_string()))?;

    Ok(match parsed.result {
        Some(serde_json::Value::String(s)) => s,
        Some(other) => other.to_string(),
        None => String::new(),
    })
}

#[derive(Serialize)]
struct SessionRequest<'a> {
    method: &'a str,
    params: Vec<String>,
}

#[derive(Deserialize)]
struct SessionResponse {
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    result: String,
}

/// Dispatches to a Rust-native backend over a tiny length-prefixed msgpack
/// session (§6, §9): a 4-byte big-endian length header followed by a
/// msgpack-encoded request/response body. Positional arguments are ordered
/// by the caller-supplied `param_keys`, pulling values out of `args` the way
/// `invokeCake` walks `psKey` to build its `[]interface{}` arg list.
pub async fn call_rust_session(
    addr: &str,
    service_method: &str,
    args: &std::collections::HashMap<String, String>,
    param_keys: &[String],
) -> Result<String, GovernanceError> {
    let params: Vec<String> = param_keys
        .iter()
        .filter_map(|key| args.get(key).cloned())
        .collect();

    let request = SessionRequest {
        method: service_method,
        params,
    };
    let payload = rmp_serde::to_vec(&request)
        .map_err(|e| GovernanceError::Unavailable(format!("encoding session request: {e}")))?;

    let connect = TcpStream::connect(addr);
    let mut stream = tokio::time::timeout(SESSION_TIMEOUT, connect)
        .await
        .map_err(|_| GovernanceError::Unavailable(format!("dialing {addr} timed out")))?
        .map_err(|e| GovernanceError::Unavailable(format!("dialing {addr}: {e}")))?;

    stream
        .write_all(&(payload.len() as u32).to_be_bytes())
        .await
        .map_err(|e| GovernanceError::Unavailable(e.to_string()))?;
    stream
        .write_all(&payload)
        .await
        .map_err(|e| GovernanceError::Unavailable(e.to_string()))?;

    let mut len_buf = [0u8; 4];
    tokio::time::timeout(SESSION_TIMEOUT, stream.read_exact(&mut len_buf))
        .await
        .map_err(|_| GovernanceError::Unavailable("session response timed out".to_string()))?
        .map_err(|e| GovernanceError::Unavailable(e.to_string()))?;
    let len = u32::from_be_bytes(len_buf) as usize;

    let mut body = vec![0u8; len];
    stream
        .read_exact(&mut body)
        .await
        .map_err(|e| GovernanceError::Unavailable(e.to_string()))?;

    let response: SessionResponse = rmp_serde::from_slice(&body)
        .map_err(|e| GovernanceError::Unavailable(format!("decoding session response: {e}")))?;

    match response.error {
        Some(err) => Err(GovernanceError::Client(rpcx_client::ClientError::Shared(
            rpcx_share::Error::ServiceError(err),
        ))),
        None => Ok(response.result),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn orders_params_by_the_caller_supplied_key_list() {
        let mut args = HashMap::new();
        args.insert("pageIndex".to_string(), "2".to_string());
        args.insert("pageSize".to_string(), "10".to_string());
        args.insert("keyword".to_string(), "rust".to_string());

        let keys = vec!["pageIndex".to_string(), "pageSize".to_string(), "keyword".to_string()];
        let params: Vec<String> = keys.iter().filter_map(|k| args.get(k).cloned()).collect();
        assert_eq!(params, vec!["2".to_string(), "10".to_string(), "rust".to_string()]);
    }
}
