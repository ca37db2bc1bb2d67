//! JSON-RPC 2.0 dispatch over the search engine's capabilities,
//! exposed via the [`stdio`] and [`http`] transports.

pub mod dispatch;
pub mod http;
pub mod stdio;

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::embedding::EmbeddingProvider;
use crate::errors::RpcError;
use crate::nlp::NlpAnalyzer;
use crate::search::hybrid::HybridSearchEngine;
use crate::vector_store::VectorStoreClient;

pub const PARSE_ERROR: i64 = RpcError::PARSE_ERROR;
pub const INVALID_REQUEST: i64 = RpcError::INVALID_REQUEST;
pub const METHOD_NOT_FOUND: i64 = RpcError::METHOD_NOT_FOUND;
pub const INVALID_PARAMS: i64 = RpcError::INVALID_PARAMS;
pub const INTERNAL_ERROR: i64 = RpcError::INTERNAL_ERROR;

#[derive(Debug, Clone, Deserialize)]
pub struct RpcRequest {
    #[serde(default)]
    pub jsonrpc: Option<String>,
    pub method: String,
    #[serde(default)]
    pub params: Value,
    #[serde(default)]
    pub id: Option<Value>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RpcResponse {
    pub jsonrpc: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<WireError>,
    pub id: Value,
}

/// Serializable mirror of [`RpcError`] — `RpcError` itself stays a plain
/// `thiserror` type so non-RPC callers (`?`-propagation) aren't forced to
/// derive `Serialize`.
#[derive(Debug, Clone, Serialize)]
pub struct WireError {
    pub code: i64,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl From<RpcError> for WireError {
    fn from(e: RpcError) -> Self {
        Self {
            code: e.code,
            message: e.message,
            data: e.data,
        }
    }
}

impl RpcResponse {
    fn ok(id: Value, result: Value) -> Self {
        Self {
            jsonrpc: "2.0",
            result: Some(result),
            error: None,
            id,
        }
    }

    fn err(id: Value, code: i64, message: impl Into<String>, data: Option<Value>) -> Self {
        Self {
            jsonrpc: "2.0",
            result: None,
            error: Some(
                RpcError {
                    code,
                    message: message.into(),
                    data,
                }
                .into(),
            ),
            id,
        }
    }
}

/// Shared handle every transport dispatches requests against.
pub struct RpcState {
    pub engine: HybridSearchEngine,
    pub nlp: Arc<dyn NlpAnalyzer>,
    pub vector_store: Arc<dyn VectorStoreClient>,
    pub embedding_provider: Arc<dyn EmbeddingProvider>,
}

/// The tool names exposed over `tools/list` and dispatched by `tools/call`.
pub const TOOL_NAMES: &[&str] = &[
    "search",
    "search_with_facets",
    "get_facet_suggestions",
    "generate_topic_chain",
    "execute_topic_chain",
    "search_with_topic_chain",
    "analyze_document_relationships",
    "find_similar_documents",
    "detect_document_conflicts",
    "find_complementary_content",
    "cluster_documents",
];

/// Dispatch one parsed request. Returns `None` for notifications (no
/// `id`), which receive no response.
pub async fn dispatch(state: &RpcState, request: RpcRequest) -> Option<RpcResponse> {
    let id = request.id.clone();
    let has_id = id.is_some();
    let id_value = id.unwrap_or(Value::Null);

    if request.jsonrpc.as_deref().is_some() && request.jsonrpc.as_deref() != Some("2.0") {
        return has_id.then(|| RpcResponse::err(id_value, INVALID_REQUEST, "unsupported jsonrpc version", None));
    }

    let result = match request.method.as_str() {
        "initialize" => Ok(dispatch::initialize()),
        "ping" => Ok(serde_json::json!({})),
        "tools/list" => Ok(dispatch::list_tools()),
        "tools/call" => dispatch::call_tool(state, request.params).await,
        other if TOOL_NAMES.contains(&other) => dispatch::call_named(state, other, request.params).await,
        _ => Err((METHOD_NOT_FOUND, format!("unknown method: {}", request.method), None)),
    };

    if !has_id {
        return None;
    }

    Some(match result {
        Ok(value) => RpcResponse::ok(id_value, value),
        Err((code, message, data)) => RpcResponse::err(id_value, code, message, data),
    })
}

/// Parse a raw JSON-RPC request body, handling the `-32700`/`-32600`
/// error cases that precede method dispatch.
pub fn parse_request(raw: &str) -> Result<RpcRequest, RpcResponse> {
    serde_json::from_str::<Value>(raw)
        .map_err(|e| RpcResponse::err(Value::Null, PARSE_ERROR, format!("parse error: {e}"), None))
        .and_then(|value| {
            if !value.is_object() {
                return Err(RpcResponse::err(Value::Null, INVALID_REQUEST, "request must be a JSON object", None));
            }
            if value.get("method").and_then(|m| m.as_str()).is_none() {
                let id = value.get("id").cloned().unwrap_or(Value::Null);
                return Err(RpcResponse::err(id, INVALID_REQUEST, "missing method", None));
            }
            serde_json::from_value(value).map_err(|e| RpcResponse::err(Value::Null, INVALID_REQUEST, format!("invalid request: {e}"), None))
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_request_rejects_non_object_payloads() {
        let err = parse_request("[1,2,3]").unwrap_err();
        assert_eq!(err.error.unwrap().code, INVALID_REQUEST);
    }

    #[test]
    fn parse_request_rejects_missing_method() {
        let err = parse_request(r#"{"jsonrpc":"2.0","id":1}"#).unwrap_err();
        assert_eq!(err.error.unwrap().code, INVALID_REQUEST);
    }

    #[test]
    fn parse_request_accepts_well_formed_request() {
        let request = parse_request(r#"{"jsonrpc":"2.0","method":"ping","id":1}"#).unwrap();
        assert_eq!(request.method, "ping");
    }
}
