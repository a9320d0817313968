// Odoo JSON-RPC implementation of the remote query service
use crate::application::query_service::RemoteQueryService;
use crate::domain::error::RemoteError;
use crate::domain::query::Query;
use crate::infrastructure::config::BackendSettings;
use anyhow::Context;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

#[derive(Debug)]
pub struct JsonRpcQueryService {
    url: String,
    session_id: Option<String>,
    client: reqwest::Client,
    next_id: AtomicU64,
}

#[derive(Debug, Serialize)]
struct RpcRequest<'a> {
    jsonrpc: &'static str,
    method: &'static str,
    id: u64,
    params: CallParams<'a>,
}

#[derive(Debug, Serialize)]
struct CallParams<'a> {
    model: &'a str,
    method: &'a str,
    args: &'a [Value],
    kwargs: &'a Map<String, Value>,
}

#[derive(Debug, Deserialize)]
struct RpcResponse {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<RpcError>,
}

#[derive(Debug, Deserialize)]
struct RpcError {
    #[serde(default)]
    message: String,
    #[serde(default)]
    data: Option<RpcErrorData>,
}

#[derive(Debug, Deserialize)]
struct RpcErrorData {
    #[serde(default)]
    name: String,
    #[serde(default)]
    message: String,
}

impl JsonRpcQueryService {
    pub fn new(url: impl Into<String>, session_id: Option<String>, timeout: Duration) -> anyhow::Result<Self> {
        let url: String = url.into();
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            url: url.trim_end_matches('/').to_string(),
            session_id,
            client,
            next_id: AtomicU64::new(1),
        })
    }

    pub fn from_settings(settings: &BackendSettings) -> anyhow::Result<Self> {
        Self::new(
            settings.url.clone(),
            settings.session_id.clone(),
            Duration::from_secs(settings.timeout_secs),
        )
    }

    fn endpoint(&self, query: &Query) -> String {
        format!(
            "{}/web/dataset/call_kw/{}/{}",
            self.url,
            query.entity().model(),
            query.method().name()
        )
    }
}

/// Map a JSON-RPC error payload onto the error taxonomy. The server reports
/// the Python exception class in `data.name`.
fn classify(query: &Query, error: RpcError) -> RemoteError {
    let (name, detail) = match &error.data {
        Some(data) if !data.message.is_empty() => (data.name.as_str(), data.message.as_str()),
        Some(data) => (data.name.as_str(), error.message.as_str()),
        None => ("", error.message.as_str()),
    };

    if name.contains("AttributeError") {
        RemoteError::MethodNotFound {
            entity: query.entity().model().to_string(),
            method: query.method().name().to_string(),
        }
    } else if name.contains("KeyError") {
        RemoteError::UnknownEntity(query.entity().model().to_string())
    } else if name.is_empty() {
        RemoteError::Server(detail.to_string())
    } else {
        RemoteError::Server(format!("{name}: {detail}"))
    }
}

#[async_trait]
impl RemoteQueryService for JsonRpcQueryService {
    async fn call(&self, query: &Query) -> Result<Value, RemoteError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let request = RpcRequest {
            jsonrpc: "2.0",
            method: "call",
            id,
            params: CallParams {
                model: query.entity().model(),
                method: query.method().name(),
                args: query.args(),
                kwargs: query.kwargs(),
            },
        };

        let mut builder = self.client.post(self.endpoint(query)).json(&request);
        if let Some(session_id) = &self.session_id {
            builder = builder.header("Cookie", format!("session_id={session_id}"));
        }

        tracing::debug!(id, query = %query, "JSON-RPC call");
        let response = builder
            .send()
            .await
            .map_err(|e| RemoteError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RemoteError::Transport(format!("HTTP {status}: {body}")));
        }

        let body = response
            .text()
            .await
            .map_err(|e| RemoteError::Transport(e.to_string()))?;
        let payload: RpcResponse = serde_json::from_str(&body)
            .map_err(|e| RemoteError::malformed(format!("invalid JSON-RPC response: {e}")))?;

        match payload.error {
            Some(error) => Err(classify(query, error)),
            None => Ok(payload.result.unwrap_or(Value::Null)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::query::{Aggregate, Entity};
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn service(server: &MockServer, session_id: Option<&str>) -> JsonRpcQueryService {
        JsonRpcQueryService::new(
            format!("{}/", server.uri()),
            session_id.map(str::to_string),
            Duration::from_secs(5),
        )
        .unwrap()
    }

    fn rpc_error(name: &str, message: &str) -> ResponseTemplate {
        ResponseTemplate::new(200).set_body_json(json!({
            "jsonrpc": "2.0",
            "id": 1,
            "error": {
                "code": 200,
                "message": "Odoo Server Error",
                "data": {"name": name, "message": message}
            }
        }))
    }

    fn statistics() -> Query {
        Query::aggregate(Entity::Partner, Aggregate::DashboardStatistics).unwrap()
    }

    #[tokio::test]
    async fn test_call_posts_call_kw_envelope() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/web/dataset/call_kw/hospital.inpatient/search_count"))
            .and(header("cookie", "session_id=abc123"))
            .and(body_partial_json(json!({
                "jsonrpc": "2.0",
                "method": "call",
                "params": {
                    "model": "hospital.inpatient",
                    "method": "search_count",
                    "args": [[["state", "=", "admit"]]],
                    "kwargs": {}
                }
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "jsonrpc": "2.0",
                "id": 1,
                "result": 17
            })))
            .expect(1)
            .mount(&server)
            .await;

        let query = Query::search_count(Entity::Inpatient, json!([["state", "=", "admit"]])).unwrap();
        let result = service(&server, Some("abc123")).call(&query).await;

        assert_eq!(result, Ok(json!(17)));
    }

    #[tokio::test]
    async fn test_kwargs_forwarded() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/web/dataset/call_kw/hospital.outpatient/search_read"))
            .and(body_partial_json(json!({
                "params": {"kwargs": {"limit": 3, "order": "create_date desc"}}
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"jsonrpc": "2.0", "id": 1, "result": []})))
            .mount(&server)
            .await;

        let query = Query::search_read(Entity::Outpatient, json!([]), &[])
            .unwrap()
            .limit(3)
            .order("create_date desc");

        assert_eq!(service(&server, None).call(&query).await, Ok(json!([])));
    }

    #[tokio::test]
    async fn test_null_result() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"jsonrpc": "2.0", "id": 1, "result": null})))
            .mount(&server)
            .await;

        assert_eq!(service(&server, None).call(&statistics()).await, Ok(Value::Null));
    }

    #[tokio::test]
    async fn test_attribute_error_is_method_not_found() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(rpc_error(
                "builtins.AttributeError",
                "'res.partner' object has no attribute 'get_dashboard_statistics'",
            ))
            .mount(&server)
            .await;

        let result = service(&server, None).call(&statistics()).await;

        assert_eq!(
            result,
            Err(RemoteError::MethodNotFound {
                entity: "res.partner".to_string(),
                method: "get_dashboard_statistics".to_string(),
            })
        );
    }

    #[tokio::test]
    async fn test_key_error_is_unknown_entity() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(rpc_error("builtins.KeyError", "'hospital.laboratory'"))
            .mount(&server)
            .await;

        let query = Query::aggregate(Entity::Laboratory, Aggregate::LabStatistics).unwrap();
        let result = service(&server, None).call(&query).await;

        assert_eq!(result, Err(RemoteError::UnknownEntity("hospital.laboratory".to_string())));
    }

    #[tokio::test]
    async fn test_other_errors_are_server_faults() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(rpc_error("odoo.exceptions.AccessError", "not allowed"))
            .mount(&server)
            .await;

        let result = service(&server, None).call(&statistics()).await;

        assert_eq!(
            result,
            Err(RemoteError::Server("odoo.exceptions.AccessError: not allowed".to_string()))
        );
    }

    #[tokio::test]
    async fn test_http_failure_is_transport() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(502).set_body_string("bad gateway"))
            .mount(&server)
            .await;

        let result = service(&server, None).call(&statistics()).await;

        assert!(matches!(result, Err(RemoteError::Transport(message)) if message.contains("502")));
    }

    #[tokio::test]
    async fn test_non_json_body_is_malformed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>login</html>"))
            .mount(&server)
            .await;

        let result = service(&server, None).call(&statistics()).await;

        assert!(matches!(result, Err(RemoteError::Malformed(_))));
    }

    #[tokio::test]
    async fn test_unreachable_backend_is_transport() {
        let unreachable = JsonRpcQueryService::new("http://127.0.0.1:1", None, Duration::from_secs(1)).unwrap();

        let result = unreachable.call(&statistics()).await;

        assert!(matches!(result, Err(RemoteError::Transport(_))));
    }
}
