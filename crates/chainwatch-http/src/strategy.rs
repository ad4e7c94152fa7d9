//! Endpoint shapes the detail fetcher can talk to.
//!
//! Exactly one strategy is active per process, picked by
//! [`FetchStrategyKind`]; calls are never mixed.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;

use chainwatch_core::config::{EndpointConfig, FetchConfig, FetchStrategyKind};
use chainwatch_core::error::TransportError;
use chainwatch_core::record::TransactionRecord;
use chainwatch_core::request::{JsonRpcRequest, JsonRpcResponse};
use chainwatch_core::wire::record_from_value;

/// A single request/response lookup of one signature.
///
/// `Ok(None)` means the endpoint answered but has no populated record yet.
#[async_trait]
pub trait FetchStrategy: Send + Sync + 'static {
    async fn fetch_once(&self, signature: &str) -> Result<Option<TransactionRecord>, TransportError>;

    /// Short name for logs.
    fn name(&self) -> &'static str;
}

/// Build the configured strategy.
pub fn build_strategy(
    endpoints: &EndpointConfig,
    fetch: &FetchConfig,
) -> Result<Arc<dyn FetchStrategy>, TransportError> {
    Ok(match fetch.strategy {
        FetchStrategyKind::Rpc => Arc::new(RpcStrategy::new(endpoints.rpc_url(), fetch.request_timeout)?),
        FetchStrategyKind::Bulk => Arc::new(BulkStrategy::new(endpoints.bulk_url(), fetch.request_timeout)?),
    })
}

/// POST target shared by both strategies.
struct HttpEndpoint {
    url: String,
    http: reqwest::Client,
    timeout_ms: u64,
}

impl HttpEndpoint {
    fn new(url: String, timeout: Duration) -> Result<Self, TransportError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| TransportError::Http(e.to_string()))?;
        Ok(Self {
            url,
            http,
            timeout_ms: timeout.as_millis() as u64,
        })
    }

    async fn post<B, T>(&self, body: &B) -> Result<T, TransportError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let resp = self
            .http
            .post(&self.url)
            .json(body)
            .send()
            .await
            .map_err(|e| TransportError::from_http(e.to_string(), e.is_timeout(), self.timeout_ms))?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            return Err(TransportError::Status { status, body });
        }

        let bytes = resp
            .bytes()
            .await
            .map_err(|e| TransportError::from_http(e.to_string(), e.is_timeout(), self.timeout_ms))?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}

/// JSON-RPC `getTransaction`, one call per signature.
pub struct RpcStrategy {
    endpoint: HttpEndpoint,
    next_id: AtomicU64,
}

impl RpcStrategy {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, TransportError> {
        Ok(Self {
            endpoint: HttpEndpoint::new(url.into(), timeout)?,
            next_id: AtomicU64::new(1),
        })
    }
}

#[async_trait]
impl FetchStrategy for RpcStrategy {
    async fn fetch_once(&self, signature: &str) -> Result<Option<TransactionRecord>, TransportError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let req = JsonRpcRequest::get_transaction(id, signature);
        let resp: JsonRpcResponse = self.endpoint.post(&req).await?;
        let result = resp.into_result().map_err(TransportError::Rpc)?;
        Ok(record_from_value(signature, result)?)
    }

    fn name(&self) -> &'static str {
        "rpc"
    }
}

/// Bulk lookup: a JSON-RPC batch POST (an array of `getTransaction` calls,
/// one per signature) answered by an array of responses matched back by id.
pub struct BulkStrategy {
    endpoint: HttpEndpoint,
    next_id: AtomicU64,
}

impl BulkStrategy {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, TransportError> {
        Ok(Self {
            endpoint: HttpEndpoint::new(url.into(), timeout)?,
            next_id: AtomicU64::new(1),
        })
    }
}

#[async_trait]
impl FetchStrategy for BulkStrategy {
    async fn fetch_once(&self, signature: &str) -> Result<Option<TransactionRecord>, TransportError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let batch = [JsonRpcRequest::get_transaction(id, signature)];
        let responses: Vec<JsonRpcResponse> = self.endpoint.post(&batch[..]).await?;

        let resp = responses
            .into_iter()
            .find(|r| r.id.as_number() == Some(id))
            .ok_or_else(|| TransportError::Other(format!("batch response has no entry for id {id}")))?;
        let result = resp.into_result().map_err(TransportError::Rpc)?;
        Ok(record_from_value(signature, result)?)
    }

    fn name(&self) -> &'static str {
        "bulk"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};
    use wiremock::matchers::{body_string_contains, method};
    use wiremock::{Mock, MockServer, Request, ResponseTemplate};

    const SIG: &str =
        "5j7s6NiJS3JAkvgkoc18WVAsiSaci2pxB2A6ueCJP4tprA2TFg9wSyTLeYouxPBJEMzJinENTkpA52YStRW5Dia7";

    fn tx_body() -> Value {
        json!({
            "slot": 123456,
            "blockTime": 1678888888,
            "meta": {
                "err": null,
                "fee": 5000,
                "logMessages": ["Program log: Instruction: Swap"],
                "preBalances": [1000000000u64],
                "postBalances": [1500000000u64],
                "preTokenBalances": [],
                "postTokenBalances": []
            },
            "transaction": {
                "signatures": [SIG],
                "message": {"accountKeys": ["payer"], "instructions": []}
            }
        })
    }

    fn timeout() -> Duration {
        Duration::from_secs(5)
    }

    #[tokio::test]
    async fn rpc_strategy_parses_result() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_string_contains("getTransaction"))
            .and(body_string_contains(SIG))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "jsonrpc": "2.0", "id": 1, "result": tx_body()
            })))
            .expect(1)
            .mount(&server)
            .await;

        let strategy = RpcStrategy::new(server.uri(), timeout()).unwrap();
        let record = strategy.fetch_once(SIG).await.unwrap().unwrap();
        assert_eq!(record.signature, SIG);
        assert_eq!(record.slot, 123456);
        assert_eq!(record.block_time, Some(1678888888));
    }

    #[tokio::test]
    async fn rpc_strategy_null_result_is_not_ready() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "jsonrpc": "2.0", "id": 1, "result": null
            })))
            .mount(&server)
            .await;

        let strategy = RpcStrategy::new(server.uri(), timeout()).unwrap();
        assert!(strategy.fetch_once(SIG).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn rpc_strategy_surfaces_rpc_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "jsonrpc": "2.0", "id": 1,
                "error": {"code": -32602, "message": "Invalid param: WrongSize"}
            })))
            .mount(&server)
            .await;

        let strategy = RpcStrategy::new(server.uri(), timeout()).unwrap();
        let err = strategy.fetch_once(SIG).await.unwrap_err();
        assert!(matches!(err, TransportError::Rpc(ref e) if e.code == -32602));
    }

    #[tokio::test]
    async fn non_success_status_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503).set_body_string("overloaded"))
            .mount(&server)
            .await;

        let strategy = RpcStrategy::new(server.uri(), timeout()).unwrap();
        let err = strategy.fetch_once(SIG).await.unwrap_err();
        assert!(matches!(err, TransportError::Status { status: 503, .. }));
    }

    #[tokio::test]
    async fn bulk_strategy_posts_a_batch_and_matches_by_id() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(|req: &Request| {
                serde_json::from_slice::<Value>(&req.body).map_or(false, |v| {
                    v.as_array().map(Vec::len) == Some(1)
                        && v[0]["method"] == "getTransaction"
                        && v[0]["params"][0] == SIG
                })
            })
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {"jsonrpc": "2.0", "id": 99, "result": null},
                {"jsonrpc": "2.0", "id": 1, "result": tx_body()}
            ])))
            .expect(1)
            .mount(&server)
            .await;

        let strategy = BulkStrategy::new(server.uri(), timeout()).unwrap();
        let record = strategy.fetch_once(SIG).await.unwrap().unwrap();
        assert_eq!(record.post_balances, vec![1_500_000_000]);
    }

    #[tokio::test]
    async fn bulk_strategy_null_result_is_not_ready() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {"jsonrpc": "2.0", "id": 1, "result": null}
            ])))
            .mount(&server)
            .await;

        let strategy = BulkStrategy::new(server.uri(), timeout()).unwrap();
        assert!(strategy.fetch_once(SIG).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn bulk_strategy_missing_entry_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
            .mount(&server)
            .await;

        let strategy = BulkStrategy::new(server.uri(), timeout()).unwrap();
        let err = strategy.fetch_once(SIG).await.unwrap_err();
        assert!(matches!(err, TransportError::Other(_)));
    }

    #[tokio::test]
    async fn enhanced_transaction_elements_are_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([{
                "jsonrpc": "2.0",
                "id": 1,
                "result": {
                    "description": "",
                    "type": "SWAP",
                    "source": "RAYDIUM",
                    "fee": 5000,
                    "feePayer": "payer",
                    "signature": SIG,
                    "slot": 123456,
                    "timestamp": 1678888888,
                    "tokenTransfers": [],
                    "nativeTransfers": [],
                    "accountData": [{"account": "payer", "nativeBalanceChange": -5000, "tokenBalanceChanges": []}],
                    "transactionError": null,
                    "instructions": [],
                    "events": {}
                }
            }])))
            .mount(&server)
            .await;

        let strategy = BulkStrategy::new(server.uri(), timeout()).unwrap();
        let err = strategy.fetch_once(SIG).await.unwrap_err();
        assert!(matches!(err, TransportError::Deserialization(_)));
    }

    #[test]
    fn builder_picks_configured_kind() {
        let mut endpoints = EndpointConfig::default();
        endpoints.api_key = "k".into();
        let mut fetch = FetchConfig::default();
        assert_eq!(build_strategy(&endpoints, &fetch).unwrap().name(), "rpc");
        fetch.strategy = FetchStrategyKind::Bulk;
        assert_eq!(build_strategy(&endpoints, &fetch).unwrap().name(), "bulk");
    }
}
