//! Relay Network Client (bloXroute gateway)
//!
//! JSON-RPC over a single websocket, either to a local gateway (authorization
//! header) or to the cloud API (TLS client certificate). One reader task
//! demultiplexes frames:
//! - responses (`id` set) complete a pending request
//! - notifications (`method = subscribe`) go to the channel of their subscription
//!
//! A subscription's channel is registered while its acknowledgement frame is
//! being handled, so notifications that follow the ack on the wire are routed.
//!
//! Feeds built on top:
//! - `bdnBlocks`  -> block hashes
//! - `newTxs`     -> pending tx hashes
//! - `ethOnBlock` -> `getReserves()` per pool, decoded and deduplicated
//!
//! Created: 2026-02-04

use crate::codec::{self, CodecError};
use crate::config::{GET_RESERVES_SELECTOR, RELAY_REQUEST_TIMEOUT, RELAY_SUBSCRIPTION_BUFFER};
use crate::dedup::DedupLedger;
use crate::lifecycle::Shutdown;
use crate::types::{HashRecord, PairReserve};
use alloy::primitives::{Address, B256};
use anyhow::{anyhow, bail, Context, Result};
use dashmap::DashMap;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use rustls::pki_types::pem::PemObject;
use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use rustls::{ClientConfig, RootCertStore};
use serde_json::{json, Value};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::header::{HeaderValue, AUTHORIZATION};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{
    connect_async, connect_async_tls_with_config, Connector, MaybeTlsStream, WebSocketStream,
};
use tracing::{debug, info, warn};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Waiting side of an in-flight request
enum Pending {
    Call(oneshot::Sender<Result<Value, String>>),
    Subscribe {
        items: mpsc::Sender<Value>,
        ack: oneshot::Sender<Result<String, String>>,
    },
}

/// Classified inbound frame
#[derive(Debug, Clone, PartialEq)]
enum Frame {
    Response { id: u64, result: Result<Value, String> },
    Notification { subscription: String, result: Value },
    Other,
}

/// Classify one text frame. None for invalid JSON.
fn parse_frame(text: &str) -> Option<Frame> {
    let v: Value = serde_json::from_str(text).ok()?;

    if v.get("method").and_then(Value::as_str) == Some("subscribe") {
        let params = v.get("params")?;
        let subscription = params.get("subscription")?.as_str()?.to_string();
        let result = params.get("result").cloned().unwrap_or(Value::Null);
        return Some(Frame::Notification { subscription, result });
    }

    let id = match v.get("id") {
        Some(Value::Number(n)) => n.as_u64(),
        Some(Value::String(s)) => s.parse().ok(),
        _ => None,
    };
    let Some(id) = id else {
        return Some(Frame::Other);
    };

    let result = match v.get("error") {
        Some(err) if !err.is_null() => Err(err.to_string()),
        _ => Ok(v.get("result").cloned().unwrap_or(Value::Null)),
    };
    Some(Frame::Response { id, result })
}

/// Live subscription: relay-assigned id plus the notification channel
#[derive(Debug)]
pub struct RelaySubscription {
    pub id: String,
    pub items: mpsc::Receiver<Value>,
}

pub struct BloxrouteClient {
    writer: Mutex<SplitSink<WsStream, Message>>,
    pending: Arc<DashMap<u64, Pending>>,
    subscriptions: Arc<DashMap<String, mpsc::Sender<Value>>>,
    next_id: AtomicU64,
    reader: JoinHandle<()>,
}

impl BloxrouteClient {
    /// Dial a gateway. `auth_header` goes verbatim into `Authorization`.
    pub async fn connect(url: &str, auth_header: Option<&str>) -> Result<Self> {
        let mut request = url
            .into_client_request()
            .context("Invalid relay gateway URL")?;
        if let Some(header) = auth_header {
            let value = HeaderValue::from_str(header).context("Invalid authorization header")?;
            request.headers_mut().insert(AUTHORIZATION, value);
        }

        let (ws, _) = connect_async(request)
            .await
            .context("Relay gateway WS connect failed")?;
        info!("Relay: connected to gateway {}", url);
        Ok(Self::start(ws))
    }

    /// Dial the cloud API, authenticating with a PEM client certificate and key.
    pub async fn connect_with_cert(url: &str, cert: &Path, key: &Path) -> Result<Self> {
        let tls = client_tls_config(cert, key)?;
        let request = url
            .into_client_request()
            .context("Invalid relay cloud URL")?;

        let connector = Connector::Rustls(Arc::new(tls));
        let (ws, _) = connect_async_tls_with_config(request, None, false, Some(connector))
            .await
            .context("Relay cloud WS connect failed")?;
        info!("Relay: connected to cloud {}", url);
        Ok(Self::start(ws))
    }

    fn start(ws: WsStream) -> Self {
        let (writer, stream) = ws.split();
        let pending = Arc::new(DashMap::new());
        let subscriptions = Arc::new(DashMap::new());
        let reader = tokio::spawn(read_loop(stream, pending.clone(), subscriptions.clone()));

        Self {
            writer: Mutex::new(writer),
            pending,
            subscriptions,
            next_id: AtomicU64::new(1),
            reader,
        }
    }

    async fn send(&self, id: u64, method: &str, params: Value) -> Result<()> {
        let body = json!({"jsonrpc": "2.0", "id": id, "method": method, "params": params});
        let text = serde_json::to_string(&body)?;
        self.writer
            .lock()
            .await
            .send(Message::Text(text.into()))
            .await
            .with_context(|| format!("Relay send failed for {}", method))
    }

    /// Send a request and wait for its response.
    pub async fn request(&self, method: &str, params: Value) -> Result<Value> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        self.pending.insert(id, Pending::Call(tx));

        if let Err(e) = self.send(id, method, params).await {
            self.pending.remove(&id);
            return Err(e);
        }

        let response = tokio::time::timeout(RELAY_REQUEST_TIMEOUT, rx)
            .await
            .map_err(|_| {
                self.pending.remove(&id);
                anyhow!("Relay request {} timed out", method)
            })?
            .map_err(|_| anyhow!("Relay connection closed during {}", method))?;

        response.map_err(|e| anyhow!("Relay {} rejected: {}", method, e))
    }

    /// Open a stream subscription, e.g. `subscribe("bdnBlocks", {"include": ["hash"]})`.
    pub async fn subscribe(&self, stream: &str, options: Value) -> Result<RelaySubscription> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (items_tx, items) = mpsc::channel(RELAY_SUBSCRIPTION_BUFFER);
        let (ack_tx, ack) = oneshot::channel();
        self.pending.insert(
            id,
            Pending::Subscribe {
                items: items_tx,
                ack: ack_tx,
            },
        );

        if let Err(e) = self.send(id, "subscribe", json!([stream, options])).await {
            self.pending.remove(&id);
            return Err(e);
        }

        let sub_id = tokio::time::timeout(RELAY_REQUEST_TIMEOUT, ack)
            .await
            .map_err(|_| {
                self.pending.remove(&id);
                anyhow!("Relay subscribe {} timed out", stream)
            })?
            .map_err(|_| anyhow!("Relay connection closed during subscribe {}", stream))?
            .map_err(|e| anyhow!("Relay subscribe {} rejected: {}", stream, e))?;

        info!("Relay: {} subscription active ({})", stream, sub_id);
        Ok(RelaySubscription { id: sub_id, items })
    }

    pub async fn unsubscribe(&self, subscription_id: &str) -> Result<()> {
        self.subscriptions.remove(subscription_id);
        self.request("unsubscribe", json!([subscription_id])).await?;
        debug!("Relay: unsubscribed {}", subscription_id);
        Ok(())
    }

    /// Send a close frame. The reader task ends once the server answers.
    pub async fn close(&self) {
        if let Err(e) = self.writer.lock().await.close().await {
            debug!("Relay close: {}", e);
        }
    }
}

/// TLS client config presenting `cert` (PEM chain) and `key` (PEM private key).
fn client_tls_config(cert: &Path, key: &Path) -> Result<ClientConfig> {
    let certs = CertificateDer::pem_file_iter(cert)
        .with_context(|| format!("Failed to read cert file {:?}", cert))?
        .collect::<Result<Vec<_>, _>>()
        .with_context(|| format!("Invalid PEM in {:?}", cert))?;
    if certs.is_empty() {
        bail!("No certificate found in {:?}", cert);
    }
    let key = PrivateKeyDer::from_pem_file(key)
        .with_context(|| format!("Failed to read key file {:?}", key))?;

    let mut roots = RootCertStore::empty();
    roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());

    ClientConfig::builder_with_provider(Arc::new(rustls::crypto::ring::default_provider()))
        .with_safe_default_protocol_versions()
        .context("TLS protocol setup failed")?
        .with_root_certificates(roots)
        .with_client_auth_cert(certs, key)
        .context("Client certificate and key do not match")
}

impl Drop for BloxrouteClient {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

async fn read_loop(
    mut stream: SplitStream<WsStream>,
    pending: Arc<DashMap<u64, Pending>>,
    subscriptions: Arc<DashMap<String, mpsc::Sender<Value>>>,
) {
    while let Some(msg) = stream.next().await {
        let text = match msg {
            Ok(Message::Text(text)) => text,
            Ok(Message::Close(frame)) => {
                info!("Relay: server closed connection ({:?})", frame);
                break;
            }
            Ok(_) => continue,
            Err(e) => {
                warn!("Relay WS error: {}", e);
                break;
            }
        };

        match parse_frame(text.as_str()) {
            Some(Frame::Response { id, result }) => {
                let Some((_, waiter)) = pending.remove(&id) else {
                    debug!("Relay: response for unknown id {}", id);
                    continue;
                };
                match waiter {
                    Pending::Call(tx) => {
                        let _ = tx.send(result);
                    }
                    Pending::Subscribe { items, ack } => {
                        let outcome = result.and_then(|v| match v.as_str() {
                            Some(sub_id) => Ok(sub_id.to_string()),
                            None => Err(format!("unexpected subscription id {}", v)),
                        });
                        if let Ok(sub_id) = &outcome {
                            subscriptions.insert(sub_id.clone(), items);
                        }
                        let _ = ack.send(outcome);
                    }
                }
            }
            Some(Frame::Notification {
                subscription,
                result,
            }) => {
                let sender = subscriptions.get(&subscription).map(|s| s.value().clone());
                match sender {
                    Some(tx) => {
                        if tx.send(result).await.is_err() {
                            subscriptions.remove(&subscription);
                        }
                    }
                    None => debug!("Relay: notification for unknown subscription {}", subscription),
                }
            }
            Some(Frame::Other) => debug!("Relay: ignoring frame {}", text.as_str()),
            None => warn!("Relay: invalid JSON frame skipped"),
        }
    }

    // Dropping the senders closes every subscription channel
    subscriptions.clear();
    pending.clear();
    info!("Relay: reader stopped");
}

/// Forward a subscription into a typed channel until shutdown or upstream end.
fn forward<T, F>(
    client: Arc<BloxrouteClient>,
    subscription: RelaySubscription,
    mut shutdown: Shutdown,
    mut map: F,
) -> mpsc::Receiver<T>
where
    T: Send + 'static,
    F: FnMut(Value) -> Option<T> + Send + 'static,
{
    let (tx, rx) = mpsc::channel(RELAY_SUBSCRIPTION_BUFFER);
    let RelaySubscription { id, mut items } = subscription;

    tokio::spawn(async move {
        let stopped = loop {
            tokio::select! {
                _ = shutdown.wait() => break true,
                item = items.recv() => {
                    let Some(value) = item else { break false };
                    if let Some(record) = map(value) {
                        if tx.send(record).await.is_err() {
                            break false;
                        }
                    }
                }
            }
        };
        // close the feed before waiting on the gateway
        drop(tx);
        if stopped {
            if let Err(e) = client.unsubscribe(&id).await {
                debug!("Relay unsubscribe {}: {}", id, e);
            }
        }
    });

    rx
}

fn hash_field(value: &Value, keys: &[&str]) -> Option<B256> {
    keys.iter()
        .find_map(|k| value.get(*k).and_then(Value::as_str))
        .and_then(|s| s.parse().ok())
}

/// `bdnBlocks` stream: one `{"hash"}` per block.
pub async fn subscribe_bdn_blocks(
    client: Arc<BloxrouteClient>,
    shutdown: Shutdown,
) -> Result<mpsc::Receiver<HashRecord>> {
    let sub = client
        .subscribe("bdnBlocks", json!({"include": ["hash"]}))
        .await?;
    Ok(forward(client, sub, shutdown, |v| match hash_field(&v, &["hash"]) {
        Some(hash) => Some(HashRecord { hash }),
        None => {
            warn!("Relay: bdnBlocks item without hash: {}", v);
            None
        }
    }))
}

/// `newTxs` stream: one `{"hash"}` per pending transaction.
pub async fn subscribe_new_txs(
    client: Arc<BloxrouteClient>,
    shutdown: Shutdown,
) -> Result<mpsc::Receiver<HashRecord>> {
    let sub = client
        .subscribe("newTxs", json!({"include": ["tx_hash"]}))
        .await?;
    Ok(forward(client, sub, shutdown, |v| {
        match hash_field(&v, &["txHash", "tx_hash"]) {
            Some(hash) => Some(HashRecord { hash }),
            None => {
                warn!("Relay: newTxs item without tx hash: {}", v);
                None
            }
        }
    }))
}

/// One `ethOnBlock` result
#[derive(Debug, Clone, Deserialize)]
pub struct EthOnBlockResponse {
    pub name: String,
    #[serde(default)]
    pub response: String,
    #[serde(rename = "blockHeight", alias = "block_height")]
    block_height: Height,
    #[serde(default)]
    pub tag: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum Height {
    Number(u64),
    Text(String),
}

impl EthOnBlockResponse {
    pub fn block_height(&self) -> Result<u64, CodecError> {
        match &self.block_height {
            Height::Number(n) => Ok(*n),
            Height::Text(s) => {
                let v = codec::parse_quantity(s)?;
                u64::try_from(v).map_err(|_| CodecError::InvalidHex(s.clone()))
            }
        }
    }
}

/// `ethOnBlock` include list
fn eth_on_block_options(calls: Vec<Value>) -> Value {
    json!({
        "include": ["name", "response", "block_height", "tag"],
        "call-params": calls,
    })
}

/// Subscribe an `ethOnBlock` stream with the given call list.
pub async fn subscribe_eth_on_block(
    client: &BloxrouteClient,
    calls: Vec<Value>,
) -> Result<RelaySubscription> {
    client
        .subscribe("ethOnBlock", eth_on_block_options(calls))
        .await
}

/// `getReserves()` call for one pool, named by the pool address
fn get_reserves_call(pair: &Address) -> Value {
    let addr = format!("0x{}", alloy::hex::encode(pair));
    json!({"method": "eth_call", "name": addr, "to": addr, "data": GET_RESERVES_SELECTOR})
}

/// Decode one reserve response. None for responses that are not pool calls.
fn decode_reserve_response(value: Value) -> Option<PairReserve> {
    let resp: EthOnBlockResponse = match serde_json::from_value(value) {
        Ok(r) => r,
        Err(e) => {
            warn!("Relay: bad ethOnBlock item: {}", e);
            return None;
        }
    };
    let pair: Address = resp.name.parse().ok()?;
    let height = match resp.block_height() {
        Ok(h) => h,
        Err(e) => {
            warn!("Relay: bad block height for {}: {}", resp.name, e);
            return None;
        }
    };
    match codec::decode_get_reserves(pair, &resp.response, height as i64) {
        Ok(reserve) => Some(reserve),
        Err(e) => {
            warn!("Relay: getReserves decode failed for {}: {}", resp.name, e);
            None
        }
    }
}

/// Reserve snapshots of `pairs`, evaluated by the relay on every block.
pub async fn subscribe_pair_reserves(
    client: Arc<BloxrouteClient>,
    pairs: &[Address],
    shutdown: Shutdown,
) -> Result<mpsc::Receiver<PairReserve>> {
    let calls = pairs.iter().map(get_reserves_call).collect();
    let sub = subscribe_eth_on_block(&client, calls).await?;
    info!("Relay: watching reserves of {} pools", pairs.len());

    let mut ledger = DedupLedger::new();
    Ok(forward(client, sub, shutdown, move |v| {
        decode_reserve_response(v).filter(|r| ledger.first_sighting(r.fingerprint()))
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lifecycle::shutdown_channel;
    use std::future::Future;
    use std::time::Duration;
    use tokio::net::TcpListener;
    use tokio_tungstenite::accept_async;

    const RESERVES_DATA: &str = "0x0000000000000000000000000000000000000000000d9364e40e581d2dfdc52f00000000000000000000000000000000000000000000409dd0fd22cd782430f50000000000000000000000000000000000000000000000000000000062413c6d";

    type ServerWs = WebSocketStream<TcpStream>;

    /// Single-connection websocket server, returns its ws:// URL
    async fn serve<F, Fut>(handler: F) -> String
    where
        F: FnOnce(ServerWs) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send,
    {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (tcp, _) = listener.accept().await.unwrap();
            let ws = accept_async(tcp).await.unwrap();
            handler(ws).await;
        });
        format!("ws://{}", addr)
    }

    async fn next_request(ws: &mut ServerWs) -> Value {
        loop {
            match ws.next().await {
                Some(Ok(Message::Text(t))) => return serde_json::from_str(t.as_str()).unwrap(),
                Some(Ok(_)) => continue,
                other => panic!("client went away: {:?}", other),
            }
        }
    }

    async fn reply(ws: &mut ServerWs, body: Value) {
        ws.send(Message::Text(body.to_string().into())).await.unwrap();
    }

    fn notification(sub: &str, result: Value) -> Value {
        json!({"jsonrpc": "2.0", "method": "subscribe", "params": {"subscription": sub, "result": result}})
    }

    /// Keep the socket open until the client leaves
    async fn drain(ws: &mut ServerWs) {
        while let Some(Ok(msg)) = ws.next().await {
            if msg.is_close() {
                break;
            }
        }
    }

    #[test]
    fn test_parse_frame_kinds() {
        assert_eq!(
            parse_frame(r#"{"jsonrpc":"2.0","id":3,"result":"abc"}"#),
            Some(Frame::Response { id: 3, result: Ok(json!("abc")) })
        );
        assert!(matches!(
            parse_frame(r#"{"id":"4","error":{"code":-32600,"message":"bad"}}"#),
            Some(Frame::Response { id: 4, result: Err(_) })
        ));
        assert_eq!(
            parse_frame(r#"{"method":"subscribe","params":{"subscription":"s1","result":{"hash":"0x01"}}}"#),
            Some(Frame::Notification {
                subscription: "s1".to_string(),
                result: json!({"hash": "0x01"})
            })
        );
        assert_eq!(parse_frame(r#"{"hello":"world"}"#), Some(Frame::Other));
        assert_eq!(parse_frame("not json"), None);
    }

    #[test]
    fn test_eth_on_block_height_forms() {
        let hex: EthOnBlockResponse = serde_json::from_value(
            json!({"name": "block_number", "response": "0xfafa84", "blockHeight": "0xfafa84"}),
        )
        .unwrap();
        assert_eq!(hex.block_height().unwrap(), 16448132);

        let num: EthOnBlockResponse = serde_json::from_value(
            json!({"name": "x", "response": "0x", "block_height": 16448132u64}),
        )
        .unwrap();
        assert_eq!(num.block_height().unwrap(), 16448132);
    }

    #[test]
    fn test_get_reserves_call_shape() {
        let pair: Address = "0x58F876857a02D6762E0101bb5C46A8c1ED44Dc16".parse().unwrap();
        let call = get_reserves_call(&pair);
        assert_eq!(call["method"], "eth_call");
        assert_eq!(call["data"], "0x0902f1ac");
        assert_eq!(call["name"], "0x58f876857a02d6762e0101bb5c46a8c1ed44dc16");
        assert_eq!(call["to"], call["name"]);
    }

    #[tokio::test]
    async fn test_request_round_trip() {
        let url = serve(|mut ws| async move {
            let req = next_request(&mut ws).await;
            assert_eq!(req["method"], "eth_blockNumber");
            reply(&mut ws, json!({"jsonrpc": "2.0", "id": req["id"], "result": "0x10"})).await;
            drain(&mut ws).await;
        })
        .await;

        let client = BloxrouteClient::connect(&url, Some("secret")).await.unwrap();
        let result = client.request("eth_blockNumber", json!([])).await.unwrap();
        assert_eq!(result, json!("0x10"));
        client.close().await;
    }

    #[tokio::test]
    async fn test_notification_right_after_ack_is_routed() {
        let url = serve(|mut ws| async move {
            let req = next_request(&mut ws).await;
            assert_eq!(req["params"][0], "bdnBlocks");
            reply(&mut ws, json!({"jsonrpc": "2.0", "id": req["id"], "result": "sub-1"})).await;
            let hash = B256::repeat_byte(0x42).to_string();
            reply(&mut ws, notification("sub-1", json!({"hash": hash}))).await;
            drain(&mut ws).await;
        })
        .await;

        let client = Arc::new(BloxrouteClient::connect(&url, None).await.unwrap());
        let (_trigger, shutdown) = shutdown_channel();
        let mut blocks = subscribe_bdn_blocks(client, shutdown).await.unwrap();

        let record = tokio::time::timeout(Duration::from_secs(2), blocks.recv())
            .await
            .expect("notification should arrive")
            .expect("channel open");
        assert_eq!(record.hash, B256::repeat_byte(0x42));
    }

    #[tokio::test]
    async fn test_pair_reserves_deduplicated() {
        let pair = "0x58f876857a02d6762e0101bb5c46a8c1ed44dc16";
        let url = serve(move |mut ws| async move {
            let req = next_request(&mut ws).await;
            assert_eq!(req["params"][0], "ethOnBlock");
            assert_eq!(req["params"][1]["call-params"][0]["name"], pair);
            reply(&mut ws, json!({"jsonrpc": "2.0", "id": req["id"], "result": "sub-r"})).await;

            let item = json!({"name": pair, "response": RESERVES_DATA, "blockHeight": "0xfafa84"});
            for _ in 0..3 {
                reply(&mut ws, notification("sub-r", item.clone())).await;
            }
            let next_block = json!({"name": pair, "response": RESERVES_DATA, "blockHeight": "0xfafa85"});
            reply(&mut ws, notification("sub-r", next_block)).await;
            // Upstream goes away; the feed channel must close
        })
        .await;

        let client = Arc::new(BloxrouteClient::connect(&url, None).await.unwrap());
        let (_trigger, shutdown) = shutdown_channel();
        let pairs = vec![pair.parse::<Address>().unwrap()];
        let mut rx = subscribe_pair_reserves(client, &pairs, shutdown).await.unwrap();

        let mut got = Vec::new();
        while let Ok(Some(r)) = tokio::time::timeout(Duration::from_secs(2), rx.recv()).await {
            got.push(r);
        }
        assert_eq!(got.len(), 2, "repeated snapshot emitted once, new block emitted again");
        assert_eq!(got[0].block_number, 16448132);
        assert_eq!(got[0].block_timestamp_last, 1648442477);
        assert_eq!(got[1].block_number, 16448133);
    }

    #[tokio::test]
    async fn test_shutdown_closes_feed_then_unsubscribes() {
        let (seen_tx, seen_rx) = oneshot::channel::<Value>();
        let url = serve(|mut ws| async move {
            let req = next_request(&mut ws).await;
            reply(&mut ws, json!({"jsonrpc": "2.0", "id": req["id"], "result": "sub-b"})).await;
            let hash = B256::repeat_byte(0x07).to_string();
            reply(&mut ws, notification("sub-b", json!({"hash": hash}))).await;

            // never answer the unsubscribe
            let unsubscribe = next_request(&mut ws).await;
            let _ = seen_tx.send(unsubscribe);
            drain(&mut ws).await;
        })
        .await;

        let client = Arc::new(BloxrouteClient::connect(&url, None).await.unwrap());
        let (trigger, shutdown) = shutdown_channel();
        let mut blocks = subscribe_bdn_blocks(client, shutdown).await.unwrap();
        let first = tokio::time::timeout(Duration::from_secs(2), blocks.recv()).await.unwrap();
        assert_eq!(first.unwrap().hash, B256::repeat_byte(0x07));

        trigger.trigger();
        let end = tokio::time::timeout(Duration::from_millis(500), blocks.recv())
            .await
            .expect("feed closes without waiting on the gateway");
        assert!(end.is_none());

        let unsubscribe = tokio::time::timeout(Duration::from_secs(2), seen_rx)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(unsubscribe["method"], "unsubscribe");
        assert_eq!(unsubscribe["params"][0], "sub-b");
    }

    #[test]
    fn test_client_tls_config_rejects_bad_files() {
        let dir = std::env::temp_dir().join("feed_bench_relay_tls_test");
        std::fs::create_dir_all(&dir).unwrap();
        let missing = dir.join("missing.pem");
        let junk = dir.join("junk.pem");
        std::fs::write(&junk, "not a certificate\n").unwrap();

        let err = client_tls_config(&missing, &missing).unwrap_err();
        assert!(err.to_string().contains("cert file"), "got: {}", err);

        let err = client_tls_config(&junk, &junk).unwrap_err();
        assert!(err.to_string().contains("No certificate"), "got: {}", err);

        let _ = std::fs::remove_file(&junk);
    }

    #[tokio::test]
    async fn test_rejected_subscribe_is_setup_error() {
        let url = serve(|mut ws| async move {
            let req = next_request(&mut ws).await;
            reply(
                &mut ws,
                json!({"jsonrpc": "2.0", "id": req["id"], "error": {"code": -32000, "message": "no access"}}),
            )
            .await;
            drain(&mut ws).await;
        })
        .await;

        let client = BloxrouteClient::connect(&url, None).await.unwrap();
        let err = client.subscribe("newTxs", json!({})).await.unwrap_err();
        assert!(err.to_string().contains("rejected"), "got: {}", err);
    }
}
