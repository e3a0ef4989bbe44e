//! Mempool Vendor Adapter (Blocknative websocket)
//!
//! Protocol:
//! 1. server greets with `{"status":"ok"}` on open
//! 2. client sends the initialize message (API key, chain), server acks
//! 3. client sends each filter command, server acks each one
//! 4. server pushes transaction events
//!
//! Close policy: a clean server close (normal, going away, no status) re-dials,
//! re-runs the handshake and replays every command. Anything else is fatal.
//!
//! Created: 2026-02-04

use crate::codec;
use crate::config::{
    BLOCKNATIVE_NETWORK, BLOCKNATIVE_SYSTEM, BLOCKNATIVE_URL, BLOCKNATIVE_VERSION,
    LIQUIDITY_METHODS, PANCAKE_ROUTER_V2, RECORD_CHANNEL_CAPACITY,
};
use crate::lifecycle::{fatal, Shutdown};
use crate::types::{TxRecord, VendorTx};
use alloy::primitives::{Address, Bytes, B256, U256};
use anyhow::{anyhow, bail, Context, Result};
use chrono::{SecondsFormat, Utc};
use futures::{SinkExt, StreamExt};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::HashSet;
use std::str::FromStr;
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

#[derive(Debug, Clone)]
pub struct BlocknativeConfig {
    pub url: String,
    pub api_key: String,
    pub system: String,
    pub network: String,
    pub from_allow: HashSet<Address>,
    pub to_allow: HashSet<Address>,
}

impl BlocknativeConfig {
    /// BSC mainnet on the public endpoint
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            url: BLOCKNATIVE_URL.to_string(),
            api_key: api_key.into(),
            system: BLOCKNATIVE_SYSTEM.to_string(),
            network: BLOCKNATIVE_NETWORK.to_string(),
            from_allow: HashSet::new(),
            to_allow: HashSet::new(),
        }
    }
}

/// Greeting and ack body
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ConnectResponse {
    #[serde(default)]
    status: String,
    #[serde(default)]
    reason: Option<String>,
    #[serde(default)]
    connection_id: Option<String>,
}

impl ConnectResponse {
    fn ensure_ok(self, step: &str) -> Result<Self> {
        if self.status != "ok" {
            bail!(
                "Vendor {} failed: {}",
                step,
                self.reason.as_deref().unwrap_or("no reason given")
            );
        }
        Ok(self)
    }
}

fn hex_address(addr: &Address) -> String {
    format!("0x{}", alloy::hex::encode(addr))
}

/// Fields every outbound message carries
fn base_message(config: &BlocknativeConfig) -> serde_json::Map<String, Value> {
    let msg = json!({
        "categoryCode": "initialize",
        "eventCode": "checkDappId",
        "timeStamp": Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        "dappId": config.api_key,
        "version": BLOCKNATIVE_VERSION,
        "blockchain": {
            "system": config.system,
            "network": config.network,
        },
    });
    match msg {
        Value::Object(map) => map,
        _ => serde_json::Map::new(),
    }
}

fn config_command(config: &BlocknativeConfig, scope: &str, filter: Value) -> Value {
    let mut msg = base_message(config);
    msg.insert("categoryCode".into(), json!("configs"));
    msg.insert("eventCode".into(), json!("put"));
    msg.insert(
        "config".into(),
        json!({"scope": scope, "filters": [filter], "watchAddress": true}),
    );
    Value::Object(msg)
}

/// Liquidity additions on the router
pub fn router_command(config: &BlocknativeConfig, router: &Address) -> Value {
    let router = hex_address(router);
    let filter = json!({
        "status": "pending",
        "to": router,
        "contractCall.methodName": LIQUIDITY_METHODS,
    });
    config_command(config, &router, filter)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    To,
    From,
}

impl Direction {
    fn key(self) -> &'static str {
        match self {
            Direction::To => "to",
            Direction::From => "from",
        }
    }
}

/// One command per address, each scoped to that address
pub fn address_commands(
    config: &BlocknativeConfig,
    addresses: &HashSet<Address>,
    direction: Direction,
) -> Vec<Value> {
    let mut sorted: Vec<&Address> = addresses.iter().collect();
    sorted.sort();
    sorted
        .into_iter()
        .map(|addr| {
            let addr = hex_address(addr);
            let mut filter = serde_json::Map::new();
            filter.insert("status".into(), json!("pending"));
            filter.insert(direction.key().into(), json!(addr));
            config_command(config, &addr, Value::Object(filter))
        })
        .collect()
}

/// Full command list: router first, then recipients (router excluded), then senders
pub fn subscribe_commands(config: &BlocknativeConfig) -> Vec<Value> {
    let mut commands = vec![router_command(config, &PANCAKE_ROUTER_V2)];

    let mut to_allow = config.to_allow.clone();
    to_allow.remove(&PANCAKE_ROUTER_V2);
    commands.extend(address_commands(config, &to_allow, Direction::To));
    commands.extend(address_commands(config, &config.from_allow, Direction::From));
    commands
}

#[derive(Debug, Deserialize)]
struct VendorMsg {
    #[serde(default)]
    status: String,
    #[serde(default)]
    event: Option<VendorEvent>,
}

#[derive(Debug, Deserialize)]
struct VendorEvent {
    #[serde(default)]
    transaction: Option<WireTx>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireTx {
    #[serde(default)]
    status: String,
    hash: String,
    #[serde(default)]
    from: Option<String>,
    #[serde(default)]
    to: Option<String>,
    #[serde(default)]
    value: Option<String>,
    #[serde(default)]
    gas: Option<u64>,
    #[serde(default)]
    gas_price: Option<String>,
    #[serde(default)]
    nonce: Option<u64>,
    #[serde(default)]
    input: Option<String>,
    #[serde(default)]
    pending_time_stamp: Option<String>,
}

fn opt_quantity(s: Option<&str>) -> Result<U256> {
    match s {
        Some(s) if !s.is_empty() => Ok(codec::parse_quantity(s)?),
        _ => Ok(U256::ZERO),
    }
}

fn opt_address(s: Option<&str>) -> Option<Address> {
    s.and_then(|s| Address::from_str(s).ok())
}

impl WireTx {
    fn into_record(self) -> Result<TxRecord> {
        let hash = B256::from_str(&self.hash).with_context(|| format!("bad hash {}", self.hash))?;
        let input = match self.input.as_deref() {
            Some(s) if !s.is_empty() => {
                Bytes::from_str(s).with_context(|| format!("bad input for {}", self.hash))?
            }
            _ => Bytes::new(),
        };

        Ok(TxRecord::Vendor(VendorTx {
            hash,
            input,
            gas: self.gas.unwrap_or_default(),
            gas_price: opt_quantity(self.gas_price.as_deref())?,
            value: opt_quantity(self.value.as_deref())?,
            nonce: self.nonce.unwrap_or_default(),
            to: opt_address(self.to.as_deref()),
            from: opt_address(self.from.as_deref()),
            pending_time_stamp: self.pending_time_stamp,
        }))
    }
}

/// Decode one inbound frame. `Ok(None)` when it is not a pending transaction.
fn parse_message(text: &str) -> Result<Option<TxRecord>> {
    let msg: VendorMsg = serde_json::from_str(text)?;
    if msg.status != "ok" {
        return Ok(None);
    }
    match msg.event.and_then(|e| e.transaction) {
        Some(tx) if tx.status == "pending" => tx.into_record().map(Some),
        _ => Ok(None),
    }
}

/// Clean closes are recoverable: normal, going away, or no status code
fn is_clean_close(frame: Option<&CloseFrame>) -> bool {
    match frame {
        None => true,
        Some(f) => matches!(f.code, CloseCode::Normal | CloseCode::Away | CloseCode::Status),
    }
}

async fn send_json(ws: &mut WsStream, msg: &Value) -> Result<()> {
    ws.send(Message::Text(msg.to_string().into()))
        .await
        .context("Vendor WS send failed")
}

async fn read_json<T: DeserializeOwned>(ws: &mut WsStream) -> Result<T> {
    loop {
        match ws.next().await {
            Some(Ok(Message::Text(text))) => {
                return serde_json::from_str(text.as_str()).context("Vendor sent invalid JSON");
            }
            Some(Ok(Message::Close(frame))) => bail!("Vendor closed during setup: {:?}", frame),
            Some(Ok(_)) => continue,
            Some(Err(e)) => return Err(anyhow!(e).context("Vendor WS read failed")),
            None => bail!("Vendor WS ended during setup"),
        }
    }
}

/// Dial, read the greeting, run the initialize handshake.
async fn dial(config: &BlocknativeConfig) -> Result<WsStream> {
    let (mut ws, _) = connect_async(config.url.as_str())
        .await
        .with_context(|| format!("Vendor WS connect to {} failed", config.url))?;

    let greeting: ConnectResponse = read_json(&mut ws).await?;
    let greeting = greeting.ensure_ok("connection")?;
    debug!("Vendor: connection id {:?}", greeting.connection_id);

    send_json(&mut ws, &Value::Object(base_message(config))).await?;
    let ack: ConnectResponse = read_json(&mut ws).await?;
    ack.ensure_ok("initialization")?;
    Ok(ws)
}

/// Send commands one at a time, each must be acknowledged.
async fn send_commands(ws: &mut WsStream, commands: &[Value]) -> Result<()> {
    for command in commands {
        send_json(ws, command).await?;
        let ack: ConnectResponse = read_json(ws).await?;
        ack.ensure_ok("subscription")?;
    }
    Ok(())
}

pub struct BlocknativeClient {
    config: Arc<BlocknativeConfig>,
    ws: WsStream,
}

impl BlocknativeClient {
    pub async fn connect(config: BlocknativeConfig) -> Result<Self> {
        let ws = dial(&config).await?;
        info!("Vendor: connected to {} ({}/{})", config.url, config.system, config.network);
        Ok(Self {
            config: Arc::new(config),
            ws,
        })
    }

    /// Submit every filter command, then hand the socket to a pump task.
    pub async fn subscribe(mut self, shutdown: Shutdown) -> Result<mpsc::Receiver<TxRecord>> {
        let commands = subscribe_commands(&self.config);
        send_commands(&mut self.ws, &commands).await?;
        info!("Vendor: {} subscription commands accepted", commands.len());

        let (tx, rx) = mpsc::channel(RECORD_CHANNEL_CAPACITY);
        tokio::spawn(pump(self.config, self.ws, commands, tx, shutdown));
        Ok(rx)
    }
}

/// Single owner of the socket from here on
async fn pump(
    config: Arc<BlocknativeConfig>,
    mut ws: WsStream,
    commands: Vec<Value>,
    tx: mpsc::Sender<TxRecord>,
    mut shutdown: Shutdown,
) {
    let mut forwarded = 0u64;
    loop {
        let msg = tokio::select! {
            _ = shutdown.wait() => {
                let frame = CloseFrame { code: CloseCode::Normal, reason: "".into() };
                if let Err(e) = ws.close(Some(frame)).await {
                    debug!("Vendor close: {}", e);
                }
                info!("Vendor: stopped after {} transactions", forwarded);
                return;
            }
            msg = ws.next() => msg,
        };

        match msg {
            Some(Ok(Message::Text(text))) => match parse_message(text.as_str()) {
                Ok(Some(record)) => {
                    forwarded += 1;
                    if tx.send(record).await.is_err() {
                        return;
                    }
                }
                Ok(None) => {}
                Err(e) => warn!("Vendor: frame skipped: {}", e),
            },
            Some(Ok(Message::Close(frame))) => {
                if !is_clean_close(frame.as_ref()) {
                    fatal("vendor websocket closed", format!("{:?}", frame));
                }
                info!("Vendor: server closed connection ({:?}), re-connecting...", frame);
                drop(ws);
                ws = match reconnect(&config, &commands).await {
                    Ok(ws) => ws,
                    Err(e) => fatal("vendor reconnect", e),
                };
            }
            Some(Ok(_)) => {}
            Some(Err(e)) => fatal("vendor websocket read", e),
            None => fatal("vendor websocket", "stream ended without close frame"),
        }
    }
}

async fn reconnect(config: &BlocknativeConfig, commands: &[Value]) -> Result<WsStream> {
    let mut ws = dial(config).await?;
    send_commands(&mut ws, commands).await?;
    info!("Vendor: re-connected, {} commands replayed", commands.len());
    Ok(ws)
}
