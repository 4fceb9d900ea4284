//! Gateway session
//!
//! Holds the websocket session with the Discord gateway: identify or resume,
//! heartbeat, and forward the dispatch events the manager handles. Dropped
//! connections are retried with backoff. Close codes no retry can fix end the
//! session with an error.

use std::time::Duration;

use futures::{Sink, SinkExt, Stream, StreamExt};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::{broadcast, mpsc};
use tokio::time::{interval_at, sleep, Instant, MissedTickBehavior};
use tokio_tungstenite::tungstenite::{Error as WsError, Message as WsMessage};
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::protocol::GatewayEvent;

/// Default gateway endpoint
pub const GATEWAY_URL: &str = "wss://gateway.discord.gg/?v=10&encoding=json";

/// Query for resume URLs handed out in READY
const GATEWAY_QUERY: &str = "?v=10&encoding=json";

/// GUILDS | GUILD_MEMBERS | GUILD_MESSAGES | MESSAGE_CONTENT
pub const INTENTS: u64 = (1 << 0) | (1 << 1) | (1 << 9) | (1 << 15);

/// Decoded events buffered ahead of the consumer
const EVENT_QUEUE_SIZE: usize = 256;

const INITIAL_BACKOFF: Duration = Duration::from_secs(1);
const MAX_BACKOFF: Duration = Duration::from_secs(60);

/// Pause before reconnecting when the gateway asks for it
const RECONNECT_DELAY: Duration = Duration::from_secs(1);

/// Authentication failed, invalid shard, sharding required, invalid API
/// version, invalid intents, disallowed intents
const FATAL_CLOSE_CODES: [u16; 6] = [4004, 4010, 4011, 4012, 4013, 4014];

/// Invalid sequence, session timed out
const SESSION_CLOSE_CODES: [u16; 2] = [4007, 4009];

mod op {
    pub const DISPATCH: u8 = 0;
    pub const HEARTBEAT: u8 = 1;
    pub const IDENTIFY: u8 = 2;
    pub const RESUME: u8 = 6;
    pub const RECONNECT: u8 = 7;
    pub const INVALID_SESSION: u8 = 9;
    pub const HELLO: u8 = 10;
    pub const HEARTBEAT_ACK: u8 = 11;
}

#[derive(Debug, Deserialize)]
struct Payload {
    op: u8,
    #[serde(default)]
    d: Value,
    #[serde(default)]
    s: Option<u64>,
    #[serde(default)]
    t: Option<String>,
}

/// Next step after a payload
#[derive(Debug, PartialEq)]
enum Action {
    Ignore,
    Established,
    Forward(GatewayEvent),
    HeartbeatNow,
    Acknowledged,
    Reconnect,
}

/// Resumable session state; outlives single connections
#[derive(Debug, Default)]
struct Session {
    id: Option<String>,
    resume_url: Option<String>,
    seq: Option<u64>,
}

impl Session {
    fn clear(&mut self) {
        *self = Self::default();
    }

    fn connect_url(&self, default: &str) -> String {
        match (&self.id, &self.resume_url) {
            (Some(_), Some(url)) => format!("{}/{}", url.trim_end_matches('/'), GATEWAY_QUERY),
            _ => default.to_string(),
        }
    }

    /// Resume when a session exists, identify otherwise
    fn handshake(&self, token: &str, intents: u64) -> Value {
        match (&self.id, self.seq) {
            (Some(session_id), Some(seq)) => json!({
                "op": op::RESUME,
                "d": {"token": token, "session_id": session_id, "seq": seq},
            }),
            _ => json!({
                "op": op::IDENTIFY,
                "d": {
                    "token": token,
                    "intents": intents,
                    "properties": {
                        "os": std::env::consts::OS,
                        "browser": "ofisu",
                        "device": "ofisu",
                    },
                },
            }),
        }
    }

    fn heartbeat(&self) -> Value {
        json!({"op": op::HEARTBEAT, "d": self.seq})
    }

    fn handle(&mut self, payload: Payload) -> Action {
        match payload.op {
            op::DISPATCH => {
                if let Some(seq) = payload.s {
                    self.seq = Some(seq);
                }
                match payload.t {
                    Some(kind) => self.dispatch(&kind, payload.d),
                    None => Action::Ignore,
                }
            }
            op::HEARTBEAT => Action::HeartbeatNow,
            op::HEARTBEAT_ACK => Action::Acknowledged,
            op::RECONNECT => Action::Reconnect,
            op::INVALID_SESSION => {
                if !payload.d.as_bool().unwrap_or(false) {
                    self.clear();
                }
                Action::Reconnect
            }
            other => {
                debug!(op = other, "Ignoring gateway opcode");
                Action::Ignore
            }
        }
    }

    fn dispatch(&mut self, kind: &str, data: Value) -> Action {
        match kind {
            "READY" => {
                let field = |name: &str| data.get(name).and_then(Value::as_str).map(str::to_string);
                self.id = field("session_id");
                self.resume_url = field("resume_gateway_url");
                info!("Gateway session ready");
                Action::Established
            }
            "RESUMED" => {
                info!(seq = ?self.seq, "Gateway session resumed");
                Action::Established
            }
            "GUILD_CREATE" | "GUILD_DELETE" | "MESSAGE_CREATE" => {
                match GatewayEvent::from_dispatch(kind, data) {
                    Ok(event) => Action::Forward(event),
                    Err(e) => {
                        warn!(event = kind, error = %e, "Undecodable gateway event");
                        Action::Ignore
                    }
                }
            }
            _ => Action::Ignore,
        }
    }
}

/// How a connection ended without an error
enum Closed {
    Reconnect,
    ConsumerGone,
}

fn is_fatal(error: &Error) -> bool {
    matches!(error, Error::GatewayClosed { code, .. } if FATAL_CLOSE_CODES.contains(code))
}

/// Gateway client feeding dispatch events into a channel
pub struct Gateway {
    url: String,
    token: String,
    intents: u64,
    events: mpsc::Sender<GatewayEvent>,
    session: Session,
    established: bool,
}

impl Gateway {
    /// Create a client and the receiver its events arrive on
    pub fn new(token: impl Into<String>) -> (Self, mpsc::Receiver<GatewayEvent>) {
        let (events, receiver) = mpsc::channel(EVENT_QUEUE_SIZE);
        let gateway = Self {
            url: GATEWAY_URL.to_string(),
            token: token.into(),
            intents: INTENTS,
            events,
            session: Session::default(),
            established: false,
        };
        (gateway, receiver)
    }

    /// Connect somewhere other than the public gateway
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    /// Keep a session open until `shutdown` fires
    ///
    /// Returns an error only for close codes that make reconnecting pointless.
    pub async fn run(mut self, mut shutdown: broadcast::Receiver<()>) -> Result<()> {
        let mut backoff = INITIAL_BACKOFF;

        loop {
            let url = self.session.connect_url(&self.url);
            let outcome = tokio::select! {
                outcome = self.connect(&url) => outcome,
                _ = shutdown.recv() => {
                    info!("Gateway shutting down");
                    return Ok(());
                }
            };

            if std::mem::take(&mut self.established) {
                backoff = INITIAL_BACKOFF;
            }
            let delay = match outcome {
                Ok(Closed::ConsumerGone) => {
                    debug!("Event consumer gone");
                    return Ok(());
                }
                Ok(Closed::Reconnect) => RECONNECT_DELAY,
                Err(e) if is_fatal(&e) => return Err(e),
                Err(e) => {
                    if let Error::GatewayClosed { code, .. } = &e {
                        if SESSION_CLOSE_CODES.contains(code) {
                            self.session.clear();
                        }
                    }
                    warn!(error = %e, retry_in = ?backoff, "Gateway connection lost");
                    let delay = backoff;
                    backoff = (backoff * 2).min(MAX_BACKOFF);
                    delay
                }
            };

            tokio::select! {
                _ = sleep(delay) => {}
                _ = shutdown.recv() => return Ok(()),
            }
        }
    }

    async fn connect(&mut self, url: &str) -> Result<Closed> {
        debug!(url, "Connecting to gateway");
        let (socket, _) = tokio_tungstenite::connect_async(url).await?;
        let (mut sink, mut stream) = socket.split();

        let hello = next_payload(&mut stream).await?;
        if hello.op != op::HELLO {
            return Err(Error::Protocol(format!("expected hello, got op {}", hello.op)));
        }
        let period = hello
            .d
            .get("heartbeat_interval")
            .and_then(Value::as_u64)
            .filter(|ms| *ms > 0)
            .map(Duration::from_millis)
            .ok_or_else(|| Error::Protocol("hello without heartbeat interval".into()))?;

        send(&mut sink, &self.session.handshake(&self.token, self.intents)).await?;

        let mut heartbeat = interval_at(Instant::now() + period / 2, period);
        heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut acknowledged = true;

        loop {
            tokio::select! {
                _ = heartbeat.tick() => {
                    if !acknowledged {
                        return Err(Error::Protocol("heartbeat not acknowledged".into()));
                    }
                    acknowledged = false;
                    send(&mut sink, &self.session.heartbeat()).await?;
                }
                payload = next_payload(&mut stream) => {
                    match self.session.handle(payload?) {
                        Action::Ignore => {}
                        Action::Established => self.established = true,
                        Action::Forward(event) => {
                            if self.events.send(event).await.is_err() {
                                return Ok(Closed::ConsumerGone);
                            }
                        }
                        Action::HeartbeatNow => send(&mut sink, &self.session.heartbeat()).await?,
                        Action::Acknowledged => acknowledged = true,
                        Action::Reconnect => {
                            let _ = sink.close().await;
                            debug!("Gateway requested reconnect");
                            return Ok(Closed::Reconnect);
                        }
                    }
                }
            }
        }
    }
}

async fn send<S>(sink: &mut S, payload: &Value) -> Result<()>
where
    S: Sink<WsMessage, Error = WsError> + Unpin,
{
    sink.send(WsMessage::text(payload.to_string())).await?;
    Ok(())
}

/// Next JSON payload; pings are answered by the websocket layer
async fn next_payload<S>(stream: &mut S) -> Result<Payload>
where
    S: Stream<Item = std::result::Result<WsMessage, WsError>> + Unpin,
{
    while let Some(message) = stream.next().await {
        match message? {
            WsMessage::Text(text) => {
                return serde_json::from_str(&text)
                    .map_err(|e| Error::Protocol(format!("bad gateway payload: {}", e)));
            }
            WsMessage::Close(Some(frame)) => {
                return Err(Error::GatewayClosed {
                    code: u16::from(frame.code),
                    reason: frame.reason.to_string(),
                });
            }
            WsMessage::Close(None) => return Err(Error::ConnectionClosed),
            _ => {}
        }
    }
    Err(Error::ConnectionClosed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::{TcpListener, TcpStream};
    use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
    use tokio_tungstenite::tungstenite::protocol::CloseFrame;
    use tokio_tungstenite::WebSocketStream;

    fn payload(value: Value) -> Payload {
        serde_json::from_value(value).unwrap()
    }

    fn ready(seq: u64) -> Payload {
        payload(json!({
            "op": 0, "s": seq, "t": "READY",
            "d": {"session_id": "abc", "resume_gateway_url": "wss://resume.example"},
        }))
    }

    #[test]
    fn test_fresh_session_identifies() {
        let session = Session::default();
        let identify = session.handshake("secret", INTENTS);

        assert_eq!(identify["op"], 2);
        assert_eq!(identify["d"]["token"], "secret");
        assert_eq!(identify["d"]["intents"], INTENTS);
        assert_eq!(session.connect_url(GATEWAY_URL), GATEWAY_URL);
        assert_eq!(session.heartbeat(), json!({"op": 1, "d": null}));
    }

    #[test]
    fn test_ready_session_resumes() {
        let mut session = Session::default();
        assert_eq!(session.handle(ready(1)), Action::Established);
        assert_eq!(
            session.handle(payload(json!({"op": 0, "s": 5, "t": "TYPING_START", "d": {}}))),
            Action::Ignore
        );

        let resume = session.handshake("secret", INTENTS);
        assert_eq!(resume["op"], 6);
        assert_eq!(resume["d"]["session_id"], "abc");
        assert_eq!(resume["d"]["seq"], 5);
        assert_eq!(
            session.connect_url(GATEWAY_URL),
            "wss://resume.example/?v=10&encoding=json"
        );
        assert_eq!(session.heartbeat()["d"], 5);
    }

    #[test]
    fn test_invalid_session_drops_resume_unless_resumable() {
        let mut session = Session::default();
        session.handle(ready(1));

        let resumable = payload(json!({"op": 9, "d": true}));
        assert_eq!(session.handle(resumable), Action::Reconnect);
        assert_eq!(session.id.as_deref(), Some("abc"));

        let dead = payload(json!({"op": 9, "d": false}));
        assert_eq!(session.handle(dead), Action::Reconnect);
        assert_eq!(session.handshake("secret", INTENTS)["op"], 2);
        assert_eq!(session.connect_url(GATEWAY_URL), GATEWAY_URL);
    }

    #[test]
    fn test_dispatch_forwards_handled_events() {
        let mut session = Session::default();
        let action = session.handle(payload(json!({
            "op": 0, "s": 2, "t": "GUILD_DELETE", "d": {"id": "7", "unavailable": true},
        })));
        assert!(matches!(action, Action::Forward(GatewayEvent::GuildDelete(g)) if g.id == "7"));

        assert_eq!(session.handle(payload(json!({"op": 11}))), Action::Acknowledged);
        assert_eq!(session.handle(payload(json!({"op": 1}))), Action::HeartbeatNow);
        assert_eq!(session.handle(payload(json!({"op": 7}))), Action::Reconnect);
        // malformed payloads for handled events are skipped
        assert_eq!(
            session.handle(payload(json!({"op": 0, "s": 3, "t": "MESSAGE_CREATE", "d": {}}))),
            Action::Ignore
        );
        assert_eq!(session.seq, Some(3));
    }

    fn text(value: Value) -> WsMessage {
        WsMessage::text(value.to_string())
    }

    async fn next_json(ws: &mut WebSocketStream<TcpStream>) -> Value {
        loop {
            if let WsMessage::Text(body) = ws.next().await.unwrap().unwrap() {
                return serde_json::from_str(&body).unwrap();
            }
        }
    }

    /// Accept one connection and greet it
    async fn accept(listener: &TcpListener, heartbeat_ms: u64) -> WebSocketStream<TcpStream> {
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
        ws.send(text(json!({"op": 10, "d": {"heartbeat_interval": heartbeat_ms}})))
            .await
            .unwrap();
        ws
    }

    async fn bind() -> (TcpListener, String) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("ws://{}", listener.local_addr().unwrap());
        (listener, url)
    }

    #[tokio::test]
    async fn test_identify_then_forward_messages() {
        let (listener, url) = bind().await;
        let (done_tx, done_rx) = tokio::sync::oneshot::channel::<()>();
        let server = tokio::spawn(async move {
            let mut ws = accept(&listener, 45_000).await;
            let identify = next_json(&mut ws).await;
            ws.send(text(json!({
                "op": 0, "s": 1, "t": "READY",
                "d": {"session_id": "abc", "resume_gateway_url": "ws://127.0.0.1:9"},
            })))
            .await
            .unwrap();
            ws.send(text(json!({"op": 0, "s": 2, "t": "TYPING_START", "d": {}})))
                .await
                .unwrap();
            ws.send(text(json!({
                "op": 0, "s": 3, "t": "MESSAGE_CREATE",
                "d": {
                    "id": "100", "channel_id": "10", "guild_id": "1",
                    "author": {"id": "42", "username": "sarah"},
                    "content": "o look",
                },
            })))
            .await
            .unwrap();
            let _ = done_rx.await;
            identify
        });

        let (gateway, mut events) = Gateway::new("secret");
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let client = tokio::spawn(gateway.with_url(url).run(shutdown_rx));

        let event = events.recv().await.unwrap();
        assert!(matches!(event, GatewayEvent::MessageCreate(m) if m.content == "o look"));

        shutdown_tx.send(()).unwrap();
        assert!(client.await.unwrap().is_ok());
        done_tx.send(()).unwrap();

        let identify = server.await.unwrap();
        assert_eq!(identify["op"], 2);
        assert_eq!(identify["d"]["token"], "secret");
    }

    #[tokio::test]
    async fn test_heartbeat_carries_sequence() {
        let (listener, url) = bind().await;
        let server = tokio::spawn(async move {
            let mut ws = accept(&listener, 50).await;
            next_json(&mut ws).await;
            ws.send(text(json!({"op": 0, "s": 4, "t": "TYPING_START", "d": {}})))
                .await
                .unwrap();
            loop {
                let sent = next_json(&mut ws).await;
                if sent["op"] == 1 && sent["d"] == 4 {
                    return sent;
                }
                ws.send(text(json!({"op": 11}))).await.unwrap();
            }
        });

        let (gateway, _events) = Gateway::new("secret");
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let client = tokio::spawn(gateway.with_url(url).run(shutdown_rx));

        assert_eq!(server.await.unwrap()["d"], 4);
        shutdown_tx.send(()).unwrap();
        assert!(client.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn test_reconnect_request_resumes_session() {
        let (listener, url) = bind().await;
        let resume_url = url.clone();
        let server = tokio::spawn(async move {
            let mut first = accept(&listener, 45_000).await;
            next_json(&mut first).await;
            first
                .send(text(json!({
                    "op": 0, "s": 8, "t": "READY",
                    "d": {"session_id": "abc", "resume_gateway_url": resume_url},
                })))
                .await
                .unwrap();
            first.send(text(json!({"op": 7}))).await.unwrap();

            let mut second = accept(&listener, 45_000).await;
            next_json(&mut second).await
        });

        let (gateway, _events) = Gateway::new("secret");
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let client = tokio::spawn(gateway.with_url(url).run(shutdown_rx));

        let resume = server.await.unwrap();
        assert_eq!(resume["op"], 6);
        assert_eq!(resume["d"]["session_id"], "abc");
        assert_eq!(resume["d"]["seq"], 8);

        shutdown_tx.send(()).unwrap();
        assert!(client.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn test_authentication_failure_is_fatal() {
        let (listener, url) = bind().await;
        tokio::spawn(async move {
            let mut ws = accept(&listener, 45_000).await;
            next_json(&mut ws).await;
            let _ = ws
                .close(Some(CloseFrame {
                    code: CloseCode::from(4004),
                    reason: "Authentication failed".into(),
                }))
                .await;
            while ws.next().await.is_some() {}
        });

        let (gateway, _events) = Gateway::new("wrong");
        let (_shutdown_tx, shutdown_rx) = broadcast::channel(1);

        let err = gateway.with_url(url).run(shutdown_rx).await.unwrap_err();
        assert!(matches!(err, Error::GatewayClosed { code: 4004, .. }));
    }
}
