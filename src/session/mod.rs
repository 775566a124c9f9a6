use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use thiserror::Error;
use tokio::net::TcpStream;
use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, info, warn};

use crate::config::Config;

pub type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// One simulated client: a unique id and the message it keeps sending.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientSpec {
    pub id: u64,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Send, await the reply, sleep, repeat, with ping/pong keepalive on the
    /// wire. Unbounded unless the config sets a round limit.
    Sustained,
    /// Send once, await a single reply, close.
    OneShot,
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("failed to connect to {url}: {source}")]
    Connect {
        url: String,
        #[source]
        source: tungstenite::Error,
    },
    #[error("transport error: {0}")]
    Transport(#[from] tungstenite::Error),
    #[error("connection closed by peer")]
    Closed,
    #[error("no pong within {0:?}, peer considered dead")]
    KeepaliveTimeout(Duration),
}

/// Entry point used by the orchestrator. Failures are logged against the
/// client id and never propagate past this boundary; sibling sessions are
/// unaffected.
pub async fn run(config: Arc<Config>, spec: ClientSpec, mode: Mode) {
    let outcome = match mode {
        Mode::Sustained => run_sustained(&config, &spec).await.map(|_| ()),
        Mode::OneShot => run_once(&config, &spec).await.map(|_| ()),
    };
    if let Err(e) = outcome {
        warn!("Client {} terminated: {}", spec.id, e);
    }
}

/// Single exchange: send the assigned message, wait for one reply, close.
/// Returns the reply so callers can compare it against what was sent. There
/// is no receive timeout: a silent peer leaves the session suspended here.
pub async fn run_once(config: &Config, spec: &ClientSpec) -> Result<String, SessionError> {
    let mut ws = connect(&config.server_url, spec.id).await?;

    ws.send(Message::Text(spec.message.clone())).await?;
    info!("Client {} sent: {}", spec.id, spec.message);

    let reply = loop {
        match classify(ws.next().await)? {
            Incoming::Reply(text) => break text,
            Incoming::Pong | Incoming::Ignored => continue,
        }
    };
    info!("Client {} received: {}", spec.id, reply);

    let _ = ws.close(None).await;
    Ok(reply)
}

/// Send/receive loop with protocol-level keepalive. Returns the number of
/// rounds completed once the configured round limit is reached; with no
/// limit it only returns through an error.
pub async fn run_sustained(config: &Config, spec: &ClientSpec) -> Result<u64, SessionError> {
    let mut ws = connect(&config.server_url, spec.id).await?;

    let send_interval = Duration::from_secs(config.send_interval_seconds);
    let mut keepalive = Keepalive::new(
        Duration::from_secs(config.ping_interval_seconds),
        Duration::from_secs(config.ping_timeout_seconds),
    );

    let mut rounds = 0u64;
    while config.max_rounds.is_none_or(|limit| rounds < limit) {
        if rounds > 0 {
            idle(&mut ws, &mut keepalive, send_interval).await?;
        }

        ws.send(Message::Text(spec.message.clone())).await?;
        info!("Client {} sent: {}", spec.id, spec.message);

        let reply = await_reply(&mut ws, &mut keepalive).await?;
        info!("Client {} received: {}", spec.id, reply);

        rounds += 1;
    }

    let _ = ws.close(None).await;
    Ok(rounds)
}

async fn connect(url: &str, client_id: u64) -> Result<WsStream, SessionError> {
    let (ws, _) = connect_async(url)
        .await
        .map_err(|source| SessionError::Connect {
            url: url.to_string(),
            source,
        })?;
    info!("Client {} connected to {}", client_id, url);
    Ok(ws)
}

enum Incoming {
    Reply(String),
    Pong,
    Ignored,
}

fn classify(
    frame: Option<Result<Message, tungstenite::Error>>,
) -> Result<Incoming, SessionError> {
    match frame {
        None => Err(SessionError::Closed),
        Some(Err(e)) => Err(SessionError::Transport(e)),
        Some(Ok(Message::Text(text))) => Ok(Incoming::Reply(text)),
        Some(Ok(Message::Binary(bytes))) => {
            Ok(Incoming::Reply(String::from_utf8_lossy(&bytes).into_owned()))
        }
        Some(Ok(Message::Pong(_))) => Ok(Incoming::Pong),
        Some(Ok(Message::Close(_))) => Err(SessionError::Closed),
        // Pings are answered by the library on read.
        Some(Ok(_)) => Ok(Incoming::Ignored),
    }
}

/// Client-side ping/pong liveness. A ping goes out every `interval`; an
/// unanswered ping older than `timeout` means the peer is dead.
struct Keepalive {
    ticker: time::Interval,
    timeout: Duration,
    pong_due: Option<Instant>,
}

impl Keepalive {
    fn new(interval: Duration, timeout: Duration) -> Self {
        let mut ticker = time::interval_at(Instant::now() + interval, interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        Self {
            ticker,
            timeout,
            pong_due: None,
        }
    }

    fn ping_sent(&mut self) {
        if self.pong_due.is_none() {
            self.pong_due = Some(Instant::now() + self.timeout);
        }
    }

    fn pong_received(&mut self) {
        self.pong_due = None;
    }
}

/// Resolves when the outstanding pong deadline passes; never, while no ping
/// is in flight.
async fn pong_overdue(deadline: Option<Instant>) {
    match deadline {
        Some(at) => time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}

async fn await_reply(
    ws: &mut WsStream,
    keepalive: &mut Keepalive,
) -> Result<String, SessionError> {
    loop {
        let pong_due = keepalive.pong_due;
        tokio::select! {
            frame = ws.next() => match classify(frame)? {
                Incoming::Reply(text) => return Ok(text),
                Incoming::Pong => keepalive.pong_received(),
                Incoming::Ignored => {}
            },
            _ = keepalive.ticker.tick() => {
                ws.send(Message::Ping(Vec::new())).await?;
                keepalive.ping_sent();
            }
            _ = pong_overdue(pong_due) => {
                return Err(SessionError::KeepaliveTimeout(keepalive.timeout));
            }
        }
    }
}

/// Sleep out the inter-round delay while still pumping the connection, so
/// pings keep going out and pongs are seen.
async fn idle(
    ws: &mut WsStream,
    keepalive: &mut Keepalive,
    delay: Duration,
) -> Result<(), SessionError> {
    let wake = Instant::now() + delay;
    loop {
        let pong_due = keepalive.pong_due;
        tokio::select! {
            _ = time::sleep_until(wake) => return Ok(()),
            frame = ws.next() => match classify(frame)? {
                Incoming::Reply(text) => debug!("unsolicited frame during send delay: {}", text),
                Incoming::Pong => keepalive.pong_received(),
                Incoming::Ignored => {}
            },
            _ = keepalive.ticker.tick() => {
                ws.send(Message::Ping(Vec::new())).await?;
                keepalive.ping_sent();
            }
            _ = pong_overdue(pong_due) => {
                return Err(SessionError::KeepaliveTimeout(keepalive.timeout));
            }
        }
    }
}
