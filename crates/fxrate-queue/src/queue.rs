//! Beanstalkd client over a single TCP connection.
//!
//! Commands are serialized behind an async mutex so a consumer and its
//! producer can share one connection. When the connection breaks it is
//! dropped; the next command reconnects and replays `watch`, `ignore` and
//! `use` so the server-side tube selection survives the reconnect.

use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufStream};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use fxrate_models::JobId;

use crate::client::{QueueClient, ReservedJob};
use crate::error::{QueueError, QueueResult};

const CRLF: &[u8] = b"\r\n";
const MAX_TUBE_NAME_LEN: usize = 200;
/// Slack between a delayed job becoming ready and the reserve giving up.
const REQUEUE_GRACE: Duration = Duration::from_secs(5);

/// Queue configuration.
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Beanstalkd host
    pub host: String,
    /// Beanstalkd port
    pub port: u16,
    /// Tube shared by producer and consumer
    pub tube: String,
    /// How long a reserve waits for a job before reporting idle
    pub reserve_timeout: Duration,
    /// TCP connect timeout
    pub connect_timeout: Duration,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 11300,
            tube: "fxrate".to_string(),
            reserve_timeout: Duration::from_secs(5),
            connect_timeout: Duration::from_secs(10),
        }
    }
}

impl QueueConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        Self::from_env_with(Self::default())
    }

    /// Apply environment overrides on top of `defaults`.
    pub fn from_env_with(defaults: Self) -> Self {
        Self {
            host: std::env::var("QUEUE_HOST").unwrap_or(defaults.host),
            port: std::env::var("QUEUE_PORT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.port),
            tube: std::env::var("QUEUE_TUBE").unwrap_or(defaults.tube),
            reserve_timeout: std::env::var("QUEUE_RESERVE_TIMEOUT_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.reserve_timeout),
            connect_timeout: std::env::var("QUEUE_CONNECT_TIMEOUT_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.connect_timeout),
        }
    }

    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Stretch the reserve wait so a job put with `delay_secs` becomes ready
    /// before the reserve reports idle.
    pub fn covering_delay(mut self, delay_secs: u32) -> Self {
        let floor = Duration::from_secs(u64::from(delay_secs)) + REQUEUE_GRACE;
        self.reserve_timeout = self.reserve_timeout.max(floor);
        self
    }
}

/// Check a tube name against beanstalkd's naming rules.
pub fn validate_tube_name(tube: &str) -> QueueResult<()> {
    let allowed = |c: char| c.is_ascii_alphanumeric() || "-+/;.$_()".contains(c);

    if tube.is_empty()
        || tube.len() > MAX_TUBE_NAME_LEN
        || tube.starts_with('-')
        || !tube.chars().all(allowed)
    {
        return Err(QueueError::InvalidTube(tube.to_string()));
    }
    Ok(())
}

/// A parsed server reply line, plus the job body for `RESERVED`.
#[derive(Debug)]
struct Reply {
    line: String,
    body: Option<Vec<u8>>,
}

impl Reply {
    fn status(&self) -> &str {
        self.line.split_whitespace().next().unwrap_or("")
    }

    fn arg<T: FromStr>(&self, index: usize) -> QueueResult<T> {
        self.line
            .split_whitespace()
            .nth(index + 1)
            .and_then(|s| s.parse().ok())
            .ok_or_else(|| QueueError::unexpected(self.line.clone()))
    }
}

struct Connection {
    stream: BufStream<TcpStream>,
    /// Set while a request is awaiting its reply. A connection left in
    /// this state (e.g. by a cancelled future) is out of sync.
    in_flight: bool,
}

impl Connection {
    async fn open(config: &QueueConfig) -> QueueResult<Self> {
        let addr = config.address();
        let stream = tokio::time::timeout(config.connect_timeout, TcpStream::connect(&addr))
            .await
            .map_err(|_| QueueError::connection_failed(format!("timed out connecting to {}", addr)))?
            .map_err(|e| QueueError::connection_failed(format!("{}: {}", addr, e)))?;
        stream.set_nodelay(true)?;

        Ok(Self {
            stream: BufStream::new(stream),
            in_flight: false,
        })
    }

    async fn request(&mut self, command: &str, body: Option<&[u8]>) -> QueueResult<Reply> {
        self.in_flight = true;

        self.stream.write_all(command.as_bytes()).await?;
        self.stream.write_all(CRLF).await?;
        if let Some(body) = body {
            self.stream.write_all(body).await?;
            self.stream.write_all(CRLF).await?;
        }
        self.stream.flush().await?;

        let line = self.read_line().await?;
        let mut reply = Reply { line, body: None };

        if reply.status() == "RESERVED" {
            let len: usize = reply.arg(1)?;
            reply.body = Some(self.read_body(len).await?);
        }

        self.in_flight = false;

        match reply.status() {
            "OUT_OF_MEMORY" | "INTERNAL_ERROR" | "BAD_FORMAT" | "UNKNOWN_COMMAND" => {
                Err(QueueError::Protocol(format!("{} (command: {})", reply.line, command)))
            }
            _ => Ok(reply),
        }
    }

    async fn read_line(&mut self) -> QueueResult<String> {
        let mut line = String::new();
        if self.stream.read_line(&mut line).await? == 0 {
            return Err(QueueError::ConnectionClosed);
        }
        Ok(line.trim_end_matches(['\r', '\n']).to_string())
    }

    async fn read_body(&mut self, len: usize) -> QueueResult<Vec<u8>> {
        let mut buf = vec![0u8; len + CRLF.len()];
        self.stream.read_exact(&mut buf).await?;
        if !buf.ends_with(CRLF) {
            return Err(QueueError::unexpected("job body not terminated by CRLF"));
        }
        buf.truncate(len);
        Ok(buf)
    }

    async fn watch(&mut self, tube: &str) -> QueueResult<u32> {
        let reply = self.request(&format!("watch {}", tube), None).await?;
        match reply.status() {
            "WATCHING" => reply.arg(0),
            _ => Err(QueueError::unexpected(reply.line)),
        }
    }

    async fn ignore(&mut self, tube: &str) -> QueueResult<u32> {
        let reply = self.request(&format!("ignore {}", tube), None).await?;
        match reply.status() {
            "WATCHING" => reply.arg(0),
            // The server refuses to drop the last watched tube.
            "NOT_IGNORED" => Err(QueueError::Protocol(format!("cannot ignore last watched tube {}", tube))),
            _ => Err(QueueError::unexpected(reply.line)),
        }
    }

    async fn use_tube(&mut self, tube: &str) -> QueueResult<String> {
        let reply = self.request(&format!("use {}", tube), None).await?;
        match reply.status() {
            "USING" => reply.arg(0),
            _ => Err(QueueError::unexpected(reply.line)),
        }
    }

    async fn reserve(&mut self, timeout: Duration) -> QueueResult<ReservedJob> {
        let command = format!("reserve-with-timeout {}", timeout.as_secs());
        let reply = self.request(&command, None).await?;
        match reply.status() {
            "RESERVED" => {
                let id: u64 = reply.arg(0)?;
                let body = reply.body.unwrap_or_default();
                Ok(ReservedJob::new(id, body))
            }
            "TIMED_OUT" => Err(QueueError::TimedOut),
            "DEADLINE_SOON" => Err(QueueError::DeadlineSoon),
            _ => Err(QueueError::unexpected(reply.line)),
        }
    }

    async fn delete(&mut self, id: JobId) -> QueueResult<()> {
        let reply = self.request(&format!("delete {}", id), None).await?;
        match reply.status() {
            "DELETED" => Ok(()),
            "NOT_FOUND" => Err(QueueError::NotFound(id.to_string())),
            _ => Err(QueueError::unexpected(reply.line)),
        }
    }

    async fn bury(&mut self, id: JobId, priority: u32) -> QueueResult<()> {
        let reply = self.request(&format!("bury {} {}", id, priority), None).await?;
        match reply.status() {
            "BURIED" => Ok(()),
            "NOT_FOUND" => Err(QueueError::NotFound(id.to_string())),
            _ => Err(QueueError::unexpected(reply.line)),
        }
    }

    async fn put(&mut self, priority: u32, delay: u32, ttr: u32, body: &[u8]) -> QueueResult<JobId> {
        let command = format!("put {} {} {} {}", priority, delay, ttr, body.len());
        let reply = self.request(&command, Some(body)).await?;
        match reply.status() {
            "INSERTED" => reply.arg::<u64>(0).map(JobId),
            // The server ran out of memory growing its priority queue and buried the job.
            "BURIED" => Err(QueueError::Protocol(reply.line)),
            "EXPECTED_CRLF" | "JOB_TOO_BIG" | "DRAINING" => Err(QueueError::Protocol(reply.line)),
            _ => Err(QueueError::unexpected(reply.line)),
        }
    }

    async fn quit(mut self) {
        if let Err(e) = self.stream.write_all(b"quit\r\n").await {
            debug!("Failed to send quit: {}", e);
        }
        self.stream.flush().await.ok();
        self.stream.get_mut().shutdown().await.ok();
    }
}

#[derive(Default)]
struct ConnState {
    conn: Option<Connection>,
    watched: Vec<String>,
    ignored: Vec<String>,
    used: Option<String>,
}

/// Beanstalkd queue client.
pub struct BeanstalkQueue {
    config: QueueConfig,
    state: Mutex<ConnState>,
}

impl BeanstalkQueue {
    /// Connect to the configured server.
    pub async fn connect(config: QueueConfig) -> QueueResult<Self> {
        let conn = Connection::open(&config).await?;
        info!("Connected to beanstalkd server {}", config.address());

        Ok(Self {
            config,
            state: Mutex::new(ConnState {
                conn: Some(conn),
                ..Default::default()
            }),
        })
    }

    /// Connect using environment variables.
    pub async fn from_env() -> QueueResult<Self> {
        Self::connect(QueueConfig::from_env()).await
    }

    pub fn config(&self) -> &QueueConfig {
        &self.config
    }

    async fn ensure_connected<'a>(&self, state: &'a mut ConnState) -> QueueResult<&'a mut Connection> {
        if state.conn.as_ref().is_some_and(|c| c.in_flight) {
            warn!("Discarding out-of-sync beanstalkd connection");
            state.conn = None;
        }

        if state.conn.is_none() {
            let mut conn = Connection::open(&self.config).await?;
            for tube in &state.watched {
                conn.watch(tube).await?;
            }
            for tube in &state.ignored {
                conn.ignore(tube).await?;
            }
            if let Some(tube) = &state.used {
                conn.use_tube(tube).await?;
            }
            info!(
                "Reconnected to beanstalkd server {} (watching {:?}, ignoring {:?}, using {:?})",
                self.config.address(),
                state.watched,
                state.ignored,
                state.used
            );
            state.conn = Some(conn);
        }

        state
            .conn
            .as_mut()
            .ok_or_else(|| QueueError::connection_failed("no connection available"))
    }

    /// Drop the connection when the error leaves it unusable.
    fn settle<T>(&self, state: &mut ConnState, result: QueueResult<T>) -> QueueResult<T> {
        if let Err(e) = &result {
            if e.is_connection_error() {
                warn!("Dropping beanstalkd connection {}: {}", self.config.address(), e);
                state.conn = None;
            }
        }
        result
    }
}

#[async_trait]
impl QueueClient for BeanstalkQueue {
    async fn watch(&self, tube: &str) -> QueueResult<u32> {
        validate_tube_name(tube)?;
        let mut state = self.state.lock().await;
        let result = match self.ensure_connected(&mut state).await {
            Ok(conn) => conn.watch(tube).await,
            Err(e) => Err(e),
        };
        let count = self.settle(&mut state, result)?;

        state.ignored.retain(|t| t != tube);
        if !state.watched.iter().any(|t| t == tube) {
            state.watched.push(tube.to_string());
        }
        info!("Watching beanstalkd tube \"{}\"", tube);
        Ok(count)
    }

    async fn ignore(&self, tube: &str) -> QueueResult<u32> {
        validate_tube_name(tube)?;
        let mut state = self.state.lock().await;
        let result = match self.ensure_connected(&mut state).await {
            Ok(conn) => conn.ignore(tube).await,
            Err(e) => Err(e),
        };
        let count = self.settle(&mut state, result)?;

        state.watched.retain(|t| t != tube);
        if !state.ignored.iter().any(|t| t == tube) {
            state.ignored.push(tube.to_string());
        }
        debug!("Ignoring beanstalkd tube \"{}\"", tube);
        Ok(count)
    }

    async fn use_tube(&self, tube: &str) -> QueueResult<String> {
        validate_tube_name(tube)?;
        let mut state = self.state.lock().await;
        let result = match self.ensure_connected(&mut state).await {
            Ok(conn) => conn.use_tube(tube).await,
            Err(e) => Err(e),
        };
        let using = self.settle(&mut state, result)?;

        state.used = Some(using.clone());
        debug!("Using beanstalkd tube \"{}\"", using);
        Ok(using)
    }

    async fn reserve(&self) -> QueueResult<ReservedJob> {
        let mut state = self.state.lock().await;
        let result = match self.ensure_connected(&mut state).await {
            Ok(conn) => conn.reserve(self.config.reserve_timeout).await,
            Err(e) => Err(e),
        };
        self.settle(&mut state, result)
    }

    async fn delete(&self, id: JobId) -> QueueResult<()> {
        let mut state = self.state.lock().await;
        let result = match self.ensure_connected(&mut state).await {
            Ok(conn) => conn.delete(id).await,
            Err(e) => Err(e),
        };
        self.settle(&mut state, result)
    }

    async fn bury(&self, id: JobId, priority: u32) -> QueueResult<()> {
        let mut state = self.state.lock().await;
        let result = match self.ensure_connected(&mut state).await {
            Ok(conn) => conn.bury(id, priority).await,
            Err(e) => Err(e),
        };
        self.settle(&mut state, result)
    }

    async fn put(&self, priority: u32, delay: u32, ttr: u32, body: &[u8]) -> QueueResult<JobId> {
        let mut state = self.state.lock().await;
        let result = match self.ensure_connected(&mut state).await {
            Ok(conn) => conn.put(priority, delay, ttr, body).await,
            Err(e) => Err(e),
        };
        self.settle(&mut state, result)
    }

    async fn quit(&self) -> QueueResult<()> {
        let mut state = self.state.lock().await;
        if let Some(conn) = state.conn.take() {
            conn.quit().await;
            info!("Closed beanstalkd connection {}", self.config.address());
        }
        Ok(())
    }
}
