//! TCP adapter for the claw controller board

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::game::command::Direction;
use crate::util::time::unix_millis;

use super::protocol::{self, EVENT_PONG};
use super::{FlipperDirection, HardwareError, MachineControl, MachineEvent};

/// Connection timing for the controller
#[derive(Debug, Clone)]
pub struct TcpSettings {
    pub connect_timeout: Duration,
    pub ping_interval: Duration,
    pub ping_timeout: Duration,
}

impl Default for TcpSettings {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(5),
            ping_interval: Duration::from_secs(2),
            ping_timeout: Duration::from_millis(5000),
        }
    }
}

struct Inner {
    name: String,
    addr: String,
    settings: TcpSettings,
    writer: tokio::sync::Mutex<Option<OwnedWriteHalf>>,
    seq: AtomicU32,
    connected: AtomicBool,
    play_active: AtomicBool,
    events: broadcast::Sender<MachineEvent>,
    /// Outstanding pings by sequence number
    pings: Mutex<HashMap<u32, Instant>>,
    connection: Mutex<Option<CancellationToken>>,
}

/// Claw controller reached over a line-oriented TCP socket
#[derive(Clone)]
pub struct ClawTcpController {
    inner: Arc<Inner>,
}

impl ClawTcpController {
    pub fn new(name: impl Into<String>, addr: impl Into<String>, settings: TcpSettings) -> Self {
        let (events, _) = broadcast::channel(64);
        Self {
            inner: Arc::new(Inner {
                name: name.into(),
                addr: addr.into(),
                settings,
                writer: tokio::sync::Mutex::new(None),
                seq: AtomicU32::new(0),
                connected: AtomicBool::new(false),
                play_active: AtomicBool::new(false),
                events,
                pings: Mutex::new(HashMap::new()),
                connection: Mutex::new(None),
            }),
        }
    }

    async fn timed_move(&self, direction: Direction, duration: Duration) -> Result<(), HardwareError> {
        let command = protocol::move_command(direction, duration.as_millis() as u64)
            .ok_or(HardwareError::Unsupported(direction))?;
        self.inner.send(&command).await?;
        if !duration.is_zero() {
            tokio::time::sleep(duration).await;
        }
        Ok(())
    }
}

impl Inner {
    async fn send(&self, command: &str) -> Result<u32, HardwareError> {
        let seq = self.seq.fetch_add(1, Ordering::Relaxed) + 1;
        let line = protocol::encode_command(seq, command);

        let mut guard = self.writer.lock().await;
        let writer = guard.as_mut().ok_or(HardwareError::NotConnected)?;
        writer.write_all(line.as_bytes()).await?;

        debug!(machine = %self.name, seq, command, "SEND");
        Ok(seq)
    }

    fn handle_line(&self, raw: &str) {
        let line = match protocol::parse_line(raw) {
            Ok(line) => line,
            Err(e) => {
                debug!(machine = %self.name, error = %e, raw, "Unparseable controller line");
                return;
            }
        };

        if line.code == EVENT_PONG {
            if let Some(sent) = line.seq.and_then(|seq| self.pings.lock().remove(&seq)) {
                let latency_ms = sent.elapsed().as_millis() as u64;
                let _ = self.events.send(MachineEvent::PingSuccess { latency_ms });
            }
            return;
        }

        let Some(event) = protocol::to_event(&line) else {
            return;
        };
        if event == MachineEvent::ReturnedCenter {
            self.play_active.store(false, Ordering::SeqCst);
        }
        let _ = self.events.send(event);
    }

    /// Connection dropped underneath us
    fn mark_disconnected(&self) {
        if let Some(token) = self.connection.lock().take() {
            token.cancel();
        }
        self.pings.lock().clear();
        if self.connected.swap(false, Ordering::SeqCst) {
            warn!(machine = %self.name, "Controller disconnected");
            let _ = self.events.send(MachineEvent::Disconnected);
        }
    }
}

async fn read_loop(inner: Arc<Inner>, read: OwnedReadHalf, token: CancellationToken) {
    let mut lines = BufReader::new(read).lines();
    loop {
        tokio::select! {
            _ = token.cancelled() => break,
            line = lines.next_line() => match line {
                Ok(Some(line)) => inner.handle_line(&line),
                Ok(None) => {
                    info!(machine = %inner.name, "Controller closed connection");
                    inner.mark_disconnected();
                    break;
                }
                Err(e) => {
                    warn!(machine = %inner.name, error = %e, "Controller read failed");
                    inner.mark_disconnected();
                    break;
                }
            }
        }
    }
}

async fn ping_loop(inner: Arc<Inner>, token: CancellationToken) {
    loop {
        tokio::select! {
            _ = token.cancelled() => break,
            _ = tokio::time::sleep(inner.settings.ping_interval) => {}
        }

        let seq = match inner.send(&format!("ping {}", unix_millis())).await {
            Ok(seq) => seq,
            Err(e) => {
                warn!(machine = %inner.name, error = %e, "Ping send failed");
                inner.mark_disconnected();
                break;
            }
        };
        inner.pings.lock().insert(seq, Instant::now());

        tokio::select! {
            _ = token.cancelled() => break,
            _ = tokio::time::sleep(inner.settings.ping_timeout) => {}
        }

        // Pong handler removes answered pings
        if inner.pings.lock().remove(&seq).is_some() {
            warn!(machine = %inner.name, seq, "Ping timeout");
            let _ = inner.events.send(MachineEvent::PingTimeout);
            inner.mark_disconnected();
            break;
        }
    }
}

#[async_trait]
impl MachineControl for ClawTcpController {
    fn name(&self) -> &str {
        &self.inner.name
    }

    fn is_connected(&self) -> bool {
        self.inner.connected.load(Ordering::SeqCst)
    }

    fn is_play_active(&self) -> bool {
        self.inner.play_active.load(Ordering::SeqCst)
    }

    fn subscribe(&self) -> broadcast::Receiver<MachineEvent> {
        self.inner.events.subscribe()
    }

    async fn connect(&self) -> Result<(), HardwareError> {
        let inner = &self.inner;
        let stream = tokio::time::timeout(
            inner.settings.connect_timeout,
            TcpStream::connect(&inner.addr),
        )
        .await
        .map_err(|_| HardwareError::ConnectTimeout)?
        .map_err(HardwareError::Connect)?;
        stream.set_nodelay(true).map_err(HardwareError::Connect)?;

        let (read, write) = stream.into_split();
        *inner.writer.lock().await = Some(write);

        let token = CancellationToken::new();
        if let Some(old) = inner.connection.lock().replace(token.clone()) {
            old.cancel();
        }
        inner.pings.lock().clear();
        inner.connected.store(true, Ordering::SeqCst);

        tokio::spawn(read_loop(inner.clone(), read, token.clone()));
        tokio::spawn(ping_loop(inner.clone(), token));

        info!(machine = %inner.name, addr = %inner.addr, "Controller connected");
        Ok(())
    }

    async fn disconnect(&self) {
        let inner = &self.inner;
        if let Some(token) = inner.connection.lock().take() {
            token.cancel();
        }
        if let Some(mut writer) = inner.writer.lock().await.take() {
            let _ = writer.shutdown().await;
        }
        inner.pings.lock().clear();
        inner.connected.store(false, Ordering::SeqCst);
        debug!(machine = %inner.name, "Controller disconnected by request");
    }

    async fn move_forward(&self, duration: Duration) -> Result<(), HardwareError> {
        self.timed_move(Direction::Forward, duration).await
    }

    async fn move_backward(&self, duration: Duration) -> Result<(), HardwareError> {
        self.timed_move(Direction::Backward, duration).await
    }

    async fn move_left(&self, duration: Duration) -> Result<(), HardwareError> {
        self.timed_move(Direction::Left, duration).await
    }

    async fn move_right(&self, duration: Duration) -> Result<(), HardwareError> {
        self.timed_move(Direction::Right, duration).await
    }

    async fn raise(&self, duration: Duration) -> Result<(), HardwareError> {
        self.timed_move(Direction::Raise, duration).await
    }

    async fn lower(&self, duration: Duration) -> Result<(), HardwareError> {
        self.timed_move(Direction::Lower, duration).await
    }

    async fn press_drop(&self) -> Result<(), HardwareError> {
        self.inner.play_active.store(true, Ordering::SeqCst);
        if let Err(e) = self.timed_move(Direction::Down, Duration::ZERO).await {
            self.inner.play_active.store(false, Ordering::SeqCst);
            return Err(e);
        }
        Ok(())
    }

    async fn flipper(&self, direction: FlipperDirection) -> Result<(), HardwareError> {
        self.inner
            .send(&format!("flip {}", direction as u8))
            .await
            .map(|_| ())
    }

    async fn stop_move(&self) -> Result<(), HardwareError> {
        self.timed_move(Direction::Stop, Duration::ZERO).await
    }

    async fn reset(&self) -> Result<(), HardwareError> {
        self.inner.send("state 0").await?;
        self.inner.send("reset").await?;
        self.inner.play_active.store(false, Ordering::SeqCst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn sends_sequenced_commands_and_relays_events() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();

        let settings = TcpSettings {
            ping_interval: Duration::from_secs(3600),
            ..TcpSettings::default()
        };
        let controller = ClawTcpController::new("claw1", addr, settings);
        let mut events = controller.subscribe();

        let server = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = vec![0u8; 64];
            let n = socket.read(&mut buf).await.unwrap();
            socket.write_all(b"106\n").await.unwrap();
            String::from_utf8_lossy(&buf[..n]).to_string()
        });

        controller.connect().await.unwrap();
        assert!(controller.is_connected());

        controller.press_drop().await.unwrap();
        assert!(controller.is_play_active());

        let sent = server.await.unwrap();
        assert_eq!(sent, "1 d 0\n");
        assert_eq!(events.recv().await.unwrap(), MachineEvent::ReturnedHome);

        controller.disconnect().await;
        assert!(!controller.is_connected());
    }

    #[tokio::test]
    async fn commands_fail_when_not_connected() {
        let controller = ClawTcpController::new("claw1", "127.0.0.1:1", TcpSettings::default());
        assert!(matches!(
            controller.stop_move().await,
            Err(HardwareError::NotConnected)
        ));
    }
}
