//! In-process machine for development and tests

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::broadcast;
use tracing::debug;

use crate::game::command::Direction;

use super::{FlipperDirection, HardwareError, MachineControl, MachineEvent};

/// Timing of the automatic drop cycle
#[derive(Debug, Clone, Copy)]
pub struct DropCycle {
    pub recoil: Duration,
    pub return_home: Duration,
    pub return_center: Duration,
}

impl Default for DropCycle {
    fn default() -> Self {
        Self {
            recoil: Duration::from_secs(3),
            return_home: Duration::from_secs(4),
            return_center: Duration::from_secs(3),
        }
    }
}

/// Simulated claw machine. Moves sleep for their duration and a drop plays
/// out recoil, return home and return center unless built with `manual`.
pub struct SimulatedMachine {
    name: String,
    connected: AtomicBool,
    play_active: Arc<AtomicBool>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    log: Mutex<Vec<Direction>>,
    events: broadcast::Sender<MachineEvent>,
    drop_cycle: Option<DropCycle>,
    failing_connects: AtomicU32,
    resets: AtomicU32,
}

impl SimulatedMachine {
    pub fn new(name: impl Into<String>) -> Self {
        Self::build(name.into(), Some(DropCycle::default()))
    }

    pub fn with_drop_cycle(name: impl Into<String>, cycle: DropCycle) -> Self {
        Self::build(name.into(), Some(cycle))
    }

    /// Drop completion is left to the caller via `emit`
    pub fn manual(name: impl Into<String>) -> Self {
        Self::build(name.into(), None)
    }

    fn build(name: String, drop_cycle: Option<DropCycle>) -> Self {
        let (events, _) = broadcast::channel(64);
        Self {
            name,
            connected: AtomicBool::new(true),
            play_active: Arc::new(AtomicBool::new(false)),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            log: Mutex::new(Vec::new()),
            events,
            drop_cycle,
            failing_connects: AtomicU32::new(0),
            resets: AtomicU32::new(0),
        }
    }

    /// Raise an event as if the controller sent it
    pub fn emit(&self, event: MachineEvent) {
        match event {
            MachineEvent::ReturnedCenter => self.play_active.store(false, Ordering::SeqCst),
            MachineEvent::PingTimeout | MachineEvent::Disconnected => {
                self.connected.store(false, Ordering::SeqCst)
            }
            _ => {}
        }
        let _ = self.events.send(event);
    }

    pub fn set_play_active(&self, active: bool) {
        self.play_active.store(active, Ordering::SeqCst);
    }

    /// Make the next `n` connect attempts fail
    pub fn fail_next_connects(&self, n: u32) {
        self.failing_connects.store(n, Ordering::SeqCst);
    }

    /// Every action dispatched so far, in order
    pub fn commands(&self) -> Vec<Direction> {
        self.log.lock().clone()
    }

    /// Highest number of actions that were ever in flight at once
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    pub fn reset_count(&self) -> u32 {
        self.resets.load(Ordering::SeqCst)
    }

    async fn actuate(&self, direction: Direction, duration: Duration) -> Result<(), HardwareError> {
        if !self.is_connected() {
            return Err(HardwareError::NotConnected);
        }

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        self.log.lock().push(direction);
        debug!(machine = %self.name, %direction, ?duration, "Simulated move");

        if !duration.is_zero() {
            tokio::time::sleep(duration).await;
        }

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        Ok(())
    }
}

#[async_trait]
impl MachineControl for SimulatedMachine {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn is_play_active(&self) -> bool {
        self.play_active.load(Ordering::SeqCst)
    }

    fn subscribe(&self) -> broadcast::Receiver<MachineEvent> {
        self.events.subscribe()
    }

    async fn connect(&self) -> Result<(), HardwareError> {
        let failing = self.failing_connects.load(Ordering::SeqCst);
        if failing > 0 {
            self.failing_connects.store(failing - 1, Ordering::SeqCst);
            return Err(HardwareError::ConnectTimeout);
        }
        self.connected.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn disconnect(&self) {
        self.connected.store(false, Ordering::SeqCst);
    }

    async fn move_forward(&self, duration: Duration) -> Result<(), HardwareError> {
        self.actuate(Direction::Forward, duration).await
    }

    async fn move_backward(&self, duration: Duration) -> Result<(), HardwareError> {
        self.actuate(Direction::Backward, duration).await
    }

    async fn move_left(&self, duration: Duration) -> Result<(), HardwareError> {
        self.actuate(Direction::Left, duration).await
    }

    async fn move_right(&self, duration: Duration) -> Result<(), HardwareError> {
        self.actuate(Direction::Right, duration).await
    }

    async fn raise(&self, duration: Duration) -> Result<(), HardwareError> {
        self.actuate(Direction::Raise, duration).await
    }

    async fn lower(&self, duration: Duration) -> Result<(), HardwareError> {
        self.actuate(Direction::Lower, duration).await
    }

    async fn press_drop(&self) -> Result<(), HardwareError> {
        self.play_active.store(true, Ordering::SeqCst);
        self.actuate(Direction::Down, Duration::ZERO).await?;

        if let Some(cycle) = self.drop_cycle {
            let events = self.events.clone();
            let play_active = self.play_active.clone();
            tokio::spawn(async move {
                let _ = events.send(MachineEvent::Dropping);
                tokio::time::sleep(cycle.recoil).await;
                let _ = events.send(MachineEvent::Recoiled);
                tokio::time::sleep(cycle.return_home).await;
                let _ = events.send(MachineEvent::ReturnedHome);
                tokio::time::sleep(cycle.return_center).await;
                play_active.store(false, Ordering::SeqCst);
                let _ = events.send(MachineEvent::ReturnedCenter);
            });
        }
        Ok(())
    }

    async fn flipper(&self, direction: FlipperDirection) -> Result<(), HardwareError> {
        let action = match direction {
            FlipperDirection::Forward => Direction::Strike,
            FlipperDirection::Home => Direction::CounterStrike,
            FlipperDirection::Stopped => Direction::Stop,
        };
        self.actuate(action, Duration::ZERO).await
    }

    async fn stop_move(&self) -> Result<(), HardwareError> {
        self.actuate(Direction::Stop, Duration::ZERO).await
    }

    async fn reset(&self) -> Result<(), HardwareError> {
        self.resets.fetch_add(1, Ordering::SeqCst);
        self.play_active.store(false, Ordering::SeqCst);
        Ok(())
    }
}
