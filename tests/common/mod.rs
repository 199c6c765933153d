//! Shared fixtures for scheduler integration tests

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::broadcast;

use claw_turn_server::config::SchedulerSettings;
use claw_turn_server::game::{GameMode, SchedulerEvent, TurnScheduler};
use claw_turn_server::hardware::SimulatedMachine;
use claw_turn_server::modes::{policy_for, JoinRequest};
use claw_turn_server::notify::{Alert, AlertSink};

#[derive(Clone, Default)]
pub struct RecordingSink {
    pub alerts: Arc<Mutex<Vec<Alert>>>,
}

#[async_trait]
impl AlertSink for RecordingSink {
    async fn send(&self, alert: Alert) {
        self.alerts.lock().push(alert);
    }
}

pub struct Harness {
    pub machine: Arc<SimulatedMachine>,
    pub scheduler: Arc<TurnScheduler>,
    pub events: broadcast::Receiver<SchedulerEvent>,
    pub alerts: RecordingSink,
}

impl Harness {
    pub fn new(mode: GameMode) -> Self {
        Self::with_settings(mode, SchedulerSettings::default())
    }

    pub fn with_settings(mode: GameMode, settings: SchedulerSettings) -> Self {
        let machine = Arc::new(SimulatedMachine::manual("claw1"));
        let alerts = RecordingSink::default();
        let scheduler = TurnScheduler::bind(
            machine.clone(),
            policy_for(mode),
            settings,
            Arc::new(alerts.clone()),
        );
        let events = scheduler.subscribe();
        Self {
            machine,
            scheduler,
            events,
            alerts,
        }
    }

    pub fn join(&self, names: &[&str]) {
        for name in names {
            self.scheduler.join(JoinRequest::new(*name)).unwrap();
        }
    }

    /// Everything published since the last call
    pub fn take_events(&mut self) -> Vec<SchedulerEvent> {
        let mut out = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            out.push(event);
        }
        out
    }

    pub fn current(&self) -> Option<(u64, String)> {
        self.scheduler
            .current_token()
            .map(|t| (t.generation, t.player))
    }
}

pub fn turn_ends(events: &[SchedulerEvent]) -> Vec<(String, u64, claw_turn_server::game::TurnEndReason)> {
    events
        .iter()
        .filter_map(|e| match e {
            SchedulerEvent::TurnEnded {
                player,
                generation,
                reason,
                ..
            } => Some((player.clone(), *generation, *reason)),
            _ => None,
        })
        .collect()
}

pub async fn advance(d: Duration) {
    tokio::time::sleep(d).await;
}

pub fn secs(s: f64) -> Duration {
    Duration::from_secs_f64(s)
}
