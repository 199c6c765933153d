//! Application state shared across routes

use std::sync::Arc;

use tracing::{info, warn};

use crate::config::{Config, MachineEndpoint, MachineSpec};
use crate::game::{MachineRegistry, RegistryError, TurnScheduler};
use crate::hardware::claw_tcp::TcpSettings;
use crate::hardware::{ClawTcpController, MachineControl, MachineEvent, SimulatedMachine};
use crate::modes::policy_for;
use crate::notify::{AlertSink, WebhookNotifier};
use crate::util::rate_limit::ChatRateLimiter;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub registry: Arc<MachineRegistry>,
    pub alerts: Arc<dyn AlertSink>,
    pub chat_limiter: ChatRateLimiter,
}

impl AppState {
    /// Bind a scheduler to every configured machine. Must run inside the
    /// runtime since binding spawns the event pumps.
    pub fn new(config: Config) -> Result<Self, RegistryError> {
        let config = Arc::new(config);
        let alerts: Arc<dyn AlertSink> =
            Arc::new(WebhookNotifier::new(config.alert_webhook_url.clone()));
        let registry = Arc::new(MachineRegistry::new(config.max_machines));

        for spec in &config.machines {
            let machine = build_machine(spec, &config);
            let scheduler = TurnScheduler::bind(
                machine,
                policy_for(config.default_mode),
                config.scheduler.clone(),
                alerts.clone(),
            );
            registry.insert(scheduler)?;
        }

        Ok(Self {
            chat_limiter: ChatRateLimiter::new(config.chat_rate_limit),
            config,
            registry,
            alerts,
        })
    }

    /// Open every machine connection. A machine that cannot be reached is
    /// handed to its scheduler's reconnect loop.
    pub async fn connect_machines(&self) {
        for scheduler in self.registry.list() {
            match scheduler.machine().connect().await {
                Ok(()) => info!(machine = %scheduler.name(), "Machine connected"),
                Err(e) => {
                    warn!(machine = %scheduler.name(), error = %e, "Machine unreachable at startup");
                    scheduler.handle_machine_event(MachineEvent::Disconnected);
                }
            }
        }
    }
}

fn build_machine(spec: &MachineSpec, config: &Config) -> Arc<dyn MachineControl> {
    match &spec.endpoint {
        MachineEndpoint::Tcp(addr) => {
            let settings = TcpSettings {
                ping_interval: config.ping_interval,
                ping_timeout: config.ping_timeout,
                ..TcpSettings::default()
            };
            Arc::new(ClawTcpController::new(&spec.name, addr, settings))
        }
        MachineEndpoint::Simulated => Arc::new(SimulatedMachine::new(&spec.name)),
    }
}
