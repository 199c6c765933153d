//! Configuration module - environment variable parsing

use std::env;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use crate::game::GameMode;

/// Application configuration loaded from environment variables
#[derive(Clone, Debug)]
pub struct Config {
    /// Server binding address
    pub server_addr: SocketAddr,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Emit JSON log lines instead of the human-readable format
    pub log_json: bool,
    /// Allowed client origin for CORS
    pub client_origin: String,

    /// HS256 secret for operator tokens
    pub operator_jwt_secret: String,
    /// Webhook receiving operator alerts, logged only when unset
    pub alert_webhook_url: Option<String>,

    /// Machines to bind at startup
    pub machines: Vec<MachineSpec>,
    pub max_machines: usize,
    pub default_mode: GameMode,

    /// Per-sender chat commands allowed per second
    pub chat_rate_limit: u32,
    pub ping_interval: Duration,
    pub ping_timeout: Duration,

    pub scheduler: SchedulerSettings,
}

/// Where a machine lives
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MachineEndpoint {
    Tcp(String),
    Simulated,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MachineSpec {
    pub name: String,
    pub endpoint: MachineEndpoint,
}

/// Values handed to every turn scheduler at construction
#[derive(Clone, Debug)]
pub struct SchedulerSettings {
    /// Total turn length, grace window included
    pub round_duration: Duration,
    /// Window in which a player must act at all
    pub grace_window: Duration,
    pub move_duration: Duration,
    pub short_move_duration: Duration,
    /// 0 means unbounded
    pub max_queue_size: usize,
    pub case_sensitive_identities: bool,
    pub max_reset_attempts: u32,
    pub reset_delay: Duration,
    pub reconnect_interval: Duration,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            round_duration: Duration::from_secs(45),
            grace_window: Duration::from_secs(15),
            move_duration: Duration::from_millis(200),
            short_move_duration: Duration::from_millis(80),
            max_queue_size: 0,
            case_sensitive_identities: false,
            max_reset_attempts: 4,
            reset_delay: Duration::from_secs(10),
            reconnect_interval: Duration::from_secs(20),
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build configuration from any key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        // PORT wins over SERVER_ADDR for hosted deployments
        let server_addr = match lookup("PORT") {
            Some(port) => format!("0.0.0.0:{}", port),
            None => lookup("SERVER_ADDR").unwrap_or_else(|| "0.0.0.0:8080".to_string()),
        };

        let defaults = SchedulerSettings::default();
        let scheduler = SchedulerSettings {
            round_duration: Duration::from_secs(parse_or(
                &lookup,
                "ROUND_DURATION_SECS",
                defaults.round_duration.as_secs(),
            )?),
            grace_window: Duration::from_secs(parse_or(
                &lookup,
                "GRACE_WINDOW_SECS",
                defaults.grace_window.as_secs(),
            )?),
            move_duration: Duration::from_millis(parse_or(
                &lookup,
                "MOVE_DURATION_MS",
                defaults.move_duration.as_millis() as u64,
            )?),
            short_move_duration: Duration::from_millis(parse_or(
                &lookup,
                "SHORT_MOVE_DURATION_MS",
                defaults.short_move_duration.as_millis() as u64,
            )?),
            max_queue_size: parse_or(&lookup, "MAX_QUEUE_SIZE", defaults.max_queue_size)?,
            case_sensitive_identities: parse_or(
                &lookup,
                "IDENTITY_CASE_SENSITIVE",
                defaults.case_sensitive_identities,
            )?,
            max_reset_attempts: parse_or(
                &lookup,
                "MAX_RESET_ATTEMPTS",
                defaults.max_reset_attempts,
            )?,
            reset_delay: Duration::from_secs(parse_or(
                &lookup,
                "RESET_DELAY_SECS",
                defaults.reset_delay.as_secs(),
            )?),
            reconnect_interval: Duration::from_secs(parse_or(
                &lookup,
                "RECONNECT_INTERVAL_SECS",
                defaults.reconnect_interval.as_secs(),
            )?),
        };

        let config = Self {
            server_addr: server_addr
                .parse()
                .map_err(|_| ConfigError::InvalidAddress)?,

            log_level: lookup("LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
            log_json: lookup("LOG_FORMAT").is_some_and(|f| f.trim().eq_ignore_ascii_case("json")),
            client_origin: lookup("CLIENT_ORIGIN")
                .unwrap_or_else(|| "http://localhost:3000".to_string()),

            operator_jwt_secret: lookup("OPERATOR_JWT_SECRET")
                .ok_or(ConfigError::Missing("OPERATOR_JWT_SECRET"))?,
            alert_webhook_url: lookup("ALERT_WEBHOOK_URL").filter(|url| !url.trim().is_empty()),

            machines: parse_machines(&lookup("MACHINES").unwrap_or_else(|| "claw1=sim".to_string()))?,
            max_machines: parse_or(&lookup, "MAX_MACHINES", 4)?,
            default_mode: parse_or(&lookup, "DEFAULT_MODE", GameMode::Single)?,

            chat_rate_limit: parse_or(&lookup, "CHAT_RATE_LIMIT", 5)?,
            ping_interval: Duration::from_secs(parse_or(&lookup, "PING_INTERVAL_SECS", 2)?),
            ping_timeout: Duration::from_millis(parse_or(&lookup, "PING_TIMEOUT_MS", 5000)?),

            scheduler,
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.scheduler.grace_window >= self.scheduler.round_duration {
            return Err(ConfigError::GraceExceedsRound);
        }
        if self.machines.len() > self.max_machines {
            return Err(ConfigError::TooManyMachines {
                configured: self.machines.len(),
                max: self.max_machines,
            });
        }
        Ok(())
    }
}

fn parse_or<F, T>(lookup: &F, key: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(key) {
        Some(raw) => raw.trim().parse().map_err(|_| ConfigError::Invalid(key)),
        None => Ok(default),
    }
}

/// Parse `name=host:port` or `name=sim` entries separated by commas
pub fn parse_machines(raw: &str) -> Result<Vec<MachineSpec>, ConfigError> {
    let mut machines: Vec<MachineSpec> = Vec::new();

    for entry in raw.split(',').map(str::trim).filter(|e| !e.is_empty()) {
        let (name, target) = entry
            .split_once('=')
            .ok_or_else(|| ConfigError::InvalidMachine(entry.to_string()))?;
        let (name, target) = (name.trim(), target.trim());
        if name.is_empty() || target.is_empty() {
            return Err(ConfigError::InvalidMachine(entry.to_string()));
        }
        if machines.iter().any(|m| m.name == name) {
            return Err(ConfigError::DuplicateMachine(name.to_string()));
        }

        let endpoint = if target.eq_ignore_ascii_case("sim") {
            MachineEndpoint::Simulated
        } else {
            MachineEndpoint::Tcp(target.to_string())
        };
        machines.push(MachineSpec {
            name: name.to_string(),
            endpoint,
        });
    }

    Ok(machines)
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),

    #[error("Invalid value for environment variable: {0}")]
    Invalid(&'static str),

    #[error("Invalid server address format")]
    InvalidAddress,

    #[error("Invalid machine entry: {0}")]
    InvalidMachine(String),

    #[error("Machine listed twice: {0}")]
    DuplicateMachine(String),

    #[error("{configured} machines configured but at most {max} allowed")]
    TooManyMachines { configured: usize, max: usize },

    #[error("Grace window must be shorter than the round duration")]
    GraceExceedsRound,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_apply_when_only_secret_is_set() {
        let config = Config::from_lookup(lookup_from(&[("OPERATOR_JWT_SECRET", "s3cret")])).unwrap();

        assert_eq!(config.server_addr.port(), 8080);
        assert_eq!(config.scheduler.round_duration, Duration::from_secs(45));
        assert_eq!(config.scheduler.grace_window, Duration::from_secs(15));
        assert_eq!(config.scheduler.max_reset_attempts, 4);
        assert_eq!(config.default_mode, GameMode::Single);
        assert_eq!(
            config.machines,
            vec![MachineSpec {
                name: "claw1".to_string(),
                endpoint: MachineEndpoint::Simulated
            }]
        );
        assert!(config.alert_webhook_url.is_none());
    }

    #[test]
    fn missing_secret_is_an_error() {
        let err = Config::from_lookup(lookup_from(&[])).unwrap_err();
        assert!(matches!(err, ConfigError::Missing("OPERATOR_JWT_SECRET")));
    }

    #[test]
    fn port_overrides_server_addr() {
        let config = Config::from_lookup(lookup_from(&[
            ("OPERATOR_JWT_SECRET", "x"),
            ("PORT", "9000"),
            ("SERVER_ADDR", "127.0.0.1:1234"),
        ]))
        .unwrap();
        assert_eq!(config.server_addr.port(), 9000);
    }

    #[test]
    fn grace_must_be_shorter_than_round() {
        let err = Config::from_lookup(lookup_from(&[
            ("OPERATOR_JWT_SECRET", "x"),
            ("GRACE_WINDOW_SECS", "45"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::GraceExceedsRound));
    }

    #[test]
    fn invalid_number_names_the_variable() {
        let err = Config::from_lookup(lookup_from(&[
            ("OPERATOR_JWT_SECRET", "x"),
            ("ROUND_DURATION_SECS", "soon"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid("ROUND_DURATION_SECS")));
    }

    #[test]
    fn machine_count_is_bounded() {
        let err = Config::from_lookup(lookup_from(&[
            ("OPERATOR_JWT_SECRET", "x"),
            ("MACHINES", "a=sim,b=sim,c=sim"),
            ("MAX_MACHINES", "2"),
        ]))
        .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::TooManyMachines { configured: 3, max: 2 }
        ));
    }

    #[test]
    fn parses_machine_list() {
        let machines = parse_machines("claw1=10.0.0.5:6000, bot = sim").unwrap();
        assert_eq!(machines.len(), 2);
        assert_eq!(
            machines[0].endpoint,
            MachineEndpoint::Tcp("10.0.0.5:6000".to_string())
        );
        assert_eq!(machines[1].name, "bot");
        assert_eq!(machines[1].endpoint, MachineEndpoint::Simulated);
    }

    #[test]
    fn rejects_bad_machine_entries() {
        assert!(matches!(
            parse_machines("claw1"),
            Err(ConfigError::InvalidMachine(_))
        ));
        assert!(matches!(
            parse_machines("a=sim,a=sim"),
            Err(ConfigError::DuplicateMachine(_))
        ));
    }
}
