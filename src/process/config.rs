//! # Process configuration.
//!
//! Defines [`ProcessConfig`], the immutable description of one supervised child
//! process, and [`HealthCheckConfig`] / [`Probe`], describing how its readiness
//! is checked.
//!
//! A config can be created:
//! - **Explicitly** with [`ProcessConfig::new`] and the `with_*` builder methods;
//! - **From a parsed document** through `serde` (durations are milliseconds, in
//!   fields suffixed with `_ms`).
//!
//! ## Example
//! ```rust
//! use std::time::Duration;
//! use procvisor::{HealthCheckConfig, ProcessConfig, Probe};
//!
//! let api = ProcessConfig::new("api", "cargo")
//!     .with_args(["run", "--bin", "api"])
//!     .with_env("RUST_LOG", "debug")
//!     .with_depends_on(["db"])
//!     .with_auto_restart(true)
//!     .with_max_restarts(3)
//!     .with_restart_delay(Duration::from_millis(500))
//!     .with_health_check(HealthCheckConfig::new(Probe::tcp("127.0.0.1", 8080)));
//!
//! assert_eq!(api.depends_on, vec!["db".to_string()]);
//! assert!(api.validate().is_ok());
//! ```

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::policies::JitterPolicy;

/// Definition of one supervised process.
///
/// Immutable once handed to the supervisor.
///
/// ## Field semantics
/// - `max_restarts = None`: unlimited automatic restarts
/// - `backoff_factor = 1.0`: every restart waits exactly `restart_delay`
/// - `start_timeout`, `stop_grace`, `stability_window`: `None` inherits the
///   supervisor-wide default from [`SupervisorConfig`](crate::SupervisorConfig)
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ProcessConfig {
    /// Unique process name.
    pub name: String,
    /// Executable (looked up in `PATH` when not a path).
    pub command: String,
    /// Arguments passed to the executable.
    #[serde(default)]
    pub args: Vec<String>,
    /// Working directory; inherits the supervisor's when `None`.
    #[serde(default)]
    pub working_dir: Option<PathBuf>,
    /// Extra environment variables (added to the inherited environment).
    #[serde(default)]
    pub env: HashMap<String, String>,
    /// Names of processes that must be ready before this one starts.
    #[serde(default)]
    pub depends_on: Vec<String>,
    /// Restart automatically after an unexpected exit.
    #[serde(default)]
    pub auto_restart: bool,
    /// Restart budget; `None` means unlimited.
    #[serde(default)]
    pub max_restarts: Option<u32>,
    /// Delay before the first automatic restart.
    #[serde(
        rename = "restart_delay_ms",
        with = "duration_ms",
        default = "default_restart_delay"
    )]
    pub restart_delay: Duration,
    /// Growth factor applied to the delay per consecutive restart.
    #[serde(default = "default_backoff_factor")]
    pub backoff_factor: f64,
    /// Upper bound of the restart delay.
    #[serde(
        rename = "max_restart_delay_ms",
        with = "duration_ms",
        default = "default_max_restart_delay"
    )]
    pub max_restart_delay: Duration,
    /// Randomization of restart delays.
    #[serde(default)]
    pub jitter: JitterPolicy,
    /// Readiness probe; `None` means "ready as soon as running".
    #[serde(default)]
    pub health_check: Option<HealthCheckConfig>,
    /// How long to wait for dependencies before failing.
    #[serde(rename = "start_timeout_ms", with = "opt_duration_ms", default)]
    pub start_timeout: Option<Duration>,
    /// Grace between terminate and kill when stopping.
    #[serde(rename = "stop_grace_ms", with = "opt_duration_ms", default)]
    pub stop_grace: Option<Duration>,
    /// Continuous healthy run time after which the restart counter resets.
    #[serde(rename = "stability_window_ms", with = "opt_duration_ms", default)]
    pub stability_window: Option<Duration>,
}

fn default_restart_delay() -> Duration {
    Duration::from_millis(1000)
}

fn default_backoff_factor() -> f64 {
    1.0
}

fn default_max_restart_delay() -> Duration {
    Duration::from_secs(30)
}

impl ProcessConfig {
    /// Creates a config with the given name and command and default settings.
    pub fn new(name: impl Into<String>, command: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            command: command.into(),
            args: Vec::new(),
            working_dir: None,
            env: HashMap::new(),
            depends_on: Vec::new(),
            auto_restart: false,
            max_restarts: None,
            restart_delay: default_restart_delay(),
            backoff_factor: default_backoff_factor(),
            max_restart_delay: default_max_restart_delay(),
            jitter: JitterPolicy::None,
            health_check: None,
            start_timeout: None,
            stop_grace: None,
            stability_window: None,
        }
    }

    /// Appends one argument.
    pub fn with_arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Appends arguments.
    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Sets the working directory.
    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    /// Adds an environment variable.
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Appends dependency names.
    pub fn with_depends_on<I, S>(mut self, deps: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.depends_on.extend(deps.into_iter().map(Into::into));
        self
    }

    pub fn with_auto_restart(mut self, enabled: bool) -> Self {
        self.auto_restart = enabled;
        self
    }

    pub fn with_max_restarts(mut self, max: u32) -> Self {
        self.max_restarts = Some(max);
        self
    }

    pub fn with_restart_delay(mut self, delay: Duration) -> Self {
        self.restart_delay = delay;
        self
    }

    /// Switches to exponential restart delays: `restart_delay × factor^n`, capped at `max`.
    pub fn with_backoff(mut self, factor: f64, max: Duration) -> Self {
        self.backoff_factor = factor;
        self.max_restart_delay = max;
        self
    }

    pub fn with_jitter(mut self, jitter: JitterPolicy) -> Self {
        self.jitter = jitter;
        self
    }

    pub fn with_health_check(mut self, check: HealthCheckConfig) -> Self {
        self.health_check = Some(check);
        self
    }

    pub fn with_start_timeout(mut self, timeout: Duration) -> Self {
        self.start_timeout = Some(timeout);
        self
    }

    pub fn with_stop_grace(mut self, grace: Duration) -> Self {
        self.stop_grace = Some(grace);
        self
    }

    pub fn with_stability_window(mut self, window: Duration) -> Self {
        self.stability_window = Some(window);
        self
    }

    /// Checks the entry on its own. Graph-level checks live in
    /// [`DependencyGraph`](crate::DependencyGraph).
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |reason: &str| ConfigError::Invalid {
            process: self.name.clone(),
            reason: reason.to_string(),
        };

        if self.name.trim().is_empty() {
            return Err(invalid("name must not be empty"));
        }
        if self.command.trim().is_empty() {
            return Err(invalid("command must not be empty"));
        }
        if !self.backoff_factor.is_finite() || self.backoff_factor <= 0.0 {
            return Err(invalid("backoff_factor must be a positive number"));
        }
        if let Some(check) = &self.health_check {
            check.validate().map_err(|reason| invalid(reason))?;
        }
        Ok(())
    }
}

/// Readiness probe settings for one process.
///
/// ## Thresholds
/// - `success_threshold` consecutive successes → `Healthy`
/// - `retries` consecutive failures → `Unhealthy`
/// - `unhealthy_grace`: how long `Unhealthy` may persist while running before the
///   supervisor stops the process (`None` = only report it)
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct HealthCheckConfig {
    /// What to probe.
    pub probe: Probe,
    /// Pause between probe attempts.
    #[serde(rename = "interval_ms", with = "duration_ms", default = "default_interval")]
    pub interval: Duration,
    /// Per-attempt timeout.
    #[serde(rename = "timeout_ms", with = "duration_ms", default = "default_timeout")]
    pub timeout: Duration,
    /// Consecutive failures before the process is reported unhealthy.
    #[serde(default = "default_retries")]
    pub retries: u32,
    /// Consecutive successes before the process is reported healthy.
    #[serde(default = "default_success_threshold")]
    pub success_threshold: u32,
    /// Delay before the first probe.
    #[serde(rename = "initial_delay_ms", with = "duration_ms", default)]
    pub initial_delay: Duration,
    /// Stop (and treat as crashed) a process that stays unhealthy this long.
    #[serde(rename = "unhealthy_grace_ms", with = "opt_duration_ms", default)]
    pub unhealthy_grace: Option<Duration>,
}

fn default_interval() -> Duration {
    Duration::from_secs(5)
}

fn default_timeout() -> Duration {
    Duration::from_secs(3)
}

fn default_retries() -> u32 {
    3
}

fn default_success_threshold() -> u32 {
    1
}

impl HealthCheckConfig {
    /// Creates a health check with default interval (5s), timeout (3s), 3 retries.
    pub fn new(probe: Probe) -> Self {
        Self {
            probe,
            interval: default_interval(),
            timeout: default_timeout(),
            retries: default_retries(),
            success_threshold: default_success_threshold(),
            initial_delay: Duration::ZERO,
            unhealthy_grace: None,
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    pub fn with_success_threshold(mut self, n: u32) -> Self {
        self.success_threshold = n;
        self
    }

    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    pub fn with_unhealthy_grace(mut self, grace: Duration) -> Self {
        self.unhealthy_grace = Some(grace);
        self
    }

    fn validate(&self) -> Result<(), &'static str> {
        if self.interval.is_zero() {
            return Err("health_check.interval must be greater than zero");
        }
        if self.timeout.is_zero() {
            return Err("health_check.timeout must be greater than zero");
        }
        if self.retries == 0 || self.success_threshold == 0 {
            return Err("health_check thresholds must be at least 1");
        }
        self.probe.validate()
    }
}

/// A readiness probe.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Probe {
    /// Runs a command; exit code 0 means healthy.
    Command {
        command: String,
        #[serde(default)]
        args: Vec<String>,
    },
    /// Opens a TCP connection.
    Tcp { host: String, port: u16 },
    /// Issues `GET url`; any 2xx status means healthy.
    ///
    /// `https://` is verified with rustls against the bundled web PKI roots.
    Http { url: String },
}

impl Probe {
    pub fn command<I, S>(command: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Probe::Command {
            command: command.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    pub fn tcp(host: impl Into<String>, port: u16) -> Self {
        Probe::Tcp {
            host: host.into(),
            port,
        }
    }

    pub fn http(url: impl Into<String>) -> Self {
        Probe::Http { url: url.into() }
    }

    fn validate(&self) -> Result<(), &'static str> {
        match self {
            Probe::Command { command, .. } if command.trim().is_empty() => {
                Err("health_check command must not be empty")
            }
            Probe::Tcp { host, .. } if host.trim().is_empty() => {
                Err("health_check host must not be empty")
            }
            Probe::Http { url } if !url.starts_with("http://") && !url.starts_with("https://") => {
                Err("health_check url must start with http:// or https://")
            }
            _ => Ok(()),
        }
    }
}

/// `Duration` as integer milliseconds.
pub(crate) mod duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis().min(u128::from(u64::MAX)) as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_millis)
    }
}

/// `Option<Duration>` as optional integer milliseconds.
pub(crate) mod opt_duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Option<Duration>, s: S) -> Result<S::Ok, S::Error> {
        match d {
            Some(d) => s.serialize_some(&(d.as_millis().min(u128::from(u64::MAX)) as u64)),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Duration>, D::Error> {
        Option::<u64>::deserialize(d).map(|ms| ms.map(Duration::from_millis))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_sets_fields() {
        let cfg = ProcessConfig::new("worker", "python")
            .with_arg("worker.py")
            .with_env("QUEUE", "default")
            .with_auto_restart(true)
            .with_max_restarts(2)
            .with_restart_delay(Duration::from_millis(500))
            .with_backoff(2.0, Duration::from_secs(8));

        assert_eq!(cfg.args, vec!["worker.py".to_string()]);
        assert_eq!(cfg.env.get("QUEUE").map(String::as_str), Some("default"));
        assert!(cfg.auto_restart);
        assert_eq!(cfg.max_restarts, Some(2));
        assert_eq!(cfg.restart_delay, Duration::from_millis(500));
        assert_eq!(cfg.backoff_factor, 2.0);
        assert_eq!(cfg.max_restart_delay, Duration::from_secs(8));
    }

    #[test]
    fn empty_command_is_invalid() {
        let err = ProcessConfig::new("web", "  ").validate().unwrap_err();
        assert_eq!(err.as_label(), "config_invalid");
    }

    #[test]
    fn zero_interval_health_check_is_invalid() {
        let cfg = ProcessConfig::new("db", "postgres").with_health_check(
            HealthCheckConfig::new(Probe::tcp("localhost", 5432)).with_interval(Duration::ZERO),
        );
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn http_probe_requires_scheme() {
        let cfg = ProcessConfig::new("web", "npm")
            .with_health_check(HealthCheckConfig::new(Probe::http("localhost:3000")));
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn deserializes_from_document_with_defaults() {
        let raw = r#"{
            "name": "api",
            "command": "cargo",
            "args": ["run"],
            "depends_on": ["db"],
            "auto_restart": true,
            "max_restarts": 3,
            "restart_delay_ms": 250,
            "health_check": {
                "probe": { "type": "http", "url": "http://127.0.0.1:8080/health" },
                "interval_ms": 1000,
                "retries": 2
            }
        }"#;

        let cfg: ProcessConfig = serde_json::from_str(raw).unwrap();
        assert_eq!(cfg.restart_delay, Duration::from_millis(250));
        assert_eq!(cfg.backoff_factor, 1.0);
        assert_eq!(cfg.start_timeout, None);

        let check = cfg.health_check.unwrap();
        assert_eq!(check.interval, Duration::from_secs(1));
        assert_eq!(check.timeout, Duration::from_secs(3));
        assert_eq!(check.retries, 2);
        assert_eq!(check.success_threshold, 1);
        assert_eq!(check.probe, Probe::http("http://127.0.0.1:8080/health"));
    }
}
