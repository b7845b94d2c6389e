use std::fmt;
use std::time::Duration;

use futures::future::join_all;
use log::{debug, info, warn};
use serde::Serialize;

use crate::check::sweep::{sweep_control, sweep_temperature, ControlSweep, TemperatureSweep};
use crate::check::verifier::{CommandVerifier, Outcome};
use crate::control_interface::{SpaSnapshot, SpaState};
use crate::util::config::HarnessConfig;
use crate::util::discovery::Discovery;
use crate::util::traits::{Spa, SpaConnector};

/// Where a session is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Idle,
    Discovering,
    Connecting,
    ConfigCheck,
    Sweeping,
    Done,
    Failed,
}

/// Why a session ended in [`SessionState::Failed`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SessionFailure {
    /// Discovery found no spa to check.
    NoSpaFound,
    Connectivity { reason: String },
    /// The spa was reachable but never finished loading its configuration.
    ConfigurationNotLoaded { test_mode: bool },
}

impl fmt::Display for SessionFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionFailure::NoSpaFound => write!(f, "No spa provided"),
            SessionFailure::Connectivity { reason } => write!(f, "Failed to connect: {}", reason),
            SessionFailure::ConfigurationNotLoaded { test_mode: true } => {
                write!(f, "Config not loaded, spa is in test mode!")
            }
            SessionFailure::ConfigurationNotLoaded { test_mode: false } => {
                write!(f, "Config not loaded, something is wrong!")
            }
        }
    }
}

/// What the harness should check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    Host(String),
    Discover { first_only: bool },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SweepSummary {
    pub confirmed: usize,
    pub not_accepted: usize,
    pub timed_out: usize,
}

impl SweepSummary {
    fn count<T>(&mut self, outcome: &Outcome<T>) {
        match outcome {
            Outcome::Confirmed { .. } => self.confirmed += 1,
            Outcome::NotAccepted => self.not_accepted += 1,
            Outcome::TimedOut { .. } => self.timed_out += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.confirmed + self.not_accepted + self.timed_out
    }
}

/// Everything one session found out about one spa.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionReport {
    pub host: Option<String>,
    /// Either [`SessionState::Done`] or [`SessionState::Failed`].
    pub state: SessionState,
    pub failure: Option<SessionFailure>,
    pub snapshot: Option<SpaSnapshot>,
    pub temperature: Option<TemperatureSweep>,
    pub controls: Vec<ControlSweep>,
}

impl SessionReport {
    fn failed(host: Option<String>, failure: SessionFailure) -> Self {
        SessionReport {
            host,
            state: SessionState::Failed,
            failure: Some(failure),
            snapshot: None,
            temperature: None,
            controls: Vec::new(),
        }
    }

    pub fn summary(&self) -> SweepSummary {
        let mut summary = SweepSummary::default();
        if let Some(temperature) = &self.temperature {
            for result in &temperature.results {
                summary.count(&result.outcome);
            }
        }
        for control in &self.controls {
            for result in &control.results {
                summary.count(&result.outcome);
            }
        }
        summary
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionOptions {
    pub verifier: CommandVerifier,
    pub config_load_timeout: Duration,
    pub discovery_timeout: Duration,
    pub parallel: bool,
}

impl Default for SessionOptions {
    fn default() -> Self {
        SessionOptions::from(&HarnessConfig::default())
    }
}

impl From<&HarnessConfig> for SessionOptions {
    fn from(config: &HarnessConfig) -> Self {
        SessionOptions {
            verifier: CommandVerifier::new(config.poll_interval(), config.verify_timeout()),
            config_load_timeout: config.config_load_timeout(),
            discovery_timeout: config.discovery_timeout(),
            parallel: config.parallel,
        }
    }
}

/// Runs the connect, check and sweep sequence against one or more spas.
pub struct Orchestrator<'a> {
    connector: &'a dyn SpaConnector,
    options: SessionOptions,
}

impl<'a> Orchestrator<'a> {
    pub fn new(connector: &'a dyn SpaConnector, options: SessionOptions) -> Self {
        Orchestrator { connector, options }
    }

    /**
    Checks the spa at the given host, or every spa discovery finds.

    Returns one report per spa, in discovery order. A failure of one spa never
    stops the others; finding no spa at all yields a single failed report.
     */
    pub async fn run(&self, target: Target) -> Vec<SessionReport> {
        let first_only = match target {
            Target::Host(host) => {
                let spa = self.connector.spa(&host, None);
                return vec![self.check_spa(spa.as_ref()).await];
            }
            Target::Discover { first_only } => first_only,
        };

        debug!("{:?} -> {:?}", SessionState::Idle, SessionState::Discovering);
        let devices = match Discovery::find_devices(
            self.connector,
            first_only,
            self.options.discovery_timeout,
        )
        .await
        {
            Ok(devices) => devices,
            Err(e) => {
                warn!("{}", e);
                return vec![SessionReport::failed(
                    None,
                    SessionFailure::Connectivity {
                        reason: e.to_string(),
                    },
                )];
            }
        };
        if devices.is_empty() {
            info!("{}", SessionFailure::NoSpaFound);
            return vec![SessionReport::failed(None, SessionFailure::NoSpaFound)];
        }

        let spas: Vec<Box<dyn Spa>> = devices
            .iter()
            .map(|device| self.connector.spa(&device.host, Some(&device.mac_address)))
            .collect();
        if self.options.parallel {
            join_all(spas.iter().map(|spa| self.check_spa(spa.as_ref()))).await
        } else {
            let mut reports = Vec::with_capacity(spas.len());
            for spa in &spas {
                reports.push(self.check_spa(spa.as_ref()).await);
            }
            reports
        }
    }

    /// One full session. The spa is disconnected again on every path out.
    pub async fn check_spa(&self, spa: &dyn Spa) -> SessionReport {
        let host = spa.host();
        info!("******** Testing spa connection and configuration **********");
        debug!("{} -- {:?}", host, SessionState::Connecting);

        if let Err(e) = spa.connect().await {
            warn!("{}", e);
            spa.disconnect().await;
            debug!("{} -- {:?}", host, SessionState::Failed);
            return SessionReport::failed(
                Some(host),
                SessionFailure::Connectivity {
                    reason: e.to_string(),
                },
            );
        }

        let report = self.check_connected(spa, host).await;
        spa.disconnect().await;
        report
    }

    async fn check_connected(&self, spa: &dyn Spa, host: String) -> SessionReport {
        debug!("{} -- {:?}", host, SessionState::ConfigCheck);
        if !spa.configuration_loaded(self.options.config_load_timeout).await {
            let failure = SessionFailure::ConfigurationNotLoaded {
                test_mode: spa.state() == SpaState::TestMode,
            };
            warn!("{} -- {}", host, failure);
            debug!("{} -- {:?}", host, SessionState::Failed);
            return SessionReport::failed(Some(host), failure);
        }

        debug!("{} -- {:?}", host, SessionState::Sweeping);
        let snapshot = spa.snapshot();
        info!("******** Testing spa controls **********");
        let verifier = &self.options.verifier;
        let temperature = sweep_temperature(spa, verifier).await;
        let mut controls = Vec::new();
        for control in spa.controls() {
            controls.push(sweep_control(control.as_ref(), verifier).await);
        }

        debug!("{} -- {:?}", host, SessionState::Done);
        SessionReport {
            host: Some(host),
            state: SessionState::Done,
            failure: None,
            snapshot: Some(snapshot),
            temperature: Some(temperature),
            controls,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::control_interface::{ConnectionState, ControlState, ControlType};
    use crate::sim::SimConnector;
    use crate::util::config::{SimSpaConfig, SimulatorConfig};

    fn connector(spas: Vec<SimSpaConfig>) -> SimConnector {
        SimConnector::new(SimulatorConfig {
            spas,
            ..SimulatorConfig::default()
        })
    }

    fn spa_at(host: &str) -> SimSpaConfig {
        SimSpaConfig {
            host: host.to_string(),
            ..SimSpaConfig::default()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_full_session_sweeps_every_control_and_restores() {
        let connector = connector(vec![spa_at("10.0.0.5")]);
        let orchestrator = Orchestrator::new(&connector, SessionOptions::default());
        let reports = orchestrator.run(Target::Host("10.0.0.5".to_string())).await;

        assert_eq!(reports.len(), 1);
        let report = &reports[0];
        assert_eq!(report.state, SessionState::Done);
        assert!(report.failure.is_none());
        assert!(report.snapshot.is_some());
        assert!(report.temperature.as_ref().unwrap().restored());
        assert_eq!(report.controls.len(), 7);
        assert!(report.controls.iter().all(|control| control.restored()));

        let summary = report.summary();
        assert_eq!(summary.not_accepted, 1);
        assert_eq!(summary.timed_out, 0);
        assert_eq!(summary.confirmed, 17);
        assert_eq!(summary.total(), 18);

        let circulation = report
            .controls
            .iter()
            .find(|control| control.control_type == ControlType::CirculationPump)
            .unwrap();
        assert_eq!(circulation.results.len(), 1);
        assert_eq!(circulation.results[0].outcome, Outcome::NotAccepted);
        assert_eq!(circulation.final_state, ControlState::On);
    }

    #[tokio::test(start_paused = true)]
    async fn test_session_disconnects_on_success_and_failure() {
        let connector = connector(vec![
            spa_at("10.0.0.5"),
            SimSpaConfig {
                loads_configuration: false,
                ..spa_at("10.0.0.6")
            },
        ]);
        let orchestrator = Orchestrator::new(&connector, SessionOptions::default());

        for host in ["10.0.0.5", "10.0.0.6"] {
            let spa = connector.spa(host, None);
            orchestrator.check_spa(spa.as_ref()).await;
            assert_eq!(spa.connection_state(), ConnectionState::Disconnected);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_unreachable_host_is_reported_without_sweeping() {
        let connector = connector(vec![SimSpaConfig {
            reachable: false,
            ..spa_at("10.0.0.5")
        }]);
        let orchestrator = Orchestrator::new(&connector, SessionOptions::default());
        let reports = orchestrator.run(Target::Host("10.0.0.5".to_string())).await;

        assert_eq!(reports[0].state, SessionState::Failed);
        assert!(matches!(
            reports[0].failure,
            Some(SessionFailure::Connectivity { .. })
        ));
        assert!(reports[0].controls.is_empty());
        assert!(reports[0].temperature.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_unknown_host_is_a_connectivity_failure() {
        let connector = connector(vec![]);
        let orchestrator = Orchestrator::new(&connector, SessionOptions::default());
        let reports = orchestrator.run(Target::Host("10.9.9.9".to_string())).await;
        assert_eq!(reports[0].host.as_deref(), Some("10.9.9.9"));
        assert!(matches!(
            reports[0].failure,
            Some(SessionFailure::Connectivity { .. })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_test_mode_skips_sweep() {
        let connector = connector(vec![SimSpaConfig {
            state: SpaState::TestMode,
            ..spa_at("10.0.0.5")
        }]);
        let orchestrator = Orchestrator::new(&connector, SessionOptions::default());
        let reports = orchestrator.run(Target::Host("10.0.0.5".to_string())).await;

        assert_eq!(
            reports[0].failure,
            Some(SessionFailure::ConfigurationNotLoaded { test_mode: true })
        );
        assert!(reports[0].snapshot.is_none());
        assert!(reports[0].controls.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_configuration_never_loading_is_not_test_mode() {
        let connector = connector(vec![SimSpaConfig {
            loads_configuration: false,
            ..spa_at("10.0.0.5")
        }]);
        let orchestrator = Orchestrator::new(&connector, SessionOptions::default());
        let reports = orchestrator.run(Target::Host("10.0.0.5".to_string())).await;
        assert_eq!(
            reports[0].failure,
            Some(SessionFailure::ConfigurationNotLoaded { test_mode: false })
        );
        assert_eq!(
            reports[0].failure.as_ref().unwrap().to_string(),
            "Config not loaded, something is wrong!"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_discovery_without_spas_reports_no_spa() {
        let connector = connector(vec![]);
        let orchestrator = Orchestrator::new(&connector, SessionOptions::default());
        let reports = orchestrator.run(Target::Discover { first_only: true }).await;

        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].failure, Some(SessionFailure::NoSpaFound));
        assert!(reports[0].host.is_none());
        assert_eq!(reports[0].failure.as_ref().unwrap().to_string(), "No spa provided");
    }

    #[tokio::test(start_paused = true)]
    async fn test_discovery_fault_is_a_connectivity_failure() {
        let connector = SimConnector::new(SimulatorConfig {
            discovery_enabled: false,
            ..SimulatorConfig::default()
        });
        let orchestrator = Orchestrator::new(&connector, SessionOptions::default());
        let reports = orchestrator.run(Target::Discover { first_only: false }).await;

        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].state, SessionState::Failed);
        assert!(reports[0].host.is_none());
        match &reports[0].failure {
            Some(SessionFailure::Connectivity { reason }) => {
                assert!(reason.starts_with("Discovery failed:"));
            }
            other => panic!("unexpected failure {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_discovery_continues_past_failed_spa() {
        let connector = connector(vec![
            SimSpaConfig {
                state: SpaState::TestMode,
                mac_address: "00:15:27:00:00:05".to_string(),
                ..spa_at("10.0.0.5")
            },
            SimSpaConfig {
                mac_address: "00:15:27:00:00:06".to_string(),
                ..spa_at("10.0.0.6")
            },
        ]);
        let orchestrator = Orchestrator::new(&connector, SessionOptions::default());
        let reports = orchestrator.run(Target::Discover { first_only: false }).await;

        assert_eq!(reports.len(), 2);
        assert_eq!(reports[0].host.as_deref(), Some("10.0.0.5"));
        assert_eq!(reports[0].state, SessionState::Failed);
        assert_eq!(reports[1].host.as_deref(), Some("10.0.0.6"));
        assert_eq!(reports[1].state, SessionState::Done);
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_only_checks_one_spa() {
        let connector = connector(vec![spa_at("10.0.0.5"), spa_at("10.0.0.6")]);
        let orchestrator = Orchestrator::new(&connector, SessionOptions::default());
        let reports = orchestrator.run(Target::Discover { first_only: true }).await;
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].host.as_deref(), Some("10.0.0.5"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_parallel_sessions_keep_discovery_order() {
        let connector = connector(vec![
            SimSpaConfig {
                mac_address: "00:15:27:00:00:05".to_string(),
                reaction_latency_ms: 900,
                ..spa_at("10.0.0.5")
            },
            SimSpaConfig {
                mac_address: "00:15:27:00:00:06".to_string(),
                ..spa_at("10.0.0.6")
            },
        ]);
        let options = SessionOptions {
            parallel: true,
            ..SessionOptions::default()
        };
        let orchestrator = Orchestrator::new(&connector, options);
        let reports = orchestrator.run(Target::Discover { first_only: false }).await;

        let hosts: Vec<Option<&str>> = reports.iter().map(|r| r.host.as_deref()).collect();
        assert_eq!(hosts, vec![Some("10.0.0.5"), Some("10.0.0.6")]);
        assert!(reports.iter().all(|r| r.state == SessionState::Done));
    }
}
