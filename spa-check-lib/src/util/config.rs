use std::path::Path;
use std::time::Duration;

use anyhow::{bail, Context};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::control_interface::{ControlState, ControlType, SpaState, TemperatureUnit};

/// Supported output formats for session reports.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Default, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Plain text format.
    #[default]
    Plaintext,
    /// JSON format.
    Json,
    /// YAML format.
    Yaml,
}

/// Settings of one harness run.
///
/// Read from a YAML or JSON file; every field is optional and falls back to
/// the defaults below. Command line flags override the file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HarnessConfig {
    /// Time between two reads of a state while waiting for a command to take effect.
    pub poll_interval_ms: u64,
    /// How long a single command may take to take effect.
    pub verify_timeout_ms: u64,
    pub config_load_timeout_ms: u64,
    pub discovery_timeout_ms: u64,
    /// Check discovered spas concurrently instead of one after the other.
    pub parallel: bool,
    pub output: OutputFormat,
    pub simulator: SimulatorConfig,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        HarnessConfig {
            poll_interval_ms: 100,
            verify_timeout_ms: 10_000,
            config_load_timeout_ms: 15_000,
            discovery_timeout_ms: 10_000,
            parallel: false,
            output: OutputFormat::Plaintext,
            simulator: SimulatorConfig::default(),
        }
    }
}

impl HarnessConfig {
    /// Loads the configuration from `path`. Files ending in `.json` are read as
    /// JSON, anything else as YAML.
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;

        let is_json = path
            .extension()
            .map(|ext| ext.eq_ignore_ascii_case("json"))
            .unwrap_or(false);
        let config: HarnessConfig = if is_json {
            serde_json::from_str(&contents)
                .with_context(|| format!("Failed to parse JSON config {}", path.display()))?
        } else {
            serde_yaml::from_str(&contents)
                .with_context(|| format!("Failed to parse YAML config {}", path.display()))?
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.poll_interval_ms == 0 {
            bail!("poll_interval_ms must be greater than zero");
        }
        if self.verify_timeout_ms == 0 {
            bail!("verify_timeout_ms must be greater than zero");
        }
        if self.config_load_timeout_ms == 0 {
            bail!("config_load_timeout_ms must be greater than zero");
        }
        if self.discovery_timeout_ms == 0 {
            bail!("discovery_timeout_ms must be greater than zero");
        }
        self.simulator.validate()
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn verify_timeout(&self) -> Duration {
        Duration::from_millis(self.verify_timeout_ms)
    }

    pub fn config_load_timeout(&self) -> Duration {
        Duration::from_millis(self.config_load_timeout_ms)
    }

    pub fn discovery_timeout(&self) -> Duration {
        Duration::from_millis(self.discovery_timeout_ms)
    }
}

/// The simulated spas the harness can discover and connect to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulatorConfig {
    pub spas: Vec<SimSpaConfig>,
    /// Discovery fails with a transport error when false.
    pub discovery_enabled: bool,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        SimulatorConfig {
            spas: vec![SimSpaConfig::default()],
            discovery_enabled: true,
        }
    }
}

impl SimulatorConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        for spa in &self.spas {
            spa.validate()
                .with_context(|| format!("Invalid simulated spa {}", spa.host))?;
        }
        Ok(())
    }

    pub fn find(&self, host: &str) -> Option<&SimSpaConfig> {
        self.spas.iter().find(|spa| spa.host == host)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimSpaConfig {
    pub host: String,
    pub hostname: String,
    pub mac_address: String,
    /// Connection attempts fail and discovery probes go unanswered when false.
    pub reachable: bool,
    pub state: SpaState,
    /// Never finishes loading its configuration when false.
    pub loads_configuration: bool,
    pub configuration_delay_ms: u64,
    /// Time between accepting a command and reporting the new state.
    pub reaction_latency_ms: u64,
    /// Upper bound of a random delay added to every reaction.
    pub latency_jitter_ms: u64,

    pub model: String,
    pub software_version: String,
    pub configuration_signature: String,
    pub current_setup: u8,
    pub voltage: u16,
    pub heater_type: String,
    pub dip_switch: String,

    pub temperature_unit: TemperatureUnit,
    pub temperature: Option<f64>,
    pub target_temperature: f64,
    /// Start in the high temperature range.
    pub high_range: bool,
    /// Accept target temperature requests but never apply them.
    pub ignore_temperature_changes: bool,
    pub heat_mode: ControlState,

    pub controls: Vec<SimControlConfig>,
}

impl Default for SimSpaConfig {
    fn default() -> Self {
        SimSpaConfig {
            host: "192.168.1.50".to_string(),
            hostname: "BWGSPA".to_string(),
            mac_address: "00:15:27:00:00:01".to_string(),
            reachable: true,
            state: SpaState::Running,
            loads_configuration: true,
            configuration_delay_ms: 500,
            reaction_latency_ms: 300,
            latency_jitter_ms: 0,
            model: "BFBP20S".to_string(),
            software_version: "M100_226 V43.0".to_string(),
            configuration_signature: "c3e5e5d8".to_string(),
            current_setup: 0,
            voltage: 240,
            heater_type: "standard".to_string(),
            dip_switch: "0000000000000000".to_string(),
            temperature_unit: TemperatureUnit::Fahrenheit,
            temperature: Some(99.0),
            target_temperature: 100.0,
            high_range: true,
            ignore_temperature_changes: false,
            heat_mode: ControlState::Ready,
            controls: vec![
                SimControlConfig::speed(ControlType::Pump, 2),
                SimControlConfig::speed(ControlType::Pump, 1),
                SimControlConfig::on_off(ControlType::Light),
                SimControlConfig {
                    state: ControlState::On,
                    read_only: true,
                    ..SimControlConfig::on_off(ControlType::CirculationPump)
                },
                SimControlConfig::speed(ControlType::Blower, 3),
            ],
        }
    }
}

impl SimSpaConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if !ControlState::heat_mode_options().contains(&self.heat_mode) {
            bail!("heat_mode must be ready or rest, got {}", self.heat_mode);
        }
        for control in &self.controls {
            control.validate()?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimControlConfig {
    pub control_type: ControlType,
    /// Speeds above off, for pumps and blowers.
    pub speeds: u8,
    pub state: ControlState,
    /// Reject every set request.
    pub read_only: bool,
    /// Options the spa accepts requests for but never switches to.
    pub ignored: Vec<ControlState>,
}

impl Default for SimControlConfig {
    fn default() -> Self {
        SimControlConfig::on_off(ControlType::Aux)
    }
}

impl SimControlConfig {
    pub fn speed(control_type: ControlType, speeds: u8) -> Self {
        SimControlConfig {
            control_type,
            speeds,
            state: ControlState::Off,
            read_only: false,
            ignored: Vec::new(),
        }
    }

    pub fn on_off(control_type: ControlType) -> Self {
        SimControlConfig::speed(control_type, 1)
    }

    pub fn options(&self) -> Vec<ControlState> {
        match self.control_type {
            ControlType::Pump | ControlType::Blower => ControlState::speed_options(self.speeds),
            ControlType::HeatMode => ControlState::heat_mode_options(),
            ControlType::TemperatureRange => ControlState::temperature_range_options(),
            _ => ControlState::on_off_options(),
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if matches!(
            self.control_type,
            ControlType::HeatMode | ControlType::TemperatureRange
        ) {
            bail!(
                "{} is built into every spa and cannot be listed as a control",
                self.control_type
            );
        }
        if !self.options().contains(&self.state) {
            bail!(
                "{} state {} is not one of {:?}",
                self.control_type,
                self.state,
                self.options()
            );
        }
        Ok(())
    }
}
