use std::fmt;
use std::str::FromStr;

use anyhow::anyhow;
use chrono::NaiveTime;
use serde::{Deserialize, Serialize};

/// Operating state reported by the spa in its status updates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpaState {
    Running,
    Initializing,
    HoldMode,
    AbTempsOn,
    /// The panel is in test mode; the spa never finishes loading its configuration.
    TestMode,
    #[default]
    Unknown,
}

impl fmt::Display for SpaState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state_str = match self {
            SpaState::Running => "RUNNING",
            SpaState::Initializing => "INITIALIZING",
            SpaState::HoldMode => "HOLD_MODE",
            SpaState::AbTempsOn => "AB_TEMPS_ON",
            SpaState::TestMode => "TEST_MODE",
            SpaState::Unknown => "UNKNOWN",
        };
        write!(f, "{}", state_str)
    }
}

/// Lifecycle of a session with one spa.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    #[default]
    Disconnected,
    ConfigurationPending,
    Ready,
}

/// Category of a control. Every category exposes the same capabilities,
/// the category only matters for naming and grouping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ControlType {
    Pump,
    Light,
    Aux,
    Blower,
    Mister,
    CirculationPump,
    HeatMode,
    TemperatureRange,
}

impl ControlType {
    /// Display name for the `index`-th control of this category, given how
    /// many controls of the category the spa has.
    pub fn control_name(&self, index: usize, count: usize) -> String {
        if count > 1 {
            format!("{} {}", self, index + 1)
        } else {
            self.to_string()
        }
    }
}

impl fmt::Display for ControlType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let type_str = match self {
            ControlType::Pump => "Pump",
            ControlType::Light => "Light",
            ControlType::Aux => "Aux",
            ControlType::Blower => "Blower",
            ControlType::Mister => "Mister",
            ControlType::CirculationPump => "Circulation pump",
            ControlType::HeatMode => "Heat mode",
            ControlType::TemperatureRange => "Temperature range",
        };
        write!(f, "{}", type_str)
    }
}

/// One discrete state of a control.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ControlState {
    Off,
    On,
    Low,
    Medium,
    High,
    Ready,
    Rest,
    ReadyInRest,
}

impl ControlState {
    /// The option set of a speed-type control (pumps, blowers) with `speeds`
    /// speeds above off.
    pub fn speed_options(speeds: u8) -> Vec<ControlState> {
        match speeds {
            0 | 1 => vec![ControlState::Off, ControlState::High],
            2 => vec![ControlState::Off, ControlState::Low, ControlState::High],
            _ => vec![
                ControlState::Off,
                ControlState::Low,
                ControlState::Medium,
                ControlState::High,
            ],
        }
    }

    pub fn on_off_options() -> Vec<ControlState> {
        vec![ControlState::Off, ControlState::On]
    }

    /// Heat mode can be set to ready or rest. Ready-in-rest is only ever
    /// reported by the spa.
    pub fn heat_mode_options() -> Vec<ControlState> {
        vec![ControlState::Ready, ControlState::Rest]
    }

    pub fn temperature_range_options() -> Vec<ControlState> {
        vec![ControlState::Low, ControlState::High]
    }
}

impl FromStr for ControlState {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "off" => Ok(ControlState::Off),
            "on" => Ok(ControlState::On),
            "low" => Ok(ControlState::Low),
            "medium" => Ok(ControlState::Medium),
            "high" => Ok(ControlState::High),
            "ready" => Ok(ControlState::Ready),
            "rest" => Ok(ControlState::Rest),
            "ready_in_rest" => Ok(ControlState::ReadyInRest),
            _ => Err(anyhow!("Invalid control state: {}", s)),
        }
    }
}

impl fmt::Display for ControlState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state_str = match self {
            ControlState::Off => "OFF",
            ControlState::On => "ON",
            ControlState::Low => "LOW",
            ControlState::Medium => "MEDIUM",
            ControlState::High => "HIGH",
            ControlState::Ready => "READY",
            ControlState::Rest => "REST",
            ControlState::ReadyInRest => "READY_IN_REST",
        };
        write!(f, "{}", state_str)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TemperatureUnit {
    #[default]
    Fahrenheit,
    Celsius,
}

impl TemperatureUnit {
    /// Smallest temperature step the spa reports in this unit.
    pub fn resolution(&self) -> f64 {
        match self {
            TemperatureUnit::Fahrenheit => 1.0,
            TemperatureUnit::Celsius => 0.5,
        }
    }

    /// Round `value` to the nearest step the spa can represent.
    pub fn quantize(&self, value: f64) -> f64 {
        let step = self.resolution();
        (value / step).round() * step
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HeatState {
    #[default]
    Off,
    Heating,
    HeatWaiting,
}

/// Allowed target temperatures of one temperature range, in both units.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TemperatureLimits {
    pub fahrenheit: (f64, f64),
    pub celsius: (f64, f64),
}

impl TemperatureLimits {
    pub const LOW_RANGE: TemperatureLimits = TemperatureLimits {
        fahrenheit: (50.0, 99.0),
        celsius: (10.0, 37.0),
    };

    pub const HIGH_RANGE: TemperatureLimits = TemperatureLimits {
        fahrenheit: (80.0, 104.0),
        celsius: (26.5, 40.0),
    };

    /// (minimum, maximum) in `unit`.
    pub fn bounds(&self, unit: TemperatureUnit) -> (f64, f64) {
        match unit {
            TemperatureUnit::Fahrenheit => self.fahrenheit,
            TemperatureUnit::Celsius => self.celsius,
        }
    }
}

/// Reporting view of one control.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ControlInfo {
    pub name: String,
    pub control_type: ControlType,
    pub index: usize,
    pub state: ControlState,
    pub options: Vec<ControlState>,
}

impl fmt::Display for ControlInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.name, self.state)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterCycle {
    pub start: NaiveTime,
    pub duration_minutes: u32,
    pub enabled: bool,
    pub running: bool,
}

impl FilterCycle {
    pub fn end(&self) -> NaiveTime {
        let (end, _) = self
            .start
            .overflowing_add_signed(chrono::Duration::minutes(i64::from(self.duration_minutes)));
        end
    }
}

/// Everything the harness prints about a spa before exercising its controls.
///
/// Grouped the way the spa itself reports it: module identification, device
/// configuration, system information, setup parameters, filter cycles and
/// the latest status update.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SpaSnapshot {
    pub host: String,
    pub mac_address: String,
    pub idigi_device_id: Option<String>,

    pub model: String,
    pub software_version: String,
    pub configuration_signature: String,
    pub current_setup: u8,
    pub voltage: u16,
    pub heater_type: String,
    pub dip_switch: String,

    pub low_range: TemperatureLimits,
    pub high_range: TemperatureLimits,
    pub pump_count: usize,

    pub filter_cycle_1: FilterCycle,
    pub filter_cycle_2: FilterCycle,

    pub state: SpaState,
    pub temperature_unit: TemperatureUnit,
    pub temperature: Option<f64>,
    pub target_temperature: f64,
    pub temperature_minimum: f64,
    pub temperature_maximum: f64,
    pub heat_state: HeatState,
    pub time: NaiveTime,
    pub is_24_hour: bool,
    pub controls: Vec<ControlInfo>,
}

impl SpaSnapshot {
    /// Names of the controls of one category, in index order.
    pub fn control_names(&self, control_type: ControlType) -> Vec<String> {
        self.controls
            .iter()
            .filter(|control| control.control_type == control_type)
            .map(|control| control.name.clone())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_control_name_uses_index_only_when_ambiguous() {
        assert_eq!(ControlType::Pump.control_name(0, 2), "Pump 1");
        assert_eq!(ControlType::Pump.control_name(1, 2), "Pump 2");
        assert_eq!(ControlType::Light.control_name(0, 1), "Light");
    }

    #[test]
    fn test_celsius_quantizes_to_half_degrees() {
        assert_eq!(TemperatureUnit::Celsius.quantize(37.3), 37.5);
        assert_eq!(TemperatureUnit::Celsius.quantize(26.5), 26.5);
        assert_eq!(TemperatureUnit::Fahrenheit.quantize(100.4), 100.0);
    }

    #[test]
    fn test_speed_options() {
        assert_eq!(
            ControlState::speed_options(2),
            vec![ControlState::Off, ControlState::Low, ControlState::High]
        );
        assert_eq!(ControlState::speed_options(1).len(), 2);
        assert_eq!(ControlState::speed_options(3).len(), 4);
    }

    #[test]
    fn test_control_state_from_str() {
        assert_eq!("High".parse::<ControlState>().unwrap(), ControlState::High);
        assert_eq!(
            "ready_in_rest".parse::<ControlState>().unwrap(),
            ControlState::ReadyInRest
        );
        assert!("sideways".parse::<ControlState>().is_err());
    }

    #[test]
    fn test_filter_cycle_end_wraps_midnight() {
        let cycle = FilterCycle {
            start: NaiveTime::from_hms_opt(22, 0, 0).unwrap(),
            duration_minutes: 180,
            enabled: true,
            running: false,
        };
        assert_eq!(cycle.end(), NaiveTime::from_hms_opt(1, 0, 0).unwrap());
    }
}
