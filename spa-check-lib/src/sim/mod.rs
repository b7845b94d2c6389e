//! In-process spa simulator.
//!
//! Implements the client traits against simulated spas described by a
//! [`SimulatorConfig`]. Commands are acknowledged immediately and applied by
//! a background task after the configured reaction latency, the same way a
//! real spa acknowledges a request and later reports the new state in a
//! status update.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{Local, NaiveTime, Timelike};
use log::{debug, info};
use rand::Rng;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use uuid::Uuid;

use crate::control_interface::{
    ConnectionState, ControlInfo, ControlState, ControlType, FilterCycle, HeatState,
    SpaSnapshot, SpaState, TemperatureLimits,
};
use crate::error::{SpaError, SpaResult};
use crate::util::config::{SimSpaConfig, SimulatorConfig};
use crate::util::traits::{DiscoveryTransport, Spa, SpaConnector, SpaControl};

mod control;

pub use control::SimControl;

/// Delay between two discovery answers.
const DISCOVERY_ANSWER_DELAY: Duration = Duration::from_millis(20);

pub struct SimConnector {
    config: SimulatorConfig,
}

impl SimConnector {
    pub fn new(config: SimulatorConfig) -> Self {
        SimConnector { config }
    }
}

#[async_trait]
impl SpaConnector for SimConnector {
    async fn open_discovery(&self) -> SpaResult<Box<dyn DiscoveryTransport>> {
        if !self.config.discovery_enabled {
            return Err(SpaError::Discovery(
                "broadcast probes are not permitted on this network".to_string(),
            ));
        }
        Ok(Box::new(SimDiscoveryTransport {
            spas: self.config.spas.clone(),
            pending: VecDeque::new(),
        }))
    }

    fn spa(&self, host: &str, _mac_address: Option<&str>) -> Box<dyn Spa> {
        Box::new(SimSpa::new(host, self.config.find(host).cloned()))
    }
}

pub struct SimDiscoveryTransport {
    spas: Vec<SimSpaConfig>,
    pending: VecDeque<(Vec<u8>, String)>,
}

impl SimDiscoveryTransport {
    fn answer(spa: &SimSpaConfig) -> Vec<u8> {
        format!(
            "{}\r\n{}\r\n",
            spa.hostname,
            spa.mac_address.replace(':', "-").to_uppercase()
        )
        .into_bytes()
    }
}

#[async_trait]
impl DiscoveryTransport for SimDiscoveryTransport {
    async fn send_probe(&mut self) -> SpaResult<()> {
        self.pending = self
            .spas
            .iter()
            .filter(|spa| spa.reachable)
            .map(|spa| (Self::answer(spa), spa.host.clone()))
            .collect();
        Ok(())
    }

    async fn recv(&mut self) -> SpaResult<Option<(Vec<u8>, String)>> {
        match self.pending.pop_front() {
            Some(answer) => {
                sleep(DISCOVERY_ANSWER_DELAY).await;
                Ok(Some(answer))
            }
            None => Ok(None),
        }
    }
}

/// Mutable device state, only ever changed by the simulated spa itself.
pub(crate) struct SimDevice {
    pub(crate) connection: ConnectionState,
    /// Target temperature of the low and the high range.
    pub(crate) setpoints: [f64; 2],
    pub(crate) controls: Vec<ControlSlot>,
}

pub(crate) struct ControlSlot {
    pub(crate) name: String,
    pub(crate) control_type: ControlType,
    pub(crate) index: usize,
    pub(crate) state: ControlState,
    pub(crate) options: Vec<ControlState>,
    pub(crate) read_only: bool,
    pub(crate) ignored: Vec<ControlState>,
}

impl SimDevice {
    fn range_index(&self) -> usize {
        let high = self.controls.iter().any(|control| {
            control.control_type == ControlType::TemperatureRange
                && control.state == ControlState::High
        });
        usize::from(high)
    }

    pub(crate) fn limits(&self) -> TemperatureLimits {
        [TemperatureLimits::LOW_RANGE, TemperatureLimits::HIGH_RANGE][self.range_index()]
    }

    pub(crate) fn target_temperature(&self) -> f64 {
        self.setpoints[self.range_index()]
    }

    fn is_connected(&self) -> bool {
        self.connection != ConnectionState::Disconnected
    }
}

/// State shared between a [`SimSpa`], its controls and its background tasks.
pub(crate) struct SimShared {
    pub(crate) host: String,
    pub(crate) config: SimSpaConfig,
    device: Mutex<SimDevice>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    loaded: watch::Sender<bool>,
}

impl SimShared {
    pub(crate) fn device(&self) -> MutexGuard<'_, SimDevice> {
        self.device.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn track(&self, task: JoinHandle<()>) {
        let mut tasks = self.tasks.lock().unwrap_or_else(PoisonError::into_inner);
        tasks.retain(|task| !task.is_finished());
        tasks.push(task);
    }

    fn reaction_delay(&self) -> Duration {
        let jitter = if self.config.latency_jitter_ms > 0 {
            rand::thread_rng().gen_range(0..=self.config.latency_jitter_ms)
        } else {
            0
        };
        Duration::from_millis(self.config.reaction_latency_ms + jitter)
    }

    pub(crate) fn ensure_connected(&self) -> SpaResult<()> {
        if self.device().is_connected() {
            Ok(())
        } else {
            Err(SpaError::NotConnected {
                host: self.host.clone(),
            })
        }
    }

    /// Applies `update` to the device after the reaction latency, unless the
    /// session is closed first.
    pub(crate) fn schedule<F>(self: &Arc<Self>, update: F)
    where
        F: FnOnce(&mut SimDevice) + Send + 'static,
    {
        let delay = self.reaction_delay();
        let shared = Arc::clone(self);
        let task = tokio::spawn(async move {
            sleep(delay).await;
            let mut device = shared.device();
            if device.is_connected() {
                update(&mut device);
            }
        });
        self.track(task);
    }
}

pub struct SimSpa {
    host: String,
    shared: Option<Arc<SimShared>>,
    idigi_device_id: String,
}

impl SimSpa {
    /// A handle to the simulated spa at `host`. Without a config the host
    /// is unknown and every connection attempt fails.
    pub fn new(host: &str, config: Option<SimSpaConfig>) -> Self {
        let shared = config.map(|config| {
            let (loaded, _) = watch::channel(false);
            Arc::new(SimShared {
                host: host.to_string(),
                device: Mutex::new(Self::initial_device(&config)),
                config,
                tasks: Mutex::new(Vec::new()),
                loaded,
            })
        });
        SimSpa {
            host: host.to_string(),
            shared,
            idigi_device_id: Uuid::new_v4().to_string(),
        }
    }

    fn initial_device(config: &SimSpaConfig) -> SimDevice {
        // Each range starts at the configured target, clamped to its bounds.
        let mut setpoints = [0.0; 2];
        for (i, limits) in [TemperatureLimits::LOW_RANGE, TemperatureLimits::HIGH_RANGE]
            .iter()
            .enumerate()
        {
            let (min, max) = limits.bounds(config.temperature_unit);
            setpoints[i] = config
                .temperature_unit
                .quantize(config.target_temperature.clamp(min, max));
        }

        let mut controls = vec![
            ControlSlot {
                name: ControlType::HeatMode.to_string(),
                control_type: ControlType::HeatMode,
                index: 0,
                state: config.heat_mode,
                options: ControlState::heat_mode_options(),
                read_only: false,
                ignored: Vec::new(),
            },
            ControlSlot {
                name: ControlType::TemperatureRange.to_string(),
                control_type: ControlType::TemperatureRange,
                index: 0,
                state: if config.high_range {
                    ControlState::High
                } else {
                    ControlState::Low
                },
                options: ControlState::temperature_range_options(),
                read_only: false,
                ignored: Vec::new(),
            },
        ];

        let mut configured = config.controls.clone();
        configured.sort_by_key(|control| report_order(control.control_type));
        for control in &configured {
            let count = configured
                .iter()
                .filter(|other| other.control_type == control.control_type)
                .count();
            let index = controls
                .iter()
                .filter(|slot| slot.control_type == control.control_type)
                .count();
            controls.push(ControlSlot {
                name: control.control_type.control_name(index, count),
                control_type: control.control_type,
                index,
                state: control.state,
                options: control.options(),
                read_only: control.read_only,
                ignored: control.ignored.clone(),
            });
        }

        SimDevice {
            connection: ConnectionState::Disconnected,
            setpoints,
            controls,
        }
    }

    fn shared(&self) -> SpaResult<&Arc<SimShared>> {
        self.shared.as_ref().ok_or_else(|| SpaError::NotConnected {
            host: self.host.clone(),
        })
    }
}

/// Order in which the spa reports its controls.
fn report_order(control_type: ControlType) -> u8 {
    match control_type {
        ControlType::HeatMode => 0,
        ControlType::TemperatureRange => 1,
        ControlType::Pump => 2,
        ControlType::Light => 3,
        ControlType::CirculationPump => 4,
        ControlType::Blower => 5,
        ControlType::Aux => 6,
        ControlType::Mister => 7,
    }
}

#[async_trait]
impl Spa for SimSpa {
    fn host(&self) -> String {
        self.host.clone()
    }

    async fn connect(&self) -> SpaResult<()> {
        let shared = match &self.shared {
            Some(shared) if shared.config.reachable => shared,
            Some(_) => {
                return Err(SpaError::Connection {
                    host: self.host.clone(),
                    reason: "Connection refused".to_string(),
                })
            }
            None => {
                return Err(SpaError::Connection {
                    host: self.host.clone(),
                    reason: "No spa answers at this address".to_string(),
                })
            }
        };

        debug!("{} -- establishing connection", self.host);
        shared.device().connection = ConnectionState::ConfigurationPending;

        let config = &shared.config;
        if config.loads_configuration && config.state != SpaState::TestMode {
            let delay = Duration::from_millis(config.configuration_delay_ms);
            let loader = Arc::clone(shared);
            let task = tokio::spawn(async move {
                sleep(delay).await;
                let mut device = loader.device();
                if device.connection == ConnectionState::ConfigurationPending {
                    device.connection = ConnectionState::Ready;
                    loader.loaded.send_replace(true);
                }
            });
            shared.track(task);
        }
        info!("{} -- connected", self.host);
        Ok(())
    }

    async fn disconnect(&self) {
        let Some(shared) = &self.shared else {
            return;
        };
        debug!("{} -- disconnect requested", self.host);
        let tasks: Vec<JoinHandle<()>> = shared
            .tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain(..)
            .collect();
        for task in tasks {
            task.abort();
        }
        shared.device().connection = ConnectionState::Disconnected;
        shared.loaded.send_replace(false);
    }

    fn connection_state(&self) -> ConnectionState {
        self.shared
            .as_ref()
            .map(|shared| shared.device().connection)
            .unwrap_or_default()
    }

    async fn configuration_loaded(&self, timeout: Duration) -> bool {
        let Ok(shared) = self.shared() else {
            return false;
        };
        if shared.ensure_connected().is_err() {
            return false;
        }
        let mut loaded = shared.loaded.subscribe();
        let result = tokio::time::timeout(timeout, loaded.wait_for(|loaded| *loaded)).await;
        matches!(result, Ok(Ok(_)))
    }

    fn state(&self) -> SpaState {
        self.shared
            .as_ref()
            .map(|shared| shared.config.state)
            .unwrap_or_default()
    }

    fn controls(&self) -> Vec<Arc<dyn SpaControl>> {
        let Some(shared) = &self.shared else {
            return Vec::new();
        };
        let count = shared.device().controls.len();
        (0..count)
            .map(|slot| Arc::new(SimControl::new(Arc::clone(shared), slot)) as Arc<dyn SpaControl>)
            .collect()
    }

    fn target_temperature(&self) -> f64 {
        self.shared
            .as_ref()
            .map(|shared| shared.device().target_temperature())
            .unwrap_or_default()
    }

    fn temperature_minimum(&self) -> f64 {
        self.shared
            .as_ref()
            .map(|shared| shared.device().limits().bounds(shared.config.temperature_unit).0)
            .unwrap_or_default()
    }

    fn temperature_maximum(&self) -> f64 {
        self.shared
            .as_ref()
            .map(|shared| shared.device().limits().bounds(shared.config.temperature_unit).1)
            .unwrap_or_default()
    }

    async fn set_temperature(&self, temperature: f64) -> SpaResult<bool> {
        let shared = self.shared()?;
        shared.ensure_connected()?;

        let unit = shared.config.temperature_unit;
        let (min, max) = shared.device().limits().bounds(unit);
        if !(min..=max).contains(&temperature) {
            return Err(SpaError::InvalidTemperature {
                value: temperature,
                min,
                max,
            });
        }
        let temperature = unit.quantize(temperature);
        debug!("{} -- set temperature to {}", self.host, temperature);
        if shared.config.ignore_temperature_changes {
            return Ok(true);
        }
        shared.schedule(move |device| {
            let range = device.range_index();
            device.setpoints[range] = temperature;
        });
        Ok(true)
    }

    fn snapshot(&self) -> SpaSnapshot {
        let config = self
            .shared
            .as_ref()
            .map(|shared| shared.config.clone())
            .unwrap_or_default();
        let controls: Vec<ControlInfo> = self.controls().iter().map(|control| control.info()).collect();
        let target_temperature = self.target_temperature();
        let heat_state = match config.temperature {
            Some(temperature) if temperature < target_temperature => HeatState::Heating,
            _ => HeatState::Off,
        };
        let now = Local::now();

        SpaSnapshot {
            host: self.host.clone(),
            mac_address: config.mac_address.clone(),
            idigi_device_id: Some(self.idigi_device_id.clone()),
            model: config.model.clone(),
            software_version: config.software_version.clone(),
            configuration_signature: config.configuration_signature.clone(),
            current_setup: config.current_setup,
            voltage: config.voltage,
            heater_type: config.heater_type.clone(),
            dip_switch: config.dip_switch.clone(),
            low_range: TemperatureLimits::LOW_RANGE,
            high_range: TemperatureLimits::HIGH_RANGE,
            pump_count: controls
                .iter()
                .filter(|control| control.control_type == ControlType::Pump)
                .count(),
            filter_cycle_1: FilterCycle {
                start: NaiveTime::from_hms_opt(20, 0, 0).unwrap_or_default(),
                duration_minutes: 120,
                enabled: true,
                running: false,
            },
            filter_cycle_2: FilterCycle {
                start: NaiveTime::from_hms_opt(8, 0, 0).unwrap_or_default(),
                duration_minutes: 120,
                enabled: false,
                running: false,
            },
            state: config.state,
            temperature_unit: config.temperature_unit,
            temperature: config.temperature,
            target_temperature,
            temperature_minimum: self.temperature_minimum(),
            temperature_maximum: self.temperature_maximum(),
            heat_state,
            time: NaiveTime::from_hms_opt(now.hour(), now.minute(), 0).unwrap_or_default(),
            is_24_hour: false,
            controls,
        }
    }
}
