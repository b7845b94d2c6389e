use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::control_interface::{
    ConnectionState, ControlInfo, ControlState, ControlType, SpaSnapshot, SpaState,
};
use crate::error::SpaResult;

/// One controllable feature of a spa: a pump, a light, the heat mode...
///
/// The state returned by [`SpaControl::state`] is whatever the spa last
/// reported. Setting a state only dispatches a request, the new state shows
/// up once the spa reports it back.
#[async_trait]
pub trait SpaControl: Send + Sync {
    fn name(&self) -> String;

    fn control_type(&self) -> ControlType;

    fn index(&self) -> usize;

    /// Current state. Always one of [`SpaControl::options`].
    fn state(&self) -> ControlState;

    /// All states the control can be set to. Never empty.
    fn options(&self) -> Vec<ControlState>;

    /// Request a state change.
    ///
    /// # Returns
    /// `true` if the request was accepted for dispatch to the spa. This says
    /// nothing about whether the spa applied it.
    async fn set_state(&self, state: ControlState) -> SpaResult<bool>;

    fn info(&self) -> ControlInfo {
        ControlInfo {
            name: self.name(),
            control_type: self.control_type(),
            index: self.index(),
            state: self.state(),
            options: self.options(),
        }
    }
}

/// A session handle to one spa.
#[async_trait]
pub trait Spa: Send + Sync {
    fn host(&self) -> String;

    async fn connect(&self) -> SpaResult<()>;

    /// Close the session. Safe to call on a handle that never connected.
    async fn disconnect(&self);

    fn connection_state(&self) -> ConnectionState;

    /// Wait up to `timeout` for the spa to finish reporting its configuration.
    async fn configuration_loaded(&self, timeout: Duration) -> bool;

    fn state(&self) -> SpaState;

    /// Every control, in the order the spa reports them.
    fn controls(&self) -> Vec<Arc<dyn SpaControl>>;

    fn target_temperature(&self) -> f64;

    fn temperature_minimum(&self) -> f64;

    fn temperature_maximum(&self) -> f64;

    /// Request a new target temperature.
    ///
    /// Fails with [`SpaError::InvalidTemperature`](crate::error::SpaError::InvalidTemperature)
    /// outside `temperature_minimum..=temperature_maximum`.
    async fn set_temperature(&self, temperature: f64) -> SpaResult<bool>;

    fn snapshot(&self) -> SpaSnapshot;

    fn get_controls(&self, control_type: ControlType) -> Vec<Arc<dyn SpaControl>> {
        self.controls()
            .into_iter()
            .filter(|control| control.control_type() == control_type)
            .collect()
    }

    fn pumps(&self) -> Vec<Arc<dyn SpaControl>> {
        self.get_controls(ControlType::Pump)
    }

    fn lights(&self) -> Vec<Arc<dyn SpaControl>> {
        self.get_controls(ControlType::Light)
    }

    fn aux(&self) -> Vec<Arc<dyn SpaControl>> {
        self.get_controls(ControlType::Aux)
    }

    fn blowers(&self) -> Vec<Arc<dyn SpaControl>> {
        self.get_controls(ControlType::Blower)
    }

    fn misters(&self) -> Vec<Arc<dyn SpaControl>> {
        self.get_controls(ControlType::Mister)
    }
}

/// The datagram side of spa discovery.
#[async_trait]
pub trait DiscoveryTransport: Send {
    /// Broadcast the discovery probe.
    async fn send_probe(&mut self) -> SpaResult<()>;

    /// Receive the next response as `(payload, source host)`.
    ///
    /// `Ok(None)` means no further responses can arrive and discovery may
    /// stop before its timeout.
    async fn recv(&mut self) -> SpaResult<Option<(Vec<u8>, String)>>;
}

/// Entry point into a spa client implementation.
#[async_trait]
pub trait SpaConnector: Send + Sync {
    async fn open_discovery(&self) -> SpaResult<Box<dyn DiscoveryTransport>>;

    /// A disconnected handle to the spa at `host`.
    fn spa(&self, host: &str, mac_address: Option<&str>) -> Box<dyn Spa>;
}
