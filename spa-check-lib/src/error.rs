use thiserror::Error;

use crate::control_interface::{ControlState, ControlType};

/// Errors raised at the boundary of the spa client.
///
/// Only [`SpaError::Connection`] ends a device's session early. Rejected or
/// unconfirmed commands are not errors, they surface as
/// [`Outcome`](crate::check::verifier::Outcome) values.
#[derive(Debug, Error)]
pub enum SpaError {
    /// The spa could not be reached or the session could not be opened.
    #[error("Failed to connect to spa at {host}: {reason}")]
    Connection { host: String, reason: String },

    /// A command was issued on a handle that is not connected.
    #[error("Spa at {host} is not connected")]
    NotConnected { host: String },

    /// Target temperature outside the range of the active temperature range.
    #[error("Invalid temperature: {value} (expected {min}..{max})")]
    InvalidTemperature { value: f64, min: f64, max: f64 },

    /// Requested state is not one of the control's options.
    #[error("Invalid state {state} for {control:?} control")]
    InvalidState {
        control: ControlType,
        state: ControlState,
    },

    /// The discovery transport failed, as opposed to finding nothing.
    #[error("Discovery failed: {0}")]
    Discovery(String),
}

pub type SpaResult<T> = Result<T, SpaError>;
