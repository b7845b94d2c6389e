use std::sync::Arc;

use async_trait::async_trait;
use log::debug;

use crate::control_interface::{ControlState, ControlType};
use crate::error::{SpaError, SpaResult};
use crate::sim::SimShared;
use crate::util::traits::SpaControl;

/// Handle to one control of a simulated spa.
pub struct SimControl {
    shared: Arc<SimShared>,
    slot: usize,
}

impl SimControl {
    pub(crate) fn new(shared: Arc<SimShared>, slot: usize) -> Self {
        SimControl { shared, slot }
    }

    fn read<T>(&self, f: impl FnOnce(&super::ControlSlot) -> T) -> T {
        f(&self.shared.device().controls[self.slot])
    }
}

#[async_trait]
impl SpaControl for SimControl {
    fn name(&self) -> String {
        self.read(|control| control.name.clone())
    }

    fn control_type(&self) -> ControlType {
        self.read(|control| control.control_type)
    }

    fn index(&self) -> usize {
        self.read(|control| control.index)
    }

    fn state(&self) -> ControlState {
        self.read(|control| control.state)
    }

    fn options(&self) -> Vec<ControlState> {
        self.read(|control| control.options.clone())
    }

    async fn set_state(&self, state: ControlState) -> SpaResult<bool> {
        self.shared.ensure_connected()?;

        let (name, control_type, current, options, read_only, ignored) = self.read(|control| {
            (
                control.name.clone(),
                control.control_type,
                control.state,
                control.options.clone(),
                control.read_only,
                control.ignored.contains(&state),
            )
        });
        if !options.contains(&state) {
            return Err(SpaError::InvalidState {
                control: control_type,
                state,
            });
        }
        if read_only {
            debug!("{} -- {} does not accept commands", self.shared.host, name);
            return Ok(false);
        }
        if current == state || ignored {
            return Ok(true);
        }

        debug!("{} -- set {} to {}", self.shared.host, name, state);
        let slot = self.slot;
        self.shared.schedule(move |device| {
            device.controls[slot].state = state;
        });
        Ok(true)
    }
}
