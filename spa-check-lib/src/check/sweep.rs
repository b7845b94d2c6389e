use std::fmt::Display;

use log::{debug, info};
use serde::Serialize;

use crate::check::verifier::{CommandVerifier, Outcome};
use crate::control_interface::{ControlState, ControlType};
use crate::util::traits::{Spa, SpaControl};

/// The options one control is driven through, in order, and the state it
/// returns to afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct SweepPlan<T> {
    pub original: T,
    pub steps: Vec<T>,
}

impl<T: PartialEq + Clone> SweepPlan<T> {
    pub fn new(options: &[T], original: T) -> Self {
        let steps = options
            .iter()
            .filter(|option| **option != original)
            .cloned()
            .collect();
        SweepPlan { original, steps }
    }
}

/// One verification attempt of a sweep.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OptionResult<T> {
    pub option: T,
    /// Value observed right before the request.
    pub from: T,
    /// The attempt that returns the control to its pre-sweep value.
    pub restore: bool,
    #[serde(flatten)]
    pub outcome: Outcome<T>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ControlSweep {
    pub name: String,
    pub control_type: ControlType,
    pub original: ControlState,
    pub final_state: ControlState,
    pub results: Vec<OptionResult<ControlState>>,
}

impl ControlSweep {
    pub fn restored(&self) -> bool {
        self.final_state == self.original
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TemperatureSweep {
    pub original: f64,
    pub final_target: f64,
    pub results: Vec<OptionResult<f64>>,
}

impl TemperatureSweep {
    pub fn restored(&self) -> bool {
        self.final_target == self.original
    }
}

fn log_outcome<T: Display>(subject: &str, outcome: &Outcome<T>, verifier: &CommandVerifier) {
    match outcome {
        Outcome::Confirmed { observed } => info!("  {} is now {}", subject, observed),
        Outcome::NotAccepted => info!("  {} request was not accepted", subject),
        Outcome::TimedOut { last_observed } => info!(
            "  {} was not changed after {} seconds; is {}",
            subject,
            verifier.timeout().as_secs_f64(),
            last_observed
        ),
    }
}

/**
Drives `control` through every option other than its current state, then
returns it to the state it had before the sweep.

An option the control already shows when its turn comes is skipped. A
rejected or unconfirmed option is recorded and the sweep moves on; nothing
aborts it. The restore step only runs if the control ended up elsewhere.
 */
pub async fn sweep_control(control: &dyn SpaControl, verifier: &CommandVerifier) -> ControlSweep {
    let name = control.name();
    let plan = SweepPlan::new(&control.options(), control.state());
    info!("{} control", name);

    let mut results = Vec::with_capacity(plan.steps.len() + 1);
    for option in plan.steps {
        let current = control.state();
        if option == current {
            debug!("{} already is {}, skipping", name, option);
            continue;
        }
        results.push(adjust_control(control, verifier, current, option, false).await);
    }

    let current = control.state();
    if current != plan.original {
        results.push(adjust_control(control, verifier, current, plan.original, true).await);
    }

    ControlSweep {
        name,
        control_type: control.control_type(),
        original: plan.original,
        final_state: control.state(),
        results,
    }
}

async fn adjust_control(
    control: &dyn SpaControl,
    verifier: &CommandVerifier,
    current: ControlState,
    option: ControlState,
    restore: bool,
) -> OptionResult<ControlState> {
    info!("Current state: {}", current);
    info!("  Set to {}", option);
    let outcome = verifier
        .verify(|state| control.set_state(state), || control.state(), option)
        .await;
    log_outcome("State", &outcome, verifier);
    OptionResult {
        option,
        from: current,
        restore,
        outcome,
    }
}

/**
Moves the target temperature to the opposite end of its range and back.

The target goes to the minimum when it sits at the maximum, and to the
maximum otherwise. Both requests always run, so a failed first request
leaves a confirmed no-op as the second.
 */
pub async fn sweep_temperature(spa: &dyn Spa, verifier: &CommandVerifier) -> TemperatureSweep {
    info!("Temperature control");
    let original = spa.target_temperature();
    let maximum = spa.temperature_maximum();
    let away = if original >= maximum {
        spa.temperature_minimum()
    } else {
        maximum
    };

    let results = vec![
        adjust_temperature(spa, verifier, away, false).await,
        adjust_temperature(spa, verifier, original, true).await,
    ];

    TemperatureSweep {
        original,
        final_target: spa.target_temperature(),
        results,
    }
}

async fn adjust_temperature(
    spa: &dyn Spa,
    verifier: &CommandVerifier,
    temperature: f64,
    restore: bool,
) -> OptionResult<f64> {
    let current = spa.target_temperature();
    info!("Current target temperature: {}", current);
    info!("  Set to {}", temperature);
    let outcome = verifier
        .verify(
            |target| spa.set_temperature(target),
            || spa.target_temperature(),
            temperature,
        )
        .await;
    log_outcome("Set temperature", &outcome, verifier);
    OptionResult {
        option: temperature,
        from: current,
        restore,
        outcome,
    }
}
