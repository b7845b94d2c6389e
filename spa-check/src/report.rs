use std::fmt::{self, Display, Write};

use spa_check_lib::check::session::{SessionFailure, SessionReport};
use spa_check_lib::check::sweep::OptionResult;
use spa_check_lib::check::verifier::Outcome;
use spa_check_lib::control_interface::{ControlType, FilterCycle, SpaSnapshot, TemperatureLimits};

pub fn print_report(report: &SessionReport) {
    print!("{}", format_report(report));
}

fn heading(out: &mut impl Write, title: &str) -> fmt::Result {
    writeln!(out, "{}", title)?;
    writeln!(out, "{}", "-".repeat(title.len()))
}

fn format_limits(limits: &TemperatureLimits) -> String {
    format!(
        "{}-{} F / {}-{} C",
        limits.fahrenheit.0, limits.fahrenheit.1, limits.celsius.0, limits.celsius.1
    )
}

fn format_filter_cycle(number: u8, cycle: &FilterCycle) -> String {
    format!(
        "Filter cycle {}: {} to {} ({}h{:02}m, {}abled)",
        number,
        cycle.start.format("%H:%M"),
        cycle.end().format("%H:%M"),
        cycle.duration_minutes / 60,
        cycle.duration_minutes % 60,
        if cycle.enabled { "en" } else { "dis" }
    )
}

fn format_result<T: Display>(result: &OptionResult<T>) -> String {
    let step = if result.restore { "Restore" } else { "Set" };
    let verdict = match &result.outcome {
        Outcome::Confirmed { observed } => format!("confirmed, now {}", observed),
        Outcome::NotAccepted => "not accepted".to_string(),
        Outcome::TimedOut { last_observed } => {
            format!("not changed in time, still {}", last_observed)
        }
    };
    format!("  {} {} -> {}: {}", step, result.from, result.option, verdict)
}

fn write_snapshot(out: &mut impl Write, snapshot: &SpaSnapshot) -> fmt::Result {
    heading(out, "Module identification")?;
    writeln!(out, "MAC address: {}", snapshot.mac_address)?;
    writeln!(
        out,
        "iDigi Device Id: {}",
        snapshot.idigi_device_id.as_deref().unwrap_or("unknown")
    )?;
    writeln!(out)?;

    heading(out, "Device configuration")?;
    for (label, control_type) in [
        ("Pumps", ControlType::Pump),
        ("Lights", ControlType::Light),
        ("Aux", ControlType::Aux),
        ("Blower", ControlType::Blower),
        ("Mister", ControlType::Mister),
        ("Circulation pump", ControlType::CirculationPump),
    ] {
        writeln!(out, "{}: {:?}", label, snapshot.control_names(control_type))?;
    }
    writeln!(out)?;

    heading(out, "System information")?;
    writeln!(out, "Model: {}", snapshot.model)?;
    writeln!(out, "Software version: {}", snapshot.software_version)?;
    writeln!(
        out,
        "Configuration signature: {}",
        snapshot.configuration_signature
    )?;
    writeln!(out, "Current setup: {}", snapshot.current_setup)?;
    writeln!(out, "Voltage: {}", snapshot.voltage)?;
    writeln!(out, "Heater type: {}", snapshot.heater_type)?;
    writeln!(out, "DIP switch: {}", snapshot.dip_switch)?;
    writeln!(out)?;

    heading(out, "Setup parameters")?;
    writeln!(out, "Low range: {}", format_limits(&snapshot.low_range))?;
    writeln!(out, "High range: {}", format_limits(&snapshot.high_range))?;
    writeln!(out, "Pump count: {}", snapshot.pump_count)?;
    writeln!(out)?;

    heading(out, "Filter cycle")?;
    writeln!(out, "{}", format_filter_cycle(1, &snapshot.filter_cycle_1))?;
    writeln!(out, "{}", format_filter_cycle(2, &snapshot.filter_cycle_2))?;
    writeln!(out)?;

    heading(out, "Status update")?;
    writeln!(out, "Spa state: {}", snapshot.state)?;
    writeln!(out, "Temperature unit: {:?}", snapshot.temperature_unit)?;
    match snapshot.temperature {
        Some(temperature) => {
            writeln!(out, "Temperature: {}", temperature)?;
        }
        None => {
            writeln!(out, "Temperature: unknown")?;
        }
    }
    writeln!(out, "Target temperature: {}", snapshot.target_temperature)?;
    writeln!(
        out,
        "Target range: {}..{}",
        snapshot.temperature_minimum, snapshot.temperature_maximum
    )?;
    writeln!(out, "Heat state: {:?}", snapshot.heat_state)?;
    for control in &snapshot.controls {
        writeln!(out, "{}", control)?;
    }
    writeln!(
        out,
        "Spa time: {} {}",
        snapshot.time.format("%H:%M"),
        if snapshot.is_24_hour { "24hr" } else { "12hr" }
    )?;
    writeln!(
        out,
        "Filter cycle 1 running: {}",
        snapshot.filter_cycle_1.running
    )?;
    writeln!(
        out,
        "Filter cycle 2 running: {}",
        snapshot.filter_cycle_2.running
    )?;
    writeln!(out)
}

/// Renders one session the way the harness prints it to standard output.
pub fn format_report(report: &SessionReport) -> String {
    let mut out = String::new();
    // Writing into a String cannot fail.
    let _ = write_report(&mut out, report);
    out
}

fn write_report(out: &mut impl Write, report: &SessionReport) -> fmt::Result {
    let host = report.host.as_deref().unwrap_or("unknown host");

    if let Some(failure) = &report.failure {
        match failure {
            SessionFailure::NoSpaFound => {
                writeln!(out, "{}", failure)?;
            }
            SessionFailure::Connectivity { reason } => {
                writeln!(out, "Failed to connect to spa at {}", host)?;
                writeln!(out, "  {}", reason)?;
            }
            SessionFailure::ConfigurationNotLoaded { .. } => {
                writeln!(out, "{}: {}", host, failure)?;
            }
        }
        return Ok(());
    }

    writeln!(out, "Spa at {}", host)?;
    writeln!(out)?;
    if let Some(snapshot) = &report.snapshot {
        write_snapshot(out, snapshot)?;
    }

    if let Some(temperature) = &report.temperature {
        heading(out, "Temperature control")?;
        for result in &temperature.results {
            writeln!(out, "{}", format_result(result))?;
        }
        writeln!(out)?;
    }

    for control in &report.controls {
        heading(out, &format!("{} control", control.name))?;
        if control.results.is_empty() {
            writeln!(out, "  Nothing to change")?;
        }
        for result in &control.results {
            writeln!(out, "{}", format_result(result))?;
        }
        if !control.restored() {
            writeln!(
                out,
                "  Left in {} instead of {}",
                control.final_state, control.original
            )?;
        }
        writeln!(out)?;
    }

    let summary = report.summary();
    writeln!(
        out,
        "Summary: {} confirmed, {} not accepted, {} timed out",
        summary.confirmed, summary.not_accepted, summary.timed_out
    )?;
    writeln!(out)
}

#[cfg(test)]
mod tests {
    use spa_check_lib::check::session::{Orchestrator, SessionOptions, Target};
    use spa_check_lib::sim::SimConnector;
    use spa_check_lib::util::config::SimulatorConfig;

    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_full_report_lists_every_section() {
        let connector = SimConnector::new(SimulatorConfig::default());
        let orchestrator = Orchestrator::new(&connector, SessionOptions::default());
        let reports = orchestrator
            .run(Target::Host("192.168.1.50".to_string()))
            .await;
        let text = format_report(&reports[0]);

        assert!(text.contains("Module identification\n---------------------\n"));
        assert!(text.contains("MAC address: 00:15:27:00:00:01"));
        assert!(text.contains("Pumps: [\"Pump 1\", \"Pump 2\"]"));
        assert!(text.contains("Filter cycle 1: 20:00 to 22:00 (2h00m, enabled)"));
        assert!(text.contains("  Set 100 -> 104: confirmed, now 104"));
        assert!(text.contains("  Restore 104 -> 100: confirmed, now 100"));
        assert!(text.contains("Pump 1 control\n--------------\n"));
        assert!(text.contains("  Set OFF -> LOW: confirmed, now LOW"));
        assert!(text.contains("  Set ON -> OFF: not accepted"));
        assert!(text.contains("Summary: 17 confirmed, 1 not accepted, 0 timed out"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_failures_are_one_line_reports() {
        let connector = SimConnector::new(SimulatorConfig {
            spas: vec![],
            ..SimulatorConfig::default()
        });
        let orchestrator = Orchestrator::new(&connector, SessionOptions::default());

        let reports = orchestrator.run(Target::Discover { first_only: true }).await;
        assert_eq!(format_report(&reports[0]), "No spa provided\n");

        let reports = orchestrator.run(Target::Host("10.9.9.9".to_string())).await;
        assert!(format_report(&reports[0]).starts_with("Failed to connect to spa at 10.9.9.9\n"));
    }
}
