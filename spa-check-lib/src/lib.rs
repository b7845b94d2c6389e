//! # Spa Check Library
//!
//! `spa-check-lib` verifies the behavior of a networked spa controller end to end.
//! It connects to a spa, confirms its configuration has loaded, and then drives
//! every control through every one of its states, checking that each commanded
//! change is reported back by the spa within a bounded time.
//!
//! The spa client itself sits behind the traits in [`util::traits`]. The library
//! ships a simulated implementation in [`sim`] that the command line tool and
//! the tests run against.
//!
//! ## Features
//!
//! - Spa discovery on the local network
//! - Bounded command verification with a fixed poll interval
//! - Exhaustive option sweeps that leave every control as they found it
//! - Session reports serializable to JSON or YAML
//!
//! ## Example
//!
//! Checking every simulated spa that answers discovery:
//!
//! ```no_run
//! use spa_check_lib::check::session::{Orchestrator, SessionOptions, Target};
//! use spa_check_lib::sim::SimConnector;
//! use spa_check_lib::util::config::HarnessConfig;
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = HarnessConfig::default();
//!     let connector = SimConnector::new(config.simulator.clone());
//!     let orchestrator = Orchestrator::new(&connector, SessionOptions::from(&config));
//!
//!     for report in orchestrator.run(Target::Discover { first_only: false }).await {
//!         println!("{:?}: {:?}", report.host, report.summary());
//!     }
//! }
//! ```
//!
//! ## License
//!
//! This project is dual-licensed under the MIT License and the Apache License, Version 2.0.

// The `check` module holds the command verifier, the sweep driver and the
// session orchestrator.
pub mod check;

// The `control_interface` module describes what a spa reports: its operating
// state, its controls and their states, and the snapshot printed before a run.
pub mod control_interface;

pub mod error;

// The `sim` module provides simulated spas that implement the client traits.
pub mod sim;

// The `util` module provides the client traits, spa discovery and the
// harness configuration.
pub mod util;
