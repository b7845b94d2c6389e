//! The command-and-verify engine: a verifier for single commands, a sweep
//! driver built on it, and the session orchestrator that runs sweeps against
//! connected spas.
pub mod session;
pub mod sweep;
pub mod verifier;
