//! Engine configuration: the tunables the Planner reads at startup
//! (MaxSteps, MaxRetries, TimeoutPerStep, checkpoint cadence, and the
//! parallel executor's concurrency cap), loaded from TOML with defaults.

pub mod config;

pub use config::Configuration;
