//! Scenario runner for detserv.
//!
//! Loads a TOML description of a network, an admission configuration and a
//! sequence of flow admissions and withdrawals, builds the network (running
//! every link's allocation as it is added), plays the events and reports
//! where each flow landed and how loaded each queue ended up.

pub mod runner;
pub mod scenario;

pub use runner::{cheapest_path, run, Choice, FlowOutcome, Outcome, Report};
pub use scenario::{Action, Event, Network, Scenario};
