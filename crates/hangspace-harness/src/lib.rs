//! Deterministic simulation harness for the Hangspace sync engine.
//!
//! Virtual-time implementations of the Environment and Driver traits for
//! deterministic, reproducible testing of reconnects, debounces, expiries and
//! reconciliation without a network.
//!
//! # Simulation
//!
//! - [`SimEnv`]: virtual monotonic and wall clocks plus a seeded RNG
//! - [`SimServer`]: in-memory server answering channel events and API calls
//! - [`SimDriver`]: [`hangspace_app::Driver`] backed by the two above
//!
//! # Invariants
//!
//! [`InvariantRegistry::standard()`] bundles the engine-wide properties (one
//! bundle per sender, no duplicated optimistic entries, the App showing the
//! client's open chat). [`SimDriver::with_invariants`] checks them after every
//! cycle.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod invariants;
pub mod sim_driver;
pub mod sim_env;
pub mod sim_server;

pub use invariants::{
    BundleSnapshot, ClientSnapshot, EntrySnapshot, Invariant, InvariantRegistry, InvariantResult,
    NonEmptyBundles, SingleEntryPerMessage, SystemSnapshot, ToastLimit, UniqueBundles,
    ViewFollowsClient, ViewSnapshot, Violation,
};
pub use sim_driver::{SimDriver, SimDriverError, snapshot};
pub use sim_env::{SimEnv, SimInstant};
pub use sim_server::SimServer;
