//! Market data acquisition for PegWatch.
//!
//! Observations come from a [`DataSource`]. The default
//! [`SimulatedSource`] draws bounded random values; [`FixedSource`] serves
//! scripted observations and is what tests and replays inject.

pub mod providers;
pub mod sources;

pub use providers::*;
pub use sources::*;
