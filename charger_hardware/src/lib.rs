#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]
//! Hardware side of the charger: the per-channel current regulator, sensor
//! caching, heat-sink fan control and a simulated backend implementing
//! `charger_traits::ChargerHardware`.

pub mod cache;
pub mod error;
pub mod fan;
pub mod pid;
pub mod sim;

pub use pid::{Gain, PidController, PidGains};
pub use sim::{CellSpec, ChannelMode, SimConfig, SimulatedCharger};
