#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]
//! Control core of a twin NiMH charger (hardware-agnostic).
//!
//! All hardware interaction goes through `charger_traits::ChargerHardware`.
//!
//! ## Architecture
//!
//! - **Statistics**: integer moving averages and trend (`stat`)
//! - **Battery slot**: per-channel state and the phase transition rule (`battery`)
//! - **Phases**: Check, Discharge, Precharge, Charge, Postcharge, Keep (`phase`)
//! - **Dispatcher**: ticks every channel cooperatively (`charger`)
//! - **Runner**: drives the dispatcher and takes commands over a channel (`runner`)
//!
//! Voltages are in mV, currents in mA and temperatures in tenths of a degree
//! Celsius, all integers.

pub mod battery;
pub mod builder;
pub mod charger;
pub mod config;
pub mod conversions;
pub mod error;
pub mod hw_error;
pub mod mocks;
pub mod phase;
pub mod runner;
pub mod stat;
pub mod util;

pub use battery::{BatterySlot, FinishReason, PhaseId, PhaseKind};
pub use builder::{ChargerBuilder, Missing, Set};
pub use charger::{Charger, SlotEvent, SlotStatus};
pub use config::{BudgetCfg, ChargerCfg, CurrentCfg, SlotSettings, ThermalCfg, VoltageCfg};
pub use error::{BuildError, ChargerError, Result};
pub use phase::{Phase, PhaseCtx, Step};
pub use runner::{Command, RunOutcome, Runner, command_channel};
pub use stat::{ExponentialAverage, SampleHistory};

pub use charger_config::Schedule;
