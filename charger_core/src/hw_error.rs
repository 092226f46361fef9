//! Maps `Box<dyn Error>` from trait boundaries to typed `ChargerError`.
//!
//! `charger_traits::ChargerHardware` returns boxed errors so any backend can
//! plug in; this module converts those to our typed error enum, with an
//! optional feature-gated path for `charger_hardware::HwError` downcasting.

use crate::error::ChargerError;

/// Map a trait-boundary error to a typed `ChargerError`.
///
/// Attempts to downcast known hardware error types first, then falls back
/// to string-based heuristics.
pub fn map_hw_error(e: &(dyn std::error::Error + 'static)) -> ChargerError {
    #[cfg(feature = "hardware-errors")]
    {
        if let Some(hw) = e.downcast_ref::<charger_hardware::error::HwError>() {
            return match hw {
                charger_hardware::error::HwError::SensorTimeout => ChargerError::Timeout,
                other => ChargerError::HardwareFault(other.to_string()),
            };
        }
    }

    let s = e.to_string();
    if s.to_lowercase().contains("timeout") {
        ChargerError::Timeout
    } else {
        ChargerError::Hardware(s)
    }
}
