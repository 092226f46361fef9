//! Human-readable error descriptions and structured JSON error formatting.

use charger_config::RecordError;
use charger_core::{BuildError, ChargerError};

/// Map an eyre::Report to a human-readable explanation with likely causes and fix hints.
pub fn humanize(err: &eyre::Report) -> String {
    // Typed matches first
    if let Some(be) = err.downcast_ref::<BuildError>() {
        return match be {
            BuildError::MissingHardware => {
                "What happened: No hardware was provided to the charger.\nLikely causes: The simulator or driver failed to initialize or was not wired into the builder.\nHow to fix: Ensure the hardware is created successfully and passed via with_hardware(...).".to_string()
            }
            BuildError::InvalidConfig(msg) => format!(
                "What happened: Invalid configuration ({msg}).\nLikely causes: Out-of-range values in the TOML or in the stored slot settings.\nHow to fix: Edit the config file or run `charger config set`, then rerun."
            ),
        };
    }

    if let Some(ce) = err.downcast_ref::<ChargerError>() {
        return match ce {
            ChargerError::Timeout => "What happened: A sensor read timed out.\nLikely causes: ADC not responding, wiring or power issue.\nHow to fix: Check the measurement front end and rerun with --log-level=debug.".to_string(),
            ChargerError::Hardware(msg) | ChargerError::HardwareFault(msg) => format!(
                "What happened: Hardware error ({msg}).\nLikely causes: Channel out of range, regulator fault, or I/O failure.\nHow to fix: Power-cycle the charger and check the slot wiring; rerun with --log-level=debug for details."
            ),
            ChargerError::State(msg) => format!(
                "What happened: Operation not allowed right now ({msg}).\nLikely causes: Slot settings can only change while the slot waits for a cell.\nHow to fix: Remove the cell or wait for the session to finish, then retry."
            ),
            ChargerError::Config(msg) => format!(
                "What happened: Invalid configuration ({msg}).\nLikely causes: Missing or out-of-range values.\nHow to fix: Edit the config file, then rerun."
            ),
        };
    }

    if let Some(re) = err.downcast_ref::<RecordError>() {
        return format!(
            "What happened: The stored slot settings are unreadable ({re}).\nLikely causes: Interrupted write or a file from another program.\nHow to fix: Run `charger config set` to write a fresh record."
        );
    }

    if err.downcast_ref::<toml::de::Error>().is_some() {
        return format!(
            "What happened: The config file is not valid TOML for this charger.\nLikely causes: Syntax error or a value of the wrong type.\nHow to fix: Fix the file and rerun. Details: {err:#}"
        );
    }

    // String-based heuristics for errors coming from init or config
    let msg = format!("{err:#}");
    let lower = msg.to_ascii_lowercase();

    if lower.starts_with("read config") {
        return format!(
            "What happened: Could not read the config file.\nLikely causes: Wrong --config path or missing permissions.\nHow to fix: Pass an existing file via --config. Details: {err:#}"
        );
    }

    if lower.contains("must be") || lower.contains("unreasonably") {
        return format!(
            "What happened: Configuration is invalid ({msg}).\nLikely causes: Out-of-range or inconsistent values.\nHow to fix: Edit the TOML config and try again."
        );
    }

    // Generic fallback
    let mut cause = String::new();
    if let Some(src) = err.source() {
        cause = format!(" Cause: {src}");
    }
    format!(
        "Something went wrong.{cause}\nHow to fix: Re-run with --log-level=debug for details. Original: {msg}"
    )
}

/// Stable exit codes by error class; anything unclassified returns 1.
pub fn exit_code_for_error(err: &eyre::Report) -> i32 {
    if err.downcast_ref::<BuildError>().is_some() {
        return 5;
    }
    match err.downcast_ref::<ChargerError>() {
        Some(ChargerError::Hardware(_) | ChargerError::HardwareFault(_)) => 3,
        Some(ChargerError::Timeout) => 4,
        Some(ChargerError::Config(_)) => 5,
        Some(ChargerError::State(_)) => 6,
        None => 1,
    }
}

fn reason_name(err: &eyre::Report) -> &'static str {
    if let Some(be) = err.downcast_ref::<BuildError>() {
        return match be {
            BuildError::MissingHardware => "MissingHardware",
            BuildError::InvalidConfig(_) => "InvalidConfig",
        };
    }
    match err.downcast_ref::<ChargerError>() {
        Some(ChargerError::Hardware(_)) => "Hardware",
        Some(ChargerError::HardwareFault(_)) => "HardwareFault",
        Some(ChargerError::Timeout) => "Timeout",
        Some(ChargerError::Config(_)) => "Config",
        Some(ChargerError::State(_)) => "State",
        None => "Error",
    }
}

/// Structured JSON for errors when --json is enabled.
pub fn format_error_json(err: &eyre::Report) -> String {
    serde_json::json!({
        "reason": reason_name(err),
        "code": exit_code_for_error(err),
        "message": humanize(err),
    })
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeout_maps_to_code_and_text() {
        let err = eyre::Report::new(ChargerError::Timeout).wrap_err("channel 0");
        assert_eq!(exit_code_for_error(&err), 4);
        assert!(humanize(&err).contains("sensor read timed out"));
        let v: serde_json::Value = serde_json::from_str(&format_error_json(&err)).unwrap();
        assert_eq!(v["reason"], "Timeout");
        assert_eq!(v["code"], 4);
    }

    #[test]
    fn validation_message_is_recognized() {
        let err = eyre::eyre!("timing.tick_ms must be in [1, 1000]");
        assert_eq!(exit_code_for_error(&err), 1);
        assert!(humanize(&err).contains("Configuration is invalid"));
    }

    #[test]
    fn build_errors_are_config_class() {
        let err = eyre::Report::new(BuildError::InvalidConfig("tick must be > 0"));
        assert_eq!(exit_code_for_error(&err), 5);
        assert!(humanize(&err).contains("tick must be > 0"));
    }
}
