//! Heat-sink fan control with hysteresis.

/// Fan never waits for more than this (tenths °C).
pub const HS_HOT_TEMP: i16 = 500;
/// Switch-on point above ambient measured at start-up.
pub const HS_ON_ABOVE_AMBIENT: i16 = 100;
/// Fan switches off this far below the switch-on point.
pub const HS_DIFF_TEMP: i16 = 50;

#[derive(Debug, Clone)]
pub struct FanGovernor {
    on_at: i16,
    running: bool,
}

impl FanGovernor {
    /// Switch-on point is ambient plus a margin, capped at [`HS_HOT_TEMP`].
    pub fn new(ambient: i16) -> Self {
        Self {
            on_at: ambient.saturating_add(HS_ON_ABOVE_AMBIENT).min(HS_HOT_TEMP),
            running: false,
        }
    }

    /// Feed a heat-sink reading; returns whether the fan should run.
    pub fn update(&mut self, heat_sink: i16) -> bool {
        if self.running && heat_sink < self.on_at - HS_DIFF_TEMP {
            self.running = false;
            tracing::debug!(heat_sink, "fan off");
        } else if !self.running && heat_sink >= self.on_at {
            self.running = true;
            tracing::debug!(heat_sink, "fan on");
        }
        self.running
    }

    pub fn running(&self) -> bool {
        self.running
    }
}
