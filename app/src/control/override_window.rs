use chrono::{DateTime, Duration, Utc};

use crate::core::unit::DegreeCelsius;

use super::engine::SETPOINT_EPSILON;

/// Tracks the single manual-override window. At most one window exists at a
/// time; observing a new deviating setpoint restarts it instead of stacking.
///
/// The tracker starts with a window anchored at process start: until proven
/// otherwise, the setpoint found on the device is assumed to be a recent human
/// choice and automatic control stays suspended for the configured duration.
#[derive(Debug, Clone)]
pub struct OverrideTracker {
    window: Option<Window>,
    duration: Duration,
}

#[derive(Debug, Clone, Copy)]
struct Window {
    since: DateTime<Utc>,
    /// The deviating setpoint this window was recorded for. None for the
    /// startup window, where the device has not been observed yet.
    setpoint: Option<DegreeCelsius>,
}

impl OverrideTracker {
    pub fn new(started_at: DateTime<Utc>, duration: Duration) -> Self {
        Self {
            window: Some(Window {
                since: started_at,
                setpoint: None,
            }),
            duration,
        }
    }

    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        match self.window {
            Some(window) => now - window.since < self.duration,
            None => false,
        }
    }

    /// End of the currently active window. None once the window has expired,
    /// an elapsed override is as good as a cleared one.
    pub fn active_until(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.window
            .map(|window| window.since + self.duration)
            .filter(|until| now < *until)
    }

    /// Records a deviating setpoint. The window is restarted from `now` only
    /// when the device has actually moved since the window was last recorded;
    /// seeing the same deviating value again leaves the window untouched, so
    /// a parked setpoint cannot extend the override forever.
    pub fn observe_deviation(&mut self, now: DateTime<Utc>, setpoint: DegreeCelsius) {
        if let Some(window) = &mut self.window {
            match window.setpoint {
                // First observed deviation after startup. Adopt the value but
                // keep the startup anchor, the human change predates us.
                None => {
                    window.setpoint = Some(setpoint);
                    return;
                }
                Some(recorded) if recorded.approx_eq(&setpoint, SETPOINT_EPSILON) => return,
                Some(_) => {}
            }
        }

        self.window = Some(Window {
            since: now,
            setpoint: Some(setpoint),
        });
    }

    pub fn clear(&mut self) {
        self.window = None;
    }
}
