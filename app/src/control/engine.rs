use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::core::{DeviceSnapshot, PriceInstruction, unit::DegreeCelsius};

use super::OverrideTracker;

/// Device setpoints are reported with one decimal of precision.
pub const SETPOINT_EPSILON: f64 = 0.1;

/// The two setpoints automation is allowed to write, plus the manual
/// kill-switch that suspends price control entirely.
#[derive(Debug, Clone, Copy)]
pub struct ControlledSetpoints {
    pub low: DegreeCelsius,
    pub high: DegreeCelsius,
    pub manual_override: Option<DegreeCelsius>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub enum Action {
    Write(DegreeCelsius),
    Noop,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DecisionReason {
    PriceHeat,
    PriceIdle,
    OverrideActive,
    OverrideManualKill,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ControlDecision {
    pub action: Action,
    pub reason: DecisionReason,
}

impl ControlDecision {
    fn noop(reason: DecisionReason) -> Self {
        Self {
            action: Action::Noop,
            reason,
        }
    }
}

/// Single decision step of the control state machine.
///
/// Pure apart from the tracker update: no I/O, no clock access. Writes only
/// ever target exactly `low` or `high`, and never while an override window is
/// active.
pub fn decide(
    now: DateTime<Utc>,
    price: PriceInstruction,
    snapshot: &DeviceSnapshot,
    setpoints: &ControlledSetpoints,
    tracker: &mut OverrideTracker,
) -> ControlDecision {
    //Kill-switch wins over everything, no state is touched
    if setpoints.manual_override.is_some() {
        return ControlDecision::noop(DecisionReason::OverrideManualKill);
    }

    let expected = match price {
        PriceInstruction::Heat => setpoints.high,
        PriceInstruction::Idle => setpoints.low,
    };

    match snapshot.reported_setpoint {
        //Setpoint back on one of the two automation values: automatic control
        //resumes right away instead of waiting out the window. Also covers
        //startup with an already-correct setpoint.
        Some(reported)
            if reported.approx_eq(&setpoints.low, SETPOINT_EPSILON)
                || reported.approx_eq(&setpoints.high, SETPOINT_EPSILON) =>
        {
            tracker.clear();
        }
        //A setpoint that is neither low nor high was chosen by a human
        Some(reported) => tracker.observe_deviation(now, reported),
        //No device data, leave the window as it is
        None => {}
    }

    if tracker.is_active(now) {
        return ControlDecision::noop(DecisionReason::OverrideActive);
    }

    let price_reason = match price {
        PriceInstruction::Heat => DecisionReason::PriceHeat,
        PriceInstruction::Idle => DecisionReason::PriceIdle,
    };

    match snapshot.reported_setpoint {
        Some(reported) if reported.approx_eq(&expected, SETPOINT_EPSILON) => ControlDecision::noop(price_reason),
        _ => ControlDecision {
            action: Action::Write(expected),
            reason: price_reason,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn at(hour: u32, minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2023, 12, 16, hour, minute, 0).unwrap()
    }

    fn setpoints() -> ControlledSetpoints {
        ControlledSetpoints {
            low: DegreeCelsius(27.0),
            high: DegreeCelsius(37.0),
            manual_override: None,
        }
    }

    fn reporting(setpoint: f64) -> DeviceSnapshot {
        DeviceSnapshot {
            reported_setpoint: Some(DegreeCelsius(setpoint)),
            measured_temperature: Some(DegreeCelsius(30.5)),
        }
    }

    fn automatic_tracker() -> OverrideTracker {
        let mut tracker = OverrideTracker::new(at(0, 0), Duration::hours(12));
        tracker.clear();
        tracker
    }

    #[test]
    fn no_redundant_write_when_setpoint_matches_price() {
        let mut tracker = automatic_tracker();

        let decision = decide(at(9, 0), PriceInstruction::Heat, &reporting(37.0), &setpoints(), &mut tracker);
        assert_eq!(decision, ControlDecision::noop(DecisionReason::PriceHeat));

        let decision = decide(at(9, 0), PriceInstruction::Idle, &reporting(27.0), &setpoints(), &mut tracker);
        assert_eq!(decision, ControlDecision::noop(DecisionReason::PriceIdle));
    }

    #[test]
    fn writes_expected_setpoint_on_price_change() {
        let mut tracker = automatic_tracker();

        let decision = decide(at(9, 0), PriceInstruction::Heat, &reporting(27.0), &setpoints(), &mut tracker);

        assert_eq!(decision.action, Action::Write(DegreeCelsius(37.0)));
        assert_eq!(decision.reason, DecisionReason::PriceHeat);
    }

    #[test]
    fn deviation_opens_window_and_suppresses_control() {
        let mut tracker = automatic_tracker();

        let decision = decide(at(9, 0), PriceInstruction::Heat, &reporting(30.0), &setpoints(), &mut tracker);

        assert_eq!(decision, ControlDecision::noop(DecisionReason::OverrideActive));
        assert!(tracker.is_active(at(9, 0)));
    }

    #[test]
    fn active_window_suppresses_control_regardless_of_price() {
        let mut tracker = automatic_tracker();
        decide(at(9, 0), PriceInstruction::Heat, &reporting(30.0), &setpoints(), &mut tracker);

        for price in [PriceInstruction::Heat, PriceInstruction::Idle] {
            let decision = decide(at(15, 0), price, &reporting(30.0), &setpoints(), &mut tracker);
            assert_eq!(decision, ControlDecision::noop(DecisionReason::OverrideActive));
        }
    }

    #[test]
    fn control_resumes_after_window_expiry() {
        let mut tracker = automatic_tracker();
        decide(at(9, 0), PriceInstruction::Heat, &reporting(30.0), &setpoints(), &mut tracker);

        //setpoint unchanged at 30 the whole time, window not restarted
        let decision = decide(at(21, 0), PriceInstruction::Heat, &reporting(30.0), &setpoints(), &mut tracker);

        assert_eq!(decision.action, Action::Write(DegreeCelsius(37.0)));
        assert_eq!(decision.reason, DecisionReason::PriceHeat);
    }

    #[test]
    fn control_resumes_after_expiry_with_absent_snapshot() {
        let mut tracker = automatic_tracker();
        decide(at(9, 0), PriceInstruction::Heat, &reporting(30.0), &setpoints(), &mut tracker);

        let decision = decide(
            at(21, 0),
            PriceInstruction::Heat,
            &DeviceSnapshot::default(),
            &setpoints(),
            &mut tracker,
        );

        assert_eq!(decision.action, Action::Write(DegreeCelsius(37.0)));
    }

    #[test]
    fn kill_switch_always_wins() {
        let config = ControlledSetpoints {
            manual_override: Some(DegreeCelsius(35.0)),
            ..setpoints()
        };

        let mut tracker = OverrideTracker::new(at(0, 0), Duration::hours(12));

        for price in [PriceInstruction::Heat, PriceInstruction::Idle] {
            for snapshot in [reporting(27.0), reporting(30.0), DeviceSnapshot::default()] {
                let decision = decide(at(9, 0), price, &snapshot, &config, &mut tracker);
                assert_eq!(decision, ControlDecision::noop(DecisionReason::OverrideManualKill));
            }
        }

        //tracker state untouched, startup window still in place
        assert!(tracker.is_active(at(9, 0)));
    }

    #[test]
    fn no_startup_delay_when_setpoint_already_automatic() {
        let mut tracker = OverrideTracker::new(at(8, 0), Duration::hours(12));

        let decision = decide(at(8, 0), PriceInstruction::Idle, &reporting(27.0), &setpoints(), &mut tracker);

        assert_eq!(decision, ControlDecision::noop(DecisionReason::PriceIdle));
        assert!(!tracker.is_active(at(8, 0)));
    }

    #[test]
    fn startup_with_arbitrary_setpoint_delays_control() {
        let mut tracker = OverrideTracker::new(at(8, 0), Duration::hours(12));

        let decision = decide(at(8, 0), PriceInstruction::Heat, &reporting(30.0), &setpoints(), &mut tracker);
        assert_eq!(decision, ControlDecision::noop(DecisionReason::OverrideActive));

        //window anchored at process start, expires 12h later
        let decision = decide(at(20, 0), PriceInstruction::Heat, &reporting(30.0), &setpoints(), &mut tracker);
        assert_eq!(decision.action, Action::Write(DegreeCelsius(37.0)));
    }

    #[test]
    fn returning_setpoint_to_automatic_value_clears_window() {
        let mut tracker = automatic_tracker();
        decide(at(9, 0), PriceInstruction::Heat, &reporting(30.0), &setpoints(), &mut tracker);
        assert!(tracker.is_active(at(10, 0)));

        //human puts the setpoint back to low, control resumes immediately
        let decision = decide(at(10, 0), PriceInstruction::Heat, &reporting(27.0), &setpoints(), &mut tracker);

        assert!(!tracker.is_active(at(10, 0)));
        assert_eq!(decision.action, Action::Write(DegreeCelsius(37.0)));
        assert_eq!(decision.reason, DecisionReason::PriceHeat);
    }

    #[test]
    fn write_round_trip_settles_into_noop() {
        let mut tracker = automatic_tracker();

        let decision = decide(at(9, 0), PriceInstruction::Heat, &reporting(27.0), &setpoints(), &mut tracker);
        let Action::Write(target) = decision.action else {
            panic!("expected a write");
        };

        let decision = decide(at(9, 15), PriceInstruction::Heat, &reporting(target.0), &setpoints(), &mut tracker);
        assert_eq!(decision, ControlDecision::noop(DecisionReason::PriceHeat));
    }

    #[test]
    fn reported_setpoint_compared_with_tolerance() {
        let mut tracker = automatic_tracker();

        //27.05 counts as the low setpoint
        let decision = decide(at(9, 0), PriceInstruction::Idle, &reporting(27.05), &setpoints(), &mut tracker);
        assert_eq!(decision, ControlDecision::noop(DecisionReason::PriceIdle));

        //27.5 does not, it is a manual deviation
        let decision = decide(at(9, 0), PriceInstruction::Idle, &reporting(27.5), &setpoints(), &mut tracker);
        assert_eq!(decision, ControlDecision::noop(DecisionReason::OverrideActive));
    }
}
