mod engine;
mod override_window;

pub use engine::{Action, ControlDecision, ControlledSetpoints, DecisionReason, SETPOINT_EPSILON, decide};
pub use override_window::OverrideTracker;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tokio::sync::watch;

use crate::adapter::controlmyspa::ControlMySpaClient;
use crate::adapter::porssari::{PorssariClient, ScheduleHour};
use crate::core::error::{ControlError, Result};
use crate::core::{DeviceSnapshot, PriceInstruction};
use crate::settings::ControlSettings;

/// Latest snapshot and decision, published for the status page. Replaced as a
/// whole on every successful tick, readers never see partial state.
#[derive(Debug, Clone, Serialize)]
pub struct ControlStatus {
    pub snapshot: DeviceSnapshot,
    pub price: PriceInstruction,
    pub decision: ControlDecision,
    pub override_until: Option<DateTime<Utc>>,
    pub schedule: Vec<ScheduleHour>,
    pub updated_at: DateTime<Utc>,
}

/// Periodic driver: polls the price signal and the spa, runs the decision
/// engine and applies the outcome. All I/O happens here, at the boundary.
pub struct ControlRunner {
    poll_interval: std::time::Duration,
    setpoints: ControlledSetpoints,
    tracker: OverrideTracker,
    price_client: PorssariClient,
    spa_client: ControlMySpaClient,
    status_tx: watch::Sender<Option<ControlStatus>>,
}

impl ControlRunner {
    pub fn new(
        settings: &ControlSettings,
        price_client: PorssariClient,
        spa_client: ControlMySpaClient,
        status_tx: watch::Sender<Option<ControlStatus>>,
    ) -> Self {
        let setpoints = ControlledSetpoints {
            low: settings.temp_low.into(),
            high: settings.temp_high.into(),
            manual_override: settings.temp_override.map(Into::into),
        };

        Self {
            poll_interval: std::time::Duration::from_secs(settings.poll_interval_s),
            setpoints,
            tracker: OverrideTracker::new(Utc::now(), Duration::seconds(settings.override_duration_s as i64)),
            price_client,
            spa_client,
            status_tx,
        }
    }

    pub async fn run(mut self) {
        //first tick runs immediately, so control starts right after the
        //first successful fetch
        loop {
            if let Err(e) = self.tick(Utc::now()).await {
                tracing::warn!("Control tick failed, retrying: {:?}", e);
            }

            let delay = tick_delay(self.poll_interval, self.price_client.has_schedule());
            tokio::time::sleep(delay).await;
        }
    }

    async fn tick(&mut self, now: DateTime<Utc>) -> Result<()> {
        let price = self
            .price_client
            .current_instruction(now)
            .await
            .map_err(ControlError::SourceUnavailable)?;

        let snapshot = self
            .spa_client
            .snapshot()
            .await
            .map_err(ControlError::DeviceUnavailable)?;

        let decision = decide(now, price, &snapshot, &self.setpoints, &mut self.tracker);

        tracing::info!(
            "Decision {:?} (price {:?}, reported {:?}, measured {:?})",
            decision,
            price,
            snapshot.reported_setpoint,
            snapshot.measured_temperature
        );

        let applied = self.apply(&decision, &snapshot).await;

        let status = ControlStatus {
            snapshot,
            price,
            decision,
            override_until: self.tracker.active_until(now),
            schedule: self.price_client.schedule_hours(),
            updated_at: now,
        };

        if self.status_tx.send(Some(status)).is_err() {
            tracing::warn!("Status receiver gone, nobody is watching");
        }

        applied
    }

    /// Applies a decision to the device. A failed write leaves all state
    /// untouched, the engine re-derives the write on the next tick.
    async fn apply(&self, decision: &ControlDecision, snapshot: &DeviceSnapshot) -> Result<()> {
        match decision.action {
            Action::Write(target) => self
                .spa_client
                .set_setpoint(target)
                .await
                .map_err(ControlError::WriteFailed),

            //The kill-switch value is applied outside the decision engine: it
            //is not one of the two automation setpoints
            Action::Noop if decision.reason == DecisionReason::OverrideManualKill => {
                let Some(target) = self.setpoints.manual_override else {
                    return Ok(());
                };

                let already_set = snapshot
                    .reported_setpoint
                    .map(|reported| reported.approx_eq(&target, SETPOINT_EPSILON))
                    .unwrap_or(false);

                if already_set {
                    return Ok(());
                }

                self.spa_client
                    .set_setpoint(target)
                    .await
                    .map_err(ControlError::WriteFailed)
            }

            Action::Noop => Ok(()),
        }
    }
}

const BOOTSTRAP_RETRY_INTERVAL: std::time::Duration = std::time::Duration::from_secs(60);

/// Time until the next tick. While no schedule has ever been fetched the spa
/// is completely uncontrolled, so retry well before the normal poll interval.
fn tick_delay(poll_interval: std::time::Duration, has_schedule: bool) -> std::time::Duration {
    if has_schedule {
        poll_interval
    } else {
        BOOTSTRAP_RETRY_INTERVAL.min(poll_interval)
    }
}
