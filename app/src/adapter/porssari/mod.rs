use std::collections::HashMap;

use anyhow::Context;
use chrono::{DateTime, Duration, Timelike, Utc};
use infrastructure::HttpClientConfig;
use reqwest_middleware::ClientWithMiddleware;
use serde::{Deserialize, Serialize};

use crate::core::PriceInstruction;

const REQUEST_TIMEOUT_S: u64 = 10;

#[derive(Debug, Clone, Deserialize)]
pub struct PorssariConfig {
    pub base_url: String,
    pub device_mac: String,
    #[serde(default = "default_client_id")]
    pub client_id: String,
}

fn default_client_id() -> String {
    "controlmyspa-porssari-1".to_owned()
}

/// Client for the porssari.fi control API. The last good schedule is kept in
/// memory so the spa stays controlled through a temporary outage of the
/// price service.
pub struct PorssariClient {
    client: ClientWithMiddleware,
    config: PorssariConfig,
    last_schedule: Option<ControlSchedule>,
}

impl PorssariClient {
    pub fn new(config: &PorssariConfig) -> anyhow::Result<Self> {
        let client = HttpClientConfig::new(None, REQUEST_TIMEOUT_S).new_tracing_client()?;

        Ok(Self {
            client,
            config: config.clone(),
            last_schedule: None,
        })
    }

    pub async fn current_instruction(&mut self, now: DateTime<Utc>) -> anyhow::Result<PriceInstruction> {
        match self.fetch_controls().await {
            Ok(schedule) => {
                tracing::debug!(
                    "Got price schedule covering {} hours (server timestamp {})",
                    schedule.metadata.hours_count,
                    schedule.metadata.timestamp
                );
                self.last_schedule = Some(schedule);
            }
            Err(e) => {
                if self.last_schedule.is_none() {
                    return Err(e);
                }
                tracing::warn!("Price schedule fetch failed, using cached schedule: {:?}", e);
            }
        }

        match &self.last_schedule {
            Some(schedule) => Ok(schedule.instruction_at(now)),
            None => anyhow::bail!("no price schedule available"),
        }
    }

    /// False until the first schedule has been fetched successfully.
    pub fn has_schedule(&self) -> bool {
        self.last_schedule.is_some()
    }

    pub fn schedule_hours(&self) -> Vec<ScheduleHour> {
        self.last_schedule.as_ref().map(ControlSchedule::hours).unwrap_or_default()
    }

    async fn fetch_controls(&self) -> anyhow::Result<ControlSchedule> {
        let response = self
            .client
            .get(format!("{}/getcontrols.php", self.config.base_url))
            .query(&[
                ("device_mac", self.config.device_mac.as_str()),
                ("client", self.config.client_id.as_str()),
            ])
            .send()
            .await?
            .error_for_status()?;

        response.json().await.context("Error parsing control schedule")
    }
}

/// One fetched schedule: per local hour of the covered day(s), "1" means
/// cheap electricity (heat), "0" means expensive (idle).
#[derive(Debug, Clone, Deserialize)]
pub struct ControlSchedule {
    #[serde(rename = "Metadata")]
    metadata: ScheduleMetadata,
    #[serde(rename = "Channel1")]
    channel: HashMap<String, String>,
}

#[derive(Debug, Clone, Deserialize)]
struct ScheduleMetadata {
    #[serde(rename = "Timestamp")]
    timestamp: String,
    #[serde(rename = "Timestamp_offset")]
    timestamp_offset: String,
    #[serde(rename = "Hours_count")]
    hours_count: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ScheduleHour {
    pub hour: u32,
    pub instruction: PriceInstruction,
}

impl ControlSchedule {
    /// Instruction for the local hour at `now`. Hours are keyed in the
    /// schedule's local time, derived from the metadata UTC offset. A missing
    /// hour defaults to idle.
    pub fn instruction_at(&self, now: DateTime<Utc>) -> PriceInstruction {
        let offset_s = match self.metadata.timestamp_offset.parse::<i64>() {
            Ok(offset) => offset,
            Err(_) => {
                tracing::warn!("Unparseable schedule offset {:?}, assuming UTC", self.metadata.timestamp_offset);
                0
            }
        };

        let local_hour = (now + Duration::seconds(offset_s)).hour();

        match self.channel.get(&local_hour.to_string()).map(String::as_str) {
            Some("0") | None => PriceInstruction::Idle,
            Some(_) => PriceInstruction::Heat,
        }
    }

    pub fn hours(&self) -> Vec<ScheduleHour> {
        let mut hours: Vec<ScheduleHour> = self
            .channel
            .iter()
            .filter_map(|(hour, command)| {
                let hour = hour.parse().ok()?;
                let instruction = if command == "0" {
                    PriceInstruction::Idle
                } else {
                    PriceInstruction::Heat
                };
                Some(ScheduleHour { hour, instruction })
            })
            .collect();

        hours.sort_by_key(|h| h.hour);
        hours
    }
}
