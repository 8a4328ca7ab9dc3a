use anyhow::Context;
use infrastructure::HttpClientConfig;
use reqwest_middleware::ClientWithMiddleware;
use serde::{Deserialize, Serialize};

use crate::core::DeviceSnapshot;
use crate::core::unit::DegreeCelsius;

const REQUEST_TIMEOUT_S: u64 = 10;

#[derive(Debug, Clone, Deserialize)]
pub struct ControlMySpaConfig {
    pub base_url: String,
    pub username: String,
    pub password: String,
}

/// Client for the ControlMySpa cloud API. Sessions are short-lived, so every
/// operation performs its own login, like the vendor app does.
pub struct ControlMySpaClient {
    client: ClientWithMiddleware,
    config: ControlMySpaConfig,
}

#[derive(Debug, Serialize)]
struct LoginRequest<'a> {
    email: &'a str,
    password: &'a str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Session {
    access_token: String,
    spa_id: String,
}

#[derive(Debug, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SpaState {
    desired_temp: Option<f64>,
    current_temp: Option<f64>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SetTemperatureRequest {
    desired_temp: f64,
}

impl ControlMySpaClient {
    pub fn new(config: &ControlMySpaConfig) -> anyhow::Result<Self> {
        let client = HttpClientConfig::new(None, REQUEST_TIMEOUT_S).new_tracing_client()?;

        Ok(Self {
            client,
            config: config.clone(),
        })
    }

    pub async fn snapshot(&self) -> anyhow::Result<DeviceSnapshot> {
        let session = self.login().await?;

        let response = self
            .client
            .get(format!("{}/spas/{}/status", self.config.base_url, session.spa_id))
            .bearer_auth(&session.access_token)
            .send()
            .await?
            .error_for_status()?;

        let state: SpaState = response.json().await.context("Error parsing spa state")?;

        tracing::info!("current temp: {:?}, desired temp: {:?}", state.current_temp, state.desired_temp);

        Ok(DeviceSnapshot {
            reported_setpoint: state.desired_temp.map(DegreeCelsius),
            measured_temperature: state.current_temp.map(DegreeCelsius),
        })
    }

    #[tracing::instrument(skip(self))]
    pub async fn set_setpoint(&self, target: DegreeCelsius) -> anyhow::Result<()> {
        let session = self.login().await?;

        self.client
            .post(format!("{}/spas/{}/temperature", self.config.base_url, session.spa_id))
            .bearer_auth(&session.access_token)
            .json(&SetTemperatureRequest {
                desired_temp: target.into(),
            })
            .send()
            .await?
            .error_for_status()
            .context("Error setting desired temperature")?;

        tracing::info!("set desired temp {}", target);

        Ok(())
    }

    async fn login(&self) -> anyhow::Result<Session> {
        let response = self
            .client
            .post(format!("{}/auth/login", self.config.base_url))
            .json(&LoginRequest {
                email: &self.config.username,
                password: &self.config.password,
            })
            .send()
            .await?
            .error_for_status()
            .context("ControlMySpa login rejected")?;

        response.json().await.context("Error parsing login response")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_json_diff::assert_json_eq;
    use serde_json::json;

    #[test]
    fn set_temperature_payload() {
        let request = SetTemperatureRequest { desired_temp: 37.0 };

        assert_json_eq!(serde_json::to_value(&request).unwrap(), json!({"desiredTemp": 37.0}));
    }

    #[test]
    fn login_payload() {
        let request = LoginRequest {
            email: "owner@example.com",
            password: "secret",
        };

        assert_json_eq!(
            serde_json::to_value(&request).unwrap(),
            json!({"email": "owner@example.com", "password": "secret"})
        );
    }

    #[test]
    fn spa_state_ignores_unknown_fields() {
        let state: SpaState = serde_json::from_str(
            r#"{"desiredTemp": 36.5, "currentTemp": 35.0, "panelLock": false, "heaterMode": "READY"}"#,
        )
        .unwrap();

        assert_eq!(
            state,
            SpaState {
                desired_temp: Some(36.5),
                current_temp: Some(35.0)
            }
        );
    }

    #[test]
    fn spa_state_with_unavailable_temperatures() {
        let state: SpaState = serde_json::from_str(r#"{}"#).unwrap();

        assert_eq!(state.desired_temp, None);
        assert_eq!(state.current_temp, None);
    }
}
