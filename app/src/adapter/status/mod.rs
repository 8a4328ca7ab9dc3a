use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError, web};
use derive_more::derive::{Display, Error};
use tokio::sync::watch;

use crate::control::{Action, ControlStatus};
use crate::core::PriceInstruction;
use crate::core::unit::DegreeCelsius;

/// Read-only presentation of the latest control status. Never triggers a
/// decision, only reads the published record.
pub fn new_routes(status_rx: watch::Receiver<Option<ControlStatus>>) -> actix_web::Scope {
    web::scope("")
        .route("/", web::get().to(status_page))
        .route("/api/status", web::get().to(status_json))
        .app_data(web::Data::new(status_rx))
}

type StatusResponse = Result<HttpResponse, StatusApiError>;

#[derive(Debug, Error, Display)]
enum StatusApiError {
    #[display("No control status available yet")]
    NotReady,
}

impl ResponseError for StatusApiError {
    fn status_code(&self) -> StatusCode {
        StatusCode::SERVICE_UNAVAILABLE
    }
}

async fn status_page(status_rx: web::Data<watch::Receiver<Option<ControlStatus>>>) -> StatusResponse {
    let status = latest(&status_rx)?;

    Ok(HttpResponse::Ok()
        .content_type(mime::TEXT_HTML_UTF_8)
        .body(render_status(&status)))
}

async fn status_json(status_rx: web::Data<watch::Receiver<Option<ControlStatus>>>) -> StatusResponse {
    let status = latest(&status_rx)?;

    Ok(HttpResponse::Ok().json(status))
}

fn latest(status_rx: &watch::Receiver<Option<ControlStatus>>) -> Result<ControlStatus, StatusApiError> {
    status_rx.borrow().clone().ok_or(StatusApiError::NotReady)
}

fn render_status(status: &ControlStatus) -> String {
    let decision = match status.decision.action {
        Action::Write(target) => format!("write {}", target),
        Action::Noop => "no change".to_owned(),
    };

    let override_row = match status.override_until {
        Some(until) => format!("<tr><th>Override active until</th><td>{}</td></tr>", until.format("%Y-%m-%d %H:%M UTC")),
        None => String::new(),
    };

    let schedule_rows: String = status
        .schedule
        .iter()
        .map(|entry| {
            let label = match entry.instruction {
                PriceInstruction::Heat => "heat (cheap)",
                PriceInstruction::Idle => "idle (expensive)",
            };
            format!("<tr><td>{:02}:00</td><td>{}</td></tr>", entry.hour, label)
        })
        .collect();

    format!(
        r#"<!DOCTYPE html>
<html>
<head><title>Spa control</title></head>
<body>
<h1>Spa control</h1>
<table>
<tr><th>Price instruction</th><td>{price:?}</td></tr>
<tr><th>Reported setpoint</th><td>{setpoint}</td></tr>
<tr><th>Measured temperature</th><td>{measured}</td></tr>
<tr><th>Last decision</th><td>{decision} ({reason:?})</td></tr>
{override_row}
<tr><th>Updated</th><td>{updated}</td></tr>
</table>
<h2>Schedule</h2>
<table>{schedule_rows}</table>
</body>
</html>
"#,
        price = status.price,
        setpoint = fmt_temperature(status.snapshot.reported_setpoint),
        measured = fmt_temperature(status.snapshot.measured_temperature),
        decision = decision,
        reason = status.decision.reason,
        override_row = override_row,
        updated = status.updated_at.format("%Y-%m-%d %H:%M UTC"),
        schedule_rows = schedule_rows,
    )
}

fn fmt_temperature(value: Option<DegreeCelsius>) -> String {
    match value {
        Some(temperature) => temperature.to_string(),
        None => "n/a".to_owned(),
    }
}
