use settings::Settings;
use tokio::sync::watch;

use crate::control::ControlRunner;

mod adapter;
mod control;
mod core;
mod settings;

#[tokio::main(flavor = "multi_thread")]
pub async fn main() {
    let settings = Settings::new().expect("Error reading configuration");

    settings.monitoring.init().expect("Error initializing monitoring");

    let price_client =
        adapter::porssari::PorssariClient::new(&settings.porssari).expect("Error initializing price-signal client");
    let spa_client = adapter::controlmyspa::ControlMySpaClient::new(&settings.controlmyspa)
        .expect("Error initializing spa client");

    let (status_tx, status_rx) = watch::channel(None);

    let control_runner = ControlRunner::new(&settings.control, price_client, spa_client, status_tx);

    let http_server_exec = {
        let http_server = settings.http_server.clone();

        async move {
            http_server
                .run_server(move || adapter::status::new_routes(status_rx.clone()))
                .await
                .expect("HTTP server execution failed");
        }
    };

    tracing::info!("Starting control loop");

    tokio::select!(
        _ = control_runner.run() => {},
        _ = http_server_exec => {},
    );
}
