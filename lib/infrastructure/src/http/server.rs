use actix_web::*;
use anyhow::Context as _;
use serde::Deserialize;

#[derive(Debug, Deserialize, Clone)]
pub struct HttpServerConfig {
    pub port: u16,
}

impl HttpServerConfig {
    /// Runs the HTTP server until process shutdown, serving the scope produced
    /// by the given factory.
    pub async fn run_server<F>(&self, scope: F) -> anyhow::Result<()>
    where
        F: Fn() -> Scope + Send + Clone + 'static,
    {
        let http_server = HttpServer::new(move || {
            App::new()
                .wrap(tracing_actix_web::TracingLogger::default())
                .service(scope())
        })
        .workers(1)
        .disable_signals()
        .bind(("0.0.0.0", self.port))?;

        http_server
            .run()
            .await
            .with_context(|| format!("Error starting HTTP server on port {}", self.port))
    }
}
