//! Desk panels service
//!
//! Keeps user accounts, login sessions, and the panels every user had open on their desk.

use std::io::read_to_string;

use actix_web::{App, HttpServer};
use clap::Parser;
use color_eyre::Result;
use tracing::{debug, info, warn};
use tracing_actix_web::TracingLogger;

use crate::config::{Config, LogFormat};
use crate::model::Model;
use crate::opt::Opt;

mod config;
mod model;
mod opt;
mod service;

/// Initializes tracing collection
fn setup_tracing(config: config::Logging) {
    use tracing_error::ErrorLayer;
    use tracing_subscriber::prelude::*;
    use tracing_subscriber::{EnvFilter, fmt};

    let fmt_layer = match config.format {
        LogFormat::Pretty => fmt::layer().pretty().boxed(),
        LogFormat::Compact => fmt::layer().compact().boxed(),
    };

    let filter_layer = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let filter_layer = config
        .filters
        .into_iter()
        .fold(filter_layer, |layer, filter| layer.add_directive(filter));

    tracing_subscriber::registry()
        .with(filter_layer)
        .with(fmt_layer)
        .with(ErrorLayer::default())
        .init();
}

/// Periodically removes expired sessions
fn spawn_cleanup(model: Model, config: &Config) {
    let mut interval = tokio::time::interval(config.cleanup_interval());

    tokio::spawn(async move {
        loop {
            interval.tick().await;
            match model.cleanup().await {
                Ok(0) => (),
                Ok(removed) => debug!(removed, "Expired sessions removed"),
                Err(err) => warn!(error = ?err, "Sessions cleanup failed"),
            }
        }
    });
}

#[tokio::main]
async fn main() -> Result<()> {
    let Opt {
        config: mut config_file,
    } = Opt::parse();

    let config = read_to_string(&mut config_file)?;
    let config: Config = toml::from_str(&config)?;

    setup_tracing(config.logging.clone());
    color_eyre::install()?;

    info!(
        config = ?config_file.path().path(),
        "Tracing initialized, setting up a service"
    );

    let model = Model::with_config(config.db.clone()).await?;
    spawn_cleanup(model.clone(), &config);

    let settings = service::Settings {
        auth: config.auth.clone(),
        panels: config.panels.clone(),
    };
    let service_config = service::configure(settings, model);
    HttpServer::new(move || {
        App::new()
            .wrap(TracingLogger::default())
            .configure(service_config.clone())
    })
    .bind(config.host)?
    .run()
    .await?;

    info!("Service stopped, tearing down");
    Ok(())
}
