//! `ringmqtt run`: wire the bridge together and run until a shutdown signal.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use ringmqtt_api::Endpoints;
use ringmqtt_config::load_config;
use ringmqtt_core::{
    Controller, CoreError, MqttPublisher, RingSession, RingSource, event, run_media_supervisor,
    run_mqtt,
};

use crate::error::CliError;

/// Upper bound on how long the transport may take to flush offline
/// availability after the controller shut down.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

pub async fn handle(config_path: &Path) -> Result<(), CliError> {
    let config = load_config(config_path)?;
    let settings = config.resolve()?;
    info!(
        config = %config_path.display(),
        ring_topic = %settings.bridge.ring_topic,
        "starting ringmqtt"
    );

    let cancel = CancellationToken::new();
    // The transport outlives the rest so shutdown publishes get out.
    let mqtt_cancel = CancellationToken::new();
    let (events, events_rx) = event::channel();

    let session = RingSession::start(
        settings.session,
        Endpoints::default(),
        events.clone(),
        cancel.clone(),
    )?;
    session.spawn_pollers();

    let (publisher, requests) = MqttPublisher::channel();
    let controller = Controller::new(
        settings.bridge.clone(),
        Arc::clone(&session) as Arc<dyn RingSource>,
        publisher,
        events.clone(),
        cancel.clone(),
    );

    let mut mqtt: JoinHandle<Result<(), CoreError>> = tokio::spawn(run_mqtt(
        settings.mqtt,
        requests,
        events,
        settings.bridge.hass_topic.clone(),
        mqtt_cancel.clone(),
    ));
    let media = tokio::spawn(run_media_supervisor(
        settings.media,
        controller.subscribe_cameras(),
        cancel.clone(),
    ));
    let bridge = {
        let controller = controller.clone();
        tokio::spawn(async move { controller.run(events_rx).await })
    };

    let outcome = tokio::select! {
        () = shutdown_signal() => {
            info!("shutdown requested");
            Ok(())
        }
        result = &mut mqtt => match result {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(CliError::from(e)),
            Err(e) => Err(CliError::Bridge(format!("mqtt task panicked: {e}"))),
        },
    };

    controller.shutdown().await;
    cancel.cancel();
    session.shutdown();
    if let Err(e) = bridge.await {
        warn!(error = %e, "controller task ended abnormally");
    }
    if let Err(e) = media.await {
        warn!(error = %e, "media supervisor ended abnormally");
    }

    mqtt_cancel.cancel();
    if !mqtt.is_finished() {
        match tokio::time::timeout(SHUTDOWN_TIMEOUT, &mut mqtt).await {
            Ok(Ok(Err(e))) => error!(error = %e, "mqtt transport failed during shutdown"),
            Ok(_) => {}
            Err(_) => warn!("mqtt transport did not stop in time"),
        }
    }

    info!("ringmqtt stopped");
    outcome
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }
}
