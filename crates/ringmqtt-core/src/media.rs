// ── Media bridge supervisor ──
//
// Keeps the external streaming server (go2rtc) running. Before every
// start the YAML config is regenerated from the current camera list:
// each camera gets a `<id>_live` and a `<id>_event` stream that shell out
// to the helper script. The server is restarted after a fixed delay
// whenever it exits, and whenever the camera list changes.

use std::collections::BTreeMap;
use std::process::{ExitStatus, Stdio};

use secrecy::ExposeSecret;
use serde::Serialize;
use tokio::process::{Child, Command};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::MediaConfig;
use crate::error::CoreError;
use crate::store::write_atomic;

// ── Config file ──────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct ServerConfig {
    streams: BTreeMap<String, String>,
    rtsp: RtspSection,
    api: ApiSection,
}

#[derive(Debug, Serialize)]
struct RtspSection {
    listen: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    password: Option<String>,
}

#[derive(Debug, Serialize)]
struct ApiSection {
    /// Empty disables the HTTP API.
    listen: String,
}

/// Render the streaming server config for a set of cameras.
pub fn render_config(config: &MediaConfig, camera_ids: &[String]) -> Result<String, CoreError> {
    let script = config.script.display();
    let streams = camera_ids
        .iter()
        .flat_map(|id| {
            ["live", "event"].map(|kind| {
                (
                    format!("{id}_{kind}"),
                    format!("exec:{script} {id} {kind} {{output}}"),
                )
            })
        })
        .collect();

    let server = ServerConfig {
        streams,
        rtsp: RtspSection {
            listen: format!(":{}", config.rtsp_port),
            username: config.username.clone(),
            password: config
                .password
                .as_ref()
                .map(|p| p.expose_secret().to_owned()),
        },
        api: ApiSection {
            listen: String::new(),
        },
    };
    serde_yaml::to_string(&server).map_err(|e| CoreError::Media {
        message: format!("failed to render config: {e}"),
    })
}

fn write_config(config: &MediaConfig, camera_ids: &[String]) -> Result<(), CoreError> {
    let yaml = render_config(config, camera_ids)?;
    write_atomic(&config.config_path, yaml.as_bytes()).map_err(|e| CoreError::Media {
        message: format!("failed to write {}: {e}", config.config_path.display()),
    })
}

// ── Supervisor ───────────────────────────────────────────────────────

enum Stop {
    Exited(std::io::Result<ExitStatus>),
    CamerasChanged,
    Cancelled,
}

/// Run the streaming server until cancelled.
///
/// Nothing is started until the camera list is non-empty. Returns
/// immediately when no server binary is configured.
pub async fn run_media_supervisor(
    config: MediaConfig,
    mut cameras: watch::Receiver<Vec<String>>,
    cancel: CancellationToken,
) {
    let Some(binary) = config.binary.clone() else {
        debug!("no media server configured");
        return;
    };

    loop {
        let camera_ids = cameras.borrow_and_update().clone();
        if camera_ids.is_empty() {
            tokio::select! {
                biased;
                () = cancel.cancelled() => return,
                changed = cameras.changed() => {
                    if changed.is_err() {
                        return;
                    }
                    continue;
                }
            }
        }

        let mut child = match start_server(&binary, &config, &camera_ids) {
            Ok(child) => child,
            Err(e) => {
                warn!(error = %e, "media server failed to start");
                if !restart_delay(&config, &cancel).await {
                    return;
                }
                continue;
            }
        };

        let stop = tokio::select! {
            biased;
            () = cancel.cancelled() => Stop::Cancelled,
            status = child.wait() => Stop::Exited(status),
            changed = cameras.changed() => {
                if changed.is_err() { Stop::Cancelled } else { Stop::CamerasChanged }
            }
        };

        match stop {
            Stop::Exited(status) => {
                match status {
                    Ok(status) => warn!(%status, "media server exited"),
                    Err(e) => warn!(error = %e, "media server wait failed"),
                }
                if !restart_delay(&config, &cancel).await {
                    return;
                }
            }
            Stop::CamerasChanged => {
                info!("camera list changed, restarting media server");
                stop_server(&mut child, &config).await;
            }
            Stop::Cancelled => {
                stop_server(&mut child, &config).await;
                return;
            }
        }
    }
}

fn start_server(
    binary: &std::path::Path,
    config: &MediaConfig,
    camera_ids: &[String],
) -> Result<Child, CoreError> {
    write_config(config, camera_ids)?;
    let child = Command::new(binary)
        .arg("-config")
        .arg(&config.config_path)
        .stdin(Stdio::null())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| CoreError::Media {
            message: format!("spawn {}: {e}", binary.display()),
        })?;
    info!(
        binary = %binary.display(),
        pid = child.id(),
        cameras = camera_ids.len(),
        "media server started"
    );
    Ok(child)
}

async fn stop_server(child: &mut Child, config: &MediaConfig) {
    if let Err(e) = child.start_kill() {
        debug!(error = %e, "media server already gone");
    }
    match tokio::time::timeout(config.stop_timeout, child.wait()).await {
        Ok(_) => debug!("media server stopped"),
        Err(_) => warn!(
            timeout_secs = config.stop_timeout.as_secs(),
            "media server did not exit in time"
        ),
    }
}

/// Sleep the fixed restart delay. Returns `false` if cancelled meanwhile.
async fn restart_delay(config: &MediaConfig, cancel: &CancellationToken) -> bool {
    tokio::select! {
        biased;
        () = cancel.cancelled() => false,
        () = tokio::time::sleep(config.restart_delay) => true,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::path::PathBuf;
    use std::time::Duration;

    use secrecy::SecretString;

    use super::*;

    fn media_config(dir: &std::path::Path, binary: Option<PathBuf>) -> MediaConfig {
        MediaConfig {
            binary,
            config_path: dir.join("go2rtc.yaml"),
            script: PathBuf::from("/app/stream.sh"),
            rtsp_port: 8554,
            username: None,
            password: None,
            restart_delay: Duration::from_millis(50),
            stop_timeout: Duration::from_secs(2),
        }
    }

    #[test]
    fn renders_two_streams_per_camera() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = media_config(dir.path(), None);
        config.username = Some("viewer".into());
        config.password = Some(SecretString::from("hunter2"));

        let yaml = render_config(&config, &["123".into()]).unwrap();
        let doc: serde_yaml::Value = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(
            doc["streams"]["123_live"].as_str(),
            Some("exec:/app/stream.sh 123 live {output}")
        );
        assert_eq!(
            doc["streams"]["123_event"].as_str(),
            Some("exec:/app/stream.sh 123 event {output}")
        );
        assert_eq!(doc["rtsp"]["listen"].as_str(), Some(":8554"));
        assert_eq!(doc["rtsp"]["username"].as_str(), Some("viewer"));
        assert_eq!(doc["api"]["listen"].as_str(), Some(""));
    }

    #[test]
    fn credentials_are_omitted_when_unset() {
        let dir = tempfile::tempdir().unwrap();
        let yaml = render_config(&media_config(dir.path(), None), &[]).unwrap();
        assert!(!yaml.contains("username"));
        assert!(!yaml.contains("password"));
    }

    #[tokio::test]
    async fn no_binary_returns_immediately() {
        let dir = tempfile::tempdir().unwrap();
        let (_tx, rx) = watch::channel(vec!["1".to_owned()]);
        run_media_supervisor(media_config(dir.path(), None), rx, CancellationToken::new()).await;
        assert!(!dir.path().join("go2rtc.yaml").exists());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn long_running_server_is_stopped_on_cancel() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("server.sh");
        std::fs::write(&script, "#!/bin/sh\nexec sleep 30\n").unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

        let config = media_config(dir.path(), Some(script));
        let config_path = config.config_path.clone();
        let (_tx, rx) = watch::channel(vec!["42".to_owned()]);
        let cancel = CancellationToken::new();
        let task = tokio::spawn(run_media_supervisor(config, rx, cancel.clone()));

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(std::fs::read_to_string(&config_path).unwrap().contains("42_live"));

        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(5), task)
            .await
            .unwrap()
            .unwrap();
    }
}
