//! Menu registration and host event handling.

use crate::host::Host;
use crate::session::Session;
use crate::snapshot::run_snapshot;
use bitmaps_common::ipc::{HostEvent, MENU_CHANGED_EVENT};
use bitmaps_common::MenuState;
use serde::Serialize;
use std::fmt::Debug;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

/// Pretty JSON for log lines, falling back to the `Debug` form.
pub fn describe<T: Serialize + Debug>(value: &T) -> String {
    match serde_json::to_string_pretty(value) {
        Ok(json) => json,
        Err(e) => {
            error!("Failed to serialize diagnostic payload: {}", e);
            format!("{:?}", value)
        }
    }
}

/// Register the menu item, subscribe to menu events and, if configured,
/// start the first snapshot. Host failures are logged and skipped.
pub async fn initialize<H: Host>(session: &Arc<Session<H>>) -> Option<JoinHandle<()>> {
    let config = session.config();
    info!("Initializing bitmaps plugin with config {}", describe(config));

    let initial = MenuState {
        enabled: true,
        checked: false,
    };
    match session
        .host()
        .add_menu_item(&config.menu_id, &config.menu_label, initial.enabled, initial.checked)
        .await
    {
        Ok(()) => {
            session.set_menu_state(&config.menu_id, initial).await;
            info!("Menu created: {}", config.menu_id);
        }
        Err(e) => error!("Menu creation failed: {}: {}", config.menu_id, e),
    }

    if let Err(e) = session.host().subscribe_event(MENU_CHANGED_EVENT).await {
        error!("Failed to subscribe to {}: {}", MENU_CHANGED_EVENT, e);
    }

    config.snapshot_on_start.then(|| spawn_snapshot(session))
}

/// React to one host event. Returns the snapshot task it started, if any.
///
/// Only clicks on this plugin's own menu start a snapshot. Every click
/// starts one; overlapping requests queue behind each other.
pub async fn handle_event<H: Host>(
    session: &Arc<Session<H>>,
    event: &HostEvent,
) -> Option<JoinHandle<()>> {
    let change = event.menu_change()?;
    if change.name != session.config().menu_id {
        return None;
    }

    let task = spawn_snapshot(session);

    let starting = session.menu_state(&change.name).await;
    info!(
        "Menu event {}, starting state {}",
        describe(event),
        describe(&starting)
    );
    if let Some(mut state) = starting {
        state.enabled = change.enabled.unwrap_or(state.enabled);
        state.checked = change.checked.unwrap_or(state.checked);
        session.set_menu_state(&change.name, state).await;
    }

    Some(task)
}

/// Dispatch host events until the stream closes or `shutdown` resolves.
pub async fn run<H, F>(
    session: Arc<Session<H>>,
    mut events: broadcast::Receiver<HostEvent>,
    shutdown: F,
) where
    H: Host,
    F: Future<Output = ()>,
{
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = &mut shutdown => {
                info!("Shutdown requested, stopping listener");
                break;
            }
            received = events.recv() => match received {
                Ok(event) => {
                    handle_event(&session, &event).await;
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!("Listener lagged, {} host events dropped", skipped);
                }
                Err(RecvError::Closed) => {
                    info!("Host event stream closed");
                    break;
                }
            },
        }
    }
}

fn spawn_snapshot<H: Host>(session: &Arc<Session<H>>) -> JoinHandle<()> {
    let session = session.clone();
    tokio::spawn(async move { run_snapshot(&session, None).await })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PluginConfig;
    use crate::host::fake::FakeHost;
    use std::collections::HashMap;
    use std::time::Duration;

    fn menu_event(name: &str) -> HostEvent {
        HostEvent {
            name: MENU_CHANGED_EVENT.to_string(),
            payload: serde_json::json!({ "generatorMenuChanged": { "name": name, "checked": true } }),
        }
    }

    fn thumbnail_2x1() -> Vec<u8> {
        let mut raw = vec![0u8; 16];
        raw.extend_from_slice(&[10, 20, 30, 40, 50, 60]);
        raw
    }

    fn session_with(host: FakeHost, config: PluginConfig) -> (Arc<Session<FakeHost>>, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.png");
        (
            Arc::new(Session::with_output_path(Arc::new(host), config, path)),
            dir,
        )
    }

    #[tokio::test]
    async fn test_other_menu_is_ignored() {
        let (session, _dir) = session_with(FakeHost::new(), PluginConfig::default());

        assert!(handle_event(&session, &menu_event("layers")).await.is_none());
        assert!(session.host().scripts().is_empty());
    }

    #[tokio::test]
    async fn test_other_event_is_ignored() {
        let (session, _dir) = session_with(FakeHost::new(), PluginConfig::default());
        let event = HostEvent {
            name: "imageChanged".to_string(),
            payload: serde_json::json!({ "id": 7 }),
        };

        assert!(handle_event(&session, &event).await.is_none());
        assert!(session.host().scripts().is_empty());
    }

    #[tokio::test]
    async fn test_own_menu_triggers_snapshot() {
        let host = FakeHost::new().with_thumbnail("2,1", thumbnail_2x1());
        let (session, _dir) = session_with(host, PluginConfig::default());
        session
            .set_menu_state("bitmaps", MenuState { enabled: true, checked: false })
            .await;

        let task = handle_event(&session, &menu_event("bitmaps")).await.unwrap();
        task.await.unwrap();

        assert_eq!(session.host().count("sendDocumentInfoToNetworkClient"), 1);
        assert!(session.output_path().exists());
        assert_eq!(
            session.menu_state("bitmaps").await,
            Some(MenuState { enabled: true, checked: true })
        );
    }

    #[tokio::test]
    async fn test_initialize_registers_and_subscribes() {
        let config = PluginConfig {
            snapshot_on_start: false,
            ..PluginConfig::default()
        };
        let (session, _dir) = session_with(FakeHost::new(), config);

        assert!(initialize(&session).await.is_none());

        assert_eq!(session.host().count("nodeMenuInitialize"), 1);
        assert_eq!(session.host().count("networkEventSubscribe"), 1);
        assert_eq!(
            session.menu_state("bitmaps").await,
            Some(MenuState { enabled: true, checked: false })
        );
    }

    #[tokio::test]
    async fn test_initialize_survives_menu_failure_and_snapshots() {
        let mut host = FakeHost::new().with_thumbnail("2,1", thumbnail_2x1());
        host.fail_menu = true;
        let (session, _dir) = session_with(host, PluginConfig::default());

        let first = initialize(&session).await.unwrap();
        first.await.unwrap();

        assert_eq!(session.menu_state("bitmaps").await, None);
        assert_eq!(session.host().count("networkEventSubscribe"), 1);
        assert!(session.output_path().exists());
    }

    #[tokio::test]
    async fn test_run_dispatches_until_shutdown() {
        let host = FakeHost::new().with_thumbnail("2,1", thumbnail_2x1());
        let (session, _dir) = session_with(host, PluginConfig::default());
        let events = session.host().subscribe();
        let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();

        let listener = tokio::spawn(run(session.clone(), events, async move {
            let _ = stop_rx.await;
        }));

        session.host().emit(menu_event("other"));
        session.host().emit(menu_event("bitmaps"));

        let written = tokio::time::timeout(Duration::from_secs(5), async {
            while !session.output_path().exists() {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await;
        assert!(written.is_ok());

        stop_tx.send(()).unwrap();
        listener.await.unwrap();
        assert_eq!(session.host().count("sendDocumentThumbnailToNetworkClient"), 1);
    }

    #[test]
    fn test_describe_falls_back_to_debug() {
        let mut unserializable = HashMap::new();
        unserializable.insert(vec![1u8], 2u8);
        assert_eq!(describe(&unserializable), "{[1]: 2}");

        assert_eq!(describe(&Some(3)), "3");
    }
}
