//! Per-connection plugin state.
//!
//! One `Session` owns everything the plugin remembers between events: the
//! host handle, configuration, the active document and the menu table.

use crate::config::PluginConfig;
use crate::host::Host;
use bitmaps_common::MenuState;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex, MutexGuard, RwLock};
use tracing::info;

pub struct Session<H: Host> {
    host: Arc<H>,
    config: PluginConfig,
    output_path: PathBuf,
    current_document_id: RwLock<Option<u32>>,
    menu_states: RwLock<HashMap<String, MenuState>>,
    /// Held for the whole of a snapshot so only one is in flight.
    snapshot_gate: Mutex<()>,
    request_counter: AtomicU64,
}

impl<H: Host> Session<H> {
    /// Create a session writing to the configured output path.
    pub fn new(host: Arc<H>, config: PluginConfig) -> Self {
        let output_path = config.resolve_output_path();
        Self::with_output_path(host, config, output_path)
    }

    /// Create a session writing to an explicit output path.
    pub fn with_output_path(host: Arc<H>, config: PluginConfig, output_path: PathBuf) -> Self {
        Self {
            host,
            config,
            output_path,
            current_document_id: RwLock::new(None),
            menu_states: RwLock::new(HashMap::new()),
            snapshot_gate: Mutex::new(()),
            request_counter: AtomicU64::new(0),
        }
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    pub fn config(&self) -> &PluginConfig {
        &self.config
    }

    pub fn output_path(&self) -> &PathBuf {
        &self.output_path
    }

    pub async fn current_document_id(&self) -> Option<u32> {
        *self.current_document_id.read().await
    }

    /// Record the active document, logging when it changes.
    pub async fn set_current_document_id(&self, id: u32) {
        let mut current = self.current_document_id.write().await;
        if *current == Some(id) {
            return;
        }
        info!("Current document ID: {}", id);
        *current = Some(id);
    }

    pub async fn menu_state(&self, name: &str) -> Option<MenuState> {
        self.menu_states.read().await.get(name).copied()
    }

    pub async fn set_menu_state(&self, name: &str, state: MenuState) {
        self.menu_states
            .write()
            .await
            .insert(name.to_string(), state);
    }

    /// Id used to tag the log lines of one snapshot request.
    pub fn next_request_id(&self) -> u64 {
        self.request_counter.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Wait until no other snapshot is in flight.
    pub async fn begin_snapshot(&self) -> MutexGuard<'_, ()> {
        self.snapshot_gate.lock().await
    }
}
