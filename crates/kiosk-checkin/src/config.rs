//! Shared handle to the latest kiosk configuration.
//!
//! The snapshot is replaced as a whole; readers take an `Arc` to whatever
//! was current when the scan arrived and never observe a half-applied
//! update. `None` means the configuration has not been loaded yet.

use std::sync::Arc;

use kiosk_api::{ApiError, CheckInApi};
use kiosk_core::KioskConfig;
use tokio::sync::watch;
use tracing::{info, warn};

/// Replace-only holder of the current [`KioskConfig`].
///
/// Clones share the same underlying snapshot.
#[derive(Debug, Clone)]
pub struct ConfigHandle {
    tx: Arc<watch::Sender<Option<Arc<KioskConfig>>>>,
}

impl ConfigHandle {
    /// Create an empty handle; scans are rejected until a config is set.
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(None);
        Self { tx: Arc::new(tx) }
    }

    /// Create a handle with a config already loaded.
    pub fn with_config(config: KioskConfig) -> Self {
        let handle = Self::new();
        handle.replace(config);
        handle
    }

    /// The latest snapshot, if any.
    pub fn current(&self) -> Option<Arc<KioskConfig>> {
        self.tx.borrow().clone()
    }

    pub fn is_loaded(&self) -> bool {
        self.tx.borrow().is_some()
    }

    /// Replace the snapshot.
    pub fn replace(&self, config: KioskConfig) {
        self.tx.send_replace(Some(Arc::new(config)));
    }

    /// Drop the snapshot, returning the kiosk to the initializing state.
    pub fn clear(&self) {
        self.tx.send_replace(None);
    }

    /// Watch for replacements.
    pub fn subscribe(&self) -> watch::Receiver<Option<Arc<KioskConfig>>> {
        self.tx.subscribe()
    }

    /// Fetch the config from the API and install it.
    ///
    /// On failure the previous snapshot, if any, stays in place.
    ///
    /// # Errors
    ///
    /// Returns the API error if the config could not be fetched.
    pub async fn load<A: CheckInApi>(&self, api: &A) -> Result<Arc<KioskConfig>, ApiError> {
        match api.fetch_config().await {
            Ok(config) => {
                info!(
                    enabled = config.enabled,
                    auto_print = config.auto_print_enabled,
                    repeat_printing = config.allow_repeat_printing,
                    test_mode = config.print_test_mode,
                    "Kiosk configuration loaded"
                );
                let config = Arc::new(config);
                self.tx.send_replace(Some(Arc::clone(&config)));
                Ok(config)
            }
            Err(e) => {
                warn!("Failed to load kiosk configuration: {}", e);
                Err(e)
            }
        }
    }
}

impl Default for ConfigHandle {
    fn default() -> Self {
        Self::new()
    }
}
