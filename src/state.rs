use std::sync::Arc;

use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use crate::config::AppConfig;
use crate::services::engine::BackupReconciliationEngine;
use crate::services::lifecycle::LifecycleManager;

pub struct AppState {
    pub config: AppConfig,
    pub lifecycle: Arc<LifecycleManager>,
    pub engine: BackupReconciliationEngine,
    /// Lifecycle and backup operations mutate the same live directory and
    /// container pair, so only one may run at a time.
    pub ops: Mutex<()>,
    pub cancel: CancellationToken,
}

impl AppState {
    pub fn new(
        config: AppConfig,
        lifecycle: Arc<LifecycleManager>,
        engine: BackupReconciliationEngine,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            config,
            lifecycle,
            engine,
            ops: Mutex::new(()),
            cancel,
        }
    }
}
