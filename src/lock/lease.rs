use std::sync::Arc;

use tracing::warn;

use crate::LockInfo;
use crate::LockManager;
use crate::Result;

/// Guard over an acquired lease
///
/// Call [`release`](Self::release) on every normal exit path. If the guard is
/// dropped unreleased (for instance because the owning future was cancelled
/// by a timeout), a release is spawned on the current tokio runtime.
#[derive(Debug)]
pub struct LockLease {
    info: LockInfo,
    manager: Arc<LockManager>,
    released: bool,
}

impl LockLease {
    pub(crate) fn new(
        info: LockInfo,
        manager: Arc<LockManager>,
    ) -> Self {
        Self {
            info,
            manager,
            released: false,
        }
    }

    pub fn info(&self) -> &LockInfo {
        &self.info
    }

    pub async fn release(mut self) -> Result<()> {
        self.released = true;
        self.manager.release_lock(&self.info).await
    }
}

impl Drop for LockLease {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            warn!(game_id = %self.info.game_id, "no runtime to release dropped lease; left to TTL");
            return;
        };
        let manager = self.manager.clone();
        let info = self.info.clone();
        handle.spawn(async move {
            if let Err(e) = manager.release_lock(&info).await {
                warn!(game_id = %info.game_id, "failed to release dropped lease: {:?}", e);
            }
        });
    }
}
