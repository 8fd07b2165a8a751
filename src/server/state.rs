use std::sync::Arc;

use tokio::sync::watch;

use crate::bootstrap::Phase;
use crate::context::AppContext;

/// Shared state for the operational route handlers.
pub(super) struct OpsState<H> {
    pub(super) probe: Arc<H>,
    pub(super) context: AppContext,
    pub(super) phase: watch::Receiver<Phase>,
}

// Manual Clone: avoid derive adding an `H: Clone` bound.
impl<H> Clone for OpsState<H> {
    fn clone(&self) -> Self {
        Self {
            probe: self.probe.clone(),
            context: self.context.clone(),
            phase: self.phase.clone(),
        }
    }
}
