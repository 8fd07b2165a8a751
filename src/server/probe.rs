use std::future::Future;

use crate::admin::HealthReport;
use crate::backend::BackendClient;
use crate::error::Error;

/// Liveness check against whatever the client core depends on.
pub trait HealthProbe: Send + Sync + 'static {
    fn check(&self) -> impl Future<Output = Result<(), Error>> + Send;
}

impl HealthProbe for BackendClient {
    /// Invokes the `health` function; any status but `ok`/`healthy` fails.
    async fn check(&self) -> Result<(), Error> {
        let report: HealthReport = self.invoke("health", &serde_json::json!({})).await?;
        if report.is_healthy() {
            Ok(())
        } else {
            Err(Error::Backend {
                operation: "health",
                status: None,
                detail: format!("reported status {}", report.status),
            })
        }
    }
}
