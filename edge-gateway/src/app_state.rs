use std::sync::Arc;

use common_audit::AuditWriter;

use crate::cache::EdgeCache;
use crate::config::EdgeConfig;
use crate::keystore::KeyStore;
use crate::metrics::EdgeMetrics;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<EdgeConfig>,
    pub keys: Arc<dyn KeyStore>,
    pub cache: Arc<dyn EdgeCache>,
    pub audit: Arc<AuditWriter>,
    pub metrics: Arc<EdgeMetrics>,
    pub origin_client: reqwest::Client,
}
