use std::sync::Arc;

use common_audit::AuditWriter;

use crate::cache::TtlCache;
use crate::config::OriginConfig;
use crate::ip_limit::IpRateLimiter;
use crate::llm::LlmClient;
use crate::metrics::OriginMetrics;
use crate::store::PhraseStore;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<PhraseStore>,
    pub cache: Arc<TtlCache>,
    pub llm: Option<Arc<dyn LlmClient>>,
    pub audit: Arc<AuditWriter>,
    pub metrics: Arc<OriginMetrics>,
    pub config: Arc<OriginConfig>,
    pub ip_limiter: Arc<IpRateLimiter>,
}
