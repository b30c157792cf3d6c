use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Event kinds the system records. No request content is ever carried --
/// only the kind, route, caller IP and small identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditKind {
    BadRequest,
    AuthFail,
    RateLimited,
    CorsBlock,
    TempBanStart,
    TempBanEnd,
    AdminAction,
    WebhookReplay,
    WebhookBadSig,
    KeyMinted,
    KeyRevoked,
    FallbackCall,
    FallbackFail,
}

impl AuditKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditKind::BadRequest => "bad_request",
            AuditKind::AuthFail => "auth_fail",
            AuditKind::RateLimited => "rate_limited",
            AuditKind::CorsBlock => "cors_block",
            AuditKind::TempBanStart => "temp_ban_start",
            AuditKind::TempBanEnd => "temp_ban_end",
            AuditKind::AdminAction => "admin_action",
            AuditKind::WebhookReplay => "webhook_replay",
            AuditKind::WebhookBadSig => "webhook_bad_sig",
            AuditKind::KeyMinted => "key_minted",
            AuditKind::KeyRevoked => "key_revoked",
            AuditKind::FallbackCall => "fallback_call",
            AuditKind::FallbackFail => "fallback_fail",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditSeverity {
    Info,
    Warn,
    Security,
}

/// A single audit record as it appears on disk, one JSON object per line.
/// `mac` covers every other field and the previous record's `mac`, forming
/// the tamper-evident chain described in the audit log design.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditRecord {
    pub ts: DateTime<Utc>,
    pub kind: AuditKind,
    pub severity: AuditSeverity,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ip: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub route: Option<String>,
    #[serde(default)]
    pub fields: serde_json::Value,
    pub mac: String,
}

/// The subset of a record's content that feeds the MAC -- everything
/// except the `mac` field itself.
#[derive(Debug, Clone, Serialize)]
pub(crate) struct AuditRecordContent<'a> {
    pub ts: DateTime<Utc>,
    pub kind: AuditKind,
    pub severity: AuditSeverity,
    pub ip: &'a Option<String>,
    pub route: &'a Option<String>,
    pub fields: &'a serde_json::Value,
}

#[derive(Debug, Error)]
pub enum AuditError {
    #[error("audit io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("audit serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("audit mac error")]
    Mac,
    #[error("audit chain broken at record {index} (line {line})")]
    ChainBroken { index: u64, line: u64 },
    #[error("audit record at line {line} is not valid JSON: {source}")]
    MalformedRecord { line: u64, source: serde_json::Error },
}

pub type AuditResult<T> = Result<T, AuditError>;
