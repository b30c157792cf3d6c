use crate::model::{AuditError, AuditKind, AuditRecord, AuditRecordContent, AuditResult, AuditSeverity};
use chrono::Utc;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

const GENESIS_CONTEXT: &[u8] = b"dhkalign-audit-genesis";

fn genesis_mac(secret: &[u8]) -> String {
    common_crypto::hmac_sha256_hex(secret, GENESIS_CONTEXT).expect("hmac with non-empty secret")
}

fn record_mac(secret: &[u8], prev_mac: &str, content: &AuditRecordContent<'_>) -> AuditResult<String> {
    let body = serde_json::to_vec(content)?;
    let mut message = Vec::with_capacity(prev_mac.len() + body.len());
    message.extend_from_slice(prev_mac.as_bytes());
    message.extend_from_slice(&body);
    common_crypto::hmac_sha256_hex(secret, &message).map_err(|_| AuditError::Mac)
}

/// Append-only writer for one audit segment. Holds the chain's running MAC
/// and a single open file handle; `append` takes a short, non-async lock
/// around the write + fsync, matching the "no long-held locks" discipline
/// used for the origin TTL cache.
pub struct AuditWriter {
    secret: Vec<u8>,
    path: PathBuf,
    max_segment_bytes: u64,
    inner: Mutex<WriterState>,
}

struct WriterState {
    file: BufWriter<File>,
    last_mac: String,
    bytes_written: u64,
}

impl AuditWriter {
    /// Open (or create) the audit log at `path`. If the file already has
    /// records, the running MAC is recovered by replaying the chain so that
    /// new appends continue it correctly.
    pub fn open(path: impl AsRef<Path>, secret: impl Into<Vec<u8>>, max_segment_bytes: u64) -> AuditResult<Self> {
        let path = path.as_ref().to_path_buf();
        let secret = secret.into();

        let last_mac = if path.exists() {
            match crate::verify::last_mac_of(&path, &secret)? {
                Some(mac) => mac,
                None => genesis_mac(&secret),
            }
        } else {
            genesis_mac(&secret)
        };

        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        let bytes_written = file.metadata()?.len();

        Ok(Self {
            secret,
            path,
            max_segment_bytes,
            inner: Mutex::new(WriterState {
                file: BufWriter::new(file),
                last_mac,
                bytes_written,
            }),
        })
    }

    /// Append a new audit record, chaining its MAC onto the previous one.
    pub fn append(
        &self,
        kind: AuditKind,
        severity: AuditSeverity,
        ip: Option<String>,
        route: Option<String>,
        fields: serde_json::Value,
    ) -> AuditResult<()> {
        let ts = Utc::now();
        let content = AuditRecordContent {
            ts,
            kind,
            severity,
            ip: &ip,
            route: &route,
            fields: &fields,
        };

        let mut state = self.inner.lock().expect("audit writer lock poisoned");
        let mac = record_mac(&self.secret, &state.last_mac, &content)?;
        let record = AuditRecord {
            ts,
            kind,
            severity,
            ip,
            route,
            fields,
            mac: mac.clone(),
        };
        let mut line = serde_json::to_vec(&record)?;
        line.push(b'\n');
        state.file.write_all(&line)?;
        state.file.flush()?;
        state.bytes_written += line.len() as u64;
        state.last_mac = mac;

        if state.bytes_written >= self.max_segment_bytes {
            self.rotate(&mut state)?;
        }
        Ok(())
    }

    fn rotate(&self, state: &mut WriterState) -> AuditResult<()> {
        state.file.flush()?;
        let rotated = self.path.with_extension(format!("{}.jsonl", Utc::now().timestamp()));
        std::fs::rename(&self.path, &rotated)?;
        tracing::info!(from = %self.path.display(), to = %rotated.display(), "rotated audit segment");
        let file = OpenOptions::new().create(true).append(true).open(&self.path)?;
        state.file = BufWriter::new(file);
        state.bytes_written = 0;
        state.last_mac = genesis_mac(&self.secret);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::verify::verify_segment;

    #[test]
    fn append_then_verify_succeeds() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audit.jsonl");
        let writer = AuditWriter::open(&path, b"secret".to_vec(), 64 * 1024 * 1024).unwrap();
        writer
            .append(AuditKind::AuthFail, AuditSeverity::Security, Some("1.2.3.4".into()), Some("/translate/pro".into()), serde_json::json!({}))
            .unwrap();
        writer
            .append(AuditKind::KeyMinted, AuditSeverity::Info, None, Some("/webhook/stripe".into()), serde_json::json!({"plan":"pro"}))
            .unwrap();
        verify_segment(&path, b"secret").unwrap();
    }

    #[test]
    fn reopening_continues_the_chain() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audit.jsonl");
        {
            let writer = AuditWriter::open(&path, b"secret".to_vec(), 64 * 1024 * 1024).unwrap();
            writer
                .append(AuditKind::AdminAction, AuditSeverity::Info, None, Some("/admin/keys/add".into()), serde_json::json!({}))
                .unwrap();
        }
        {
            let writer = AuditWriter::open(&path, b"secret".to_vec(), 64 * 1024 * 1024).unwrap();
            writer
                .append(AuditKind::AdminAction, AuditSeverity::Info, None, Some("/admin/keys/del".into()), serde_json::json!({}))
                .unwrap();
        }
        verify_segment(&path, b"secret").unwrap();
    }
}
