use crate::model::{AuditError, AuditRecord, AuditRecordContent, AuditResult};
use std::fs;
use std::io::{BufRead, BufReader};
use std::path::Path;

fn genesis_mac(secret: &[u8]) -> String {
    common_crypto::hmac_sha256_hex(secret, b"dhkalign-audit-genesis").expect("hmac with non-empty secret")
}

/// Replay the MAC chain for a segment from the start, returning an error at
/// the first record whose MAC does not match the expected chain value --
/// this is what lets a verifier detect insertion, deletion or reordering of
/// any record.
pub fn verify_segment(path: impl AsRef<Path>, secret: &[u8]) -> AuditResult<u64> {
    let file = fs::File::open(path)?;
    let reader = BufReader::new(file);
    let mut prev_mac = genesis_mac(secret);
    let mut index = 0u64;

    for (line_no, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let record: AuditRecord = serde_json::from_str(&line).map_err(|source| AuditError::MalformedRecord {
            line: line_no as u64,
            source,
        })?;
        let content = AuditRecordContent {
            ts: record.ts,
            kind: record.kind,
            severity: record.severity,
            ip: &record.ip,
            route: &record.route,
            fields: &record.fields,
        };
        let body = serde_json::to_vec(&content)?;
        let mut message = Vec::with_capacity(prev_mac.len() + body.len());
        message.extend_from_slice(prev_mac.as_bytes());
        message.extend_from_slice(&body);
        let expected = common_crypto::hmac_sha256_hex(secret, &message).map_err(|_| AuditError::Mac)?;
        if !common_crypto::constant_time_eq_str(&expected, &record.mac) {
            return Err(AuditError::ChainBroken { index, line: line_no as u64 });
        }
        prev_mac = record.mac;
        index += 1;
    }
    Ok(index)
}

/// Return the last valid MAC in a segment, or `None` if the segment is
/// empty. Used by [`crate::AuditWriter::open`] to resume an existing chain.
pub(crate) fn last_mac_of(path: impl AsRef<Path>, secret: &[u8]) -> AuditResult<Option<String>> {
    let file = fs::File::open(path)?;
    let reader = BufReader::new(file);
    let mut last = None;
    for line in reader.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let record: AuditRecord = serde_json::from_str(&line)?;
        last = Some(record.mac);
    }
    let _ = secret;
    Ok(last)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{AuditKind, AuditSeverity};
    use crate::writer::AuditWriter;

    #[test]
    fn tampering_with_a_field_breaks_the_chain() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audit.jsonl");
        let writer = AuditWriter::open(&path, b"secret".to_vec(), 64 * 1024 * 1024).unwrap();
        writer
            .append(AuditKind::AuthFail, AuditSeverity::Security, Some("1.2.3.4".into()), None, serde_json::json!({}))
            .unwrap();
        writer
            .append(AuditKind::RateLimited, AuditSeverity::Warn, Some("1.2.3.4".into()), None, serde_json::json!({}))
            .unwrap();
        drop(writer);

        let contents = fs::read_to_string(&path).unwrap();
        let tampered = contents.replacen("auth_fail", "rate_limited", 1);
        fs::write(&path, tampered).unwrap();

        let err = verify_segment(&path, b"secret").unwrap_err();
        assert!(matches!(err, AuditError::ChainBroken { index: 0, .. }));
    }

    #[test]
    fn deleting_a_record_breaks_the_chain() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audit.jsonl");
        let writer = AuditWriter::open(&path, b"secret".to_vec(), 64 * 1024 * 1024).unwrap();
        for _ in 0..3 {
            writer
                .append(AuditKind::AdminAction, AuditSeverity::Info, None, None, serde_json::json!({}))
                .unwrap();
        }
        drop(writer);

        let contents = fs::read_to_string(&path).unwrap();
        let mut lines: Vec<&str> = contents.lines().collect();
        lines.remove(1);
        fs::write(&path, lines.join("\n") + "\n").unwrap();

        let err = verify_segment(&path, b"secret").unwrap_err();
        assert!(matches!(err, AuditError::ChainBroken { .. }));
    }

    #[test]
    fn empty_segment_verifies_to_zero_records() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audit.jsonl");
        fs::write(&path, "").unwrap();
        assert_eq!(verify_segment(&path, b"secret").unwrap(), 0);
    }
}
