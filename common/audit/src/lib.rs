pub mod model;
pub mod verify;
pub mod writer;

pub use model::{AuditError, AuditKind, AuditRecord, AuditResult, AuditSeverity};
pub use verify::verify_segment;
pub use writer::AuditWriter;
