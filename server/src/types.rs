use shared::MalformedPayload;

/// Failure taxonomy of the ingestion and identity pipeline.
///
/// `Malformed` is caller-correctable and maps to HTTP 400. `IdentityConflict`
/// is fail-closed: it is never auto-resolved and surfaces as a server-side
/// failure for operator follow-up. Everything else (lock timeouts, broken
/// connections) stays an opaque store error; the delivery may simply be
/// retried thanks to hash-based commit dedup.
#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error(transparent)]
    Malformed(#[from] MalformedPayload),
    #[error("identity conflict: {0}")]
    IdentityConflict(String),
    #[error(transparent)]
    Store(#[from] anyhow::Error),
}
