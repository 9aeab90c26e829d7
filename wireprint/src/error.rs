// wireprint/src/error.rs
//
// Engine error taxonomy. Nothing here is fatal to a run: every variant is
// recovered at the record that raised it — a partial result is emitted and
// the condition logged. The only fatal condition (missing input stream)
// lives at the binary boundary as an anyhow error.

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum FingerprintError {
    /// A TCP option declared a length running past the end of the buffer.
    /// Parsing stops at the offending option; kinds seen so far are kept.
    #[error("tcp options truncated: option kind {kind} at byte {offset} overruns the buffer")]
    TruncatedOptions { kind: u8, offset: usize },

    /// An OID string could not be encoded (non-numeric component, fewer
    /// than two components, or an exhausted pool).
    #[error("corrupt OID: {0}")]
    CorruptOid(String),

    /// An RDN sequence yielded neither a commonName nor an organizationName
    /// printable string. The textual annotation is omitted; hashing proceeds.
    #[error("no CN or ON attribute found in RDN sequence")]
    NoIdentityFound,

    /// A Server Hello arrived for a flow whose server side is already
    /// populated. The update is rejected, the original entry retained.
    #[error("server hello already recorded for this flow")]
    DuplicateHandshake,
}
