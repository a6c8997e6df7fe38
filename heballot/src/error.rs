use crate::*;
use std::time::Duration;
use thiserror::Error;

/// Error types
#[derive(Debug, Error)]
pub enum Error {
    #[error("heballot: voter {0} does not exist")]
    VoterNotFound(String),

    #[error("heballot: no ballot has been cast by voter {0}")]
    BallotNotFound(String),

    #[error("heballot: voter {0} has already voted")]
    AlreadyVoted(String),

    #[error("heballot: voter {0} is already registered")]
    VoterAlreadyRegistered(String),

    #[error("heballot: unknown district or area: {0}")]
    UnknownArea(AreaKey),

    #[error("heballot: voter {voter_id} is registered in {registered}, not {submitted}")]
    DistrictMismatch {
        voter_id: String,
        registered: AreaKey,
        submitted: AreaKey,
    },

    #[error("heballot: invalid input: {0}")]
    InvalidInput(String),

    #[error("heballot: {0}")]
    Codec(#[from] CodecError),

    #[error("heballot: {0}")]
    Crypto(#[from] CryptoError),

    #[error("heballot: {0}")]
    Ledger(#[from] LedgerError),

    #[error("heballot: corrupt ledger record {key}: {source}")]
    CorruptRecord {
        key: String,
        source: serde_json::Error,
    },
}

/// Broad classification of an [`Error`], used to decide how a caller reacts.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    NotFound,
    AlreadyExists,
    InvalidInput,
    CryptoFailure,
    StorageFailure,
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::VoterNotFound(_) | Error::BallotNotFound(_) => ErrorKind::NotFound,
            Error::AlreadyVoted(_) | Error::VoterAlreadyRegistered(_) => ErrorKind::AlreadyExists,
            Error::UnknownArea(_) | Error::DistrictMismatch { .. } | Error::InvalidInput(_) => {
                ErrorKind::InvalidInput
            }
            Error::Codec(CodecError::UnknownCandidate(_)) => ErrorKind::InvalidInput,
            Error::Codec(_) | Error::Crypto(_) => ErrorKind::CryptoFailure,
            Error::Ledger(_) | Error::CorruptRecord { .. } => ErrorKind::StorageFailure,
        }
    }

    /// Only transient storage failures may be retried; everything else is
    /// final for the request that produced it.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Ledger(e) => e.is_retryable(),
            _ => false,
        }
    }
}

/// Homomorphic encryption errors
#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("value {value} in slot {slot} is out of range for plaintext modulus {modulus}")]
    EncodingOutOfRange { slot: usize, value: u64, modulus: u64 },

    #[error("vector of length {len} does not fit in {slots} plaintext slots")]
    TooManySlots { len: usize, slots: usize },

    #[error("noise budget exhausted: {requested} summands requested, parameters support {supported}")]
    NoiseBudgetExhausted { requested: usize, supported: usize },

    #[error("invalid ciphertext: {0}")]
    InvalidCiphertext(String),

    #[error("encryption keys unavailable: {0}")]
    KeyUnavailable(String),

    #[error("invalid scheme parameters: {0}")]
    InvalidParameters(String),

    #[error("fhe error: {0}")]
    Fhe(#[from] fhe::Error),
}

/// Ballot encoding errors
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("unknown candidate {0}")]
    UnknownCandidate(CandidateId),

    #[error("ballot carries no selection")]
    NoSelection,

    #[error("ballot selects more than one candidate (slots {0:?})")]
    AmbiguousSelection(Vec<usize>),
}

/// Ledger errors
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("ledger: {namespace} is not writable: {reason}")]
    NotWritable {
        namespace: Namespace,
        reason: String,
    },

    #[error("ledger: {namespace}/{key} not found")]
    NotFound { namespace: Namespace, key: String },

    #[error("ledger: transaction rejected, precondition failed: {0}")]
    PreconditionFailed(Precondition),

    #[error("ledger: call did not complete within {0:?}")]
    Timeout(Duration),

    #[error("ledger: unavailable: {0}")]
    Unavailable(String),

    #[error("ledger: corrupt state: {0}")]
    Corrupt(String),
}

impl LedgerError {
    /// Network-style failures are retry candidates. Rejected transactions
    /// are not: they would be rejected again.
    pub fn is_retryable(&self) -> bool {
        matches!(self, LedgerError::Timeout(_) | LedgerError::Unavailable(_))
    }
}

impl From<std::io::Error> for LedgerError {
    fn from(err: std::io::Error) -> Self {
        LedgerError::Unavailable(err.to_string())
    }
}
