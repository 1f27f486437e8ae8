//! Error handling types for the boxsig coordination protocol.
//!
//! Every fallible operation in the workspace eventually reports one of the
//! variants below. Callers drive their retry policy from
//! [`Error::is_transient`]; everything else is an input or sequencing error
//! that must be surfaced as-is.

use thiserror::Error;

/// Core error type for boxsig operations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// Address text that does not decode to a 32-byte key with a valid checksum
    #[error("invalid address:: {0}")]
    InvalidAddress(String),

    /// Chunk size of zero passed to the chunk codec
    #[error("invalid chunk size:: chunk size must be non-zero")]
    InvalidChunkSize,

    /// Multisig threshold of zero or larger than the signer count
    #[error("threshold out of range:: {threshold} of {signers} signers")]
    ThresholdOutOfRange { threshold: u16, signers: usize },

    /// Multisig version other than the one the ledger accepts
    #[error("unsupported multisig version:: {0}")]
    UnsupportedMultisigVersion(u8),

    /// The storage cost source could not be reached
    #[error("cost oracle unavailable:: {0}")]
    CostOracleUnavailable(String),

    /// A ledger submission or read failed
    #[error("ledger call failed:: {reason}")]
    LedgerCallFailed { transient: bool, reason: String },

    /// A continuation write without a matching begin, or an interrupted chunk sequence
    #[error("inconsistent chunk sequence:: {0}")]
    InconsistentChunkSequence(String),

    /// Fixed-width encoding or decoding overflow
    #[error("encoding error:: {0}")]
    EncodingError(String),

    /// Attempt to store a zero-length payload
    #[error("empty payload:: nothing to store")]
    EmptyPayload,

    /// Payload that cannot be stored by one atomic write sequence
    #[error("payload too large:: {len} bytes exceeds {max}")]
    PayloadTooLarge { len: usize, max: usize },

    /// Group id this coordinator does not know or has destroyed
    #[error("unknown group:: {0}")]
    UnknownGroup(u64),

    /// Group destruction while slots are still held
    #[error("group not empty:: group {group} still holds {slots} slot(s)")]
    GroupNotEmpty { group: u64, slots: usize },

    /// Funding payment smaller than the storage cost increase
    #[error("insufficient funding:: paid {paid}, required {required}")]
    InsufficientFunding { paid: u64, required: u64 },

    /// Signer could not produce a signature
    #[error("signing failed:: {0}")]
    Signing(String),

    /// Invalid configuration value
    #[error("configuration error:: {0}")]
    Config(String),
}

/// Result type alias for boxsig operations
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Shorthand for a retryable ledger failure
    pub fn transient(reason: impl Into<String>) -> Self {
        Error::LedgerCallFailed {
            transient: true,
            reason: reason.into(),
        }
    }

    /// Shorthand for a ledger rejection that will not succeed on retry
    pub fn rejected(reason: impl Into<String>) -> Self {
        Error::LedgerCallFailed {
            transient: false,
            reason: reason.into(),
        }
    }

    /// Whether retrying the same call may succeed
    pub fn is_transient(&self) -> bool {
        match self {
            Error::CostOracleUnavailable(_) => true,
            Error::LedgerCallFailed { transient, .. } => *transient,
            _ => false,
        }
    }

    /// Whether the in-progress slot write must be restarted with a remove
    pub fn requires_restart(&self) -> bool {
        matches!(self, Error::InconsistentChunkSequence(_))
    }

    /// Numeric error code, stable across releases
    pub fn code(&self) -> u32 {
        match self {
            Error::InvalidAddress(_) => codes::INVALID_ADDRESS,
            Error::InvalidChunkSize => codes::INVALID_CHUNK_SIZE,
            Error::ThresholdOutOfRange { .. } | Error::UnsupportedMultisigVersion(_) => {
                codes::INVALID_MULTISIG
            }
            Error::CostOracleUnavailable(_) => codes::COST_ORACLE_UNAVAILABLE,
            Error::LedgerCallFailed { .. } => codes::LEDGER_CALL_FAILED,
            Error::InconsistentChunkSequence(_) => codes::INCONSISTENT_CHUNK_SEQUENCE,
            Error::EncodingError(_) => codes::ENCODING,
            Error::EmptyPayload | Error::PayloadTooLarge { .. } => codes::INVALID_PAYLOAD,
            Error::UnknownGroup(_) => codes::NOT_FOUND,
            Error::GroupNotEmpty { .. } => codes::GROUP_NOT_EMPTY,
            Error::InsufficientFunding { .. } => codes::INSUFFICIENT_FUNDS,
            Error::Signing(_) => codes::SIGNING_FAILED,
            Error::Config(_) => codes::INVALID_ARGUMENT,
        }
    }
}

/// Error codes
pub mod codes {
    /// Success
    pub const OK: u32 = 0;
    /// Invalid argument
    pub const INVALID_ARGUMENT: u32 = 3;
    /// Not found
    pub const NOT_FOUND: u32 = 5;
    /// Insufficient funds
    pub const INSUFFICIENT_FUNDS: u32 = 10;
    /// Malformed address text
    pub const INVALID_ADDRESS: u32 = 20;
    /// Zero chunk size
    pub const INVALID_CHUNK_SIZE: u32 = 21;
    /// Bad multisig parameters
    pub const INVALID_MULTISIG: u32 = 22;
    /// Fixed-width encoding failure
    pub const ENCODING: u32 = 23;
    /// Empty or oversized payload
    pub const INVALID_PAYLOAD: u32 = 24;
    /// Cost source unreachable
    pub const COST_ORACLE_UNAVAILABLE: u32 = 30;
    /// Ledger call failed
    pub const LEDGER_CALL_FAILED: u32 = 31;
    /// Broken begin/continue sequence
    pub const INCONSISTENT_CHUNK_SEQUENCE: u32 = 32;
    /// Group still holds slots
    pub const GROUP_NOT_EMPTY: u32 = 33;
    /// Signer failure
    pub const SIGNING_FAILED: u32 = 40;
}
