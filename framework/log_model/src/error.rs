use std::num::ParseIntError;

use crate::event::RecordKind;

#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("Unknown line type encountered: {0:?}")]
    UnknownRecord(String),
    #[error("{kind} record is missing the `{field}` field")]
    MissingField {
        kind: RecordKind,
        field: &'static str,
    },
    #[error("Failed to parse timestamp {value:?} as integer: {source}")]
    InvalidTimestamp {
        value: String,
        #[source]
        source: ParseIntError,
    },
    #[error("Failed to parse {kind} `{field}` value {value:?} as integer: {source}")]
    InvalidNumber {
        kind: RecordKind,
        field: &'static str,
        value: String,
        #[source]
        source: ParseIntError,
    },
    #[error("Unknown {kind} status {value:?}")]
    InvalidStatus { kind: RecordKind, value: String },
    #[error("Unknown user phase {0:?}")]
    InvalidPhase(String),
    #[error("{0} record arrived before the RUN header, the log format version is unknown")]
    FormatUnknown(RecordKind),
    #[error("RUN header does not contain a recognisable Gatling version")]
    MissingVersion,
}

/// Why a line could not be turned into an event, and whether the parser can carry on after it.
#[derive(Debug, thiserror::Error)]
pub enum LineError {
    /// Every later line depends on this one, further processing is futile.
    #[error("fatal: {0}")]
    Fatal(ParseError),
    /// A malformed record that can be skipped.
    #[error(transparent)]
    Skipped(#[from] ParseError),
}

impl LineError {
    pub fn is_fatal(&self) -> bool {
        matches!(self, LineError::Fatal(_))
    }
}
