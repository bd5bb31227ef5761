// src/error.rs
//! Error types for the NMEA monitor

use thiserror::Error;

pub type Result<T> = std::result::Result<T, GpsError>;

/// Errors that stop the monitor or one of its outer surfaces.
#[derive(Debug, Error)]
pub enum GpsError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A read failure on the input stream other than a clean end-of-input.
    #[error("input stream error: {0}")]
    InputStream(std::io::Error),

    /// The display could not be set up.
    #[error("renderer error: {0}")]
    Renderer(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("Error: {0}")]
    Other(String),
}

/// Why a line could not be framed as an NMEA sentence.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FramingError {
    #[error("empty line")]
    Empty,

    #[error("line does not start with '$'")]
    MissingStartMarker,

    #[error("no '*' checksum delimiter")]
    MissingChecksum,

    #[error("checksum is not two hex digits: {0:?}")]
    BadChecksumDigits(String),

    #[error("malformed address field: {0:?}")]
    BadAddress(String),

    #[error("line of {length} bytes exceeds the {limit} byte limit")]
    Overlength { length: usize, limit: usize },
}

/// A line that was rejected by the parser. Never fatal to the pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("framing error: {0}")]
    Framing(#[from] FramingError),

    /// The original text is kept for diagnostics only.
    #[error("checksum mismatch: sentence says {expected:02X}, computed {computed:02X}")]
    ChecksumMismatch {
        expected: u8,
        computed: u8,
        line: String,
    },

    /// Every non-empty field of the sentence failed to decode.
    #[error("no usable fields in {sentence_type} sentence ({malformed} malformed)")]
    Field {
        sentence_type: String,
        malformed: usize,
    },
}

impl ParseError {
    /// Short stable label used for counters and log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            ParseError::Framing(_) => "framing",
            ParseError::ChecksumMismatch { .. } => "checksum",
            ParseError::Field { .. } => "field",
        }
    }
}

impl From<anyhow::Error> for GpsError {
    fn from(error: anyhow::Error) -> Self {
        GpsError::Other(error.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_checksum_mismatch_display() {
        let err = ParseError::ChecksumMismatch {
            expected: 0x47,
            computed: 0x4a,
            line: "$GPGGA*47".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "checksum mismatch: sentence says 47, computed 4A"
        );
        assert_eq!(err.kind(), "checksum");
    }

    #[test]
    fn test_framing_converts_into_parse_error() {
        let err: ParseError = FramingError::MissingStartMarker.into();
        assert_eq!(err.kind(), "framing");
        assert!(err.to_string().contains("'$'"));
    }
}
