//! Character-encoding fallback for CSV files.

use chardetng::EncodingDetector;
use encoding_rs::Encoding;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use thiserror::Error;
use tracing::{debug, warn};

/// Why a CSV file could not be presented as UTF-8.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("{0}")]
    Malformed(String),
}

/// A CSV file ready to be read as UTF-8.
pub enum Utf8Source {
    /// The original file is valid UTF-8
    Original(PathBuf),
    /// A transcoded copy, removed when dropped
    Transcoded(NamedTempFile),
}

impl Utf8Source {
    pub fn path(&self) -> &Path {
        match self {
            Utf8Source::Original(path) => path,
            Utf8Source::Transcoded(file) => file.path(),
        }
    }
}

/// How a CSV file that is not valid UTF-8 gets decoded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum EncodingFallback {
    /// The file fails with an encoding error
    #[default]
    Disabled,
    /// Decode from one configured encoding
    Fixed(&'static Encoding),
    /// Guess the encoding from the file's bytes
    Detect,
}

impl EncodingFallback {
    /// Parses a `fallback_encoding` value: `auto` or an encoding label.
    pub fn from_label(label: &str) -> Option<Self> {
        if label.trim().eq_ignore_ascii_case("auto") {
            return Some(Self::Detect);
        }
        lookup_encoding(label).map(Self::Fixed)
    }
}

/// Looks up a WHATWG encoding label such as `shift_jis` or `windows-1252`.
pub fn lookup_encoding(label: &str) -> Option<&'static Encoding> {
    Encoding::for_label(label.trim().as_bytes())
}

/// Guesses the legacy encoding of bytes already known not to be UTF-8.
pub fn detect_encoding(bytes: &[u8]) -> &'static Encoding {
    let mut detector = EncodingDetector::new();
    detector.feed(bytes, true);
    detector.guess(None, false)
}

/// Returns a UTF-8 view of the CSV at `path`.
///
/// Files that are not valid UTF-8 are decoded per `fallback` into a
/// temporary file. Malformed sequences in the chosen encoding, or a
/// disabled fallback, are reported as [`DecodeError::Malformed`].
pub fn ensure_utf8(path: &Path, fallback: EncodingFallback) -> Result<Utf8Source, DecodeError> {
    let bytes = std::fs::read(path)?;
    if std::str::from_utf8(&bytes).is_ok() {
        return Ok(Utf8Source::Original(path.to_path_buf()));
    }

    let encoding = match fallback {
        EncodingFallback::Disabled => {
            return Err(DecodeError::Malformed(format!(
                "file is not valid UTF-8 and no fallback_encoding is configured: {}",
                path.display()
            )));
        }
        EncodingFallback::Fixed(encoding) => encoding,
        EncodingFallback::Detect => {
            let encoding = detect_encoding(&bytes);
            debug!(file = %path.display(), encoding = encoding.name(), "Detected CSV encoding");
            encoding
        }
    };

    let text = encoding
        .decode_without_bom_handling_and_without_replacement(&bytes)
        .ok_or_else(|| {
            DecodeError::Malformed(format!(
                "file is neither valid UTF-8 nor valid {}: {}",
                encoding.name(),
                path.display()
            ))
        })?;

    let mut file = tempfile::Builder::new()
        .prefix("tval-")
        .suffix(".csv")
        .tempfile()?;
    file.write_all(text.as_bytes())?;
    file.flush()?;

    warn!(
        file = %path.display(),
        encoding = encoding.name(),
        "Transcoded CSV to UTF-8"
    );
    Ok(Utf8Source::Transcoded(file))
}
