//! Manifest codec
//!
//! A manifest names one logical file and lists the identifiers of its chunks
//! in byte order. It is stored as a small text blob next to the chunks:
//!
//! ```text
//! movie.mp4
//! <chunk id 0>
//! <chunk id 1>
//! ```
//!
//! Blank lines are ignored when reading and never written. Filenames and
//! identifiers are not escaped, so values containing line breaks cannot be
//! represented.

use thiserror::Error;

/// File name under which manifests are stored in the messaging service.
pub const MANIFEST_FILENAME: &str = "fileAll.txt";

/// Manifest parse / construction errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FormatError {
    #[error("manifest must contain a filename and at least one chunk id, found {found} non-empty line(s)")]
    TooFewLines { found: usize },

    #[error("manifest is not valid UTF-8")]
    InvalidUtf8,

    #[error("manifest has no chunk ids")]
    NoChunks,

    #[error("manifest filename is empty")]
    EmptyFilename,

    #[error("manifest line {value:?} would not decode to the same value")]
    InvalidLine { value: String },
}

/// A line survives `decode` unchanged only if trimming leaves it as is.
fn check_line(value: &str) -> Result<(), FormatError> {
    if value.is_empty() || value.trim() != value || value.contains(['\n', '\r']) {
        return Err(FormatError::InvalidLine {
            value: value.to_string(),
        });
    }
    Ok(())
}

/// Ordered list of chunk identifiers making up one file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Manifest {
    original_filename: String,
    chunk_ids: Vec<String>,
}

impl Manifest {
    /// Build a manifest.
    ///
    /// Fails when `chunk_ids` is empty or when the filename or any id would
    /// not decode back to the same value.
    pub fn new(
        original_filename: impl Into<String>,
        chunk_ids: Vec<String>,
    ) -> Result<Self, FormatError> {
        let original_filename = original_filename.into();
        Self::check_filename(&original_filename)?;
        if chunk_ids.is_empty() {
            return Err(FormatError::NoChunks);
        }
        for id in &chunk_ids {
            check_line(id)?;
        }
        Ok(Self {
            original_filename,
            chunk_ids,
        })
    }

    /// Check that `name` can head a manifest.
    pub fn check_filename(name: &str) -> Result<(), FormatError> {
        if name.trim().is_empty() {
            return Err(FormatError::EmptyFilename);
        }
        check_line(name)
    }

    pub fn original_filename(&self) -> &str {
        &self.original_filename
    }

    pub fn chunk_ids(&self) -> &[String] {
        &self.chunk_ids
    }

    pub fn chunk_count(&self) -> usize {
        self.chunk_ids.len()
    }

    /// Decode a manifest blob.
    ///
    /// Each line is trimmed, so files written with `\r\n` line endings decode
    /// the same as `\n` ones.
    pub fn decode(bytes: &[u8]) -> Result<Self, FormatError> {
        let text = std::str::from_utf8(bytes).map_err(|_| FormatError::InvalidUtf8)?;

        let mut lines = text.split('\n').map(str::trim).filter(|l| !l.is_empty());

        let filename = lines.next();
        let chunk_ids: Vec<String> = lines.map(String::from).collect();

        match filename {
            Some(name) if !chunk_ids.is_empty() => Ok(Self {
                original_filename: name.to_string(),
                chunk_ids,
            }),
            Some(_) => Err(FormatError::TooFewLines { found: 1 }),
            None => Err(FormatError::TooFewLines { found: 0 }),
        }
    }

    /// Encode as filename line followed by one chunk id per line.
    pub fn encode(&self) -> Vec<u8> {
        let capacity = self.original_filename.len()
            + 1
            + self.chunk_ids.iter().map(|id| id.len() + 1).sum::<usize>();
        let mut out = String::with_capacity(capacity);
        out.push_str(&self.original_filename);
        out.push('\n');
        for id in &self.chunk_ids {
            out.push_str(id);
            out.push('\n');
        }
        out.into_bytes()
    }
}

/// In-progress manifest filled while chunks are uploaded.
#[derive(Debug, Clone)]
pub struct ManifestBuilder {
    original_filename: String,
    chunk_ids: Vec<String>,
}

impl ManifestBuilder {
    pub fn new(original_filename: impl Into<String>) -> Self {
        Self {
            original_filename: original_filename.into(),
            chunk_ids: Vec::new(),
        }
    }

    /// Append the identifier of the next chunk.
    pub fn push(&mut self, chunk_id: impl Into<String>) -> &mut Self {
        self.chunk_ids.push(chunk_id.into());
        self
    }

    pub fn len(&self) -> usize {
        self.chunk_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunk_ids.is_empty()
    }

    pub fn build(self) -> Result<Manifest, FormatError> {
        Manifest::new(self.original_filename, self.chunk_ids)
    }
}
