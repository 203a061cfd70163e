//! Incremental writer for the language export document.
//!
//! The document shape is fixed:
//!
//! ```text
//! {"translations":{"<key>":"<content>",...}}
//! ```
//!
//! Keys and content are JSON-string-escaped with `serde_json`, entries are
//! comma-separated with no whitespace. The writer never holds more than one
//! entry in its scratch buffer, so rows can be fed straight from a store
//! cursor. Equal row sequences always produce identical bytes.

use std::collections::BTreeMap;
use std::io::{self, Write};

use serde::Deserialize;

const DOCUMENT_OPEN: &[u8] = b"{\"translations\":{";
const DOCUMENT_CLOSE: &[u8] = b"}}";

/// Bytes of an export with no entries.
pub const EMPTY_EXPORT: &[u8] = b"{\"translations\":{}}";

/// Streams `(key, content)` pairs into an export document.
///
/// Callers must feed entries in ascending key order with no duplicate keys;
/// the writer does not reorder or deduplicate.
#[derive(Debug)]
pub struct ExportWriter<W: Write> {
    inner: W,
    scratch: Vec<u8>,
    entries: usize,
    bytes_written: u64,
}

impl<W: Write> ExportWriter<W> {
    /// Starts a document by writing the opening braces to `inner`.
    ///
    /// # Errors
    ///
    /// Returns any I/O error from the underlying writer.
    pub fn new(mut inner: W) -> io::Result<Self> {
        inner.write_all(DOCUMENT_OPEN)?;
        Ok(Self {
            inner,
            scratch: Vec::with_capacity(256),
            entries: 0,
            bytes_written: DOCUMENT_OPEN.len() as u64,
        })
    }

    /// Appends one entry.
    ///
    /// # Errors
    ///
    /// Returns any I/O error from the underlying writer.
    pub fn entry(&mut self, key: &str, content: &str) -> io::Result<()> {
        self.scratch.clear();
        if self.entries > 0 {
            self.scratch.push(b',');
        }
        serde_json::to_writer(&mut self.scratch, key)?;
        self.scratch.push(b':');
        serde_json::to_writer(&mut self.scratch, content)?;

        self.inner.write_all(&self.scratch)?;
        self.entries += 1;
        self.bytes_written += self.scratch.len() as u64;
        Ok(())
    }

    /// Closes the document and returns the underlying writer.
    ///
    /// # Errors
    ///
    /// Returns any I/O error from the underlying writer.
    pub fn finish(mut self) -> io::Result<W> {
        self.inner.write_all(DOCUMENT_CLOSE)?;
        self.inner.flush()?;
        Ok(self.inner)
    }

    /// Number of entries written so far.
    #[must_use]
    pub fn entries(&self) -> usize {
        self.entries
    }

    /// Bytes emitted so far, including the opening braces.
    #[must_use]
    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    /// Bytes the finished document will occupy if no more entries are added.
    #[must_use]
    pub fn finished_len(&self) -> u64 {
        self.bytes_written + DOCUMENT_CLOSE.len() as u64
    }
}

impl ExportWriter<Vec<u8>> {
    /// Takes everything buffered so far, leaving the buffer empty.
    ///
    /// Used when forwarding the document to a client chunk by chunk.
    pub fn take_buffered(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.inner)
    }

    /// Bytes currently buffered and not yet taken.
    #[must_use]
    pub fn buffered_len(&self) -> usize {
        self.inner.len()
    }
}

#[derive(Deserialize)]
struct ExportDocument {
    translations: BTreeMap<String, String>,
}

/// Parses an export document back into its key → content mapping.
///
/// # Errors
///
/// Returns an error if `bytes` is not a well-formed export document.
pub fn parse_export(bytes: &[u8]) -> serde_json::Result<BTreeMap<String, String>> {
    serde_json::from_slice::<ExportDocument>(bytes).map(|doc| doc.translations)
}

/// Renders a complete document from an in-memory slice of entries.
///
/// # Errors
///
/// Returns an error only if serialization into the buffer fails.
pub fn render_export<'a, I>(entries: I) -> io::Result<Vec<u8>>
where
    I: IntoIterator<Item = (&'a str, &'a str)>,
{
    let mut writer = ExportWriter::new(Vec::new())?;
    for (key, content) in entries {
        writer.entry(key, content)?;
    }
    writer.finish()
}
