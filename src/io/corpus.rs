//! Per-solution corpus files.
//!
//! A corpus holds every [`StatementDescriptor`] mined from one solution, one
//! record per observation: `k` (scope key), `f` (file identifier), `v`
//! (flattened variables, omitted when empty) and the template as text.

use std::collections::HashSet;
use std::io::Write;
use std::path::Path;

use tracing::warn;

use crate::core::errors::Result;
use crate::detectors::templates::StatementDescriptor;
use crate::io::records::{
    decode_variables, encode_variables, read_records, read_records_file, RecordWriter, XmlRecord,
};

/// Writes descriptors as corpus records.
pub struct CorpusWriter<W: Write> {
    inner: RecordWriter<W>,
}

impl<W: Write> CorpusWriter<W> {
    /// Start a corpus document on `inner`
    pub fn new(inner: W) -> Result<Self> {
        Ok(Self {
            inner: RecordWriter::new(inner)?,
        })
    }

    /// Append one observation
    pub fn write(&mut self, descriptor: &StatementDescriptor) -> Result<()> {
        let variables = encode_variables(&descriptor.variables);
        self.inner.write_record(
            &[
                ("k", descriptor.key.as_str()),
                ("f", descriptor.file_name.as_str()),
                ("v", variables.as_str()),
            ],
            &["v"],
            &descriptor.template,
        )
    }

    /// Append every descriptor of `descriptors`
    pub fn write_all<'a>(
        &mut self,
        descriptors: impl IntoIterator<Item = &'a StatementDescriptor>,
    ) -> Result<()> {
        for descriptor in descriptors {
            self.write(descriptor)?;
        }
        Ok(())
    }

    /// Number of observations written
    pub fn written(&self) -> usize {
        self.inner.records()
    }

    /// Close the document
    pub fn finish(self) -> Result<W> {
        self.inner.finish()
    }
}

impl CorpusWriter<std::io::BufWriter<std::fs::File>> {
    /// Create a corpus file at `path`
    pub fn create(path: &Path) -> Result<Self> {
        Ok(Self {
            inner: RecordWriter::create(path)?,
        })
    }
}

fn descriptor_from_record(record: XmlRecord) -> StatementDescriptor {
    let variables = decode_variables(record.attribute("v"));
    let key = record.attribute("k").to_string();
    let file_name = record.attribute("f").to_string();
    StatementDescriptor::from_parts(key, file_name, record.text, variables)
}

/// Parse a corpus document.
pub fn read_corpus(bytes: &[u8]) -> Result<Vec<StatementDescriptor>> {
    Ok(read_records(bytes)?
        .into_iter()
        .map(descriptor_from_record)
        .collect())
}

/// Read the corpus file at `path`.
pub fn read_corpus_file(path: &Path) -> Result<Vec<StatementDescriptor>> {
    Ok(read_records_file(path)?
        .into_iter()
        .map(descriptor_from_record)
        .collect())
}

/// Read the corpus at `path`, treating a missing or unreadable file as empty.
pub fn read_corpus_lenient(path: &Path) -> Vec<StatementDescriptor> {
    if !path.exists() {
        return Vec::new();
    }
    match read_corpus_file(path) {
        Ok(descriptors) => descriptors,
        Err(e) => {
            warn!("Ignoring unreadable corpus {}: {}", path.display(), e);
            Vec::new()
        }
    }
}

/// Copy every observation of `previous` whose file is not in `changed`.
pub fn retain_unchanged<'a>(
    previous: &'a [StatementDescriptor],
    changed: &'a HashSet<String>,
) -> impl Iterator<Item = &'a StatementDescriptor> + 'a {
    previous
        .iter()
        .filter(move |descriptor| !changed.contains(&descriptor.file_name))
}
