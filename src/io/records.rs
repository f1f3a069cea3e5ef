//! Flat record documents.
//!
//! Corpus and suggestions files share one shape: a root `<i>` element holding
//! one `<i>` child per record, with the record's fields as attributes and its
//! template as element text. Reading and writing go through quick-xml so
//! attribute and text escaping is symmetric.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use indexmap::IndexMap;
use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};

use crate::core::errors::{AutoTemplateError, Result, ResultExt};

/// Element name of the root and of every record.
pub const RECORD_ELEMENT: &str = "i";

/// Separator of the flattened variable list.
pub const VARIABLE_SEPARATOR: char = '|';

/// One record as stored on disk.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct XmlRecord {
    /// Attributes in document order
    pub attributes: IndexMap<String, String>,
    /// Element text
    pub text: String,
}

impl XmlRecord {
    /// Attribute value, or the empty string when absent
    pub fn attribute(&self, name: &str) -> &str {
        self.attributes.get(name).map(String::as_str).unwrap_or("")
    }

    /// Integer attribute, `default` when absent or malformed
    pub fn int_attribute(&self, name: &str, default: usize) -> usize {
        self.attributes
            .get(name)
            .and_then(|value| value.trim().parse().ok())
            .unwrap_or(default)
    }

    fn from_start(start: &BytesStart<'_>) -> Result<Self> {
        let mut attributes = IndexMap::new();
        for attribute in start.attributes() {
            let attribute = attribute?;
            let key = String::from_utf8_lossy(attribute.key.as_ref()).into_owned();
            let value = attribute.unescape_value()?.into_owned();
            attributes.insert(key, value);
        }
        Ok(Self {
            attributes,
            text: String::new(),
        })
    }
}

/// Flatten `name|value|name|value`.
pub fn encode_variables<'a>(variables: impl IntoIterator<Item = (&'a String, &'a String)>) -> String {
    let mut encoded = String::new();
    for (name, value) in variables {
        if !encoded.is_empty() {
            encoded.push(VARIABLE_SEPARATOR);
        }
        encoded.push_str(name);
        encoded.push(VARIABLE_SEPARATOR);
        encoded.push_str(value);
    }
    encoded
}

/// Split a flattened variable list back into pairs. A trailing unpaired
/// element is ignored.
pub fn decode_variables(encoded: &str) -> IndexMap<String, String> {
    let parts: Vec<&str> = encoded.split(VARIABLE_SEPARATOR).collect();
    parts
        .chunks_exact(2)
        .map(|pair| (pair[0].to_string(), pair[1].to_string()))
        .collect()
}

/// Streaming writer of a record document.
pub struct RecordWriter<W: Write> {
    writer: Writer<W>,
    records: usize,
}

impl<W: Write> RecordWriter<W> {
    /// Start a document on `inner`
    pub fn new(inner: W) -> Result<Self> {
        let mut writer = Writer::new_with_indent(inner, b' ', 2);
        writer.write_event(Event::Start(BytesStart::new(RECORD_ELEMENT)))?;
        Ok(Self { writer, records: 0 })
    }

    /// Append one record; attributes with empty values are skipped when
    /// `optional` lists their name
    pub fn write_record(&mut self, attributes: &[(&str, &str)], optional: &[&str], text: &str) -> Result<()> {
        let mut start = BytesStart::new(RECORD_ELEMENT);
        for &(name, value) in attributes {
            if value.is_empty() && optional.contains(&name) {
                continue;
            }
            start.push_attribute((name, value));
        }
        self.writer.write_event(Event::Start(start))?;
        self.writer.write_event(Event::Text(BytesText::new(text)))?;
        self.writer
            .write_event(Event::End(BytesEnd::new(RECORD_ELEMENT)))?;
        self.records += 1;
        Ok(())
    }

    /// Number of records written so far
    pub fn records(&self) -> usize {
        self.records
    }

    /// Close the root element and flush
    pub fn finish(mut self) -> Result<W> {
        self.writer
            .write_event(Event::End(BytesEnd::new(RECORD_ELEMENT)))?;
        let mut inner = self.writer.into_inner();
        inner.flush()?;
        Ok(inner)
    }
}

impl RecordWriter<BufWriter<File>> {
    /// Create (or truncate) `path` and start a document in it
    pub fn create(path: &Path) -> Result<Self> {
        let file = File::create(path).map_err(|e| {
            AutoTemplateError::io(format!("Failed to create {}", path.display()), e)
        })?;
        Self::new(BufWriter::new(file))
    }
}

/// Parse every record of a document.
pub fn read_records(bytes: &[u8]) -> Result<Vec<XmlRecord>> {
    let mut reader = Reader::from_reader(bytes);
    let mut buf = Vec::new();
    let mut records = Vec::new();
    let mut current: Option<XmlRecord> = None;
    let mut depth = 0usize;

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(start) => {
                depth += 1;
                if depth == 2 {
                    current = Some(XmlRecord::from_start(&start)?);
                }
            }
            Event::Empty(start) => {
                if depth == 1 {
                    records.push(XmlRecord::from_start(&start)?);
                }
            }
            Event::Text(text) => {
                if let Some(record) = current.as_mut() {
                    record.text.push_str(&text.unescape()?);
                }
            }
            Event::CData(data) => {
                if let Some(record) = current.as_mut() {
                    record
                        .text
                        .push_str(&String::from_utf8_lossy(&data.into_inner()));
                }
            }
            Event::End(_) => {
                if depth == 2 {
                    if let Some(record) = current.take() {
                        records.push(record);
                    }
                }
                depth = depth.saturating_sub(1);
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    if depth != 0 {
        return Err(AutoTemplateError::serialization(
            "Unexpected end of record document",
            "XML",
        ));
    }
    Ok(records)
}

/// Read and parse the record document at `path`.
pub fn read_records_file(path: &Path) -> Result<Vec<XmlRecord>> {
    let bytes = std::fs::read(path).map_err(|e| {
        AutoTemplateError::io(format!("Failed to read {}", path.display()), e)
    })?;
    read_records(&bytes).with_context(|| path.display().to_string())
}
