// 📄 Tables - thin tabular reader
// Loads a CSV export into memory as rows of strings.
// Extractors only ever see cells; encoding and CSV mechanics stop here.

use crate::error::PipelineError;
use anyhow::{Context, Result};
use csv::{ReaderBuilder, StringRecord};
use std::fs::File;
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Encoding {
    #[default]
    Utf8,
    /// The RNPP nationality export is ISO-8859-1
    Latin1,
}

/// How to read one source file
#[derive(Debug, Clone)]
pub struct TableOptions {
    pub has_headers: bool,
    /// Records dropped before the header (or before data when headerless).
    /// Fully blank lines are not records and do not count.
    pub skip_rows: usize,
    pub delimiter: u8,
    pub encoding: Encoding,
}

impl Default for TableOptions {
    fn default() -> Self {
        TableOptions {
            has_headers: true,
            skip_rows: 0,
            delimiter: b',',
            encoding: Encoding::Utf8,
        }
    }
}

impl TableOptions {
    /// Builder: positional table without a header row
    pub fn headerless(mut self) -> Self {
        self.has_headers = false;
        self
    }

    pub fn skip(mut self, rows: usize) -> Self {
        self.skip_rows = rows;
        self
    }

    pub fn delimiter(mut self, delimiter: u8) -> Self {
        self.delimiter = delimiter;
        self
    }

    pub fn encoding(mut self, encoding: Encoding) -> Self {
        self.encoding = encoding;
        self
    }
}

/// One input table, fully in memory
#[derive(Debug, Clone)]
pub struct Table {
    pub name: String,
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl Table {
    /// Build a table from literal rows (fixtures, other readers)
    pub fn from_rows(name: &str, headers: &[&str], rows: Vec<Vec<&str>>) -> Self {
        Table {
            name: name.to_string(),
            headers: headers.iter().map(|h| h.to_string()).collect(),
            rows: rows
                .into_iter()
                .map(|row| row.into_iter().map(|c| c.to_string()).collect())
                .collect(),
        }
    }

    /// Read a CSV file. A missing file is fatal.
    pub fn load(path: &Path, options: &TableOptions) -> Result<Table> {
        if !path.exists() {
            return Err(PipelineError::MissingTable(path.to_path_buf()).into());
        }

        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("unknown.csv")
            .to_string();

        let file = File::open(path)
            .with_context(|| format!("Failed to open file: {}", path.display()))?;

        let mut reader = ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .delimiter(options.delimiter)
            .from_reader(file);

        let mut records = Vec::new();
        for (line_num, result) in reader.byte_records().enumerate() {
            let record = result.map_err(|e| PipelineError::MalformedTable {
                table: name.clone(),
                line: line_num + 1,
                reason: e.to_string(),
            })?;

            let row = decode_record(&record, options.encoding).map_err(|reason| {
                PipelineError::MalformedTable {
                    table: name.clone(),
                    line: line_num + 1,
                    reason,
                }
            })?;
            records.push(row);
        }

        let mut rows = records.into_iter().skip(options.skip_rows);
        let headers = if options.has_headers {
            rows.next()
                .map(|h| {
                    h.into_iter()
                        .map(|c| c.trim_start_matches('\u{feff}').trim().to_string())
                        .collect()
                })
                .unwrap_or_default()
        } else {
            Vec::new()
        };

        Ok(Table {
            name,
            headers,
            rows: rows.collect(),
        })
    }

    /// Index of a named column, or a fatal schema error
    pub fn column(&self, header: &str) -> Result<usize, PipelineError> {
        self.headers
            .iter()
            .position(|h| h == header)
            .ok_or_else(|| PipelineError::MissingColumn {
                table: self.name.clone(),
                column: header.to_string(),
            })
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Cell accessor tolerant of short rows
pub fn cell(row: &[String], index: usize) -> Option<&str> {
    row.get(index).map(|c| c.trim()).filter(|c| !c.is_empty())
}

/// Parse a numeric cell. Anything unparseable is None, never zero.
///
/// Accepts "1234.5", "1 234,5" and "1,234.5".
pub fn parse_number(raw: &str) -> Option<f64> {
    let compact: String = raw
        .trim()
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '\u{a0}' && *c != '\u{202f}')
        .collect();

    if compact.is_empty() {
        return None;
    }

    let normalized = match (compact.contains('.'), compact.contains(',')) {
        (true, true) => compact.replace(',', ""),
        (false, true) => compact.replace(',', "."),
        _ => compact,
    };

    normalized.parse::<f64>().ok().filter(|v| v.is_finite())
}

fn decode_record(record: &csv::ByteRecord, encoding: Encoding) -> Result<Vec<String>, String> {
    match encoding {
        Encoding::Utf8 => {
            let record = StringRecord::from_byte_record(record.clone())
                .map_err(|e| format!("invalid UTF-8: {}", e))?;
            Ok(record.iter().map(|c| c.to_string()).collect())
        }
        // Strict ISO-8859-1: byte value = code point (not the windows-1252 superset)
        Encoding::Latin1 => Ok(record
            .iter()
            .map(|bytes| encoding_rs::mem::decode_latin1(bytes).into_owned())
            .collect()),
    }
}
