//! Device manifests.
//!
//! A manifest is a table with one row per device. Columns are matched by
//! exact (case-sensitive) header name; row values are trimmed, and a blank
//! value is treated the same as a missing column.

use std::fs::File;
use std::io;
use std::path::Path;

use indexmap::IndexMap;

use crate::error::ManifestValidationError;

/// Columns every manifest must have.
pub const REQUIRED_COLUMNS: [&str; 3] = [HOSTNAME, PROTOCOL, USERNAME];

pub const HOSTNAME: &str = "Hostname";
pub const PROTOCOL: &str = "Protocol";
pub const USERNAME: &str = "Username";
pub const PASSWORD: &str = "Password";
pub const ENABLE: &str = "Enable";
pub const PROXY_SESSION: &str = "Proxy Session";
pub const PORT: &str = "Port";

/// One device row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestRow {
    number: usize,
    fields: IndexMap<String, String>,
}

impl ManifestRow {
    /// 1-based position among the data rows.
    pub fn number(&self) -> usize {
        self.number
    }

    /// Trimmed value of `column`, or `None` when absent or blank.
    pub fn get(&self, column: &str) -> Option<&str> {
        self.fields
            .get(column)
            .map(|value| value.trim())
            .filter(|value| !value.is_empty())
    }

    /// The row's address column, or an empty string.
    pub fn address(&self) -> &str {
        self.get(HOSTNAME).unwrap_or_default()
    }
}

/// Ordered device table.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Manifest {
    columns: Vec<String>,
    rows: Vec<ManifestRow>,
}

impl Manifest {
    /// An empty manifest with these header columns.
    pub fn new<I, S>(columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            columns: columns
                .into_iter()
                .map(|c| Into::<String>::into(c).trim().to_string())
                .collect(),
            rows: Vec::new(),
        }
    }

    /// Append a row; values pair with columns by position.
    pub fn push_row<I, S>(&mut self, values: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut values = values.into_iter();
        let fields = self
            .columns
            .iter()
            .map(|column| {
                let value: String = values.next().map(Into::into).unwrap_or_default();
                (column.clone(), value)
            })
            .collect();
        self.rows.push(ManifestRow {
            number: self.rows.len() + 1,
            fields,
        });
    }

    /// Builder form of [`push_row`](Self::push_row).
    pub fn with_row<I, S>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.push_row(values);
        self
    }

    /// Check that every required column is present.
    pub fn validate(&self) -> Result<(), ManifestValidationError> {
        let missing: Vec<String> = REQUIRED_COLUMNS
            .iter()
            .filter(|required| !self.columns.iter().any(|c| c.as_str() == **required))
            .map(|required| required.to_string())
            .collect();

        if missing.is_empty() {
            Ok(())
        } else {
            Err(ManifestValidationError::MissingColumns { missing })
        }
    }

    /// Column names, in header order.
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Data rows, in file order.
    pub fn rows(&self) -> &[ManifestRow] {
        &self.rows
    }

    /// Number of data rows.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Whether there are no data rows.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Source of a manifest.
pub trait ManifestReader {
    /// Read the whole table. Column validation is left to the caller.
    fn read_manifest(self) -> Result<Manifest, ManifestValidationError>
    where
        Self: Sized;
}

impl ManifestReader for Manifest {
    fn read_manifest(self) -> Result<Manifest, ManifestValidationError> {
        Ok(self)
    }
}

/// Reads a manifest from CSV with a header row.
pub struct CsvManifestReader<R> {
    reader: csv::Reader<R>,
}

impl<R: io::Read> CsvManifestReader<R> {
    /// Read a manifest with a header row from `input`.
    pub fn new(input: R) -> Self {
        let reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(input);
        Self { reader }
    }
}

impl CsvManifestReader<File> {
    /// Open a CSV file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ManifestValidationError> {
        let file = File::open(path).map_err(csv::Error::from)?;
        Ok(Self::new(file))
    }
}

impl<R: io::Read> ManifestReader for CsvManifestReader<R> {
    fn read_manifest(mut self) -> Result<Manifest, ManifestValidationError> {
        let headers = self.reader.headers()?.clone();
        let mut manifest = Manifest::new(headers.iter());

        for record in self.reader.records() {
            let record = record?;
            if record.iter().all(|value| value.is_empty()) {
                continue;
            }
            manifest.push_row(record.iter());
        }

        Ok(manifest)
    }
}
