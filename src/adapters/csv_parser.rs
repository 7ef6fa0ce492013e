//! Reference [`FileParser`] for CSV-backed `CSV` job submissions.
//!
//! Each row becomes a JSON object keyed by the header row; the iterator is
//! lazy over the underlying file handle, matching the port's not-restartable
//! contract.

use std::fs::File;
use std::io::BufReader;

use serde_json::Value;

use super::FileParser;
use crate::error::Result;

pub struct CsvFileParser;

impl FileParser for CsvFileParser {
    fn stream_rows(&self, source_ref: &str) -> Result<Box<dyn Iterator<Item = Result<Value>> + Send>> {
        let file = File::open(source_ref)?;
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .from_reader(BufReader::new(file));
        let headers = reader.headers()?.clone();

        let rows = reader.into_records().map(move |record| {
            let record = record?;
            let mut obj = serde_json::Map::with_capacity(headers.len());
            for (header, field) in headers.iter().zip(record.iter()) {
                obj.insert(header.to_string(), Value::String(field.to_string()));
            }
            Ok(Value::Object(obj))
        });

        Ok(Box::new(rows))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn parses_rows_keyed_by_header() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "title,brand,price").unwrap();
        writeln!(file, "Stanley Thermos 16oz,Stanley,35").unwrap();
        writeln!(file, "Unknown gizmo,,").unwrap();
        file.flush().unwrap();

        let parser = CsvFileParser;
        let rows: Vec<Value> = parser
            .stream_rows(file.path().to_str().unwrap())
            .unwrap()
            .collect::<Result<_>>()
            .unwrap();

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["title"], "Stanley Thermos 16oz");
        assert_eq!(rows[0]["brand"], "Stanley");
        assert_eq!(rows[1]["brand"], "");
    }

    #[test]
    fn missing_file_is_an_error() {
        let parser = CsvFileParser;
        assert!(parser.stream_rows("/nonexistent/path.csv").is_err());
    }
}
