//! Streaming CSV reader

use crate::config::CsvConfig;
use crate::errors::{CsvError, CsvResult};
use crate::quoting::QuoteTracker;
use std::io::Read;
use tracing::{debug, trace};

const BOM: char = '\u{feff}';

/// One decoded data record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CsvRecord {
    /// Source line where reading of the record began (1-indexed).
    ///
    /// Blank lines are skipped, not returned as records; a record read after
    /// blank lines reports the first of them.
    pub line: usize,
    pub values: Vec<String>,
}

/// Reader for CSV files
#[derive(Debug, Clone, Default)]
pub struct CsvReader {
    config: CsvConfig,
}

impl CsvReader {
    /// Create a new CSV reader
    pub fn new() -> Self {
        Self::default()
    }

    /// Use the given dialect configuration
    #[must_use]
    pub fn with_config(mut self, config: CsvConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &CsvConfig {
        &self.config
    }

    /// Start decoding `input`. Records are read one at a time as the iterator advances.
    ///
    /// # Errors
    ///
    /// Returns [`crate::CsvError::Config`] when the dialect cannot be expressed.
    pub fn records<R: Read>(&self, input: R) -> CsvResult<CsvRecordIterator<R>> {
        let tracker = QuoteTracker::new(input, self.config.quote_rules()?);
        let reader = self.config.reader_builder()?.from_reader(tracker);
        debug!(
            delimiter = %self.config.delimiter,
            has_header = self.config.has_header,
            "Opened CSV stream"
        );
        Ok(CsvRecordIterator {
            reader,
            record: csv::StringRecord::new(),
            has_header: self.config.has_header,
            header: None,
            header_read: false,
            finished: false,
        })
    }
}

/// Iterator over the data records of one CSV stream.
///
/// The header row, when configured, is consumed by [`CsvRecordIterator::header`]
/// or implicitly before the first data record. Iteration stops after the first
/// error: a decode failure leaves no reliable record boundary to resume from.
/// A quoted field left open at the end of the input is such a failure.
pub struct CsvRecordIterator<R> {
    reader: csv::Reader<QuoteTracker<R>>,
    record: csv::StringRecord,
    has_header: bool,
    header: Option<Vec<String>>,
    header_read: bool,
    finished: bool,
}

impl<R: Read> CsvRecordIterator<R> {
    /// The header row, with any byte-order mark stripped.
    ///
    /// `None` when the dialect has no header or the stream is empty.
    ///
    /// # Errors
    ///
    /// Fails when the header row itself cannot be decoded.
    pub fn header(&mut self) -> CsvResult<Option<&[String]>> {
        if self.has_header && !self.header_read {
            self.header_read = true;
            match self.read_next() {
                Ok(Some(mut record)) => {
                    if let Some(first) = record.values.first_mut() {
                        if let Some(stripped) = first.strip_prefix(BOM) {
                            *first = stripped.to_string();
                        }
                    }
                    trace!(columns = record.values.len(), "Read CSV header");
                    self.header = Some(record.values);
                }
                Ok(None) => {}
                Err(e) => {
                    self.finished = true;
                    return Err(e);
                }
            }
        }
        Ok(self.header.as_deref())
    }

    fn read_next(&mut self) -> CsvResult<Option<CsvRecord>> {
        let more = self.reader.read_record(&mut self.record)?;
        // Once the source is exhausted the tracker has seen every byte
        if let Some(line) = self.reader.get_ref().unterminated_quote() {
            return Err(CsvError::read_at(
                line,
                "Quoted field is never closed; record boundaries are lost",
            ));
        }
        if !more {
            return Ok(None);
        }
        let line = self
            .record
            .position()
            .map_or(0, |pos| usize::try_from(pos.line()).unwrap_or(usize::MAX));
        Ok(Some(CsvRecord {
            line,
            values: self.record.iter().map(str::to_string).collect(),
        }))
    }
}

impl<R: Read> Iterator for CsvRecordIterator<R> {
    type Item = CsvResult<CsvRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        if let Err(e) = self.header() {
            return Some(Err(e));
        }
        match self.read_next() {
            Ok(Some(record)) => Some(Ok(record)),
            Ok(None) => {
                self.finished = true;
                None
            }
            Err(e) => {
                self.finished = true;
                Some(Err(e))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::CsvError;

    fn read_all(config: CsvConfig, data: &str) -> (Option<Vec<String>>, Vec<CsvRecord>) {
        let mut records = CsvReader::new().with_config(config).records(data.as_bytes()).unwrap();
        let header = records.header().unwrap().map(<[String]>::to_vec);
        let rows = records.collect::<CsvResult<Vec<_>>>().unwrap();
        (header, rows)
    }

    #[test]
    fn test_header_and_records() {
        let (header, rows) = read_all(CsvConfig::new(), "id,name\n1,Alice\n2,Bob\n");
        assert_eq!(header, Some(vec!["id".to_string(), "name".to_string()]));
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].values, vec!["1", "Alice"]);
        assert_eq!(rows[0].line, 2);
        assert_eq!(rows[1].line, 3);
    }

    #[test]
    fn test_header_consumed_implicitly() {
        let mut records = CsvReader::new().records("id\n7\n".as_bytes()).unwrap();
        let first = records.next().unwrap().unwrap();
        assert_eq!(first.values, vec!["7"]);
        assert_eq!(records.header().unwrap(), Some(&["id".to_string()][..]));
        assert!(records.next().is_none());
    }

    #[test]
    fn test_quoted_fields() {
        let data = "id,name\n1,\"Smith, \"\"Jr\"\"\"\n2,\"multi\nline\"\n";
        let (_, rows) = read_all(CsvConfig::new(), data);
        assert_eq!(rows[0].values, vec!["1", "Smith, \"Jr\""]);
        assert_eq!(rows[1].values, vec!["2", "multi\nline"]);
    }

    #[test]
    fn test_ragged_rows_are_returned_as_is() {
        let (_, rows) = read_all(CsvConfig::new(), "a,b\n1\n1,2,3\n");
        assert_eq!(rows[0].values.len(), 1);
        assert_eq!(rows[1].values.len(), 3);
    }

    #[test]
    fn test_byte_order_mark_stripped() {
        let (header, _) = read_all(CsvConfig::new(), "\u{feff}id,name\n1,a\n");
        assert_eq!(header.unwrap()[0], "id");
    }

    #[test]
    fn test_without_header() {
        let (header, rows) = read_all(CsvConfig::new().without_header(), "1,Alice\n");
        assert!(header.is_none());
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].line, 1);
    }

    #[test]
    fn test_empty_input() {
        let (header, rows) = read_all(CsvConfig::new(), "");
        assert!(header.is_none());
        assert!(rows.is_empty());
    }

    #[test]
    fn test_custom_delimiter() {
        let (header, rows) = read_all(CsvConfig::new().delimiter(';'), "id;name\n1;A,B\n");
        assert_eq!(header.unwrap().len(), 2);
        assert_eq!(rows[0].values, vec!["1", "A,B"]);
    }

    #[test]
    fn test_blank_lines_are_skipped() {
        let (_, rows) = read_all(CsvConfig::new(), "code\nA\n\nB\r\n\r\nC");
        let values: Vec<_> = rows.iter().map(|r| r.values[0].as_str()).collect();
        assert_eq!(values, vec!["A", "B", "C"]);
        assert_eq!(rows[0].line, 2);
    }

    #[test]
    fn test_unterminated_quote_is_read_error() {
        let data = "id,name\n1,\"Alice\n2,Bob\n3,Carol\n";
        let mut records = CsvReader::new().records(data.as_bytes()).unwrap();
        assert!(records.header().unwrap().is_some());
        let err = records.next().unwrap().unwrap_err();
        assert!(matches!(err, CsvError::Read { .. }));
        assert_eq!(err.line_number(), Some(2));
        assert!(records.next().is_none());
    }

    #[test]
    fn test_unterminated_quote_in_last_record() {
        let data = "id,name\n1,Alice\n2,\"Bob\n";
        let mut records = CsvReader::new().records(data.as_bytes()).unwrap();
        assert_eq!(records.next().unwrap().unwrap().values, vec!["1", "Alice"]);
        let err = records.next().unwrap().unwrap_err();
        assert_eq!(err.line_number(), Some(3));
    }

    #[test]
    fn test_unterminated_quote_in_header() {
        let mut records = CsvReader::new().records("id,\"name\n1,a\n".as_bytes()).unwrap();
        assert!(records.header().is_err());
        assert!(records.next().is_none());
    }

    #[test]
    fn test_invalid_utf8_stops_iteration() {
        let data: &[u8] = b"id,name\n1,\xff\n2,ok\n";
        let mut records = CsvReader::new().records(data).unwrap();
        let err = records.next().unwrap().unwrap_err();
        assert!(matches!(err, CsvError::Utf8 { .. }));
        assert!(!err.is_io());
        assert!(records.next().is_none());
    }
}
