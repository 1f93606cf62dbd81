//! # dpv-adapter-csv
//!
//! Streaming CSV decoding for tabular data resources.
//!
//! Records are decoded one at a time so a resource of any size can be
//! validated in constant memory. The dialect (delimiter, quoting, header
//! presence) comes from the resource declaration.
//!
//! ## Example Usage
//!
//! ```rust
//! use dpv_adapter_csv::{CsvConfig, CsvReader, CsvResult};
//!
//! let data = "id;name\n1;Alice\n";
//! let reader = CsvReader::new().with_config(CsvConfig::new().delimiter(';'));
//!
//! let mut records = reader.records(data.as_bytes()).unwrap();
//! assert_eq!(records.header().unwrap().map(<[String]>::len), Some(2));
//!
//! let rows = records.collect::<CsvResult<Vec<_>>>().unwrap();
//! assert_eq!(rows[0].values, vec!["1", "Alice"]);
//! ```

pub mod config;
pub mod errors;
mod quoting;
pub mod reader;

// Re-export main types
pub use config::CsvConfig;
pub use errors::{CsvError, CsvResult};
pub use reader::{CsvReader, CsvRecord, CsvRecordIterator};
