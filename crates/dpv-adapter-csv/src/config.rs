//! CSV dialect configuration

use crate::errors::{CsvError, CsvResult};
use crate::quoting::QuoteRules;
use dpv_schema::Dialect;

/// Configuration for CSV reading
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CsvConfig {
    /// Field delimiter character (default: comma)
    pub delimiter: char,
    /// Quote character for fields containing special characters (default: double quote)
    pub quote_char: char,
    /// Whether a doubled quote inside a quoted field is an escaped quote (default: true)
    pub double_quote: bool,
    /// Escape character for quotes; `None` relies on doubling
    pub escape_char: Option<char>,
    /// Whether the first record is a header row (default: true)
    pub has_header: bool,
}

impl Default for CsvConfig {
    fn default() -> Self {
        Self {
            delimiter: ',',
            quote_char: '"',
            double_quote: true,
            escape_char: None,
            has_header: true,
        }
    }
}

impl CsvConfig {
    /// Create a new configuration with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the configuration declared by a resource's dialect
    pub fn from_dialect(dialect: &Dialect) -> Self {
        Self {
            delimiter: dialect.delimiter,
            quote_char: dialect.quote_char,
            double_quote: dialect.double_quote,
            escape_char: dialect.escape_char,
            has_header: dialect.header,
        }
    }

    /// Set the delimiter character
    #[must_use]
    pub fn delimiter(mut self, delimiter: char) -> Self {
        self.delimiter = delimiter;
        self
    }

    /// Set the quote character
    #[must_use]
    pub fn quote_char(mut self, quote_char: char) -> Self {
        self.quote_char = quote_char;
        self
    }

    /// Configure doubled-quote escaping
    #[must_use]
    pub fn double_quote(mut self, double_quote: bool) -> Self {
        self.double_quote = double_quote;
        self
    }

    /// Set the escape character
    #[must_use]
    pub fn escape_char(mut self, escape_char: char) -> Self {
        self.escape_char = Some(escape_char);
        self
    }

    /// Configure header presence
    #[must_use]
    pub fn has_header(mut self, has_header: bool) -> Self {
        self.has_header = has_header;
        self
    }

    /// Disable header row
    #[must_use]
    pub fn without_header(mut self) -> Self {
        self.has_header = false;
        self
    }

    /// Convert delimiter to u8 for csv crate
    ///
    /// # Errors
    ///
    /// Returns [`CsvError::Config`] when the delimiter is not ASCII.
    pub fn delimiter_u8(&self) -> CsvResult<u8> {
        ascii_byte("delimiter", self.delimiter)
    }

    /// Convert quote char to u8 for csv crate
    ///
    /// # Errors
    ///
    /// Returns [`CsvError::Config`] when the quote character is not ASCII.
    pub fn quote_char_u8(&self) -> CsvResult<u8> {
        ascii_byte("quote character", self.quote_char)
    }

    /// Get escape character as u8, if set
    ///
    /// # Errors
    ///
    /// Returns [`CsvError::Config`] when the escape character is not ASCII.
    pub fn escape_char_u8(&self) -> CsvResult<Option<u8>> {
        self.escape_char
            .map(|c| ascii_byte("escape character", c))
            .transpose()
    }

    /// A csv reader builder for this dialect; every record, header included, is read raw.
    pub(crate) fn reader_builder(&self) -> CsvResult<csv::ReaderBuilder> {
        let mut builder = csv::ReaderBuilder::new();
        builder
            .delimiter(self.delimiter_u8()?)
            .quote(self.quote_char_u8()?)
            .double_quote(self.double_quote)
            .escape(self.escape_char_u8()?)
            .has_headers(false)
            .flexible(true);
        Ok(builder)
    }

    /// The quoting rules of this dialect, as bytes
    pub(crate) fn quote_rules(&self) -> CsvResult<QuoteRules> {
        Ok(QuoteRules {
            delimiter: self.delimiter_u8()?,
            quote: self.quote_char_u8()?,
            double_quote: self.double_quote,
            escape: self.escape_char_u8()?,
        })
    }
}

fn ascii_byte(name: &str, c: char) -> CsvResult<u8> {
    u8::try_from(c)
        .ok()
        .filter(u8::is_ascii)
        .ok_or_else(|| CsvError::config(format!("{name} '{c}' is not a single ASCII character")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = CsvConfig::default();
        assert_eq!(config.delimiter, ',');
        assert_eq!(config.quote_char, '"');
        assert!(config.double_quote);
        assert_eq!(config.escape_char, None);
        assert!(config.has_header);
    }

    #[test]
    fn test_config_builder() {
        let config = CsvConfig::new()
            .delimiter(';')
            .quote_char('\'')
            .double_quote(false)
            .escape_char('\\')
            .without_header();

        assert_eq!(config.delimiter, ';');
        assert_eq!(config.quote_char, '\'');
        assert!(!config.double_quote);
        assert_eq!(config.escape_char, Some('\\'));
        assert!(!config.has_header);
    }

    #[test]
    fn test_config_conversions() {
        let config = CsvConfig::new()
            .delimiter('\t')
            .quote_char('\'')
            .escape_char('\\');

        assert_eq!(config.delimiter_u8().unwrap(), b'\t');
        assert_eq!(config.quote_char_u8().unwrap(), b'\'');
        assert_eq!(config.escape_char_u8().unwrap(), Some(b'\\'));
        assert_eq!(CsvConfig::new().escape_char_u8().unwrap(), None);
    }

    #[test]
    fn test_non_ascii_delimiter_rejected() {
        let config = CsvConfig::new().delimiter('§');
        assert!(matches!(config.delimiter_u8(), Err(CsvError::Config(_))));
        assert!(config.reader_builder().is_err());
    }

    #[test]
    fn test_from_dialect() {
        let dialect = Dialect {
            delimiter: '|',
            header: false,
            ..Dialect::default()
        };
        let config = CsvConfig::from_dialect(&dialect);
        assert_eq!(config.delimiter, '|');
        assert!(!config.has_header);
        assert_eq!(config.quote_char, '"');
    }
}
