//! Quote-state tracking over the raw input bytes
//!
//! The `csv` crate reads an unterminated quoted field to the end of the
//! input and returns it as an ordinary record. [`QuoteTracker`] sits between
//! the source and the decoder, follows the same quoting rules, and reports a
//! quoted field still open once the source is exhausted.

use std::io::{self, Read};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    StartField,
    Unquoted,
    Quoted,
    /// Quote seen inside a quoted field: closes it unless doubled
    QuoteInQuoted,
    /// Escape character seen inside a quoted field
    Escaped,
}

/// Byte-level dialect the tracker follows
#[derive(Debug, Clone, Copy)]
pub(crate) struct QuoteRules {
    pub delimiter: u8,
    pub quote: u8,
    pub double_quote: bool,
    pub escape: Option<u8>,
}

/// Pass-through reader following the quote state of everything read
pub(crate) struct QuoteTracker<R> {
    inner: R,
    rules: QuoteRules,
    state: State,
    line: usize,
    opened_at: usize,
    exhausted: bool,
}

impl<R> QuoteTracker<R> {
    pub(crate) fn new(inner: R, rules: QuoteRules) -> Self {
        Self {
            inner,
            rules,
            state: State::StartField,
            line: 1,
            opened_at: 0,
            exhausted: false,
        }
    }

    /// Line the open quoted field started on, once the source is exhausted
    pub(crate) fn unterminated_quote(&self) -> Option<usize> {
        let open = matches!(self.state, State::Quoted | State::Escaped);
        (self.exhausted && open).then_some(self.opened_at)
    }

    fn observe(&mut self, byte: u8) {
        let rules = self.rules;
        let boundary = byte == rules.delimiter || byte == b'\n' || byte == b'\r';

        self.state = match self.state {
            State::StartField if byte == rules.quote => {
                self.opened_at = self.line;
                State::Quoted
            }
            State::StartField | State::Unquoted if boundary => State::StartField,
            State::StartField | State::Unquoted => State::Unquoted,
            State::Quoted if byte == rules.quote => State::QuoteInQuoted,
            State::Quoted if rules.escape == Some(byte) => State::Escaped,
            State::Quoted | State::Escaped => State::Quoted,
            State::QuoteInQuoted if byte == rules.quote && rules.double_quote => State::Quoted,
            State::QuoteInQuoted if boundary => State::StartField,
            State::QuoteInQuoted => State::Unquoted,
        };

        if byte == b'\n' {
            self.line += 1;
        }
    }
}

impl<R: Read> Read for QuoteTracker<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        if n == 0 && !buf.is_empty() {
            self.exhausted = true;
        }
        for &byte in &buf[..n] {
            self.observe(byte);
        }
        Ok(n)
    }
}
