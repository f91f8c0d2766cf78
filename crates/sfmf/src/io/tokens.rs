use std::str::{FromStr, SplitAsciiWhitespace};

use crate::error::SfmError;

/// Whitespace token stream over a fully loaded text file.
///
/// The stream tracks which block of records is being read so that running
/// out of input reports how many of the declared records were complete.
pub(crate) struct Tokens<'a> {
    iter: SplitAsciiWhitespace<'a>,
    text_len: usize,
    section: &'static str,
    declared: usize,
    parsed: usize,
}

impl<'a> Tokens<'a> {
    pub fn new(text: &'a str) -> Self {
        Self {
            iter: text.split_ascii_whitespace(),
            text_len: text.len(),
            section: "header",
            declared: 1,
            parsed: 0,
        }
    }

    /// Start a new block of `declared` records.
    pub fn section(&mut self, what: &'static str, declared: usize) {
        self.section = what;
        self.declared = declared;
        self.parsed = 0;
    }

    /// A capacity for `declared` records of at least `tokens_per_record`
    /// tokens each, bounded by what the input could possibly hold.
    pub fn capacity_hint(&self, declared: usize, tokens_per_record: usize) -> usize {
        // every token but the last takes a separator byte
        let max_records = self.text_len / (2 * tokens_per_record.max(1)) + 1;
        declared.min(max_records)
    }

    /// Mark one record of the current block as complete.
    pub fn record_done(&mut self) {
        self.parsed += 1;
    }

    fn truncated(&self) -> SfmError {
        SfmError::TruncatedRecords {
            what: self.section,
            declared: self.declared,
            parsed: self.parsed,
        }
    }

    /// The next raw token.
    pub fn next_str(&mut self) -> Result<&'a str, SfmError> {
        self.iter.next().ok_or_else(|| self.truncated())
    }

    /// The next token parsed as `T`.
    pub fn parse<T: FromStr>(&mut self, what: &str) -> Result<T, SfmError> {
        let token = self.next_str()?;
        token.parse::<T>().map_err(|_| SfmError::ParseError {
            what: what.to_string(),
            token: token.to_string(),
        })
    }

    /// The next `N` tokens parsed as `T`.
    pub fn parse_array<T: FromStr + Default + Copy, const N: usize>(
        &mut self,
        what: &str,
    ) -> Result<[T; N], SfmError> {
        let mut out = [T::default(); N];
        for val in out.iter_mut() {
            *val = self.parse(what)?;
        }
        Ok(out)
    }

    /// A `count value...` list.
    pub fn parse_counted<T: FromStr>(&mut self, what: &str) -> Result<Vec<T>, SfmError> {
        let count: usize = self.parse(what)?;
        (0..count).map(|_| self.parse(what)).collect()
    }

    /// Fail if any token is left after the current block.
    pub fn expect_end(&mut self) -> Result<(), SfmError> {
        match self.iter.next() {
            None => Ok(()),
            Some(token) => Err(SfmError::TrailingData {
                what: self.section,
                declared: self.declared,
                token: token.to_string(),
            }),
        }
    }
}
