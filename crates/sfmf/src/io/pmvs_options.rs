use std::{collections::VecDeque, io::Write, path::Path, str::FromStr};

use super::compressed::{read_file_text, OutputFile};
use crate::{error::SfmError, pmvs::PmvsOptions};

/// Read a PMVS options file.
///
/// # Arguments
///
/// * `path` - The path to the options file.
///
/// # Returns
///
/// The options, with PMVS defaults for keywords missing from the file.
pub fn read_pmvs_options(path: impl AsRef<Path>) -> Result<PmvsOptions, SfmError> {
    let path = path.as_ref();
    let text = read_file_text(path)?;
    parse_pmvs_options(&text)
}

/// Pulls tokens from the current line first and then from the lines after.
struct LineTokens<'a, I: Iterator<Item = &'a str>> {
    pending: VecDeque<&'a str>,
    lines: I,
}

impl<'a, I: Iterator<Item = &'a str>> LineTokens<'a, I> {
    fn next_token(&mut self) -> Option<&'a str> {
        loop {
            if let Some(token) = self.pending.pop_front() {
                return Some(token);
            }
            let line = self.lines.next()?;
            self.pending.extend(line.split_whitespace());
        }
    }

    fn parse<T: FromStr>(&mut self, keyword: &str) -> Result<T, SfmError> {
        let token = self.next_token().unwrap_or_default();
        token.parse::<T>().map_err(|_| SfmError::ParseError {
            what: format!("option {keyword}"),
            token: token.to_string(),
        })
    }

    fn parse_flag(&mut self, keyword: &str) -> Result<bool, SfmError> {
        Ok(self.parse::<u32>(keyword)? != 0)
    }

    /// An explicit `count value...` list or a `-1 begin end` range.
    fn parse_sequence(&mut self, keyword: &str) -> Result<Vec<u32>, SfmError> {
        let len: i64 = self.parse(keyword)?;
        if len > 0 {
            (0..len).map(|_| self.parse(keyword)).collect()
        } else if len < 0 {
            let begin: u32 = self.parse(keyword)?;
            let end: u32 = self.parse(keyword)?;
            if end < begin {
                return Err(SfmError::ParseError {
                    what: format!("option {keyword} range"),
                    token: format!("{begin} {end}"),
                });
            }
            Ok((begin..end).collect())
        } else {
            Ok(Vec::new())
        }
    }
}

/// Parse the content of a PMVS options file.
///
/// Lines starting with `#` are comments. Unknown keywords are ignored
/// together with the rest of their line.
pub fn parse_pmvs_options(text: &str) -> Result<PmvsOptions, SfmError> {
    let mut opts = PmvsOptions::default();

    let lines = text
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'));
    let mut tokens = LineTokens {
        pending: VecDeque::new(),
        lines,
    };

    while let Some(line) = tokens.lines.next() {
        let mut parts = line.split_whitespace();
        let Some(keyword) = parts.next() else {
            continue;
        };
        tokens.pending = parts.collect();

        match keyword {
            "level" => opts.level = tokens.parse(keyword)?,
            "csize" => opts.csize = tokens.parse(keyword)?,
            "threshold" => opts.threshold = tokens.parse(keyword)?,
            "wsize" => opts.wsize = tokens.parse(keyword)?,
            "minImageNum" => opts.min_image_num = tokens.parse(keyword)?,
            "CPU" => opts.cpu = tokens.parse(keyword)?,
            "setEdge" => opts.set_edge = tokens.parse(keyword)?,
            "useBound" => opts.use_bound = tokens.parse_flag(keyword)?,
            "useVisData" => opts.use_vis_data = tokens.parse_flag(keyword)?,
            "sequence" => opts.sequence = tokens.parse(keyword)?,
            "maxAngle" => opts.max_angle = tokens.parse(keyword)?,
            "quad" => opts.quad = tokens.parse(keyword)?,
            "timages" => opts.timages = tokens.parse_sequence(keyword)?,
            "oimages" => opts.oimages = tokens.parse_sequence(keyword)?,
            _ => log::debug!("Ignoring PMVS option {keyword}"),
        }

        // whatever is left on the line is ignored
        tokens.pending.clear();
    }

    Ok(opts)
}

fn write_sequence<W: Write>(writer: &mut W, keyword: &str, values: &[u32]) -> std::io::Result<()> {
    write!(writer, "{keyword} {}", values.len())?;
    for v in values {
        write!(writer, " {v}")?;
    }
    writeln!(writer)
}

/// Serialize options in the PMVS options file format.
pub fn serialize_pmvs_options<W: Write>(opts: &PmvsOptions, writer: &mut W) -> std::io::Result<()> {
    writeln!(writer, "level {}", opts.level)?;
    writeln!(writer, "csize {}", opts.csize)?;
    writeln!(writer, "threshold {}", opts.threshold)?;
    writeln!(writer, "wsize {}", opts.wsize)?;
    writeln!(writer, "minImageNum {}", opts.min_image_num)?;
    writeln!(writer, "CPU {}", opts.cpu)?;
    writeln!(writer, "setEdge {}", opts.set_edge)?;
    writeln!(writer, "useBound {}", opts.use_bound as u32)?;
    writeln!(writer, "useVisData {}", opts.use_vis_data as u32)?;
    writeln!(writer, "sequence {}", opts.sequence)?;
    writeln!(writer, "maxAngle {}", opts.max_angle)?;
    writeln!(writer, "quad {}", opts.quad)?;
    write_sequence(writer, "timages", &opts.timages)?;
    write_sequence(writer, "oimages", &opts.oimages)
}

/// Write a PMVS options file.
pub fn write_pmvs_options(opts: &PmvsOptions, path: impl AsRef<Path>) -> Result<(), SfmError> {
    let path = path.as_ref();
    let mut out = OutputFile::create(path)?;
    serialize_pmvs_options(opts, &mut out)
        .and_then(|_| out.finish())
        .map_err(|e| SfmError::file(path, e))
}
