//! DRAM Trace Reader.
//!
//! Traces are text files with one request per line: a hexadecimal byte
//! address (the `0x` prefix is optional) followed by `R` or `W`. Blank lines
//! are ignored.
//!
//! ```text
//! 0x12345680 R
//! 4cbd56c0 W
//! ```

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use crate::common::data::RequestType;
use crate::common::error::SimError;

/// One trace record.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TraceEntry {
    pub addr: u64,
    pub kind: RequestType,
}

/// Streaming trace reader.
pub struct TraceReader<R> {
    lines: std::io::Lines<R>,
    line_no: usize,
}

impl TraceReader<BufReader<File>> {
    /// Opens a trace file.
    ///
    /// # Errors
    ///
    /// Returns [`SimError::Io`] if the file cannot be opened.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, SimError> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|source| SimError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Ok(Self::new(BufReader::new(file)))
    }
}

impl<R: BufRead> TraceReader<R> {
    /// Wraps any buffered reader.
    pub fn new(reader: R) -> Self {
        Self {
            lines: reader.lines(),
            line_no: 0,
        }
    }
}

impl<R: BufRead> Iterator for TraceReader<R> {
    type Item = Result<TraceEntry, SimError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let line = match self.lines.next()? {
                Ok(line) => line,
                Err(e) => {
                    return Some(Err(SimError::Trace {
                        line: self.line_no + 1,
                        msg: e.to_string(),
                    }))
                }
            };
            self.line_no += 1;
            if line.trim().is_empty() {
                continue;
            }
            return Some(parse_line(&line).map_err(|msg| SimError::Trace {
                line: self.line_no,
                msg,
            }));
        }
    }
}

/// Parses one non-empty trace line.
pub fn parse_line(line: &str) -> Result<TraceEntry, String> {
    let mut fields = line.split_whitespace();
    let addr_str = fields.next().ok_or("missing address")?;
    let kind_str = fields.next().ok_or("missing request type")?;
    if let Some(extra) = fields.next() {
        return Err(format!("unexpected field '{}'", extra));
    }

    let hex = addr_str
        .strip_prefix("0x")
        .or_else(|| addr_str.strip_prefix("0X"))
        .unwrap_or(addr_str);
    let addr =
        u64::from_str_radix(hex, 16).map_err(|e| format!("bad address '{}': {}", addr_str, e))?;

    let kind = match kind_str {
        "R" => RequestType::Read,
        "W" => RequestType::Write,
        other => return Err(format!("unknown request type '{}'", other)),
    };
    Ok(TraceEntry { addr, kind })
}
