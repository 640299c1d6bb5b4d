//! On-disk table encodings.

use crate::error::{Result, TabularError};
use frigate_core::{CandidateRecord, CandidateTable};
use std::fmt;
use std::io::Write;
use std::str::FromStr;

const ZSTD_LEVEL: i32 = 3;

/// Supported encodings. Both are one JSON object per line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TableFormat {
    #[default]
    JsonLines,
    /// JSON Lines compressed with zstd.
    JsonLinesZstd,
}

impl TableFormat {
    /// File extension, without the leading dot.
    pub fn extension(&self) -> &'static str {
        match self {
            TableFormat::JsonLines => "jsonl",
            TableFormat::JsonLinesZstd => "jsonl.zst",
        }
    }

    /// Encode a table to bytes.
    pub fn encode(&self, table: &CandidateTable) -> Result<Vec<u8>> {
        let mut buf = Vec::with_capacity(table.len() * 256);
        for record in table.iter() {
            serde_json::to_writer(&mut buf, record)?;
            buf.push(b'\n');
        }
        match self {
            TableFormat::JsonLines => Ok(buf),
            TableFormat::JsonLinesZstd => {
                let mut encoder = zstd::Encoder::new(Vec::new(), ZSTD_LEVEL)
                    .map_err(|e| TabularError::io(format!("zstd encoder: {e}")))?;
                encoder
                    .write_all(&buf)
                    .map_err(|e| TabularError::io(format!("zstd encode: {e}")))?;
                encoder
                    .finish()
                    .map_err(|e| TabularError::io(format!("zstd finish: {e}")))
            }
        }
    }

    /// Decode bytes produced by [`TableFormat::encode`]. `origin` names the
    /// source in error messages.
    pub fn decode(&self, bytes: &[u8], origin: &str) -> Result<CandidateTable> {
        let raw = self.decompress(bytes, origin)?;
        let text = std::str::from_utf8(&raw).map_err(|e| TabularError::Corrupt {
            path: origin.to_string(),
            line: 0,
            message: format!("not UTF-8: {e}"),
        })?;

        let mut table = CandidateTable::new();
        for (i, line) in text.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            let record: CandidateRecord =
                serde_json::from_str(line).map_err(|e| TabularError::Corrupt {
                    path: origin.to_string(),
                    line: i + 1,
                    message: e.to_string(),
                })?;
            table.push(record);
        }
        Ok(table)
    }

    /// Count stored rows without decoding them.
    pub fn count_rows(&self, bytes: &[u8], origin: &str) -> Result<usize> {
        let raw = self.decompress(bytes, origin)?;
        Ok(raw
            .split(|b| *b == b'\n')
            .filter(|line| line.iter().any(|b| !b.is_ascii_whitespace()))
            .count())
    }

    fn decompress(&self, bytes: &[u8], origin: &str) -> Result<Vec<u8>> {
        match self {
            TableFormat::JsonLines => Ok(bytes.to_vec()),
            TableFormat::JsonLinesZstd => {
                zstd::decode_all(bytes).map_err(|e| TabularError::Corrupt {
                    path: origin.to_string(),
                    line: 0,
                    message: format!("zstd: {e}"),
                })
            }
        }
    }
}

impl fmt::Display for TableFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

impl FromStr for TableFormat {
    type Err = TabularError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "jsonl" | "json-lines" | "ndjson" => Ok(TableFormat::JsonLines),
            "jsonl.zst" | "jsonl-zstd" | "zstd" => Ok(TableFormat::JsonLinesZstd),
            other => Err(TabularError::UnsupportedFormat(other.to_string())),
        }
    }
}
