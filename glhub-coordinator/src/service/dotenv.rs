//! Dotenv Reports
//!
//! Parsing of `artifacts:reports:dotenv` files, either pulled out of an
//! uploaded artifact archive or uploaded on their own (gzip-compressed).

use std::io::Cursor;

use indexmap::IndexMap;
use thiserror::Error;

use crate::compress::{self, DecompressError};

/// Largest dotenv report accepted, after decompression
pub const MAX_REPORT_SIZE: u64 = 1024 * 1024;

#[derive(Debug, Error)]
pub enum DotenvError {
    #[error("invalid artifact archive: {0}")]
    Archive(#[from] zip::result::ZipError),

    #[error("failed to read report: {0}")]
    Read(#[from] DecompressError),
}

/// Parse `KEY=VALUE` lines
///
/// Blank lines, `#` comments and lines without `=` or with an empty key are
/// skipped. Values wrapped in matching quotes lose them; there is no escape
/// processing.
pub fn parse_dotenv(content: &str) -> IndexMap<String, String> {
    let mut vars = IndexMap::new();
    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        let key = key.trim();
        if key.is_empty() {
            continue;
        }
        vars.insert(key.to_string(), unquote(value.trim()).to_string());
    }
    vars
}

fn unquote(value: &str) -> &str {
    for quote in ['"', '\''] {
        if value.len() >= 2 && value.starts_with(quote) && value.ends_with(quote) {
            return &value[1..value.len() - 1];
        }
    }
    value
}

/// Read `name` from a zip archive; `Ok(None)` when the archive lacks it
pub fn extract_from_zip(archive: &[u8], name: &str) -> Result<Option<String>, DotenvError> {
    let mut archive = zip::ZipArchive::new(Cursor::new(archive))?;
    let name = name.trim_start_matches("./");
    let mut file = match archive.by_name(name) {
        Ok(file) => file,
        Err(zip::result::ZipError::FileNotFound) => return Ok(None),
        Err(err) => return Err(err.into()),
    };

    let content = compress::read_limited(&mut file, MAX_REPORT_SIZE)?;
    Ok(Some(String::from_utf8_lossy(&content).into_owned()))
}

/// Raw bytes of a separately uploaded report, gunzipped when `gzip` is set
pub fn read_report(data: Vec<u8>, gzip: bool) -> Result<Vec<u8>, DotenvError> {
    if gzip {
        return Ok(compress::gunzip(&data, MAX_REPORT_SIZE)?);
    }
    if data.len() as u64 > MAX_REPORT_SIZE {
        return Err(DecompressError::TooLarge(MAX_REPORT_SIZE).into());
    }
    Ok(data)
}
