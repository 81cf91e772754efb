//! Object scanner
//!
//! Streams one object line by line. The first line (header) and the last line
//! (trailer) are metadata and never evaluated. The trailer is only known once
//! the stream ends, so every data line is held back by one line: it is
//! evaluated when its successor arrives, and whatever is still pending at EOF
//! is the trailer. Memory stays at one buffered line regardless of object size.

use std::io;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};

use crate::backends::{ObjectStore, StoreError};
use crate::core::field::{extract_field, POLICY_COLUMNS};
use crate::core::model::{MatchSet, ObjectHandle, SearchKeys};

/// Read buffer per object stream
pub const READ_BUFFER_SIZE: usize = 256 * 1024;

/// Why a single object could not be scanned
#[derive(Debug, Error)]
pub enum ScanError {
    #[error("could not open {path}: {source}")]
    Open {
        path: String,
        #[source]
        source: StoreError,
    },

    #[error("read failed on {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: io::Error,
    },
}

/// Line splitter that ends a line at `\n`, `\r\n` or a bare `\r`
struct LineReader<R> {
    inner: BufReader<R>,
    // The previous line ended with `\r`; a leading `\n` belongs to it
    skip_lf: bool,
}

impl<R: AsyncRead + Unpin> LineReader<R> {
    fn new(reader: R, capacity: usize) -> Self {
        Self {
            inner: BufReader::with_capacity(capacity, reader),
            skip_lf: false,
        }
    }

    /// Read the next line into `buf` without its terminator. Returns false at EOF.
    async fn next_line(&mut self, buf: &mut Vec<u8>) -> io::Result<bool> {
        buf.clear();
        let mut read_any = false;

        loop {
            let available = self.inner.fill_buf().await?;
            if available.is_empty() {
                self.skip_lf = false;
                return Ok(read_any);
            }

            let start = usize::from(self.skip_lf && available[0] == b'\n');
            self.skip_lf = false;

            match available[start..]
                .iter()
                .position(|&b| b == b'\n' || b == b'\r')
            {
                Some(i) => {
                    let end = start + i;
                    buf.extend_from_slice(&available[start..end]);
                    self.skip_lf = available[end] == b'\r';
                    self.inner.consume(end + 1);
                    return Ok(true);
                }
                None => {
                    let len = available.len();
                    buf.extend_from_slice(&available[start..]);
                    read_any |= len > start;
                    self.inner.consume(len);
                }
            }
        }
    }
}

/// Scan a byte stream for `keys`, skipping the header and trailer lines
pub async fn scan_lines<R>(reader: R, keys: &SearchKeys) -> io::Result<MatchSet>
where
    R: AsyncRead + Unpin,
{
    let mut lines = LineReader::new(reader, READ_BUFFER_SIZE);
    let mut buf = Vec::new();
    let mut matched = MatchSet::new();

    // Header
    if !lines.next_line(&mut buf).await? {
        return Ok(matched);
    }

    let mut pending: Option<String> = None;
    while lines.next_line(&mut buf).await? {
        let line = String::from_utf8_lossy(&buf).into_owned();

        // A successor exists, so `prev` is a data line
        if let Some(prev) = pending.replace(line) {
            if let Some(field) = extract_field(&prev, POLICY_COLUMNS) {
                if keys.contains(&field) {
                    matched.insert(field);
                    if matched.len() == keys.len() {
                        return Ok(matched);
                    }
                }
            }
        }
    }

    // `pending` now holds the trailer and is dropped unevaluated
    Ok(matched)
}

/// Open one object and scan it
pub async fn scan_object(
    store: &dyn ObjectStore,
    handle: &ObjectHandle,
    keys: &SearchKeys,
) -> Result<MatchSet, ScanError> {
    let stream = store
        .open_object(handle.namespace(), handle.path())
        .await
        .map_err(|source| ScanError::Open {
            path: handle.path().to_string(),
            source,
        })?;

    scan_lines(stream, keys)
        .await
        .map_err(|source| ScanError::Read {
            path: handle.path().to_string(),
            source,
        })
}
