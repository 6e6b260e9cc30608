//! HTTP `Range: bytes=` parsing for single ranges.

use crate::error::{StorageError, StorageResult};

/// Inclusive byte range within a file of `total` bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    pub start: u64,
    pub end: u64,
    pub total: u64,
}

impl ByteRange {
    /// Parse a `Range` header value against a file size.
    ///
    /// Supports `bytes=s-e`, `bytes=s-` and suffix `bytes=-n`. An end past the
    /// file is clamped. Multi-range requests are served as their first range.
    pub fn parse(header: &str, total: u64) -> StorageResult<Self> {
        let unsatisfiable = || StorageError::RangeNotSatisfiable { total };

        let spec = header
            .trim()
            .strip_prefix("bytes=")
            .ok_or_else(unsatisfiable)?;
        let first = spec.split(',').next().unwrap_or_default().trim();
        let (start, end) = first.split_once('-').ok_or_else(unsatisfiable)?;
        let (start, end) = (start.trim(), end.trim());

        if total == 0 {
            return Err(unsatisfiable());
        }
        let last = total - 1;

        let (start, end) = if start.is_empty() {
            let suffix: u64 = end.parse().map_err(|_| unsatisfiable())?;
            if suffix == 0 {
                return Err(unsatisfiable());
            }
            (total.saturating_sub(suffix), last)
        } else {
            let start: u64 = start.parse().map_err(|_| unsatisfiable())?;
            let end = if end.is_empty() {
                last
            } else {
                end.parse::<u64>().map_err(|_| unsatisfiable())?.min(last)
            };
            (start, end)
        };

        if start > end || start >= total {
            return Err(unsatisfiable());
        }

        Ok(Self { start, end, total })
    }

    /// Number of bytes covered; never zero.
    #[allow(clippy::len_without_is_empty)]
    pub fn len(&self) -> u64 {
        self.end - self.start + 1
    }

    /// `Content-Range` header value.
    pub fn content_range(&self) -> String {
        format!("bytes {}-{}/{}", self.start, self.end, self.total)
    }
}

/// `Content-Range` value for a 416 response.
pub fn unsatisfied_content_range(total: u64) -> String {
    format!("bytes */{}", total)
}
