//! Single byte-range parsing for `Range: bytes=start-[end]`.

use thiserror::Error;

/// Range header parse failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RangeError {
    /// Header is not of the form `bytes=start-[end]`.
    #[error("malformed Range header")]
    Malformed,

    /// More than one range was requested.
    #[error("multiple ranges are not supported")]
    MultipleRanges,

    /// Start lies at or beyond the end of the resource.
    #[error("range start is beyond resource size {total}")]
    Unsatisfiable {
        /// Resource size in bytes.
        total: u64,
    },
}

/// An inclusive byte window inside a resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    /// First byte offset.
    pub start: u64,
    /// Last byte offset (inclusive).
    pub end: u64,
}

impl ByteRange {
    /// Parse a `Range` header value against a resource of `total` bytes.
    ///
    /// An omitted end means "through the last byte"; an end past the
    /// resource is clamped to `total - 1`.
    pub fn parse(header: &str, total: u64) -> Result<Self, RangeError> {
        let header = header.trim();
        let set = header
            .get(..6)
            .filter(|unit| unit.eq_ignore_ascii_case("bytes="))
            .map(|_| header[6..].trim())
            .ok_or(RangeError::Malformed)?;

        if set.contains(',') {
            return Err(RangeError::MultipleRanges);
        }

        let (start, end) = set.split_once('-').ok_or(RangeError::Malformed)?;
        let start: u64 = start.trim().parse().map_err(|_| RangeError::Malformed)?;
        let end = match end.trim() {
            "" => None,
            value => Some(value.parse::<u64>().map_err(|_| RangeError::Malformed)?),
        };

        if end.is_some_and(|end| end < start) {
            return Err(RangeError::Malformed);
        }
        if start >= total {
            return Err(RangeError::Unsatisfiable { total });
        }

        let last = total - 1;
        Ok(Self {
            start,
            end: end.map_or(last, |end| end.min(last)),
        })
    }

    /// Number of bytes in the window.
    #[must_use]
    pub const fn len(&self) -> u64 {
        self.end - self.start + 1
    }

    /// Always false; a parsed range holds at least one byte.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        false
    }

    /// `Content-Range` header value for this window.
    #[must_use]
    pub fn content_range(&self, total: u64) -> String {
        format!("bytes {}-{}/{}", self.start, self.end, total)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rstest::rstest;

    #[rstest]
    #[case("bytes=0-", 100, 0, 99)]
    #[case("bytes=0-0", 100, 0, 0)]
    #[case("bytes=10-19", 100, 10, 19)]
    #[case("bytes=99-", 100, 99, 99)]
    #[case("bytes=50-1000", 100, 50, 99)]
    #[case("  BYTES= 5 - 9 ", 100, 5, 9)]
    fn test_parse_valid(
        #[case] header: &str,
        #[case] total: u64,
        #[case] start: u64,
        #[case] end: u64,
    ) {
        let range = ByteRange::parse(header, total).unwrap();
        assert_eq!(range, ByteRange { start, end });
        assert_eq!(range.len(), end - start + 1);
    }

    #[rstest]
    #[case("items=0-1")]
    #[case("bytes=")]
    #[case("bytes=-500")]
    #[case("bytes=abc-")]
    #[case("bytes=5-x")]
    #[case("bytes=9-3")]
    #[case("0-10")]
    fn test_parse_malformed(#[case] header: &str) {
        assert_eq!(ByteRange::parse(header, 100), Err(RangeError::Malformed));
    }

    #[test]
    fn test_parse_rejects_multiple_ranges() {
        assert_eq!(
            ByteRange::parse("bytes=0-1,5-9", 100),
            Err(RangeError::MultipleRanges)
        );
    }

    #[test]
    fn test_parse_unsatisfiable() {
        assert_eq!(
            ByteRange::parse("bytes=100-", 100),
            Err(RangeError::Unsatisfiable { total: 100 })
        );
        assert_eq!(
            ByteRange::parse("bytes=0-", 0),
            Err(RangeError::Unsatisfiable { total: 0 })
        );
    }

    #[test]
    fn test_content_range() {
        let range = ByteRange { start: 0, end: 0 };
        assert_eq!(range.content_range(42), "bytes 0-0/42");
    }

    proptest! {
        #[test]
        fn prop_parsed_window_stays_inside_resource(
            total in 1u64..1_000_000,
            seed in any::<u64>(),
            end in proptest::option::of(0u64..2_000_000),
        ) {
            let start = seed % total;
            let header = match end {
                Some(end) => format!("bytes={start}-{end}"),
                None => format!("bytes={start}-"),
            };

            match ByteRange::parse(&header, total) {
                Ok(range) => {
                    prop_assert_eq!(range.start, start);
                    prop_assert!(range.end < total);
                    prop_assert_eq!(range.len(), range.end - range.start + 1);
                }
                Err(err) => {
                    prop_assert_eq!(err, RangeError::Malformed);
                    prop_assert!(end.is_some_and(|end| end < start));
                }
            }
        }
    }
}
