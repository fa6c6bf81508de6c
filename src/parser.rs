//! Standard AT response parser (spec §4.4).
//!
//! Scans the RX ring's occupied bytes for a landmark (the expected leading
//! token of a successful response), tokenizes on a configurable delimiter,
//! and recognizes the terminal lines (`OK`, `ERROR`, `+CME ERROR: n`,
//! `+CMS ERROR: n`) that close a command regardless of whether the landmark
//! ever appeared.

use heapless::Vec;

use crate::config::MAX_TOKENS;
use crate::error::ResultCode;
use crate::ringbuf::RingBuffer;

/// Parser configuration (spec §4.4 "landmark, landmark-required, delimiter,
/// minimum token count, terminator, max-scan").
#[derive(Debug, Clone, Copy)]
pub struct ParserConfig<'a> {
    /// Expected leading token of a successful response, e.g. `b"+QCSQ:"`.
    /// Empty means "no landmark required regardless of `landmark_required`".
    pub landmark: &'a [u8],
    /// If true, a terminal `OK` without the landmark having been seen is
    /// reported as [`ResultCode::NotFound`] rather than [`ResultCode::Success`].
    pub landmark_required: bool,
    /// Token delimiter, e.g. `b","`.
    pub delimiter: u8,
    /// Minimum number of delimited tokens a landmark line must carry to be
    /// accepted; fewer is treated as a parse failure (`InternalError`).
    pub min_tokens: usize,
    /// Expected terminal sequence for a bare success with no landmark line,
    /// e.g. `b"\r\nOK\r\n"`. Always also recognizes `ERROR`/`+CME
    /// ERROR`/`+CMS ERROR` regardless of this value.
    pub terminator: &'a [u8],
    /// Bound on how many bytes to scan looking for the landmark (0 = scan
    /// everything occupied).
    pub max_scan: usize,
}

impl<'a> Default for ParserConfig<'a> {
    fn default() -> Self {
        Self {
            landmark: b"",
            landmark_required: false,
            delimiter: b',',
            min_tokens: 0,
            terminator: b"\r\nOK\r\n",
            max_scan: 0,
        }
    }
}

/// Token offsets within the landmark line, relative to the ring's tail at
/// the time parsing completed.
pub type TokenSet = Vec<(usize, usize), MAX_TOKENS>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseOutcome {
    Pending,
    Success,
    Error(ResultCode),
}

/// Result of a completed parse: outcome plus the tokens of the landmark
/// line, if one was found and tokenized.
#[derive(Debug, Clone)]
pub struct ParseResult {
    pub outcome: ParseOutcome,
    pub tokens: TokenSet,
}

/// Attempts to parse a complete response out of `ring`'s occupied bytes per
/// `cfg`. A successful parse only peeks at the terminator and leaves the
/// ring untouched, so the caller can still read the response bytes (raw or
/// tokenized) afterward; the next dispatch's `reset()` is what actually
/// drops them. An error terminal is consumed immediately since nothing
/// downstream needs those bytes. [`ParseOutcome::Pending`] never touches
/// the ring either way.
pub fn parse_standard(ring: &mut RingBuffer<'_>, cfg: &ParserConfig<'_>) -> ParseResult {
    if let Some(code) = scan_for_error_terminal(ring, cfg) {
        return ParseResult {
            outcome: ParseOutcome::Error(code),
            tokens: TokenSet::new(),
        };
    }

    if !cfg.landmark.is_empty() {
        if let Some(landmark_off) = ring.find(cfg.landmark, 0, cfg.max_scan, false) {
            if let Some(line_end) = ring.find(b"\r\n", landmark_off, 0, false) {
                let mut tok_start = landmark_off + cfg.landmark.len();
                if peek_byte(ring, tok_start) == Some(b' ') {
                    tok_start += 1;
                }
                let tokens = tokenize(ring, tok_start, line_end, cfg.delimiter);
                if tokens.len() < cfg.min_tokens {
                    ring.skip_tail(line_end + 2);
                    return ParseResult {
                        outcome: ParseOutcome::Error(ResultCode::InternalError),
                        tokens: TokenSet::new(),
                    };
                }
                if ring.find(b"\r\nOK\r\n", line_end, 0, false).is_some() {
                    return ParseResult {
                        outcome: ParseOutcome::Success,
                        tokens,
                    };
                }
                return ParseResult {
                    outcome: ParseOutcome::Pending,
                    tokens: TokenSet::new(),
                };
            }
        }
        if cfg.landmark_required {
            if ring.find(b"\r\nOK\r\n", 0, 0, true).is_some() {
                return ParseResult {
                    outcome: ParseOutcome::Error(ResultCode::NotFound),
                    tokens: TokenSet::new(),
                };
            }
            return ParseResult {
                outcome: ParseOutcome::Pending,
                tokens: TokenSet::new(),
            };
        }
    }

    if ring.find(cfg.terminator, 0, 0, false).is_some() {
        return ParseResult {
            outcome: ParseOutcome::Success,
            tokens: TokenSet::new(),
        };
    }

    ParseResult {
        outcome: ParseOutcome::Pending,
        tokens: TokenSet::new(),
    }
}

/// Checks for a terminal error line anywhere in the occupied bytes,
/// consuming through it if found.
fn scan_for_error_terminal(ring: &mut RingBuffer<'_>, cfg: &ParserConfig<'_>) -> Option<ResultCode> {
    if let Some(off) = ring.find(b"+CME ERROR: ", 0, cfg.max_scan, false) {
        let num_start = off + b"+CME ERROR: ".len();
        let line_end = ring.find(b"\r\n", num_start, 0, false)?;
        let n = read_u16(ring, num_start, line_end);
        ring.skip_tail(line_end + 2);
        return Some(ResultCode::from_vendor_error(n));
    }
    if let Some(off) = ring.find(b"+CMS ERROR: ", 0, cfg.max_scan, false) {
        let num_start = off + b"+CMS ERROR: ".len();
        let line_end = ring.find(b"\r\n", num_start, 0, false)?;
        let n = read_u16(ring, num_start, line_end);
        ring.skip_tail(line_end + 2);
        return Some(ResultCode::from_vendor_error(n));
    }
    if ring.find(b"\r\nERROR\r\n", 0, cfg.max_scan, true).is_some() {
        return Some(ResultCode::InternalError);
    }
    None
}

fn read_u16(ring: &mut RingBuffer<'_>, start: usize, end: usize) -> u16 {
    let mut value: u16 = 0;
    for i in start..end {
        if let Some(b) = peek_byte(ring, i) {
            if b.is_ascii_digit() {
                value = value * 10 + (b - b'0') as u16;
            }
        }
    }
    value
}

fn peek_byte(ring: &mut RingBuffer<'_>, offset: usize) -> Option<u8> {
    if offset >= ring.occupied() {
        return None;
    }
    let chunk = ring.reserve_pop(offset + 1);
    let b = chunk.last().copied();
    ring.finalize_pop(false);
    b
}

fn tokenize(ring: &mut RingBuffer<'_>, start: usize, end: usize, delim: u8) -> TokenSet {
    let mut tokens = TokenSet::new();
    let mut tok_start = start;
    let mut i = start;
    while i < end {
        if peek_byte(ring, i) == Some(delim) {
            let _ = tokens.push((tok_start, i));
            tok_start = i + 1;
        }
        i += 1;
    }
    if tok_start < end {
        let _ = tokens.push((tok_start, end));
    }
    tokens
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ring_with(data: &[u8], storage: &mut [u8]) -> RingBuffer<'_> {
        let mut r = RingBuffer::new(storage);
        let dst = r.reserve_push(data.len());
        dst.copy_from_slice(data);
        r.finalize_push(data.len());
        r
    }

    #[test]
    fn bare_ok_with_no_landmark_is_success() {
        let mut storage = [0u8; 64];
        let mut r = ring_with(b"\r\nOK\r\n", &mut storage);
        let cfg = ParserConfig::default();
        let result = parse_standard(&mut r, &cfg);
        assert_eq!(result.outcome, ParseOutcome::Success);
        // A successful parse only peeks; the ring keeps its content until
        // the next dispatch resets it.
        assert_eq!(r.occupied(), 6);
    }

    #[test]
    fn plain_error_terminal_is_internal_error() {
        let mut storage = [0u8; 64];
        let mut r = ring_with(b"\r\nERROR\r\n", &mut storage);
        let cfg = ParserConfig::default();
        let result = parse_standard(&mut r, &cfg);
        assert_eq!(result.outcome, ParseOutcome::Error(ResultCode::InternalError));
    }

    #[test]
    fn cme_error_maps_to_vendor_extended_offset() {
        let mut storage = [0u8; 64];
        let mut r = ring_with(b"\r\n+CME ERROR: 17\r\n", &mut storage);
        let cfg = ParserConfig::default();
        let result = parse_standard(&mut r, &cfg);
        assert_eq!(
            result.outcome,
            ParseOutcome::Error(ResultCode::VendorExtended(517))
        );
    }

    #[test]
    fn incomplete_response_without_terminator_is_pending() {
        let mut storage = [0u8; 64];
        let mut r = ring_with(b"+QCSQ: 20,9", &mut storage);
        let cfg = ParserConfig {
            landmark: b"+QCSQ:",
            ..ParserConfig::default()
        };
        let result = parse_standard(&mut r, &cfg);
        assert_eq!(result.outcome, ParseOutcome::Pending);
    }

    #[test]
    fn landmark_line_is_tokenized_on_comma() {
        let mut storage = [0u8; 64];
        let mut r = ring_with(b"\r\n+QCSQ: 20,9,5,255\r\n\r\nOK\r\n", &mut storage);
        let cfg = ParserConfig {
            landmark: b"+QCSQ:",
            min_tokens: 3,
            ..ParserConfig::default()
        };
        let result = parse_standard(&mut r, &cfg);
        assert_eq!(result.outcome, ParseOutcome::Success);
        assert_eq!(result.tokens.len(), 4);
    }

    #[test]
    fn landmark_required_but_absent_is_not_found() {
        let mut storage = [0u8; 64];
        let mut r = ring_with(b"\r\nOK\r\n", &mut storage);
        let cfg = ParserConfig {
            landmark: b"+QCSQ:",
            landmark_required: true,
            ..ParserConfig::default()
        };
        let result = parse_standard(&mut r, &cfg);
        assert_eq!(result.outcome, ParseOutcome::Error(ResultCode::NotFound));
    }
}
