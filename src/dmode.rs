//! Data-mode handlers (spec §4.5): once the AT-command engine reports
//! [`crate::atcmd::State::DataMode`], one of these takes over consuming
//! the framed payload out of the RX ring.

use crate::config::DATA_MODE_TRAILER;
use crate::error::ResultCode;
use crate::ringbuf::RingBuffer;

/// Outcome of a data-mode drain attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataModeOutcome {
    Pending,
    Complete(ResultCode),
}

/// `CONNECT <len>\r\n<bytes>\r\nOK\r\n` framed read (spec §4.5, file read).
/// `dst` is the caller's buffer; a response larger than `dst` yields
/// [`ResultCode::PartialContent`] with the buffer filled to capacity and
/// the remainder dropped, matching the original's `file_read` behavior.
pub struct LengthFramedRx {
    expected_len: Option<usize>,
    written: usize,
}

impl LengthFramedRx {
    pub fn new() -> Self {
        Self {
            expected_len: None,
            written: 0,
        }
    }

    pub fn bytes_written(&self) -> usize {
        self.written
    }

    /// Drives the drain forward. `trigger` is the literal already matched
    /// by the AT engine (e.g. `b"CONNECT "`); this call parses the length
    /// that follows it, then copies payload bytes into `dst` as they
    /// arrive, stopping at the trailer.
    pub fn poll(&mut self, ring: &mut RingBuffer<'_>, trigger: &[u8], dst: &mut [u8]) -> DataModeOutcome {
        if self.expected_len.is_none() {
            let Some(trig_off) = ring.find(trigger, 0, 0, false) else {
                return DataModeOutcome::Pending;
            };
            let num_start = trig_off + trigger.len();
            let Some(line_end) = ring.find(b"\r\n", num_start, 0, false) else {
                return DataModeOutcome::Pending;
            };
            let mut len = 0usize;
            for i in num_start..line_end {
                if let Some(b) = peek(ring, i) {
                    if b.is_ascii_digit() {
                        len = len * 10 + (b - b'0') as usize;
                    }
                }
            }
            ring.skip_tail(line_end + 2);
            self.expected_len = Some(len);
        }

        let expected = self.expected_len.unwrap();
        let remaining = expected - self.written;
        if remaining > 0 {
            let avail = ring.occupied().min(remaining);
            if avail > 0 {
                let slot = self.written..(self.written + avail).min(dst.len());
                let copy_len = slot.len();
                if copy_len > 0 {
                    let copied = ring.pop_to(&mut dst[slot.clone()]);
                    self.written += copied;
                } else {
                    ring.skip_tail(avail);
                    self.written += avail;
                }
            }
        }

        if self.written < expected {
            return DataModeOutcome::Pending;
        }

        if ring.find(DATA_MODE_TRAILER, 0, 0, true).is_none() {
            return DataModeOutcome::Pending;
        }

        if self.written > dst.len() {
            DataModeOutcome::Complete(ResultCode::PartialContent)
        } else {
            DataModeOutcome::Complete(ResultCode::Success)
        }
    }
}

impl Default for LengthFramedRx {
    fn default() -> Self {
        Self::new()
    }
}

fn peek(ring: &mut RingBuffer<'_>, offset: usize) -> Option<u8> {
    if offset >= ring.occupied() {
        return None;
    }
    let chunk = ring.reserve_pop(offset + 1);
    let b = chunk.last().copied();
    ring.finalize_pop(false);
    b
}

/// Default TX data mode (spec §4.5, file write): the caller already pushed
/// the payload bytes out through [`crate::iop::Iop::start_tx`] after
/// `CONNECT\r\n` was observed; this just watches for the completion echo,
/// e.g. `+QFWRITE: <written>,<size>\r\nOK\r\n`, and records the two numbers
/// it carries.
pub struct DefaultTx {
    landmark: &'static [u8],
    written_sz: usize,
    file_sz: usize,
}

impl DefaultTx {
    pub fn new(landmark: &'static [u8]) -> Self {
        Self {
            landmark,
            written_sz: 0,
            file_sz: 0,
        }
    }

    /// Bytes the modem reported as written (first `+QFWRITE:` field).
    /// Meaningless until [`DefaultTx::poll`] returns `Complete`.
    pub fn written_sz(&self) -> usize {
        self.written_sz
    }

    /// Resulting file size (second `+QFWRITE:` field).
    pub fn file_sz(&self) -> usize {
        self.file_sz
    }

    /// Returns the number of bytes the modem reported as written, or
    /// `Pending` until the completion line arrives.
    pub fn poll(&mut self, ring: &mut RingBuffer<'_>) -> DataModeOutcome {
        let Some(off) = ring.find(self.landmark, 0, 0, false) else {
            return DataModeOutcome::Pending;
        };
        let Some(line_end) = ring.find(b"\r\n", off, 0, false) else {
            return DataModeOutcome::Pending;
        };
        if ring.find(b"\r\nOK\r\n", line_end, 0, true).is_none() {
            return DataModeOutcome::Pending;
        }

        let (written, size) = parse_two_counts(ring, off + self.landmark.len(), line_end);
        self.written_sz = written;
        self.file_sz = size;
        DataModeOutcome::Complete(ResultCode::Success)
    }
}

/// Parses `" <a>,<b>"` between `start` and `end`, tolerating the single
/// leading space the modem puts after the landmark colon.
fn parse_two_counts(ring: &mut RingBuffer<'_>, start: usize, end: usize) -> (usize, usize) {
    let mut first = 0usize;
    let mut second = 0usize;
    let mut seen_comma = false;
    for i in start..end {
        let Some(b) = peek(ring, i) else { break };
        match b {
            b' ' => {}
            b',' => seen_comma = true,
            b if b.is_ascii_digit() => {
                let digit = (b - b'0') as usize;
                if seen_comma {
                    second = second * 10 + digit;
                } else {
                    first = first * 10 + digit;
                }
            }
            _ => break,
        }
    }
    (first, second)
}
