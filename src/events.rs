//! Event manager / URC dispatcher (spec §4.6/§4.7).
//!
//! Scans the RX ring for unsolicited result codes (lines beginning with
//! `+`) that arrive outside of any AT command's response window, and
//! offers each to the registered streams' `urc_prefix` handler in
//! registration order until one claims it.

use crate::ringbuf::RingBuffer;
use crate::streams::StreamRegistry;

/// Result of offering one line to the registered streams.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    /// No `+`-prefixed line is present yet.
    NoneWaiting,
    /// A line was found but no registered stream claimed it. Per spec §8
    /// ("a handler returning cancelled leaves the ring untouched"), the
    /// line is left in place; the next call sees the same line again until
    /// a stream is registered that claims it or the foreground otherwise
    /// drains the ring.
    Unclaimed,
    /// `context_id` claimed the line; it has been consumed.
    Claimed(u8),
}

/// Scans for one `+`-prefixed line and offers it to each stream's
/// `urc_prefix` in registration order. Marks the claiming stream's
/// `urc_pending` flag and consumes the line only when one claims it;
/// otherwise the ring is untouched, matching spec §8's cancellation
/// property.
pub fn dispatch_one(ring: &mut RingBuffer<'_>, streams: &mut StreamRegistry) -> Dispatch {
    let Some(plus_off) = ring.find(b"+", 0, 0, false) else {
        return Dispatch::NoneWaiting;
    };
    let Some(line_end) = ring.find(b"\r\n", plus_off, 0, false) else {
        return Dispatch::NoneWaiting;
    };

    let mut claimed = None;
    for sc in streams.iter() {
        if let Some(prefix) = sc.urc_prefix {
            if starts_with_at(ring, plus_off, prefix) {
                claimed = Some(sc.context_id);
                break;
            }
        }
    }

    match claimed {
        Some(context_id) => {
            ring.skip_tail(line_end + 2);
            if let Some(sc) = streams.get_stream_mut(context_id) {
                sc.urc_pending = true;
            }
            crate::log_urc_claimed!(context_id);
            Dispatch::Claimed(context_id)
        }
        None => Dispatch::Unclaimed,
    }
}

fn starts_with_at(ring: &mut RingBuffer<'_>, offset: usize, prefix: &[u8]) -> bool {
    for (i, &b) in prefix.iter().enumerate() {
        match peek(ring, offset + i) {
            Some(actual) if actual == b => {}
            _ => return false,
        }
    }
    true
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
