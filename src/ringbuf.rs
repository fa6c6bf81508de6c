//! Single-producer/single-consumer byte ring buffer (spec §4.1, "BBFFR").
//!
//! Shared between the ISR (producer on RX, consumer draining TX staging)
//! and the foreground (consumer on RX, producer on TX). This type itself
//! only implements the RX-side ring; TX staging lives in [`crate::iop`]
//! since it is a plain owned buffer, not a shared ring.
//!
//! Mirrors the original `bbffr_*` C API: `push_block`/`finalize_push` and
//! `pop_block`/`finalize_pop` expose at most one contiguous region per
//! side so the caller can read/write the hardware FIFO directly into the
//! ring without an intermediate copy.

/// Bounded byte ring buffer with zero-copy block reservation.
pub struct RingBuffer<'a> {
    buf: &'a mut [u8],
    head: usize,
    tail: usize,
    len: usize,
    push_reserved: Option<usize>,
    pop_reserved: Option<usize>,
}

impl<'a> RingBuffer<'a> {
    pub fn new(buf: &'a mut [u8]) -> Self {
        Self {
            buf,
            head: 0,
            tail: 0,
            len: 0,
            push_reserved: None,
            pop_reserved: None,
        }
    }

    pub fn capacity(&self) -> usize {
        self.buf.len()
    }

    pub fn occupied(&self) -> usize {
        self.len
    }

    pub fn free(&self) -> usize {
        self.buf.len() - self.len
    }

    /// Reserves up to `want` contiguous free bytes for a producer to write
    /// into directly. At most one reservation may be outstanding per side.
    pub fn reserve_push(&mut self, want: usize) -> &mut [u8] {
        debug_assert!(self.push_reserved.is_none(), "push already reserved");
        let avail = want.min(self.free());
        let run = avail.min(self.buf.len() - self.head);
        self.push_reserved = Some(run);
        &mut self.buf[self.head..self.head + run]
    }

    /// Commits `committed` bytes (`<=` the reserved length) as written,
    /// advancing the head.
    pub fn finalize_push(&mut self, committed: usize) {
        let reserved = self.push_reserved.take().expect("no push reservation");
        let committed = committed.min(reserved);
        self.head = wrap(self.head + committed, self.buf.len());
        self.len += committed;
    }

    /// Reserves up to `want` contiguous occupied bytes for a consumer to
    /// read directly.
    pub fn reserve_pop(&mut self, want: usize) -> &[u8] {
        debug_assert!(self.pop_reserved.is_none(), "pop already reserved");
        let avail = want.min(self.occupied());
        let run = avail.min(self.buf.len() - self.tail);
        self.pop_reserved = Some(run);
        &self.buf[self.tail..self.tail + run]
    }

    /// Finalizes the outstanding pop reservation. Advances the tail only
    /// if `consume` is true (a peek that decides not to commit).
    pub fn finalize_pop(&mut self, consume: bool) {
        let reserved = self.pop_reserved.take().expect("no pop reservation");
        if consume {
            self.tail = wrap(self.tail + reserved, self.buf.len());
            self.len -= reserved;
        }
    }

    /// Copies up to `n` occupied bytes into `dst`, advancing the tail by
    /// however many bytes were copied. Returns the number of bytes copied.
    pub fn pop_to(&mut self, dst: &mut [u8]) -> usize {
        let want = dst.len().min(self.occupied());
        let mut copied = 0;
        while copied < want {
            let chunk = self.reserve_pop(want - copied);
            let n = chunk.len();
            dst[copied..copied + n].copy_from_slice(chunk);
            self.finalize_pop(true);
            copied += n;
            if n == 0 {
                break;
            }
        }
        copied
    }

    /// Advances the tail by `n` bytes (dropping them), bounded by
    /// occupancy.
    pub fn skip_tail(&mut self, n: usize) -> usize {
        let n = n.min(self.occupied());
        self.tail = wrap(self.tail + n, self.buf.len());
        self.len -= n;
        n
    }

    /// Byte at logical offset `i` from the tail (`i < occupied()`).
    fn byte_at(&self, i: usize) -> u8 {
        self.buf[wrap(self.tail + i, self.buf.len())]
    }

    /// Scans occupied bytes for `needle`, starting at `start_offset` from
    /// the tail, bounded by `max_scan` bytes (0 meaning "scan everything
    /// occupied"). Returns the offset from the tail where the needle
    /// starts, or `None`. If `consume_through` is true and found, the
    /// tail advances past the end of the needle.
    pub fn find(
        &mut self,
        needle: &[u8],
        start_offset: usize,
        max_scan: usize,
        consume_through: bool,
    ) -> Option<usize> {
        if needle.is_empty() || start_offset >= self.occupied() {
            return None;
        }
        let scan_limit = if max_scan == 0 {
            self.occupied()
        } else {
            max_scan.min(self.occupied())
        };
        let last_start = scan_limit.saturating_sub(needle.len());
        let mut i = start_offset;
        while i <= last_start {
            let mut matched = true;
            for (j, &nb) in needle.iter().enumerate() {
                if self.byte_at(i + j) != nb {
                    matched = false;
                    break;
                }
            }
            if matched {
                if consume_through {
                    self.skip_tail(i + needle.len());
                }
                return Some(i);
            }
            i += 1;
        }
        None
    }

    pub fn reset(&mut self) {
        self.head = 0;
        self.tail = 0;
        self.len = 0;
        self.push_reserved = None;
        self.pop_reserved = None;
    }
}

fn wrap(x: usize, cap: usize) -> usize {
    if x >= cap {
        x - cap
    } else {
        x
    }
}
