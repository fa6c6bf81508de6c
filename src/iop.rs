//! I/O processor (spec §4.3): owns the RX ring, drains the bridge's RX
//! FIFO into it from the ISR, and refills the TX FIFO from a staged
//! outbound buffer.

use heapless::Vec;

use crate::bridge::{Bridge, FifoReset};
use crate::config::{IIR_RETRY_LIMIT, TX_STAGING_CAPACITY};
use crate::error::{Error, FaultKind};
use crate::hostio::Clock;
use crate::ringbuf::RingBuffer;

/// Outcome of one `service_interrupt` call, useful for tests/logging.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IsrStats {
    pub rx_bytes: usize,
    pub tx_bytes: usize,
    pub line_errors: u8,
    pub iterations: u8,
}

pub struct Iop<'a> {
    rx: RingBuffer<'a>,
    tx_staging: Vec<u8, TX_STAGING_CAPACITY>,
    tx_cursor: usize,
    last_rx_at_ms: u32,
    irq_attached: bool,
}

impl<'a> Iop<'a> {
    pub fn new(rx_storage: &'a mut [u8]) -> Self {
        Self {
            rx: RingBuffer::new(rx_storage),
            tx_staging: Vec::new(),
            tx_cursor: 0,
            last_rx_at_ms: 0,
            irq_attached: false,
        }
    }

    pub fn rx(&mut self) -> &mut RingBuffer<'a> {
        &mut self.rx
    }

    pub fn attach_irq(&mut self, bridge: &mut impl Bridge) {
        self.tx_staging.clear();
        self.tx_cursor = 0;
        bridge.reset_fifo(FifoReset::RxTx);
        self.irq_attached = true;
    }

    pub fn detach_irq(&mut self) {
        self.irq_attached = false;
    }

    pub fn irq_attached(&self) -> bool {
        self.irq_attached
    }

    pub fn reset_rx_buffer(&mut self) {
        self.rx.reset();
    }

    pub fn rx_idle_duration(&self, clock: &dyn Clock) -> u32 {
        clock.now_ms().wrapping_sub(self.last_rx_at_ms)
    }

    fn tx_pending(&self) -> usize {
        self.tx_staging.len() - self.tx_cursor
    }

    /// Begins a TX operation (spec §4.3 `start_tx`). Only valid when no
    /// previous TX is still draining; writes as much as the TX FIFO
    /// accepts immediately, staging the remainder for the ISR.
    pub fn start_tx(&mut self, bridge: &mut impl Bridge, data: &[u8]) -> Result<(), Error> {
        if self.tx_pending() > 0 {
            return Err(Error::LockConflict);
        }
        if data.len() > TX_STAGING_CAPACITY {
            return Err(Error::BufferTooSmall);
        }
        self.tx_staging.clear();
        self.tx_staging
            .extend_from_slice(data)
            .map_err(|_| Error::BufferTooSmall)?;
        self.tx_cursor = 0;

        let level = bridge.tx_level() as usize;
        let immediate = level.min(self.tx_staging.len());
        let written = bridge.write(&self.tx_staging[..immediate]);
        self.tx_cursor = written;
        Ok(())
    }

    /// Forced immediate TX (spec §4.3 `force_tx`): resets the TX FIFO and
    /// writes up to FIFO capacity, used for attention/break sequences
    /// during recovery.
    pub fn force_tx(&mut self, bridge: &mut impl Bridge, data: &[u8]) -> Result<(), Error> {
        bridge.reset_fifo(FifoReset::Tx);
        self.tx_staging.clear();
        self.tx_cursor = 0;
        let written = bridge.write(data);
        let _ = written;
        Ok(())
    }

    /// Services one ISR invocation (spec §4.3). Drains line-status
    /// errors, then RX, then TX, retrying while the IIR or IRQ line still
    /// indicate pending work. `on_fault` is the host's catastrophic-fault
    /// notifier, invoked (not propagated) if the RX FIFO is not draining.
    pub fn service_interrupt(
        &mut self,
        bridge: &mut impl Bridge,
        clock: &dyn Clock,
        mut on_fault: impl FnMut(FaultKind, &str),
    ) -> IsrStats {
        let mut stats = IsrStats::default();

        loop {
            let mut iir = bridge.read_iir();
            let mut retries = 0u8;
            while !iir.pending() && retries < IIR_RETRY_LIMIT {
                iir = bridge.read_iir();
                retries += 1;
            }

            loop {
                stats.iterations += 1;
                crate::log_isr_source!(iir.source());

                match iir.source() {
                    3 => {
                        // line-status error: best-effort recovery
                        let _ = bridge.line_status();
                        bridge.reset_fifo(FifoReset::RxTx);
                        stats.line_errors += 1;
                    }
                    2 | 6 => {
                        let mut rx_level = bridge.rx_level();
                        if rx_level > 0 {
                            self.last_rx_at_ms = clock.now_ms();
                            stats.rx_bytes += self.drain_rx_once(bridge, rx_level as usize);

                            rx_level = bridge.rx_level();
                            if rx_level as usize >= crate::config::BRIDGE_FIFO_CAPACITY / 4 {
                                on_fault(
                                    FaultKind::RingOverflow,
                                    "RX FIFO not draining below 1/4 capacity",
                                );
                            }
                        }
                    }
                    1 => {
                        if self.tx_pending() > 0 {
                            let level = bridge.tx_level() as usize;
                            let remaining = &self.tx_staging[self.tx_cursor..];
                            let block = remaining.len().min(level);
                            let written = bridge.write(&remaining[..block]);
                            self.tx_cursor += written;
                            stats.tx_bytes += written;
                        }
                    }
                    _ => {}
                }

                iir = bridge.read_iir();
                if iir.pending() {
                    continue;
                }
                break;
            }

            if bridge.irq_line_asserted() {
                continue;
            }
            break;
        }

        stats
    }

    /// Drains up to `rx_level` bytes from the bridge FIFO into the ring,
    /// retrying once if the ring could only expose a short (wrapped)
    /// block the first time. Mirrors the original's two-pass drain.
    fn drain_rx_once(&mut self, bridge: &mut impl Bridge, rx_level: usize) -> usize {
        let mut total = 0usize;
        let mut remaining = rx_level;
        for _ in 0..2 {
            if remaining == 0 {
                break;
            }
            let block_len;
            {
                let dst = self.rx.reserve_push(remaining);
                block_len = dst.len();
                if block_len > 0 {
                    let read = bridge.read(dst);
                    debug_assert_eq!(read, block_len);
                }
            }
            self.rx.finalize_push(block_len);
            total += block_len;
            remaining -= block_len;
        }
        total
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::MockBridge;
    use crate::hostio::MockClock;

    fn noop_fault(_: FaultKind, _: &str) {}

    #[test]
    fn start_tx_writes_immediately_when_fifo_has_room() {
        let mut storage = [0u8; 256];
        let mut iop = Iop::new(&mut storage);
        let mut bridge = MockBridge::new();

        iop.start_tx(&mut bridge, b"AT\r").unwrap();
        assert_eq!(bridge.tx_captured, b"AT\r");
        assert_eq!(iop.tx_pending(), 0);
    }

    #[test]
    fn start_tx_stages_remainder_drained_by_isr() {
        let mut storage = [0u8; 256];
        let mut iop = Iop::new(&mut storage);
        let mut bridge = MockBridge::new();
        bridge.tx_free = 4; // force a partial immediate write

        iop.start_tx(&mut bridge, b"ABCDEFGH").unwrap();
        assert_eq!(bridge.tx_captured, b"ABCD");
        assert_eq!(iop.tx_pending(), 4);

        bridge.drain_tx(4); // modem "consumed" the first chunk
        let clock = MockClock::new();
        iop.service_interrupt(&mut bridge, &clock, noop_fault);
        assert_eq!(bridge.tx_captured, b"ABCDEFGH");
        assert_eq!(iop.tx_pending(), 0);
    }

    #[test]
    fn service_interrupt_drains_rx_into_ring_and_updates_idle_clock() {
        let mut storage = [0u8; 256];
        let mut iop = Iop::new(&mut storage);
        let mut bridge = MockBridge::new();
        bridge.push_rx(b"+QCSQ: 20,99\r\n");

        let clock = MockClock::new();
        clock.advance(500);
        let stats = iop.service_interrupt(&mut bridge, &clock, noop_fault);

        assert_eq!(stats.rx_bytes, 14);
        assert_eq!(iop.rx().occupied(), 14);
        assert_eq!(iop.rx_idle_duration(&clock), 0);
    }

    #[test]
    fn line_status_error_resets_fifos_and_is_recorded() {
        let mut storage = [0u8; 256];
        let mut iop = Iop::new(&mut storage);
        let mut bridge = MockBridge::new();
        bridge.line_error_pending = true;

        let clock = MockClock::new();
        let stats = iop.service_interrupt(&mut bridge, &clock, noop_fault);
        assert_eq!(stats.line_errors, 1);
        assert!(!bridge.line_error_pending);
    }

    #[test]
    fn ring_overflow_invokes_fault_notifier() {
        let mut storage = [0u8; 256];
        let mut iop = Iop::new(&mut storage);
        let mut bridge = MockBridge::new();
        // MockBridge reports the *entire* rx_queue length (capped at
        // BRIDGE_FIFO_CAPACITY) as the level both before and after the
        // drain, since it never actually empties below the assertion
        // threshold in this scenario (queue bigger than the ring can
        // absorb is not modeled; instead we just keep bytes in queue to
        // simulate "still above 1/4 FIFO" by never letting read() drain
        // below the threshold: use a level that reserve_push will
        // happily accept in full, but read() leaves bytes by design of
        // the mock always popping to dst.len() capacity). We instead
        // force it by making the ring too small to take everything.
        let mut tiny_storage = [0u8; 4];
        let mut tiny_iop = Iop::new(&mut tiny_storage);
        bridge.push_rx(&[0u8; 40]);

        let mut faulted = false;
        let clock = MockClock::new();
        tiny_iop.service_interrupt(&mut bridge, &clock, |kind, _| {
            assert_eq!(kind, FaultKind::RingOverflow);
            faulted = true;
        });
        assert!(faulted);
        let _ = &mut iop; // silence unused warning for the unused normal iop
    }
}
