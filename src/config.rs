//! Compile-time capacities for the driver.
//!
//! These replace the original C driver's named constants
//! (`ltem__bufferSz_rx`, `SC16IS7xx__FIFO_bufferSz`, `ltem__streamCnt`, ...)
//! with plain Rust `const`s so every buffer in the crate is a fixed-size
//! array, no `alloc` required.

/// Size of the RX ring buffer shared between the ISR and the foreground.
pub const RX_RING_CAPACITY: usize = 1024;

/// SC16IS7xx hardware FIFO depth. The bridge driver never buffers beyond
/// this; it is the unit the ISR drains/refills in.
pub const BRIDGE_FIFO_CAPACITY: usize = 64;

/// Staging capacity for a single outbound TX operation (command or
/// data-mode payload) held by the IOP until fully drained to the bridge.
pub const TX_STAGING_CAPACITY: usize = 2048;

/// Maximum number of streams (file/socket/MQTT/HTTP) registered at once.
/// Resolves spec Open Question 1: the original's overlapping
/// `file__openFileMaxCnt` / `ltem__streamCnt` constants are unified here.
pub const MAX_STREAMS: usize = 8;

/// Maximum verbatim response bytes captured per AT command.
pub const RAW_RESPONSE_CAPACITY: usize = 384;

/// Maximum tokens recorded per parsed response.
pub const MAX_TOKENS: usize = 12;

/// Default completion timeout for a dispatched AT command, in milliseconds.
pub const DEFAULT_TIMEOUT_MS: u32 = 800;

/// Deadline for observing "APP RDY" after a reset/power-on, in milliseconds.
pub const APP_READY_TIMEOUT_MS: u32 = 8_000;

/// Bounded retry count for draining the IIR within one ISR invocation.
pub const IIR_RETRY_LIMIT: u8 = 60;

/// Data-mode trailer that follows a length-framed RX payload.
pub const DATA_MODE_TRAILER: &[u8] = b"\r\nOK\r\n";

/// Capacities for the static identification fields cached by
/// [`crate::device::Device::get_modem_info`], sized after the original's
/// `ntwk__imeiSz`/`ntwk__iccidSz`/`ntwk__dvcMfgSz`/`ntwk__dvcModelSz`/
/// `ntwk__dvcFwVerSz` constants.
pub const IMEI_CAPACITY: usize = 16;
pub const ICCID_CAPACITY: usize = 22;
pub const MFG_CAPACITY: usize = 16;
pub const MODEL_CAPACITY: usize = 16;
pub const FWVER_CAPACITY: usize = 24;

/// Pin/host configuration handed to [`crate::device::Device::create`].
///
/// Board-level pin assignment and GPIO/SPI primitives are out of scope for
/// this crate (spec §1); this struct only carries the identifiers the core
/// needs to reason about, not how to drive them.
#[derive(Debug, Clone, Copy, Default)]
pub struct PinConfig {
    pub spi_index: u8,
    pub cs_pin: u8,
    pub irq_pin: u8,
    pub reset_pin: u8,
    pub powerkey_pin: u8,
    pub status_pin: u8,
}
