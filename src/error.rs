//! Error taxonomy for the driver.
//!
//! Two distinct types, matching spec §7:
//! - [`ResultCode`] is the HTTP-status-like code every AT-command-facing
//!   operation returns.
//! - [`Error`] covers host-programming faults (calling the driver out of
//!   order, a full stream table) and the "catastrophic" asserts that
//!   escalate to [`FaultKind`] and a host-registered notifier instead of
//!   propagating.

use core::fmt;

/// HTTP-status-like result taxonomy (spec §7).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultCode {
    Success,
    Accepted,
    PartialContent,
    NotFound,
    Conflict,
    Locked,
    PreConditionFailed,
    Timeout,
    InternalError,
    /// `+CME ERROR`/`+CMS ERROR` passed through verbatim as `500 + n`.
    VendorExtended(u16),
}

impl ResultCode {
    /// Numeric code on the HTTP-status-like scale.
    pub const fn as_u16(self) -> u16 {
        match self {
            ResultCode::Success => 200,
            ResultCode::Accepted => 202,
            ResultCode::PartialContent => 206,
            ResultCode::NotFound => 404,
            ResultCode::Conflict => 409,
            ResultCode::Locked => 423,
            ResultCode::PreConditionFailed => 412,
            ResultCode::Timeout => 408,
            ResultCode::InternalError => 500,
            ResultCode::VendorExtended(code) => code,
        }
    }

    pub const fn from_vendor_error(n: u16) -> Self {
        ResultCode::VendorExtended(500 + n)
    }

    pub const fn is_success(self) -> bool {
        matches!(
            self,
            ResultCode::Success | ResultCode::Accepted | ResultCode::PartialContent
        )
    }
}

impl fmt::Display for ResultCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_u16())
    }
}

/// Kind of catastrophic fault passed to the host's `event_notify_cb`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultKind {
    NullRequiredPointer,
    RingOverflow,
    ImpossibleState,
    IsrReentry,
}

/// Host programming-error / driver-internal faults.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// `Device::create` was never called, or the operation requires a
    /// state the device has not reached yet.
    NotInitialized,
    /// `add_stream` with a full registry.
    StreamTableFull,
    /// `get_stream`/`delete_stream` on an unknown context id.
    UnknownStream,
    /// `try_invoke` while a command is already in flight.
    LockConflict,
    /// A caller-provided buffer was too small for the requested operation.
    BufferTooSmall,
    /// Escalated assertion failure; the caller that observes this should
    /// treat the device as unusable until `reset`.
    Fault(FaultKind),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::NotInitialized => write!(f, "device not initialized"),
            Error::StreamTableFull => write!(f, "stream table full"),
            Error::UnknownStream => write!(f, "unknown stream context"),
            Error::LockConflict => write!(f, "AT command lock held"),
            Error::BufferTooSmall => write!(f, "buffer too small"),
            Error::Fault(kind) => write!(f, "fault: {:?}", kind),
        }
    }
}

pub type Result<T> = core::result::Result<T, Error>;

/// Signature for the host-registered catastrophic-fault notifier (spec §7).
pub type EventNotifyFn = fn(FaultKind, &str);

/// Logs the fault, notifies the host, and halts the calling path forever.
///
/// There is no unwinding target on a microcontroller: per spec §7 the host
/// decides recovery (typically a reset), so this never returns.
#[inline(never)]
#[cold]
pub fn fatal(file: &str, line: u32, notify: EventNotifyFn, kind: FaultKind, msg: &str) -> ! {
    #[cfg(feature = "defmt")]
    defmt::error!("FATAL {}:{} {}", file, line, msg);
    #[cfg(not(feature = "defmt"))]
    let _ = (file, line, msg);

    notify(kind, msg);
    loop {
        core::hint::spin_loop();
    }
}

/// Raises a fatal fault through the host's notifier and halts.
#[macro_export]
macro_rules! fatal_error {
    ($notify:expr, $kind:expr, $msg:expr) => {
        $crate::error::fatal(file!(), line!(), $notify, $kind, $msg)
    };
}

/// Asserts a condition, raising a fatal fault if it does not hold.
#[macro_export]
macro_rules! assert_fatal {
    ($cond:expr, $notify:expr, $kind:expr, $msg:expr) => {
        if !($cond) {
            $crate::fatal_error!($notify, $kind, $msg)
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn result_code_numeric_scale() {
        assert_eq!(ResultCode::Success.as_u16(), 200);
        assert_eq!(ResultCode::Timeout.as_u16(), 408);
        assert_eq!(ResultCode::Locked.as_u16(), 423);
    }

    #[test]
    fn vendor_extended_offsets_by_500() {
        assert_eq!(ResultCode::from_vendor_error(1).as_u16(), 501);
        assert_eq!(ResultCode::from_vendor_error(17).as_u16(), 517);
    }

    #[test]
    fn is_success_covers_2xx_only() {
        assert!(ResultCode::Success.is_success());
        assert!(ResultCode::Accepted.is_success());
        assert!(ResultCode::PartialContent.is_success());
        assert!(!ResultCode::Conflict.is_success());
        assert!(!ResultCode::VendorExtended(517).is_success());
    }
}
