//! Structured logging (spec SPEC_FULL.md §1.1). Thin `defmt` wrappers so
//! call sites read the same regardless of whether the `defmt` feature is
//! enabled; with it off these compile away to nothing.

/// Logs one AT command dispatch and, once available, its outcome.
#[macro_export]
macro_rules! log_at_cmd {
    ($cmd:expr) => {
        #[cfg(feature = "defmt")]
        defmt::debug!(">> {=[u8]}", $cmd);
    };
}

#[macro_export]
macro_rules! log_at_result {
    ($code:expr) => {
        #[cfg(feature = "defmt")]
        defmt::debug!("<< result {}", $code.as_u16());
    };
}

/// Logs a URC that was claimed by a registered stream handler.
#[macro_export]
macro_rules! log_urc_claimed {
    ($context_id:expr) => {
        #[cfg(feature = "defmt")]
        defmt::trace!("URC claimed by stream {}", $context_id);
    };
}

/// Logs which IIR source fired on one pass of the ISR loop.
#[macro_export]
macro_rules! log_isr_source {
    ($source:expr) => {
        #[cfg(feature = "defmt")]
        defmt::trace!("isr source {}", $source);
    };
}
