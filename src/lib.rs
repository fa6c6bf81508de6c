//! Host-side core driver for Quectel BG-series LTE modems attached over
//! an SPI-to-UART bridge.
//!
//! This crate owns the I/O processor, AT-command engine, data-mode
//! framing, stream registry, and URC dispatch. Pin configuration, the SPI
//! bus itself, and application-level networking are the host's
//! responsibility; see [`hostio`] and [`bridge::Bridge`] for the seams it
//! expects the host to fill in.
#![cfg_attr(not(test), no_std)]

pub mod atcmd;
pub mod bridge;
pub mod config;
pub mod device;
pub mod dmode;
pub mod error;
pub mod events;
pub mod hostio;
pub mod iop;
pub mod network;
pub mod parser;
pub mod ringbuf;
pub mod streams;

mod logger;

pub use device::{
    Device, DeviceState, FileReadResult, FileWriteResult, ModemInfo, ResetAction, SignalQuality,
};
pub use error::{Error, FaultKind, Result, ResultCode};
