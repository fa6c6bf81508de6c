//! Device facade (spec §4.8): the single owned entry point a host
//! application holds. Combines the IOP, AT-command engine, stream
//! registry, and network/operator state behind the small surface the
//! original exposed as `ltem_*`.

use core::fmt::Write as _;

use heapless::String;

use crate::atcmd::{AtCommandEngine, DataModeTrigger, State as AtState};
use crate::bridge::Bridge;
use crate::config::{
    PinConfig, FWVER_CAPACITY, ICCID_CAPACITY, IMEI_CAPACITY, MFG_CAPACITY, MODEL_CAPACITY,
    RAW_RESPONSE_CAPACITY,
};
use crate::dmode::{DataModeOutcome, DefaultTx, LengthFramedRx};
use crate::error::{Error, EventNotifyFn, FaultKind, Result, ResultCode};
use crate::hostio::{Clock, Yield};
use crate::iop::Iop;
use crate::network::{OperatorWait, RegistrationStatus};
use crate::parser::ParserConfig;
use crate::streams::StreamRegistry;

/// Device lifecycle state (spec §3), promoted by the presence of a power
/// signal rather than tracked independently: [`Device::device_state`]
/// reports `PowerOff` the instant the signal drops regardless of what this
/// driver last recorded. Declaration order matters -- `Ord` drives the
/// `max(stored, PowerOn)` rule `device_state` applies once powered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum DeviceState {
    PowerOff,
    PowerOn,
    AppReady,
}

/// How [`Device::start`] should bring the modem up (spec §4.7). Only
/// `SwReset` issues a command from this layer; the pin-toggling variants
/// are out of scope (no GPIO access here, see [`PinConfig`]) and assume the
/// host already did whatever toggling the variant names before calling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResetAction {
    /// No reset step -- the host has confirmed the modem is already on.
    SkipIfOn,
    /// Issue `AT+CFUN=1,1` (best-effort) before waiting for `APP RDY`.
    SwReset,
    /// Host already pulsed the RESET pin; just wait for `APP RDY`.
    HwReset,
    /// Host already cycled the POWERKEY pin off and on; just wait for
    /// `APP RDY`.
    PowerCycle,
}

/// Signal quality as returned by `AT+CSQ` (spec §4.8 `signal_raw/rssi/percent/bars`,
/// §8 scenario 1). `raw` is the CSQ indicator (0-31, or 99 for "unknown").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SignalQuality {
    pub raw: u8,
    pub rssi_dbm: i16,
    pub percent: u8,
    pub bars: u8,
}

impl SignalQuality {
    /// `percent = raw * 3.23` (truncated); `rssi = -113 + percent/100 * 62`,
    /// matching spec §8 scenario 1 exactly (`raw=20` → `percent=64`,
    /// `rssi=-74`).
    pub fn from_raw_csq(raw: u8) -> Self {
        if raw == 99 {
            return Self {
                raw,
                rssi_dbm: -999,
                percent: 0,
                bars: 0,
            };
        }
        let percent = ((raw as u32 * 323) / 100).min(100) as u8;
        let rssi_dbm = -113 + (percent as i32 * 62 / 100) as i16;
        let bars = (percent / 20).min(5) as u8;
        Self {
            raw,
            rssi_dbm,
            percent,
            bars,
        }
    }
}

/// Static device identification/provisioning fields (spec §6 `get_modem_info`),
/// grounded on `ltem_getModemInfo`'s `modemInfo_t`. Fetched lazily and cached
/// for the lifetime of the device, same as the original.
#[derive(Debug, Clone, Default)]
pub struct ModemInfo {
    pub imei: String<IMEI_CAPACITY>,
    pub iccid: String<ICCID_CAPACITY>,
    pub mfg: String<MFG_CAPACITY>,
    pub model: String<MODEL_CAPACITY>,
    pub fwver: String<FWVER_CAPACITY>,
}

pub struct Device<'a> {
    stored_state: DeviceState,
    pins: PinConfig,
    iop: Iop<'a>,
    atcmd: AtCommandEngine<'a>,
    streams: StreamRegistry,
    operator_wait: Option<OperatorWait>,
    modem_info: ModemInfo,
    event_notify: Option<EventNotifyFn>,
}

impl<'a> Device<'a> {
    /// Creates a device over caller-provided RX ring storage. Does not
    /// touch hardware; call [`Device::start`] to bring the modem up.
    pub fn create(rx_storage: &'a mut [u8], pins: PinConfig) -> Self {
        Self {
            stored_state: DeviceState::PowerOff,
            pins,
            iop: Iop::new(rx_storage),
            atcmd: AtCommandEngine::new(),
            streams: StreamRegistry::new(),
            operator_wait: None,
            modem_info: ModemInfo::default(),
            event_notify: None,
        }
    }

    /// Last state this driver recorded reaching, independent of the live
    /// power signal. Prefer [`Device::device_state`] when a `Bridge` is at
    /// hand; this is for contexts (e.g. `Display` impls, logging) with none.
    pub fn state(&self) -> DeviceState {
        self.stored_state
    }

    /// Current device state (spec §3): `PowerOff` if the power signal reads
    /// low, otherwise the higher of `PowerOn` and whatever this driver last
    /// recorded -- a fault mid-`start` still reports `PowerOn` rather than
    /// silently reverting to `PowerOff` while the modem is still powered.
    pub fn device_state(&mut self, bridge: &mut impl Bridge) -> DeviceState {
        if !bridge.power_signal() {
            return DeviceState::PowerOff;
        }
        self.stored_state.max(DeviceState::PowerOn)
    }

    /// Dispatches `cmd` and drives it to completion. Services the bridge
    /// interrupt once per poll: on real hardware the host's own ISR
    /// vector calls [`Iop::service_interrupt`] independently, but this
    /// facade has no interrupt vector of its own to register with, so it
    /// drives the same call cooperatively from here, between yields.
    fn run_command(
        &mut self,
        bridge: &mut impl Bridge,
        clock: &dyn Clock,
        yielder: &mut impl Yield,
        cmd: &[u8],
    ) -> Result<crate::error::ResultCode> {
        self.atcmd.try_invoke(&mut self.iop, bridge, clock, cmd)?;
        loop {
            self.iop.service_interrupt(bridge, clock, |_, _| {});
            match self.atcmd.poll(&mut self.iop, clock) {
                AtState::Complete(code) => {
                    return Ok(code);
                }
                _ => yielder.yield_now(),
            }
        }
    }

    pub fn pins(&self) -> PinConfig {
        self.pins
    }

    /// Brings the bridge out of reset, waits for `APP RDY`, and runs the
    /// module init script (`ATE0`, URC config), per `ltem_start`.
    ///
    /// `reset_action` selects how the modem is brought up (spec §4.7):
    /// `SwReset` issues a best-effort `AT+CFUN=1,1` first; `HwReset` and
    /// `PowerCycle` assume the host has already pulsed the relevant pin
    /// (out of scope here, see [`PinConfig`]) and just wait for `APP RDY`;
    /// `SkipIfOn` omits any reset step when the power signal is already
    /// asserted.
    pub fn start(
        &mut self,
        bridge: &mut impl Bridge,
        clock: &dyn Clock,
        yielder: &mut impl Yield,
        reset_action: ResetAction,
    ) -> Result<()> {
        self.iop.attach_irq(bridge);
        if !bridge.is_available() {
            return Err(Error::Fault(crate::error::FaultKind::ImpossibleState));
        }
        bridge.enable_irq_mode();

        if reset_action == ResetAction::SwReset {
            self.atcmd.config_parser(ParserConfig::default());
            let _ = self.run_command(bridge, clock, yielder, b"AT+CFUN=1,1\r");
            self.atcmd.close();
        }

        self.stored_state = DeviceState::PowerOn;

        let deadline = clock.now_ms() + crate::config::APP_READY_TIMEOUT_MS;
        loop {
            self.iop.service_interrupt(bridge, clock, |_, _| {});
            if self.iop.rx().find(b"APP RDY\r\n", 0, 0, true).is_some() {
                break;
            }
            if clock.now_ms() >= deadline {
                return Err(Error::Fault(crate::error::FaultKind::ImpossibleState));
            }
            yielder.yield_now();
        }

        self.atcmd.config_parser(ParserConfig::default());
        self.run_command(bridge, clock, yielder, b"ATE0\r")?;
        self.atcmd.close();
        self.run_command(bridge, clock, yielder, b"AT+QURCCFG=\"urcport\",\"uart1\"\r")?;
        self.atcmd.close();

        self.stored_state = DeviceState::AppReady;
        Ok(())
    }

    pub fn stop(&mut self) {
        self.iop.detach_irq();
        self.stored_state = DeviceState::PowerOff;
    }

    /// Releases the bridge IRQ and marks the device unusable, matching
    /// `ltem_destroy`'s release-everything shape. Consumes `self`; the host
    /// must `create` a new device to use it again.
    pub fn destroy(mut self) {
        self.iop.detach_irq();
        self.stored_state = DeviceState::PowerOff;
    }

    /// Registers the host's catastrophic-fault/application-event handler
    /// (`ltem_setEventNotifCallback`). Distinct from the `Yield`/`Clock`
    /// seams, which the host supplies per call rather than registering once,
    /// this callback has no natural call-site argument: faults can surface
    /// from deep inside the ISR-equivalent path, so it is stored instead.
    pub fn set_event_notify_cb(&mut self, cb: EventNotifyFn) {
        self.event_notify = Some(cb);
    }

    /// Notifies the host of an application-level event (`ltem_notifyApp`).
    /// Unlike `fatal_error!`, this never halts; it's informational.
    pub fn notify_app(&self, kind: FaultKind, msg: &str) {
        if let Some(cb) = self.event_notify {
            cb(kind, msg);
        }
    }

    /// Clears internal bookkeeping and forwards straight into [`Device::start`]
    /// (spec §4.7 "`reset(hard?)` forwards to start"): `hard` picks
    /// [`ResetAction::HwReset`], otherwise [`ResetAction::SwReset`].
    pub fn reset(
        &mut self,
        bridge: &mut impl Bridge,
        clock: &dyn Clock,
        yielder: &mut impl Yield,
        hard: bool,
    ) -> Result<()> {
        self.iop.reset_rx_buffer();
        self.atcmd.close();
        self.streams = StreamRegistry::new();
        self.operator_wait = None;
        let action = if hard { ResetAction::HwReset } else { ResetAction::SwReset };
        self.start(bridge, clock, yielder, action)
    }

    pub fn streams(&mut self) -> &mut StreamRegistry {
        &mut self.streams
    }

    pub fn begin_await_operator(&mut self) {
        self.operator_wait = Some(OperatorWait::new());
    }

    pub fn cancel_await_operator(&mut self) {
        if let Some(wait) = self.operator_wait.as_mut() {
            wait.cancel();
        }
    }

    pub fn on_registration_status(
        &mut self,
        status: RegistrationStatus,
    ) -> Option<crate::network::AwaitOutcome> {
        self.operator_wait.as_mut().map(|w| w.on_status(status))
    }

    /// Liveness check, the facade's `ping` (spec §4.8): issues a bare
    /// `AT` and reports whether the modem answered in time.
    pub fn ping(
        &mut self,
        bridge: &mut impl Bridge,
        clock: &dyn Clock,
        yielder: &mut impl Yield,
    ) -> Result<bool> {
        self.atcmd.config_parser(ParserConfig::default());
        let code = self.run_command(bridge, clock, yielder, b"AT\r")?;
        self.atcmd.close();
        Ok(code.is_success())
    }

    /// Issues `AT+CSQ` and parses the signal-quality tuple (spec §8
    /// scenario 1).
    pub fn signal_quality(
        &mut self,
        bridge: &mut impl Bridge,
        clock: &dyn Clock,
        yielder: &mut impl Yield,
    ) -> Result<SignalQuality> {
        self.atcmd.config_parser(ParserConfig {
            landmark: b"+CSQ:",
            min_tokens: 2,
            ..ParserConfig::default()
        });
        let code = self.run_command(bridge, clock, yielder, b"AT+CSQ\r")?;
        if !code.is_success() {
            self.atcmd.close();
            return Err(Error::Fault(crate::error::FaultKind::ImpossibleState));
        }
        let raw_token = self
            .atcmd
            .get_token(&mut self.iop, 0)
            .ok_or(Error::BufferTooSmall)?;
        let raw_str = core::str::from_utf8(&raw_token).unwrap_or("99");
        let raw: u8 = raw_str.trim().parse().unwrap_or(99);
        self.atcmd.close();
        Ok(SignalQuality::from_raw_csq(raw))
    }

    pub fn is_sim_ready(
        &mut self,
        bridge: &mut impl Bridge,
        clock: &dyn Clock,
        yielder: &mut impl Yield,
    ) -> Result<bool> {
        self.atcmd.config_parser(ParserConfig {
            landmark: b"+CPIN:",
            min_tokens: 1,
            ..ParserConfig::default()
        });
        let code = self.run_command(bridge, clock, yielder, b"AT+CPIN?\r")?;
        let ready = code.is_success()
            && self
                .atcmd
                .get_token(&mut self.iop, 0)
                .map(|t| t.as_slice() == b"READY")
                .unwrap_or(false);
        self.atcmd.close();
        Ok(ready)
    }

    /// Queries `AT+CCLK?` and hands back the raw `yy/MM/dd,hh:mm:ss±zz`
    /// string; parsing the individual fields is left to the host since
    /// their meaning (local vs. UTC offset) is network-dependent, matching
    /// `ltem_getLocalDateTime`'s three output formats (`c`/`i`/`v`).
    pub fn local_datetime(
        &mut self,
        bridge: &mut impl Bridge,
        clock: &dyn Clock,
        yielder: &mut impl Yield,
    ) -> Result<String<32>> {
        self.atcmd.config_parser(ParserConfig {
            landmark: b"+CCLK:",
            min_tokens: 1,
            ..ParserConfig::default()
        });
        let code = self.run_command(bridge, clock, yielder, b"AT+CCLK?\r")?;
        if !code.is_success() {
            self.atcmd.close();
            return Err(Error::Fault(crate::error::FaultKind::ImpossibleState));
        }
        let token = self
            .atcmd
            .get_token(&mut self.iop, 0)
            .ok_or(Error::BufferTooSmall)?;
        let mut out: String<32> = String::new();
        for &b in token.iter() {
            let _ = out.push(b as char);
        }
        self.atcmd.close();
        Ok(out)
    }

    pub fn atcmd_state(&self) -> AtState {
        self.atcmd.state()
    }

    pub fn raw_response_capacity(&self) -> usize {
        RAW_RESPONSE_CAPACITY
    }

    /// This driver's own version string (`ltem_getSwVersion`'s
    /// `LTEmC_VERSION` constant) -- the core's version, not the modem
    /// firmware's; see [`Device::get_modem_info`]'s `fwver` field for that.
    pub fn get_sw_version(&self) -> &'static str {
        env!("CARGO_PKG_VERSION")
    }

    /// Fetches and caches the modem's static identification fields
    /// (`AT+GSN` IMEI, `AT+QGMR` firmware build, `ATI` manufacturer/model,
    /// `AT+ICCID`), querying each only the first time it's empty, per
    /// `ltem_getModemInfo`.
    pub fn get_modem_info(
        &mut self,
        bridge: &mut impl Bridge,
        clock: &dyn Clock,
        yielder: &mut impl Yield,
    ) -> Result<&ModemInfo> {
        if self.modem_info.imei.is_empty() {
            self.atcmd.config_parser(ParserConfig::default());
            let code = self.run_command(bridge, clock, yielder, b"AT+GSN\r")?;
            if code.is_success() {
                let resp = self.atcmd.response_bytes(&mut self.iop);
                set_first_line(&mut self.modem_info.imei, &resp);
            }
            self.atcmd.close();
        }

        if self.modem_info.fwver.is_empty() {
            self.atcmd.config_parser(ParserConfig::default());
            let code = self.run_command(bridge, clock, yielder, b"AT+QGMR\r")?;
            if code.is_success() {
                let resp = self.atcmd.response_bytes(&mut self.iop);
                set_first_line(&mut self.modem_info.fwver, &resp);
            }
            self.atcmd.close();
        }

        if self.modem_info.model.is_empty() {
            self.atcmd.config_parser(ParserConfig::default());
            let code = self.run_command(bridge, clock, yielder, b"ATI\r")?;
            if code.is_success() {
                let resp = self.atcmd.response_bytes(&mut self.iop);
                parse_ati_banner(&resp, &mut self.modem_info);
            }
            self.atcmd.close();
        }

        if self.modem_info.iccid.is_empty() {
            self.atcmd.config_parser(ParserConfig {
                landmark: b"+ICCID:",
                min_tokens: 1,
                ..ParserConfig::default()
            });
            let code = self.run_command(bridge, clock, yielder, b"AT+ICCID\r")?;
            if code.is_success() {
                if let Some(tok) = self.atcmd.get_token(&mut self.iop, 0) {
                    set_trimmed(&mut self.modem_info.iccid, tok.as_slice());
                }
            }
            self.atcmd.close();
        }

        Ok(&self.modem_info)
    }

    /// The module's reported model string (e.g. `"BG95"`), caching through
    /// [`Device::get_modem_info`] if it hasn't been fetched yet.
    pub fn get_module_type(
        &mut self,
        bridge: &mut impl Bridge,
        clock: &dyn Clock,
        yielder: &mut impl Yield,
    ) -> Result<String<MODEL_CAPACITY>> {
        if self.modem_info.model.is_empty() {
            self.get_modem_info(bridge, clock, yielder)?;
        }
        Ok(self.modem_info.model.clone())
    }

    /// Local timezone offset from `AT+CCLK?`'s `±QQ` quarter-hour field.
    /// `precise` returns the raw quarter-hour count instead of whole hours,
    /// matching `ltem_getLocalTimezoneOffset(bool)`. Returns 0 if the clock
    /// hasn't been set by the network yet (reported year starting with 80).
    pub fn get_local_tz_offset(
        &mut self,
        bridge: &mut impl Bridge,
        clock: &dyn Clock,
        yielder: &mut impl Yield,
        precise: bool,
    ) -> Result<i8> {
        self.atcmd.config_parser(ParserConfig::default());
        let code = self.run_command(bridge, clock, yielder, b"AT+CCLK?\r")?;
        let resp = self.atcmd.response_bytes(&mut self.iop);
        self.atcmd.close();
        if !code.is_success() {
            return Ok(0);
        }
        Ok(parse_tz_offset(&resp, precise))
    }

    /// Dispatches `cmd`, which is expected to trigger `literal` and drop
    /// into data mode, and polls until either happens. Returns `Ok(Err(code))`
    /// if the command completes (e.g. a vendor error) without ever entering
    /// data mode.
    fn enter_data_mode(
        &mut self,
        bridge: &mut impl Bridge,
        clock: &dyn Clock,
        yielder: &mut impl Yield,
        cmd: &[u8],
        literal: &'a [u8],
    ) -> Result<core::result::Result<(), ResultCode>> {
        self.atcmd.config_data_mode(DataModeTrigger { literal });
        self.atcmd.try_invoke(&mut self.iop, bridge, clock, cmd)?;
        loop {
            self.iop.service_interrupt(bridge, clock, |_, _| {});
            match self.atcmd.poll(&mut self.iop, clock) {
                AtState::DataMode => return Ok(Ok(())),
                AtState::Complete(code) => return Ok(Err(code)),
                _ => yielder.yield_now(),
            }
        }
    }

    /// Writes `payload` to the open file/stream `handle` (spec §8 scenario
    /// 2), grounded on `file_write`'s `AT+QFWRITE=<handle>,<len>,<timeout>`
    /// -> `CONNECT` -> raw payload -> `+QFWRITE: <written>,<size>` sequence.
    pub fn file_write(
        &mut self,
        bridge: &mut impl Bridge,
        clock: &dyn Clock,
        yielder: &mut impl Yield,
        handle: u8,
        payload: &[u8],
        ack_timeout_s: u8,
    ) -> Result<FileWriteResult> {
        self.streams.get_stream(handle).ok_or(Error::UnknownStream)?;

        let mut cmd: String<48> = String::new();
        let _ = write!(cmd, "AT+QFWRITE={},{},{}\r", handle, payload.len(), ack_timeout_s);

        match self.enter_data_mode(bridge, clock, yielder, cmd.as_bytes(), b"CONNECT\r\n")? {
            Err(code) => {
                self.atcmd.close();
                return Ok(FileWriteResult { code, written_sz: 0, file_sz: 0 });
            }
            Ok(()) => {}
        }

        self.iop.start_tx(bridge, payload)?;

        let mut tx = DefaultTx::new(b"+QFWRITE:");
        let deadline = clock.now_ms() + crate::config::DEFAULT_TIMEOUT_MS;
        loop {
            self.iop.service_interrupt(bridge, clock, |_, _| {});
            match tx.poll(self.iop.rx()) {
                DataModeOutcome::Complete(code) => {
                    self.atcmd.close();
                    return Ok(if code.is_success() {
                        FileWriteResult {
                            code,
                            written_sz: tx.written_sz(),
                            file_sz: tx.file_sz(),
                        }
                    } else {
                        FileWriteResult { code, written_sz: 0, file_sz: 0 }
                    });
                }
                DataModeOutcome::Pending => {
                    if clock.now_ms() >= deadline {
                        self.atcmd.close();
                        return Ok(FileWriteResult {
                            code: ResultCode::Timeout,
                            written_sz: 0,
                            file_sz: 0,
                        });
                    }
                    yielder.yield_now();
                }
            }
        }
    }

    /// Reads up to `request_sz` bytes from the open file/stream `handle`
    /// into `dst` (spec §8 scenario 3), grounded on `file_read`'s
    /// `AT+QFREAD=<handle>,<len>` -> `CONNECT <actual_len>` -> raw payload
    /// sequence. Reports [`ResultCode::PartialContent`] whenever the modem
    /// hands back fewer bytes than `request_sz` asked for, regardless of
    /// how much room `dst` had -- the original's "file read partial"
    /// outcome is about the file being shorter than requested, not a
    /// caller buffer that was too small.
    pub fn file_read(
        &mut self,
        bridge: &mut impl Bridge,
        clock: &dyn Clock,
        yielder: &mut impl Yield,
        handle: u8,
        request_sz: usize,
        dst: &mut [u8],
    ) -> Result<FileReadResult> {
        self.streams.get_stream(handle).ok_or(Error::UnknownStream)?;

        let mut cmd: String<32> = String::new();
        let _ = write!(cmd, "AT+QFREAD={},{}\r", handle, request_sz);

        match self.enter_data_mode(bridge, clock, yielder, cmd.as_bytes(), b"CONNECT ")? {
            Err(code) => {
                self.atcmd.close();
                return Ok(FileReadResult { code, read_sz: 0 });
            }
            Ok(()) => {}
        }

        let mut rx = LengthFramedRx::new();
        let deadline = clock.now_ms() + crate::config::DEFAULT_TIMEOUT_MS;
        loop {
            self.iop.service_interrupt(bridge, clock, |_, _| {});
            match rx.poll(self.iop.rx(), b"CONNECT ", dst) {
                DataModeOutcome::Complete(_) => {
                    self.atcmd.close();
                    let read_sz = rx.bytes_written();
                    let code = if read_sz < request_sz {
                        ResultCode::PartialContent
                    } else {
                        ResultCode::Success
                    };
                    return Ok(FileReadResult { code, read_sz });
                }
                DataModeOutcome::Pending => {
                    if clock.now_ms() >= deadline {
                        self.atcmd.close();
                        return Ok(FileReadResult {
                            code: ResultCode::Timeout,
                            read_sz: 0,
                        });
                    }
                    yielder.yield_now();
                }
            }
        }
    }
}

/// Outcome of [`Device::file_write`] (spec §8 scenario 2).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileWriteResult {
    pub code: ResultCode,
    pub written_sz: usize,
    pub file_sz: usize,
}

/// Outcome of [`Device::file_read`] (spec §8 scenario 3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileReadResult {
    pub code: ResultCode,
    pub read_sz: usize,
}

fn set_trimmed<const N: usize>(out: &mut String<N>, bytes: &[u8]) {
    out.clear();
    if let Ok(s) = core::str::from_utf8(bytes) {
        for ch in s.trim().chars() {
            if out.push(ch).is_err() {
                break;
            }
        }
    }
}

/// Skips any leading CR/LF, then takes bytes up to the next one -- the
/// first non-blank line of a raw response still sitting in the ring
/// (which always carries its leading terminator, since a successful parse
/// only peeks, never consumes).
fn set_first_line<const N: usize>(out: &mut String<N>, bytes: &[u8]) {
    let start = bytes
        .iter()
        .position(|&b| b != b'\r' && b != b'\n')
        .unwrap_or(bytes.len());
    let rest = &bytes[start..];
    let end = rest
        .iter()
        .position(|&b| b == b'\r' || b == b'\n')
        .unwrap_or(rest.len());
    set_trimmed(out, &rest[..end]);
}

/// `ATI` echoes three lines: manufacturer, model, then `Revision: <fwver>`.
fn parse_ati_banner(bytes: &[u8], info: &mut ModemInfo) {
    let text = core::str::from_utf8(bytes).unwrap_or("");
    let mut lines = text.split("\r\n").filter(|l| !l.is_empty());
    if let Some(mfg) = lines.next() {
        set_trimmed(&mut info.mfg, mfg.as_bytes());
    }
    if let Some(model) = lines.next() {
        set_trimmed(&mut info.model, model.as_bytes());
    }
    if let Some(rev) = lines.next() {
        if let Some(idx) = rev.find(':') {
            set_trimmed(&mut info.fwver, rev[idx + 1..].as_bytes());
        }
    }
}

/// Parses the `±QQ` quarter-hour offset out of `AT+CCLK?`'s
/// `"yy/MM/dd,hh:mm:ss±QQ"` payload.
fn parse_tz_offset(bytes: &[u8], precise: bool) -> i8 {
    let text = core::str::from_utf8(bytes).unwrap_or("");
    let quote = match text.find('"') {
        Some(i) => i + 1,
        None => return 0,
    };
    let body = &text[quote..];
    if body.as_bytes().first() == Some(&b'8') {
        return 0;
    }
    let scan_from = body.get(6..).unwrap_or("");
    let sign_idx = match scan_from.find(|c| c == '+' || c == '-') {
        Some(i) => 6 + i,
        None => return 0,
    };
    let rest = &body[sign_idx..];
    let end = rest
        .char_indices()
        .skip(1)
        .find(|&(_, c)| !c.is_ascii_digit())
        .map(|(i, _)| i)
        .unwrap_or(rest.len());
    let quarters: i32 = rest[..end].parse().unwrap_or(0);
    if precise {
        quarters as i8
    } else {
        (quarters / 4) as i8
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::MockBridge;
    use crate::hostio::{MockClock, NoYield};
    use crate::streams::StreamType;

    #[test]
    fn signal_quality_matches_literal_scenario() {
        // spec §8 scenario 1: raw=20 -> percent=64, rssi≈-74.
        let sq = SignalQuality::from_raw_csq(20);
        assert_eq!(sq.percent, 64);
        assert_eq!(sq.rssi_dbm, -74);
    }

    #[test]
    fn signal_quality_unknown_sentinel_is_zeroed() {
        let sq = SignalQuality::from_raw_csq(99);
        assert_eq!(sq.percent, 0);
        assert_eq!(sq.bars, 0);
    }

    #[test]
    fn ping_reports_success_on_ok() {
        let mut storage = [0u8; 256];
        let mut bridge = MockBridge::new();
        let clock = MockClock::new();
        let mut yielder = NoYield;
        let mut device = Device::create(&mut storage, PinConfig::default());
        device.stored_state = DeviceState::AppReady;

        bridge.push_rx(b"\r\nOK\r\n");
        let ok = device.ping(&mut bridge, &clock, &mut yielder).unwrap();
        assert!(ok);
    }

    #[test]
    fn get_modem_info_queries_imei_only_when_missing() {
        // Each field is queried one command at a time against the real
        // modem; MockBridge has no concept of "not sent yet", so the other
        // three fields are pre-seeded to keep this test to the one command
        // actually under test (`AT+GSN`).
        let mut storage = [0u8; 256];
        let mut bridge = MockBridge::new();
        let clock = MockClock::new();
        let mut yielder = NoYield;
        let mut device = Device::create(&mut storage, PinConfig::default());
        device.stored_state = DeviceState::AppReady;
        device.modem_info.fwver.push_str("x").unwrap();
        device.modem_info.model.push_str("x").unwrap();
        device.modem_info.iccid.push_str("x").unwrap();

        bridge.push_rx(b"\r\n867198043211234\r\n\r\nOK\r\n");
        let info = device
            .get_modem_info(&mut bridge, &clock, &mut yielder)
            .unwrap();
        assert_eq!(info.imei.as_str(), "867198043211234");
    }

    #[test]
    fn get_module_type_queries_ati_only_when_missing() {
        let mut storage = [0u8; 256];
        let mut bridge = MockBridge::new();
        let clock = MockClock::new();
        let mut yielder = NoYield;
        let mut device = Device::create(&mut storage, PinConfig::default());
        device.stored_state = DeviceState::AppReady;
        device.modem_info.imei.push_str("x").unwrap();
        device.modem_info.fwver.push_str("x").unwrap();
        device.modem_info.iccid.push_str("x").unwrap();

        bridge.push_rx(b"\r\nQuectel\r\nBG95M3\r\nRevision: QM_B_04A_V01\r\n\r\nOK\r\n");
        let model = device
            .get_module_type(&mut bridge, &clock, &mut yielder)
            .unwrap();
        assert_eq!(model.as_str(), "BG95M3");
    }

    #[test]
    fn parse_ati_banner_splits_mfg_model_revision() {
        let mut info = ModemInfo::default();
        parse_ati_banner(
            b"\r\nQuectel\r\nBG95M3\r\nRevision: QM_B_04A_V01\r\n\r\nOK\r\n",
            &mut info,
        );
        assert_eq!(info.mfg.as_str(), "Quectel");
        assert_eq!(info.model.as_str(), "BG95M3");
        assert_eq!(info.fwver.as_str(), "QM_B_04A_V01");
    }

    #[test]
    fn get_local_tz_offset_parses_positive_quarter_hours() {
        let mut storage = [0u8; 256];
        let mut bridge = MockBridge::new();
        let clock = MockClock::new();
        let mut yielder = NoYield;
        let mut device = Device::create(&mut storage, PinConfig::default());
        device.stored_state = DeviceState::AppReady;

        bridge.push_rx(b"\r\n+CCLK: \"24/01/15,10:30:00+08\"\r\n\r\nOK\r\n");
        let offset = device
            .get_local_tz_offset(&mut bridge, &clock, &mut yielder, false)
            .unwrap();
        assert_eq!(offset, 2);

        let mut storage2 = [0u8; 256];
        let mut bridge2 = MockBridge::new();
        let mut device2 = Device::create(&mut storage2, PinConfig::default());
        device2.stored_state = DeviceState::AppReady;
        bridge2.push_rx(b"\r\n+CCLK: \"24/01/15,10:30:00+08\"\r\n\r\nOK\r\n");
        let precise = device2
            .get_local_tz_offset(&mut bridge2, &clock, &mut yielder, true)
            .unwrap();
        assert_eq!(precise, 8);
    }

    #[test]
    fn get_local_tz_offset_zero_when_clock_uninitialized() {
        let mut storage = [0u8; 256];
        let mut bridge = MockBridge::new();
        let clock = MockClock::new();
        let mut yielder = NoYield;
        let mut device = Device::create(&mut storage, PinConfig::default());
        device.stored_state = DeviceState::AppReady;

        bridge.push_rx(b"\r\n+CCLK: \"80/01/01,00:00:00+00\"\r\n\r\nOK\r\n");
        let offset = device
            .get_local_tz_offset(&mut bridge, &clock, &mut yielder, false)
            .unwrap();
        assert_eq!(offset, 0);
    }

    #[test]
    fn destroy_detaches_irq() {
        let mut storage = [0u8; 64];
        let device = Device::create(&mut storage, PinConfig::default());
        device.destroy();
    }

    #[test]
    fn notify_app_invokes_registered_callback() {
        static CALLED: core::sync::atomic::AtomicBool = core::sync::atomic::AtomicBool::new(false);
        fn handler(_kind: FaultKind, _msg: &str) {
            CALLED.store(true, core::sync::atomic::Ordering::SeqCst);
        }

        let mut storage = [0u8; 64];
        let mut device = Device::create(&mut storage, PinConfig::default());
        device.set_event_notify_cb(handler);
        device.notify_app(FaultKind::ImpossibleState, "test");
        assert!(CALLED.load(core::sync::atomic::Ordering::SeqCst));
    }

    #[test]
    fn signal_quality_parses_csq_response() {
        let mut storage = [0u8; 256];
        let mut bridge = MockBridge::new();
        let clock = MockClock::new();
        let mut yielder = NoYield;
        let mut device = Device::create(&mut storage, PinConfig::default());
        device.stored_state = DeviceState::AppReady;

        bridge.push_rx(b"\r\n+CSQ: 20,99\r\n\r\nOK\r\n");
        let sq = device.signal_quality(&mut bridge, &clock, &mut yielder).unwrap();
        assert_eq!(sq.raw, 20);
        assert_eq!(sq.percent, 64);
        assert_eq!(sq.rssi_dbm, -74);
    }

    #[test]
    fn file_write_literal_scenario_completes() {
        // spec §8 scenario 2: AT+QFWRITE=1,3,5 -> CONNECT -> "abc" -> +QFWRITE: 3,3.
        let mut storage = [0u8; 256];
        let mut bridge = MockBridge::new();
        let clock = MockClock::new();
        let mut yielder = NoYield;
        let mut device = Device::create(&mut storage, PinConfig::default());
        device.stored_state = DeviceState::AppReady;
        device.streams().add_stream(1, StreamType::File).unwrap();

        bridge.push_rx(b"CONNECT\r\n+QFWRITE: 3,3\r\n\r\nOK\r\n");
        let result = device
            .file_write(&mut bridge, &clock, &mut yielder, 1, b"abc", 5)
            .unwrap();
        assert_eq!(result.code.as_u16(), 200);
        assert_eq!(result.written_sz, 3);
        assert_eq!(result.file_sz, 3);
        assert!(bridge.tx_captured.ends_with(b"abc"));
    }

    #[test]
    fn file_write_unknown_handle_is_rejected() {
        let mut storage = [0u8; 256];
        let mut bridge = MockBridge::new();
        let clock = MockClock::new();
        let mut yielder = NoYield;
        let mut device = Device::create(&mut storage, PinConfig::default());
        device.stored_state = DeviceState::AppReady;

        let err = device
            .file_write(&mut bridge, &clock, &mut yielder, 1, b"abc", 5)
            .unwrap_err();
        assert!(matches!(err, Error::UnknownStream));
    }

    #[test]
    fn file_read_literal_scenario_completes() {
        // spec §8 scenario 3: CONNECT <len> framing, requested size matched exactly.
        let mut storage = [0u8; 256];
        let mut bridge = MockBridge::new();
        let clock = MockClock::new();
        let mut yielder = NoYield;
        let mut device = Device::create(&mut storage, PinConfig::default());
        device.stored_state = DeviceState::AppReady;
        device.streams().add_stream(1, StreamType::File).unwrap();

        bridge.push_rx(b"CONNECT 40\r\n");
        bridge.push_rx(&[b'x'; 40]);
        bridge.push_rx(b"\r\nOK\r\n");

        let mut dst = [0u8; 64];
        let result = device
            .file_read(&mut bridge, &clock, &mut yielder, 1, 40, &mut dst)
            .unwrap();
        assert_eq!(result.code.as_u16(), 200);
        assert_eq!(result.read_sz, 40);
        assert_eq!(&dst[..40], [b'x'; 40].as_slice());
    }

    #[test]
    fn file_read_shorter_than_requested_is_partial_content() {
        let mut storage = [0u8; 256];
        let mut bridge = MockBridge::new();
        let clock = MockClock::new();
        let mut yielder = NoYield;
        let mut device = Device::create(&mut storage, PinConfig::default());
        device.stored_state = DeviceState::AppReady;
        device.streams().add_stream(1, StreamType::File).unwrap();

        bridge.push_rx(b"CONNECT 10\r\n");
        bridge.push_rx(&[b'y'; 10]);
        bridge.push_rx(b"\r\nOK\r\n");

        let mut dst = [0u8; 64];
        let result = device
            .file_read(&mut bridge, &clock, &mut yielder, 1, 40, &mut dst)
            .unwrap();
        assert_eq!(result.code.as_u16(), 206);
        assert_eq!(result.read_sz, 10);
    }

    #[test]
    fn device_state_reports_power_off_when_signal_drops() {
        let mut storage = [0u8; 64];
        let mut bridge = MockBridge::new();
        let mut device = Device::create(&mut storage, PinConfig::default());
        device.stored_state = DeviceState::AppReady;

        assert_eq!(device.device_state(&mut bridge), DeviceState::AppReady);
        bridge.power_asserted = false;
        assert_eq!(device.device_state(&mut bridge), DeviceState::PowerOff);
    }

    #[test]
    fn device_state_promotes_power_on_once_signal_asserted() {
        let mut storage = [0u8; 64];
        let mut bridge = MockBridge::new();
        let mut device = Device::create(&mut storage, PinConfig::default());

        assert_eq!(device.stored_state, DeviceState::PowerOff);
        assert_eq!(device.device_state(&mut bridge), DeviceState::PowerOn);
    }

    #[test]
    fn start_fails_fast_when_bridge_unavailable() {
        // Deterministic regardless of reset_action: `is_available` is
        // checked right after attach_irq, before anything waits on APP RDY.
        let mut storage = [0u8; 256];
        let mut bridge = MockBridge::new();
        bridge.available = false;
        let clock = MockClock::new();
        let mut yielder = NoYield;
        let mut device = Device::create(&mut storage, PinConfig::default());

        let err = device
            .start(&mut bridge, &clock, &mut yielder, ResetAction::SkipIfOn)
            .unwrap_err();
        assert!(matches!(err, Error::Fault(FaultKind::ImpossibleState)));
        assert_eq!(device.state(), DeviceState::PowerOff);
    }

    #[test]
    fn reset_action_variants_are_distinct() {
        assert_ne!(ResetAction::SkipIfOn, ResetAction::SwReset);
        assert_ne!(ResetAction::HwReset, ResetAction::PowerCycle);
    }
}
