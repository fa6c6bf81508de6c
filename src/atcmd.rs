//! AT-command engine (spec §4.4): a serialized, single-in-flight state
//! machine layered over the [`crate::iop::Iop`] ring and [`crate::bridge::Bridge`].
//!
//! Exactly one command may be outstanding at a time; `try_invoke` enforces
//! this with a lock rather than queuing, matching the original's single
//! static `atcmd` instance. Completion is polled (`poll`) rather than
//! blocking, with [`await_result`] offered as a synchronous convenience
//! built on top of the poll loop and the host's [`crate::hostio::Yield`].

use heapless::String;

use crate::bridge::Bridge;
use crate::config::{DEFAULT_TIMEOUT_MS, RAW_RESPONSE_CAPACITY};
use crate::error::{Error, ResultCode};
use crate::hostio::{Clock, Yield};
use crate::iop::Iop;
use crate::parser::{parse_standard, ParseOutcome, ParseResult, ParserConfig, TokenSet};
use crate::ringbuf::RingBuffer;

/// A one-shot custom parser function installed by [`AtCommandEngine::override_parser`],
/// used instead of the standard landmark/token parser for responses that
/// don't fit the generic [`ParserConfig`] model (spec §4.4).
pub type CustomParserFn = fn(&mut RingBuffer<'_>) -> ParseResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Idle,
    Sent,
    Parsing,
    DataMode,
    Complete(ResultCode),
}

/// A data-mode trigger literal and the handler that should take over once
/// it appears in the response stream (spec §4.5). The engine only records
/// which trigger is armed; [`crate::dmode`] does the actual framing.
#[derive(Debug, Clone, Copy)]
pub struct DataModeTrigger<'a> {
    pub literal: &'a [u8],
}

pub struct AtCommandEngine<'a> {
    state: State,
    parser_cfg: ParserConfig<'a>,
    custom_parser: Option<CustomParserFn>,
    data_mode_trigger: Option<DataModeTrigger<'a>>,
    timeout_ms: u32,
    sent_at_ms: u32,
    raw: String<RAW_RESPONSE_CAPACITY>,
    tokens: TokenSet,
    locked: bool,
}

impl<'a> Default for AtCommandEngine<'a> {
    fn default() -> Self {
        Self {
            state: State::Idle,
            parser_cfg: ParserConfig::default(),
            custom_parser: None,
            data_mode_trigger: None,
            timeout_ms: DEFAULT_TIMEOUT_MS,
            sent_at_ms: 0,
            raw: String::new(),
            tokens: TokenSet::new(),
            locked: false,
        }
    }
}

impl<'a> AtCommandEngine<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> State {
        self.state
    }

    /// Overrides the default response timeout for the next command only.
    pub fn override_timeout(&mut self, ms: u32) {
        self.timeout_ms = ms;
    }

    /// Installs a parser configuration used until the next `close`.
    pub fn config_parser(&mut self, cfg: ParserConfig<'a>) {
        self.parser_cfg = cfg;
    }

    /// Installs a custom parser function, consumed by the next dispatch
    /// instead of the standard landmark/token parser [`Self::config_parser`]
    /// installs (spec §4.4 `override_parser(fn)`). Use this when a response
    /// needs validation the generic `ParserConfig` model can't express --
    /// e.g. a bare digit string with no landmark to anchor on.
    pub fn override_parser(&mut self, parser: CustomParserFn) {
        self.custom_parser = Some(parser);
    }

    /// Arms a data-mode trigger for the command about to be dispatched.
    pub fn config_data_mode(&mut self, trigger: DataModeTrigger<'a>) {
        self.data_mode_trigger = Some(trigger);
    }

    /// Takes the command lock and transmits `cmd`. Fails with
    /// [`Error::LockConflict`] if a command is already outstanding.
    pub fn try_invoke(
        &mut self,
        iop: &mut Iop<'_>,
        bridge: &mut impl Bridge,
        clock: &dyn Clock,
        cmd: &[u8],
    ) -> crate::error::Result<()> {
        if self.locked {
            return Err(Error::LockConflict);
        }
        self.locked = true;
        self.state = State::Sent;
        self.sent_at_ms = clock.now_ms();
        self.raw.clear();
        self.tokens.clear();
        iop.rx().reset();
        crate::log_at_cmd!(cmd);
        iop.start_tx(bridge, cmd)?;
        Ok(())
    }

    /// Drives the state machine forward by one step: checks for timeout,
    /// then attempts a parse if any data mode trigger is unresolved. Call
    /// repeatedly (e.g. from the main poll loop) until [`State::Complete`].
    pub fn poll(&mut self, iop: &mut Iop<'_>, clock: &dyn Clock) -> State {
        if matches!(self.state, State::Idle | State::Complete(_)) {
            return self.state;
        }

        if clock.now_ms().wrapping_sub(self.sent_at_ms) >= self.timeout_ms {
            self.complete(ResultCode::Timeout);
            return self.state;
        }

        if self.state == State::Sent {
            self.state = State::Parsing;
        }

        if self.state == State::Parsing {
            if let Some(trigger) = self.data_mode_trigger {
                if iop.rx().find(trigger.literal, 0, 0, false).is_some() {
                    self.state = State::DataMode;
                    return self.state;
                }
            }

            let result = match self.custom_parser {
                Some(parser) => parser(iop.rx()),
                None => parse_standard(iop.rx(), &self.parser_cfg),
            };
            match result.outcome {
                ParseOutcome::Pending => {}
                ParseOutcome::Success => {
                    self.tokens = result.tokens;
                    self.complete(ResultCode::Success);
                }
                ParseOutcome::Error(code) => {
                    self.complete(code);
                }
            }
        }

        self.state
    }

    fn complete(&mut self, code: ResultCode) {
        self.state = State::Complete(code);
        crate::log_at_result!(code);
    }

    /// Releases the command lock, returning the engine to `Idle`. Must be
    /// called once the caller has consumed the completed result.
    pub fn close(&mut self) {
        self.state = State::Idle;
        self.data_mode_trigger = None;
        self.custom_parser = None;
        self.locked = false;
    }

    pub fn get_token(&self, iop: &mut Iop<'_>, index: usize) -> Option<heapless::Vec<u8, 64>> {
        let (start, end) = *self.tokens.get(index)?;
        let mut out = heapless::Vec::new();
        for i in start..end.min(start + 64) {
            let byte = peek(iop, i)?;
            let _ = out.push(byte);
        }
        Some(out)
    }

    pub fn token_count(&self) -> usize {
        self.tokens.len()
    }

    /// Copies the bytes currently sitting in the ring verbatim, for
    /// responses that don't fit the landmark/token model (`ATI`'s
    /// multi-line banner, `AT+GSN`'s bare IMEI echo).
    pub fn response_bytes(&self, iop: &mut Iop<'_>) -> heapless::Vec<u8, RAW_RESPONSE_CAPACITY> {
        let mut out = heapless::Vec::new();
        let occupied = iop.rx().occupied();
        for i in 0..occupied.min(RAW_RESPONSE_CAPACITY) {
            match peek(iop, i) {
                Some(b) => {
                    let _ = out.push(b);
                }
                None => break,
            }
        }
        out
    }

    /// Synchronous convenience wrapper: dispatches `cmd` and polls until
    /// completion, calling `yielder` between polls (spec §9 "poll-based
    /// future with a synchronous adapter").
    pub fn await_result(
        &mut self,
        iop: &mut Iop<'_>,
        bridge: &mut impl Bridge,
        clock: &dyn Clock,
        yielder: &mut impl Yield,
        cmd: &[u8],
    ) -> crate::error::Result<ResultCode> {
        self.try_invoke(iop, bridge, clock, cmd)?;
        loop {
            match self.poll(iop, clock) {
                State::Complete(code) => {
                    self.close();
                    return Ok(code);
                }
                _ => yielder.yield_now(),
            }
        }
    }
}

fn peek(iop: &mut Iop<'_>, offset: usize) -> Option<u8> {
    let ring = iop.rx();
    if offset >= ring.occupied() {
        return None;
    }
    let chunk = ring.reserve_pop(offset + 1);
    let b = chunk.last().copied();
    ring.finalize_pop(false);
    b
}
