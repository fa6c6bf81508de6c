//! Network / operator-attach module (spec §4.9), covering registration
//! status, operator selection, and PDP context bookkeeping the way the
//! original `ltemc-network.c` combines them into one concern.
//!
//! This crate stops at the AT-command boundary: it reports registration
//! status and PDP context count/address, but does not bring up an IP
//! stack itself (no sockets, no DHCP-equivalent) — that is the host
//! application's job once a context is active.

use heapless::Vec;

use crate::error::{Error, ResultCode};

/// Registration status from `+CEREG`/`+CREG` responses.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum RegistrationStatus {
    NotRegistered,
    RegisteredHome,
    Searching,
    Denied,
    Unknown,
    RegisteredRoaming,
}

impl RegistrationStatus {
    pub fn from_u8(val: u8) -> Self {
        match val {
            0 => Self::NotRegistered,
            1 => Self::RegisteredHome,
            2 => Self::Searching,
            3 => Self::Denied,
            5 => Self::RegisteredRoaming,
            _ => Self::Unknown,
        }
    }

    pub fn is_registered(self) -> bool {
        matches!(self, Self::RegisteredHome | Self::RegisteredRoaming)
    }
}

/// Parses a `+CEREG:` line, handling both the query form
/// (`+CEREG: <n>,<stat>[,...]`) and the URC form (`+CEREG: <stat>[,...]`).
pub fn parse_cereg_response(line: &str) -> Option<RegistrationStatus> {
    let pos = line.find("+CEREG:")?;
    let after = line[pos + "+CEREG:".len()..].trim_start();
    let mut parts = after.split(',');
    let first = parts.next()?.trim();
    let stat_str = match parts.next() {
        Some(second) => second.trim(),
        None => first,
    };
    let stat: u8 = stat_str.parse().ok()?;
    Some(RegistrationStatus::from_u8(stat))
}

/// One PDP context as reported by `AT+QIACT?` (spec supplement, grounded
/// on `ntwk_getActivePdpCntxtCnt`'s enumeration of active contexts).
#[derive(Clone, Copy, Debug)]
pub struct PdpContext {
    pub context_id: u8,
    pub ip: [u8; 4],
}

/// Parses one `+QIACT:` line: `+QIACT: <cid>,<context_state>,<context_type>,"<ip>"`.
pub fn parse_qiact_line(line: &str) -> Option<PdpContext> {
    let pos = line.find("+QIACT:")?;
    let after = &line[pos + "+QIACT:".len()..];
    let mut parts = after.split(',');
    let context_id: u8 = parts.next()?.trim().parse().ok()?;
    let _state = parts.next()?;
    let _ctype = parts.next()?;
    let quoted = parts.next()?;
    let ip_str = quoted.trim().trim_matches('"');
    let ip = parse_ipv4(ip_str)?;
    Some(PdpContext { context_id, ip })
}

fn parse_ipv4(s: &str) -> Option<[u8; 4]> {
    let mut parts = s.split('.');
    let a: u8 = parts.next()?.parse().ok()?;
    let b: u8 = parts.next()?.parse().ok()?;
    let c: u8 = parts.next()?.parse().ok()?;
    let d: u8 = parts.next()?.parse().ok()?;
    if parts.next().is_some() {
        return None;
    }
    Some([a, b, c, d])
}

/// Parses `+CGPADDR: <cid>,<ip>` -- the `AT+CGPADDR` form used by
/// `ntwk_awaitOperator` to fetch the address of the context the attach
/// used, distinct from `+QIACT:`'s quoted-IP, four-field shape.
pub fn parse_cgpaddr_line(line: &str) -> Option<PdpContext> {
    let pos = line.find("+CGPADDR:")?;
    let after = &line[pos + "+CGPADDR:".len()..];
    let mut parts = after.split(',');
    let context_id: u8 = parts.next()?.trim().parse().ok()?;
    let ip_str = parts.next()?.trim();
    let ip = parse_ipv4(ip_str)?;
    Some(PdpContext { context_id, ip })
}

/// Counts and collects active PDP contexts out of a full `AT+QIACT?`
/// response body (one `+QIACT:` line per active context).
pub fn parse_active_contexts(body: &str) -> Vec<PdpContext, 4> {
    let mut out = Vec::new();
    for line in body.lines() {
        if let Some(ctx) = parse_qiact_line(line) {
            let _ = out.push(ctx);
        }
    }
    out
}

/// Selected network operator, as reported by `AT+COPS?` (spec §8 scenario
/// 6), grounded on `ltemc-network.c`'s `s_getNetworkOperator`.
#[derive(Clone, Debug)]
pub struct NetworkOperator {
    pub name: heapless::String<32>,
    pub iot_mode: heapless::String<8>,
}

/// Parses `+COPS: <mode>,<format>,"<operator>",<AcT>`, mapping the
/// access-technology code per spec §4.8: `8 -> "M1"`, `9 -> "NB1"`, any
/// other value -> `"GSM"` (the original only distinguishes M1 from
/// everything else; this driver reports the GSM fallback explicitly
/// instead of folding it into NB1).
pub fn parse_cops_response(line: &str) -> Option<NetworkOperator> {
    let pos = line.find("+COPS:")?;
    let after = &line[pos + "+COPS:".len()..];
    let open_quote = after.find('"')?;
    let rest = &after[open_quote + 1..];
    let close_quote = rest.find('"')?;
    let name_str = &rest[..close_quote];
    let tail = rest[close_quote + 1..].trim_start_matches(',');
    let act: u8 = tail.split(',').next()?.trim().parse().ok()?;

    let mut name = heapless::String::new();
    for ch in name_str.chars() {
        if name.push(ch).is_err() {
            break;
        }
    }
    let mut iot_mode = heapless::String::new();
    let _ = iot_mode.push_str(if act == 8 {
        "M1"
    } else if act == 9 {
        "NB1"
    } else {
        "GSM"
    });
    Some(NetworkOperator { name, iot_mode })
}

/// Outcome of polling for operator attachment (spec §4.9 `await_operator`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AwaitOutcome {
    Pending,
    Attached,
    Cancelled,
    Failed(ResultCode),
}

/// Tracks an in-progress `await_operator` wait, cancellable by the host
/// (e.g. on a user-initiated disconnect) without losing the last observed
/// status.
pub struct OperatorWait {
    cancelled: bool,
    last_status: RegistrationStatus,
}

impl OperatorWait {
    pub fn new() -> Self {
        Self {
            cancelled: false,
            last_status: RegistrationStatus::Unknown,
        }
    }

    pub fn cancel(&mut self) {
        self.cancelled = true;
    }

    pub fn last_status(&self) -> RegistrationStatus {
        self.last_status
    }

    /// Call with each newly observed `+CEREG` status until it returns
    /// something other than `Pending`.
    pub fn on_status(&mut self, status: RegistrationStatus) -> AwaitOutcome {
        self.last_status = status;
        if self.cancelled {
            return AwaitOutcome::Cancelled;
        }
        if status.is_registered() {
            return AwaitOutcome::Attached;
        }
        if status == RegistrationStatus::Denied {
            return AwaitOutcome::Failed(ResultCode::Conflict);
        }
        AwaitOutcome::Pending
    }
}

impl Default for OperatorWait {
    fn default() -> Self {
        Self::new()
    }
}

/// RF priority mode (spec §4.9 precondition gating on `ltem_setRfPriorityMode`):
/// some network operations require the modem not to be mid-transition
/// between GNSS and cellular RF ownership.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RfPriorityMode {
    Gnss,
    Cellular,
}

/// Validates an RF priority mode change against the current mode, the way
/// `ltem_setRfPriorityMode` rejects a redundant or conflicting request
/// before issuing the AT command.
pub fn validate_rf_priority_change(current: RfPriorityMode, requested: RfPriorityMode) -> Result<(), Error> {
    if current == requested {
        return Err(Error::Fault(crate::error::FaultKind::ImpossibleState));
    }
    Ok(())
}
