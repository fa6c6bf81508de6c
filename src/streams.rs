//! Stream registry (spec §4.6): tracks one control block per open
//! socket/file/MQTT context so the event manager can route unsolicited
//! result codes to the right owner.

use heapless::Vec;

use crate::config::MAX_STREAMS;
use crate::error::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamType {
    Udp,
    Tcp,
    SslTls,
    File,
    Mqtt,
}

impl StreamType {
    /// Whether this stream type is one of the socket family (spec §4.6
    /// "SOCKET type-filter" grouping used by URC routing).
    pub fn is_socket(self) -> bool {
        matches!(self, StreamType::Udp | StreamType::Tcp | StreamType::SslTls)
    }
}

/// Bound RX data-mode handler variant for a stream (spec §3 `dataHndlr`):
/// which [`crate::dmode`] type drains the transfer once
/// [`crate::atcmd::AtCommandEngine`] observes the data-mode trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataHandlerKind {
    LengthFramedRx,
    DefaultTx,
}

/// Application sink for bytes delivered out of a length-framed RX transfer
/// (spec §3 `appRecvDataCB`): `fn(context_id, bytes)`, invoked with the
/// assembled payload once the transfer completes.
pub type AppRecvDataCb = fn(u8, &[u8]);

/// Per-stream context, mirroring the original's `streamCtrl_t` header
/// fields relevant to host-side bookkeeping.
#[derive(Debug, Clone, Copy)]
pub struct StreamControlBlock {
    pub context_id: u8,
    pub stream_type: StreamType,
    pub urc_pending: bool,
    /// Bound RX handler variant, if this stream takes part in data mode.
    pub data_handler: Option<DataHandlerKind>,
    /// Application callback bytes are delivered to once a length-framed RX
    /// transfer completes.
    pub app_recv_data_cb: Option<AppRecvDataCb>,
    /// URC lead-in literal this stream's handler recognizes (spec §3
    /// `urcHndlr`), e.g. `b"+QIURC: \"recv\""`. `None` means this stream
    /// never claims URCs.
    pub urc_prefix: Option<&'static [u8]>,
}

pub struct StreamRegistry {
    streams: Vec<StreamControlBlock, MAX_STREAMS>,
}

impl StreamRegistry {
    pub fn new() -> Self {
        Self { streams: Vec::new() }
    }

    pub fn len(&self) -> usize {
        self.streams.len()
    }

    pub fn is_empty(&self) -> bool {
        self.streams.is_empty()
    }

    pub fn add_stream(&mut self, context_id: u8, stream_type: StreamType) -> Result<(), Error> {
        if self.streams.iter().any(|s| s.context_id == context_id) {
            return Err(Error::StreamTableFull);
        }
        self.streams
            .push(StreamControlBlock {
                context_id,
                stream_type,
                urc_pending: false,
                data_handler: None,
                app_recv_data_cb: None,
                urc_prefix: None,
            })
            .map_err(|_| Error::StreamTableFull)
    }

    /// Binds the data-mode handler variant and receive callback a stream
    /// uses once `config_data_mode` arms a transfer against it (spec §3
    /// `dataHndlr`/`appRecvDataCB`).
    pub fn set_data_handler(
        &mut self,
        context_id: u8,
        kind: DataHandlerKind,
        cb: AppRecvDataCb,
    ) -> Result<(), Error> {
        let sc = self.get_stream_mut(context_id).ok_or(Error::UnknownStream)?;
        sc.data_handler = Some(kind);
        sc.app_recv_data_cb = Some(cb);
        Ok(())
    }

    /// Binds the URC lead-in literal a stream's handler recognizes (spec §3
    /// `urcHndlr`), consulted by [`crate::events::dispatch_one`].
    pub fn set_urc_prefix(&mut self, context_id: u8, prefix: &'static [u8]) -> Result<(), Error> {
        let sc = self.get_stream_mut(context_id).ok_or(Error::UnknownStream)?;
        sc.urc_prefix = Some(prefix);
        Ok(())
    }

    pub fn delete_stream(&mut self, context_id: u8) -> Result<(), Error> {
        let idx = self
            .streams
            .iter()
            .position(|s| s.context_id == context_id)
            .ok_or(Error::UnknownStream)?;
        self.streams.swap_remove(idx);
        Ok(())
    }

    pub fn get_stream(&self, context_id: u8) -> Option<&StreamControlBlock> {
        self.streams.iter().find(|s| s.context_id == context_id)
    }

    pub fn get_stream_mut(&mut self, context_id: u8) -> Option<&mut StreamControlBlock> {
        self.streams.iter_mut().find(|s| s.context_id == context_id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &StreamControlBlock> {
        self.streams.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut StreamControlBlock> {
        self.streams.iter_mut()
    }
}

impl Default for StreamRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_then_get_round_trips() {
        let mut reg = StreamRegistry::new();
        reg.add_stream(1, StreamType::Tcp).unwrap();
        let sc = reg.get_stream(1).unwrap();
        assert_eq!(sc.stream_type, StreamType::Tcp);
        assert!(sc.stream_type.is_socket());
    }

    #[test]
    fn duplicate_context_id_is_rejected() {
        let mut reg = StreamRegistry::new();
        reg.add_stream(1, StreamType::Udp).unwrap();
        assert_eq!(reg.add_stream(1, StreamType::Tcp), Err(Error::StreamTableFull));
    }

    #[test]
    fn registry_full_at_max_streams() {
        let mut reg = StreamRegistry::new();
        for id in 0..MAX_STREAMS as u8 {
            reg.add_stream(id, StreamType::File).unwrap();
        }
        assert_eq!(
            reg.add_stream(MAX_STREAMS as u8, StreamType::File),
            Err(Error::StreamTableFull)
        );
    }

    #[test]
    fn delete_unknown_stream_errors() {
        let mut reg = StreamRegistry::new();
        assert_eq!(reg.delete_stream(9), Err(Error::UnknownStream));
    }

    #[test]
    fn file_and_mqtt_are_not_socket_type() {
        assert!(!StreamType::File.is_socket());
        assert!(!StreamType::Mqtt.is_socket());
        assert!(StreamType::SslTls.is_socket());
    }

    fn noop_cb(_context_id: u8, _bytes: &[u8]) {}

    #[test]
    fn new_stream_has_no_bound_handlers() {
        let mut reg = StreamRegistry::new();
        reg.add_stream(1, StreamType::File).unwrap();
        let sc = reg.get_stream(1).unwrap();
        assert!(sc.data_handler.is_none());
        assert!(sc.app_recv_data_cb.is_none());
        assert!(sc.urc_prefix.is_none());
    }

    #[test]
    fn set_data_handler_binds_kind_and_callback() {
        let mut reg = StreamRegistry::new();
        reg.add_stream(1, StreamType::File).unwrap();
        reg.set_data_handler(1, DataHandlerKind::LengthFramedRx, noop_cb)
            .unwrap();
        let sc = reg.get_stream(1).unwrap();
        assert_eq!(sc.data_handler, Some(DataHandlerKind::LengthFramedRx));
        assert!(sc.app_recv_data_cb.is_some());
    }

    #[test]
    fn set_data_handler_on_unknown_stream_errors() {
        let mut reg = StreamRegistry::new();
        assert_eq!(
            reg.set_data_handler(9, DataHandlerKind::DefaultTx, noop_cb),
            Err(Error::UnknownStream)
        );
    }

    #[test]
    fn set_urc_prefix_binds_literal() {
        let mut reg = StreamRegistry::new();
        reg.add_stream(1, StreamType::Mqtt).unwrap();
        reg.set_urc_prefix(1, b"+QMTRECV:").unwrap();
        assert_eq!(reg.get_stream(1).unwrap().urc_prefix, Some(b"+QMTRECV:".as_slice()));
    }
}
