//! Parser state and the preamble dispatcher.

use std::io::{self, Write};

use tracing::debug;

use crate::checksum;
use crate::diagnostics;
use crate::error::{Error, Result};
use crate::frame::{Details, Frame};
use crate::protocols::{self, Active, Protocol};

/// Smallest message buffer any parser will accept.
pub const MINIMUM_BUFFER_LENGTH: usize = 32;

const DEFAULT_BUFFER_LENGTH: usize = 512;

/// End-of-message callback: one invocation per validated frame.
pub type EomCallback = Box<dyn FnMut(&Frame) + Send>;

/// Optional rescuer for frames whose checksum or CRC failed. Returning
/// `true` accepts the frame as-is; `false` (or no callback) drops it.
pub type BadCrcCallback = Box<dyn FnMut(&Frame) -> bool + Send>;

/// Optional sink for bytes no parser accepted. Together with the frames
/// delivered to the end-of-message callback this accounts for every input
/// byte.
pub type InvalidDataCallback = Box<dyn FnMut(&[u8]) + Send>;

type DiagnosticSink = Box<dyn Write + Send>;

/// Configures and constructs a [`Parser`].
///
/// # Example
/// ```
/// use gnss_demux::{ParserBuilder, Protocol};
///
/// let parser = ParserBuilder::new("rover")
///     .with_protocol(Protocol::Nmea)
///     .with_protocol(Protocol::Rtcm)
///     .buffer_length(1024)
///     .begin(|frame| println!("{} bytes", frame.len()))
///     .unwrap();
/// # drop(parser);
/// ```
pub struct ParserBuilder {
    name: String,
    table: Vec<Protocol>,
    buffer_length: usize,
    error_sink: Option<DiagnosticSink>,
    debug_sink: Option<DiagnosticSink>,
    bad_crc: Option<BadCrcCallback>,
    abort_on_non_printable: bool,
}

impl ParserBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        ParserBuilder {
            name: name.into(),
            table: Vec::new(),
            buffer_length: DEFAULT_BUFFER_LENGTH,
            error_sink: None,
            debug_sink: None,
            bad_crc: None,
            abort_on_non_printable: false,
        }
    }

    /// Register a protocol. Registration order is dispatch priority.
    #[must_use]
    pub fn with_protocol(mut self, protocol: Protocol) -> Self {
        self.table.push(protocol);
        self
    }

    /// Register several protocols at once, in order.
    #[must_use]
    pub fn with_protocols(mut self, protocols: &[Protocol]) -> Self {
        self.table.extend_from_slice(protocols);
        self
    }

    /// Size of the message buffer; one complete frame must fit.
    #[must_use]
    pub fn buffer_length(mut self, length: usize) -> Self {
        self.buffer_length = length;
        self
    }

    /// Attach a sink for error diagnostics.
    #[must_use]
    pub fn error_sink(mut self, sink: impl Write + Send + 'static) -> Self {
        self.error_sink = Some(Box::new(sink));
        self
    }

    /// Attach a sink for debug diagnostics.
    #[must_use]
    pub fn debug_sink(mut self, sink: impl Write + Send + 'static) -> Self {
        self.debug_sink = Some(Box::new(sink));
        self
    }

    /// Attach a bad-CRC rescuer. See [`BadCrcCallback`].
    #[must_use]
    pub fn on_bad_crc(mut self, callback: impl FnMut(&Frame) -> bool + Send + 'static) -> Self {
        self.bad_crc = Some(Box::new(callback));
        self
    }

    /// Abort text sentences on bytes outside the printable ASCII range.
    #[must_use]
    pub fn abort_on_non_printable(mut self, enabled: bool) -> Self {
        self.abort_on_non_printable = enabled;
        self
    }

    /// Validate the configuration and construct the parser.
    ///
    /// # Errors
    /// [`Error::EmptyParserTable`] with no registered protocols,
    /// [`Error::EmptyName`] for an empty table name, and
    /// [`Error::BufferTooSmall`] when the buffer cannot hold the smallest
    /// frame of every registered protocol. A one-line diagnostic goes to
    /// the error sink, when attached.
    pub fn begin(mut self, eom: impl FnMut(&Frame) + Send + 'static) -> Result<Parser> {
        if let Err(err) = self.validate() {
            if let Some(sink) = self.error_sink.as_mut() {
                let _ = writeln!(sink, "{}: {err}", self.name);
            }
            return Err(err);
        }

        let mut parser = Parser {
            name: self.name,
            table: self.table,
            active: Active::Searching,
            active_index: None,
            buffer: vec![0u8; self.buffer_length],
            length: 0,
            crc: 0,
            eom: Box::new(eom),
            bad_crc: self.bad_crc,
            invalid_data: None,
            error_sink: self.error_sink,
            debug_sink: self.debug_sink,
            abort_on_non_printable: self.abort_on_non_printable,
        };

        debug!(
            name = %parser.name,
            protocols = ?parser.table,
            buffer_length = parser.buffer.len(),
            "parser started"
        );
        parser.print_configuration_to_debug();

        Ok(parser)
    }

    fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            return Err(Error::EmptyName);
        }
        if self.table.is_empty() {
            return Err(Error::EmptyParserTable);
        }
        let minimum = self
            .table
            .iter()
            .map(Protocol::minimum_buffer_length)
            .max()
            .unwrap_or(0)
            .max(MINIMUM_BUFFER_LENGTH);
        if self.buffer_length < minimum {
            return Err(Error::BufferTooSmall {
                actual: self.buffer_length,
                minimum,
            });
        }
        Ok(())
    }
}

/// Demultiplexes one interleaved byte stream across the registered
/// protocols.
///
/// Feed bytes with [`parse_next_byte`](Parser::parse_next_byte) or
/// [`parse_next_bytes`](Parser::parse_next_bytes); validated frames
/// arrive synchronously at the end-of-message callback, in input order.
/// Dropping the parser stops it; the buffer is owned by the parser and
/// freed with it.
pub struct Parser {
    pub(crate) name: String,
    pub(crate) table: Vec<Protocol>,
    pub(crate) active: Active,
    pub(crate) active_index: Option<usize>,
    pub(crate) buffer: Vec<u8>,
    pub(crate) length: usize,
    pub(crate) crc: u32,
    eom: EomCallback,
    bad_crc: Option<BadCrcCallback>,
    invalid_data: Option<InvalidDataCallback>,
    error_sink: Option<DiagnosticSink>,
    debug_sink: Option<DiagnosticSink>,
    pub(crate) abort_on_non_printable: bool,
}

impl Parser {
    /// Consume one byte from the stream.
    ///
    /// At most one state transition happens per byte; any callbacks fire
    /// on the caller's stack before this returns.
    pub fn parse_next_byte(&mut self, data: u8) {
        if matches!(self.active, Active::Searching) {
            self.first_byte(data);
            return;
        }

        // The frame no longer fits: drop it and give the current byte a
        // fresh chance at being a preamble.
        if self.length >= self.buffer.len() {
            let buffer_length = self.buffer.len();
            self.error_line(format_args!(
                "message too long, increase the buffer size > {buffer_length}"
            ));
            let dropped = self.length;
            self.dump_dropped(dropped);
            self.report_invalid(dropped);
            self.first_byte(data);
            return;
        }

        self.buffer[self.length] = data;
        self.length += 1;

        match self.active {
            Active::Rtcm(_) => self.crc = checksum::crc24q_update(self.crc, data),
            Active::UnicoreBinary(_) => {
                self.crc = checksum::crc32_reversed_update(self.crc, data);
            }
            _ => {}
        }

        protocols::advance(self, data);
    }

    /// Consume a batch of bytes. The end-of-message callback may fire any
    /// number of times along the way.
    pub fn parse_next_bytes(&mut self, data: &[u8]) {
        for &byte in data {
            self.parse_next_byte(byte);
        }
    }

    /// Redirect bytes that belong to no recognised frame.
    pub fn set_invalid_data_callback(
        &mut self,
        callback: impl FnMut(&[u8]) + Send + 'static,
    ) {
        self.invalid_data = Some(Box::new(callback));
    }

    /// Remove the invalid-data callback.
    pub fn clear_invalid_data_callback(&mut self) {
        self.invalid_data = None;
    }

    pub fn enable_error_output(&mut self, sink: impl Write + Send + 'static) {
        self.error_sink = Some(Box::new(sink));
    }

    pub fn disable_error_output(&mut self) {
        self.error_sink = None;
    }

    pub fn enable_debug_output(&mut self, sink: impl Write + Send + 'static) {
        self.debug_sink = Some(Box::new(sink));
    }

    pub fn disable_debug_output(&mut self) {
        self.debug_sink = None;
    }

    /// Abort text sentences on bytes outside the printable ASCII range.
    pub fn set_abort_on_non_printable(&mut self, enabled: bool) {
        self.abort_on_non_printable = enabled;
    }

    /// The table name given at construction.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The registered protocols, in dispatch order.
    #[must_use]
    pub fn protocols(&self) -> &[Protocol] {
        &self.table
    }

    /// Diagnostic name of the current state.
    #[must_use]
    pub fn state_name(&self) -> &'static str {
        self.active.state_name()
    }

    /// Number of message bytes currently buffered.
    #[must_use]
    pub fn message_length(&self) -> usize {
        self.length
    }

    /// Write a human-readable configuration dump.
    ///
    /// # Errors
    /// Any error from the writer.
    pub fn print_configuration<W: Write>(&self, w: &mut W) -> io::Result<()> {
        writeln!(w, "{} parser configuration", self.name)?;
        write!(w, "    protocols:")?;
        for protocol in &self.table {
            write!(w, " {protocol}")?;
        }
        writeln!(w)?;
        writeln!(w, "    buffer: {} bytes", self.buffer.len())?;
        writeln!(w, "    state: {}", self.active.state_name())?;
        writeln!(w, "    machine: {:?}", self.active)?;
        writeln!(w, "    length: {} message bytes", self.length)?;
        writeln!(w, "    crc: {:#010x}", self.crc)?;
        Ok(())
    }

    // ---- dispatcher -----------------------------------------------------

    /// Restart the preamble scan on `data`. Every byte that survives a
    /// rejection re-enters here, so anything that looks like a preamble is
    /// reconsidered as one.
    pub(crate) fn first_byte(&mut self, data: u8) {
        self.crc = 0;
        self.active = Active::Searching;
        self.active_index = None;
        self.buffer[0] = data;
        self.length = 1;

        for index in 0..self.table.len() {
            let protocol = self.table[index];
            if protocol.accept(self, data) {
                self.active_index = Some(index);
                return;
            }
        }

        self.report_invalid(1);
    }

    /// Deliver the buffered frame to the end-of-message callback.
    pub(crate) fn emit(&mut self, details: Details) {
        let index = self
            .active_index
            .expect("bad state, emit with no latched protocol");
        let protocol = self.table[index];
        let frame = Frame::new(&self.buffer[..self.length], protocol, index, details);
        (self.eom)(&frame);
    }

    /// Offer a checksum-failing frame to the bad-CRC callback. `true`
    /// means the frame was rescued and should be delivered anyway.
    pub(crate) fn crc_rescue(&mut self, details: Details) -> bool {
        let Some(index) = self.active_index else {
            return false;
        };
        let protocol = self.table[index];
        match self.bad_crc.as_mut() {
            Some(callback) => {
                let frame = Frame::new(&self.buffer[..self.length], protocol, index, details);
                callback(&frame)
            }
            None => false,
        }
    }

    /// Drop the frame in progress and rescan the current byte as a
    /// potential preamble. The dropped prefix goes to the invalid-data
    /// callback.
    pub(crate) fn reject_rescan(&mut self, data: u8) {
        let dropped = self.length.saturating_sub(1);
        if dropped > 0 {
            self.dump_dropped(dropped);
            self.report_invalid(dropped);
        }
        self.first_byte(data);
    }

    /// Drop the frame in progress, current byte included, and return to
    /// preamble scanning on the next byte.
    pub(crate) fn reject_consume(&mut self) {
        let dropped = self.length;
        if dropped > 0 {
            self.dump_dropped(dropped);
            self.report_invalid(dropped);
        }
        self.reset_search();
    }

    /// Return to preamble scanning with an empty buffer.
    pub(crate) fn reset_search(&mut self) {
        self.active = Active::Searching;
        self.active_index = None;
        self.length = 0;
        self.crc = 0;
    }

    // ---- diagnostics ----------------------------------------------------

    pub(crate) fn error_line(&mut self, args: std::fmt::Arguments) {
        if let Some(sink) = self.error_sink.as_mut() {
            let _ = writeln!(sink, "{}: {}", self.name, args);
        }
    }

    pub(crate) fn debug_line(&mut self, args: std::fmt::Arguments) {
        if let Some(sink) = self.debug_sink.as_mut() {
            let _ = writeln!(sink, "{}: {}", self.name, args);
        }
    }

    fn dump_dropped(&mut self, end: usize) {
        if let Some(sink) = self.debug_sink.as_mut() {
            let _ = diagnostics::hex_dump(sink, &self.buffer[..end]);
        }
    }

    fn report_invalid(&mut self, end: usize) {
        if let Some(callback) = self.invalid_data.as_mut() {
            callback(&self.buffer[..end]);
        }
    }
}

impl std::fmt::Debug for Parser {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Parser")
            .field("name", &self.name)
            .field("protocols", &self.table)
            .field("state", &self.active.state_name())
            .field("length", &self.length)
            .field("buffer_length", &self.buffer.len())
            .finish_non_exhaustive()
    }
}

impl Parser {
    fn print_configuration_to_debug(&mut self) {
        if let Some(mut sink) = self.debug_sink.take() {
            let _ = self.print_configuration(&mut sink);
            self.debug_sink = Some(sink);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;

    fn collecting_parser(
        table: &[Protocol],
    ) -> (Parser, mpsc::Receiver<(Protocol, Vec<u8>, Details)>) {
        let (tx, rx) = mpsc::channel();
        let parser = ParserBuilder::new("test")
            .with_protocols(table)
            .buffer_length(256)
            .begin(move |frame| {
                tx.send((frame.protocol(), frame.bytes().to_vec(), frame.details().clone()))
                    .unwrap();
            })
            .unwrap();
        (parser, rx)
    }

    #[test]
    fn begin_requires_protocols() {
        let zult = ParserBuilder::new("empty").begin(|_| {});
        assert!(matches!(zult, Err(Error::EmptyParserTable)));
    }

    #[test]
    fn begin_requires_name() {
        let zult = ParserBuilder::new("")
            .with_protocol(Protocol::Nmea)
            .begin(|_| {});
        assert!(matches!(zult, Err(Error::EmptyName)));
    }

    #[test]
    fn begin_requires_minimum_buffer() {
        let zult = ParserBuilder::new("small")
            .with_protocol(Protocol::Nmea)
            .buffer_length(8)
            .begin(|_| {});
        assert!(matches!(
            zult,
            Err(Error::BufferTooSmall { actual: 8, minimum: 32 })
        ));
    }

    #[test]
    fn earlier_registration_wins_shared_preamble() {
        // NMEA and SBF both accept '$'; NMEA registered first gets it.
        let (mut parser, rx) = collecting_parser(&[Protocol::Nmea, Protocol::Sbf]);
        parser.parse_next_bytes(b"$GPGGA,123519,4807.038,N*27\r\n");
        let (protocol, _, _) = rx.try_recv().unwrap();
        assert_eq!(protocol, Protocol::Nmea);
    }

    #[test]
    fn unmatched_bytes_reach_invalid_data_callback() {
        let (mut parser, rx) = collecting_parser(&[Protocol::Ublox]);
        let (bad_tx, bad_rx) = mpsc::channel();
        parser.set_invalid_data_callback(move |bytes| {
            bad_tx.send(bytes.to_vec()).unwrap();
        });

        parser.parse_next_bytes(&[0xff, 0x00]);
        assert!(rx.try_recv().is_err());
        assert_eq!(bad_rx.try_recv().unwrap(), vec![0xff]);
        assert_eq!(bad_rx.try_recv().unwrap(), vec![0x00]);
    }

    #[test]
    fn too_long_message_is_dropped_and_rescanned() {
        let (tx, rx) = mpsc::channel();
        let mut parser = ParserBuilder::new("tiny")
            .with_protocol(Protocol::Rtcm)
            .with_protocol(Protocol::Ublox)
            .buffer_length(32)
            .begin(move |frame| tx.send(frame.bytes().to_vec()).unwrap())
            .unwrap();

        // An RTCM frame claiming a payload larger than the buffer.
        parser.parse_next_bytes(&[0xd3, 0x01, 0x00]);
        for _ in 0..40 {
            parser.parse_next_byte(0xee);
        }
        assert!(rx.try_recv().is_err());

        // The parser recovered and still accepts a clean frame.
        parser.parse_next_bytes(&[0xb5, 0x62, 0x05, 0x01, 0x00, 0x00, 0x06, 0x17]);
        let frame = rx.try_recv().unwrap();
        assert_eq!(frame[0], 0xb5);
    }

    #[test]
    fn buffer_is_reused_between_frames() {
        let (mut parser, rx) = collecting_parser(&[Protocol::Ublox]);
        let ack = [0xb5, 0x62, 0x05, 0x01, 0x00, 0x00, 0x06, 0x17];
        parser.parse_next_bytes(&ack);
        parser.parse_next_bytes(&ack);
        assert_eq!(rx.try_recv().unwrap().1, ack.to_vec());
        assert_eq!(rx.try_recv().unwrap().1, ack.to_vec());
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn diagnostics_reach_the_error_sink() {
        use std::sync::{Arc, Mutex};

        #[derive(Clone)]
        struct SharedSink(Arc<Mutex<Vec<u8>>>);

        impl std::io::Write for SharedSink {
            fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
                self.0.lock().unwrap().extend_from_slice(buf);
                Ok(buf.len())
            }
            fn flush(&mut self) -> std::io::Result<()> {
                Ok(())
            }
        }

        let sink = SharedSink(Arc::new(Mutex::new(Vec::new())));
        let mut parser = ParserBuilder::new("sinky")
            .with_protocol(Protocol::Nmea)
            .buffer_length(64)
            .error_sink(sink.clone())
            .begin(|_| {})
            .unwrap();

        parser.parse_next_bytes(b"$GP|GA,1*00");
        let text = String::from_utf8(sink.0.lock().unwrap().clone()).unwrap();
        assert!(text.contains("sinky"));
        assert!(text.contains("NMEA invalid sentence name character"));
    }

    #[test]
    fn configuration_dump_mentions_protocols() {
        let (parser, _rx) = collecting_parser(&[Protocol::Nmea, Protocol::Rtcm]);
        let mut out = Vec::new();
        parser.print_configuration(&mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("NMEA"));
        assert!(text.contains("RTCM"));
        assert!(text.contains("first_byte"));
    }
}
