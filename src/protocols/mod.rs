//! Protocol state machines.
//!
//! Each submodule owns one framing: a preamble acceptor that latches the
//! machine onto the stream, and an `advance` step driven once per buffered
//! byte. Machines are small `Copy` records holding the state tag and the
//! scratch values the framing needs (lengths, partial ids, running
//! checksums).

pub(crate) mod nmea;
pub(crate) mod rtcm;
pub(crate) mod sbf;
pub(crate) mod spartn;
pub(crate) mod ublox;
pub(crate) mod unicore_binary;
pub(crate) mod unicore_hash;

use crate::parser::Parser;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// A protocol that can be registered with a
/// [`ParserBuilder`](crate::ParserBuilder).
///
/// Registration order is dispatch priority: when two protocols would
/// accept the same preamble byte the earlier-registered one wins.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[non_exhaustive]
pub enum Protocol {
    /// NMEA 0183 text sentences (`$...*hh`).
    Nmea,
    /// RTCM 10403 binary frames.
    Rtcm,
    /// u-blox UBX binary packets.
    Ublox,
    /// Septentrio SBF binary blocks.
    Sbf,
    /// SPARTN correction frames.
    Spartn,
    /// Unicore binary responses.
    UnicoreBinary,
    /// Unicore `#`-prefixed text sentences.
    UnicoreHash,
}

impl Protocol {
    /// Diagnostic name of the protocol.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Protocol::Nmea => "NMEA",
            Protocol::Rtcm => "RTCM",
            Protocol::Ublox => "UBX",
            Protocol::Sbf => "SBF",
            Protocol::Spartn => "SPARTN",
            Protocol::UnicoreBinary => "Unicore binary",
            Protocol::UnicoreHash => "Unicore hash",
        }
    }

    /// Base offset applied by the payload accessors on
    /// [`Frame`](crate::Frame).
    #[must_use]
    pub fn payload_offset(&self) -> usize {
        match self {
            Protocol::Ublox => 6,
            _ => 0,
        }
    }

    /// Smallest buffer able to hold a complete minimal frame, trailer
    /// included.
    pub(crate) fn minimum_buffer_length(&self) -> usize {
        match self {
            Protocol::Nmea | Protocol::UnicoreHash => 32,
            Protocol::Rtcm => 6,
            Protocol::Ublox => 8,
            Protocol::Sbf => 8,
            Protocol::Spartn => 16,
            Protocol::UnicoreBinary => 28,
        }
    }

    /// Probe `data` as this protocol's preamble byte. On acceptance the
    /// protocol's machine is latched into `parse` and subsequent bytes go
    /// through [`advance`].
    pub(crate) fn accept(self, parse: &mut Parser, data: u8) -> bool {
        match self {
            Protocol::Nmea => nmea::accept(parse, data),
            Protocol::Rtcm => rtcm::accept(parse, data),
            Protocol::Ublox => ublox::accept(parse, data),
            Protocol::Sbf => sbf::accept(parse, data),
            Protocol::Spartn => spartn::accept(parse, data),
            Protocol::UnicoreBinary => unicore_binary::accept(parse, data),
            Protocol::UnicoreHash => unicore_hash::accept(parse, data),
        }
    }
}

impl std::fmt::Display for Protocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// The latched state machine, or `Searching` while scanning for a
/// preamble.
#[derive(Clone, Copy, Debug)]
pub(crate) enum Active {
    Searching,
    Nmea(nmea::Machine),
    Rtcm(rtcm::Machine),
    Ublox(ublox::Machine),
    Sbf(sbf::Machine),
    Spartn(spartn::Machine),
    UnicoreBinary(unicore_binary::Machine),
    UnicoreHash(unicore_hash::Machine),
}

impl Active {
    /// Diagnostic name of the current state.
    pub(crate) fn state_name(&self) -> &'static str {
        match self {
            Active::Searching => "first_byte",
            Active::Nmea(m) => nmea::state_name(m),
            Active::Rtcm(m) => rtcm::state_name(m),
            Active::Ublox(m) => ublox::state_name(m),
            Active::Sbf(m) => sbf::state_name(m),
            Active::Spartn(m) => spartn::state_name(m),
            Active::UnicoreBinary(m) => unicore_binary::state_name(m),
            Active::UnicoreHash(m) => unicore_hash::state_name(m),
        }
    }
}

/// Drive the latched machine one byte forward. The byte has already been
/// appended to the parse buffer and folded into any stream-wide CRC.
pub(crate) fn advance(parse: &mut Parser, data: u8) {
    match parse.active {
        Active::Searching => parse.first_byte(data),
        Active::Nmea(m) => nmea::advance(parse, m, data),
        Active::Rtcm(m) => rtcm::advance(parse, m, data),
        Active::Ublox(m) => ublox::advance(parse, m, data),
        Active::Sbf(m) => sbf::advance(parse, m, data),
        Active::Spartn(m) => spartn::advance(parse, m, data),
        Active::UnicoreBinary(m) => unicore_binary::advance(parse, m, data),
        Active::UnicoreHash(m) => unicore_hash::advance(parse, m, data),
    }
}

/// Value of an ASCII hex digit, or `None`.
pub(crate) fn ascii_to_nibble(data: u8) -> Option<u8> {
    match data {
        b'0'..=b'9' => Some(data - b'0'),
        b'a'..=b'f' => Some(data - b'a' + 10),
        b'A'..=b'F' => Some(data - b'A' + 10),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nibble_conversion() {
        assert_eq!(ascii_to_nibble(b'0'), Some(0));
        assert_eq!(ascii_to_nibble(b'9'), Some(9));
        assert_eq!(ascii_to_nibble(b'a'), Some(10));
        assert_eq!(ascii_to_nibble(b'F'), Some(15));
        assert_eq!(ascii_to_nibble(b'g'), None);
        assert_eq!(ascii_to_nibble(b'*'), None);
    }

    #[test]
    fn payload_offsets() {
        assert_eq!(Protocol::Ublox.payload_offset(), 6);
        assert_eq!(Protocol::Nmea.payload_offset(), 0);
        assert_eq!(Protocol::Sbf.payload_offset(), 0);
    }
}
