//! Unicore binary response framing.
//!
//! ```text
//!    |<----- 24 byte header ------>|<--- length --->|<- 4 bytes ->|
//!    |                             |                |             |
//!    +------------+----------------+----------------+-------------+
//!    |  Preamble  |     Header     |      Data      |    CRC      |
//!    |  3 bytes   |    21 bytes    |    n bytes     |   32 bits   |
//!    | 0xAA 44 B5 |                |                |             |
//!    +------------+----------------+----------------+-------------+
//!    |                                              |
//!    |<------------------- CRC -------------------->|
//! ```
//!
//! The CRC is the reversed-polynomial CRC-32 over everything before it.
//! Folding the little-endian CRC bytes as well leaves a zero residue,
//! which is how frames are validated here. Only the header's message
//! length drives the parse; see
//! [`UnicoreHeader`](crate::UnicoreHeader) for the full layout.

use crate::checksum::crc32_reversed_update;
use crate::frame::{Details, UnicoreHeader};
use crate::parser::Parser;
use crate::protocols::Active;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum State {
    Sync2,
    Sync3,
    ReadHeader,
    ReadData,
    ReadCrc,
}

#[derive(Clone, Copy, Debug)]
pub(crate) struct Machine {
    pub(crate) state: State,
    pub(crate) bytes_remaining: u16,
    /// CRC over preamble through data, kept for diagnostics.
    pub(crate) crc: u32,
}

pub(crate) fn accept(parse: &mut Parser, data: u8) -> bool {
    if data != 0xaa {
        return false;
    }
    parse.crc = crc32_reversed_update(0, data);
    parse.active = Active::UnicoreBinary(Machine {
        state: State::Sync2,
        bytes_remaining: 0,
        crc: 0,
    });
    true
}

pub(crate) fn state_name(machine: &Machine) -> &'static str {
    match machine.state {
        State::Sync2 => "unicore_binary_sync_2",
        State::Sync3 => "unicore_binary_sync_3",
        State::ReadHeader => "unicore_binary_read_header",
        State::ReadData => "unicore_binary_read_data",
        State::ReadCrc => "unicore_binary_read_crc",
    }
}

fn begin_crc(parse: &Parser, machine: &mut Machine) {
    machine.crc = parse.crc;
    machine.bytes_remaining = 4;
    machine.state = State::ReadCrc;
}

pub(crate) fn advance(parse: &mut Parser, mut machine: Machine, data: u8) {
    match machine.state {
        State::Sync2 => {
            if data != 0x44 {
                parse.debug_line(format_args!("Unicore binary invalid second sync byte"));
                parse.reject_rescan(data);
                return;
            }
            machine.state = State::Sync3;
            parse.active = Active::UnicoreBinary(machine);
        }
        State::Sync3 => {
            if data != 0xb5 {
                parse.debug_line(format_args!("Unicore binary invalid third sync byte"));
                parse.reject_rescan(data);
                return;
            }
            machine.state = State::ReadHeader;
            parse.active = Active::UnicoreBinary(machine);
        }
        State::ReadHeader => {
            if parse.length >= UnicoreHeader::LEN {
                let message_length =
                    u16::from_le_bytes([parse.buffer[6], parse.buffer[7]]);
                machine.bytes_remaining = message_length;
                if message_length == 0 {
                    begin_crc(parse, &mut machine);
                } else {
                    machine.state = State::ReadData;
                }
            }
            parse.active = Active::UnicoreBinary(machine);
        }
        State::ReadData => {
            machine.bytes_remaining -= 1;
            if machine.bytes_remaining == 0 {
                begin_crc(parse, &mut machine);
            }
            parse.active = Active::UnicoreBinary(machine);
        }
        State::ReadCrc => {
            machine.bytes_remaining -= 1;
            if machine.bytes_remaining > 0 {
                parse.active = Active::UnicoreBinary(machine);
                return;
            }
            let details = Details::UnicoreBinary {
                message_id: u16::from_le_bytes([parse.buffer[4], parse.buffer[5]]),
                message_length: u16::from_le_bytes([parse.buffer[6], parse.buffer[7]]),
            };
            if parse.crc == 0 || parse.crc_rescue(details.clone()) {
                parse.emit(details);
                parse.reset_search();
            } else {
                let length = parse.length;
                let computed = machine.crc;
                let received = u32::from_le_bytes([
                    parse.buffer[length - 4],
                    parse.buffer[length - 3],
                    parse.buffer[length - 2],
                    parse.buffer[length - 1],
                ]);
                parse.debug_line(format_args!(
                    "Unicore binary bad CRC, received {received:08x}, computed: {computed:08x}"
                ));
                parse.reject_rescan(data);
            }
        }
    }
}
