//! Septentrio SBF block framing.
//!
//! ```text
//!    +--------+--------+----------+----------------+----------+---------+
//!    |  SYNC  |  SYNC  |   CRC    |       ID       |  Length  |  Body   |
//!    | 8 bits | 8 bits | 2 bytes  | 13 bits|3 bits | 2 bytes  | n bytes |
//!    |   $    |   @    |   (LE)   |   id   |  rev  |   (LE)   |         |
//!    +--------+--------+----------+----------------+----------+---------+
//!                                 |                                     |
//!                                 |<--------------- CRC --------------->|
//! ```
//!
//! The CRC is CRC-16-CCITT over the ID, length and body. The length field
//! counts the whole block including the 8 header bytes and must be a
//! multiple of 4.
//!
//! Block 4097 encapsulates third-party payloads (NMEA or RTCMv3); see the
//! encapsulation accessors on [`Frame`](crate::Frame).

use crate::checksum::ccitt16_update;
use crate::frame::Details;
use crate::parser::Parser;
use crate::protocols::Active;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum State {
    Preamble2,
    Crc1,
    Crc2,
    Id1,
    Id2,
    LengthLsb,
    LengthMsb,
    ReadBytes,
}

#[derive(Clone, Copy, Debug)]
pub(crate) struct Machine {
    pub(crate) state: State,
    pub(crate) expected_crc: u16,
    pub(crate) computed_crc: u16,
    pub(crate) block_id: u16,
    pub(crate) block_revision: u8,
    pub(crate) length: u16,
    pub(crate) bytes_remaining: u16,
}

pub(crate) fn accept(parse: &mut Parser, data: u8) -> bool {
    if data != b'$' {
        return false;
    }
    parse.active = Active::Sbf(Machine {
        state: State::Preamble2,
        expected_crc: 0,
        computed_crc: 0,
        block_id: 0,
        block_revision: 0,
        length: 0,
        bytes_remaining: 0,
    });
    true
}

pub(crate) fn state_name(machine: &Machine) -> &'static str {
    match machine.state {
        State::Preamble2 => "sbf_preamble_2",
        State::Crc1 => "sbf_crc_1",
        State::Crc2 => "sbf_crc_2",
        State::Id1 => "sbf_id_1",
        State::Id2 => "sbf_id_2",
        State::LengthLsb => "sbf_length_lsb",
        State::LengthMsb => "sbf_length_msb",
        State::ReadBytes => "sbf_read_bytes",
    }
}

fn validate(parse: &mut Parser, machine: Machine, data: u8) {
    let details = Details::Sbf {
        block_id: machine.block_id,
        block_revision: machine.block_revision,
    };
    if machine.computed_crc == machine.expected_crc || parse.crc_rescue(details.clone()) {
        parse.emit(details);
        parse.reset_search();
    } else {
        let block_id = machine.block_id;
        let length = parse.length;
        parse.debug_line(format_args!("SBF {block_id}, {length} bytes, bad CRC"));
        parse.reject_rescan(data);
    }
}

pub(crate) fn advance(parse: &mut Parser, mut machine: Machine, data: u8) {
    match machine.state {
        State::Preamble2 => {
            if data != b'@' {
                parse.debug_line(format_args!("SBF invalid second preamble byte"));
                parse.reject_rescan(data);
                return;
            }
            machine.state = State::Crc1;
            parse.active = Active::Sbf(machine);
        }
        State::Crc1 => {
            machine.expected_crc = u16::from(data);
            machine.state = State::Crc2;
            parse.active = Active::Sbf(machine);
        }
        State::Crc2 => {
            machine.expected_crc |= u16::from(data) << 8;
            machine.computed_crc = 0;
            machine.state = State::Id1;
            parse.active = Active::Sbf(machine);
        }
        State::Id1 => {
            machine.computed_crc = ccitt16_update(machine.computed_crc, data);
            machine.block_id = u16::from(data);
            machine.state = State::Id2;
            parse.active = Active::Sbf(machine);
        }
        State::Id2 => {
            machine.computed_crc = ccitt16_update(machine.computed_crc, data);
            machine.block_id |= u16::from(data) << 8;
            machine.block_id &= 0x1fff;
            machine.block_revision = data >> 5;
            machine.state = State::LengthLsb;
            parse.active = Active::Sbf(machine);
        }
        State::LengthLsb => {
            machine.computed_crc = ccitt16_update(machine.computed_crc, data);
            machine.length = u16::from(data);
            machine.state = State::LengthMsb;
            parse.active = Active::Sbf(machine);
        }
        State::LengthMsb => {
            machine.computed_crc = ccitt16_update(machine.computed_crc, data);
            machine.length |= u16::from(data) << 8;
            if machine.length % 4 != 0 || machine.length < 8 {
                let length = machine.length;
                parse.error_line(format_args!("SBF invalid block length {length}"));
                parse.reject_rescan(data);
                return;
            }
            if machine.length == 8 {
                // Header-only block; nothing left to read.
                validate(parse, machine, data);
                return;
            }
            machine.bytes_remaining = machine.length - 8;
            machine.state = State::ReadBytes;
            parse.active = Active::Sbf(machine);
        }
        State::ReadBytes => {
            machine.computed_crc = ccitt16_update(machine.computed_crc, data);
            machine.bytes_remaining -= 1;
            if machine.bytes_remaining == 0 {
                validate(parse, machine, data);
            } else {
                parse.active = Active::Sbf(machine);
            }
        }
    }
}
