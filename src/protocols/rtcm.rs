//! RTCM 10403 transport framing.
//!
//! ```text
//!    |<------------- 3 bytes ------------>|<----- length ----->|<- 3 bytes ->|
//!    |                                    |                    |             |
//!    +----------+--------+----------------+---------+----------+-------------+
//!    | Preamble |  Fill  | Message Length | Message |   Fill   |   CRC-24Q   |
//!    |  8 bits  | 6 bits |    10 bits     |  n-bits | 0-7 bits |   24 bits   |
//!    |   0xd3   | 000000 |   (in bytes)   |         |   zeros  |             |
//!    +----------+--------+----------------+---------+----------+-------------+
//!    |                                                         |
//!    |<------------------------ CRC -------------------------->|
//! ```
//!
//! The CRC runs from the preamble byte through the last payload byte.
//! Folding the trailing CRC bytes as well leaves a zero residue, which is
//! how frames are validated here.

use crate::checksum::crc24q_update;
use crate::frame::Details;
use crate::parser::Parser;
use crate::protocols::Active;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum State {
    ReadLength1,
    ReadLength2,
    ReadMessage1,
    ReadMessage2,
    ReadData,
    ReadCrc,
}

#[derive(Clone, Copy, Debug)]
pub(crate) struct Machine {
    pub(crate) state: State,
    /// Payload bytes still outstanding, then CRC bytes once in `ReadCrc`.
    pub(crate) bytes_remaining: u16,
    pub(crate) message: u16,
    /// CRC over preamble through payload, kept for diagnostics.
    pub(crate) crc: u32,
}

pub(crate) fn accept(parse: &mut Parser, data: u8) -> bool {
    if data != 0xd3 {
        return false;
    }
    parse.crc = crc24q_update(0, data);
    parse.active = Active::Rtcm(Machine {
        state: State::ReadLength1,
        bytes_remaining: 0,
        message: 0,
        crc: 0,
    });
    true
}

pub(crate) fn state_name(machine: &Machine) -> &'static str {
    match machine.state {
        State::ReadLength1 => "rtcm_read_length_1",
        State::ReadLength2 => "rtcm_read_length_2",
        State::ReadMessage1 => "rtcm_read_message_1",
        State::ReadMessage2 => "rtcm_read_message_2",
        State::ReadData => "rtcm_read_data",
        State::ReadCrc => "rtcm_read_crc",
    }
}

/// Note the payload CRC snapshot and switch to reading the 3 CRC bytes.
fn begin_crc(parse: &Parser, machine: &mut Machine) {
    machine.crc = parse.crc;
    machine.bytes_remaining = 3;
    machine.state = State::ReadCrc;
}

pub(crate) fn advance(parse: &mut Parser, mut machine: Machine, data: u8) {
    match machine.state {
        State::ReadLength1 => {
            // The six most-significant bits are reserved and must be zero.
            if data & !3 != 0 {
                parse.error_line(format_args!("RTCM invalid reserved bits in length"));
                parse.reject_rescan(data);
                return;
            }
            machine.bytes_remaining = u16::from(data) << 8;
            machine.state = State::ReadLength2;
            parse.active = Active::Rtcm(machine);
        }
        State::ReadLength2 => {
            machine.bytes_remaining |= u16::from(data);
            if machine.bytes_remaining == 0 {
                // Filler message: nothing but the CRC follows.
                begin_crc(parse, &mut machine);
            } else {
                machine.state = State::ReadMessage1;
            }
            parse.active = Active::Rtcm(machine);
        }
        State::ReadMessage1 => {
            machine.message = u16::from(data) << 4;
            machine.bytes_remaining -= 1;
            if machine.bytes_remaining == 0 {
                begin_crc(parse, &mut machine);
            } else {
                machine.state = State::ReadMessage2;
            }
            parse.active = Active::Rtcm(machine);
        }
        State::ReadMessage2 => {
            machine.message |= u16::from(data >> 4);
            machine.bytes_remaining -= 1;
            if machine.bytes_remaining == 0 {
                begin_crc(parse, &mut machine);
            } else {
                machine.state = State::ReadData;
            }
            parse.active = Active::Rtcm(machine);
        }
        State::ReadData => {
            machine.bytes_remaining -= 1;
            if machine.bytes_remaining == 0 {
                begin_crc(parse, &mut machine);
            }
            parse.active = Active::Rtcm(machine);
        }
        State::ReadCrc => {
            machine.bytes_remaining -= 1;
            if machine.bytes_remaining > 0 {
                parse.active = Active::Rtcm(machine);
                return;
            }
            let details = Details::Rtcm {
                message_number: machine.message,
            };
            if parse.crc & 0x00ff_ffff == 0 || parse.crc_rescue(details.clone()) {
                parse.emit(details);
                parse.reset_search();
            } else {
                let message = machine.message;
                let length = parse.length;
                let computed = machine.crc;
                let received = u32::from(parse.buffer[length - 3]) << 16
                    | u32::from(parse.buffer[length - 2]) << 8
                    | u32::from(parse.buffer[length - 1]);
                parse.debug_line(format_args!(
                    "RTCM {message}, {length} bytes, bad CRC, \
                     received {received:06x}, computed: {computed:06x}"
                ));
                parse.reject_rescan(data);
            }
        }
    }
}
