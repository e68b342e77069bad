//! u-blox UBX packet framing.
//!
//! ```text
//!    |<-- Preamble --->|
//!    |                 |
//!    +--------+--------+---------+--------+---------+---------+--------+--------+
//!    |  SYNC  |  SYNC  |  Class  |   ID   | Length  | Payload |  CK_A  |  CK_B  |
//!    | 8 bits | 8 bits |  8 bits | 8 bits | 2 bytes | n bytes | 8 bits | 8 bits |
//!    |  0xb5  |  0x62  |         |        |         |         |        |        |
//!    +--------+--------+---------+--------+---------+---------+--------+--------+
//!                      |                                      |
//!                      |<------------- Checksum ------------->|
//! ```
//!
//! The checksum is the 8-bit Fletcher algorithm from RFC 1145 over class,
//! id, length and payload.

use crate::checksum::fletcher8_update;
use crate::frame::Details;
use crate::parser::Parser;
use crate::protocols::Active;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum State {
    Sync2,
    Class,
    Id,
    Length1,
    Length2,
    Payload,
    CkA,
    CkB,
}

#[derive(Clone, Copy, Debug)]
pub(crate) struct Machine {
    pub(crate) state: State,
    pub(crate) bytes_remaining: u16,
    /// Class in the upper 8 bits, id in the lower 8 bits.
    pub(crate) message: u16,
    pub(crate) ck_a: u8,
    pub(crate) ck_b: u8,
}

pub(crate) fn accept(parse: &mut Parser, data: u8) -> bool {
    if data != 0xb5 {
        return false;
    }
    parse.active = Active::Ublox(Machine {
        state: State::Sync2,
        bytes_remaining: 0,
        message: 0,
        ck_a: 0,
        ck_b: 0,
    });
    true
}

pub(crate) fn state_name(machine: &Machine) -> &'static str {
    match machine.state {
        State::Sync2 => "ublox_sync_2",
        State::Class => "ublox_class",
        State::Id => "ublox_id",
        State::Length1 => "ublox_length_1",
        State::Length2 => "ublox_length_2",
        State::Payload => "ublox_payload",
        State::CkA => "ublox_ck_a",
        State::CkB => "ublox_ck_b",
    }
}

fn fold(machine: &mut Machine, data: u8) {
    let ck = fletcher8_update((machine.ck_a, machine.ck_b), data);
    machine.ck_a = ck.0;
    machine.ck_b = ck.1;
}

pub(crate) fn advance(parse: &mut Parser, mut machine: Machine, data: u8) {
    match machine.state {
        State::Sync2 => {
            if data != 0x62 {
                parse.debug_line(format_args!("UBX invalid second sync byte"));
                parse.reject_rescan(data);
                return;
            }
            machine.state = State::Class;
            parse.active = Active::Ublox(machine);
        }
        State::Class => {
            fold(&mut machine, data);
            machine.message = u16::from(data) << 8;
            machine.state = State::Id;
            parse.active = Active::Ublox(machine);
        }
        State::Id => {
            fold(&mut machine, data);
            machine.message |= u16::from(data);
            machine.state = State::Length1;
            parse.active = Active::Ublox(machine);
        }
        State::Length1 => {
            fold(&mut machine, data);
            machine.bytes_remaining = u16::from(data);
            machine.state = State::Length2;
            parse.active = Active::Ublox(machine);
        }
        State::Length2 => {
            fold(&mut machine, data);
            machine.bytes_remaining |= u16::from(data) << 8;
            // Zero-length messages, e.g. UBX-UPD, go straight to the
            // checksum.
            machine.state = if machine.bytes_remaining == 0 {
                State::CkA
            } else {
                State::Payload
            };
            parse.active = Active::Ublox(machine);
        }
        State::Payload => {
            fold(&mut machine, data);
            machine.bytes_remaining -= 1;
            if machine.bytes_remaining == 0 {
                machine.state = State::CkA;
            }
            parse.active = Active::Ublox(machine);
        }
        State::CkA => {
            machine.state = State::CkB;
            parse.active = Active::Ublox(machine);
        }
        State::CkB => {
            let received_a = parse.buffer[parse.length - 2];
            let received_b = parse.buffer[parse.length - 1];
            let good = received_a == machine.ck_a && received_b == machine.ck_b;
            let details = Details::Ublox {
                message: machine.message,
            };
            if good || parse.crc_rescue(details.clone()) {
                parse.emit(details);
                parse.reset_search();
            } else {
                let (ck_a, ck_b) = (machine.ck_a, machine.ck_b);
                parse.debug_line(format_args!(
                    "UBX bad checksum received 0x{received_a:02x}{received_b:02x} \
                     computed 0x{ck_a:02x}{ck_b:02x}"
                ));
                parse.reject_rescan(data);
            }
        }
    }
}
