//! SPARTN frame framing.
//!
//! ```text
//!    +----------+-------------------+-----------------+---------+----------+-----------+
//!    | Preamble |   Frame header    | Extended header | Payload | Embedded | Frame CRC |
//!    |  8 bits  |      24 bits      |  32 - 64 bits   | n bytes |  m bytes | 1-4 bytes |
//!    |   0x73   | type|len|EAF|CRC4 |                 |         |          |           |
//!    +----------+-------------------+-----------------+---------+----------+-----------+
//!               |                                                          |
//!               |<-------------------------- CRC ------------------------->|
//! ```
//!
//! The 3-byte frame header packs the message type (7 bits), payload length
//! (10 bits), encryption-and-authentication flag, CRC type (2 bits) and a
//! CRC-4 over the header itself with its low nibble zeroed. A failed
//! header CRC abandons the frame outright; the body CRC (8, 16, 24 or 32
//! bits by CRC type) covers every byte after the preamble and may be
//! rescued through the bad-CRC callback.

use crate::checksum::{spartn_crc16, spartn_crc24, spartn_crc32, spartn_crc4, spartn_crc8};
use crate::frame::Details;
use crate::parser::Parser;
use crate::protocols::Active;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum State {
    FrameHeader,
    ExtendedHeaderStart,
    ExtendedHeader,
    Payload,
    EmbeddedApplication,
    FrameCrc,
}

#[derive(Clone, Copy, Debug)]
pub(crate) struct Machine {
    pub(crate) state: State,
    pub(crate) frame_count: u16,
    pub(crate) crc_bytes: u16,
    /// Extended header length in bytes, first byte included.
    pub(crate) extended_header_length: u16,
    pub(crate) message_type: u8,
    pub(crate) payload_length: u16,
    pub(crate) eaf: bool,
    pub(crate) crc_type: u8,
    pub(crate) header_crc: u8,
    pub(crate) message_subtype: u8,
    pub(crate) time_tag_type: u8,
    pub(crate) authentication_indicator: u8,
    pub(crate) embedded_length: u16,
}

pub(crate) fn accept(parse: &mut Parser, data: u8) -> bool {
    if data != 0x73 {
        return false;
    }
    parse.active = Active::Spartn(Machine {
        state: State::FrameHeader,
        frame_count: 0,
        crc_bytes: 0,
        extended_header_length: 0,
        message_type: 0,
        payload_length: 0,
        eaf: false,
        crc_type: 0,
        header_crc: 0,
        message_subtype: 0,
        time_tag_type: 0,
        authentication_indicator: 0,
        embedded_length: 0,
    });
    true
}

pub(crate) fn state_name(machine: &Machine) -> &'static str {
    match machine.state {
        State::FrameHeader => "spartn_frame_header",
        State::ExtendedHeaderStart => "spartn_extended_header_start",
        State::ExtendedHeader => "spartn_extended_header",
        State::Payload => "spartn_payload",
        State::EmbeddedApplication => "spartn_embedded_application",
        State::FrameCrc => "spartn_frame_crc",
    }
}

/// Pick the state that follows the extended header.
fn after_extended_header(machine: &mut Machine) {
    machine.frame_count = 0;
    machine.state = if machine.payload_length > 0 {
        State::Payload
    } else if machine.embedded_length > 0 {
        State::EmbeddedApplication
    } else {
        State::FrameCrc
    };
}

pub(crate) fn advance(parse: &mut Parser, mut machine: Machine, data: u8) {
    match machine.state {
        State::FrameHeader => {
            match machine.frame_count {
                0 => {
                    machine.message_type = data >> 1;
                    machine.payload_length = u16::from(data & 0x01);
                }
                1 => {
                    machine.payload_length = machine.payload_length << 8 | u16::from(data);
                }
                _ => {
                    machine.payload_length = machine.payload_length << 1 | u16::from(data >> 7);
                    machine.eaf = data & 0x40 != 0;
                    machine.crc_type = (data >> 4) & 0x03;
                    machine.crc_bytes = u16::from(machine.crc_type) + 1;
                    machine.header_crc = data & 0x0f;

                    // The header CRC covers the three header bytes with
                    // the CRC nibble itself zeroed.
                    let header = [parse.buffer[1], parse.buffer[2], parse.buffer[3] & 0xf0];
                    if spartn_crc4(&header) != machine.header_crc {
                        let message_type = machine.message_type;
                        let length = parse.length;
                        parse.debug_line(format_args!(
                            "SPARTN {message_type}, {length} bytes, bad header CRC"
                        ));
                        parse.reject_consume();
                        return;
                    }
                    machine.state = State::ExtendedHeaderStart;
                }
            }
            machine.frame_count += 1;
            parse.active = Active::Spartn(machine);
        }
        State::ExtendedHeaderStart => {
            machine.message_subtype = data >> 4;
            machine.time_tag_type = (data >> 3) & 0x01;
            machine.extended_header_length = if machine.time_tag_type == 0 { 4 } else { 6 };
            if machine.eaf {
                machine.extended_header_length += 2;
            }
            machine.frame_count = 1;
            machine.state = State::ExtendedHeader;
            parse.active = Active::Spartn(machine);
        }
        State::ExtendedHeader => {
            machine.frame_count += 1;
            if machine.frame_count == machine.extended_header_length {
                if machine.eaf {
                    machine.authentication_indicator = (data >> 3) & 0x07;
                    machine.embedded_length = if machine.authentication_indicator <= 1 {
                        0
                    } else {
                        match data & 0x07 {
                            0 => 8,
                            1 => 12,
                            2 => 16,
                            3 => 32,
                            _ => 64,
                        }
                    };
                } else {
                    machine.authentication_indicator = 0;
                    machine.embedded_length = 0;
                }
                after_extended_header(&mut machine);
            }
            parse.active = Active::Spartn(machine);
        }
        State::Payload => {
            machine.frame_count += 1;
            if machine.frame_count == machine.payload_length {
                machine.frame_count = 0;
                machine.state = if machine.embedded_length > 0 {
                    State::EmbeddedApplication
                } else {
                    State::FrameCrc
                };
            }
            parse.active = Active::Spartn(machine);
        }
        State::EmbeddedApplication => {
            machine.frame_count += 1;
            if machine.frame_count == machine.embedded_length {
                machine.frame_count = 0;
                machine.state = State::FrameCrc;
            }
            parse.active = Active::Spartn(machine);
        }
        State::FrameCrc => {
            machine.frame_count += 1;
            if machine.frame_count < machine.crc_bytes {
                parse.active = Active::Spartn(machine);
                return;
            }

            let covered = 4
                + usize::from(machine.extended_header_length)
                + usize::from(machine.payload_length)
                + usize::from(machine.embedded_length);
            let mut expected = 0u32;
            for &byte in &parse.buffer[covered..parse.length] {
                expected = expected << 8 | u32::from(byte);
            }
            // The preamble byte is excluded from the CRC.
            let crc_data = &parse.buffer[1..covered];
            let computed = match machine.crc_type {
                0 => u32::from(spartn_crc8(crc_data)),
                1 => u32::from(spartn_crc16(crc_data)),
                2 => spartn_crc24(crc_data),
                _ => spartn_crc32(crc_data),
            };

            let details = Details::Spartn {
                message_type: machine.message_type,
                message_subtype: machine.message_subtype,
            };
            if computed == expected || parse.crc_rescue(details.clone()) {
                parse.emit(details);
                parse.reset_search();
            } else {
                let message_type = machine.message_type;
                let message_subtype = machine.message_subtype;
                let length = parse.length;
                parse.debug_line(format_args!(
                    "SPARTN {message_type} {message_subtype}, {length} bytes, bad CRC"
                ));
                parse.reject_rescan(data);
            }
        }
    }
}
