//! NMEA 0183 sentence framing.
//!
//! ```text
//!    +----------+---------+--------+---------+----------+----------+
//!    | Preamble |  Name   | Comma  |  Data   | Asterisk | Checksum |
//!    |  8 bits  | n bytes | 8 bits | n bytes |  8 bits  | 2 bytes  |
//!    |     $    |         |    ,   |         |          |          |
//!    +----------+---------+--------+---------+----------+----------+
//!               |                            |
//!               |<-------- Checksum -------->|
//! ```
//!
//! The checksum is the XOR of every byte between `$` and `*`, exclusive.
//! A validated sentence is delivered with `CR LF NUL` appended; the NUL is
//! not counted in the frame length. Any real line terminator following the
//! checksum (at most one CR and one LF, in either order) is consumed
//! silently.

use crate::frame::{Details, SentenceName};
use crate::parser::Parser;
use crate::protocols::{ascii_to_nibble, Active};

// Room for the asterisk, checksum pair, CR, LF and NUL.
const BUFFER_OVERHEAD: usize = 6;
// Room for the appended CR, LF and NUL.
const TRAILER_OVERHEAD: usize = 3;

/// Length of the sentence name storage; names cap one byte short.
pub(crate) const SENTENCE_NAME_BYTES: usize = 16;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum State {
    FindFirstComma,
    FindAsterisk,
    ChecksumHigh,
    ChecksumLow,
    LineTermination,
    ExpectLineFeed,
    ExpectCarriageReturn,
}

#[derive(Clone, Copy, Debug)]
pub(crate) struct Machine {
    pub(crate) state: State,
    pub(crate) sentence_name: [u8; SENTENCE_NAME_BYTES],
    pub(crate) sentence_name_length: u8,
}

pub(crate) fn accept(parse: &mut Parser, data: u8) -> bool {
    if data != b'$' {
        return false;
    }
    parse.active = Active::Nmea(Machine {
        state: State::FindFirstComma,
        sentence_name: [0; SENTENCE_NAME_BYTES],
        sentence_name_length: 0,
    });
    true
}

pub(crate) fn state_name(machine: &Machine) -> &'static str {
    match machine.state {
        State::FindFirstComma => "nmea_find_first_comma",
        State::FindAsterisk => "nmea_find_asterisk",
        State::ChecksumHigh => "nmea_checksum_high",
        State::ChecksumLow => "nmea_checksum_low",
        State::LineTermination => "nmea_line_termination",
        State::ExpectLineFeed => "nmea_expect_line_feed",
        State::ExpectCarriageReturn => "nmea_expect_carriage_return",
    }
}

pub(crate) fn advance(parse: &mut Parser, mut machine: Machine, data: u8) {
    match machine.state {
        State::FindFirstComma => {
            parse.crc ^= u32::from(data);
            if data == b',' && machine.sentence_name_length > 0 {
                machine.state = State::FindAsterisk;
            } else {
                if !data.is_ascii_alphanumeric() {
                    parse.error_line(format_args!("NMEA invalid sentence name character"));
                    parse.reject_rescan(data);
                    return;
                }
                if usize::from(machine.sentence_name_length) == SENTENCE_NAME_BYTES - 1 {
                    parse.error_line(format_args!(
                        "NMEA sentence name > {} characters",
                        SENTENCE_NAME_BYTES - 1
                    ));
                    parse.reject_rescan(data);
                    return;
                }
                machine.sentence_name[usize::from(machine.sentence_name_length)] = data;
                machine.sentence_name_length += 1;
            }
            parse.active = Active::Nmea(machine);
        }
        State::FindAsterisk => {
            if data == b'*' {
                machine.state = State::ChecksumHigh;
            } else {
                if parse.abort_on_non_printable && !(0x20..=0x7e).contains(&data) {
                    parse.error_line(format_args!("NMEA non-printable sentence character"));
                    parse.reject_rescan(data);
                    return;
                }
                parse.crc ^= u32::from(data);
                if parse.length + BUFFER_OVERHEAD > parse.buffer.len() {
                    let buffer_length = parse.buffer.len();
                    parse.error_line(format_args!(
                        "NMEA sentence too long, increase the buffer size > {buffer_length}"
                    ));
                    parse.reject_rescan(data);
                    return;
                }
            }
            parse.active = Active::Nmea(machine);
        }
        State::ChecksumHigh => {
            if ascii_to_nibble(data).is_none() {
                parse.error_line(format_args!("NMEA invalid first checksum character"));
                parse.reject_rescan(data);
                return;
            }
            machine.state = State::ChecksumLow;
            parse.active = Active::Nmea(machine);
        }
        State::ChecksumLow => {
            let Some(low) = ascii_to_nibble(data) else {
                parse.error_line(format_args!("NMEA invalid second checksum character"));
                parse.reject_rescan(data);
                return;
            };
            // The high nibble was validated one state earlier.
            let high = ascii_to_nibble(parse.buffer[parse.length - 2]).unwrap_or(0);
            let received = u32::from(high << 4 | low);
            let details = Details::Nmea {
                sentence_name: SentenceName::new(
                    machine.sentence_name,
                    machine.sentence_name_length,
                ),
            };
            if received == parse.crc || parse.crc_rescue(details.clone()) {
                deliver(parse, machine, details);
            } else {
                let computed = parse.crc;
                let length = parse.length;
                let name = SentenceName::new(machine.sentence_name, machine.sentence_name_length);
                parse.debug_line(format_args!(
                    "NMEA {name}, {length} bytes, bad checksum, \
                     expecting 0x{received:02x}, computed: 0x{computed:02x}"
                ));
                parse.reject_rescan(data);
            }
        }
        State::LineTermination => match data {
            b'\r' => {
                machine.state = State::ExpectLineFeed;
                parse.length = 0;
                parse.active = Active::Nmea(machine);
            }
            b'\n' => {
                machine.state = State::ExpectCarriageReturn;
                parse.length = 0;
                parse.active = Active::Nmea(machine);
            }
            _ => parse.first_byte(data),
        },
        State::ExpectLineFeed => {
            if data == b'\n' {
                parse.reset_search();
            } else {
                parse.first_byte(data);
            }
        }
        State::ExpectCarriageReturn => {
            if data == b'\r' {
                parse.reset_search();
            } else {
                parse.first_byte(data);
            }
        }
    }
}

/// Append the `CR LF NUL` trailer and hand the sentence upstream, then
/// wait for any real line terminator.
fn deliver(parse: &mut Parser, mut machine: Machine, details: Details) {
    if parse.length + TRAILER_OVERHEAD > parse.buffer.len() {
        let buffer_length = parse.buffer.len();
        parse.error_line(format_args!(
            "NMEA sentence too long, increase the buffer size >= {buffer_length}"
        ));
        parse.reject_consume();
        return;
    }
    parse.buffer[parse.length] = b'\r';
    parse.buffer[parse.length + 1] = b'\n';
    parse.buffer[parse.length + 2] = 0;
    parse.length += 2;
    parse.emit(details);
    parse.length = 0;
    machine.state = State::LineTermination;
    parse.active = Active::Nmea(machine);
}

#[cfg(test)]
mod tests {
    use crate::{Details, ParserBuilder, Protocol};
    use std::sync::mpsc;

    fn nmea_parser() -> (
        crate::Parser,
        mpsc::Receiver<(Vec<u8>, Details)>,
        mpsc::Receiver<Vec<u8>>,
    ) {
        let (tx, rx) = mpsc::channel();
        let (bad_tx, bad_rx) = mpsc::channel();
        let mut parser = ParserBuilder::new("test")
            .with_protocol(Protocol::Nmea)
            .buffer_length(128)
            .begin(move |frame| {
                tx.send((frame.bytes().to_vec(), frame.details().clone()))
                    .unwrap();
            })
            .unwrap();
        parser.set_invalid_data_callback(move |bytes| bad_tx.send(bytes.to_vec()).unwrap());
        (parser, rx, bad_rx)
    }

    #[test]
    fn good_sentence_is_delivered_with_trailer() {
        let (mut parser, rx, _bad) = nmea_parser();
        parser.parse_next_bytes(b"$GPGGA,123519,4807.038,N*27\r\n");

        let (bytes, details) = rx.try_recv().unwrap();
        assert_eq!(bytes, b"$GPGGA,123519,4807.038,N*27\r\n");
        match details {
            Details::Nmea { sentence_name } => assert_eq!(sentence_name, "GPGGA"),
            other => panic!("wrong details: {other:?}"),
        }
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn sentence_without_line_terminator_is_delivered() {
        let (mut parser, rx, _bad) = nmea_parser();
        // Two sentences back to back, no CR or LF between them.
        parser.parse_next_bytes(b"$GPGGA,1*4B$GPGGA,1*4B\r\n");
        assert!(rx.try_recv().is_ok());
        assert!(rx.try_recv().is_ok());
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn lf_cr_line_terminator_is_consumed() {
        let (mut parser, rx, bad) = nmea_parser();
        parser.parse_next_bytes(b"$GPGGA,1*4B\n\r$GPGGA,1*4B");
        assert!(rx.try_recv().is_ok());
        assert!(rx.try_recv().is_ok());
        assert!(bad.try_recv().is_err());
    }

    #[test]
    fn bad_checksum_drops_sentence() {
        let (mut parser, rx, bad) = nmea_parser();
        let input = b"$GPGGA,1*00\r\n";
        parser.parse_next_bytes(input);

        assert!(rx.try_recv().is_err());
        let mut rejected = Vec::new();
        while let Ok(chunk) = bad.try_recv() {
            rejected.extend_from_slice(&chunk);
        }
        assert_eq!(rejected, input.to_vec());
    }

    #[test]
    fn bad_checksum_can_be_rescued() {
        let (tx, rx) = mpsc::channel();
        let mut parser = ParserBuilder::new("test")
            .with_protocol(Protocol::Nmea)
            .buffer_length(128)
            .on_bad_crc(|_| true)
            .begin(move |frame| tx.send(frame.bytes().to_vec()).unwrap())
            .unwrap();
        parser.parse_next_bytes(b"$GPGGA,1*00\r\n");
        assert_eq!(rx.try_recv().unwrap(), b"$GPGGA,1*00\r\n".to_vec());
    }

    #[test]
    fn lowercase_checksum_digits_are_accepted() {
        let (mut parser, rx, _bad) = nmea_parser();
        parser.parse_next_bytes(b"$GPGGA,1*4b\r\n");
        assert!(rx.try_recv().is_ok());
    }

    #[test]
    fn digits_are_legal_name_characters() {
        let (mut parser, rx, _bad) = nmea_parser();
        // XOR of "P1ABC,x" is 0x75.
        parser.parse_next_bytes(b"$P1ABC,x*75\r\n");
        let (_, details) = rx.try_recv().unwrap();
        match details {
            Details::Nmea { sentence_name } => assert_eq!(sentence_name, "P1ABC"),
            other => panic!("wrong details: {other:?}"),
        }
    }

    #[test]
    fn invalid_name_character_rejects_sentence() {
        let (mut parser, rx, bad) = nmea_parser();
        parser.parse_next_bytes(b"$GP-GA,1*00\r\n");
        assert!(rx.try_recv().is_err());
        // The rejected prefix reaches the invalid-data callback.
        assert_eq!(bad.try_recv().unwrap(), b"$GP".to_vec());
    }

    #[test]
    fn overlong_name_rejects_sentence() {
        let (mut parser, rx, _bad) = nmea_parser();
        parser.parse_next_bytes(b"$ABCDEFGHIJKLMNOP,1*00\r\n");
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn non_printable_body_aborts_when_enabled() {
        let (tx, rx) = mpsc::channel();
        let mut parser = ParserBuilder::new("test")
            .with_protocol(Protocol::Nmea)
            .buffer_length(128)
            .abort_on_non_printable(true)
            .begin(move |frame| tx.send(frame.bytes().to_vec()).unwrap())
            .unwrap();
        parser.parse_next_bytes(b"$GPGGA,\x01abc*00\r\n");
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn dollar_inside_dropped_sentence_restarts_a_frame() {
        let (mut parser, rx, _bad) = nmea_parser();
        // The '-' kills the first attempt; the rescan of '$' starts over.
        parser.parse_next_bytes(b"$GP-$GPGGA,1*4B\r\n");
        let (bytes, _) = rx.try_recv().unwrap();
        assert_eq!(bytes, b"$GPGGA,1*4B\r\n");
    }
}
