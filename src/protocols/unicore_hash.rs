//! Unicore `#`-prefixed sentence framing.
//!
//! ```text
//!    +----------+---------+--------+---------+----------+----------+
//!    | Preamble |  Name   | Comma  |  Data   | Asterisk | Checksum |
//!    |  8 bits  | n bytes | 8 bits | n bytes |  8 bits  | 2|8 hex  |
//!    |     #    |         |    ,   |         |          |          |
//!    +----------+---------+--------+---------+----------+----------+
//!               |                            |
//!               |<-------- Checksum -------->|
//! ```
//!
//! The sentence name picks the checksum flavour: names containing `MODE`
//! carry a 2-digit XOR checksum like NMEA; every other sentence carries an
//! 8-digit reversed CRC-32 over the bytes between `#` and `*`, exclusive.
//! Delivery appends `CR LF NUL` exactly like NMEA.

use crate::checksum::crc32_reversed;
use crate::frame::{Details, SentenceName};
use crate::parser::Parser;
use crate::protocols::{ascii_to_nibble, Active};

// Room for the appended CR, LF and NUL.
const TRAILER_OVERHEAD: usize = 3;

pub(crate) const SENTENCE_NAME_BYTES: usize = 16;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum State {
    FindFirstComma,
    FindAsterisk,
    ChecksumByte,
    LineTermination,
    ExpectLineFeed,
    ExpectCarriageReturn,
}

#[derive(Clone, Copy, Debug)]
pub(crate) struct Machine {
    pub(crate) state: State,
    pub(crate) bytes_remaining: u8,
    pub(crate) checksum_bytes: u8,
    pub(crate) sentence_name: [u8; SENTENCE_NAME_BYTES],
    pub(crate) sentence_name_length: u8,
}

pub(crate) fn accept(parse: &mut Parser, data: u8) -> bool {
    if data != b'#' {
        return false;
    }
    parse.active = Active::UnicoreHash(Machine {
        state: State::FindFirstComma,
        bytes_remaining: 0,
        checksum_bytes: 0,
        sentence_name: [0; SENTENCE_NAME_BYTES],
        sentence_name_length: 0,
    });
    true
}

pub(crate) fn state_name(machine: &Machine) -> &'static str {
    match machine.state {
        State::FindFirstComma => "unicore_hash_find_first_comma",
        State::FindAsterisk => "unicore_hash_find_asterisk",
        State::ChecksumByte => "unicore_hash_checksum_byte",
        State::LineTermination => "unicore_hash_line_termination",
        State::ExpectLineFeed => "unicore_hash_expect_line_feed",
        State::ExpectCarriageReturn => "unicore_hash_expect_carriage_return",
    }
}

/// Sentences whose name contains `MODE` use the short XOR checksum.
fn uses_xor_checksum(name: &[u8]) -> bool {
    name.windows(4).any(|w| w.eq_ignore_ascii_case(b"MODE"))
}

pub(crate) fn advance(parse: &mut Parser, mut machine: Machine, data: u8) {
    match machine.state {
        State::FindFirstComma => {
            parse.crc ^= u32::from(data);
            if data == b',' && machine.sentence_name_length > 0 {
                let name = &machine.sentence_name[..usize::from(machine.sentence_name_length)];
                machine.checksum_bytes = if uses_xor_checksum(name) { 2 } else { 8 };
                machine.state = State::FindAsterisk;
            } else {
                if !data.is_ascii_alphanumeric() {
                    parse.error_line(format_args!(
                        "Unicore hash invalid sentence name character 0x{data:02x}"
                    ));
                    parse.reject_rescan(data);
                    return;
                }
                if usize::from(machine.sentence_name_length) == SENTENCE_NAME_BYTES - 1 {
                    parse.error_line(format_args!(
                        "Unicore hash sentence name > {} characters",
                        SENTENCE_NAME_BYTES - 1
                    ));
                    parse.reject_rescan(data);
                    return;
                }
                machine.sentence_name[usize::from(machine.sentence_name_length)] = data;
                machine.sentence_name_length += 1;
            }
            parse.active = Active::UnicoreHash(machine);
        }
        State::FindAsterisk => {
            if data == b'*' {
                machine.bytes_remaining = machine.checksum_bytes;
                machine.state = State::ChecksumByte;
            } else {
                if parse.abort_on_non_printable && !(0x20..=0x7e).contains(&data) {
                    parse.error_line(format_args!(
                        "Unicore hash non-printable sentence character"
                    ));
                    parse.reject_rescan(data);
                    return;
                }
                parse.crc ^= u32::from(data);
                if parse.length + TRAILER_OVERHEAD > parse.buffer.len() {
                    let buffer_length = parse.buffer.len();
                    parse.error_line(format_args!(
                        "Unicore hash sentence too long, increase the buffer size > {buffer_length}"
                    ));
                    parse.reject_rescan(data);
                    return;
                }
            }
            parse.active = Active::UnicoreHash(machine);
        }
        State::ChecksumByte => {
            if ascii_to_nibble(data).is_none() {
                let position = machine.checksum_bytes - machine.bytes_remaining + 1;
                parse.error_line(format_args!(
                    "Unicore hash invalid checksum character {position}"
                ));
                parse.reject_rescan(data);
                return;
            }
            machine.bytes_remaining -= 1;
            if machine.bytes_remaining == 0 {
                validate(parse, machine, data);
            } else {
                parse.active = Active::UnicoreHash(machine);
            }
        }
        State::LineTermination => match data {
            b'\r' => {
                machine.state = State::ExpectLineFeed;
                parse.length = 0;
                parse.active = Active::UnicoreHash(machine);
            }
            b'\n' => {
                machine.state = State::ExpectCarriageReturn;
                parse.length = 0;
                parse.active = Active::UnicoreHash(machine);
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

/// Compare the received checksum against the running XOR or a CRC-32 of
/// the sentence body, then deliver or reject.
fn validate(parse: &mut Parser, machine: Machine, data: u8) {
    let digits = usize::from(machine.checksum_bytes);
    let mut received = 0u32;
    for &byte in &parse.buffer[parse.length - digits..parse.length] {
        // Digits were validated as they arrived.
        received = received << 4 | u32::from(ascii_to_nibble(byte).unwrap_or(0));
    }

    let good = if machine.checksum_bytes == 2 {
        received == parse.crc
    } else {
        // The CRC runs between '#' and '*', both exclusive.
        let body_end = parse.length - digits - 1;
        received == crc32_reversed(&parse.buffer[1..body_end])
    };

    let details = Details::UnicoreHash {
        sentence_name: SentenceName::new(machine.sentence_name, machine.sentence_name_length),
    };
    if good || parse.crc_rescue(details.clone()) {
        deliver(parse, machine, details);
    } else {
        let name = SentenceName::new(machine.sentence_name, machine.sentence_name_length);
        let length = parse.length;
        let width = digits;
        parse.debug_line(format_args!(
            "Unicore hash {name}, {length} bytes, bad {width}-digit checksum, \
             received 0x{received:0width$x}"
        ));
        parse.reject_rescan(data);
    }
}

fn deliver(parse: &mut Parser, mut machine: Machine, details: Details) {
    if parse.length + TRAILER_OVERHEAD > parse.buffer.len() {
        let buffer_length = parse.buffer.len();
        parse.error_line(format_args!(
            "Unicore hash sentence too long, increase the buffer size >= {buffer_length}"
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
    parse.active = Active::UnicoreHash(machine);
}

#[cfg(test)]
mod tests {
    use crate::checksum::crc32_reversed;
    use crate::{Details, ParserBuilder, Protocol};
    use std::sync::mpsc;

    fn hash_parser() -> (crate::Parser, mpsc::Receiver<(Vec<u8>, Details)>) {
        let (tx, rx) = mpsc::channel();
        let parser = ParserBuilder::new("test")
            .with_protocol(Protocol::UnicoreHash)
            .buffer_length(256)
            .begin(move |frame| {
                tx.send((frame.bytes().to_vec(), frame.details().clone()))
                    .unwrap();
            })
            .unwrap();
        (parser, rx)
    }

    fn xor_sentence(body: &str) -> String {
        let checksum = body.bytes().fold(0u8, |c, b| c ^ b);
        format!("#{body}*{checksum:02X}\r\n")
    }

    fn crc_sentence(body: &str) -> String {
        let crc = crc32_reversed(body.as_bytes());
        format!("#{body}*{crc:08x}\r\n")
    }

    #[test]
    fn mode_sentence_uses_xor_checksum() {
        let (mut parser, rx) = hash_parser();
        let sentence = xor_sentence("MASKMODE,1,GPS");
        parser.parse_next_bytes(sentence.as_bytes());

        let (bytes, details) = rx.try_recv().unwrap();
        assert_eq!(bytes, sentence.as_bytes());
        match details {
            Details::UnicoreHash { sentence_name } => assert_eq!(sentence_name, "MASKMODE"),
            other => panic!("wrong details: {other:?}"),
        }
    }

    #[test]
    fn other_sentences_use_crc32() {
        let (mut parser, rx) = hash_parser();
        let sentence =
            crc_sentence("VERSION,97,GPS,FINE,2282,248561000,0,0,18,676;UM980,R4.10Build7923");
        parser.parse_next_bytes(sentence.as_bytes());

        let (bytes, details) = rx.try_recv().unwrap();
        assert_eq!(bytes, sentence.as_bytes());
        match details {
            Details::UnicoreHash { sentence_name } => assert_eq!(sentence_name, "VERSION"),
            other => panic!("wrong details: {other:?}"),
        }
    }

    #[test]
    fn corrupt_crc32_drops_the_sentence() {
        let (mut parser, rx) = hash_parser();
        let mut sentence = crc_sentence("VERSION,97").into_bytes();
        // Corrupt one CRC digit, staying within hex.
        let digit = sentence.len() - 3;
        sentence[digit] = if sentence[digit] == b'0' { b'1' } else { b'0' };
        parser.parse_next_bytes(&sentence);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn corrupt_xor_checksum_drops_the_sentence() {
        let (mut parser, rx) = hash_parser();
        parser.parse_next_bytes(b"#MASKMODE,1*00\r\n");
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn non_hex_checksum_character_rejects_the_sentence() {
        let (mut parser, rx) = hash_parser();
        parser.parse_next_bytes(b"#VERSION,97*0000zz00\r\n");
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn back_to_back_sentences_parse_cleanly() {
        let (mut parser, rx) = hash_parser();
        let first = xor_sentence("MASKMODE,1");
        let second = crc_sentence("VERSION,97");
        parser.parse_next_bytes(first.as_bytes());
        parser.parse_next_bytes(second.as_bytes());
        assert!(rx.try_recv().is_ok());
        assert!(rx.try_recv().is_ok());
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn mode_substring_anywhere_selects_xor() {
        let (mut parser, rx) = hash_parser();
        let sentence = xor_sentence("UNLOGMODEX,0");
        parser.parse_next_bytes(sentence.as_bytes());
        assert!(rx.try_recv().is_ok());
    }
}
