// Copyright (C) 2026 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//

//! Wire encoding of MIDI channel voice messages and SysEx frames.
//!
//! Every encoder is total: out of range fields are masked to their legal bit
//! width rather than rejected, so a controller value of 200 goes out as 72.

use std::fmt;

use midly::live::LiveEvent;

use crate::error::ParseError;

pub const NOTE_OFF: u8 = 0x80;
pub const NOTE_ON: u8 = 0x90;
pub const CONTROL_CHANGE: u8 = 0xB0;
pub const PROGRAM_CHANGE: u8 = 0xC0;
pub const CHANNEL_PRESSURE: u8 = 0xD0;
pub const PITCH_BEND: u8 = 0xE0;

pub const SYSEX_START: u8 = 0xF0;
pub const SYSEX_END: u8 = 0xF7;

pub const NRPN_PARAM_MSB: u8 = 99;
pub const NRPN_PARAM_LSB: u8 = 98;
pub const RPN_PARAM_MSB: u8 = 101;
pub const RPN_PARAM_LSB: u8 = 100;
pub const DATA_ENTRY_MSB: u8 = 6;
pub const DATA_ENTRY_LSB: u8 = 38;

pub const ALL_SOUND_OFF: u8 = 120;
pub const RESET_ALL_CONTROLLERS: u8 = 121;
pub const ALL_NOTES_OFF: u8 = 123;

/// The center (no bend) position of the pitch wheel.
pub const PITCH_BEND_CENTER: u16 = 8192;

/// A MIDI channel in its user facing form, 1 through 16.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Channel(u8);

impl Channel {
    /// Creates a channel from its user facing number.
    pub fn new(channel: i64) -> Result<Channel, ParseError> {
        if (1..=16).contains(&channel) {
            Ok(Channel(channel as u8))
        } else {
            Err(ParseError::ChannelOutOfRange(channel))
        }
    }

    /// The user facing channel number.
    pub fn number(&self) -> u8 {
        self.0
    }

    /// The channel as it appears in the status byte.
    pub fn wire(&self) -> u8 {
        self.0 - 1
    }
}

impl Default for Channel {
    fn default() -> Self {
        Channel(1)
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A channel voice message. Always carries three bytes; messages that only
/// have one data byte hold zero in the last position and are trimmed on the wire.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ShortMessage([u8; 3]);

impl ShortMessage {
    /// The status byte.
    pub fn status(&self) -> u8 {
        self.0[0]
    }

    /// The first data byte.
    pub fn data1(&self) -> u8 {
        self.0[1]
    }

    /// The second data byte. Zero for single data byte messages.
    pub fn data2(&self) -> u8 {
        self.0[2]
    }

    /// The full three byte frame.
    pub fn frame(&self) -> [u8; 3] {
        self.0
    }

    /// The bytes as they should be transmitted.
    pub fn as_bytes(&self) -> &[u8] {
        match self.0[0] & 0xF0 {
            PROGRAM_CHANGE | CHANNEL_PRESSURE => &self.0[..2],
            _ => &self.0,
        }
    }
}

impl fmt::Display for ShortMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let hex: Vec<String> = self.as_bytes().iter().map(|b| format!("{:02X}", b)).collect();
        write!(f, "{}", hex.join(" "))
    }
}

/// Builds a short message. The status byte is the upper nibble of `status`
/// combined with the lower nibble of `channel`.
pub fn encode_short_message(status: u8, channel: u8, data1: u8, data2: u8) -> ShortMessage {
    ShortMessage([
        (status & 0xF0) | (channel & 0x0F),
        data1 & 0x7F,
        data2 & 0x7F,
    ])
}

pub fn encode_cc(channel: u8, controller: u8, value: u8) -> ShortMessage {
    encode_short_message(CONTROL_CHANGE, channel, controller, value)
}

pub fn encode_note_on(channel: u8, note: u8, velocity: u8) -> ShortMessage {
    encode_short_message(NOTE_ON, channel, note, velocity)
}

/// Note off with an explicit release velocity. See [`encode_note_off`] for the common case.
pub fn encode_note_off_with_velocity(channel: u8, note: u8, velocity: u8) -> ShortMessage {
    encode_short_message(NOTE_OFF, channel, note, velocity)
}

/// Note off with a release velocity of 0.
pub fn encode_note_off(channel: u8, note: u8) -> ShortMessage {
    encode_note_off_with_velocity(channel, note, 0)
}

pub fn encode_program_change(channel: u8, program: u8) -> ShortMessage {
    encode_short_message(PROGRAM_CHANGE, channel, program, 0)
}

/// Pitch bend is a single message: LSB in the first data byte, MSB in the second.
pub fn encode_pitch_bend(channel: u8, value: u16) -> ShortMessage {
    let (msb, lsb) = split_14bit(value);
    encode_short_message(PITCH_BEND, channel, lsb, msb)
}

/// Encodes an NRPN write as four control changes: parameter MSB (99),
/// parameter LSB (98), data entry MSB (6), data entry LSB (38). Receivers
/// depend on this exact order.
pub fn encode_nrpn(channel: u8, param: u16, value: u16) -> [ShortMessage; 4] {
    encode_parameter(channel, NRPN_PARAM_MSB, NRPN_PARAM_LSB, param, value)
}

/// Encodes an RPN write. Same shape as NRPN with controllers 101 and 100.
pub fn encode_rpn(channel: u8, param: u16, value: u16) -> [ShortMessage; 4] {
    encode_parameter(channel, RPN_PARAM_MSB, RPN_PARAM_LSB, param, value)
}

fn encode_parameter(
    channel: u8,
    msb_controller: u8,
    lsb_controller: u8,
    param: u16,
    value: u16,
) -> [ShortMessage; 4] {
    let (param_msb, param_lsb) = split_14bit(param);
    let (value_msb, value_lsb) = split_14bit(value);
    [
        encode_cc(channel, msb_controller, param_msb),
        encode_cc(channel, lsb_controller, param_lsb),
        encode_cc(channel, DATA_ENTRY_MSB, value_msb),
        encode_cc(channel, DATA_ENTRY_LSB, value_lsb),
    ]
}

/// Returns (msb, lsb) of a 14 bit value.
fn split_14bit(value: u16) -> (u8, u8) {
    (((value >> 7) & 0x7F) as u8, (value & 0x7F) as u8)
}

/// Frames a SysEx payload, adding the start and end bytes only where missing.
/// Already framed input comes back unchanged.
pub fn encode_sysex(data: &[u8]) -> Vec<u8> {
    let mut framed = Vec::with_capacity(data.len() + 2);
    if data.first() != Some(&SYSEX_START) {
        framed.push(SYSEX_START);
    }
    framed.extend_from_slice(data);
    if framed.last() != Some(&SYSEX_END) {
        framed.push(SYSEX_END);
    }
    framed
}

/// Parses SysEx bytes written as hex. Tokens may be separated by whitespace or
/// commas and may carry a `0x` prefix; the digits are concatenated before
/// decoding so `F0 4 3` and `F043` are equivalent.
pub fn parse_hex(input: &str) -> Result<Vec<u8>, ParseError> {
    let digits: String = input
        .split(|c: char| c.is_whitespace() || c == ',')
        .map(|token| {
            token
                .strip_prefix("0x")
                .or_else(|| token.strip_prefix("0X"))
                .unwrap_or(token)
        })
        .collect();

    if digits.len() % 2 != 0 || !digits.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(ParseError::InvalidHex(input.trim().to_string()));
    }

    (0..digits.len())
        .step_by(2)
        .map(|i| {
            u8::from_str_radix(&digits[i..i + 2], 16)
                .map_err(|_| ParseError::InvalidHex(input.trim().to_string()))
        })
        .collect()
}

/// The messages sent by the panic command: all notes off, reset all
/// controllers, all sound off.
pub fn panic_messages(channel: u8) -> [ShortMessage; 3] {
    [
        encode_cc(channel, ALL_NOTES_OFF, 0),
        encode_cc(channel, RESET_ALL_CONTROLLERS, 0),
        encode_cc(channel, ALL_SOUND_OFF, 0),
    ]
}

/// Decodes a wire message for display.
pub fn decode(bytes: &[u8]) -> Option<LiveEvent<'_>> {
    LiveEvent::parse(bytes).ok()
}

/// Returns a human readable name for well known controllers.
pub fn controller_name(controller: u8) -> String {
    let name = match controller {
        0 => "Bank Select MSB",
        1 => "Modulation",
        2 => "Breath",
        4 => "Foot Controller",
        5 => "Portamento Time",
        7 => "Volume",
        10 => "Pan",
        11 => "Expression",
        64 => "Sustain",
        65 => "Portamento",
        66 => "Sostenuto",
        67 => "Soft Pedal",
        71 => "Resonance",
        72 => "Release",
        73 => "Attack",
        74 => "Cutoff",
        91 => "Reverb",
        93 => "Chorus",
        120 => "All Sound Off",
        121 => "Reset All",
        123 => "All Notes Off",
        _ => return format!("CC{}", controller),
    };
    name.to_string()
}

#[cfg(test)]
mod test {
    use midly::{live::LiveEvent, MidiMessage};

    use super::*;

    fn decode_cc(message: &ShortMessage) -> (u8, u8, u8) {
        match LiveEvent::parse(message.as_bytes()).expect("unable to parse message") {
            LiveEvent::Midi {
                channel,
                message: MidiMessage::Controller { controller, value },
            } => (channel.as_int(), controller.as_int(), value.as_int()),
            other => panic!("expected a controller event, got {:?}", other),
        }
    }

    #[test]
    fn test_cc_decodes_for_every_channel() {
        for user_channel in 1..=16 {
            let channel = Channel::new(user_channel).unwrap();
            for (controller, value) in [(0u8, 0u8), (74, 100), (127, 127), (7, 64)] {
                let message = encode_cc(channel.wire(), controller, value);
                assert_eq!(
                    (user_channel as u8 - 1, controller, value),
                    decode_cc(&message)
                );
            }
        }
    }

    #[test]
    fn test_fields_are_masked() {
        let message = encode_cc(0x1F, 200, 200);
        assert_eq!([0xBF, 72, 72], message.frame());
        assert_eq!(
            [0x93, 0x7F, 0x00],
            encode_note_on(3, 255, 128).frame()
        );
        // Only the upper nibble of the status is used.
        assert_eq!(0x95, encode_short_message(0x9A, 5, 1, 1).status());
    }

    #[test]
    fn test_note_off_default_velocity() {
        assert_eq!([0x82, 60, 0], encode_note_off(2, 60).frame());
        assert_eq!(
            [0x82, 60, 40],
            encode_note_off_with_velocity(2, 60, 40).frame()
        );
    }

    #[test]
    fn test_program_change_is_two_bytes_on_the_wire() {
        let message = encode_program_change(0, 5);
        assert_eq!([0xC0, 5, 0], message.frame());
        assert_eq!(&[0xC0, 5], message.as_bytes());
        assert!(matches!(
            LiveEvent::parse(message.as_bytes()),
            Ok(LiveEvent::Midi {
                message: MidiMessage::ProgramChange { .. },
                ..
            })
        ));
    }

    #[test]
    fn test_pitch_bend_data_bytes() {
        let center = encode_pitch_bend(0, PITCH_BEND_CENTER);
        assert_eq!((0, 64), (center.data1(), center.data2()));
        let low = encode_pitch_bend(0, 0);
        assert_eq!((0, 0), (low.data1(), low.data2()));
        let high = encode_pitch_bend(0, 16383);
        assert_eq!((127, 127), (high.data1(), high.data2()));
        assert_eq!(0xE4, encode_pitch_bend(4, 0).status());

        match LiveEvent::parse(encode_pitch_bend(0, 12345).as_bytes()) {
            Ok(LiveEvent::Midi {
                message: MidiMessage::PitchBend { bend },
                ..
            }) => assert_eq!(12345, bend.0.as_int()),
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[test]
    fn test_nrpn_order() {
        for (param, value) in [(0u16, 0u16), (1234, 5678), (16383, 16383), (128, 1)] {
            let messages = encode_nrpn(2, param, value);
            let decoded: Vec<(u8, u8, u8)> = messages.iter().map(decode_cc).collect();
            assert_eq!(
                vec![
                    (2, 99, (param >> 7) as u8),
                    (2, 98, (param & 0x7F) as u8),
                    (2, 6, (value >> 7) as u8),
                    (2, 38, (value & 0x7F) as u8),
                ],
                decoded
            );
        }
    }

    #[test]
    fn test_rpn_order() {
        let decoded: Vec<(u8, u8, u8)> = encode_rpn(0, 0, 2 << 7).iter().map(decode_cc).collect();
        assert_eq!(
            vec![(0, 101, 0), (0, 100, 0), (0, 6, 2), (0, 38, 0)],
            decoded
        );
    }

    #[test]
    fn test_sysex_framing() {
        let inputs: Vec<Vec<u8>> = vec![
            vec![],
            vec![0xF0],
            vec![0xF7],
            vec![0x43, 0x10, 0x4C],
            vec![0xF0, 0x43, 0x10],
            vec![0x43, 0x10, 0xF7],
            vec![0xF0, 0x7E, 0x7F, 0x09, 0x01, 0xF7],
        ];
        for input in inputs {
            let framed = encode_sysex(&input);
            assert_eq!(Some(&SYSEX_START), framed.first(), "input {:?}", input);
            assert_eq!(Some(&SYSEX_END), framed.last(), "input {:?}", input);
            assert!(framed.len() >= 2);
            assert_eq!(framed, encode_sysex(&framed), "input {:?}", input);
        }

        let already_framed = vec![0xF0, 0x7E, 0x7F, 0x09, 0x01, 0xF7];
        assert_eq!(already_framed, encode_sysex(&already_framed));
        assert_eq!(vec![0xF0, 0x43, 0xF7], encode_sysex(&[0x43]));
    }

    #[test]
    fn test_parse_hex() {
        assert_eq!(
            Ok(vec![0xF0, 0x43, 0x10, 0xF7]),
            parse_hex("F0 43 10 F7")
        );
        assert_eq!(Ok(vec![0xF0, 0x43]), parse_hex("0xF0,0x43"));
        assert_eq!(Ok(vec![0xF0, 0x43]), parse_hex("f043"));
        assert_eq!(Ok(vec![]), parse_hex(""));
        assert_eq!(
            Err(ParseError::InvalidHex("F0 4".into())),
            parse_hex("F0 4")
        );
        assert_eq!(Err(ParseError::InvalidHex("ZZ".into())), parse_hex("ZZ"));
    }

    #[test]
    fn test_panic_messages() {
        let decoded: Vec<(u8, u8, u8)> = panic_messages(9).iter().map(decode_cc).collect();
        assert_eq!(vec![(9, 123, 0), (9, 121, 0), (9, 120, 0)], decoded);
    }

    #[test]
    fn test_channel() {
        assert_eq!(0, Channel::new(1).unwrap().wire());
        assert_eq!(15, Channel::new(16).unwrap().wire());
        assert_eq!(Err(ParseError::ChannelOutOfRange(0)), Channel::new(0));
        assert_eq!(Err(ParseError::ChannelOutOfRange(17)), Channel::new(17));
    }

    #[test]
    fn test_controller_names() {
        assert_eq!("Cutoff", controller_name(74));
        assert_eq!("CC42", controller_name(42));
    }
}
