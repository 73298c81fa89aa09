//! Single-byte text codec used on the serial link
//!
//! The sink mote speaks ISO-8859-1: every byte is one character and every
//! character below U+0100 is one byte. Characters outside that range have
//! no wire representation and are sent as `?`.

/// Byte sent for characters that have no ISO-8859-1 encoding
pub const REPLACEMENT_BYTE: u8 = b'?';

/// Encode text for the wire
pub fn encode_latin1(text: &str) -> Vec<u8> {
    text.chars()
        .map(|c| u8::try_from(u32::from(c)).unwrap_or(REPLACEMENT_BYTE))
        .collect()
}

/// Decode wire bytes into text. Never fails.
pub fn decode_latin1(bytes: &[u8]) -> String {
    bytes.iter().map(|&b| char::from(b)).collect()
}

/// Strip one trailing `\n` and an optional `\r` before it
pub fn trim_line_ending(mut bytes: &[u8]) -> &[u8] {
    if let [rest @ .., b'\n'] = bytes {
        bytes = rest;
    }
    if let [rest @ .., b'\r'] = bytes {
        bytes = rest;
    }
    bytes
}
