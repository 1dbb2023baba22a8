/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! ET232 request framing.
//!
//! ```text
//!  opcode │ arg 0 │ arg 1 │ checksum │ CR
//!   'I'   │ "8C"  │ "50"  │   "29"   │ \r      write PotA = 0x50
//!   'H'   │ "8C"  │       │   "C3"   │ \r      read PotA
//! ```
//!
//! Arguments and checksum are upper-case two-character hex.  The checksum is
//! the wrapping 8-bit sum of the opcode and argument characters that fall in
//! `0x30..=0x90`.  Responses are a single `\n`-terminated line.

use std::ops::RangeInclusive;

pub const WRITE_OPCODE: u8 = b'I';
pub const READ_OPCODE: u8 = b'H';
pub const FRAME_TERMINATOR: u8 = b'\r';

/// Only bytes in this range contribute to the checksum.
pub const CHECKSUM_RANGE: RangeInclusive<u8> = 0x30..=0x90;

const HEX_DIGITS: &[u8; 16] = b"0123456789ABCDEF";

/// 8-bit wrapping sum of the bytes of `bytes` inside [`CHECKSUM_RANGE`].
pub fn checksum(bytes: &[u8]) -> u8 {
    bytes
        .iter()
        .filter(|&&b| CHECKSUM_RANGE.contains(&b))
        .fold(0u8, |sum, &b| sum.wrapping_add(b))
}

fn push_hex(frame: &mut Vec<u8>, byte: u8) {
    frame.push(HEX_DIGITS[usize::from(byte >> 4)]);
    frame.push(HEX_DIGITS[usize::from(byte & 0x0F)]);
}

/// Builds a complete request frame, terminator included.
pub fn encode_request(opcode: u8, args: &[u8]) -> Vec<u8> {
    let mut frame = Vec::with_capacity(1 + 2 * args.len() + 3);
    frame.push(opcode);
    for &arg in args {
        push_hex(&mut frame, arg);
    }
    let sum = checksum(&frame);
    push_hex(&mut frame, sum);
    frame.push(FRAME_TERMINATOR);
    frame
}

/// Parses the body of a read response (delimiter already stripped) as a hex
/// byte.  Returns `None` for empty, non-hex or out-of-range responses.
pub fn parse_read_response(line: &[u8]) -> Option<u8> {
    if line.is_empty() || !line.iter().all(u8::is_ascii_hexdigit) {
        return None;
    }
    let text = std::str::from_utf8(line).ok()?;
    u8::from_str_radix(text, 16).ok()
}

// ── Tests ─────────────────────────────────────────────────────────────────────
