// Copyright (C) 2019, Cloudflare, Inc.
// All rights reserved.
//
// Redistribution and use in source and binary forms, with or without
// modification, are permitted provided that the following conditions are
// met:
//
//     * Redistributions of source code must retain the above copyright notice,
//       this list of conditions and the following disclaimer.
//
//     * Redistributions in binary form must reproduce the above copyright
//       notice, this list of conditions and the following disclaimer in the
//       documentation and/or other materials provided with the distribution.
//
// THIS SOFTWARE IS PROVIDED BY THE COPYRIGHT HOLDERS AND CONTRIBUTORS "AS
// IS" AND ANY EXPRESS OR IMPLIED WARRANTIES, INCLUDING, BUT NOT LIMITED TO,
// THE IMPLIED WARRANTIES OF MERCHANTABILITY AND FITNESS FOR A PARTICULAR
// PURPOSE ARE DISCLAIMED. IN NO EVENT SHALL THE COPYRIGHT HOLDER OR
// CONTRIBUTORS BE LIABLE FOR ANY DIRECT, INDIRECT, INCIDENTAL, SPECIAL,
// EXEMPLARY, OR CONSEQUENTIAL DAMAGES (INCLUDING, BUT NOT LIMITED TO,
// PROCUREMENT OF SUBSTITUTE GOODS OR SERVICES; LOSS OF USE, DATA, OR
// PROFITS; OR BUSINESS INTERRUPTION) HOWEVER CAUSED AND ON ANY THEORY OF
// LIABILITY, WHETHER IN CONTRACT, STRICT LIABILITY, OR TORT (INCLUDING
// NEGLIGENCE OR OTHERWISE) ARISING IN ANY WAY OUT OF THE USE OF THIS
// SOFTWARE, EVEN IF ADVISED OF THE POSSIBILITY OF SUCH DAMAGE.

//! Prefixed integer representation (RFC 9204, Section 4.1.1).

use super::Error;
use super::Result;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
enum State {
    #[default]
    Unconfigured,
    Prefix,
    Continuation,
    Done,
}

/// A resumable reader for prefixed integers.
///
/// The reader is configured with the number of low bits of the first byte
/// that carry the integer (the prefix). It can then be driven with any number
/// of buffers, each call consuming as many bytes as are needed or available.
#[derive(Debug, Default)]
pub struct IntegerReader {
    state: State,
    prefix: u8,
    value: u64,
    shift: u32,
}

impl IntegerReader {
    /// Creates a new, unconfigured reader.
    pub fn new() -> IntegerReader {
        IntegerReader::default()
    }

    /// Prepares the reader for an integer with a `prefix`-bit prefix.
    ///
    /// `prefix` must be between 1 and 8.
    pub fn configure(&mut self, prefix: u8) {
        debug_assert!((1..=8).contains(&prefix), "invalid prefix {prefix}");

        self.state = State::Prefix;
        self.prefix = prefix;
        self.value = 0;
        self.shift = 0;
    }

    /// Reads the integer from `b`.
    ///
    /// Returns `Ok(true)` once the integer is complete, or `Ok(false)` if
    /// `b` was exhausted first, in which case the partial value is kept until
    /// the next call.
    pub fn read(&mut self, b: &mut octets::Octets) -> Result<bool> {
        loop {
            match self.state {
                State::Unconfigured => return Err(Error::InvalidState),

                State::Done => return Ok(true),

                State::Prefix => {
                    if b.cap() == 0 {
                        return Ok(false);
                    }

                    let mask = ((1u16 << self.prefix) - 1) as u8;

                    self.value = u64::from(b.get_u8()? & mask);

                    self.state = if self.value < u64::from(mask) {
                        State::Done
                    } else {
                        State::Continuation
                    };
                },

                State::Continuation => {
                    if b.cap() == 0 {
                        return Ok(false);
                    }

                    let byte = b.get_u8()?;
                    let inc = u64::from(byte & 0x7f);

                    // Also bounds the number of zero-valued continuation
                    // bytes a peer can send.
                    if self.shift > 63 || inc > u64::MAX >> self.shift {
                        return Err(Error::IntegerOverflow);
                    }

                    self.value = self
                        .value
                        .checked_add(inc << self.shift)
                        .ok_or(Error::IntegerOverflow)?;

                    self.shift += 7;

                    if byte & 0x80 == 0 {
                        self.state = State::Done;
                    }
                },
            }
        }
    }

    /// Returns the decoded integer.
    ///
    /// Only meaningful after [`read()`] returned `Ok(true)`.
    ///
    /// [`read()`]: struct.IntegerReader.html#method.read
    pub fn get(&self) -> u64 {
        debug_assert_eq!(self.state, State::Done);

        self.value
    }

    /// Returns true once the first byte of the integer has been consumed.
    pub fn is_started(&self) -> bool {
        matches!(self.state, State::Continuation | State::Done)
    }

    /// Clears all state, including the configured prefix.
    pub fn reset(&mut self) {
        self.state = State::Unconfigured;
        self.prefix = 0;
        self.value = 0;
        self.shift = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::testing::encode_int;
    use crate::testing::for_each_split;

    use rstest::rstest;

    fn read_int(buf: &[u8], prefix: u8) -> Result<u64> {
        let mut r = IntegerReader::new();
        r.configure(prefix);

        let mut b = octets::Octets::with_slice(buf);

        if !r.read(&mut b)? {
            return Err(Error::BufferTooShort);
        }

        assert_eq!(b.cap(), 0);

        Ok(r.get())
    }

    #[test]
    fn decode_int1() {
        assert_eq!(read_int(&[0b01010], 5), Ok(10));
    }

    #[test]
    fn decode_int2() {
        assert_eq!(read_int(&[0b11111, 0b10011010, 0b00001010], 5), Ok(1337));
    }

    #[test]
    fn decode_int3() {
        assert_eq!(read_int(&[0b101010], 8), Ok(42));
    }

    #[test]
    fn high_bits_are_ignored() {
        // Indexed field line, static table, index 17.
        assert_eq!(read_int(&[0xd1], 6), Ok(17));

        // Literal with name reference, static table, N set, index 15.
        assert_eq!(read_int(&[0x7f, 0x00], 4), Ok(15));
    }

    #[rstest]
    fn round_trip(
        #[values(4, 6, 7, 8)] prefix: u8,
        #[values(
            0, 1, 14, 15, 16, 62, 63, 64, 126, 127, 128, 1337, 1 << 21,
            u32::MAX as u64, u64::MAX
        )]
        value: u64,
    ) {
        let encoded = encode_int(value, 0, prefix);

        assert_eq!(read_int(&encoded, prefix), Ok(value));
    }

    #[rstest]
    fn fragmented(
        #[values(4, 6, 7)] prefix: u8,
        #[values(0, 15, 63, 127, 300, 16_384, 1 << 40, u64::MAX)] value: u64,
    ) {
        let encoded = encode_int(value, 0, prefix);

        for_each_split(&encoded, |chunks| {
            let mut r = IntegerReader::new();
            r.configure(prefix);

            let (last, init) = chunks.split_last().unwrap();

            for chunk in init {
                let mut b = octets::Octets::with_slice(chunk);
                assert_eq!(r.read(&mut b), Ok(false));
                assert_eq!(b.cap(), 0);
            }

            let mut b = octets::Octets::with_slice(last);
            assert_eq!(r.read(&mut b), Ok(true));
            assert_eq!(r.get(), value);
        });
    }

    #[test]
    fn empty_buffer() {
        let mut r = IntegerReader::new();
        r.configure(6);

        let mut b = octets::Octets::with_slice(&[]);
        assert_eq!(r.read(&mut b), Ok(false));
        assert!(!r.is_started());

        let mut b = octets::Octets::with_slice(&[0x3f]);
        assert_eq!(r.read(&mut b), Ok(false));
        assert!(r.is_started());

        let mut b = octets::Octets::with_slice(&[]);
        assert_eq!(r.read(&mut b), Ok(false));

        let mut b = octets::Octets::with_slice(&[0x01]);
        assert_eq!(r.read(&mut b), Ok(true));
        assert_eq!(r.get(), 64);
    }

    #[test]
    fn stops_after_integer() {
        let mut r = IntegerReader::new();
        r.configure(7);

        let buf = [0x7f, 0x81, 0x00, 0xaa];
        let mut b = octets::Octets::with_slice(&buf);

        assert_eq!(r.read(&mut b), Ok(true));
        assert_eq!(r.get(), 128);
        assert_eq!(b.cap(), 1);
    }

    #[test]
    fn overflow() {
        // 2^64 does not fit.
        let mut encoded = vec![0x1f];
        encoded.extend_from_slice(&[0xff; 9]);
        encoded.push(0x02);

        assert_eq!(read_int(&encoded, 5), Err(Error::IntegerOverflow));

        // The largest representable value is accepted.
        let encoded = encode_int(u64::MAX, 0, 5);
        assert_eq!(read_int(&encoded, 5), Ok(u64::MAX));

        // Adding one to the last continuation byte overflows.
        let mut encoded = encoded;
        *encoded.last_mut().unwrap() += 1;
        assert_eq!(read_int(&encoded, 5), Err(Error::IntegerOverflow));
    }

    #[test]
    fn endless_zero_continuation() {
        let mut encoded = vec![0x3f];
        encoded.extend_from_slice(&[0x80; 64]);

        assert_eq!(read_int(&encoded, 6), Err(Error::IntegerOverflow));
    }

    #[test]
    fn unconfigured() {
        let mut r = IntegerReader::new();

        let mut b = octets::Octets::with_slice(&[0x01]);
        assert_eq!(r.read(&mut b), Err(Error::InvalidState));
        assert_eq!(b.cap(), 1);
    }

    #[test]
    fn reset_matches_fresh_reader() {
        let mut r = IntegerReader::new();
        r.configure(5);

        // Leave the reader in the middle of a continuation.
        let mut b = octets::Octets::with_slice(&[0x1f, 0x9a]);
        assert_eq!(r.read(&mut b), Ok(false));

        r.reset();

        let mut b = octets::Octets::with_slice(&[0x01]);
        assert_eq!(r.read(&mut b), Err(Error::InvalidState));

        r.configure(5);

        let mut b = octets::Octets::with_slice(&[0b01010]);
        assert_eq!(r.read(&mut b), Ok(true));
        assert_eq!(r.get(), 10);
    }
}
