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

//! String literals (RFC 9204, Section 4.1.2).

use super::huffman;
use super::Error;
use super::IntegerReader;
use super::Result;

// Huffman codes are at most 30 bits long, so a Huffman-encoded string longer
// than this many times the limit always decodes past it.
const MAX_HUFFMAN_EXPANSION: u64 = 4;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
enum State {
    #[default]
    Unconfigured,
    Flag,
    Length,
    Payload,
    Done,
}

/// A resumable reader for length-prefixed, optionally Huffman-encoded
/// string literals.
#[derive(Debug)]
pub struct StringReader {
    state: State,
    prefix: u8,
    max_len: u64,
    huffman: bool,
    remaining: u64,
    decoded: u64,
    length: IntegerReader,
    decoder: huffman::Decoder,
}

impl Default for StringReader {
    fn default() -> Self {
        StringReader {
            state: State::Unconfigured,
            prefix: 0,
            max_len: u64::MAX,
            huffman: false,
            remaining: 0,
            decoded: 0,
            length: IntegerReader::new(),
            decoder: huffman::Decoder::new(),
        }
    }
}

impl StringReader {
    /// Creates a new, unconfigured reader.
    pub fn new() -> StringReader {
        StringReader::default()
    }

    /// Prepares the reader for a string whose length uses a `prefix`-bit
    /// prefix. The Huffman flag is the bit right above the prefix.
    pub fn configure(&mut self, prefix: u8) {
        debug_assert!((1..=7).contains(&prefix), "invalid prefix {prefix}");

        self.reset();

        self.state = State::Flag;
        self.prefix = prefix;
    }

    /// Limits the decoded length of the string.
    ///
    /// Longer strings fail with [`Error::HeaderListTooLarge`] before their
    /// content is buffered.
    ///
    /// [`Error::HeaderListTooLarge`]: enum.Error.html#variant.HeaderListTooLarge
    pub fn set_max_len(&mut self, max_len: u64) {
        self.max_len = max_len;
    }

    /// Reads the string from `b`, appending the decoded bytes to `out`.
    ///
    /// Returns `Ok(true)` once the whole string was read, or `Ok(false)` if
    /// `b` was exhausted first.
    pub fn read(
        &mut self, b: &mut octets::Octets, out: &mut Vec<u8>,
    ) -> Result<bool> {
        loop {
            match self.state {
                State::Unconfigured => return Err(Error::InvalidState),

                State::Done => return Ok(true),

                State::Flag => {
                    if b.cap() == 0 {
                        return Ok(false);
                    }

                    self.huffman = b.peek_u8()? & (1 << self.prefix) != 0;

                    self.length.configure(self.prefix);
                    self.state = State::Length;
                },

                State::Length => {
                    if !self.length.read(b)? {
                        return Ok(false);
                    }

                    let len = self.length.get();

                    let limit = if self.huffman {
                        self.max_len.saturating_mul(MAX_HUFFMAN_EXPANSION)
                    } else {
                        self.max_len
                    };

                    if len > limit {
                        trace!("String too long len={len} max={}", self.max_len);

                        return Err(Error::HeaderListTooLarge);
                    }

                    self.remaining = len;
                    self.state = State::Payload;
                },

                State::Payload => {
                    let n = self.remaining.min(b.cap() as u64) as usize;
                    let bytes = b.get_bytes(n)?;

                    let start = out.len();

                    if self.huffman {
                        for &byte in bytes.buf() {
                            self.decoder.decode(byte, out)?;
                        }
                    } else {
                        out.extend_from_slice(bytes.buf());
                    }

                    self.decoded += (out.len() - start) as u64;

                    if self.decoded > self.max_len {
                        return Err(Error::HeaderListTooLarge);
                    }

                    self.remaining -= n as u64;

                    if self.remaining > 0 {
                        return Ok(false);
                    }

                    if self.huffman && !self.decoder.is_final() {
                        return Err(Error::InvalidHuffmanEncoding);
                    }

                    self.state = State::Done;
                },
            }
        }
    }

    /// Returns whether the string is Huffman-encoded.
    ///
    /// Only meaningful once the first byte of the string has been read.
    pub fn is_huffman_encoded(&self) -> bool {
        self.huffman
    }

    /// Clears all state, including the configured prefix and length limit.
    pub fn reset(&mut self) {
        self.state = State::Unconfigured;
        self.prefix = 0;
        self.max_len = u64::MAX;
        self.huffman = false;
        self.remaining = 0;
        self.decoded = 0;
        self.length.reset();
        self.decoder.reset();
    }
}
