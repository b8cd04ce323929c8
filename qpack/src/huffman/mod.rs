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

use super::Error;
use super::Result;

use self::table::DECODE_TABLE;

const MAYBE_EOS: u8 = 1;
const DECODED: u8 = 2;
const ERROR: u8 = 4;

/// A Huffman decoder that can be fed one byte at a time.
///
/// Input is consumed 4 bits at a time, and the position in the code tree is
/// kept between calls, so a code split across buffers is decoded correctly.
#[derive(Debug, Default)]
pub struct Decoder {
    state: usize,
    maybe_eos: bool,
}

impl Decoder {
    pub fn new() -> Decoder {
        Decoder::default()
    }

    /// Decodes `byte`, appending any completed symbols to `out`.
    pub fn decode(&mut self, byte: u8, out: &mut Vec<u8>) -> Result<()> {
        if let Some(b) = self.decode4(byte >> 4)? {
            out.push(b);
        }

        if let Some(b) = self.decode4(byte & 0xf)? {
            out.push(b);
        }

        Ok(())
    }

    // Decodes 4 bits
    fn decode4(&mut self, input: u8) -> Result<Option<u8>> {
        // (next-state, byte, flags)
        let (next, byte, flags) = DECODE_TABLE[self.state][input as usize];

        if flags & ERROR == ERROR {
            // Data contained the EOS symbol
            return Err(Error::InvalidHuffmanEncoding);
        }

        let ret = if flags & DECODED == DECODED {
            Some(byte)
        } else {
            None
        };

        self.state = next;
        self.maybe_eos = flags & MAYBE_EOS == MAYBE_EOS;

        Ok(ret)
    }

    /// Returns true if the input so far ends on a symbol boundary, or with
    /// valid padding (at most 7 bits, all ones).
    pub fn is_final(&self) -> bool {
        self.state == 0 || self.maybe_eos
    }

    pub fn reset(&mut self) {
        self.state = 0;
        self.maybe_eos = false;
    }
}

mod table;

#[cfg(test)]
mod tests {
    use super::*;

    fn decode(buf: &[u8]) -> Result<Vec<u8>> {
        let mut decoder = Decoder::new();
        let mut out = Vec::new();

        for &b in buf {
            decoder.decode(b, &mut out)?;
        }

        if !decoder.is_final() {
            return Err(Error::InvalidHuffmanEncoding);
        }

        Ok(out)
    }

    #[test]
    fn rfc7541_vectors() {
        let vectors: [(&[u8], &[u8]); 6] = [
            (
                &[
                    0xf1, 0xe3, 0xc2, 0xe5, 0xf2, 0x3a, 0x6b, 0xa0, 0xab, 0x90,
                    0xf4, 0xff,
                ],
                b"www.example.com",
            ),
            (&[0xa8, 0xeb, 0x10, 0x64, 0x9c, 0xbf], b"no-cache"),
            (&[0x25, 0xa8, 0x49, 0xe9, 0x5b, 0xa9, 0x7d, 0x7f], b"custom-key"),
            (
                &[0x25, 0xa8, 0x49, 0xe9, 0x5b, 0xb8, 0xe8, 0xb4, 0xbf],
                b"custom-value",
            ),
            (&[0x64, 0x02], b"302"),
            (&[0xae, 0xc3, 0x77, 0x1a, 0x4b], b"private"),
        ];

        for (encoded, expected) in vectors {
            assert_eq!(decode(encoded), Ok(expected.to_vec()));
        }
    }

    #[test]
    fn empty() {
        assert_eq!(decode(&[]), Ok(vec![]));
    }

    #[test]
    fn padding_not_all_ones() {
        // "www.example.com" with the last padding bit cleared.
        let encoded = [
            0xf1, 0xe3, 0xc2, 0xe5, 0xf2, 0x3a, 0x6b, 0xa0, 0xab, 0x90, 0xf4,
            0xfe,
        ];

        assert_eq!(decode(&encoded), Err(Error::InvalidHuffmanEncoding));
    }

    #[test]
    fn padding_too_long() {
        // "302" followed by a full byte of ones.
        assert_eq!(
            decode(&[0x64, 0x02, 0xff]),
            Err(Error::InvalidHuffmanEncoding)
        );

        // Eight bits of ones alone are never valid.
        assert_eq!(decode(&[0xff]), Err(Error::InvalidHuffmanEncoding));
    }

    #[test]
    fn eos_symbol() {
        // The 30-bit EOS symbol followed by two bits of padding.
        assert_eq!(
            decode(&[0xff, 0xff, 0xff, 0xff]),
            Err(Error::InvalidHuffmanEncoding)
        );
    }

    #[test]
    fn split_codes() {
        let encoded = [0x25, 0xa8, 0x49, 0xe9, 0x5b, 0xa9, 0x7d, 0x7f];

        // Feeding the same decoder through a reset yields the same output.
        let mut decoder = Decoder::new();
        let mut out = Vec::new();

        decoder.decode(0x64, &mut out).unwrap();
        decoder.reset();
        out.clear();

        for &b in &encoded {
            decoder.decode(b, &mut out).unwrap();
        }

        assert!(decoder.is_final());
        assert_eq!(out, b"custom-key");
    }
}
