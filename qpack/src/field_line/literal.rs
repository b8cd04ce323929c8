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

use super::DecodingCallback;
use super::FieldLineContext;

use crate::header_size;
use crate::Result;
use crate::StringReader;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
enum State {
    #[default]
    AwaitingName,
    AwaitingValue,
}

/// Reads literal field lines with a literal name.
///
/// ```text
///   0   1   2   3   4   5   6   7
/// +---+---+---+---+---+---+---+---+
/// | 0 | 0 | 1 | N | H |NameLen(3+)|
/// +---+---+---+---+---+-----------+
/// |  Name String (Length bytes)   |
/// +---+---------------------------+
/// | H |     Value Length (7+)     |
/// +---+---------------------------+
/// |  Value String (Length bytes)  |
/// +-------------------------------+
/// ```
///
/// Like [`NameReferenceReader`], `read()` returns `Ok(false)` once the name
/// is complete and must be called again to read the value.
///
/// [`NameReferenceReader`]: struct.NameReferenceReader.html
#[derive(Debug, Default)]
pub struct LiteralNameReader {
    state: State,

    hide_intermediary: bool,

    name_huffman: bool,
    name: Vec<u8>,

    reader: StringReader,
    value: Vec<u8>,
}

impl LiteralNameReader {
    /// Creates a new reader.
    pub fn new() -> LiteralNameReader {
        LiteralNameReader::default()
    }

    /// Prepares the reader for a field line starting with `first`.
    pub fn configure(&mut self, first: u8) {
        const NEVER_INDEXED: u8 = 0x10;

        self.reset();

        self.hide_intermediary = first & NEVER_INDEXED == NEVER_INDEXED;
        self.reader.configure(3);
    }

    /// Reads the field line from `b`.
    pub fn read<C: DecodingCallback + ?Sized>(
        &mut self, b: &mut octets::Octets, ctx: &mut FieldLineContext,
        cb: &mut C,
    ) -> Result<bool> {
        match self.state {
            State::AwaitingName => {
                self.reader.set_max_len(ctx.remaining_section_size());

                if !ctx.read_string(&mut self.reader, b, &mut self.name, cb)? {
                    return Ok(false);
                }

                self.name_huffman = self.reader.is_huffman_encoded();

                let remaining = ctx
                    .remaining_section_size()
                    .saturating_sub(self.name.len() as u64);

                self.reader.configure(7);
                self.reader.set_max_len(remaining);

                self.state = State::AwaitingValue;

                Ok(false)
            },

            State::AwaitingValue => {
                if !ctx.read_string(&mut self.reader, b, &mut self.value, cb)? {
                    return Ok(false);
                }

                let value_huffman = self.reader.is_huffman_encoded();

                trace!(
                    "LiteralWithLiteralName name={:?} value={:?} hide={}",
                    std::str::from_utf8(&self.name),
                    std::str::from_utf8(&self.value),
                    self.hide_intermediary
                );

                ctx.check_section_size(header_size(&self.name, &self.value), cb)?;

                cb.on_literal_with_literal_name(
                    &self.name,
                    self.name_huffman,
                    &self.value,
                    value_huffman,
                    self.hide_intermediary,
                );

                self.reset();

                Ok(true)
            },
        }
    }

    /// Clears all state.
    pub fn reset(&mut self) {
        self.state = State::AwaitingName;
        self.hide_intermediary = false;
        self.name_huffman = false;
        self.name.clear();
        self.reader.reset();
        self.value.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::testing::encode_str;
    use crate::testing::for_each_split;
    use crate::testing::Event;
    use crate::testing::Recorder;
    use crate::Error;
    use crate::FieldSectionPrefix;
    use crate::SectionSize;
    use crate::Table;

    fn field_line(name: &[u8], value: &[u8], first: u8) -> Vec<u8> {
        let mut buf = encode_str(name, first, 3);
        buf.extend_from_slice(&encode_str(value, 0x00, 7));
        buf
    }

    fn drive(
        r: &mut LiteralNameReader, buf: &[u8], ctx: &mut FieldLineContext,
        cb: &mut Recorder,
    ) -> Result<bool> {
        let mut b = octets::Octets::with_slice(buf);

        loop {
            if r.read(&mut b, ctx, cb)? {
                return Ok(true);
            }

            if b.cap() == 0 {
                return Ok(false);
            }
        }
    }

    #[test]
    fn staged_read() {
        let table = Table::new(0);
        let mut size = SectionSize::new(u64::MAX);
        let mut cb = Recorder::default();

        let mut ctx = FieldLineContext::new(
            FieldSectionPrefix::default(),
            &table,
            &mut size,
        );

        let buf = field_line(b"foo", b"bar", 0x20);

        let mut r = LiteralNameReader::new();
        r.configure(buf[0]);

        let mut b = octets::Octets::with_slice(&buf);

        assert_eq!(r.read(&mut b, &mut ctx, &mut cb), Ok(false));
        assert_eq!(b.off(), 4);
        assert!(cb.events.is_empty());

        assert_eq!(r.read(&mut b, &mut ctx, &mut cb), Ok(true));
        assert_eq!(b.cap(), 0);

        assert_eq!(cb.events, vec![Event::LiteralName {
            name: b"foo".to_vec(),
            name_huffman: false,
            value: b"bar".to_vec(),
            value_huffman: false,
            hide_intermediary: false,
        }]);

        assert_eq!(size.used(), 3 + 3 + 32);
    }

    #[test]
    fn huffman_and_never_indexed() {
        let table = Table::new(0);

        // custom-key: custom-value, both Huffman-encoded.
        let buf = [
            0x3f, 0x01, 0x25, 0xa8, 0x49, 0xe9, 0x5b, 0xa9, 0x7d, 0x7f, 0x89,
            0x25, 0xa8, 0x49, 0xe9, 0x5b, 0xb8, 0xe8, 0xb4, 0xbf,
        ];

        for_each_split(&buf[..16], |chunks| {
            let mut size = SectionSize::new(u64::MAX);
            let mut cb = Recorder::default();
            let mut ctx = FieldLineContext::new(
                FieldSectionPrefix::default(),
                &table,
                &mut size,
            );

            let mut r = LiteralNameReader::new();
            r.configure(buf[0]);

            for chunk in chunks {
                assert_eq!(drive(&mut r, chunk, &mut ctx, &mut cb), Ok(false));
            }

            assert_eq!(drive(&mut r, &buf[16..], &mut ctx, &mut cb), Ok(true));

            assert_eq!(cb.events, vec![Event::LiteralName {
                name: b"custom-key".to_vec(),
                name_huffman: true,
                value: b"custom-value".to_vec(),
                value_huffman: true,
                hide_intermediary: true,
            }]);
        });
    }

    #[test]
    fn empty_name_and_value() {
        let table = Table::new(0);
        let mut size = SectionSize::new(u64::MAX);
        let mut cb = Recorder::default();

        let mut ctx = FieldLineContext::new(
            FieldSectionPrefix::default(),
            &table,
            &mut size,
        );

        let mut r = LiteralNameReader::new();
        r.configure(0x20);

        assert_eq!(drive(&mut r, &[0x20, 0x00], &mut ctx, &mut cb), Ok(true));

        assert_eq!(cb.events, vec![Event::LiteralName {
            name: vec![],
            name_huffman: false,
            value: vec![],
            value_huffman: false,
            hide_intermediary: false,
        }]);
    }

    #[test]
    fn section_size() {
        let table = Table::new(0);
        let mut cb = Recorder::default();

        let mut size = SectionSize::new(40);

        let mut ctx = FieldLineContext::new(
            FieldSectionPrefix::default(),
            &table,
            &mut size,
        );

        // The name fits the budget, but the value can't. The value is
        // rejected from its length, and reported like an oversized field.
        let buf = field_line(b"name", &[b'v'; 37], 0x20);

        let mut r = LiteralNameReader::new();
        r.configure(buf[0]);

        assert_eq!(
            drive(&mut r, &buf, &mut ctx, &mut cb),
            Err(Error::HeaderListTooLarge)
        );
        assert_eq!(cb.events, vec![Event::Error(Error::HeaderListTooLarge)]);

        // The name alone is over the budget.
        let buf = field_line(&[b'n'; 41], b"", 0x20);

        cb.events.clear();
        r.configure(buf[0]);

        assert_eq!(
            drive(&mut r, &buf, &mut ctx, &mut cb),
            Err(Error::HeaderListTooLarge)
        );
        assert_eq!(cb.events, vec![Event::Error(Error::HeaderListTooLarge)]);

        // Both fit, the field doesn't.
        cb.events.clear();
        let buf = field_line(b"name", b"value", 0x20);

        r.configure(buf[0]);

        assert_eq!(
            drive(&mut r, &buf, &mut ctx, &mut cb),
            Err(Error::HeaderListTooLarge)
        );
        assert_eq!(cb.events, vec![Event::Error(Error::HeaderListTooLarge)]);
    }

    #[test]
    fn invalid_huffman_name() {
        let table = Table::new(0);
        let mut size = SectionSize::new(u64::MAX);
        let mut cb = Recorder::default();

        let mut ctx = FieldLineContext::new(
            FieldSectionPrefix::default(),
            &table,
            &mut size,
        );

        // A single byte of padding that isn't all ones.
        let mut r = LiteralNameReader::new();
        r.configure(0x29);

        assert_eq!(
            drive(&mut r, &[0x29, 0x00], &mut ctx, &mut cb),
            Err(Error::InvalidHuffmanEncoding)
        );
    }
}
