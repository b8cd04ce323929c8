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
use crate::IntegerReader;
use crate::Result;
use crate::StringReader;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
enum State {
    #[default]
    AwaitingIndex,
    AwaitingValue,
}

/// Reads literal field lines with a name reference.
///
/// ```text
///   0   1   2   3   4   5   6   7
/// +---+---+---+---+---+---+---+---+
/// | 0 | 1 | N | T |Name Index (4+)|
/// +---+---+---+---+---------------+
/// | H |     Value Length (7+)     |
/// +---+---------------------------+
/// |  Value String (Length bytes)  |
/// +-------------------------------+
/// ```
///
/// The post-base form replaces the first byte with `0000 N III`.
///
/// Reading happens in two stages. Once the name index is complete, `read()`
/// returns `Ok(false)` even if more input is available; the next call starts
/// reading the value.
#[derive(Debug, Default)]
pub struct NameReferenceReader {
    state: State,

    from_static_table: bool,
    post_base: bool,
    hide_intermediary: bool,

    name_index: u64,

    index: IntegerReader,
    value_reader: StringReader,
    value: Vec<u8>,
}

impl NameReferenceReader {
    /// Creates a new reader.
    pub fn new() -> NameReferenceReader {
        NameReferenceReader::default()
    }

    /// Prepares the reader for a field line starting with `first`.
    pub fn configure(&mut self, first: u8) {
        const NEVER_INDEXED: u8 = 0x20;
        const STATIC: u8 = 0x10;

        self.reset();

        self.hide_intermediary = first & NEVER_INDEXED == NEVER_INDEXED;
        self.from_static_table = first & STATIC == STATIC;
        self.index.configure(4);
    }

    /// Prepares the reader for a field line with a post-base name index.
    pub fn configure_post_base(&mut self, first: u8) {
        const NEVER_INDEXED: u8 = 0x08;

        self.reset();

        self.hide_intermediary = first & NEVER_INDEXED == NEVER_INDEXED;
        self.post_base = true;
        self.index.configure(3);
    }

    /// Reads the field line from `b`.
    pub fn read<C: DecodingCallback + ?Sized>(
        &mut self, b: &mut octets::Octets, ctx: &mut FieldLineContext,
        cb: &mut C,
    ) -> Result<bool> {
        match self.state {
            State::AwaitingIndex => {
                if !self.index.read(b)? {
                    return Ok(false);
                }

                self.name_index = self.index.get();

                self.value_reader.configure(7);
                self.value_reader.set_max_len(ctx.remaining_section_size());

                self.state = State::AwaitingValue;

                Ok(false)
            },

            State::AwaitingValue => {
                let value_reader = &mut self.value_reader;

                if !ctx.read_string(value_reader, b, &mut self.value, cb)? {
                    return Ok(false);
                }

                let index = ctx.resolve_index(
                    self.name_index,
                    self.from_static_table,
                    self.post_base,
                )?;

                let huffman = self.value_reader.is_huffman_encoded();

                trace!(
                    "LiteralWithNameRef index={:?} huffman={} hide={} value={:?}",
                    index,
                    huffman,
                    self.hide_intermediary,
                    std::str::from_utf8(&self.value)
                );

                let (name, _) = ctx.lookup_field(index)?;

                ctx.check_section_size(header_size(name, &self.value), cb)?;

                cb.on_literal_with_name_reference(
                    index,
                    name,
                    &self.value,
                    huffman,
                    self.hide_intermediary,
                );

                self.reset();

                Ok(true)
            },
        }
    }

    /// Clears all state.
    pub fn reset(&mut self) {
        self.state = State::AwaitingIndex;
        self.from_static_table = false;
        self.post_base = false;
        self.hide_intermediary = false;
        self.name_index = 0;
        self.index.reset();
        self.value_reader.reset();
        self.value.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::testing::encode_int;
    use crate::testing::encode_str;
    use crate::testing::for_each_split;
    use crate::testing::Event;
    use crate::testing::Recorder;
    use crate::testing::ENCODER_STREAM;
    use crate::testing::ENCODER_STREAM_2;
    use crate::Error;
    use crate::FieldSectionPrefix;
    use crate::SectionSize;
    use crate::Table;
    use crate::TableIndex;

    fn table() -> Table {
        let mut table = Table::new(300);
        table.control(&ENCODER_STREAM).unwrap();
        table.control(&ENCODER_STREAM_2).unwrap();
        table
    }

    // Drives the reader the way the decoder does, invoking it again as long
    // as input is left.
    fn drive(
        r: &mut NameReferenceReader, buf: &[u8], ctx: &mut FieldLineContext,
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

        // :path=/index.html, static name index 1.
        let mut buf = vec![0x51];
        buf.extend_from_slice(&encode_str(b"/index.html", 0x00, 7));

        let mut r = NameReferenceReader::new();
        r.configure(buf[0]);

        let mut b = octets::Octets::with_slice(&buf);

        // The index is complete, but the value was not started yet.
        assert_eq!(r.read(&mut b, &mut ctx, &mut cb), Ok(false));
        assert_eq!(b.off(), 1);
        assert!(cb.events.is_empty());

        assert_eq!(r.read(&mut b, &mut ctx, &mut cb), Ok(true));
        assert_eq!(b.cap(), 0);

        assert_eq!(cb.events, vec![Event::NameReference {
            index: TableIndex::Static(1),
            name: b":path".to_vec(),
            value: b"/index.html".to_vec(),
            huffman: false,
            hide_intermediary: false,
        }]);
    }

    #[test]
    fn fragmented() {
        let table = Table::new(0);

        // Never indexed, static name index 44 (content-type), Huffman value.
        let mut buf = encode_int(44, 0x70, 4);
        buf.extend_from_slice(&[
            0x8c, 0xf1, 0xe3, 0xc2, 0xe5, 0xf2, 0x3a, 0x6b, 0xa0, 0xab, 0x90,
            0xf4, 0xff,
        ]);

        for_each_split(&buf, |chunks| {
            let mut size = SectionSize::new(u64::MAX);
            let mut cb = Recorder::default();
            let mut ctx = FieldLineContext::new(
                FieldSectionPrefix::default(),
                &table,
                &mut size,
            );

            let mut r = NameReferenceReader::new();
            r.configure(chunks[0][0]);

            let (last, init) = chunks.split_last().unwrap();

            for chunk in init {
                assert_eq!(drive(&mut r, chunk, &mut ctx, &mut cb), Ok(false));
                assert!(cb.events.is_empty());
            }

            assert_eq!(drive(&mut r, last, &mut ctx, &mut cb), Ok(true));

            assert_eq!(cb.events, vec![Event::NameReference {
                index: TableIndex::Static(44),
                name: b"content-type".to_vec(),
                value: b"www.example.com".to_vec(),
                huffman: true,
                hide_intermediary: true,
            }]);
        });
    }

    #[test]
    fn dynamic_name() {
        let table = table();
        let mut size = SectionSize::new(u64::MAX);
        let mut cb = Recorder::default();

        // Required Insert Count = 4, Base = 5.
        let mut ctx = FieldLineContext::new(
            FieldSectionPrefix::new(4, 5),
            &table,
            &mut size,
        );

        // Relative index 2 is absolute index 2.
        let mut buf = vec![0x42];
        buf.extend_from_slice(&encode_str(b"other", 0x00, 7));

        let mut r = NameReferenceReader::new();
        r.configure(buf[0]);

        assert_eq!(drive(&mut r, &buf, &mut ctx, &mut cb), Ok(true));

        assert_eq!(cb.events, vec![Event::NameReference {
            index: TableIndex::Dynamic(2),
            name: b"custom-key".to_vec(),
            value: b"other".to_vec(),
            huffman: false,
            hide_intermediary: false,
        }]);

        assert_eq!(size.used(), 10 + 5 + 32);
    }

    #[test]
    fn post_base_name() {
        let table = table();
        let mut size = SectionSize::new(u64::MAX);
        let mut cb = Recorder::default();

        let mut ctx = FieldLineContext::new(
            FieldSectionPrefix::new(4, 2),
            &table,
            &mut size,
        );

        // Never indexed, post-base index 1 is absolute index 3.
        let mut buf = vec![0x09];
        buf.extend_from_slice(&encode_str(b"example.org", 0x00, 7));

        let mut r = NameReferenceReader::new();
        r.configure_post_base(buf[0]);

        assert_eq!(drive(&mut r, &buf, &mut ctx, &mut cb), Ok(true));

        assert_eq!(cb.events, vec![Event::NameReference {
            index: TableIndex::Dynamic(3),
            name: b":authority".to_vec(),
            value: b"example.org".to_vec(),
            huffman: false,
            hide_intermediary: true,
        }]);
    }

    #[test]
    fn evicted_name() {
        let mut table = Table::new(200);

        let mut stream = ENCODER_STREAM.to_vec();
        stream[1] = 0xa9;
        stream.extend_from_slice(&ENCODER_STREAM_2);
        table.control(&stream).unwrap();

        let mut size = SectionSize::new(u64::MAX);
        let mut cb = Recorder::default();

        let mut ctx = FieldLineContext::new(
            FieldSectionPrefix::new(4, 4),
            &table,
            &mut size,
        );

        // Relative index 3 is absolute index 0, which was evicted.
        let mut buf = vec![0x43];
        buf.extend_from_slice(&encode_str(b"x", 0x00, 7));

        let mut r = NameReferenceReader::new();
        r.configure(buf[0]);

        assert_eq!(
            drive(&mut r, &buf, &mut ctx, &mut cb),
            Err(Error::InvalidDynamicTableIndex)
        );

        assert!(cb.events.is_empty());
        assert_eq!(size.used(), 0);
    }

    #[test]
    fn value_bounded_by_section_size() {
        let table = Table::new(0);
        let mut size = SectionSize::new(64);
        let mut cb = Recorder::default();

        let mut ctx = FieldLineContext::new(
            FieldSectionPrefix::default(),
            &table,
            &mut size,
        );

        // Only the announced length is available, the value is rejected
        // before being buffered and the failure is reported.
        let buf = encode_int(100, 0x00, 7);

        let mut r = NameReferenceReader::new();
        r.configure(0x51);

        assert_eq!(drive(&mut r, &[0x51], &mut ctx, &mut cb), Ok(false));
        assert_eq!(
            drive(&mut r, &buf, &mut ctx, &mut cb),
            Err(Error::HeaderListTooLarge)
        );
        assert_eq!(cb.events, vec![Event::Error(Error::HeaderListTooLarge)]);
    }

    #[test]
    fn section_size_counts_new_value() {
        let table = Table::new(0);
        let mut cb = Recorder::default();

        // `:path` plus a 10 bytes value, one byte short.
        let mut size = SectionSize::new(5 + 10 + 32 - 1);

        let mut ctx = FieldLineContext::new(
            FieldSectionPrefix::default(),
            &table,
            &mut size,
        );

        let mut buf = vec![0x51];
        buf.extend_from_slice(&encode_str(b"0123456789", 0x00, 7));

        let mut r = NameReferenceReader::new();
        r.configure(buf[0]);

        assert_eq!(
            drive(&mut r, &buf, &mut ctx, &mut cb),
            Err(Error::HeaderListTooLarge)
        );

        assert_eq!(cb.events, vec![Event::Error(Error::HeaderListTooLarge)]);
    }

    #[test]
    fn reset_matches_fresh_reader() {
        let table = Table::new(0);
        let mut size = SectionSize::new(u64::MAX);
        let mut cb = Recorder::default();

        let mut ctx = FieldLineContext::new(
            FieldSectionPrefix::default(),
            &table,
            &mut size,
        );

        let mut r = NameReferenceReader::new();

        // Abandon a field line in the middle of its value.
        let mut partial = vec![0x7f, 0x10];
        partial.extend_from_slice(&encode_int(20, 0x00, 7));
        partial.extend_from_slice(b"abc");

        r.configure(partial[0]);
        assert_eq!(drive(&mut r, &partial, &mut ctx, &mut cb), Ok(false));

        r.reset();

        let mut buf = vec![0x51];
        buf.extend_from_slice(&encode_str(b"/", 0x00, 7));

        r.configure(buf[0]);
        assert_eq!(drive(&mut r, &buf, &mut ctx, &mut cb), Ok(true));

        assert_eq!(cb.events, vec![Event::NameReference {
            index: TableIndex::Static(1),
            name: b":path".to_vec(),
            value: b"/".to_vec(),
            huffman: false,
            hide_intermediary: false,
        }]);
    }
}
