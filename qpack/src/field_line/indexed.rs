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

/// Reads indexed field lines.
///
/// ```text
///   0   1   2   3   4   5   6   7
/// +---+---+---+---+---+---+---+---+
/// | 1 | T |      Index (6+)       |
/// +---+---+-----------------------+
/// ```
///
/// and, with a post-base index:
///
/// ```text
///   0   1   2   3   4   5   6   7
/// +---+---+---+---+---+---+---+---+
/// | 0 | 0 | 0 | 1 |  Index (4+)   |
/// +---+---+---+---+---------------+
/// ```
#[derive(Debug, Default)]
pub struct IndexedReader {
    from_static_table: bool,
    post_base: bool,
    index: IntegerReader,
}

impl IndexedReader {
    /// Creates a new reader.
    pub fn new() -> IndexedReader {
        IndexedReader::default()
    }

    /// Prepares the reader for an indexed field line starting with `first`.
    pub fn configure(&mut self, first: u8) {
        const STATIC: u8 = 0x40;

        self.from_static_table = first & STATIC == STATIC;
        self.post_base = false;
        self.index.configure(6);
    }

    /// Prepares the reader for an indexed field line with a post-base index.
    pub fn configure_post_base(&mut self) {
        self.from_static_table = false;
        self.post_base = true;
        self.index.configure(4);
    }

    /// Reads the field line from `b`.
    ///
    /// Returns `Ok(false)`, without invoking `cb`, until the whole field line
    /// has been read.
    pub fn read<C: DecodingCallback + ?Sized>(
        &mut self, b: &mut octets::Octets, ctx: &mut FieldLineContext,
        cb: &mut C,
    ) -> Result<bool> {
        if !self.index.read(b)? {
            return Ok(false);
        }

        let relative = self.index.get();

        let index =
            ctx.resolve_index(relative, self.from_static_table, self.post_base)?;

        trace!(
            "Indexed index={:?} relative={} post_base={}",
            index,
            relative,
            self.post_base
        );

        let (name, value) = ctx.lookup_field(index)?;

        ctx.check_section_size(header_size(name, value), cb)?;

        cb.on_indexed(index, name, value);

        self.reset();

        Ok(true)
    }

    /// Clears all state.
    pub fn reset(&mut self) {
        self.from_static_table = false;
        self.post_base = false;
        self.index.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::testing::encode_int;
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

    fn read_one(
        buf: &[u8], prefix: FieldSectionPrefix, table: &Table,
        size: &mut SectionSize, cb: &mut Recorder,
    ) -> Result<bool> {
        let mut r = IndexedReader::new();

        if buf[0] & 0x80 == 0x80 {
            r.configure(buf[0]);
        } else {
            r.configure_post_base();
        }

        let mut ctx = FieldLineContext::new(prefix, table, size);
        let mut b = octets::Octets::with_slice(buf);

        r.read(&mut b, &mut ctx, cb)
    }

    #[test]
    fn static_entry() {
        let table = Table::new(0);
        let mut size = SectionSize::new(u64::MAX);
        let mut cb = Recorder::default();

        let prefix = FieldSectionPrefix::default();

        assert_eq!(
            read_one(&[0xd1], prefix, &table, &mut size, &mut cb),
            Ok(true)
        );

        assert_eq!(cb.events, vec![Event::Indexed {
            index: TableIndex::Static(17),
            name: b":method".to_vec(),
            value: b"GET".to_vec(),
        }]);

        assert_eq!(size.used(), 7 + 3 + 32);
    }

    #[test]
    fn dynamic_entries() {
        let table = table();
        let mut size = SectionSize::new(u64::MAX);
        let mut cb = Recorder::default();

        // Required Insert Count = 4, Base = 4.
        let prefix = FieldSectionPrefix::new(4, 4);

        // Relative index 0 is Base - 1.
        assert_eq!(
            read_one(&[0x80], prefix, &table, &mut size, &mut cb),
            Ok(true)
        );
        assert_eq!(
            read_one(&[0x81], prefix, &table, &mut size, &mut cb),
            Ok(true)
        );

        assert_eq!(cb.events, vec![
            Event::Indexed {
                index: TableIndex::Dynamic(3),
                name: b":authority".to_vec(),
                value: b"www.example.com".to_vec(),
            },
            Event::Indexed {
                index: TableIndex::Dynamic(2),
                name: b"custom-key".to_vec(),
                value: b"custom-value".to_vec(),
            },
        ]);
    }

    #[test]
    fn post_base_entry() {
        let table = table();
        let mut size = SectionSize::new(u64::MAX);
        let mut cb = Recorder::default();

        // Required Insert Count = 2, Base = 0.
        let prefix = FieldSectionPrefix::new(2, 0);

        assert_eq!(
            read_one(&[0x11], prefix, &table, &mut size, &mut cb),
            Ok(true)
        );

        assert_eq!(cb.events, vec![Event::Indexed {
            index: TableIndex::Dynamic(1),
            name: b":path".to_vec(),
            value: b"/sample/path".to_vec(),
        }]);
    }

    #[test]
    fn large_static_index() {
        let table = Table::new(0);
        let mut size = SectionSize::new(u64::MAX);
        let mut cb = Recorder::default();

        // Needs a continuation byte.
        let encoded = encode_int(98, 0xc0, 6);
        assert_eq!(encoded.len(), 2);

        let mut r = IndexedReader::new();
        r.configure(encoded[0]);

        let mut ctx = FieldLineContext::new(
            FieldSectionPrefix::default(),
            &table,
            &mut size,
        );

        let mut b = octets::Octets::with_slice(&encoded[..1]);
        assert_eq!(r.read(&mut b, &mut ctx, &mut cb), Ok(false));
        assert!(cb.events.is_empty());

        let mut b = octets::Octets::with_slice(&encoded[1..]);
        assert_eq!(r.read(&mut b, &mut ctx, &mut cb), Ok(true));

        assert_eq!(cb.events, vec![Event::Indexed {
            index: TableIndex::Static(98),
            name: b"x-frame-options".to_vec(),
            value: b"sameorigin".to_vec(),
        }]);
    }

    #[test]
    fn out_of_range() {
        let mut table = Table::new(200);

        // Same instructions, with a capacity of 200: entry 0 gets evicted.
        let mut stream = ENCODER_STREAM.to_vec();
        stream[1] = 0xa9;
        stream.extend_from_slice(&ENCODER_STREAM_2);
        table.control(&stream).unwrap();

        let mut size = SectionSize::new(u64::MAX);
        let mut cb = Recorder::default();

        let prefix = FieldSectionPrefix::new(4, 4);

        // Absolute index 0 was evicted.
        assert_eq!(
            read_one(&[0x83], prefix, &table, &mut size, &mut cb),
            Err(Error::InvalidDynamicTableIndex)
        );

        // Before the start of the table.
        assert_eq!(
            read_one(&[0x84], prefix, &table, &mut size, &mut cb),
            Err(Error::InvalidDynamicTableIndex)
        );

        // Past the end of the static table.
        let encoded = encode_int(99, 0xc0, 6);
        assert_eq!(
            read_one(&encoded, prefix, &table, &mut size, &mut cb),
            Err(Error::InvalidStaticTableIndex)
        );

        assert!(cb.events.is_empty());
        assert_eq!(size.used(), 0);
    }

    #[test]
    fn size_limit() {
        let table = Table::new(0);
        let mut cb = Recorder::default();

        // `:method: GET` is 42 bytes.
        let mut size = SectionSize::new(84);

        let prefix = FieldSectionPrefix::default();

        assert_eq!(
            read_one(&[0xd1], prefix, &table, &mut size, &mut cb),
            Ok(true)
        );
        assert_eq!(
            read_one(&[0xd1], prefix, &table, &mut size, &mut cb),
            Ok(true)
        );
        assert_eq!(size.used(), 84);

        assert_eq!(
            read_one(&[0xd1], prefix, &table, &mut size, &mut cb),
            Err(Error::HeaderListTooLarge)
        );

        assert_eq!(cb.events.len(), 3);
        assert_eq!(cb.events[2], Event::Error(Error::HeaderListTooLarge));
    }

    #[test]
    fn reset_matches_fresh_reader() {
        let table = table();
        let mut size = SectionSize::new(u64::MAX);
        let mut cb = Recorder::default();

        let mut r = IndexedReader::new();
        let mut ctx = FieldLineContext::new(
            FieldSectionPrefix::new(4, 4),
            &table,
            &mut size,
        );

        // Static, with an incomplete index.
        r.configure(0xff);
        let mut b = octets::Octets::with_slice(&[0xff]);
        assert_eq!(r.read(&mut b, &mut ctx, &mut cb), Ok(false));

        r.reset();

        // Dynamic, relative index 0.
        r.configure(0x80);
        let mut b = octets::Octets::with_slice(&[0x80]);
        assert_eq!(r.read(&mut b, &mut ctx, &mut cb), Ok(true));

        assert_eq!(cb.events, vec![Event::Indexed {
            index: TableIndex::Dynamic(3),
            name: b":authority".to_vec(),
            value: b"www.example.com".to_vec(),
        }]);
    }
}
