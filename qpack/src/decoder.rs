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

use super::Config;
use super::DecodingCallback;
use super::DynamicTable;
use super::Error;
use super::FieldLineContext;
use super::FieldSectionPrefix;
use super::Header;
use super::HeaderList;
use super::IndexedReader;
use super::LiteralNameReader;
use super::NameReferenceReader;
use super::PrefixReader;
use super::Result;
use super::SectionSize;

use super::INDEXED;
use super::INDEXED_WITH_POST_BASE;
use super::LITERAL;
use super::LITERAL_WITH_NAME_REF;

#[derive(Clone, Copy, Debug, PartialEq)]
enum Representation {
    Indexed,
    IndexedWithPostBase,
    Literal,
    LiteralWithNameRef,
    LiteralWithPostBase,
}

impl Representation {
    pub fn from_byte(b: u8) -> Representation {
        if b & INDEXED == INDEXED {
            return Representation::Indexed;
        }

        if b & LITERAL_WITH_NAME_REF == LITERAL_WITH_NAME_REF {
            return Representation::LiteralWithNameRef;
        }

        if b & LITERAL == LITERAL {
            return Representation::Literal;
        }

        if b & INDEXED_WITH_POST_BASE == INDEXED_WITH_POST_BASE {
            return Representation::IndexedWithPostBase;
        }

        Representation::LiteralWithPostBase
    }
}

/// A resumable QPACK field section decoder.
///
/// A decoder handles one field section at a time. The section is passed to
/// [`decode()`] in as many chunks as needed, and terminated with
/// [`finish()`]. The same decoder can then be used for the next section.
///
/// Any error aborts the current section, and leaves the decoder ready for a
/// new one.
///
/// [`decode()`]: struct.Decoder.html#method.decode
/// [`finish()`]: struct.Decoder.html#method.finish
pub struct Decoder {
    prefix_reader: PrefixReader,
    prefix: Option<FieldSectionPrefix>,

    section_size: SectionSize,

    indexed: IndexedReader,
    name_ref: NameReferenceReader,
    literal: LiteralNameReader,

    current: Option<Representation>,
}

impl Decoder {
    /// Creates a new decoder enforcing the limits of `config`.
    pub fn new(config: &Config) -> Decoder {
        Decoder {
            prefix_reader: PrefixReader::new(),
            prefix: None,

            section_size: SectionSize::new(config.max_field_section_size()),

            indexed: IndexedReader::new(),
            name_ref: NameReferenceReader::new(),
            literal: LiteralNameReader::new(),

            current: None,
        }
    }

    /// Decodes the next chunk of a field section.
    ///
    /// Fields are passed to `cb` as soon as their representation is
    /// complete. A representation split across chunks is kept until the
    /// following chunks complete it.
    ///
    /// Fails with [`Error::DynamicTableWouldBlock`] if the section refers to
    /// dynamic table entries that `table` doesn't have yet. It's up to the
    /// caller to buffer the section until the table catches up.
    ///
    /// [`Error::DynamicTableWouldBlock`]: enum.Error.html#variant.DynamicTableWouldBlock
    pub fn decode<C: DecodingCallback + ?Sized>(
        &mut self, buf: &[u8], table: &dyn DynamicTable, cb: &mut C,
    ) -> Result<()> {
        let res = self.decode_chunk(buf, table, cb);

        if let Err(e) = res {
            trace!("Field section aborted err={e:?}");

            self.reset();
        }

        res
    }

    fn decode_chunk<C: DecodingCallback + ?Sized>(
        &mut self, buf: &[u8], table: &dyn DynamicTable, cb: &mut C,
    ) -> Result<()> {
        let mut b = octets::Octets::with_slice(buf);

        let prefix = match self.prefix {
            Some(v) => v,

            None => {
                if !self.prefix_reader.read(&mut b, table)? {
                    return Ok(());
                }

                let prefix = self.prefix_reader.get();

                trace!(
                    "Header count={} base={}",
                    prefix.required_insert_count(),
                    prefix.base()
                );

                if prefix.required_insert_count() > table.insert_count() {
                    return Err(Error::DynamicTableWouldBlock);
                }

                self.prefix = Some(prefix);

                prefix
            },
        };

        let mut ctx =
            FieldLineContext::new(prefix, table, &mut self.section_size);

        while b.cap() > 0 {
            let repr = match self.current {
                Some(v) => v,

                None => {
                    let first = b.peek_u8()?;
                    let repr = Representation::from_byte(first);

                    match repr {
                        Representation::Indexed => self.indexed.configure(first),

                        Representation::IndexedWithPostBase =>
                            self.indexed.configure_post_base(),

                        Representation::Literal => self.literal.configure(first),

                        Representation::LiteralWithNameRef =>
                            self.name_ref.configure(first),

                        Representation::LiteralWithPostBase =>
                            self.name_ref.configure_post_base(first),
                    }

                    self.current = Some(repr);

                    repr
                },
            };

            let done = match repr {
                Representation::Indexed | Representation::IndexedWithPostBase =>
                    self.indexed.read(&mut b, &mut ctx, cb)?,

                Representation::Literal =>
                    self.literal.read(&mut b, &mut ctx, cb)?,

                Representation::LiteralWithNameRef |
                Representation::LiteralWithPostBase =>
                    self.name_ref.read(&mut b, &mut ctx, cb)?,
            };

            if done {
                self.current = None;
            }
        }

        Ok(())
    }

    /// Ends the current field section.
    ///
    /// Returns the section's prefix, which tells whether the section must be
    /// acknowledged to the peer. Fails with [`Error::BufferTooShort`] if the
    /// prefix or a field line was left incomplete.
    ///
    /// The decoder is reset either way.
    ///
    /// [`Error::BufferTooShort`]: enum.Error.html#variant.BufferTooShort
    pub fn finish(&mut self) -> Result<FieldSectionPrefix> {
        let res = match self.prefix {
            Some(prefix) if self.current.is_none() => Ok(prefix),

            _ => Err(Error::BufferTooShort),
        };

        trace!(
            "Field section finished size={} res={:?}",
            self.section_size.used(),
            res
        );

        self.reset();

        res
    }

    /// Returns the prefix of the section being decoded, once it was read.
    pub fn prefix(&self) -> Option<FieldSectionPrefix> {
        self.prefix
    }

    /// Decodes a complete field section held in `buf`.
    pub fn decode_section(
        &mut self, buf: &[u8], table: &dyn DynamicTable,
    ) -> Result<Vec<Header>> {
        let mut headers = HeaderList::new();

        self.decode(buf, table, &mut headers)?;
        self.finish()?;

        Ok(headers.into_headers())
    }

    /// Abandons the current field section.
    pub fn reset(&mut self) {
        self.prefix_reader.reset();
        self.prefix = None;
        self.section_size.reset();
        self.indexed.reset();
        self.name_ref.reset();
        self.literal.reset();
        self.current = None;
    }
}
