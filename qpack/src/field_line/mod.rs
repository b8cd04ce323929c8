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

//! Field line representations (RFC 9204, Section 4.5).
//!
//! Each representation has its own long-lived reader. A reader is configured
//! with the first byte of a field line, then driven with as many buffers as
//! needed until it reports completion, at which point it has invoked the
//! [`DecodingCallback`] and reset itself for the next field line.
//!
//! Readers of the same field section share a [`FieldLineContext`], which
//! translates wire indices into table entries and keeps track of the decoded
//! size of the section.
//!
//! [`DecodingCallback`]: trait.DecodingCallback.html
//! [`FieldLineContext`]: struct.FieldLineContext.html

use super::static_table;
use super::DynamicTable;
use super::Error;
use super::FieldSectionPrefix;
use super::Header;
use super::NameValue;
use super::Result;
use super::StringReader;

/// Identifies the table entry a field line refers to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TableIndex {
    /// An index into the static table.
    Static(u64),

    /// An absolute index into the dynamic table.
    Dynamic(u64),
}

impl TableIndex {
    /// Returns the absolute index, regardless of the table.
    pub fn absolute(&self) -> u64 {
        match *self {
            TableIndex::Static(i) => i,
            TableIndex::Dynamic(i) => i,
        }
    }

    /// Returns true if the index refers to the static table.
    pub fn is_static(&self) -> bool {
        matches!(self, TableIndex::Static(_))
    }
}

/// Receives decoded field lines.
///
/// Names and values are only borrowed for the duration of the call.
pub trait DecodingCallback {
    /// Called for an indexed field line.
    fn on_indexed(&mut self, index: TableIndex, name: &[u8], value: &[u8]);

    /// Called for a literal field line with a name reference.
    ///
    /// `huffman` tells whether the value was Huffman-encoded, and
    /// `hide_intermediary` whether the field must not be added to a dynamic
    /// table by intermediaries (the `N` bit).
    fn on_literal_with_name_reference(
        &mut self, index: TableIndex, name: &[u8], value: &[u8], huffman: bool,
        hide_intermediary: bool,
    );

    /// Called for a literal field line with a literal name.
    fn on_literal_with_literal_name(
        &mut self, name: &[u8], name_huffman: bool, value: &[u8],
        value_huffman: bool, hide_intermediary: bool,
    );

    /// Called when decoding fails because of the field section size limit,
    /// right before the error is returned.
    fn on_error(&mut self, _err: Error) {}
}

/// A callback collecting decoded fields as a list of headers.
#[derive(Clone, Debug, Default)]
pub struct HeaderList {
    headers: Vec<Header>,
}

impl HeaderList {
    /// Creates an empty list.
    pub fn new() -> HeaderList {
        HeaderList::default()
    }

    /// Returns the number of collected headers.
    pub fn len(&self) -> usize {
        self.headers.len()
    }

    /// Returns true if no header was collected.
    pub fn is_empty(&self) -> bool {
        self.headers.is_empty()
    }

    /// Returns the collected headers.
    pub fn headers(&self) -> &[Header] {
        &self.headers
    }

    /// Consumes the list, returning the collected headers.
    pub fn into_headers(self) -> Vec<Header> {
        self.headers
    }
}

impl DecodingCallback for HeaderList {
    fn on_indexed(&mut self, _index: TableIndex, name: &[u8], value: &[u8]) {
        self.headers.push(Header::new(name, value));
    }

    fn on_literal_with_name_reference(
        &mut self, _index: TableIndex, name: &[u8], value: &[u8], _huffman: bool,
        _hide_intermediary: bool,
    ) {
        self.headers.push(Header::new(name, value));
    }

    fn on_literal_with_literal_name(
        &mut self, name: &[u8], _name_huffman: bool, value: &[u8],
        _value_huffman: bool, _hide_intermediary: bool,
    ) {
        self.headers.push(Header::new(name, value));
    }
}

/// Running total of the decoded size of a field section.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SectionSize {
    max: u64,
    used: u64,
}

impl SectionSize {
    /// Creates a counter enforcing the given limit.
    pub fn new(max: u64) -> SectionSize {
        SectionSize { max, used: 0 }
    }

    /// Adds `size` to the total, failing if the total would exceed the limit.
    ///
    /// The total is left unchanged on failure.
    pub fn add(&mut self, size: u64) -> Result<()> {
        let used = self
            .used
            .checked_add(size)
            .filter(|&used| used <= self.max)
            .ok_or(Error::HeaderListTooLarge)?;

        self.used = used;

        Ok(())
    }

    /// Returns the total so far.
    pub fn used(&self) -> u64 {
        self.used
    }

    /// Returns how much can still be added.
    pub fn remaining(&self) -> u64 {
        self.max - self.used
    }

    /// Starts over for a new field section.
    pub fn reset(&mut self) {
        self.used = 0;
    }
}

/// State shared by the field line readers of a single field section.
pub struct FieldLineContext<'a> {
    prefix: FieldSectionPrefix,
    table: &'a dyn DynamicTable,
    section_size: &'a mut SectionSize,
}

impl<'a> FieldLineContext<'a> {
    /// Creates a context for decoding the section with the given prefix.
    pub fn new(
        prefix: FieldSectionPrefix, table: &'a dyn DynamicTable,
        section_size: &'a mut SectionSize,
    ) -> FieldLineContext<'a> {
        FieldLineContext {
            prefix,
            table,
            section_size,
        }
    }

    /// Translates an index read from the wire into a table index.
    ///
    /// Relative dynamic indices count down from `base - 1`, post-base ones
    /// count up from `base`. Either way, the entry must have been inserted
    /// before the section's Required Insert Count.
    pub fn resolve_index(
        &self, index: u64, from_static_table: bool, post_base: bool,
    ) -> Result<TableIndex> {
        if from_static_table {
            return Ok(TableIndex::Static(index));
        }

        let base = self.prefix.base();

        let absolute = if post_base {
            base.checked_add(index)
        } else {
            index.checked_add(1).and_then(|i| base.checked_sub(i))
        }
        .ok_or(Error::InvalidDynamicTableIndex)?;

        if absolute >= self.prefix.required_insert_count() {
            return Err(Error::InvalidDynamicTableIndex);
        }

        Ok(TableIndex::Dynamic(absolute))
    }

    /// Returns the name and value of the entry at `index`.
    pub fn lookup_field(
        &self, index: TableIndex,
    ) -> Result<(&'a [u8], &'a [u8])> {
        match index {
            TableIndex::Static(i) => static_table::lookup(i),

            TableIndex::Dynamic(i) => {
                let field = self.table.get(i)?;

                Ok((field.name(), field.value()))
            },
        }
    }

    /// Accounts for a decoded field of the given size.
    ///
    /// If the section limit is exceeded, `cb` is notified and the error is
    /// returned; no field callback must be invoked for that field.
    pub fn check_section_size<C: DecodingCallback + ?Sized>(
        &mut self, size: u64, cb: &mut C,
    ) -> Result<()> {
        if let Err(e) = self.section_size.add(size) {
            trace!(
                "Field section too large used={} size={}",
                self.section_size.used(),
                size
            );

            cb.on_error(e);

            return Err(e);
        }

        Ok(())
    }

    /// Reads a string literal with `reader`, appending it to `out`.
    ///
    /// The reader's length limit counts towards the section limit, so a
    /// string that is too long is reported to `cb` the same way as an
    /// oversized field.
    pub fn read_string<C: DecodingCallback + ?Sized>(
        &self, reader: &mut StringReader, b: &mut octets::Octets,
        out: &mut Vec<u8>, cb: &mut C,
    ) -> Result<bool> {
        match reader.read(b, out) {
            Err(Error::HeaderListTooLarge) => {
                trace!(
                    "String too large for field section used={} remaining={}",
                    self.section_size.used(),
                    self.section_size.remaining()
                );

                cb.on_error(Error::HeaderListTooLarge);

                Err(Error::HeaderListTooLarge)
            },

            res => res,
        }
    }

    /// Returns how many more bytes the section may grow by.
    pub fn remaining_section_size(&self) -> u64 {
        self.section_size.remaining()
    }
}

pub mod indexed;
pub mod literal;
pub mod name_ref;
