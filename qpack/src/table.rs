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

//! Header fields and the dynamic table (RFC 9204, Section 3.2).

use std::borrow::Cow;
use std::collections::VecDeque;

use super::static_table;
use super::Error;
use super::IntegerReader;
use super::NameValue;
use super::Result;
use super::StringReader;

use super::INSERT_WITH_LITERAL_NAME;
use super::INSERT_WITH_NAME_REF;
use super::SET_DYNAMIC_TABLE_CAPACITY;

/// The per-entry overhead counted towards table and field section sizes.
pub const ENTRY_OVERHEAD: u64 = 32;

/// Returns the size of a field as defined in RFC 9204, Section 3.2.1.
pub fn header_size(name: &[u8], value: &[u8]) -> u64 {
    name.len() as u64 + value.len() as u64 + ENTRY_OVERHEAD
}

/// A name-value pair stored in a QPACK table.
///
/// Names referenced from the static table are borrowed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HeaderField {
    name: Cow<'static, [u8]>,
    value: Cow<'static, [u8]>,
}

impl HeaderField {
    /// Creates a new field.
    pub fn new(
        name: impl Into<Cow<'static, [u8]>>, value: impl Into<Cow<'static, [u8]>>,
    ) -> HeaderField {
        HeaderField {
            name: name.into(),
            value: value.into(),
        }
    }

    /// Returns the size of the field, including the per-entry overhead.
    pub fn size(&self) -> u64 {
        header_size(&self.name, &self.value)
    }
}

impl NameValue for HeaderField {
    fn name(&self) -> &[u8] {
        &self.name
    }

    fn value(&self) -> &[u8] {
        &self.value
    }
}

/// Read access to a connection's dynamic table.
///
/// The decoder never modifies the table; insertions and evictions are driven
/// by the encoder stream, outside of field section decoding.
pub trait DynamicTable {
    /// Returns the entry with the given absolute index.
    ///
    /// Fails with [`Error::InvalidDynamicTableIndex`] if no such entry was
    /// inserted yet, or if it was already evicted.
    ///
    /// [`Error::InvalidDynamicTableIndex`]: enum.Error.html#variant.InvalidDynamicTableIndex
    fn get(&self, absolute_index: u64) -> Result<&HeaderField>;

    /// Returns the total number of insertions into the table.
    fn insert_count(&self) -> u64;

    /// Returns the maximum number of entries the table can hold, derived
    /// from its maximum capacity.
    fn max_entries(&self) -> u64;
}

/// A FIFO dynamic table fed by encoder stream instructions.
#[derive(Debug, Default)]
pub struct Table {
    entries: VecDeque<HeaderField>,

    /// The number of insertions into the table.
    insert_cnt: u64,

    /// The number of entries evicted from the table, which is also the
    /// absolute index of the oldest entry.
    evicted: u64,

    /// The sum of the sizes of all entries.
    size: u64,

    /// The current capacity requested by the peer.
    capacity: u64,

    /// The capacity limit imposed by settings.
    max_capacity: u64,

    /// Partial encoder stream instruction, kept until more data arrives.
    inner_buffer: Vec<u8>,
}

impl Table {
    /// Creates an empty table with the given capacity limit.
    ///
    /// The table starts with a capacity of zero, until the peer sets it.
    pub fn new(max_capacity: u64) -> Table {
        Table {
            max_capacity: max_capacity.min(u32::MAX as u64),
            ..Table::default()
        }
    }

    /// Returns the sum of the sizes of all entries.
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Returns the current capacity.
    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    /// Returns the number of entries currently in the table.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if the table holds no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Changes the capacity of the table, evicting entries as needed.
    pub fn set_capacity(&mut self, capacity: u64) -> Result<()> {
        if capacity > self.max_capacity {
            return Err(Error::DynamicTableTooBig);
        }

        self.capacity = capacity;

        while self.size > self.capacity {
            self.evict_one()?;
        }

        Ok(())
    }

    /// Inserts a new entry, evicting the oldest entries to make room.
    pub fn insert(&mut self, field: HeaderField) -> Result<()> {
        let size = field.size();

        if size > self.capacity {
            return Err(Error::DynamicTableTooBig);
        }

        while self.size + size > self.capacity {
            self.evict_one()?;
        }

        self.size += size;
        self.entries.push_back(field);
        self.insert_cnt += 1;

        trace!("Insert insert_cnt={} size={}", self.insert_cnt, self.size);

        Ok(())
    }

    /// Evict the oldest entry in the table
    fn evict_one(&mut self) -> Result<()> {
        let entry = self
            .entries
            .pop_front()
            .ok_or(Error::DynamicTableTooBig)?;

        self.size -= entry.size();
        self.evicted += 1;

        Ok(())
    }

    // Resolves an index relative to the most recent insertion, as used by
    // encoder stream instructions.
    fn get_relative(&self, index: u64) -> Result<&HeaderField> {
        let absolute = index
            .checked_add(1)
            .and_then(|i| self.insert_cnt.checked_sub(i))
            .ok_or(Error::InvalidDynamicTableIndex)?;

        self.get(absolute)
    }

    /// Processes instructions received on the peer's encoder stream.
    ///
    /// A trailing partial instruction is buffered and completed by the next
    /// call.
    pub fn control(&mut self, buf: &[u8]) -> Result<()> {
        let mut maybe_buf = Vec::new();

        let mut b = if !self.inner_buffer.is_empty() {
            std::mem::swap(&mut maybe_buf, &mut self.inner_buffer);
            maybe_buf.extend_from_slice(buf);
            octets::Octets::with_slice(maybe_buf.as_slice())
        } else {
            octets::Octets::with_slice(buf)
        };

        while b.cap() > 0 {
            let pos = b.off();

            match self.process_control(&mut b) {
                Ok(_) => (),

                Err(Error::BufferTooShort) => {
                    self.inner_buffer.extend_from_slice(&b.buf()[pos..]);
                    return Ok(());
                },

                Err(e) => return Err(e),
            }
        }

        Ok(())
    }

    fn process_control(&mut self, b: &mut octets::Octets) -> Result<()> {
        let first = b.peek_u8()?;

        if first & INSERT_WITH_NAME_REF == INSERT_WITH_NAME_REF {
            const STATIC: u8 = 0x40;

            let is_static = first & STATIC == STATIC;
            let index = decode_int(b, 6)?;
            let value = decode_str(b, 7, self.capacity)?;

            trace!(
                "InsertWithNameRef index={} static={} value={:?}",
                index,
                is_static,
                value
            );

            let name = if is_static {
                Cow::Borrowed(static_table::lookup(index)?.0)
            } else {
                Cow::Owned(self.get_relative(index)?.name().to_vec())
            };

            return self.insert(HeaderField::new(name, value));
        }

        if first & INSERT_WITH_LITERAL_NAME == INSERT_WITH_LITERAL_NAME {
            let name = decode_str(b, 5, self.capacity)?;
            let value = decode_str(b, 7, self.capacity)?;

            trace!("InsertWithLiteralName name={name:?} value={value:?}");

            return self.insert(HeaderField::new(name, value));
        }

        if first & SET_DYNAMIC_TABLE_CAPACITY == SET_DYNAMIC_TABLE_CAPACITY {
            let capacity = decode_int(b, 5)?;

            trace!("SetDynamicTableCapacity size={capacity}");

            return self.set_capacity(capacity);
        }

        let index = decode_int(b, 5)?;

        trace!("Duplicate index={index}");

        let field = self.get_relative(index)?.clone();

        self.insert(field)
    }
}

impl DynamicTable for Table {
    fn get(&self, absolute_index: u64) -> Result<&HeaderField> {
        let index = absolute_index
            .checked_sub(self.evicted)
            .ok_or(Error::InvalidDynamicTableIndex)?;

        usize::try_from(index)
            .ok()
            .and_then(|i| self.entries.get(i))
            .ok_or(Error::InvalidDynamicTableIndex)
    }

    fn insert_count(&self) -> u64 {
        self.insert_cnt
    }

    fn max_entries(&self) -> u64 {
        self.max_capacity / ENTRY_OVERHEAD
    }
}

// Encoder stream instructions are small, so they are decoded in one go, and
// an incomplete one is retried from its start once more data is available.
fn decode_int(b: &mut octets::Octets, prefix: u8) -> Result<u64> {
    let mut reader = IntegerReader::new();
    reader.configure(prefix);

    if !reader.read(b)? {
        return Err(Error::BufferTooShort);
    }

    Ok(reader.get())
}

fn decode_str(
    b: &mut octets::Octets, prefix: u8, max_len: u64,
) -> Result<Vec<u8>> {
    let mut reader = StringReader::new();
    reader.configure(prefix);
    reader.set_max_len(max_len);

    let mut out = Vec::new();

    let done = reader.read(b, &mut out).map_err(|e| match e {
        // The entry could not fit in the table anyway.
        Error::HeaderListTooLarge => Error::DynamicTableTooBig,

        e => e,
    })?;

    if !done {
        return Err(Error::BufferTooShort);
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::testing::init_logger;
    use crate::testing::ENCODER_STREAM;
    use crate::testing::ENCODER_STREAM_2;

    fn chk_hdr(table: &Table, idx: u64, n: &str, v: &str) -> bool {
        let hdr = table.get(idx).unwrap();
        hdr.name() == n.as_bytes() && hdr.value() == v.as_bytes()
    }

    #[test]
    fn header_size_overhead() {
        assert_eq!(header_size(b"", b""), 32);
        assert_eq!(header_size(b":authority", b"www.example.com"), 57);
        assert_eq!(HeaderField::new(&b":path"[..], &b"/"[..]).size(), 38);
    }

    #[test]
    fn insert_with_name_ref() {
        init_logger();

        let mut table = Table::new(300);

        table.control(&ENCODER_STREAM).unwrap();

        assert_eq!(table.capacity(), 220);
        assert_eq!(table.insert_count(), 2);
        assert_eq!(table.size(), 106);

        assert!(chk_hdr(&table, 0, ":authority", "www.example.com"));
        assert!(chk_hdr(&table, 1, ":path", "/sample/path"));
        assert_eq!(table.get(2), Err(Error::InvalidDynamicTableIndex));
    }

    #[test]
    fn insert_with_literal_name_and_duplicate() {
        let mut table = Table::new(300);

        table.control(&ENCODER_STREAM).unwrap();
        table.control(&ENCODER_STREAM_2).unwrap();

        assert_eq!(table.insert_count(), 4);
        assert_eq!(table.size(), 217);

        assert!(chk_hdr(&table, 2, "custom-key", "custom-value"));
        assert!(chk_hdr(&table, 3, ":authority", "www.example.com"));
    }

    #[test]
    fn partial_instructions() {
        let mut table = Table::new(300);

        let mut stream = ENCODER_STREAM.to_vec();
        stream.extend_from_slice(&ENCODER_STREAM_2);

        table.control(&stream[..7]).unwrap();
        table.control(&stream[7..31]).unwrap();
        table.control(&stream[31..]).unwrap();

        assert!(chk_hdr(&table, 0, ":authority", "www.example.com"));
        assert!(chk_hdr(&table, 1, ":path", "/sample/path"));
        assert!(chk_hdr(&table, 2, "custom-key", "custom-value"));
        assert!(chk_hdr(&table, 3, ":authority", "www.example.com"));
    }

    #[test]
    fn eviction() {
        let mut table = Table::new(200);

        // Same instructions, with a capacity of 200.
        let mut stream = ENCODER_STREAM.to_vec();
        stream[1] = 0xa9;
        stream.extend_from_slice(&ENCODER_STREAM_2);

        table.control(&stream).unwrap();

        assert_eq!(table.size(), 160);
        assert_eq!(table.len(), 3);
        assert_eq!(table.get(0), Err(Error::InvalidDynamicTableIndex));
        assert!(chk_hdr(&table, 1, ":path", "/sample/path"));
        assert!(chk_hdr(&table, 2, "custom-key", "custom-value"));
        assert!(chk_hdr(&table, 3, ":authority", "www.example.com"));
    }

    #[test]
    fn capacity_limits() {
        let mut table = Table::new(100);

        assert_eq!(table.set_capacity(101), Err(Error::DynamicTableTooBig));
        assert_eq!(table.set_capacity(100), Ok(()));

        // An entry larger than the whole table.
        let field = HeaderField::new(vec![b'a'; 40], vec![b'b'; 40]);
        assert_eq!(table.insert(field), Err(Error::DynamicTableTooBig));

        table.insert(HeaderField::new(&b"a"[..], &b"b"[..])).unwrap();
        assert_eq!(table.size(), 34);

        // Shrinking evicts.
        table.set_capacity(0).unwrap();
        assert!(table.is_empty());
        assert_eq!(table.insert_count(), 1);
        assert_eq!(table.get(0), Err(Error::InvalidDynamicTableIndex));
    }

    #[test]
    fn oversized_literal_rejected_early() {
        let mut table = Table::new(100);
        table.set_capacity(100).unwrap();

        // Insert With Literal Name, announcing a 200 bytes name.
        assert_eq!(
            table.control(&[0x5f, 0xa9, 0x01]),
            Err(Error::DynamicTableTooBig)
        );
    }

    #[test]
    fn invalid_references() {
        let mut table = Table::new(300);
        table.set_capacity(300).unwrap();

        // Duplicate of a missing entry.
        assert_eq!(table.control(&[0x00]), Err(Error::InvalidDynamicTableIndex));

        // Insert with name reference to a missing static entry.
        assert_eq!(
            table.control(&[0xff, 0x25, 0x00]),
            Err(Error::InvalidStaticTableIndex)
        );
    }

    #[test]
    fn max_entries() {
        assert_eq!(Table::new(0).max_entries(), 0);
        assert_eq!(Table::new(300).max_entries(), 9);
        assert_eq!(Table::new(u64::MAX).max_entries(), u32::MAX as u64 / 32);
    }
}
