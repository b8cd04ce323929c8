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

//! Encoded field section prefix (RFC 9204, Section 4.5.1).

use super::DynamicTable;
use super::Error;
use super::IntegerReader;
use super::Result;

/// The prefix of a field section.
///
/// It holds the dynamic table state the encoder relied on when encoding the
/// section, and stays the same while all of the section's field lines are
/// decoded.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FieldSectionPrefix {
    required_insert_count: u64,
    base: u64,
}

impl FieldSectionPrefix {
    /// Creates a prefix from already decoded values.
    pub fn new(required_insert_count: u64, base: u64) -> FieldSectionPrefix {
        FieldSectionPrefix {
            required_insert_count,
            base,
        }
    }

    /// Returns the number of dynamic table insertions needed to decode the
    /// section.
    pub fn required_insert_count(&self) -> u64 {
        self.required_insert_count
    }

    /// Returns the base that relative dynamic table indices refer to.
    pub fn base(&self) -> u64 {
        self.base
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
enum State {
    #[default]
    InsertCount,
    DeltaSign,
    DeltaBase,
    Done,
}

/// A resumable reader for the field section prefix.
#[derive(Debug, Default)]
pub struct PrefixReader {
    state: State,
    int: IntegerReader,
    required_insert_count: u64,
    negative: bool,
    prefix: FieldSectionPrefix,
}

impl PrefixReader {
    /// Creates a new reader.
    pub fn new() -> PrefixReader {
        PrefixReader::default()
    }

    /// Reads the prefix from `b`.
    ///
    /// The Required Insert Count is reconstructed from its encoded form using
    /// the current state of `table`. Returns `Ok(true)` once the prefix is
    /// complete.
    pub fn read(
        &mut self, b: &mut octets::Octets, table: &dyn DynamicTable,
    ) -> Result<bool> {
        loop {
            match self.state {
                State::Done => return Ok(true),

                State::InsertCount => {
                    if !self.int.is_started() {
                        self.int.configure(8);
                    }

                    if !self.int.read(b)? {
                        return Ok(false);
                    }

                    self.required_insert_count = required_insert_count(
                        self.int.get(),
                        table.max_entries(),
                        table.insert_count(),
                    )?;

                    self.int.reset();
                    self.state = State::DeltaSign;
                },

                State::DeltaSign => {
                    if b.cap() == 0 {
                        return Ok(false);
                    }

                    self.negative = b.peek_u8()? & 0x80 == 0x80;

                    self.int.configure(7);
                    self.state = State::DeltaBase;
                },

                State::DeltaBase => {
                    if !self.int.read(b)? {
                        return Ok(false);
                    }

                    let delta = self.int.get();
                    let ric = self.required_insert_count;

                    let base = if self.negative {
                        delta.checked_add(1).and_then(|d| ric.checked_sub(d))
                    } else {
                        ric.checked_add(delta)
                    }
                    .ok_or(Error::InvalidDynamicTableIndex)?;

                    self.prefix = FieldSectionPrefix::new(ric, base);

                    self.int.reset();
                    self.state = State::Done;
                },
            }
        }
    }

    /// Returns the decoded prefix.
    ///
    /// Only meaningful after [`read()`] returned `Ok(true)`.
    ///
    /// [`read()`]: struct.PrefixReader.html#method.read
    pub fn get(&self) -> FieldSectionPrefix {
        self.prefix
    }

    /// Clears all state.
    pub fn reset(&mut self) {
        self.state = State::InsertCount;
        self.int.reset();
        self.required_insert_count = 0;
        self.negative = false;
        self.prefix = FieldSectionPrefix::default();
    }
}

// Reverses the modulo encoding of the Required Insert Count, as described in
// RFC 9204, Section 4.5.1.1.
fn required_insert_count(
    encoded: u64, max_entries: u64, total_inserts: u64,
) -> Result<u64> {
    if encoded == 0 {
        return Ok(0);
    }

    let full_range = max_entries * 2;

    if encoded > full_range {
        return Err(Error::InvalidDynamicTableIndex);
    }

    let max_value = total_inserts + max_entries;
    let max_wrapped = (max_value / full_range) * full_range;

    let mut ric = max_wrapped + encoded - 1;

    // If ric exceeds max_value, the encoder's value must have wrapped one
    // fewer time.
    if ric > max_value {
        if ric <= full_range {
            return Err(Error::InvalidDynamicTableIndex);
        }

        ric -= full_range;
    }

    // Value of 0 must be encoded as 0.
    if ric == 0 {
        return Err(Error::InvalidDynamicTableIndex);
    }

    Ok(ric)
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::testing::for_each_split;
    use crate::testing::ENCODER_STREAM;
    use crate::Table;

    fn read_prefix(buf: &[u8], table: &Table) -> Result<FieldSectionPrefix> {
        let mut r = PrefixReader::new();
        let mut b = octets::Octets::with_slice(buf);

        if !r.read(&mut b, table)? {
            return Err(Error::BufferTooShort);
        }

        Ok(r.get())
    }

    #[test]
    fn static_only() {
        let table = Table::new(0);

        assert_eq!(
            read_prefix(&[0x00, 0x00], &table),
            Ok(FieldSectionPrefix::new(0, 0))
        );
    }

    #[test]
    fn positive_and_negative_delta() {
        let mut table = Table::new(300);
        table.control(&ENCODER_STREAM).unwrap();

        // Required Insert Count = 2, Base = 2 + 1.
        assert_eq!(
            read_prefix(&[0x03, 0x01], &table),
            Ok(FieldSectionPrefix::new(2, 3))
        );

        // Required Insert Count = 2, Base = 2 - 1 - 1.
        assert_eq!(
            read_prefix(&[0x03, 0x81], &table),
            Ok(FieldSectionPrefix::new(2, 0))
        );

        // Base would be negative.
        assert_eq!(
            read_prefix(&[0x03, 0x82], &table),
            Err(Error::InvalidDynamicTableIndex)
        );
    }

    #[test]
    fn wrapped_insert_count() {
        // max_entries = 3, full range = 6.
        assert_eq!(required_insert_count(0, 3, 0), Ok(0));
        assert_eq!(required_insert_count(1, 3, 5), Ok(6));
        assert_eq!(
            required_insert_count(1, 3, 0),
            Err(Error::InvalidDynamicTableIndex)
        );
        assert_eq!(required_insert_count(3, 3, 10), Ok(8));
        assert_eq!(
            required_insert_count(7, 3, 10),
            Err(Error::InvalidDynamicTableIndex)
        );

        // No dynamic table.
        assert_eq!(
            required_insert_count(1, 0, 0),
            Err(Error::InvalidDynamicTableIndex)
        );
    }

    #[test]
    fn fragmented() {
        let mut table = Table::new(300);
        table.control(&ENCODER_STREAM).unwrap();

        for_each_split(&[0x03, 0x81], |chunks| {
            let mut r = PrefixReader::new();

            let (last, init) = chunks.split_last().unwrap();

            for chunk in init {
                let mut b = octets::Octets::with_slice(chunk);
                assert_eq!(r.read(&mut b, &table), Ok(false));
            }

            let mut b = octets::Octets::with_slice(last);
            assert_eq!(r.read(&mut b, &table), Ok(true));
            assert_eq!(r.get(), FieldSectionPrefix::new(2, 0));
        });
    }

    #[test]
    fn reset() {
        let table = Table::new(0);

        let mut r = PrefixReader::new();

        let mut b = octets::Octets::with_slice(&[0x00]);
        assert_eq!(r.read(&mut b, &table), Ok(false));

        r.reset();

        let mut b = octets::Octets::with_slice(&[0x00, 0x00]);
        assert_eq!(r.read(&mut b, &table), Ok(true));
        assert_eq!(b.cap(), 0);
    }
}
