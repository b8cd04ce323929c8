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

//! Resumable QPACK field-line decoding.
//!
//! This crate reconstructs HTTP header fields from the field sections carried
//! on HTTP/3 request and push streams, as described in [RFC 9204]. Unlike a
//! one-shot decoder, every reader in this crate can be fed a field section in
//! arbitrary fragments: when a reader runs out of input it keeps its partial
//! state and reports that more data is needed, and it only emits a field once
//! the complete representation has been read.
//!
//! ## Decoding a field section
//!
//! A [`Decoder`] is created from a [`Config`], which carries the limits
//! advertised to the peer:
//!
//! ```
//! let mut config = qpack::Config::new();
//! config.set_max_field_section_size(16 * 1024);
//!
//! let mut decoder = qpack::Decoder::new(&config);
//! let table = qpack::Table::new(config.qpack_max_table_capacity());
//! ```
//!
//! Field-section bytes are then passed to the decoder as they arrive, along
//! with the connection's dynamic table and a [`DecodingCallback`] receiving the
//! decoded fields. Once the stream framing indicates the end of the section,
//! [`finish()`] validates that no representation was left incomplete:
//!
//! ```
//! # let config = qpack::Config::new();
//! # let mut decoder = qpack::Decoder::new(&config);
//! # let table = qpack::Table::new(0);
//! let mut headers = qpack::HeaderList::new();
//!
//! // Required Insert Count = 0, Base = 0, `:method: GET`, `:path: /`.
//! let section = [0x00, 0x00, 0xd1, 0xc1];
//!
//! decoder.decode(&section[..3], &table, &mut headers)?;
//! decoder.decode(&section[3..], &table, &mut headers)?;
//! decoder.finish()?;
//!
//! assert_eq!(headers.len(), 2);
//! # Ok::<(), qpack::Error>(())
//! ```
//!
//! ## Dynamic table
//!
//! The decoder only needs read access to the dynamic table, through the
//! [`DynamicTable`] trait. The [`Table`] type is a simple implementation that
//! applies encoder stream instructions with [`Table::control()`].
//!
//! [RFC 9204]: https://www.rfc-editor.org/rfc/rfc9204.html
//! [`Decoder`]: struct.Decoder.html
//! [`Config`]: struct.Config.html
//! [`DecodingCallback`]: trait.DecodingCallback.html
//! [`finish()`]: struct.Decoder.html#method.finish
//! [`DynamicTable`]: trait.DynamicTable.html
//! [`Table`]: struct.Table.html
//! [`Table::control()`]: struct.Table.html#method.control

#![warn(missing_docs)]

#[macro_use]
extern crate log;

use std::fmt;
use std::fmt::Write;

const INDEXED: u8 = 0b1000_0000;
const INDEXED_WITH_POST_BASE: u8 = 0b0001_0000;
const LITERAL: u8 = 0b0010_0000;
const LITERAL_WITH_NAME_REF: u8 = 0b0100_0000;

const INSERT_WITH_NAME_REF: u8 = 0b1000_0000;
const INSERT_WITH_LITERAL_NAME: u8 = 0b0100_0000;
const SET_DYNAMIC_TABLE_CAPACITY: u8 = 0b0010_0000;

/// A specialized [`Result`] type for QPACK decoding operations.
///
/// This type is used throughout the crate's public API for any operation that
/// can produce an error.
///
/// [`Result`]: https://doc.rust-lang.org/std/result/enum.Result.html
pub type Result<T> = std::result::Result<T, Error>;

/// A QPACK decoding error.
///
/// All errors are fatal for the field section being decoded. Running out of
/// input in the middle of a representation is not an error, and is signaled
/// by the readers returning `Ok(false)` instead.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Error {
    /// The field section ended in the middle of a representation.
    BufferTooShort,

    /// A prefixed integer does not fit in 64 bits.
    IntegerOverflow,

    /// The Huffman encoding of a string literal is invalid.
    InvalidHuffmanEncoding,

    /// The QPACK static table index provided doesn't exist.
    InvalidStaticTableIndex,

    /// The QPACK dynamic table index provided doesn't exist, or refers to an
    /// entry that was already evicted.
    InvalidDynamicTableIndex,

    /// The decoded field section exceeded the size limit.
    HeaderListTooLarge,

    /// The dynamic table capacity or an inserted entry exceeds the limit.
    DynamicTableTooBig,

    /// The field section references dynamic table entries that were not
    /// received yet.
    DynamicTableWouldBlock,

    /// A reader was driven without being configured first.
    InvalidState,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{self:?}")
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        None
    }
}

impl std::convert::From<octets::BufferTooShortError> for Error {
    fn from(_err: octets::BufferTooShortError) -> Self {
        Error::BufferTooShort
    }
}

/// Stores configuration shared between the decoder and the dynamic table.
#[derive(Clone, Debug, Default)]
pub struct Config {
    max_field_section_size: Option<u64>,
    qpack_max_table_capacity: Option<u64>,
}

impl Config {
    /// Creates a new configuration object with default settings.
    pub const fn new() -> Config {
        Config {
            max_field_section_size: None,
            qpack_max_table_capacity: None,
        }
    }

    /// Sets the `SETTINGS_MAX_FIELD_SECTION_SIZE` setting.
    ///
    /// By default no limit is enforced. When a field section whose decoded
    /// size exceeds the limit is received, decoding fails with the
    /// [`Error::HeaderListTooLarge`] error.
    ///
    /// [`Error::HeaderListTooLarge`]: enum.Error.html#variant.HeaderListTooLarge
    pub fn set_max_field_section_size(&mut self, v: u64) {
        self.max_field_section_size = Some(v);
    }

    /// Sets the `SETTINGS_QPACK_MAX_TABLE_CAPACITY` setting.
    ///
    /// The default value is `0`.
    pub fn set_qpack_max_table_capacity(&mut self, v: u64) {
        self.qpack_max_table_capacity = Some(v);
    }

    /// Returns the configured field section size limit.
    pub fn max_field_section_size(&self) -> u64 {
        self.max_field_section_size.unwrap_or(u64::MAX)
    }

    /// Returns the configured dynamic table capacity limit.
    pub fn qpack_max_table_capacity(&self) -> u64 {
        self.qpack_max_table_capacity.unwrap_or(0)
    }
}

/// A trait for types with associated string name and value.
pub trait NameValue {
    /// Returns the object's name.
    fn name(&self) -> &[u8];

    /// Returns the object's value.
    fn value(&self) -> &[u8];
}

/// An owned name-value pair representing a decoded HTTP header.
#[derive(Clone, PartialEq, Eq)]
pub struct Header(Vec<u8>, Vec<u8>);

fn try_print_as_readable(hdr: &[u8], f: &mut fmt::Formatter) -> fmt::Result {
    match std::str::from_utf8(hdr) {
        Ok(s) => f.write_str(&s.escape_default().to_string()),
        Err(_) => write!(f, "{hdr:?}"),
    }
}

impl fmt::Debug for Header {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_char('"')?;
        try_print_as_readable(&self.0, f)?;
        f.write_str(": ")?;
        try_print_as_readable(&self.1, f)?;
        f.write_char('"')
    }
}

impl Header {
    /// Creates a new header.
    ///
    /// Both `name` and `value` will be cloned.
    pub fn new(name: &[u8], value: &[u8]) -> Self {
        Self(name.to_vec(), value.to_vec())
    }
}

impl NameValue for Header {
    fn name(&self) -> &[u8] {
        &self.0
    }

    fn value(&self) -> &[u8] {
        &self.1
    }
}

pub use crate::decoder::Decoder;
pub use crate::field_line::DecodingCallback;
pub use crate::field_line::FieldLineContext;
pub use crate::field_line::HeaderList;
pub use crate::field_line::SectionSize;
pub use crate::field_line::TableIndex;
pub use crate::field_line::indexed::IndexedReader;
pub use crate::field_line::literal::LiteralNameReader;
pub use crate::field_line::name_ref::NameReferenceReader;
pub use crate::integer::IntegerReader;
pub use crate::prefix::FieldSectionPrefix;
pub use crate::prefix::PrefixReader;
pub use crate::string::StringReader;
pub use crate::table::header_size;
pub use crate::table::DynamicTable;
pub use crate::table::HeaderField;
pub use crate::table::Table;

mod decoder;
mod field_line;
mod huffman;
mod integer;
mod prefix;
pub mod static_table;
mod string;
mod table;

#[cfg(test)]
mod testing;
