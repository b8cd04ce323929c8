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

//! Helpers shared by the unit tests.

use crate::DecodingCallback;
use crate::Error;
use crate::TableIndex;

// Stream: Encoder
// 3fbd01              | Set Dynamic Table Capacity=220
// c00f 7777 772e 6578 | Insert With Name Reference
// 616d 706c 652e 636f | Static Table, Index=0
// 6d                  |  (:authority=www.example.com)
// c10c 2f73 616d 706c | Insert With Name Reference
// 652f 7061 7468      |  Static Table, Index=1
//                     |  (:path=/sample/path)
pub const ENCODER_STREAM: [u8; 34] = [
    0x3f, 0xbd, 0x01, 0xc0, 0x0f, 0x77, 0x77, 0x77, 0x2e, 0x65, 0x78, 0x61,
    0x6d, 0x70, 0x6c, 0x65, 0x2e, 0x63, 0x6f, 0x6d, 0xc1, 0x0c, 0x2f, 0x73,
    0x61, 0x6d, 0x70, 0x6c, 0x65, 0x2f, 0x70, 0x61, 0x74, 0x68,
];

// 4a63 7573 746f 6d2d | Insert With Literal Name
// 6b65 790c 6375 7374 |  (custom-key=custom-value)
// 6f6d 2d76 616c 7565 |
// 02                  | Duplicate (Relative Index = 2)
pub const ENCODER_STREAM_2: [u8; 25] = [
    0x4a, 0x63, 0x75, 0x73, 0x74, 0x6f, 0x6d, 0x2d, 0x6b, 0x65, 0x79, 0x0c,
    0x63, 0x75, 0x73, 0x74, 0x6f, 0x6d, 0x2d, 0x76, 0x61, 0x6c, 0x75, 0x65,
    0x02,
];

pub fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Encodes `v` as a prefixed integer, with `first` carrying the bits above
/// the prefix.
pub fn encode_int(mut v: u64, first: u8, prefix: u8) -> Vec<u8> {
    let mask = (1u64 << prefix) - 1;
    let mut out = Vec::new();

    // Encode I on N bits.
    if v < mask {
        out.push(first | v as u8);
        return out;
    }

    // Encode (2^N - 1) on N bits.
    out.push(first | mask as u8);

    v -= mask;

    while v >= 128 {
        // Encode (I % 128 + 128) on 8 bits.
        out.push((v % 128 + 128) as u8);

        v >>= 7;
    }

    // Encode I on 8 bits.
    out.push(v as u8);

    out
}

/// Encodes `v` as a raw (non-Huffman) string literal.
pub fn encode_str(v: &[u8], first: u8, prefix: u8) -> Vec<u8> {
    let mut out = encode_int(v.len() as u64, first, prefix);
    out.extend_from_slice(v);
    out
}

/// Calls `f` once for every way `buf` can be split into non-empty chunks.
pub fn for_each_split<F: FnMut(&[&[u8]])>(buf: &[u8], mut f: F) {
    assert!(!buf.is_empty() && buf.len() <= 16);

    // Bit `i` of `mask` set means a chunk boundary after byte `i`.
    for mask in 0u32..(1 << (buf.len() - 1)) {
        let mut chunks = Vec::new();
        let mut start = 0;

        for i in 0..buf.len() - 1 {
            if mask & (1 << i) != 0 {
                chunks.push(&buf[start..=i]);
                start = i + 1;
            }
        }

        chunks.push(&buf[start..]);

        f(&chunks);
    }
}

/// A decoded field line, as observed by a [`Recorder`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Event {
    Indexed {
        index: TableIndex,
        name: Vec<u8>,
        value: Vec<u8>,
    },

    NameReference {
        index: TableIndex,
        name: Vec<u8>,
        value: Vec<u8>,
        huffman: bool,
        hide_intermediary: bool,
    },

    LiteralName {
        name: Vec<u8>,
        name_huffman: bool,
        value: Vec<u8>,
        value_huffman: bool,
        hide_intermediary: bool,
    },

    Error(Error),
}

/// A callback recording everything it is told.
#[derive(Default)]
pub struct Recorder {
    pub events: Vec<Event>,
}

impl DecodingCallback for Recorder {
    fn on_indexed(&mut self, index: TableIndex, name: &[u8], value: &[u8]) {
        self.events.push(Event::Indexed {
            index,
            name: name.to_vec(),
            value: value.to_vec(),
        });
    }

    fn on_literal_with_name_reference(
        &mut self, index: TableIndex, name: &[u8], value: &[u8], huffman: bool,
        hide_intermediary: bool,
    ) {
        self.events.push(Event::NameReference {
            index,
            name: name.to_vec(),
            value: value.to_vec(),
            huffman,
            hide_intermediary,
        });
    }

    fn on_literal_with_literal_name(
        &mut self, name: &[u8], name_huffman: bool, value: &[u8],
        value_huffman: bool, hide_intermediary: bool,
    ) {
        self.events.push(Event::LiteralName {
            name: name.to_vec(),
            name_huffman,
            value: value.to_vec(),
            value_huffman,
            hide_intermediary,
        });
    }

    fn on_error(&mut self, err: Error) {
        self.events.push(Event::Error(err));
    }
}
