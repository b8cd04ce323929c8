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

#[macro_use]
extern crate log;

use std::fs::File;

use std::io::prelude::*;

/// Prints decoded fields the way QPACK offline interop tools expect them.
struct Printer;

impl Printer {
    fn print(name: &[u8], value: &[u8]) {
        println!(
            "{}\t{}",
            String::from_utf8_lossy(name),
            String::from_utf8_lossy(value)
        );
    }
}

impl qpack::DecodingCallback for Printer {
    fn on_indexed(
        &mut self, index: qpack::TableIndex, name: &[u8], value: &[u8],
    ) {
        trace!(
            "Indexed static={} index={}",
            index.is_static(),
            index.absolute()
        );

        Printer::print(name, value);
    }

    fn on_literal_with_name_reference(
        &mut self, index: qpack::TableIndex, name: &[u8], value: &[u8],
        huffman: bool, hide_intermediary: bool,
    ) {
        trace!(
            "Literal static={} index={} huffman={} hide={}",
            index.is_static(),
            index.absolute(),
            huffman,
            hide_intermediary
        );

        Printer::print(name, value);
    }

    fn on_literal_with_literal_name(
        &mut self, name: &[u8], _name_huffman: bool, value: &[u8],
        _value_huffman: bool, _hide_intermediary: bool,
    ) {
        Printer::print(name, value);
    }

    fn on_error(&mut self, err: qpack::Error) {
        error!("Field section rejected err={:?}", err);
    }
}

// Reads one `stream id (u64) | length (u32) | data` record, or `None` at the
// end of the file.
fn read_record(file: &mut File) -> std::io::Result<Option<(u64, Vec<u8>)>> {
    let mut stream_id = [0; 8];

    match file.read_exact(&mut stream_id) {
        Ok(_) => (),

        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof =>
            return Ok(None),

        Err(e) => return Err(e),
    }

    let mut len = [0; 4];
    file.read_exact(&mut len)?;

    let mut data = vec![0; u32::from_be_bytes(len) as usize];
    file.read_exact(&mut data)?;

    Ok(Some((u64::from_be_bytes(stream_id), data)))
}

fn decode_section(
    dec: &mut qpack::Decoder, table: &qpack::Table, stream_id: u64, data: &[u8],
) -> qpack::Result<()> {
    dec.decode(data, table, &mut Printer)?;

    let prefix = dec.finish()?;

    debug!(
        "Decoded stream={} required_insert_count={}",
        stream_id,
        prefix.required_insert_count()
    );

    println!();

    Ok(())
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::builder().format_timestamp_nanos().init();

    let mut args = std::env::args();

    let cmd = args.next().unwrap_or_else(|| "qpack-decode".to_string());

    let (path, capacity) = match (args.next(), args.next(), args.next()) {
        (Some(path), None, None) => (path, 4096),

        (Some(path), Some(capacity), None) => (path, capacity.parse()?),

        _ => {
            println!("Usage: {cmd} FILE [TABLE_CAPACITY]");
            return Ok(());
        },
    };

    let mut file = File::open(path)?;

    let mut config = qpack::Config::new();
    config.set_qpack_max_table_capacity(capacity);

    let mut dec = qpack::Decoder::new(&config);
    let mut table = qpack::Table::new(config.qpack_max_table_capacity());

    // Sections waiting for dynamic table entries.
    let mut blocked: Vec<(u64, Vec<u8>)> = Vec::new();

    while let Some((stream_id, data)) = read_record(&mut file)? {
        debug!("Got stream={} len={}", stream_id, data.len());

        if stream_id == 0 {
            table.control(&data)?;

            let pending = std::mem::take(&mut blocked);

            for (stream_id, data) in pending {
                match decode_section(&mut dec, &table, stream_id, &data) {
                    Err(qpack::Error::DynamicTableWouldBlock) =>
                        blocked.push((stream_id, data)),

                    res => res?,
                }
            }

            continue;
        }

        match decode_section(&mut dec, &table, stream_id, &data) {
            Err(qpack::Error::DynamicTableWouldBlock) => {
                debug!("Blocked stream={}", stream_id);

                blocked.push((stream_id, data));
            },

            res => res?,
        }
    }

    for (stream_id, _) in &blocked {
        error!("Stream {} never unblocked", stream_id);
    }

    Ok(())
}
