// Licensed to the Apache Software Foundation (ASF) under one
// or more contributor license agreements.  See the NOTICE file
// distributed with this work for additional information
// regarding copyright ownership.  The ASF licenses this file
// to you under the Apache License, Version 2.0 (the
// "License"); you may not use this file except in compliance
// with the License.  You may obtain a copy of the License at
//
//   http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing,
// software distributed under the License is distributed on an
// "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied.  See the License for the
// specific language governing permissions and limitations
// under the License.
//! Avro binary decoding and object-container framing.
//!
//! The decoder reads the Avro binary layout directly off the byte source:
//! zigzag varints for int/long/indices/block counts, little-endian IEEE
//! floats, and length-prefixed strings and bytes. The container reader
//! handles the file magic, the metadata map, block headers, and sync-marker
//! verification between blocks.
//!
//! Current limitations:
//! - Only the `null` codec is supported; compressed blocks are rejected.

use std::io::Read;

use serde_json::Value;

use super::schema::{AvroKind, CNode};
use crate::error::{ConvertError, Result};

const CONTAINER_MAGIC: [u8; 4] = [b'O', b'b', b'j', 1];
const SYNC_MARKER_SIZE: usize = 16;
const MAX_VARINT_BYTES: usize = 10;

pub(crate) struct AvroDecoder<R: Read> {
    reader: R,
}

impl<R: Read> AvroDecoder<R> {
    pub(crate) fn new(reader: R) -> AvroDecoder<R> {
        AvroDecoder { reader }
    }

    fn read_u8(&mut self) -> Result<u8> {
        let mut byte = [0u8; 1];
        self.reader.read_exact(&mut byte)?;
        Ok(byte[0])
    }

    /// Reads one byte, reporting a clean end of stream as `None`.
    fn read_u8_opt(&mut self) -> Result<Option<u8>> {
        let mut byte = [0u8; 1];
        loop {
            match self.reader.read(&mut byte) {
                Ok(0) => return Ok(None),
                Ok(_) => return Ok(Some(byte[0])),
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
    }

    fn read_exact(&mut self, buf: &mut [u8]) -> Result<()> {
        self.reader.read_exact(buf)?;
        Ok(())
    }

    fn finish_varint(&mut self, first: u8) -> Result<u64> {
        let mut value = (first & 0x7f) as u64;
        let mut shift = 7;
        let mut byte = first;
        while byte & 0x80 != 0 {
            if shift >= MAX_VARINT_BYTES * 7 {
                return Err(ConvertError::MalformedInput(
                    "varint exceeds 10 bytes".to_string(),
                ));
            }
            byte = self.read_u8()?;
            value |= ((byte & 0x7f) as u64) << shift;
            shift += 7;
        }
        Ok(value)
    }

    pub(crate) fn decode_long(&mut self) -> Result<i64> {
        let first = self.read_u8()?;
        let raw = self.finish_varint(first)?;
        Ok(((raw >> 1) as i64) ^ -((raw & 1) as i64))
    }

    /// Like [`decode_long`], but a clean end of stream before the first byte
    /// yields `None`. Used to detect the end of the container.
    pub(crate) fn decode_long_opt(&mut self) -> Result<Option<i64>> {
        match self.read_u8_opt()? {
            None => Ok(None),
            Some(first) => {
                let raw = self.finish_varint(first)?;
                Ok(Some(((raw >> 1) as i64) ^ -((raw & 1) as i64)))
            }
        }
    }

    pub(crate) fn decode_int(&mut self) -> Result<i32> {
        let value = self.decode_long()?;
        i32::try_from(value).map_err(|_| {
            ConvertError::MalformedInput(format!("int out of 32-bit range: value={value}"))
        })
    }

    pub(crate) fn decode_bool(&mut self) -> Result<bool> {
        match self.read_u8()? {
            0 => Ok(false),
            1 => Ok(true),
            other => Err(ConvertError::MalformedInput(format!(
                "invalid boolean byte: value={other}"
            ))),
        }
    }

    pub(crate) fn decode_f32(&mut self) -> Result<f32> {
        let mut buf = [0u8; 4];
        self.read_exact(&mut buf)?;
        Ok(f32::from_le_bytes(buf))
    }

    pub(crate) fn decode_f64(&mut self) -> Result<f64> {
        let mut buf = [0u8; 8];
        self.read_exact(&mut buf)?;
        Ok(f64::from_le_bytes(buf))
    }

    pub(crate) fn decode_len(&mut self) -> Result<usize> {
        let value = self.decode_long()?;
        usize::try_from(value).map_err(|_| {
            ConvertError::MalformedInput(format!("negative length prefix: value={value}"))
        })
    }

    pub(crate) fn decode_bytes(&mut self) -> Result<Vec<u8>> {
        let len = self.decode_len()?;
        let mut buf = vec![0u8; len];
        self.read_exact(&mut buf)?;
        Ok(buf)
    }

    pub(crate) fn decode_string(&mut self) -> Result<String> {
        let buf = self.decode_bytes()?;
        String::from_utf8(buf)
            .map_err(|e| ConvertError::MalformedInput(format!("invalid utf-8 string: error={e}")))
    }

    /// Decodes a string into a caller-provided slot, so string columns fill
    /// their storage in place.
    pub(crate) fn decode_string_into(&mut self, out: &mut String) -> Result<()> {
        let decoded = self.decode_string()?;
        out.push_str(&decoded);
        Ok(())
    }

    pub(crate) fn decode_fixed(&mut self, size: usize) -> Result<Vec<u8>> {
        let mut buf = vec![0u8; size];
        self.read_exact(&mut buf)?;
        Ok(buf)
    }

    pub(crate) fn decode_union_index(&mut self) -> Result<usize> {
        let value = self.decode_long()?;
        usize::try_from(value).map_err(|_| {
            ConvertError::MalformedInput(format!("negative union index: value={value}"))
        })
    }

    /// Reads an array or map block header. A negative count carries a byte
    /// size for the block, which lets excluded subtrees skip it wholesale.
    pub(crate) fn decode_block(&mut self) -> Result<(u64, Option<u64>)> {
        let count = self.decode_long()?;
        if count < 0 {
            let size = self.decode_len()?;
            Ok((count.unsigned_abs(), Some(size as u64)))
        } else {
            Ok((count as u64, None))
        }
    }

    pub(crate) fn skip(&mut self, mut n: u64) -> Result<()> {
        let mut scratch = [0u8; 512];
        while n > 0 {
            let step = n.min(scratch.len() as u64) as usize;
            self.read_exact(&mut scratch[..step])?;
            n -= step as u64;
        }
        Ok(())
    }
}

/// Consumes one value of the given schema without materializing it.
pub(crate) fn skip_value<R: Read>(dec: &mut AvroDecoder<R>, schema: &CNode) -> Result<()> {
    match schema.kind {
        AvroKind::Null => Ok(()),
        AvroKind::Bool => {
            dec.read_u8()?;
            Ok(())
        }
        AvroKind::Int | AvroKind::Long | AvroKind::Enum => {
            dec.decode_long()?;
            Ok(())
        }
        AvroKind::Float => dec.skip(4),
        AvroKind::Double => dec.skip(8),
        AvroKind::Bytes | AvroKind::String => {
            let len = dec.decode_len()?;
            dec.skip(len as u64)
        }
        AvroKind::Fixed => dec.skip(schema.fixed_size as u64),
        AvroKind::Record => {
            for child in &schema.children {
                skip_value(dec, child)?;
            }
            Ok(())
        }
        AvroKind::Union => {
            let index = dec.decode_union_index()?;
            let branch = schema.children.get(index).ok_or_else(|| {
                ConvertError::MalformedInput(format!(
                    "union index out of range: index={}, branches={}",
                    index,
                    schema.children.len()
                ))
            })?;
            skip_value(dec, branch)
        }
        AvroKind::Array => loop {
            let (count, size) = dec.decode_block()?;
            if count == 0 {
                return Ok(());
            }
            match size {
                Some(bytes) => dec.skip(bytes)?,
                None => {
                    for _ in 0..count {
                        skip_value(dec, &schema.children[0])?;
                    }
                }
            }
        },
        AvroKind::Map => loop {
            let (count, size) = dec.decode_block()?;
            if count == 0 {
                return Ok(());
            }
            match size {
                Some(bytes) => dec.skip(bytes)?,
                None => {
                    for _ in 0..count {
                        let key_len = dec.decode_len()?;
                        dec.skip(key_len as u64)?;
                        skip_value(dec, &schema.children[0])?;
                    }
                }
            }
        },
    }
}

/// Object-container file reader: framing, metadata, and sync verification.
pub(crate) struct Container<R: Read> {
    pub(crate) dec: AvroDecoder<R>,
    sync: [u8; SYNC_MARKER_SIZE],
    remaining: u64,
    in_block: bool,
}

impl<R: Read> Container<R> {
    /// Validates the header and returns the reader plus the parsed schema
    /// document from the file metadata.
    pub(crate) fn open(reader: R) -> Result<(Container<R>, Value)> {
        let mut dec = AvroDecoder::new(reader);
        let mut magic = [0u8; 4];
        dec.read_exact(&mut magic)?;
        if magic != CONTAINER_MAGIC {
            return Err(ConvertError::MalformedInput(format!(
                "bad container magic: bytes={magic:?}"
            )));
        }

        let mut schema_json: Option<Vec<u8>> = None;
        let mut codec: Option<Vec<u8>> = None;
        loop {
            let (count, _size) = dec.decode_block()?;
            if count == 0 {
                break;
            }
            for _ in 0..count {
                let key = dec.decode_string()?;
                let value = dec.decode_bytes()?;
                match key.as_str() {
                    "avro.schema" => schema_json = Some(value),
                    "avro.codec" => codec = Some(value),
                    _ => {}
                }
            }
        }

        if let Some(codec) = codec {
            if codec != b"null" {
                return Err(ConvertError::NotImplemented(format!(
                    "avro codec: codec={}",
                    String::from_utf8_lossy(&codec)
                )));
            }
        }
        let schema_json = schema_json.ok_or_else(|| {
            ConvertError::MalformedInput("container metadata has no schema".to_string())
        })?;
        let schema: Value = serde_json::from_slice(&schema_json)?;

        let mut sync = [0u8; SYNC_MARKER_SIZE];
        dec.read_exact(&mut sync)?;
        Ok((
            Container {
                dec,
                sync,
                remaining: 0,
                in_block: false,
            },
            schema,
        ))
    }

    /// True while at least one record remains. Crosses block boundaries,
    /// verifying the sync marker after each block.
    pub(crate) fn has_more(&mut self) -> Result<bool> {
        loop {
            if self.remaining > 0 {
                return Ok(true);
            }
            if self.in_block {
                let mut sync = [0u8; SYNC_MARKER_SIZE];
                self.dec.read_exact(&mut sync)?;
                if sync != self.sync {
                    return Err(ConvertError::MalformedInput(
                        "sync marker mismatch after block".to_string(),
                    ));
                }
                self.in_block = false;
            }
            match self.dec.decode_long_opt()? {
                None => return Ok(false),
                Some(count) => {
                    if count < 0 {
                        return Err(ConvertError::MalformedInput(format!(
                            "negative block record count: count={count}"
                        )));
                    }
                    let _byte_size = self.dec.decode_len()?;
                    self.remaining = count as u64;
                    self.in_block = true;
                }
            }
        }
    }

    pub(crate) fn consume_record(&mut self) {
        self.remaining -= 1;
    }
}
