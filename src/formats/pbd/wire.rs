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
//! Protobuf wire-format reader.
//!
//! Tracks an absolute stream position and a stack of limits, one per
//! enclosing length-delimited region (message bodies, packed runs). Reads
//! may not cross the active limit, and popping a limit checks that the
//! region was consumed exactly. Tag reads report the end of the active
//! region as `None`.

use std::io::Read;

use crate::error::{ConvertError, Result};

const MAX_VARINT_BYTES: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum WireType {
    Varint,
    Fixed64,
    LengthDelimited,
    Fixed32,
    StartGroup,
    EndGroup,
}

impl WireType {
    fn from_bits(bits: u64) -> Result<WireType> {
        match bits {
            0 => Ok(WireType::Varint),
            1 => Ok(WireType::Fixed64),
            2 => Ok(WireType::LengthDelimited),
            3 => Ok(WireType::StartGroup),
            4 => Ok(WireType::EndGroup),
            5 => Ok(WireType::Fixed32),
            other => Err(ConvertError::MalformedInput(format!(
                "invalid wire type: bits={other}"
            ))),
        }
    }
}

pub(crate) fn zigzag32(raw: u64) -> i32 {
    let raw = raw as u32;
    ((raw >> 1) as i32) ^ -((raw & 1) as i32)
}

pub(crate) fn zigzag64(raw: u64) -> i64 {
    ((raw >> 1) as i64) ^ -((raw & 1) as i64)
}

pub(crate) struct WireReader<R: Read> {
    reader: R,
    position: u64,
    limits: Vec<u64>,
}

impl<R: Read> WireReader<R> {
    pub(crate) fn new(reader: R) -> WireReader<R> {
        WireReader {
            reader,
            position: 0,
            limits: Vec::new(),
        }
    }

    pub(crate) fn at_limit(&self) -> bool {
        self.limits.last().is_some_and(|limit| self.position >= *limit)
    }

    pub(crate) fn push_limit(&mut self, len: u64) -> Result<()> {
        let end = self.position.checked_add(len).ok_or_else(|| {
            ConvertError::MalformedInput(format!("length prefix overflows stream: len={len}"))
        })?;
        if let Some(&outer) = self.limits.last() {
            if end > outer {
                return Err(ConvertError::MalformedInput(format!(
                    "length prefix crosses enclosing message: len={len}, outer_remaining={}",
                    outer - self.position
                )));
            }
        }
        self.limits.push(end);
        Ok(())
    }

    pub(crate) fn pop_limit(&mut self) -> Result<()> {
        match self.limits.pop() {
            Some(limit) if limit == self.position => Ok(()),
            Some(limit) => Err(ConvertError::MalformedInput(format!(
                "message body not fully consumed: position={}, limit={limit}",
                self.position
            ))),
            None => Err(ConvertError::MalformedInput(
                "no active message limit to pop".to_string(),
            )),
        }
    }

    fn check_bounds(&self, len: u64) -> Result<()> {
        if let Some(&limit) = self.limits.last() {
            match self.position.checked_add(len) {
                Some(end) if end <= limit => {}
                _ => {
                    return Err(ConvertError::MalformedInput(format!(
                        "read crosses message boundary: position={}, len={len}, limit={limit}",
                        self.position
                    )))
                }
            }
        }
        Ok(())
    }

    fn read_u8(&mut self) -> Result<u8> {
        self.check_bounds(1)?;
        let mut byte = [0u8; 1];
        self.reader.read_exact(&mut byte)?;
        self.position += 1;
        Ok(byte[0])
    }

    fn read_u8_opt(&mut self) -> Result<Option<u8>> {
        self.check_bounds(1)?;
        let mut byte = [0u8; 1];
        loop {
            match self.reader.read(&mut byte) {
                Ok(0) => return Ok(None),
                Ok(_) => {
                    self.position += 1;
                    return Ok(Some(byte[0]));
                }
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
    }

    fn finish_varint(&mut self, first: u8) -> Result<u64> {
        let mut value = (first & 0x7f) as u64;
        let mut shift = 7;
        let mut byte = first;
        while byte & 0x80 != 0 {
            if shift >= MAX_VARINT_BYTES * 7 {
                return Err(ConvertError::MalformedInput(format!(
                    "varint exceeds 10 bytes: position={}",
                    self.position
                )));
            }
            byte = self.read_u8()?;
            value |= ((byte & 0x7f) as u64) << shift;
            shift += 7;
        }
        Ok(value)
    }

    pub(crate) fn read_varint(&mut self) -> Result<u64> {
        let first = self.read_u8()?;
        self.finish_varint(first)
    }

    /// Reads a varint, reporting a clean end of stream as `None`. Used for
    /// the outer record framing, where running out of input is normal.
    pub(crate) fn read_varint_opt(&mut self) -> Result<Option<u64>> {
        match self.read_u8_opt()? {
            None => Ok(None),
            Some(first) => Ok(Some(self.finish_varint(first)?)),
        }
    }

    /// Reads the next field tag, or `None` at the end of the active region.
    pub(crate) fn read_tag(&mut self) -> Result<Option<(u32, WireType)>> {
        if self.at_limit() {
            return Ok(None);
        }
        let tag = if self.limits.is_empty() {
            match self.read_varint_opt()? {
                None => return Ok(None),
                Some(tag) => tag,
            }
        } else {
            self.read_varint()?
        };
        let number = tag >> 3;
        if number == 0 {
            return Err(ConvertError::MalformedInput(format!(
                "field number zero in tag: position={}",
                self.position
            )));
        }
        let number = u32::try_from(number).map_err(|_| {
            ConvertError::MalformedInput(format!("field number out of range: number={number}"))
        })?;
        Ok(Some((number, WireType::from_bits(tag & 0x7)?)))
    }

    pub(crate) fn read_fixed32(&mut self) -> Result<u32> {
        self.check_bounds(4)?;
        let mut buf = [0u8; 4];
        self.reader.read_exact(&mut buf)?;
        self.position += 4;
        Ok(u32::from_le_bytes(buf))
    }

    pub(crate) fn read_fixed64(&mut self) -> Result<u64> {
        self.check_bounds(8)?;
        let mut buf = [0u8; 8];
        self.reader.read_exact(&mut buf)?;
        self.position += 8;
        Ok(u64::from_le_bytes(buf))
    }

    pub(crate) fn read_bytes(&mut self, len: u64) -> Result<Vec<u8>> {
        self.check_bounds(len)?;
        let len = usize::try_from(len).map_err(|_| {
            ConvertError::MalformedInput(format!("length prefix too large: len={len}"))
        })?;
        let mut buf = vec![0u8; len];
        self.reader.read_exact(&mut buf)?;
        self.position += len as u64;
        Ok(buf)
    }

    pub(crate) fn skip(&mut self, mut n: u64) -> Result<()> {
        self.check_bounds(n)?;
        let mut scratch = [0u8; 512];
        while n > 0 {
            let step = n.min(scratch.len() as u64) as usize;
            self.reader.read_exact(&mut scratch[..step])?;
            self.position += step as u64;
            n -= step as u64;
        }
        Ok(())
    }

    /// Skips one payload of the given wire type.
    pub(crate) fn skip_field(&mut self, wire_type: WireType) -> Result<()> {
        match wire_type {
            WireType::Varint => {
                self.read_varint()?;
                Ok(())
            }
            WireType::Fixed32 => self.skip(4),
            WireType::Fixed64 => self.skip(8),
            WireType::LengthDelimited => {
                let len = self.read_varint()?;
                self.skip(len)
            }
            WireType::StartGroup | WireType::EndGroup => Err(ConvertError::UnsupportedGroups(
                format!("group wire type on the wire: position={}", self.position),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_varint_roundtrip() {
        let bytes = [0x96, 0x01, 0x00, 0xff, 0xff, 0xff, 0xff, 0x0f];
        let mut wire = WireReader::new(&bytes[..]);
        assert_eq!(wire.read_varint().unwrap(), 150);
        assert_eq!(wire.read_varint().unwrap(), 0);
        assert_eq!(wire.read_varint().unwrap(), u32::MAX as u64);
        assert!(wire.read_varint_opt().unwrap().is_none());
    }

    #[test]
    fn test_zigzag() {
        assert_eq!(zigzag32(0), 0);
        assert_eq!(zigzag32(1), -1);
        assert_eq!(zigzag32(2), 1);
        assert_eq!(zigzag64(3), -2);
        assert_eq!(zigzag64(4), 2);
    }

    #[test]
    fn test_limits_bound_reads() {
        let bytes = [1u8, 2, 3, 4];
        let mut wire = WireReader::new(&bytes[..]);
        wire.push_limit(2).unwrap();
        assert_eq!(wire.read_varint().unwrap(), 1);
        assert!(!wire.at_limit());
        assert_eq!(wire.read_varint().unwrap(), 2);
        assert!(wire.at_limit());
        assert!(wire.read_tag().unwrap().is_none());
        wire.pop_limit().unwrap();
        assert_eq!(wire.read_varint().unwrap(), 3);
    }

    #[test]
    fn test_pop_checks_consumption() {
        let bytes = [1u8, 2, 3];
        let mut wire = WireReader::new(&bytes[..]);
        wire.push_limit(2).unwrap();
        wire.read_varint().unwrap();
        assert!(wire.pop_limit().is_err());
    }

    #[test]
    fn test_nested_limit_cannot_widen() {
        let bytes = [0u8; 8];
        let mut wire = WireReader::new(&bytes[..]);
        wire.push_limit(4).unwrap();
        assert!(wire.push_limit(5).is_err());
    }
}
