// Copyright 2025 Sushanth (https://github.com/sushanthpy)
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Big-endian wire primitives shared by every persisted format.
//!
//! Conventions:
//! - integers are big-endian,
//! - strings are `u16` length-prefixed UTF-8,
//! - byte blobs are `i32` length-prefixed.
//!
//! Readers fail closed: truncated buffers, negative lengths, and invalid
//! UTF-8 all surface as [`BasaltError::Metadata`].

use std::io::Cursor;

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};

use crate::error::{BasaltError, Result};

/// Append a `u16` length-prefixed UTF-8 string.
pub fn write_utf(buf: &mut Vec<u8>, s: &str) {
    debug_assert!(s.len() <= u16::MAX as usize, "string too long for wire form");
    buf.write_u16::<BigEndian>(s.len() as u16).expect("vec write");
    buf.extend_from_slice(s.as_bytes());
}

/// Read a `u16` length-prefixed UTF-8 string.
pub fn read_utf(cursor: &mut Cursor<&[u8]>) -> Result<String> {
    let len = cursor.read_u16::<BigEndian>().map_err(truncated)? as usize;
    let bytes = take(cursor, len)?;
    String::from_utf8(bytes).map_err(|_| BasaltError::Metadata("invalid utf-8 string".into()))
}

/// Append an `i32` length-prefixed byte blob.
pub fn write_blob(buf: &mut Vec<u8>, bytes: &[u8]) {
    debug_assert!(bytes.len() <= i32::MAX as usize, "blob too long for wire form");
    buf.write_i32::<BigEndian>(bytes.len() as i32).expect("vec write");
    buf.extend_from_slice(bytes);
}

/// Read an `i32` length-prefixed byte blob.
pub fn read_blob(cursor: &mut Cursor<&[u8]>) -> Result<Vec<u8>> {
    let len = read_len(cursor)?;
    take(cursor, len)
}

/// Read a non-negative `i32`, failing closed on negative values.
pub fn read_len(cursor: &mut Cursor<&[u8]>) -> Result<usize> {
    let len = cursor.read_i32::<BigEndian>().map_err(truncated)?;
    if len < 0 {
        return Err(BasaltError::Metadata(format!("negative length {len}")));
    }
    Ok(len as usize)
}

/// Consume exactly `len` bytes from the cursor.
pub fn take(cursor: &mut Cursor<&[u8]>, len: usize) -> Result<Vec<u8>> {
    let pos = cursor.position() as usize;
    let data = *cursor.get_ref();
    let end = pos
        .checked_add(len)
        .filter(|&end| end <= data.len())
        .ok_or_else(|| BasaltError::Metadata("truncated buffer".into()))?;
    cursor.set_position(end as u64);
    Ok(data[pos..end].to_vec())
}

pub fn truncated(_: std::io::Error) -> BasaltError {
    BasaltError::Metadata("truncated buffer".into())
}
