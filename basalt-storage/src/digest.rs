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

//! Probabilistic key-set digests.
//!
//! A bloom-style membership structure over a chunk's encoded keys: false
//! positives possible, false negatives never. Sized from the expected key
//! count at a 1% target false-positive rate with the optimal-bits formula.
//!
//! Probing uses double hashing (`h_i = h1 + i * h2`) computed directly over
//! the key bytes, so a digest restored from its wire form on any machine
//! answers identically to the one that was built.

use std::io::Cursor;

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};

use basalt_core::error::{BasaltError, Result};
use basalt_core::wire;

/// Target false-positive rate for chunk digests.
const TARGET_FPR: f64 = 0.01;

const MAX_HASHES: usize = 30;

/// Bloom-style digest over a set of encoded keys.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyDigest {
    bits: Vec<u64>,
    num_bits: usize,
    num_hashes: usize,
}

impl KeyDigest {
    /// An empty digest sized for `expected` keys.
    pub fn with_capacity(expected: usize) -> Self {
        let n = expected.max(1);
        let m = (-(n as f64) * TARGET_FPR.ln() / (2.0_f64.ln().powi(2))).ceil() as usize;
        let num_bits = m.max(64);
        let k = ((num_bits as f64 / n as f64) * 2.0_f64.ln()).ceil() as usize;
        Self {
            bits: vec![0; num_bits.div_ceil(64)],
            num_bits,
            num_hashes: k.clamp(1, MAX_HASHES),
        }
    }

    /// Build a digest over every key in the slice.
    pub fn build(keys: &[Vec<u8>]) -> Self {
        let mut digest = Self::with_capacity(keys.len());
        for key in keys {
            digest.insert(key);
        }
        digest
    }

    pub fn insert(&mut self, key: &[u8]) {
        let (h1, h2) = Self::hash_pair(key);
        for i in 0..self.num_hashes {
            let bit = (h1.wrapping_add(h2.wrapping_mul(i as u64)) % self.num_bits as u64) as usize;
            self.bits[bit / 64] |= 1 << (bit % 64);
        }
    }

    /// `false` means definitely absent; `true` means possibly present.
    pub fn contains(&self, key: &[u8]) -> bool {
        let (h1, h2) = Self::hash_pair(key);
        for i in 0..self.num_hashes {
            let bit = (h1.wrapping_add(h2.wrapping_mul(i as u64)) % self.num_bits as u64) as usize;
            if self.bits[bit / 64] & (1 << (bit % 64)) == 0 {
                return false;
            }
        }
        true
    }

    /// Two byte-level hashes for double hashing. Deterministic across
    /// processes and architectures.
    #[inline]
    fn hash_pair(key: &[u8]) -> (u64, u64) {
        let mut h1: u64 = 0xcbf2_9ce4_8422_2325;
        let mut h2: u64 = 0x9e37_79b9_7f4a_7c15;
        for (i, &b) in key.iter().enumerate() {
            h1 = h1.wrapping_mul(0x0000_0100_0000_01b3) ^ b as u64;
            h2 = h2
                .wrapping_mul(37)
                .wrapping_add(b as u64)
                .wrapping_add(i as u64);
        }
        // An all-zero h2 would degenerate every probe to h1.
        (h1, h2 | 1)
    }

    /// Wire form: `i32 num_bits | i32 num_hashes | u64 words...`
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(8 + self.bits.len() * 8);
        buf.write_i32::<BigEndian>(self.num_bits as i32)
            .expect("vec write");
        buf.write_i32::<BigEndian>(self.num_hashes as i32)
            .expect("vec write");
        for word in &self.bits {
            buf.write_u64::<BigEndian>(*word).expect("vec write");
        }
        buf
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let mut cursor = Cursor::new(bytes);
        let num_bits = wire::read_len(&mut cursor)?;
        let num_hashes = wire::read_len(&mut cursor)?;
        if num_bits == 0 || num_hashes == 0 || num_hashes > MAX_HASHES {
            return Err(BasaltError::Metadata(format!(
                "implausible digest parameters: {num_bits} bits, {num_hashes} hashes"
            )));
        }
        let words = num_bits.div_ceil(64);
        if bytes.len() != 8 + words * 8 {
            return Err(BasaltError::Metadata(format!(
                "digest buffer is {} bytes, expected {}",
                bytes.len(),
                8 + words * 8
            )));
        }
        let mut bits = Vec::with_capacity(words);
        for _ in 0..words {
            bits.push(cursor.read_u64::<BigEndian>().map_err(wire::truncated)?);
        }
        Ok(Self {
            bits,
            num_bits,
            num_hashes,
        })
    }

    pub fn size_bytes(&self) -> usize {
        8 + self.bits.len() * 8
    }
}
