// Copyright 2016 Intel Corporation. All rights reserved.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     https://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//

//! Variable-length integer helpers for option values.
//!
//! CoAP encodes integer option values big-endian with all leading zero
//! bytes stripped, so the value zero is encoded as the empty string.

/// Encodes `value` into `buffer` and returns the used prefix.
pub fn encode_u32(value: u32, buffer: &mut [u8; 4]) -> &[u8] {
    *buffer = value.to_be_bytes();
    let skip = (value.leading_zeros() / 8) as usize;
    &buffer[skip..]
}

/// Decodes a stripped big-endian integer. Returns `None` if the slice is
/// longer than four bytes.
pub fn try_decode_u32(buffer: &[u8]) -> Option<u32> {
    if buffer.len() > 4 {
        return None;
    }
    let mut value = 0u32;
    for b in buffer {
        value = (value << 8) | *b as u32;
    }
    Some(value)
}

/// Decodes a stripped big-endian integer no wider than 16 bits.
pub fn try_decode_u16(buffer: &[u8]) -> Option<u16> {
    if buffer.len() > 2 {
        return None;
    }
    try_decode_u32(buffer).map(|x| x as u16)
}
