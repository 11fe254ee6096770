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

//! Low-level option codec functions.
//!
//! Options are encoded as deltas against the previous option number, with
//! 4-bit nibbles extended through the 13/269 escape values of RFC 7252
//! section 3.1.

use crate::error::Error;
use crate::option::{OptionNumber, MAX_OPTION_VALUE_SIZE};

/// Calculates the encoded size of a CoAP option.
pub fn calc_option_size(prev_key: OptionNumber, key: OptionNumber, mut value_len: usize) -> usize {
    if value_len >= 269 {
        value_len += 2;
    } else if value_len >= 13 {
        value_len += 1;
    }

    let option_delta = key - prev_key;

    if option_delta >= 269 {
        value_len += 3;
    } else if option_delta >= 13 {
        value_len += 2;
    } else {
        value_len += 1;
    }

    value_len
}

/// Splits a delta or length into its header nibble and extension bytes.
fn encode_nibble(value: u16, out: &mut Vec<u8>) -> u8 {
    if value >= 269 {
        let ext = value - 269;
        out.push((ext >> 8) as u8);
        out.push(ext as u8);
        14
    } else if value >= 13 {
        out.push((value - 13) as u8);
        13
    } else {
        value as u8
    }
}

/// Reads the extension bytes selected by a header nibble.
fn decode_nibble(nibble: u8, iter: &mut core::slice::Iter<'_, u8>) -> Result<u16, Error> {
    macro_rules! try_next {
        ($iter:expr) => {
            match ($iter).next() {
                Some(x) => *x as u16,
                None => return Err(Error::ParseFailure),
            }
        };
    }

    match nibble {
        13 => Ok(13 + try_next!(iter)),
        14 => {
            let msb = try_next!(iter);
            Ok(269 + (msb << 8) + try_next!(iter))
        }
        15 => Err(Error::ParseFailure),
        x => Ok(x as u16),
    }
}

/// Appends one encoded option to `buffer`. Options must be appended in
/// non-descending key order.
pub fn encode_option(
    buffer: &mut Vec<u8>,
    prev_key: OptionNumber,
    key: OptionNumber,
    value: &[u8],
) -> Result<(), Error> {
    if prev_key > key {
        return Err(Error::InvalidArgument);
    }

    if value.len() > MAX_OPTION_VALUE_SIZE {
        warn!("value_len:{}, max:{}", value.len(), MAX_OPTION_VALUE_SIZE);
        return Err(Error::InvalidArgument);
    }

    let header_index = buffer.len();
    buffer.push(0);

    let delta_nibble = encode_nibble(key - prev_key, buffer);
    let len_nibble = encode_nibble(value.len() as u16, buffer);
    buffer[header_index] = (delta_nibble << 4) | len_nibble;

    buffer.extend_from_slice(value);
    Ok(())
}

/// Decodes one option from a `core::slice::Iter`, which can be obtained from
/// a byte slice. The iterator is then advanced to the next option.
///
/// Will return `Ok(None)` if it either encounters the end-of-options marker
/// (0xFF) or if the given iterator has been fully consumed.
pub fn decode_option<'a>(
    iter: &mut core::slice::Iter<'a, u8>,
    last_option: OptionNumber,
) -> Result<Option<(OptionNumber, &'a [u8])>, Error> {
    let header: u8 = match iter.next() {
        Some(x) => *x,
        None => return Ok(None),
    };

    if header == 0xFF {
        // End of options marker.
        return Ok(None);
    }

    let key_delta = decode_nibble(header >> 4, iter)?;
    let len = decode_nibble(header & 0xF, iter)? as usize;

    if last_option.0 > u16::max_value() - key_delta {
        // Don't let the key wrap.
        return Err(Error::ParseFailure);
    }

    if len > iter.as_slice().len() {
        return Err(Error::ParseFailure);
    }

    if len == 0 {
        return Ok(Some((last_option + key_delta, &[])));
    }

    let value: &'a [u8] = &iter.as_slice()[..len];
    iter.nth(len - 1);

    Ok(Some((last_option + key_delta, value)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn round_trip(prev: u16, key: u16, value: &[u8]) {
        let mut buffer = Vec::new();
        encode_option(&mut buffer, OptionNumber(prev), OptionNumber(key), value).unwrap();
        assert_eq!(buffer.len(), calc_option_size(OptionNumber(prev), OptionNumber(key), value.len()));

        let mut iter = buffer.iter();
        let (decoded_key, decoded_value) = decode_option(&mut iter, OptionNumber(prev))
            .unwrap()
            .unwrap();
        assert_eq!(decoded_key, OptionNumber(key));
        assert_eq!(decoded_value, value);
        assert!(iter.as_slice().is_empty());
    }

    #[test]
    fn short_deltas_and_lengths() {
        round_trip(0, 11, b"oic");
        round_trip(11, 11, b"res");
        round_trip(11, 12, &[60]);
        round_trip(0, 0, &[]);
    }

    #[test]
    fn nibble_escape_boundaries() {
        // One below, at, and above each escape value.
        for delta in [12u16, 13, 14, 268, 269, 270, 1024] {
            round_trip(0, delta, b"x");
        }
        for len in [12usize, 13, 14, 268, 269, 270] {
            round_trip(0, 11, &vec![0xAB; len]);
        }
    }

    #[test]
    fn descending_keys_rejected() {
        let mut buffer = Vec::new();
        assert_eq!(
            encode_option(&mut buffer, OptionNumber(15), OptionNumber(11), b"x"),
            Err(Error::InvalidArgument)
        );
    }

    #[test]
    fn truncated_option_rejected() {
        // Claims 13+2 value bytes but carries none.
        let buffer = [0xBDu8, 0x02];
        let mut iter = buffer.iter();
        assert_eq!(
            decode_option(&mut iter, OptionNumber(0)),
            Err(Error::ParseFailure)
        );
    }

    #[test]
    fn reserved_nibble_rejected() {
        let buffer = [0xF1u8, 0x00];
        let mut iter = buffer.iter();
        assert_eq!(
            decode_option(&mut iter, OptionNumber(0)),
            Err(Error::ParseFailure)
        );
    }

    #[test]
    fn end_marker_stops_iteration() {
        let buffer = [0xFFu8, 0xDE, 0xAD];
        let mut iter = buffer.iter();
        assert_eq!(decode_option(&mut iter, OptionNumber(0)), Ok(None));
    }
}
