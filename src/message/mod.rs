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

//! CoAP message types and wire codec.
//!
//! [`Packet`] is an owned, mutable representation of a single CoAP message.
//! Options are kept sorted by option number, so they may be added in any
//! order and still serialize with valid deltas.

mod msg_code;
pub use msg_code::{MsgCode, MsgCodeClass};

mod msg_type;
pub use msg_type::MsgType;

mod token;
pub use token::MsgToken;

pub mod codec;
pub mod util;

use crate::error::Error;
use crate::option::{ContentFormat, OptionNumber};

/// The one and only CoAP protocol version carried on the wire.
pub const COAP_VERSION: u8 = 1;

/// Maximum number of bytes in a message token.
pub const MAX_TOKEN_SIZE: usize = 8;

/// An owned CoAP message.
#[derive(Clone, Default, Eq, PartialEq)]
pub struct Packet {
    msg_type: MsgType,
    code: MsgCode,
    msg_id: u16,
    token: MsgToken,
    // Sorted by option number; equal numbers keep insertion order.
    options: Vec<(OptionNumber, Vec<u8>)>,
    payload: Vec<u8>,
}

impl Packet {
    /// Creates an empty message of the given type and code. The message id
    /// is zero until the session layer assigns one at send time.
    pub fn new(msg_type: MsgType, code: MsgCode) -> Packet {
        Packet {
            msg_type,
            code,
            ..Packet::default()
        }
    }

    /// Creates an outgoing request.
    pub fn new_request(code: MsgCode, msg_type: MsgType) -> Packet {
        Packet::new(msg_type, code)
    }

    /// Creates a response matched to `request`: the token is inherited.
    /// Confirmable requests get a piggybacked acknowledgement carrying the
    /// same message id; non-confirmable ones get a non-confirmable response
    /// whose message id the session layer assigns at send time.
    pub fn new_response(request: &Packet) -> Packet {
        let (msg_type, msg_id) = if request.msg_type == MsgType::Con {
            (MsgType::Ack, request.msg_id)
        } else {
            (MsgType::Non, 0)
        };
        Packet {
            msg_type,
            code: MsgCode::SuccessContent,
            msg_id,
            token: request.token,
            ..Packet::default()
        }
    }

    /// Creates a reset message matched to `packet`, used to reject it.
    pub fn new_reset(packet: &Packet) -> Packet {
        Packet {
            msg_type: MsgType::Rst,
            code: MsgCode::Empty,
            msg_id: packet.msg_id,
            ..Packet::default()
        }
    }

    pub fn msg_type(&self) -> MsgType {
        self.msg_type
    }

    pub fn set_msg_type(&mut self, msg_type: MsgType) {
        self.msg_type = msg_type;
    }

    pub fn code(&self) -> MsgCode {
        self.code
    }

    pub fn set_code(&mut self, code: MsgCode) {
        self.code = code;
    }

    pub fn msg_id(&self) -> u16 {
        self.msg_id
    }

    pub fn set_msg_id(&mut self, msg_id: u16) {
        self.msg_id = msg_id;
    }

    pub fn token(&self) -> MsgToken {
        self.token
    }

    pub fn set_token(&mut self, token: MsgToken) {
        self.token = token;
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    pub fn payload_mut(&mut self) -> &mut Vec<u8> {
        &mut self.payload
    }

    pub fn set_payload(&mut self, payload: Vec<u8>) {
        self.payload = payload;
    }

    /// Adds one option, keeping the option list sorted. Repeated additions
    /// of the same number preserve their relative order.
    pub fn add_option(&mut self, key: OptionNumber, value: &[u8]) {
        let at = self
            .options
            .iter()
            .position(|(k, _)| *k > key)
            .unwrap_or(self.options.len());
        self.options.insert(at, (key, value.to_vec()));
    }

    /// Splits `path` on `/` and adds one URI_PATH option per non-empty
    /// segment.
    pub fn add_uri_path_option(&mut self, path: &str) {
        for segment in path.split('/').filter(|s| !s.is_empty()) {
            self.add_option(OptionNumber::URI_PATH, segment.as_bytes());
        }
    }

    /// Adds one URI_QUERY option, e.g. `rt=oic.r.light`.
    pub fn add_uri_query_option(&mut self, query: &str) {
        self.add_option(OptionNumber::URI_QUERY, query.as_bytes());
    }

    /// Sets the CONTENT_FORMAT option, replacing any existing one.
    pub fn set_content_format(&mut self, format: ContentFormat) {
        self.remove_options(OptionNumber::CONTENT_FORMAT);
        let mut buf = [0u8; 4];
        let encoded = util::encode_u32(format.0 as u32, &mut buf).to_vec();
        self.add_option(OptionNumber::CONTENT_FORMAT, &encoded);
    }

    /// Returns the decoded CONTENT_FORMAT option, if present and well-formed.
    pub fn content_format(&self) -> Option<ContentFormat> {
        self.find_first_option(OptionNumber::CONTENT_FORMAT)
            .and_then(util::try_decode_u16)
            .map(ContentFormat)
    }

    /// Sets the OBSERVE option to the low 24 bits of `value`, replacing any
    /// existing one.
    pub fn set_observe(&mut self, value: u32) {
        self.remove_options(OptionNumber::OBSERVE);
        let mut buf = [0u8; 4];
        let encoded = util::encode_u32(value & 0x00FF_FFFF, &mut buf).to_vec();
        self.add_option(OptionNumber::OBSERVE, &encoded);
    }

    /// Returns the decoded OBSERVE option, if present and well-formed.
    pub fn observe(&self) -> Option<u32> {
        let value = self.find_first_option(OptionNumber::OBSERVE)?;
        if value.len() > 3 {
            return None;
        }
        util::try_decode_u32(value)
    }

    /// Returns the value of the first option with the given number.
    pub fn find_first_option(&self, key: OptionNumber) -> Option<&[u8]> {
        self.options
            .iter()
            .find(|(k, _)| *k == key)
            .map(|(_, v)| v.as_slice())
    }

    /// Iterates the values of every option with the given number, in order.
    pub fn find_options(&self, key: OptionNumber) -> impl Iterator<Item = &[u8]> {
        self.options
            .iter()
            .filter(move |(k, _)| *k == key)
            .map(|(_, v)| v.as_slice())
    }

    /// Removes every option with the given number.
    pub fn remove_options(&mut self, key: OptionNumber) {
        self.options.retain(|(k, _)| *k != key);
    }

    /// Reassembles the request path from the URI_PATH options, with a
    /// leading `/`.
    pub fn uri_path(&self) -> String {
        let mut path = String::new();
        for segment in self.find_options(OptionNumber::URI_PATH) {
            path.push('/');
            path.push_str(&String::from_utf8_lossy(segment));
        }
        if path.is_empty() {
            path.push('/');
        }
        path
    }

    /// Iterates the URI_QUERY options that are valid UTF-8.
    pub fn uri_queries(&self) -> impl Iterator<Item = &str> {
        self.find_options(OptionNumber::URI_QUERY)
            .filter_map(|v| std::str::from_utf8(v).ok())
    }

    /// A CoAP ping: confirmable, empty code, no token, options or payload.
    pub fn is_ping(&self) -> bool {
        self.msg_type == MsgType::Con
            && self.code == MsgCode::Empty
            && self.token.is_empty()
            && self.options.is_empty()
            && self.payload.is_empty()
    }

    /// Encodes this message for the wire.
    pub fn serialize(&self) -> Result<Vec<u8>, Error> {
        if self.token.len() > MAX_TOKEN_SIZE {
            return Err(Error::InvalidArgument);
        }

        let mut buffer = Vec::with_capacity(4 + self.token.len() + self.payload.len() + 16);
        buffer.push((COAP_VERSION << 6) | ((self.msg_type as u8) << 4) | self.token.len() as u8);
        buffer.push(self.code as u8);
        buffer.extend_from_slice(&self.msg_id.to_be_bytes());
        buffer.extend_from_slice(self.token.as_bytes());

        let mut prev_key = OptionNumber(0);
        for (key, value) in &self.options {
            codec::encode_option(&mut buffer, prev_key, *key, value)?;
            prev_key = *key;
        }

        if !self.payload.is_empty() {
            buffer.push(0xFF);
            buffer.extend_from_slice(&self.payload);
        }

        Ok(buffer)
    }

    /// Decodes a datagram into a message, rejecting anything that is not
    /// well-formed CoAP version 1.
    pub fn parse(data: &[u8]) -> Result<Packet, Error> {
        if data.len() < 4 {
            return Err(Error::ParseFailure);
        }

        if data[0] >> 6 != COAP_VERSION {
            return Err(Error::ParseFailure);
        }

        let msg_type = MsgType::try_from((data[0] >> 4) & 0x3).ok_or(Error::ParseFailure)?;
        let token_len = (data[0] & 0xF) as usize;
        if token_len > MAX_TOKEN_SIZE {
            return Err(Error::ParseFailure);
        }

        let code = MsgCode::try_from(data[1]).ok_or(Error::ParseFailure)?;
        let msg_id = u16::from_be_bytes([data[2], data[3]]);

        if data.len() < 4 + token_len {
            return Err(Error::ParseFailure);
        }
        let token = MsgToken::new(&data[4..4 + token_len]);

        let mut options = Vec::new();
        let mut iter = data[4 + token_len..].iter();
        let mut last_key = OptionNumber(0);
        while let Some((key, value)) = codec::decode_option(&mut iter, last_key)? {
            options.push((key, value.to_vec()));
            last_key = key;
        }

        Ok(Packet {
            msg_type,
            code,
            msg_id,
            token,
            options,
            payload: iter.as_slice().to_vec(),
        })
    }
}

impl std::fmt::Debug for Packet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Packet[{:?} {:?} MID:{:04X} TOK:{}",
            self.msg_type, self.code, self.msg_id, self.token
        )?;
        for (key, value) in &self.options {
            write!(f, " {}({})", key, value.len())?;
        }
        if !self.payload.is_empty() {
            write!(f, " PLEN:{}", self.payload.len())?;
        }
        f.write_str("]")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_request_bytes() {
        // CON GET, MID 0x1234, 1-byte token, /oic/res?rt=x
        let data = [
            0x41, 0x01, 0x12, 0x34, 0xAA, // header + token
            0xB3, b'o', b'i', b'c', // Uri-Path "oic"
            0x03, b'r', b'e', b's', // Uri-Path "res"
            0x44, b'r', b't', b'=', b'x', // Uri-Query "rt=x"
        ];

        let pkt = Packet::parse(&data).unwrap();
        assert_eq!(pkt.msg_type(), MsgType::Con);
        assert_eq!(pkt.code(), MsgCode::MethodGet);
        assert_eq!(pkt.msg_id(), 0x1234);
        assert_eq!(pkt.token(), MsgToken::new(&[0xAA]));
        assert_eq!(pkt.uri_path(), "/oic/res");
        assert_eq!(pkt.uri_queries().collect::<Vec<_>>(), vec!["rt=x"]);
        assert!(pkt.payload().is_empty());

        assert_eq!(pkt.serialize().unwrap(), data);
    }

    #[test]
    fn options_sort_regardless_of_add_order() {
        let mut pkt = Packet::new(MsgType::Non, MsgCode::MethodGet);
        pkt.add_uri_query_option("if=oic.if.baseline");
        pkt.set_content_format(crate::option::ContentFormat::APPLICATION_CBOR);
        pkt.add_uri_path_option("/oic/res");
        pkt.set_observe(0);

        let serialized = pkt.serialize().unwrap();
        let parsed = Packet::parse(&serialized).unwrap();
        assert_eq!(parsed, pkt);
        assert_eq!(parsed.uri_path(), "/oic/res");
        assert_eq!(parsed.observe(), Some(0));
        assert_eq!(
            parsed.content_format(),
            Some(crate::option::ContentFormat::APPLICATION_CBOR)
        );
    }

    #[test]
    fn payload_round_trip() {
        let mut pkt = Packet::new(MsgType::Ack, MsgCode::SuccessContent);
        pkt.set_msg_id(7);
        pkt.set_token(MsgToken::new(b"abcd1234"));
        pkt.set_payload(vec![0x82, 0x03, 0xA0]);

        let parsed = Packet::parse(&pkt.serialize().unwrap()).unwrap();
        assert_eq!(parsed.payload(), &[0x82, 0x03, 0xA0]);
        assert_eq!(parsed.token(), pkt.token());
    }

    #[test]
    fn observe_sequence_truncates_to_24_bits() {
        let mut pkt = Packet::new(MsgType::Con, MsgCode::SuccessContent);
        pkt.set_observe(0x0100_0002);
        assert_eq!(pkt.observe(), Some(2));

        pkt.set_observe(0x00FF_FFFF);
        assert_eq!(pkt.observe(), Some(0x00FF_FFFF));
    }

    #[test]
    fn response_inherits_token_and_ack() {
        let mut req = Packet::new(MsgType::Con, MsgCode::MethodGet);
        req.set_msg_id(0xBEEF);
        req.set_token(MsgToken::new(&[1, 2, 3]));

        let rsp = Packet::new_response(&req);
        assert_eq!(rsp.msg_type(), MsgType::Ack);
        assert_eq!(rsp.msg_id(), 0xBEEF);
        assert_eq!(rsp.token(), req.token());

        // A non-confirmable request gets a non-confirmable response under a
        // new message id, not the request's.
        let mut non_req = req.clone();
        non_req.set_msg_type(MsgType::Non);
        let non_rsp = Packet::new_response(&non_req);
        assert_eq!(non_rsp.msg_type(), MsgType::Non);
        assert_eq!(non_rsp.msg_id(), 0);
        assert_eq!(non_rsp.token(), non_req.token());
    }

    #[test]
    fn ping_detection() {
        let mut ping = Packet::new(MsgType::Con, MsgCode::Empty);
        ping.set_msg_id(9);
        assert!(ping.is_ping());

        let parsed = Packet::parse(&ping.serialize().unwrap()).unwrap();
        assert!(parsed.is_ping());

        let reset = Packet::new_reset(&parsed);
        assert_eq!(reset.msg_type(), MsgType::Rst);
        assert_eq!(reset.msg_id(), 9);

        ping.set_token(MsgToken::new(&[1]));
        assert!(!ping.is_ping());
    }

    #[test]
    fn malformed_inputs_rejected() {
        // Too short.
        assert!(Packet::parse(&[0x40, 0x01, 0x00]).is_err());
        // Wrong version.
        assert!(Packet::parse(&[0x81, 0x01, 0x00, 0x01]).is_err());
        // Token length beyond the header.
        assert!(Packet::parse(&[0x48, 0x01, 0x00, 0x01, 0xAA]).is_err());
        // Reserved token length.
        assert!(Packet::parse(&[0x4F, 0x01, 0x00, 0x01]).is_err());
        // Unknown code.
        assert!(Packet::parse(&[0x40, 0xFF, 0x00, 0x01]).is_err());
    }
}
