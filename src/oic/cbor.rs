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

//! CBOR codec for OIC payloads.
//!
//! Every payload carrying application data uses the envelope
//!
//! ```text
//! [ <payload-type>, { "href": <text>, "rep": { <fields> } } ]
//! ```
//!
//! [`MapWriter`] streams fields into the `rep` map of an outgoing packet;
//! [`MapReader`] iterates the `rep` map of an inbound one. Neither ever
//! emits a bare map.

use minicbor::data::Type;
use minicbor::{Decoder, Encoder};

use crate::error::Error;
use crate::message::Packet;
use crate::option::ContentFormat;

/// Discriminant carried as the first element of the payload envelope.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum PayloadType {
    Platform = 1,
    Discovery = 2,
    Representation = 3,
}

impl PayloadType {
    pub fn try_from(x: u64) -> Option<PayloadType> {
        match x {
            1 => Some(PayloadType::Platform),
            2 => Some(PayloadType::Discovery),
            3 => Some(PayloadType::Representation),
            _ => None,
        }
    }
}

/// One typed value inside a representation map.
///
/// Unsigned and negative integers are distinct variants so that a value
/// read back from the wire compares equal to the one that was written.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Uint(u64),
    Int(i64),
    Simple(u8),
    Text(String),
    Bytes(Vec<u8>),
    Half(f32),
    Float(f32),
    Double(f64),
    Bool(bool),
}

/// One `key: value` entry of a representation map.
#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    pub key: String,
    pub value: Value,
}

impl Field {
    pub fn new(key: &str, value: Value) -> Field {
        Field {
            key: key.to_string(),
            value,
        }
    }

    pub fn uint(key: &str, value: u64) -> Field {
        Field::new(key, Value::Uint(value))
    }

    pub fn int(key: &str, value: i64) -> Field {
        Field::new(key, Value::Int(value))
    }

    pub fn text(key: &str, value: &str) -> Field {
        Field::new(key, Value::Text(value.to_string()))
    }

    pub fn bytes(key: &str, value: &[u8]) -> Field {
        Field::new(key, Value::Bytes(value.to_vec()))
    }

    pub fn boolean(key: &str, value: bool) -> Field {
        Field::new(key, Value::Bool(value))
    }
}

fn encode_value(e: &mut Encoder<&mut Vec<u8>>, value: &Value) -> Result<(), Error> {
    match value {
        Value::Uint(x) => e.u64(*x)?,
        Value::Int(x) => e.i64(*x)?,
        Value::Simple(x) => e.simple(*x)?,
        Value::Text(x) => e.str(x)?,
        Value::Bytes(x) => e.bytes(x)?,
        Value::Half(x) => e.f16(*x)?,
        Value::Float(x) => e.f32(*x)?,
        Value::Double(x) => e.f64(*x)?,
        Value::Bool(x) => e.bool(*x)?,
    };
    Ok(())
}

fn decode_value(d: &mut Decoder<'_>) -> Result<Value, Error> {
    let value = match d.datatype()? {
        Type::U8 | Type::U16 | Type::U32 | Type::U64 => Value::Uint(d.u64()?),
        Type::I8 | Type::I16 | Type::I32 | Type::I64 | Type::Int => Value::Int(d.i64()?),
        Type::Simple => Value::Simple(d.simple()?),
        Type::String => Value::Text(d.str()?.to_string()),
        Type::Bytes => Value::Bytes(d.bytes()?.to_vec()),
        Type::F16 => Value::Half(d.f16()?),
        Type::F32 => Value::Float(d.f32()?),
        Type::F64 => Value::Double(d.f64()?),
        Type::Bool => Value::Bool(d.bool()?),
        _ => return Err(Error::ParseFailure),
    };
    Ok(value)
}

/// Controls what [`MapWriter::close`] emits when no field was appended:
/// `NoContent` leaves the packet without a body, `Content` emits the
/// envelope around an empty map.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum MapType {
    NoContent,
    Content,
}

/// Streaming writer for the representation map of an outgoing packet.
///
/// The envelope is only materialized once it is known a body is wanted, so
/// a `NoContent` writer that is closed untouched costs nothing.
pub struct MapWriter<'a> {
    pkt: &'a mut Packet,
    href: String,
    payload_type: PayloadType,
    map_type: MapType,
    buf: Vec<u8>,
    opened: bool,
}

impl<'a> MapWriter<'a> {
    /// Creates a writer emitting a representation payload for `href`.
    pub fn new(pkt: &'a mut Packet, href: &str, map_type: MapType) -> MapWriter<'a> {
        MapWriter::new_typed(pkt, href, PayloadType::Representation, map_type)
    }

    /// Creates a writer with an explicit payload type (device and platform
    /// info use [`PayloadType::Platform`]).
    pub fn new_typed(
        pkt: &'a mut Packet,
        href: &str,
        payload_type: PayloadType,
        map_type: MapType,
    ) -> MapWriter<'a> {
        MapWriter {
            pkt,
            href: href.to_string(),
            payload_type,
            map_type,
            buf: Vec::new(),
            opened: false,
        }
    }

    /// Switches between `NoContent` and `Content`. Fails once the envelope
    /// has been written.
    pub fn set_type(&mut self, map_type: MapType) -> Result<(), Error> {
        if self.opened {
            return Err(Error::InvalidArgument);
        }
        self.map_type = map_type;
        Ok(())
    }

    fn open(&mut self) -> Result<(), Error> {
        if self.opened {
            return Ok(());
        }
        let mut e = Encoder::new(&mut self.buf);
        e.begin_array()?
            .u8(self.payload_type as u8)?
            .begin_map()?
            .str("href")?
            .str(&self.href)?
            .str("rep")?
            .begin_map()?;
        self.opened = true;
        Ok(())
    }

    /// Appends one field to the representation map.
    pub fn append(&mut self, field: &Field) -> Result<(), Error> {
        self.open()?;
        let mut e = Encoder::new(&mut self.buf);
        e.str(&field.key)?;
        encode_value(&mut e, &field.value)
    }

    /// Closes the representation map, the envelope map and the outer array,
    /// then installs the payload and content format on the packet. With
    /// `NoContent` and zero appended fields the packet body stays empty.
    pub fn close(mut self) -> Result<(), Error> {
        if !self.opened && self.map_type == MapType::NoContent {
            self.pkt.set_payload(Vec::new());
            return Ok(());
        }

        self.open()?;
        let mut e = Encoder::new(&mut self.buf);
        e.end()?.end()?.end()?;

        self.pkt.set_content_format(ContentFormat::APPLICATION_CBOR);
        self.pkt.set_payload(self.buf);
        Ok(())
    }
}

/// Iterator over the representation map of an inbound payload.
pub struct MapReader<'a> {
    d: Decoder<'a>,
    payload_type: PayloadType,
    href: Option<String>,
    // Entries left in the rep map, or None when indefinite-length.
    remaining: Option<u64>,
    done: bool,
}

impl<'a> MapReader<'a> {
    /// Positions a reader at the start of the `rep` map of `payload`.
    pub fn new(payload: &'a [u8]) -> Result<MapReader<'a>, Error> {
        let mut d = Decoder::new(payload);

        d.array()?;
        let payload_type = PayloadType::try_from(d.u64()?).ok_or(Error::ParseFailure)?;

        let outer_len = d.map()?;
        let mut href = None;
        let mut seen = 0u64;
        loop {
            if let Some(len) = outer_len {
                if seen >= len {
                    return Err(Error::ParseFailure);
                }
            } else if d.datatype()? == Type::Break {
                return Err(Error::ParseFailure);
            }
            seen += 1;

            let key = d.str()?;
            match key {
                "rep" => break,
                "href" => href = Some(d.str()?.to_string()),
                _ => d.skip()?,
            }
        }

        let remaining = d.map()?;
        Ok(MapReader {
            d,
            payload_type,
            href,
            remaining,
            done: false,
        })
    }

    /// Positions a reader at the `rep` map of a packet's body, rejecting
    /// packets that do not declare a CBOR content format.
    pub fn from_packet(pkt: &'a Packet) -> Result<MapReader<'a>, Error> {
        match pkt.content_format() {
            Some(ContentFormat::APPLICATION_CBOR) => MapReader::new(pkt.payload()),
            _ => Err(Error::ParseFailure),
        }
    }

    pub fn payload_type(&self) -> PayloadType {
        self.payload_type
    }

    pub fn href(&self) -> Option<&str> {
        self.href.as_deref()
    }
}

impl<'a> Iterator for MapReader<'a> {
    type Item = Result<Field, Error>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        match self.remaining {
            Some(0) => {
                self.done = true;
                return None;
            }
            Some(ref mut n) => *n -= 1,
            None => match self.d.datatype() {
                Ok(Type::Break) => {
                    self.d.set_position(self.d.position() + 1);
                    self.done = true;
                    return None;
                }
                Ok(_) => {}
                Err(e) => {
                    self.done = true;
                    return Some(Err(e.into()));
                }
            },
        }

        let entry = (|| {
            let key = self.d.str()?.to_string();
            let value = decode_value(&mut self.d)?;
            Ok(Field { key, value })
        })();

        if entry.is_err() {
            self.done = true;
        }
        Some(entry)
    }
}

/// Splits a blank-separated value list into owned strings.
pub fn bsv_split(text: &str) -> Vec<String> {
    text.split(' ')
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Joins strings back into a blank-separated value list.
pub fn bsv_join(items: &[String]) -> String {
    items.join(" ")
}

/// Decodes a string list that is either a BSV text string (legacy peers)
/// or a CBOR array of text strings (newer peers).
pub fn decode_string_list(d: &mut Decoder<'_>) -> Result<Vec<String>, Error> {
    match d.datatype()? {
        Type::String => Ok(bsv_split(d.str()?)),
        Type::Array | Type::ArrayIndef => {
            let len = d.array()?;
            let mut out = Vec::new();
            match len {
                Some(len) => {
                    for _ in 0..len {
                        out.push(d.str()?.to_string());
                    }
                }
                None => loop {
                    if d.datatype()? == Type::Break {
                        d.set_position(d.position() + 1);
                        break;
                    }
                    out.push(d.str()?.to_string());
                },
            }
            Ok(out)
        }
        _ => Err(Error::ParseFailure),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{MsgCode, MsgType};

    fn all_variants() -> Vec<Field> {
        vec![
            Field::uint("u", 13),
            Field::int("i", -42),
            Field::new("s", Value::Simple(16)),
            Field::text("t", "light"),
            Field::bytes("b", &[0xDE, 0xAD]),
            Field::new("h", Value::Half(1.5)),
            Field::new("f", Value::Float(0.25)),
            Field::new("d", Value::Double(1.0 / 3.0)),
            Field::boolean("o", true),
        ]
    }

    #[test]
    fn writer_reader_round_trip_every_variant() {
        let fields = all_variants();

        let mut pkt = Packet::new(MsgType::Ack, MsgCode::SuccessContent);
        let mut w = MapWriter::new(&mut pkt, "/sol/1", MapType::Content);
        for f in &fields {
            w.append(f).unwrap();
        }
        w.close().unwrap();

        assert_eq!(
            pkt.content_format(),
            Some(ContentFormat::APPLICATION_CBOR)
        );

        let r = MapReader::from_packet(&pkt).unwrap();
        assert_eq!(r.payload_type(), PayloadType::Representation);
        assert_eq!(r.href(), Some("/sol/1"));
        let back: Vec<Field> = r.map(|f| f.unwrap()).collect();
        assert_eq!(back, fields);
    }

    #[test]
    fn no_content_close_leaves_empty_body() {
        let mut pkt = Packet::new(MsgType::Ack, MsgCode::SuccessDeleted);
        let w = MapWriter::new(&mut pkt, "/sol/1", MapType::NoContent);
        w.close().unwrap();
        assert!(pkt.payload().is_empty());
        assert_eq!(pkt.content_format(), None);
    }

    #[test]
    fn content_close_emits_empty_map() {
        let mut pkt = Packet::new(MsgType::Ack, MsgCode::SuccessContent);
        let w = MapWriter::new(&mut pkt, "/x", MapType::Content);
        w.close().unwrap();
        assert!(!pkt.payload().is_empty());

        let r = MapReader::new(pkt.payload()).unwrap();
        assert_eq!(r.count(), 0);
    }

    #[test]
    fn set_type_fails_after_first_append() {
        let mut pkt = Packet::new(MsgType::Ack, MsgCode::SuccessContent);
        let mut w = MapWriter::new(&mut pkt, "/x", MapType::NoContent);
        w.set_type(MapType::Content).unwrap();
        w.append(&Field::uint("a", 1)).unwrap();
        assert_eq!(w.set_type(MapType::NoContent), Err(Error::InvalidArgument));
    }

    #[test]
    fn reader_handles_definite_containers() {
        // Hand-built definite-length envelope: [3, {"href": "/x", "rep": {"a": 1}}]
        let mut buf = Vec::new();
        let mut e = Encoder::new(&mut buf);
        e.array(2)
            .unwrap()
            .u8(3)
            .unwrap()
            .map(2)
            .unwrap()
            .str("href")
            .unwrap()
            .str("/x")
            .unwrap()
            .str("rep")
            .unwrap()
            .map(1)
            .unwrap()
            .str("a")
            .unwrap()
            .u8(1)
            .unwrap();

        let r = MapReader::new(&buf).unwrap();
        let fields: Vec<Field> = r.map(|f| f.unwrap()).collect();
        assert_eq!(fields, vec![Field::uint("a", 1)]);
    }

    #[test]
    fn malformed_rep_entry_reported_once() {
        // Envelope whose rep map key is an integer rather than text.
        let mut buf = Vec::new();
        let mut e = Encoder::new(&mut buf);
        e.array(2)
            .unwrap()
            .u8(3)
            .unwrap()
            .map(1)
            .unwrap()
            .str("rep")
            .unwrap()
            .map(1)
            .unwrap()
            .u8(7)
            .unwrap()
            .u8(1)
            .unwrap();

        let mut r = MapReader::new(&buf).unwrap();
        assert!(matches!(r.next(), Some(Err(_))));
        assert!(r.next().is_none());
    }

    #[test]
    fn truncated_envelope_rejected() {
        assert!(MapReader::new(&[0x82, 0x03]).is_err());
        assert!(MapReader::new(&[]).is_err());
    }

    #[test]
    fn unknown_payload_type_rejected() {
        let mut buf = Vec::new();
        let mut e = Encoder::new(&mut buf);
        e.array(2).unwrap().u8(9).unwrap().map(0).unwrap();
        assert!(MapReader::new(&buf).is_err());
    }

    #[test]
    fn bsv_round_trip() {
        assert_eq!(bsv_split("a b  c"), vec!["a", "b", "c"]);
        assert_eq!(bsv_split(""), Vec::<String>::new());
        assert_eq!(
            bsv_join(&["oic.if.baseline".to_string(), "oic.if.r".to_string()]),
            "oic.if.baseline oic.if.r"
        );
    }

    #[test]
    fn string_list_accepts_bsv_and_arrays() {
        let mut buf = Vec::new();
        Encoder::new(&mut buf).str("core.light oic.r.switch").unwrap();
        let mut d = Decoder::new(&buf);
        assert_eq!(
            decode_string_list(&mut d).unwrap(),
            vec!["core.light", "oic.r.switch"]
        );

        let mut buf = Vec::new();
        let mut e = Encoder::new(&mut buf);
        e.array(2).unwrap().str("a").unwrap().str("b").unwrap();
        let mut d = Decoder::new(&buf);
        assert_eq!(decode_string_list(&mut d).unwrap(), vec!["a", "b"]);
    }
}
