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

//! OIC client: discovery, server information queries, resource requests and
//! observation.
//!
//! Observation prefers the native observe protocol; when a discovered
//! resource does not advertise itself as observable the client falls back
//! to polling it with plain GETs every [`POLL_OBSERVE_TIMEOUT`].

use std::cell::{Cell, RefCell};
use std::net::SocketAddr;
use std::rc::{Rc, Weak};
use std::time::Duration;

use minicbor::data::Type;
use minicbor::Decoder;
use rand::Rng;

use super::cbor::{decode_string_list, Field, MapReader, MapType, MapWriter, PayloadType, Value};
use super::{DeviceInfo, PlatformInfo};
use crate::coap::{CoapServer, PendingId, DEFAULT_DTLS_PORT};
use crate::error::Error;
use crate::mainloop::Scheduler;
use crate::message::{MsgCode, MsgToken, MsgType, Packet};
use crate::option::ContentFormat;
use crate::transport::Transport;

/// Poll interval for observing resources that do not support native
/// observe.
pub const POLL_OBSERVE_TIMEOUT: Duration = Duration::from_secs(10);

/// Invoked once per discovered resource, and with `None` when discovery
/// times out. Returning `false` stops the discovery.
pub type DiscoveryCallback = Box<dyn FnMut(Option<Rc<OicResource>>) -> bool>;

/// Invoked with the response to a one-shot request. A code of
/// [`MsgCode::Empty`] and no source address means the exchange timed out.
pub type ResponseCallback = Box<dyn FnOnce(MsgCode, Option<SocketAddr>, Vec<Field>)>;

/// Invoked for every notification (or poll result) of an observed resource.
pub type ObserveCallback = Box<dyn FnMut(MsgCode, Option<SocketAddr>, Vec<Field>)>;

pub type DeviceInfoCallback = Box<dyn FnOnce(Option<DeviceInfo>)>;
pub type PlatformInfoCallback = Box<dyn FnOnce(Option<PlatformInfo>)>;

enum Observation {
    Native { token: MsgToken },
    Polled { cancelled: Rc<Cell<bool>> },
}

/// A remote resource, as learned from discovery.
pub struct OicResource {
    href: String,
    device_id: Vec<u8>,
    types: Vec<String>,
    interfaces: Vec<String>,
    addr: SocketAddr,
    observable: bool,
    secure: bool,
    secure_port: u16,
    observation: RefCell<Option<Observation>>,
}

impl OicResource {
    /// Builds a descriptor by hand, for talking to a resource whose address
    /// and path are already known.
    pub fn new(addr: SocketAddr, href: &str) -> Rc<OicResource> {
        Rc::new(OicResource {
            href: href.to_string(),
            device_id: Vec::new(),
            types: Vec::new(),
            interfaces: Vec::new(),
            addr,
            observable: false,
            secure: false,
            secure_port: DEFAULT_DTLS_PORT,
            observation: RefCell::new(None),
        })
    }

    pub fn href(&self) -> &str {
        &self.href
    }

    pub fn device_id(&self) -> &[u8] {
        &self.device_id
    }

    pub fn types(&self) -> &[String] {
        &self.types
    }

    pub fn interfaces(&self) -> &[String] {
        &self.interfaces
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Whether the server advertised native observe support.
    pub fn observable(&self) -> bool {
        self.observable
    }

    pub fn secure(&self) -> bool {
        self.secure
    }

    pub fn is_observed(&self) -> bool {
        self.observation.borrow().is_some()
    }
}

impl std::fmt::Debug for OicResource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "OicResource[{} @ {}]", self.href, self.addr)
    }
}

/// A one-shot request against a discovered resource.
pub struct OicRequest {
    method: MsgCode,
    confirm: bool,
    fields: Vec<Field>,
}

impl OicRequest {
    pub fn new(method: MsgCode) -> OicRequest {
        OicRequest {
            method,
            confirm: true,
            fields: Vec::new(),
        }
    }

    pub fn get() -> OicRequest {
        OicRequest::new(MsgCode::MethodGet)
    }

    pub fn put() -> OicRequest {
        OicRequest::new(MsgCode::MethodPut)
    }

    pub fn post() -> OicRequest {
        OicRequest::new(MsgCode::MethodPost)
    }

    pub fn delete() -> OicRequest {
        OicRequest::new(MsgCode::MethodDelete)
    }

    /// Sends the request non-confirmably, trading reliability for not
    /// keeping retransmission state.
    pub fn non_confirmable(mut self) -> OicRequest {
        self.confirm = false;
        self
    }

    /// Appends one field to the request body.
    pub fn field(mut self, field: Field) -> OicRequest {
        self.fields.push(field);
        self
    }
}

/// The OIC client endpoint.
pub struct OicClient {
    sched: Rc<dyn Scheduler>,
    server: Rc<CoapServer>,
    dtls_server: Option<Rc<CoapServer>>,
    weak_self: RefCell<Weak<OicClient>>,
}

impl OicClient {
    /// Creates a client on an ephemeral UDP port.
    pub fn new(sched: Rc<dyn Scheduler>) -> Result<Rc<OicClient>, Error> {
        let server = CoapServer::bind_udp(sched.clone(), 0)?;
        OicClient::from_servers(sched, server, None)
    }

    /// Creates a client over explicit transports; `secure_transport` adds a
    /// DTLS endpoint used for resources flagged secure.
    pub fn with_transports(
        sched: Rc<dyn Scheduler>,
        transport: Rc<dyn Transport>,
        secure_transport: Option<Rc<dyn Transport>>,
    ) -> Result<Rc<OicClient>, Error> {
        let server = CoapServer::bind(sched.clone(), transport)?;
        let dtls = match secure_transport {
            Some(t) => Some(CoapServer::bind(sched.clone(), t)?),
            None => None,
        };
        OicClient::from_servers(sched, server, dtls)
    }

    fn from_servers(
        sched: Rc<dyn Scheduler>,
        server: Rc<CoapServer>,
        dtls_server: Option<Rc<CoapServer>>,
    ) -> Result<Rc<OicClient>, Error> {
        let client = Rc::new(OicClient {
            sched,
            server,
            dtls_server,
            weak_self: RefCell::new(Weak::new()),
        });
        *client.weak_self.borrow_mut() = Rc::downgrade(&client);
        Ok(client)
    }

    fn new_token() -> MsgToken {
        MsgToken::from(rand::thread_rng().gen::<u64>())
    }

    /// Picks the endpoint and destination for `res`: the DTLS endpoint with
    /// the advertised secure port for secure resources, the plain one
    /// otherwise.
    fn best_server(&self, res: &OicResource) -> Result<(Rc<CoapServer>, SocketAddr), Error> {
        if res.secure {
            match &self.dtls_server {
                Some(server) => {
                    let mut addr = res.addr;
                    addr.set_port(res.secure_port);
                    Ok((server.clone(), addr))
                }
                None => {
                    warn!("oic: {:?} requires DTLS but none is configured", res);
                    Err(Error::InvalidArgument)
                }
            }
        } else {
            Ok((self.server.clone(), res.addr))
        }
    }

    // ---- discovery ----

    /// Sends a non-confirmable `/oic/res` query to `addr` (typically one of
    /// the all-CoAP-nodes multicast groups) and reports each discovered
    /// resource. Empty filters match everything.
    pub fn find_resources(
        &self,
        addr: SocketAddr,
        resource_type: &str,
        interface: &str,
        mut cb: DiscoveryCallback,
    ) -> Result<PendingId, Error> {
        let mut pkt = Packet::new_request(MsgCode::MethodGet, MsgType::Non);
        pkt.set_token(OicClient::new_token());
        pkt.add_uri_path_option("/oic/res");
        if !resource_type.is_empty() {
            pkt.add_uri_query_option(&format!("rt={}", resource_type));
        }
        if !interface.is_empty() {
            pkt.add_uri_query_option(&format!("if={}", interface));
        }

        self.server.send_with_reply(
            pkt,
            addr,
            Box::new(move |reply| match reply {
                None => {
                    cb(None);
                    false
                }
                Some((pkt, src)) => {
                    if pkt.code() != MsgCode::SuccessContent {
                        // Servers with nothing to advertise answer 4.04;
                        // others may still reply.
                        return true;
                    }
                    match parse_discovery(pkt, src) {
                        Ok(resources) => {
                            for res in resources {
                                if !cb(Some(res)) {
                                    return false;
                                }
                            }
                            true
                        }
                        Err(e) => {
                            debug!("oic: bad discovery reply from {}: {}", src, e);
                            true
                        }
                    }
                }
            }),
        )
    }

    /// Stops a discovery started with [`find_resources`](Self::find_resources)
    /// without waiting for its timeout.
    pub fn cancel_find(&self, pending: PendingId) {
        self.server.cancel_pending(pending);
    }

    // ---- server information ----

    /// Queries `/oic/d` of the server hosting `res`, over DTLS when `res`
    /// is secure.
    pub fn get_server_info(
        &self,
        res: &OicResource,
        cb: DeviceInfoCallback,
    ) -> Result<PendingId, Error> {
        let (server, addr) = self.best_server(res)?;
        let mut cb = Some(cb);
        self.info_request(&server, addr, "/oic/d", move |pkt| {
            if let Some(cb) = cb.take() {
                cb(pkt.and_then(|pkt| parse_device_info(pkt).ok()));
            }
        })
    }

    pub fn get_server_info_by_addr(
        &self,
        addr: SocketAddr,
        cb: DeviceInfoCallback,
    ) -> Result<PendingId, Error> {
        let server = self.server.clone();
        let mut cb = Some(cb);
        self.info_request(&server, addr, "/oic/d", move |pkt| {
            if let Some(cb) = cb.take() {
                cb(pkt.and_then(|pkt| parse_device_info(pkt).ok()));
            }
        })
    }

    /// Queries `/oic/p` of the server hosting `res`, over DTLS when `res`
    /// is secure.
    pub fn get_platform_info(
        &self,
        res: &OicResource,
        cb: PlatformInfoCallback,
    ) -> Result<PendingId, Error> {
        let (server, addr) = self.best_server(res)?;
        let mut cb = Some(cb);
        self.info_request(&server, addr, "/oic/p", move |pkt| {
            if let Some(cb) = cb.take() {
                cb(pkt.and_then(|pkt| parse_platform_info(pkt).ok()));
            }
        })
    }

    pub fn get_platform_info_by_addr(
        &self,
        addr: SocketAddr,
        cb: PlatformInfoCallback,
    ) -> Result<PendingId, Error> {
        let server = self.server.clone();
        let mut cb = Some(cb);
        self.info_request(&server, addr, "/oic/p", move |pkt| {
            if let Some(cb) = cb.take() {
                cb(pkt.and_then(|pkt| parse_platform_info(pkt).ok()));
            }
        })
    }

    fn info_request(
        &self,
        server: &Rc<CoapServer>,
        addr: SocketAddr,
        path: &str,
        mut handle: impl FnMut(Option<&Packet>) + 'static,
    ) -> Result<PendingId, Error> {
        let mut pkt = Packet::new_request(MsgCode::MethodGet, MsgType::Con);
        pkt.set_token(OicClient::new_token());
        pkt.add_uri_path_option(path);

        server.send_with_reply(
            pkt,
            addr,
            Box::new(move |reply| {
                handle(reply.map(|(pkt, _)| pkt));
                false
            }),
        )
    }

    // ---- requests ----

    /// Sends `req` to `res` and reports the decoded response.
    pub fn request(
        &self,
        res: &Rc<OicResource>,
        req: OicRequest,
        cb: ResponseCallback,
    ) -> Result<PendingId, Error> {
        let (server, addr) = self.best_server(res)?;

        let msg_type = if req.confirm {
            MsgType::Con
        } else {
            MsgType::Non
        };
        let mut pkt = Packet::new_request(req.method, msg_type);
        pkt.set_token(OicClient::new_token());
        pkt.add_uri_path_option(&res.href);

        if !req.fields.is_empty() {
            let mut w = MapWriter::new(&mut pkt, &res.href, MapType::Content);
            for field in &req.fields {
                w.append(field)?;
            }
            w.close()?;
        }

        let mut cb = Some(cb);
        server.send_with_reply(
            pkt,
            addr,
            Box::new(move |reply| {
                if let Some(cb) = cb.take() {
                    match reply {
                        Some((pkt, src)) => cb(pkt.code(), Some(src), decode_body(pkt)),
                        None => cb(MsgCode::Empty, None, Vec::new()),
                    }
                }
                false
            }),
        )
    }

    // ---- observation ----

    /// Starts or stops observing `res`.
    ///
    /// Observable resources use the native observe protocol; the rest are
    /// polled with plain GETs. Stopping takes effect immediately: replies
    /// already in flight are discarded instead of reaching `cb`.
    pub fn set_observable(
        self: &Rc<Self>,
        res: &Rc<OicResource>,
        cb: Option<ObserveCallback>,
        observe: bool,
        non_confirmable: bool,
    ) -> Result<(), Error> {
        if !observe {
            return self.stop_observing(res);
        }

        if res.is_observed() {
            return Err(Error::InvalidArgument);
        }
        let cb = cb.ok_or(Error::InvalidArgument)?;

        if res.observable() {
            self.observe_native(res, cb, non_confirmable)
        } else {
            self.observe_polled(res, cb, non_confirmable);
            Ok(())
        }
    }

    fn observe_native(
        &self,
        res: &Rc<OicResource>,
        mut cb: ObserveCallback,
        non_confirmable: bool,
    ) -> Result<(), Error> {
        let (server, addr) = self.best_server(res)?;
        let token = OicClient::new_token();

        let msg_type = if non_confirmable {
            MsgType::Non
        } else {
            MsgType::Con
        };
        let mut pkt = Packet::new_request(MsgCode::MethodGet, msg_type);
        pkt.set_token(token);
        pkt.set_observe(0);
        pkt.add_uri_path_option(&res.href);

        server.send_with_reply(
            pkt,
            addr,
            Box::new(move |reply| match reply {
                Some((pkt, src)) => {
                    cb(pkt.code(), Some(src), decode_body(pkt));
                    true
                }
                None => {
                    // The server reset the observation.
                    cb(MsgCode::Empty, None, Vec::new());
                    false
                }
            }),
        )?;

        *res.observation.borrow_mut() = Some(Observation::Native { token });
        Ok(())
    }

    fn observe_polled(self: &Rc<Self>, res: &Rc<OicResource>, cb: ObserveCallback, non_confirmable: bool) {
        let cancelled = Rc::new(Cell::new(false));
        let cb = Rc::new(RefCell::new(cb));

        *res.observation.borrow_mut() = Some(Observation::Polled {
            cancelled: cancelled.clone(),
        });

        self.poll(res, cb.clone(), cancelled.clone(), non_confirmable);

        let weak = self.weak_self.borrow().clone();
        let res = res.clone();
        self.sched.timeout_add(
            POLL_OBSERVE_TIMEOUT,
            Box::new(move || {
                if cancelled.get() {
                    return false;
                }
                match weak.upgrade() {
                    Some(client) => {
                        client.poll(&res, cb.clone(), cancelled.clone(), non_confirmable);
                        true
                    }
                    None => false,
                }
            }),
        );
    }

    fn poll(
        self: &Rc<Self>,
        res: &Rc<OicResource>,
        cb: Rc<RefCell<ObserveCallback>>,
        cancelled: Rc<Cell<bool>>,
        non_confirmable: bool,
    ) {
        let (server, addr) = match self.best_server(res) {
            Ok(pair) => pair,
            Err(_) => {
                cancelled.set(true);
                return;
            }
        };

        let msg_type = if non_confirmable {
            MsgType::Non
        } else {
            MsgType::Con
        };
        let mut pkt = Packet::new_request(MsgCode::MethodGet, msg_type);
        pkt.set_token(OicClient::new_token());
        pkt.add_uri_path_option(&res.href);

        let result = server.send_with_reply(
            pkt,
            addr,
            Box::new(move |reply| {
                // A reply landing after cancellation is dropped.
                if !cancelled.get() {
                    if let Some((pkt, src)) = reply {
                        (cb.borrow_mut())(pkt.code(), Some(src), decode_body(pkt));
                    }
                }
                false
            }),
        );
        if let Err(e) = result {
            warn!("oic: poll of {:?} failed: {}", res, e);
        }
    }

    fn stop_observing(&self, res: &Rc<OicResource>) -> Result<(), Error> {
        let observation = res.observation.borrow_mut().take();
        match observation {
            None => Err(Error::NotFound),
            Some(Observation::Polled { cancelled }) => {
                cancelled.set(true);
                Ok(())
            }
            Some(Observation::Native { token }) => {
                let (server, addr) = self.best_server(res)?;
                server.unobserve(addr, token, &res.href)
            }
        }
    }
}

impl std::fmt::Debug for OicClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OicClient")
            .field("addr", &self.server.local_addr().ok())
            .field("dtls", &self.dtls_server.is_some())
            .finish()
    }
}

fn decode_body(pkt: &Packet) -> Vec<Field> {
    if pkt.payload().is_empty() {
        return Vec::new();
    }
    MapReader::from_packet(pkt)
        .and_then(|reader| reader.collect::<Result<Vec<Field>, Error>>())
        .unwrap_or_else(|e| {
            debug!("oic: undecodable response body: {}", e);
            Vec::new()
        })
}

fn walk_map<'b>(
    d: &mut Decoder<'b>,
    mut f: impl FnMut(&mut Decoder<'b>, &str) -> Result<(), Error>,
) -> Result<(), Error> {
    match d.map()? {
        Some(len) => {
            for _ in 0..len {
                let key = d.str()?.to_string();
                f(d, &key)?;
            }
        }
        None => loop {
            if d.datatype()? == Type::Break {
                d.set_position(d.position() + 1);
                break;
            }
            let key = d.str()?.to_string();
            f(d, &key)?;
        },
    }
    Ok(())
}

#[derive(Default)]
struct LinkParts {
    href: String,
    types: Vec<String>,
    interfaces: Vec<String>,
    observable: bool,
    secure: bool,
    port: Option<u16>,
}

fn parse_link(d: &mut Decoder<'_>) -> Result<LinkParts, Error> {
    let mut link = LinkParts::default();
    walk_map(d, |d, key| {
        match key {
            "href" => link.href = d.str()?.to_string(),
            "rt" => link.types = decode_string_list(d)?,
            "if" => link.interfaces = decode_string_list(d)?,
            "p" => walk_map(d, |d, key| {
                match key {
                    "bm" => link.observable = d.u64()? & 2 != 0,
                    "sec" => link.secure = d.bool()?,
                    "port" => link.port = Some(d.u64()? as u16),
                    _ => d.skip()?,
                }
                Ok(())
            })?,
            _ => d.skip()?,
        }
        Ok(())
    })?;
    if link.href.is_empty() {
        return Err(Error::ParseFailure);
    }
    Ok(link)
}

fn parse_device(
    d: &mut Decoder<'_>,
    from: SocketAddr,
    out: &mut Vec<Rc<OicResource>>,
) -> Result<(), Error> {
    let mut device_id = Vec::new();
    let mut links = Vec::new();

    walk_map(d, |d, key| {
        match key {
            "di" => device_id = d.bytes()?.to_vec(),
            "links" => match d.array()? {
                Some(len) => {
                    for _ in 0..len {
                        links.push(parse_link(d)?);
                    }
                }
                None => loop {
                    if d.datatype()? == Type::Break {
                        d.set_position(d.position() + 1);
                        break;
                    }
                    links.push(parse_link(d)?);
                },
            },
            _ => d.skip()?,
        }
        Ok(())
    })?;

    for link in links {
        out.push(Rc::new(OicResource {
            href: link.href,
            device_id: device_id.clone(),
            types: link.types,
            interfaces: link.interfaces,
            addr: from,
            observable: link.observable,
            secure: link.secure,
            secure_port: link.port.unwrap_or(DEFAULT_DTLS_PORT),
            observation: RefCell::new(None),
        }));
    }
    Ok(())
}

fn parse_discovery(pkt: &Packet, from: SocketAddr) -> Result<Vec<Rc<OicResource>>, Error> {
    if pkt.content_format() != Some(ContentFormat::APPLICATION_CBOR) {
        return Err(Error::ParseFailure);
    }

    let mut d = Decoder::new(pkt.payload());
    let len = d.array()?;
    if PayloadType::try_from(d.u64()?) != Some(PayloadType::Discovery) {
        return Err(Error::ParseFailure);
    }

    let mut out = Vec::new();
    match len {
        Some(len) => {
            for _ in 1..len {
                parse_device(&mut d, from, &mut out)?;
            }
        }
        None => loop {
            if d.datatype()? == Type::Break {
                break;
            }
            parse_device(&mut d, from, &mut out)?;
        },
    }
    Ok(out)
}

fn parse_device_info(pkt: &Packet) -> Result<DeviceInfo, Error> {
    let reader = MapReader::from_packet(pkt)?;
    let mut info = DeviceInfo {
        name: String::new(),
        spec_version: String::new(),
        device_id: Vec::new(),
        data_model_version: String::new(),
    };
    for field in reader {
        let field = field?;
        match (field.key.as_str(), field.value) {
            ("n", Value::Text(text)) => info.name = text,
            ("lcv", Value::Text(text)) => info.spec_version = text,
            ("dmv", Value::Text(text)) => info.data_model_version = text,
            ("di", Value::Bytes(bytes)) => info.device_id = bytes,
            _ => {}
        }
    }
    Ok(info)
}

fn parse_platform_info(pkt: &Packet) -> Result<PlatformInfo, Error> {
    let reader = MapReader::from_packet(pkt)?;
    let mut info = PlatformInfo {
        platform_id: Vec::new(),
        manufacturer_name: String::new(),
        manufacturer_url: String::new(),
        model_number: String::new(),
        manufacture_date: String::new(),
        platform_version: String::new(),
        hardware_version: String::new(),
        firmware_version: String::new(),
        support_url: String::new(),
        os_version: String::new(),
        system_time: String::new(),
    };
    for field in reader {
        let field = field?;
        match (field.key.as_str(), field.value) {
            ("pi", Value::Bytes(bytes)) => info.platform_id = bytes,
            ("mnmn", Value::Text(text)) => info.manufacturer_name = text,
            ("mnml", Value::Text(text)) => info.manufacturer_url = text,
            ("mnmo", Value::Text(text)) => info.model_number = text,
            ("mndt", Value::Text(text)) => info.manufacture_date = text,
            ("mnpv", Value::Text(text)) => info.platform_version = text,
            ("mnos", Value::Text(text)) => info.os_version = text,
            ("mnhw", Value::Text(text)) => info.hardware_version = text,
            ("mnfv", Value::Text(text)) => info.firmware_version = text,
            ("mnsl", Value::Text(text)) => info.support_url = text,
            ("st", Value::Text(text)) => info.system_time = text,
            _ => {}
        }
    }
    Ok(info)
}

#[cfg(test)]
mod tests {
    use super::*;
    use minicbor::Encoder;

    fn discovery_packet(secure: bool) -> Packet {
        let mut buf = Vec::new();
        let mut e = Encoder::new(&mut buf);
        e.array(2).unwrap().u8(2).unwrap();
        e.map(2).unwrap();
        e.str("di").unwrap().bytes(&[0x11; 16]).unwrap();
        e.str("links").unwrap().array(1).unwrap();
        e.map(4).unwrap();
        e.str("href").unwrap().str("/sol/0").unwrap();
        e.str("rt").unwrap().array(1).unwrap().str("core.light").unwrap();
        e.str("if").unwrap().array(1).unwrap().str("oic.if.baseline").unwrap();
        e.str("p").unwrap();
        if secure {
            e.map(3).unwrap();
            e.str("bm").unwrap().u64(3).unwrap();
            e.str("sec").unwrap().bool(true).unwrap();
            e.str("port").unwrap().u16(5684).unwrap();
        } else {
            e.map(1).unwrap();
            e.str("bm").unwrap().u64(1).unwrap();
        }

        let mut pkt = Packet::new(MsgType::Non, MsgCode::SuccessContent);
        pkt.set_content_format(ContentFormat::APPLICATION_CBOR);
        pkt.set_payload(buf);
        pkt
    }

    #[test]
    fn discovery_reply_parses_into_resources() {
        let from: SocketAddr = "127.0.0.1:5683".parse().unwrap();
        let resources = parse_discovery(&discovery_packet(false), from).unwrap();

        assert_eq!(resources.len(), 1);
        let res = &resources[0];
        assert_eq!(res.href(), "/sol/0");
        assert_eq!(res.device_id(), &[0x11; 16]);
        assert_eq!(res.types(), &["core.light".to_string()]);
        assert_eq!(res.interfaces(), &["oic.if.baseline".to_string()]);
        assert_eq!(res.addr(), from);
        assert!(!res.observable());
        assert!(!res.secure());
    }

    #[test]
    fn discovery_reply_carries_security_properties() {
        let from: SocketAddr = "127.0.0.1:5683".parse().unwrap();
        let resources = parse_discovery(&discovery_packet(true), from).unwrap();

        let res = &resources[0];
        assert!(res.observable());
        assert!(res.secure());
        assert_eq!(res.secure_port, 5684);
    }

    #[test]
    fn discovery_rejects_wrong_payload_type() {
        let mut buf = Vec::new();
        let mut e = Encoder::new(&mut buf);
        e.array(2).unwrap().u8(3).unwrap().map(0).unwrap();

        let mut pkt = Packet::new(MsgType::Non, MsgCode::SuccessContent);
        pkt.set_content_format(ContentFormat::APPLICATION_CBOR);
        pkt.set_payload(buf);

        let from: SocketAddr = "127.0.0.1:5683".parse().unwrap();
        assert!(parse_discovery(&pkt, from).is_err());
    }

    #[test]
    fn request_builder() {
        let req = OicRequest::put()
            .non_confirmable()
            .field(Field::boolean("state", true));
        assert_eq!(req.method, MsgCode::MethodPut);
        assert!(!req.confirm);
        assert_eq!(req.fields.len(), 1);
    }
}
