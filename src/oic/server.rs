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

//! OIC server: the resource registry plus the `/oic/res`, `/oic/d` and
//! `/oic/p` built-ins.
//!
//! The server runs over up to three CoAP endpoints: the main one joined to
//! the discovery multicast groups, an ephemeral unicast one that answers
//! discovery so replies never originate from the multicast-bound socket,
//! and optionally a DTLS one. Application resources are registered on all
//! of them.

use std::cell::{Cell, RefCell};
use std::net::SocketAddr;
use std::rc::{Rc, Weak};

use minicbor::Encoder;

use super::cbor::{Field, MapReader, MapType, MapWriter, PayloadType};
use super::device;
use super::{DeviceInfo, OicError, PlatformInfo, ResourceFlags};
use super::{OIC_DATA_MODEL_VERSION, OIC_SPEC_VERSION};
use crate::coap::{CoapResource, CoapServer, RequestHandler, DEFAULT_DTLS_PORT, DEFAULT_UDP_PORT};
use crate::error::Error;
use crate::mainloop::Scheduler;
use crate::message::{MsgCode, MsgType, Packet};
use crate::transport::{Transport, UdpTransport};

const DEFAULT_DEVICE_NAME: &str = "Unknown";
const DEFAULT_MANUFACTURER_NAME: &str = "Soletta";
const DEFAULT_MANUFACTURER_URL: &str = "https://solettaproject.org";
const DEFAULT_MODEL_NUMBER: &str = "Unknown";
const DEFAULT_MANUFACTURE_DATE: &str = "2016-01-01";
const DEFAULT_PLATFORM_VERSION: &str = "Unknown";
const DEFAULT_HARDWARE_VERSION: &str = "Unknown";
const DEFAULT_FIRMWARE_VERSION: &str = "Unknown";
const DEFAULT_SUPPORT_URL: &str = "Unknown";

/// A resource method handler: receives the peer address and the decoded
/// request fields, and returns the response fields.
pub type MethodHandler = Box<dyn FnMut(&SocketAddr, &[Field]) -> Result<Vec<Field>, OicError>>;

/// Describes a resource to register: its type and interface strings, an
/// optional explicit path, and up to four method handlers.
#[derive(Default)]
pub struct OicResourceType {
    pub resource_type: String,
    pub interface: String,
    pub path: Option<String>,
    pub get: Option<MethodHandler>,
    pub put: Option<MethodHandler>,
    pub post: Option<MethodHandler>,
    pub delete: Option<MethodHandler>,
}

impl OicResourceType {
    pub fn new(resource_type: &str, interface: &str) -> OicResourceType {
        OicResourceType {
            resource_type: resource_type.to_string(),
            interface: interface.to_string(),
            ..OicResourceType::default()
        }
    }

    pub fn with_path(mut self, path: &str) -> Self {
        self.path = Some(path.to_string());
        self
    }

    pub fn with_get(mut self, handler: MethodHandler) -> Self {
        self.get = Some(handler);
        self
    }

    pub fn with_put(mut self, handler: MethodHandler) -> Self {
        self.put = Some(handler);
        self
    }

    pub fn with_post(mut self, handler: MethodHandler) -> Self {
        self.post = Some(handler);
        self
    }

    pub fn with_delete(mut self, handler: MethodHandler) -> Self {
        self.delete = Some(handler);
        self
    }
}

struct Handlers {
    get: Option<MethodHandler>,
    put: Option<MethodHandler>,
    post: Option<MethodHandler>,
    delete: Option<MethodHandler>,
}

/// A resource registered with an [`OicServer`].
pub struct OicServerResource {
    path: String,
    resource_type: String,
    interface: String,
    flags: Cell<ResourceFlags>,
    handlers: RefCell<Handlers>,
    coap: Rc<CoapResource>,
}

impl OicServerResource {
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn resource_type(&self) -> &str {
        &self.resource_type
    }

    pub fn interface(&self) -> &str {
        &self.interface
    }

    pub fn flags(&self) -> ResourceFlags {
        self.flags.get()
    }

    /// Toggles the ACTIVE flag. Inactive resources answer 4.04 and vanish
    /// from discovery, without losing their registration.
    pub fn set_active(&self, active: bool) {
        let mut flags = self.flags.get();
        if active {
            flags |= ResourceFlags::ACTIVE;
        } else {
            flags = ResourceFlags(flags.0 & !ResourceFlags::ACTIVE.0);
        }
        self.flags.set(flags);
    }
}

impl std::fmt::Debug for OicServerResource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "OicServerResource[{} rt={}]", self.path, self.resource_type)
    }
}

fn success_code(method: MsgCode) -> MsgCode {
    match method {
        MsgCode::MethodGet => MsgCode::SuccessContent,
        MsgCode::MethodPut | MsgCode::MethodPost => MsgCode::SuccessChanged,
        MsgCode::MethodDelete => MsgCode::SuccessDeleted,
        _ => MsgCode::SuccessContent,
    }
}

struct OicResourceHandler {
    res: Weak<OicServerResource>,
}

impl OicResourceHandler {
    fn dispatch(
        &self,
        server: &Rc<CoapServer>,
        req: &Packet,
        from: &SocketAddr,
    ) -> Result<(), Error> {
        let res = match self.res.upgrade() {
            Some(res) => res,
            None => {
                let mut rsp = Packet::new_response(req);
                rsp.set_code(MsgCode::ServerErrorServiceUnavailable);
                return server.send(rsp, *from);
            }
        };

        if !res.flags.get().contains(ResourceFlags::ACTIVE) {
            let mut rsp = Packet::new_response(req);
            rsp.set_code(MsgCode::ClientErrorNotFound);
            return server.send(rsp, *from);
        }

        let input: Vec<Field> = if req.payload().is_empty() {
            Vec::new()
        } else {
            let decoded = MapReader::from_packet(req)
                .and_then(|reader| reader.collect::<Result<Vec<Field>, Error>>());
            match decoded {
                Ok(fields) => fields,
                Err(e) => {
                    debug!("oic: bad request body for {}: {}", res.path, e);
                    let mut rsp = Packet::new_response(req);
                    rsp.set_code(MsgCode::ClientErrorBadRequest);
                    return server.send(rsp, *from);
                }
            }
        };

        let outcome = {
            let mut handlers = res.handlers.borrow_mut();
            let slot = match req.code() {
                MsgCode::MethodGet => handlers.get.as_mut(),
                MsgCode::MethodPut => handlers.put.as_mut(),
                MsgCode::MethodPost => handlers.post.as_mut(),
                MsgCode::MethodDelete => handlers.delete.as_mut(),
                _ => None,
            };
            slot.map(|handler| handler(from, &input))
        };

        let mut rsp = Packet::new_response(req);
        match outcome {
            None => rsp.set_code(MsgCode::ServerErrorNotImplemented),
            Some(Err(e)) => rsp.set_code(e.to_msg_code()),
            Some(Ok(fields)) => {
                rsp.set_code(success_code(req.code()));
                let written = {
                    let mut w = MapWriter::new(&mut rsp, &res.path, MapType::NoContent);
                    (move || {
                        for field in &fields {
                            w.append(field)?;
                        }
                        w.close()
                    })()
                };
                if let Err(e) = written {
                    // Encoding failure downgrades the response but still
                    // completes the exchange.
                    warn!("oic: response encoding for {} failed: {}", res.path, e);
                    rsp = Packet::new_response(req);
                    rsp.set_code(MsgCode::ServerErrorInternalServerError);
                }
            }
        }

        server.send(rsp, *from)
    }
}

impl RequestHandler for OicResourceHandler {
    fn on_get(&self, s: &Rc<CoapServer>, req: &Packet, from: &SocketAddr) -> Result<(), Error> {
        self.dispatch(s, req, from)
    }

    fn on_put(&self, s: &Rc<CoapServer>, req: &Packet, from: &SocketAddr) -> Result<(), Error> {
        self.dispatch(s, req, from)
    }

    fn on_post(&self, s: &Rc<CoapServer>, req: &Packet, from: &SocketAddr) -> Result<(), Error> {
        self.dispatch(s, req, from)
    }

    fn on_delete(&self, s: &Rc<CoapServer>, req: &Packet, from: &SocketAddr) -> Result<(), Error> {
        self.dispatch(s, req, from)
    }
}

/// Constructs an [`OicServer`]; see [`OicServer::builder`].
pub struct OicServerBuilder {
    sched: Rc<dyn Scheduler>,
    port: u16,
    machine_id: Option<[u8; device::MACHINE_ID_LEN]>,
    device_name: String,
    manufacturer_name: String,
    manufacturer_url: String,
    model_number: String,
    manufacture_date: String,
    platform_version: String,
    hardware_version: String,
    firmware_version: String,
    support_url: String,
    transport: Option<Rc<dyn Transport>>,
    unicast_transport: Option<Rc<dyn Transport>>,
    secure_transport: Option<Rc<dyn Transport>>,
}

impl OicServerBuilder {
    /// Listen port for the main endpoint; 0 selects the CoAP default.
    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Overrides the machine identity instead of deriving it from the host.
    pub fn machine_id(mut self, id: [u8; device::MACHINE_ID_LEN]) -> Self {
        self.machine_id = Some(id);
        self
    }

    pub fn device_name(mut self, name: &str) -> Self {
        self.device_name = name.to_string();
        self
    }

    pub fn manufacturer(mut self, name: &str, url: &str) -> Self {
        self.manufacturer_name = name.to_string();
        self.manufacturer_url = url.to_string();
        self
    }

    pub fn model_number(mut self, model: &str) -> Self {
        self.model_number = model.to_string();
        self
    }

    pub fn versions(mut self, platform: &str, hardware: &str, firmware: &str) -> Self {
        self.platform_version = platform.to_string();
        self.hardware_version = hardware.to_string();
        self.firmware_version = firmware.to_string();
        self
    }

    /// Replaces the default UDP transport of the main endpoint.
    pub fn transport(mut self, transport: Rc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Replaces the default ephemeral UDP transport of the unicast endpoint.
    pub fn unicast_transport(mut self, transport: Rc<dyn Transport>) -> Self {
        self.unicast_transport = Some(transport);
        self
    }

    /// Adds a DTLS endpoint. Registered resources become SECURE and are
    /// advertised with the DTLS port.
    pub fn secure_transport(mut self, transport: Rc<dyn Transport>) -> Self {
        self.secure_transport = Some(transport);
        self
    }

    /// Binds the endpoints and registers the built-in resources.
    pub fn bind(self) -> Result<Rc<OicServer>, Error> {
        let port = if self.port == 0 {
            DEFAULT_UDP_PORT
        } else {
            self.port
        };

        let transport: Rc<dyn Transport> = match self.transport {
            Some(t) => t,
            None => UdpTransport::bind(port)?,
        };
        let unicast_transport: Rc<dyn Transport> = match self.unicast_transport {
            Some(t) => t,
            None => UdpTransport::bind(0)?,
        };

        let server = CoapServer::bind(self.sched.clone(), transport)?;
        let server_unicast = CoapServer::bind(self.sched.clone(), unicast_transport)?;
        let dtls_server = match self.secure_transport {
            Some(t) => Some(CoapServer::bind(self.sched.clone(), t)?),
            None => None,
        };

        let device_id = self.machine_id.unwrap_or_else(device::machine_id);

        let device_info = DeviceInfo {
            name: self.device_name,
            spec_version: OIC_SPEC_VERSION.to_string(),
            device_id: device_id.to_vec(),
            data_model_version: OIC_DATA_MODEL_VERSION.to_string(),
        };
        let platform_info = PlatformInfo {
            platform_id: device_id.to_vec(),
            manufacturer_name: self.manufacturer_name,
            manufacturer_url: self.manufacturer_url,
            model_number: self.model_number,
            manufacture_date: self.manufacture_date,
            platform_version: self.platform_version,
            hardware_version: self.hardware_version,
            firmware_version: self.firmware_version,
            support_url: self.support_url,
            os_version: device::os_version(),
            system_time: String::new(),
        };

        let oic = Rc::new(OicServer {
            server,
            server_unicast,
            dtls_server,
            device_id,
            device_info,
            platform_info,
            resources: RefCell::new(Vec::new()),
            next_path: Cell::new(0),
        });
        oic.register_builtins();
        Ok(oic)
    }
}

/// The OIC application server.
pub struct OicServer {
    server: Rc<CoapServer>,
    server_unicast: Rc<CoapServer>,
    dtls_server: Option<Rc<CoapServer>>,
    device_id: [u8; device::MACHINE_ID_LEN],
    device_info: DeviceInfo,
    platform_info: PlatformInfo,
    resources: RefCell<Vec<Rc<OicServerResource>>>,
    next_path: Cell<u32>,
}

impl OicServer {
    pub fn builder(sched: Rc<dyn Scheduler>) -> OicServerBuilder {
        OicServerBuilder {
            sched,
            port: 0,
            machine_id: None,
            device_name: DEFAULT_DEVICE_NAME.to_string(),
            manufacturer_name: DEFAULT_MANUFACTURER_NAME.to_string(),
            manufacturer_url: DEFAULT_MANUFACTURER_URL.to_string(),
            model_number: DEFAULT_MODEL_NUMBER.to_string(),
            manufacture_date: DEFAULT_MANUFACTURE_DATE.to_string(),
            platform_version: DEFAULT_PLATFORM_VERSION.to_string(),
            hardware_version: DEFAULT_HARDWARE_VERSION.to_string(),
            firmware_version: DEFAULT_FIRMWARE_VERSION.to_string(),
            support_url: DEFAULT_SUPPORT_URL.to_string(),
            transport: None,
            unicast_transport: None,
            secure_transport: None,
        }
    }

    pub fn device_info(&self) -> &DeviceInfo {
        &self.device_info
    }

    pub fn platform_info(&self) -> &PlatformInfo {
        &self.platform_info
    }

    pub fn device_id(&self) -> &[u8] {
        &self.device_id
    }

    fn coap_servers(&self) -> Vec<Rc<CoapServer>> {
        let mut servers = vec![self.server.clone(), self.server_unicast.clone()];
        if let Some(dtls) = &self.dtls_server {
            servers.push(dtls.clone());
        }
        servers
    }

    fn register_builtins(self: &Rc<Self>) {
        let builtins: [(&str, Box<dyn RequestHandler>); 3] = [
            (
                "/oic/res",
                Box::new(DiscoveryHandler {
                    oic: Rc::downgrade(self),
                }),
            ),
            (
                "/oic/d",
                Box::new(DeviceInfoHandler {
                    oic: Rc::downgrade(self),
                }),
            ),
            (
                "/oic/p",
                Box::new(PlatformInfoHandler {
                    oic: Rc::downgrade(self),
                }),
            ),
        ];

        for (path, handler) in builtins {
            let resource = CoapResource::with_observable(path, handler, false);
            for s in self.coap_servers() {
                s.register_resource(resource.clone());
            }
        }
    }

    /// Registers an application resource on every endpoint. Without an
    /// explicit path an opaque `/sol/<hex>` path is generated; clients are
    /// expected to find it through discovery.
    pub fn register_resource(
        &self,
        mut rtype: OicResourceType,
        mut flags: ResourceFlags,
    ) -> Result<Rc<OicServerResource>, Error> {
        let path = match rtype.path.take() {
            Some(path) => {
                if !path.starts_with('/') || path.len() < 2 || path.ends_with('/') {
                    return Err(Error::InvalidArgument);
                }
                path
            }
            None => {
                let path = format!("/sol/{:x}", self.next_path.get());
                self.next_path.set(self.next_path.get() + 1);
                path
            }
        };

        if self.resources.borrow().iter().any(|r| r.path == path) {
            return Err(Error::Conflict);
        }

        if self.dtls_server.is_some() {
            flags |= ResourceFlags::SECURE;
        }

        let res = Rc::new_cyclic(|weak: &Weak<OicServerResource>| OicServerResource {
            coap: CoapResource::with_observable(
                &path,
                Box::new(OicResourceHandler { res: weak.clone() }),
                flags.contains(ResourceFlags::OBSERVABLE),
            ),
            path,
            resource_type: rtype.resource_type,
            interface: rtype.interface,
            flags: Cell::new(flags),
            handlers: RefCell::new(Handlers {
                get: rtype.get,
                put: rtype.put,
                post: rtype.post,
                delete: rtype.delete,
            }),
        });

        for s in self.coap_servers() {
            s.register_resource(res.coap.clone());
        }
        self.resources.borrow_mut().push(res.clone());
        info!("oic: registered {:?}", res);
        Ok(res)
    }

    /// Removes a resource from every endpoint, dropping its observers and
    /// any in-flight notifications with it.
    pub fn unregister_resource(&self, resource: &Rc<OicServerResource>) {
        for s in self.coap_servers() {
            s.unregister_resource(&resource.coap);
        }
        self.resources
            .borrow_mut()
            .retain(|r| !Rc::ptr_eq(r, resource));
        info!("oic: unregistered {:?}", resource);
    }

    /// Pushes a new representation to every observer of `resource`. An
    /// encoding failure downgrades the notification to 5.00 with an empty
    /// body, which still goes out so observers learn the resource is in
    /// trouble.
    pub fn notify(&self, resource: &Rc<OicServerResource>, fields: &[Field]) -> Result<(), Error> {
        for s in self.coap_servers() {
            if s.observer_count(&resource.coap) == 0 {
                continue;
            }

            let mut pkt = s.new_notification(&resource.coap)?;
            let written = {
                let mut w = MapWriter::new(&mut pkt, &resource.path, MapType::Content);
                (move || {
                    for field in fields {
                        w.append(field)?;
                    }
                    w.close()
                })()
            };
            if let Err(e) = written {
                warn!("oic: notification encoding for {} failed: {}", resource.path, e);
                pkt.set_code(MsgCode::ServerErrorInternalServerError);
                pkt.set_payload(Vec::new());
            }

            s.notify(&resource.coap, &pkt)?;
        }
        Ok(())
    }

    fn handle_discovery(
        &self,
        server: &Rc<CoapServer>,
        req: &Packet,
        from: &SocketAddr,
    ) -> Result<(), Error> {
        let mut rt_filter = None;
        let mut if_filter = None;
        for query in req.uri_queries() {
            if let Some(rt) = query.strip_prefix("rt=") {
                rt_filter = Some(rt.to_string());
            } else if let Some(itf) = query.strip_prefix("if=") {
                if_filter = Some(itf.to_string());
            }
        }
        let filtered = rt_filter.is_some() || if_filter.is_some();

        let links: Vec<Rc<OicServerResource>> = self
            .resources
            .borrow()
            .iter()
            .filter(|r| {
                let flags = r.flags.get();
                if !flags.contains(ResourceFlags::ACTIVE) {
                    return false;
                }
                let discoverable = flags.contains(ResourceFlags::DISCOVERABLE)
                    || (flags.contains(ResourceFlags::DISCOVERABLE_EXPLICIT) && filtered);
                if !discoverable {
                    return false;
                }
                if let Some(rt) = &rt_filter {
                    if &r.resource_type != rt {
                        return false;
                    }
                }
                if let Some(itf) = &if_filter {
                    if &r.interface != itf {
                        return false;
                    }
                }
                true
            })
            .cloned()
            .collect();

        let mut rsp = Packet::new_response(req);
        if links.is_empty() {
            rsp.set_code(MsgCode::ClientErrorNotFound);
        } else {
            match self.encode_discovery(&links) {
                Ok(payload) => {
                    rsp.set_content_format(crate::option::ContentFormat::APPLICATION_CBOR);
                    rsp.set_payload(payload);
                }
                Err(e) => {
                    warn!("oic: discovery encoding failed: {}", e);
                    rsp.set_code(MsgCode::ServerErrorInternalServerError);
                }
            }
        }

        // Replies to multicast discovery leave through the unicast
        // endpoint, never from the multicast-bound socket.
        let out = if req.msg_type() == MsgType::Non && Rc::ptr_eq(server, &self.server) {
            &self.server_unicast
        } else {
            server
        };
        out.send(rsp, *from)
    }

    fn encode_discovery(&self, links: &[Rc<OicServerResource>]) -> Result<Vec<u8>, Error> {
        let mut buf = Vec::new();
        let mut e = Encoder::new(&mut buf);

        e.array(2)?.u8(PayloadType::Discovery as u8)?;
        e.map(2)?;
        e.str("di")?.bytes(&self.device_id)?;
        e.str("links")?.array(links.len() as u64)?;

        for r in links {
            let flags = r.flags.get();
            let secure = flags.contains(ResourceFlags::SECURE);

            e.map(4)?;
            e.str("href")?.str(&r.path)?;
            e.str("rt")?.array(1)?.str(&r.resource_type)?;
            e.str("if")?.array(1)?.str(&r.interface)?;
            e.str("p")?.map(if secure { 3 } else { 1 })?;
            e.str("bm")?.u64(flags.to_bitmap())?;
            if secure {
                e.str("sec")?.bool(true)?;
                e.str("port")?.u16(DEFAULT_DTLS_PORT)?;
            }
        }

        Ok(buf)
    }

    fn handle_device_info(
        &self,
        server: &Rc<CoapServer>,
        req: &Packet,
        from: &SocketAddr,
    ) -> Result<(), Error> {
        let mut rsp = Packet::new_response(req);
        let written = {
            let mut w =
                MapWriter::new_typed(&mut rsp, "/oic/d", PayloadType::Platform, MapType::Content);
            let info = &self.device_info;
            (move || {
                w.append(&Field::text("n", &info.name))?;
                w.append(&Field::text("lcv", &info.spec_version))?;
                w.append(&Field::text("dmv", &info.data_model_version))?;
                w.append(&Field::bytes("di", &info.device_id))?;
                w.close()
            })()
        };
        if written.is_err() {
            rsp = Packet::new_response(req);
            rsp.set_code(MsgCode::ServerErrorInternalServerError);
        }
        server.send(rsp, *from)
    }

    fn handle_platform_info(
        &self,
        server: &Rc<CoapServer>,
        req: &Packet,
        from: &SocketAddr,
    ) -> Result<(), Error> {
        let mut rsp = Packet::new_response(req);
        let written = {
            let mut w =
                MapWriter::new_typed(&mut rsp, "/oic/p", PayloadType::Platform, MapType::Content);
            let info = &self.platform_info;
            (move || {
                w.append(&Field::bytes("pi", &info.platform_id))?;
                w.append(&Field::text("mnmn", &info.manufacturer_name))?;
                w.append(&Field::text("mnml", &info.manufacturer_url))?;
                w.append(&Field::text("mnmo", &info.model_number))?;
                w.append(&Field::text("mndt", &info.manufacture_date))?;
                w.append(&Field::text("mnpv", &info.platform_version))?;
                w.append(&Field::text("mnos", &info.os_version))?;
                w.append(&Field::text("mnhw", &info.hardware_version))?;
                w.append(&Field::text("mnfv", &info.firmware_version))?;
                w.append(&Field::text("mnsl", &info.support_url))?;
                w.append(&Field::text("st", &info.system_time))?;
                w.close()
            })()
        };
        if written.is_err() {
            rsp = Packet::new_response(req);
            rsp.set_code(MsgCode::ServerErrorInternalServerError);
        }
        server.send(rsp, *from)
    }
}

impl std::fmt::Debug for OicServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OicServer")
            .field("addr", &self.server.local_addr().ok())
            .field("dtls", &self.dtls_server.is_some())
            .field("resources", &self.resources.borrow().len())
            .finish()
    }
}

struct DiscoveryHandler {
    oic: Weak<OicServer>,
}

impl RequestHandler for DiscoveryHandler {
    fn on_get(&self, s: &Rc<CoapServer>, req: &Packet, from: &SocketAddr) -> Result<(), Error> {
        match self.oic.upgrade() {
            Some(oic) => oic.handle_discovery(s, req, from),
            None => Ok(()),
        }
    }
}

struct DeviceInfoHandler {
    oic: Weak<OicServer>,
}

impl RequestHandler for DeviceInfoHandler {
    fn on_get(&self, s: &Rc<CoapServer>, req: &Packet, from: &SocketAddr) -> Result<(), Error> {
        match self.oic.upgrade() {
            Some(oic) => oic.handle_device_info(s, req, from),
            None => Ok(()),
        }
    }
}

struct PlatformInfoHandler {
    oic: Weak<OicServer>,
}

impl RequestHandler for PlatformInfoHandler {
    fn on_get(&self, s: &Rc<CoapServer>, req: &Packet, from: &SocketAddr) -> Result<(), Error> {
        match self.oic.upgrade() {
            Some(oic) => oic.handle_platform_info(s, req, from),
            None => Ok(()),
        }
    }
}
