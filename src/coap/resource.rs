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

use std::net::SocketAddr;
use std::rc::Rc;

use super::CoapServer;
use crate::error::Error;
use crate::message::{MsgCode, Packet};

/// Per-method dispatch for a registered resource.
///
/// Handlers build and send their own response through the server handle;
/// the default for every method answers 5.01 Not Implemented. Returning an
/// error makes the server answer 5.00 on the handler's behalf.
pub trait RequestHandler {
    fn on_get(
        &self,
        server: &Rc<CoapServer>,
        request: &Packet,
        from: &SocketAddr,
    ) -> Result<(), Error> {
        not_implemented(server, request, from)
    }

    fn on_put(
        &self,
        server: &Rc<CoapServer>,
        request: &Packet,
        from: &SocketAddr,
    ) -> Result<(), Error> {
        not_implemented(server, request, from)
    }

    fn on_post(
        &self,
        server: &Rc<CoapServer>,
        request: &Packet,
        from: &SocketAddr,
    ) -> Result<(), Error> {
        not_implemented(server, request, from)
    }

    fn on_delete(
        &self,
        server: &Rc<CoapServer>,
        request: &Packet,
        from: &SocketAddr,
    ) -> Result<(), Error> {
        not_implemented(server, request, from)
    }
}

fn not_implemented(
    server: &Rc<CoapServer>,
    request: &Packet,
    from: &SocketAddr,
) -> Result<(), Error> {
    let mut rsp = Packet::new_response(request);
    rsp.set_code(MsgCode::ServerErrorNotImplemented);
    server.send(rsp, *from)
}

/// A path registered with one or more [`CoapServer`]s.
pub struct CoapResource {
    path: Vec<String>,
    handler: Box<dyn RequestHandler>,
    observable: bool,
}

impl CoapResource {
    /// Creates a resource for `path` (leading slash optional; empty segments
    /// are ignored). The resource accepts observe registrations; use
    /// [`with_observable`](Self::with_observable) to refuse them.
    pub fn new(path: &str, handler: Box<dyn RequestHandler>) -> Rc<CoapResource> {
        CoapResource::with_observable(path, handler, true)
    }

    /// Like [`new`](Self::new), but `observable` controls whether the server
    /// registers observers for this resource. A non-observable resource
    /// answers an observe GET as a plain GET.
    pub fn with_observable(
        path: &str,
        handler: Box<dyn RequestHandler>,
        observable: bool,
    ) -> Rc<CoapResource> {
        Rc::new(CoapResource {
            path: path
                .split('/')
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect(),
            handler,
            observable,
        })
    }

    /// Whether the server accepts observe registrations on this resource.
    pub fn observable(&self) -> bool {
        self.observable
    }

    /// The resource path with a leading `/`.
    pub fn path(&self) -> String {
        let mut out = String::new();
        for segment in &self.path {
            out.push('/');
            out.push_str(segment);
        }
        if out.is_empty() {
            out.push('/');
        }
        out
    }

    /// Whether this resource answers for the path carried by `request`.
    pub fn matches(&self, request: &Packet) -> bool {
        let mut segments = request.find_options(crate::option::OptionNumber::URI_PATH);
        for own in &self.path {
            match segments.next() {
                Some(seg) if seg == own.as_bytes() => {}
                _ => return false,
            }
        }
        segments.next().is_none()
    }

    /// Dispatches `request` to the method handler selected by its code.
    pub fn handle(
        &self,
        server: &Rc<CoapServer>,
        request: &Packet,
        from: &SocketAddr,
    ) -> Result<(), Error> {
        match request.code() {
            MsgCode::MethodGet => self.handler.on_get(server, request, from),
            MsgCode::MethodPut => self.handler.on_put(server, request, from),
            MsgCode::MethodPost => self.handler.on_post(server, request, from),
            MsgCode::MethodDelete => self.handler.on_delete(server, request, from),
            _ => Err(Error::InvalidArgument),
        }
    }
}

impl std::fmt::Debug for CoapResource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "CoapResource[{}]", self.path())
    }
}
