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

//! OIC/OCF application layer: discoverable, observable resources with CBOR
//! representations, served over the CoAP session layer.

pub mod cbor;
pub mod client;
pub mod device;
pub mod security;
pub mod server;

pub use client::{OicClient, OicRequest, OicResource};
pub use server::{OicServer, OicServerBuilder, OicServerResource, OicResourceType};

use crate::message::MsgCode;

/// OIC spec version advertised in `/oic/d` under `lcv`.
pub const OIC_SPEC_VERSION: &str = "core.1.0.0";

/// Data model version advertised in `/oic/d` under `dmv`.
pub const OIC_DATA_MODEL_VERSION: &str = "res.1.0.0";

/// Outcome of a resource method handler, mapped to a CoAP response code at
/// the protocol boundary.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum OicError {
    Transport,
    Encoding,
    Timeout,
    NotFound,
    BadRequest,
    Internal,
}

impl OicError {
    /// The CoAP response code this error is reported as.
    pub fn to_msg_code(self) -> MsgCode {
        match self {
            OicError::Transport => MsgCode::ServerErrorServiceUnavailable,
            OicError::Encoding => MsgCode::ServerErrorInternalServerError,
            OicError::Timeout => MsgCode::ServerErrorGatewayTimeout,
            OicError::NotFound => MsgCode::ClientErrorNotFound,
            OicError::BadRequest => MsgCode::ClientErrorBadRequest,
            OicError::Internal => MsgCode::ServerErrorInternalServerError,
        }
    }
}

/// Behavior bits of a registered resource. `DISCOVERABLE` and `OBSERVABLE`
/// are also advertised to peers through the `bm` bitmap of `/oic/res`.
#[derive(Debug, Copy, Clone, Default, Eq, PartialEq)]
pub struct ResourceFlags(pub u32);

impl ResourceFlags {
    pub const NONE: ResourceFlags = ResourceFlags(0);

    /// Listed in `/oic/res` replies.
    pub const DISCOVERABLE: ResourceFlags = ResourceFlags(1 << 0);

    /// Accepts observe registrations.
    pub const OBSERVABLE: ResourceFlags = ResourceFlags(1 << 1);

    /// Currently answering requests.
    pub const ACTIVE: ResourceFlags = ResourceFlags(1 << 2);

    /// Handlers may take a long time; reserved for future use.
    pub const SLOW: ResourceFlags = ResourceFlags(1 << 3);

    /// Only reachable over DTLS.
    pub const SECURE: ResourceFlags = ResourceFlags(1 << 4);

    /// Hidden from unfiltered discovery, but listed when the query names
    /// its resource type.
    pub const DISCOVERABLE_EXPLICIT: ResourceFlags = ResourceFlags(1 << 5);

    pub fn contains(self, other: ResourceFlags) -> bool {
        self.0 & other.0 == other.0
    }

    /// The `bm` bitmap advertised in discovery links.
    pub fn to_bitmap(self) -> u64 {
        let mut bm = 0;
        if self.contains(ResourceFlags::DISCOVERABLE) {
            bm |= 1;
        }
        if self.contains(ResourceFlags::OBSERVABLE) {
            bm |= 2;
        }
        bm
    }
}

impl core::ops::BitOr for ResourceFlags {
    type Output = ResourceFlags;
    fn bitor(self, other: ResourceFlags) -> ResourceFlags {
        ResourceFlags(self.0 | other.0)
    }
}

impl core::ops::BitOrAssign for ResourceFlags {
    fn bitor_assign(&mut self, other: ResourceFlags) {
        self.0 |= other.0;
    }
}

/// Identity block served from `/oic/d`.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceInfo {
    pub name: String,
    pub spec_version: String,
    pub device_id: Vec<u8>,
    pub data_model_version: String,
}

/// Manufacturing block served from `/oic/p`.
#[derive(Debug, Clone, PartialEq)]
pub struct PlatformInfo {
    pub platform_id: Vec<u8>,
    pub manufacturer_name: String,
    pub manufacturer_url: String,
    pub model_number: String,
    pub manufacture_date: String,
    pub platform_version: String,
    pub hardware_version: String,
    pub firmware_version: String,
    pub support_url: String,
    pub os_version: String,
    pub system_time: String,
}
