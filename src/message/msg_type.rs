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

/// Enum representing a CoAP message type: the reliability/acknowledgement
/// class encoded in the two type bits of the header.
#[derive(Debug, Copy, Eq, PartialEq, Hash, Clone)]
pub enum MsgType {
    /// Confirmable. Retransmitted until acknowledged or given up on.
    Con = 0,

    /// Non-confirmable. Fire and forget.
    Non = 1,

    /// Acknowledgement of a confirmable message.
    Ack = 2,

    /// Reset. The peer received the message but cannot process it.
    Rst = 3,
}

impl MsgType {
    /// Tries to convert the given two-bit field into a `MsgType`.
    pub fn try_from(x: u8) -> Option<MsgType> {
        match x {
            0 => Some(MsgType::Con),
            1 => Some(MsgType::Non),
            2 => Some(MsgType::Ack),
            3 => Some(MsgType::Rst),
            _ => None,
        }
    }

    /// Returns true if messages of this type are retransmitted until
    /// acknowledged.
    pub fn is_confirmable(self) -> bool {
        self == MsgType::Con
    }
}

impl Default for MsgType {
    fn default() -> Self {
        MsgType::Non
    }
}
