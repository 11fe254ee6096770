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

//! Machine identity and host facts used to populate `/oic/d` and `/oic/p`.

/// Number of bytes in a machine/device/platform identifier.
pub const MACHINE_ID_LEN: usize = 16;

fn parse_hex_id(text: &str) -> Option<[u8; MACHINE_ID_LEN]> {
    let text = text.trim();
    if text.len() != MACHINE_ID_LEN * 2 {
        return None;
    }
    let mut id = [0u8; MACHINE_ID_LEN];
    for (i, byte) in id.iter_mut().enumerate() {
        *byte = u8::from_str_radix(&text[i * 2..i * 2 + 2], 16).ok()?;
    }
    Some(id)
}

/// Returns the stable 16-byte machine identity.
///
/// Sources, in order: the `SOL_MACHINE_ID` environment variable (32 hex
/// digits), then `/etc/machine-id`. When neither yields a valid id, a
/// warning is logged and the all-zeros id is returned, which keeps the
/// device functional but not uniquely identifiable.
pub fn machine_id() -> [u8; MACHINE_ID_LEN] {
    if let Ok(text) = std::env::var("SOL_MACHINE_ID") {
        match parse_hex_id(&text) {
            Some(id) => return id,
            None => warn!("device: ignoring malformed SOL_MACHINE_ID"),
        }
    }

    if let Ok(text) = std::fs::read_to_string("/etc/machine-id") {
        if let Some(id) = parse_hex_id(&text) {
            return id;
        }
    }

    warn!("device: no machine id available, using zeros");
    [0u8; MACHINE_ID_LEN]
}

/// Kernel release string for the `mnos` platform slot.
pub fn os_version() -> String {
    std::fs::read_to_string("/proc/sys/kernel/osrelease")
        .map(|s| s.trim().to_string())
        .unwrap_or_else(|_| "Unknown".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hex_parsing() {
        let id = parse_hex_id("0123456789abcdef0123456789ABCDEF").unwrap();
        assert_eq!(id[0], 0x01);
        assert_eq!(id[15], 0xEF);

        assert!(parse_hex_id("0123").is_none());
        assert!(parse_hex_id("zz23456789abcdef0123456789abcdef").is_none());
        // Trailing newline, as read from /etc/machine-id.
        assert!(parse_hex_id("0123456789abcdef0123456789abcdef\n").is_some());
    }
}
