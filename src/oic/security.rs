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

//! Pre-shared key storage for the DTLS transport.
//!
//! Credentials live in `oic-creds-<base64url machine-id>.json` inside a
//! caller-chosen directory, as a JSON array of `{ "id", "psk" }` objects
//! with base64 values. Key material is held in zero-on-drop buffers and the
//! file is written with owner-only permissions.

use std::cell::RefCell;
use std::io::Write;
use std::path::{Path, PathBuf};

use base64::engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD};
use base64::Engine;
use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

use crate::error::Error;
use crate::oic::device::MACHINE_ID_LEN;
use crate::transport::DtlsCredentials;

#[derive(Serialize, Deserialize)]
struct CredEntry {
    id: String,
    psk: String,
}

struct Credential {
    id: Zeroizing<Vec<u8>>,
    psk: Zeroizing<Vec<u8>>,
}

/// File-backed store of `(peer identity, pre-shared key)` pairs, plus this
/// device's own identity.
pub struct CredStore {
    path: PathBuf,
    machine_id: [u8; MACHINE_ID_LEN],
    creds: RefCell<Vec<Credential>>,
}

impl CredStore {
    fn file_name(machine_id: &[u8; MACHINE_ID_LEN]) -> String {
        format!("oic-creds-{}.json", URL_SAFE_NO_PAD.encode(machine_id))
    }

    /// Loads the store for `machine_id` from `dir`. A missing file yields
    /// an empty store; a file that fails to parse voids the store entirely
    /// and returns `None`.
    pub fn load(dir: &Path, machine_id: [u8; MACHINE_ID_LEN]) -> Option<CredStore> {
        let path = dir.join(CredStore::file_name(&machine_id));
        let store = CredStore {
            path: path.clone(),
            machine_id,
            creds: RefCell::new(Vec::new()),
        };

        let text = match std::fs::read_to_string(&path) {
            Ok(text) => text,
            Err(ref e) if e.kind() == std::io::ErrorKind::NotFound => return Some(store),
            Err(e) => {
                warn!("security: cannot read {}: {}", path.display(), e);
                return None;
            }
        };

        let entries: Vec<CredEntry> = match serde_json::from_str(&text) {
            Ok(entries) => entries,
            Err(e) => {
                warn!("security: discarding malformed {}: {}", path.display(), e);
                return None;
            }
        };

        for entry in entries {
            let id = match STANDARD.decode(&entry.id) {
                Ok(id) => Zeroizing::new(id),
                Err(_) => {
                    warn!("security: discarding store with undecodable id");
                    return None;
                }
            };
            let psk = match STANDARD.decode(&entry.psk) {
                Ok(psk) => Zeroizing::new(psk),
                Err(_) => {
                    warn!("security: discarding store with undecodable psk");
                    return None;
                }
            };
            store.creds.borrow_mut().push(Credential { id, psk });
        }

        Some(store)
    }

    /// Number of stored credentials.
    pub fn len(&self) -> usize {
        self.creds.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Adds a credential. Re-adding an identical pair is a no-op; a new psk
    /// for a known id is rejected, so a stored key can never be silently
    /// replaced.
    pub fn add(&self, id: &[u8], psk: &[u8]) -> Result<(), Error> {
        let mut creds = self.creds.borrow_mut();
        if let Some(existing) = creds.iter().find(|c| *c.id == id) {
            if *existing.psk == psk {
                return Ok(());
            }
            warn!("security: conflicting psk for known id, rejecting");
            return Err(Error::Conflict);
        }

        creds.push(Credential {
            id: Zeroizing::new(id.to_vec()),
            psk: Zeroizing::new(psk.to_vec()),
        });
        Ok(())
    }

    /// Writes the store back to its file with owner-only permissions.
    pub fn persist(&self) -> Result<(), Error> {
        let entries: Vec<CredEntry> = self
            .creds
            .borrow()
            .iter()
            .map(|c| CredEntry {
                id: STANDARD.encode(&*c.id),
                psk: STANDARD.encode(&*c.psk),
            })
            .collect();

        let mut options = std::fs::OpenOptions::new();
        options.write(true).create(true).truncate(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }

        let mut file = options.open(&self.path)?;
        let text = serde_json::to_string(&entries).map_err(|_| Error::EncodeFailure)?;
        file.write_all(text.as_bytes())?;
        Ok(())
    }

    /// Drops every credential, zeroing the key material.
    pub fn clear(&self) {
        self.creds.borrow_mut().clear();
    }
}

impl DtlsCredentials for CredStore {
    fn get_id(&self, buf: &mut [u8]) -> Result<usize, Error> {
        if buf.len() < MACHINE_ID_LEN {
            return Err(Error::OutOfSpace);
        }
        buf[..MACHINE_ID_LEN].copy_from_slice(&self.machine_id);
        Ok(MACHINE_ID_LEN)
    }

    fn get_psk(&self, id: &[u8], buf: &mut [u8]) -> Result<usize, Error> {
        let creds = self.creds.borrow();
        let cred = creds.iter().find(|c| *c.id == id).ok_or(Error::NotFound)?;
        if buf.len() < cred.psk.len() {
            return Err(Error::OutOfSpace);
        }
        buf[..cred.psk.len()].copy_from_slice(&cred.psk);
        Ok(cred.psk.len())
    }
}

impl std::fmt::Debug for CredStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Deliberately omits key material.
        f.debug_struct("CredStore")
            .field("path", &self.path)
            .field("len", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MID: [u8; MACHINE_ID_LEN] = [0x11; MACHINE_ID_LEN];

    #[test]
    fn missing_file_gives_empty_store() {
        let dir = tempfile::tempdir().unwrap();
        let store = CredStore::load(dir.path(), MID).unwrap();
        assert!(store.is_empty());
    }

    #[test]
    fn load_and_lookup() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CredStore::file_name(&MID));
        let id = [0xAA; 16];
        let psk = [0x55; 16];
        std::fs::write(
            &path,
            format!(
                r#"[{{"id":"{}","psk":"{}"}}]"#,
                STANDARD.encode(id),
                STANDARD.encode(psk)
            ),
        )
        .unwrap();

        let store = CredStore::load(dir.path(), MID).unwrap();
        assert_eq!(store.len(), 1);

        let mut buf = [0u8; 32];
        let n = store.get_psk(&id, &mut buf).unwrap();
        assert_eq!(&buf[..n], &psk);

        assert_eq!(store.get_psk(&[0xBB; 16], &mut buf), Err(Error::NotFound));

        let mut small = [0u8; 4];
        assert_eq!(store.get_psk(&id, &mut small), Err(Error::OutOfSpace));
    }

    #[test]
    fn own_identity() {
        let dir = tempfile::tempdir().unwrap();
        let store = CredStore::load(dir.path(), MID).unwrap();

        let mut buf = [0u8; MACHINE_ID_LEN];
        assert_eq!(store.get_id(&mut buf).unwrap(), MACHINE_ID_LEN);
        assert_eq!(buf, MID);

        let mut small = [0u8; 8];
        assert_eq!(store.get_id(&mut small), Err(Error::OutOfSpace));
    }

    #[test]
    fn add_is_idempotent_and_conflict_safe() {
        let dir = tempfile::tempdir().unwrap();
        let store = CredStore::load(dir.path(), MID).unwrap();

        store.add(&[1, 2, 3], &[4, 5, 6]).unwrap();
        store.add(&[1, 2, 3], &[4, 5, 6]).unwrap();
        assert_eq!(store.len(), 1);

        assert_eq!(store.add(&[1, 2, 3], &[9, 9, 9]), Err(Error::Conflict));
        assert_eq!(store.len(), 1);

        let mut buf = [0u8; 8];
        let n = store.get_psk(&[1, 2, 3], &mut buf).unwrap();
        assert_eq!(&buf[..n], &[4, 5, 6]);
    }

    #[test]
    fn persist_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = CredStore::load(dir.path(), MID).unwrap();
            store.add(&[0xAA; 16], &[0x55; 16]).unwrap();
            store.persist().unwrap();
        }

        let store = CredStore::load(dir.path(), MID).unwrap();
        assert_eq!(store.len(), 1);
        let mut buf = [0u8; 16];
        store.get_psk(&[0xAA; 16], &mut buf).unwrap();
        assert_eq!(buf, [0x55; 16]);

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let meta = std::fs::metadata(dir.path().join(CredStore::file_name(&MID))).unwrap();
            assert_eq!(meta.permissions().mode() & 0o777, 0o600);
        }
    }

    #[test]
    fn malformed_file_voids_store() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CredStore::file_name(&MID));

        std::fs::write(&path, "not json").unwrap();
        assert!(CredStore::load(dir.path(), MID).is_none());

        std::fs::write(&path, r#"[{"id":"!!!","psk":"AA=="}]"#).unwrap();
        assert!(CredStore::load(dir.path(), MID).is_none());
    }
}
