// Copyright (c) 2026 the anopa contributors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! The FIFO-backed `SupervisorClient`. The event channel is a single
//! connection shared by all long-runs; per-service control is a
//! one-byte write to that service's own control FIFO
//! (`<svcdir>/supervise/control`), and status is read from
//! `<svcdir>/supervise/status`, the layout the external supervisor is
//! assumed to maintain.

use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{Read, Write};
use std::os::unix::fs::OpenOptionsExt;
use std::os::unix::io::{AsRawFd, RawFd};
use std::path::PathBuf;

use anopa_core::tain::Tain;
use anopa_core::{Error, Result};

use crate::protocol::{Command, Event};
use crate::{SubscriptionId, SupervisorStatus};

const SUPERVISE_DIR: &str = "supervise";
const CONTROL_FILE: &str = "control";
const STATUS_FILE: &str = "status";
const EVENT_FIFO_ENV: &str = "AA_EVENT_FIFO";
const DEFAULT_EVENT_FIFO: &str = "/run/anopa/events";

/// On-disk status record the external supervisor is expected to
/// maintain per service: `pid:i32 | finishing:u8 | ready:u8 |
/// stamp:tain(12B)`, big-endian.
const SUPERVISE_STATUS_LEN: usize = 4 + 1 + 1 + 12;

pub struct FifoSupervisorClient {
    repo_root: PathBuf,
    event_fd: File,
    next_id: u64,
    subscriptions: HashMap<u64, String>,
}

impl FifoSupervisorClient {
    /// Open the shared event channel. `repo_root` is the service
    /// repository root, used to locate each service's `supervise/`
    /// directory for per-service commands and status.
    pub fn connect(repo_root: PathBuf) -> Result<Self> {
        let event_path = std::env::var(EVENT_FIFO_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_EVENT_FIFO));

        let event_fd = OpenOptions::new()
            .read(true)
            .custom_flags(libc::O_NONBLOCK)
            .open(&event_path)
            .map_err(|source| Error::Io {
                path: event_path.clone(),
                source,
            })?;

        Ok(FifoSupervisorClient {
            repo_root,
            event_fd,
            next_id: 0,
            subscriptions: HashMap::new(),
        })
    }

    fn supervise_dir(&self, name: &str) -> PathBuf {
        self.repo_root.join(name).join(SUPERVISE_DIR)
    }
}

impl super::SupervisorClient for FifoSupervisorClient {
    fn send_command(&mut self, name: &str, cmd: Command) -> Result<()> {
        let control_path = self.supervise_dir(name).join(CONTROL_FILE);
        let mut control = OpenOptions::new()
            .write(true)
            .custom_flags(libc::O_NONBLOCK)
            .open(&control_path)
            .map_err(|source| Error::Io {
                path: control_path.clone(),
                source,
            })?;
        control.write_all(&[cmd.to_byte()]).map_err(|source| Error::Io {
            path: control_path,
            source,
        })
    }

    fn query_status(&mut self, name: &str) -> Result<Option<SupervisorStatus>> {
        let status_path = self.supervise_dir(name).join(STATUS_FILE);
        let bytes = match std::fs::read(&status_path) {
            Ok(b) => b,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(Error::Io {
                    path: status_path,
                    source,
                })
            }
        };
        if bytes.len() < SUPERVISE_STATUS_LEN {
            return Ok(None);
        }
        let pid = i32::from_be_bytes(bytes[0..4].try_into().unwrap());
        let finishing = bytes[4] != 0;
        let ready = bytes[5] != 0;
        let stamp_bytes: [u8; 12] = bytes[6..18].try_into().unwrap();
        Ok(Some(SupervisorStatus {
            pid,
            finishing,
            ready,
            stamp: Tain::from_bytes(&stamp_bytes),
        }))
    }

    fn subscribe(&mut self, name: &str) -> Result<SubscriptionId> {
        let id = self.next_id;
        self.next_id += 1;
        self.subscriptions.insert(id, name.to_string());
        Ok(SubscriptionId(id))
    }

    fn unsubscribe_for(&mut self, id: SubscriptionId) {
        self.subscriptions.remove(&id.0);
    }

    /// Each frame on the shared channel is `name_len:u8 | name:bytes |
    /// event:u8`, so a single fifo can carry events for every
    /// in-flight longrun without one service's event reaching another
    /// service's subscription.
    fn poll_events(&mut self) -> Result<Vec<(SubscriptionId, Event)>> {
        let io_err = |source: std::io::Error| Error::Io {
            path: PathBuf::from(DEFAULT_EVENT_FIFO),
            source,
        };

        let mut out = Vec::new();
        loop {
            let mut name_len = [0u8; 1];
            match self.event_fd.read(&mut name_len) {
                Ok(0) => break,
                Ok(_) => {}
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => break,
                Err(source) => return Err(io_err(source)),
            }

            let mut name_buf = vec![0u8; name_len[0] as usize];
            self.event_fd.read_exact(&mut name_buf).map_err(io_err)?;
            let mut event_byte = [0u8; 1];
            self.event_fd.read_exact(&mut event_byte).map_err(io_err)?;

            let name = String::from_utf8_lossy(&name_buf);
            let Some(event) = Event::from_byte(event_byte[0]) else {
                continue;
            };
            if let Some((&id, _)) = self.subscriptions.iter().find(|(_, n)| n.as_str() == name) {
                out.push((SubscriptionId(id), event));
            }
        }
        Ok(out)
    }

    fn event_fd(&self) -> RawFd {
        self.event_fd.as_raw_fd()
    }
}
