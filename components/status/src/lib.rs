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

//! The status store: a fixed-width prefix plus a length-prefixed
//! message, persisted per service as `<name>/status`. Reads are
//! tolerant of a missing file; writes are write-to-tmp + rename,
//! fsync'd where the platform supports it.

use std::fs::{self, File};
use std::io::{self, Read, Write};
use std::path::Path;

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};

use anopa_core::tain::{Tain, ENCODED_LEN as TAIN_LEN};

/// `event` field of the durable status record.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Event {
    None,
    Starting,
    Started,
    Stopping,
    Stopped,
    StartingFailed,
    StartFailed,
    StoppingFailed,
    StopFailed,
    Error,
    /// A byte this reader doesn't recognize. Readers must not treat
    /// this as a hard error.
    Unknown(u8),
}

impl Event {
    fn to_byte(self) -> u8 {
        match self {
            Event::None => 0,
            Event::Starting => 1,
            Event::Started => 2,
            Event::Stopping => 3,
            Event::Stopped => 4,
            Event::StartingFailed => 5,
            Event::StartFailed => 6,
            Event::StoppingFailed => 7,
            Event::StopFailed => 8,
            Event::Error => 9,
            Event::Unknown(b) => b,
        }
    }

    fn from_byte(b: u8) -> Self {
        match b {
            0 => Event::None,
            1 => Event::Starting,
            2 => Event::Started,
            3 => Event::Stopping,
            4 => Event::Stopped,
            5 => Event::StartingFailed,
            6 => Event::StartFailed,
            7 => Event::StoppingFailed,
            8 => Event::StopFailed,
            9 => Event::Error,
            other => Event::Unknown(other),
        }
    }

    /// Whether this event represents a terminal "up" state for an
    /// in-flight start (used by `service_is_ok`).
    pub fn is_started(self) -> bool {
        matches!(self, Event::Started)
    }

    pub fn is_stopped(self) -> bool {
        matches!(self, Event::Stopped)
    }

    pub fn is_failure(self) -> bool {
        matches!(
            self,
            Event::StartingFailed | Event::StartFailed | Event::StoppingFailed | Event::StopFailed | Event::Error
        )
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct StatusRecord {
    pub event: Event,
    pub code: i32,
    pub stamp: Tain,
    pub message: Option<String>,
}

impl StatusRecord {
    pub fn new(event: Event, code: i32, stamp: Tain) -> Self {
        StatusRecord {
            event,
            code,
            stamp,
            message: None,
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn encode(&self) -> Vec<u8> {
        let msg_bytes = self.message.as_deref().unwrap_or("").as_bytes();
        let mut buf = Vec::with_capacity(1 + 4 + TAIN_LEN + 2 + msg_bytes.len());
        buf.write_u8(self.event.to_byte()).unwrap();
        buf.write_i32::<BigEndian>(self.code).unwrap();
        buf.extend_from_slice(&self.stamp.to_bytes());
        buf.write_u16::<BigEndian>(msg_bytes.len() as u16).unwrap();
        buf.extend_from_slice(msg_bytes);
        buf
    }

    pub fn decode(mut bytes: &[u8]) -> io::Result<Self> {
        let event = Event::from_byte(bytes.read_u8()?);
        let code = bytes.read_i32::<BigEndian>()?;
        if bytes.len() < TAIN_LEN {
            return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "truncated stamp"));
        }
        let mut stamp_buf = [0u8; TAIN_LEN];
        bytes.read_exact(&mut stamp_buf)?;
        let stamp = Tain::from_bytes(&stamp_buf);
        let msg_len = bytes.read_u16::<BigEndian>()? as usize;
        if bytes.len() < msg_len {
            return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "truncated message"));
        }
        let message = if msg_len == 0 {
            None
        } else {
            Some(String::from_utf8_lossy(&bytes[..msg_len]).into_owned())
        };
        Ok(StatusRecord {
            event,
            code,
            stamp,
            message,
        })
    }
}

/// Read `<dir>/status`. A missing file is not an error.
pub fn read(path: &Path) -> anopa_core::Result<Option<StatusRecord>> {
    match fs::read(path) {
        Ok(bytes) => match StatusRecord::decode(&bytes) {
            Ok(record) => Ok(Some(record)),
            Err(e) => {
                log::warn!(target: "anopa::status", "malformed status file {path:?}: {e}");
                Ok(None)
            }
        },
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(anopa_core::Error::Io {
            path: path.to_path_buf(),
            source: e,
        }),
    }
}

/// Atomically write a status record: write to `<path>.tmp`, rename
/// over `path`, then fsync the parent directory so the rename is
/// durable before the corresponding supervisor command is issued.
pub fn write(path: &Path, record: &StatusRecord) -> anopa_core::Result<()> {
    let tmp_path = path.with_extension("tmp");
    let io_err = |source: io::Error| anopa_core::Error::Io {
        path: path.to_path_buf(),
        source,
    };

    let mut file = File::create(&tmp_path).map_err(io_err)?;
    file.write_all(&record.encode()).map_err(io_err)?;
    file.sync_all().map_err(io_err)?;
    drop(file);

    fs::rename(&tmp_path, path).map_err(io_err)?;

    if let Some(parent) = path.parent() {
        if let Ok(dir) = File::open(parent) {
            // Directory fsync isn't supported on every filesystem;
            // tolerate failure rather than treating it as fatal.
            let _ = dir.sync_all();
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use anopa_core::tain::Tain;

    #[test]
    fn round_trip_with_message() {
        let record = StatusRecord::new(Event::StartFailed, 42, Tain::new(100, 200))
            .with_message("a");
        let encoded = record.encode();
        let decoded = StatusRecord::decode(&encoded).unwrap();
        assert_eq!(decoded, record);
    }

    #[test]
    fn round_trip_without_message() {
        let record = StatusRecord::new(Event::Started, 0, Tain::new(1, 2));
        let decoded = StatusRecord::decode(&record.encode()).unwrap();
        assert_eq!(decoded, record);
    }

    #[test]
    fn unknown_event_byte_is_tolerated() {
        let mut bytes = StatusRecord::new(Event::Started, 0, Tain::new(1, 2)).encode();
        bytes[0] = 200;
        let decoded = StatusRecord::decode(&bytes).unwrap();
        assert!(matches!(decoded.event, Event::Unknown(200)));
    }

    #[test]
    fn missing_file_reads_as_none() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("status");
        assert!(read(&path).unwrap().is_none());
    }

    #[test]
    fn write_then_read_round_trips_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("status");
        let record = StatusRecord::new(Event::Stopped, 0, Tain::new(5, 6));
        write(&path, &record).unwrap();
        let read_back = read(&path).unwrap().unwrap();
        assert_eq!(read_back, record);
        assert!(!path.with_extension("tmp").exists());
    }
}
