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

//! The service record and its small companion enums.

use std::os::unix::io::RawFd;

use anopa_core::tain::Tain;
use anopa_status::StatusRecord;

/// A dense, stable handle into the Service Table. Never reused:
/// records persist for the lifetime of the `Table` even after their
/// owning service completes.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub struct Handle(pub usize);

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ServiceKind {
    Oneshot,
    Longrun,
    Unknown,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum LoadState {
    NotLoaded,
    Loading,
    Loaded,
    Verified,
    Failed,
}

/// Which lifecycle transition the scheduler is currently driving the
/// service through, or has driven it through.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum RunState {
    Idle,
    Starting,
    Stopping,
    Done,
}

pub struct ServiceRecord {
    pub name_offset: usize,
    pub kind: ServiceKind,

    pub needs: Vec<Handle>,
    pub wants: Vec<Handle>,
    pub after: Vec<Handle>,

    /// Reference count of activation requests; `>0` iff this handle
    /// is a member of the table's active working set. Maintained by
    /// `Table::push_active`/`remove_active`.
    pub mark_count: u32,
    pub load_state: LoadState,
    pub run_state: RunState,

    pub status: Option<StatusRecord>,
    pub ts_exec: Option<Tain>,
    pub timeout_secs: u64,

    pub readiness_capable: bool,
    /// External subscription token for longrun events.
    pub notify_handle: Option<u64>,

    pub fd_stdin: Option<RawFd>,
    pub fd_stdout: Option<RawFd>,
    pub fd_progress: Option<RawFd>,

    pub output_buffer: Vec<u8>,
    pub progress_index: Option<usize>,

    pub timed_out: bool,

    /// Load-time error, cached so a repeated `ensure_loaded` against a
    /// `Failed` record returns the same outcome without re-reading disk.
    pub load_error: Option<LoadErrorKind>,

    /// Starts "down": the `down` marker was present at load time.
    pub starts_down: bool,
}

/// The small subset of `anopa_core::Error` variants that can be cached
/// on a `Failed` record.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum LoadErrorKind {
    InvalidName,
    Unknown,
    Io(i32),
    AlreadyUp,
    NotUp,
}

impl ServiceRecord {
    pub fn new(name_offset: usize) -> Self {
        ServiceRecord {
            name_offset,
            kind: ServiceKind::Unknown,
            needs: Vec::new(),
            wants: Vec::new(),
            after: Vec::new(),
            mark_count: 0,
            load_state: LoadState::NotLoaded,
            run_state: RunState::Idle,
            status: None,
            ts_exec: None,
            timeout_secs: anopa_core::env::DEFAULT_TIMEOUT_SECS,
            readiness_capable: false,
            notify_handle: None,
            fd_stdin: None,
            fd_stdout: None,
            fd_progress: None,
            output_buffer: Vec::new(),
            progress_index: None,
            timed_out: false,
            load_error: None,
            starts_down: false,
        }
    }

    pub fn is_in_flight(&self) -> bool {
        matches!(self.run_state, RunState::Starting | RunState::Stopping)
    }
}
