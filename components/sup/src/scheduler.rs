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

//! The runtime scheduler: a single-threaded cooperative event loop
//! multiplexing the supervisor's event channel, per-oneshot stdout
//! and progress pipes, and child-exit notifications, driving the
//! active list to completion one tick at a time.

use std::collections::HashMap;
use std::fs::File;
use std::io::Read;
use std::os::unix::io::{FromRawFd, RawFd};
use std::path::PathBuf;
use std::sync::atomic::{AtomicI32, Ordering};
use std::time::Duration;

use mio::unix::SourceFd;
use mio::{Events, Interest, Poll, Token};

use anopa_core::tain::Clock;
use anopa_core::{Error, Mode, Result};
use anopa_graph::RunObserver;
use anopa_status::{Event as StatusEvent, StatusRecord};
use anopa_supervisor_client::{Command, Event as SupervisorEvent, SubscriptionId, SupervisorClient};
use anopa_table::{Handle, RunState, ServiceKind, Table};

use crate::config::SECS_BEFORE_WAITING;
use crate::draw::{DrawState, Drawer};
use crate::longrun::{self, Stage};
use crate::oneshot::{self, OneshotProc};

const TOKEN_SUPERVISOR: Token = Token(0);
const TOKEN_SELF_PIPE: Token = Token(1);
const FIRST_DYNAMIC_TOKEN: usize = 2;

static SELF_PIPE_WRITE_FD: AtomicI32 = AtomicI32::new(-1);

extern "C" fn on_sigchld(_signum: libc::c_int) {
    let fd = SELF_PIPE_WRITE_FD.load(Ordering::Relaxed);
    if fd >= 0 {
        let byte: u8 = 1;
        unsafe {
            libc::write(fd, &byte as *const u8 as *const libc::c_void, 1);
        }
    }
}

/// A `SIGCHLD` handler that writes one byte to a pipe rather than
/// doing anything async-signal-unsafe; the read end is registered
/// with the poller like any other fd.
struct SelfPipe {
    read: File,
}

impl SelfPipe {
    fn install() -> Result<Self> {
        let mut fds = [0 as RawFd; 2];
        if unsafe { libc::pipe(fds.as_mut_ptr()) } != 0 {
            return Err(io_err("self-pipe"));
        }
        let (read_fd, write_fd) = (fds[0], fds[1]);
        unsafe {
            let flags = libc::fcntl(read_fd, libc::F_GETFL, 0);
            libc::fcntl(read_fd, libc::F_SETFL, flags | libc::O_NONBLOCK);
        }
        SELF_PIPE_WRITE_FD.store(write_fd, Ordering::Relaxed);

        let mut action: libc::sigaction = unsafe { std::mem::zeroed() };
        action.sa_sigaction = on_sigchld as usize;
        action.sa_flags = libc::SA_RESTART;
        unsafe {
            libc::sigemptyset(&mut action.sa_mask);
            if libc::sigaction(libc::SIGCHLD, &action, std::ptr::null_mut()) != 0 {
                return Err(io_err("sigaction"));
            }
        }

        Ok(SelfPipe {
            read: unsafe { File::from_raw_fd(read_fd) },
        })
    }

    fn drain(&mut self) {
        let mut buf = [0u8; 64];
        loop {
            match self.read.read(&mut buf) {
                Ok(0) => break,
                Ok(_) => continue,
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => break,
                Err(_) => break,
            }
        }
    }
}

fn io_err(what: &str) -> Error {
    Error::Io {
        path: PathBuf::from(what),
        source: std::io::Error::last_os_error(),
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum PipeKind {
    Stdout,
    Progress,
}

struct Longrun {
    subscription: SubscriptionId,
    stage: Stage,
}

/// Drives the active list of `table` to completion, executing
/// oneshots directly and issuing up/down commands to `supervisor` for
/// long-runs.
pub struct Scheduler<'a> {
    repo_root: PathBuf,
    supervisor: &'a mut dyn SupervisorClient,
    mode: Mode,
    clock: Clock,
    poll: Poll,
    self_pipe: SelfPipe,
    next_token: usize,
    tokens: HashMap<Token, (Handle, PipeKind)>,
    oneshots: HashMap<Handle, OneshotProc>,
    longruns: HashMap<Handle, Longrun>,
    drawer: Drawer,
    pub shutdown: bool,
}

impl<'a> Scheduler<'a> {
    pub fn new(repo_root: PathBuf, supervisor: &'a mut dyn SupervisorClient, mode: Mode) -> Result<Self> {
        let poll = Poll::new().map_err(|e| Error::Io {
            path: PathBuf::from("mio::Poll"),
            source: e,
        })?;
        let self_pipe = SelfPipe::install()?;

        poll.registry()
            .register(&mut SourceFd(&self_pipe.read_fd()), TOKEN_SELF_PIPE, Interest::READABLE)
            .map_err(|e| Error::Io {
                path: PathBuf::from("self-pipe"),
                source: e,
            })?;

        let supervisor_fd = supervisor.event_fd();
        if supervisor_fd >= 0 {
            poll.registry()
                .register(&mut SourceFd(&supervisor_fd), TOKEN_SUPERVISOR, Interest::READABLE)
                .map_err(|e| Error::Io {
                    path: PathBuf::from("supervisor event channel"),
                    source: e,
                })?;
        }

        Ok(Scheduler {
            repo_root,
            supervisor,
            mode,
            clock: Clock::start(),
            poll,
            self_pipe,
            next_token: FIRST_DYNAMIC_TOKEN,
            tokens: HashMap::new(),
            oneshots: HashMap::new(),
            longruns: HashMap::new(),
            drawer: Drawer::new(),
            shutdown: false,
        })
    }

    fn status_path(&self, table: &Table, handle: Handle) -> PathBuf {
        anopa_repo::service_dir(&self.repo_root, table.name_of(handle)).join("status")
    }

    fn service_dir(&self, table: &Table, handle: Handle) -> PathBuf {
        anopa_repo::service_dir(&self.repo_root, table.name_of(handle))
    }

    /// Writes the record to disk and mirrors it onto the in-memory
    /// record, so a later `service_is_ok` call in the same run sees
    /// this outcome without re-reading the file it just wrote.
    fn persist(&self, table: &mut Table, handle: Handle, event: StatusEvent, code: i32, message: Option<String>) {
        let mut record = StatusRecord::new(event, code, self.clock.now());
        if let Some(msg) = message {
            record = record.with_message(msg);
        }
        let path = self.status_path(table, handle);
        if let Err(e) = anopa_status::write(&path, &record) {
            log::warn!(target: "anopa::sup", "failed to persist status for {:?}: {e}", table.name_of(handle));
        }
        table.lookup_mut(handle).status = Some(record);
    }

    fn alloc_token(&mut self, handle: Handle, kind: PipeKind) -> Token {
        let token = Token(self.next_token);
        self.next_token += 1;
        self.tokens.insert(token, (handle, kind));
        token
    }

    /// Begin executing `handle`, as signalled by `graph::schedule`'s
    /// `on_ready_to_exec` callback.
    fn exec_service(&mut self, table: &mut Table, handle: Handle) -> Result<()> {
        table.lookup_mut(handle).run_state = if self.mode.is_start() {
            RunState::Starting
        } else {
            RunState::Stopping
        };
        table.lookup_mut(handle).ts_exec = Some(self.clock.now());

        let event = if self.mode.is_start() {
            StatusEvent::Starting
        } else {
            StatusEvent::Stopping
        };
        self.persist(table, handle, event, 0, None);

        match table.lookup(handle).kind {
            ServiceKind::Oneshot | ServiceKind::Unknown => {
                let dir = self.service_dir(table, handle);
                let script = if self.mode.is_start() { "start" } else { "stop" };
                let proc = oneshot::spawn(&dir, handle, script)?;

                let stdout_token = self.alloc_token(handle, PipeKind::Stdout);
                let progress_token = self.alloc_token(handle, PipeKind::Progress);
                let stdout_fd = proc.stdout_fd();
                let progress_fd = proc.progress_fd();
                self.poll
                    .registry()
                    .register(&mut SourceFd(&stdout_fd), stdout_token, Interest::READABLE)
                    .map_err(|e| Error::Io {
                        path: PathBuf::from("oneshot stdout"),
                        source: e,
                    })?;
                self.poll
                    .registry()
                    .register(&mut SourceFd(&progress_fd), progress_token, Interest::READABLE)
                    .map_err(|e| Error::Io {
                        path: PathBuf::from("oneshot progress"),
                        source: e,
                    })?;

                self.oneshots.insert(handle, proc);
            }
            ServiceKind::Longrun => {
                let name = table.name_of(handle).to_string();
                let subscription = longrun::initiate(&mut *self.supervisor, &name, self.mode)?;
                let stage = longrun::initial_stage(self.mode, table.lookup(handle).readiness_capable);
                self.longruns.insert(handle, Longrun { subscription, stage });
            }
        }

        Ok(())
    }

    /// One full main-loop iteration: scheduling pass, deadline wait,
    /// fd dispatch, timeout handling, redraw.
    fn tick(&mut self, table: &mut Table, observer: &mut dyn RunObserver) -> Result<()> {
        let mut ready = Vec::new();
        let mut dependency_failures = Vec::new();
        {
            let mut collecting = ReadyObserverAdapter {
                inner: observer,
                ready: &mut ready,
                dependency_failures: &mut dependency_failures,
            };
            anopa_graph::schedule(table, &mut *self.supervisor, self.mode, &mut collecting)?;
        }

        let failure_event = if self.mode.is_start() {
            StatusEvent::StartingFailed
        } else {
            StatusEvent::StoppingFailed
        };
        let dependency_code = Error::Dependency {
            name: String::new(),
        }
        .code();
        for (handle, missing_name) in dependency_failures {
            self.persist(table, handle, failure_event, dependency_code, Some(missing_name));
        }

        for handle in ready {
            self.exec_service(table, handle)?;
        }

        self.update_waiting_overlay(table);

        if self.shutdown {
            return Ok(());
        }

        let deadline = self.next_deadline(table);
        let mut events = Events::with_capacity(32);
        self.poll.poll(&mut events, deadline).map_err(|e| Error::Io {
            path: PathBuf::from("mio::Poll::poll"),
            source: e,
        })?;

        for event in events.iter() {
            self.dispatch_event(table, event.token())?;
        }

        self.handle_timeouts(table)?;

        if self.drawer.take_dirty() {
            self.drawer.around_log(|| {});
        }

        Ok(())
    }

    fn next_deadline(&self, table: &Table) -> Option<Duration> {
        table
            .active()
            .iter()
            .filter_map(|&h| {
                let record = table.lookup(h);
                let ts_exec = record.ts_exec?;
                let elapsed = self.clock.elapsed_since(&ts_exec);
                let timeout_remaining = Duration::from_secs(record.timeout_secs)
                    .checked_sub(elapsed)
                    .unwrap_or(Duration::ZERO);
                let waiting_remaining = SECS_BEFORE_WAITING.checked_sub(elapsed).unwrap_or(Duration::ZERO);
                Some(timeout_remaining.min(waiting_remaining))
            })
            .min()
    }

    /// Sets or clears the `WAITING` overlay bit depending on whether
    /// any in-flight service has been running longer than
    /// `SECS_BEFORE_WAITING`, without disturbing whatever else is in
    /// the overlay (e.g. `PROGRESS`).
    fn update_waiting_overlay(&mut self, table: &Table) {
        let waiting = table.active().iter().any(|&h| {
            table
                .lookup(h)
                .ts_exec
                .map(|ts| self.clock.elapsed_since(&ts) >= SECS_BEFORE_WAITING)
                .unwrap_or(false)
        });

        let mut need = self.drawer.needed();
        if waiting {
            need.insert(DrawState::WAITING);
        } else {
            need.remove(DrawState::WAITING);
        }
        self.drawer.set_needed(need);
    }

    fn dispatch_event(&mut self, table: &mut Table, token: Token) -> Result<()> {
        if token == TOKEN_SELF_PIPE {
            self.self_pipe.drain();
            self.reap_children(table)?;
            return Ok(());
        }

        if token == TOKEN_SUPERVISOR {
            let events = self.supervisor.poll_events()?;
            for (sub, ev) in events {
                self.dispatch_longrun_event(table, sub, ev);
            }
            return Ok(());
        }

        if let Some(&(handle, kind)) = self.tokens.get(&token) {
            self.drain_oneshot_pipe(table, handle, kind);
        }

        Ok(())
    }

    fn drain_oneshot_pipe(&mut self, table: &mut Table, handle: Handle, kind: PipeKind) {
        let Some(proc) = self.oneshots.get_mut(&handle) else {
            return;
        };
        let name = table.name_of(handle).to_string();
        match kind {
            PipeKind::Stdout => {
                if let Ok(bytes) = proc.drain_stdout() {
                    if !bytes.is_empty() {
                        table.lookup_mut(handle).output_buffer.extend_from_slice(&bytes);
                        if anopa_core::env::double_output() {
                            self.drawer
                                .around_log(|| print!("{name}: {}", String::from_utf8_lossy(&bytes)));
                        }
                    }
                }
            }
            PipeKind::Progress => {
                if let Ok(bytes) = proc.drain_progress() {
                    if !bytes.is_empty() {
                        self.drawer.set_needed(self.drawer.needed() | DrawState::PROGRESS);
                    }
                }
            }
        }
    }

    fn dispatch_longrun_event(&mut self, table: &mut Table, sub: SubscriptionId, event: SupervisorEvent) {
        let handle = match self.longruns.iter().find(|(_, l)| l.subscription == sub) {
            Some((&h, _)) => h,
            None => return,
        };
        let stage = self.longruns[&handle].stage;

        if let Some((status_event, next_stage)) = longrun::dispatch(stage, event) {
            self.longruns.get_mut(&handle).unwrap().stage = next_stage;
            let terminal = matches!(
                status_event,
                StatusEvent::Started | StatusEvent::Stopped | StatusEvent::StartFailed | StatusEvent::StopFailed
            );
            self.persist(table, handle, status_event, 0, None);
            if terminal {
                self.finish(table, handle);
            }
        }
    }

    fn reap_children(&mut self, table: &mut Table) -> Result<()> {
        loop {
            let mut status: libc::c_int = 0;
            let pid = unsafe { libc::waitpid(-1, &mut status, libc::WNOHANG) };
            if pid <= 0 {
                break;
            }
            let handle = self
                .oneshots
                .iter()
                .find(|(_, p)| p.child.id() as libc::pid_t == pid)
                .map(|(&h, _)| h);
            let Some(handle) = handle else { continue };

            let mut proc = self.oneshots.remove(&handle).unwrap();
            while let Ok(bytes) = proc.drain_stdout() {
                if bytes.is_empty() {
                    break;
                }
                table.lookup_mut(handle).output_buffer.extend_from_slice(&bytes);
            }

            let exit_status =
                <std::process::ExitStatus as std::os::unix::process::ExitStatusExt>::from_raw(status);
            let (event, code) = match oneshot::outcome_of(exit_status) {
                Ok(()) => {
                    let ok_event = if self.mode.is_start() {
                        StatusEvent::Started
                    } else {
                        StatusEvent::Stopped
                    };
                    (ok_event, 0)
                }
                Err(wstat) => {
                    let fail_event = if self.mode.is_start() {
                        StatusEvent::StartFailed
                    } else {
                        StatusEvent::StopFailed
                    };
                    (fail_event, wstat)
                }
            };
            self.persist(table, handle, event, code, None);
            self.finish(table, handle);
        }
        Ok(())
    }

    fn handle_timeouts(&mut self, table: &mut Table) -> Result<()> {
        let expired: Vec<Handle> = table
            .active()
            .iter()
            .copied()
            .filter(|&h| {
                let record = table.lookup(h);
                match record.ts_exec {
                    Some(ts) => self.clock.elapsed_since(&ts) >= Duration::from_secs(record.timeout_secs),
                    None => false,
                }
            })
            .collect();

        for handle in expired {
            table.lookup_mut(handle).timed_out = true;
            if table.lookup(handle).kind == ServiceKind::Longrun {
                let name = table.name_of(handle).to_string();
                let _ = self.supervisor.send_command(&name, Command::Abort);
            }
            let event = if self.mode.is_start() {
                StatusEvent::StartingFailed
            } else {
                StatusEvent::StoppingFailed
            };
            let code = Error::Timedout {
                name: table.name_of(handle).to_string(),
                secs: table.lookup(handle).timeout_secs,
            }
            .code();
            self.persist(table, handle, event, code, None);
            self.finish(table, handle);
        }
        Ok(())
    }

    fn finish(&mut self, table: &mut Table, handle: Handle) {
        table.lookup_mut(handle).run_state = RunState::Done;
        table.remove_active(handle);

        if let Some(longrun) = self.longruns.remove(&handle) {
            self.supervisor.unsubscribe_for(longrun.subscription);
        }

        let stale: Vec<Token> = self
            .tokens
            .iter()
            .filter(|(_, &(h, _))| h == handle)
            .map(|(&t, _)| t)
            .collect();
        for token in stale {
            self.tokens.remove(&token);
        }
    }

    /// Run the scheduling loop to completion: successive ticks until
    /// the active list empties or a shutdown flag is observed.
    pub fn run(&mut self, table: &mut Table, observer: &mut dyn RunObserver) -> Result<()> {
        while !table.active().is_empty() {
            if self.shutdown && self.oneshots.is_empty() && self.longruns.is_empty() {
                break;
            }
            self.tick(table, observer)?;
        }
        Ok(())
    }
}

impl SelfPipe {
    fn read_fd(&self) -> RawFd {
        use std::os::unix::io::AsRawFd;
        self.read.as_raw_fd()
    }
}

/// Adapts a caller's `RunObserver` so the scheduler can additionally
/// collect the handles `on_ready_to_exec` names and the dependency
/// failures `on_dependency_failure` names, without requiring every
/// `RunObserver` implementation to expose those lists itself: only
/// the scheduler holds the repository root needed to persist a
/// status record for the latter.
struct ReadyObserverAdapter<'a, 'b> {
    inner: &'a mut dyn RunObserver,
    ready: &'b mut Vec<Handle>,
    dependency_failures: &'b mut Vec<(Handle, String)>,
}

impl<'a, 'b> RunObserver for ReadyObserverAdapter<'a, 'b> {
    fn on_cycle_break(&mut self, cur: Handle, cur_name: &str, next: Handle, next_name: &str, is_needs_cycle: bool, anchor_pos: usize) {
        self.inner.on_cycle_break(cur, cur_name, next, next_name, is_needs_cycle, anchor_pos);
    }

    fn on_dependency_failure(&mut self, handle: Handle, name: &str, missing: Handle, missing_name: &str) {
        self.dependency_failures.push((handle, missing_name.to_string()));
        self.inner.on_dependency_failure(handle, name, missing, missing_name);
    }

    fn on_scan(&mut self) {
        self.inner.on_scan();
    }

    fn on_ready_to_exec(&mut self, handle: Handle, name: &str, mode: Mode) {
        self.ready.push(handle);
        self.inner.on_ready_to_exec(handle, name, mode);
    }
}
