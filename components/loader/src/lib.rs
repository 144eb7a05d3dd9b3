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

//! The loader: populates a service record from disk and recursively
//! loads its declared neighbors.

use std::path::{Path, PathBuf};

use anopa_core::tain::Clock;
use anopa_core::{Error, Result};
use anopa_repo::{DirKind, EdgeKind};
use anopa_status::{Event as StatusEvent, StatusRecord};
use anopa_supervisor_client::SupervisorClient;
use anopa_table::{record::LoadErrorKind, Handle, LoadState, ServiceKind, Table};

pub use anopa_core::Mode;

/// Which edge list an unresolved neighbor belongs to.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum FailureKind {
    Needs,
    Wants,
}

/// Observer for loader failures. `name` is resolved by the caller so
/// the observer never needs its own table access.
pub trait LoadObserver {
    fn on_load_failure(&mut self, handle: Handle, name: &str, kind: FailureKind, missing_name: &str, err: &Error);
}

/// An observer that does nothing; useful for tests that don't care
/// about the notification stream.
pub struct NullObserver;
impl LoadObserver for NullObserver {
    fn on_load_failure(&mut self, _handle: Handle, _name: &str, _kind: FailureKind, _missing_name: &str, _err: &Error) {}
}

pub struct Loader<'a> {
    pub repo_root: PathBuf,
    pub supervisor: &'a mut dyn SupervisorClient,
    pub clock: Clock,
}

impl<'a> Loader<'a> {
    pub fn new(repo_root: impl Into<PathBuf>, supervisor: &'a mut dyn SupervisorClient) -> Self {
        Loader {
            repo_root: repo_root.into(),
            supervisor,
            clock: Clock::start(),
        }
    }

    /// Drive `handle` to `Loaded`, recursively loading its declared
    /// neighbors. Idempotent and cycle-tolerant: a record already
    /// `Loaded`/`Loading` returns immediately.
    pub fn ensure_loaded(
        &mut self,
        table: &mut Table,
        handle: Handle,
        mode: Mode,
        include_wants: bool,
        observer: &mut dyn LoadObserver,
    ) -> Result<()> {
        match table.lookup(handle).load_state {
            LoadState::Loaded | LoadState::Loading | LoadState::Verified => return Ok(()),
            LoadState::Failed => return Err(cached_error(table, handle)),
            LoadState::NotLoaded => {}
        }

        let name = table.name_of(handle).to_string();

        let raw = match anopa_repo::read(&self.repo_root, &name) {
            Ok(raw) => raw,
            Err(e) => {
                fail(table, handle, &e);
                return Err(e);
            }
        };

        let kind = match raw.dir_kind {
            DirKind::Longrun => ServiceKind::Longrun,
            DirKind::Oneshot => ServiceKind::Oneshot,
            DirKind::Missing => {
                let e = Error::Unknown { name: name.clone() };
                fail(table, handle, &e);
                return Err(e);
            }
        };

        let status_path = anopa_repo::status_path(&raw.path);
        let persisted = anopa_status::read(&status_path)?;

        let is_up = self.determine_up(&name, kind, raw.readiness_capable, mode, persisted.as_ref())?;

        if !mode.suppresses_short_circuit() {
            match mode {
                Mode::Start if is_up.at_least_up() => {
                    let e = Error::AlreadyUp { name: name.clone() };
                    fail(table, handle, &e);
                    return Ok(());
                }
                Mode::Stop | Mode::StopAll if !is_up.at_least_up() => {
                    let e = Error::NotUp { name: name.clone() };
                    fail(table, handle, &e);
                    return Ok(());
                }
                _ => {}
            }
        }

        table.lookup_mut(handle).load_state = LoadState::Loading;
        table.lookup_mut(handle).kind = kind;
        table.lookup_mut(handle).readiness_capable = raw.readiness_capable;
        table.lookup_mut(handle).starts_down = raw.starts_down;
        table.lookup_mut(handle).status = persisted;

        let mut edges = raw.edges;
        if kind == ServiceKind::Longrun && !anopa_core::name::is_logger(&name) && raw.has_logger {
            let logger = anopa_core::name::logger_name(&name);
            edges.push((EdgeKind::Needs, logger.clone()));
            edges.push((EdgeKind::After, logger));
        }

        for (edge_kind, dep_name) in edges {
            if edge_kind == EdgeKind::Wants && !(mode.is_start() && include_wants) {
                continue;
            }

            let dep_handle = match table.get_or_create(&dep_name) {
                Ok(h) => h,
                Err(e) => {
                    report_unresolved(observer, handle, &name, edge_kind, &dep_name, &e);
                    continue;
                }
            };

            if let Err(e) = self.ensure_loaded(table, dep_handle, mode, include_wants, observer) {
                report_unresolved(observer, handle, &name, edge_kind, &dep_name, &e);
                // Fall through and record the edge anyway: `dep_handle`
                // is left `Failed` and out of the active list, so
                // `graph::schedule`'s missing-needs-target check still
                // sees it and fails `handle` with `Dependency`.
            }

            match edge_kind {
                EdgeKind::Needs => table.lookup_mut(handle).needs.push(dep_handle),
                EdgeKind::Wants => table.lookup_mut(handle).wants.push(dep_handle),
                EdgeKind::After => table.lookup_mut(handle).after.push(dep_handle),
                EdgeKind::Before => table.lookup_mut(dep_handle).after.push(handle),
            }
        }

        let default_timeout = anopa_core::env::default_timeout_secs();
        let mut timeout = raw.timeout_secs.unwrap_or(default_timeout);
        if mode == Mode::StopAll {
            timeout = timeout.min(default_timeout);
        }
        table.lookup_mut(handle).timeout_secs = timeout;

        table.lookup_mut(handle).load_state = LoadState::Loaded;
        table.push_active(handle);
        log::debug!(target: "anopa::loader", "loaded {name:?} as {kind:?}");
        Ok(())
    }

    fn determine_up(
        &mut self,
        name: &str,
        kind: ServiceKind,
        readiness_capable: bool,
        mode: Mode,
        persisted: Option<&StatusRecord>,
    ) -> Result<UpState> {
        match kind {
            ServiceKind::Oneshot => {
                let up = persisted
                    .map(|r| {
                        matches!(
                            r.event,
                            StatusEvent::Started | StatusEvent::Starting | StatusEvent::StoppingFailed | StatusEvent::StopFailed
                        )
                    })
                    .unwrap_or(false);
                Ok(if up { UpState::Up } else { UpState::Down })
            }
            ServiceKind::Longrun => {
                let status = self.supervisor.query_status(name)?;
                let up = status.as_ref().map(|s| s.is_up()).unwrap_or(false);

                if !up {
                    // "down but want-up" cancels a pending restart on
                    // stop: treat as up so the stop request actually
                    // lands.
                    let wants_up = persisted
                        .map(|r| matches!(r.event, StatusEvent::Starting | StatusEvent::Started))
                        .unwrap_or(false);
                    if wants_up && !mode.is_start() {
                        return Ok(UpState::Up);
                    }
                    return Ok(UpState::Down);
                }

                if readiness_capable {
                    let ready = status.map(|s| s.ready).unwrap_or(false);
                    Ok(if ready { UpState::Ready } else { UpState::Up })
                } else {
                    Ok(UpState::Up)
                }
            }
            ServiceKind::Unknown => Ok(UpState::Down),
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum UpState {
    Down,
    Up,
    Ready,
}

impl UpState {
    /// For a readiness-capable longrun, "fully up" means `Ready`; for
    /// everything else `Up` already is the terminal state. A
    /// readiness-capable service is never considered up purely on
    /// process liveness.
    fn at_least_up(self) -> bool {
        !matches!(self, UpState::Down)
    }
}

fn report_unresolved(observer: &mut dyn LoadObserver, handle: Handle, name: &str, edge_kind: EdgeKind, dep_name: &str, err: &Error) {
    let kind = match edge_kind {
        EdgeKind::Needs | EdgeKind::Before => FailureKind::Needs,
        EdgeKind::Wants => FailureKind::Wants,
        EdgeKind::After => FailureKind::Needs,
    };
    observer.on_load_failure(handle, name, kind, dep_name, err);
}

fn fail(table: &mut Table, handle: Handle, err: &Error) {
    let kind = match err {
        Error::InvalidName { .. } => LoadErrorKind::InvalidName,
        Error::Unknown { .. } => LoadErrorKind::Unknown,
        Error::Io { source, .. } => LoadErrorKind::Io(source.raw_os_error().unwrap_or(-1)),
        Error::AlreadyUp { .. } => LoadErrorKind::AlreadyUp,
        Error::NotUp { .. } => LoadErrorKind::NotUp,
        _ => LoadErrorKind::Unknown,
    };
    let record = table.lookup_mut(handle);
    record.load_state = LoadState::Failed;
    record.load_error = Some(kind);
}

fn cached_error(table: &Table, handle: Handle) -> Error {
    let name = table.name_of(handle).to_string();
    match table.lookup(handle).load_error {
        Some(LoadErrorKind::InvalidName) => Error::InvalidName {
            name,
            reason: "cached from a previous load attempt",
        },
        Some(LoadErrorKind::Unknown) | None => Error::Unknown { name },
        Some(LoadErrorKind::Io(errno)) => Error::Io {
            path: Path::new(&name).to_path_buf(),
            source: std::io::Error::from_raw_os_error(errno),
        },
        Some(LoadErrorKind::AlreadyUp) => Error::AlreadyUp { name },
        Some(LoadErrorKind::NotUp) => Error::NotUp { name },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anopa_supervisor_client::test_util::FakeSupervisorClient;
    use std::fs::{create_dir_all, write};

    fn touch(path: &Path) {
        write(path, b"").unwrap();
    }

    #[test]
    fn loads_a_linear_needs_chain() {
        let dir = tempfile::tempdir().unwrap();
        for (name, dep) in [("c", Some("b")), ("b", Some("a")), ("a", None)] {
            let svc = dir.path().join(name);
            create_dir_all(&svc).unwrap();
            touch(&svc.join("start"));
            if let Some(dep) = dep {
                create_dir_all(svc.join("needs")).unwrap();
                touch(&svc.join("needs").join(dep));
            }
        }

        let mut table = Table::new();
        let mut supervisor = FakeSupervisorClient::new();
        let mut loader = Loader::new(dir.path(), &mut supervisor);
        let mut observer = NullObserver;

        let c = table.get_or_create("c").unwrap();
        loader
            .ensure_loaded(&mut table, c, Mode::Start, false, &mut observer)
            .unwrap();

        assert_eq!(table.lookup(c).load_state, LoadState::Loaded);
        let b = table.handle_by_name("b").unwrap();
        let a = table.handle_by_name("a").unwrap();
        assert_eq!(table.lookup(c).needs, vec![b]);
        assert_eq!(table.lookup(b).needs, vec![a]);
        assert_eq!(table.active().len(), 3);
    }

    #[test]
    fn ensure_loaded_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let svc = dir.path().join("a");
        create_dir_all(&svc).unwrap();
        touch(&svc.join("start"));

        let mut table = Table::new();
        let mut supervisor = FakeSupervisorClient::new();
        let mut loader = Loader::new(dir.path(), &mut supervisor);
        let mut observer = NullObserver;

        let a = table.get_or_create("a").unwrap();
        loader.ensure_loaded(&mut table, a, Mode::Start, false, &mut observer).unwrap();
        loader.ensure_loaded(&mut table, a, Mode::Start, false, &mut observer).unwrap();
        assert_eq!(table.lookup(a).load_state, LoadState::Loaded);
    }

    #[test]
    fn before_is_rewritten_onto_the_target() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a");
        create_dir_all(a.join("before")).unwrap();
        touch(&a.join("start"));
        touch(&a.join("before").join("b"));
        let b = dir.path().join("b");
        create_dir_all(&b).unwrap();
        touch(&b.join("start"));

        let mut table = Table::new();
        let mut supervisor = FakeSupervisorClient::new();
        let mut loader = Loader::new(dir.path(), &mut supervisor);
        let mut observer = NullObserver;

        let a_handle = table.get_or_create("a").unwrap();
        loader
            .ensure_loaded(&mut table, a_handle, Mode::Start, false, &mut observer)
            .unwrap();

        let b_handle = table.handle_by_name("b").unwrap();
        assert_eq!(table.lookup(b_handle).after, vec![a_handle]);
    }

    #[test]
    fn unresolved_needs_is_reported_but_does_not_abort() {
        let dir = tempfile::tempdir().unwrap();
        let svc = dir.path().join("b");
        create_dir_all(svc.join("needs")).unwrap();
        touch(&svc.join("start"));
        touch(&svc.join("needs").join("missing"));

        struct Recorder(Vec<String>);
        impl LoadObserver for Recorder {
            fn on_load_failure(&mut self, _h: Handle, _name: &str, _k: FailureKind, missing_name: &str, _e: &Error) {
                self.0.push(missing_name.to_string());
            }
        }

        let mut table = Table::new();
        let mut supervisor = FakeSupervisorClient::new();
        let mut loader = Loader::new(dir.path(), &mut supervisor);
        let mut observer = Recorder(Vec::new());

        let b = table.get_or_create("b").unwrap();
        loader
            .ensure_loaded(&mut table, b, Mode::Start, false, &mut observer)
            .unwrap();

        assert_eq!(observer.0, vec!["missing".to_string()]);
        assert_eq!(table.lookup(b).load_state, LoadState::Loaded);
    }

    #[test]
    fn already_up_oneshot_short_circuits() {
        let dir = tempfile::tempdir().unwrap();
        let svc = dir.path().join("a");
        create_dir_all(&svc).unwrap();
        touch(&svc.join("start"));
        anopa_status::write(
            &svc.join("status"),
            &StatusRecord::new(StatusEvent::Started, 0, anopa_core::tain::Tain::new(1, 0)),
        )
        .unwrap();

        let mut table = Table::new();
        let mut supervisor = FakeSupervisorClient::new();
        let mut loader = Loader::new(dir.path(), &mut supervisor);
        let mut observer = NullObserver;

        let a = table.get_or_create("a").unwrap();
        loader.ensure_loaded(&mut table, a, Mode::Start, false, &mut observer).unwrap();
        assert_eq!(table.lookup(a).load_state, LoadState::Failed);
        assert_eq!(table.lookup(a).load_error, Some(LoadErrorKind::AlreadyUp));
    }
}
