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

//! The runtime scheduler crate: the `Core` entry points a thin CLI
//! wraps (`enable`, `start`, `stop`, `status`), built on the loader,
//! graph engine, and the event loop in `scheduler`.

pub mod config;
pub mod draw;
pub mod longrun;
pub mod observer;
pub mod oneshot;
pub mod scheduler;

use std::path::Path;

use anopa_core::{Mode, Result};
use anopa_loader::Loader;
use anopa_supervisor_client::SupervisorClient;
use anopa_table::Table;

pub use observer::{Summary, TerminalObserver};
pub use scheduler::Scheduler;

/// Flags of record from the external-interfaces surface: which ones
/// apply depends on the entry point (`skip_down` and the
/// auto-enable flags matter only for `enable`; the rest shape the
/// transaction `start`/`stop` run).
#[derive(Clone, Copy, Debug, Default)]
pub struct Opts {
    pub skip_down: bool,
    pub auto_enable_needs: bool,
    pub auto_enable_wants: bool,
    pub dry_full: bool,
    pub stop_all: bool,
    pub include_wants: bool,
}

/// Accepted as a boundary no-op: enabling a service (wiring it into
/// the repository so it's picked up by a future `start`) is an
/// external tool's job, not the scheduler's.
pub fn enable(_names: &[String], _opts: Opts) -> Result<()> {
    Ok(())
}

/// Load, check, and run `names` to completion in `Mode::Start`
/// (or `Mode::DryFull` if `opts.dry_full`).
pub fn start(repo_root: &Path, supervisor: &mut dyn SupervisorClient, names: &[String], opts: Opts) -> Result<Summary> {
    let mode = if opts.dry_full { Mode::DryFull } else { Mode::Start };
    run(repo_root, supervisor, names, opts.include_wants, mode)
}

/// Load, check, and run `names` to completion in `Mode::Stop` (or
/// `Mode::StopAll` if `opts.stop_all`, or `Mode::DryFull`).
pub fn stop(repo_root: &Path, supervisor: &mut dyn SupervisorClient, names: &[String], opts: Opts) -> Result<Summary> {
    let mode = if opts.dry_full {
        Mode::DryFull
    } else if opts.stop_all {
        Mode::StopAll
    } else {
        Mode::Stop
    };
    run(repo_root, supervisor, names, opts.include_wants, mode)
}

/// Report the persisted status of `names` without starting or
/// stopping anything: a `Mode::DryFull` load, which short-circuits
/// neither on `AlreadyUp` nor `NotUp`.
pub fn status(repo_root: &Path, supervisor: &mut dyn SupervisorClient, names: &[String]) -> Result<Vec<(String, Option<anopa_status::StatusRecord>)>> {
    let mut table = Table::new();
    let mut observer = TerminalObserver::new();
    let mut loader = Loader::new(repo_root.to_path_buf(), supervisor);

    let mut handles = Vec::new();
    for name in names {
        let handle = table.get_or_create(name)?;
        loader.ensure_loaded(&mut table, handle, Mode::DryFull, false, &mut observer)?;
        handles.push(handle);
    }

    Ok(handles
        .into_iter()
        .map(|h| (table.name_of(h).to_string(), table.lookup(h).status.clone()))
        .collect())
}

fn run(repo_root: &Path, supervisor: &mut dyn SupervisorClient, names: &[String], include_wants: bool, mode: Mode) -> Result<Summary> {
    let mut table = Table::new();
    let mut observer = TerminalObserver::new();

    {
        let mut loader = Loader::new(repo_root.to_path_buf(), &mut *supervisor);
        for name in names {
            let handle = table.get_or_create(name)?;
            // `AlreadyUp`/`NotUp` short-circuits are recorded on the
            // record and never bubble up as an error here.
            loader.ensure_loaded(&mut table, handle, mode, include_wants, &mut observer)?;
        }
    }

    anopa_graph::check_cycles(&mut table, &mut observer);

    let mut scheduler = Scheduler::new(repo_root.to_path_buf(), supervisor, mode)?;
    scheduler.run(&mut table, &mut observer)?;

    for &handle in table_handles(names, &table).iter() {
        let name = table.name_of(handle).to_string();
        match &table.lookup(handle).status {
            Some(s) if s.event.is_failure() => observer.summary.failed.push(name),
            Some(s) if s.event.is_started() || s.event.is_stopped() => observer.summary.succeeded.push(name),
            _ => {}
        }
        if table.lookup(handle).timed_out {
            observer.summary.timed_out.push(table.name_of(handle).to_string());
        }
    }

    Ok(observer.summary)
}

fn table_handles(names: &[String], table: &Table) -> Vec<anopa_table::Handle> {
    names.iter().filter_map(|n| table.handle_by_name(n)).collect()
}
