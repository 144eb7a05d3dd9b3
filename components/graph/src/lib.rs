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

//! Cycle check, cycle break, and the scheduling pass over the active
//! list. Also `service_is_ok`, a small helper the scheduling pass and
//! the scheduler both need.

use anopa_core::{Mode, Result};
use anopa_status::Event as StatusEvent;
use anopa_supervisor_client::SupervisorClient;
use anopa_table::{Handle, LoadState, RunState, ServiceKind, Table};

/// Callbacks fired while walking the active list, so a caller can
/// drive logging, a progress indicator, and execution without the
/// graph engine needing to know about any of them directly.
pub trait RunObserver {
    /// Fired once per broken cycle edge. Names are resolved by the
    /// caller so the observer never needs its own table access.
    fn on_cycle_break(&mut self, cur: Handle, cur_name: &str, next: Handle, next_name: &str, is_needs_cycle: bool, anchor_pos: usize);

    /// Fired when a missing `needs` target could not be verified by
    /// `service_is_ok` and `handle` is therefore marked `Dependency`.
    fn on_dependency_failure(&mut self, handle: Handle, name: &str, missing: Handle, missing_name: &str);

    /// Fired once per full scan of the active list, so a progress
    /// indicator can advance.
    fn on_scan(&mut self);

    /// `handle`'s `needs` and `after` predecessors are all satisfied:
    /// the scheduler should call `exec_service`.
    fn on_ready_to_exec(&mut self, handle: Handle, name: &str, mode: Mode);
}

/// Depth-first cycle check over `after` edges. Returns once every
/// active-list record is `Verified`; breaks cycles as it finds them,
/// reporting each break to `observer`.
pub fn check_cycles(table: &mut Table, observer: &mut dyn RunObserver) {
    let active = table.active().to_vec();
    for handle in active {
        visit(table, handle, observer);
        table.assert_scratch_empty();
    }
}

fn visit(table: &mut Table, handle: Handle, observer: &mut dyn RunObserver) {
    if table.lookup(handle).load_state == LoadState::Verified {
        return;
    }

    if !table.scratch_push(handle) {
        break_cycle(table, handle, observer);
        return;
    }

    // Prune `after` edges to handles that aren't loaded/verified or
    // aren't in the active set, then recurse into the survivors.
    let after: Vec<Handle> = table
        .lookup(handle)
        .after
        .iter()
        .copied()
        .filter(|&h| {
            table.is_active(h)
                && matches!(table.lookup(h).load_state, LoadState::Loaded | LoadState::Verified)
        })
        .collect();
    table.lookup_mut(handle).after = after.clone();

    for next in after {
        visit(table, next, observer);
    }

    table.scratch_pop();
    table.lookup_mut(handle).load_state = LoadState::Verified;
}

/// A cycle was detected with `handle` re-appearing on the scratch
/// list. Walk forward from the anchor and break the first
/// ordering-only edge, or, if the cycle is entirely through `needs`,
/// the last edge of the cycle. Always logs the full cycle.
fn break_cycle(table: &mut Table, anchor: Handle, observer: &mut dyn RunObserver) {
    let scratch = table.scratch().to_vec();
    let anchor_pos = scratch.iter().position(|&h| h == anchor).unwrap_or(0);
    let cycle = &scratch[anchor_pos..];

    log::warn!(
        target: "anopa::graph",
        "dependency cycle detected: {:?}",
        cycle.iter().map(|h| h.0).collect::<Vec<_>>()
    );

    for window in cycle.windows(2) {
        let (cur, next) = (window[0], window[1]);
        if !table.lookup(cur).needs.contains(&next) {
            table.lookup_mut(cur).after.retain(|&h| h != next);
            let (cur_name, next_name) = (table.name_of(cur).to_string(), table.name_of(next).to_string());
            observer.on_cycle_break(cur, &cur_name, next, &next_name, false, anchor_pos);
            return;
        }
    }

    // Entirely through `needs`: break the final edge of the cycle.
    if let [.., cur, next] = cycle {
        let (cur, next) = (*cur, *next);
        table.lookup_mut(cur).needs.retain(|&h| h != next);
        table.lookup_mut(cur).after.retain(|&h| h != next);
        let (cur_name, next_name) = (table.name_of(cur).to_string(), table.name_of(next).to_string());
        observer.on_cycle_break(cur, &cur_name, next, &next_name, true, anchor_pos);
    }
}

/// Whether `handle` is currently in its desired final state for `mode`.
pub fn service_is_ok(
    table: &Table,
    supervisor: &mut dyn SupervisorClient,
    handle: Handle,
    mode: Mode,
) -> Result<bool> {
    if mode.always_ok() {
        return Ok(true);
    }

    let record = table.lookup(handle);
    let name = table.name_of(handle);

    match record.kind {
        ServiceKind::Oneshot | ServiceKind::Unknown => {
            let expected = if mode.is_start() {
                StatusEvent::Started
            } else {
                StatusEvent::Stopped
            };
            Ok(record.status.as_ref().map(|s| s.event == expected).unwrap_or(false))
        }
        ServiceKind::Longrun => {
            if record.timed_out {
                return Ok(false);
            }
            let status = supervisor.query_status(name)?;
            let persisted_in_flight = record
                .status
                .as_ref()
                .map(|s| matches!(s.event, StatusEvent::Starting | StatusEvent::Stopping))
                .unwrap_or(false);
            let supervisor_observed = match (status, record.ts_exec) {
                (Some(s), Some(ts_exec)) => s.stamp > ts_exec,
                _ => false,
            };
            Ok(supervisor_observed || persisted_in_flight)
        }
    }
}

/// Repeatedly scan the active list, pruning edges and invoking
/// `on_ready_to_exec` for every service whose `needs` and `after`
/// predecessors are all satisfied. Returns once a full pass produces
/// no change.
pub fn schedule(
    table: &mut Table,
    supervisor: &mut dyn SupervisorClient,
    mode: Mode,
    observer: &mut dyn RunObserver,
) -> Result<()> {
    // A handle with empty `needs`/`after` stays ready on every scan
    // until the caller actually execs it (on the next tick, once this
    // call returns) and flips its run state: without this set the
    // fixpoint below would never converge.
    let mut reported_ready = std::collections::HashSet::new();

    loop {
        let mut changed = false;
        let active = table.active().to_vec();

        'scan: for handle in active {
            if !table.is_active(handle) {
                continue;
            }

            let needs: Vec<Handle> = table.lookup(handle).needs.clone();
            for needed in needs {
                if table.is_active(needed) {
                    continue;
                }
                if service_is_ok(table, supervisor, needed, mode)? {
                    table.lookup_mut(handle).needs.retain(|&h| h != needed);
                    changed = true;
                } else {
                    fail_dependency(table, handle);
                    let name = table.name_of(handle).to_string();
                    let needed_name = table.name_of(needed).to_string();
                    observer.on_dependency_failure(handle, &name, needed, &needed_name);
                    table.remove_active(handle);
                    changed = true;
                    break 'scan;
                }
            }

            let after: Vec<Handle> = table
                .lookup(handle)
                .after
                .iter()
                .copied()
                .filter(|&h| table.is_active(h))
                .collect();
            if after.len() != table.lookup(handle).after.len() {
                table.lookup_mut(handle).after = after.clone();
                changed = true;
            }

            if after.is_empty()
                && table.lookup(handle).needs.is_empty()
                && !table.lookup(handle).is_in_flight()
                && reported_ready.insert(handle)
            {
                let name = table.name_of(handle).to_string();
                observer.on_ready_to_exec(handle, &name, mode);
                changed = true;
            }
        }

        observer.on_scan();
        if !changed {
            return Ok(());
        }
    }
}

/// Marks `handle` as no longer schedulable. The caller (the runtime
/// scheduler) is responsible for persisting the `Dependency` status
/// record, since only it holds the repository path.
fn fail_dependency(table: &mut Table, handle: Handle) {
    table.lookup_mut(handle).run_state = RunState::Done;
}

#[cfg(test)]
mod tests {
    use super::*;
    use anopa_supervisor_client::test_util::FakeSupervisorClient;

    #[derive(Default)]
    struct Recorder {
        breaks: Vec<(Handle, Handle, bool)>,
        ready: Vec<Handle>,
        dependency_failures: Vec<(Handle, Handle)>,
    }

    impl RunObserver for Recorder {
        fn on_cycle_break(&mut self, cur: Handle, _cur_name: &str, next: Handle, _next_name: &str, is_needs_cycle: bool, _anchor_pos: usize) {
            self.breaks.push((cur, next, is_needs_cycle));
        }
        fn on_dependency_failure(&mut self, handle: Handle, _name: &str, missing: Handle, _missing_name: &str) {
            self.dependency_failures.push((handle, missing));
        }
        fn on_scan(&mut self) {}
        fn on_ready_to_exec(&mut self, handle: Handle, _name: &str, _mode: Mode) {
            self.ready.push(handle);
        }
    }

    fn activate(table: &mut Table, handle: Handle) {
        table.lookup_mut(handle).load_state = LoadState::Loaded;
        table.push_active(handle);
    }

    #[test]
    fn breaks_an_ordering_only_cycle_without_touching_needs() {
        let mut table = Table::new();
        let a = table.get_or_create("a").unwrap();
        let b = table.get_or_create("b").unwrap();
        table.lookup_mut(a).after.push(b);
        table.lookup_mut(b).after.push(a);
        activate(&mut table, a);
        activate(&mut table, b);

        let mut observer = Recorder::default();
        check_cycles(&mut table, &mut observer);

        assert_eq!(observer.breaks.len(), 1);
        assert!(!observer.breaks[0].2, "ordering-only cycle, not a needs cycle");
        assert!(table.lookup(a).load_state == LoadState::Verified || table.lookup(b).load_state == LoadState::Verified);
    }

    #[test]
    fn scheduling_pass_readies_an_independent_service() {
        let mut table = Table::new();
        let a = table.get_or_create("a").unwrap();
        activate(&mut table, a);

        let mut supervisor = FakeSupervisorClient::new();
        let mut observer = Recorder::default();
        schedule(&mut table, &mut supervisor, Mode::Start, &mut observer).unwrap();

        assert_eq!(observer.ready, vec![a]);
    }

    #[test]
    fn missing_needs_target_becomes_a_dependency_failure() {
        let mut table = Table::new();
        let a = table.get_or_create("a").unwrap();
        let b = table.get_or_create("b").unwrap();
        table.lookup_mut(b).needs.push(a);
        // `a` is not in the active list and has no status: service_is_ok
        // is false, so `b` should fail with Dependency.
        activate(&mut table, b);

        let mut supervisor = FakeSupervisorClient::new();
        let mut observer = Recorder::default();
        schedule(&mut table, &mut supervisor, Mode::Start, &mut observer).unwrap();

        assert_eq!(observer.dependency_failures, vec![(b, a)]);
        assert!(!table.is_active(b));
    }
}
