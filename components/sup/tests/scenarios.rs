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

//! End-to-end scenarios: real spawned shell scripts under a temporary
//! repository, driven through the public `start`/`stop`/`status` API
//! against a `FakeSupervisorClient`.

use std::fs::{self, create_dir_all};
use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use std::time::{Duration, Instant};

use anopa_core::Error;
use anopa_status::Event as StatusEvent;
use anopa_supervisor_client::test_util::FakeSupervisorClient;
use anopa_supervisor_client::Command;
use anopa_sup::Opts;

fn write_script(path: &Path, body: &str) {
    fs::write(path, format!("#!/bin/sh\n{body}\n")).unwrap();
    let mut perms = fs::metadata(path).unwrap().permissions();
    perms.set_mode(0o755);
    fs::set_permissions(path, perms).unwrap();
}

fn oneshot(root: &Path, name: &str, start_body: &str) {
    let dir = root.join(name);
    create_dir_all(&dir).unwrap();
    write_script(&dir.join("start"), start_body);
}

fn needs(root: &Path, name: &str, dep: &str) {
    let dir = root.join(name).join("needs");
    create_dir_all(&dir).unwrap();
    fs::write(dir.join(dep), b"").unwrap();
}

fn after(root: &Path, name: &str, dep: &str) {
    let dir = root.join(name).join("after");
    create_dir_all(&dir).unwrap();
    fs::write(dir.join(dep), b"").unwrap();
}

fn read_status(root: &Path, name: &str) -> Option<anopa_status::StatusRecord> {
    anopa_status::read(&root.join(name).join("status")).unwrap()
}

fn names(values: &[&str]) -> Vec<String> {
    values.iter().map(|s| s.to_string()).collect()
}

#[test]
fn linear_chain_starts_in_dependency_order() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();
    oneshot(root, "a", "exit 0");
    oneshot(root, "b", "exit 0");
    oneshot(root, "c", "exit 0");
    needs(root, "b", "a");
    needs(root, "c", "b");

    let mut supervisor = FakeSupervisorClient::new();
    let summary = anopa_sup::start(root, &mut supervisor, &names(&["c"]), Opts::default()).unwrap();
    assert!(summary.failed.is_empty());

    let a = read_status(root, "a").unwrap();
    let b = read_status(root, "b").unwrap();
    let c = read_status(root, "c").unwrap();
    assert_eq!(a.event, StatusEvent::Started);
    assert_eq!(b.event, StatusEvent::Started);
    assert_eq!(c.event, StatusEvent::Started);
    assert!(a.stamp <= b.stamp);
    assert!(b.stamp <= c.stamp);
}

#[test]
fn independent_branches_run_within_the_same_tick() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();
    oneshot(root, "a", "sleep 0.2; exit 0");
    oneshot(root, "b", "sleep 0.2; exit 0");
    oneshot(root, "d", "exit 0");
    needs(root, "d", "a");
    needs(root, "d", "b");

    let mut supervisor = FakeSupervisorClient::new();
    let started = Instant::now();
    let summary = anopa_sup::start(root, &mut supervisor, &names(&["d"]), Opts::default()).unwrap();
    let elapsed = started.elapsed();

    assert!(summary.failed.is_empty());
    assert!(elapsed < Duration::from_millis(350), "branches should overlap, took {elapsed:?}");
    assert_eq!(read_status(root, "a").unwrap().event, StatusEvent::Started);
    assert_eq!(read_status(root, "b").unwrap().event, StatusEvent::Started);
    assert_eq!(read_status(root, "d").unwrap().event, StatusEvent::Started);
}

#[test]
fn a_failing_dependency_fails_its_dependent() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();
    oneshot(root, "a", "exit 1");
    oneshot(root, "b", "exit 0");
    needs(root, "b", "a");

    let mut supervisor = FakeSupervisorClient::new();
    let summary = anopa_sup::start(root, &mut supervisor, &names(&["b"]), Opts::default()).unwrap();
    assert!(summary.failed.contains(&"b".to_string()));

    let a_status = read_status(root, "a").unwrap();
    assert_eq!(a_status.event, StatusEvent::StartFailed);

    let b_status = read_status(root, "b").unwrap();
    assert_eq!(b_status.event, StatusEvent::StartingFailed);
    assert_eq!(b_status.code, Error::Dependency { name: String::new() }.code());
    assert_eq!(b_status.message.as_deref(), Some("a"));
}

#[test]
fn an_ordering_only_cycle_still_runs_both_services() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();
    oneshot(root, "a", "exit 0");
    oneshot(root, "b", "exit 0");
    after(root, "a", "b");
    after(root, "b", "a");

    let mut supervisor = FakeSupervisorClient::new();
    let summary = anopa_sup::start(root, &mut supervisor, &names(&["a", "b"]), Opts::default()).unwrap();

    assert!(summary.failed.is_empty());
    assert_eq!(read_status(root, "a").unwrap().event, StatusEvent::Started);
    assert_eq!(read_status(root, "b").unwrap().event, StatusEvent::Started);
}

#[test]
fn a_longrun_that_never_signals_ready_times_out() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();
    let svc = root.join("r");
    create_dir_all(&svc).unwrap();
    write_script(&svc.join("run"), "exit 0");
    fs::write(svc.join("gets-ready"), b"").unwrap();
    fs::write(svc.join("timeout"), b"1").unwrap();

    let mut supervisor = FakeSupervisorClient::new();
    let started = Instant::now();
    let summary = anopa_sup::start(root, &mut supervisor, &names(&["r"]), Opts::default()).unwrap();
    assert!(started.elapsed() >= Duration::from_secs(1));

    assert!(summary.timed_out.contains(&"r".to_string()));
    let r_status = read_status(root, "r").unwrap();
    assert_eq!(r_status.event, StatusEvent::StartingFailed);
    assert_eq!(
        r_status.code,
        Error::Timedout {
            name: "r".to_string(),
            secs: 1
        }
        .code()
    );
    assert!(supervisor
        .commands
        .iter()
        .any(|(name, cmd)| name == "r" && matches!(cmd, Command::Abort)));
}

#[test]
fn a_second_immediate_start_short_circuits_on_already_up() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();
    oneshot(root, "a", "exit 0");

    let mut supervisor = FakeSupervisorClient::new();
    let first = anopa_sup::start(root, &mut supervisor, &names(&["a"]), Opts::default()).unwrap();
    assert!(first.succeeded.contains(&"a".to_string()));

    let second = anopa_sup::start(root, &mut supervisor, &names(&["a"]), Opts::default()).unwrap();
    assert!(second.succeeded.is_empty());
    assert!(second.failed.is_empty());
    assert!(second.timed_out.is_empty());
}
