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

//! The CLI-layer observer: the single implementation of both
//! `LoadObserver` and `RunObserver` that the core never depends on
//! directly. Prints one colored, prefixed line per event, and tracks
//! per-kind counts for the end-of-run summary.

use ansi_term::Colour::{Green, Red, Yellow};

use anopa_core::Error;
use anopa_graph::RunObserver;
use anopa_loader::{FailureKind, LoadObserver};
use anopa_table::Handle;

use crate::draw::Drawer;

#[derive(Default)]
pub struct Summary {
    pub succeeded: Vec<String>,
    pub failed: Vec<String>,
    pub timed_out: Vec<String>,
}

#[derive(Default)]
pub struct TerminalObserver {
    drawer: Drawer,
    pub summary: Summary,
}

impl TerminalObserver {
    pub fn new() -> Self {
        TerminalObserver::default()
    }

    pub fn drawer_mut(&mut self) -> &mut Drawer {
        &mut self.drawer
    }

    fn line(&mut self, colour: ansi_term::Colour, text: String) {
        self.drawer.around_log(|| println!("{}", colour.paint(text)));
    }
}

impl LoadObserver for TerminalObserver {
    fn on_load_failure(&mut self, _handle: Handle, name: &str, kind: FailureKind, missing_name: &str, err: &Error) {
        let verb = match kind {
            FailureKind::Needs => "needs",
            FailureKind::Wants => "wants",
        };
        self.line(
            Yellow,
            format!("{name}: unresolved {verb} dependency {missing_name:?}: {err}"),
        );
    }
}

impl RunObserver for TerminalObserver {
    fn on_cycle_break(&mut self, _cur: Handle, cur_name: &str, _next: Handle, next_name: &str, is_needs_cycle: bool, _anchor_pos: usize) {
        if is_needs_cycle {
            self.line(
                Red,
                format!("dependency cycle entirely through `needs`: broke {cur_name} -> {next_name}"),
            );
        } else {
            self.line(
                Yellow,
                format!("ordering-only cycle: broke {cur_name} after {next_name}"),
            );
        }
    }

    fn on_dependency_failure(&mut self, _handle: Handle, name: &str, _missing: Handle, missing_name: &str) {
        // Not pushed onto `summary` here: the caller's post-run scan
        // over the requested names already classifies every handle by
        // its persisted status, and this callback fires for every
        // affected handle, not just the ones the caller asked for.
        self.line(Red, format!("{name}: dependency {missing_name} failed or was not found"));
    }

    fn on_scan(&mut self) {}

    fn on_ready_to_exec(&mut self, _handle: Handle, name: &str, _mode: anopa_core::Mode) {
        self.line(Green, format!("{name}: starting"));
    }
}
