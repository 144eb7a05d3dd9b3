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

//! The Service Table: the single owner of all heap state for a run. A
//! name arena plus a dense vector of records indexed by handle, an
//! active list (topological insertion order) and a scratch list
//! (transient, used by the graph engine's DFS).

pub mod record;

use std::collections::HashMap;

use anopa_core::{name, Error, Result};

pub use record::{Handle, LoadErrorKind, LoadState, RunState, ServiceKind, ServiceRecord};

#[derive(Default)]
pub struct Table {
    names: Vec<String>,
    by_name: HashMap<String, Handle>,
    records: Vec<ServiceRecord>,
    active: Vec<Handle>,
    scratch: Vec<Handle>,
}

impl Table {
    pub fn new() -> Self {
        Table::default()
    }

    /// Idempotent interning: returns the existing handle for `name`
    /// if already known, otherwise creates a new `NotLoaded` record.
    pub fn get_or_create(&mut self, name: &str) -> Result<Handle> {
        name::validate(name).map_err(|_| Error::InvalidName {
            name: name.to_string(),
            reason: "name fails the repository's character-set rule",
        })?;

        if let Some(&handle) = self.by_name.get(name) {
            return Ok(handle);
        }

        let handle = Handle(self.records.len());
        self.names.push(name.to_string());
        self.records.push(ServiceRecord::new(handle.0));
        self.by_name.insert(name.to_string(), handle);
        Ok(handle)
    }

    pub fn lookup(&self, handle: Handle) -> &ServiceRecord {
        &self.records[handle.0]
    }

    pub fn lookup_mut(&mut self, handle: Handle) -> &mut ServiceRecord {
        &mut self.records[handle.0]
    }

    pub fn name_of(&self, handle: Handle) -> &str {
        &self.names[handle.0]
    }

    pub fn handle_by_name(&self, name: &str) -> Option<Handle> {
        self.by_name.get(name).copied()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn active(&self) -> &[Handle] {
        &self.active
    }

    /// Marks `handle` active, bumping its reference count. A handle
    /// pushed more than once (e.g. reachable through more than one
    /// `needs`/`wants` edge) stays in `active` until it has been
    /// popped the same number of times.
    pub fn push_active(&mut self, handle: Handle) {
        let record = &mut self.records[handle.0];
        record.mark_count += 1;
        if !self.active.contains(&handle) {
            self.active.push(handle);
        }
    }

    /// Drops one reference; only actually leaves the active set once
    /// its mark count reaches zero.
    pub fn remove_active(&mut self, handle: Handle) {
        let record = &mut self.records[handle.0];
        record.mark_count = record.mark_count.saturating_sub(1);
        if record.mark_count == 0 {
            self.active.retain(|&h| h != handle);
        }
    }

    pub fn is_active(&self, handle: Handle) -> bool {
        self.active.contains(&handle)
    }

    /// The scratch list, for the graph engine's DFS. Must be empty at
    /// every public boundary.
    pub fn scratch(&self) -> &[Handle] {
        &self.scratch
    }

    /// Push onto the scratch list, returning `false` (without
    /// mutating) if `handle` is already present. This is exactly how
    /// the cycle check detects a cycle.
    pub fn scratch_push(&mut self, handle: Handle) -> bool {
        if self.scratch.contains(&handle) {
            return false;
        }
        self.scratch.push(handle);
        true
    }

    pub fn scratch_pop(&mut self) {
        self.scratch.pop();
    }

    pub fn assert_scratch_empty(&self) {
        debug_assert!(self.scratch.is_empty(), "scratch list must be empty at public boundaries");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_or_create_is_idempotent() {
        let mut table = Table::new();
        let a = table.get_or_create("svc").unwrap();
        let b = table.get_or_create("svc").unwrap();
        assert_eq!(a, b);
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn rejects_invalid_names() {
        let mut table = Table::new();
        assert!(table.get_or_create("bad name").is_err());
    }

    #[test]
    fn accepts_log_suffix() {
        let mut table = Table::new();
        assert!(table.get_or_create("nginx/log").is_ok());
    }

    #[test]
    fn scratch_push_detects_repeats() {
        let mut table = Table::new();
        let h = table.get_or_create("svc").unwrap();
        assert!(table.scratch_push(h));
        assert!(!table.scratch_push(h));
    }

    #[test]
    fn active_set_membership_tracks_mark_count() {
        let mut table = Table::new();
        let h = table.get_or_create("svc").unwrap();

        table.push_active(h);
        table.push_active(h);
        assert_eq!(table.lookup(h).mark_count, 2);
        assert!(table.is_active(h));

        table.remove_active(h);
        assert!(table.is_active(h), "still marked once, stays active");
        assert_eq!(table.lookup(h).mark_count, 1);

        table.remove_active(h);
        assert!(!table.is_active(h));
        assert_eq!(table.lookup(h).mark_count, 0);
    }
}
