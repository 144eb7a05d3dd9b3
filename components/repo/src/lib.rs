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

//! The Service Repository: a single directory per service under one
//! root, read-only from the core's perspective except for the status
//! file it owns (see `anopa-status`).

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use anopa_core::{Error, Result};

const RUN_FILE: &str = "run";
const START_FILE: &str = "start";
const STOP_FILE: &str = "stop";
const NOTIFICATION_FD_FILE: &str = "notification-fd";
const GETS_READY_FILE: &str = "gets-ready";
const TIMEOUT_FILE: &str = "timeout";
const DOWN_FILE: &str = "down";
const LOG_DIR: &str = "log";

const EDGE_DIRS: [(&str, EdgeKind); 4] = [
    ("needs", EdgeKind::Needs),
    ("wants", EdgeKind::Wants),
    ("after", EdgeKind::After),
    ("before", EdgeKind::Before),
];

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum EdgeKind {
    Needs,
    Wants,
    After,
    /// Rewritten into `X after self` by the loader.
    Before,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum DirKind {
    Longrun,
    Oneshot,
    /// Neither `run` nor `start` is present.
    Missing,
}

/// What the repository reports about a single service directory,
/// before the loader turns it into a `ServiceRecord`.
#[derive(Debug)]
pub struct RawServiceDir {
    pub path: PathBuf,
    pub dir_kind: DirKind,
    pub has_stop: bool,
    pub readiness_capable: bool,
    pub starts_down: bool,
    pub has_logger: bool,
    pub timeout_secs: Option<u64>,
    pub edges: Vec<(EdgeKind, String)>,
}

fn exists(dir: &Path, file: &str) -> bool {
    dir.join(file).exists()
}

fn io_err(path: &Path, source: io::Error) -> Error {
    Error::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// The on-disk directory a service name resolves to, without
/// checking that it actually exists: `<root>/<base>`, or
/// `<root>/<base>/log` for a `<base>/log` lookup.
pub fn service_dir(root: &Path, name: &str) -> PathBuf {
    let base = name.strip_suffix("/log").unwrap_or(name);
    let path = root.join(base);
    if base == name {
        path
    } else {
        path.join(LOG_DIR)
    }
}

/// Read the directory for `name` under `root`. Returns
/// `Error::Unknown` if the directory itself is absent.
pub fn read(root: &Path, name: &str) -> Result<RawServiceDir> {
    let base = name.strip_suffix("/log").unwrap_or(name);
    let path = root.join(base);

    if !path.is_dir() {
        return Err(Error::Unknown {
            name: name.to_string(),
        });
    }

    let service_path = service_dir(root, name);
    if !service_path.is_dir() {
        return Err(Error::Unknown {
            name: name.to_string(),
        });
    }

    let dir_kind = if exists(&service_path, RUN_FILE) {
        DirKind::Longrun
    } else if exists(&service_path, START_FILE) {
        DirKind::Oneshot
    } else {
        DirKind::Missing
    };

    let readiness_capable = exists(&service_path, GETS_READY_FILE) || read_notification_fd(&service_path)?.is_some();

    let timeout_secs = read_decimal_file(&service_path, TIMEOUT_FILE)?;

    let mut edges = Vec::new();
    for (dirname, kind) in EDGE_DIRS {
        let edge_dir = service_path.join(dirname);
        if !edge_dir.is_dir() {
            continue;
        }
        for entry in fs::read_dir(&edge_dir).map_err(|e| io_err(&edge_dir, e))? {
            let entry = entry.map_err(|e| io_err(&edge_dir, e))?;
            if let Some(dep_name) = entry.file_name().to_str() {
                edges.push((kind, dep_name.to_string()));
            }
        }
    }

    let has_logger = base == name && service_path.join(LOG_DIR).join(RUN_FILE).exists();

    Ok(RawServiceDir {
        has_stop: exists(&service_path, STOP_FILE),
        starts_down: exists(&service_path, DOWN_FILE),
        path: service_path,
        dir_kind,
        readiness_capable,
        has_logger,
        timeout_secs,
        edges,
    })
}

/// Parses `notification-fd` as a decimal integer.
fn read_notification_fd(dir: &Path) -> Result<Option<i32>> {
    let file = dir.join(NOTIFICATION_FD_FILE);
    match fs::read_to_string(&file) {
        Ok(contents) => Ok(contents.trim().parse::<i32>().ok()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(io_err(&file, e)),
    }
}

fn read_decimal_file(dir: &Path, file_name: &str) -> Result<Option<u64>> {
    let file = dir.join(file_name);
    match fs::read_to_string(&file) {
        Ok(contents) => Ok(contents.trim().parse::<u64>().ok()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(io_err(&file, e)),
    }
}

pub fn status_path(dir: &Path) -> PathBuf {
    dir.join("status")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::{create_dir_all, write};

    fn touch(path: &Path) {
        write(path, b"").unwrap();
    }

    #[test]
    fn classifies_longrun_with_gets_ready() {
        let dir = tempfile::tempdir().unwrap();
        let svc = dir.path().join("nginx");
        create_dir_all(&svc).unwrap();
        touch(&svc.join(RUN_FILE));
        touch(&svc.join(GETS_READY_FILE));

        let raw = read(dir.path(), "nginx").unwrap();
        assert_eq!(raw.dir_kind, DirKind::Longrun);
        assert!(raw.readiness_capable);
    }

    #[test]
    fn classifies_oneshot() {
        let dir = tempfile::tempdir().unwrap();
        let svc = dir.path().join("migrate");
        create_dir_all(&svc).unwrap();
        touch(&svc.join(START_FILE));
        touch(&svc.join(STOP_FILE));

        let raw = read(dir.path(), "migrate").unwrap();
        assert_eq!(raw.dir_kind, DirKind::Oneshot);
        assert!(raw.has_stop);
    }

    #[test]
    fn reads_edges_and_timeout() {
        let dir = tempfile::tempdir().unwrap();
        let svc = dir.path().join("web");
        create_dir_all(svc.join("needs")).unwrap();
        touch(&svc.join(START_FILE));
        touch(&svc.join("needs").join("db"));
        write(svc.join(TIMEOUT_FILE), b"42").unwrap();

        let raw = read(dir.path(), "web").unwrap();
        assert_eq!(raw.timeout_secs, Some(42));
        assert_eq!(raw.edges, vec![(EdgeKind::Needs, "db".to_string())]);
    }

    #[test]
    fn missing_directory_is_unknown() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(read(dir.path(), "ghost"), Err(Error::Unknown { .. })));
    }

    #[test]
    fn down_marker_is_detected() {
        let dir = tempfile::tempdir().unwrap();
        let svc = dir.path().join("web");
        create_dir_all(&svc).unwrap();
        touch(&svc.join(RUN_FILE));
        touch(&svc.join(DOWN_FILE));

        let raw = read(dir.path(), "web").unwrap();
        assert!(raw.starts_down);
    }
}
