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

//! Spawns a oneshot's `start`/`stop` script with three pipes: stdin
//! (closed here; a password channel is a CLI-layer concern out of
//! scope for the core), stdout (captured and mirrored), and a
//! progress fd exposed to the child via `AA_PROGRESS_FD`.

use std::fs::File;
use std::io::{ErrorKind, Read};
use std::os::unix::io::{AsRawFd, FromRawFd, RawFd};
use std::os::unix::process::CommandExt;
use std::path::Path;
use std::process::{Child, Command, ExitStatus, Stdio};

use anopa_core::{Error, Result};
use anopa_table::Handle;

const PROGRESS_FD_ENV: &str = "AA_PROGRESS_FD";
const CHILD_PROGRESS_FD: RawFd = 3;

pub struct OneshotProc {
    pub handle: Handle,
    pub child: Child,
    pub stdout: File,
    pub progress: File,
}

fn io_err(path: &Path, source: std::io::Error) -> Error {
    Error::Io {
        path: path.to_path_buf(),
        source,
    }
}

fn set_nonblocking(fd: RawFd) {
    unsafe {
        let flags = libc::fcntl(fd, libc::F_GETFL, 0);
        libc::fcntl(fd, libc::F_SETFL, flags | libc::O_NONBLOCK);
    }
}

fn pipe(path: &Path) -> Result<(File, File)> {
    let mut fds = [0 as RawFd; 2];
    if unsafe { libc::pipe(fds.as_mut_ptr()) } != 0 {
        return Err(io_err(path, std::io::Error::last_os_error()));
    }
    set_nonblocking(fds[0]);
    Ok((unsafe { File::from_raw_fd(fds[0]) }, unsafe { File::from_raw_fd(fds[1]) }))
}

/// `base_dir` is the service's own directory (already stripped of any
/// `/log` suffix by the caller); `script` is `"start"` or `"stop"`.
pub fn spawn(base_dir: &Path, handle: Handle, script: &str) -> Result<OneshotProc> {
    let script_path = base_dir.join(script);
    let (progress_read, progress_write) = pipe(&script_path)?;

    let mut command = Command::new(&script_path);
    command
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .env(PROGRESS_FD_ENV, CHILD_PROGRESS_FD.to_string());

    let progress_write_fd = progress_write.as_raw_fd();
    unsafe {
        command.pre_exec(move || {
            if libc::dup2(progress_write_fd, CHILD_PROGRESS_FD) < 0 {
                return Err(std::io::Error::last_os_error());
            }
            Ok(())
        });
    }

    let mut child = command.spawn().map_err(|source| io_err(&script_path, source))?;
    drop(progress_write);

    let stdout = child.stdout.take().expect("stdout is piped");
    set_nonblocking(stdout.as_raw_fd());

    Ok(OneshotProc {
        handle,
        child,
        stdout,
        progress: progress_read,
    })
}

impl OneshotProc {
    pub fn stdout_fd(&self) -> RawFd {
        self.stdout.as_raw_fd()
    }

    pub fn progress_fd(&self) -> RawFd {
        self.progress.as_raw_fd()
    }

    /// Non-blocking drain; returns the bytes read, or an empty vec on
    /// `WouldBlock`.
    pub fn drain_stdout(&mut self) -> std::io::Result<Vec<u8>> {
        drain(&mut self.stdout)
    }

    pub fn drain_progress(&mut self) -> std::io::Result<Vec<u8>> {
        drain(&mut self.progress)
    }

    pub fn try_wait(&mut self) -> std::io::Result<Option<ExitStatus>> {
        self.child.try_wait()
    }
}

fn drain(file: &mut File) -> std::io::Result<Vec<u8>> {
    let mut buf = [0u8; 4096];
    let mut out = Vec::new();
    loop {
        match file.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => out.extend_from_slice(&buf[..n]),
            Err(e) if e.kind() == ErrorKind::WouldBlock => break,
            Err(e) => return Err(e),
        }
    }
    Ok(out)
}

/// Maps a child's raw wait status into the success/failure outcome of
/// the scheduler's event-dispatch step.
pub fn outcome_of(status: ExitStatus) -> std::result::Result<(), anopa_core::WaitStatus> {
    use std::os::unix::process::ExitStatusExt;
    if status.success() {
        Ok(())
    } else {
        Err(status.into_raw())
    }
}
