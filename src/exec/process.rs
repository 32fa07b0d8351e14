// src/exec/process.rs

//! Child process handle that owns a whole process group.
//!
//! On Unix each step becomes the leader of a fresh process group, so a
//! termination request reaches anything the step spawned itself (a shell
//! script's children, a build tool's workers). Elsewhere only the direct
//! child is killed.

use std::io;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use tokio::process::{Child, Command};
use tracing::debug;

use crate::exec::pipeline::PipelineStep;

/// How often a terminated group is checked for surviving members.
const GROUP_POLL_INTERVAL: Duration = Duration::from_millis(10);

#[derive(Debug)]
pub struct ProcessGroup {
    child: Child,
    pid: Option<u32>,
    command: String,
}

impl ProcessGroup {
    /// Spawn `step` with stdout/stderr inherited so output streams live.
    pub fn spawn(step: &PipelineStep) -> io::Result<Self> {
        let mut cmd = Command::new(step.program());
        cmd.args(step.args())
            .stdin(Stdio::null())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .kill_on_drop(true);

        // Put the child in its own process group so we can signal all descendants.
        #[cfg(unix)]
        cmd.process_group(0);

        let child = cmd.spawn()?;
        let pid = child.id();
        debug!(command = %step, pid = ?pid, "spawned process group");

        Ok(Self {
            child,
            pid,
            command: step.command_line().to_string(),
        })
    }

    pub fn id(&self) -> Option<u32> {
        self.pid
    }

    /// Ask every process in the group to terminate.
    ///
    /// A group that already exited is not an error.
    pub fn terminate_group(&mut self) -> io::Result<()> {
        #[cfg(unix)]
        {
            let Some(pid) = self.pid else {
                return Ok(());
            };
            debug!(command = %self.command, pid, "sending SIGTERM to process group");
            // SAFETY: killpg only reads its integer arguments.
            let rc = unsafe { libc::killpg(pid as libc::pid_t, libc::SIGTERM) };
            if rc != 0 {
                let err = io::Error::last_os_error();
                if err.raw_os_error() != Some(libc::ESRCH) {
                    return Err(err);
                }
            }
            Ok(())
        }

        #[cfg(not(unix))]
        {
            debug!(command = %self.command, "killing process");
            self.child.start_kill()
        }
    }

    /// Wait for the group leader to exit and reap it.
    pub async fn join(&mut self) -> io::Result<ExitStatus> {
        self.child.wait().await
    }

    /// After `terminate_group`, wait until no live process is left in the
    /// group. Descendants that handle SIGTERM (graceful shutdown) can
    /// outlive the leader, so reaping the leader alone is not enough.
    ///
    /// There is no timeout: a member that ignores SIGTERM blocks here.
    pub async fn wait_group_exit(&self) {
        #[cfg(unix)]
        {
            let Some(pid) = self.pid else {
                return;
            };
            let pgid = pid as libc::pid_t;
            let mut polls: u64 = 0;
            while group_alive(pgid) {
                if polls == 0 {
                    debug!(command = %self.command, pgid, "waiting for process group members to exit");
                }
                polls += 1;
                tokio::time::sleep(GROUP_POLL_INTERVAL).await;
            }
            debug!(command = %self.command, pgid, polls, "process group empty");
        }
    }
}

/// Whether any process of group `pgid` is still running.
#[cfg(unix)]
fn group_alive(pgid: libc::pid_t) -> bool {
    // SAFETY: signal 0 performs only the existence and permission check.
    let rc = unsafe { libc::killpg(pgid, 0) };
    if rc != 0 {
        return io::Error::last_os_error().raw_os_error() != Some(libc::ESRCH);
    }
    has_live_member(pgid)
}

/// Orphaned members are reparented to init and linger as zombies until it
/// reaps them; those already count as gone.
#[cfg(target_os = "linux")]
fn has_live_member(pgid: libc::pid_t) -> bool {
    let Ok(entries) = std::fs::read_dir("/proc") else {
        return true;
    };
    entries
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_name().to_string_lossy().bytes().all(|b| b.is_ascii_digit()))
        .filter_map(|entry| std::fs::read_to_string(entry.path().join("stat")).ok())
        .any(|stat| matches!(parse_stat(&stat), Some((state, group)) if group == pgid && state != 'Z'))
}

#[cfg(all(unix, not(target_os = "linux")))]
fn has_live_member(_pgid: libc::pid_t) -> bool {
    true
}

/// `(state, pgrp)` from a `/proc/<pid>/stat` line.
///
/// The command name may contain spaces and parentheses, so fields are read
/// after the last `)`.
#[cfg(target_os = "linux")]
fn parse_stat(stat: &str) -> Option<(char, libc::pid_t)> {
    let (_, rest) = stat.rsplit_once(')')?;
    let mut fields = rest.split_whitespace();
    let state = fields.next()?.chars().next()?;
    let _ppid = fields.next()?;
    let pgrp = fields.next()?.parse().ok()?;
    Some((state, pgrp))
}

#[cfg(all(test, target_os = "linux"))]
mod tests {
    use super::*;

    #[test]
    fn stat_fields_are_read_after_command_name() {
        let stat = "4242 (my (odd) prog) S 1 4200 4200 0 -1 4194560";
        assert_eq!(parse_stat(stat), Some(('S', 4200)));
    }

    #[test]
    fn zombie_state_is_reported() {
        assert_eq!(parse_stat("7 (sleep) Z 1 7 7 0"), Some(('Z', 7)));
        assert_eq!(parse_stat("garbage"), None);
    }
}
