//! Parent process liveness checking.
//!
//! A plugin whose host died would otherwise linger forever blocked on
//! stdin. The checker polls the parent pid and exits the process once the
//! parent is gone.

use std::time::Duration;

use tokio::task::JoinHandle;

/// Default interval between liveness checks.
pub const DEFAULT_PARENT_CHECK_INTERVAL: Duration = Duration::from_secs(30);

/// Spawn a background task that exits the process when `parent_pid` stops
/// running.
pub fn spawn_parent_process_checker(parent_pid: u32, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        // The first tick completes immediately.
        ticker.tick().await;
        loop {
            ticker.tick().await;
            if !is_process_running(parent_pid) {
                tracing::error!(parent_pid, "parent process exited, shutting down");
                std::process::exit(1);
            }
        }
    })
}

/// Whether a process with `pid` currently exists.
#[cfg(unix)]
pub fn is_process_running(pid: u32) -> bool {
    use nix::errno::Errno;
    use nix::sys::signal::kill;
    use nix::unistd::Pid;

    let Ok(raw) = i32::try_from(pid) else {
        return false;
    };
    if raw == 0 {
        return false;
    }
    // Signal 0 performs the existence check without delivering anything.
    match kill(Pid::from_raw(raw), None) {
        Ok(()) => true,
        Err(Errno::EPERM) => true,
        Err(_) => false,
    }
}

/// Whether a process with `pid` currently exists.
///
/// Without a portable probe the parent is assumed alive.
#[cfg(not(unix))]
pub fn is_process_running(pid: u32) -> bool {
    pid != 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_current_process_is_running() {
        assert!(is_process_running(std::process::id()));
    }

    #[test]
    fn test_pid_zero_is_not_running() {
        assert!(!is_process_running(0));
    }

    #[cfg(unix)]
    #[test]
    fn test_reaped_child_is_not_running() {
        let mut child = std::process::Command::new("true").spawn().unwrap();
        let pid = child.id();
        child.wait().unwrap();
        assert!(!is_process_running(pid));
    }

    #[tokio::test]
    async fn test_checker_keeps_running_while_parent_alive() {
        let handle = spawn_parent_process_checker(std::process::id(), Duration::from_millis(5));
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(!handle.is_finished());
        handle.abort();
    }
}
