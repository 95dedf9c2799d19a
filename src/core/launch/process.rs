use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::process::Command;

#[cfg(not(target_os = "windows"))]
use sysinfo::{Pid, System};
use tracing::{debug, warn};

use crate::core::error::{LauncherError, LauncherResult};

type ExitFuture = Pin<Box<dyn Future<Output = Option<i32>> + Send>>;

/// Handle to a running game. Resolves to the exit code, `None` when killed by a signal.
pub struct GameProcess {
    pid: Option<u32>,
    exit: ExitFuture,
}

impl GameProcess {
    pub fn spawned(mut child: tokio::process::Child) -> Self {
        let pid = child.id();
        Self {
            pid,
            exit: Box::pin(async move {
                match child.wait().await {
                    Ok(status) => status.code(),
                    Err(err) => {
                        warn!("Failed waiting for game process: {}", err);
                        None
                    }
                }
            }),
        }
    }

    pub fn from_future<F>(pid: Option<u32>, exit: F) -> Self
    where
        F: Future<Output = Option<i32>> + Send + 'static,
    {
        Self {
            pid,
            exit: Box::pin(exit),
        }
    }

    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    pub async fn wait(self) -> Option<i32> {
        self.exit.await
    }
}

impl fmt::Debug for GameProcess {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GameProcess").field("pid", &self.pid).finish()
    }
}

/// Terminate `pid` and every process it forked. Blocking.
pub fn kill_tree(pid: u32) -> LauncherResult<()> {
    #[cfg(target_os = "windows")]
    {
        let status = Command::new("taskkill")
            .args(["/PID", &pid.to_string(), "/T", "/F"])
            .status()
            .map_err(|e| LauncherError::Other(format!("Could not stop process {pid}: {e}")))?;

        if !status.success() {
            return Err(LauncherError::Other(format!(
                "taskkill for process {pid} exited with {:?}",
                status.code()
            )));
        }
        Ok(())
    }

    #[cfg(not(target_os = "windows"))]
    {
        let system = System::new_all();
        let parents: HashMap<u32, u32> = system
            .processes()
            .iter()
            .filter_map(|(child, process)| {
                process
                    .parent()
                    .map(|parent| (child.as_u32(), parent.as_u32()))
            })
            .collect();

        // children before parents so nothing gets re-parented mid-kill
        let mut targets = descendants_of(pid, &parents);
        targets.reverse();
        targets.push(pid);
        debug!("Stopping process tree {:?}", targets);

        let mut first_error = None;
        for target in targets {
            if system.process(Pid::from_u32(target)).is_none() && target != pid {
                continue;
            }
            if let Err(err) = terminate(target) {
                warn!("Could not stop process {}: {}", target, err);
                first_error.get_or_insert(err);
            }
        }
        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

/// Every process below `root`, each listed after its parent.
fn descendants_of(root: u32, parents: &HashMap<u32, u32>) -> Vec<u32> {
    let mut found = Vec::new();
    let mut frontier = vec![root];
    while let Some(current) = frontier.pop() {
        let mut children: Vec<u32> = parents
            .iter()
            .filter(|(child, parent)| **parent == current && **child != root)
            .map(|(child, _)| *child)
            .filter(|child| !found.contains(child))
            .collect();
        children.sort_unstable();
        found.extend(children.iter().copied());
        frontier.extend(children);
    }
    found
}

#[cfg(not(target_os = "windows"))]
fn terminate(pid: u32) -> LauncherResult<()> {
    let graceful = Command::new("kill")
        .args(["-15", &pid.to_string()])
        .status()
        .map_err(|e| LauncherError::Other(format!("Could not send SIGTERM to {pid}: {e}")))?;

    if graceful.success() {
        std::thread::sleep(std::time::Duration::from_millis(300));
        let check = Command::new("kill").args(["-0", &pid.to_string()]).status();
        if matches!(check, Ok(status) if !status.success()) {
            return Ok(());
        }
    }

    let force = Command::new("kill")
        .args(["-9", &pid.to_string()])
        .status()
        .map_err(|e| LauncherError::Other(format!("Could not stop process {pid}: {e}")))?;

    if !force.success() {
        return Err(LauncherError::Other(format!(
            "kill -9 for process {pid} exited with {:?}",
            force.code()
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn descendants_cover_grandchildren() {
        let parents = HashMap::from([(20, 10), (30, 20), (31, 20), (40, 99)]);
        let mut found = descendants_of(10, &parents);
        found.sort_unstable();
        assert_eq!(found, vec![20, 30, 31]);
    }

    #[tokio::test]
    async fn future_backed_process_reports_exit() {
        let process = GameProcess::from_future(Some(42), async { Some(3) });
        assert_eq!(process.pid(), Some(42));
        assert_eq!(process.wait().await, Some(3));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn kill_tree_stops_a_real_child() {
        let child = tokio::process::Command::new("sleep")
            .arg("30")
            .spawn()
            .unwrap();
        let process = GameProcess::spawned(child);
        let pid = process.pid().unwrap();

        tokio::task::spawn_blocking(move || kill_tree(pid))
            .await
            .unwrap()
            .unwrap();
        let code = tokio::time::timeout(std::time::Duration::from_secs(5), process.wait())
            .await
            .unwrap();
        assert_ne!(code, Some(0));
    }
}
