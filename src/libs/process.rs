//! Process control for the last step of an update: launching a platform
//! installer or restarting the application after an in-place install.

use std::io;
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::info;

pub trait ProcessControl: Send + Sync {
    /// Starts an installer executable detached from this process.
    fn spawn_installer(&self, installer: &Path) -> io::Result<u32>;

    /// Starts a fresh copy of the application.
    fn relaunch(&self) -> io::Result<u32>;
}

/// Spawns real processes. On unix the child gets its own session so it
/// survives this process exiting.
#[derive(Debug, Clone, Default)]
pub struct SystemProcess {
    executable: Option<PathBuf>,
    args: Vec<String>,
}

impl SystemProcess {
    pub fn new() -> Self {
        Self::default()
    }

    /// Relaunch target other than the current executable.
    pub fn with_executable(mut self, executable: impl Into<PathBuf>, args: Vec<String>) -> Self {
        self.executable = Some(executable.into());
        self.args = args;
        self
    }

    fn detached(program: &Path, args: &[String]) -> io::Result<u32> {
        let mut command = Command::new(program);
        command.args(args);

        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            // SAFETY: setsid is async-signal-safe and touches no parent state.
            unsafe {
                command.pre_exec(|| {
                    nix::unistd::setsid()?;
                    Ok(())
                });
            }
        }

        #[cfg(windows)]
        {
            use std::os::windows::process::CommandExt;
            const DETACHED_PROCESS: u32 = 0x00000008;
            command.creation_flags(DETACHED_PROCESS);
        }

        let child = command.spawn()?;
        Ok(child.id())
    }
}

impl ProcessControl for SystemProcess {
    fn spawn_installer(&self, installer: &Path) -> io::Result<u32> {
        let pid = Self::detached(installer, &[])?;
        info!(pid, installer = %installer.display(), "installer started");
        Ok(pid)
    }

    fn relaunch(&self) -> io::Result<u32> {
        let executable = match &self.executable {
            Some(path) => path.clone(),
            None => std::env::current_exe()?,
        };
        let pid = Self::detached(&executable, &self.args)?;
        info!(pid, executable = %executable.display(), "application relaunched");
        Ok(pid)
    }
}
