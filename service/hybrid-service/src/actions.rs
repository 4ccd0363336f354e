//! `/api/actions/*` contracts (spec §6), modeled as a trait so the default
//! OS-shell-out implementation can be swapped in tests.

use std::path::Path;
use std::process::Command;

pub trait FileOpener: Send + Sync {
    /// Opens `path` in the OS default application. `start_time` is advisory
    /// (used by media players that accept a seek position); implementations
    /// that cannot honor it simply ignore it.
    fn open(&self, path: &Path, start_time: Option<f64>) -> std::io::Result<()>;
    /// Reveals `path` in the OS file manager, selecting it if possible.
    fn reveal(&self, path: &Path) -> std::io::Result<()>;
}

/// Dispatches to `open`/`xdg-open` (Linux), `open` (macOS), or `explorer`
/// (Windows). `start_time` has no cross-platform equivalent and is ignored.
pub struct OsFileOpener;

impl FileOpener for OsFileOpener {
    fn open(&self, path: &Path, _start_time: Option<f64>) -> std::io::Result<()> {
        spawn_os_command(path, false)
    }

    fn reveal(&self, path: &Path) -> std::io::Result<()> {
        spawn_os_command(path, true)
    }
}

#[cfg(target_os = "macos")]
fn spawn_os_command(path: &Path, reveal: bool) -> std::io::Result<()> {
    let mut cmd = Command::new("open");
    if reveal {
        cmd.arg("-R");
    }
    cmd.arg(path).status().map(|_| ())
}

#[cfg(target_os = "windows")]
fn spawn_os_command(path: &Path, reveal: bool) -> std::io::Result<()> {
    let mut cmd = Command::new("explorer");
    if reveal {
        cmd.arg(format!("/select,{}", path.display()));
    } else {
        cmd.arg(path);
    }
    cmd.status().map(|_| ())
}

#[cfg(not(any(target_os = "macos", target_os = "windows")))]
fn spawn_os_command(path: &Path, reveal: bool) -> std::io::Result<()> {
    let target: &Path = if reveal { path.parent().unwrap_or(path) } else { path };
    Command::new("xdg-open").arg(target).status().map(|_| ())
}
