//! PID file management for the device-agent process.

use std::fs;
use std::io;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

/// The pid file name written in the agent's data directory.
pub const PID_FILE_NAME: &str = "wfdevice.pid";

/// Validates and returns a usable data directory path: rejected if empty,
/// containing `..`, or non-absolute after cleaning.
pub fn validate_data_dir(dir: &Path) -> io::Result<PathBuf> {
    if dir.as_os_str().is_empty() {
        return Err(io::Error::new(io::ErrorKind::InvalidInput, "data directory path must not be empty"));
    }
    if dir.components().any(|c| c.as_os_str() == "..") {
        return Err(io::Error::new(io::ErrorKind::InvalidInput, "data directory path must not contain '..'"));
    }
    if !dir.is_absolute() {
        return Err(io::Error::new(io::ErrorKind::InvalidInput, "data directory path must be absolute"));
    }
    Ok(dir.to_path_buf())
}

/// Creates the data directory (mode 0750) if missing and writes the pid
/// file (mode 0600) atomically via a temp file + rename in the same
/// directory.
pub fn write_pid_file(dir: &Path, pid: u32) -> io::Result<PathBuf> {
    let dir = validate_data_dir(dir)?;
    fs::create_dir_all(&dir)?;
    fs::set_permissions(&dir, fs::Permissions::from_mode(0o750))?;

    let path = dir.join(PID_FILE_NAME);
    let tmp_path = dir.join(format!(".{PID_FILE_NAME}.tmp"));
    {
        use std::io::Write;
        let mut options = fs::OpenOptions::new();
        options.write(true).create(true).truncate(true).mode(0o600);
        let mut file = options.open(&tmp_path)?;
        write!(file, "{pid}")?;
    }
    fs::set_permissions(&tmp_path, fs::Permissions::from_mode(0o600))?;
    fs::rename(&tmp_path, &path)?;
    Ok(path)
}

/// Removes the pid file, best-effort: failures (e.g. the file is already
/// gone) are silently ignored.
pub fn remove_pid_file(dir: &Path) {
    let path = dir.join(PID_FILE_NAME);
    let _ = fs::remove_file(path);
}

/// Reads the pid file, parses an integer, and probes liveness by
/// signal-0. An absent file or failed probe returns 0.
pub fn get_running_pid(dir: &Path) -> u32 {
    let path = dir.join(PID_FILE_NAME);
    let Ok(content) = fs::read_to_string(&path) else {
        return 0;
    };
    let Ok(pid) = content.trim().parse::<i32>() else {
        return 0;
    };
    if pid <= 0 {
        return 0;
    }
    if process_is_alive(pid) {
        pid as u32
    } else {
        0
    }
}

#[cfg(unix)]
fn process_is_alive(pid: i32) -> bool {
    use nix::sys::signal::kill;
    use nix::unistd::Pid;
    kill(Pid::from_raw(pid), None).is_ok()
}

#[cfg(not(unix))]
fn process_is_alive(_pid: i32) -> bool {
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_relative_path() {
        assert!(validate_data_dir(Path::new("relative/dir")).is_err());
    }

    #[test]
    fn rejects_dotdot_path() {
        assert!(validate_data_dir(Path::new("/var/lib/../etc")).is_err());
    }

    #[test]
    fn rejects_empty_path() {
        assert!(validate_data_dir(Path::new("")).is_err());
    }

    #[test]
    fn write_then_read_running_pid_matches_current_process() {
        let dir = tempfile::tempdir().unwrap();
        let pid = std::process::id();
        write_pid_file(dir.path(), pid).unwrap();
        assert_eq!(get_running_pid(dir.path()), pid);
    }

    #[test]
    fn missing_pid_file_reports_zero() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(get_running_pid(dir.path()), 0);
    }

    #[test]
    fn stale_pid_reports_zero() {
        let dir = tempfile::tempdir().unwrap();
        // pid 1 is init/systemd and alive on any real system, so use an
        // implausibly large pid that cannot be a live process.
        write_pid_file(dir.path(), 1_999_999_999).unwrap();
        assert_eq!(get_running_pid(dir.path()), 0);
    }

    #[test]
    fn remove_pid_file_is_best_effort_on_absent_file() {
        let dir = tempfile::tempdir().unwrap();
        remove_pid_file(dir.path());
    }
}
