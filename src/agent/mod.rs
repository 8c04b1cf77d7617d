//! Device-agent process surface: pid file, health reporting,
//! graceful shutdown. The in-process peer of the fleet management plane,
//! not itself part of the registry/group/config/sync core.

pub mod pidfile;
pub mod server;

pub use pidfile::{get_running_pid, remove_pid_file, validate_data_dir, write_pid_file, PID_FILE_NAME};
pub use server::{AgentConfig, AgentServer, HealthReport, HealthState};
