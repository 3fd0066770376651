pub mod process;
pub mod shell;

pub use process::{GroupLauncher, ProcessHandle, ProcessLauncher, ProcessSpec};
pub use shell::{execute_shell, ExecResult};
