//! Process execution layer module.

pub mod host;
pub mod mock;
pub mod traits;

pub use host::HostRunner;
pub use mock::MockRunner;
pub use traits::{CommandOutput, CommandRunner, ExecError, Invocation, OutputMode};
