//! Signal intake, fan-out to strategies, and the operator console

pub mod commands;
pub mod dispatcher;
pub mod service;
pub mod source;

pub use commands::{parse_command, read_commands, OperatorCommand};
pub use dispatcher::{DispatchReport, Dispatcher};
pub use service::{BridgeService, CommandOutcome};
pub use source::{forward_lines, parse_line, TcpSignalSource};
