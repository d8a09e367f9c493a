mod parser;
mod registry;

pub use parser::{parse_command, SessionCommand};
pub use registry::{find_command, help_lines, CommandSpec, SESSION_COMMANDS};
