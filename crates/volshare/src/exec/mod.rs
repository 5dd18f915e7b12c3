//! External command execution.

mod command;

pub use command::{CommandRunner, SystemCommandRunner};

#[cfg(test)]
pub(crate) mod testing;
