mod channel;
mod commands;
mod mock;
mod process;
mod tmux;


pub use channel::{ControlChannel, ServerProcessHandle};
pub use commands::ConsoleCommand;
pub use mock::MockControlChannel;
pub use process::process_exists;
pub use tmux::TmuxControlChannel;
