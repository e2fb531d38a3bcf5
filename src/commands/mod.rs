mod config_cmd;
mod status;
mod vote;
mod watch;

pub use config_cmd::ConfigCommand;
pub use status::StatusCommand;
pub use vote::VoteCommand;
pub use watch::WatchCommand;
