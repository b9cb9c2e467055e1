//! CLI 命令处理

pub mod daemon;
pub mod output;
pub mod schedule;

pub use daemon::*;
pub use output::*;
pub use schedule::*;
