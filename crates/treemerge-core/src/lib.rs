pub mod config;
pub mod logging;
pub mod report;
pub mod tree_io;

pub use config::{LoggingSettings, Settings};
pub use report::{MatchReport, PairReport};
pub use tree_io::{read_tree, TreeIoError};
