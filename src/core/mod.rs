pub mod compaction;
pub mod config;
pub mod policy;
pub mod resolver;
pub mod scheduler;
pub mod sink;
pub mod state;
