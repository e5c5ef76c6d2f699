pub mod config;
pub mod dcmdex_toml;
pub mod fd_limit;
pub mod logger;

pub use config::*;
pub use fd_limit::{FDS_PER_WORKER, cap_workers_by_fd_limit, max_open_fds, max_workers_by_fd_limit};
pub use logger::{Colors, setup_logging};
