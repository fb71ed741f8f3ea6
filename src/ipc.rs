mod dispatch;
mod pipeline;
mod runtime;
mod server;

pub use dispatch::{Request, parse_request};
pub use pipeline::StatusSnapshot;
pub use runtime::{default_feed_path, runtime_dir, socket_path};
pub use server::{client_request, run_daemon};
