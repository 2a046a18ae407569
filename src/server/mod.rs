mod http_layers;
#[allow(clippy::module_inception)]
mod server;
mod session;
mod state;

pub use http_layers::{log_requests, RequestsLoggingLevel};
pub use server::run_server;
pub use state::ServerState;
