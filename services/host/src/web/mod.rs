pub mod auth;
pub mod media_bridge;
pub mod middleware;
pub mod protocol;
pub mod rest;
pub mod state;
#[cfg(test)]
pub(crate) mod test_support;
pub mod ws_handler;

// Re-export the main WebSocket handler to make it easily accessible
// to the binary that will build the web server router.
pub use middleware::require_auth;
pub use ws_handler::ws_handler;
