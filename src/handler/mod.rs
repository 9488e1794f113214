//! Request handler module
//!
//! Routes each request either to the proxy route or to static file serving.

pub mod proxy;
pub mod router;
pub mod static_files;

// Re-export main entry point
pub use router::handle_request;
