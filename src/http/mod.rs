//! HTTP protocol layer module
//!
//! Response builders, CORS headers and MIME detection shared by the proxy
//! route and static file serving.

pub mod cors;
pub mod mime;
pub mod response;

// Re-export commonly used builders
pub use response::{
    build_404_response, build_501_response, build_file_response, build_html_response,
    build_json_response, build_options_response, build_redirect_response, build_text_response,
};
