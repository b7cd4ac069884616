//! Wire-agnostic HTTP layer.
//!
//! Defines the [`HttpTransport`] seam (one unary call, one streaming call)
//! together with the reqwest-backed default implementation, the transport
//! error taxonomy, and the fixed-delay retry driver shared by every
//! endpoint client in the workspace.

mod default_client;
mod error;
mod request;
mod retry;
mod transport;

pub use default_client::build_http_client;
pub use error::TransportError;
pub use request::Request;
pub use request::Response;
pub use retry::RetryOn;
pub use retry::RetryPolicy;
pub use retry::run_with_retry;
pub use transport::ByteStream;
pub use transport::HttpTransport;
pub use transport::ReqwestTransport;
pub use transport::StreamResponse;
