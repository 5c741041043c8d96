//! HTTP surface of the application.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (axum setup, layers: request id, trace, CORS, timeout)
//!     → RouteTable router (controller handlers) | admin router
//!     → response.rs (JSON bodies, `{"message"}` errors)
//!     → Send to client
//! ```

pub mod response;
pub mod server;

pub use response::{HttpError, JsonBody};
pub use server::HttpServer;
