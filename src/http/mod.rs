//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs   (Axum setup, middleware, route families)
//!     → forward.rs  (forwarding state machine)
//!         → client.rs   (plain or authenticated upstream client)
//!         → request.rs  (outbound descriptor, proxy headers)
//!         → query.rs    (/forward body → query string)
//!     → response.rs (status, Content-Type, streamed body)
//!     → Send to client
//! ```

pub mod client;
pub mod forward;
pub mod query;
pub mod request;
pub mod response;
pub mod server;

pub use client::{ClientFactory, UpstreamClient};
pub use forward::ForwardingEngine;
pub use query::body_to_query;
pub use request::{OutboundBody, OutboundRequest, ProxyContext};
pub use server::{AppState, GatewayServer};
