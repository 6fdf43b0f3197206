//! Framework layer of oxapi: routing, middleware, multipart uploads,
//! request contexts, response constructors and the server lifecycle.
//!
//! A minimal service:
//!
//! ```no_run
//! use oxapi_web::{handler, Response, Server, ServerConfig};
//!
//! let mut server = Server::new();
//! server.get("/hello/{name}", handler::sync(|ctx| {
//!     Response::text(format!("hello, {}", ctx.param("name").unwrap_or("world")))
//! })).unwrap();
//!
//! server.start(ServerConfig::default()).unwrap();
//! server.wait();
//! ```

pub mod config;
pub mod context;
pub mod cookie;
pub mod handler;
pub mod middleware;
pub mod mime;
pub mod multipart;
pub mod response;
pub mod router;
mod server;

pub use config::ServerConfig;
pub use context::HttpContext;
pub use cookie::{Cookie, CookieError};
pub use middleware::{Middleware, Next};
pub use multipart::{FilePart, Files, MultipartLimits};
pub use router::{PathParams, RouteTrie, RouterError};
pub use server::{Server, ServerError};

pub use oxapi_http::protocol::{Request, Response, ResponseClass};
