//! The seam between the connection loop and the application.
//!
//! A [`Handler`] receives each fully ingested [`Request`] exactly once and
//! produces the [`Response`] to write back. The framework layer installs
//! its middleware-chain dispatcher here; tests install closures via
//! [`make_handler`].

use std::future::Future;

use futures::future::BoxFuture;

use crate::protocol::{HttpError, Request, Response};

pub trait Handler: Send + Sync {
    fn call(&self, req: Request) -> BoxFuture<'static, Result<Response, HttpError>>;
}

pub struct HandlerFn<F> {
    f: F,
}

impl<F, Fut> Handler for HandlerFn<F>
where
    F: Fn(Request) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Response, HttpError>> + Send + 'static,
{
    fn call(&self, req: Request) -> BoxFuture<'static, Result<Response, HttpError>> {
        Box::pin((self.f)(req))
    }
}

pub fn make_handler<F, Fut>(f: F) -> HandlerFn<F>
where
    F: Fn(Request) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Response, HttpError>> + Send + 'static,
{
    HandlerFn { f }
}
