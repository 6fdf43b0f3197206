//! Middleware chain.
//!
//! Middlewares are async interceptors around the request→response
//! pipeline. The ordered list is folded right-to-left over the terminal
//! core at server start, producing one frozen call chain: the first
//! registered middleware is the first to observe the request and the last
//! to observe the response. A middleware short-circuits by returning
//! without invoking its [`Next`].

use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;
use oxapi_http::protocol::{HttpError, Request, Response};

pub type ChainResult = Result<Response, HttpError>;

pub type ChainFn = dyn Fn(Arc<Request>) -> BoxFuture<'static, ChainResult> + Send + Sync;

#[async_trait]
pub trait Middleware: Send + Sync {
    /// Handles the request, optionally delegating to the rest of the chain.
    ///
    /// `next` may be called zero or one times.
    async fn handle(&self, req: Arc<Request>, next: Next) -> ChainResult;
}

/// A handle to the remainder of the chain, ending in route dispatch.
#[derive(Clone)]
pub struct Next {
    inner: Arc<ChainFn>,
}

impl Next {
    pub fn new(f: Arc<ChainFn>) -> Self {
        Self { inner: f }
    }

    pub async fn run(&self, req: Arc<Request>) -> ChainResult {
        (self.inner)(req).await
    }
}

/// Folds the middleware list over `core`, last middleware innermost.
pub(crate) fn build_chain(middlewares: &[Arc<dyn Middleware>], core: Arc<ChainFn>) -> Next {
    let mut chain = Next::new(core);

    for middleware in middlewares.iter().rev() {
        let middleware = middleware.clone();
        let tail = chain.clone();

        chain = Next::new(Arc::new(move |req: Arc<Request>| -> BoxFuture<'static, ChainResult> {
            let middleware = middleware.clone();
            let tail = tail.clone();
            Box::pin(async move { middleware.handle(req, tail).await })
        }));
    }

    chain
}
