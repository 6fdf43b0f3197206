//! Route handlers.
//!
//! A handler is registered either as a plain function running to
//! completion on the dispatching worker thread, or as an async function
//! whose future may suspend and resume on any worker. The variant is
//! chosen by the registration helper: [`sync`] or [`async_fn`].

use std::future::Future;

use futures::future::BoxFuture;
use oxapi_http::protocol::Response;

use crate::context::HttpContext;

type SyncFn = dyn Fn(HttpContext) -> Response + Send + Sync;
type AsyncFn = dyn Fn(HttpContext) -> BoxFuture<'static, Response> + Send + Sync;

pub enum Handler {
    Sync(Box<SyncFn>),
    Async(Box<AsyncFn>),
}

impl Handler {
    /// Dispatches the context to the handler. Invoked at most once per
    /// matched request.
    pub async fn invoke(&self, ctx: HttpContext) -> Response {
        match self {
            Handler::Sync(f) => f(ctx),
            Handler::Async(f) => f(ctx).await,
        }
    }

    pub fn is_async(&self) -> bool {
        matches!(self, Handler::Async(_))
    }
}

/// Wraps a blocking function as a route handler.
///
/// Sync handlers run inline on the worker thread; keeping them brief is
/// the application's responsibility.
pub fn sync<F>(f: F) -> Handler
where
    F: Fn(HttpContext) -> Response + Send + Sync + 'static,
{
    Handler::Sync(Box::new(f))
}

/// Wraps an async function as a route handler.
pub fn async_fn<F, Fut>(f: F) -> Handler
where
    F: Fn(HttpContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Response> + Send + 'static,
{
    Handler::Async(Box::new(move |ctx| Box::pin(f(ctx))))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::HttpContext;

    #[tokio::test]
    async fn sync_and_async_dispatch() {
        let sync_handler = sync(|_ctx| Response::text("sync"));
        let async_handler = async_fn(|_ctx| async { Response::text("async") });

        assert!(!sync_handler.is_async());
        assert!(async_handler.is_async());

        let response = sync_handler.invoke(HttpContext::for_tests()).await;
        assert_eq!(response.body().len(), 4);

        let response = async_handler.invoke(HttpContext::for_tests()).await;
        assert_eq!(response.body().len(), 5);
    }
}
