//! The terminal dispatcher behind the middleware chain.
//!
//! The core continuation does route lookup, synthesizes the canned 404 on
//! a miss, builds the request context (multipart parsing happens there;
//! failures surface as the canned 500) and invokes the matched handler.
//! The middleware chain is folded around this core exactly once, when the
//! server starts.

use std::sync::Arc;

use futures::future::BoxFuture;
use http::StatusCode;
use oxapi_http::protocol::{canned_response, HttpError, Request, Response, ResponseClass};
use tracing::error;

use crate::context::HttpContext;
use crate::middleware::{build_chain, Middleware, Next};
use crate::multipart::MultipartLimits;
use crate::router::RouteTrie;

pub(crate) struct Dispatcher {
    chain: Next,
}

impl Dispatcher {
    pub(crate) fn new(
        trie: RouteTrie,
        middlewares: &[Arc<dyn Middleware>],
        limits: MultipartLimits,
        response_class: ResponseClass,
    ) -> Self {
        let trie = Arc::new(trie);
        let limits = Arc::new(limits);

        let core = Arc::new(move |req: Arc<Request>| -> BoxFuture<'static, Result<Response, HttpError>> {
            let trie = trie.clone();
            let limits = limits.clone();

            Box::pin(async move {
                let (handler, params) = match trie.find(req.method(), req.uri().path()) {
                    Some(found) => found,
                    None => return Ok(canned_response(StatusCode::NOT_FOUND, response_class)),
                };

                let ctx = match HttpContext::create(req.clone(), params, &limits).await {
                    Ok(ctx) => ctx,
                    Err(e) => {
                        error!("failed to build request context, cause {}", e);
                        return Ok(canned_response(StatusCode::INTERNAL_SERVER_ERROR, response_class));
                    }
                };

                Ok(handler.invoke(ctx).await)
            })
        });

        Self { chain: build_chain(middlewares, core) }
    }
}

impl oxapi_http::handler::Handler for Dispatcher {
    fn call(&self, req: Request) -> BoxFuture<'static, Result<Response, HttpError>> {
        let chain = self.chain.clone();
        Box::pin(async move { chain.run(Arc::new(req)).await })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler;
    use crate::middleware::ChainResult;
    use async_trait::async_trait;
    use http::{Method, Request as HttpRequest};
    use oxapi_http::handler::Handler as _;
    use oxapi_http::protocol::{ClientInfo, ReqBody, RequestHeader, ResponseBody};

    fn get(path: &str) -> Request {
        let header = RequestHeader::from(HttpRequest::builder().method(Method::GET).uri(path).body(()).unwrap());
        Request::new(header, ReqBody::Empty, ClientInfo::default())
    }

    fn body_text(response: &Response) -> String {
        match response.body() {
            ResponseBody::Full(bytes) => String::from_utf8_lossy(bytes).to_string(),
            _ => String::new(),
        }
    }

    fn sample_trie() -> RouteTrie {
        let mut trie = RouteTrie::new();
        trie.insert(
            Method::GET,
            "/user/{id}",
            handler::sync(|ctx| Response::text(format!("user:{}", ctx.param("id").unwrap_or("?")))),
        )
        .unwrap();
        trie.insert(Method::GET, "/async", handler::async_fn(|_ctx| async { Response::text("from-async") })).unwrap();
        trie
    }

    #[tokio::test]
    async fn dispatches_to_sync_and_async_handlers() {
        let dispatcher =
            Dispatcher::new(sample_trie(), &[], MultipartLimits::default(), ResponseClass::Plain);

        let response = dispatcher.call(get("/user/42")).await.unwrap();
        assert_eq!(body_text(&response), "user:42");

        let response = dispatcher.call(get("/async")).await.unwrap();
        assert_eq!(body_text(&response), "from-async");
    }

    #[tokio::test]
    async fn miss_synthesizes_404_per_response_class() {
        let dispatcher = Dispatcher::new(sample_trie(), &[], MultipartLimits::default(), ResponseClass::Plain);
        let response = dispatcher.call(get("/nope")).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(body_text(&response), "Not found");

        let dispatcher = Dispatcher::new(sample_trie(), &[], MultipartLimits::default(), ResponseClass::Json);
        let response = dispatcher.call(get("/nope")).await.unwrap();
        assert_eq!(body_text(&response), r#"{"message":"Not found"}"#);
    }

    struct HeaderEcho;

    #[async_trait]
    impl Middleware for HeaderEcho {
        async fn handle(&self, req: Arc<Request>, next: Next) -> ChainResult {
            let mut response = next.run(req).await?;
            response.headers_mut().insert("x-seen", http::HeaderValue::from_static("1"));
            Ok(response)
        }
    }

    #[tokio::test]
    async fn middleware_wraps_route_dispatch() {
        let middlewares: Vec<Arc<dyn Middleware>> = vec![Arc::new(HeaderEcho)];
        let dispatcher = Dispatcher::new(sample_trie(), &middlewares, MultipartLimits::default(), ResponseClass::Plain);

        let response = dispatcher.call(get("/user/1")).await.unwrap();
        assert_eq!(response.headers().get("x-seen").unwrap(), "1");

        // the 404 path flows through middleware as well
        let response = dispatcher.call(get("/nope")).await.unwrap();
        assert_eq!(response.headers().get("x-seen").unwrap(), "1");
    }
}
