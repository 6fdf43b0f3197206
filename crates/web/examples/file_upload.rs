use std::sync::Arc;

use async_trait::async_trait;
use http::StatusCode;
use oxapi_web::middleware::ChainResult;
use oxapi_web::{handler, response, Middleware, Next, Request, Response, Server, ServerConfig};

struct RequestLogger;

#[async_trait]
impl Middleware for RequestLogger {
    async fn handle(&self, req: Arc<Request>, next: Next) -> ChainResult {
        let method = req.method().clone();
        let path = req.uri().path().to_string();
        let response = next.run(req).await?;
        tracing::info!("{} {} -> {}", method, path, response.status());
        Ok(response)
    }
}

fn main() {
    let mut server = Server::new();

    server.add_middleware(RequestLogger).expect("register middleware");

    server
        .post(
            "/upload",
            handler::async_fn(|ctx| async move {
                match ctx.file("file") {
                    Some(part) => {
                        let size = part.size().unwrap_or(0);
                        response::json(
                            &serde_json::json!({
                                "name": part.name(),
                                "content_type": part.content_type(),
                                "size": size,
                                "in_memory": part.is_in_memory(),
                            }),
                            StatusCode::OK,
                        )
                    }
                    None => Response::text("no file field").with_status(StatusCode::BAD_REQUEST),
                }
            }),
        )
        .expect("register /upload");

    server
        .get("/download/{name}", handler::async_fn(|ctx| async move {
            let name = ctx.param("name").unwrap_or_default().to_string();
            response::file(std::env::temp_dir().join(name)).await
        }))
        .expect("register /download/{name}");

    server.start(ServerConfig::default()).expect("start server");
    server.wait();
}
