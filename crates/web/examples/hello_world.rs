use http::StatusCode;
use oxapi_web::{handler, response, Response, Server, ServerConfig};

fn main() {
    let mut server = Server::new();

    server
        .get("/", handler::sync(|_ctx| Response::text("hello from oxapi")))
        .expect("register /");

    server
        .get(
            "/user/{id}",
            handler::async_fn(|ctx| async move {
                let id = ctx.param("id").unwrap_or("unknown").to_string();
                response::json(&serde_json::json!({ "id": id }), StatusCode::OK)
            }),
        )
        .expect("register /user/{id}");

    server
        .get("/old", handler::sync(|_ctx| response::redirect("/", StatusCode::MOVED_PERMANENTLY)))
        .expect("register /old");

    server.start(ServerConfig::default()).expect("start server");
    server.wait();
}
