mod http_connection;

pub use http_connection::ConnectionConfig;
pub use http_connection::HttpConnection;
