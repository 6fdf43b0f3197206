//! Server configuration.

use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use oxapi_http::connection::ConnectionConfig;
use oxapi_http::protocol::ResponseClass;
use tracing::warn;

use crate::multipart::MultipartLimits;

/// All recognized server options with their defaults.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind host; `localhost` is rewritten to `127.0.0.1`
    pub host: String,
    /// Bind port; a non-numeric or zero value falls back to 8080 with a
    /// warning
    pub port: String,
    /// Worker thread count; zero or negative means hardware concurrency
    pub workers: i32,
    /// Listen backlog
    pub max_connections: u32,
    /// Bodies claiming or reaching more than this answer 400
    pub max_request_size: u64,
    /// Socket read granularity for body streaming
    pub max_chunk_size: usize,
    /// Disk write granularity for multipart spillover
    pub max_chunk_size_disk: usize,
    /// Largest single multipart part kept in memory
    pub max_file_size_in_memory: usize,
    /// Largest total of in-memory multipart parts per request
    pub max_files_size_in_memory: usize,
    /// Spool directory, created at start if missing
    pub tmp_dir: PathBuf,
    /// TCP_NODELAY on accepted sockets
    pub tcp_no_delay: bool,
    /// Receive buffer size applied to the listening socket
    pub rcv_buf_size: u32,
    /// Send buffer size applied to the listening socket
    pub snd_buf_size: u32,
    /// Advertised in the Keep-Alive response header
    pub keep_alive_timeout: Duration,
    /// Shape of framework-synthesized error bodies
    pub response_class: ResponseClass,
    /// Log verbosity for the subscriber installed at start
    pub log_level: tracing::Level,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: "8080".to_string(),
            workers: 4,
            max_connections: 2048,
            max_request_size: 100 * 1024 * 1024,
            max_chunk_size: 128 * 1024,
            max_chunk_size_disk: 512 * 1024,
            max_file_size_in_memory: 1024 * 1024,
            max_files_size_in_memory: 10 * 1024 * 1024,
            tmp_dir: std::env::temp_dir().join("oxapi-tmp"),
            tcp_no_delay: true,
            rcv_buf_size: 512 * 1024,
            snd_buf_size: 512 * 1024,
            keep_alive_timeout: Duration::from_secs(30),
            response_class: ResponseClass::Plain,
            log_level: tracing::Level::INFO,
        }
    }
}

impl ServerConfig {
    /// Resolves the bind address, applying the host rewrite and port
    /// coercion rules.
    pub(crate) fn bind_addr(&mut self) -> SocketAddr {
        if self.host == "localhost" {
            self.host = "127.0.0.1".to_string();
        }

        let mut port = self.port.parse::<u16>().unwrap_or(0);
        if port == 0 {
            warn!("port '{}' is not usable, falling back to 8080", self.port);
            port = 8080;
            self.port = "8080".to_string();
        }

        let ip: IpAddr = self.host.parse().unwrap_or_else(|_| {
            warn!("host '{}' is not an ip address, falling back to 127.0.0.1", self.host);
            self.host = "127.0.0.1".to_string();
            IpAddr::from([127, 0, 0, 1])
        });

        SocketAddr::new(ip, port)
    }

    pub(crate) fn connection_config(&self) -> ConnectionConfig {
        ConnectionConfig {
            max_request_size: self.max_request_size,
            max_chunk_size: self.max_chunk_size,
            tmp_dir: self.tmp_dir.clone(),
            keep_alive_timeout: self.keep_alive_timeout,
            response_class: self.response_class,
        }
    }

    pub(crate) fn multipart_limits(&self) -> MultipartLimits {
        MultipartLimits {
            max_chunk_size: self.max_chunk_size,
            max_chunk_size_disk: self.max_chunk_size_disk,
            max_file_size_in_memory: self.max_file_size_in_memory,
            max_files_size_in_memory: self.max_files_size_in_memory,
            tmp_dir: self.tmp_dir.clone(),
        }
    }
}
