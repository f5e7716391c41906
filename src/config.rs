//! Relay configuration loaded from environment variables

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::str::FromStr;

const DEFAULT_ADDR: SocketAddr = SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 8080);
const DEFAULT_STATIC_DIR: &str = "public";
const DEFAULT_SEND_BUFFER: usize = 64;

#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Address the HTTP/WebSocket listener binds to
    pub addr: SocketAddr,
    /// Directory with the browser frontend
    pub static_dir: PathBuf,
    /// Outbound messages queued per connection before it counts as too slow and gets evicted
    pub send_buffer: usize,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            addr: DEFAULT_ADDR,
            static_dir: PathBuf::from(DEFAULT_STATIC_DIR),
            send_buffer: DEFAULT_SEND_BUFFER,
        }
    }
}

impl RelayConfig {
    /// Load config from environment variables
    pub fn from_env() -> Self {
        let addr = parse_var::<SocketAddr>("RELAY_ADDR").unwrap_or(DEFAULT_ADDR);

        let static_dir = std::env::var("RELAY_STATIC_DIR")
            .ok()
            .filter(|v| !v.is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_STATIC_DIR));

        let send_buffer = parse_var::<usize>("RELAY_SEND_BUFFER")
            .filter(|&n| {
                if n == 0 {
                    tracing::warn!("RELAY_SEND_BUFFER must be at least 1, using default");
                }
                n > 0
            })
            .unwrap_or(DEFAULT_SEND_BUFFER);

        Self {
            addr,
            static_dir,
            send_buffer,
        }
    }
}

/// Read and parse `key`. `None` when unset or unparseable.
fn parse_var<T: FromStr>(key: &str) -> Option<T> {
    let raw = std::env::var(key).ok()?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!("Invalid value for {}: {:?}, using default", key, raw);
            None
        }
    }
}
