use std::net::{IpAddr, Ipv4Addr, SocketAddr};

pub(super) const DEFAULT_LISTEN_PORT: u16 = 8153;

pub(super) fn default_listen() -> String {
    format!("127.0.0.1:{DEFAULT_LISTEN_PORT}")
}

pub(super) const fn default_listen_addr() -> SocketAddr {
    SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), DEFAULT_LISTEN_PORT)
}

pub(super) fn default_plugin_id() -> String {
    "build.badge".to_string()
}
