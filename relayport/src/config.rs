use crate::mux::MuxConfig;

pub const DEFAULT_BIND_HOST: &str = "127.0.0.1";

/// Everything a tunnel run needs, built once from the caller's arguments.
#[derive(Debug, Clone)]
pub struct TunnelConfig {
    /// `ws://` or `wss://` URL of the relay, as returned by session negotiation.
    pub transport_url: String,
    /// Handshake headers, typically carrying credentials.
    pub headers: Vec<(String, String)>,
    pub bind_host: String,
    /// 0 picks a free port.
    pub local_port: u16,
    pub remote_port: String,
    pub mux: MuxConfig,
}

impl TunnelConfig {
    pub fn new(transport_url: impl Into<String>, local_port: u16, remote_port: impl Into<String>) -> Self {
        Self {
            transport_url: transport_url.into(),
            headers: Vec::new(),
            bind_host: DEFAULT_BIND_HOST.to_string(),
            local_port,
            remote_port: remote_port.into(),
            mux: MuxConfig::default(),
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }
}
