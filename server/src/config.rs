use std::path::PathBuf;

use serde::Deserialize;
use zeroize::Zeroizing;

/// Server configuration, loaded from a TOML file and overridden by CLI
/// flags (§6 External Interfaces). Folds in what would otherwise be a
/// secondary JSON runtime-settings file — the spec has nothing analogous to
/// the teacher's channel-delete timers, so slot capacity, timeouts, and
/// STUN settings live directly on this struct.
#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    /// IP address to bind on.
    #[serde(default = "default_host")]
    pub host: String,

    /// TCP discovery port clients connect to first.
    #[serde(default = "default_discovery_port")]
    pub discovery_port: u16,

    /// Base UDP port; slot `i` is allocated `base_udp_port + i`.
    #[serde(default = "default_base_udp_port")]
    pub base_udp_port: u16,

    /// Base TCP port; slot `i` is allocated `base_tcp_port + i`.
    #[serde(default = "default_base_tcp_port")]
    pub base_tcp_port: u16,

    /// Fixed client-slot capacity (§4.9).
    #[serde(default = "default_slot_capacity")]
    pub slot_capacity: usize,

    /// STUN server to contact for NAT traversal, `host:port`. Carried for
    /// config-schema fidelity; this server always binds a directly
    /// reachable port and never dials out through `transport::stun` itself
    /// (only the client's `--connection-method stun` path would).
    #[serde(default = "default_stun_host")]
    pub stun_host: String,

    /// Seconds since startup with no client connected before the server
    /// self-exits (§4.9 container-exit policy).
    #[serde(default = "default_startup_grace_secs")]
    pub startup_grace_secs: u64,

    /// Age, in seconds, of a slot's last ping beyond which it is reaped
    /// (§4.9 liveness).
    #[serde(default = "default_ping_timeout_secs")]
    pub ping_timeout_secs: u64,

    /// Grace period, in minutes, after a nongraceful client exit during
    /// which the container-exit policy will not fire.
    #[serde(default = "default_nongraceful_grace_minutes")]
    pub nongraceful_grace_minutes: u64,

    /// 16-byte shared secret, hex-encoded (`--private-key HEX32`).
    pub private_key_hex: String,

    /// Opaque server identifier, hex-encoded (`--identifier HEX`).
    #[serde(default)]
    pub identifier_hex: String,

    /// Webserver URL the server would report status to. Treated as opaque
    /// and never dialed; out of scope per the spec's Non-goals.
    #[serde(default)]
    pub webserver_url: String,
}

fn default_host() -> String {
    "0.0.0.0".into()
}
fn default_discovery_port() -> u16 {
    32265
}
fn default_base_udp_port() -> u16 {
    32262
}
fn default_base_tcp_port() -> u16 {
    32264
}
fn default_slot_capacity() -> usize {
    8
}
fn default_stun_host() -> String {
    "52.5.240.234:48800".into()
}
fn default_startup_grace_secs() -> u64 {
    60
}
fn default_ping_timeout_secs() -> u64 {
    3
}
fn default_nongraceful_grace_minutes() -> u64 {
    10
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            discovery_port: default_discovery_port(),
            base_udp_port: default_base_udp_port(),
            base_tcp_port: default_base_tcp_port(),
            slot_capacity: default_slot_capacity(),
            stun_host: default_stun_host(),
            startup_grace_secs: default_startup_grace_secs(),
            ping_timeout_secs: default_ping_timeout_secs(),
            nongraceful_grace_minutes: default_nongraceful_grace_minutes(),
            private_key_hex: "00000000000000000000000000000000".into(),
            identifier_hex: String::new(),
            webserver_url: String::new(),
        }
    }
}

impl ServerConfig {
    /// Decode `private_key_hex` into the 16-byte shared secret used by
    /// `crypto`. Zeroized on drop.
    pub fn private_key(&self) -> anyhow::Result<Zeroizing<[u8; crypto::KEY_LEN]>> {
        let bytes = hex_decode(&self.private_key_hex)?;
        if bytes.len() != crypto::KEY_LEN {
            anyhow::bail!(
                "--private-key must be {} bytes hex-encoded, got {}",
                crypto::KEY_LEN,
                bytes.len()
            );
        }
        let mut key = [0u8; crypto::KEY_LEN];
        key.copy_from_slice(&bytes);
        Ok(Zeroizing::new(key))
    }
}

fn hex_decode(s: &str) -> anyhow::Result<Vec<u8>> {
    let s = s.trim();
    if s.len() % 2 != 0 {
        anyhow::bail!("hex string must have an even length");
    }
    (0..s.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&s[i..i + 2], 16).map_err(|e| anyhow::anyhow!(e)))
        .collect()
}

/// Platform cache directory the server persists `connection_id.txt` under
/// (`%ProgramData%\FractalCache` on Windows, `~/.fractal` on Unix), so a
/// restarted server does not reissue a connection id already logged by the
/// (out-of-scope) webserver.
pub fn cache_dir() -> PathBuf {
    if cfg!(windows) {
        dirs::data_dir()
            .unwrap_or_else(std::env::temp_dir)
            .join("FractalCache")
    } else {
        dirs::home_dir()
            .unwrap_or_else(std::env::temp_dir)
            .join(".fractal")
    }
}

/// Load the last persisted `connection_id`, defaulting to 0 when absent or
/// unreadable.
pub fn load_connection_id() -> u32 {
    let path = cache_dir().join("connection_id.txt");
    std::fs::read_to_string(path)
        .ok()
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or(0)
}

/// Persist `connection_id` so the next invocation starts past it.
pub fn save_connection_id(connection_id: u32) -> anyhow::Result<()> {
    let dir = cache_dir();
    std::fs::create_dir_all(&dir)?;
    std::fs::write(dir.join("connection_id.txt"), connection_id.to_string())?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_values() {
        let config = ServerConfig::default();
        assert_eq!(config.slot_capacity, 8);
        assert_eq!(config.discovery_port, 32265);
        assert_eq!(config.base_udp_port, 32262);
    }

    #[test]
    fn config_toml_deserialization() {
        let toml = r#"
            slot_capacity = 4
            stun_host = "1.2.3.4:9999"
            private_key_hex = "00112233445566778899aabbccddeeff0"
        "#;
        let config: ServerConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.slot_capacity, 4);
        assert_eq!(config.stun_host, "1.2.3.4:9999");
    }

    #[test]
    fn private_key_decodes_valid_hex() {
        let mut config = ServerConfig::default();
        config.private_key_hex = "00112233445566778899aabbccddeeff".chars().take(32).collect();
        let key = config.private_key().unwrap();
        assert_eq!(key.len(), crypto::KEY_LEN);
    }

    #[test]
    fn private_key_rejects_wrong_length() {
        let mut config = ServerConfig::default();
        config.private_key_hex = "00112233".into();
        assert!(config.private_key().is_err());
    }

    #[test]
    fn private_key_rejects_odd_length_hex() {
        let mut config = ServerConfig::default();
        config.private_key_hex = "0".into();
        assert!(config.private_key().is_err());
    }
}
