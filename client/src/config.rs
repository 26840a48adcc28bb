use std::io::BufRead;

use clap::{Parser, ValueEnum};

use protocol::VideoCodec;

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum CodecArg {
    H264,
    H265,
}

impl From<CodecArg> for VideoCodec {
    fn from(value: CodecArg) -> Self {
        match value {
            CodecArg::H264 => VideoCodec::H264,
            CodecArg::H265 => VideoCodec::H265,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum Environment {
    Production,
    Staging,
    Dev,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum ConnectionMethod {
    Stun,
    Direct,
}

/// Low-latency interactive remote-desktop client (§6).
#[derive(Parser, Debug)]
#[command(name = "client", version)]
pub struct Args {
    /// Server IP address to connect to.
    pub ip: String,

    #[arg(long, default_value_t = 1280)]
    pub width: i32,

    #[arg(long, default_value_t = 720)]
    pub height: i32,

    #[arg(long, default_value_t = 16.0)]
    pub bitrate: f64,

    /// Preferred video codec, sent to the server in the initial
    /// `Dimensions` control message (§4.6). The decoder actually built
    /// each frame still follows whatever the server's `FrameEnvelope`
    /// reports, since the server may fall back to a different codec.
    #[arg(long, value_enum, default_value = "h264")]
    pub codec: CodecArg,

    #[arg(long = "private-key")]
    pub private_key: String,

    #[arg(long = "user")]
    pub user_email: Option<String>,

    /// Accepted and ignored: no environment-specific behavior (e.g.
    /// webserver endpoint selection) is in scope.
    #[arg(long, value_enum, default_value = "production")]
    pub environment: Environment,

    /// Path to a window/taskbar icon. Accepted and ignored: windowing
    /// integration is out of scope.
    #[arg(long)]
    pub icon: Option<std::path::PathBuf>,

    /// Accepted and ignored: only direct connection is implemented, no
    /// STUN client.
    #[arg(long = "connection-method", value_enum, default_value = "direct")]
    pub connection_method: ConnectionMethod,

    /// Port-mapping table, `N:M[.N:M...]`. Accepted and ignored: this
    /// client always uses the server-assigned ports from `DiscoveryReply`.
    #[arg(long)]
    pub ports: Option<String>,

    /// Window title. Accepted and ignored: windowing integration is out of
    /// scope.
    #[arg(long)]
    pub name: Option<String>,

    /// Accepted and ignored: container lifecycle is a server-side concern
    /// here (§4.9 container-exit policy).
    #[arg(long = "use_ci")]
    pub use_ci: bool,

    /// Read additional `key?value` overrides from stdin, one per line,
    /// until EOF.
    #[arg(long)]
    pub spin: bool,
}

impl Args {
    /// Apply `--spin` stdin overrides (`key?value` per line) on top of the
    /// already-parsed CLI flags.
    pub fn apply_spin_overrides(&mut self) {
        if !self.spin {
            return;
        }
        let stdin = std::io::stdin();
        for line in stdin.lock().lines().map_while(Result::ok) {
            let Some((key, value)) = line.split_once('?') else { continue };
            match key {
                "width" => {
                    if let Ok(v) = value.parse() {
                        self.width = v;
                    }
                }
                "height" => {
                    if let Ok(v) = value.parse() {
                        self.height = v;
                    }
                }
                "bitrate" => {
                    if let Ok(v) = value.parse() {
                        self.bitrate = v;
                    }
                }
                "private_key" => self.private_key = value.to_string(),
                "user" => self.user_email = Some(value.to_string()),
                _ => {}
            }
        }
    }

    pub fn private_key(&self) -> anyhow::Result<zeroize::Zeroizing<[u8; crypto::KEY_LEN]>> {
        let bytes = hex_decode(&self.private_key)?;
        if bytes.len() != crypto::KEY_LEN {
            anyhow::bail!("--private-key must be {} bytes hex-encoded, got {}", crypto::KEY_LEN, bytes.len());
        }
        let mut key = [0u8; crypto::KEY_LEN];
        key.copy_from_slice(&bytes);
        Ok(zeroize::Zeroizing::new(key))
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
