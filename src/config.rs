use clap::Parser;

use crate::codec::DEFAULT_MAX_FRAME_SIZE;
use crate::commands::Commands;

const HOST: &str = "127.0.0.1";
const PORT: u16 = 6379;

#[derive(Parser, Debug, Clone, PartialEq)]
#[command(version, about)]
pub struct Config {
    /// The address to bind to
    #[arg(long, env = "RESPD_HOST", default_value = HOST)]
    pub host: String,

    /// The port to listen on
    #[arg(short, long, env = "RESPD_PORT", default_value_t = PORT)]
    pub port: u16,

    /// Largest number of bytes buffered for a single incoming frame
    #[arg(long, env = "MAX_FRAME_SIZE", default_value_t = DEFAULT_MAX_FRAME_SIZE)]
    pub max_frame_size: usize,

    /// Make PING reply with its argument when one is given
    #[arg(long, env = "RESPD_PING_ECHO")]
    pub ping_echo: bool,
}

impl Config {
    /// The dispatch table described by this configuration.
    pub fn commands(&self) -> Commands {
        if self.ping_echo {
            Commands::with_ping_echo()
        } else {
            Commands::default()
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            host: HOST.to_string(),
            port: PORT,
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
            ping_echo: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = Config::try_parse_from(["respd"]).unwrap();

        assert_eq!(config, Config::default());
    }

    #[test]
    fn flags() {
        let config = Config::try_parse_from([
            "respd",
            "--host",
            "0.0.0.0",
            "-p",
            "7000",
            "--max-frame-size",
            "1024",
            "--ping-echo",
        ])
        .unwrap();

        assert_eq!(
            config,
            Config {
                host: "0.0.0.0".to_string(),
                port: 7000,
                max_frame_size: 1024,
                ping_echo: true,
            }
        );
    }

    #[test]
    fn invalid_port() {
        assert!(Config::try_parse_from(["respd", "--port", "nope"]).is_err());
    }
}
