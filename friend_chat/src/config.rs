use std::time::Duration;

use clap::Parser;
use friend_api::{ClientConfig, DEFAULT_API_BASE};

pub mod env {
    pub const API_BASE: &str = "FRIEND_API_BASE";
    pub const MODEL: &str = "FRIEND_MODEL";
    pub const CONNECT_TIMEOUT_SECS: &str = "FRIEND_CONNECT_TIMEOUT_SECS";
}

#[derive(Parser, Debug, Clone)]
#[command(name = "friend", version, about = "Terminal chat client for the assistant backend")]
pub struct Cli {
    #[arg(short = 'a', long, env = env::API_BASE, default_value = DEFAULT_API_BASE)]
    pub api_base: String,

    #[arg(short = 'm', long, env = env::MODEL)]
    pub model: Option<String>,

    #[arg(short = 't', long, value_parser = parse_temperature)]
    pub temperature: Option<f32>,

    /// Zero disables the connect timeout.
    #[arg(short = 'T', long, env = env::CONNECT_TIMEOUT_SECS, default_value_t = 10)]
    pub connect_timeout_secs: u64,

    /// Fallback filter when `RUST_LOG` is unset.
    #[arg(short = 'l', long, default_value = "warn")]
    pub log_level: String,
}

impl Cli {
    pub fn client_config(&self) -> ClientConfig {
        ClientConfig {
            base_url: self.api_base.clone(),
            connect_timeout: (self.connect_timeout_secs > 0)
                .then(|| Duration::from_secs(self.connect_timeout_secs)),
            model: self.model.clone(),
            temperature: self.temperature,
        }
    }
}

fn parse_temperature(s: &str) -> Result<f32, String> {
    let value: f32 = s.parse().map_err(|e| format!("{e}"))?;
    if (0.0..=2.0).contains(&value) {
        Ok(value)
    } else {
        Err(format!("temperature must be within 0.0..=2.0, got {value}"))
    }
}

#[cfg(test)]
mod tests {
    use test_log::test;

    use super::*;

    #[test]
    fn parses_flags_into_client_config() {
        let cli = Cli::try_parse_from([
            "friend",
            "--api-base",
            "http://backend:9000/",
            "-m",
            "small",
            "-t",
            "0.4",
            "-T",
            "3",
        ])
        .unwrap();

        let config = cli.client_config();

        assert_eq!("http://backend:9000/", config.base_url);
        assert_eq!(Some("small".to_string()), config.model);
        assert_eq!(Some(0.4), config.temperature);
        assert_eq!(Some(Duration::from_secs(3)), config.connect_timeout);
    }

    #[test]
    fn optional_settings_default_to_none() {
        let cli = Cli::try_parse_from(["friend", "--model", "m"]).unwrap();

        assert_eq!(None, cli.temperature);
        assert_eq!(None, cli.client_config().temperature);
        assert_eq!(Some(Duration::from_secs(10)), cli.client_config().connect_timeout);
    }

    #[test]
    fn zero_disables_connect_timeout() {
        let cli = Cli::try_parse_from(["friend", "--connect-timeout-secs", "0"]).unwrap();

        assert_eq!(None, cli.client_config().connect_timeout);
    }

    #[test]
    fn rejects_out_of_range_temperature() {
        assert!(Cli::try_parse_from(["friend", "--temperature", "3.5"]).is_err());
        assert!(Cli::try_parse_from(["friend", "--temperature", "warm"]).is_err());
    }
}
