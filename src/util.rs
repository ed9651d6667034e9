use std::net::IpAddr;

use tracing::warn;

const PULSEWIRE_PORT: &str = "PULSEWIRE_PORT";

const PULSEWIRE_ADDR: &str = "PULSEWIRE_ADDR";

const PULSEWIRE_TOKEN: &str = "PULSEWIRE_TOKEN";

const DEFAULT_PORT: u16 = 51243;

pub fn get_default_port() -> u16 {
    DEFAULT_PORT
}

/// `PULSEWIRE_*` overrides; each part is independent of the others
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EnvOverrides {
    pub addr: Option<IpAddr>,
    pub port: Option<u16>,
    pub token: Option<String>,
}

impl EnvOverrides {
    pub fn from_env() -> Self {
        Self {
            addr: parse_var(PULSEWIRE_ADDR),
            port: parse_var(PULSEWIRE_PORT),
            token: std::env::var(PULSEWIRE_TOKEN).ok(),
        }
    }
}

fn parse_var<T: std::str::FromStr>(name: &str) -> Option<T> {
    let value = std::env::var(name).ok()?;
    match value.parse() {
        Ok(parsed) => Some(parsed),
        Err(_) => {
            warn!("ignoring {name}={value:?}, not a valid value");
            None
        }
    }
}
