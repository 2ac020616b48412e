use std::path::Path;

use anyhow::{Context, Result};
use tidewire::NetConfig;

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind_addr: String,
    pub net: NetConfig,
    /// Number of drifting props the toy simulation spawns at startup.
    pub props: u32,
}

impl ServerConfig {
    /// File values first, then defaults for anything the file leaves out.
    pub fn load(bind_addr: String, path: Option<&Path>) -> Result<Self> {
        let net = match path {
            Some(path) => NetConfig::load(path)
                .with_context(|| format!("loading {}", path.display()))?,
            None => NetConfig::default(),
        };
        Ok(Self {
            bind_addr,
            net,
            props: 8,
        })
    }
}
