//! Server configuration: defaults, an optional JSON file, then
//! `TOMBOLA_*` environment overrides, in that order.

use std::path::{Path, PathBuf};
use std::str::FromStr;

use anyhow::{Context, bail};
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub host: String,
    pub port: u16,
    /// Accept backlog for the listening socket.
    pub listen_backlog: u32,
    /// Number of agencies whose confirmations trigger the draw.
    pub agencies: usize,
    /// File the durable bet store appends to.
    pub store_path: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 12345,
            listen_backlog: 5,
            agencies: 5,
            store_path: PathBuf::from("bets.csv"),
        }
    }
}

impl Config {
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let mut config = match path {
            Some(path) => {
                let contents = std::fs::read_to_string(path)
                    .with_context(|| format!("failed to read config file {}", path.display()))?;
                serde_json::from_str(&contents)
                    .with_context(|| format!("invalid config file {}", path.display()))?
            }
            None => Self::default(),
        };

        config.apply_overrides(|var| std::env::var(var).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.agencies == 0 {
            bail!("agencies must be at least 1");
        }
        Ok(())
    }

    fn apply_overrides(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> anyhow::Result<()> {
        override_from(&mut self.host, "TOMBOLA_HOST", &lookup)?;
        override_from(&mut self.port, "TOMBOLA_PORT", &lookup)?;
        override_from(&mut self.listen_backlog, "TOMBOLA_LISTEN_BACKLOG", &lookup)?;
        override_from(&mut self.agencies, "TOMBOLA_AGENCIES", &lookup)?;
        override_from(&mut self.store_path, "TOMBOLA_STORE_PATH", &lookup)?;
        Ok(())
    }
}

fn override_from<T>(
    field: &mut T,
    var: &str,
    lookup: &impl Fn(&str) -> Option<String>,
) -> anyhow::Result<()>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    if let Some(value) = lookup(var) {
        *field = value
            .parse()
            .map_err(|e| anyhow::anyhow!("invalid {var} value {value:?}: {e}"))?;
    }
    Ok(())
}
