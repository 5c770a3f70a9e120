//! Service configuration loading

use anyhow::Context;
use safesender_relay::RelayConfig;
use std::path::Path;

/// Load relay settings from a TOML file, or use defaults when no file is given
pub fn load_relay_config(path: Option<&Path>) -> anyhow::Result<RelayConfig> {
    let config = match path {
        Some(path) => {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("reading config file {}", path.display()))?;
            toml::from_str::<RelayConfig>(&content)
                .with_context(|| format!("parsing config file {}", path.display()))?
        }
        None => RelayConfig::default(),
    };

    config.validate()?;
    Ok(config)
}

/// JSON body limit large enough for a maximum payload after base64 expansion
pub fn json_body_limit(config: &RelayConfig) -> usize {
    let encoded_payload = config.max_payload_bytes.div_ceil(3) * 4;
    encoded_payload.max(config.max_public_key_bytes) + 16 * 1024
}
