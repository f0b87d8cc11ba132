//! `hearth config` — Print configuration.

use std::path::Path;

use hearth_config::AppConfig;

use crate::runtime;

pub fn run(config_path: Option<&Path>, default: bool) -> anyhow::Result<()> {
    if default {
        println!("{}", AppConfig::default_toml());
        return Ok(());
    }

    let config = runtime::load_config(config_path)?;
    let mut printable = config.clone();
    if printable.api_key.is_some() {
        printable.api_key = Some("***".into());
    }
    for provider in printable.providers.values_mut() {
        if provider.api_key.is_some() {
            provider.api_key = Some("***".into());
        }
    }
    println!("{}", toml::to_string_pretty(&printable)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_toml_round_trips_through_the_loader() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, AppConfig::default_toml()).unwrap();

        let loaded = runtime::load_config(Some(&path)).unwrap();
        assert_eq!(loaded.default_model, AppConfig::default().default_model);
        assert_eq!(loaded.context.max_messages, 10);
    }
}
