//! `hearth doctor` — Diagnose system health.

use std::path::Path;

use hearth_config::{AppConfig, StoreBackend};

use crate::runtime;

pub async fn run(config_path: Option<&Path>) -> anyhow::Result<()> {
    println!("hearth doctor — system diagnostics");
    println!("==================================\n");

    let mut issues = 0;

    let shown_path = config_path
        .map(Path::to_path_buf)
        .unwrap_or_else(|| AppConfig::config_dir().join("config.toml"));
    if !shown_path.exists() {
        println!("  ⚠️  No config file at {} — using defaults", shown_path.display());
        println!("      (`hearth config --default` prints a starting point)");
    }

    let config = match runtime::load_config(config_path) {
        Ok(config) => {
            println!("  ✅ Config valid");
            config
        }
        Err(e) => {
            println!("  ❌ Config invalid: {e:#}");
            println!("\n  ⚠️  1 issue found. Fix the config and run again.");
            return Ok(());
        }
    };

    if config.has_api_key() || config.providers.values().any(|p| p.api_key.is_some()) {
        println!("  ✅ API key configured");
    } else {
        println!("  ⚠️  No API key configured — set OPENROUTER_API_KEY or add api_key to config.toml");
        issues += 1;
    }

    match runtime::open_stores(&config.store).await {
        Ok(_) => match config.store.backend {
            StoreBackend::Sqlite => println!("  ✅ Store ready at {}", config.store.database_path().display()),
            StoreBackend::Memory => println!("  ✅ In-memory store (nothing is persisted)"),
        },
        Err(e) => {
            println!("  ❌ Store unavailable: {e:#}");
            issues += 1;
        }
    }

    match runtime::default_provider(&config) {
        Ok(provider) => match provider.health_check().await {
            Ok(true) => println!("  ✅ Provider {} reachable", provider.name()),
            Ok(false) => {
                println!("  ⚠️  Provider {} answered but reported a problem", provider.name());
                issues += 1;
            }
            Err(e) => {
                println!("  ❌ Provider {} unreachable: {e}", provider.name());
                issues += 1;
            }
        },
        Err(e) => {
            println!("  ❌ {e}");
            issues += 1;
        }
    }

    // Summary
    println!();
    if issues == 0 {
        println!("  🎉 All checks passed!");
    } else {
        println!("  ⚠️  {issues} issue(s) found. See above for details.");
    }

    Ok(())
}
