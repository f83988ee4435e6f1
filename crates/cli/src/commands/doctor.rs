//! `newsdesk doctor` — Diagnose system health.

use newsdesk_agent::PolicyTable;
use newsdesk_config::AppConfig;

pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    println!("NewsDesk Doctor — System Diagnostics");
    println!("====================================\n");

    let mut issues = 0;

    let config_path = AppConfig::config_path();
    if !config_path.exists() {
        println!("  ⚠️  No config file — run `newsdesk onboard` (using defaults)");
        issues += 1;
    }

    let config = match AppConfig::load() {
        Ok(config) => {
            println!("  ✅ Config valid");
            config
        }
        Err(e) => {
            println!("  ❌ Config invalid: {e}");
            println!("\n  ⚠️  Fix the config before running further checks.");
            return Ok(());
        }
    };

    match PolicyTable::builtin().validate() {
        Ok(()) => println!("  ✅ System policies valid"),
        Err(e) => {
            println!("  ❌ {e}");
            issues += 1;
        }
    }

    // Provider
    if config.has_api_key() {
        println!("  ✅ API key configured");
        let router = newsdesk_providers::build_from_config(&config);
        match router.default() {
            Some(provider) => match provider.health_check().await {
                Ok(true) => println!("  ✅ Provider '{}' reachable", provider.name()),
                Ok(false) => {
                    println!("  ❌ Provider '{}' rejected the health check", provider.name());
                    issues += 1;
                }
                Err(e) => {
                    println!("  ❌ Provider '{}': {e}", provider.name());
                    issues += 1;
                }
            },
            None => {
                println!("  ❌ Default provider '{}' not available", config.default_provider);
                issues += 1;
            }
        }
    } else {
        println!("  ⚠️  No API key configured — set OPENAI_API_KEY or add api_key to config.toml");
        issues += 1;
    }

    // Vector index
    match newsdesk_index::build_from_config(&config.index) {
        Ok(index) => match index.health_check().await {
            Ok(_) => println!("  ✅ Vector index '{}' ready ({})", index.name(), config.index.backend),
            Err(e) => {
                println!("  ❌ Vector index '{}': {e}", index.name());
                issues += 1;
            }
        },
        Err(e) => {
            println!("  ❌ Vector index: {e}");
            issues += 1;
        }
    }

    println!();
    if issues == 0 {
        println!("  🎉 All checks passed!");
    } else {
        println!("  ⚠️  {issues} issue(s) found. See above for details.");
    }

    Ok(())
}
