//! `vcassist doctor`: check configuration and reachability of each backend.

use std::time::Duration;
use vcassist_config::AppConfig;

use crate::runtime::{Options, Runtime};

pub async fn run(options: Options) -> anyhow::Result<()> {
    println!("🩺 vcassist doctor");
    println!("==================\n");

    let mut issues = 0;

    let config_path = AppConfig::config_dir().join("config.toml");
    if config_path.exists() {
        println!("  ✅ Config file found at {}", config_path.display());
    } else {
        println!("  ⚠️  No config file at {} (using defaults and environment)", config_path.display());
    }

    let config = match AppConfig::load() {
        Ok(config) => config,
        Err(e) => {
            println!("  ❌ Configuration invalid: {e}");
            println!("\n  ⚠️  1 issue(s) found. Fix the configuration and run again.");
            return Ok(());
        }
    };
    match config.validate() {
        Ok(()) => println!("  ✅ Configuration valid"),
        Err(e) => {
            println!("  ❌ Configuration invalid: {e}");
            issues += 1;
        }
    }

    if config.has_api_key() {
        println!("  ✅ Model API key configured ({})", config.default_provider);
        issues += check_model_endpoint(&config).await;
    } else {
        println!("  ❌ No model API key: set VCASSIST_API_KEY or api_key in config.toml");
        issues += 1;
    }

    let runtime = Runtime::from_config(config, options).await?;
    println!("  ✅ Tool catalog ready ({} tools)", runtime.tools.len());

    // The connector bounds its own login.
    match runtime.connector.open_session().await {
        Ok(session) => {
            println!("  ✅ vCenter reachable ({})", runtime.connector.endpoint());
            if let Err(e) = session.close().await {
                println!("  ⚠️  vCenter session did not close cleanly: {e}");
            }
        }
        Err(e) => {
            println!("  ❌ vCenter: {e}");
            issues += 1;
        }
    }

    match &runtime.index {
        None => println!("  ⚠️  Runbook search not configured (search_runbooks will report unavailable)"),
        Some(index) => {
            let timeout = Duration::from_secs(runtime.config.retrieval.timeout_secs);
            match tokio::time::timeout(timeout, index.search("health check", 1)).await {
                Ok(Ok(_)) => println!("  ✅ Runbook index reachable ({})", index.name()),
                Ok(Err(e)) => {
                    println!("  ❌ Runbook index: {e}");
                    issues += 1;
                }
                Err(_) => {
                    println!("  ❌ Runbook index: search timed out after {}s", timeout.as_secs());
                    issues += 1;
                }
            }
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

/// Returns the number of issues found (0 or 1).
async fn check_model_endpoint(config: &AppConfig) -> usize {
    let router = vcassist_providers::build_from_config(config);
    let Some(provider) = router.default() else {
        println!("  ❌ Default provider '{}' could not be built", router.default_name());
        return 1;
    };

    let timeout = Duration::from_secs(config.agent.model_timeout_secs);
    match tokio::time::timeout(timeout, provider.health_check()).await {
        Ok(Ok(true)) => {
            println!("  ✅ Model endpoint reachable ({})", provider.name());
            0
        }
        Ok(Ok(false)) => {
            println!("  ❌ Model endpoint rejected the request ({})", provider.name());
            1
        }
        Ok(Err(e)) => {
            println!("  ❌ Model endpoint: {e}");
            1
        }
        Err(_) => {
            println!("  ❌ Model endpoint: no reply within {}s", timeout.as_secs());
            1
        }
    }
}
