use std::path::Path;

use rendershot_lib::{Config, RenderError};

use crate::cli::Cli;

/// Load config from a TOML file or defaults, apply CLI/env overrides, then
/// validate the merged result.
/// Priority: CLI flags > explicit path > ./rendershot.toml > defaults
pub fn load_serve_config(cli: &Cli) -> Result<Config, RenderError> {
    let path = cli.config.as_deref();
    let cfg = Config::load(path).map_err(|e| RenderError::Config(e.to_string()))?;
    let cfg = resolve_serve_settings(cfg, cli);

    cfg.validate().map_err(|e| {
        let prefix = path
            .map(|p| format!("Invalid config ({}): {}", p.display(), e))
            .unwrap_or_else(|| format!("Invalid config: {}", e));
        RenderError::Config(prefix)
    })?;
    Ok(cfg)
}

/// Merge CLI arguments over the loaded config, preferring flags that were given.
pub fn resolve_serve_settings(mut config: Config, cli: &Cli) -> Config {
    if let Some(port) = cli.port {
        config.server.port = port;
    }
    if let Some(host) = &cli.host {
        config.server.host = host.clone();
    }
    if let Some(dir) = &cli.components_dir {
        config.render.components_dir = dir.clone();
    }
    if let Some(chrome) = &cli.chrome {
        config.browser.executable = Some(chrome.clone());
    }
    if cli.no_sandbox {
        config.browser.no_sandbox = true;
    }
    if cli.expose_error_detail {
        config.server.expose_error_detail = true;
    }
    config
}

/// Format effective config as a single-line string.
pub fn format_effective_config(config: &Config, config_source: Option<&Path>) -> String {
    let source = config_source
        .map(|p| p.display().to_string())
        .unwrap_or_else(|| "defaults".to_string());
    format!(
        "Effective config [{source}]: listen={}:{}, components={}, default_component={}, provisional_height={}, timeouts: nav={:?}, network-idle={:?}, max-settle={:?}, retry: initial={:?}, max={:?}, x{}",
        config.server.host,
        config.server.port,
        config.render.components_dir.display(),
        config.render.default_component,
        config.render.provisional_height,
        config.browser.navigation_timeout,
        config.browser.network_idle_timeout,
        config.render.max_settle,
        config.retry.initial_delay,
        config.retry.max_delay,
        config.retry.multiplier,
    )
}
