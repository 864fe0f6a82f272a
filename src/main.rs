use script_bridge::config::{BridgeConfig, StartupConfig};
use script_bridge::core::{BridgeResult, Engine};

fn run() -> BridgeResult<i32> {
    let (mut config, source) = BridgeConfig::load_or_default();
    config.apply_env_overrides();
    Engine::init_logging(&config.logging)?;
    match source {
        Some(path) => tracing::info!(target: "engine", "Loaded config from {}", path.display()),
        None => tracing::debug!(target: "engine", "Using default config"),
    }

    let startup = StartupConfig::from_env()?;
    Engine::new(config, startup)?.run()
}

fn main() {
    match run() {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            eprintln!("Error {}", e);
            std::process::exit(1);
        }
    }
}
