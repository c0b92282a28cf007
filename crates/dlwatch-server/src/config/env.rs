// src/config/env.rs
// Environment overrides layered on top of the file config (spec §6).
//
// Secrets are usually left out of the TOML file entirely and supplied here;
// `TELEGRAM_API_BASE` is the one override spec.md names explicitly, for
// pointing at a self-hosted Bot API gateway.

use super::file::AppConfig;

pub fn apply_env_overrides(mut config: AppConfig) -> AppConfig {
    if let Ok(base) = std::env::var("TELEGRAM_API_BASE") {
        if !base.trim().is_empty() {
            tracing::info!("TELEGRAM_API_BASE set, overriding configured api_base_url");
            config.telegram.api_base_url = Some(base);
        }
    }

    if config.telegram.bot_token.is_none() {
        config.telegram.bot_token = read_nonempty("TELEGRAM_BOT_TOKEN");
    }

    if config.aria2.secret.is_none() {
        config.aria2.secret = read_nonempty("ARIA2_SECRET");
    }

    config
}

fn read_nonempty(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_value_wins_over_missing_env() {
        // SAFETY: test runs single-threaded per-process env var, no concurrent access.
        unsafe {
            std::env::remove_var("TELEGRAM_API_BASE");
        }
        let mut config = AppConfig::default();
        config.telegram.api_base_url = Some("https://configured.example".into());
        let config = apply_env_overrides(config);
        assert_eq!(config.telegram.api_base_url.as_deref(), Some("https://configured.example"));
    }

    #[test]
    fn env_overrides_api_base_when_set() {
        unsafe {
            std::env::set_var("TELEGRAM_API_BASE", "https://override.example");
        }
        let mut config = AppConfig::default();
        config.telegram.api_base_url = Some("https://configured.example".into());
        let config = apply_env_overrides(config);
        assert_eq!(config.telegram.api_base_url.as_deref(), Some("https://override.example"));
        unsafe {
            std::env::remove_var("TELEGRAM_API_BASE");
        }
    }
}
