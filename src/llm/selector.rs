use crate::config::{ConsiliumConfig, Provider};
use crate::llm::{GenAIClient, HttpStreamClient, LLMClient};
use anyhow::{Context, Result};
use genai::adapter::AdapterKind;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

pub struct SelectedClient {
    pub client: Arc<dyn LLMClient>,
    pub provider: Provider,
    pub description: String,
}

pub async fn select_llm_client(config: &ConsiliumConfig) -> Result<SelectedClient> {
    let timeout = Duration::from_secs(config.request_timeout_secs);

    if config.provider == Provider::Http {
        return http_client(config, timeout);
    }

    if let Some(selected) = try_configured_provider(config, timeout) {
        return Ok(selected);
    }

    if let Some(selected) = try_ollama(config, timeout).await {
        return Ok(selected);
    }

    Err(anyhow::anyhow!(
        "No LLM backend available. Please either:\n\
         - Set an API key (ANTHROPIC_API_KEY, OPENAI_API_KEY, etc.)\n\
         - Start Ollama locally (ollama serve)\n\
         - Point CONSILIUM_PROVIDER=http at a streaming endpoint via CONSILIUM_API_URL"
    ))
}

fn http_client(config: &ConsiliumConfig, timeout: Duration) -> Result<SelectedClient> {
    let url = config
        .api_url
        .clone()
        .context("The http provider requires CONSILIUM_API_URL")?;

    let client = HttpStreamClient::new(url.clone(), config.api_token.clone(), timeout)
        .context("Failed to initialize HTTP streaming client")?;

    info!(url = %url, "Using HTTP streaming endpoint");
    Ok(SelectedClient {
        client: Arc::new(client),
        provider: Provider::Http,
        description: format!("HTTP ({})", url),
    })
}

fn try_configured_provider(config: &ConsiliumConfig, timeout: Duration) -> Option<SelectedClient> {
    let Provider::GenAI(kind) = config.provider else {
        return None;
    };

    if kind == AdapterKind::Ollama {
        debug!("Skipping Ollama in configured provider check - will check availability separately");
        return None;
    }

    if !provider_has_credentials(kind) {
        warn!("Skipping {} - no credentials available", kind);
        return None;
    }

    info!("Using configured provider: {} ({})", kind, config.model);
    Some(SelectedClient {
        client: Arc::new(GenAIClient::new(kind, config.model.clone(), timeout)),
        provider: config.provider,
        description: format!("{} ({})", kind, config.model),
    })
}

async fn try_ollama(config: &ConsiliumConfig, timeout: Duration) -> Option<SelectedClient> {
    if !is_ollama_available().await {
        debug!("Ollama not available");
        return None;
    }

    let ollama = Provider::GenAI(AdapterKind::Ollama);
    let model = if config.provider == ollama {
        config.model.clone()
    } else {
        ollama.default_model().to_string()
    };

    info!("Using Ollama with model: {}", model);
    Some(SelectedClient {
        client: Arc::new(GenAIClient::new(AdapterKind::Ollama, model.clone(), timeout)),
        provider: ollama,
        description: format!("Ollama ({})", model),
    })
}

fn provider_has_credentials(provider: AdapterKind) -> bool {
    match provider.default_key_env_name() {
        None => true,
        Some(env_var) => std::env::var(env_var).is_ok(),
    }
}

async fn is_ollama_available() -> bool {
    let base_url =
        std::env::var("OLLAMA_HOST").unwrap_or_else(|_| "http://localhost:11434".to_string());

    let url = format!("{}/api/tags", base_url.trim_end_matches('/'));

    match reqwest::Client::new()
        .get(&url)
        .timeout(Duration::from_secs(2))
        .send()
        .await
    {
        Ok(resp) => {
            let available = resp.status().is_success();
            debug!("Ollama availability check: {}", available);
            available
        }
        Err(e) => {
            debug!("Ollama not available: {}", e);
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::env;

    struct EnvGuard {
        key: String,
        old_value: Option<String>,
    }

    impl EnvGuard {
        fn set(key: &str, value: &str) -> Self {
            let old_value = env::var(key).ok();
            env::set_var(key, value);
            Self {
                key: key.to_string(),
                old_value,
            }
        }

        fn remove(key: &str) -> Self {
            let old_value = env::var(key).ok();
            env::remove_var(key);
            Self {
                key: key.to_string(),
                old_value,
            }
        }
    }

    impl Drop for EnvGuard {
        fn drop(&mut self) {
            match &self.old_value {
                Some(v) => env::set_var(&self.key, v),
                None => env::remove_var(&self.key),
            }
        }
    }

    fn config(provider: Provider) -> ConsiliumConfig {
        ConsiliumConfig {
            provider,
            model: "m".to_string(),
            api_url: None,
            api_token: None,
            request_timeout_secs: 5,
            steps_file: None,
            log_level: "info".to_string(),
            aggregate_on_cancel: false,
        }
    }

    #[test]
    #[serial]
    fn test_provider_credentials_check() {
        assert!(provider_has_credentials(AdapterKind::Ollama));

        {
            let _guard = EnvGuard::set("OPENAI_API_KEY", "sk-test");
            assert!(provider_has_credentials(AdapterKind::OpenAI));
        }

        let _guard = EnvGuard::remove("OPENAI_API_KEY");
        assert!(!provider_has_credentials(AdapterKind::OpenAI));
    }

    #[test]
    #[serial]
    fn test_configured_provider_requires_credentials() {
        let cfg = config(Provider::GenAI(AdapterKind::OpenAI));

        {
            let _guard = EnvGuard::remove("OPENAI_API_KEY");
            assert!(try_configured_provider(&cfg, Duration::from_secs(1)).is_none());
        }

        let _guard = EnvGuard::set("OPENAI_API_KEY", "sk-test");
        let selected = try_configured_provider(&cfg, Duration::from_secs(1)).unwrap();
        assert_eq!(selected.provider, Provider::GenAI(AdapterKind::OpenAI));
        assert!(selected.description.ends_with("(m)"));
    }

    #[tokio::test]
    async fn test_http_provider_selected_without_probing() {
        let cfg = ConsiliumConfig {
            api_url: Some("http://127.0.0.1:9/chat".to_string()),
            ..config(Provider::Http)
        };
        let selected = select_llm_client(&cfg).await.unwrap();
        assert_eq!(selected.provider, Provider::Http);
        assert_eq!(selected.client.name(), "http");
    }

    #[tokio::test]
    async fn test_http_provider_without_url_fails() {
        assert!(select_llm_client(&config(Provider::Http)).await.is_err());
    }

    #[test]
    fn test_configured_ollama_is_deferred_to_probe() {
        let cfg = config(Provider::GenAI(AdapterKind::Ollama));
        assert!(try_configured_provider(&cfg, Duration::from_secs(1)).is_none());
    }
}
