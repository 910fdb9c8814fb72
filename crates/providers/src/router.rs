//! Provider selection: resolves credentials and constructs the right
//! adapter for a closed [`Provider`] variant. Credential checks happen
//! here, before any network call, so a missing key fails fast.

use crate::anthropic::AnthropicClient;
use crate::error::StreamError;
use crate::gemini::GeminiClient;
use crate::local::normalize_openai_base;
use crate::openai::{OpenAiCompatClient, GROQ_BASE_URL, OPENAI_BASE_URL, XAI_BASE_URL};
use crate::ProviderAdapter;
use shared::chat::Provider;
use shared::settings::AppSettings;
use std::sync::Arc;

pub struct ProviderRouter {
    settings: AppSettings,
}

impl ProviderRouter {
    pub fn new(settings: AppSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &AppSettings {
        &self.settings
    }

    /// Build the adapter for a provider, or fail with
    /// [`StreamError::MissingCredential`] when a required key is absent.
    pub fn adapter_for(
        &self,
        provider: Provider,
    ) -> Result<Arc<dyn ProviderAdapter>, StreamError> {
        let api_key = self.settings.credential_for(provider);
        if api_key.is_none() && provider.requires_credential() {
            return Err(StreamError::MissingCredential { provider });
        }

        let adapter: Arc<dyn ProviderAdapter> = match provider {
            Provider::Google => Arc::new(GeminiClient::new(api_key.unwrap_or_default())),
            Provider::Anthropic => Arc::new(AnthropicClient::new(api_key.unwrap_or_default())),
            Provider::OpenAi => {
                Arc::new(OpenAiCompatClient::new(provider, OPENAI_BASE_URL, api_key))
            }
            Provider::Groq => Arc::new(OpenAiCompatClient::new(provider, GROQ_BASE_URL, api_key)),
            Provider::Xai => Arc::new(OpenAiCompatClient::new(provider, XAI_BASE_URL, api_key)),
            Provider::Local => Arc::new(OpenAiCompatClient::new(
                provider,
                normalize_openai_base(self.settings.local_base_url.as_deref()),
                api_key,
            )),
        };
        Ok(adapter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_credential_fails_fast() {
        let router = ProviderRouter::new(AppSettings::default());
        match router.adapter_for(Provider::Xai) {
            Err(StreamError::MissingCredential { provider }) => {
                assert_eq!(provider, Provider::Xai);
            }
            Err(other) => panic!("expected MissingCredential, got {other:?}"),
            Ok(_) => panic!("expected MissingCredential, got an adapter"),
        }
    }

    #[test]
    fn test_local_provider_needs_no_key() {
        let router = ProviderRouter::new(AppSettings::default());
        assert!(router.adapter_for(Provider::Local).is_ok());
    }

    #[test]
    fn test_configured_key_selects_adapter() {
        let settings = AppSettings {
            groq_api_key: Some("gsk_test".into()),
            ..Default::default()
        };
        let router = ProviderRouter::new(settings);
        assert!(router.adapter_for(Provider::Groq).is_ok());
    }
}
