pub mod agents;
pub mod chat;

pub mod settings {
    use crate::chat::Provider;
    use anyhow::{Context, Result};
    use serde::{Deserialize, Serialize};
    use std::env;
    use std::fs;
    use std::path::PathBuf;

    /// Per-user application settings: provider credentials and endpoints.
    ///
    /// Every field is optional; a provider without a configured key fails
    /// at request time with a missing-credential error, not at load time.
    #[derive(Debug, Clone, Default, Serialize, Deserialize)]
    pub struct AppSettings {
        pub google_api_key: Option<String>,
        pub openai_api_key: Option<String>,
        pub anthropic_api_key: Option<String>,
        pub groq_api_key: Option<String>,
        pub xai_api_key: Option<String>,
        pub local_api_key: Option<String>,
        /// Base URL for the local (Ollama) endpoint, e.g. "http://localhost:11434".
        pub local_base_url: Option<String>,
        /// Endpoint of the headless-browser renderer service.
        pub renderer_endpoint: Option<String>,
    }

    impl AppSettings {
        /// Resolve the API key for a provider. Google additionally falls
        /// back to the `API_KEY` environment variable.
        pub fn credential_for(&self, provider: Provider) -> Option<String> {
            let configured = match provider {
                Provider::Google => self.google_api_key.clone(),
                Provider::OpenAi => self.openai_api_key.clone(),
                Provider::Anthropic => self.anthropic_api_key.clone(),
                Provider::Groq => self.groq_api_key.clone(),
                Provider::Xai => self.xai_api_key.clone(),
                Provider::Local => self.local_api_key.clone(),
            };
            let configured = configured.filter(|k| !k.trim().is_empty());
            if configured.is_none() && provider == Provider::Google {
                return env::var("API_KEY").ok().filter(|k| !k.trim().is_empty());
            }
            configured
        }

        fn default_path() -> Result<PathBuf> {
            let dirs = directories::ProjectDirs::from("com.local", "Nexus Chat", "NexusChat")
                .context("could not determine config directory")?;
            Ok(dirs.config_dir().join("settings.json"))
        }

        /// Load settings from the platform config dir, or defaults if absent.
        pub fn load() -> Result<Self> {
            Self::load_from(&Self::default_path()?)
        }

        pub fn load_from(path: &std::path::Path) -> Result<Self> {
            if !path.exists() {
                return Ok(Self::default());
            }
            let raw = fs::read_to_string(path)
                .with_context(|| format!("reading settings from {}", path.display()))?;
            serde_json::from_str(&raw).context("parsing settings file")
        }

        pub fn save(&self) -> Result<()> {
            self.save_to(&Self::default_path()?)
        }

        pub fn save_to(&self, path: &std::path::Path) -> Result<()> {
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)?;
            }
            let raw = serde_json::to_string_pretty(self)?;
            fs::write(path, raw).with_context(|| format!("writing settings to {}", path.display()))
        }
    }

}
