//! Loading, validation, and materialisation of [`EngineConfig`].

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail, ensure};
use llmkit_adapters::RetryPolicy;
use llmkit_adapters::ollama::{OllamaAdapter, OllamaConfig};
use llmkit_adapters::openai::{OpenAiAdapter, OpenAiConfig};
use llmkit_adapters::traits::ModelAdapter;
use llmkit_engine::{CostTable, GenerationEngine};
use tracing::{debug, info};

use crate::schema::{EngineConfig, Provider};

/// Environment variable overriding [`EngineConfig::model`].
pub const LLMKIT_MODEL_ENV: &str = "LLMKIT_MODEL";
/// Environment variable overriding the configured log level.
pub const LLMKIT_LOG_ENV: &str = "LLMKIT_LOG";

impl EngineConfig {
    /// Loads and validates a YAML configuration file.
    ///
    /// Unknown fields are ignored.
    ///
    /// # Errors
    ///
    /// Fails if the file cannot be read, does not parse, or does not validate.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file '{}'", path.display()))?;
        let config = Self::from_yaml(&content)
            .with_context(|| format!("invalid config file '{}'", path.display()))?;
        debug!(path = %path.display(), model = %config.model, "configuration loaded");
        Ok(config)
    }

    /// Parses and validates a YAML configuration string.
    ///
    /// # Errors
    ///
    /// Fails on malformed YAML or invalid values.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(yaml).context("failed to parse config YAML")?;
        config.validate()?;
        Ok(config)
    }

    /// Serialises the configuration to YAML.
    ///
    /// # Errors
    ///
    /// Fails if serialisation fails.
    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(self).context("failed to serialize config to YAML")
    }

    /// Applies `LLMKIT_MODEL` and `LLMKIT_LOG` from the process environment.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Applies overrides from an arbitrary variable source. Empty values are ignored.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let non_empty = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());
        if let Some(model) = non_empty(LLMKIT_MODEL_ENV) {
            debug!(model = %model, "model overridden from environment");
            self.model = model;
        }
        if let Some(level) = non_empty(LLMKIT_LOG_ENV) {
            self.logging.level = level;
        }
    }

    /// Checks values that would only fail later at call time.
    ///
    /// # Errors
    ///
    /// Fails for an empty model name, a zero timeout, or pricing entries with
    /// an empty model or a negative or non-finite price.
    pub fn validate(&self) -> Result<()> {
        ensure!(
            !self.model.trim().is_empty(),
            "config validation failed: model must not be empty"
        );
        ensure!(
            self.openai.timeout_secs > 0 && self.ollama.timeout_secs > 0,
            "config validation failed: timeout_secs must be greater than 0"
        );
        for entry in &self.pricing {
            if entry.model.trim().is_empty() {
                bail!("config validation failed: pricing entries need a model name");
            }
            for (label, price) in [
                ("input_per_million", entry.input_per_million),
                ("output_per_million", entry.output_per_million),
            ] {
                ensure!(
                    price.is_finite() && price >= 0.0,
                    "config validation failed: {label} for '{}' must be a non-negative number (found {price})",
                    entry.model
                );
            }
        }
        Ok(())
    }

    /// Builds the pricing table: built-in `OpenAI` prices plus `pricing` entries.
    #[must_use]
    pub fn cost_table(&self) -> CostTable {
        self.pricing
            .iter()
            .fold(CostTable::openai_defaults().to_builder(), |builder, entry| {
                builder.model(
                    entry.model.clone(),
                    entry.input_per_million,
                    entry.output_per_million,
                )
            })
            .build()
    }

    /// Creates the adapter for the configured provider.
    ///
    /// # Errors
    ///
    /// Fails on invalid URLs or, for `OpenAI`, a missing `OPENAI_API_KEY`.
    pub fn build_adapter(&self) -> Result<Arc<dyn ModelAdapter>> {
        let adapter: Arc<dyn ModelAdapter> = match self.provider {
            Provider::OpenAi => {
                let settings = &self.openai;
                let timeout = Duration::from_secs(settings.timeout_secs);
                let config = OpenAiConfig::from_env(self.model.clone())
                    .with_base_url(&settings.base_url)?
                    .with_timeout(timeout)
                    .with_retry_policy(
                        RetryPolicy::new(
                            settings.max_retries,
                            Duration::from_millis(settings.retry_delay_ms),
                        )
                        .with_max_delay(timeout),
                    );
                Arc::new(OpenAiAdapter::new(config).context("failed to create OpenAI adapter")?)
            }
            Provider::Ollama => {
                let settings = &self.ollama;
                let mut config = OllamaConfig::new(self.model.clone())
                    .with_base_url(&settings.base_url)?
                    .with_timeout(Duration::from_secs(settings.timeout_secs));
                if let Some(keep_alive) = &settings.keep_alive {
                    config = config.with_keep_alive(keep_alive.clone());
                }
                Arc::new(OllamaAdapter::new(config).context("failed to create Ollama adapter")?)
            }
        };
        Ok(adapter)
    }

    /// Builds an engine around the configured adapter.
    ///
    /// # Errors
    ///
    /// Fails if the adapter cannot be created or the prompt file cannot be loaded.
    pub fn build_engine(&self) -> Result<GenerationEngine> {
        self.build_engine_with(self.build_adapter()?)
    }

    /// Builds an engine around a caller-supplied adapter.
    ///
    /// # Errors
    ///
    /// Fails if the prompt file cannot be loaded.
    pub fn build_engine_with(&self, adapter: Arc<dyn ModelAdapter>) -> Result<GenerationEngine> {
        let mut engine = GenerationEngine::new(adapter)
            .with_model(self.model.clone())
            .with_cost_table(self.cost_table());

        if let Some(path) = &self.prompts_path {
            let loaded = engine
                .load_prompts(path)
                .with_context(|| format!("failed to load prompt units from '{}'", path.display()))?;
            info!(path = %path.display(), units = loaded, "prompt units loaded");
        }
        Ok(engine)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::io::Write;

    use llmkit_adapters::traits::{
        AdapterMetadata, AdapterResult, InvocationRequest, ModelResponse,
    };

    use super::*;
    use crate::schema::PricingEntry;

    const FULL_YAML: &str = r"
model: gpt-4o
provider: ollama
ollama:
  base_url: http://localhost:11434
  keep_alive: 5m
pricing:
  - model: llama3
    input_per_million: 0
    output_per_million: 0
  - model: gpt-4o
    input_per_million: 4
    output_per_million: 12
logging:
  level: debug
";

    struct NullAdapter(AdapterMetadata);

    #[async_trait::async_trait]
    impl ModelAdapter for NullAdapter {
        fn metadata(&self) -> &AdapterMetadata {
            &self.0
        }

        fn reports_usage(&self, _model: &str) -> bool {
            false
        }

        async fn invoke(&self, request: InvocationRequest) -> AdapterResult<ModelResponse> {
            Ok(ModelResponse::new(request.model(), "ok"))
        }
    }

    #[test]
    fn empty_document_uses_defaults() {
        let config = EngineConfig::from_yaml("{}").unwrap();
        assert_eq!(config, EngineConfig::default());
        assert_eq!(config.model, "gpt-4o-mini");
        assert_eq!(config.provider, Provider::OpenAi);
        assert_eq!(config.openai.max_retries, 2);
    }

    #[test]
    fn parses_full_document() {
        let config = EngineConfig::from_yaml(FULL_YAML).unwrap();
        assert_eq!(config.provider, Provider::Ollama);
        assert_eq!(config.ollama.timeout_secs, 60);
        assert_eq!(config.ollama.keep_alive.as_deref(), Some("5m"));
        assert_eq!(config.logging.level, "debug");
        assert!(config.logging.with_target);
        assert_eq!(config.pricing.len(), 2);
    }

    #[test]
    fn pricing_extends_and_overrides_defaults() {
        let table = EngineConfig::from_yaml(FULL_YAML).unwrap().cost_table();
        assert!(table.supports("llama3"));
        assert!(table.supports("gpt-4o-mini"));
        let (input, output) = table.cost_calculator(1_000_000, 1_000_000, "gpt-4o").unwrap();
        assert!((input - 4.0).abs() < 1e-9);
        assert!((output - 12.0).abs() < 1e-9);
    }

    #[test]
    fn rejects_invalid_values() {
        assert!(EngineConfig::from_yaml("model: ''").is_err());
        assert!(EngineConfig::from_yaml("openai: {timeout_secs: 0}").is_err());

        let mut config = EngineConfig::default();
        config.pricing.push(PricingEntry {
            model: "m".into(),
            input_per_million: -1.0,
            output_per_million: 1.0,
        });
        let err = config.validate().expect_err("negative price");
        assert!(err.to_string().contains("input_per_million"));
    }

    #[test]
    fn rejects_unknown_provider() {
        assert!(EngineConfig::from_yaml("provider: bedrock").is_err());
    }

    #[test]
    fn overrides_apply_when_present() {
        let vars: HashMap<&str, &str> =
            HashMap::from([(LLMKIT_MODEL_ENV, "o1-mini"), (LLMKIT_LOG_ENV, "")]);
        let mut config = EngineConfig::default();
        config.apply_overrides(|key| vars.get(key).map(|v| (*v).to_owned()));
        assert_eq!(config.model, "o1-mini");
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn load_reports_path_on_failure() {
        let err = EngineConfig::load("/no/such/llmkit.yaml").expect_err("missing");
        assert!(format!("{err:#}").contains("/no/such/llmkit.yaml"));
    }

    #[test]
    fn load_reads_file_and_builds_engine() {
        let mut units = tempfile::NamedTempFile::new().unwrap();
        units
            .write_all(b"units:\n  - {name: greet, content: 'Hello {name}'}\n")
            .unwrap();

        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "model: llama3\nprovider: ollama").unwrap();
        writeln!(file, "prompts_path: {}", units.path().display()).unwrap();

        let config = EngineConfig::load(file.path()).unwrap();
        let adapter = Arc::new(NullAdapter(AdapterMetadata::new("null", "other")));
        let engine = config.build_engine_with(adapter).unwrap();

        assert_eq!(engine.model(), "llama3");
        assert!(engine.units().contains("greet"));
    }

    #[test]
    fn builds_ollama_adapter() {
        let config = EngineConfig::from_yaml("provider: ollama\nmodel: llama3").unwrap();
        let adapter = config.build_adapter().unwrap();
        assert_eq!(adapter.metadata().provider(), "ollama");
        assert_eq!(adapter.metadata().model(), "llama3");
    }

    #[test]
    fn yaml_round_trips() {
        let config = EngineConfig::from_yaml(FULL_YAML).unwrap();
        let again = EngineConfig::from_yaml(&config.to_yaml().unwrap()).unwrap();
        assert_eq!(config, again);
    }
}
