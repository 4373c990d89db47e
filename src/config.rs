use anyhow::{Context, Result};
use draftdesk_core::vectorize::Tokenizer;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub corpus: CorpusConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub live: LiveConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct CorpusConfig {
    #[serde(default = "default_completed_dir")]
    pub completed_dir: PathBuf,
    #[serde(default = "default_drafts_dir")]
    pub drafts_dir: PathBuf,
}

impl Default for CorpusConfig {
    fn default() -> Self {
        Self {
            completed_dir: default_completed_dir(),
            drafts_dir: default_drafts_dir(),
        }
    }
}

fn default_completed_dir() -> PathBuf {
    PathBuf::from("data/completed")
}
fn default_drafts_dir() -> PathBuf {
    PathBuf::from("data/drafts")
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    #[serde(default)]
    pub min_score: f64,
    #[serde(default = "default_tokenizer")]
    pub tokenizer: String,
    #[serde(default = "default_ngram_min")]
    pub ngram_min: usize,
    #[serde(default = "default_ngram_max")]
    pub ngram_max: usize,
    #[serde(default = "default_max_features")]
    pub max_features: Option<usize>,
    #[serde(default = "default_snippet_chars")]
    pub snippet_chars: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            min_score: 0.0,
            tokenizer: default_tokenizer(),
            ngram_min: default_ngram_min(),
            ngram_max: default_ngram_max(),
            max_features: default_max_features(),
            snippet_chars: default_snippet_chars(),
        }
    }
}

impl RetrievalConfig {
    /// The tokenizer shared by corpus indexing and queries.
    pub fn tokenizer(&self) -> Tokenizer {
        match self.tokenizer.as_str() {
            "char_ngrams" => Tokenizer::CharNgrams {
                min: self.ngram_min,
                max: self.ngram_max,
            },
            _ => Tokenizer::Words,
        }
    }
}

fn default_top_k() -> usize {
    5
}
fn default_tokenizer() -> String {
    "words".to_string()
}
fn default_ngram_min() -> usize {
    2
}
fn default_ngram_max() -> usize {
    4
}
fn default_max_features() -> Option<usize> {
    Some(5000)
}
fn default_snippet_chars() -> usize {
    200
}

#[derive(Debug, Deserialize, Clone)]
pub struct LiveConfig {
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
}

impl Default for LiveConfig {
    fn default() -> Self {
        Self {
            debounce_ms: default_debounce_ms(),
        }
    }
}

impl LiveConfig {
    pub fn window(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}

fn default_debounce_ms() -> u64 {
    500
}

#[derive(Debug, Deserialize, Clone)]
pub struct LlmConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default = "default_api_version")]
    pub api_version: String,
    #[serde(default = "default_temperature")]
    pub temperature: f64,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_history_turns")]
    pub history_turns: usize,
    #[serde(default)]
    pub prompt_dir: Option<PathBuf>,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: default_model(),
            endpoint: None,
            api_version: default_api_version(),
            temperature: default_temperature(),
            timeout_secs: default_timeout_secs(),
            max_retries: default_max_retries(),
            history_turns: default_history_turns(),
            prompt_dir: None,
        }
    }
}

impl LlmConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

fn default_provider() -> String {
    "disabled".to_string()
}
fn default_model() -> String {
    "gpt-4o-mini".to_string()
}
fn default_api_version() -> String {
    "2024-12-01-preview".to_string()
}
fn default_temperature() -> f64 {
    1.0
}
fn default_timeout_secs() -> u64 {
    60
}
fn default_max_retries() -> u32 {
    3
}
fn default_history_turns() -> usize {
    10
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:5000".to_string()
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

pub fn validate(config: &Config) -> Result<()> {
    // Validate retrieval
    let retrieval = &config.retrieval;
    if retrieval.top_k < 1 {
        anyhow::bail!("retrieval.top_k must be >= 1");
    }
    if !(0.0..=1.0).contains(&retrieval.min_score) {
        anyhow::bail!("retrieval.min_score must be in [0.0, 1.0]");
    }
    match retrieval.tokenizer.as_str() {
        "words" => {}
        "char_ngrams" => {
            if retrieval.ngram_min < 1 || retrieval.ngram_min > retrieval.ngram_max {
                anyhow::bail!("retrieval.ngram_min must be >= 1 and <= retrieval.ngram_max");
            }
        }
        other => anyhow::bail!(
            "Unknown tokenizer: '{}'. Must be words or char_ngrams.",
            other
        ),
    }
    if retrieval.max_features == Some(0) {
        anyhow::bail!("retrieval.max_features must be > 0 when set");
    }

    // Validate live search
    if config.live.debounce_ms == 0 {
        anyhow::bail!("live.debounce_ms must be > 0");
    }

    // Validate llm
    match config.llm.provider.as_str() {
        "disabled" | "openai" => {}
        "azure" => {
            if config.llm.endpoint.is_none() {
                anyhow::bail!("llm.endpoint must be specified when provider is 'azure'");
            }
        }
        other => anyhow::bail!(
            "Unknown llm provider: '{}'. Must be disabled, openai, or azure.",
            other
        ),
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(toml_str: &str) -> Result<Config> {
        let config: Config = toml::from_str(toml_str)?;
        validate(&config)?;
        Ok(config)
    }

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = parse("").unwrap();
        assert_eq!(config.retrieval.top_k, 5);
        assert_eq!(config.retrieval.max_features, Some(5000));
        assert_eq!(config.retrieval.tokenizer(), Tokenizer::Words);
        assert_eq!(config.live.window(), Duration::from_millis(500));
        assert_eq!(config.llm.api_version, "2024-12-01-preview");
        assert!(!config.llm.is_enabled());
        assert_eq!(config.server.bind, "127.0.0.1:5000");
    }

    #[test]
    fn test_char_ngram_tokenizer() {
        let config = parse(
            r#"
[retrieval]
tokenizer = "char_ngrams"
ngram_min = 2
ngram_max = 3
"#,
        )
        .unwrap();
        assert_eq!(
            config.retrieval.tokenizer(),
            Tokenizer::CharNgrams { min: 2, max: 3 }
        );
    }

    #[test]
    fn test_rejects_inverted_ngram_range() {
        let err = parse(
            r#"
[retrieval]
tokenizer = "char_ngrams"
ngram_min = 4
ngram_max = 2
"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("ngram_min"));
    }

    #[test]
    fn test_rejects_zero_top_k() {
        assert!(parse("[retrieval]\ntop_k = 0\n").is_err());
    }

    #[test]
    fn test_rejects_unknown_provider() {
        let err = parse("[llm]\nprovider = \"bard\"\n").unwrap_err();
        assert!(err.to_string().contains("Unknown llm provider"));
    }

    #[test]
    fn test_azure_requires_endpoint() {
        assert!(parse("[llm]\nprovider = \"azure\"\n").is_err());
        assert!(parse(
            "[llm]\nprovider = \"azure\"\nendpoint = \"https://example.openai.azure.com\"\n"
        )
        .is_ok());
    }

    #[test]
    fn test_rejects_zero_debounce() {
        assert!(parse("[live]\ndebounce_ms = 0\n").is_err());
    }

    #[test]
    fn test_example_config_is_valid() {
        let config = parse(include_str!("../config/draftdesk.example.toml")).unwrap();
        assert_eq!(config.corpus.drafts_dir, PathBuf::from("./data/drafts"));
        assert_eq!(config.llm.provider, "disabled");
    }
}
