use crate::core::merge::DEFAULT_MAX_SKILLS_PER_JOB;
use crate::domain::ports::PromptConfig;
use crate::utils::error::{CanonError, Result};
use crate::utils::validation::{self, Validate};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::LazyLock;
use std::time::Duration;

static ENV_VAR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\$\{([^}]+)\}").expect("env var pattern")
});

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    pub generation: GenerationConfig,
    pub prompts: PromptsConfig,
    #[serde(default)]
    pub batch: BatchConfig,
    #[serde(default)]
    pub taxonomy: TaxonomyConfig,
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(default)]
    pub store: StoreConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationConfig {
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    pub api_key: String,
    pub timeout_seconds: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptsConfig {
    pub validation: PromptSettings,
    pub merge: PromptSettings,
}

/// 單一流程的 prompt 設定；`system_prompt` 與 `prompt_file` 擇一
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptSettings {
    pub model: String,
    pub system_prompt: Option<String>,
    pub prompt_file: Option<String>,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default)]
    pub thinking_mode: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchConfig {
    #[serde(default = "default_inter_job_delay_ms")]
    pub inter_job_delay_ms: u64,
    #[serde(default = "default_max_skills_per_job")]
    pub max_skills_per_job: usize,
    #[serde(default = "default_true")]
    pub reject_unknown_ids: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaxonomyConfig {
    pub path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    pub path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    pub path: String,
}

fn default_endpoint() -> String {
    crate::adapters::gemini::DEFAULT_ENDPOINT.to_string()
}

fn default_max_tokens() -> u32 {
    2048
}

fn default_temperature() -> f32 {
    0.1
}

fn default_inter_job_delay_ms() -> u64 {
    1000
}

fn default_max_skills_per_job() -> usize {
    DEFAULT_MAX_SKILLS_PER_JOB
}

fn default_true() -> bool {
    true
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            inter_job_delay_ms: default_inter_job_delay_ms(),
            max_skills_per_job: default_max_skills_per_job(),
            reject_unknown_ids: true,
        }
    }
}

impl Default for TaxonomyConfig {
    fn default() -> Self {
        Self {
            path: "data/taxonomy.toml".to_string(),
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            path: "./output".to_string(),
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: "./output/interactions.jsonl".to_string(),
        }
    }
}

impl PromptSettings {
    /// 解析出實際的 system prompt 並組成 PromptConfig
    pub fn to_prompt_config(&self, field: &str) -> Result<PromptConfig> {
        let system_prompt = match (&self.system_prompt, &self.prompt_file) {
            (Some(prompt), _) => prompt.clone(),
            (None, Some(file)) => std::fs::read_to_string(file).map_err(|e| {
                CanonError::InvalidConfigValueError {
                    field: format!("{}.prompt_file", field),
                    value: file.clone(),
                    reason: format!("Cannot read prompt file: {}", e),
                }
            })?,
            (None, None) => {
                return Err(CanonError::MissingConfigError {
                    field: format!("{}.system_prompt", field),
                })
            }
        };

        Ok(PromptConfig {
            system_prompt,
            model: self.model.clone(),
            max_tokens: self.max_tokens,
            temperature: self.temperature,
            thinking_mode: self.thinking_mode,
        })
    }

    fn validate_as(&self, field: &str) -> Result<()> {
        validation::validate_non_empty_string(&format!("{}.model", field), &self.model)?;
        validation::validate_positive_number(
            &format!("{}.max_tokens", field),
            self.max_tokens as usize,
            1,
        )?;
        validation::validate_range(&format!("{}.temperature", field), self.temperature, 0.0, 2.0)?;

        if let Some(file) = &self.prompt_file {
            validation::validate_path(&format!("{}.prompt_file", field), file)?;
        }
        if self.system_prompt.is_none() && self.prompt_file.is_none() {
            return Err(CanonError::MissingConfigError {
                field: format!("{}.system_prompt", field),
            });
        }
        Ok(())
    }
}

impl RunConfig {
    /// 從 TOML 檔案載入配置
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path)?;
        Self::from_toml_str(&content)
    }

    /// 從 TOML 字串解析配置
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let processed_content = Self::substitute_env_vars(content);

        toml::from_str(&processed_content).map_err(|e| CanonError::ConfigValidationError {
            field: "toml_parsing".to_string(),
            message: format!("TOML parsing error: {}", e),
        })
    }

    /// 替換環境變數 (例如 ${GEMINI_API_KEY})，未設定的保留原樣
    fn substitute_env_vars(content: &str) -> String {
        ENV_VAR
            .replace_all(content, |caps: &regex::Captures| {
                let var_name = &caps[1];
                std::env::var(var_name).unwrap_or_else(|_| format!("${{{}}}", var_name))
            })
            .to_string()
    }

    pub fn api_key(&self) -> Result<&str> {
        let key = self.generation.api_key.trim();
        if key.is_empty() || ENV_VAR.is_match(key) {
            return Err(CanonError::MissingConfigError {
                field: "generation.api_key".to_string(),
            });
        }
        Ok(key)
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        self.generation.timeout_seconds.map(Duration::from_secs)
    }

    pub fn inter_job_delay(&self) -> Duration {
        Duration::from_millis(self.batch.inter_job_delay_ms)
    }

    pub fn validation_prompt(&self) -> Result<PromptConfig> {
        self.prompts.validation.to_prompt_config("prompts.validation")
    }

    pub fn merge_prompt(&self) -> Result<PromptConfig> {
        self.prompts.merge.to_prompt_config("prompts.merge")
    }
}

impl Validate for RunConfig {
    fn validate(&self) -> Result<()> {
        validation::validate_url("generation.endpoint", &self.generation.endpoint)?;
        self.api_key()?;
        if let Some(timeout) = self.generation.timeout_seconds {
            validation::validate_positive_number(
                "generation.timeout_seconds",
                timeout as usize,
                1,
            )?;
        }

        self.prompts.validation.validate_as("prompts.validation")?;
        self.prompts.merge.validate_as("prompts.merge")?;

        validation::validate_positive_number(
            "batch.max_skills_per_job",
            self.batch.max_skills_per_job,
            1,
        )?;

        validation::validate_path("taxonomy.path", &self.taxonomy.path)?;
        validation::validate_path("output.path", &self.output.path)?;
        validation::validate_path("store.path", &self.store.path)?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const BASIC: &str = r#"
[generation]
api_key = "secret"

[prompts.validation]
model = "gemini-2.5-pro"
system_prompt = "Validate the skills"
thinking_mode = true

[prompts.merge]
model = "gemini-2.5-flash"
system_prompt = "Merge the skills"
"#;

    #[test]
    fn test_parse_basic_config_with_defaults() {
        let config = RunConfig::from_toml_str(BASIC).unwrap();

        assert_eq!(
            config.generation.endpoint,
            "https://generativelanguage.googleapis.com/v1beta"
        );
        assert_eq!(config.batch.inter_job_delay_ms, 1000);
        assert_eq!(config.batch.max_skills_per_job, 150);
        assert!(config.batch.reject_unknown_ids);
        assert_eq!(config.taxonomy.path, "data/taxonomy.toml");
        assert!(config.validate().is_ok());

        let prompt = config.merge_prompt().unwrap();
        assert_eq!(prompt.model, "gemini-2.5-flash");
        assert_eq!(prompt.max_tokens, 2048);
        assert!(!prompt.thinking_mode);
    }

    #[test]
    fn test_env_var_substitution() {
        std::env::set_var("SKILL_CANON_TEST_KEY", "from-env");

        let toml_content = BASIC.replace("\"secret\"", "\"${SKILL_CANON_TEST_KEY}\"");
        let config = RunConfig::from_toml_str(&toml_content).unwrap();
        assert_eq!(config.api_key().unwrap(), "from-env");

        std::env::remove_var("SKILL_CANON_TEST_KEY");
    }

    #[test]
    fn test_unresolved_api_key_is_missing() {
        let toml_content = BASIC.replace("\"secret\"", "\"${SKILL_CANON_UNSET_VARIABLE}\"");
        let config = RunConfig::from_toml_str(&toml_content).unwrap();

        assert!(matches!(
            config.validate(),
            Err(CanonError::MissingConfigError { .. })
        ));
    }

    #[test]
    fn test_invalid_values_rejected() {
        let bad_endpoint = BASIC.replace(
            "[generation]\n",
            "[generation]\nendpoint = \"ftp://example.com\"\n",
        );
        assert!(RunConfig::from_toml_str(&bad_endpoint)
            .unwrap()
            .validate()
            .is_err());

        let mut config = RunConfig::from_toml_str(BASIC).unwrap();
        config.batch.max_skills_per_job = 0;
        assert!(config.validate().is_err());

        let mut config = RunConfig::from_toml_str(BASIC).unwrap();
        config.prompts.merge.temperature = 3.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_prompt_file_loaded() {
        let mut prompt_file = NamedTempFile::new().unwrap();
        prompt_file.write_all(b"You merge skills.").unwrap();

        let mut config = RunConfig::from_toml_str(BASIC).unwrap();
        config.prompts.merge.system_prompt = None;
        config.prompts.merge.prompt_file = Some(prompt_file.path().to_str().unwrap().to_string());

        assert_eq!(config.merge_prompt().unwrap().system_prompt, "You merge skills.");
    }

    #[test]
    fn test_config_from_file() {
        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(BASIC.as_bytes()).unwrap();

        let config = RunConfig::from_file(temp_file.path()).unwrap();
        assert_eq!(config.prompts.validation.model, "gemini-2.5-pro");
    }

    #[test]
    fn test_broken_toml() {
        assert!(matches!(
            RunConfig::from_toml_str("[generation"),
            Err(CanonError::ConfigValidationError { .. })
        ));
    }
}
