use std::collections::HashMap;

use serde::Deserialize;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub agent: AgentConfig,
    pub chat: ChatConfig,
    pub llm: LlmConfig,
    #[serde(default)]
    pub permissions: PermissionsConfig,
    #[serde(default)]
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub skills: SkillsConfig,
    #[serde(default)]
    pub speech: SpeechConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AgentConfig {
    pub name: String,
    /// Actor ids allowed to talk to the agent at all; `"*"` admits anyone.
    pub allowed_actors: Vec<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChatConfig {
    /// Chat bus WebSocket endpoint, e.g. "ws://localhost:6700".
    pub url: String,
    /// Bearer token for the bus, if the gateway requires one.
    /// Supports ${ENV_VAR} substitution
    #[serde(default)]
    pub access_token: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LlmConfig {
    pub provider: String,
    pub model: String,
    /// Supports ${ENV_VAR} substitution
    pub api_key: String,
    #[serde(default = "default_max_tokens")]
    pub max_tokens_per_request: u32,
    /// Override for OpenAI-compatible servers (self-hosted gateways).
    #[serde(default)]
    pub base_url: Option<String>,
}

fn default_max_tokens() -> u32 {
    4096
}

// ── Permissions ──────────────────────────────────────────

#[derive(Debug, Deserialize, Clone, Default)]
pub struct PermissionsConfig {
    /// Actor id → granted permission nodes. Nodes support `*` and
    /// `prefix.*` wildcards.
    #[serde(default)]
    pub grants: HashMap<String, Vec<String>>,
    /// Nodes granted to every actor.
    #[serde(default)]
    pub default_nodes: Vec<String>,
}

// ── Command gateway ──────────────────────────────────────

/// One dangerous-command rule as written in the policy file.
#[derive(Debug, Deserialize, Clone)]
pub struct DangerousCommandConfig {
    pub pattern: String,
    pub warning: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct GatewayConfig {
    /// Master switch for /cmd; off by default.
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_require_permission")]
    pub require_permission: String,
    #[serde(default = "default_allowed_commands")]
    pub allowed_commands: Vec<String>,
    #[serde(default = "default_blocked_patterns")]
    pub blocked_patterns: Vec<String>,
    #[serde(default = "default_dangerous_commands")]
    pub dangerous_commands: Vec<DangerousCommandConfig>,
    /// Seconds; bounds [1, 300] enforced at gateway construction.
    #[serde(default = "default_max_execution_time")]
    pub max_execution_time: u64,
    /// Bytes; bounds [512, 16384] enforced at gateway construction.
    #[serde(default = "default_max_output_size")]
    pub max_output_size: usize,
    #[serde(default = "default_true")]
    pub require_confirmation: bool,
    /// How long a dangerous-command confirmation stays pending, seconds.
    #[serde(default = "default_confirmation_window")]
    pub confirmation_window_secs: u64,
    /// Empty list = unrestricted.
    #[serde(default)]
    pub allowed_users: Vec<String>,
    /// Empty list = unrestricted.
    #[serde(default)]
    pub allowed_groups: Vec<String>,
    #[serde(default = "default_true")]
    pub log_commands: bool,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        // A [gateway]-less config deserializes to the stock policy via
        // the per-field serde defaults.
        toml::from_str("").expect("default gateway config")
    }
}

fn default_require_permission() -> String {
    "cmd.exec".to_string()
}

fn default_allowed_commands() -> Vec<String> {
    [
        "ls", "pwd", "whoami", "date", "uname", "free", "df", "uptime", "top", "ps", "netstat",
        "ss", "ping", "curl",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

fn default_blocked_patterns() -> Vec<String> {
    [
        r"rm.*-rf.*(/|\*)",
        r".*\|\s*sh",
        r".*\|\s*bash",
        r"wget.*\|",
        r"curl.*\|",
        r".*>/dev/sd",
        r".*mkfs",
        r".*dd.*if=",
        r".*:\(\)\{.*:\|:&\};:",
        r"/etc/passwd",
        r"/etc/shadow",
        r"/proc",
        r"/sys",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

fn default_dangerous_commands() -> Vec<DangerousCommandConfig> {
    [
        ("^rm", "deletion may cause data loss"),
        ("^chmod", "permission changes can weaken host security"),
        ("^chown", "ownership changes can weaken host security"),
        ("^kill", "terminating processes can disrupt the host"),
        ("^reboot", "this restarts the whole host"),
        ("^shutdown", "this powers off the whole host"),
        ("^systemctl", "service management can disrupt the host"),
    ]
    .into_iter()
    .map(|(pattern, warning)| DangerousCommandConfig {
        pattern: pattern.to_string(),
        warning: warning.to_string(),
    })
    .collect()
}

fn default_max_execution_time() -> u64 {
    30
}

fn default_max_output_size() -> usize {
    4096
}

fn default_confirmation_window() -> u64 {
    60
}

fn default_true() -> bool {
    true
}

// ── Skills ───────────────────────────────────────────────

#[derive(Debug, Deserialize, Clone, Default)]
pub struct SkillsConfig {
    /// Present = registered.
    pub web_search: Option<WebSearchConfig>,
    pub codegen: Option<CodegenConfig>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct WebSearchConfig {
    /// "tavily" or "perplexity".
    pub provider: String,
    /// Supports ${ENV_VAR} substitution
    pub api_key: String,
    #[serde(default = "default_max_results")]
    pub max_results: u8,
    /// Provider model, where applicable (Perplexity).
    #[serde(default)]
    pub model: Option<String>,
    /// Summarize results with the configured LLM before replying.
    #[serde(default = "default_true")]
    pub summarize_results: bool,
    /// Characters, [100, 1000].
    #[serde(default = "default_max_summary_length")]
    pub max_summary_length: u32,
}

fn default_max_results() -> u8 {
    5
}

fn default_max_summary_length() -> u32 {
    500
}

#[derive(Debug, Deserialize, Clone)]
pub struct CodegenConfig {
    #[serde(default = "default_codegen_permission")]
    pub require_permission: String,
    #[serde(default = "default_language")]
    pub default_language: String,
    #[serde(default = "default_allowed_languages")]
    pub allowed_languages: Vec<String>,
    /// Characters of generated code requested from the model, [500, 5000].
    #[serde(default = "default_max_code_length")]
    pub max_code_length: u32,
    #[serde(default = "default_true")]
    pub include_explanations: bool,
    /// "simple", "balanced" or "optimized".
    #[serde(default = "default_optimization_level")]
    pub optimization_level: String,
    #[serde(default)]
    pub include_tests: bool,
    /// Adds anti-abuse requirements to every prompt.
    #[serde(default = "default_true")]
    pub safe_mode: bool,
}

fn default_codegen_permission() -> String {
    "codegen.use".to_string()
}

fn default_language() -> String {
    "python".to_string()
}

fn default_allowed_languages() -> Vec<String> {
    [
        "python", "javascript", "typescript", "java", "cpp", "c", "bash", "shell", "go", "rust",
        "php", "ruby", "swift", "kotlin", "scala", "r", "sql",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

fn default_max_code_length() -> u32 {
    2000
}

fn default_optimization_level() -> String {
    "balanced".to_string()
}

// ── Speech (configuration-only glue) ─────────────────────

/// Speech transcription/synthesis settings. The audio pipeline itself is
/// an external collaborator; the section is carried so a deployment
/// configures it in one place and gets its bounds checked at startup.
#[derive(Debug, Deserialize, Clone)]
pub struct SpeechConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_stt_provider")]
    pub stt_provider: String,
    #[serde(default = "default_stt_model")]
    pub stt_model: String,
    /// "auto" detects the language.
    #[serde(default = "default_stt_language")]
    pub stt_language: String,
    /// Seconds, [10, 300].
    #[serde(default = "default_max_audio_duration")]
    pub max_audio_duration: u64,
    /// Seconds, [10, 60].
    #[serde(default = "default_max_recognition_time")]
    pub max_recognition_time: u64,
    #[serde(default = "default_tts_provider")]
    pub tts_provider: String,
    #[serde(default = "default_tts_model")]
    pub tts_model: String,
    #[serde(default = "default_tts_voice")]
    pub tts_voice: String,
    /// Rate multiplier, [0.5, 2.0].
    #[serde(default = "default_tts_speed")]
    pub tts_speed: f64,
    /// Characters, [100, 2000].
    #[serde(default = "default_max_tts_length")]
    pub max_tts_length: u32,
}

impl Default for SpeechConfig {
    fn default() -> Self {
        toml::from_str("").expect("default speech config")
    }
}

fn default_stt_provider() -> String {
    "whisper".to_string()
}

fn default_stt_model() -> String {
    "whisper-1".to_string()
}

fn default_stt_language() -> String {
    "auto".to_string()
}

fn default_max_audio_duration() -> u64 {
    60
}

fn default_max_recognition_time() -> u64 {
    30
}

fn default_tts_provider() -> String {
    "openai".to_string()
}

fn default_tts_model() -> String {
    "tts-1".to_string()
}

fn default_tts_voice() -> String {
    "alloy".to_string()
}

fn default_tts_speed() -> f64 {
    1.0
}

fn default_max_tts_length() -> u32 {
    1000
}

// ── Loading & validation ─────────────────────────────────

impl Config {
    pub fn load(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        // Expand environment variables like ${ANTHROPIC_API_KEY}
        let expanded = shellexpand::env(&content)?;
        let config: Config = toml::from_str(&expanded)?;
        config.validate()?;
        Ok(config)
    }

    /// Glue-level bounds checks. Gateway limits and patterns are
    /// validated separately by `CommandGateway::new`.
    fn validate(&self) -> anyhow::Result<()> {
        let url = url::Url::parse(&self.chat.url)
            .map_err(|e| anyhow::anyhow!("invalid chat.url '{}': {e}", self.chat.url))?;
        if !matches!(url.scheme(), "ws" | "wss") {
            anyhow::bail!("chat.url must use ws:// or wss://, got '{}'", url.scheme());
        }

        if let Some(ref search) = self.skills.web_search {
            if !(1..=20).contains(&search.max_results) {
                anyhow::bail!("skills.web_search.max_results must be within [1, 20]");
            }
            if !(100..=1000).contains(&search.max_summary_length) {
                anyhow::bail!("skills.web_search.max_summary_length must be within [100, 1000]");
            }
        }

        if let Some(ref codegen) = self.skills.codegen {
            if !(500..=5000).contains(&codegen.max_code_length) {
                anyhow::bail!("skills.codegen.max_code_length must be within [500, 5000]");
            }
            if !["simple", "balanced", "optimized"].contains(&codegen.optimization_level.as_str())
            {
                anyhow::bail!(
                    "skills.codegen.optimization_level must be simple, balanced or optimized"
                );
            }
        }

        if !(10..=300).contains(&self.speech.max_audio_duration) {
            anyhow::bail!("speech.max_audio_duration must be within [10, 300]");
        }
        if !(10..=60).contains(&self.speech.max_recognition_time) {
            anyhow::bail!("speech.max_recognition_time must be within [10, 60]");
        }
        if !(0.5..=2.0).contains(&self.speech.tts_speed) {
            anyhow::bail!("speech.tts_speed must be within [0.5, 2.0]");
        }
        if !(100..=2000).contains(&self.speech.max_tts_length) {
            anyhow::bail!("speech.max_tts_length must be within [100, 2000]");
        }

        Ok(())
    }

    /// Checks whether an actor may talk to the agent at all.
    pub fn is_actor_allowed(&self, actor_id: &str) -> bool {
        self.agent
            .allowed_actors
            .iter()
            .any(|allowed| allowed == actor_id || allowed == "*")
    }
}
