//! Builtin skill: LLM-backed code generation (`/code`).
//!
//! Parses `--language=`, `--template=` and `--features=` flags out of the
//! request, builds a prompt from the named template, and asks the
//! configured LLM with a low temperature. The reply separates fenced code
//! from the surrounding explanation.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, warn};

use crate::config::CodegenConfig;
use crate::llm::{CompletionOptions, LlmClient, Message};
use crate::permissions::PermissionSet;
use crate::skills::{Skill, SkillContext};

/// Code generation runs cold: we want reproducible, conservative output.
const CODEGEN_TEMPERATURE: f32 = 0.1;

/// Explanations are capped in the chat reply.
const MAX_EXPLANATION_CHARS: usize = 500;

/// A named prompt template. `{language}`, `{description}` and
/// `{features}` are substituted before the LLM call.
struct CodeTemplate {
    name: &'static str,
    prompt: &'static str,
}

const TEMPLATES: &[CodeTemplate] = &[
    CodeTemplate {
        name: "function",
        prompt: "Write a {language} function for this requirement:\n\n\
                 Requirement: {description}\n\nFeatures:\n{features}\n\n\
                 Requirements:\n1. Handle errors appropriately\n\
                 2. Document the function\n3. Validate inputs",
    },
    CodeTemplate {
        name: "class",
        prompt: "Write a {language} class for this requirement:\n\n\
                 Requirement: {description}\n\nFeatures:\n{features}\n\n\
                 Requirements:\n1. Follow object-oriented design\n\
                 2. Include appropriate fields and methods\n\
                 3. Provide a constructor\n4. Document the class",
    },
    CodeTemplate {
        name: "script",
        prompt: "Write a complete {language} script for this requirement:\n\n\
                 Requirement: {description}\n\nFeatures:\n{features}\n\n\
                 Requirements:\n1. Provide a command-line interface\n\
                 2. Include usage instructions\n3. Handle error cases",
    },
    CodeTemplate {
        name: "api",
        prompt: "Write a {language} API endpoint for this requirement:\n\n\
                 Requirement: {description}\n\nFeatures:\n{features}\n\n\
                 Requirements:\n1. REST style\n2. Handle errors\n\
                 3. Include authentication hooks\n4. Log requests",
    },
];

/// Flags parsed out of the raw `/code` argument text.
#[derive(Debug, PartialEq, Eq)]
struct CodegenRequest {
    description: String,
    language: Option<String>,
    template: String,
    features: String,
}

/// Splits the argument text shell-style and pulls out `--key=value`
/// flags; everything else is the description. Quote-aware, so
/// `--features="a b"` works. Unbalanced quotes fall back to whitespace
/// splitting rather than failing the request.
fn parse_request(raw: &str) -> CodegenRequest {
    let words = shell_words::split(raw)
        .unwrap_or_else(|_| raw.split_whitespace().map(String::from).collect());

    let mut request = CodegenRequest {
        description: String::new(),
        language: None,
        template: "function".to_string(),
        features: String::new(),
    };

    let mut description_words = Vec::new();
    for word in words {
        if let Some(value) = word.strip_prefix("--language=") {
            request.language = Some(value.to_lowercase());
        } else if let Some(value) = word.strip_prefix("--template=") {
            request.template = value.to_lowercase();
        } else if let Some(value) = word.strip_prefix("--features=") {
            request.features = value.to_string();
        } else {
            description_words.push(word);
        }
    }
    request.description = description_words.join(" ");
    request
}

/// Splits an LLM reply into (code, explanation) on fenced blocks. With no
/// fence at all, the whole reply is treated as code.
fn split_generated(content: &str) -> (String, String) {
    let mut code_lines = Vec::new();
    let mut explanation_lines = Vec::new();
    let mut in_code_block = false;

    for line in content.lines() {
        if line.trim_start().starts_with("```") {
            in_code_block = !in_code_block;
            continue;
        }
        if in_code_block {
            code_lines.push(line);
        } else {
            explanation_lines.push(line);
        }
    }

    let code = code_lines.join("\n");
    if code.is_empty() {
        (content.to_string(), String::new())
    } else {
        (code, explanation_lines.join("\n").trim().to_string())
    }
}

pub struct CodegenSkill {
    config: CodegenConfig,
    llm: Arc<dyn LlmClient>,
    permissions: Arc<PermissionSet>,
}

impl CodegenSkill {
    pub fn new(
        config: CodegenConfig,
        llm: Arc<dyn LlmClient>,
        permissions: Arc<PermissionSet>,
    ) -> Self {
        Self {
            config,
            llm,
            permissions,
        }
    }

    fn build_prompt(&self, template: &CodeTemplate, request: &CodegenRequest, language: &str) -> String {
        let mut prompt = template
            .prompt
            .replace("{language}", language)
            .replace("{description}", &request.description)
            .replace("{features}", &request.features);

        match self.config.optimization_level.as_str() {
            "simple" => prompt.push_str("\n\nOptimization: favor simple, readable code."),
            "optimized" => prompt.push_str("\n\nOptimization: favor efficient, performant code."),
            _ => prompt.push_str("\n\nOptimization: balance readability and performance."),
        }

        if self.config.include_tests {
            prompt.push_str("\n\nAlso include unit tests.");
        }

        if self.config.safe_mode {
            prompt.push_str(
                "\n\nSafety requirements:\n\
                 1. Never produce malicious code\n\
                 2. Never produce code that damages the host system\n\
                 3. Handle every failure case\n\
                 4. Validate all user input",
            );
        }

        prompt
    }

    fn system_prompt(&self, language: &str) -> String {
        let mut prompt = format!("You are an expert {language} code generator. ");
        if self.config.include_explanations {
            prompt.push_str(
                "Provide: complete runnable code, a concise explanation, \
                 a usage example, and any caveats.",
            );
        } else {
            prompt.push_str("Produce only code, with no extra explanation.");
        }
        prompt
    }
}

#[async_trait]
impl Skill for CodegenSkill {
    fn name(&self) -> &str {
        "codegen"
    }

    fn description(&self) -> &str {
        "Generate code from a description, in any allowed language"
    }

    fn usage(&self) -> &str {
        "/code [--language=<lang>] [--template=function|class|script|api] [--features=<extras>] <description>"
    }

    async fn execute(&self, params: Value, context: &SkillContext) -> anyhow::Result<String> {
        let raw = params
            .get("request")
            .and_then(|v| v.as_str())
            .ok_or_else(|| anyhow::anyhow!("Missing 'request' parameter"))?;

        let node = &self.config.require_permission;
        if !self.permissions.is_granted(&context.actor_id, node) {
            return Ok(format!(
                "You lack the '{node}' permission required to generate code."
            ));
        }

        let request = parse_request(raw);
        if request.description.is_empty() {
            return Ok(format!("Describe what to generate, e.g.\n{}", self.usage()));
        }

        let language = request
            .language
            .clone()
            .unwrap_or_else(|| self.config.default_language.clone());
        if !self.config.allowed_languages.contains(&language) {
            return Ok(format!("Unsupported language: {language}"));
        }

        let Some(template) = TEMPLATES.iter().find(|t| t.name == request.template) else {
            return Ok(format!("Unsupported template: {}", request.template));
        };

        let prompt = self.build_prompt(template, &request, &language);
        let options = CompletionOptions {
            max_tokens: Some(self.config.max_code_length.min(2000)),
            temperature: Some(CODEGEN_TEMPERATURE),
        };

        debug!(actor = %context.actor_id, %language, template = template.name, "generating code");

        let response = match self
            .llm
            .complete(&self.system_prompt(&language), &[Message::user(prompt)], &options)
            .await
        {
            Ok(response) => response,
            Err(e) => {
                warn!("code generation failed: {e}");
                return Ok(format!("Code generation failed: {e}"));
            }
        };

        if response.text.is_empty() {
            return Ok("Code generation failed: the model returned nothing.".to_string());
        }

        let (code, explanation) = split_generated(&response.text);

        let mut reply = format!(
            "✅ generated {language} code (template: {})\n```{language}\n{code}\n```",
            template.name
        );
        if self.config.include_explanations && !explanation.is_empty() {
            let mut explanation = explanation;
            if explanation.len() > MAX_EXPLANATION_CHARS {
                let mut cut = MAX_EXPLANATION_CHARS;
                while !explanation.is_char_boundary(cut) {
                    cut -= 1;
                }
                explanation.truncate(cut);
                explanation.push_str("…");
            }
            reply.push_str(&format!("\n\n💡 {explanation}"));
        }

        Ok(reply)
    }
}
