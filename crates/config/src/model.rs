//! Model table: one parametrized record per supported model id.
//!
//! Every completion goes through a single code path that looks up the
//! matching [`ModelConfig`] and applies it to the request. Unknown ids get
//! the base record.

use chatmesh_core::provider::ProviderRequest;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Sampling parameters. `None` leaves the provider default in place.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelKwargs {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,
}

impl ModelKwargs {
    /// `self` with any field set in `overrides` replaced.
    pub fn merged(&self, overrides: &ModelKwargs) -> ModelKwargs {
        ModelKwargs {
            max_tokens: overrides.max_tokens.or(self.max_tokens),
            temperature: overrides.temperature.or(self.temperature),
            top_p: overrides.top_p.or(self.top_p),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelConfig {
    pub model_id: String,

    #[serde(default)]
    pub default_model_kwargs: ModelKwargs,

    /// Whether the model accepts "must call some tool" as a tool choice
    #[serde(default = "default_true")]
    pub enable_any_tool_choice: bool,

    /// Whether the model accepts a prefilled assistant turn
    #[serde(default = "default_true")]
    pub enable_prefill: bool,
}

fn default_true() -> bool {
    true
}

impl ModelConfig {
    fn with_base(model_id: &str, base: &ModelConfig) -> Self {
        Self {
            model_id: model_id.to_string(),
            ..base.clone()
        }
    }

    fn without_any_tool_choice(mut self) -> Self {
        self.enable_any_tool_choice = false;
        self
    }

    fn without_prefill(mut self) -> Self {
        self.enable_prefill = false;
        self
    }

    /// Stamp model id and sampling parameters onto a request.
    ///
    /// Per-call `overrides` win over the table's defaults.
    pub fn apply(&self, request: &mut ProviderRequest, overrides: &ModelKwargs) {
        let kwargs = self.default_model_kwargs.merged(overrides);
        request.model = self.model_id.clone();
        if let Some(t) = kwargs.temperature {
            request.temperature = t;
        }
        request.max_tokens = kwargs.max_tokens.or(request.max_tokens);
        request.top_p = kwargs.top_p.or(request.top_p);
    }
}

/// Model records keyed by model id, with a base fallback.
#[derive(Debug, Clone)]
pub struct ModelTable {
    base: ModelConfig,
    models: HashMap<String, ModelConfig>,
}

impl ModelTable {
    /// Base record for ids the table doesn't know.
    pub fn base() -> ModelConfig {
        ModelConfig {
            model_id: "anthropic.claude-3-sonnet-20240229-v1:0".into(),
            default_model_kwargs: ModelKwargs {
                max_tokens: Some(1000),
                temperature: Some(0.01),
                top_p: Some(0.9),
            },
            enable_any_tool_choice: true,
            enable_prefill: true,
        }
    }

    /// The table of models known out of the box.
    pub fn builtin() -> Self {
        let base = Self::base();
        let mut table = Self {
            base: base.clone(),
            models: HashMap::new(),
        };

        for id in [
            "anthropic.claude-3-sonnet-20240229-v1:0",
            "anthropic.claude-3-haiku-20240307-v1:0",
            "anthropic.claude-3-5-sonnet-20241022-v2:0",
            "anthropic.claude-3-5-haiku-20241022-v1:0",
            "us.anthropic.claude-3-5-sonnet-20241022-v2:0",
            "gpt-4o",
            "gpt-4o-mini",
        ] {
            table.insert(ModelConfig::with_base(id, &base));
        }

        for id in ["us.amazon.nova-pro-v1:0", "us.amazon.nova-lite-v1:0", "us.amazon.nova-micro-v1:0"] {
            table.insert(
                ModelConfig::with_base(id, &base)
                    .without_any_tool_choice()
                    .without_prefill(),
            );
        }

        for id in ["meta.llama3-1-70b-instruct-v1:0", "us.meta.llama3-2-90b-instruct-v1:0"] {
            table.insert(
                ModelConfig::with_base(id, &base)
                    .without_any_tool_choice()
                    .without_prefill(),
            );
        }

        table.insert(ModelConfig::with_base("mistral.mistral-large-2407-v1:0", &base).without_prefill());
        table.insert(ModelConfig {
            model_id: "mistral.mixtral-8x7b-instruct-v0:1".into(),
            default_model_kwargs: ModelKwargs {
                max_tokens: Some(4096),
                temperature: Some(0.01),
                top_p: None,
            },
            enable_any_tool_choice: true,
            enable_prefill: true,
        });

        for id in ["deepseek-ai/DeepSeek-R1", "deepseek-ai/DeepSeek-V3", "qwen2.5-72b-instruct"] {
            table.insert(ModelConfig::with_base(id, &base).without_prefill());
        }

        table
    }

    /// Add or replace a record.
    pub fn insert(&mut self, config: ModelConfig) {
        self.models.insert(config.model_id.clone(), config);
    }

    /// The record for `model_id`, or the base record renamed to it.
    pub fn resolve(&self, model_id: &str) -> ModelConfig {
        match self.models.get(model_id) {
            Some(config) => config.clone(),
            None => {
                tracing::debug!(model_id, "Model not in table, using base config");
                ModelConfig::with_base(model_id, &self.base)
            }
        }
    }

    pub fn contains(&self, model_id: &str) -> bool {
        self.models.contains_key(model_id)
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }
}

impl Default for ModelTable {
    fn default() -> Self {
        Self::builtin()
    }
}
