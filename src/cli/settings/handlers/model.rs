//! Model-name settings.

use crate::cli::settings::error::SettingError;
use crate::cli::settings::helpers::{mutate_config_with_message, success_set, success_unset};
use crate::cli::settings::{SetContext, SettingHandler};
use crate::core::config::data::{
    Config, DEFAULT_GEMINI_MODEL, DEFAULT_HELPER_MODEL_GEMINI, DEFAULT_HELPER_MODEL_OPENAI,
    DEFAULT_OPENAI_CHAT_MODEL, DEFAULT_OPENAI_IMAGE_MODEL,
};

/// Data-driven handler for settings that hold a model name.
pub struct ModelHandler {
    key: &'static str,
    example: &'static str,
    default_display: &'static str,
    get: fn(&Config) -> Option<&String>,
    set_field: fn(&mut Config, Option<String>),
}

impl SettingHandler for ModelHandler {
    fn key(&self) -> &'static str {
        self.key
    }

    fn set(&self, args: &[String], ctx: &SetContext<'_>) -> Result<String, SettingError> {
        let model = args.join(" ").trim().to_string();
        if model.is_empty() {
            return Err(SettingError::MissingArgs {
                hint: "Specify a model name:",
                example: self.example,
            });
        }

        let message = success_set(self.key, &model);
        let set_field = self.set_field;
        mutate_config_with_message(
            ctx.paths,
            move |config| {
                set_field(config, Some(model));
                Ok(())
            },
            message,
        )
    }

    fn unset(&self, ctx: &SetContext<'_>) -> Result<String, SettingError> {
        let set_field = self.set_field;
        mutate_config_with_message(
            ctx.paths,
            move |config| {
                set_field(config, None);
                Ok(())
            },
            success_unset(self.key, self.default_display),
        )
    }

    fn format(&self, config: &Config) -> String {
        match (self.get)(config) {
            Some(model) => format!("  {}: {}", self.key, model),
            None => format!("  {}: (unset, default: {})", self.key, self.default_display),
        }
    }
}

pub fn openai_chat_model_handler() -> ModelHandler {
    ModelHandler {
        key: "default-openai-chat-model",
        example: "aiterm set default-openai-chat-model gpt-4o",
        default_display: DEFAULT_OPENAI_CHAT_MODEL,
        get: |c| c.default_openai_chat_model.as_ref(),
        set_field: |c, v| c.default_openai_chat_model = v,
    }
}

pub fn gemini_model_handler() -> ModelHandler {
    ModelHandler {
        key: "default-gemini-model",
        example: "aiterm set default-gemini-model gemini-1.5-pro-latest",
        default_display: DEFAULT_GEMINI_MODEL,
        get: |c| c.default_gemini_model.as_ref(),
        set_field: |c, v| c.default_gemini_model = v,
    }
}

pub fn openai_image_model_handler() -> ModelHandler {
    ModelHandler {
        key: "default-openai-image-model",
        example: "aiterm set default-openai-image-model gpt-image-1",
        default_display: DEFAULT_OPENAI_IMAGE_MODEL,
        get: |c| c.default_openai_image_model.as_ref(),
        set_field: |c, v| c.default_openai_image_model = v,
    }
}

pub fn helper_openai_handler() -> ModelHandler {
    ModelHandler {
        key: "helper-model-openai",
        example: "aiterm set helper-model-openai gpt-4o-mini",
        default_display: DEFAULT_HELPER_MODEL_OPENAI,
        get: |c| c.helper_model_openai.as_ref(),
        set_field: |c, v| c.helper_model_openai = v,
    }
}

pub fn helper_gemini_handler() -> ModelHandler {
    ModelHandler {
        key: "helper-model-gemini",
        example: "aiterm set helper-model-gemini gemini-1.5-flash-latest",
        default_display: DEFAULT_HELPER_MODEL_GEMINI,
        get: |c| c.helper_model_gemini.as_ref(),
        set_field: |c, v| c.helper_model_gemini = v,
    }
}
