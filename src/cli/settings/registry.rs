//! Registry of setting handlers.

use std::collections::HashMap;

use super::handlers::boolean::{memory_enabled_handler, stream_handler};
use super::handlers::integer::{
    api_timeout_handler, default_max_tokens_handler, log_rename_max_tokens_handler,
    summary_max_tokens_handler, summary_threshold_handler, summary_trim_handler,
};
use super::handlers::model::{
    gemini_model_handler, helper_gemini_handler, helper_openai_handler, openai_chat_model_handler,
    openai_image_model_handler,
};
use super::handlers::DefaultEngineHandler;
use super::SettingHandler;

/// Registry of all available setting handlers.
pub struct SettingRegistry {
    handlers: HashMap<&'static str, Box<dyn SettingHandler>>,
    /// Keys in display order for `aiterm set` output.
    display_order: Vec<&'static str>,
}

impl SettingRegistry {
    /// Create a new registry with all handlers registered.
    pub fn new() -> Self {
        let mut registry = Self {
            handlers: HashMap::new(),
            display_order: Vec::new(),
        };

        registry.register(Box::new(DefaultEngineHandler));
        registry.register(Box::new(api_timeout_handler()));
        registry.register(Box::new(openai_chat_model_handler()));
        registry.register(Box::new(gemini_model_handler()));
        registry.register(Box::new(openai_image_model_handler()));
        registry.register(Box::new(helper_openai_handler()));
        registry.register(Box::new(helper_gemini_handler()));
        registry.register(Box::new(stream_handler()));
        registry.register(Box::new(memory_enabled_handler()));
        registry.register(Box::new(default_max_tokens_handler()));
        registry.register(Box::new(summary_max_tokens_handler()));
        registry.register(Box::new(summary_threshold_handler()));
        registry.register(Box::new(summary_trim_handler()));
        registry.register(Box::new(log_rename_max_tokens_handler()));

        registry
    }

    fn register(&mut self, handler: Box<dyn SettingHandler>) {
        let key = handler.key();
        self.display_order.push(key);
        self.handlers.insert(key, handler);
    }

    /// Get a handler by key.
    pub fn get(&self, key: &str) -> Option<&dyn SettingHandler> {
        self.handlers.get(key).map(|h| h.as_ref())
    }

    /// Get all keys in display order.
    pub fn keys_display_order(&self) -> &[&'static str] {
        &self.display_order
    }
}

impl Default for SettingRegistry {
    fn default() -> Self {
        Self::new()
    }
}
