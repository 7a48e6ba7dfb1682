use std::path::Path;

use tracing::debug;

use crate::core::error::MissingCredentialError;
use crate::core::provider::Provider;

/// Load `KEY=value` pairs from a dotenv file without overriding variables
/// that are already set in the environment. A missing file is not an error.
pub fn load_dotenv(path: &Path) {
    if !path.exists() {
        return;
    }
    match dotenvy::from_path(path) {
        Ok(()) => debug!(path = %path.display(), "loaded environment file"),
        Err(err) => {
            tracing::warn!(path = %path.display(), error = %err, "could not load environment file")
        }
    }
}

/// Look up the provider's API key in the environment.
pub fn resolve_api_key(provider: Provider) -> Result<String, MissingCredentialError> {
    lookup_api_key(provider, |name| std::env::var(name).ok())
}

pub(crate) fn lookup_api_key(
    provider: Provider,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<String, MissingCredentialError> {
    lookup(provider.env_var())
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .ok_or_else(|| MissingCredentialError::new(provider))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_key_under_provider_variable() {
        let key = lookup_api_key(Provider::OpenAi, |name| {
            (name == "OPENAI_API_KEY").then(|| " sk-abc \n".to_string())
        });
        assert_eq!(key, Ok("sk-abc".to_string()));
    }

    #[test]
    fn blank_key_counts_as_missing() {
        let err = lookup_api_key(Provider::Gemini, |_| Some("   ".to_string())).unwrap_err();
        assert_eq!(err.env_var, "GEMINI_API_KEY");
        assert_eq!(err.provider, Provider::Gemini);
    }
}
