//! Endpoint URL helpers.
//!
//! Base URLs come from defaults or from `OPENAI_BASE_URL` / `GEMINI_BASE_URL`,
//! so they may or may not carry a trailing slash.

/// Remove trailing slashes from a base URL.
///
/// # Examples
///
/// ```
/// use aiterm::utils::url::normalize_base_url;
///
/// assert_eq!(normalize_base_url("https://api.openai.com/v1/"), "https://api.openai.com/v1");
/// assert_eq!(normalize_base_url("http://localhost:8080//"), "http://localhost:8080");
/// ```
pub fn normalize_base_url(base_url: &str) -> String {
    base_url.trim_end_matches('/').to_string()
}

/// Join a base URL and an endpoint path with exactly one slash.
///
/// # Examples
///
/// ```
/// use aiterm::utils::url::construct_api_url;
///
/// assert_eq!(
///     construct_api_url("https://api.openai.com/v1/", "/images/generations"),
///     "https://api.openai.com/v1/images/generations"
/// );
/// ```
pub fn construct_api_url(base_url: &str, endpoint: &str) -> String {
    let endpoint = endpoint.trim_start_matches('/');
    format!("{}/{}", normalize_base_url(base_url), endpoint)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gemini_model_paths_keep_their_colon_suffix() {
        assert_eq!(
            construct_api_url(
                "https://generativelanguage.googleapis.com/v1beta/",
                "models/gemini-pro:generateContent"
            ),
            "https://generativelanguage.googleapis.com/v1beta/models/gemini-pro:generateContent"
        );
    }

    #[test]
    fn empty_endpoint_yields_base_with_slash() {
        assert_eq!(construct_api_url("http://127.0.0.1:9", ""), "http://127.0.0.1:9/");
    }

    #[test]
    fn normalization_leaves_clean_urls_alone() {
        assert_eq!(
            normalize_base_url("https://api.openai.com/v1"),
            "https://api.openai.com/v1"
        );
        assert_eq!(normalize_base_url(""), "");
    }
}
