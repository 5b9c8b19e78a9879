pub mod cloud;
pub mod gateway;
pub mod stub;
mod types;

pub use types::{
    ChatRequest, CompletionReply, Provider, ProviderError, ProviderFuture, Reply, UpstreamError,
};

use anyhow::Context;
use reqwest::Url;

/// Parse a base URL so that relative joins append to its path.
pub fn base_url(raw: &str) -> anyhow::Result<Url> {
    let mut s = raw.trim().to_string();
    if !s.ends_with('/') {
        s.push('/');
    }
    Url::parse(&s).with_context(|| format!("invalid base URL: {raw}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_url_keeps_path_for_joins() {
        let u = base_url("https://api.groq.com/openai/v1").unwrap();
        assert_eq!(
            u.join("chat/completions").unwrap().as_str(),
            "https://api.groq.com/openai/v1/chat/completions"
        );
        assert!(base_url("not a url").is_err());
    }
}
