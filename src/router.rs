use std::fmt;

/// Upstream backend class a model is served from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderKind {
    /// Hosted OpenAI-compatible API; answers arrive in one piece.
    Cloud,
    /// Local inference daemon behind the streaming gateway.
    Local,
}

impl ProviderKind {
    pub fn label(self) -> &'static str {
        match self {
            ProviderKind::Cloud => "Groq",
            ProviderKind::Local => "Ollama",
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.label())
    }
}

pub const DEFAULT_CLOUD_FRAGMENTS: &[&str] = &["llama-3.3", "deepseek-r1", "gemma2"];

/// Classification function injected into the chat session.
pub type Classifier = Box<dyn Fn(&str) -> ProviderKind + Send + Sync>;

/// Routes a model id to a provider by substring match against an allow-list.
#[derive(Debug, Clone)]
pub struct ModelRouter {
    cloud_fragments: Vec<String>,
}

impl Default for ModelRouter {
    fn default() -> Self {
        Self::new(DEFAULT_CLOUD_FRAGMENTS.iter().map(|s| s.to_string()).collect())
    }
}

impl ModelRouter {
    pub fn new(cloud_fragments: Vec<String>) -> Self {
        Self { cloud_fragments }
    }

    pub fn classify(&self, model: &str) -> ProviderKind {
        if self.cloud_fragments.iter().any(|f| !f.is_empty() && model.contains(f.as_str())) {
            ProviderKind::Cloud
        } else {
            ProviderKind::Local
        }
    }

    pub fn into_classifier(self) -> Classifier {
        Box::new(move |model| self.classify(model))
    }
}

#[derive(Debug, Clone, Copy)]
pub struct CatalogEntry {
    pub id: &'static str,
    pub name: &'static str,
    pub size: &'static str,
}

/// Models offered by default.
pub const CATALOG: &[CatalogEntry] = &[
    CatalogEntry { id: "llama2", name: "Llama2 (Fast)", size: "3.8 GB" },
    CatalogEntry { id: "deepseek-r1:14b", name: "DeepSeek R1 (Reasoning)", size: "9 GB" },
    CatalogEntry { id: "qwen3:32b", name: "Qwen3 (Most Powerful)", size: "20 GB" },
    CatalogEntry { id: "llama-3.3-70b-versatile", name: "Llama 3.3 70B", size: "Cloud" },
    CatalogEntry { id: "deepseek-r1-distill-llama-70b", name: "DeepSeek R1 Distill", size: "Cloud" },
    CatalogEntry { id: "gemma2-9b-it", name: "Gemma2 9B", size: "Cloud" },
];

pub const DEFAULT_MODEL: &str = "llama2";
