use crate::{
    codec::{Codec, JsonCodec},
    error::ConfigurationError,
};
use std::{collections::BTreeMap, sync::Arc};

/// Alternative content types historically used for JSON payloads.
const JSON_ALTERNATIVE_CONTENT_TYPES: [&str; 5] = [
    "application/x-javascript",
    "text/javascript",
    "text/x-javascript",
    "text/x-json",
    "text/json",
];

/// A codec registered under a name and the content types it answers to.
#[derive(Debug, Clone)]
pub struct ProtocolConfig {
    codec: Arc<dyn Codec>,
    name: String,
    default_content_type: String,
    alternative_content_types: Vec<String>,
}

impl ProtocolConfig {
    /// Uses the codec's own content type as the default.
    pub fn new(codec: Arc<dyn Codec>, name: impl Into<String>) -> Self {
        let default_content_type = normalize_content_type(codec.content_type());
        Self {
            codec,
            name: name.into(),
            default_content_type,
            alternative_content_types: Vec::new(),
        }
    }

    pub fn with_default_content_type(mut self, content_type: &str) -> Self {
        self.default_content_type = normalize_content_type(content_type);
        self
    }

    pub fn with_alternative_content_types<I, T>(mut self, content_types: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: AsRef<str>,
    {
        self.alternative_content_types = content_types
            .into_iter()
            .map(|content_type| normalize_content_type(content_type.as_ref()))
            .collect();
        self
    }

    pub fn codec(&self) -> &Arc<dyn Codec> {
        &self.codec
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn default_content_type(&self) -> &str {
        &self.default_content_type
    }

    pub fn alternative_content_types(&self) -> &[String] {
        &self.alternative_content_types
    }

    /// The default content type followed by the alternatives.
    pub fn content_types(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.default_content_type.as_str())
            .chain(self.alternative_content_types.iter().map(String::as_str))
    }
}

/// Content-type → codec lookup used by the server side.
#[derive(Debug, Clone, Default)]
pub struct Protocols {
    by_name: BTreeMap<String, Arc<ProtocolConfig>>,
    by_content_type: BTreeMap<String, Arc<ProtocolConfig>>,
}

impl Protocols {
    pub fn new() -> Self {
        Self::default()
    }

    /// The JSON codec under `application/json` and its common aliases.
    pub fn json() -> Self {
        let config = ProtocolConfig::new(Arc::new(JsonCodec), "json")
            .with_alternative_content_types(JSON_ALTERNATIVE_CONTENT_TYPES);
        let mut protocols = Self::new();
        protocols.insert(Arc::new(config));
        protocols
    }

    /// Registers a protocol; names and content types must be unique across
    /// the registry and within the configuration itself.
    pub fn add(&mut self, config: ProtocolConfig) -> Result<(), ConfigurationError> {
        if self.by_name.contains_key(config.name()) {
            return Err(ConfigurationError::DuplicateProtocol(config.name().to_owned()));
        }
        let mut seen = Vec::new();
        for content_type in config.content_types() {
            if seen.contains(&content_type) || self.by_content_type.contains_key(content_type) {
                return Err(ConfigurationError::DuplicateContentType(
                    content_type.to_owned(),
                ));
            }
            seen.push(content_type);
        }
        self.insert(Arc::new(config));
        Ok(())
    }

    fn insert(&mut self, config: Arc<ProtocolConfig>) {
        for content_type in config.content_types() {
            self.by_content_type
                .insert(content_type.to_owned(), Arc::clone(&config));
        }
        self.by_name.insert(config.name().to_owned(), config);
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.by_name.keys().map(String::as_str)
    }

    pub fn content_types(&self) -> impl Iterator<Item = &str> {
        self.by_content_type.keys().map(String::as_str)
    }

    pub fn lookup_by_name(&self, name: &str) -> Option<&Arc<ProtocolConfig>> {
        self.by_name.get(name)
    }

    /// Ignores parameters such as `charset` and letter case.
    pub fn lookup_by_content_type(&self, content_type: &str) -> Option<&Arc<ProtocolConfig>> {
        self.by_content_type
            .get(&normalize_content_type(content_type))
    }
}

/// `"Application/JSON; charset=utf-8"` → `"application/json"`.
pub(crate) fn normalize_content_type(content_type: &str) -> String {
    content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase()
}
