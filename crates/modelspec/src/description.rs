//! Describe text generated from an attribute mapping.
//!
//! ```text
//! {"published": true}                  -> "when published is true"
//! {"published": true, "title": "Hi"}   -> "when published is true and title is \"Hi\""
//! nested under a described group       -> "and published at is \"2020-01-01\""
//! ```

use crate::attributes::AttributeMap;
use crate::translate::{
    TranslationArgs, Translator, ATTRIBUTE_KEY, CONNECTOR_KEY, DEFAULT_ATTRIBUTE,
    DEFAULT_CONNECTOR, DEFAULT_PREFIX, PREFIX_KEY,
};

/// Optional capability: a model type that knows the display name of its
/// attributes (possibly locale-aware).
///
/// Returning `None` falls back to [`humanize`].
pub trait HasAttributeDisplayNames: Sync {
    fn human_attribute_name(&self, key: &str) -> Option<String>;
}

/// Turn an attribute key into a display name.
///
/// Drops a trailing `_id`, replaces underscores with spaces and capitalises
/// the first letter: `published_at` → `Published at`, `author_id` → `Author`.
pub fn humanize(key: &str) -> String {
    let base = match key.strip_suffix("_id") {
        Some(stripped) if !stripped.is_empty() => stripped,
        _ => key,
    };
    let words = base
        .split('_')
        .filter(|w| !w.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase();

    let mut chars = words.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Builds describe text through an injected [`Translator`].
pub struct DescriptionGenerator<'a> {
    translator: &'a dyn Translator,
}

impl<'a> DescriptionGenerator<'a> {
    pub fn new(translator: &'a dyn Translator) -> Self {
        DescriptionGenerator { translator }
    }

    /// The phrase placed before the first attribute group of a chain.
    pub fn prefix(&self) -> String {
        self.translator
            .message(PREFIX_KEY, &TranslationArgs::new(), DEFAULT_PREFIX)
    }

    /// The phrase joining attribute phrases and chained describe levels.
    pub fn connector(&self) -> String {
        self.translator
            .message(CONNECTOR_KEY, &TranslationArgs::new(), DEFAULT_CONNECTOR)
    }

    /// Describe `attributes`.
    ///
    /// `parent_prefix` replaces the prefix phrase; pass the
    /// [`connector`](Self::connector) when an enclosing group already declared
    /// attributes so the text reads as a continuation of it.
    ///
    /// An empty mapping yields an empty string.
    pub fn describe(
        &self,
        display_names: Option<&dyn HasAttributeDisplayNames>,
        attributes: &AttributeMap,
        parent_prefix: Option<&str>,
    ) -> String {
        if attributes.is_empty() {
            return String::new();
        }

        let phrases: Vec<String> = attributes
            .iter()
            .map(|(key, value)| {
                let name = display_names
                    .and_then(|names| names.human_attribute_name(key))
                    .unwrap_or_else(|| humanize(key))
                    .to_lowercase();
                let args = TranslationArgs::new()
                    .with("key", name)
                    .with("value", value.to_string());
                self.translator
                    .message(ATTRIBUTE_KEY, &args, DEFAULT_ATTRIBUTE)
            })
            .collect();

        let prefix = match parent_prefix {
            Some(prefix) => prefix.to_string(),
            None => self.prefix(),
        };
        let text = format!("{prefix}{}", phrases.join(&self.connector()));
        let text = text.trim_start().to_string();

        tracing::debug!(
            description = %text,
            attributes = attributes.len(),
            "generated describe text"
        );
        text
    }
}
