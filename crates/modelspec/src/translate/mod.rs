//! Translation lookups for generated describe text.
//!
//! The description generator never hardcodes its phrases. It asks a
//! [`Translator`] for three messages under the `modelspec.describe` namespace
//! and falls back to the English templates below when a lookup misses.

use std::collections::HashMap;

#[cfg(feature = "fluent")]
mod fluent;

#[cfg(feature = "fluent")]
pub use self::fluent::{FluentTranslator, FluentTranslatorError};

/// Per-attribute phrase template. Placeholders: `{key}`, `{value}`.
pub const ATTRIBUTE_KEY: &str = "modelspec.describe.attribute";
/// Phrase placed in front of the first attribute group in a chain.
pub const PREFIX_KEY: &str = "modelspec.describe.prefix";
/// Phrase joining attribute phrases and chained describe levels.
pub const CONNECTOR_KEY: &str = "modelspec.describe.connector";

pub const DEFAULT_ATTRIBUTE: &str = "{key} is {value}";
pub const DEFAULT_PREFIX: &str = "when ";
pub const DEFAULT_CONNECTOR: &str = " and ";

/// Named placeholder values passed to a lookup, in declaration order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TranslationArgs {
    values: Vec<(String, String)>,
}

impl TranslationArgs {
    pub fn new() -> Self {
        TranslationArgs::default()
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.values.push((name.into(), value.into()));
        self
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.values
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.values.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }
}

/// Key/value translation service.
///
/// Implementations return `None` when they have no message for `id`; callers
/// use [`message`](Translator::message) to fall back to a default template.
pub trait Translator: Send + Sync {
    fn lookup(&self, id: &str, args: &TranslationArgs) -> Option<String>;

    /// Look up `id`, or interpolate `args` into `fallback` when it is missing.
    ///
    /// ```rust
    /// use modelspec::translate::{NoOpTranslator, TranslationArgs, Translator};
    ///
    /// let args = TranslationArgs::new().with("key", "title");
    /// assert_eq!(NoOpTranslator.message("missing", &args, "{key}!"), "title!");
    /// ```
    fn message(&self, id: &str, args: &TranslationArgs, fallback: &str) -> String {
        self.lookup(id, args).unwrap_or_else(|| {
            tracing::trace!(id, "translation missing, using fallback");
            interpolate(fallback, args)
        })
    }
}

/// Translator that never has a message; every lookup uses the fallback.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoOpTranslator;

impl Translator for NoOpTranslator {
    fn lookup(&self, _id: &str, _args: &TranslationArgs) -> Option<String> {
        None
    }
}

/// In-memory translation table of `{name}`-style templates.
///
/// ```rust
/// use modelspec::translate::{MapTranslator, TranslationArgs, Translator, PREFIX_KEY};
///
/// let translator = MapTranslator::new().with(PREFIX_KEY, "given ");
/// assert_eq!(translator.lookup(PREFIX_KEY, &TranslationArgs::new()).as_deref(), Some("given "));
/// ```
#[derive(Debug, Default, Clone)]
pub struct MapTranslator {
    templates: HashMap<String, String>,
}

impl MapTranslator {
    pub fn new() -> Self {
        MapTranslator::default()
    }

    pub fn with(mut self, id: impl Into<String>, template: impl Into<String>) -> Self {
        self.templates.insert(id.into(), template.into());
        self
    }
}

impl Translator for MapTranslator {
    fn lookup(&self, id: &str, args: &TranslationArgs) -> Option<String> {
        self.templates
            .get(id)
            .map(|template| interpolate(template, args))
    }
}

/// The translator used when none is supplied: the embedded English Fluent
/// catalogue if the `fluent` feature is on, otherwise [`NoOpTranslator`].
pub fn default_translator() -> Box<dyn Translator> {
    #[cfg(feature = "fluent")]
    {
        match FluentTranslator::en_us() {
            Ok(translator) => return Box::new(translator),
            Err(err) => {
                tracing::warn!(error = %err, "embedded catalogue failed to load; using fallbacks");
            }
        }
    }
    Box::new(NoOpTranslator)
}

/// Replace `{name}` placeholders in `template` with values from `args`.
///
/// Unknown placeholders are left untouched.
pub fn interpolate(template: &str, args: &TranslationArgs) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        match after.find('}') {
            Some(close) => {
                let name = &after[..close];
                match args.get(name) {
                    Some(value) => out.push_str(value),
                    None => {
                        out.push('{');
                        out.push_str(name);
                        out.push('}');
                    }
                }
                rest = &after[close + 1..];
            }
            None => {
                out.push_str(&rest[open..]);
                rest = "";
            }
        }
    }
    out.push_str(rest);
    out
}
