//! Fluent-backed [`Translator`] with an embedded English catalogue.

use fluent_bundle::concurrent::FluentBundle;
use fluent_bundle::{FluentArgs, FluentError, FluentResource, FluentValue};
use std::borrow::Cow;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use unic_langid::{langid, LanguageIdentifier};

use super::{TranslationArgs, Translator};

const EN_US_CATALOGUE: &str = include_str!("../../locales/en-US/describe.ftl");

/// Which catalogue a bundle was built from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Catalogue {
    Consumer,
    Embedded,
}

/// Errors raised while building a [`FluentTranslator`].
#[derive(Debug, Error)]
pub enum FluentTranslatorError {
    #[error("no embedded Fluent catalogue exists for locale {locale}")]
    UnsupportedLocale { locale: LanguageIdentifier },

    #[error("failed to parse {catalogue:?} Fluent resource for {locale}")]
    Parser {
        locale: LanguageIdentifier,
        catalogue: Catalogue,
        errors: Vec<fluent_syntax::parser::ParserError>,
    },

    #[error("failed to register {catalogue:?} Fluent resource for {locale}")]
    Registration {
        locale: LanguageIdentifier,
        catalogue: Catalogue,
        errors: Vec<FluentError>,
    },
}

struct Bundle {
    locale: LanguageIdentifier,
    inner: FluentBundle<Arc<FluentResource>>,
}

/// Looks messages up in consumer resources first, then the embedded catalogue.
///
/// Message ids use dots (`modelspec.describe.prefix`); they are matched
/// against Fluent identifiers with the dots replaced by hyphens.
pub struct FluentTranslator {
    consumer: Option<Bundle>,
    embedded: Option<Bundle>,
}

impl FluentTranslator {
    /// English translator built from the embedded catalogue only.
    pub fn en_us() -> Result<Self, FluentTranslatorError> {
        Self::new(langid!("en-US"), [])
    }

    /// Layer `resources` (Fluent source text) over the embedded catalogue for
    /// `locale`.
    ///
    /// Message ids in `resources` may be written dotted
    /// (`modelspec.describe.prefix = ...`) or hyphenated.
    ///
    /// Locales without an embedded catalogue are accepted as long as at least
    /// one consumer resource is supplied.
    pub fn new(
        locale: LanguageIdentifier,
        resources: impl IntoIterator<Item = &'static str>,
    ) -> Result<Self, FluentTranslatorError> {
        let resources: Vec<&'static str> = resources.into_iter().collect();

        let embedded = match embedded_resources(&locale) {
            Some(embedded) => Some(build_bundle(&locale, embedded, Catalogue::Embedded)?),
            None if resources.is_empty() => {
                return Err(FluentTranslatorError::UnsupportedLocale { locale });
            }
            None => None,
        };

        let consumer = if resources.is_empty() {
            None
        } else {
            Some(build_bundle(&locale, &resources, Catalogue::Consumer)?)
        };

        Ok(FluentTranslator { consumer, embedded })
    }
}

impl Translator for FluentTranslator {
    fn lookup(&self, id: &str, args: &TranslationArgs) -> Option<String> {
        let id = normalize_identifier(id);
        let fluent_args = fluent_args_from(args);

        for bundle in [self.consumer.as_ref(), self.embedded.as_ref()]
            .into_iter()
            .flatten()
        {
            let Some(pattern) = bundle
                .inner
                .get_message(&id)
                .and_then(|message| message.value())
            else {
                continue;
            };

            let mut errors = Vec::new();
            let rendered = bundle
                .inner
                .format_pattern(pattern, Some(&fluent_args), &mut errors);
            if errors.is_empty() {
                return Some(rendered.into_owned());
            }
            tracing::warn!(
                id = %id,
                locale = %bundle.locale,
                errors = ?errors,
                "failed to format Fluent message"
            );
        }

        None
    }
}

impl fmt::Debug for FluentTranslator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FluentTranslator")
            .field("consumer", &self.consumer.as_ref().map(|b| &b.locale))
            .field("embedded", &self.embedded.as_ref().map(|b| &b.locale))
            .finish()
    }
}

fn embedded_resources(locale: &LanguageIdentifier) -> Option<&'static [&'static str]> {
    static EN_US: [&str; 1] = [EN_US_CATALOGUE];
    match locale.language.as_str() {
        "en" => Some(&EN_US),
        _ => None,
    }
}

fn build_bundle(
    locale: &LanguageIdentifier,
    resources: &[&'static str],
    catalogue: Catalogue,
) -> Result<Bundle, FluentTranslatorError> {
    let mut inner = FluentBundle::new_concurrent(vec![locale.clone()]);
    // Describe text is plain terminal output; bidi isolation marks would end
    // up inside test names.
    inner.set_use_isolating(false);

    for source in resources {
        let resource = FluentResource::try_new(normalize_resource_ids(source)).map_err(
            |(_, errors)| FluentTranslatorError::Parser {
                locale: locale.clone(),
                catalogue,
                errors,
            },
        )?;
        inner
            .add_resource(Arc::new(resource))
            .map_err(|errors| FluentTranslatorError::Registration {
                locale: locale.clone(),
                catalogue,
                errors,
            })?;
    }

    Ok(Bundle {
        locale: locale.clone(),
        inner,
    })
}

fn normalize_identifier(id: &str) -> Cow<'_, str> {
    if id.contains('.') {
        Cow::Owned(id.replace('.', "-"))
    } else {
        Cow::Borrowed(id)
    }
}

/// Rewrite dotted message ids at the start of top-level entries to the
/// hyphenated form Fluent accepts. Comments, indented continuation lines and
/// message bodies are left alone.
fn normalize_resource_ids(resource: &str) -> String {
    resource
        .lines()
        .map(|line| {
            let Some((id, rest)) = line.split_once('=') else {
                return Cow::Borrowed(line);
            };
            let name = id.trim_end();
            let is_message_id = name.starts_with(char::is_alphabetic)
                && name
                    .chars()
                    .all(|ch| ch.is_alphanumeric() || matches!(ch, '-' | '_' | '.'));
            if !is_message_id || !name.contains('.') {
                return Cow::Borrowed(line);
            }
            let padding = &id[name.len()..];
            Cow::Owned(format!("{}{padding}={rest}", normalize_identifier(name)))
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn fluent_args_from(args: &TranslationArgs) -> FluentArgs<'_> {
    let mut fluent_args = FluentArgs::new();
    for (name, value) in args.iter() {
        fluent_args.set(name, FluentValue::from(value));
    }
    fluent_args
}
