//! Models shared by the integration suites.

#![allow(dead_code)]

use modelspec::{AttributeMap, HasAttributeDisplayNames, Model, Protection};

#[derive(Debug, Default, Clone, PartialEq)]
pub struct Post {
    pub title: String,
    pub published: bool,
    pub published_at: Option<String>,
    /// Protected: only assignable when protection is bypassed.
    pub views: i64,
}

impl Model for Post {
    type Error = String;

    fn assign_attributes(
        &mut self,
        attributes: &AttributeMap,
        protection: Protection,
    ) -> Result<(), String> {
        for (key, value) in attributes.iter() {
            match key {
                "title" => {
                    self.title = value.as_str().ok_or("title must be a string")?.to_string()
                }
                "published" => {
                    self.published = value.as_bool().ok_or("published must be a bool")?
                }
                "published_at" if value.is_nil() => self.published_at = None,
                "published_at" => {
                    let at = value.as_str().ok_or("published_at must be a string")?;
                    self.published_at = Some(at.to_string());
                }
                "views" if protection == Protection::Enforce => {
                    return Err("views is write-protected".to_string());
                }
                "views" => self.views = value.as_i64().ok_or("views must be an integer")?,
                other => return Err(format!("unknown attribute `{other}` for Post")),
            }
        }
        Ok(())
    }
}

/// A model that names its own attributes.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Article {
    pub headline: String,
    pub featured: bool,
}

struct ArticleNames;

impl HasAttributeDisplayNames for ArticleNames {
    fn human_attribute_name(&self, key: &str) -> Option<String> {
        match key {
            "featured" => Some("Front page".to_string()),
            _ => None,
        }
    }
}

static ARTICLE_NAMES: ArticleNames = ArticleNames;

impl Model for Article {
    type Error = String;

    fn assign_attributes(
        &mut self,
        attributes: &AttributeMap,
        _: Protection,
    ) -> Result<(), String> {
        for (key, value) in attributes.iter() {
            match key {
                "headline" => self.headline = value.as_str().ok_or("headline")?.to_string(),
                "featured" => self.featured = value.as_bool().ok_or("featured")?,
                other => return Err(format!("unknown attribute `{other}` for Article")),
            }
        }
        Ok(())
    }

    fn display_names() -> Option<&'static dyn HasAttributeDisplayNames> {
        Some(&ARTICLE_NAMES)
    }
}
