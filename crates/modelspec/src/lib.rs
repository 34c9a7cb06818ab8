//! # modelspec: describe blocks parameterized by model attributes
//!
//! An RSpec-inspired BDD framework where a group can be declared with a map
//! of model attributes instead of a free-text name. The name is generated
//! ("when published is true"), attributes merge with inherited defaults, and
//! the group's subject is a fresh model with those attributes assigned.
//!
//! ## Quick example
//!
//! ```rust,no_run
//! use modelspec::{attributes, AttributeMap, Model, Protection};
//!
//! #[derive(Clone, Default)]
//! struct Post { title: String, published: bool }
//!
//! impl Model for Post {
//!     type Error = String;
//!
//!     fn assign_attributes(&mut self, attrs: &AttributeMap, _: Protection) -> Result<(), String> {
//!         for (key, value) in attrs.iter() {
//!             match key {
//!                 "title" => self.title = value.as_str().ok_or("title")?.to_string(),
//!                 "published" => self.published = value.as_bool().ok_or("published")?,
//!                 other => return Err(format!("unknown attribute `{other}`")),
//!             }
//!         }
//!         Ok(())
//!     }
//! }
//!
//! fn main() {
//!     modelspec::run(|ctx| {
//!         ctx.describe_model::<Post>("Post", |ctx| {
//!             ctx.default_subject_attributes(attributes! { "title" => "My title" });
//!
//!             // "when published is true"
//!             ctx.describe_attributes(attributes! { "published" => true }, |ctx| {
//!                 ctx.it("keeps the default title", || {
//!                     let post = modelspec::subject::<Post>();
//!                     assert!(post.published);
//!                     assert_eq!(post.title, "My title");
//!                 });
//!             });
//!         });
//!     });
//! }
//! ```
//!
//! ## Features
//!
//! - `macros` (default): the `spec!` block DSL
//! - `fluent` (default): [`translate::FluentTranslator`] and the embedded
//!   English catalogue
//! - `googletest`: re-exports `googletest` matchers via `modelspec::matchers`

pub mod attributes;
mod context;
pub mod description;
pub mod group;
pub mod runner;
pub mod subject;
pub mod translate;

pub use attributes::{AttributeMap, AttributeValue};
pub use context::{build_and_run, run, run_with, Context, ItBuilder, RunOptions};
pub use description::{humanize, DescriptionGenerator, HasAttributeDisplayNames};
pub use group::{DefaultAttributes, GroupNode};
pub use subject::{
    build_subject, current_group, subject, subject_attributes, try_subject, with_subject, Model,
    ModelInfo, Protection,
};

#[cfg(feature = "macros")]
pub use modelspec_macros::spec;

/// Re-export of the [`googletest`] crate. Available with the `googletest` feature.
#[cfg(feature = "googletest")]
pub use googletest;

/// Composable matchers re-exported from [`googletest::prelude`].
#[cfg(feature = "googletest")]
pub mod matchers {
    pub use googletest::prelude::*;
}

/// A drop guard that runs cleanup code even if the test panics.
pub struct Guard<F: FnOnce()> {
    f: Option<F>,
}

impl<F: FnOnce()> Guard<F> {
    pub fn new(f: F) -> Self {
        Guard { f: Some(f) }
    }
}

impl<F: FnOnce()> Drop for Guard<F> {
    fn drop(&mut self) {
        if let Some(f) = self.f.take() {
            f();
        }
    }
}
