//! Models, subject construction, and the example currently running.

use crate::attributes::AttributeMap;
use crate::description::HasAttributeDisplayNames;
use crate::group::{GroupNode, SubjectBuilder};
use crate::Guard;
use std::any::{type_name, Any};
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

// ============================================================================
// Model contract
// ============================================================================

/// Whether mass-assignment honours the model's write protection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protection {
    /// Reject protected attributes, as for untrusted input.
    Enforce,
    /// Skip protection checks. Used for test fixtures.
    Bypass,
}

/// A type that can be built empty and then mass-assigned from an
/// [`AttributeMap`].
///
/// ```rust
/// use modelspec::{AttributeMap, Model, Protection};
///
/// #[derive(Default)]
/// struct Post { published: bool }
///
/// impl Model for Post {
///     type Error = String;
///
///     fn assign_attributes(&mut self, attrs: &AttributeMap, _: Protection) -> Result<(), String> {
///         for (key, value) in attrs.iter() {
///             match key {
///                 "published" => self.published = value.as_bool().ok_or("not a bool")?,
///                 other => return Err(format!("unknown attribute `{other}`")),
///             }
///         }
///         Ok(())
///     }
/// }
/// ```
pub trait Model: Default + 'static {
    type Error: fmt::Display;

    fn assign_attributes(
        &mut self,
        attributes: &AttributeMap,
        protection: Protection,
    ) -> Result<(), Self::Error>;

    /// Display names for attribute keys, if the model provides them.
    fn display_names() -> Option<&'static dyn HasAttributeDisplayNames> {
        None
    }
}

/// Build a fresh `M` and assign `attributes` to it, bypassing protection.
///
/// Assignment errors are returned as the model reported them.
pub fn build_subject<M: Model>(attributes: &AttributeMap) -> Result<M, M::Error> {
    let mut subject = M::default();
    subject.assign_attributes(attributes, Protection::Bypass)?;
    Ok(subject)
}

/// Type-erased facts about a described model type.
#[derive(Clone, Copy)]
pub struct ModelInfo {
    type_name: &'static str,
    display_names: Option<&'static dyn HasAttributeDisplayNames>,
    subject_builder: fn() -> SubjectBuilder,
}

impl ModelInfo {
    pub fn of<M: Model>() -> Self {
        ModelInfo {
            type_name: type_name::<M>(),
            display_names: M::display_names(),
            subject_builder: model_subject_builder::<M>,
        }
    }

    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// The type name without its module path or generic arguments:
    /// `app::models::Post` → `Post`, `a::Wrapper<b::X>` → `Wrapper`.
    pub fn short_name(&self) -> &'static str {
        short_type_name(self.type_name)
    }

    pub fn display_names(&self) -> Option<&'static dyn HasAttributeDisplayNames> {
        self.display_names
    }

    /// A builder constructing the model from the running group's attributes.
    pub fn subject_builder(&self) -> SubjectBuilder {
        (self.subject_builder)()
    }
}

impl fmt::Debug for ModelInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelInfo")
            .field("type_name", &self.type_name)
            .field("display_names", &self.display_names.is_some())
            .finish()
    }
}

fn short_type_name(name: &str) -> &str {
    let base = name.split('<').next().unwrap_or(name);
    let start = base.rfind("::").map_or(0, |i| i + 2);
    &base[start..]
}

fn model_subject_builder<M: Model>() -> SubjectBuilder {
    Rc::new(|group: &GroupNode| -> Box<dyn Any> {
        let attributes = group.subject_attributes();
        match build_subject::<M>(&attributes) {
            Ok(subject) => Box::new(subject),
            Err(err) => panic!(
                "modelspec: assigning {attributes:?} to {} failed: {err}",
                type_name::<M>()
            ),
        }
    })
}

// ============================================================================
// Active example
// ============================================================================

thread_local! {
    static ACTIVE: RefCell<Option<Example>> = const { RefCell::new(None) };
}

/// The running example: its group and, once asked for, its subject.
struct Example {
    group: Rc<GroupNode>,
    subject: Option<Box<dyn Any>>,
}

/// Mark `group` as the group of the running example until the guard drops.
///
/// The example starts without a subject; the first access builds it.
pub(crate) fn enter(group: Rc<GroupNode>) -> Guard<impl FnOnce()> {
    let example = Example {
        group,
        subject: None,
    };
    let previous = ACTIVE.with(|cell| cell.borrow_mut().replace(example));
    Guard::new(move || {
        ACTIVE.with(|cell| *cell.borrow_mut() = previous);
    })
}

/// The group of the example currently running.
///
/// Panics outside of a running example.
pub fn current_group() -> Rc<GroupNode> {
    ACTIVE.with(|cell| {
        cell.borrow()
            .as_ref()
            .map(|example| Rc::clone(&example.group))
            .expect("modelspec: subject used outside of a running example")
    })
}

/// The merged attributes for the running example's subject.
///
/// Default producers are evaluated on every call.
pub fn subject_attributes() -> AttributeMap {
    current_group().subject_attributes()
}

/// A copy of the running example's subject.
///
/// The subject is built on first access and kept for the rest of the
/// example, so every call sees the same instance, including changes made
/// through [`with_subject`].
///
/// Panics if no subject is declared for the group, if it is not a `T`, or if
/// the model rejects the attributes.
pub fn subject<T: Clone + 'static>() -> T {
    with_subject(|subject: &mut T| subject.clone())
}

/// Run `f` against the running example's subject, building it first if
/// needed.
pub fn with_subject<T: 'static, R>(f: impl FnOnce(&mut T) -> R) -> R {
    let group = current_group();
    let built = ACTIVE.with(|cell| {
        cell.borrow()
            .as_ref()
            .is_some_and(|example| example.subject.is_some())
    });
    if !built {
        // Built outside the borrow: model builders resolve attributes, which
        // may run producers that read the active example.
        let subject = build_for(&group);
        ACTIVE.with(|cell| {
            if let Some(example) = cell.borrow_mut().as_mut() {
                example.subject = Some(subject);
            }
        });
    }

    let mut subject = ACTIVE.with(|cell| {
        cell.borrow_mut()
            .as_mut()
            .and_then(|example| example.subject.take())
            .expect("modelspec: subject used outside of a running example")
    });
    let result = match subject.downcast_mut::<T>() {
        Some(typed) => f(typed),
        None => panic!(
            "modelspec: subject of `{}` is not a `{}`",
            group.full_name(),
            type_name::<T>()
        ),
    };
    ACTIVE.with(|cell| {
        if let Some(example) = cell.borrow_mut().as_mut() {
            example.subject = Some(subject);
        }
    });
    result
}

fn build_for(group: &GroupNode) -> Box<dyn Any> {
    let builder = group.subject_builder().unwrap_or_else(|| {
        panic!(
            "modelspec: no subject declared for `{}`",
            group.full_name()
        )
    });
    builder(group)
}

/// Build a fresh `M` from the running example's attributes, returning the
/// model's assignment error instead of panicking.
///
/// Does not touch the example's memoized subject.
pub fn try_subject<M: Model>() -> Result<M, M::Error> {
    build_subject::<M>(&subject_attributes())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attributes;

    #[derive(Debug, Default, Clone, PartialEq)]
    struct Post {
        title: String,
        published: bool,
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
                    "title" => self.title = value.as_str().ok_or("title")?.to_string(),
                    "published" if protection == Protection::Enforce => {
                        return Err("published is protected".to_string())
                    }
                    "published" => self.published = value.as_bool().ok_or("published")?,
                    other => return Err(format!("unknown attribute `{other}`")),
                }
            }
            Ok(())
        }
    }

    #[test]
    fn test_build_subject_bypasses_protection() {
        let post: Post =
            build_subject(&attributes! { "title" => "My title", "published" => true }).unwrap();
        assert_eq!(
            post,
            Post {
                title: "My title".to_string(),
                published: true
            }
        );
    }

    #[test]
    fn test_build_subject_surfaces_model_error() {
        let err = build_subject::<Post>(&attributes! { "colour" => "red" }).unwrap_err();
        assert_eq!(err, "unknown attribute `colour`");
    }

    #[test]
    fn test_short_name() {
        let info = ModelInfo::of::<Post>();
        assert_eq!(info.short_name(), "Post");
        assert!(info.type_name().ends_with("::Post"));
        assert!(info.display_names().is_none());
    }

    #[test]
    fn test_subject_reads_current_group() {
        let root = GroupNode::root();
        let group = GroupNode::child(&root, "Post")
            .model(ModelInfo::of::<Post>())
            .described(attributes! { "published" => true })
            .build();
        group.set_default_attributes(attributes! { "title" => "My title" }.into());
        group.set_subject_builder(ModelInfo::of::<Post>().subject_builder());

        let _active = enter(Rc::clone(&group));
        assert_eq!(
            subject_attributes(),
            attributes! { "title" => "My title", "published" => true }
        );
        let post: Post = subject();
        assert!(post.published);
        assert_eq!(try_subject::<Post>().unwrap().title, "My title");
    }

    #[test]
    fn test_short_type_name_drops_path_and_generics() {
        assert_eq!(short_type_name("app::models::Post"), "Post");
        assert_eq!(short_type_name("a::Wrapper<b::X>"), "Wrapper");
        assert_eq!(short_type_name("Post"), "Post");
    }

    #[test]
    fn test_subject_is_built_once_per_example() {
        let root = GroupNode::root();
        let group = GroupNode::child(&root, "counter").build();
        let builds = Rc::new(std::cell::Cell::new(0));
        let counter = Rc::clone(&builds);
        group.set_subject_builder(Rc::new(move |_: &GroupNode| -> Box<dyn Any> {
            counter.set(counter.get() + 1);
            Box::new(counter.get())
        }));

        {
            let _active = enter(Rc::clone(&group));
            assert_eq!(subject::<i32>(), 1);
            with_subject(|n: &mut i32| *n += 10);
            assert_eq!(subject::<i32>(), 11);
            assert_eq!(builds.get(), 1);
        }

        let _next = enter(Rc::clone(&group));
        assert_eq!(subject::<i32>(), 2);
    }

    #[test]
    fn test_enter_restores_previous_group() {
        let root = GroupNode::root();
        let outer = GroupNode::child(&root, "outer").build();
        let inner = GroupNode::child(&root, "inner").build();

        let _outer = enter(Rc::clone(&outer));
        {
            let _inner = enter(Rc::clone(&inner));
            assert_eq!(current_group().name(), "inner");
        }
        assert_eq!(current_group().name(), "outer");
    }

    #[test]
    #[should_panic(expected = "outside of a running example")]
    fn test_subject_outside_example_panics() {
        let _ = subject_attributes();
    }
}
