//! Closure-based BDD API: Context, ItBuilder, SuiteBuilder, and `run()`.

use crate::attributes::AttributeMap;
use crate::description::DescriptionGenerator;
use crate::group::{DefaultAttributes, GroupNode, SubjectBuilder};
use crate::runner::{self, Hook, RunConfig, TestNode};
use crate::subject::{Model, ModelInfo};
use crate::translate::{default_translator, Translator};
use std::any::Any;
use std::cell::RefCell;
use std::rc::Rc;

// ============================================================================
// Thread-local suite builder
// ============================================================================

thread_local! {
    static BUILDER: RefCell<Option<SuiteBuilder>> = const { RefCell::new(None) };
}

pub(crate) struct SuiteBuilder {
    stack: Vec<GroupFrame>,
    translator: Box<dyn Translator>,
}

struct GroupFrame {
    name: String,
    focused: bool,
    pending: bool,
    node: Rc<GroupNode>,
    before_each: Vec<Hook>,
    after_each: Vec<Hook>,
    children: Vec<TestNode>,
}

impl GroupFrame {
    fn new(name: String, focused: bool, pending: bool, node: Rc<GroupNode>) -> Self {
        GroupFrame {
            name,
            focused,
            pending,
            node,
            before_each: Vec::new(),
            after_each: Vec::new(),
            children: Vec::new(),
        }
    }
}

impl SuiteBuilder {
    fn new(translator: Box<dyn Translator>) -> Self {
        SuiteBuilder {
            stack: vec![GroupFrame::new(String::new(), false, false, GroupNode::root())],
            translator,
        }
    }

    pub(crate) fn push_group(
        &mut self,
        name: String,
        focused: bool,
        pending: bool,
        node: Rc<GroupNode>,
    ) {
        self.stack.push(GroupFrame::new(name, focused, pending, node));
    }

    pub(crate) fn pop_group(&mut self) {
        let frame = self.stack.pop().expect("modelspec: unbalanced group push/pop");
        let node = TestNode::Describe {
            name: frame.name,
            focused: frame.focused,
            pending: frame.pending,
            before_each: frame.before_each,
            after_each: frame.after_each,
            children: frame.children,
        };
        self.current_frame_mut().children.push(node);
    }

    pub(crate) fn add_node(&mut self, node: TestNode) {
        self.current_frame_mut().children.push(node);
    }

    pub(crate) fn current_node(&self) -> Rc<GroupNode> {
        let frame = self.stack.last().expect("modelspec: empty builder stack");
        Rc::clone(&frame.node)
    }

    fn add_before_each(&mut self, hook: Hook) {
        self.current_frame_mut().before_each.push(hook);
    }

    fn add_after_each(&mut self, hook: Hook) {
        self.current_frame_mut().after_each.push(hook);
    }

    fn current_frame_mut(&mut self) -> &mut GroupFrame {
        self.stack.last_mut().expect("modelspec: empty builder stack")
    }

    fn into_nodes(mut self) -> Vec<TestNode> {
        assert_eq!(
            self.stack.len(),
            1,
            "modelspec: unbalanced group push/pop at finalization"
        );
        self.stack.pop().map(|root| root.children).unwrap_or_default()
    }
}

/// Access the thread-local builder.
pub(crate) fn with_builder<R>(f: impl FnOnce(&mut SuiteBuilder) -> R) -> R {
    BUILDER.with(|cell| {
        let mut opt = cell.borrow_mut();
        let builder = opt
            .as_mut()
            .expect("modelspec: Context used outside of modelspec::run()");
        f(builder)
    })
}

// ============================================================================
// Context: the user-facing handle
// ============================================================================

/// A lightweight handle for defining BDD test structure.
///
/// All methods delegate to a thread-local builder. `Context` is `Copy` so it
/// can be passed into nested closures without ceremony.
///
/// # Example
/// ```rust,no_run
/// use modelspec::{attributes, AttributeMap, Model, Protection};
///
/// #[derive(Clone, Default)]
/// struct Post { published: bool }
///
/// impl Model for Post {
///     type Error = String;
///     fn assign_attributes(&mut self, attrs: &AttributeMap, _: Protection) -> Result<(), String> {
///         if let Some(v) = attrs.get("published") {
///             self.published = v.as_bool().ok_or("published must be a bool")?;
///         }
///         Ok(())
///     }
/// }
///
/// fn main() {
///     modelspec::run(|ctx| {
///         ctx.describe_model::<Post>("Post", |ctx| {
///             ctx.describe_attributes(attributes! { "published" => true }, |ctx| {
///                 ctx.it("is published", || {
///                     assert!(modelspec::subject::<Post>().published);
///                 });
///             });
///         });
///     });
/// }
/// ```
#[derive(Copy, Clone)]
pub struct Context;

impl Context {
    // ---- Describe / Context / When -------------------------------------------

    pub fn describe(&self, name: &str, body: impl FnOnce(Context)) {
        self.describe_impl(name, false, false, body);
    }

    pub fn fdescribe(&self, name: &str, body: impl FnOnce(Context)) {
        self.describe_impl(name, true, false, body);
    }

    pub fn xdescribe(&self, name: &str, body: impl FnOnce(Context)) {
        self.describe_impl(name, false, true, body);
    }

    pub fn context(&self, name: &str, body: impl FnOnce(Context)) {
        self.describe(name, body);
    }

    pub fn fcontext(&self, name: &str, body: impl FnOnce(Context)) {
        self.fdescribe(name, body);
    }

    pub fn xcontext(&self, name: &str, body: impl FnOnce(Context)) {
        self.xdescribe(name, body);
    }

    pub fn when(&self, name: &str, body: impl FnOnce(Context)) {
        self.describe(name, body);
    }

    fn describe_impl(&self, name: &str, focused: bool, pending: bool, body: impl FnOnce(Context)) {
        with_builder(|b| {
            let node = GroupNode::child(&b.current_node(), name).build();
            b.push_group(name.to_string(), focused, pending, node);
        });
        body(Context);
        with_builder(|b| b.pop_group());
    }

    // ---- Model describes -----------------------------------------------------

    /// Describe model type `M` under a free-text name.
    ///
    /// The group's subject becomes a fresh `M` with the resolved subject
    /// attributes assigned to it.
    pub fn describe_model<M: Model>(&self, name: &str, body: impl FnOnce(Context)) {
        self.describe_model_impl::<M>(name, false, false, body);
    }

    pub fn fdescribe_model<M: Model>(&self, name: &str, body: impl FnOnce(Context)) {
        self.describe_model_impl::<M>(name, true, false, body);
    }

    pub fn xdescribe_model<M: Model>(&self, name: &str, body: impl FnOnce(Context)) {
        self.describe_model_impl::<M>(name, false, true, body);
    }

    fn describe_model_impl<M: Model>(
        &self,
        name: &str,
        focused: bool,
        pending: bool,
        body: impl FnOnce(Context),
    ) {
        let model = ModelInfo::of::<M>();
        with_builder(|b| {
            let node = GroupNode::child(&b.current_node(), name).model(model).build();
            node.set_subject_builder(model.subject_builder());
            b.push_group(name.to_string(), focused, pending, node);
        });
        body(Context);
        with_builder(|b| b.pop_group());
    }

    /// Describe the enclosing model with `attributes` set, naming the group
    /// after them ("when published is true").
    ///
    /// Nested under a group that already declared attributes, the name
    /// continues the chain with the connector phrase ("and title is ...").
    ///
    /// Panics if no enclosing group was declared with
    /// [`describe_model`](Self::describe_model).
    pub fn describe_attributes(&self, attributes: AttributeMap, body: impl FnOnce(Context)) {
        self.describe_attributes_impl(attributes, None, false, false, body);
    }

    pub fn fdescribe_attributes(&self, attributes: AttributeMap, body: impl FnOnce(Context)) {
        self.describe_attributes_impl(attributes, None, true, false, body);
    }

    pub fn xdescribe_attributes(&self, attributes: AttributeMap, body: impl FnOnce(Context)) {
        self.describe_attributes_impl(attributes, None, false, true, body);
    }

    /// Like [`describe_attributes`](Self::describe_attributes), with explicit
    /// group text instead of the generated description.
    pub fn describe_attributes_as(
        &self,
        attributes: AttributeMap,
        name: &str,
        body: impl FnOnce(Context),
    ) {
        self.describe_attributes_impl(attributes, Some(name), false, false, body);
    }

    pub fn fdescribe_attributes_as(
        &self,
        attributes: AttributeMap,
        name: &str,
        body: impl FnOnce(Context),
    ) {
        self.describe_attributes_impl(attributes, Some(name), true, false, body);
    }

    pub fn xdescribe_attributes_as(
        &self,
        attributes: AttributeMap,
        name: &str,
        body: impl FnOnce(Context),
    ) {
        self.describe_attributes_impl(attributes, Some(name), false, true, body);
    }

    fn describe_attributes_impl(
        &self,
        attributes: AttributeMap,
        name: Option<&str>,
        focused: bool,
        pending: bool,
        body: impl FnOnce(Context),
    ) {
        with_builder(|b| {
            let parent = b.current_node();
            let model = parent.model().unwrap_or_else(|| {
                panic!(
                    "modelspec: describe_attributes({attributes:?}) needs an enclosing describe_model"
                )
            });

            let name = match name {
                Some(name) => name.to_string(),
                None if attributes.is_empty() => model.short_name().to_string(),
                None => {
                    let generator = DescriptionGenerator::new(&*b.translator);
                    let parent_prefix = parent
                        .has_described_attributes()
                        .then(|| generator.connector());
                    generator.describe(model.display_names(), &attributes, parent_prefix.as_deref())
                }
            };

            // An empty mapping declares nothing: descendants keep the
            // ancestor's attributes and prefix.
            let mut node = GroupNode::child(&parent, name.clone());
            if !attributes.is_empty() {
                node = node.described(attributes);
            }
            let node = node.build();
            node.set_subject_builder(model.subject_builder());
            b.push_group(name, focused, pending, node);
        });
        body(Context);
        with_builder(|b| b.pop_group());
    }

    /// Default attributes for subjects built in this group and its children.
    ///
    /// Attributes declared with [`describe_attributes`](Self::describe_attributes)
    /// override these key by key.
    pub fn default_subject_attributes(&self, attributes: AttributeMap) {
        self.set_defaults(DefaultAttributes::Literal(attributes));
    }

    /// Like [`default_subject_attributes`](Self::default_subject_attributes),
    /// but `producer` is called each time a subject's attributes are resolved.
    pub fn default_subject_attributes_with(&self, producer: impl Fn() -> AttributeMap + 'static) {
        self.set_defaults(DefaultAttributes::producer(producer));
    }

    fn set_defaults(&self, source: DefaultAttributes) {
        with_builder(|b| {
            let node = b.current_node();
            node.set_default_attributes(source);
            if let Some(model) = node.model() {
                node.set_subject_builder(model.subject_builder());
            }
        });
    }

    /// Override the subject for this group and its children.
    ///
    /// ```rust,no_run
    /// # fn main() { modelspec::run(|ctx| {
    /// ctx.describe("numbers", |ctx| {
    ///     ctx.subject(|| 2 + 3);
    ///     ctx.it("adds", || assert_eq!(modelspec::subject::<i32>(), 5));
    /// });
    /// # }); }
    /// ```
    pub fn subject<T: 'static>(&self, builder: impl Fn() -> T + 'static) {
        let builder: SubjectBuilder =
            Rc::new(move |_: &GroupNode| -> Box<dyn Any> { Box::new(builder()) });
        with_builder(|b| b.current_node().set_subject_builder(builder));
    }

    // ---- It / Specify --------------------------------------------------------

    /// Define a test case. Returns an [`ItBuilder`] that registers the test
    /// when dropped.
    pub fn it(&self, name: &str, body: impl Fn() + 'static) -> ItBuilder {
        ItBuilder::new(name.to_string(), body, false, false)
    }

    pub fn fit(&self, name: &str, body: impl Fn() + 'static) -> ItBuilder {
        ItBuilder::new(name.to_string(), body, true, false)
    }

    pub fn xit(&self, name: &str, body: impl Fn() + 'static) -> ItBuilder {
        ItBuilder::new(name.to_string(), body, false, true)
    }

    pub fn specify(&self, name: &str, body: impl Fn() + 'static) -> ItBuilder {
        self.it(name, body)
    }

    // ---- Hooks ---------------------------------------------------------------

    pub fn before_each(&self, hook: impl Fn() + 'static) {
        with_builder(|b| b.add_before_each(Box::new(hook)));
    }

    /// Runs after every test in scope, even when the test panicked.
    pub fn after_each(&self, hook: impl Fn() + 'static) {
        with_builder(|b| b.add_after_each(Box::new(hook)));
    }
}

// ============================================================================
// ItBuilder: registers test on Drop
// ============================================================================

/// Builder returned by [`Context::it`]. Registers the test node when dropped.
pub struct ItBuilder {
    name: String,
    body: Option<Box<dyn Fn()>>,
    focused: bool,
    pending: bool,
}

impl ItBuilder {
    fn new(name: String, body: impl Fn() + 'static, focused: bool, pending: bool) -> Self {
        ItBuilder {
            name,
            body: Some(Box::new(body)),
            focused,
            pending,
        }
    }

    /// Mark the test as pending.
    pub fn pending(mut self) -> Self {
        self.pending = true;
        self
    }
}

impl Drop for ItBuilder {
    fn drop(&mut self) {
        let Some(test_fn) = self.body.take() else {
            return;
        };
        let name = std::mem::take(&mut self.name);
        let (focused, pending) = (self.focused, self.pending);
        with_builder(|b| {
            let group = b.current_node();
            b.add_node(TestNode::It {
                name,
                focused,
                pending,
                group,
                test_fn,
            });
        });
    }
}

// ============================================================================
// run(): entry point
// ============================================================================

/// Options for [`run_with`].
pub struct RunOptions {
    pub translator: Box<dyn Translator>,
    pub config: RunConfig,
}

impl RunOptions {
    /// Default translator, configuration from the process args and env.
    pub fn from_env() -> Self {
        RunOptions {
            translator: default_translator(),
            config: RunConfig::from_args(),
        }
    }

    pub fn translator(mut self, translator: impl Translator + 'static) -> Self {
        self.translator = Box::new(translator);
        self
    }
}

/// Build and run a BDD test suite.
///
/// Call it from `fn main()` in a test target with `harness = false`. Exits the
/// process with status 1 if any test failed.
pub fn run(body: impl FnOnce(Context)) {
    run_with(RunOptions::from_env(), body);
}

/// [`run`] with an explicit translator and configuration.
pub fn run_with(options: RunOptions, body: impl FnOnce(Context)) {
    let result = build_and_run(options, body);
    if result.failed > 0 {
        std::process::exit(1);
    }
}

/// Build the tree and run it, returning the result instead of exiting.
pub fn build_and_run(options: RunOptions, body: impl FnOnce(Context)) -> runner::RunResult {
    // Phase 1: build the tree
    BUILDER.with(|cell| {
        *cell.borrow_mut() = Some(SuiteBuilder::new(options.translator));
    });

    body(Context);

    let nodes = BUILDER.with(|cell| {
        cell.borrow_mut()
            .take()
            .expect("modelspec: builder missing after run")
            .into_nodes()
    });

    // Phase 2: execute the tree
    runner::run_tree(&nodes, &options.config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attributes;
    use crate::subject::{current_group, subject_attributes, Protection};
    use crate::translate::{MapTranslator, NoOpTranslator, PREFIX_KEY};
    use std::cell::RefCell;

    #[derive(Debug, Default, Clone)]
    struct Post {
        title: String,
        published: bool,
    }

    impl Model for Post {
        type Error = String;

        fn assign_attributes(&mut self, attrs: &AttributeMap, _: Protection) -> Result<(), String> {
            for (key, value) in attrs.iter() {
                match key {
                    "title" => self.title = value.as_str().ok_or("title")?.to_string(),
                    "published" => self.published = value.as_bool().ok_or("published")?,
                    "published_at" => {}
                    other => return Err(format!("unknown attribute `{other}`")),
                }
            }
            Ok(())
        }
    }

    fn options(translator: impl Translator + 'static) -> RunOptions {
        RunOptions {
            translator: Box::new(translator),
            config: RunConfig::default(),
        }
    }

    /// Records the full group path of every example that runs.
    fn record_path(log: &Rc<RefCell<Vec<String>>>) -> impl Fn() + 'static {
        let log = Rc::clone(log);
        move || log.borrow_mut().push(current_group().full_name())
    }

    #[test]
    fn test_generated_names_chain_with_connector() {
        let paths = Rc::new(RefCell::new(Vec::new()));
        let result = build_and_run(options(NoOpTranslator), |ctx| {
            ctx.describe_model::<Post>("Post", |ctx| {
                ctx.describe_attributes(attributes! { "published" => true }, |ctx| {
                    ctx.it("outer", record_path(&paths));
                    ctx.context("plain", |ctx| {
                        ctx.describe_attributes(
                            attributes! { "published_at" => "2020-01-01" },
                            |ctx| {
                                ctx.it("inner", record_path(&paths));
                            },
                        );
                    });
                });
                ctx.describe_attributes_as(attributes! { "published" => false }, "drafts", |ctx| {
                    ctx.it("explicit", record_path(&paths));
                });
                ctx.describe_attributes(attributes! {}, |ctx| {
                    ctx.it("empty", record_path(&paths));
                });
            });
        });

        assert_eq!(result.failed, 0);
        assert_eq!(
            *paths.borrow(),
            vec![
                "Post > when published is true".to_string(),
                "Post > when published is true > plain > and published at is \"2020-01-01\""
                    .to_string(),
                "Post > drafts".to_string(),
                "Post > Post".to_string(),
            ]
        );
    }

    #[test]
    fn test_injected_translator_is_used() {
        let paths = Rc::new(RefCell::new(Vec::new()));
        let translator = MapTranslator::new().with(PREFIX_KEY, "given ");
        build_and_run(options(translator), |ctx| {
            ctx.describe_model::<Post>("Post", |ctx| {
                ctx.describe_attributes(attributes! { "published" => true }, |ctx| {
                    ctx.it("x", record_path(&paths));
                });
            });
        });
        assert_eq!(*paths.borrow(), vec!["Post > given published is true".to_string()]);
    }

    #[test]
    fn test_subject_merges_defaults_and_described() {
        let result = build_and_run(options(NoOpTranslator), |ctx| {
            ctx.describe_model::<Post>("Post", |ctx| {
                ctx.default_subject_attributes(attributes! { "title" => "My title" });

                ctx.it("has no described attributes", || {
                    assert_eq!(subject_attributes(), attributes! { "title" => "My title" });
                });

                ctx.describe_attributes(attributes! { "published" => true }, |ctx| {
                    ctx.it("keeps the default title", || {
                        let post = crate::subject::<Post>();
                        assert_eq!(post.title, "My title");
                        assert!(post.published);
                    });
                });

                let overridden = attributes! { "title" => "Other", "published" => true };
                ctx.describe_attributes(overridden, |ctx| {
                    ctx.it("overrides the default title", || {
                        assert_eq!(crate::subject::<Post>().title, "Other");
                    });
                });
            });
        });
        assert_eq!((result.passed, result.failed), (3, 0));
    }

    #[test]
    fn test_assignment_error_fails_only_that_example() {
        let result = build_and_run(options(NoOpTranslator), |ctx| {
            ctx.describe_model::<Post>("Post", |ctx| {
                ctx.describe_attributes(attributes! { "colour" => "red" }, |ctx| {
                    ctx.it("cannot build", || {
                        let _ = crate::subject::<Post>();
                    });
                    ctx.it("sees the error", || {
                        assert_eq!(
                            crate::try_subject::<Post>().unwrap_err(),
                            "unknown attribute `colour`"
                        );
                    });
                });
            });
        });
        assert_eq!((result.passed, result.failed), (1, 1));
        assert!(result.failures[0].contains("unknown attribute `colour`"));
    }

    #[test]
    fn test_producer_panic_fails_only_that_example() {
        let result = build_and_run(options(NoOpTranslator), |ctx| {
            ctx.describe_model::<Post>("Post", |ctx| {
                ctx.context("broken defaults", |ctx| {
                    ctx.default_subject_attributes_with(|| panic!("producer boom"));
                    ctx.it("a", || {
                        let _ = subject_attributes();
                    });
                });
                ctx.it("b", || {
                    assert!(subject_attributes().is_empty());
                });
            });
        });
        assert_eq!((result.passed, result.failed), (1, 1));
        assert_eq!(
            result.failures,
            vec!["Post > broken defaults > a: producer boom".to_string()]
        );
    }

    #[test]
    fn test_empty_attribute_describe_declares_nothing() {
        let paths = Rc::new(RefCell::new(Vec::new()));
        let resolved = Rc::new(RefCell::new(Vec::new()));
        let record_attributes = {
            let resolved = Rc::clone(&resolved);
            move || resolved.borrow_mut().push(subject_attributes())
        };

        let result = build_and_run(options(NoOpTranslator), |ctx| {
            ctx.describe_model::<Post>("Post", |ctx| {
                ctx.describe_attributes(attributes! {}, |ctx| {
                    ctx.describe_attributes(attributes! { "published" => true }, |ctx| {
                        ctx.it("starts a new chain", record_path(&paths));
                    });
                });
                ctx.describe_attributes(attributes! { "published" => true }, |ctx| {
                    ctx.describe_attributes(attributes! {}, |ctx| {
                        ctx.it("keeps the ancestor's attributes", record_attributes);
                    });
                });
            });
        });

        assert_eq!(result.failed, 0);
        assert_eq!(
            *paths.borrow(),
            vec!["Post > Post > when published is true".to_string()]
        );
        assert_eq!(*resolved.borrow(), vec![attributes! { "published" => true }]);
    }

    #[test]
    fn test_subject_is_shared_within_an_example() {
        let result = build_and_run(options(NoOpTranslator), |ctx| {
            ctx.describe("counter", |ctx| {
                let builds = Rc::new(std::cell::Cell::new(0));
                ctx.subject(move || {
                    builds.set(builds.get() + 1);
                    builds.get()
                });
                ctx.it("builds once", || {
                    assert_eq!(crate::subject::<i32>(), 1);
                    assert_eq!(crate::subject::<i32>(), 1);
                });
                ctx.it("builds again for the next example", || {
                    assert_eq!(crate::subject::<i32>(), 2);
                });
            });
        });
        assert_eq!((result.passed, result.failed), (2, 0));
    }

    #[test]
    fn test_custom_subject_overrides_model() {
        let result = build_and_run(options(NoOpTranslator), |ctx| {
            ctx.describe_model::<Post>("Post", |ctx| {
                ctx.context("custom", |ctx| {
                    ctx.subject(|| 7_u8);
                    ctx.it("uses the custom builder", || {
                        assert_eq!(crate::subject::<u8>(), 7);
                    });
                    ctx.describe_attributes(attributes! { "published" => true }, |ctx| {
                        ctx.it("is back to the model", || {
                            assert!(crate::subject::<Post>().published);
                        });
                    });
                });
            });
        });
        assert_eq!((result.passed, result.failed), (2, 0));
    }

    #[test]
    #[should_panic(expected = "needs an enclosing describe_model")]
    fn test_attribute_describe_requires_model() {
        build_and_run(options(NoOpTranslator), |ctx| {
            ctx.describe_attributes(attributes! { "published" => true }, |_| {});
        });
    }
}
