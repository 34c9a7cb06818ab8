//! BDD-style test runner with colored, indented tree output.
//!
//! Used with `harness = false` test targets:
//!
//! ```text
//! Post
//!   when published is true
//!     ✓ is visible
//!     and title is "Draft"
//!       ✗ is listed
//! ```

use crate::group::GroupNode;
use crate::subject;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::rc::Rc;
use std::time::Instant;

// ============================================================================
// Test tree types
// ============================================================================

pub type Hook = Box<dyn Fn()>;

/// A node in the BDD test tree.
pub enum TestNode {
    /// A describe/context/when container.
    Describe {
        name: String,
        focused: bool,
        pending: bool,
        before_each: Vec<Hook>,
        after_each: Vec<Hook>,
        children: Vec<TestNode>,
    },
    /// An individual test case, run with `group` as the active example group.
    It {
        name: String,
        focused: bool,
        pending: bool,
        group: Rc<GroupNode>,
        test_fn: Box<dyn Fn()>,
    },
}

// ============================================================================
// ANSI color helpers
// ============================================================================

fn use_color() -> bool {
    // Respect NO_COLOR env var (https://no-color.org/)
    if std::env::var("NO_COLOR").is_ok() {
        return false;
    }
    std::io::IsTerminal::is_terminal(&std::io::stdout())
}

fn paint(code: &str, s: &str) -> String {
    if use_color() {
        format!("\x1b[{code}m{s}\x1b[0m")
    } else {
        s.to_string()
    }
}

fn green(s: &str) -> String {
    paint("32", s)
}

fn red(s: &str) -> String {
    paint("31", s)
}

fn yellow(s: &str) -> String {
    paint("33", s)
}

fn bold(s: &str) -> String {
    paint("1", s)
}

fn dim(s: &str) -> String {
    paint("2", s)
}

// ============================================================================
// Runner
// ============================================================================

/// Results from running a test tree.
#[derive(Debug, Default)]
pub struct RunResult {
    pub passed: usize,
    pub failed: usize,
    pub pending: usize,
    pub skipped: usize,
    pub failures: Vec<String>,
}

/// Configuration parsed from command-line args and the environment.
#[derive(Debug, Clone, Default)]
pub struct RunConfig {
    /// Filter string: only run tests whose full path contains this.
    pub filter: Option<String>,
    /// Only list tests, don't run them.
    pub list: bool,
    /// Include ignored/pending tests in the run.
    pub include_ignored: bool,
    /// Fail the run when focused tests are present (`MODELSPEC_FAIL_ON_FOCUS`).
    pub fail_on_focus: bool,
}

impl RunConfig {
    /// Parse from the process args (compatible with `cargo test -- <args>`).
    pub fn from_args() -> Self {
        let mut config = RunConfig::parse(std::env::args().skip(1));
        config.fail_on_focus = std::env::var("MODELSPEC_FAIL_ON_FOCUS")
            .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
            .unwrap_or(false);
        config
    }

    /// Parse an argument list (binary name excluded).
    pub fn parse(args: impl IntoIterator<Item = String>) -> Self {
        let mut config = RunConfig::default();
        for arg in args {
            match arg.as_str() {
                "--list" => config.list = true,
                "--include-ignored" | "--ignored" => config.include_ignored = true,
                a if !a.starts_with('-') => config.filter = Some(arg),
                _ => {} // ignore unknown flags
            }
        }
        config
    }
}

/// Inherited state while walking the tree.
#[derive(Clone)]
struct Scope<'a> {
    depth: usize,
    path: Vec<String>,
    focused: bool,
    pending: bool,
    before_each: Vec<&'a Hook>,
    after_each: Vec<&'a Hook>,
}

/// Run a test tree, printing the report and a summary.
pub fn run_tree(nodes: &[TestNode], config: &RunConfig) -> RunResult {
    let focus_mode = tree_has_focus(nodes);
    let mut result = RunResult::default();
    let start = Instant::now();

    if config.list {
        list_tree(nodes, &[], config);
        return result;
    }

    println!();

    let scope = Scope {
        depth: 0,
        path: Vec::new(),
        focused: false,
        pending: false,
        before_each: Vec::new(),
        after_each: Vec::new(),
    };
    run_nodes(nodes, &scope, focus_mode, config, &mut result);

    if focus_mode && config.fail_on_focus {
        result.failed += 1;
        result.failures.push(
            "focused tests detected but MODELSPEC_FAIL_ON_FOCUS is set; \
             remove fit/fdescribe/fcontext before pushing"
                .to_string(),
        );
    }

    print_summary(&result, start.elapsed());

    result
}

fn run_nodes<'a>(
    nodes: &'a [TestNode],
    scope: &Scope<'a>,
    focus_mode: bool,
    config: &RunConfig,
    result: &mut RunResult,
) {
    let indent = "  ".repeat(scope.depth);

    for node in nodes {
        match node {
            TestNode::Describe {
                name,
                focused,
                pending,
                before_each,
                after_each,
                children,
            } => {
                println!("{indent}{}", bold(name));
                let mut child = scope.clone();
                child.depth += 1;
                child.path.push(name.clone());
                child.focused |= *focused;
                child.pending |= *pending;
                child.before_each.extend(before_each.iter());
                child.after_each.extend(after_each.iter());
                run_nodes(children, &child, focus_mode, config, result);
            }
            TestNode::It {
                name,
                focused,
                pending,
                group,
                test_fn,
            } => {
                let full_path = join_path(&scope.path, name);

                if !matches_filter(&full_path, config) {
                    continue;
                }

                if *pending || scope.pending {
                    println!("{indent}  {} {}", yellow("-"), dim(name));
                    result.pending += 1;
                    continue;
                }

                if focus_mode && !(*focused || scope.focused) && !config.include_ignored {
                    result.skipped += 1;
                    continue;
                }

                let start = Instant::now();
                let outcome = {
                    let _active = subject::enter(Rc::clone(group));
                    let body = catch_unwind(AssertUnwindSafe(|| {
                        for hook in &scope.before_each {
                            hook();
                        }
                        test_fn();
                    }));
                    // after_each runs innermost first, even when the body panicked
                    let teardown = catch_unwind(AssertUnwindSafe(|| {
                        for hook in scope.after_each.iter().rev() {
                            hook();
                        }
                    }));
                    body.and(teardown)
                };
                let ms = start.elapsed().as_millis();
                let time_str = if ms > 100 {
                    format!(" {}", dim(&format!("({ms}ms)")))
                } else {
                    String::new()
                };

                match outcome {
                    Ok(()) => {
                        println!("{indent}  {} {name}{time_str}", green("✓"));
                        result.passed += 1;
                    }
                    Err(e) => {
                        let msg = panic_message(e.as_ref());
                        println!("{indent}  {} {}{time_str}", red("✗"), red(name));
                        println!("{indent}    {}", red(&format!("Error: {msg}")));
                        result.failed += 1;
                        result.failures.push(format!("{full_path}: {msg}"));
                    }
                }
            }
        }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

fn join_path(path: &[String], name: &str) -> String {
    let mut p = path.to_vec();
    p.push(name.to_string());
    p.join(" > ")
}

fn matches_filter(full_path: &str, config: &RunConfig) -> bool {
    match config.filter {
        Some(ref f) => full_path.to_lowercase().contains(&f.to_lowercase()),
        None => true,
    }
}

fn print_summary(result: &RunResult, elapsed: std::time::Duration) {
    let elapsed_str = format!("{:.3}s", elapsed.as_secs_f64());

    let parts: Vec<String> = [
        (result.passed > 0).then(|| green(&format!("{} passed", result.passed))),
        (result.failed > 0).then(|| red(&format!("{} failed", result.failed))),
        (result.pending > 0).then(|| yellow(&format!("{} pending", result.pending))),
        (result.skipped > 0).then(|| dim(&format!("{} skipped", result.skipped))),
    ]
    .into_iter()
    .flatten()
    .collect();

    let summary = format!("{} ({})", parts.join(", "), dim(&elapsed_str));

    println!();
    if result.failed > 0 {
        println!("{}", red("FAIL"));
        println!("{summary}");
        println!();
        println!("Failures:");
        for (i, failure) in result.failures.iter().enumerate() {
            println!("  {}. {}", i + 1, failure);
        }
        println!();
    } else {
        println!("{}", green("PASS"));
        println!("{summary}");
    }
}

fn list_tree(nodes: &[TestNode], path: &[String], config: &RunConfig) {
    for node in nodes {
        match node {
            TestNode::Describe { name, children, .. } => {
                let mut child_path = path.to_vec();
                child_path.push(name.clone());
                list_tree(children, &child_path, config);
            }
            TestNode::It { name, pending, .. } => {
                let full_path = join_path(path, name);
                if !matches_filter(&full_path, config) {
                    continue;
                }
                if *pending {
                    println!("{full_path} (pending)");
                } else {
                    println!("{full_path}");
                }
            }
        }
    }
}

fn tree_has_focus(nodes: &[TestNode]) -> bool {
    nodes.iter().any(|node| match node {
        TestNode::It { focused, .. } => *focused,
        TestNode::Describe {
            focused, children, ..
        } => *focused || tree_has_focus(children),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    fn config() -> RunConfig {
        RunConfig::default()
    }

    fn it(name: &str, group: &Rc<GroupNode>, f: impl Fn() + 'static) -> TestNode {
        TestNode::It {
            name: name.to_string(),
            focused: false,
            pending: false,
            group: Rc::clone(group),
            test_fn: Box::new(f),
        }
    }

    #[test]
    fn test_parse_args() {
        let config = RunConfig::parse(["--list".to_string(), "published".to_string()]);
        assert!(config.list);
        assert_eq!(config.filter.as_deref(), Some("published"));
        assert!(!config.include_ignored);
    }

    #[test]
    fn test_counts_pass_fail_pending() {
        let root = GroupNode::root();
        let nodes = vec![TestNode::Describe {
            name: "group".to_string(),
            focused: false,
            pending: false,
            before_each: Vec::new(),
            after_each: Vec::new(),
            children: vec![
                it("passes", &root, || {}),
                it("fails", &root, || panic!("boom")),
                TestNode::It {
                    name: "later".to_string(),
                    focused: false,
                    pending: true,
                    group: Rc::clone(&root),
                    test_fn: Box::new(|| {}),
                },
            ],
        }];
        let result = run_tree(&nodes, &config());
        assert_eq!((result.passed, result.failed, result.pending), (1, 1, 1));
        assert_eq!(result.failures, vec!["group > fails: boom".to_string()]);
    }

    #[test]
    fn test_hooks_wrap_body_in_order_even_on_panic() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let root = GroupNode::root();
        let hook = |tag: &'static str| -> Hook {
            let log = Rc::clone(&log);
            Box::new(move || log.borrow_mut().push(tag))
        };
        let body_log = Rc::clone(&log);

        let nodes = vec![TestNode::Describe {
            name: "outer".to_string(),
            focused: false,
            pending: false,
            before_each: vec![hook("outer before")],
            after_each: vec![hook("outer after")],
            children: vec![TestNode::Describe {
                name: "inner".to_string(),
                focused: false,
                pending: false,
                before_each: vec![hook("inner before")],
                after_each: vec![hook("inner after")],
                children: vec![it("body", &root, move || {
                    body_log.borrow_mut().push("body");
                    panic!("fails");
                })],
            }],
        }];

        let result = run_tree(&nodes, &config());
        assert_eq!(result.failed, 1);
        assert_eq!(
            *log.borrow(),
            vec!["outer before", "inner before", "body", "inner after", "outer after"]
        );
    }

    #[test]
    fn test_list_mode_runs_nothing() {
        let root = GroupNode::root();
        let nodes = vec![it("would fail", &root, || panic!("listed only"))];
        let config = RunConfig {
            list: true,
            ..RunConfig::default()
        };
        let result = run_tree(&nodes, &config);
        assert_eq!((result.passed, result.failed), (0, 0));
    }

    #[test]
    fn test_fail_on_focus_adds_a_failure() {
        let root = GroupNode::root();
        let nodes = vec![TestNode::It {
            name: "focused".to_string(),
            focused: true,
            pending: false,
            group: Rc::clone(&root),
            test_fn: Box::new(|| {}),
        }];
        let config = RunConfig {
            fail_on_focus: true,
            ..RunConfig::default()
        };
        let result = run_tree(&nodes, &config);
        assert_eq!((result.passed, result.failed), (1, 1));
        assert!(result.failures[0].contains("MODELSPEC_FAIL_ON_FOCUS"));
    }

    #[test]
    fn test_focus_skips_unfocused() {
        let root = GroupNode::root();
        let nodes = vec![
            TestNode::Describe {
                name: "focused".to_string(),
                focused: true,
                pending: false,
                before_each: Vec::new(),
                after_each: Vec::new(),
                children: vec![it("runs", &root, || {})],
            },
            it("skipped", &root, || panic!("should not run")),
        ];
        let result = run_tree(&nodes, &config());
        assert_eq!((result.passed, result.skipped, result.failed), (1, 1, 0));
    }

    #[test]
    fn test_filter_matches_full_path() {
        let root = GroupNode::root();
        let nodes = vec![TestNode::Describe {
            name: "Post".to_string(),
            focused: false,
            pending: false,
            before_each: Vec::new(),
            after_each: Vec::new(),
            children: vec![it("a", &root, || {}), it("b", &root, || panic!("filtered"))],
        }];
        let config = RunConfig {
            filter: Some("post > A".to_string()),
            ..RunConfig::default()
        };
        let result = run_tree(&nodes, &config);
        assert_eq!((result.passed, result.failed), (1, 0));
    }
}
