//! Proc macros for the `modelspec` BDD testing framework.

mod codegen;
mod dsl;

/// Block DSL for model specs: generates a `fn main()` for a `harness = false`
/// test target.
///
/// # Example
///
/// ```text
/// modelspec::spec! {
///     describe Post {
///         default_attributes { modelspec::attributes! { "title" => "My title" } }
///
///         describe (published: true) {
///             it "is published" {
///                 assert!(subject.published);
///                 assert_eq!(subject.title, "My title");
///             }
///
///             describe (title: "Other") {
///                 it "overrides the default title" {
///                     assert_eq!(subject.title, "Other");
///                 }
///             }
///         }
///
///         describe (published: false) "drafts" {
///             it { assert!(!subject.published); }
///         }
///     }
/// }
/// ```
///
/// # Supported DSL keywords
///
/// ## Containers
/// - `describe "name" { ... }` / `context "name" { ... }` / `when "name" { ... }`
/// - `describe Path { ... }` / `describe Path "name" { ... }`: describe a
///   [`Model`](https://docs.rs/modelspec) type; `subject` is the
///   example's instance (the model must be `Clone`)
/// - `describe (key: value, ...) { ... }`: describe the enclosing model with
///   these attributes; the name is generated ("when key is value")
/// - `describe (key: value, ...) "name" { ... }`: same, with explicit name
/// - `f` prefix (`fdescribe`, `fcontext`, `fwhen`): focused;
///   `x`/`p` prefix: pending
///
/// ## Specs
/// - `it "name" { ... }` / `specify "name" { ... }`
/// - `it { ... }`: nameless spec (auto-named `spec_1`, `spec_2`, etc.)
/// - `fit` / `fspecify`: focused; `xit` / `xspecify` / `pit` / `pspecify`: pending
///
/// ## Hooks and fixtures
/// - `before_each { ... }`: inlined before every spec in scope, so its `let`
///   bindings are visible to the spec body
/// - `after_each { ... }`: runs after every spec in scope, even on panic
/// - `subject { expr }`: custom subject, bound as `let subject = { expr };`
/// - `default_attributes { expr }`: default attribute map for the model
///   subject, re-evaluated for every spec
///
/// `subject` is only bound in specs whose body (or an `after_each` hook)
/// mentions it.
#[proc_macro]
pub fn spec(input: proc_macro::TokenStream) -> proc_macro::TokenStream {
    let suite = syn::parse_macro_input!(input as dsl::Suite);
    codegen::generate(suite)
        .unwrap_or_else(syn::Error::into_compile_error)
        .into()
}
