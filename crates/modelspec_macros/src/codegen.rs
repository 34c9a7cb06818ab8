//! Code generation: lowers the DSL AST onto the `modelspec` closure API.

use proc_macro2::{Ident, Span, TokenStream, TokenTree};
use quote::quote;
use syn::Path;

use crate::dsl::*;

// ============================================================================
// Public entry point
// ============================================================================

/// Generate a `fn main()` that builds the tree and runs it.
pub fn generate(suite: Suite) -> syn::Result<TokenStream> {
    let mut ctx = GenContext::default();
    let items = generate_items(&suite.items, &mut ctx)?;

    Ok(quote! {
        fn main() {
            modelspec::run(|ctx| {
                #items
            });
        }
    })
}

// ============================================================================
// Generation context: tracks inherited hooks and the subject in scope
// ============================================================================

#[derive(Clone)]
enum SubjectSource {
    /// Built by the runtime from the described model type.
    Model(Path),
    /// `subject { expr }`, inlined into each test body.
    Inline(TokenStream),
}

#[derive(Clone, Default)]
struct GenContext {
    /// Accumulated before_each blocks (outermost first).
    before_each: Vec<TokenStream>,
    /// Accumulated after_each blocks (outermost first, reversed at use site).
    after_each: Vec<TokenStream>,
    /// Nearest model describe.
    model: Option<Path>,
    subject: Option<SubjectSource>,
    /// Counter for nameless `it { ... }` blocks in this scope.
    nameless: usize,
}

impl GenContext {
    fn child(&self) -> Self {
        GenContext {
            nameless: 0,
            ..self.clone()
        }
    }
}

// ============================================================================
// Item generation
// ============================================================================

fn generate_items(items: &[DslItem], ctx: &mut GenContext) -> syn::Result<TokenStream> {
    let mut output = TokenStream::new();

    for item in items {
        match item {
            DslItem::BeforeEach(hook) => {
                ctx.before_each.push(hook.body.clone());
            }
            DslItem::AfterEach(hook) => {
                ctx.after_each.push(hook.body.clone());
            }
            DslItem::Subject(hook) => {
                ctx.subject = Some(SubjectSource::Inline(hook.body.clone()));
            }
            DslItem::DefaultAttributes(hook) => {
                let body = &hook.body;
                output.extend(quote! {
                    ctx.default_subject_attributes_with(|| -> modelspec::AttributeMap { #body });
                });
                if let Some(model) = &ctx.model {
                    ctx.subject = Some(SubjectSource::Model(model.clone()));
                }
            }
            DslItem::Describe(block) => {
                output.extend(generate_describe(block, ctx)?);
            }
            DslItem::It(block) => {
                output.extend(generate_it(block, ctx));
            }
        }
    }

    Ok(output)
}

// ============================================================================
// describe / context / when
// ============================================================================

fn generate_describe(block: &DescribeBlock, ctx: &GenContext) -> syn::Result<TokenStream> {
    let mut child_ctx = ctx.child();

    let (method, turbofish, args) = match &block.target {
        DescribeTarget::Text(name) => (variant("", block), quote! {}, vec![quote! { #name }]),
        DescribeTarget::Model { path, name } => {
            let name = match name {
                Some(name) => name.value(),
                None => path_display_name(path),
            };
            child_ctx.model = Some(path.clone());
            child_ctx.subject = Some(SubjectSource::Model(path.clone()));
            (
                variant("_model", block),
                quote! { ::<#path> },
                vec![quote! { #name }],
            )
        }
        DescribeTarget::Attributes { attributes, name } => {
            let Some(model) = ctx.model.clone() else {
                let span = attributes
                    .first()
                    .map_or_else(Span::call_site, |pair| pair.key.span());
                return Err(syn::Error::new(
                    span,
                    "attribute describes need an enclosing model describe, e.g. `describe Post { ... }`",
                ));
            };
            child_ctx.subject = Some(SubjectSource::Model(model));

            let keys = attributes.iter().map(|pair| &pair.key);
            let values = attributes.iter().map(|pair| &pair.value);
            let map = quote! { modelspec::attributes! { #(#keys => #values),* } };
            match name {
                Some(name) => (
                    variant("_attributes_as", block),
                    quote! {},
                    vec![map, quote! { #name }],
                ),
                None => (variant("_attributes", block), quote! {}, vec![map]),
            }
        }
    };

    let inner = generate_items(&block.items, &mut child_ctx)?;
    Ok(quote! {
        ctx.#method #turbofish(#(#args,)* |ctx| {
            #inner
        });
    })
}

/// `describe` + suffix, with the `f`/`x` prefix the block asks for.
fn variant(suffix: &str, block: &DescribeBlock) -> Ident {
    let prefix = if block.focused {
        "f"
    } else if block.pending {
        "x"
    } else {
        ""
    };
    Ident::new(&format!("{prefix}describe{suffix}"), Span::call_site())
}

fn path_display_name(path: &Path) -> String {
    path.segments
        .last()
        .map(|segment| segment.ident.to_string())
        .unwrap_or_default()
}

// ============================================================================
// it / specify
// ============================================================================

fn generate_it(block: &ItBlock, ctx: &mut GenContext) -> TokenStream {
    let name = match &block.name {
        Some(name) => name.value(),
        None => {
            ctx.nameless += 1;
            format!("spec_{}", ctx.nameless)
        }
    };
    let body = &block.body;

    let method = if block.pending {
        quote! { xit }
    } else if block.focused {
        quote! { fit }
    } else {
        quote! { it }
    };

    // Inline before_each (outermost first)
    let before_each_code: Vec<_> = ctx.before_each.iter().collect();

    // Bind `subject` only where the body or an after_each hook refers to it
    let uses_subject = mentions_subject(body)
        || ctx.after_each.iter().any(mentions_subject);
    let subject_code = match (&ctx.subject, uses_subject) {
        (Some(SubjectSource::Model(path)), true) => quote! {
            let subject: #path = modelspec::subject::<#path>();
        },
        (Some(SubjectSource::Inline(expr)), true) => quote! {
            let subject = { #expr };
        },
        _ => quote! {},
    };

    // Inline after_each via Guard (innermost first for proper cleanup order)
    let after_each_guards: Vec<TokenStream> = ctx
        .after_each
        .iter()
        .rev()
        .enumerate()
        .map(|(i, after_body)| {
            let guard_name = Ident::new(&format!("_after_each_guard_{i}"), Span::call_site());
            quote! {
                let #guard_name = modelspec::Guard::new(|| { #after_body });
            }
        })
        .collect();

    quote! {
        ctx.#method(#name, || {
            #(#before_each_code)*
            #subject_code
            #(#after_each_guards)*
            #body
        });
    }
}

/// Whether `tokens` contain the identifier `subject` (not as a path segment
/// or method name, e.g. `modelspec::subject` or `.subject()`).
fn mentions_subject(tokens: &TokenStream) -> bool {
    let mut previous: Option<TokenTree> = None;
    for token in tokens.clone() {
        let found = match &token {
            TokenTree::Ident(ident) if ident == "subject" => !matches!(
                &previous,
                Some(TokenTree::Punct(p)) if p.as_char() == ':' || p.as_char() == '.'
            ),
            TokenTree::Group(group) => mentions_subject(&group.stream()),
            _ => false,
        };
        if found {
            return true;
        }
        previous = Some(token);
    }
    false
}
