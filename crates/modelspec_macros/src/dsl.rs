//! DSL AST types and `syn::parse::Parse` implementations.

use proc_macro2::TokenStream;
use syn::parse::{Parse, ParseStream};
use syn::{braced, parenthesized, Expr, Ident, LitStr, Path, Result, Token};

// ============================================================================
// AST types
// ============================================================================

/// Top-level suite: a list of DSL items.
#[derive(Debug)]
pub struct Suite {
    pub items: Vec<DslItem>,
}

/// A single DSL node.
#[derive(Debug)]
pub enum DslItem {
    Describe(DescribeBlock),
    It(ItBlock),
    BeforeEach(HookBlock),
    AfterEach(HookBlock),
    Subject(HookBlock),
    DefaultAttributes(HookBlock),
}

/// What a describe block is about.
#[derive(Debug)]
pub enum DescribeTarget {
    /// `describe "text" { ... }`
    Text(LitStr),
    /// `describe Post { ... }` / `describe Post "text" { ... }`
    Model { path: Path, name: Option<LitStr> },
    /// `describe (published: true) { ... }` / `describe (published: true) "text" { ... }`
    Attributes {
        attributes: Vec<AttributePair>,
        name: Option<LitStr>,
    },
}

/// One `key: value` entry of an attribute describe.
#[derive(Debug)]
pub struct AttributePair {
    pub key: LitStr,
    pub value: Expr,
}

/// `describe` / `context` / `when`, with `f` (focused) and `x`/`p` (pending) variants.
#[derive(Debug)]
pub struct DescribeBlock {
    pub target: DescribeTarget,
    pub focused: bool,
    pub pending: bool,
    pub items: Vec<DslItem>,
}

/// `it "name" { ... }` / `specify "name" { ... }` / `it { ... }`
#[derive(Debug)]
pub struct ItBlock {
    pub name: Option<LitStr>,
    pub focused: bool,
    pub pending: bool,
    pub body: TokenStream,
}

/// `before_each { ... }`, `after_each { ... }`, `subject { ... }`,
/// `default_attributes { ... }`
#[derive(Debug)]
pub struct HookBlock {
    pub body: TokenStream,
}

// ============================================================================
// Parsing
// ============================================================================

impl Parse for Suite {
    fn parse(input: ParseStream) -> Result<Self> {
        let items = parse_items(input)?;
        Ok(Suite { items })
    }
}

/// Parse a sequence of DSL items until the stream is exhausted.
fn parse_items(input: ParseStream) -> Result<Vec<DslItem>> {
    let mut items = Vec::new();
    while !input.is_empty() {
        items.push(input.parse::<DslItem>()?);
    }
    Ok(items)
}

impl Parse for DslItem {
    fn parse(input: ParseStream) -> Result<Self> {
        let ident: Ident = input.parse()?;
        let name = ident.to_string();

        match name.as_str() {
            "describe" | "context" | "when" => {
                Ok(DslItem::Describe(parse_describe_block(input, false, false)?))
            }
            "fdescribe" | "fcontext" | "fwhen" => {
                Ok(DslItem::Describe(parse_describe_block(input, true, false)?))
            }
            "xdescribe" | "xcontext" | "xwhen" | "pdescribe" | "pcontext" | "pwhen" => {
                Ok(DslItem::Describe(parse_describe_block(input, false, true)?))
            }

            "it" | "specify" => Ok(DslItem::It(parse_it_block(input, false, false)?)),
            "fit" | "fspecify" => Ok(DslItem::It(parse_it_block(input, true, false)?)),
            "xit" | "xspecify" | "pit" | "pspecify" => {
                Ok(DslItem::It(parse_it_block(input, false, true)?))
            }

            "before_each" => Ok(DslItem::BeforeEach(parse_hook_block(input)?)),
            "after_each" => Ok(DslItem::AfterEach(parse_hook_block(input)?)),
            "subject" => Ok(DslItem::Subject(parse_hook_block(input)?)),
            "default_attributes" => Ok(DslItem::DefaultAttributes(parse_hook_block(input)?)),

            _ => Err(syn::Error::new(
                ident.span(),
                format!(
                    "unknown DSL keyword `{name}`. Expected one of: \
                     describe, context, when, it, specify, before_each, after_each, \
                     subject, default_attributes \
                     (with optional f/x/p prefix for focus/pending)"
                ),
            )),
        }
    }
}

// ============================================================================
// Block parsers
// ============================================================================

/// Parse: `<target> { items... }`
fn parse_describe_block(input: ParseStream, focused: bool, pending: bool) -> Result<DescribeBlock> {
    let target = if input.peek(LitStr) {
        DescribeTarget::Text(input.parse()?)
    } else if input.peek(syn::token::Paren) {
        let content;
        parenthesized!(content in input);
        let attributes = parse_attribute_pairs(&content)?;
        if attributes.is_empty() {
            return Err(content.error("expected at least one `key: value` attribute"));
        }
        let name = optional_name(input)?;
        DescribeTarget::Attributes { attributes, name }
    } else {
        let path: Path = input.parse()?;
        let name = optional_name(input)?;
        DescribeTarget::Model { path, name }
    };

    let content;
    braced!(content in input);
    let items = parse_items(&content)?;
    Ok(DescribeBlock {
        target,
        focused,
        pending,
        items,
    })
}

fn optional_name(input: ParseStream) -> Result<Option<LitStr>> {
    if input.peek(LitStr) {
        Ok(Some(input.parse()?))
    } else {
        Ok(None)
    }
}

/// Parse: `key: value, "other key": value, ...`
fn parse_attribute_pairs(input: ParseStream) -> Result<Vec<AttributePair>> {
    let mut pairs = Vec::new();
    while !input.is_empty() {
        let key = if input.peek(LitStr) {
            input.parse::<LitStr>()?
        } else {
            let ident: Ident = input.call(syn::ext::IdentExt::parse_any)?;
            LitStr::new(&ident.to_string(), ident.span())
        };
        input.parse::<Token![:]>()?;
        let value: Expr = input.parse()?;
        pairs.push(AttributePair { key, value });
        if !input.is_empty() {
            input.parse::<Token![,]>()?;
        }
    }
    Ok(pairs)
}

/// Parse: `["name"] { body }`
fn parse_it_block(input: ParseStream, focused: bool, pending: bool) -> Result<ItBlock> {
    let name = optional_name(input)?;
    let body_content;
    braced!(body_content in input);
    let body: TokenStream = body_content.parse()?;

    Ok(ItBlock {
        name,
        focused,
        pending,
        body,
    })
}

/// Parse: `{ body }`
fn parse_hook_block(input: ParseStream) -> Result<HookBlock> {
    let content;
    braced!(content in input);
    let body: TokenStream = content.parse()?;
    Ok(HookBlock { body })
}
