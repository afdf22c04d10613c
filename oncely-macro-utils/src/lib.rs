//! Parsing and code generation helpers for the `#[memoize]` attribute.
//!
//! Kept in a regular library crate so the logic can be unit tested with
//! `proc_macro2` token streams, outside of a compiler invocation.

use proc_macro2::TokenStream as TokenStream2;
use quote::quote;
use syn::{
    punctuated::Punctuated, Expr, FnArg, GenericParam, Generics, Ident, MetaNameValue, Pat,
    ReturnType, Token,
};

/// Where the results of a memoized function are kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoScope {
    /// The receiver's own `InstanceMemo`, reached through `Memoize::memo`
    Instance,
    /// The scope shared by every value of `Self`
    Type,
    /// A static scope private to the function
    Global,
}

impl MemoScope {
    /// Scope used when the attribute does not name one.
    pub fn default_for(has_receiver: bool) -> Self {
        if has_receiver {
            MemoScope::Instance
        } else {
            MemoScope::Global
        }
    }
}

/// Parsed `#[memoize(...)]` attributes
#[derive(Debug, Default)]
pub struct MemoizeAttributes {
    pub scope: Option<MemoScope>,
    pub name: Option<String>,
    /// Discriminating arguments; `None` means every non-receiver argument
    pub args: Option<Vec<Ident>>,
    /// Whether the return type is a `Result`; `None` means detect it from the signature
    pub result: Option<bool>,
}

fn compile_error(msg: &str) -> TokenStream2 {
    quote! { compile_error!(#msg); }
}

/// Parse the `scope` attribute
pub fn parse_scope_attribute(nv: &MetaNameValue) -> Result<MemoScope, TokenStream2> {
    match &nv.value {
        Expr::Lit(expr_lit) => match &expr_lit.lit {
            syn::Lit::Str(s) => match s.value().as_str() {
                "instance" => Ok(MemoScope::Instance),
                "type" => Ok(MemoScope::Type),
                "global" => Ok(MemoScope::Global),
                _ => Err(compile_error(
                    "Invalid scope: expected \"instance\", \"type\" or \"global\"",
                )),
            },
            _ => Err(compile_error("Invalid literal for `scope`: expected string")),
        },
        _ => Err(compile_error(
            "Invalid syntax for `scope`: expected `scope = \"instance\"|\"type\"|\"global\"`",
        )),
    }
}

/// Parse the `name` attribute
pub fn parse_name_attribute(nv: &MetaNameValue) -> Result<String, TokenStream2> {
    match &nv.value {
        Expr::Lit(expr_lit) => match &expr_lit.lit {
            syn::Lit::Str(s) if !s.value().is_empty() => Ok(s.value()),
            syn::Lit::Str(_) => Err(compile_error("`name` must not be empty")),
            _ => Err(compile_error("Invalid literal for `name`: expected string")),
        },
        _ => Err(compile_error(
            "Invalid syntax for `name`: expected `name = \"...\"`",
        )),
    }
}

/// Parse the `result` attribute
pub fn parse_result_attribute(nv: &MetaNameValue) -> Result<bool, TokenStream2> {
    match &nv.value {
        Expr::Lit(expr_lit) => match &expr_lit.lit {
            syn::Lit::Bool(b) => Ok(b.value),
            _ => Err(compile_error("Invalid literal for `result`: expected bool")),
        },
        _ => Err(compile_error(
            "Invalid syntax for `result`: expected `result = true|false`",
        )),
    }
}

/// Parse the `args` attribute: a possibly empty array of parameter names.
pub fn parse_args_attribute(nv: &MetaNameValue) -> Result<Vec<Ident>, TokenStream2> {
    let Expr::Array(array) = &nv.value else {
        return Err(compile_error(
            "Invalid syntax for `args`: expected `args = [param, ...]`",
        ));
    };

    array
        .elems
        .iter()
        .map(|elem| match elem {
            Expr::Path(path) if path.qself.is_none() => path
                .path
                .get_ident()
                .cloned()
                .ok_or_else(|| compile_error("`args` entries must be parameter names")),
            _ => Err(compile_error("`args` entries must be parameter names")),
        })
        .collect()
}

/// Parse memoize attributes from a token stream
pub fn parse_memoize_attributes(attr: TokenStream2) -> Result<MemoizeAttributes, TokenStream2> {
    use syn::parse::Parser;

    let parser = Punctuated::<MetaNameValue, Token![,]>::parse_terminated;
    let parsed_args = parser.parse2(attr).map_err(|e| {
        let msg = format!("Failed to parse attributes: {}", e);
        quote! { compile_error!(#msg); }
    })?;

    let mut attrs = MemoizeAttributes::default();

    for nv in parsed_args {
        if nv.path.is_ident("scope") {
            attrs.scope = Some(parse_scope_attribute(&nv)?);
        } else if nv.path.is_ident("name") {
            attrs.name = Some(parse_name_attribute(&nv)?);
        } else if nv.path.is_ident("args") {
            attrs.args = Some(parse_args_attribute(&nv)?);
        } else if nv.path.is_ident("result") {
            attrs.result = Some(parse_result_attribute(&nv)?);
        } else {
            let path = &nv.path;
            let msg = format!(
                "Unknown attribute `{}`: expected `scope`, `name`, `args` or `result`",
                quote!(#path).to_string().replace(' ', "")
            );
            return Err(quote! { compile_error!(#msg); });
        }
    }

    Ok(attrs)
}

/// Names of the non-receiver parameters, or an error for patterns that do
/// not bind a single name.
///
/// Returns whether the function has a receiver alongside the names.
pub fn collect_parameters<'a>(
    inputs: impl IntoIterator<Item = &'a FnArg>,
) -> (bool, Vec<Result<Ident, TokenStream2>>) {
    let mut has_receiver = false;
    let mut params = Vec::new();
    for arg in inputs {
        match arg {
            FnArg::Receiver(_) => has_receiver = true,
            FnArg::Typed(pat_type) => match &*pat_type.pat {
                Pat::Ident(pat_ident) => params.push(Ok(pat_ident.ident.clone())),
                _ => params.push(Err(compile_error(
                    "#[memoize] needs named parameters; list the discriminating ones with `args = [...]`",
                ))),
            },
        }
    }
    (has_receiver, params)
}

/// Resolves the discriminating arguments of a memoized function.
///
/// With no `args` attribute every parameter is used, so destructuring
/// patterns are only accepted when an explicit list leaves them out.
pub fn select_arguments(
    selected: Option<&[Ident]>,
    params: Vec<Result<Ident, TokenStream2>>,
) -> Result<Vec<Ident>, TokenStream2> {
    let Some(selected) = selected else {
        return params.into_iter().collect();
    };

    let named: Vec<Ident> = params.into_iter().filter_map(Result::ok).collect();
    for ident in selected {
        if !named.contains(ident) {
            let msg = format!("`args` names `{}`, which is not a parameter", ident);
            return Err(quote! { compile_error!(#msg); });
        }
    }
    Ok(selected.to_vec())
}

/// Detect `Result` return types.
///
/// Only the spellings `Result<..>`, `std::result::Result<..>` and
/// `core::result::Result<..>` are recognized; aliases such as `io::Result<T>`
/// need `result = true`.
pub fn is_result_type(output: &ReturnType) -> bool {
    match output {
        ReturnType::Type(_, ty) => {
            let s = quote!(#ty).to_string().replace(' ', "");
            s.starts_with("Result<")
                || s.starts_with("std::result::Result<")
                || s.starts_with("::std::result::Result<")
                || s.starts_with("core::result::Result<")
        }
        ReturnType::Default => false,
    }
}

/// Generate the argument slice handed to `Memo::prepare`
pub fn generate_args_expr(args: &[Ident], krate: &TokenStream2) -> TokenStream2 {
    quote! {
        &[ #( &#args as &dyn #krate::MemoArg ),* ]
    }
}

/// Expressions naming the instantiation a generic function runs as.
///
/// Every type parameter contributes its `type_name`, every const parameter
/// its value. Lifetimes do not change the result type and are skipped. For
/// `"global"` methods the receiver type is added too, since one static
/// memo serves every instantiation of a generic `impl`.
pub fn generic_instantiation(
    generics: &Generics,
    has_receiver: bool,
    scope: MemoScope,
) -> Vec<TokenStream2> {
    let mut parts = Vec::new();
    if has_receiver && scope == MemoScope::Global {
        parts.push(quote! {
            ::std::string::String::from(::core::any::type_name::<Self>())
        });
    }
    for param in &generics.params {
        match param {
            GenericParam::Type(ty) => {
                let ident = &ty.ident;
                parts.push(quote! {
                    ::std::string::String::from(::core::any::type_name::<#ident>())
                });
            }
            GenericParam::Const(cp) => {
                let ident = &cp.ident;
                parts.push(quote! { ::std::format!("{:?}", #ident) });
            }
            GenericParam::Lifetime(_) => {}
        }
    }
    parts
}

/// Generate the call site expression for an operation name.
///
/// With a non-empty `instantiation` the operation becomes `name::<A, B>`, so
/// each instantiation of a generic function gets its own entries.
pub fn generate_site_expr(
    name: &str,
    instantiation: &[TokenStream2],
    krate: &TokenStream2,
) -> TokenStream2 {
    let site = quote! {
        #krate::CallSiteId::new(
            ::core::concat!(::core::module_path!(), "::", #name),
            ::core::file!(),
            ::core::line!(),
            ::core::column!(),
        )
    };
    if instantiation.is_empty() {
        return site;
    }
    quote! {{
        let site = #site;
        let instantiation: ::std::vec::Vec<::std::string::String> = ::std::vec![ #( #instantiation ),* ];
        let operation = ::std::format!("{}::<{}>", site.operation(), instantiation.join(", "));
        site.with_operation(operation)
    }}
}
