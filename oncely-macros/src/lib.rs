use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::quote;
use syn::{parse_macro_input, ItemFn, ReturnType};

use oncely_macro_utils::{
    collect_parameters, generate_args_expr, generate_site_expr, generic_instantiation,
    is_result_type, parse_memoize_attributes, select_arguments, MemoScope,
};

/// Generate the expression yielding the memo the function stores into
fn generate_memo_expr(scope: MemoScope, krate: &TokenStream2) -> TokenStream2 {
    match scope {
        MemoScope::Instance => quote! {
            <Self as #krate::Memoize>::memo(&self)
        },
        MemoScope::Type => quote! {
            #krate::type_scope::<Self>()
        },
        MemoScope::Global => quote! {{
            static __ONCELY_MEMO: #krate::__private::Lazy<#krate::SharedMemo> =
                #krate::__private::Lazy::new(#krate::SharedMemo::new);
            &*__ONCELY_MEMO
        }},
    }
}

/// Memoizes a function or method: the body runs once per call site and
/// combination of discriminating arguments, later calls return a clone of
/// the stored result.
///
/// # Macro Parameters
///
/// - `scope` (optional): where results are stored.
///   - `"instance"` - the receiver's `InstanceMemo`, obtained through
///     `Memoize::memo`. Default for methods taking `self`.
///   - `"type"` - the scope shared by every value of `Self` (`type_scope::<Self>()`).
///   - `"global"` - a static scope private to the function. Default for
///     functions without a receiver.
/// - `args` (optional): the parameters that discriminate calls, e.g.
///   `args = [user_id]`. Default: every parameter except the receiver.
///   `args = []` runs the body once, whatever the arguments.
/// - `name` (optional): operation name of the call site. Default: the
///   function name. The call site also records the module path, file and line.
/// - `result` (optional): `true` caches only `Ok` values, `false` caches the
///   whole return value. Default: detected from the return type, which only
///   recognizes `Result<..>` spelled out; aliases like `io::Result<T>` need
///   `result = true`.
///
/// # Cache Behavior
///
/// - Discriminating arguments must implement `MemoArg`.
/// - The return type must be `Clone + Send + Sync + 'static`.
/// - `()` and `None` results are cached like any other value.
/// - For `Result<T, E>` return types only `Ok` values are cached; an `Err`
///   is returned as is and the next call runs the body again.
/// - When memoization is disabled (locally or through
///   `MEMOIZATION_GLOBALLY_DISABLED`) the body runs on every call and the
///   arguments are not inspected.
/// - Each instantiation of a generic function is its own operation
///   (`name::<T>`). Associated functions without a receiver in a generic
///   `impl` are not told apart by `Self` under the `"global"` scope; use
///   `scope = "type"` for them.
///
/// # Panics
///
/// While memoization is enabled, the generated function panics when an
/// argument cannot be used as a key (e.g. a NaN float) or when a result of
/// another type is already stored under the same call site.
///
/// # Examples
///
/// ```ignore
/// use oncely::{memoize, InstanceMemo, Memoize};
///
/// struct Catalog {
///     memo: InstanceMemo,
/// }
///
/// impl Memoize for Catalog {
///     fn memo(&self) -> &InstanceMemo {
///         &self.memo
///     }
/// }
///
/// impl Catalog {
///     #[memoize]
///     fn price(&self, sku: &str) -> Option<u32> {
///         expensive_lookup(sku)
///     }
///
///     #[memoize(scope = "type", args = [])]
///     fn currency() -> String {
///         load_currency()
///     }
/// }
///
/// #[memoize(name = "fetch_user_v1")]
/// fn fetch_user(id: u32) -> Result<User, FetchError> {
///     api_call(id)
/// }
/// ```
#[proc_macro_attribute]
pub fn memoize(attr: TokenStream, item: TokenStream) -> TokenStream {
    let attrs = match parse_memoize_attributes(attr.into()) {
        Ok(attrs) => attrs,
        Err(err) => return err.into(),
    };

    let input = parse_macro_input!(item as ItemFn);
    let fn_attrs = &input.attrs;
    let vis = &input.vis;
    let sig = &input.sig;
    let ident = &sig.ident;
    let block = &input.block;

    if sig.asyncness.is_some() {
        return syn::Error::new_spanned(&sig.asyncness, "#[memoize] does not support async functions")
            .to_compile_error()
            .into();
    }

    let ret_type = match &sig.output {
        ReturnType::Type(_, ty) => quote! { #ty },
        ReturnType::Default => quote! { () },
    };

    let (has_receiver, params) = collect_parameters(&sig.inputs);
    let scope = attrs
        .scope
        .unwrap_or_else(|| MemoScope::default_for(has_receiver));
    if scope == MemoScope::Instance && !has_receiver {
        return syn::Error::new_spanned(
            ident,
            "scope = \"instance\" needs a `self` receiver; use \"type\" or \"global\"",
        )
        .to_compile_error()
        .into();
    }

    let args = match select_arguments(attrs.args.as_deref(), params) {
        Ok(args) => args,
        Err(err) => return err.into(),
    };

    let krate = quote! { ::oncely };
    let name = attrs.name.unwrap_or_else(|| ident.to_string());
    let instantiation = generic_instantiation(&sig.generics, has_receiver, scope);
    let site_expr = generate_site_expr(&name, &instantiation, &krate);
    let args_expr = generate_args_expr(&args, &krate);
    let memo_expr = generate_memo_expr(scope, &krate);

    let caches_result = attrs
        .result
        .unwrap_or_else(|| is_result_type(&sig.output));
    let call = if caches_result {
        quote! {
            __oncely_memo.try_memoize_prepared(&__oncely_site, &prepared, __oncely_body)
        }
    } else {
        quote! {
            __oncely_memo.memoize_prepared(&__oncely_site, &prepared, __oncely_body)
        }
    };

    let expanded = quote! {
        #(#fn_attrs)*
        #vis #sig {
            let __oncely_site = #site_expr;
            let __oncely_memo = #memo_expr;
            let __oncely_prepared = match __oncely_memo.prepare(#args_expr) {
                ::core::result::Result::Ok(prepared) => prepared,
                ::core::result::Result::Err(err) => {
                    ::core::panic!("memoized call `{}`: {}", __oncely_site, err)
                }
            };
            #[allow(unused_mut)]
            let mut __oncely_body = || -> #ret_type #block;
            match __oncely_prepared {
                ::core::option::Option::None => __oncely_body(),
                ::core::option::Option::Some(prepared) => match #call {
                    ::core::result::Result::Ok(result) => result,
                    ::core::result::Result::Err(err) => {
                        ::core::panic!("memoized call `{}`: {}", __oncely_site, err)
                    }
                },
            }
        }
    };

    TokenStream::from(expanded)
}
