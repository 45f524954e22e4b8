//! Procedural macros for the bizctx tracing layer
//!
//! This crate provides the `#[traced_repository]` attribute, which routes
//! every repository method through the `PersistenceAspect` of its receiver.

use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::quote;
use syn::{
    parse_macro_input, punctuated::Punctuated, Attribute, Expr, ExprLit, ImplItem, ImplItemFn,
    ItemImpl, Lit, Meta, ReturnType, Signature, Token, Type,
};

/// Marker attribute that leaves a single method untouched
const UNTRACED_MARKER: &str = "untraced";

/// The `#[traced_repository]` procedural macro
///
/// Rewrites every method of an impl block that takes `self` and returns a
/// `Result` so that its body runs inside
/// `PersistenceAspect::intercept` (or `intercept_async` for `async fn`).
/// The implementing type must implement `bizctx::aspect::Intercepted`, the
/// `Ok` type must implement `bizctx::context::Traceable` and the error type
/// must implement `bizctx::error::BusinessFailure`.
///
/// # Example
///
/// ```rust,ignore
/// use bizctx::aspect::{Intercepted, PersistenceAspect};
/// use bizctx::traced_repository;
///
/// struct CardRepository {
///     aspect: PersistenceAspect,
///     cards: Vec<Card>,
/// }
///
/// impl Intercepted for CardRepository {
///     fn aspect(&self) -> &PersistenceAspect {
///         &self.aspect
///     }
/// }
///
/// #[traced_repository(entity = "Card")]
/// impl CardRepository {
///     fn find_by_customer_id(&self, customer_id: &str) -> Result<Vec<Card>, RepositoryError> {
///         Ok(self.cards.iter().filter(|c| c.customer_id == customer_id).cloned().collect())
///     }
///
///     #[untraced]
///     fn len(&self) -> Result<usize, RepositoryError> {
///         Ok(self.cards.len())
///     }
/// }
/// ```
///
/// Arguments:
/// - `entity = "..."`: entity name used in span names (`"{entity}.{method}"`);
///   defaults to the name of the implementing type.
///
/// Methods marked `#[untraced]`, associated functions and methods that don't
/// return a `Result` are left as written. When combined with `#[async_trait]`
/// this attribute must come first so it sees the `async fn` bodies.
#[proc_macro_attribute]
pub fn traced_repository(args: TokenStream, input: TokenStream) -> TokenStream {
    let args = parse_macro_input!(args with Punctuated::<Meta, Token![,]>::parse_terminated);
    let item_impl = parse_macro_input!(input as ItemImpl);

    match generate_traced_impl(args, item_impl) {
        Ok(tokens) => tokens.into(),
        Err(err) => err.to_compile_error().into(),
    }
}

/// Generate the rewritten impl block
fn generate_traced_impl(
    args: Punctuated<Meta, Token![,]>,
    mut item_impl: ItemImpl,
) -> syn::Result<TokenStream2> {
    let config = parse_repository_args(&args)?;
    let entity = match config.entity {
        Some(entity) => entity,
        None => self_type_name(&item_impl.self_ty)?,
    };

    for item in &mut item_impl.items {
        if let ImplItem::Fn(method) = item {
            if take_untraced_marker(&mut method.attrs) || !is_interceptable(&method.sig) {
                continue;
            }
            wrap_method(&entity, method)?;
        }
    }

    Ok(quote! { #item_impl })
}

/// Configuration for the traced_repository macro
#[derive(Debug, Default)]
struct RepositoryConfig {
    entity: Option<String>,
}

/// Parse traced_repository macro arguments
fn parse_repository_args(args: &Punctuated<Meta, Token![,]>) -> syn::Result<RepositoryConfig> {
    let mut config = RepositoryConfig::default();

    for arg in args {
        match arg {
            Meta::NameValue(nv) if nv.path.is_ident("entity") => {
                if let Expr::Lit(ExprLit {
                    lit: Lit::Str(lit_str),
                    ..
                }) = &nv.value
                {
                    let entity = lit_str.value();
                    if entity.trim().is_empty() {
                        return Err(syn::Error::new_spanned(lit_str, "entity must not be empty"));
                    }
                    config.entity = Some(entity);
                } else {
                    return Err(syn::Error::new_spanned(
                        &nv.value,
                        "entity must be a string literal",
                    ));
                }
            }
            _ => {
                return Err(syn::Error::new_spanned(
                    arg,
                    "Unsupported traced_repository attribute. Use `entity = \"...\"`",
                ));
            }
        }
    }

    Ok(config)
}

/// Name of the implementing type, without generics
fn self_type_name(ty: &Type) -> syn::Result<String> {
    if let Type::Path(type_path) = ty {
        if let Some(segment) = type_path.path.segments.last() {
            return Ok(segment.ident.to_string());
        }
    }
    Err(syn::Error::new_spanned(
        ty,
        "cannot derive an entity name from this type; pass `entity = \"...\"`",
    ))
}

/// Remove `#[untraced]` from the method, reporting whether it was present
fn take_untraced_marker(attrs: &mut Vec<Attribute>) -> bool {
    let before = attrs.len();
    attrs.retain(|attr| !attr.path().is_ident(UNTRACED_MARKER));
    attrs.len() != before
}

/// Check if a type is Result<T, E> (or an alias named `Result`)
fn is_result_type(ty: &Type) -> bool {
    if let Type::Path(type_path) = ty {
        if let Some(segment) = type_path.path.segments.last() {
            return segment.ident == "Result";
        }
    }
    false
}

/// Methods with a receiver that return a Result
fn is_interceptable(sig: &Signature) -> bool {
    sig.receiver().is_some()
        && matches!(&sig.output, ReturnType::Type(_, ty) if is_result_type(ty))
}

/// Replace the method body with a call through the aspect
fn wrap_method(entity: &str, method: &mut ImplItemFn) -> syn::Result<()> {
    let ReturnType::Type(_, ret) = &method.sig.output else {
        return Ok(());
    };
    let method_name = method.sig.ident.to_string();
    let body = &method.block;

    let wrapped = if method.sig.asyncness.is_some() {
        quote! {{
            let __bizctx_aspect = ::core::clone::Clone::clone(
                ::bizctx::aspect::Intercepted::aspect(self),
            );
            __bizctx_aspect
                .intercept_async(#entity, #method_name, async move {
                    let __bizctx_result: #ret = #body;
                    __bizctx_result
                })
                .await
        }}
    } else {
        quote! {{
            let __bizctx_aspect = ::core::clone::Clone::clone(
                ::bizctx::aspect::Intercepted::aspect(self),
            );
            __bizctx_aspect.intercept(#entity, #method_name, move || -> #ret #body)
        }}
    };

    method.block = syn::parse2(wrapped)?;
    Ok(())
}
