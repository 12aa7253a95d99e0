// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! `#[logged_test]` and `#[logged_tokio_test]`
//!
//! Both wrap the test body in a [`memvfs_test_utils::TestLoggerGuard`], which
//! opens a per-test log file, captures `tracing` output into it and records
//! success or failure when the test ends. Inside the body a `logger` binding
//! (`&mut TestLogger`) is available.

use proc_macro::TokenStream;
use proc_macro2::{Span, TokenStream as TokenStream2};
use quote::quote;
use syn::{parse_macro_input, spanned::Spanned, ItemFn, ReturnType, Type};

/// Logged synchronous test
///
/// ```rust,ignore
/// #[memvfs_test_utils::logged_test]
/// fn creates_file() {
///     logger.log("creating /f").unwrap();
/// }
/// ```
#[proc_macro_attribute]
pub fn logged_test(attr: TokenStream, item: TokenStream) -> TokenStream {
    if !attr.is_empty() {
        return syn::Error::new(Span::call_site(), "#[logged_test] takes no arguments")
            .to_compile_error()
            .into();
    }
    let input = parse_macro_input!(item as ItemFn);
    if let Some(token) = &input.sig.asyncness {
        return syn::Error::new(
            token.span(),
            "#[logged_test] is for synchronous tests; use #[logged_tokio_test] for async ones",
        )
        .to_compile_error()
        .into();
    }
    expand(input, quote! { #[::core::prelude::v1::test] }, "logged_test")
}

/// Logged `#[tokio::test]`; arguments are passed through, e.g.
/// `#[logged_tokio_test(flavor = "multi_thread")]`
#[proc_macro_attribute]
pub fn logged_tokio_test(attr: TokenStream, item: TokenStream) -> TokenStream {
    let args = TokenStream2::from(attr);
    let input = parse_macro_input!(item as ItemFn);
    if input.sig.asyncness.is_none() {
        return syn::Error::new(input.sig.ident.span(), "#[logged_tokio_test] needs an async fn")
            .to_compile_error()
            .into();
    }
    let harness = if args.is_empty() {
        quote! { #[::tokio::test] }
    } else {
        quote! { #[::tokio::test( #args )] }
    };
    expand(input, harness, "logged_tokio_test")
}

fn expand(mut input: ItemFn, harness: TokenStream2, macro_name: &str) -> TokenStream {
    input.attrs.retain(|attr| !is_logged_attr(attr));

    let sig = &input.sig;
    if !sig.inputs.is_empty() {
        return syn::Error::new(
            sig.ident.span(),
            format!("#[{}] tests cannot take parameters", macro_name),
        )
        .to_compile_error()
        .into();
    }

    let fn_ident = &sig.ident;
    let fn_name = fn_ident.to_string();
    let asyncness = &sig.asyncness;
    let generics = &sig.generics;
    let visibility = &input.vis;
    let attrs = &input.attrs;
    let block = &input.block;
    let (kind, return_tokens) = classify_return(&sig.output);
    let finish = finish_body(kind);

    quote! {
        #harness
        #(#attrs)*
        #visibility #asyncness fn #fn_ident #generics () #return_tokens {
            let mut __guard = ::memvfs_test_utils::TestLoggerGuard::new(#fn_name)
                .expect("failed to create TestLogger");
            let mut logger = __guard.logger();
            let _ = &mut logger;

            let inner_result = { #block };
            drop(logger);
            #finish
        }
    }
    .into()
}

#[derive(Clone, Copy)]
enum ReturnKind {
    Unit,
    Result,
    Other,
}

fn classify_return(output: &ReturnType) -> (ReturnKind, TokenStream2) {
    match output {
        ReturnType::Default => (ReturnKind::Unit, quote! {}),
        ReturnType::Type(arrow, ty) if is_result_type(ty) => (ReturnKind::Result, quote! { #arrow #ty }),
        ReturnType::Type(arrow, ty) => (ReturnKind::Other, quote! { #arrow #ty }),
    }
}

fn is_result_type(ty: &Type) -> bool {
    match ty {
        Type::Path(path) => path.path.segments.last().is_some_and(|s| s.ident == "Result"),
        _ => false,
    }
}

fn finish_body(kind: ReturnKind) -> TokenStream2 {
    let succeed = quote! {
        if let Err(e) = __guard.finish_success() {
            panic!("failed to finalize TestLogger: {}", e);
        }
    };
    match kind {
        ReturnKind::Unit => quote! {
            let _ = inner_result;
            #succeed
        },
        ReturnKind::Result => quote! {
            match inner_result {
                ::std::result::Result::Ok(value) => {
                    #succeed
                    ::std::result::Result::Ok(value)
                }
                ::std::result::Result::Err(err) => {
                    let __message = format!("{}", err);
                    if let Err(e) = __guard.finish_failure(&__message) {
                        eprintln!("failed to finalize TestLogger after error: {}", e);
                    }
                    ::std::result::Result::Err(err)
                }
            }
        },
        ReturnKind::Other => quote! {
            let value = inner_result;
            #succeed
            value
        },
    }
}

fn is_logged_attr(attr: &syn::Attribute) -> bool {
    attr.path()
        .segments
        .last()
        .is_some_and(|s| s.ident == "logged_test" || s.ident == "logged_tokio_test")
}
