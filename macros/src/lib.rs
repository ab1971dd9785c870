use proc_macro::TokenStream;
use quote::quote;
use syn::{parse_macro_input, spanned::Spanned, Ident, ItemFn, LitStr};

const USAGE: &str = "rxflow_macro::test only accepts: #[rxflow_macro::test], \
                     #[rxflow_macro::test(shared)] or #[rxflow_macro::test(paused)]";

/// Test attribute shared by every rxflow test.
///
/// - sync fn: plain `#[test]`
/// - async fn: `#[tokio::test]` on a current-thread runtime
/// - `(shared)`: multi-thread runtime, for tests that push from several threads
/// - `(paused)`: current-thread runtime with tokio time paused
#[proc_macro_attribute]
pub fn test(attr: TokenStream, item: TokenStream) -> TokenStream {
  let input = parse_macro_input!(item as ItemFn);

  let is_async = input.sig.asyncness.is_some();

  let raw_args = proc_macro2::TokenStream::from(attr);
  let tokio_args = if raw_args.is_empty() {
    proc_macro2::TokenStream::new()
  } else {
    if !is_async {
      return TokenStream::from(
        syn::Error::new(
          raw_args.span(),
          "rxflow_macro::test flavor args are only supported for async tests",
        )
        .to_compile_error(),
      );
    }

    let flavor = if let Ok(ident) = syn::parse2::<Ident>(raw_args.clone()) {
      Some((ident.to_string(), ident.span()))
    } else if let Ok(lit) = syn::parse2::<LitStr>(raw_args.clone()) {
      Some((lit.value(), lit.span()))
    } else {
      None
    };

    match flavor {
      Some((name, _)) if name == "shared" => quote!(flavor = "multi_thread", worker_threads = 4),
      Some((name, _)) if name == "paused" => quote!(flavor = "current_thread", start_paused = true),
      Some((_, span)) => {
        return TokenStream::from(syn::Error::new(span, USAGE).to_compile_error());
      }
      None => {
        return TokenStream::from(syn::Error::new(raw_args.span(), USAGE).to_compile_error());
      }
    }
  };

  let attr = if is_async { quote!(#[tokio::test(#tokio_args)]) } else { quote!(#[test]) };

  let expanded = quote! {
      #attr
      #input
  };

  TokenStream::from(expanded)
}
