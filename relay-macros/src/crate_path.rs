//! Crate path resolution for generated code.
//!
//! Detects whether the user depends on `relay` (facade) or `relay-core`
//! directly, and returns the appropriate path prefix for generated code.

use proc_macro2::TokenStream;
use proc_macro_crate::{crate_name, FoundCrate};
use quote::quote;

/// Returns the token stream for accessing `relay_core` types.
pub fn relay_core_path() -> TokenStream {
    if let Ok(found) = crate_name("relay") {
        match found {
            FoundCrate::Itself => quote!(crate),
            FoundCrate::Name(name) => {
                let ident = syn::Ident::new(&name, proc_macro2::Span::call_site());
                quote!(::#ident::relay_core)
            }
        }
    } else if let Ok(found) = crate_name("relay-core") {
        match found {
            FoundCrate::Itself => quote!(crate),
            FoundCrate::Name(name) => {
                let ident = syn::Ident::new(&name, proc_macro2::Span::call_site());
                quote!(::#ident)
            }
        }
    } else {
        quote!(::relay_core)
    }
}
