//! `#[relay::service]` — an attribute macro on an `impl` block that
//! discovers every `#[relay::slot]`-annotated method and generates the
//! `Service::has_slot`/`invoke_slot` implementation, erasing the typed
//! request down to the dispatch engine's `Map`.
//!
//! `#[relay::slot]` is a no-op on its own (see [`crate::slot`]); it is only
//! a marker this macro scans for and strips before re-emitting the method.

use proc_macro2::TokenStream;
use quote::quote;
use syn::{ItemImpl, LitStr};

use crate::crate_path::relay_core_path;

struct SlotMethod {
    wire_name: String,
    ident: syn::Ident,
    req_ty: syn::Type,
}

pub fn expand(args: proc_macro::TokenStream, input: proc_macro::TokenStream) -> proc_macro::TokenStream {
    let limited_slots = parse_limited_slots_arg(args);
    let item = syn::parse_macro_input!(input as ItemImpl);
    match expand_inner(item, limited_slots) {
        Ok(ts) => ts.into(),
        Err(err) => err.to_compile_error().into(),
    }
}

fn parse_limited_slots_arg(args: proc_macro::TokenStream) -> Option<String> {
    if args.is_empty() {
        return None;
    }
    let parsed: syn::Result<syn::MetaNameValue> = syn::parse(args);
    match parsed {
        Ok(nv) if nv.path.is_ident("limited_slots") => {
            if let syn::Expr::Lit(syn::ExprLit { lit: syn::Lit::Str(s), .. }) = nv.value {
                Some(s.value())
            } else {
                None
            }
        }
        _ => None,
    }
}

fn expand_inner(mut item: ItemImpl, limited_slots: Option<String>) -> syn::Result<TokenStream> {
    let krate = relay_core_path();
    let self_ty = item.self_ty.clone();

    let mut slots = Vec::new();

    for impl_item in &mut item.items {
        let syn::ImplItem::Fn(method) = impl_item else { continue };

        let slot_attr_idx = method.attrs.iter().position(|a| path_ends_with(a.path(), "slot"));
        let Some(idx) = slot_attr_idx else { continue };

        let attr = method.attrs.remove(idx);
        let rename = parse_slot_rename(&attr)?;
        let wire_name = rename.unwrap_or_else(|| method.sig.ident.to_string());

        let req_ty = request_arg_type(&method.sig)?;
        slots.push(SlotMethod { wire_name, ident: method.sig.ident.clone(), req_ty });
    }

    let mut seen = std::collections::HashSet::new();
    for s in &slots {
        if !seen.insert(s.wire_name.clone()) {
            return Err(syn::Error::new_spanned(&s.ident, format!("duplicate slot name '{}'", s.wire_name)));
        }
    }

    let slot_names: Vec<&str> = slots.iter().map(|s| s.wire_name.as_str()).collect();

    let match_arms: Vec<TokenStream> = slots
        .iter()
        .map(|s| {
            let wire_name = &s.wire_name;
            let ident = &s.ident;
            if is_map_type(&s.req_ty) {
                quote! {
                    #wire_name => {
                        let mut __resp = #krate::types::SlotResponse::ok(serde_json::Value::Null);
                        self.#ident(params, &mut __resp).await;
                        __resp
                    }
                }
            } else {
                let req_ty = &s.req_ty;
                quote! {
                    #wire_name => {
                        let __req = match <#req_ty as #krate::service::SlotRequest>::bind(params) {
                            Ok(r) => r,
                            Err(e) => return #krate::types::SlotResponse::err(e),
                        };
                        let mut __resp = #krate::types::SlotResponse::ok(serde_json::Value::Null);
                        self.#ident(__req, &mut __resp).await;
                        __resp
                    }
                }
            }
        })
        .collect();

    let limited_slots_impl = limited_slots.map(|spec| {
        quote! {
            fn limited_slots(&self) -> &str {
                #spec
            }
        }
    });

    Ok(quote! {
        #item

        #[async_trait::async_trait]
        impl #krate::service::Service for #self_ty {
            fn service_name(&self) -> &str {
                <Self as #krate::entity::Entity>::class(self)
            }

            #limited_slots_impl

            fn has_slot(&self, slot: &str) -> bool {
                matches!(slot, #(#slot_names)|*)
            }

            async fn invoke_slot(&self, slot: &str, params: #krate::types::Map) -> #krate::types::SlotResponse {
                match slot {
                    #(#match_arms)*
                    _ => #krate::types::SlotResponse::err(#krate::error::sentinel::caller_invalid_request(format!("unknown slot '{slot}'"))),
                }
            }
        }
    })
}

fn parse_slot_rename(attr: &syn::Attribute) -> syn::Result<Option<String>> {
    let mut rename = None;
    if let syn::Meta::List(_) = &attr.meta {
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("rename") {
                let lit: LitStr = meta.value()?.parse()?;
                rename = Some(lit.value());
                Ok(())
            } else {
                Err(meta.error("unrecognized #[relay::slot(...)] key"))
            }
        })?;
    }
    Ok(rename)
}

fn path_ends_with(path: &syn::Path, name: &str) -> bool {
    path.segments.last().is_some_and(|s| s.ident == name)
}

fn is_map_type(ty: &syn::Type) -> bool {
    if let syn::Type::Path(p) = ty {
        return p.path.segments.last().is_some_and(|s| s.ident == "Map");
    }
    false
}

/// Slot handlers are `(&self, req: Req, resp: &mut SlotResponse)`; this
/// extracts `Req`'s type from the first typed argument after `&self`.
fn request_arg_type(sig: &syn::Signature) -> syn::Result<syn::Type> {
    let typed: Vec<&syn::PatType> = sig
        .inputs
        .iter()
        .filter_map(|a| if let syn::FnArg::Typed(t) = a { Some(t) } else { None })
        .collect();
    let req_arg = typed.first().ok_or_else(|| {
        syn::Error::new_spanned(sig, "slot handlers must take (&self, req: Req, resp: &mut SlotResponse)")
    })?;
    Ok((*req_arg.ty).clone())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn discovers_every_annotated_slot() {
        let item: ItemImpl = syn::parse_quote! {
            impl HelloService {
                #[relay::slot]
                async fn hello_slot(&self, req: HelloRequest, resp: &mut SlotResponse) {}

                #[relay::slot(rename = "Goodbye")]
                async fn bye_slot(&self, req: Map, resp: &mut SlotResponse) {}

                async fn helper(&self) {}
            }
        };
        let ts = expand_inner(item, None).unwrap().to_string();
        assert!(ts.contains("\"hello_slot\""));
        assert!(ts.contains("\"Goodbye\""));
        assert!(!ts.contains("\"helper\""));
    }

    #[test]
    fn rejects_duplicate_slot_names() {
        let item: ItemImpl = syn::parse_quote! {
            impl HelloService {
                #[relay::slot(rename = "Same")]
                async fn a(&self, req: Map, resp: &mut SlotResponse) {}

                #[relay::slot(rename = "Same")]
                async fn b(&self, req: Map, resp: &mut SlotResponse) {}
            }
        };
        assert!(expand_inner(item, None).is_err());
    }

    #[test]
    fn limited_slots_argument_is_threaded_through() {
        let item: ItemImpl = syn::parse_quote! {
            impl HelloService {
                #[relay::slot]
                async fn hello_slot(&self, req: Map, resp: &mut SlotResponse) {}
            }
        };
        let ts = expand_inner(item, Some("hello_slot:10".to_string())).unwrap().to_string();
        assert!(ts.contains("fn limited_slots"));
        assert!(ts.contains("hello_slot:10"));
    }
}
