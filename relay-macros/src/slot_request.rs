//! `#[derive(SlotRequest)]` — generates the `SlotRequest::PARAMS` table and
//! (when any field carries `validate`) a `bind` override that additionally
//! runs `garde::Validate` after the JSON round trip, mirroring how
//! `ConfigProperties` wires up validation for typed config structs.

use proc_macro2::TokenStream;
use quote::quote;
use syn::{Data, DeriveInput, Fields, Ident, LitStr};

use crate::crate_path::relay_core_path;

struct ParamField {
    ident: Ident,
    rename: Option<String>,
    require: bool,
    insensitive: bool,
    validate: Option<String>,
    ty: Option<String>,
}

pub fn expand(input: proc_macro::TokenStream) -> proc_macro::TokenStream {
    let input = syn::parse_macro_input!(input as DeriveInput);
    match expand_inner(input) {
        Ok(ts) => ts.into(),
        Err(err) => err.to_compile_error().into(),
    }
}

fn expand_inner(input: DeriveInput) -> syn::Result<TokenStream> {
    let krate = relay_core_path();
    let name = &input.ident;

    let fields = match &input.data {
        Data::Struct(data) => match &data.fields {
            Fields::Named(f) => &f.named,
            _ => {
                return Err(syn::Error::new_spanned(
                    name,
                    "SlotRequest can only be derived for structs with named fields",
                ))
            }
        },
        _ => return Err(syn::Error::new_spanned(name, "SlotRequest can only be derived for structs")),
    };

    let mut parsed = Vec::new();
    for field in fields {
        let ident = field.ident.clone().expect("named field");
        if !is_option_type(&field.ty) {
            return Err(syn::Error::new_spanned(
                &field.ty,
                "SlotRequest fields must be Option<T>, so an unset parameter is distinguishable from a zero value",
            ));
        }

        let mut rename = None;
        let mut require = false;
        let mut insensitive = false;
        let mut validate = None;
        let mut ty = None;

        for attr in &field.attrs {
            if !attr.path().is_ident("param") {
                continue;
            }
            attr.parse_nested_meta(|meta| {
                if meta.path.is_ident("rename") {
                    let lit: LitStr = meta.value()?.parse()?;
                    rename = Some(lit.value());
                } else if meta.path.is_ident("require") {
                    require = true;
                } else if meta.path.is_ident("insensitive") {
                    insensitive = true;
                } else if meta.path.is_ident("validate") {
                    let lit: LitStr = meta.value()?.parse()?;
                    validate = Some(lit.value());
                } else if meta.path.is_ident("type") {
                    let lit: LitStr = meta.value()?.parse()?;
                    ty = Some(lit.value());
                } else {
                    return Err(meta.error("unrecognized #[param(...)] key"));
                }
                Ok(())
            })?;
        }

        parsed.push(ParamField { ident, rename, require, insensitive, validate, ty });
    }

    let any_has_validate = parsed.iter().any(|f| f.validate.is_some());

    let param_entries: Vec<TokenStream> = parsed
        .iter()
        .map(|f| {
            let wire_name = f.rename.clone().unwrap_or_else(|| f.ident.to_string());
            let require = f.require;
            let insensitive = f.insensitive;
            let validate_tok = match &f.validate {
                Some(v) => quote! { Some(#v) },
                None => quote! { None },
            };
            let ty_tok = match &f.ty {
                Some(ty) => {
                    let variant = semantic_type_variant(ty)?;
                    quote! { Some(#krate::service::SemanticType::#variant) }
                }
                None => quote! { None },
            };
            Ok(quote! {
                #krate::service::SlotParameter {
                    name: #wire_name,
                    require: #require,
                    insensitive_case: #insensitive,
                    validate: #validate_tok,
                    ty: #ty_tok,
                }
            })
        })
        .collect::<syn::Result<_>>()?;

    let validation_call = if any_has_validate {
        quote! {
            {
                use garde::Validate as _;
                let __ctx = <#name as garde::Validate>::Context::default();
                value.validate(&__ctx).map_err(|__report| {
                    #krate::error::sentinel::caller_invalid_request(__report.to_string())
                })?;
            }
        }
    } else {
        quote! {}
    };

    Ok(quote! {
        impl #krate::service::SlotRequest for #name {
            const PARAMS: &'static [#krate::service::SlotParameter] = &[ #(#param_entries),* ];

            fn bind(mut params: #krate::types::Map) -> Result<Self, #krate::error::RelayError> {
                #krate::service::shape_params(&mut params, Self::PARAMS)?;
                let value: Self = serde_json::from_value(serde_json::Value::Object(params))
                    .map_err(|e| #krate::error::sentinel::caller_invalid_request(format!("malformed request body: {e}")))?;
                #validation_call
                Ok(value)
            }
        }
    })
}

fn is_option_type(ty: &syn::Type) -> bool {
    if let syn::Type::Path(p) = ty {
        return p.path.segments.last().is_some_and(|s| s.ident == "Option");
    }
    false
}

fn semantic_type_variant(name: &str) -> syn::Result<Ident> {
    const KNOWN: &[&str] = &[
        "Bool", "String", "Number", "Bytes", "Date", "DateTime", "StringArray", "NumberArray",
        "BytesArray", "DateArray", "DateTimeArray", "NumberRange", "DateRange", "DateTimeRange",
        "Object", "ObjectArray",
    ];
    if !KNOWN.contains(&name) {
        return Err(syn::Error::new(
            proc_macro2::Span::call_site(),
            format!("unknown semantic type '{name}', expected one of {KNOWN:?}"),
        ));
    }
    Ok(Ident::new(name, proc_macro2::Span::call_site()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_non_option_fields() {
        let input: DeriveInput = syn::parse_quote! {
            struct Req { name: String }
        };
        let err = expand_inner(input).unwrap_err();
        assert!(err.to_string().contains("Option"));
    }

    #[test]
    fn generates_params_for_every_field() {
        let input: DeriveInput = syn::parse_quote! {
            struct Req {
                #[param(rename = "Name", require, insensitive)]
                name: Option<String>,
                #[param(type = "Number")]
                age: Option<i64>,
            }
        };
        let ts = expand_inner(input).unwrap().to_string();
        assert!(ts.contains("\"Name\""));
        assert!(ts.contains("SemanticType :: Number"));
    }

    #[test]
    fn rejects_unknown_semantic_type() {
        let input: DeriveInput = syn::parse_quote! {
            struct Req {
                #[param(type = "NotAType")]
                name: Option<String>,
            }
        };
        assert!(expand_inner(input).is_err());
    }
}
