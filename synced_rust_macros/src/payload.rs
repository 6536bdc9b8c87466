use proc_macro::TokenStream;
use quote::{format_ident, quote};
use syn::{Data, DeriveInput, Fields, LitStr};

pub fn derive_payload(input: TokenStream) -> TokenStream {
    let input = syn::parse_macro_input!(input as DeriveInput);
    let name = &input.ident;
    let vis = &input.vis;
    let patch_name = format_ident!("{}Patch", name);

    let settings = extract_settings(&input);
    let table = settings
        .table
        .unwrap_or_else(|| format!("{}s", to_snake_case(&name.to_string())));
    let label = settings.label.unwrap_or_else(|| name.to_string());

    let fields = match &input.data {
        Data::Struct(data) => match &data.fields {
            Fields::Named(fields) => fields.named.iter().collect::<Vec<_>>(),
            _ => {
                return syn::Error::new_spanned(
                    name,
                    "Payload derive: only structs with named fields are supported",
                )
                .to_compile_error()
                .into()
            }
        },
        _ => {
            return syn::Error::new_spanned(name, "Payload derive: only structs are supported")
                .to_compile_error()
                .into()
        }
    };

    let idents: Vec<_> = fields.iter().filter_map(|f| f.ident.clone()).collect();
    let types: Vec<_> = fields.iter().map(|f| f.ty.clone()).collect();
    let patch_doc = format!("Partial update for [`{}`]. Unset fields are left untouched.", name);

    let expanded = quote! {
        #[doc = #patch_doc]
        #[derive(Debug, Clone, Default, PartialEq, ::serde::Serialize, ::serde::Deserialize)]
        #vis struct #patch_name {
            #(
                #[serde(default, skip_serializing_if = "Option::is_none")]
                pub #idents: Option<#types>,
            )*
        }

        impl #patch_name {
            #(
                pub fn #idents(mut self, value: impl Into<#types>) -> Self {
                    self.#idents = Some(value.into());
                    self
                }
            )*
        }

        impl synced_rust::Patch<#name> for #patch_name {
            fn apply_to(&self, target: &mut #name) {
                #(
                    if let Some(value) = &self.#idents {
                        target.#idents = value.clone();
                    }
                )*
            }

            fn is_empty(&self) -> bool {
                true #( && self.#idents.is_none() )*
            }
        }

        impl synced_rust::Payload for #name {
            const TABLE: &'static str = #table;
            const LABEL: &'static str = #label;
            type Patch = #patch_name;
        }
    };

    TokenStream::from(expanded)
}

#[derive(Default)]
struct Settings {
    table: Option<String>,
    label: Option<String>,
}

fn extract_settings(input: &DeriveInput) -> Settings {
    let mut settings = Settings::default();
    for attr in &input.attrs {
        if !attr.path().is_ident("payload") {
            continue;
        }

        let _ = attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("table") {
                let value: LitStr = meta.value()?.parse()?;
                settings.table = Some(value.value());
            } else if meta.path.is_ident("label") {
                let value: LitStr = meta.value()?.parse()?;
                settings.label = Some(value.value());
            }
            Ok(())
        });
    }
    settings
}

fn to_snake_case(s: &str) -> String {
    let mut result = String::new();
    for (i, ch) in s.chars().enumerate() {
        if ch.is_uppercase() {
            if i > 0 {
                result.push('_');
            }
            result.extend(ch.to_lowercase());
        } else {
            result.push(ch);
        }
    }
    result
}
