use proc_macro::TokenStream;
use proc_macro2::{Ident, Span, TokenStream as TokenStream2};
use proc_macro_crate::{FoundCrate, crate_name};
use quote::quote;
use syn::{Data, DeriveInput, Field, Fields, LitStr, parse_macro_input};

#[proc_macro_derive(FormRecord, attributes(form))]
pub fn derive_form_record(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    expand(input)
        .unwrap_or_else(syn::Error::into_compile_error)
        .into()
}

fn expand(input: DeriveInput) -> syn::Result<TokenStream2> {
    if !input.generics.params.is_empty() {
        return Err(syn::Error::new_spanned(
            &input.ident,
            "FormRecord derive supports only non-generic structs",
        ));
    }

    let named_fields = match input.data {
        Data::Struct(data) => match data.fields {
            Fields::Named(fields) => fields.named,
            fields => {
                return Err(syn::Error::new_spanned(
                    fields,
                    "FormRecord derive requires a struct with named fields",
                ));
            }
        },
        Data::Enum(data) => {
            return Err(syn::Error::new_spanned(
                data.enum_token,
                "FormRecord derive is only supported on structs",
            ));
        }
        Data::Union(data) => {
            return Err(syn::Error::new_spanned(
                data.union_token,
                "FormRecord derive is only supported on structs",
            ));
        }
    };

    let calmform = calmform_path();
    let record_ident = input.ident;
    let mut initializers = Vec::new();
    for field in &named_fields {
        let Some(field_ident) = &field.ident else {
            continue;
        };
        let key = form_key(field)?.unwrap_or_else(|| field_ident.to_string());
        initializers.push(quote! {
            #field_ident: #calmform::form::record_field(values, #key)?
        });
    }

    Ok(quote! {
        impl #calmform::form::FormRecord for #record_ident {
            fn from_values(
                values: &#calmform::form::FormValues,
            ) -> ::core::result::Result<Self, #calmform::form::RecordError> {
                ::core::result::Result::Ok(Self {
                    #(#initializers,)*
                })
            }
        }
    })
}

/// Reads `#[form(rename = "...")]`.
fn form_key(field: &Field) -> syn::Result<Option<String>> {
    let mut key = None;
    for attr in field.attrs.iter().filter(|attr| attr.path().is_ident("form")) {
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("rename") {
                let value: LitStr = meta.value()?.parse()?;
                key = Some(value.value());
                Ok(())
            } else {
                Err(meta.error("unsupported form attribute, expected `rename`"))
            }
        })?;
    }
    Ok(key)
}

fn calmform_path() -> TokenStream2 {
    match crate_name("calmform") {
        Ok(FoundCrate::Name(name)) => {
            let ident = Ident::new(&name, Span::call_site());
            quote!(::#ident)
        }
        Ok(FoundCrate::Itself) => quote!(crate),
        Err(_) => quote!(::calmform),
    }
}
