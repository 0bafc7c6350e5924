use proc_macro::TokenStream;
use quote::{format_ident, quote};
use syn::{Data, DeriveInput, Fields, parse_macro_input, spanned::Spanned};

/// Rest coefficients of a degree 4 splat: 24 per channel, 3 channels. Files
/// with more bands than the codec keeps still need every column to be read,
/// as PLY stores the rest coefficients channel by channel.
const REST_COEFF_COUNT: usize = 72;

/// Name of the placeholder field that [`expand_rest_fields`] replaces.
const MARKER: &str = "_rest";

fn rest_field_idents() -> impl Iterator<Item = proc_macro2::Ident> {
    (0..REST_COEFF_COUNT).map(|i| format_ident!("f_rest_{}", i))
}

/// Expands to `["f_rest_0", ..., "f_rest_71"]`, a `[&'static str; 72]`.
///
/// Serializers that write PLY properties by name need `'static` names, this
/// keeps them in sync with the fields generated by [`expand_rest_fields`].
#[proc_macro]
pub fn rest_field_names(_input: TokenStream) -> TokenStream {
    let names = (0..REST_COEFF_COUNT).map(|i| format!("f_rest_{i}"));
    TokenStream::from(quote! { [#(#names),*] })
}

/// Replaces a `_rest: ()` marker field with the 72 `f_rest_N: f32` PLY fields.
///
/// Attributes on the marker (e.g. `#[serde(default)]`) are copied onto every
/// generated field. Also emits `rest_coeffs(&self) -> [f32; 72]` returning the
/// fields in PLY order.
#[proc_macro_attribute]
pub fn expand_rest_fields(_attr: TokenStream, item: TokenStream) -> TokenStream {
    let input = parse_macro_input!(item as DeriveInput);

    let named = match &input.data {
        Data::Struct(data) => match &data.fields {
            Fields::Named(fields) => &fields.named,
            other => {
                return syn::Error::new(other.span(), "expected a struct with named fields")
                    .to_compile_error()
                    .into();
            }
        },
        _ => {
            return syn::Error::new(input.ident.span(), "expected a struct")
                .to_compile_error()
                .into();
        }
    };

    let mut fields = Vec::with_capacity(named.len() + REST_COEFF_COUNT);
    let mut saw_marker = false;

    for field in named {
        let attrs = &field.attrs;
        let vis = &field.vis;
        let Some(ident) = &field.ident else {
            continue;
        };

        if ident == MARKER {
            saw_marker = true;
            fields.extend(rest_field_idents().map(|rest| {
                quote! {
                    #(#attrs)*
                    #vis #rest: f32
                }
            }));
        } else {
            let ty = &field.ty;
            fields.push(quote! {
                #(#attrs)*
                #vis #ident: #ty
            });
        }
    }

    if !saw_marker {
        return syn::Error::new(
            input.ident.span(),
            format!("expand_rest_fields needs a `{MARKER}: ()` marker field"),
        )
        .to_compile_error()
        .into();
    }

    let attrs = &input.attrs;
    let vis = &input.vis;
    let name = &input.ident;
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();
    let reads = rest_field_idents().map(|rest| quote! { self.#rest });
    let count = REST_COEFF_COUNT;

    TokenStream::from(quote! {
        #(#attrs)*
        #vis struct #name #impl_generics #where_clause {
            #(#fields),*
        }

        impl #impl_generics #name #ty_generics #where_clause {
            pub(crate) fn rest_coeffs(&self) -> [f32; #count] {
                [#(#reads),*]
            }
        }
    })
}
