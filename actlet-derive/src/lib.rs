use proc_macro2::TokenStream;
use quote::quote;

/// Implements `actlet::Message` and either `actlet::Action` or
/// `actlet::Signal`.
///
/// A message without the `reply` attribute is a signal.  A message with
/// `#[reply("T")]` or `#[reply(T)]` is an action whose reply type is `T`.
/// `#[reply()]` is an action replying `()`.
#[proc_macro_derive(Message, attributes(reply))]
pub fn message_derive(input: proc_macro::TokenStream) -> proc_macro::TokenStream {
    let input = syn::parse_macro_input!(input as syn::DeriveInput);
    match expand(&input) {
        Ok(tokens) => tokens.into(),
        Err(err) => err.to_compile_error().into(),
    }
}

fn expand(input: &syn::DeriveInput) -> syn::Result<TokenStream> {
    let ty_name = &input.ident;
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();

    let attr = input
        .attrs
        .iter()
        .find(|attr| attr.path().is_ident("reply"));

    let (reply_type, message_trait) = match attr {
        Some(attr) => (parse_reply_type(attr)?, quote!(actlet::Action)),
        None => (quote!(()), quote!(actlet::Signal)),
    };

    Ok(quote! {
        impl #impl_generics actlet::Message for #ty_name #ty_generics #where_clause {
            type Reply = #reply_type;
        }

        impl #impl_generics #message_trait for #ty_name #ty_generics #where_clause {}
    })
}

fn parse_reply_type(attr: &syn::Attribute) -> syn::Result<TokenStream> {
    let tokens = match attr.meta {
        syn::Meta::List(ref list) => list.tokens.clone(),
        syn::Meta::Path(_) => return Ok(quote!(())),
        syn::Meta::NameValue(ref nv) => {
            return Err(syn::Error::new_spanned(
                nv,
                "expected #[reply(T)] or #[reply(\"T\")]",
            ));
        }
    };
    if tokens.is_empty() {
        return Ok(quote!(()));
    }
    // A string literal holding the type is accepted for compatibility with
    // code written before bare types were supported.
    if let Ok(lit) = syn::parse2::<syn::LitStr>(tokens.clone()) {
        let ty = lit.parse::<syn::Type>()?;
        return Ok(quote!(#ty));
    }
    let ty = syn::parse2::<syn::Type>(tokens)?;
    Ok(quote!(#ty))
}
