use proc_macro::TokenStream;
use quote::quote;
use syn::{DeriveInput, parse_macro_input};

/// Attribute macro that turns a struct into a model.
///
/// This is syntax sugar that expands to:
/// ```ignore
/// #[derive(Default, podium_core::Bound)]
/// struct Person { .. }
///
/// impl podium_core::Model for Person {}
/// ```
///
/// With `#[model(hooks)]` the `Model` impl is left out so the struct can
/// provide its own lifecycle hooks. Every field must implement `Default`.
///
/// # Example
///
/// ```ignore
/// use podium_core::{model, ModelBase};
///
/// #[model]
/// struct Person {
///     base: ModelBase,
/// }
/// ```
#[proc_macro_attribute]
pub fn model(attr: TokenStream, item: TokenStream) -> TokenStream {
    let mut options = ModelOptions::default();
    let parser = syn::meta::parser(|meta| {
        if meta.path.is_ident("hooks") {
            options.hooks = true;
            Ok(())
        } else {
            Err(meta.error("unsupported model option, expected `hooks`"))
        }
    });
    parse_macro_input!(attr with parser);

    let input = parse_macro_input!(item as DeriveInput);
    let name = &input.ident;
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();

    let model_impl = if options.hooks {
        quote! {}
    } else {
        quote! {
            impl #impl_generics ::podium_core::Model for #name #ty_generics #where_clause {}
        }
    };

    let output = quote! {
        #[derive(::std::default::Default, ::podium_core::Bound)]
        #input

        #model_impl
    };

    output.into()
}

#[derive(Default)]
struct ModelOptions {
    hooks: bool,
}

/// Derive macro for the Bound trait.
///
/// Uses the field marked `#[bound]`, or else the one field of type
/// `ModelBase`, as the model's binding to its pod.
///
/// # Example
///
/// ```ignore
/// use podium_core::{Bound, Model, ModelBase};
///
/// #[derive(Default, Bound)]
/// struct City {
///     #[bound]
///     binding: ModelBase,
///     visits: std::cell::Cell<u32>,
/// }
///
/// impl Model for City {}
/// ```
#[proc_macro_derive(Bound, attributes(bound))]
pub fn derive_bound(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);

    match derive_bound_impl(&input) {
        Ok(tokens) => tokens.into(),
        Err(err) => err.to_compile_error().into(),
    }
}

fn derive_bound_impl(input: &DeriveInput) -> syn::Result<proc_macro2::TokenStream> {
    let name = &input.ident;
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();
    let where_clause = build_where_clause(&input.generics, where_clause);
    let member = base_member(input)?;

    Ok(quote! {
        impl #impl_generics ::podium_core::Bound for #name #ty_generics #where_clause {
            fn base(&self) -> &::podium_core::ModelBase {
                &self.#member
            }

            fn as_any(&self) -> &dyn ::std::any::Any {
                self
            }

            fn into_any(self: ::std::rc::Rc<Self>) -> ::std::rc::Rc<dyn ::std::any::Any> {
                self
            }
        }
    })
}

/// Models are `Any`, so every type parameter must be `'static`.
fn build_where_clause(
    generics: &syn::Generics,
    existing: Option<&syn::WhereClause>,
) -> proc_macro2::TokenStream {
    let type_params: Vec<_> = generics.type_params().map(|p| &p.ident).collect();

    if type_params.is_empty() && existing.is_none() {
        return quote! {};
    }

    let static_bounds = type_params.iter().map(|p| quote! { #p: 'static });

    let existing_predicates = existing
        .map(|w| {
            let predicates = &w.predicates;
            quote! { #predicates, }
        })
        .unwrap_or_default();

    quote! {
        where
            #existing_predicates
            #(#static_bounds),*
    }
}

/// Finds the field holding the `ModelBase`.
fn base_member(input: &DeriveInput) -> syn::Result<syn::Member> {
    let syn::Data::Struct(data) = &input.data else {
        return Err(syn::Error::new_spanned(input, "Bound can only be derived for structs"));
    };

    let members: Vec<(syn::Member, &syn::Field)> = data
        .fields
        .iter()
        .enumerate()
        .map(|(i, field)| {
            let member = match &field.ident {
                Some(ident) => syn::Member::Named(ident.clone()),
                None => syn::Member::Unnamed(syn::Index::from(i)),
            };
            (member, field)
        })
        .collect();

    let marked: Vec<_> = members
        .iter()
        .filter(|(_, field)| has_bound_marker(&field.attrs))
        .collect();
    match marked.as_slice() {
        [(member, _)] => return Ok(member.clone()),
        [_, (_, second), ..] => {
            return Err(syn::Error::new_spanned(second, "only one field can be marked #[bound]"));
        }
        [] => {}
    }

    let typed: Vec<_> = members
        .iter()
        .filter(|(_, field)| is_model_base(&field.ty))
        .collect();
    match typed.as_slice() {
        [(member, _)] => Ok(member.clone()),
        [] => Err(syn::Error::new_spanned(
            input,
            "no ModelBase field found, add one or mark the binding field with #[bound]",
        )),
        [_, (_, second), ..] => Err(syn::Error::new_spanned(
            second,
            "several ModelBase fields found, mark the binding field with #[bound]",
        )),
    }
}

fn has_bound_marker(attrs: &[syn::Attribute]) -> bool {
    attrs.iter().any(|attr| attr.path().is_ident("bound"))
}

fn is_model_base(ty: &syn::Type) -> bool {
    match ty {
        syn::Type::Path(type_path) => type_path
            .path
            .segments
            .last()
            .is_some_and(|segment| segment.ident == "ModelBase"),
        _ => false,
    }
}
