use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::quote;
use syn::{Data, DeriveInput, Fields, GenericArgument, Lit, PathArguments, Type, parse_macro_input};

/// Convert CamelCase to snake_case
fn to_snake_case(s: &str) -> String {
    let mut result = String::with_capacity(s.len() + 4);
    for (i, c) in s.chars().enumerate() {
        if c.is_ascii_uppercase() {
            if i > 0 {
                result.push('_');
            }
            result.push(c.to_ascii_lowercase());
        } else {
            result.push(c);
        }
    }
    result
}

fn parse_str(meta: &syn::meta::ParseNestedMeta) -> syn::Result<String> {
    meta.input.parse::<syn::Token![=]>()?;
    match meta.input.parse::<Lit>()? {
        Lit::Str(s) => Ok(s.value()),
        other => Err(syn::Error::new_spanned(other, "expected a string literal")),
    }
}

fn parse_bool(meta: &syn::meta::ParseNestedMeta) -> syn::Result<bool> {
    meta.input.parse::<syn::Token![=]>()?;
    match meta.input.parse::<Lit>()? {
        Lit::Bool(b) => Ok(b.value),
        other => Err(syn::Error::new_spanned(other, "expected true or false")),
    }
}

/// Parse #[entity(table = "...", primary_key = "...")]
fn parse_entity_attr(input: &DeriveInput) -> syn::Result<(Option<String>, Option<String>)> {
    let mut table = None;
    let mut primary_key = None;
    for attr in &input.attrs {
        if attr.path().is_ident("entity") {
            attr.parse_nested_meta(|meta| {
                if meta.path.is_ident("table") {
                    table = Some(parse_str(&meta)?);
                } else if meta.path.is_ident("primary_key") {
                    primary_key = Some(parse_str(&meta)?);
                } else {
                    return Err(meta.error("unknown entity attribute"));
                }
                Ok(())
            })?;
        }
    }
    Ok((table, primary_key))
}

/// Parse #[field(column = "...")] / #[field(skip)]
fn parse_field_attr(field: &syn::Field) -> syn::Result<(Option<String>, bool)> {
    let mut column = None;
    let mut skip = false;
    for attr in &field.attrs {
        if attr.path().is_ident("field") {
            attr.parse_nested_meta(|meta| {
                if meta.path.is_ident("column") {
                    column = Some(parse_str(&meta)?);
                } else if meta.path.is_ident("skip") {
                    skip = true;
                } else {
                    return Err(meta.error("unknown field attribute"));
                }
                Ok(())
            })?;
        }
    }
    Ok((column, skip))
}

#[derive(Default)]
struct RelationAttr {
    kind: Option<&'static str>,
    target: Option<syn::Path>,
    column: Option<String>,
    mapped_by: Option<String>,
    join_table: Option<String>,
    join_column: Option<String>,
    inverse_join_column: Option<String>,
    nullable: Option<bool>,
}

const KINDS: &[&str] = &["many_to_one", "one_to_one", "one_to_many", "many_to_many"];

fn parse_relation_attr(field: &syn::Field) -> syn::Result<Option<RelationAttr>> {
    let Some(attr) = field.attrs.iter().find(|a| a.path().is_ident("relation")) else {
        return Ok(None);
    };
    let mut rel = RelationAttr::default();
    attr.parse_nested_meta(|meta| {
        if let Some(kind) = KINDS.iter().find(|k| meta.path.is_ident(k)) {
            if rel.kind.replace(*kind).is_some() {
                return Err(meta.error("relation kind given twice"));
            }
        } else if meta.path.is_ident("target") {
            meta.input.parse::<syn::Token![=]>()?;
            rel.target = Some(meta.input.parse()?);
        } else if meta.path.is_ident("column") {
            rel.column = Some(parse_str(&meta)?);
        } else if meta.path.is_ident("mapped_by") {
            rel.mapped_by = Some(parse_str(&meta)?);
        } else if meta.path.is_ident("join_table") {
            rel.join_table = Some(parse_str(&meta)?);
        } else if meta.path.is_ident("join_column") {
            rel.join_column = Some(parse_str(&meta)?);
        } else if meta.path.is_ident("inverse_join_column") {
            rel.inverse_join_column = Some(parse_str(&meta)?);
        } else if meta.path.is_ident("nullable") {
            rel.nullable = Some(parse_bool(&meta)?);
        } else {
            return Err(meta.error("unknown relation attribute"));
        }
        Ok(())
    })?;
    if rel.kind.is_none() {
        return Err(syn::Error::new_spanned(
            attr,
            "relation needs a kind: many_to_one, one_to_one, one_to_many or many_to_many",
        ));
    }
    Ok(Some(rel))
}

/// The `T` in `Reference<T>` / `Collection<T>`.
fn relation_target(ty: &Type) -> Option<Type> {
    let Type::Path(path) = ty else {
        return None;
    };
    let segment = path.path.segments.last()?;
    if segment.ident != "Reference" && segment.ident != "Collection" {
        return None;
    }
    let PathArguments::AngleBracketed(args) = &segment.arguments else {
        return None;
    };
    args.args.iter().find_map(|arg| match arg {
        GenericArgument::Type(t) => Some(t.clone()),
        _ => None,
    })
}

fn opt_str(value: &Option<String>) -> TokenStream2 {
    match value {
        Some(s) => quote! { ::core::option::Option::Some(#s) },
        None => quote! { ::core::option::Option::None },
    }
}

fn relation_metadata(
    name: &str,
    field: &syn::Field,
    rel: &RelationAttr,
) -> syn::Result<TokenStream2> {
    let target = match (&rel.target, relation_target(&field.ty)) {
        (Some(path), _) => quote! { #path },
        (None, Some(ty)) => quote! { #ty },
        (None, None) => {
            return Err(syn::Error::new_spanned(
                &field.ty,
                "relation target cannot be inferred; add target = Type",
            ));
        }
    };
    let target_fn = quote! { <#target as ::relmap::Entity>::metadata };

    let mut tokens = match rel.kind {
        Some("many_to_one") => quote! { ::relmap::FieldMetadata::many_to_one(#name, #target_fn) },
        Some("one_to_one") => quote! { ::relmap::FieldMetadata::one_to_one(#name, #target_fn) },
        Some("one_to_many") => {
            let Some(mapped_by) = &rel.mapped_by else {
                return Err(syn::Error::new_spanned(field, "one_to_many needs mapped_by"));
            };
            quote! { ::relmap::FieldMetadata::one_to_many(#name, #target_fn, #mapped_by) }
        }
        _ => quote! { ::relmap::FieldMetadata::many_to_many(#name, #target_fn) },
    };

    if rel.kind != Some("one_to_many") {
        if let Some(mapped_by) = &rel.mapped_by {
            tokens = quote! { #tokens.mapped_by(#mapped_by) };
        }
    }
    if let Some(column) = &rel.column {
        tokens = quote! { #tokens.column(#column) };
    }
    if let Some(table) = &rel.join_table {
        let join = opt_str(&rel.join_column);
        let inverse = opt_str(&rel.inverse_join_column);
        tokens = quote! {
            #tokens.join_table(::relmap::JoinTable {
                table: #table,
                join_column: #join,
                inverse_join_column: #inverse,
            })
        };
    }
    if let Some(nullable) = rel.nullable {
        tokens = quote! { #tokens.nullable(#nullable) };
    }
    Ok(tokens)
}

/// Inner type of `Option<T>`, or the type itself.
fn unwrap_option(ty: &Type) -> (&Type, bool) {
    if let Type::Path(path) = ty {
        if let Some(segment) = path.path.segments.last() {
            if segment.ident == "Option" {
                if let PathArguments::AngleBracketed(args) = &segment.arguments {
                    if let Some(GenericArgument::Type(inner)) = args.args.first() {
                        return (inner, true);
                    }
                }
            }
        }
    }
    (ty, false)
}

fn is_string(ty: &Type) -> bool {
    quote!(#ty).to_string().replace(' ', "").ends_with("String")
}

/// Accessors for the primary key field.
fn primary_key_methods(field: &syn::Field) -> (TokenStream2, TokenStream2) {
    let ident = &field.ident;
    let (inner, optional) = unwrap_option(&field.ty);
    let string = is_string(inner);

    let getter = match (optional, string) {
        (true, _) => quote! { self.#ident.clone().map(::relmap::Value::from) },
        (false, true) => quote! {
            (!self.#ident.is_empty()).then(|| ::relmap::Value::from(self.#ident.clone()))
        },
        (false, false) => quote! {
            (self.#ident != 0).then(|| ::relmap::Value::from(self.#ident))
        },
    };

    let converted = if string {
        quote! { ::relmap::entity::key_as_string(key)? }
    } else {
        quote! {
            <#inner as ::core::convert::TryFrom<i64>>::try_from(::relmap::entity::key_as_i64(key)?)
                .map_err(|_| ::relmap::MapperError::invalid(
                    format!("primary key {:?} out of range", key),
                ))?
        }
    };
    let assign = if optional {
        quote! { self.#ident = ::core::option::Option::Some(#converted); }
    } else {
        quote! { self.#ident = #converted; }
    };
    (getter, assign)
}

fn expand(input: DeriveInput) -> syn::Result<TokenStream2> {
    let name = &input.ident;
    if !input.generics.params.is_empty() {
        return Err(syn::Error::new_spanned(
            &input.generics,
            "Entity cannot be derived for generic types",
        ));
    }
    let fields = match &input.data {
        Data::Struct(data) => match &data.fields {
            Fields::Named(fields) => &fields.named,
            _ => {
                return Err(syn::Error::new_spanned(
                    name,
                    "Entity only supports structs with named fields",
                ));
            }
        },
        _ => return Err(syn::Error::new_spanned(name, "Entity only supports structs")),
    };

    let (table, primary_key) = parse_entity_attr(&input)?;
    let entity_name = name.to_string();
    let table = table.unwrap_or_else(|| format!("{}s", to_snake_case(&entity_name)));
    let primary_key = primary_key.unwrap_or_else(|| "id".to_string());

    let mut field_metadata = Vec::new();
    let mut relation_arms = Vec::new();
    let mut pk_methods = None;

    for field in fields {
        let Some(ident) = &field.ident else {
            continue;
        };
        let field_name = ident.to_string();
        let (column, skip) = parse_field_attr(field)?;
        if skip {
            continue;
        }

        if let Some(rel) = parse_relation_attr(field)? {
            field_metadata.push(relation_metadata(&field_name, field, &rel)?);
            relation_arms.push(quote! { #field_name => self.#ident.set_link(link), });
            continue;
        }

        if field_name == primary_key {
            pk_methods = Some(primary_key_methods(field));
        }
        field_metadata.push(match column {
            Some(column) => quote! { ::relmap::FieldMetadata::scalar(#field_name).column(#column) },
            None => quote! { ::relmap::FieldMetadata::scalar(#field_name) },
        });
    }

    let Some((pk_getter, pk_assign)) = pk_methods else {
        return Err(syn::Error::new_spanned(
            name,
            format!("no primary key field `{primary_key}`"),
        ));
    };

    let set_relation = if relation_arms.is_empty() {
        quote! {
            fn set_relation(&mut self, _field: &str, _link: &::relmap::Link) -> bool {
                false
            }
        }
    } else {
        quote! {
            fn set_relation(&mut self, field: &str, link: &::relmap::Link) -> bool {
                match field {
                    #(#relation_arms)*
                    _ => return false,
                }
                true
            }
        }
    };

    Ok(quote! {
        impl ::relmap::Entity for #name {
            fn metadata() -> &'static ::relmap::EntityMetadata {
                static META: ::relmap::EntityMetadata = ::relmap::EntityMetadata {
                    name: #entity_name,
                    table: #table,
                    primary_key: #primary_key,
                    fields: &[#(#field_metadata),*],
                    hydrate: ::relmap::entity::hydrate_boxed::<#name>,
                };
                &META
            }

            fn primary_key(&self) -> ::core::option::Option<::relmap::Value> {
                #pk_getter
            }

            fn set_primary_key(
                &mut self,
                key: &::relmap::Value,
            ) -> ::core::result::Result<(), ::relmap::MapperError> {
                #pk_assign
                Ok(())
            }

            #set_relation
        }
    })
}

/// Derive macro for the `Entity` trait.
///
/// Generates the static metadata table, primary key accessors and the
/// relation setter. The struct must also derive `Serialize` and
/// `Deserialize`; serialized field names are the property names.
///
/// ## Attributes
///
/// - `#[entity(table = "...", primary_key = "...")]` on the struct. The table
///   defaults to the snake_case name plus `s`, the primary key to `id`.
/// - `#[field(column = "...")]` maps a scalar to a differently named column;
///   `#[field(skip)]` leaves a field out of the metadata.
/// - `#[relation(kind, ...)]` on `Reference<T>` / `Collection<T>` fields, where
///   kind is `many_to_one`, `one_to_one`, `one_to_many` or `many_to_many`.
///   Options: `target = Type` (inferred from the field type), `column`,
///   `mapped_by` (required for `one_to_many`; marks any other kind as the
///   inverse side), `join_table`, `join_column`, `inverse_join_column`,
///   `nullable = bool`.
///
/// ## Example
///
/// ```text
/// #[derive(Entity, Serialize, Deserialize)]
/// #[entity(table = "posts")]
/// struct Post {
///     id: Option<i64>,
///     title: String,
///     #[relation(many_to_one)]
///     author: Reference<User>,
///     #[relation(many_to_many, join_table = "post_tags")]
///     tags: Collection<Tag>,
/// }
/// ```
#[proc_macro_derive(Entity, attributes(entity, field, relation))]
pub fn derive_entity(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    expand(input)
        .unwrap_or_else(syn::Error::into_compile_error)
        .into()
}
