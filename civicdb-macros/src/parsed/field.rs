use proc_macro2::{Span, TokenStream as TokenStream2};
use quote::quote;
use syn::{Field, Ident, LitStr, Result, spanned::Spanned};

use super::{
    entity::RenameRule,
    ty::{FieldShape, TypeInfo, classify_type},
};

pub(crate) struct ParsedField {
    ident: Ident,
    column: String,
    key: bool,
    ty: TypeInfo,
}

impl ParsedField {
    /// `None` when the field carries `#[query(skip)]`.
    pub(crate) fn from_field(field: &Field, rename: RenameRule) -> Result<Option<Self>> {
        let ident = field
            .ident
            .clone()
            .ok_or_else(|| syn::Error::new(field.span(), "QueryEntity requires named fields"))?;

        let mut key = false;
        let mut skip = false;
        let mut column = None;
        for attr in field.attrs.iter().filter(|attr| attr.path().is_ident("query")) {
            attr.parse_nested_meta(|meta| {
                if meta.path.is_ident("key") {
                    key = true;
                } else if meta.path.is_ident("skip") {
                    skip = true;
                } else if meta.path.is_ident("column") {
                    let value: LitStr = meta.value()?.parse()?;
                    column = Some(value.value());
                } else {
                    return Err(meta.error("unknown query field attribute, expected `key`, `skip` or `column`"));
                }
                Ok(())
            })?;
        }
        if skip {
            return Ok(None);
        }

        let ty = classify_type(&field.ty);
        if key && !ty.optional && matches!(ty.shape, FieldShape::Primitive) {
            return Err(syn::Error::new(
                field.ty.span(),
                "a `#[query(key)]` field must be able to express \"unset\"; wrap it in `Option`",
            ));
        }
        if key && matches!(ty.shape, FieldShape::OtherList) {
            return Err(syn::Error::new(
                field.ty.span(),
                "`#[query(key)]` is not supported on lists other than `Vec<String>`",
            ));
        }

        let name = ident.to_string();
        let name = name.strip_prefix("r#").unwrap_or(&name);
        let column = column.unwrap_or_else(|| rename.apply(name));
        Ok(Some(Self { ident, column, key, ty }))
    }

    /// Expression building this field's `QueryField`, or `None` for ignored lists.
    pub(crate) fn emit_descriptor(&self) -> Option<TokenStream2> {
        let ident = &self.ident;
        let name = LitStr::new(&self.column, Span::call_site());
        let key = self.key;
        let tokens = match (self.ty.shape, self.ty.optional) {
            (FieldShape::OtherList, _) => return None,
            (FieldShape::Primitive, _) => quote! {
                ::civicdb::types::QueryField::primitive(#name, #key)
            },
            (FieldShape::Scalar, false) => quote! {
                ::civicdb::types::QueryField::scalar(
                    #name,
                    #key,
                    ::core::option::Option::Some(::civicdb::types::SqlValue::from(self.#ident.clone())),
                )
            },
            (FieldShape::Scalar, true) => quote! {
                ::civicdb::types::QueryField::scalar(
                    #name,
                    #key,
                    self.#ident.clone().map(::civicdb::types::SqlValue::from),
                )
            },
            (FieldShape::StringList, false) => quote! {
                ::civicdb::types::QueryField::list(
                    #name,
                    #key,
                    ::core::option::Option::Some(
                        self.#ident.iter().cloned().map(::civicdb::types::SqlValue::from).collect(),
                    ),
                )
            },
            (FieldShape::StringList, true) => quote! {
                ::civicdb::types::QueryField::list(
                    #name,
                    #key,
                    self.#ident
                        .as_ref()
                        .map(|values| values.iter().cloned().map(::civicdb::types::SqlValue::from).collect()),
                )
            },
            (FieldShape::Nested, false) => quote! {
                ::civicdb::types::QueryField::nested(
                    #name,
                    #key,
                    ::core::option::Option::Some(::civicdb::types::QueryEntity::query_fields(&self.#ident)),
                )
            },
            (FieldShape::Nested, true) => quote! {
                ::civicdb::types::QueryField::nested(
                    #name,
                    #key,
                    self.#ident.as_ref().map(::civicdb::types::QueryEntity::query_fields),
                )
            },
        };
        Some(tokens)
    }

    /// `match` arm returning the field's value for `column_value`, top-level scalars only.
    pub(crate) fn emit_column_arm(&self) -> Option<TokenStream2> {
        let ident = &self.ident;
        let name = LitStr::new(&self.column, Span::call_site());
        let value = match (self.ty.shape, self.ty.optional) {
            (FieldShape::Primitive, _) | (FieldShape::Scalar, false) => quote! {
                ::core::option::Option::Some(::civicdb::types::SqlValue::from(self.#ident.clone()))
            },
            (FieldShape::Scalar, true) => quote! {
                self.#ident.clone().map(::civicdb::types::SqlValue::from)
            },
            _ => return None,
        };
        Some(quote! { #name => #value })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use syn::{DeriveInput, Fields};

    fn first_field(src: &str) -> Field {
        let input: DeriveInput = syn::parse_str(src).expect("struct parses");
        match input.data {
            syn::Data::Struct(data) => match data.fields {
                Fields::Named(named) => named.named.into_iter().next().expect("one field"),
                _ => panic!("named fields expected"),
            },
            _ => panic!("struct expected"),
        }
    }

    #[test]
    fn rejects_key_on_plain_primitive() {
        let field = first_field("struct Stock { #[query(key)] id: u64 }");
        let err = ParsedField::from_field(&field, RenameRule::None).err().expect("rejected");
        assert!(err.to_string().contains("Option"));
    }

    #[test]
    fn accepts_key_on_optional_primitive() {
        let field = first_field("struct Stock { #[query(key)] id: Option<u64> }");
        let parsed = ParsedField::from_field(&field, RenameRule::None).unwrap().expect("not skipped");
        assert!(parsed.key);
        assert_eq!(parsed.column, "id");
    }
}
