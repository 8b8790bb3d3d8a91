use proc_macro2::{Span, TokenStream as TokenStream2};
use quote::quote;
use syn::{Attribute, Data, DeriveInput, Error, Fields, Ident, LitStr, Result};

use super::field::ParsedField;

/// Column naming applied to fields without an explicit `column`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub(crate) enum RenameRule {
    #[default]
    None,
    CamelCase,
    PascalCase,
    Lowercase,
}

impl RenameRule {
    fn parse(value: &LitStr) -> Result<Self> {
        match value.value().as_str() {
            "snake_case" => Ok(Self::None),
            "camelCase" => Ok(Self::CamelCase),
            "PascalCase" => Ok(Self::PascalCase),
            "lowercase" => Ok(Self::Lowercase),
            other => Err(Error::new(
                value.span(),
                format!("unsupported rename_all `{other}`, expected camelCase, PascalCase, snake_case or lowercase"),
            )),
        }
    }

    pub(crate) fn apply(self, field: &str) -> String {
        match self {
            Self::None => field.to_string(),
            Self::Lowercase => field.replace('_', "").to_lowercase(),
            Self::CamelCase | Self::PascalCase => {
                let mut result = String::with_capacity(field.len());
                let mut upper = self == Self::PascalCase;
                for ch in field.chars() {
                    if ch == '_' {
                        upper = !result.is_empty();
                    } else if upper {
                        result.push(ch.to_ascii_uppercase());
                        upper = false;
                    } else {
                        result.push(ch);
                    }
                }
                result
            }
        }
    }
}

pub(crate) struct ParsedEntity {
    name: Ident,
    generics: syn::Generics,
    table: Option<String>,
    fields: Vec<ParsedField>,
}

impl ParsedEntity {
    pub(crate) fn from_input(input: &DeriveInput) -> Result<Self> {
        let data = match &input.data {
            Data::Struct(data) => data,
            _ => return Err(Error::new_spanned(&input.ident, "QueryEntity can only be derived for structs")),
        };
        let named = match &data.fields {
            Fields::Named(named) => named,
            _ => {
                return Err(Error::new_spanned(
                    &input.ident,
                    "QueryEntity requires a struct with named fields",
                ));
            }
        };

        let mut table = None;
        let mut rename = RenameRule::default();
        for attr in input.attrs.iter().filter(|attr| attr.path().is_ident("query")) {
            Self::parse_container_attr(attr, &mut table, &mut rename)?;
        }

        let mut fields = Vec::with_capacity(named.named.len());
        for field in &named.named {
            if let Some(parsed) = ParsedField::from_field(field, rename)? {
                fields.push(parsed);
            }
        }

        Ok(Self {
            name: input.ident.clone(),
            generics: input.generics.clone(),
            table,
            fields,
        })
    }

    fn parse_container_attr(attr: &Attribute, table: &mut Option<String>, rename: &mut RenameRule) -> Result<()> {
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("table") {
                let value: LitStr = meta.value()?.parse()?;
                if value.value().is_empty() {
                    return Err(Error::new(value.span(), "table name must not be empty"));
                }
                *table = Some(value.value());
            } else if meta.path.is_ident("rename_all") {
                let value: LitStr = meta.value()?.parse()?;
                *rename = RenameRule::parse(&value)?;
            } else {
                return Err(meta.error("unknown query attribute, expected `table` or `rename_all`"));
            }
            Ok(())
        })
    }

    pub(crate) fn emit(&self) -> TokenStream2 {
        let name = &self.name;
        let (impl_generics, ty_generics, where_clause) = self.generics.split_for_impl();

        let table = match &self.table {
            Some(table) => {
                let lit = LitStr::new(table, Span::call_site());
                quote! { ::core::option::Option::Some(#lit) }
            }
            None => quote! { ::core::option::Option::None },
        };
        let descriptors = self.fields.iter().filter_map(ParsedField::emit_descriptor);
        let column_arms = self.fields.iter().filter_map(ParsedField::emit_column_arm);

        quote! {
            impl #impl_generics ::civicdb::types::QueryEntity for #name #ty_generics #where_clause {
                fn table_name() -> ::core::option::Option<&'static str> {
                    #table
                }

                fn query_fields(&self) -> ::std::vec::Vec<::civicdb::types::QueryField> {
                    ::std::vec![#(#descriptors),*]
                }

                #[allow(unreachable_patterns)]
                fn column_value(&self, column: &str) -> ::core::option::Option<::civicdb::types::SqlValue> {
                    match column {
                        #(#column_arms,)*
                        _ => ::core::option::Option::None,
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renames_columns() {
        assert_eq!(RenameRule::CamelCase.apply("client_reference_id"), "clientReferenceId");
        assert_eq!(RenameRule::PascalCase.apply("client_reference_id"), "ClientReferenceId");
        assert_eq!(RenameRule::Lowercase.apply("tenant_id"), "tenantid");
        assert_eq!(RenameRule::None.apply("tenant_id"), "tenant_id");
        assert_eq!(RenameRule::CamelCase.apply("id"), "id");
    }
}
