use syn::{GenericArgument, PathArguments, Type, TypePath};

/// How a field type takes part in generated SQL.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum FieldShape {
    /// Non-optional number, `bool` or `char`.
    Primitive,
    /// `String`, `DateTime`, `NaiveDate`, or an optional primitive.
    Scalar,
    /// `Vec<String>`.
    StringList,
    /// Any `Vec` other than `Vec<String>`; never bound.
    OtherList,
    /// Another `QueryEntity`.
    Nested,
}

pub(crate) struct TypeInfo {
    pub optional: bool,
    pub shape: FieldShape,
}

pub(crate) fn classify_type(ty: &Type) -> TypeInfo {
    if let Some(inner) = unwrap_option(ty) {
        let inner_shape = classify_type(inner).shape;
        let shape = match inner_shape {
            FieldShape::Primitive => FieldShape::Scalar,
            other => other,
        };
        return TypeInfo { optional: true, shape };
    }

    let shape = if let Some(element) = unwrap_vec(ty) {
        if is_string_type(element) {
            FieldShape::StringList
        } else {
            FieldShape::OtherList
        }
    } else if is_numeric_type(ty) || is_bool_type(ty) || is_char_type(ty) {
        FieldShape::Primitive
    } else if is_string_type(ty) || is_datetime_type(ty) {
        FieldShape::Scalar
    } else {
        FieldShape::Nested
    };
    TypeInfo { optional: false, shape }
}

fn unwrap_option(ty: &Type) -> Option<&Type> {
    unwrap_generic(ty, "Option")
}

fn unwrap_vec(ty: &Type) -> Option<&Type> {
    unwrap_generic(ty, "Vec")
}

fn unwrap_generic<'a>(ty: &'a Type, wrapper: &str) -> Option<&'a Type> {
    let Type::Path(path) = ty else {
        return None;
    };
    let segment = path.path.segments.last()?;
    if segment.ident != wrapper {
        return None;
    }
    match &segment.arguments {
        PathArguments::AngleBracketed(args) => args.args.first().and_then(|arg| match arg {
            GenericArgument::Type(inner) => Some(inner),
            _ => None,
        }),
        _ => None,
    }
}

fn last_ident_str(path: &TypePath) -> Option<String> {
    path.path.segments.last().map(|seg| seg.ident.to_string())
}

fn last_ident_is(ty: &Type, names: &[&str]) -> bool {
    match ty {
        Type::Path(path) => last_ident_str(path).is_some_and(|id| names.contains(&id.as_str())),
        _ => false,
    }
}

fn is_string_type(ty: &Type) -> bool {
    last_ident_is(ty, &["String"])
}

fn is_numeric_type(ty: &Type) -> bool {
    last_ident_is(
        ty,
        &[
            "i8", "i16", "i32", "i64", "i128", "isize", "u8", "u16", "u32", "u64", "u128", "usize", "f32", "f64",
        ],
    )
}

fn is_bool_type(ty: &Type) -> bool {
    last_ident_is(ty, &["bool"])
}

fn is_char_type(ty: &Type) -> bool {
    last_ident_is(ty, &["char"])
}

fn is_datetime_type(ty: &Type) -> bool {
    last_ident_is(ty, &["DateTime", "NaiveDate"])
}
