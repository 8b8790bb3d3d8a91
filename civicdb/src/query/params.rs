use std::collections::BTreeMap;

use crate::{errors::QueryBuilderError, types::SqlValue};

/// Values bound to `:name` markers in a generated statement.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NamedParams {
    values: BTreeMap<String, SqlValue>,
}

impl NamedParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<SqlValue>) {
        self.values.insert(name.into(), value.into());
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<SqlValue>) -> Self {
        self.insert(name, value);
        self
    }

    pub fn get(&self, name: &str) -> Option<&SqlValue> {
        self.values.get(name)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &SqlValue)> {
        self.values.iter().map(|(name, value)| (name.as_str(), value))
    }

    pub fn extend(&mut self, other: NamedParams) {
        self.values.extend(other.values);
    }

    /// Rewrite `:name` markers into Postgres `$n` placeholders.
    ///
    /// List values expand to one placeholder per element (an empty list becomes
    /// `NULL`, which matches nothing inside `IN (...)`). `::` casts and quoted
    /// literals are left untouched.
    pub fn to_positional(&self, sql: &str) -> Result<(String, Vec<SqlValue>), QueryBuilderError> {
        let chars: Vec<char> = sql.chars().collect();
        let mut rendered = String::with_capacity(sql.len());
        let mut bound = Vec::new();
        let mut in_literal = false;
        let mut i = 0;

        while i < chars.len() {
            let ch = chars[i];
            if ch == '\'' {
                in_literal = !in_literal;
                rendered.push(ch);
                i += 1;
                continue;
            }
            if in_literal || ch != ':' {
                rendered.push(ch);
                i += 1;
                continue;
            }
            if chars.get(i + 1) == Some(&':') {
                rendered.push_str("::");
                i += 2;
                continue;
            }
            let start = i + 1;
            let mut end = start;
            while end < chars.len() && (chars[end].is_ascii_alphanumeric() || chars[end] == '_') {
                end += 1;
            }
            if end == start || chars[start].is_ascii_digit() {
                rendered.push(ch);
                i += 1;
                continue;
            }

            let name: String = chars[start..end].iter().collect();
            let value = self
                .values
                .get(&name)
                .ok_or_else(|| QueryBuilderError::UnboundParameter { name: name.clone() })?;
            match value {
                SqlValue::List(items) if items.is_empty() => rendered.push_str("NULL"),
                SqlValue::List(items) => {
                    let placeholders: Vec<String> = items
                        .iter()
                        .map(|item| {
                            bound.push(item.clone());
                            format!("${}", bound.len())
                        })
                        .collect();
                    rendered.push_str(&placeholders.join(", "));
                }
                single => {
                    bound.push(single.clone());
                    rendered.push_str(&format!("${}", bound.len()));
                }
            }
            i = end;
        }

        Ok((rendered, bound))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rewrites_scalars_in_order_of_appearance() {
        let params = NamedParams::new().with("b", 2_i32).with("a", "x");
        let (sql, values) = params
            .to_positional("SELECT * FROM t WHERE a=:a AND b=:b")
            .expect("rewrite");
        assert_eq!(sql, "SELECT * FROM t WHERE a=$1 AND b=$2");
        assert_eq!(values, vec![SqlValue::from("x"), SqlValue::Int(2)]);
    }

    #[test]
    fn expands_lists_and_keeps_casts() {
        let params = NamedParams::new().with("ids", vec!["p1", "p2"]);
        let (sql, values) = params
            .to_positional("SELECT id::text FROM t WHERE id IN (:ids)")
            .expect("rewrite");
        assert_eq!(sql, "SELECT id::text FROM t WHERE id IN ($1, $2)");
        assert_eq!(values.len(), 2);
    }

    #[test]
    fn empty_list_matches_nothing() {
        let params = NamedParams::new().with("ids", Vec::<String>::new());
        let (sql, values) = params.to_positional("id IN (:ids)").expect("rewrite");
        assert_eq!(sql, "id IN (NULL)");
        assert!(values.is_empty());
    }

    #[test]
    fn ignores_markers_inside_literals() {
        let params = NamedParams::new();
        let (sql, _) = params.to_positional("SELECT ':not_a_param'").expect("rewrite");
        assert_eq!(sql, "SELECT ':not_a_param'");
    }

    #[test]
    fn reports_unbound_parameters() {
        let err = NamedParams::new().to_positional("a=:a").unwrap_err();
        assert_eq!(err, QueryBuilderError::UnboundParameter { name: "a".into() });
    }
}
