use crate::{config::SchemaSettings, errors::QueryBuilderError};

use super::builder::ensure_identifier;

/// Placeholder left in generated SQL where the tenant's schema goes.
pub const SCHEMA_PLACEHOLDER: &str = "{schema}";

/// Resolves the `{schema}` placeholder for a tenant.
///
/// On a central (multi-state) instance the schema is one segment of the dotted
/// tenant id, e.g. `pb` for `pb.amritsar` at index 0. Otherwise the placeholder
/// becomes the configured default schema, or disappears when there is none.
#[derive(Debug, Clone, Default)]
pub struct SchemaResolver {
    central_instance: bool,
    state_schema_index: usize,
    default_schema: Option<String>,
}

impl SchemaResolver {
    pub fn new(settings: &SchemaSettings) -> Self {
        Self {
            central_instance: settings.central_instance,
            state_schema_index: settings.state_schema_index,
            default_schema: settings.default_schema.clone(),
        }
    }

    /// Whether resolving the placeholder needs a real tenant id.
    pub fn requires_tenant(&self) -> bool {
        self.central_instance
    }

    pub fn schema_for(&self, tenant_id: &str) -> Result<Option<String>, QueryBuilderError> {
        if !self.central_instance {
            return Ok(self.default_schema.clone());
        }
        let schema = tenant_id
            .split('.')
            .nth(self.state_schema_index)
            .filter(|segment| !segment.is_empty())
            .ok_or_else(|| QueryBuilderError::InvalidTenant {
                tenant_id: tenant_id.to_string(),
            })?;
        ensure_identifier(schema)?;
        Ok(Some(schema.to_string()))
    }

    pub fn replace_placeholder(&self, sql: &str, tenant_id: &str) -> Result<String, QueryBuilderError> {
        if !sql.contains(SCHEMA_PLACEHOLDER) {
            return Ok(sql.to_string());
        }
        Ok(match self.schema_for(tenant_id)? {
            Some(schema) => sql.replace(SCHEMA_PLACEHOLDER, &schema),
            None => sql.replace(&format!("{SCHEMA_PLACEHOLDER}."), ""),
        })
    }
}
