//! Generic cache-fronted repository.
//!
//! Reads consult the table's cache hash first and fall back to the database for
//! anything missing, refreshing the cache with the result. Writes never touch
//! the database: [`GenericRepository::save`] publishes the batch to a topic for
//! asynchronous persistence and refreshes the cache so the saved entities are
//! readable straight away.

use std::{collections::HashSet, marker::PhantomData, time::Duration};

use log::{debug, info, warn};
use serde::{Deserialize, Serialize, de::DeserializeOwned};

use crate::{
    cache::EntityCache,
    config::CacheSettings,
    errors::{QueryBuilderError, RepoError},
    publish::TopicPublisher,
    query::{
        BuiltQuery, NamedParams, QueryBuilder, SchemaResolver, SelectQueryBuilder, bind_token,
        builder::{ensure_identifier, qualified_table},
        schema::SCHEMA_PLACEHOLDER,
    },
    runtime::{RowMapper, SqlExecutor},
    types::QueryEntity,
};

/// Column names and cache behaviour of a repository.
#[derive(Debug, Clone, PartialEq)]
pub struct RepositoryOptions {
    pub id_column: String,
    pub deleted_column: String,
    pub tenant_column: String,
    pub last_modified_column: String,
    /// Column whose value keys an entity inside the cache hash.
    pub cache_key_column: String,
    pub cache_ttl: Duration,
    /// Schema qualifying the table; may be the `{schema}` placeholder.
    pub schema: String,
}

impl Default for RepositoryOptions {
    fn default() -> Self {
        Self {
            id_column: "id".to_string(),
            deleted_column: "isDeleted".to_string(),
            tenant_column: "tenantId".to_string(),
            last_modified_column: "lastModifiedTime".to_string(),
            cache_key_column: "id".to_string(),
            cache_ttl: CacheSettings::default().time_to_live(),
            schema: String::new(),
        }
    }
}

impl RepositoryOptions {
    pub fn from_settings(cache: &CacheSettings) -> Self {
        Self {
            cache_ttl: cache.time_to_live(),
            ..Self::default()
        }
    }

    pub fn with_cache_key_column(mut self, column: impl Into<String>) -> Self {
        self.cache_key_column = column.into();
        self
    }

    pub fn with_schema(mut self, schema: impl Into<String>) -> Self {
        self.schema = schema.into();
        self
    }

    fn validate(&self) -> Result<(), QueryBuilderError> {
        for column in [
            &self.id_column,
            &self.deleted_column,
            &self.tenant_column,
            &self.last_modified_column,
            &self.cache_key_column,
        ] {
            ensure_identifier(column)?;
        }
        if !self.schema.is_empty() && self.schema != SCHEMA_PLACEHOLDER {
            ensure_identifier(&self.schema)?;
        }
        Ok(())
    }
}

/// Entities handed to a topic for asynchronous persistence.
///
/// Being enqueued is not being stored: the rows appear once the topic's
/// consumer has processed the batch.
#[derive(Debug, Clone, PartialEq)]
pub struct Enqueued<T> {
    pub topic: String,
    entities: Vec<T>,
}

impl<T> Enqueued<T> {
    pub fn entities(&self) -> &[T] {
        &self.entities
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    pub fn into_inner(self) -> Vec<T> {
        self.entities
    }
}

/// One page of search results with the size of the whole result set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "utoipa", derive(utoipa::ToSchema))]
#[serde(rename_all = "camelCase")]
pub struct SearchResponse<T> {
    pub response: Vec<T>,
    pub total_count: i64,
}

/// Search filters shared by [`GenericRepository::find`] and
/// [`GenericRepository::find_with_count`].
#[derive(Debug, Clone, PartialEq)]
pub struct SearchPage<'a> {
    pub tenant_id: &'a str,
    pub limit: u32,
    pub offset: u32,
    /// Only rows modified at or after this epoch-millisecond timestamp.
    pub last_changed_since: Option<i64>,
    pub include_deleted: bool,
}

impl<'a> SearchPage<'a> {
    pub fn new(tenant_id: &'a str, limit: u32, offset: u32) -> Self {
        Self {
            tenant_id,
            limit,
            offset,
            last_changed_since: None,
            include_deleted: false,
        }
    }

    pub fn changed_since(mut self, epoch_millis: Option<i64>) -> Self {
        self.last_changed_since = epoch_millis;
        self
    }

    pub fn include_deleted(mut self, include_deleted: bool) -> Self {
        self.include_deleted = include_deleted;
        self
    }
}

pub struct GenericRepository<T, X, M, C, P> {
    table: String,
    executor: X,
    row_mapper: M,
    cache: C,
    publisher: P,
    select_builder: SelectQueryBuilder,
    schema_resolver: SchemaResolver,
    options: RepositoryOptions,
    _marker: PhantomData<fn() -> T>,
}

impl<T, X, M, C, P> GenericRepository<T, X, M, C, P>
where
    T: QueryEntity + Serialize + DeserializeOwned,
    X: SqlExecutor,
    M: RowMapper<X::Row, T>,
    C: EntityCache,
    P: TopicPublisher,
{
    pub fn new(
        table: impl Into<String>,
        executor: X,
        row_mapper: M,
        cache: C,
        publisher: P,
    ) -> Result<Self, QueryBuilderError> {
        let table = table.into();
        ensure_identifier(&table)?;
        Ok(Self {
            table,
            executor,
            row_mapper,
            cache,
            publisher,
            select_builder: SelectQueryBuilder::new(),
            schema_resolver: SchemaResolver::default(),
            options: RepositoryOptions::default(),
            _marker: PhantomData,
        })
    }

    pub fn with_options(mut self, options: RepositoryOptions) -> Result<Self, QueryBuilderError> {
        options.validate()?;
        self.options = options;
        Ok(self)
    }

    /// Resolver for a `{schema}` placeholder in [`RepositoryOptions::schema`].
    pub fn with_schema_resolver(mut self, resolver: SchemaResolver) -> Self {
        self.schema_resolver = resolver;
        self
    }

    pub fn table_name(&self) -> &str {
        &self.table
    }

    pub fn options(&self) -> &RepositoryOptions {
        &self.options
    }

    pub fn cache(&self) -> &C {
        &self.cache
    }

    /// Entities whose id is in `ids`.
    pub async fn find_by_id(&self, ids: &[String], include_deleted: bool) -> Result<Vec<T>, RepoError> {
        self.find_by_column_in(None, ids, include_deleted, &self.options.id_column)
            .await
    }

    /// Entities whose `column` value is in `ids`.
    ///
    /// The cache answers alone only when `column` is the cache key column and
    /// every id is cached. Otherwise the database is queried for the full id
    /// list, its rows replace cached entities with the same key, and the
    /// combined result is written back to the cache.
    pub async fn find_by_column(
        &self,
        ids: &[String],
        include_deleted: bool,
        column: &str,
    ) -> Result<Vec<T>, RepoError> {
        self.find_by_column_in(None, ids, include_deleted, column).await
    }

    /// [`find_by_column`](Self::find_by_column) against a tenant's schema.
    pub async fn find_by_column_for_tenant(
        &self,
        tenant_id: &str,
        ids: &[String],
        include_deleted: bool,
        column: &str,
    ) -> Result<Vec<T>, RepoError> {
        self.find_by_column_in(Some(tenant_id), ids, include_deleted, column)
            .await
    }

    async fn find_by_column_in(
        &self,
        tenant_id: Option<&str>,
        ids: &[String],
        include_deleted: bool,
        column: &str,
    ) -> Result<Vec<T>, RepoError> {
        ensure_identifier(column)?;
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut found = Vec::new();
        if column == self.options.cache_key_column {
            let cached = self.find_in_cache(ids).await?;
            let cached_keys: HashSet<String> = cached.iter().filter_map(|entity| self.key_of(entity, column)).collect();
            found = cached
                .into_iter()
                .filter(|entity| include_deleted || !self.is_deleted(entity))
                .collect();
            if ids.iter().all(|id| cached_keys.contains(id)) {
                info!("all {} requested {} entities served from cache", ids.len(), self.table);
                return Ok(found);
            }
        }

        let table = self.table_sql(tenant_id)?;
        let mut sql = format!("SELECT * FROM {table} WHERE {column} IN (:ids)");
        let mut params = NamedParams::new().with("ids", ids.to_vec());
        if !include_deleted {
            sql.push_str(&format!(" AND {}", bind_token(&self.options.deleted_column)));
            params.insert(self.options.deleted_column.clone(), false);
        }
        let fetched = self.fetch(&sql, &params).await?;
        info!("fetched {} {} entities from the database", fetched.len(), self.table);

        let fetched_keys: HashSet<String> = fetched.iter().filter_map(|entity| self.key_of(entity, column)).collect();
        found.retain(|entity| {
            self.key_of(entity, column)
                .is_none_or(|key| !fetched_keys.contains(&key))
        });
        found.extend(fetched);
        self.put_in_cache(&found).await?;
        Ok(found)
    }

    /// Publish `entities` to `topic` and cache them under the cache key column.
    pub async fn save(&self, entities: Vec<T>, topic: &str) -> Result<Enqueued<T>, RepoError> {
        let column = self.options.cache_key_column.clone();
        self.save_with_cache_key(entities, topic, &column).await
    }

    /// Publish `entities` to `topic` as one message and cache them keyed by
    /// `cache_key_column`.
    ///
    /// Once the message is published the batch counts as enqueued: a failed
    /// cache write is only logged.
    pub async fn save_with_cache_key(
        &self,
        entities: Vec<T>,
        topic: &str,
        cache_key_column: &str,
    ) -> Result<Enqueued<T>, RepoError> {
        ensure_identifier(cache_key_column)?;
        let payload = serde_json::to_string(&entities)?;
        self.publisher.publish(topic, &payload).await?;
        info!("pushed {} {} entities to topic {topic}", entities.len(), self.table);
        if let Err(err) = self.put_in_cache_by(&entities, cache_key_column).await {
            warn!("{} entities pushed to {topic} but not cached: {err}", self.table);
        }
        Ok(Enqueued {
            topic: topic.to_string(),
            entities,
        })
    }

    /// Entities matching every set field of `search` within the tenant,
    /// ordered by id and paged.
    pub async fn find<S>(&self, search: &S, page: &SearchPage<'_>) -> Result<Vec<T>, RepoError>
    where
        S: QueryEntity + ?Sized,
    {
        let (sql, params) = self.search_query(search, page)?;
        let sql = format!(
            "{sql} ORDER BY {} ASC LIMIT :limit OFFSET :offset",
            self.options.id_column
        );
        let params = params.with("limit", page.limit).with("offset", page.offset);
        self.fetch(&sql, &params).await
    }

    /// [`find`](Self::find) plus the number of matches across all pages.
    pub async fn find_with_count<S>(&self, search: &S, page: &SearchPage<'_>) -> Result<SearchResponse<T>, RepoError>
    where
        S: QueryEntity + ?Sized,
    {
        let (sql, params) = self.search_query(search, page)?;
        let count_sql = format!("SELECT COUNT(*) FROM ({sql}) AS total_result");
        let total_count = self.executor.fetch_count(&count_sql, &params).await?;
        let response = self.find(search, page).await?;
        Ok(SearchResponse { response, total_count })
    }

    /// The subset of `ids` naming a live entity, in request order.
    ///
    /// Ids found on a non-deleted entity in the cache are accepted outright; the
    /// rest are checked against the database.
    pub async fn validate_ids(&self, ids: &[String], column: &str) -> Result<Vec<String>, RepoError> {
        self.validate_ids_in(None, ids, column).await
    }

    /// [`validate_ids`](Self::validate_ids) against a tenant's schema.
    pub async fn validate_ids_for_tenant(
        &self,
        tenant_id: &str,
        ids: &[String],
        column: &str,
    ) -> Result<Vec<String>, RepoError> {
        self.validate_ids_in(Some(tenant_id), ids, column).await
    }

    async fn validate_ids_in(
        &self,
        tenant_id: Option<&str>,
        ids: &[String],
        column: &str,
    ) -> Result<Vec<String>, RepoError> {
        ensure_identifier(column)?;
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut live = HashSet::new();
        for (_, json) in self.cache.get_all(&self.table).await? {
            let entity: T = serde_json::from_str(&json)?;
            if !self.is_deleted(&entity)
                && let Some(key) = self.key_of(&entity, column)
            {
                live.insert(key);
            }
        }

        let pending: Vec<String> = ids.iter().filter(|id| !live.contains(*id)).cloned().collect();
        if !pending.is_empty() {
            let sql = format!(
                "SELECT {column} FROM {} WHERE {column} IN (:ids) AND {} FETCH FIRST {} ROWS ONLY",
                self.table_sql(tenant_id)?,
                bind_token(&self.options.deleted_column),
                pending.len()
            );
            let params = NamedParams::new()
                .with("ids", pending.clone())
                .with(self.options.deleted_column.clone(), false);
            let existing = self.executor.fetch_strings(&sql, &params).await?;
            debug!("{} of {} uncached ids exist in {}", existing.len(), pending.len(), self.table);
            live.extend(existing);
        }

        Ok(ids.iter().filter(|id| live.contains(*id)).cloned().collect())
    }

    fn search_query<S>(&self, search: &S, page: &SearchPage<'_>) -> Result<(String, NamedParams), RepoError>
    where
        S: QueryEntity + ?Sized,
    {
        let built = self
            .select_builder
            .build_for_table(&self.options.schema, &self.table, search)?;
        let has_where = built.has_where();
        let BuiltQuery { sql, mut params, .. } = built;
        let mut clauses = Vec::new();

        clauses.push(bind_token(&self.options.tenant_column));
        params.insert(self.options.tenant_column.clone(), page.tenant_id);
        if !page.include_deleted {
            clauses.push(bind_token(&self.options.deleted_column));
            params.insert(self.options.deleted_column.clone(), false);
        }
        if let Some(since) = page.last_changed_since {
            let column = &self.options.last_modified_column;
            clauses.push(format!("{column}>=:{column}"));
            params.insert(column.clone(), since);
        }

        let joiner = if has_where { " AND " } else { " WHERE " };
        let sql = format!("{sql}{joiner}{}", clauses.join(" AND "));
        let sql = self.schema_resolver.replace_placeholder(&sql, page.tenant_id)?;
        Ok((sql, params))
    }

    fn table_sql(&self, tenant_id: Option<&str>) -> Result<String, QueryBuilderError> {
        let table = qualified_table(&self.options.schema, &self.table)?;
        match tenant_id {
            Some(tenant_id) => self.schema_resolver.replace_placeholder(&table, tenant_id),
            None if self.options.schema == SCHEMA_PLACEHOLDER && self.schema_resolver.requires_tenant() => {
                Err(QueryBuilderError::TenantRequired { table: self.table.clone() })
            }
            None => self.schema_resolver.replace_placeholder(&table, ""),
        }
    }

    async fn fetch(&self, sql: &str, params: &NamedParams) -> Result<Vec<T>, RepoError> {
        self.executor
            .fetch_all(sql, params)
            .await?
            .iter()
            .map(|row| self.row_mapper.map_row(row))
            .collect()
    }

    async fn find_in_cache(&self, ids: &[String]) -> Result<Vec<T>, RepoError> {
        debug!("looking up {} {} entities in cache", ids.len(), self.table);
        let mut entities = Vec::new();
        for json in self.cache.get_many(&self.table, ids).await?.into_iter().flatten() {
            entities.push(serde_json::from_str(&json)?);
        }
        if entities.is_empty() {
            info!("cache miss for {}", self.table);
        } else {
            info!("cache hit, {} {} entities found", entities.len(), self.table);
        }
        Ok(entities)
    }

    async fn put_in_cache(&self, entities: &[T]) -> Result<(), RepoError> {
        self.put_in_cache_by(entities, &self.options.cache_key_column).await
    }

    async fn put_in_cache_by(&self, entities: &[T], column: &str) -> Result<(), RepoError> {
        let mut entries = Vec::with_capacity(entities.len());
        for entity in entities {
            if let Some(key) = self.key_of(entity, column) {
                entries.push((key, serde_json::to_string(entity)?));
            }
        }
        if entries.is_empty() {
            return Ok(());
        }
        self.cache.put_many(&self.table, &entries, self.options.cache_ttl).await?;
        info!("cached {} {} entities by {column}", entries.len(), self.table);
        Ok(())
    }

    fn key_of(&self, entity: &T, column: &str) -> Option<String> {
        entity.column_value(column).and_then(|value| value.to_key())
    }

    fn is_deleted(&self, entity: &T) -> bool {
        entity
            .column_value(&self.options.deleted_column)
            .and_then(|value| value.as_bool())
            .unwrap_or(false)
    }
}
