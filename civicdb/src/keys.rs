/// Common key-construction helpers for the cache and the lock manager.
#[derive(Debug, Clone)]
pub struct KeyContext<'a> {
    pub prefix: &'a str,
}

impl<'a> KeyContext<'a> {
    pub fn new(prefix: &'a str) -> Self {
        Self { prefix }
    }

    /// Hash holding every cached entity of `table`, keyed by entity id.
    pub fn cache_table(&self, table: &str) -> String {
        if self.prefix.is_empty() {
            table.to_string()
        } else {
            format!("{}:cache:{}", self.prefix, table)
        }
    }

    /// Lock key guarding a single record id.
    pub fn record_lock(&self, record_id: &str) -> String {
        format!("{}:lock:{}", self.prefix, record_id)
    }

    /// Glob pattern matching every record lock under this prefix.
    pub fn lock_pattern(&self) -> String {
        format!("{}:lock:*", self.prefix)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_cache_and_lock_keys() {
        let ctx = KeyContext::new("civic");
        assert_eq!(ctx.cache_table("household"), "civic:cache:household");
        assert_eq!(ctx.record_lock("ID-001"), "civic:lock:ID-001");
        assert_eq!(ctx.lock_pattern(), "civic:lock:*");
    }

    #[test]
    fn empty_prefix_uses_bare_table_name() {
        assert_eq!(KeyContext::new("").cache_table("household"), "household");
    }
}
