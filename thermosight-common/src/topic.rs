/// Separator between topic chunks.
pub const TOPIC_SEPARATOR: char = '/';

/// Resolves aliases to the topics their values are published under.
///
/// An alias that already contains a separator is treated as a full topic and
/// used verbatim. Any other alias is appended to the base topic:
/// `<base>/<alias>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicResolver {
    base: String,
}

impl TopicResolver {
    /// Create a resolver rooted at `base`.
    pub fn new(base: impl Into<String>) -> Self {
        Self { base: base.into() }
    }

    /// The configured base topic.
    pub fn base(&self) -> &str {
        &self.base
    }

    /// Resolve an alias to its topic.
    ///
    /// # Example
    /// ```
    /// use thermosight_common::topic::TopicResolver;
    ///
    /// let topics = TopicResolver::new("house");
    /// assert_eq!(topics.resolve("temp1"), "house/temp1");
    /// assert_eq!(topics.resolve("garage/door"), "garage/door");
    /// ```
    pub fn resolve(&self, alias: &str) -> String {
        resolve_topic(&self.base, alias)
    }

    /// Topic for bridge status messages.
    ///
    /// # Example
    /// ```
    /// use thermosight_common::topic::TopicResolver;
    ///
    /// assert_eq!(TopicResolver::new("house").status_topic(), "house/@/status");
    /// ```
    pub fn status_topic(&self) -> String {
        format!("{}{}@/status", self.base, TOPIC_SEPARATOR)
    }
}

/// Resolve an alias against a base topic.
pub fn resolve_topic(base: &str, alias: &str) -> String {
    if alias.contains(TOPIC_SEPARATOR) {
        alias.to_string()
    } else {
        format!("{}{}{}", base, TOPIC_SEPARATOR, alias)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_alias_gets_base() {
        assert_eq!(resolve_topic("house", "temp1"), "house/temp1");
    }

    #[test]
    fn test_alias_with_separator_is_verbatim() {
        assert_eq!(resolve_topic("house", "a/b"), "a/b");
        assert_eq!(resolve_topic("house", "emon/heating/kw"), "emon/heating/kw");
    }

    #[test]
    fn test_resolver() {
        let topics = TopicResolver::new("emon/boiler");

        assert_eq!(topics.base(), "emon/boiler");
        assert_eq!(topics.resolve("flow"), "emon/boiler/flow");
        assert_eq!(topics.resolve("other/flow"), "other/flow");
        assert_eq!(topics.status_topic(), "emon/boiler/@/status");
    }
}
