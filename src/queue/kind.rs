use std::fmt;

/// The role a queue plays for its database.
///
/// `Lead` is the sole entry point and owns the connection pool; the other
/// kinds are specialized workers a Lead spawns to split work by category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueueKind {
    Lead,
    Slow,
    Medium,
    Fast,
    Cache,
}

impl QueueKind {
    /// Map a caller-supplied type hint to a worker kind.
    ///
    /// Pure function: unknown or missing hints default to `Medium`, matching
    /// is case-insensitive, and `Lead` is never returned (a Lead is created,
    /// not selected).
    #[must_use]
    pub fn select(hint: Option<&str>) -> QueueKind {
        match hint {
            Some(h) if h.eq_ignore_ascii_case("slow") => QueueKind::Slow,
            Some(h) if h.eq_ignore_ascii_case("fast") => QueueKind::Fast,
            Some(h) if h.eq_ignore_ascii_case("cache") => QueueKind::Cache,
            _ => QueueKind::Medium,
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            QueueKind::Lead => "lead",
            QueueKind::Slow => "slow",
            QueueKind::Medium => "medium",
            QueueKind::Fast => "fast",
            QueueKind::Cache => "cache",
        }
    }
}

impl fmt::Display for QueueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_and_unknown_hints_default_to_medium() {
        assert_eq!(QueueKind::select(None), QueueKind::Medium);
        assert_eq!(QueueKind::select(Some("bogus")), QueueKind::Medium);
        assert_eq!(QueueKind::select(Some("")), QueueKind::Medium);
        assert_eq!(QueueKind::select(Some("lead")), QueueKind::Medium);
    }

    #[test]
    fn known_hints_map_case_insensitively() {
        assert_eq!(QueueKind::select(Some("fast")), QueueKind::Fast);
        assert_eq!(QueueKind::select(Some("FAST")), QueueKind::Fast);
        assert_eq!(QueueKind::select(Some("Slow")), QueueKind::Slow);
        assert_eq!(QueueKind::select(Some("cache")), QueueKind::Cache);
        assert_eq!(QueueKind::select(Some("medium")), QueueKind::Medium);
    }
}
