use std::collections::HashMap;

use super::Reproduction;

/// Outcomes already observed in this session, keyed by branch and then by
/// canonical build name. Never shared between bugs.
#[derive(Debug, Default)]
pub struct ReproductionCache {
    entries: HashMap<String, HashMap<String, Reproduction>>,
}

impl ReproductionCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, branch: &str, build_name: &str) -> Option<&Reproduction> {
        self.entries.get(branch)?.get(build_name)
    }

    pub fn insert(&mut self, branch: &str, build_name: &str, result: Reproduction) {
        self.entries
            .entry(branch.to_string())
            .or_default()
            .insert(build_name.to_string(), result);
    }

    pub fn len(&self) -> usize {
        self.entries.values().map(HashMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::build::BuildRef;

    fn build(name: &str) -> BuildRef {
        BuildRef {
            branch: "central".into(),
            id: "20240105093015".into(),
            changeset: "7bd6cb8b76c078f5e687574decdde97f1e4affce".into(),
            name: name.into(),
        }
    }

    #[test]
    fn entries_are_scoped_by_branch() {
        let mut cache = ReproductionCache::new();
        cache.insert("central", "a", Reproduction::Crashed(build("a")));
        cache.insert("beta", "a", Reproduction::Passed(build("a")));
        assert_eq!(cache.len(), 2);
        assert!(matches!(cache.get("central", "a"), Some(Reproduction::Crashed(_))));
        assert!(matches!(cache.get("beta", "a"), Some(Reproduction::Passed(_))));
        assert!(cache.get("release", "a").is_none());
    }

    #[test]
    fn insert_replaces_existing_entry() {
        let mut cache = ReproductionCache::new();
        cache.insert("central", "a", Reproduction::Failed);
        cache.insert("central", "a", Reproduction::Crashed(build("a")));
        assert_eq!(cache.len(), 1);
        assert!(matches!(cache.get("central", "a"), Some(Reproduction::Crashed(_))));
    }
}
