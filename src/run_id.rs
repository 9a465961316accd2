use serde::Serialize;
use std::fmt;
use uuid::Uuid;

/// Hex characters of the UUID kept in dataset and table names.
const SHORT_LEN: usize = 12;

/// The three successive warehouse layers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Layer {
    Raw,
    Trusted,
    Refined,
}

impl Layer {
    pub fn as_str(&self) -> &'static str {
        match self {
            Layer::Raw => "raw",
            Layer::Trusted => "trusted",
            Layer::Refined => "refined",
        }
    }
}

impl fmt::Display for Layer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identity of one pipeline execution. Every dataset and table a run writes
/// is namespaced by it, so runs never collide and old runs stay readable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct RunIdentity(Uuid);

impl RunIdentity {
    /// Fresh random (v4) identity; no coordination needed.
    #[allow(clippy::new_without_default)]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn uuid(&self) -> Uuid {
        self.0
    }

    /// Hyphenated UUID, stored in refined rows and run history.
    pub fn full(&self) -> String {
        self.0.hyphenated().to_string()
    }

    /// Identifier-safe prefix used in dataset/table names.
    pub fn short(&self) -> String {
        let mut s = self.0.simple().to_string();
        s.truncate(SHORT_LEN);
        s
    }

    /// `<prefix>_<layer>_<short>`, e.g. `economic_indices_trusted_1a2b3c4d5e6f`.
    pub fn dataset_name(&self, prefix: &str, layer: Layer) -> String {
        format!("{}_{}_{}", prefix, layer, self.short())
    }

    /// `<layer>_<short>_<index>`, or `<layer>_<short>` without an index.
    pub fn table_name(&self, layer: Layer, index: Option<&str>) -> String {
        match index {
            Some(index) => format!("{}_{}_{}", layer, self.short(), index),
            None => format!("{}_{}", layer, self.short()),
        }
    }
}

impl fmt::Display for RunIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.hyphenated())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn identities_are_unique() {
        let ids: HashSet<RunIdentity> = (0..1_000).map(|_| RunIdentity::new()).collect();
        assert_eq!(ids.len(), 1_000);
        let shorts: HashSet<String> = ids.iter().map(RunIdentity::short).collect();
        assert_eq!(shorts.len(), 1_000);
    }

    #[test]
    fn names_are_namespaced_by_run() {
        let run = RunIdentity::new();
        let short = run.short();
        assert_eq!(short.len(), SHORT_LEN);
        assert!(short.chars().all(|c| c.is_ascii_hexdigit()));

        assert_eq!(
            run.table_name(Layer::Trusted, Some("icc")),
            format!("trusted_{short}_icc")
        );
        assert_eq!(run.table_name(Layer::Refined, None), format!("refined_{short}"));
        assert_eq!(
            run.dataset_name("economic_indices", Layer::Raw),
            format!("economic_indices_raw_{short}")
        );
        assert_eq!(run.full().len(), 36);
        assert!(run.full().starts_with(&short[..8]));
    }
}
