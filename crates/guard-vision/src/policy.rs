use serde::Deserialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchMode {
    /// Raw label must equal a keyword or exception verbatim.
    Exact,
    /// Trim + case-fold, then keyword substring or exception equality, vetoed by any negation substring.
    Heuristic,
}

/// Which detector labels count as "helmet present".
///
/// Upstream label vocabularies differ between deployments ("helmet", "Motorcycle-Helmet ",
/// "motorcycle-helmets", "no-helmet", "NO HELMET"), so the rule is data rather than code.
/// Whether compound labels such as "motorcycle-helmets" are authoritative is a product
/// decision; they are listed as `exceptions` so the choice stays visible in config.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LabelPolicy {
    pub mode: MatchMode,
    pub keywords: Vec<String>,
    pub exceptions: Vec<String>,
    pub negations: Vec<String>,
}

impl Default for LabelPolicy {
    fn default() -> Self {
        Self {
            mode: MatchMode::Heuristic,
            keywords: vec!["helmet".into()],
            exceptions: vec!["motorcycle-helmets".into()],
            negations: vec!["no".into()],
        }
    }
}

impl LabelPolicy {
    pub fn is_positive(&self, label: &str) -> bool {
        match self.mode {
            MatchMode::Exact => self.keywords.iter().chain(&self.exceptions).any(|k| k == label),
            MatchMode::Heuristic => {
                let norm = normalize(label);
                if norm.is_empty() {
                    return false;
                }
                let hit = self.keywords.iter().any(|k| !k.is_empty() && norm.contains(&normalize(k)))
                    || self.exceptions.iter().any(|e| normalize(e) == norm);
                let vetoed = self.negations.iter().any(|n| !n.is_empty() && norm.contains(&normalize(n)));
                hit && !vetoed
            }
        }
    }
}

fn normalize(s: &str) -> String {
    s.trim().to_lowercase()
}
