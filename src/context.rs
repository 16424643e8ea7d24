//! Translation context: per-request hints (description, meaning, glossary)
//! merged with a process-wide default, plus the canonical serialization the
//! cache key is derived from.

use serde::{Deserialize, Serialize};

/// One glossary pair: a source term and the instruction telling the backend
/// how to render it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GlossaryEntry {
    pub term: String,
    pub instruction: String,
}

impl GlossaryEntry {
    pub fn new(term: impl Into<String>, instruction: impl Into<String>) -> Self {
        Self {
            term: term.into(),
            instruction: instruction.into(),
        }
    }
}

/// Immutable per-request translation hints.
///
/// Two lookups with the same literal content but different contexts are
/// distinct cache entries, so equality and a deterministic serialization
/// are part of the contract.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TranslationContext {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meaning: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub glossary: Vec<GlossaryEntry>,
}

impl TranslationContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_meaning(mut self, meaning: impl Into<String>) -> Self {
        self.meaning = Some(meaning.into());
        self
    }

    pub fn with_glossary_entry(
        mut self,
        term: impl Into<String>,
        instruction: impl Into<String>,
    ) -> Self {
        self.glossary.push(GlossaryEntry::new(term, instruction));
        self
    }

    /// Merge a global default context with a per-call one.
    ///
    /// Returns `None` only when both inputs are `None`. Rules:
    /// - `meaning`: per-call value wins when present, else the global one;
    /// - `description`: both are concatenated (global first) when both present;
    /// - `glossary`: union keyed by term, per-call entries overriding global
    ///   entries on collision.
    pub fn merge(
        global: Option<&TranslationContext>,
        local: Option<&TranslationContext>,
    ) -> Option<TranslationContext> {
        match (global, local) {
            (None, None) => None,
            (Some(g), None) => Some(g.clone()),
            (None, Some(l)) => Some(l.clone()),
            (Some(g), Some(l)) => {
                let description = match (&g.description, &l.description) {
                    (Some(gd), Some(ld)) => Some(format!("{gd} {ld}")),
                    (Some(gd), None) => Some(gd.clone()),
                    (None, Some(ld)) => Some(ld.clone()),
                    (None, None) => None,
                };
                let meaning = l.meaning.clone().or_else(|| g.meaning.clone());

                let mut glossary: Vec<GlossaryEntry> = Vec::new();
                for entry in g.glossary.iter().chain(l.glossary.iter()) {
                    match glossary.iter_mut().find(|e| e.term == entry.term) {
                        Some(existing) => existing.instruction = entry.instruction.clone(),
                        None => glossary.push(entry.clone()),
                    }
                }

                Some(TranslationContext {
                    description,
                    meaning,
                    glossary,
                })
            }
        }
    }

    /// Canonical serialization used for key derivation.
    ///
    /// Fixed field order (description, meaning, glossary sorted by term),
    /// absent fields omitted. Never depends on map iteration order, so the
    /// same logical context always yields the same string.
    pub fn canonical_string(&self) -> String {
        let mut out = String::new();
        if let Some(d) = &self.description {
            out.push_str("d=");
            out.push_str(d);
            out.push('\x1f');
        }
        if let Some(m) = &self.meaning {
            out.push_str("m=");
            out.push_str(m);
            out.push('\x1f');
        }
        if !self.glossary.is_empty() {
            let mut entries: Vec<&GlossaryEntry> = self.glossary.iter().collect();
            entries.sort_by(|a, b| a.term.cmp(&b.term));
            out.push_str("g=");
            for e in entries {
                out.push_str(&e.term);
                out.push('\x1e');
                out.push_str(&e.instruction);
                out.push('\x1f');
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_both_none_is_none() {
        assert_eq!(TranslationContext::merge(None, None), None);
    }

    #[test]
    fn merge_single_side_clones() {
        let g = TranslationContext::new().with_meaning("greeting");
        assert_eq!(
            TranslationContext::merge(Some(&g), None),
            Some(g.clone())
        );
        assert_eq!(TranslationContext::merge(None, Some(&g)), Some(g));
    }

    #[test]
    fn merge_meaning_local_wins() {
        let g = TranslationContext::new().with_meaning("global");
        let l = TranslationContext::new().with_meaning("local");
        let merged = TranslationContext::merge(Some(&g), Some(&l)).unwrap();
        assert_eq!(merged.meaning.as_deref(), Some("local"));

        let empty = TranslationContext::new();
        let merged = TranslationContext::merge(Some(&g), Some(&empty)).unwrap();
        assert_eq!(merged.meaning.as_deref(), Some("global"));
    }

    #[test]
    fn merge_description_concatenates_global_first() {
        let g = TranslationContext::new().with_description("app-wide");
        let l = TranslationContext::new().with_description("this screen");
        let merged = TranslationContext::merge(Some(&g), Some(&l)).unwrap();
        assert_eq!(merged.description.as_deref(), Some("app-wide this screen"));
    }

    #[test]
    fn merge_glossary_union_local_overrides() {
        let g = TranslationContext::new()
            .with_glossary_entry("Home", "keep as-is")
            .with_glossary_entry("Save", "verb");
        let l = TranslationContext::new()
            .with_glossary_entry("Home", "home screen")
            .with_glossary_entry("Cart", "shopping cart");
        let merged = TranslationContext::merge(Some(&g), Some(&l)).unwrap();

        assert_eq!(merged.glossary.len(), 3);
        let home = merged.glossary.iter().find(|e| e.term == "Home").unwrap();
        assert_eq!(home.instruction, "home screen");
        assert!(merged.glossary.iter().any(|e| e.term == "Save"));
        assert!(merged.glossary.iter().any(|e| e.term == "Cart"));
    }

    #[test]
    fn canonical_string_is_order_independent_for_glossary() {
        let a = TranslationContext::new()
            .with_glossary_entry("b", "2")
            .with_glossary_entry("a", "1");
        let b = TranslationContext::new()
            .with_glossary_entry("a", "1")
            .with_glossary_entry("b", "2");
        assert_eq!(a.canonical_string(), b.canonical_string());
    }

    #[test]
    fn canonical_string_distinguishes_fields() {
        let as_description = TranslationContext::new().with_description("x");
        let as_meaning = TranslationContext::new().with_meaning("x");
        assert_ne!(
            as_description.canonical_string(),
            as_meaning.canonical_string()
        );
    }

    #[test]
    fn canonical_string_omits_absent_fields() {
        assert_eq!(TranslationContext::new().canonical_string(), "");
    }
}
