//! Curated structured knowledge: symptom sheets and known drug interactions.
//!
//! Consulted alongside vector search so that well-known facts surface even
//! when the index is down or ranks them low.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::types::{RetrievedDocument, ScoredDocument};
use super::RagError;

pub const KB_CONFIDENCE: f32 = 0.95;
pub const SYMPTOM_SOURCE: &str = "internal_kb_symptoms";
pub const INTERACTION_SOURCE: &str = "internal_kb_interactions";

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SymptomEntry {
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub common_causes: Vec<String>,
    /// Duration band → advice.
    #[serde(default)]
    pub urgency: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct KnowledgeBase {
    #[serde(default)]
    pub last_updated: Option<NaiveDate>,
    #[serde(default)]
    pub symptoms: BTreeMap<String, SymptomEntry>,
    /// Key is a comma-separated drug list, value the warning text.
    #[serde(default)]
    pub interactions: BTreeMap<String, String>,
}

impl KnowledgeBase {
    pub fn load(path: &Path) -> Result<Self, RagError> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| RagError::Knowledge(format!("{}: {e}", path.display())))?;
        let value: serde_json::Value =
            serde_json::from_str(&raw).map_err(|e| RagError::Knowledge(e.to_string()))?;
        if !value.is_object() {
            return Err(RagError::Knowledge(format!(
                "{}: expected a JSON object",
                path.display()
            )));
        }
        let kb: Self =
            serde_json::from_value(value).map_err(|e| RagError::Knowledge(e.to_string()))?;
        tracing::info!(
            symptoms = kb.symptoms.len(),
            interactions = kb.interactions.len(),
            "Knowledge base loaded"
        );
        Ok(kb)
    }

    /// Find the first symptom named in the query, else the first interaction
    /// whose every drug is named in the query.
    pub fn lookup(&self, query: &str) -> Option<ScoredDocument> {
        let lower = query.to_lowercase();

        for (name, entry) in &self.symptoms {
            let readable = name.replace('_', " ").to_lowercase();
            if !readable.is_empty() && lower.contains(&readable) {
                return Some(self.symptom_document(name, &readable, entry));
            }
        }

        for (key, warning) in &self.interactions {
            let drugs: Vec<String> = key
                .split(',')
                .map(|d| d.trim().to_lowercase())
                .filter(|d| !d.is_empty())
                .collect();
            if !drugs.is_empty() && drugs.iter().all(|d| lower.contains(d.as_str())) {
                return Some(self.interaction_document(key, &drugs, warning));
            }
        }

        None
    }

    fn symptom_document(&self, name: &str, readable: &str, entry: &SymptomEntry) -> ScoredDocument {
        let mut content = format!("Symptom: {readable}\n");
        if !entry.description.is_empty() {
            content.push_str(&format!("Description: {}\n", entry.description));
        }
        if !entry.common_causes.is_empty() {
            content.push_str(&format!("Common causes: {}\n", entry.common_causes.join(", ")));
        }
        if !entry.urgency.is_empty() {
            content.push_str("Urgency guidelines:\n");
            for (duration, advice) in &entry.urgency {
                content.push_str(&format!("- {duration}: {advice}\n"));
            }
        }

        self.document(format!("kb_symptom_{name}"), content, SYMPTOM_SOURCE, "symptom")
    }

    fn interaction_document(&self, key: &str, drugs: &[String], warning: &str) -> ScoredDocument {
        let content = format!("Interaction warning ({}): {warning}", drugs.join(" + "));
        let id = format!("kb_interaction_{}", key.replace(',', "_").replace(' ', ""));
        self.document(id, content, INTERACTION_SOURCE, "interaction")
    }

    fn document(&self, id: String, content: String, source: &str, category: &str) -> ScoredDocument {
        ScoredDocument {
            document: RetrievedDocument {
                id,
                content,
                source: source.to_string(),
                category: category.to_string(),
                confidence: KB_CONFIDENCE,
                last_updated: self.last_updated,
                metadata: HashMap::from([(
                    "origin".to_string(),
                    serde_json::Value::String("knowledge_base".into()),
                )]),
            },
            score: KB_CONFIDENCE,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> KnowledgeBase {
        serde_json::from_str(
            r#"{
                "last_updated": "2024-03-01",
                "symptoms": {
                    "sore_throat": {
                        "description": "Pain or irritation in the throat",
                        "common_causes": ["viral infection", "strep"],
                        "urgency": {"more than 7 days": "see a doctor"}
                    }
                },
                "interactions": {
                    "warfarin,aspirin": "Increased bleeding risk."
                }
            }"#,
        )
        .unwrap()
    }

    #[test]
    fn symptom_lookup_matches_readable_name() {
        let hit = sample().lookup("I have a Sore Throat and a cough").unwrap();
        assert_eq!(hit.document.source, SYMPTOM_SOURCE);
        assert_eq!(hit.document.category, "symptom");
        assert!(hit.document.content.contains("Common causes: viral infection, strep"));
        assert!(hit.document.content.contains("- more than 7 days: see a doctor"));
        assert_eq!(hit.document.last_updated, Some("2024-03-01".parse().unwrap()));
        assert!((hit.score - KB_CONFIDENCE).abs() < 1e-6);
    }

    #[test]
    fn interaction_requires_every_drug() {
        let kb = sample();
        assert!(kb.lookup("can I take aspirin?").is_none());
        let hit = kb.lookup("Is aspirin safe with warfarin?").unwrap();
        assert_eq!(hit.document.source, INTERACTION_SOURCE);
        assert_eq!(hit.document.category, "interaction");
        assert!(hit.document.content.contains("Increased bleeding risk."));
    }

    #[test]
    fn no_match_returns_none() {
        assert!(sample().lookup("how much water should I drink").is_none());
        assert!(KnowledgeBase::default().lookup("sore throat").is_none());
    }

    #[test]
    fn load_reports_bad_json() {
        let file = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(file.path(), "{ not json").unwrap();
        assert!(matches!(KnowledgeBase::load(file.path()), Err(RagError::Knowledge(_))));
    }

    #[test]
    fn load_rejects_non_object_documents() {
        let file = tempfile::NamedTempFile::new().unwrap();
        for body in ["[]", "42", "null"] {
            std::fs::write(file.path(), body).unwrap();
            assert!(
                matches!(KnowledgeBase::load(file.path()), Err(RagError::Knowledge(_))),
                "{body}"
            );
        }
    }

    #[test]
    fn load_accepts_empty_object() {
        let file = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(file.path(), "{}").unwrap();
        assert_eq!(KnowledgeBase::load(file.path()).unwrap(), KnowledgeBase::default());
    }
}
