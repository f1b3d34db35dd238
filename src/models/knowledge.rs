//! Typed results of the extraction capability (SPEC_FULL §3 SUPPLEMENT),
//! grounded on `original_source/src/knowledge/storage.py`'s entity records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A directed relationship discovered between two entities.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityAssociation {
    pub source: String,
    pub target: String,
    pub relationship: String,
    pub evidence: String,
    pub source_type: String,
    pub target_type: String,
    pub confidence: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractedPeople {
    pub source_checksum: String,
    pub people: Vec<String>,
    pub extracted_at: DateTime<Utc>,
    #[serde(default)]
    pub metadata: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractedOrganizations {
    pub source_checksum: String,
    pub organizations: Vec<String>,
    pub extracted_at: DateTime<Utc>,
    #[serde(default)]
    pub metadata: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractedConcepts {
    pub source_checksum: String,
    pub concepts: Vec<String>,
    pub extracted_at: DateTime<Utc>,
    #[serde(default)]
    pub metadata: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractedAssociations {
    pub source_checksum: String,
    pub associations: Vec<EntityAssociation>,
    pub extracted_at: DateTime<Utc>,
    #[serde(default)]
    pub metadata: Value,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn association_serde_roundtrip() {
        let assoc = EntityAssociation {
            source: "Jane Doe".to_string(),
            target: "Acme Corp".to_string(),
            relationship: "employed_by".to_string(),
            evidence: "named as director in filing".to_string(),
            source_type: "person".to_string(),
            target_type: "organization".to_string(),
            confidence: 0.82,
        };
        let json = serde_json::to_string(&assoc).unwrap();
        let back: EntityAssociation = serde_json::from_str(&json).unwrap();
        assert_eq!(back.relationship, "employed_by");
    }

    #[test]
    fn extracted_people_defaults_metadata_null() {
        let json = r#"{"source_checksum":"abc","people":["A","B"],"extracted_at":"2024-01-01T00:00:00Z"}"#;
        let parsed: ExtractedPeople = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.people.len(), 2);
        assert!(parsed.metadata.is_null());
    }
}
