//! GuruCard Schema
//!
//! A card as returned by `GET /api/v1/search/query`. Only the fields the
//! connector reads are modelled; everything else in the payload is ignored.

use serde::{Deserialize, Deserializer, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct GuruCard {
    pub id: String,
    /// Card title
    pub preferred_phrase: String,
    /// Card body as HTML
    #[serde(default)]
    pub content: String,
    pub slug: String,
    pub last_modified: String,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    pub last_verified: Option<String>,
}

fn empty_string_as_none<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<String>::deserialize(deserializer)?;
    Ok(value.filter(|s| !s.trim().is_empty()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_card_parsing() {
        let json = r#"{
            "id": "c0ffee-1",
            "preferredPhrase": "Expense Policy",
            "content": "<p>Submit receipts within <b>30 days</b>.</p>",
            "slug": "T8kR9bxc/Expense-Policy",
            "lastModified": "2024-01-15T10:00:00.000+0000",
            "lastVerified": "2024-02-01T09:30:00.000+0000",
            "verificationState": "TRUSTED",
            "owner": {"email": "ops@example.com"}
        }"#;

        let card: GuruCard = serde_json::from_str(json).unwrap();
        assert_eq!(card.id, "c0ffee-1");
        assert_eq!(card.preferred_phrase, "Expense Policy");
        assert_eq!(card.last_verified.as_deref(), Some("2024-02-01T09:30:00.000+0000"));
    }

    #[test]
    fn test_last_verified_absent_null_or_empty() {
        let base = |verified: &str| {
            format!(
                r#"{{"id":"1","preferredPhrase":"t","content":"","slug":"s","lastModified":"2024-01-15T10:00:00.000+0000"{}}}"#,
                verified
            )
        };

        for extra in ["", r#","lastVerified":null"#, r#","lastVerified":"""#] {
            let card: GuruCard = serde_json::from_str(&base(extra)).unwrap();
            assert!(card.last_verified.is_none(), "case {:?}", extra);
        }
    }

    #[test]
    fn test_missing_last_modified_fails() {
        let json = r#"{"id":"1","preferredPhrase":"t","content":"","slug":"s"}"#;
        assert!(serde_json::from_str::<GuruCard>(json).is_err());
    }
}
