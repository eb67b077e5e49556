//! Verdicts produced by the downstream flagging model.
//!
//! Model output is parsed strictly as data. Anything that does not match the
//! verdict shape exactly is rejected.

use chrono::NaiveDate;
use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FlagVerdict {
    pub ad_id: String,
    pub date: NaiveDate,
    pub flagged: bool,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub summary: Option<String>,
}

#[derive(Debug, Error)]
pub enum VerdictError {
    #[error("verdict output is not valid: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("ad {ad_id} on {date} is flagged without a reason")]
    MissingReason { ad_id: String, date: NaiveDate },

    #[error("verdict has an empty ad_id")]
    EmptyAdId,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Document {
    Many(Vec<FlagVerdict>),
    One(FlagVerdict),
}

/// Parse one verdict or an array of verdicts, optionally wrapped in a
/// Markdown code fence.
pub fn parse_verdicts(text: &str) -> Result<Vec<FlagVerdict>, VerdictError> {
    let body = strip_code_fence(text);
    let verdicts = match serde_json::from_str::<Document>(body)? {
        Document::Many(v) => v,
        Document::One(v) => vec![v],
    };

    for v in &verdicts {
        v.validate()?;
    }
    Ok(verdicts)
}

impl FlagVerdict {
    fn validate(&self) -> Result<(), VerdictError> {
        if self.ad_id.trim().is_empty() {
            return Err(VerdictError::EmptyAdId);
        }
        let has_reason = self.reason.as_deref().is_some_and(|r| !r.trim().is_empty());
        if self.flagged && !has_reason {
            return Err(VerdictError::MissingReason {
                ad_id: self.ad_id.clone(),
                date: self.date,
            });
        }
        Ok(())
    }
}

fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // skip the info string (```json)
    let rest = rest.split_once('\n').map(|(_, body)| body).unwrap_or("");
    rest.trim_end().strip_suffix("```").unwrap_or(rest).trim()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_verdict() {
        let v = parse_verdicts(
            r#"{"ad_id":"a1","date":"2024-06-01","flagged":true,"reason":"CPA spike","summary":"x"}"#,
        )
        .unwrap();
        assert_eq!(v.len(), 1);
        assert!(v[0].flagged);
        assert_eq!(v[0].reason.as_deref(), Some("CPA spike"));
    }

    #[test]
    fn test_fenced_array() {
        let text = "```json\n[\n {\"ad_id\":\"a1\",\"date\":\"2024-06-01\",\"flagged\":false},\n {\"ad_id\":\"a2\",\"date\":\"2024-06-02\",\"flagged\":true,\"reason\":\"low ctr\"}\n]\n```";
        let v = parse_verdicts(text).unwrap();
        assert_eq!(v.len(), 2);
        assert_eq!(v[1].ad_id, "a2");
        assert!(v[0].reason.is_none());
    }

    #[test]
    fn test_unknown_fields_are_rejected() {
        let err = parse_verdicts(r#"{"ad_id":"a1","date":"2024-06-01","flagged":false,"action":"delete"}"#)
            .unwrap_err();
        assert!(matches!(err, VerdictError::Malformed(_)));
    }

    #[test]
    fn test_flag_requires_reason() {
        let err = parse_verdicts(r#"{"ad_id":"a1","date":"2024-06-01","flagged":true,"reason":"  "}"#)
            .unwrap_err();
        assert!(matches!(err, VerdictError::MissingReason { .. }));
    }

    #[test]
    fn test_prose_is_rejected() {
        assert!(parse_verdicts("The ad looks fine to me.").is_err());
        assert!(parse_verdicts(r#"{"ad_id":"a1","date":"June 1","flagged":false}"#).is_err());
        assert!(matches!(
            parse_verdicts(r#"{"ad_id":"","date":"2024-06-01","flagged":false}"#),
            Err(VerdictError::EmptyAdId)
        ));
    }
}
