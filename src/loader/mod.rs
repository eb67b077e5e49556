//! Account list loader.
//!
//! File shape: `{ "<team>": [["<business name>", "<account id>"], ...] }`.
//! Ids may carry the platform's `act_` prefix; it is stripped.

use crate::models::Account;
use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum AccountsFileError {
    #[error("cannot read accounts file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("accounts file is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("team {team:?} entry {index}: {reason}")]
    Entry {
        team: String,
        index: usize,
        reason: String,
    },
}

pub fn load_accounts(path: &Path) -> Result<Vec<Account>, AccountsFileError> {
    let text = std::fs::read_to_string(path).map_err(|source| AccountsFileError::Io {
        path: path.display().to_string(),
        source,
    })?;
    let accounts = parse_accounts(&text)?;
    info!("{} accounts loaded from {:?}", accounts.len(), path);
    Ok(accounts)
}

pub fn parse_accounts(text: &str) -> Result<Vec<Account>, AccountsFileError> {
    let teams: BTreeMap<String, Vec<(String, String)>> = serde_json::from_str(text)?;

    let mut seen = HashSet::new();
    let mut accounts = Vec::new();

    for (team, entries) in teams {
        for (index, (name, raw_id)) in entries.into_iter().enumerate() {
            let entry_err = |reason: &str| AccountsFileError::Entry {
                team: team.clone(),
                index,
                reason: reason.to_string(),
            };

            let business_name = name.trim();
            if business_name.is_empty() {
                return Err(entry_err("empty business name"));
            }

            let raw_id = raw_id.trim();
            let account_id = raw_id.strip_prefix("act_").unwrap_or(raw_id);
            if account_id.is_empty() || !account_id.chars().all(|c| c.is_ascii_digit()) {
                return Err(entry_err(&format!("account id {raw_id:?} is not numeric")));
            }

            if !seen.insert(account_id.to_string()) {
                warn!(team = %team, "Duplicate account {} ({}), keeping the first entry", account_id, business_name);
                continue;
            }

            accounts.push(Account {
                team: team.clone(),
                business_name: business_name.to_string(),
                account_id: account_id.to_string(),
            });
        }
    }

    Ok(accounts)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_and_strip_prefix() {
        let accounts = parse_accounts(
            r#"{
                "west": [["Iron Works Gym", "act_111"], ["Peak Fitness", "222"]],
                "east": [["Harbor Yoga", "333"]]
            }"#,
        )
        .unwrap();
        assert_eq!(accounts.len(), 3);
        let iron = accounts.iter().find(|a| a.business_name == "Iron Works Gym").unwrap();
        assert_eq!(iron.account_id, "111");
        assert_eq!(iron.team, "west");
    }

    #[test]
    fn test_duplicates_keep_first() {
        let accounts = parse_accounts(r#"{ "a": [["First", "111"], ["Second", "act_111"]] }"#).unwrap();
        assert_eq!(accounts.len(), 1);
        assert_eq!(accounts[0].business_name, "First");
    }

    #[test]
    fn test_invalid_entries_are_fatal() {
        assert!(matches!(
            parse_accounts(r#"{ "a": [["", "111"]] }"#),
            Err(AccountsFileError::Entry { .. })
        ));
        assert!(matches!(
            parse_accounts(r#"{ "a": [["Gym", "act_"]] }"#),
            Err(AccountsFileError::Entry { .. })
        ));
        assert!(matches!(
            parse_accounts(r#"{ "a": [["Gym", "12ab"]] }"#),
            Err(AccountsFileError::Entry { .. })
        ));
        assert!(matches!(parse_accounts(r#"{ "a": [["Gym"]] }"#), Err(AccountsFileError::Json(_))));
        assert!(matches!(parse_accounts("not json"), Err(AccountsFileError::Json(_))));
    }

    #[test]
    fn test_missing_file() {
        let err = load_accounts(Path::new("/definitely/not/here.json")).unwrap_err();
        assert!(matches!(err, AccountsFileError::Io { .. }));
    }
}
