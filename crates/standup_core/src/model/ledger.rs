use crate::dates;
use crate::error::AppError;
use serde::{Deserialize, Serialize};

pub const SOURCE_STANDUP: &str = "standup update";
pub const SOURCE_CSV_IMPORT: &str = "csv import";
pub const SOURCE_EDIT: &str = "edit";

/// One action-plan revision. Fields are read-only once constructed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    timestamp: String,
    source: String,
    text: String,
}

impl LedgerEntry {
    /// Stamps the entry with the current time.
    pub fn new(source: &str, text: &str) -> Result<Self, AppError> {
        Ok(Self::recorded_at(&dates::now_rfc3339()?, source, text))
    }

    pub fn recorded_at(timestamp: &str, source: &str, text: &str) -> Self {
        Self {
            timestamp: timestamp.to_string(),
            source: source.trim().to_string(),
            text: text.trim().to_string(),
        }
    }

    pub fn timestamp(&self) -> &str {
        &self.timestamp
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn text(&self) -> &str {
        &self.text
    }
}

/// Append-only action-plan history. There is no way to edit or remove an
/// entry once appended.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ActionPlanLedger {
    entries: Vec<LedgerEntry>,
}

impl ActionPlanLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, entry: LedgerEntry) -> Result<&LedgerEntry, AppError> {
        if entry.text.is_empty() {
            return Err(AppError::validation("action plan text is required"));
        }

        self.entries.push(entry);
        Ok(&self.entries[self.entries.len() - 1])
    }

    pub fn history(&self) -> &[LedgerEntry] {
        &self.entries
    }

    pub fn current(&self) -> &str {
        self.entries
            .last()
            .map(|entry| entry.text.as_str())
            .unwrap_or("")
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::{ActionPlanLedger, LedgerEntry, SOURCE_STANDUP};
    use proptest::prelude::*;

    #[test]
    fn empty_ledger_has_no_current_plan() {
        let ledger = ActionPlanLedger::new();
        assert_eq!(ledger.current(), "");
        assert!(ledger.history().is_empty());
    }

    #[test]
    fn append_moves_current_and_keeps_history() {
        let mut ledger = ActionPlanLedger::new();
        ledger
            .append(LedgerEntry::recorded_at("2025-05-01T09:00:00Z", SOURCE_STANDUP, "investigate"))
            .unwrap();
        ledger
            .append(LedgerEntry::recorded_at("2025-05-02T09:00:00Z", SOURCE_STANDUP, " patch it "))
            .unwrap();

        assert_eq!(ledger.current(), "patch it");
        assert_eq!(ledger.len(), 2);
        assert_eq!(ledger.history()[0].text(), "investigate");
        assert_eq!(ledger.history()[0].timestamp(), "2025-05-01T09:00:00Z");
        assert_eq!(ledger.history()[1].source(), SOURCE_STANDUP);
    }

    #[test]
    fn append_rejects_blank_text() {
        let mut ledger = ActionPlanLedger::new();
        ledger
            .append(LedgerEntry::recorded_at("2025-05-01T09:00:00Z", "edit", "first"))
            .unwrap();

        let err = ledger
            .append(LedgerEntry::recorded_at("2025-05-02T09:00:00Z", "edit", "   "))
            .unwrap_err();

        assert_eq!(err.code(), "validation_error");
        assert_eq!(ledger.len(), 1);
        assert_eq!(ledger.current(), "first");
    }

    #[test]
    fn new_entry_is_timestamped() {
        let entry = LedgerEntry::new(SOURCE_STANDUP, "sync with infra").unwrap();
        assert!(!entry.timestamp().is_empty());
        assert_eq!(entry.text(), "sync with infra");
    }

    #[test]
    fn ledger_serializes_as_plain_list() {
        let mut ledger = ActionPlanLedger::new();
        ledger
            .append(LedgerEntry::recorded_at("2025-05-01T09:00:00Z", "edit", "plan"))
            .unwrap();

        let value = serde_json::to_value(&ledger).unwrap();
        assert_eq!(
            value,
            serde_json::json!([
                {"timestamp": "2025-05-01T09:00:00Z", "source": "edit", "text": "plan"}
            ])
        );
    }

    proptest! {
        #[test]
        fn current_tracks_last_accepted_append(texts in prop::collection::vec("[ a-z]{0,6}", 0..20)) {
            let mut ledger = ActionPlanLedger::new();
            let mut accepted = Vec::new();

            for text in &texts {
                let entry = LedgerEntry::recorded_at("2025-01-01T00:00:00Z", "test", text);
                if ledger.append(entry).is_ok() {
                    accepted.push(text.trim().to_string());
                }
            }

            prop_assert_eq!(ledger.len(), accepted.len());
            prop_assert_eq!(ledger.current(), accepted.last().map(String::as_str).unwrap_or(""));
            prop_assert!(accepted.iter().all(|text| !text.is_empty()));
        }
    }
}
