//! Append-only audit ledger: field-level diffs and tamper-evidence hashing
use super::document::{Document, Training, TimeStamp, Version};
use chrono::Utc;
use serde_json::{Map, Value};

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum Action {
    Create,
    Update,
    Approve,
    Release,
    Superseded,
    Revise,
    Completed,
    Failed,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Create => "CREATE",
            Action::Update => "UPDATE",
            Action::Approve => "APPROVE",
            Action::Release => "RELEASE",
            Action::Superseded => "SUPERSEDED",
            Action::Revise => "REVISE",
            Action::Completed => "COMPLETED",
            Action::Failed => "FAILED",
        }
    }
}

/// A persisted row the ledger can record changes against
pub trait Auditable: serde::Serialize {
    const TABLE: &'static str;
    fn record_id(&self) -> u64;
}

impl Auditable for Document {
    const TABLE: &'static str = "documents";
    fn record_id(&self) -> u64 {
        self.doc_id
    }
}

impl Auditable for Version {
    const TABLE: &'static str = "versions";
    fn record_id(&self) -> u64 {
        self.version_id
    }
}

impl Auditable for Training {
    const TABLE: &'static str = "training";
    fn record_id(&self) -> u64 {
        self.training_id
    }
}

/// One immutable ledger row. The hash covers the entry's own fields only;
/// it is not chained to the previous entry.
#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, Eq, PartialEq)]
pub struct AuditEntry {
    #[n(0)]
    pub log_id: u64,
    #[n(1)]
    pub table_affected: String,
    #[n(2)]
    pub record_id: u64,
    #[n(3)]
    pub user_id: u64,
    #[n(4)]
    pub action: String,
    #[n(5)]
    pub old_val: Option<String>,
    #[n(6)]
    pub new_val: String,
    #[n(7)]
    pub timestamp: String,
    #[n(8)]
    pub hash: String,
}

impl AuditEntry {
    /// Build an entry and seal it with its digest. `log_id` is assigned
    /// by the gateway at commit time.
    pub fn new(
        table_affected: &str,
        record_id: u64,
        user_id: u64,
        action: Action,
        old_val: Option<String>,
        new_val: String,
        timestamp: TimeStamp<Utc>,
    ) -> Self {
        let timestamp = timestamp.to_rfc3339();
        let hash = entry_hash(
            table_affected,
            record_id,
            user_id,
            action.as_str(),
            old_val.as_deref().unwrap_or(""),
            &new_val,
            &timestamp,
        );
        Self {
            log_id: 0,
            table_affected: table_affected.to_string(),
            record_id,
            user_id,
            action: action.as_str().to_string(),
            old_val,
            new_val,
            timestamp,
            hash,
        }
    }

    /// Recompute the digest from the stored fields and compare
    pub fn verify(&self) -> bool {
        entry_hash(
            &self.table_affected,
            self.record_id,
            self.user_id,
            &self.action,
            self.old_val.as_deref().unwrap_or(""),
            &self.new_val,
            &self.timestamp,
        ) == self.hash
    }
}

/// SHA-256 hex digest over the exact concatenation of the entry fields
pub fn entry_hash(
    table: &str,
    record_id: u64,
    user_id: u64,
    action: &str,
    old_val: &str,
    new_val: &str,
    timestamp: &str,
) -> String {
    let raw = format!("{table}{record_id}{user_id}{action}{old_val}{new_val}{timestamp}");
    sha256::digest(raw)
}

/// Diff two entity snapshots and record only the changed fields. An absent
/// old snapshot means every field counts as changed, with nulls on the old
/// side of the payload.
pub fn diff_entry<T: Auditable>(
    old: Option<&T>,
    new: &T,
    user_id: u64,
    action: Action,
    timestamp: TimeStamp<Utc>,
) -> anyhow::Result<AuditEntry> {
    let new_map = to_map(new)?;
    let old_map = match old {
        Some(old) => to_map(old)?,
        None => Map::new(),
    };

    let mut old_sub = Map::new();
    let mut new_sub = Map::new();
    for (key, value) in &new_map {
        let previous = old_map.get(key);
        if previous != Some(value) {
            old_sub.insert(key.clone(), previous.cloned().unwrap_or(Value::Null));
            new_sub.insert(key.clone(), value.clone());
        }
    }

    Ok(AuditEntry::new(
        T::TABLE,
        new.record_id(),
        user_id,
        action,
        Some(Value::Object(old_sub).to_string()),
        Value::Object(new_sub).to_string(),
        timestamp,
    ))
}

fn to_map<T: serde::Serialize>(entity: &T) -> anyhow::Result<Map<String, Value>> {
    match serde_json::to_value(entity)? {
        Value::Object(map) => Ok(map),
        other => Err(anyhow::anyhow!(
            "entity did not serialize to a JSON object: {other}"
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{Status, VersionLabel};

    fn version(status: Status, label: VersionLabel) -> Version {
        Version::new(7, 3, label, status, "storage/01_drafts/x.txt".into(), None).unwrap()
    }

    #[test]
    fn diff_captures_only_changed_fields() {
        let old = version(Status::Draft, VersionLabel::initial());
        let mut new = old.clone();
        new.status = Status::InReview;

        let entry =
            diff_entry(Some(&old), &new, 1, Action::Update, TimeStamp::new()).unwrap();

        assert_eq!(entry.table_affected, "versions");
        assert_eq!(entry.record_id, 7);
        assert_eq!(entry.old_val.as_deref(), Some(r#"{"status":"DRAFT"}"#));
        assert_eq!(entry.new_val, r#"{"status":"IN_REVIEW"}"#);
        assert!(entry.verify());
    }

    #[test]
    fn create_diff_reports_every_field() {
        let new = version(Status::Draft, VersionLabel::initial());
        let entry = diff_entry(None, &new, 1, Action::Create, TimeStamp::new()).unwrap();

        let old: Value = serde_json::from_str(entry.old_val.as_deref().unwrap()).unwrap();
        let new_val: Value = serde_json::from_str(&entry.new_val).unwrap();
        assert_eq!(old["status"], Value::Null);
        assert_eq!(new_val["status"], "DRAFT");
        assert_eq!(new_val["version"], "0.1");
        assert!(entry.verify());
    }

    #[test]
    fn tampering_breaks_verification() {
        let new = version(Status::Draft, VersionLabel::initial());
        let mut entry = diff_entry(None, &new, 1, Action::Create, TimeStamp::new()).unwrap();
        assert!(entry.verify());

        entry.new_val = entry.new_val.replace("DRAFT", "RELEASED");
        assert!(!entry.verify());
    }
}
