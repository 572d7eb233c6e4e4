//! Persistence gateway over sled. One logical table per key prefix in a
//! single keyspace, so a row update and its audit entry commit through one
//! atomic batch.
use super::audit::AuditEntry;
use super::document::{DocType, Document, Status, Training, Version};
use sled::Batch;
use std::collections::HashSet;
use std::path::Path;

pub const DOCUMENTS: &str = "documents";
pub const VERSIONS: &str = "versions";
pub const TRAINING: &str = "training";
pub const USERS: &str = "users";
pub const ROLES: &str = "roles";
pub const USERS_ROLES: &str = "users_roles";
pub const AUDIT_LOG: &str = "audit_log";

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, Eq, PartialEq)]
pub struct UserRow {
    #[n(0)]
    pub user_id: u64,
    #[n(1)]
    pub user_name: String,
    #[n(2)]
    pub active: bool,
}

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, Eq, PartialEq)]
pub struct RoleRow {
    #[n(0)]
    pub role_id: u64,
    #[n(1)]
    pub role_name: String,
}

pub struct Gateway {
    db: sled::Db,
}

impl Gateway {
    pub fn open(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        Ok(Self {
            db: sled::open(path)?,
        })
    }

    pub fn from_db(db: sled::Db) -> Self {
        Self { db }
    }

    // id allocation: max existing id + 1, 1 on cold start

    pub fn next_document_id(&self) -> anyhow::Result<u64> {
        self.next_id(DOCUMENTS)
    }

    pub fn next_version_id(&self) -> anyhow::Result<u64> {
        self.next_id(VERSIONS)
    }

    pub fn next_training_id(&self) -> anyhow::Result<u64> {
        self.next_id(TRAINING)
    }

    fn next_id(&self, table: &str) -> anyhow::Result<u64> {
        let last = self.db.scan_prefix(prefix(table)).keys().next_back();
        match last {
            Some(key) => Ok(id_of(&key?) + 1),
            None => Ok(1),
        }
    }

    // documents

    pub fn document(&self, doc_id: u64) -> anyhow::Result<Option<Document>> {
        self.row(DOCUMENTS, doc_id)
    }

    pub fn document_by_number(&self, number: &str) -> anyhow::Result<Option<Document>> {
        let docs: Vec<Document> = self.rows(DOCUMENTS)?;
        Ok(docs.into_iter().find(|d| d.number == number))
    }

    pub fn document_by_title(&self, title: &str) -> anyhow::Result<Option<Document>> {
        let docs: Vec<Document> = self.rows(DOCUMENTS)?;
        Ok(docs.into_iter().find(|d| d.title == title))
    }

    /// Number of the most recently created document of this type
    pub fn last_number_for_type(&self, doc_type: DocType) -> anyhow::Result<Option<String>> {
        let docs: Vec<Document> = self.rows(DOCUMENTS)?;
        Ok(docs
            .into_iter()
            .filter(|d| d.doc_type == doc_type)
            .max_by_key(|d| d.doc_id)
            .map(|d| d.number))
    }

    // versions

    pub fn version(&self, version_id: u64) -> anyhow::Result<Option<Version>> {
        self.row(VERSIONS, version_id)
    }

    /// All versions of a document, ascending by version id
    pub fn versions_for(&self, doc_id: u64) -> anyhow::Result<Vec<Version>> {
        let versions: Vec<Version> = self.rows(VERSIONS)?;
        Ok(versions.into_iter().filter(|v| v.doc_id == doc_id).collect())
    }

    pub fn latest_version(&self, doc_id: u64) -> anyhow::Result<Option<Version>> {
        Ok(self.versions_for(doc_id)?.into_iter().next_back())
    }

    pub fn latest_released(&self, doc_id: u64) -> anyhow::Result<Option<Version>> {
        Ok(self
            .versions_for(doc_id)?
            .into_iter()
            .filter(|v| v.status == Status::Released)
            .next_back())
    }

    pub fn in_process_version(&self, doc_id: u64) -> anyhow::Result<Option<Version>> {
        Ok(self
            .versions_for(doc_id)?
            .into_iter()
            .find(|v| matches!(v.status, Status::Draft | Status::InReview)))
    }

    // users and roles

    pub fn add_user(&self, user_name: &str, active: bool) -> anyhow::Result<u64> {
        let user_id = self.next_id(USERS)?;
        let row = UserRow {
            user_id,
            user_name: user_name.to_string(),
            active,
        };
        self.db.insert(key(USERS, user_id), minicbor::to_vec(&row)?)?;
        Ok(user_id)
    }

    pub fn user_by_name(&self, user_name: &str) -> anyhow::Result<Option<UserRow>> {
        let users: Vec<UserRow> = self.rows(USERS)?;
        Ok(users.into_iter().find(|u| u.user_name == user_name))
    }

    pub fn add_role(&self, role_name: &str) -> anyhow::Result<u64> {
        let role_id = self.next_id(ROLES)?;
        let row = RoleRow {
            role_id,
            role_name: role_name.to_string(),
        };
        self.db.insert(key(ROLES, role_id), minicbor::to_vec(&row)?)?;
        Ok(role_id)
    }

    pub fn grant_role(&self, user_id: u64, role_id: u64) -> anyhow::Result<()> {
        let mut link = prefix(USERS_ROLES);
        link.extend_from_slice(&user_id.to_be_bytes());
        link.extend_from_slice(&role_id.to_be_bytes());
        self.db.insert(link, Vec::new())?;
        Ok(())
    }

    /// Role names held by a user, looked up per call against current state
    pub fn roles_of(&self, user_id: u64) -> anyhow::Result<HashSet<String>> {
        let mut link_prefix = prefix(USERS_ROLES);
        link_prefix.extend_from_slice(&user_id.to_be_bytes());

        let mut roles = HashSet::new();
        for item in self.db.scan_prefix(link_prefix) {
            let (link, _) = item?;
            let role_id = id_of(&link);
            if let Some(role) = self.row::<RoleRow>(ROLES, role_id)? {
                roles.insert(role.role_name);
            }
        }
        Ok(roles)
    }

    // training

    pub fn training_for(
        &self,
        user_id: u64,
        version_id: u64,
    ) -> anyhow::Result<Option<Training>> {
        let records: Vec<Training> = self.rows(TRAINING)?;
        Ok(records
            .into_iter()
            .find(|t| t.user_id == user_id && t.version_id == version_id))
    }

    pub fn trainings_for_version(&self, version_id: u64) -> anyhow::Result<Vec<Training>> {
        let records: Vec<Training> = self.rows(TRAINING)?;
        Ok(records
            .into_iter()
            .filter(|t| t.version_id == version_id)
            .collect())
    }

    pub fn trainings(&self) -> anyhow::Result<Vec<Training>> {
        self.rows(TRAINING)
    }

    // audit ledger (append-only; no update or delete paths exist)

    pub fn audit_entries(&self) -> anyhow::Result<Vec<AuditEntry>> {
        self.rows(AUDIT_LOG)
    }

    pub fn audit_for(&self, table: &str, record_id: u64) -> anyhow::Result<Vec<AuditEntry>> {
        Ok(self
            .audit_entries()?
            .into_iter()
            .filter(|e| e.table_affected == table && e.record_id == record_id)
            .collect())
    }

    // atomic commits: entity rows and their ledger entries land in one batch

    pub fn commit_created_document(
        &self,
        document: &Document,
        version: &Version,
        doc_entry: AuditEntry,
        version_entry: AuditEntry,
    ) -> anyhow::Result<()> {
        let mut batch = Batch::default();
        batch.insert(
            key(DOCUMENTS, document.doc_id),
            minicbor::to_vec(document)?,
        );
        batch.insert(key(VERSIONS, version.version_id), minicbor::to_vec(version)?);
        self.append_audit(&mut batch, doc_entry)?;
        self.append_audit(&mut batch, version_entry)?;
        self.db.apply_batch(batch)?;
        Ok(())
    }

    pub fn commit_version(&self, version: &Version, entry: AuditEntry) -> anyhow::Result<()> {
        let mut batch = Batch::default();
        batch.insert(key(VERSIONS, version.version_id), minicbor::to_vec(version)?);
        self.append_audit(&mut batch, entry)?;
        self.db.apply_batch(batch)?;
        Ok(())
    }

    pub fn commit_training(&self, training: &Training, entry: AuditEntry) -> anyhow::Result<()> {
        let mut batch = Batch::default();
        batch.insert(
            key(TRAINING, training.training_id),
            minicbor::to_vec(training)?,
        );
        self.append_audit(&mut batch, entry)?;
        self.db.apply_batch(batch)?;
        Ok(())
    }

    fn append_audit(&self, batch: &mut Batch, mut entry: AuditEntry) -> anyhow::Result<()> {
        // sled's monotonic id keeps ledger keys unique across documents
        entry.log_id = self.db.generate_id()?;
        batch.insert(key(AUDIT_LOG, entry.log_id), minicbor::to_vec(&entry)?);
        Ok(())
    }

    // row plumbing

    fn row<T>(&self, table: &str, id: u64) -> anyhow::Result<Option<T>>
    where
        T: for<'b> minicbor::Decode<'b, ()>,
    {
        match self.db.get(key(table, id))? {
            Some(value) => Ok(Some(minicbor::decode(&value)?)),
            None => Ok(None),
        }
    }

    fn rows<T>(&self, table: &str) -> anyhow::Result<Vec<T>>
    where
        T: for<'b> minicbor::Decode<'b, ()>,
    {
        let mut out = Vec::new();
        for item in self.db.scan_prefix(prefix(table)) {
            let (_, value) = item?;
            out.push(minicbor::decode(&value)?);
        }
        Ok(out)
    }
}

fn prefix(table: &str) -> Vec<u8> {
    let mut p = table.as_bytes().to_vec();
    p.push(b'/');
    p
}

fn key(table: &str, id: u64) -> Vec<u8> {
    let mut k = prefix(table);
    k.extend_from_slice(&id.to_be_bytes());
    k
}

/// Trailing 8 key bytes hold the big-endian record id
fn id_of(key: &[u8]) -> u64 {
    let mut raw = [0u8; 8];
    raw.copy_from_slice(&key[key.len() - 8..]);
    u64::from_be_bytes(raw)
}
