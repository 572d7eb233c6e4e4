//! Service layer API for document lifecycle operations
use super::audit::{self, Action, AuditEntry, Auditable};
use super::config::Config;
use super::document::{
    next_doc_number, DocType, Document, Status, TimeStamp, Training, TrainingStatus, Version,
    VersionLabel,
};
use super::error::{LifecycleError, ValidationError};
use super::identity::{self, UserIdentity};
use super::storage::{extension_of, Repository, Stage};
use super::store::Gateway;
use chrono::Utc;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

pub struct DocService {
    gateway: Gateway,
    repo: Repository,
    config: Config,
}

impl DocService {
    pub fn new(gateway: Gateway, config: Config) -> anyhow::Result<Self> {
        let repo = Repository::new(&config.storage_root);
        repo.init()?;
        Ok(Self {
            gateway,
            repo,
            config,
        })
    }

    pub fn open(db_path: impl AsRef<Path>, config: Config) -> anyhow::Result<Self> {
        Self::new(Gateway::open(db_path)?, config)
    }

    pub fn gateway(&self) -> &Gateway {
        &self.gateway
    }

    /// Create a controlled document with its initial 0.1 draft version.
    /// The type template is copied into the drafts stage and both the
    /// document and version rows are committed with CREATE ledger entries
    /// attributed to the owner.
    pub fn create_document(
        &self,
        title: &str,
        doc_type: DocType,
        owner_name: &str,
    ) -> anyhow::Result<(Document, Version)> {
        let template = self.config.template_for(doc_type)?.to_path_buf();
        let owner = identity::resolve(&self.gateway, owner_name)?;
        if !owner.active {
            return Err(LifecycleError::InactiveUser(owner_name.to_string()).into());
        }
        if self.gateway.document_by_title(title)?.is_some() {
            return Err(LifecycleError::DuplicateTitle(title.to_string()).into());
        }

        let doc_id = self.gateway.next_document_id()?;
        let version_id = self.gateway.next_version_id()?;
        let number = next_doc_number(
            doc_type,
            self.gateway.last_number_for_type(doc_type)?.as_deref(),
        );

        let label = VersionLabel::initial();
        let draft_path =
            self.repo
                .target_path(&number, label, Stage::Drafts, &extension_of(&template));

        // entities validate before the template copy: a rejected create must
        // leave nothing on disk
        let document = Document::new(doc_id, number, title.to_string(), owner.user_id, doc_type)?;
        let version = Version::new(
            version_id,
            doc_id,
            label,
            Status::Draft,
            path_str(&draft_path),
            None,
        )?;

        let now = TimeStamp::new();
        let doc_entry = audit::diff_entry(None, &document, owner.user_id, Action::Create, now)?;
        let version_entry = audit::diff_entry(None, &version, owner.user_id, Action::Create, now)?;

        self.repo.duplicate(&template, &draft_path)?;
        if let Err(e) =
            self.gateway
                .commit_created_document(&document, &version, doc_entry, version_entry)
        {
            // a failed commit must not leave a stray draft behind
            let _ = fs::remove_file(&draft_path);
            return Err(e);
        }

        info!(number = %document.number, "document created");
        Ok((document, version))
    }

    /// Advance a version through the approval state machine.
    ///
    /// DRAFT + document owner submits the version for review. IN_REVIEW +
    /// Quality Manager approves it into TRAINING: the effective date becomes
    /// mandatory, the major version bumps, the file moves out of drafts, and
    /// training is assigned to the configured roster. Any other combination
    /// of status and actor is rejected.
    pub fn approve(
        &self,
        user_name: &str,
        doc_num: &str,
        effective_date: Option<TimeStamp<Utc>>,
    ) -> anyhow::Result<Version> {
        let (document, version) = self.lookup(doc_num)?;
        let user = self.active_user(user_name)?;

        if user.user_id == document.owner_id && version.status == Status::Draft {
            let mut submitted = version.clone();
            submitted.status = Status::InReview;
            let entry = audit::diff_entry(
                Some(&version),
                &submitted,
                user.user_id,
                Action::Update,
                TimeStamp::new(),
            )?;
            self.gateway.commit_version(&submitted, entry)?;
            info!(number = %document.number, "draft submitted for review");
            Ok(submitted)
        } else if user.is_quality_manager() && version.status == Status::InReview {
            let Some(effective_date) = effective_date else {
                return Err(ValidationError::MissingEffectiveDate.into());
            };
            let label = version.label.bump_major();
            let old_path = PathBuf::from(&version.file_path);
            let new_path = self.repo.target_path(
                &document.number,
                label,
                Stage::PendingApproval,
                &extension_of(&old_path),
            );

            let approved = Version::new(
                version.version_id,
                version.doc_id,
                label,
                Status::Training,
                path_str(&new_path),
                Some(effective_date),
            )?;
            let entry = audit::diff_entry(
                Some(&version),
                &approved,
                user.user_id,
                Action::Approve,
                TimeStamp::new(),
            )?;

            // file first: if the move fails no database row is written, and
            // a failed commit moves the file back
            self.repo.relocate(&old_path, &new_path)?;
            if let Err(e) = self.gateway.commit_version(&approved, entry) {
                let _ = fs::rename(&new_path, &old_path);
                return Err(e);
            }

            info!(number = %document.number, version = %label, "version approved for training");
            self.assign_training(&approved, user.user_id)?;
            Ok(approved)
        } else {
            Err(LifecycleError::NotPermitted(user_name.to_string()).into())
        }
    }

    /// Final release step for a version that finished its training phase.
    /// Every assigned training record must be COMPLETED; the previously
    /// released version, if any, is superseded first.
    pub fn release(&self, user_name: &str, doc_num: &str) -> anyhow::Result<Version> {
        let (document, version) = self.lookup(doc_num)?;
        let user = self.active_user(user_name)?;
        if !user.is_quality_manager() {
            return Err(LifecycleError::NotPermitted(user_name.to_string()).into());
        }
        if version.status != Status::Training {
            return Err(LifecycleError::NothingToRelease(doc_num.to_string()).into());
        }

        let records = self.gateway.trainings_for_version(version.version_id)?;
        if records
            .iter()
            .any(|t| t.status != TrainingStatus::Completed)
        {
            return Err(LifecycleError::TrainingIncomplete(doc_num.to_string()).into());
        }

        if self.gateway.latest_released(document.doc_id)?.is_some() {
            self.supersede(&document, user.user_id)?;
        }

        let old_path = PathBuf::from(&version.file_path);
        let new_path = self.repo.target_path(
            &document.number,
            version.label,
            Stage::Released,
            &extension_of(&old_path),
        );
        let mut released = version.clone();
        released.status = Status::Released;
        released.file_path = path_str(&new_path);
        let entry = audit::diff_entry(
            Some(&version),
            &released,
            user.user_id,
            Action::Release,
            TimeStamp::new(),
        )?;

        self.repo.relocate(&old_path, &new_path)?;
        if let Err(e) = self.gateway.commit_version(&released, entry) {
            let _ = fs::rename(&new_path, &old_path);
            return Err(e);
        }

        info!(number = %document.number, version = %released.label, "version released");
        Ok(released)
    }

    /// Branch a new DRAFT from the latest released version, bumping the
    /// minor component. The released file is copied, not moved.
    pub fn revise(&self, user_name: &str, doc_num: &str) -> anyhow::Result<Version> {
        let document = self
            .gateway
            .document_by_number(doc_num)?
            .ok_or_else(|| LifecycleError::DocumentNotFound(doc_num.to_string()))?;
        let released = self
            .gateway
            .latest_released(document.doc_id)?
            .ok_or_else(|| LifecycleError::NoReleasedVersion(doc_num.to_string()))?;
        if self.gateway.in_process_version(document.doc_id)?.is_some() {
            return Err(LifecycleError::RevisionInProcess(doc_num.to_string()).into());
        }
        let user = self.active_user(user_name)?;
        if user.user_id != document.owner_id && !user.is_quality_manager() {
            return Err(LifecycleError::NotPermitted(user_name.to_string()).into());
        }

        let label = released.label.bump_minor();
        let source = PathBuf::from(&released.file_path);
        let draft_path =
            self.repo
                .target_path(&document.number, label, Stage::Drafts, &extension_of(&source));
        let version_id = self.gateway.next_version_id()?;
        let draft = Version::new(
            version_id,
            document.doc_id,
            label,
            Status::Draft,
            path_str(&draft_path),
            None,
        )?;

        // Revision entries deviate from the changed-field diff: they carry a
        // full snapshot of the new draft plus a derived_from pointer.
        let mut snapshot = serde_json::to_value(&draft)?;
        snapshot["derived_from"] = serde_json::Value::String(released.label.to_string());
        let entry = AuditEntry::new(
            Version::TABLE,
            version_id,
            user.user_id,
            Action::Revise,
            None,
            snapshot.to_string(),
            TimeStamp::new(),
        );

        self.repo.duplicate(&source, &draft_path)?;
        if let Err(e) = self.gateway.commit_version(&draft, entry) {
            let _ = fs::remove_file(&draft_path);
            return Err(e);
        }

        info!(number = %document.number, version = %label, "revision drafted");
        Ok(draft)
    }

    /// Record a user's training score against the document's version in
    /// training. A score strictly above the pass threshold completes the
    /// record; anything else fails it. Both outcomes are persisted and
    /// audited.
    pub fn record_training_result(
        &self,
        user_name: &str,
        doc_num: &str,
        score: u32,
    ) -> anyhow::Result<Training> {
        let user = identity::resolve(&self.gateway, user_name)?;
        let document = self
            .gateway
            .document_by_number(doc_num)?
            .ok_or_else(|| LifecycleError::DocumentNotFound(doc_num.to_string()))?;
        let not_found = || LifecycleError::TrainingNotFound {
            user: user_name.to_string(),
            doc_num: doc_num.to_string(),
        };
        let trainable = self
            .gateway
            .versions_for(document.doc_id)?
            .into_iter()
            .filter(|v| v.status == Status::Training)
            .next_back()
            .ok_or_else(not_found)?;
        let record = self
            .gateway
            .training_for(user.user_id, trainable.version_id)?
            .ok_or_else(not_found)?;

        let mut updated = record.clone();
        updated.score = Some(score);
        if score > self.config.pass_score {
            updated.status = TrainingStatus::Completed;
            updated.completion_date = Some(TimeStamp::new());
        } else {
            updated.status = TrainingStatus::Failed;
        }

        let action = match updated.status {
            TrainingStatus::Completed => Action::Completed,
            _ => Action::Failed,
        };
        let entry = audit::diff_entry(
            Some(&record),
            &updated,
            user.user_id,
            action,
            TimeStamp::new(),
        )?;
        self.gateway.commit_training(&updated, entry)?;

        if updated.status == TrainingStatus::Failed {
            warn!(user = %user_name, number = %document.number, score, "training attempt failed");
        }
        Ok(updated)
    }

    /// Flag training records past their due date without a COMPLETED status
    pub fn sweep_overdue(&self, now: TimeStamp<Utc>) -> anyhow::Result<Vec<Training>> {
        let mut overdue = Vec::new();
        for record in self.gateway.trainings()? {
            if record.status != TrainingStatus::Completed && record.due_date < now {
                warn!(
                    user_id = record.user_id,
                    version_id = record.version_id,
                    due = %record.due_date.to_rfc3339(),
                    "training overdue"
                );
                overdue.push(record);
            }
        }
        Ok(overdue)
    }

    /// Archive the current RELEASED version ahead of its replacement.
    /// Reaching this without a released version is a caller-sequencing bug.
    fn supersede(&self, document: &Document, user_id: u64) -> anyhow::Result<Version> {
        let released = self.gateway.latest_released(document.doc_id)?.ok_or_else(|| {
            anyhow::anyhow!(
                "invariant violated: no RELEASED version of '{}' to supersede",
                document.number
            )
        })?;

        let old_path = PathBuf::from(&released.file_path);
        let archive_path = self.repo.target_path(
            &document.number,
            released.label,
            Stage::Archive,
            &extension_of(&old_path),
        );
        let mut superseded = released.clone();
        superseded.status = Status::Superseded;
        superseded.file_path = path_str(&archive_path);
        let entry = audit::diff_entry(
            Some(&released),
            &superseded,
            user_id,
            Action::Superseded,
            TimeStamp::new(),
        )?;

        self.repo.relocate(&old_path, &archive_path)?;
        if let Err(e) = self.gateway.commit_version(&superseded, entry) {
            let _ = fs::rename(&archive_path, &old_path);
            return Err(e);
        }

        info!(number = %document.number, version = %superseded.label, "previous release superseded");
        Ok(superseded)
    }

    /// One PENDING record per roster user, due after the configured policy
    /// window. Inactive roster users are skipped.
    fn assign_training(&self, version: &Version, assigner_id: u64) -> anyhow::Result<Vec<Training>> {
        let assigned_date = TimeStamp::new();
        let due_date = assigned_date.plus_days(self.config.training_due_days);
        let mut records = Vec::new();
        for name in &self.config.training_roster {
            let trainee = identity::resolve(&self.gateway, name)?;
            if !trainee.active {
                warn!(user = %name, "skipping training assignment for inactive user");
                continue;
            }
            let training = Training::assigned(
                self.gateway.next_training_id()?,
                trainee.user_id,
                version.version_id,
                assigned_date,
                due_date,
            );
            let entry =
                audit::diff_entry(None, &training, assigner_id, Action::Create, assigned_date)?;
            self.gateway.commit_training(&training, entry)?;
            records.push(training);
        }
        Ok(records)
    }

    fn lookup(&self, doc_num: &str) -> anyhow::Result<(Document, Version)> {
        let document = self
            .gateway
            .document_by_number(doc_num)?
            .ok_or_else(|| LifecycleError::DocumentNotFound(doc_num.to_string()))?;
        let version = self.gateway.latest_version(document.doc_id)?.ok_or_else(|| {
            anyhow::anyhow!("invariant violated: document '{doc_num}' has no versions")
        })?;
        Ok((document, version))
    }

    fn active_user(&self, user_name: &str) -> anyhow::Result<UserIdentity> {
        let user = identity::resolve(&self.gateway, user_name)?;
        if !user.active {
            return Err(LifecycleError::InactiveUser(user_name.to_string()).into());
        }
        Ok(user)
    }
}

fn path_str(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}
