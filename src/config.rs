//! Engine configuration, constructed once at startup and passed into the
//! lifecycle engine and repository adapter. No module-level state.
use super::document::DocType;
use super::error::LifecycleError;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct Config {
    /// Root of the staged document repository
    pub storage_root: PathBuf,
    /// Per-type template file used to seed a new draft
    pub templates: HashMap<DocType, PathBuf>,
    /// User names that must complete training before a release
    pub training_roster: Vec<String>,
    /// Days from assignment until a training record is overdue
    pub training_due_days: i64,
    /// A score strictly above this threshold completes training
    pub pass_score: u32,
}

impl Config {
    pub fn new(storage_root: impl Into<PathBuf>) -> Self {
        Self {
            storage_root: storage_root.into(),
            templates: HashMap::new(),
            training_roster: Vec::new(),
            training_due_days: 14,
            pass_score: 70,
        }
    }

    pub fn with_template(mut self, doc_type: DocType, path: impl Into<PathBuf>) -> Self {
        self.templates.insert(doc_type, path.into());
        self
    }

    /// Map every document type to `{dir}/Template_{code}.txt`
    pub fn with_template_dir(mut self, dir: impl AsRef<Path>) -> Self {
        for doc_type in DocType::ALL {
            self.templates.insert(
                doc_type,
                dir.as_ref().join(format!("Template_{}.txt", doc_type.code())),
            );
        }
        self
    }

    pub fn with_training_roster<I, S>(mut self, users: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.training_roster = users.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_training_due_days(mut self, days: i64) -> Self {
        self.training_due_days = days;
        self
    }

    pub fn template_for(&self, doc_type: DocType) -> Result<&Path, LifecycleError> {
        self.templates
            .get(&doc_type)
            .map(PathBuf::as_path)
            .ok_or_else(|| LifecycleError::MissingTemplate(doc_type.code().to_string()))
    }
}
