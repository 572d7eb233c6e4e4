#[derive(thiserror::Error, Debug)]
pub enum ValidationError {
    #[error("Title cannot be empty")]
    EmptyTitle,
    #[error("Invalid document number format: '{0}'")]
    InvalidNumber(String),
    #[error("Mismatch: Type is '{type_code}' but Number starts with '{prefix}'")]
    TypeMismatch { type_code: String, prefix: String },
    #[error("Invalid version label: '{0}'")]
    InvalidLabel(String),
    #[error("File path cannot be empty")]
    EmptyFilePath,
    #[error("Effective date cannot be empty in RELEASED documents")]
    MissingEffectiveDate,
    #[error("Invalid document type: '{0}'")]
    UnknownType(String),
}

#[derive(thiserror::Error, Debug)]
pub enum LifecycleError {
    #[error("User does not exist: '{0}'")]
    UserNotFound(String),
    #[error("User is inactive: '{0}'")]
    InactiveUser(String),
    #[error("Document does not exist: '{0}'")]
    DocumentNotFound(String),
    #[error("Document title already exists: '{0}'")]
    DuplicateTitle(String),
    #[error("No RELEASED version of document: '{0}'")]
    NoReleasedVersion(String),
    #[error("Draft or in-review already in process for document: '{0}'")]
    RevisionInProcess(String),
    #[error("No version awaiting release for document: '{0}'")]
    NothingToRelease(String),
    #[error("Training incomplete for document: '{0}'")]
    TrainingIncomplete(String),
    #[error("No training assigned to user '{user}' for document '{doc_num}'")]
    TrainingNotFound { user: String, doc_num: String },
    #[error("Action not permitted for user: '{0}'")]
    NotPermitted(String),
    #[error("No template configured for type '{0}'")]
    MissingTemplate(String),
    #[error("Missing file at recorded path: '{}'", .0.display())]
    MissingFile(std::path::PathBuf),
}
