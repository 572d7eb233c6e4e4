//! Repository storage adapter: the staged folder tree backing the lifecycle.
//! Target paths are computed from structured fields, never by rewriting a
//! previous path string.
use super::document::VersionLabel;
use super::error::LifecycleError;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum Stage {
    Drafts,
    PendingApproval,
    Released,
    Archive,
}

impl Stage {
    pub const ALL: [Stage; 4] = [
        Stage::Drafts,
        Stage::PendingApproval,
        Stage::Released,
        Stage::Archive,
    ];

    pub fn dir(&self) -> &'static str {
        match self {
            Stage::Drafts => "01_drafts",
            Stage::PendingApproval => "02_pending_approval",
            Stage::Released => "03_released",
            Stage::Archive => "04_archive",
        }
    }

    /// Filename marker appended after the version label
    pub fn marker(&self) -> &'static str {
        match self {
            Stage::Drafts => "_DRAFT",
            Stage::PendingApproval => "_TRAINING",
            Stage::Released => "",
            Stage::Archive => "_SUPERSEDED",
        }
    }
}

pub struct Repository {
    root: PathBuf,
}

impl Repository {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Create the stage folders if absent
    pub fn init(&self) -> anyhow::Result<()> {
        for stage in Stage::ALL {
            fs::create_dir_all(self.root.join(stage.dir()))?;
        }
        Ok(())
    }

    /// Deterministic location of a controlled file:
    /// `{root}/{stage}/{number}_V{label}{marker}{ext}`
    pub fn target_path(
        &self,
        number: &str,
        label: VersionLabel,
        stage: Stage,
        extension: &str,
    ) -> PathBuf {
        self.root.join(stage.dir()).join(format!(
            "{number}_V{label}{}{extension}",
            stage.marker()
        ))
    }

    /// Move a controlled file to its next stage. The source must exist at
    /// the recorded path.
    pub fn relocate(&self, from: &Path, to: &Path) -> anyhow::Result<()> {
        if !from.exists() {
            return Err(LifecycleError::MissingFile(from.to_path_buf()).into());
        }
        fs::rename(from, to)?;
        Ok(())
    }

    /// Copy (not move) a source file into a new draft. The source stays put.
    pub fn duplicate(&self, from: &Path, to: &Path) -> anyhow::Result<()> {
        copy_checked(from, to)
    }
}

fn copy_checked(from: &Path, to: &Path) -> anyhow::Result<()> {
    if !from.exists() {
        return Err(LifecycleError::MissingFile(from.to_path_buf()).into());
    }
    fs::copy(from, to)?;
    Ok(())
}

/// Extension with its leading dot, empty when the path has none
pub fn extension_of(path: &Path) -> String {
    path.extension()
        .map(|ext| format!(".{}", ext.to_string_lossy()))
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn target_paths_are_pure_functions_of_metadata() {
        let repo = Repository::new("/srv/qms");
        let label = VersionLabel::new(1, 0);

        assert_eq!(
            repo.target_path("SOP-001", VersionLabel::initial(), Stage::Drafts, ".txt"),
            PathBuf::from("/srv/qms/01_drafts/SOP-001_V0.1_DRAFT.txt")
        );
        assert_eq!(
            repo.target_path("SOP-001", label, Stage::PendingApproval, ".txt"),
            PathBuf::from("/srv/qms/02_pending_approval/SOP-001_V1.0_TRAINING.txt")
        );
        assert_eq!(
            repo.target_path("SOP-001", label, Stage::Released, ".txt"),
            PathBuf::from("/srv/qms/03_released/SOP-001_V1.0.txt")
        );
        assert_eq!(
            repo.target_path("SOP-001", label, Stage::Archive, ".pdf"),
            PathBuf::from("/srv/qms/04_archive/SOP-001_V1.0_SUPERSEDED.pdf")
        );
    }

    #[test]
    fn extension_is_preserved_from_the_source() {
        assert_eq!(extension_of(Path::new("Template_DWG.pdf")), ".pdf");
        assert_eq!(extension_of(Path::new("no_extension")), "");
    }

    #[test]
    fn relocating_a_missing_file_fails_without_side_effects() {
        let repo = Repository::new("/srv/qms");
        let err = repo
            .relocate(Path::new("/srv/qms/01_drafts/ghost.txt"), Path::new("/srv/qms/x"))
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<LifecycleError>(),
            Some(LifecycleError::MissingFile(_))
        ));
    }
}
