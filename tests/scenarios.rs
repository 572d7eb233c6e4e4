use anyhow::Context;
use doc_control::{
    config::Config,
    document::{DocType, Status, TimeStamp, TrainingStatus},
    identity::QUALITY_MANAGER,
    service::DocService,
};
use std::fs;
use std::path::Path;

use tempfile::TempDir; // Use for test db and storage cleanup.

// Sled uses file-based locking to prevent concurrent access, so each test
// gets its own database and storage tree under a fresh temp directory.
fn setup(temp: &TempDir) -> anyhow::Result<DocService> {
    let templates = temp.path().join("templates");
    fs::create_dir_all(&templates)?;
    for doc_type in DocType::ALL {
        fs::write(
            templates.join(format!("Template_{}.txt", doc_type.code())),
            "controlled content",
        )?;
    }
    fs::write(templates.join("Mock_Drawing.pdf"), "%PDF-1.4 mock")?;

    let config = Config::new(temp.path().join("storage"))
        .with_template_dir(&templates)
        .with_template(DocType::Drawing, templates.join("Mock_Drawing.pdf"))
        .with_training_roster(["walter.white", "jesse.pinkman"]);
    let service = DocService::open(temp.path().join("qms.db"), config)?;

    let gateway = service.gateway();
    gateway.add_user("albert.sevilleja", true)?; // document owner
    let qm = gateway.add_user("gus.fring", true)?;
    gateway.add_user("walter.white", true)?;
    gateway.add_user("jesse.pinkman", true)?;
    gateway.add_user("old.timer", false)?; // inactive
    let role = gateway.add_role(QUALITY_MANAGER)?;
    gateway.grant_role(qm, role)?;

    Ok(service)
}

#[test]
fn create_review_train_release() -> anyhow::Result<()> {
    let temp = TempDir::new()?;
    let service = setup(&temp)?;

    let (document, version) = service
        .create_document("test1", DocType::Sop, "albert.sevilleja")
        .context("Document creation failed: ")?;

    assert_eq!(document.doc_id, 1);
    assert_eq!(document.number, "SOP-001");
    assert_eq!(version.label.to_string(), "0.1");
    assert_eq!(version.status, Status::Draft);
    assert!(version.file_path.contains("01_drafts"));
    assert!(version.file_path.ends_with("SOP-001_V0.1_DRAFT.txt"));
    assert!(Path::new(&version.file_path).exists());

    // owner submits the draft: status only, no file move and no bump
    let submitted = service.approve("albert.sevilleja", "SOP-001", None)?;
    assert_eq!(submitted.status, Status::InReview);
    assert_eq!(submitted.label.to_string(), "0.1");
    assert_eq!(submitted.file_path, version.file_path);

    // quality manager approves with an effective date
    let effective = TimeStamp::new_with(2026, 8, 1, 9, 0, 0);
    let approved = service.approve("gus.fring", "SOP-001", Some(effective))?;
    assert_eq!(approved.status, Status::Training);
    assert_eq!(approved.label.to_string(), "1.0");
    assert_eq!(approved.effective_date, Some(effective));
    assert!(approved.file_path.contains("02_pending_approval"));
    assert!(approved.file_path.ends_with("SOP-001_V1.0_TRAINING.txt"));
    assert!(!Path::new(&version.file_path).exists());
    assert!(Path::new(&approved.file_path).exists());

    // one pending training record per roster user
    let records = service.gateway().trainings_for_version(approved.version_id)?;
    assert_eq!(records.len(), 2);
    assert!(records.iter().all(|t| t.status == TrainingStatus::Pending));

    // the gate holds until everyone completes
    assert!(service.release("gus.fring", "SOP-001").is_err());

    service.record_training_result("walter.white", "SOP-001", 100)?;
    service.record_training_result("jesse.pinkman", "SOP-001", 95)?;

    let released = service.release("gus.fring", "SOP-001")?;
    assert_eq!(released.status, Status::Released);
    assert_eq!(released.label.to_string(), "1.0");
    assert!(released.file_path.ends_with("03_released/SOP-001_V1.0.txt"));
    assert!(Path::new(&released.file_path).exists());

    // every mutation left a verifiable ledger entry behind
    let entries = service.gateway().audit_entries()?;
    assert!(!entries.is_empty());
    assert!(entries.iter().all(|e| e.verify()));

    Ok(())
}

#[test]
fn revise_and_supersede_cycle() -> anyhow::Result<()> {
    let temp = TempDir::new()?;
    let service = setup(&temp)?;

    service.create_document("test1", DocType::Sop, "albert.sevilleja")?;
    service.approve("albert.sevilleja", "SOP-001", None)?;
    service.approve("gus.fring", "SOP-001", Some(TimeStamp::new()))?;
    service.record_training_result("walter.white", "SOP-001", 100)?;
    service.record_training_result("jesse.pinkman", "SOP-001", 100)?;
    let first_release = service.release("gus.fring", "SOP-001")?;

    // branch a revision: minor bump, file copied so the release stays put
    let draft = service.revise("albert.sevilleja", "SOP-001")?;
    assert_eq!(draft.status, Status::Draft);
    assert_eq!(draft.label.to_string(), "1.1");
    assert!(draft.file_path.ends_with("01_drafts/SOP-001_V1.1_DRAFT.txt"));
    assert!(Path::new(&first_release.file_path).exists());
    assert!(Path::new(&draft.file_path).exists());

    // take the revision through the full cycle again
    service.approve("albert.sevilleja", "SOP-001", None)?;
    let approved = service.approve("gus.fring", "SOP-001", Some(TimeStamp::new()))?;
    assert_eq!(approved.label.to_string(), "2.0");
    service.record_training_result("walter.white", "SOP-001", 100)?;
    service.record_training_result("jesse.pinkman", "SOP-001", 100)?;
    let second_release = service.release("gus.fring", "SOP-001")?;
    assert_eq!(second_release.label.to_string(), "2.0");

    // the first release was archived before the second went live
    let old = service
        .gateway()
        .version(first_release.version_id)?
        .unwrap();
    assert_eq!(old.status, Status::Superseded);
    assert!(old
        .file_path
        .ends_with("04_archive/SOP-001_V1.0_SUPERSEDED.txt"));
    assert!(!Path::new(&first_release.file_path).exists());
    assert!(Path::new(&old.file_path).exists());

    let entries = service.gateway().audit_entries()?;
    assert!(entries.iter().all(|e| e.verify()));
    assert!(entries.iter().any(|e| e.action == "SUPERSEDED"));
    assert!(entries.iter().any(|e| e.action == "REVISE"));

    Ok(())
}

#[test]
fn sequential_numbering_per_type() -> anyhow::Result<()> {
    let temp = TempDir::new()?;
    let service = setup(&temp)?;

    let (first, _) = service.create_document("test1", DocType::Sop, "albert.sevilleja")?;
    let (second, _) = service.create_document("test2", DocType::Sop, "albert.sevilleja")?;
    let (other, _) = service.create_document("test3", DocType::WorkInstruction, "albert.sevilleja")?;

    assert_eq!(first.number, "SOP-001");
    assert_eq!(second.number, "SOP-002");
    // each type keeps its own sequence
    assert_eq!(other.number, "WI-001");

    assert_eq!(first.doc_id, 1);
    assert_eq!(second.doc_id, 2);
    assert_eq!(other.doc_id, 3);

    Ok(())
}

#[test]
fn external_template_extension_is_preserved() -> anyhow::Result<()> {
    let temp = TempDir::new()?;
    let service = setup(&temp)?;

    let (document, version) =
        service.create_document("Mechanical Drawing", DocType::Drawing, "albert.sevilleja")?;

    assert_eq!(document.number, "DWG-001");
    assert!(version.file_path.ends_with("DWG-001_V0.1_DRAFT.pdf"));
    assert!(Path::new(&version.file_path).exists());

    Ok(())
}

#[test]
fn failed_training_blocks_release() -> anyhow::Result<()> {
    let temp = TempDir::new()?;
    let service = setup(&temp)?;

    service.create_document("test1", DocType::Sop, "albert.sevilleja")?;
    service.approve("albert.sevilleja", "SOP-001", None)?;
    service.approve("gus.fring", "SOP-001", Some(TimeStamp::new()))?;

    service.record_training_result("walter.white", "SOP-001", 100)?;
    let failed = service.record_training_result("jesse.pinkman", "SOP-001", 60)?;
    assert_eq!(failed.status, TrainingStatus::Failed);
    assert_eq!(failed.score, Some(60));
    assert!(failed.completion_date.is_none());

    let err = service.release("gus.fring", "SOP-001").unwrap_err();
    assert!(err.to_string().contains("Training incomplete"));

    Ok(())
}
