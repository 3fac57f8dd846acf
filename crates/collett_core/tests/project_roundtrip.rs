use collett_core::{
    Position, Project, ProjectError, ProjectMeta, ProjectXmlReader, ProjectXmlWriter, StoryKind,
    StoryModel, XmlError, CONTENT_FOLDER, PROJECT_FILE, PROJECT_FOLDER,
};
use std::path::Path;

/// Outline using every kind, reordered siblings, escaped names and word counts.
fn varied_model() -> StoryModel {
    let mut model = StoryModel::new("A & B <c> \"q\" ]]> 'apos'");
    let root = model.root_id();
    let part = model
        .add_item(StoryKind::Partition, root, Position::Inside, Some("Part <I>"))
        .unwrap();
    let loose = model
        .add_item(StoryKind::Chapter, root, Position::Inside, Some("Loose & free"))
        .unwrap();
    let first = model
        .add_item(StoryKind::Chapter, part, Position::Inside, Some("First"))
        .unwrap();
    let second = model
        .add_item(StoryKind::Chapter, first, Position::After, Some("Second"))
        .unwrap();
    let opening = model
        .add_item(StoryKind::Scene, first, Position::Inside, Some("Opening"))
        .unwrap();
    model
        .add_item(StoryKind::Page, first, Position::Here, Some("Notes \"draft\""))
        .unwrap();
    model
        .add_item(StoryKind::Scene, opening, Position::Before, None)
        .unwrap();
    model.move_item(second, first, Position::Before).unwrap();
    model.move_item(loose, part, Position::Before).unwrap();
    model.set_word_count(opening, 1_234).unwrap();
    model.set_word_count(second, 7).unwrap();
    model.set_word_count(root, u32::MAX).unwrap();
    model
}

#[test]
fn outline_survives_save_and_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let mut project = Project::open(dir.path()).unwrap();
    let root = project.model().root_id();
    let chapter = project
        .model_mut()
        .add_item(StoryKind::Chapter, root, Position::Inside, None)
        .unwrap();
    let scene = project
        .model_mut()
        .add_item(StoryKind::Scene, chapter, Position::Inside, None)
        .unwrap();
    project.set_name("The Long Winter");
    project.save().unwrap();
    let saved = project.model().snapshot();
    let created_at = project.meta().created_at;
    project.close();

    let reopened = Project::open(dir.path()).unwrap();
    let snapshot = reopened.model().snapshot();

    assert_eq!(snapshot, saved);
    assert_eq!(snapshot.shape(), saved.shape());
    assert_eq!(reopened.name(), "The Long Winter");
    assert_eq!(snapshot.children[0].name, "New Chapter");
    assert_eq!(snapshot.children[0].children[0].name, "New Scene");
    assert_eq!(reopened.model().parent_of(scene), Some(chapter));
    assert_eq!(reopened.meta().created_at, created_at);
}

#[test]
fn opening_a_missing_folder_is_project_not_found() {
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("nope");

    let err = Project::open(&missing).unwrap_err();
    assert!(matches!(err, ProjectError::ProjectNotFound { ref path, .. } if path == &missing));
    assert!(!missing.exists());
}

#[test]
fn opening_an_empty_folder_starts_a_new_project() {
    let dir = tempfile::tempdir().unwrap();

    let project = Project::open(dir.path()).unwrap();

    assert_eq!(project.model().item_count(), 1);
    assert_eq!(project.name(), "Unnamed Project");
    assert!(dir.path().join(PROJECT_FOLDER).is_dir());
    assert!(!dir.path().join(PROJECT_FOLDER).join(PROJECT_FILE).exists());
}

#[test]
fn create_makes_missing_folders() {
    let dir = tempfile::tempdir().unwrap();
    let target = dir.path().join("novels").join("first");

    let mut project = Project::create(&target).unwrap();
    project.save().unwrap();

    assert!(target.join(PROJECT_FOLDER).join(PROJECT_FILE).is_file());
}

#[test]
fn corrupt_project_file_is_reported_on_open() {
    let dir = tempfile::tempdir().unwrap();
    let folder = dir.path().join(PROJECT_FOLDER);
    std::fs::create_dir_all(&folder).unwrap();
    std::fs::write(folder.join(PROJECT_FILE), b"<collett:project").unwrap();

    let err = Project::open(dir.path()).unwrap_err();
    assert!(matches!(err, ProjectError::Xml(XmlError::ParseFailed { .. })));
}

#[test]
fn failed_save_keeps_model_and_timestamps() {
    let dir = tempfile::tempdir().unwrap();
    let mut project = Project::open(dir.path()).unwrap();
    let root = project.model().root_id();
    project
        .model_mut()
        .add_item(StoryKind::Chapter, root, Position::Inside, None)
        .unwrap();
    let target = dir.path().join(PROJECT_FOLDER).join(PROJECT_FILE);
    std::fs::create_dir_all(&target).unwrap();
    let before = (project.model().snapshot(), *project.meta());

    let err = project.save().unwrap_err();

    assert!(matches!(err, ProjectError::Xml(XmlError::Storage(_))));
    assert_eq!((project.model().snapshot(), *project.meta()), before);
}

#[test]
fn content_round_trips_and_updates_word_count() {
    let dir = tempfile::tempdir().unwrap();
    let mut project = Project::open(dir.path()).unwrap();
    let root = project.model().root_id();
    let chapter = project
        .model_mut()
        .add_item(StoryKind::Chapter, root, Position::Inside, None)
        .unwrap();
    let scene = project
        .model_mut()
        .add_item(StoryKind::Scene, chapter, Position::Inside, None)
        .unwrap();

    assert_eq!(project.read_content(scene).unwrap(), "");
    project
        .write_content(scene, "It was a dark\nand stormy night.")
        .unwrap();
    project.save().unwrap();
    project.close();

    let reopened = Project::open(dir.path()).unwrap();
    assert_eq!(
        reopened.read_content(scene).unwrap(),
        "It was a dark\nand stormy night."
    );
    assert_eq!(reopened.model().get(scene).unwrap().word_count(), 7);
    assert_eq!(reopened.model().total_word_count(chapter).unwrap(), 7);
}

#[test]
fn content_for_unknown_items_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let mut project = Project::open(dir.path()).unwrap();
    let stranger = uuid::Uuid::new_v4();

    assert!(matches!(
        project.write_content(stranger, "text").unwrap_err(),
        ProjectError::Model(_)
    ));
    assert!(matches!(
        project.read_content(stranger).unwrap_err(),
        ProjectError::Model(_)
    ));
}

#[test]
fn varied_outline_round_trips_through_the_document() {
    let model = varied_model();
    let meta = ProjectMeta {
        created_at: 1_700_000_000_000,
        updated_at: 1_700_000_500_000,
    };

    let bytes = ProjectXmlWriter::to_bytes(&model, &meta).unwrap();
    let loaded = ProjectXmlReader::from_bytes(&bytes, Path::new("project.xml")).unwrap();

    assert_eq!(loaded.model.snapshot(), model.snapshot());
    assert_eq!(loaded.meta, meta);
    let root = loaded.model.root_id();
    let top: Vec<&str> = loaded
        .model
        .children_of(root)
        .unwrap()
        .iter()
        .map(|id| loaded.model.get(*id).unwrap().name())
        .collect();
    assert_eq!(top, ["Loose & free", "Part <I>"]);
}

#[test]
fn varied_outline_survives_save_and_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let mut project = Project::open(dir.path()).unwrap();
    *project.model_mut() = varied_model();
    project.save().unwrap();
    let saved = project.model().snapshot();
    project.close();

    let reopened = Project::open(dir.path()).unwrap();

    assert_eq!(reopened.model().snapshot().shape(), saved.shape());
    assert_eq!(reopened.model().snapshot(), saved);
}

#[test]
fn blank_project_name_becomes_unnamed_project() {
    let dir = tempfile::tempdir().unwrap();
    let mut project = Project::open(dir.path()).unwrap();
    project.set_name("Draft");

    project.set_name("   ");
    project.save().unwrap();
    project.close();

    assert_eq!(Project::open(dir.path()).unwrap().name(), "Unnamed Project");
}

#[test]
fn removing_an_item_deletes_its_subtree_content() {
    let dir = tempfile::tempdir().unwrap();
    let mut project = Project::open(dir.path()).unwrap();
    let root = project.model().root_id();
    let chapter = project
        .model_mut()
        .add_item(StoryKind::Chapter, root, Position::Inside, None)
        .unwrap();
    let scene = project
        .model_mut()
        .add_item(StoryKind::Scene, chapter, Position::Inside, None)
        .unwrap();
    let kept = project
        .model_mut()
        .add_item(StoryKind::Chapter, root, Position::Inside, None)
        .unwrap();
    for id in [chapter, scene, kept] {
        project.write_content(id, "some words here").unwrap();
    }

    let removed = project.remove_item(chapter).unwrap();

    assert_eq!(removed, [chapter, scene]);
    let files = project.storage().list_files(CONTENT_FOLDER).unwrap();
    assert_eq!(files, [format!("{kept}.txt")]);
    assert_eq!(project.read_content(kept).unwrap(), "some words here");
}

#[test]
fn removing_the_root_keeps_all_content() {
    let dir = tempfile::tempdir().unwrap();
    let mut project = Project::open(dir.path()).unwrap();
    let root = project.model().root_id();
    project.write_content(root, "front matter").unwrap();

    let err = project.remove_item(root).unwrap_err();

    assert!(matches!(err, ProjectError::Model(_)));
    assert_eq!(project.read_content(root).unwrap(), "front matter");
}

#[test]
fn save_prunes_content_of_items_removed_from_the_model() {
    let dir = tempfile::tempdir().unwrap();
    let mut project = Project::open(dir.path()).unwrap();
    let root = project.model().root_id();
    let chapter = project
        .model_mut()
        .add_item(StoryKind::Chapter, root, Position::Inside, None)
        .unwrap();
    project.write_content(chapter, "doomed text").unwrap();
    project
        .storage()
        .write_file(Path::new(CONTENT_FOLDER).join("notes.txt"), b"keep me")
        .unwrap();

    project.model_mut().remove_item(chapter).unwrap();
    project.save().unwrap();

    let files = project.storage().list_files(CONTENT_FOLDER).unwrap();
    assert_eq!(files, ["notes.txt"]);
}
