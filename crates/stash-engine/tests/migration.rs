mod common;

use std::collections::HashSet;
use std::io::Write;
use std::path::{Path, PathBuf};

use common::{Fixture, png};
use stash_core::{BlobId, Item, NewBox, NewItem};
use stash_engine::{ExportStatus, ImportStatus, MigrationError};
use zip::ZipWriter;
use zip::write::SimpleFileOptions;

/// Items compared across an import, ignoring ids
#[derive(Debug, PartialEq, Eq, PartialOrd, Ord)]
struct ItemShape {
    name: String,
    comment: Option<String>,
    keywords: Option<String>,
    barcode: Option<String>,
    images: usize,
}

impl From<&Item> for ItemShape {
    fn from(item: &Item) -> Self {
        Self {
            name: item.name.clone(),
            comment: item.comment.clone(),
            keywords: item.keywords.clone(),
            barcode: item.barcode.clone(),
            images: item.image_ids.len(),
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
struct BoxShape {
    name: String,
    code: i64,
    comment: Option<String>,
    has_image: bool,
    items: Vec<ItemShape>,
}

#[derive(Debug, PartialEq, Eq)]
struct Graph {
    general: Vec<ItemShape>,
    locations: Vec<(String, Vec<BoxShape>)>,
}

async fn graph(fixture: &Fixture) -> Graph {
    let storage = &fixture.storage;
    let general = storage
        .list_general_items()
        .await
        .unwrap()
        .iter()
        .map(ItemShape::from)
        .collect();

    let mut locations = Vec::new();
    for location in storage.list_locations().await.unwrap() {
        let mut boxes = Vec::new();
        for storage_box in storage.list_boxes(location.id).await.unwrap() {
            let items = storage.list_items(storage_box.id).await.unwrap();
            boxes.push(BoxShape {
                name: storage_box.name,
                code: storage_box.code,
                comment: storage_box.comment,
                has_image: storage_box.image_id.is_some(),
                items: items.iter().map(ItemShape::from).collect(),
            });
        }
        locations.push((location.name, boxes));
    }

    Graph { general, locations }
}

/// Two locations, three boxes, general-space items and shared image ids
async fn populate(fixture: &Fixture) {
    let storage = &fixture.storage;

    let lamp = fixture.save_image(1).await;
    storage
        .create_item(&NewItem {
            name: "Desk lamp".to_string(),
            comment: Some("needs a bulb".to_string()),
            keywords: Some("light office".to_string()),
            barcode: Some("4006381333931".to_string()),
            image_ids: vec![lamp],
            ..Default::default()
        })
        .await
        .unwrap();
    storage.create_item(&NewItem::new("Loose cable")).await.unwrap();

    let garage = storage.create_location("Garage").await.unwrap();
    let tools_image = fixture.save_image(2).await;
    let tools = storage
        .create_box(&NewBox {
            location_id: garage.id,
            name: "Tools".to_string(),
            code: 7,
            comment: Some("top shelf".to_string()),
            image_id: Some(tools_image),
        })
        .await
        .unwrap();
    let drill = vec![fixture.save_image(3).await, fixture.save_image(4).await];
    storage
        .create_item(&NewItem::new("Drill").in_box(tools.id).with_images(drill))
        .await
        .unwrap();
    storage
        .create_item(&NewItem::new("Hammer").in_box(tools.id))
        .await
        .unwrap();

    storage
        .create_box(&NewBox {
            location_id: garage.id,
            name: "Empty".to_string(),
            code: 12,
            ..Default::default()
        })
        .await
        .unwrap();

    let attic = storage.create_location("Attic").await.unwrap();
    let decorations = storage
        .create_box(&NewBox {
            location_id: attic.id,
            name: "Decorations".to_string(),
            code: 3,
            ..Default::default()
        })
        .await
        .unwrap();
    let star = fixture.save_image(5).await;
    storage
        .create_item(
            &NewItem::new("Star")
                .in_box(decorations.id)
                .with_images(vec![star]),
        )
        .await
        .unwrap();
}

async fn export(fixture: &Fixture) -> PathBuf {
    let migrator = fixture.migrator();
    migrator.start_export().unwrap();
    match migrator.export_result().await {
        ExportStatus::Finished(path) => path,
        other => panic!("export did not finish: {:?}", other),
    }
}

async fn import(fixture: &Fixture, archive: &Path) -> ImportStatus {
    let migrator = fixture.migrator();
    migrator.start_import(archive).unwrap();
    migrator.import_result().await
}

fn archive_names(dir: &Path) -> Vec<String> {
    std::fs::read_dir(dir)
        .unwrap()
        .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
        .filter(|name| name.starts_with("export_"))
        .collect()
}

#[tokio::test]
async fn test_export_then_import_reproduces_graph() {
    let source = Fixture::new().await;
    populate(&source).await;
    let archive = export(&source).await;

    assert!(archive.exists());
    assert!(!source.paths().export_dir.exists());

    let target = Fixture::new().await;
    let status = import(&target, &archive).await;

    let ImportStatus::Succeeded(summary) = status else {
        panic!("import failed: {:?}", status);
    };
    assert_eq!(summary.locations, 2);
    assert_eq!(summary.boxes, 3);
    assert_eq!(summary.items, 5);
    assert_eq!(summary.images, 5);
    assert_eq!(summary.last_box_code, Some(12));

    assert_eq!(graph(&target).await, graph(&source).await);

    let source_ids = source.storage.current_blob_ids_in_use().await.unwrap();
    let target_ids = target.storage.current_blob_ids_in_use().await.unwrap();
    assert_eq!(target_ids.len(), source_ids.len());
    assert!(target_ids.is_disjoint(&source_ids));
    assert_eq!(target.blobs_on_disk().await, target_ids);

    assert_eq!(target.storage.last_box_code().await.unwrap(), 12);
    assert_eq!(target.storage.next_box_code().await.unwrap(), 13);
    assert!(!target.paths().import_dir.exists());
}

#[tokio::test]
async fn test_importing_twice_never_collides() {
    let source = Fixture::new().await;
    populate(&source).await;
    let archive = export(&source).await;

    let target = Fixture::new().await;
    let existing = target.save_image(99).await;
    target
        .storage
        .create_item(&NewItem::new("Already here").with_images(vec![existing.clone()]))
        .await
        .unwrap();

    assert!(matches!(import(&target, &archive).await, ImportStatus::Succeeded(_)));
    let after_first = target.storage.current_blob_ids_in_use().await.unwrap();

    assert!(matches!(import(&target, &archive).await, ImportStatus::Succeeded(_)));
    let after_second = target.storage.current_blob_ids_in_use().await.unwrap();

    let first: HashSet<BlobId> = after_first
        .iter()
        .filter(|id| **id != existing)
        .cloned()
        .collect();
    let second: HashSet<BlobId> = after_second.difference(&after_first).cloned().collect();

    assert_eq!(first.len(), 5);
    assert_eq!(second.len(), 5);
    assert!(first.is_disjoint(&second));
    assert!(!second.contains(&existing));
    assert_eq!(target.blobs_on_disk().await, after_second);
    assert_eq!(target.storage.list_locations().await.unwrap().len(), 4);
}

#[tokio::test]
async fn test_shared_image_id_maps_once() {
    let source = Fixture::new().await;
    let shared = source.save_image(1).await;
    let location = source.storage.create_location("Hall").await.unwrap();
    let storage_box = source
        .storage
        .create_box(&NewBox {
            location_id: location.id,
            name: "Shoes".to_string(),
            code: 1,
            image_id: Some(shared.clone()),
            ..Default::default()
        })
        .await
        .unwrap();
    source
        .storage
        .create_item(&NewItem::new("Boots").in_box(storage_box.id).with_images(vec![shared.clone()]))
        .await
        .unwrap();
    source
        .storage
        .create_item(&NewItem::new("Umbrella").with_images(vec![shared]))
        .await
        .unwrap();
    let archive = export(&source).await;

    let target = Fixture::new().await;
    let ImportStatus::Succeeded(summary) = import(&target, &archive).await else {
        panic!("import failed");
    };

    assert_eq!(summary.images, 1);
    let ids = target.storage.current_blob_ids_in_use().await.unwrap();
    assert_eq!(ids.len(), 1);
    assert_eq!(target.blobs_on_disk().await, ids);
}

fn write_archive(path: &Path, files: &[(&str, Vec<u8>)]) {
    let mut zip = ZipWriter::new(std::fs::File::create(path).unwrap());
    for (name, body) in files {
        zip.start_file(*name, SimpleFileOptions::default()).unwrap();
        zip.write_all(body).unwrap();
    }
    zip.finish().unwrap();
}

#[tokio::test]
async fn test_import_with_missing_blob_leaves_nothing() {
    let target = Fixture::new().await;
    let existing = target.save_image(1).await;

    let present = BlobId::random();
    let missing = BlobId::random();
    let location = format!(
        r#"{{"name":"Cellar","boxes":[{{"name":"Jars","code":5,"imageUUID":"{}","items":[{{"name":"Jam","imageUUIDs":"{}"}}]}}]}}"#,
        present, missing
    );
    let archive = target.dir.path().join("broken.zip");
    write_archive(
        &archive,
        &[
            ("general_location.json", b"[]".to_vec()),
            ("location_0.json", location.into_bytes()),
            (present.file_name().as_str(), png(2)),
        ],
    );

    let status = import(&target, &archive).await;

    assert!(matches!(status, ImportStatus::Failed(_)));
    assert!(target.storage.list_locations().await.unwrap().is_empty());
    assert_eq!(target.storage.last_box_code().await.unwrap(), 0);
    assert_eq!(target.blobs_on_disk().await, HashSet::from([existing]));
    assert!(!target.paths().import_dir.exists());
}

#[tokio::test]
async fn test_import_ignores_ids_pointing_outside_archive() {
    let target = Fixture::new().await;
    // Sits next to the import staging directory
    std::fs::write(target.dir.path().join("outside.jpg"), png(3)).unwrap();

    let sneaky = format!("{}../outside", "./".repeat(13));
    let general = format!(r#"[{{"name":"Key","imageUUIDs":"{}"}}]"#, sneaky);
    let location =
        r#"{"name":"Shed","boxes":[{"name":"Tools","code":4,"imageUUID":"../outside"}]}"#;
    let archive = target.dir.path().join("crafted.zip");
    write_archive(
        &archive,
        &[
            ("general_location.json", general.into_bytes()),
            ("location_0.json", location.as_bytes().to_vec()),
        ],
    );

    let ImportStatus::Succeeded(summary) = import(&target, &archive).await else {
        panic!("import failed");
    };

    assert_eq!(summary.boxes, 1);
    assert_eq!(summary.images, 0);
    assert!(target.blobs_on_disk().await.is_empty());
    assert!(target.storage.current_blob_ids_in_use().await.unwrap().is_empty());
    let location = &target.storage.list_locations().await.unwrap()[0];
    let boxes = target.storage.list_boxes(location.id).await.unwrap();
    assert_eq!(boxes[0].image_id, None);
    let general = target.storage.list_general_items().await.unwrap();
    assert!(general[0].image_ids.is_empty());
}

#[tokio::test]
async fn test_import_of_corrupt_archive_fails() {
    let target = Fixture::new().await;
    let archive = target.dir.path().join("garbage.zip");
    std::fs::write(&archive, b"definitely not a zip file").unwrap();

    let status = import(&target, &archive).await;

    assert!(matches!(status, ImportStatus::Failed(_)));
    assert!(target.storage.list_general_items().await.unwrap().is_empty());
    assert!(!target.paths().import_dir.exists());
}

#[tokio::test]
async fn test_import_without_general_space_fails() {
    let target = Fixture::new().await;
    let archive = target.dir.path().join("partial.zip");
    write_archive(
        &archive,
        &[("location_0.json", br#"{"name":"Cellar","boxes":[]}"#.to_vec())],
    );

    let status = import(&target, &archive).await;

    assert_eq!(
        status,
        ImportStatus::Failed(MigrationError::MissingGeneralSpace.to_string())
    );
    assert!(target.storage.list_locations().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_second_export_is_rejected_while_running() {
    let fixture = Fixture::new().await;
    let migrator = fixture.migrator();

    migrator.start_export().unwrap();
    assert!(matches!(
        migrator.start_export(),
        Err(MigrationError::Busy("export"))
    ));

    assert!(matches!(migrator.export_result().await, ExportStatus::Finished(_)));
}

#[tokio::test]
async fn test_new_export_replaces_previous_archive() {
    let fixture = Fixture::new().await;
    populate(&fixture).await;

    let stale = fixture.dir.path().join("export_2000-01-01_00-00-00.zip");
    std::fs::write(&stale, b"old").unwrap();

    let archive = export(&fixture).await;

    assert!(!stale.exists());
    assert_eq!(
        archive_names(fixture.dir.path()),
        vec![archive.file_name().unwrap().to_string_lossy().into_owned()]
    );
}

#[tokio::test]
async fn test_discard_export_artifacts() {
    let fixture = Fixture::new().await;
    populate(&fixture).await;
    let migrator = fixture.migrator();

    // Nothing to discard yet
    migrator.discard_export_artifacts().await.unwrap();

    migrator.start_export().unwrap();
    let ExportStatus::Finished(archive) = migrator.export_result().await else {
        panic!("export failed");
    };
    migrator.discard_export_artifacts().await.unwrap();

    assert!(!archive.exists());
    assert!(archive_names(fixture.dir.path()).is_empty());
    assert_eq!(migrator.export_status(), ExportStatus::Idle);
    // Exporting never touches the live images
    assert_eq!(fixture.blobs_on_disk().await.len(), 5);
}

#[tokio::test]
async fn test_cancel_export_leaves_no_archive() {
    let fixture = Fixture::new().await;
    populate(&fixture).await;
    let migrator = fixture.migrator();

    migrator.start_export().unwrap();
    migrator.cancel_export().await.unwrap();

    assert_eq!(migrator.export_status(), ExportStatus::Idle);
    assert!(archive_names(fixture.dir.path()).is_empty());
    assert!(!fixture.paths().export_dir.exists());
}
