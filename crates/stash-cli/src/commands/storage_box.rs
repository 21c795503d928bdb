use std::path::PathBuf;

use anyhow::Result;
use stash_core::{NewBox, StorageBox, format_box_code};
use stash_engine::validate_new_box_code;

use super::{App, ImageEdits, edit_images, print_images};
use crate::cli::BoxCommands;

pub async fn handle(cmd: BoxCommands, app: &App) -> Result<()> {
    match cmd {
        BoxCommands::Add {
            location,
            name,
            code,
            comment,
            image,
        } => add(app, location, name, code, comment, image).await,
        BoxCommands::Show { code } => show(app, code).await,
        BoxCommands::Remove { code, keep_items } => remove(app, code, keep_items).await,
        BoxCommands::CheckCode { code } => check_code(app, code).await,
        BoxCommands::Image { code, set, clear } => image(app, code, set, clear).await,
    }
}

async fn add(
    app: &App,
    location_id: i64,
    name: String,
    code: Option<String>,
    comment: Option<String>,
    image: Option<PathBuf>,
) -> Result<()> {
    // Fail early on a bad location rather than after storing the photo
    let location = app.storage.get_location(location_id).await?;
    let code = match code {
        Some(input) => validate_new_box_code(&app.storage, &input).await?,
        None => app.storage.next_box_code().await?,
    };

    let edits = ImageEdits {
        add: image.into_iter().collect(),
        ..Default::default()
    };
    let storage = &app.storage;
    let mut created = None;
    let slot = &mut created;
    edit_images(&app.store, Vec::new(), edits, |images| async move {
        let new_box = NewBox {
            location_id,
            name,
            code,
            comment,
            image_id: images.into_iter().next(),
        };
        *slot = Some(storage.create_box(&new_box).await?);
        Ok(())
    })
    .await?;

    if let Some(storage_box) = created {
        println!("✓ Created box {} in {}", storage_box.display_code(), location.name);
        println!("  Name: {}", storage_box.name);
    }

    Ok(())
}

async fn show(app: &App, code: String) -> Result<()> {
    let storage_box = app.find_box(&code).await?;
    let location = app.storage.get_location(storage_box.location_id).await?;
    let items = app.storage.list_items(storage_box.id).await?;

    println!("Box: {}", storage_box.display_code());
    println!("  Name: {}", storage_box.name);
    println!("  Location: {}", location.name);
    if let Some(comment) = &storage_box.comment {
        println!("  Comment: {}", comment);
    }
    print_images(storage_box.image_id.as_slice(), &app.store);

    if items.is_empty() {
        println!("  (empty)");
    } else {
        println!("  Items:");
        for item in items {
            println!("    #{} {} ({} image(s))", item.id, item.name, item.image_ids.len());
        }
    }

    Ok(())
}

async fn remove(app: &App, code: String, keep_items: bool) -> Result<()> {
    let storage_box = app.find_box(&code).await?;
    let images = app.storage.delete_box(storage_box.id, keep_items).await?;
    app.store.delete(images.clone()).await;

    println!("✓ Deleted box {}", storage_box.display_code());
    if keep_items {
        println!("  Items moved to the general space");
    }
    if !images.is_empty() {
        println!("  Removed {} image(s)", images.len());
    }

    Ok(())
}

async fn check_code(app: &App, code: String) -> Result<()> {
    let number = validate_new_box_code(&app.storage, &code).await?;
    println!("✓ {} is free", format_box_code(number));
    Ok(())
}

async fn image(app: &App, code: String, set: Option<PathBuf>, clear: bool) -> Result<()> {
    let storage_box = app.find_box(&code).await?;
    if set.is_none() && !clear {
        print_images(storage_box.image_id.as_slice(), &app.store);
        return Ok(());
    }

    // A box has at most one photo, so setting one replaces the old one
    let mut edits = ImageEdits::default();
    match (set, storage_box.image_id.clone()) {
        (Some(path), Some(old)) => edits.replace = Some((old, path)),
        (Some(path), None) => edits.add.push(path),
        (None, old) => edits.remove.extend(old),
    }
    let storage = &app.storage;
    let target = &storage_box;
    let images = edit_images(
        &app.store,
        storage_box.image_id.iter().cloned().collect(),
        edits,
        |images| async move {
            storage
                .update_box(target.id, &with_image(target, images.into_iter().next()))
                .await?;
            Ok(())
        },
    )
    .await?;

    println!("✓ Updated box {}", storage_box.display_code());
    print_images(&images, &app.store);
    Ok(())
}

fn with_image(storage_box: &StorageBox, image_id: Option<stash_core::BlobId>) -> NewBox {
    NewBox {
        location_id: storage_box.location_id,
        name: storage_box.name.clone(),
        code: storage_box.code,
        comment: storage_box.comment.clone(),
        image_id,
    }
}
