use std::path::PathBuf;

use anyhow::{Result, bail};
use stash_core::{BlobId, Item, NewItem};

use super::{App, ImageEdits, edit_images, print_images};
use crate::cli::ItemCommands;

pub async fn handle(cmd: ItemCommands, app: &App) -> Result<()> {
    match cmd {
        ItemCommands::Add {
            name,
            box_code,
            comment,
            keywords,
            barcode,
            images,
        } => {
            let item = NewItem {
                name,
                comment,
                keywords,
                barcode,
                ..Default::default()
            };
            add(app, item, box_code, images).await
        }
        ItemCommands::Show { id } => show(app, id).await,
        ItemCommands::List { box_code } => list(app, box_code).await,
        ItemCommands::Remove { id } => remove(app, id).await,
        ItemCommands::Images {
            id,
            add,
            remove,
            reorder,
        } => {
            let reorder = match reorder.as_deref() {
                None => None,
                Some([from, to]) => Some((*from, *to)),
                Some(_) => bail!("--reorder takes exactly two indexes"),
            };
            let edits = ImageEdits {
                add,
                remove: remove.into_iter().map(BlobId::from).collect(),
                replace: None,
                reorder,
            };
            images(app, id, edits).await
        }
    }
}

async fn add(app: &App, mut item: NewItem, box_code: Option<String>, images: Vec<PathBuf>) -> Result<()> {
    let place = match box_code {
        Some(code) => {
            let storage_box = app.find_box(&code).await?;
            item.box_id = Some(storage_box.id);
            format!("box {}", storage_box.display_code())
        }
        None => "the general space".to_string(),
    };

    let edits = ImageEdits {
        add: images,
        ..Default::default()
    };
    let storage = &app.storage;
    let mut created = None;
    let slot = &mut created;
    edit_images(&app.store, Vec::new(), edits, |images| async move {
        item.image_ids = images;
        *slot = Some(storage.create_item(&item).await?);
        Ok(())
    })
    .await?;

    if let Some(item) = created {
        println!("✓ Created item: {}", item.name);
        println!("  ID: {}", item.id);
        println!("  In {}", place);
        println!("  Images: {}", item.image_ids.len());
    }

    Ok(())
}

async fn show(app: &App, id: i64) -> Result<()> {
    let item = app.storage.get_item(id).await?;

    println!("Item: {}", item.name);
    println!("  ID: {}", item.id);
    match item.box_id {
        Some(box_id) => {
            let storage_box = app.storage.get_box(box_id).await?;
            println!("  Box: {} ({})", storage_box.display_code(), storage_box.name);
        }
        None => println!("  Box: none (general space)"),
    }
    if let Some(comment) = &item.comment {
        println!("  Comment: {}", comment);
    }
    if let Some(keywords) = &item.keywords {
        println!("  Keywords: {}", keywords);
    }
    if let Some(barcode) = &item.barcode {
        println!("  Barcode: {}", barcode);
    }
    print_images(&item.image_ids, &app.store);

    Ok(())
}

async fn list(app: &App, box_code: Option<String>) -> Result<()> {
    let items = match box_code {
        Some(code) => {
            let storage_box = app.find_box(&code).await?;
            app.storage.list_items(storage_box.id).await?
        }
        None => app.storage.list_general_items().await?,
    };

    if items.is_empty() {
        println!("No items found.");
        return Ok(());
    }

    println!("Items:");
    for item in items {
        println!("  #{} {} ({} image(s))", item.id, item.name, item.image_ids.len());
    }

    Ok(())
}

async fn remove(app: &App, id: i64) -> Result<()> {
    let item = app.storage.get_item(id).await?;
    let images = app.storage.delete_item(id).await?;
    app.store.delete(images).await;

    println!("✓ Deleted item: {}", item.name);
    Ok(())
}

async fn images(app: &App, id: i64, edits: ImageEdits) -> Result<()> {
    let item = app.storage.get_item(id).await?;
    let storage = &app.storage;
    let target = &item;

    let images = edit_images(&app.store, item.image_ids.clone(), edits, |images| async move {
        storage.update_item(target.id, &with_images(target, images)).await?;
        Ok(())
    })
    .await?;

    println!("✓ Updated images of {}", item.name);
    print_images(&images, &app.store);
    Ok(())
}

fn with_images(item: &Item, image_ids: Vec<BlobId>) -> NewItem {
    NewItem {
        box_id: item.box_id,
        name: item.name.clone(),
        comment: item.comment.clone(),
        keywords: item.keywords.clone(),
        barcode: item.barcode.clone(),
        image_ids,
    }
}
