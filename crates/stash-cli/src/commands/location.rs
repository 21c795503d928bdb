use anyhow::Result;

use super::App;
use crate::cli::LocationCommands;

pub async fn handle(cmd: LocationCommands, app: &App) -> Result<()> {
    match cmd {
        LocationCommands::Add { name } => add(app, name).await,
        LocationCommands::List => list(app).await,
        LocationCommands::Rename { id, name } => rename(app, id, name).await,
        LocationCommands::Remove { id } => remove(app, id).await,
    }
}

async fn add(app: &App, name: String) -> Result<()> {
    let location = app.storage.create_location(&name).await?;

    println!("✓ Created location: {}", location.name);
    println!("  ID: {}", location.id);

    Ok(())
}

async fn list(app: &App) -> Result<()> {
    let locations = app.storage.list_locations().await?;
    let general = app.storage.list_general_items().await?;

    println!("General space: {} item(s)", general.len());

    if locations.is_empty() {
        println!("No locations found.");
        return Ok(());
    }

    println!("Locations:");
    for location in locations {
        let boxes = app.storage.list_boxes(location.id).await?;
        println!("  {} (ID {}): {} box(es)", location.name, location.id, boxes.len());
        for storage_box in boxes {
            println!("    {}  {}", storage_box.display_code(), storage_box.name);
        }
    }

    Ok(())
}

async fn rename(app: &App, id: i64, name: String) -> Result<()> {
    let location = app.storage.rename_location(id, &name).await?;
    println!("✓ Renamed location {} to {}", location.id, location.name);
    Ok(())
}

async fn remove(app: &App, id: i64) -> Result<()> {
    let location = app.storage.get_location(id).await?;
    let images = app.storage.delete_location(id).await?;
    app.store.delete(images.clone()).await;

    println!("✓ Deleted location: {}", location.name);
    if !images.is_empty() {
        println!("  Removed {} image(s)", images.len());
    }

    Ok(())
}
