use std::path::PathBuf;

use anyhow::{Result, bail};
use stash_engine::{ExportStatus, ImportStatus};
use tracing::info;

use super::App;

pub async fn export(app: &App, output: Option<PathBuf>) -> Result<()> {
    let migrator = &app.migrator;
    migrator.start_export()?;

    let status = tokio::select! {
        status = migrator.export_result() => status,
        _ = tokio::signal::ctrl_c() => {
            info!("Interrupted, cancelling export");
            migrator.cancel_export().await?;
            bail!("Export cancelled");
        }
    };

    let archive = match status {
        ExportStatus::Finished(archive) => archive,
        ExportStatus::Failed(reason) => bail!("Export failed: {}", reason),
        other => bail!("Export ended in unexpected state: {:?}", other),
    };

    match output {
        Some(output) => {
            tokio::fs::copy(&archive, &output).await?;
            migrator.discard_export_artifacts().await?;
            println!("✓ Exported to {}", output.display());
        }
        None => {
            println!("✓ Exported to {}", archive.display());
            println!("  Run `stash discard-export` once it has been copied elsewhere");
        }
    }

    Ok(())
}

pub async fn import(app: &App, archive: PathBuf) -> Result<()> {
    if !archive.is_file() {
        bail!("Archive not found: {}", archive.display());
    }

    app.migrator.start_import(&archive)?;
    match app.migrator.import_result().await {
        ImportStatus::Succeeded(summary) => {
            println!("✓ Imported {}", archive.display());
            println!("  Locations: {}", summary.locations);
            println!("  Boxes: {}", summary.boxes);
            println!("  Items: {}", summary.items);
            println!("  Images: {}", summary.images);
            if let Some(code) = summary.last_box_code {
                println!("  Next box number: {}", code + 1);
            }
            Ok(())
        }
        ImportStatus::Failed(reason) => bail!("Import failed: {}", reason),
        other => bail!("Import ended in unexpected state: {:?}", other),
    }
}

pub async fn discard(app: &App) -> Result<()> {
    app.migrator.discard_export_artifacts().await?;
    println!("✓ Export files removed");
    Ok(())
}
