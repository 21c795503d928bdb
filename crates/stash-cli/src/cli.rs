use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "stash")]
#[command(about = "Home inventory: locations, boxes, items and their photos", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Data directory (overrides the config file)
    #[arg(long, global = true, env = "STASH_DATA_DIR")]
    pub data_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Manage locations
    #[command(subcommand)]
    Location(LocationCommands),

    /// Manage boxes
    #[command(subcommand)]
    Box(BoxCommands),

    /// Manage items
    #[command(subcommand)]
    Item(ItemCommands),

    /// Export everything into one zip archive
    Export {
        /// Copy the finished archive here
        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// Import an archive produced by `export`
    Import {
        /// Path to the archive
        archive: PathBuf,
    },

    /// Remove export staging files and exported archives
    DiscardExport,

    /// Delete images no box or item refers to
    Reconcile,
}

#[derive(Subcommand)]
pub enum LocationCommands {
    /// Create a location
    Add {
        /// Name of the location
        name: String,
    },

    /// List locations with their boxes
    List,

    /// Rename a location
    Rename {
        /// Location ID
        id: i64,

        /// New name
        name: String,
    },

    /// Delete a location with all its boxes and items
    Remove {
        /// Location ID
        id: i64,
    },
}

#[derive(Subcommand)]
pub enum BoxCommands {
    /// Create a box
    Add {
        /// Location ID
        location: i64,

        /// Name of the box
        name: String,

        /// Box code, e.g. S-00000042 (default: next free number)
        #[arg(long)]
        code: Option<String>,

        #[arg(long)]
        comment: Option<String>,

        /// Photo of the box
        #[arg(long)]
        image: Option<PathBuf>,
    },

    /// Show a box and its items
    Show {
        /// Box code, e.g. S-00000042
        code: String,
    },

    /// Delete a box
    Remove {
        /// Box code
        code: String,

        /// Move the items to the general space instead of deleting them
        #[arg(long)]
        keep_items: bool,
    },

    /// Check whether a code can be used for a new box
    CheckCode {
        /// Box code as typed or scanned
        code: String,
    },

    /// Replace or clear the photo of a box
    Image {
        /// Box code
        code: String,

        /// New photo
        #[arg(long, conflicts_with = "clear")]
        set: Option<PathBuf>,

        /// Remove the photo
        #[arg(long)]
        clear: bool,
    },
}

#[derive(Subcommand)]
pub enum ItemCommands {
    /// Create an item
    Add {
        /// Name of the item
        name: String,

        /// Code of the box holding it (default: general space)
        #[arg(long = "box")]
        box_code: Option<String>,

        #[arg(long)]
        comment: Option<String>,

        #[arg(long)]
        keywords: Option<String>,

        #[arg(long)]
        barcode: Option<String>,

        /// Photos of the item
        #[arg(long = "image")]
        images: Vec<PathBuf>,
    },

    /// Show an item
    Show {
        /// Item ID
        id: i64,
    },

    /// List items of a box, or of the general space
    List {
        /// Box code
        #[arg(long = "box")]
        box_code: Option<String>,
    },

    /// Delete an item and its photos
    Remove {
        /// Item ID
        id: i64,
    },

    /// Edit the photos of an item
    Images {
        /// Item ID
        id: i64,

        /// Photos to add
        #[arg(long)]
        add: Vec<PathBuf>,

        /// Image IDs to remove
        #[arg(long)]
        remove: Vec<String>,

        /// Move the image at FROM so it lands before the image at TO
        #[arg(long, num_args = 2, value_names = ["FROM", "TO"])]
        reorder: Option<Vec<usize>>,
    },
}
