use clap::{Parser, Subcommand};
use serde::Serialize;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::codec::ResType;
use crate::config;
use crate::error::FileError;
use crate::identity::path::FileSpecifier;
use crate::identity::{replace_through, FileKind, Location};
use crate::loaded::LoadedResource;
use crate::opened_file::RawFile;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Clone, Debug)]
pub enum Commands {
    /// List every resource in a file's resource fork.
    #[command(alias = "l")]
    List {
        /// A bare fork, an AppleSingle/AppleDouble file or a MacBinary file.
        #[arg(required = true)]
        file: PathBuf,

        /// Print the listing as a JSON array.
        #[arg(long)]
        json: bool,
    },

    /// Copy one resource's bytes out to a file.
    #[command(alias = "g")]
    Get {
        #[arg(required = true)]
        file: PathBuf,

        /// Four-character type code, e.g. "snd ".
        kind: ResType,

        #[arg(allow_negative_numbers = true)]
        id: i16,

        /// Where to write the resource bytes.
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Resolve a relative path against the search path.
    Resolve {
        relative: String,

        /// Base directory to search, in order. Repeatable. Defaults to DUALFORK_SEARCH_PATH.
        #[arg(long = "search-path")]
        search_path: Vec<PathBuf>,
    },

    /// Print the file kind of a path.
    Kind {
        #[arg(required = true)]
        file: PathBuf,
    },
}

/// One row of `list --json`.
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct ListedResource {
    #[serde(rename = "type")]
    pub kind: String,
    pub id: i16,
    pub length: u32,
    pub name: Option<String>,
}

/// Parses command-line arguments using `clap` and returns the command to execute.
pub fn run() -> Result<Commands, Box<dyn std::error::Error>> {
    let args = Args::parse();
    Ok(args.command)
}

pub fn list_resources(file: &Path) -> Result<Vec<ListedResource>, FileError> {
    let forks = FileSpecifier::from(file).open_resource_file(false)?;
    let mut rows = Vec::new();
    for kind in forks.types() {
        for id in forks.ids(kind) {
            if let Some(entry) = forks.entry(kind, id) {
                rows.push(ListedResource { kind: kind.to_string(), id, length: entry.length, name: entry.name });
            }
        }
    }
    Ok(rows)
}

pub fn print_listing(rows: &[ListedResource], json: bool, out: &mut impl Write) -> Result<(), Box<dyn std::error::Error>> {
    if json {
        serde_json::to_writer_pretty(&mut *out, rows)?;
        writeln!(out)?;
        return Ok(());
    }
    for r in rows {
        writeln!(out, "'{}' {:>6} {:>10} {}", r.kind, r.id, r.length, r.name.as_deref().unwrap_or(""))?;
    }
    writeln!(out, "{} resource(s)", rows.len())?;
    Ok(())
}

/// Writes resource (`kind`, `id`) of `file` to `output`; returns the byte count.
/// `output` is replaced only once every byte is on disk.
pub fn extract_resource(file: &Path, kind: ResType, id: i16, output: &Path) -> Result<usize, FileError> {
    extract_resource_through(file, kind, id, output, |f| Box::new(f))
}

fn extract_resource_through<W>(file: &Path, kind: ResType, id: i16, output: &Path, wrap: W) -> Result<usize, FileError>
where
    W: FnOnce(File) -> Box<dyn RawFile>,
{
    let mut forks = FileSpecifier::from(file).open_resource_file(false)?;
    let mut loaded = LoadedResource::new();
    forks.get(kind, id, &mut loaded)?;
    let bytes = loaded.detach()?;
    replace_through(output, None, wrap, |out| out.write(&bytes))?;
    Ok(bytes.len())
}

pub fn resolve(relative: &str, search_path: &[PathBuf]) -> Result<FileSpecifier, FileError> {
    let search = if search_path.is_empty() { config::current().search_path } else { search_path.to_vec() };
    let mut spec = FileSpecifier::new();
    spec.set_name_with_path_in(relative, &search)?;
    Ok(spec)
}

pub fn kind_of(file: &Path) -> Option<FileKind> {
    FileSpecifier::from(file).get_type()
}
