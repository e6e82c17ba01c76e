//! Imported source images under `original/`.

use crate::error::{ProjectError, ProjectResult};
use crate::imaging::{make_thumbnail, THUMBNAIL_PREFIX};
use crate::layout::ProjectLayout;
use crate::meta::{OriginalItem, ProjectMeta};
use sdtrainer_common_fs::{copy_file, ensure_dir, file_name_string, hash_file, remove_file_if_exists};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};

/// An original image with absolute paths.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OriginalView {
    pub hash: String,
    pub src: PathBuf,
    #[serde(default)]
    pub file_name: String,
    pub thumbnail: PathBuf,
}

impl OriginalView {
    pub fn from_item(layout: &ProjectLayout, item: &OriginalItem) -> Self {
        Self {
            hash: item.hash.clone(),
            src: layout.original_dir().join(&item.src),
            file_name: item.src.clone(),
            thumbnail: layout.image_dir().join(&item.thumbnail),
        }
    }
}

/// Convert stored items to absolute paths.
pub fn to_views(layout: &ProjectLayout, items: &[OriginalItem]) -> Vec<OriginalView> {
    items.iter().map(|it| OriginalView::from_item(layout, it)).collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ImportStatus {
    Running,
    Done,
}

/// Progress of a batch import, reported once per file and once at the end.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportProgress {
    pub total: usize,
    pub current: usize,
    pub status: ImportStatus,
    pub path: String,
    pub name: String,
    pub imported_images: Vec<String>,
}

/// Copy `source` into `original/`, hash it and make a thumbnail.
///
/// Does not touch the metadata; see [`import_original`].
pub fn create_original(layout: &ProjectLayout, source: &Path) -> ProjectResult<OriginalItem> {
    if !source.is_file() {
        return Err(ProjectError::SourceNotFound {
            path: source.to_path_buf(),
        });
    }
    let name = file_name_string(source);
    let dest = layout.original_dir().join(&name);
    if dest != source {
        copy_file(source, &dest)?;
    }
    let hash = hash_file(&dest)?;

    ensure_dir(layout.image_dir())?;
    let thumbnail = format!("{THUMBNAIL_PREFIX}{name}");
    make_thumbnail(&dest, &layout.image_dir().join(&thumbnail))?;

    Ok(OriginalItem {
        hash,
        src: name,
        thumbnail,
    })
}

/// Import one file and record it, replacing any entry with the same content hash.
pub fn import_original(
    layout: &ProjectLayout,
    meta: &mut ProjectMeta,
    source: &Path,
) -> ProjectResult<OriginalItem> {
    let item = create_original(layout, source)?;
    upsert_original(meta, item.clone());
    Ok(item)
}

pub(crate) fn upsert_original(meta: &mut ProjectMeta, item: OriginalItem) {
    meta.original.retain(|it| it.hash != item.hash);
    meta.original.push(item);
}

/// Import a batch of files.
///
/// Files that fail to import are logged and skipped. `progress` sees every step.
pub fn import_originals(
    layout: &ProjectLayout,
    meta: &mut ProjectMeta,
    sources: &[PathBuf],
    mut progress: impl FnMut(&ImportProgress),
) -> Vec<OriginalView> {
    let mut status = ImportProgress {
        total: sources.len(),
        current: 0,
        status: ImportStatus::Running,
        path: String::new(),
        name: String::new(),
        imported_images: Vec::new(),
    };
    for source in sources {
        status.current += 1;
        status.path = source.display().to_string();
        status.name = file_name_string(source);
        progress(&status);

        match import_original(layout, meta, source) {
            Ok(item) => {
                debug!(hash = %item.hash, src = %item.src, "imported original image");
                status.imported_images.push(source.display().to_string());
            }
            Err(e) => error!(path = %source.display(), error = %e, "failed to import original image"),
        }
    }
    status.status = ImportStatus::Done;
    progress(&status);
    info!(
        total = status.total,
        imported = status.imported_images.len(),
        "original import finished"
    );
    to_views(layout, &meta.original)
}

/// Reconcile `original/` against the metadata.
///
/// Entries whose file is missing or whose content hash changed are dropped.
/// Files not backed by a valid entry are deleted. Returns the surviving entries.
pub fn reconcile_originals(layout: &ProjectLayout, meta: &mut ProjectMeta) -> ProjectResult<Vec<OriginalItem>> {
    let dir = layout.original_dir();
    ensure_dir(&dir)?;
    let files = list_file_names(&dir)?;

    let mut valid_files = HashSet::new();
    let mut invalid_hashes = HashSet::new();
    for item in &meta.original {
        if !files.contains(&item.src) {
            warn!(src = %item.src, "original image missing, dropping entry");
            invalid_hashes.insert(item.hash.clone());
            continue;
        }
        let actual = hash_file(dir.join(&item.src))?;
        if actual != item.hash {
            warn!(src = %item.src, "original image content changed, dropping entry");
            invalid_hashes.insert(item.hash.clone());
            continue;
        }
        valid_files.insert(item.src.clone());
    }
    meta.original.retain(|it| !invalid_hashes.contains(&it.hash));

    for file in files.iter().filter(|f| !valid_files.contains(*f)) {
        info!(file = %file, "removing untracked original file");
        remove_file_if_exists(dir.join(file))?;
    }
    Ok(meta.original.clone())
}

fn list_file_names(dir: &Path) -> ProjectResult<HashSet<String>> {
    let mut names = HashSet::new();
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        if entry.file_type()?.is_file() {
            names.insert(entry.file_name().to_string_lossy().into_owned());
        }
    }
    Ok(names)
}
