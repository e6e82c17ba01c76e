//! Derived training images under `preprocess/`.

use crate::dataset::{prune_folders, remove_from_folders};
use crate::error::{ProjectError, ProjectResult};
use crate::imaging::{decode_png_data_url, save_resized_png};
use crate::layout::ProjectLayout;
use crate::meta::{CaptionHistory, OriginalItem, PreprocessLink, ProjectMeta};
use crate::original::{create_original, upsert_original};
use sdtrainer_common_core::random_string;
use sdtrainer_common_fs::{
    caption_path, ensure_dir, file_name_string, hash_file, read_caption, remove_with_caption,
    scan_image_files, write_caption,
};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};

/// A preprocessed image as presented to callers, with absolute paths.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreprocessItem {
    pub hash: String,
    pub image_name: String,
    pub image_path: PathBuf,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub caption_path: Option<PathBuf>,
    #[serde(default)]
    pub captions: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_path: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub caption_history: Option<Vec<CaptionHistory>>,
}

/// A script output to link back to its source image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreprocessOutput {
    pub source: PathBuf,
    pub dest: PathBuf,
}

impl PreprocessOutput {
    pub fn new(source: impl Into<PathBuf>, dest: impl Into<PathBuf>) -> Self {
        Self {
            source: source.into(),
            dest: dest.into(),
        }
    }
}

fn build_item(
    layout: &ProjectLayout,
    link: &PreprocessLink,
    captions: Vec<String>,
    originals: &[OriginalItem],
) -> PreprocessItem {
    let image_path = layout.preprocess_dir().join(&link.dest);
    let caption = caption_path(&image_path);
    let original_path = link
        .src
        .as_ref()
        .and_then(|src| originals.iter().find(|o| &o.hash == src))
        .map(|o| layout.original_dir().join(&o.src));
    PreprocessItem {
        hash: link.hash.clone(),
        image_name: link.dest.clone(),
        caption_path: caption.is_file().then_some(caption),
        captions,
        original_path,
        caption_history: link.caption_history.clone(),
        image_path,
    }
}

/// Current preprocess entries with captions read from disk.
pub fn to_items(layout: &ProjectLayout, meta: &ProjectMeta) -> ProjectResult<Vec<PreprocessItem>> {
    meta.preprocess
        .iter()
        .map(|link| {
            let captions = read_caption(layout.preprocess_dir().join(&link.dest))?;
            Ok(build_item(layout, link, captions, &meta.original))
        })
        .collect()
}

/// Record script outputs, creating the original entry when its source is new.
///
/// A link with the same destination name is replaced. Outputs that cannot be
/// hashed or imported are logged and skipped. Returns the links added.
pub fn link_outputs(
    layout: &ProjectLayout,
    meta: &mut ProjectMeta,
    outputs: &[PreprocessOutput],
) -> Vec<PreprocessLink> {
    let mut added = Vec::new();
    for output in outputs {
        match link_output(layout, meta, output) {
            Ok(link) => added.push(link),
            Err(e) => error!(
                source = %output.source.display(),
                dest = %output.dest.display(),
                error = %e,
                "failed to link preprocess output"
            ),
        }
    }
    added
}

fn link_output(
    layout: &ProjectLayout,
    meta: &mut ProjectMeta,
    output: &PreprocessOutput,
) -> ProjectResult<PreprocessLink> {
    let source_hash = hash_file(&output.source)?;
    let original = match meta.original.iter().find(|o| o.hash == source_hash) {
        Some(existing) => existing.clone(),
        None => create_original(layout, &output.source)?,
    };
    let original_hash = original.hash.clone();
    upsert_original(meta, original);

    let dest = file_name_string(&output.dest);
    meta.preprocess.retain(|link| link.dest != dest);
    let link = PreprocessLink {
        hash: hash_file(&output.dest)?,
        src: Some(original_hash),
        dest,
        caption_history: None,
    };
    meta.preprocess.push(link.clone());
    debug!(dest = %link.dest, src = ?link.src, "linked preprocess output");
    Ok(link)
}

/// Reconcile `preprocess/` against the metadata.
///
/// A link survives only if its file exists, its content hash matches, and its
/// `src` names one of `originals`. Files without a surviving link are deleted with
/// their captions, and dataset folders lose references to anything that did not survive.
pub fn reconcile_preprocess(
    layout: &ProjectLayout,
    meta: &mut ProjectMeta,
    originals: &[OriginalItem],
) -> ProjectResult<Vec<PreprocessItem>> {
    let dir = layout.preprocess_dir();
    ensure_dir(&dir)?;
    let scanned = scan_image_files(&dir)?;
    let original_hashes: HashSet<&str> = originals.iter().map(|o| o.hash.as_str()).collect();

    let mut valid_links = Vec::new();
    let mut items = Vec::new();
    for link in &meta.preprocess {
        let Some(file) = scanned.iter().find(|f| f.name == link.dest) else {
            warn!(dest = %link.dest, "preprocess image missing, dropping entry");
            continue;
        };
        if hash_file(&file.path)? != link.hash {
            warn!(dest = %link.dest, "preprocess image content changed, dropping entry");
            continue;
        }
        if !link.src.as_deref().is_some_and(|src| original_hashes.contains(src)) {
            warn!(dest = %link.dest, "preprocess image has no original, dropping entry");
            continue;
        }
        items.push(build_item(layout, link, file.captions.clone(), originals));
        valid_links.push(link.clone());
    }
    meta.preprocess = valid_links;

    let kept: HashSet<&str> = meta.preprocess.iter().map(|l| l.dest.as_str()).collect();
    for file in scanned.iter().filter(|f| !kept.contains(f.name.as_str())) {
        info!(file = %file.name, "removing untracked preprocess image");
        remove_with_caption(&file.path)?;
    }

    prune_folders(meta, &items);
    Ok(items)
}

/// Delete preprocess entries by hash, with their files and every dataset reference.
///
/// Originals are left alone. Returns the hashes actually deleted.
pub fn delete_preprocess(
    layout: &ProjectLayout,
    meta: &mut ProjectMeta,
    hashes: &[String],
) -> ProjectResult<Vec<String>> {
    let mut deleted = Vec::new();
    for hash in hashes {
        let Some(pos) = meta.preprocess.iter().position(|l| &l.hash == hash) else {
            warn!(hash = %hash, "preprocess image not found");
            continue;
        };
        let link = meta.preprocess.remove(pos);
        let image_path = layout.preprocess_dir().join(&link.dest);
        remove_from_folders(meta, &link.hash, &link.dest, &image_path);
        remove_with_caption(&image_path)?;
        deleted.push(link.hash);
    }
    Ok(deleted)
}

/// Merge tagger suggestions into the history of the image named `file_name`.
///
/// An entry with the same tag name and tagger is replaced. Returns the new
/// history, or `None` when no entry has that name.
pub fn merge_caption_history(
    meta: &mut ProjectMeta,
    file_name: &str,
    history: Vec<CaptionHistory>,
) -> Option<Vec<CaptionHistory>> {
    let link = meta.preprocess.iter_mut().find(|l| l.dest == file_name)?;
    let merged = link.caption_history.get_or_insert_with(Vec::new);
    for item in history {
        merged.retain(|h| h.name != item.name || h.tagger_id != item.tagger_id);
        merged.push(item);
    }
    Some(merged.clone())
}

/// Save a PNG data URL as a new preprocess image derived from `original/<source_file_name>`.
///
/// The image is resized to the project resolution and gets an empty caption file.
pub fn create_from_data_url(
    layout: &ProjectLayout,
    meta: &mut ProjectMeta,
    data_url: &str,
    source_file_name: &str,
) -> ProjectResult<PreprocessItem> {
    let img = decode_png_data_url(data_url)?;
    let source = layout.original_dir().join(source_file_name);
    if !source.is_file() {
        return Err(ProjectError::SourceNotFound { path: source });
    }
    let source_hash = hash_file(&source)?;

    let dir = layout.preprocess_dir();
    ensure_dir(&dir)?;
    let save_path = unique_output_path(&dir, &source_hash);
    save_resized_png(&img, meta.params.width, meta.params.height, &save_path)?;
    let caption = write_caption(&save_path, &[])?;

    let link = link_output(layout, meta, &PreprocessOutput::new(&source, &save_path))?;
    Ok(PreprocessItem {
        hash: link.hash,
        image_name: link.dest,
        image_path: save_path,
        caption_path: Some(caption),
        captions: Vec::new(),
        original_path: Some(source),
        caption_history: None,
    })
}

fn unique_output_path(dir: &Path, source_hash: &str) -> PathBuf {
    loop {
        let candidate = dir.join(format!("{}_{}.png", random_string(4), source_hash));
        if !candidate.exists() {
            return candidate;
        }
    }
}
