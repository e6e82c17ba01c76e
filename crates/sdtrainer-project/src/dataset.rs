//! Dataset folders and the materialized `dataset/` tree.

use crate::error::ProjectResult;
use crate::meta::{DatasetFolder, ProjectMeta};
use crate::preprocess::PreprocessItem;
use sdtrainer_common_fs::{copy_file, ensure_dir, file_name_string, is_image_file, remove_dir_all_if_exists, write_caption};
use std::path::Path;
use tracing::{debug, info, warn};

/// Whether a folder entry refers to `item`.
///
/// Entries are normally image names, but absolute paths are accepted as well.
pub fn references(entry: &str, item: &PreprocessItem) -> bool {
    entry == item.image_name || Path::new(entry) == item.image_path
}

/// Drop folder entries that do not refer to any of `items`.
pub fn prune_folders(meta: &mut ProjectMeta, items: &[PreprocessItem]) {
    for folder in &mut meta.dataset {
        let before = folder.images.len();
        folder
            .images
            .retain(|entry| items.iter().any(|item| references(entry, item)));
        if folder.images.len() != before {
            debug!(
                folder = %folder.name,
                removed = before - folder.images.len(),
                "pruned dangling dataset references"
            );
        }
    }
}

/// Remove every reference to one image (by hash, name, or path) from all folders.
pub fn remove_from_folders(meta: &mut ProjectMeta, hash: &str, name: &str, path: &Path) {
    for folder in &mut meta.dataset {
        folder
            .images
            .retain(|entry| entry != hash && entry != name && Path::new(entry) != path);
    }
}

/// Rebuild `out` from scratch: one `<step>_<name>` directory per folder holding copies
/// of its member images and their captions.
pub fn create_dataset(items: &[PreprocessItem], folders: &[DatasetFolder], out: &Path) -> ProjectResult<()> {
    remove_dir_all_if_exists(out)?;
    ensure_dir(out)?;
    for folder in folders {
        let folder_dir = out.join(folder.dir_name());
        ensure_dir(&folder_dir)?;
        let members = items
            .iter()
            .filter(|item| folder.images.iter().any(|entry| references(entry, item)));
        let mut count = 0usize;
        for item in members {
            let dest = folder_dir.join(file_name_string(&item.image_path));
            copy_file(&item.image_path, &dest)?;
            write_caption(&dest, &item.captions)?;
            count += 1;
        }
        debug!(folder = %folder.dir_name(), images = count, "materialized dataset folder");
    }
    info!(out = %out.display(), folders = folders.len(), "dataset created");
    Ok(())
}

/// Read an existing `<step>_<name>` tree back into folders.
///
/// A missing directory is created and yields no folders. Entries are absolute image paths.
pub fn load_dataset_dir(path: &Path) -> ProjectResult<Vec<DatasetFolder>> {
    if !path.exists() {
        ensure_dir(path)?;
        return Ok(Vec::new());
    }
    let mut folders = Vec::new();
    let mut entries: Vec<_> = std::fs::read_dir(path)?.collect::<Result<_, _>>()?;
    entries.sort_by_key(|e| e.file_name());
    for entry in entries {
        if !entry.file_type()?.is_dir() {
            continue;
        }
        let dir_name = entry.file_name().to_string_lossy().into_owned();
        let Some((step, name)) = parse_dir_name(&dir_name) else {
            warn!(dir = %dir_name, "skipping dataset folder without <step>_<name> form");
            continue;
        };
        let mut images: Vec<String> = std::fs::read_dir(entry.path())?
            .collect::<Result<Vec<_>, _>>()?
            .into_iter()
            .map(|e| e.path())
            .filter(|p| p.is_file() && is_image_file(p))
            .map(|p| p.display().to_string())
            .collect();
        images.sort();
        folders.push(DatasetFolder {
            name: name.to_string(),
            step,
            images,
        });
    }
    Ok(folders)
}

fn parse_dir_name(dir_name: &str) -> Option<(u32, &str)> {
    let (step, name) = dir_name.split_once('_')?;
    Some((step.parse().ok()?, name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use sdtrainer_test_utils::write_png;
    use std::path::PathBuf;

    fn item(dir: &Path, name: &str, captions: &[&str], seed: u8) -> PreprocessItem {
        let image_path = write_png(dir.join(name), 4, 4, seed);
        PreprocessItem {
            hash: format!("h{seed}"),
            image_name: name.to_string(),
            image_path,
            caption_path: None,
            captions: captions.iter().map(|s| s.to_string()).collect(),
            original_path: None,
            caption_history: None,
        }
    }

    #[test]
    fn test_references_by_name_or_path() {
        let it = PreprocessItem {
            hash: "h".into(),
            image_name: "p.png".into(),
            image_path: PathBuf::from("/proj/preprocess/p.png"),
            caption_path: None,
            captions: vec![],
            original_path: None,
            caption_history: None,
        };
        assert!(references("p.png", &it));
        assert!(references("/proj/preprocess/p.png", &it));
        assert!(!references("q.png", &it));
    }

    #[test]
    fn test_create_dataset_layout() {
        let dir = tempfile::tempdir().unwrap();
        let pre = dir.path().join("preprocess");
        let a = item(&pre, "a.png", &["1girl", "solo"], 1);
        let b = item(&pre, "b.png", &[], 2);
        let out = dir.path().join("dataset");
        std::fs::create_dir_all(out.join("stale")).unwrap();

        let folders = vec![
            DatasetFolder { name: "char".into(), step: 10, images: vec!["a.png".into()] },
            DatasetFolder {
                name: "bg".into(),
                step: 2,
                images: vec![b.image_path.display().to_string(), "a.png".into()],
            },
        ];
        create_dataset(&[a, b], &folders, &out).unwrap();

        assert!(!out.join("stale").exists());
        assert!(out.join("10_char/a.png").is_file());
        assert_eq!(std::fs::read_to_string(out.join("10_char/a.txt")).unwrap(), "1girl,solo");
        assert!(!out.join("10_char/b.png").exists());
        assert!(out.join("2_bg/a.png").is_file());
        assert!(out.join("2_bg/b.png").is_file());
    }

    #[test]
    fn test_load_dataset_dir_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("dataset");
        write_png(out.join("10_my_char").join("a.png"), 4, 4, 1);
        std::fs::write(out.join("10_my_char").join("a.txt"), "x").unwrap();
        std::fs::create_dir_all(out.join("notes")).unwrap();
        std::fs::write(out.join("readme.md"), "x").unwrap();

        let folders = load_dataset_dir(&out).unwrap();
        assert_eq!(folders.len(), 1);
        assert_eq!(folders[0].name, "my_char");
        assert_eq!(folders[0].step, 10);
        assert_eq!(folders[0].images.len(), 1);
        assert!(folders[0].images[0].ends_with("a.png"));
    }

    #[test]
    fn test_load_dataset_dir_creates_missing() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("nested").join("dataset");
        assert!(load_dataset_dir(&out).unwrap().is_empty());
        assert!(out.is_dir());
    }
}
