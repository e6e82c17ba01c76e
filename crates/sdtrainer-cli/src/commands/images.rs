//! Image pipeline commands: import, preprocess, caption, segment.

use std::path::PathBuf;

use base64::Engine;
use clap::{Parser, ValueEnum, ValueHint};
use sdtrainer_common_fs::scan_image_files;
use sdtrainer_project::PreprocessItem;
use sdtrainer_runner::args::{CaptionConfig, PreprocessConfig, Tagger};
use sdtrainer_runner::TaskKind;
use sdtrainer_service::select_backend;
use tracing::{debug, info};

use super::{check_exit, run_task};
use crate::cli::CommandContext;
use crate::error::CliError;
use crate::output::{print_output, EventPrinter};

/// Expand directories into the images directly inside them.
fn expand_images(paths: &[PathBuf]) -> Result<Vec<PathBuf>, CliError> {
    let mut files = Vec::new();
    for path in paths {
        if path.is_dir() {
            files.extend(scan_image_files(path)?.into_iter().map(|image| image.path));
        } else if path.is_file() {
            files.push(path.clone());
        } else {
            return Err(CliError::not_found("image", path.display().to_string()));
        }
    }
    Ok(files)
}

/// Items whose hash is in `hashes`, or all of them when none are given.
fn select_items(items: Vec<PreprocessItem>, hashes: &[String]) -> Result<Vec<PreprocessItem>, CliError> {
    if hashes.is_empty() {
        return Ok(items);
    }
    if let Some(missing) = hashes.iter().find(|h| !items.iter().any(|item| &item.hash == *h)) {
        return Err(CliError::not_found("preprocess image", missing.clone()));
    }
    Ok(items.into_iter().filter(|item| hashes.contains(&item.hash)).collect())
}

/// Import original images into the project
#[derive(Debug, Parser)]
pub struct ImportCommand {
    /// Image files or directories of images
    #[arg(required = true, value_hint = ValueHint::AnyPath)]
    paths: Vec<PathBuf>,
}

impl ImportCommand {
    pub async fn execute(&self, ctx: &CommandContext) -> Result<(), CliError> {
        ctx.open_project().await?;
        let sources = expand_images(&self.paths)?;
        if sources.is_empty() {
            return Err(CliError::validation("no images to import"));
        }
        info!(count = sources.len(), "importing images");
        let printer = EventPrinter::start(ctx.app.bus(), ctx.format);
        let imported = ctx.app.import_images(sources).await;
        printer.finish().await;
        print_output(ctx, imported?.as_slice())
    }
}

/// Delete preprocessed images by hash
#[derive(Debug, Parser)]
pub struct DeleteImagesCommand {
    /// Hashes of the images to delete
    #[arg(required = true)]
    hashes: Vec<String>,
}

impl DeleteImagesCommand {
    pub async fn execute(&self, ctx: &CommandContext) -> Result<(), CliError> {
        ctx.open_project().await?;
        let removed = ctx.app.delete_preprocess_images(self.hashes.clone()).await?;
        print_output(ctx, &serde_json::json!(removed))
    }
}

/// Add a hand-cropped PNG as a preprocessed image of an original
#[derive(Debug, Parser)]
pub struct CropCommand {
    /// Cropped PNG image
    #[arg(value_hint = ValueHint::FilePath)]
    image: PathBuf,

    /// File name of the original under `original/` the crop was taken from
    #[arg(long)]
    original: String,
}

impl CropCommand {
    pub async fn execute(&self, ctx: &CommandContext) -> Result<(), CliError> {
        ctx.open_project().await?;
        let bytes = std::fs::read(&self.image)?;
        let data_url = format!(
            "data:image/png;base64,{}",
            base64::engine::general_purpose::STANDARD.encode(bytes)
        );
        let item = ctx.app.save_preprocess_image(data_url, self.original.clone()).await?;
        info!(hash = %item.hash, "crop saved");
        print_output(ctx, std::slice::from_ref(&item))
    }
}

/// Tagger run by `--caption` during preprocessing
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum PreprocessCaption {
    Deepbooru,
    Clip,
    Clip2,
    Blip,
    Wd,
}

/// Crop and resize originals with the preprocess script
#[derive(Debug, Parser)]
pub struct PreprocessCommand {
    /// Read the full preprocess options from a JSON file
    #[arg(long, value_hint = ValueHint::FilePath, conflicts_with_all = ["files", "folders"])]
    config: Option<PathBuf>,

    /// Image files to preprocess; defaults to every original image
    #[arg(long, num_args = 1.., value_hint = ValueHint::FilePath)]
    files: Vec<PathBuf>,

    /// Folders of images to preprocess
    #[arg(long, num_args = 1.., value_hint = ValueHint::DirPath)]
    folders: Vec<PathBuf>,

    /// Output folder; defaults to the project's preprocess folder
    #[arg(long, value_hint = ValueHint::DirPath)]
    dest: Option<PathBuf>,

    /// Output width; defaults to the project resolution
    #[arg(long)]
    width: Option<u32>,

    /// Output height; defaults to the project resolution
    #[arg(long)]
    height: Option<u32>,

    /// Caption outputs while preprocessing
    #[arg(long, value_enum)]
    caption: Vec<PreprocessCaption>,

    /// WD14 tag threshold
    #[arg(long)]
    wd_threshold: Option<f64>,

    /// WD14 model name
    #[arg(long)]
    wd_model: Option<String>,

    /// Also write horizontally flipped copies
    #[arg(long)]
    flip: bool,

    /// Crop around detected faces
    #[arg(long)]
    face_focus: bool,

    /// Crop around anime faces, keeping this ratio of the frame
    #[arg(long, value_name = "RATIO")]
    anime_face: Option<f64>,

    /// Crop around anime bodies, keeping this ratio of the frame
    #[arg(long, value_name = "RATIO")]
    anime_body: Option<f64>,

    /// Crop around anime half bodies, keeping this ratio of the frame
    #[arg(long, value_name = "RATIO")]
    anime_half_body: Option<f64>,

    /// Align body crops to the top of the body
    #[arg(long)]
    focus_to_top: bool,
}

impl PreprocessCommand {
    fn build_config(&self, originals: Vec<PathBuf>) -> Result<PreprocessConfig, CliError> {
        if let Some(path) = &self.config {
            let raw = std::fs::read_to_string(path)?;
            return Ok(serde_json::from_str(&raw)?);
        }

        let mut config = PreprocessConfig {
            dest_path: self.dest.clone().unwrap_or_default(),
            width: self.width,
            height: self.height,
            wd_general_threshold: self.wd_threshold,
            wd_model_name: self.wd_model.clone(),
            flip: self.flip,
            face_focus: self.face_focus,
            focus_to_top: self.focus_to_top,
            ..Default::default()
        };
        if !self.folders.is_empty() {
            config.folders = Some(self.folders.clone());
        }
        if !self.files.is_empty() {
            config.files = Some(self.files.clone());
        } else if self.folders.is_empty() {
            config.files = Some(originals);
        }
        for caption in &self.caption {
            match caption {
                PreprocessCaption::Deepbooru => config.danbooru_caption = true,
                PreprocessCaption::Clip => config.clip_caption = true,
                PreprocessCaption::Clip2 => config.clip2_caption = true,
                PreprocessCaption::Blip => config.blip_caption = true,
                PreprocessCaption::Wd => config.wd_caption = true,
            }
        }
        if let Some(ratio) = self.anime_face {
            config.focus_anime_face = true;
            config.focus_anime_face_ratio = ratio;
        }
        if let Some(ratio) = self.anime_body {
            config.focus_anime_body = true;
            config.focus_anime_body_ratio = ratio;
        }
        if let Some(ratio) = self.anime_half_body {
            config.focus_anime_half_body = true;
            config.focus_anime_half_body_ratio = ratio;
        }
        Ok(config)
    }

    pub async fn execute(&self, ctx: &CommandContext) -> Result<(), CliError> {
        let backend = select_backend(ctx.app.clone())?;
        let view = backend
            .load_project(&ctx.project_dir()?.display().to_string())
            .await?;
        let originals = view.original.iter().map(|o| o.src.clone()).collect();
        let config = self.build_config(originals)?;
        if config.files.as_ref().is_some_and(Vec::is_empty) && config.folders.is_none() {
            return Err(CliError::validation("no images to preprocess; import some first"));
        }
        debug!(?config, "preprocess config");
        run_task(ctx, TaskKind::Preprocess, backend.make_preprocess(config)).await?;
        if !ctx.is_json() {
            let items = ctx.app.preprocess_items().await.unwrap_or_default();
            println!("{} preprocessed images", items.len());
        }
        Ok(())
    }
}

/// Tagging model
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum TaggerArg {
    Deepbooru,
    Clip,
    Clip2,
    Blip,
    Wd14,
}

impl From<TaggerArg> for Tagger {
    fn from(arg: TaggerArg) -> Self {
        match arg {
            TaggerArg::Deepbooru => Tagger::Deepbooru,
            TaggerArg::Clip => Tagger::Clip,
            TaggerArg::Clip2 => Tagger::Clip2,
            TaggerArg::Blip => Tagger::Blip,
            TaggerArg::Wd14 => Tagger::Wd14,
        }
    }
}

/// Tag preprocessed images
#[derive(Debug, Parser)]
pub struct CaptionCommand {
    /// Tagger to run
    #[arg(long, value_enum, default_value = "deepbooru")]
    tagger: TaggerArg,

    /// Label recorded in the caption history; defaults to the tagger name
    #[arg(long)]
    tagger_id: Option<String>,

    /// Deepbooru tag threshold
    #[arg(long)]
    threshold: Option<f64>,

    /// WD14 tag threshold
    #[arg(long)]
    general_threshold: Option<f64>,

    /// WD14 model name
    #[arg(long)]
    model: Option<String>,

    /// Hashes of the images to caption; defaults to all
    hashes: Vec<String>,
}

impl CaptionCommand {
    fn config(&self, image_paths: Vec<PathBuf>) -> CaptionConfig {
        let tagger = Tagger::from(self.tagger);
        let tagger_id = self.tagger_id.clone().unwrap_or_else(|| {
            self.tagger
                .to_possible_value()
                .map(|v| v.get_name().to_string())
                .unwrap_or_default()
        });
        CaptionConfig {
            image_paths,
            tagger,
            tagger_id,
            threshold: self.threshold,
            general_threshold: self.general_threshold,
            model: self.model.clone(),
        }
    }

    pub async fn execute(&self, ctx: &CommandContext) -> Result<(), CliError> {
        ctx.open_project().await?;
        let items = select_items(ctx.app.preprocess_items().await?, &self.hashes)?;
        if items.is_empty() {
            return Err(CliError::validation("no preprocessed images to caption"));
        }
        let config = self.config(items.iter().map(|item| item.image_path.clone()).collect());
        let exit = run_task(ctx, TaskKind::Caption, ctx.app.make_caption(config)).await?;
        check_exit(&exit)
    }
}

/// Cut characters out of preprocessed images
#[derive(Debug, Parser)]
pub struct SegmentCommand {
    /// Hashes of the images to segment; defaults to all
    hashes: Vec<String>,
}

impl SegmentCommand {
    pub async fn execute(&self, ctx: &CommandContext) -> Result<(), CliError> {
        ctx.open_project().await?;
        let items = select_items(ctx.app.preprocess_items().await?, &self.hashes)?;
        if items.is_empty() {
            return Err(CliError::validation("no preprocessed images to segment"));
        }
        let exit = run_task(ctx, TaskKind::Segment, ctx.app.segment_characters(items)).await?;
        check_exit(&exit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(hash: &str) -> PreprocessItem {
        PreprocessItem {
            hash: hash.to_string(),
            image_name: format!("{hash}.png"),
            image_path: PathBuf::from(format!("/p/{hash}.png")),
            caption_path: None,
            captions: Vec::new(),
            original_path: None,
            caption_history: None,
        }
    }

    #[test]
    fn test_select_items() {
        let items = vec![item("a"), item("b")];
        assert_eq!(select_items(items.clone(), &[]).unwrap().len(), 2);
        let picked = select_items(items.clone(), &["b".to_string()]).unwrap();
        assert_eq!(picked[0].hash, "b");
        assert!(matches!(
            select_items(items, &["zz".to_string()]),
            Err(CliError::NotFound { .. })
        ));
    }

    #[test]
    fn test_preprocess_flags() {
        let cmd = PreprocessCommand::try_parse_from([
            "preprocess",
            "--caption",
            "wd",
            "--caption",
            "blip",
            "--anime-face",
            "1.5",
            "--flip",
        ])
        .unwrap();
        let config = cmd.build_config(vec![PathBuf::from("/o/a.png")]).unwrap();
        assert!(config.wd_caption && config.blip_caption && !config.clip_caption);
        assert!(config.focus_anime_face);
        assert_eq!(config.focus_anime_face_ratio, 1.5);
        assert_eq!(config.files, Some(vec![PathBuf::from("/o/a.png")]));
        assert!(config.dest_path.as_os_str().is_empty());
    }

    #[test]
    fn test_caption_tagger_id_defaults_to_name() {
        let cmd = CaptionCommand::try_parse_from(["caption", "--tagger", "wd14"]).unwrap();
        let config = cmd.config(Vec::new());
        assert_eq!(config.tagger, Tagger::Wd14);
        assert_eq!(config.tagger_id, "wd14");
    }
}
