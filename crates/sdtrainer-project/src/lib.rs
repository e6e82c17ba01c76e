//! Project metadata for sdtrainer.
//!
//! A project is a directory holding `project.json` plus working folders for
//! original images, preprocessed images, the materialized dataset, and model
//! output. The metadata is the source of truth: every load reconciles the
//! folders against it, dropping entries whose files vanished or changed and
//! deleting files no entry accounts for. Image identity is the SHA-256 of the
//! file content.
//!
//! All access to `project.json` goes through a [`ProjectStore`], which runs
//! read-modify-write jobs one at a time.

pub mod dataset;
pub mod error;
pub mod imaging;
pub mod layout;
pub mod meta;
pub mod models;
pub mod original;
pub mod preprocess;
pub mod project;
pub mod store;

pub use dataset::{create_dataset, load_dataset_dir};
pub use error::{ProjectError, ProjectResult};
pub use layout::ProjectLayout;
pub use meta::{
    CaptionHistory, DatasetFolder, OriginalItem, PreprocessLink, ProjectMeta, ProjectMetaPatch, ProjectParam,
    SaveModel, SaveModelPreview, TrainConfig, DEFAULT_RESOLUTION,
};
pub use models::{export_model, LoraModel, LoraPreview};
pub use original::{ImportProgress, ImportStatus, OriginalView};
pub use preprocess::{PreprocessItem, PreprocessOutput};
pub use project::{LinkedOutputs, NewProjectParam, Project, ProjectView};
pub use store::ProjectStore;
