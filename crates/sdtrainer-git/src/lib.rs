//! Git access for installing and updating the trainer script repository.

pub mod error;
pub mod progress;
pub mod repo;

pub use error::{GitError, GitResult};
pub use progress::{TransferProgress, TransferStage};
pub use repo::{
    clone_repo, head_commit, is_repo, pull, train_repo_url, CloneOpts, PullOutcome, TRAIN_REPO_CN_URL,
    TRAIN_REPO_URL,
};
