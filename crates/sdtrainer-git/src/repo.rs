//! Clone and fast-forward update of the trainer repo.

use crate::error::{GitError, GitResult};
use crate::progress::{TransferProgress, TransferStage};
use git2::build::{CheckoutBuilder, RepoBuilder};
use git2::{FetchOptions, ProxyOptions, RemoteCallbacks, Repository};
use serde::Serialize;
use std::cell::RefCell;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Upstream of the trainer scripts.
pub const TRAIN_REPO_URL: &str = "https://github.com/AllenTom/lora_train_core.git";
/// Mirror for users in mainland China.
pub const TRAIN_REPO_CN_URL: &str = "https://gitee.com/takayamaaren/lora-core.git";

pub fn train_repo_url(cn_mirror: bool) -> &'static str {
    if cn_mirror {
        TRAIN_REPO_CN_URL
    } else {
        TRAIN_REPO_URL
    }
}

/// Clone options.
#[derive(Debug, Clone, Default)]
pub struct CloneOpts {
    pub url: String,
    pub target: PathBuf,
    /// HTTP(S) proxy URL.
    pub proxy: Option<String>,
    /// Branch to check out instead of the remote HEAD.
    pub branch: Option<String>,
}

impl CloneOpts {
    pub fn new(url: impl Into<String>, target: impl Into<PathBuf>) -> Self {
        Self {
            url: url.into(),
            target: target.into(),
            ..Default::default()
        }
    }

    pub fn proxy(mut self, proxy: Option<String>) -> Self {
        self.proxy = proxy.filter(|p| !p.is_empty());
        self
    }

    pub fn branch(mut self, branch: impl Into<String>) -> Self {
        self.branch = Some(branch.into());
        self
    }
}

/// Result of a pull.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PullOutcome {
    UpToDate,
    FastForwarded { from: String, to: String },
}

fn fetch_options<'a, F>(proxy: Option<&str>, on_progress: &'a RefCell<F>) -> FetchOptions<'a>
where
    F: FnMut(&TransferProgress),
{
    let mut callbacks = RemoteCallbacks::new();
    callbacks.transfer_progress(move |stats| {
        let progress = TransferProgress::from_stats(&stats);
        debug!("Fetch progress: {}", progress);
        (on_progress.borrow_mut())(&progress);
        true
    });
    let mut options = FetchOptions::new();
    options.remote_callbacks(callbacks);
    if let Some(proxy) = proxy {
        let mut proxy_options = ProxyOptions::new();
        proxy_options.url(proxy);
        options.proxy_options(proxy_options);
    }
    options
}

/// Clone `opts.url` into `opts.target`, replacing whatever is there.
///
/// Blocking; run it on a blocking thread from async code.
pub fn clone_repo<F>(opts: &CloneOpts, on_progress: F) -> GitResult<PathBuf>
where
    F: FnMut(&TransferProgress),
{
    if opts.target.exists() {
        info!(target = %opts.target.display(), "removing existing clone target");
        std::fs::remove_dir_all(&opts.target)?;
    }
    if let Some(parent) = opts.target.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let on_progress = RefCell::new(on_progress);
    let mut checkout = CheckoutBuilder::new();
    checkout.progress(|_path, current, total| {
        (on_progress.borrow_mut())(&TransferProgress {
            stage: TransferStage::Checkout,
            current,
            total,
            received_bytes: 0,
        });
    });

    let mut builder = RepoBuilder::new();
    builder
        .fetch_options(fetch_options(opts.proxy.as_deref(), &on_progress))
        .with_checkout(checkout);
    if let Some(branch) = &opts.branch {
        builder.branch(branch);
    }

    info!(url = %opts.url, target = %opts.target.display(), "cloning repository");
    builder.clone(&opts.url, &opts.target)?;
    Ok(opts.target.clone())
}

/// Whether `path` is the work tree of a git repository.
pub fn is_repo(path: &Path) -> bool {
    Repository::open(path).is_ok()
}

fn open(path: &Path) -> GitResult<Repository> {
    Repository::open(path).map_err(|_| GitError::NotARepo {
        path: path.display().to_string(),
    })
}

/// Id of the commit `HEAD` points at.
pub fn head_commit(path: &Path) -> GitResult<String> {
    let repo = open(path)?;
    let head = repo.head()?.peel_to_commit()?;
    Ok(head.id().to_string())
}

/// Fetch the current branch from `origin` and fast-forward to it.
pub fn pull<F>(path: &Path, proxy: Option<&str>, on_progress: F) -> GitResult<PullOutcome>
where
    F: FnMut(&TransferProgress),
{
    let repo = open(path)?;
    let head = repo.head()?;
    let branch = head
        .shorthand()
        .filter(|_| head.is_branch())
        .ok_or_else(|| GitError::InvalidOperation {
            message: "cannot pull with a detached HEAD".to_string(),
        })?
        .to_string();
    let from = head.peel_to_commit()?.id();
    drop(head);

    let mut remote = repo.find_remote("origin").map_err(|_| GitError::RemoteNotFound {
        name: "origin".to_string(),
    })?;
    let on_progress = RefCell::new(on_progress);
    let mut options = fetch_options(proxy, &on_progress);
    info!(path = %path.display(), branch = %branch, "fetching updates");
    remote.fetch(&[branch.as_str()], Some(&mut options), None)?;

    let fetch_head = repo.find_reference("FETCH_HEAD")?;
    let fetched = repo.reference_to_annotated_commit(&fetch_head)?;
    let (analysis, _) = repo.merge_analysis(&[&fetched])?;

    if analysis.is_up_to_date() {
        return Ok(PullOutcome::UpToDate);
    }
    if !analysis.is_fast_forward() {
        return Err(GitError::Diverged { branch });
    }

    let refname = format!("refs/heads/{branch}");
    let mut reference = repo.find_reference(&refname)?;
    reference.set_target(fetched.id(), "pull: fast-forward")?;
    repo.set_head(&refname)?;
    repo.checkout_head(Some(CheckoutBuilder::new().force()))?;

    let outcome = PullOutcome::FastForwarded {
        from: from.to_string(),
        to: fetched.id().to_string(),
    };
    info!(?outcome, "repository updated");
    Ok(outcome)
}
