//! Flows driven end to end with shell scripts standing in for the Python repo.
#![cfg(unix)]

use sdtrainer_common_config::{AppPaths, LoraConfig};
use sdtrainer_project::NewProjectParam;
use sdtrainer_runner::args::{CaptionConfig, PreprocessConfig, Tagger, TerminalPlatform};
use sdtrainer_runner::ScriptEvent;
use sdtrainer_server::{CallbackHandler, TrainStatus};
use sdtrainer_service::{AppContext, InstallRequest, LoraImageRequest, TrainCallbacks, UiEvent};
use sdtrainer_test_utils::{write_png, write_script};
use serde_json::json;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::broadcast::Receiver;

struct Fixture {
    dir: TempDir,
    repo: PathBuf,
    ctx: Arc<AppContext>,
}

impl Fixture {
    /// A context whose script repo runs `venv/bin/python` as `/bin/sh`.
    fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let repo = dir.path().join("repo");
        std::fs::create_dir_all(repo.join("venv/bin")).unwrap();
        std::os::unix::fs::symlink("/bin/sh", repo.join("venv/bin/python")).unwrap();

        let ctx = AppContext::new(AppPaths::new(dir.path().join("data")))
            .unwrap()
            .with_platform(TerminalPlatform::Linux);
        ctx.settings()
            .save_lora_config(&LoraConfig {
                preprocess_repo: Some(repo.display().to_string()),
                lora_python_exec: Some(repo.display().to_string()),
            })
            .unwrap();
        Self {
            dir,
            repo,
            ctx: Arc::new(ctx),
        }
    }

    fn script(&self, name: &str, body: &str) {
        write_script(&self.repo, name, body);
    }

    async fn open_project(&self) -> PathBuf {
        self.ctx
            .new_project(NewProjectParam {
                name: "demo".into(),
                path: Some(self.dir.path().to_path_buf()),
                width: 64,
                height: 64,
            })
            .await
            .unwrap()
            .path
    }

    /// Import one generated image and return its copy under `original/`.
    async fn import_original(&self) -> PathBuf {
        let source = write_png(self.dir.path().join("src").join("a.png"), 16, 16, 3);
        let imported = self.ctx.import_images(vec![source]).await.unwrap();
        imported[0].src.clone()
    }
}

fn drain(rx: &mut Receiver<UiEvent>) -> Vec<UiEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

fn single_quoted(path: &Path) -> String {
    format!("'{}'", path.display())
}

#[tokio::test]
async fn preprocess_done_links_outputs_to_originals() {
    let fx = Fixture::new();
    let project = fx.open_project().await;
    let original = fx.import_original().await;
    let dest = project.join("preprocess").join("a_0.png");
    fx.script(
        "preprocess_cli.py",
        &format!(
            "echo 'Loading weights'\ncp {} {}\necho '{}'",
            single_quoted(&original),
            single_quoted(&dest),
            json!({
                "event": "preprocess_done",
                "message": "done",
                "vars": [{"src": original, "dest": dest}]
            })
        ),
    );

    let mut rx = fx.ctx.bus().subscribe();
    let exit = fx.ctx.make_preprocess(PreprocessConfig::default()).await.unwrap();
    assert!(exit.success());

    let events = drain(&mut rx);
    assert!(events.contains(&UiEvent::PreprocessOut(ScriptEvent::Log("Loading weights".into()))));
    let done = events
        .iter()
        .find_map(|e| match e {
            UiEvent::PreprocessDone(linked) => Some(linked.clone()),
            _ => None,
        })
        .expect("preprocessDone emitted");
    assert_eq!(done.preprocess.len(), 1);
    assert_eq!(done.preprocess[0].image_name, "a_0.png");
    assert_eq!(done.preprocess[0].original_path.as_deref(), Some(original.as_path()));
    assert!(matches!(events.last(), Some(UiEvent::PreprocessExit(_))));

    let items = fx.ctx.preprocess_items().await.unwrap();
    assert_eq!(items.len(), 1);
}

#[tokio::test]
async fn caption_results_update_history_and_finish() {
    let fx = Fixture::new();
    let project = fx.open_project().await;
    let original = fx.import_original().await;
    let dest = project.join("preprocess").join("a.png");
    fx.script(
        "preprocess_cli.py",
        &format!(
            "cp {} {}\necho '{}'",
            single_quoted(&original),
            single_quoted(&dest),
            json!({"event": "preprocess_done", "message": "", "vars": [{"src": original, "dest": dest}]})
        ),
    );
    fx.ctx.make_preprocess(PreprocessConfig::default()).await.unwrap();

    fx.script(
        "wd14_cli.py",
        &format!(
            "echo '{}'\necho 'warming up' >&2",
            json!({"filename": dest, "tags": [{"tag": "1girl", "rank": 0.9}]})
        ),
    );
    let mut rx = fx.ctx.bus().subscribe();
    let exit = fx
        .ctx
        .make_caption(CaptionConfig {
            image_paths: vec![dest.clone()],
            tagger: Tagger::Wd14,
            tagger_id: "wd14".into(),
            ..Default::default()
        })
        .await
        .unwrap();
    assert!(exit.success());

    let events = drain(&mut rx);
    let history = events
        .iter()
        .find_map(|e| match e {
            UiEvent::CaptionHistoryUpdate { history, .. } => history.clone(),
            _ => None,
        })
        .expect("history recorded");
    assert_eq!(history[0].name, "1girl");
    assert!(events.contains(&UiEvent::CaptionDone));
    assert!(events.iter().any(|e| matches!(e, UiEvent::TaskStderr { line, .. } if line == "warming up")));

    let items = fx.ctx.preprocess_items().await.unwrap();
    assert_eq!(items[0].caption_history.as_ref().map(Vec::len), Some(1));
}

#[tokio::test]
async fn generated_preview_is_attached_to_model() {
    let fx = Fixture::new();
    let project = fx.open_project().await;
    let model_path = project.join("model").join("demo.safetensors").display().to_string();
    fx.ctx.project().await.unwrap().on_lora_saved(model_path.clone()).await.unwrap();
    fx.ctx
        .save_preview_props(json!({"prompt": "1girl", "steps": 20}))
        .await
        .unwrap();

    let image = project.join("image").join("preview_0.png");
    fx.script(
        "gen_img_diffusers.py",
        &format!(
            "echo '{}'",
            json!({"message": "generated", "vars": {"path": image, "filename": image, "models": [model_path]}})
        ),
    );

    let mut rx = fx.ctx.bus().subscribe();
    let exit = fx
        .ctx
        .generate_lora_image(LoraImageRequest::for_model(&model_path))
        .await
        .unwrap();
    assert!(exit.success());

    let events = drain(&mut rx);
    let updated = events
        .iter()
        .find_map(|e| match e {
            UiEvent::ModelUpdated(models) => Some(models.clone()),
            _ => None,
        })
        .expect("modelUpdated emitted");
    assert_eq!(updated[0].path, model_path);
    assert_eq!(updated[0].preview.len(), 1);
    assert!(matches!(events.last(), Some(UiEvent::GenerateExit(_))));

    let models = fx.ctx.load_models().await.unwrap();
    assert_eq!(models[0].preview[0].props.as_ref().unwrap()["steps"], 20);
}

#[tokio::test]
async fn lora_saved_callback_records_and_announces_model() {
    let fx = Fixture::new();
    let project = fx.open_project().await;
    fx.script("gen_img_diffusers.py", "exit 0");
    fx.ctx.save_preview_props(json!({"prompt": "x"})).await.unwrap();

    let handler = TrainCallbacks::new(Arc::clone(&fx.ctx));
    let mut rx = fx.ctx.bus().subscribe();
    let model_path = project.join("model").join("demo-000001.safetensors").display().to_string();
    handler.on_lora_saved(model_path.clone()).await.unwrap();
    handler
        .on_train_progress(TrainStatus {
            epoch: 1,
            step: 10,
            total_step: 100,
            total_epoch: 10,
            loss: 0.12,
            extra: Default::default(),
        })
        .await;

    let saved = tokio::time::timeout(Duration::from_secs(5), rx.recv()).await.unwrap().unwrap();
    let UiEvent::LoraSaved(model) = saved else {
        panic!("expected loraSaved, got {saved:?}");
    };
    assert_eq!(model.name, "demo-000001");
    let progress = tokio::time::timeout(Duration::from_secs(5), rx.recv()).await.unwrap().unwrap();
    assert!(matches!(progress, UiEvent::TrainProgress(status) if status.step == 10));

    // The preview run exits on its own once spawned.
    let exit = loop {
        match tokio::time::timeout(Duration::from_secs(10), rx.recv()).await.unwrap().unwrap() {
            UiEvent::GenerateExit(exit) => break exit,
            _ => continue,
        }
    };
    assert!(exit.success());
    assert_eq!(fx.ctx.load_models().await.unwrap().len(), 1);
}

#[tokio::test]
async fn lora_saved_without_project_fails() {
    let fx = Fixture::new();
    let handler = TrainCallbacks::new(Arc::clone(&fx.ctx));
    assert!(handler.on_lora_saved("/m/a.safetensors".into()).await.is_err());
}

fn commit_file(repo: &git2::Repository, name: &str, content: &str) {
    let workdir = repo.workdir().unwrap();
    std::fs::write(workdir.join(name), content).unwrap();
    let mut index = repo.index().unwrap();
    index.add_path(Path::new(name)).unwrap();
    index.write().unwrap();
    let tree = repo.find_tree(index.write_tree().unwrap()).unwrap();
    let sig = git2::Signature::now("Test User", "test@example.com").unwrap();
    repo.commit(Some("HEAD"), &sig, &sig, "Initial commit", &tree, &[]).unwrap();
}

#[tokio::test]
async fn install_clones_runs_setup_and_saves_repo() {
    let fx = Fixture::new();
    let upstream = git2::Repository::init(fx.dir.path().join("upstream")).unwrap();
    commit_file(&upstream, "setup.sh", "echo installing requirements\n");
    let install_dir = fx.dir.path().join("install");

    let mut rx = fx.ctx.bus().subscribe();
    let train_path = fx
        .ctx
        .install_repo(InstallRequest {
            install_dir: install_dir.clone(),
            repo_url: Some(upstream.workdir().unwrap().display().to_string()),
        })
        .await
        .unwrap();

    assert_eq!(train_path, install_dir.join("repo-train"));
    assert!(train_path.join("setup.sh").is_file());
    assert_eq!(fx.ctx.train_repo().unwrap(), train_path);
    assert_eq!(fx.ctx.script_repo().unwrap(), train_path);

    let messages: Vec<String> = drain(&mut rx)
        .into_iter()
        .filter_map(|e| match e {
            UiEvent::InstallLog(m) => Some(m.message),
            _ => None,
        })
        .collect();
    assert_eq!(messages.first().map(String::as_str), Some("start install"));
    assert!(messages.iter().any(|m| m == "installing requirements"));
    assert!(messages.iter().any(|m| m == "Child exited with code 0"));
    assert_eq!(messages.last().map(String::as_str), Some("install success"));
}

#[tokio::test]
async fn failed_setup_keeps_previous_settings() {
    let fx = Fixture::new();
    let upstream = git2::Repository::init(fx.dir.path().join("upstream")).unwrap();
    commit_file(&upstream, "setup.sh", "echo broken >&2\nexit 3\n");

    let result = fx
        .ctx
        .install_repo(InstallRequest {
            install_dir: fx.dir.path().join("install"),
            repo_url: Some(upstream.workdir().unwrap().display().to_string()),
        })
        .await;
    assert!(matches!(
        result,
        Err(sdtrainer_service::ServiceError::TaskFailed { code: Some(3), .. })
    ));
    assert_eq!(fx.ctx.train_repo().unwrap(), fx.repo);
}
