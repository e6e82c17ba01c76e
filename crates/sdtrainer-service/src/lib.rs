//! Application layer of sdtrainer.
//!
//! [`AppContext`] owns the settings store, the open project, one supervisor
//! per script kind, and the [`EventBus`] front ends subscribe to. The
//! operations themselves live in [`flows`] as methods on the context;
//! [`backend`] routes the project operations that can also run on a remote
//! trainer service.

pub mod backend;
pub mod context;
pub mod error;
pub mod events;
pub mod flows;

pub use backend::{select_backend, Backend, LocalBackend, RemoteBackend, SavedProject};
pub use context::{AppContext, AppState};
pub use error::{ServiceError, ServiceResult};
pub use events::{CloneProgress, EventBus, InstallLevel, InstallMessage, InstallStage, UiEvent};
pub use flows::callback::{bind_callback_server, serve_callbacks, TrainCallbacks};
pub use flows::doctor::DoctorReport;
pub use flows::generate::LoraImageRequest;
pub use flows::install::InstallRequest;
pub use flows::library::{ModelFile, RecentProject};
