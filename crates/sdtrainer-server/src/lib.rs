//! Callback server for the training process.
//!
//! `train_network.py` is launched with `--callback_url` pointing here and
//! posts saved checkpoints and progress counters as JSON.

pub mod error;
pub mod handler;
pub mod routes;
pub mod server;
pub mod types;

pub use error::{ApiError, ApiResult, ServerError, ServerResult};
pub use handler::CallbackHandler;
pub use routes::create_router;
pub use server::{shutdown_signal, CallbackServer, DEFAULT_CALLBACK_PORT, PORT_PROBE_ATTEMPTS};
pub use types::{LoraSavedRequest, TrainProgressRequest, TrainStatus};
