pub mod app;
pub mod cli;
pub mod config;
pub mod error;
pub mod session;
pub mod storage;
pub mod store;
pub mod ui;

pub use app::{NoteViewController, UiEvent};
pub use config::{AppConfig, ClientMode, ConfigLoader, ConfigPaths};
pub use error::{ClientError, ClientResult};
