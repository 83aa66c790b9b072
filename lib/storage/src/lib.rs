//! # Draekz Storage
//!
//! Everything the extension keeps outside a single graph:
//!
//! - [`ConfigStore`] - the browser-side config accessor, saving through a [`ConfigBackend`]
//! - [`UserConfigFile`] - the server-side defaults plus `draekz_config.json`
//! - [`schema`] - the keys the settings dialog knows about
//! - [`ModelInfoService`] - per-type model info cache over a [`ModelInfoApi`]
//! - [`ModelInfoSession`] - the model info dialog's state

pub mod config;
pub mod error;
pub mod info_session;
pub mod model_info;
pub mod schema;
pub mod user_config;

pub use config::{ConfigBackend, ConfigStore, HttpConfigBackend};
pub use error::{Result, StorageError};
pub use info_session::{CloseDetail, EditableField, ModelInfoSession, SessionTracker};
pub use model_info::{
    Envelope, HttpModelInfoApi, ModelInfo, ModelInfoApi, ModelInfoService, ModelInfoServices,
    ModelInfoType,
};
pub use schema::{configurable, ConfigEntry, ConfigSection, ConfigType};
pub use user_config::{UserConfigFile, USER_CONFIG_FILE_NAME};
