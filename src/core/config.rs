mod parsing;
mod secret;
mod settings;
mod types;

pub(crate) use types::{
    AiSettings, ApiSettings, BatchSettings, ConfigError, CorsSettings, Environment,
    RuntimeSettings, SecuritySettings, Settings, StoreSettings, TelemetrySettings, UploadSettings,
};
