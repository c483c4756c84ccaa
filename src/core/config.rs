mod parsing;
mod settings;
mod types;

pub(crate) use types::{AiSettings, IdentitySettings, Settings, TelemetrySettings};
