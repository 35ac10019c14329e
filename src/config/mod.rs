//! Configuration.
//!
//! - `settings` - supervisor settings (`SupervisorSettings`, `Timings`),
//!   built-in defaults plus the optional `supervisor.yaml` override
//! - `env_file` - the project `.env` store (`EnvConfig`) and its degrade
//!   transform
//! - `duration` - duration strings used by timings

mod duration;
mod env_file;
mod settings;

pub use duration::{format_duration, parse_duration_string};
pub use env_file::{
    load_env_file, validate_env_name, EnvConfig, DATABASE_URL, DEFAULT_ENV_CONTENTS, ENVIRONMENT,
    REDIS_URL,
};
pub use settings::{ServiceSpec, SupervisorSettings, Timings, ALL_COMPONENTS, DEFAULT_CONFIG_FILE};
