use std::default::Default;
use std::env;

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

pub fn load() -> Result<Settings, ConfigError> {
    let env = env::var(RUN_MODE_ENV).unwrap_or_else(|_| "development".into());
    Config::builder()
        .add_source(File::with_name(DEFAULT_CFG_PATH))
        .add_source(File::with_name(&format!("config/{}", env)).required(false))
        .add_source(File::with_name(LOCAL_CFG_PATH).required(false))
        .add_source(Environment::with_prefix(ENV_PREFIX).separator("__"))
        .build()?
        .try_deserialize()
}

const DEFAULT_CFG_PATH: &str = "config/default";
const LOCAL_CFG_PATH: &str = "config/local";
const RUN_MODE_ENV: &str = "DRAWHOLDEM_SERVER_RUN_MODE";
const ENV_PREFIX: &str = "drawholdem_server";

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub logging: Logging,
    pub runtime: Runtime,
    pub server: Server,
    pub game: drawholdem_game::server::Settings,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Logging {
    pub level: String,
}

impl Default for Logging {
    fn default() -> Self {
        Logging {
            level: "info".into(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Runtime {
    pub threaded: bool,
    pub worker_threads: usize,
    pub thread_name: String,
}

impl Default for Runtime {
    fn default() -> Self {
        Runtime {
            threaded: true,
            worker_threads: num_cpus::get_physical(),
            thread_name: "async-worker".into(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Server {
    pub bind_addr: String,
}

impl Default for Server {
    fn default() -> Self {
        Server {
            bind_addr: "127.0.0.1:3000".into(),
        }
    }
}
