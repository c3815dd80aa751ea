use std::{env, path::PathBuf, sync::OnceLock};

use clap::Parser;
use nanoid::nanoid;
use serde::{Deserialize, Serialize};
use tokio::{fs::{create_dir_all, metadata, read_to_string, File}, io::AsyncWriteExt, sync::Mutex};

use crate::{error::Error, tools::{face_inference::MODEL_VERSION, log::{log_info, LogServiceType}}, Result};


static CONFIG: OnceLock<Mutex<ServerConfig>> = OnceLock::new();

const ENV_SERVERID: &str = "SNAPVAULT_SERVERID";
const ENV_PORT: &str = "SNAPVAULT_PORT";
const ENV_DIR: &str = "SNAPVAULT_DIR";

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ServerConfig {
    pub id: Option<String>,
    pub port: Option<u16>,
    #[serde(default)]
    pub recognition: RecognitionConfig,
}

/// Tunables of the face recognition core. Serialized inside config.json so a
/// deployment can adjust thresholds without a rebuild.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct RecognitionConfig {
    #[serde(default = "default_cosine_threshold")]
    pub cosine_threshold: f32,
    #[serde(default = "default_euclidean_threshold")]
    pub euclidean_threshold: f32,
    #[serde(default = "default_cache_ttl")]
    pub cache_ttl_secs: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_batch_concurrency")]
    pub batch_concurrency: usize,
    #[serde(default = "default_detection_timeout")]
    pub detection_timeout_secs: u64,
    #[serde(default = "default_model_version")]
    pub model_version: String,
}

impl Default for RecognitionConfig {
    fn default() -> Self {
        RecognitionConfig {
            cosine_threshold: default_cosine_threshold(),
            euclidean_threshold: default_euclidean_threshold(),
            cache_ttl_secs: default_cache_ttl(),
            max_retries: default_max_retries(),
            batch_concurrency: default_batch_concurrency(),
            detection_timeout_secs: default_detection_timeout(),
            model_version: default_model_version(),
        }
    }
}

fn default_cosine_threshold() -> f32 {
    crate::tools::recognition::COSINE_THRESHOLD
}
fn default_euclidean_threshold() -> f32 {
    crate::tools::recognition::EUCLIDEAN_THRESHOLD
}
fn default_cache_ttl() -> u64 {
    crate::tools::recognition::cache::CACHE_TTL.as_secs()
}
fn default_max_retries() -> u32 {
    3
}
fn default_batch_concurrency() -> usize {
    4
}
fn default_detection_timeout() -> u64 {
    30
}
fn default_model_version() -> String {
    MODEL_VERSION.to_string()
}

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[arg(short, long)]
    serverid: Option<String>,

    #[arg(short = 'k', long)]
    docker: bool,

    #[arg(short, long)]
    dir: Option<String>,

    #[arg(short, long)]
    port: Option<u16>,
}

pub async fn initialize_config() -> ServerConfig {
    let local_path = get_server_local_path().await.expect("Unable to create local server path");
    log_info(LogServiceType::Register, format!("LocalPath: {:?}", local_path));
    let config = get_config_with_overrides().await.expect("Unable to load server config");
    let _ = CONFIG.set(Mutex::new(config.clone()));
    config
}

pub async fn get_server_local_path() -> Result<PathBuf> {
    let args = Args::parse();

    let dir_path = if let Some(argdir) = args.dir {
        PathBuf::from(&argdir)
    } else if let Ok(val) = env::var(ENV_DIR) {
        PathBuf::from(&val)
    } else if args.docker {
        PathBuf::from("/config")
    } else {
        let Some(mut dir_path) = dirs::config_local_dir() else { return Err(Error::ServerUnableToAccessServerLocalFolder); };
        dir_path.push("snapvault");
        dir_path
    };

    let Ok(_) = create_dir_all(&dir_path).await else { return Err(Error::ServerUnableToAccessServerLocalFolder); };

    Ok(dir_path)
}

pub async fn get_server_port() -> u16 {
    let config_port = get_config().await.port;
    env::var(ENV_PORT).ok().and_then(|p| p.parse::<u16>().ok()).or(config_port).unwrap_or(8080)
}

fn get_config_override_serverid() -> Option<String> {
    if let Ok(val) = env::var(ENV_SERVERID) {
        Some(val)
    } else {
        None
    }
}

pub async fn get_server_id() -> Option<String> {
    get_config().await.id
}

pub async fn get_config() -> ServerConfig {
    if let Some(config) = CONFIG.get() {
        let guard = config.lock().await;
        guard.clone()
    } else {
        get_config_with_overrides().await.expect("Unable to load server config")
    }
}

pub async fn get_config_with_overrides() -> Result<ServerConfig> {
    let args = Args::parse();
    let mut config = get_raw_config().await?;

    if config.id.is_none() {
        config.id = Some(nanoid!());
        update_raw_config(&config).await?;
    }
    if let Some(id) = get_config_override_serverid() {
        config.id = Some(id);
    } else if let Some(id) = args.serverid {
        config.id = Some(id);
    }
    if let Some(port) = args.port {
        config.port = Some(port);
    }

    Ok(config)
}

pub async fn get_raw_config() -> Result<ServerConfig> {
    let mut dir_path: PathBuf = get_server_local_path().await?;
    dir_path.push("config.json");

    if let Ok(data) = read_to_string(dir_path.clone()).await {
        let Ok(config) = serde_json::from_str::<ServerConfig>(&data) else { return Err(Error::ServerMalformatedConfigFile); };
        Ok(config)
    } else {
        let new_config = ServerConfig {
            id: None,
            port: None,
            recognition: RecognitionConfig::default(),
        };
        update_raw_config(&new_config).await?;
        Ok(new_config)
    }
}

async fn update_raw_config(config: &ServerConfig) -> Result<()> {
    let mut dir_path: PathBuf = get_server_local_path().await?;
    dir_path.push("config.json");
    let new_config_string = serde_json::to_string(config)?;
    let Ok(mut file) = File::create(dir_path).await else { return Err(Error::ServerUnableToAccessServerLocalFolder); };
    file.write_all(new_config_string.as_bytes()).await?;
    Ok(())
}

pub async fn write_server_file(name: &str, data: &[u8]) -> Result<()> {
    let mut dir_path: PathBuf = get_server_local_path().await?;
    dir_path.push(name);
    let Ok(mut file) = File::create(dir_path).await else { return Err(Error::ServerUnableToAccessServerLocalFolder); };
    if file.write_all(data).await.is_err() {
        return Err(Error::ServerUnableToAccessServerLocalFolder);
    }
    Ok(())
}

pub async fn get_server_file_path(name: &str) -> Result<PathBuf> {
    let mut dir_path: PathBuf = get_server_local_path().await?;
    dir_path.push(name);
    Ok(dir_path)
}

pub async fn get_server_file_path_array(names: Vec<&str>) -> Result<PathBuf> {
    let mut dir_path: PathBuf = get_server_local_path().await?;
    for name in names {
        dir_path.push(name);
    }
    if let Some(parent) = dir_path.parent() {
        let Ok(_) = create_dir_all(parent).await else { return Err(Error::ServerUnableToAccessServerLocalFolder); };
    }
    Ok(dir_path)
}

pub async fn get_server_folder_path_array(names: Vec<&str>) -> Result<PathBuf> {
    let mut dir_path: PathBuf = get_server_local_path().await?;
    for name in names {
        dir_path.push(name);
    }
    let Ok(_) = create_dir_all(&dir_path).await else { return Err(Error::ServerUnableToAccessServerLocalFolder); };
    Ok(dir_path)
}

pub async fn has_server_file(name: &str) -> bool {
    if let Ok(path) = get_server_file_path(name).await {
        metadata(path).await.is_ok()
    } else {
        false
    }
}

pub async fn get_server_file_string(name: &str) -> Result<Option<String>> {
    let path = get_server_file_path(name).await?;
    if let Ok(data) = read_to_string(path).await {
        Ok(Some(data))
    } else {
        Ok(None)
    }
}
