//! CLI arguments and server configuration defaults.

use clap::Parser;

pub const DEFAULT_STORAGE_DIR: &str = ".sdserve/storage";
pub const DEFAULT_URL_PREFIX: &str = "files";
pub const DEFAULT_ROOT_PATH: &str = "/";
/// Read size for one download transfer chunk.
pub const DOWNLOAD_CHUNK_SIZE: usize = 1024;

/// CLI arguments and environment configuration for the server.
#[derive(Parser, Debug)]
#[command(name = "sdserve", version, about = "HTTP file server for a mounted storage volume")]
pub struct Args {
    #[arg(
        short = 's',
        long,
        env = "SDSERVE_STORAGE_DIR",
        default_value = DEFAULT_STORAGE_DIR,
        help = "Mount directory backing the storage volume"
    )]
    pub storage_dir: String,
    #[arg(
        short = 'b',
        long,
        env = "SDSERVE_BIND",
        default_value = "0.0.0.0",
        help = "Bind address"
    )]
    pub host: String,
    #[arg(
        short = 'p',
        long,
        env = "SDSERVE_PORT",
        default_value_t = 8080,
        help = "HTTP port"
    )]
    pub port: u16,
    #[arg(
        long,
        env = "SDSERVE_URL_PREFIX",
        default_value = DEFAULT_URL_PREFIX,
        help = "URL prefix the file tree is served under"
    )]
    pub url_prefix: String,
    #[arg(
        long,
        env = "SDSERVE_ROOT_PATH",
        default_value = DEFAULT_ROOT_PATH,
        help = "Path on the volume exposed as the listing root"
    )]
    pub root_path: String,
    #[arg(
        long,
        env = "SDSERVE_ENABLE_UPLOAD",
        default_value_t = true,
        action = clap::ArgAction::Set,
        help = "Allow file uploads"
    )]
    pub enable_upload: bool,
    #[arg(
        long,
        env = "SDSERVE_ENABLE_DOWNLOAD",
        default_value_t = true,
        action = clap::ArgAction::Set,
        help = "Allow file downloads"
    )]
    pub enable_download: bool,
    #[arg(
        long,
        env = "SDSERVE_ENABLE_DELETION",
        default_value_t = true,
        action = clap::ArgAction::Set,
        help = "Allow file deletion"
    )]
    pub enable_deletion: bool,
    #[arg(long, env = "SDSERVE_CORS_ORIGINS", help = "Comma separated CORS origins")]
    pub cors_origins: Option<String>,
}

/// Request-handling configuration shared with every handler.
#[derive(Debug)]
pub struct ServerConfig {
    pub url_prefix: String,
    pub root_path: String,
    pub upload_enabled: bool,
    pub download_enabled: bool,
    pub deletion_enabled: bool,
}

impl ServerConfig {
    pub fn from_args(args: &Args) -> Self {
        Self {
            url_prefix: args.url_prefix.trim_matches('/').to_string(),
            root_path: args.root_path.clone(),
            upload_enabled: args.enable_upload,
            download_enabled: args.enable_download,
            deletion_enabled: args.enable_deletion,
        }
    }
}

#[cfg(test)]
impl ServerConfig {
    /// Config with every capability on, used by handler tests.
    pub fn for_tests() -> Self {
        Self {
            url_prefix: DEFAULT_URL_PREFIX.to_string(),
            root_path: DEFAULT_ROOT_PATH.to_string(),
            upload_enabled: true,
            download_enabled: true,
            deletion_enabled: true,
        }
    }
}
