use std::collections::HashMap;
use std::io::Read;
use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::Result;
use serde::{de::DeserializeOwned, Deserialize, Serialize};

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Config {
    pub pid: Option<PathBuf>,
    pub bind_addrs: Vec<SocketAddr>,
    /// Close connections idle for longer than this
    pub io_timeout_secs: Option<u64>,
    #[serde(default = "default_mechanisms")]
    pub mechanisms: Vec<String>,
    pub users: UserManagement,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(tag = "user_driver")]
pub enum UserManagement {
    Demo,
    Static(LoginStaticConfig),
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct LoginStaticConfig {
    pub user_list: PathBuf,
}

// ---
pub type UserList = HashMap<String, UserEntry>;

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct UserEntry {
    /// argon2 PHC string, see the `password-hash` command
    pub password: String,
}

fn default_mechanisms() -> Vec<String> {
    vec!["PLAIN".into(), "LOGIN".into()]
}

pub fn read_config<T: DeserializeOwned>(config_file: PathBuf) -> Result<T> {
    let mut file = std::fs::OpenOptions::new()
        .read(true)
        .open(config_file.as_path())?;

    let mut config = String::new();
    file.read_to_string(&mut config)?;

    Ok(toml::from_str(&config)?)
}
