use std::collections::HashMap;
use std::path::PathBuf;

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::watch;

use aero_sasl::mech::LoginProvider;

use crate::config::*;

#[derive(Default)]
pub struct UserDatabase {
    users: HashMap<String, UserEntry>,
}

pub struct StaticLoginProvider {
    user_db: watch::Receiver<UserDatabase>,
}

pub async fn update_user_list(config: PathBuf, up: watch::Sender<UserDatabase>) -> Result<()> {
    let mut stream = signal(SignalKind::user_defined1())
        .context("failed to install SIGUSR1 signal hander for reload")?;

    loop {
        stream.recv().await;
        tracing::info!("Received SIGUSR1, reloading");

        let users: UserList = match read_config(config.clone()) {
            Ok(x) => x,
            Err(e) => {
                tracing::warn!(path=%config.as_path().to_string_lossy(), error=%e, "Unable to load user list, keeping the previous one");
                continue;
            }
        };

        tracing::info!("{} users loaded", users.len());
        up.send(UserDatabase { users })
            .context("update user db config")?;
    }
}

impl StaticLoginProvider {
    /// Load `user_list` now, then again each time SIGUSR1 is received.
    pub async fn new(config: LoginStaticConfig) -> Result<Self> {
        let users: UserList = read_config(config.user_list.clone())
            .context(format!("'{:?}' must be a user database", config.user_list))?;
        tracing::info!("{} users loaded", users.len());

        let (tx, rx) = watch::channel(UserDatabase { users });
        tokio::spawn(async move {
            if let Err(e) = update_user_list(config.user_list, tx).await {
                tracing::error!(err=?e, "User list reloading stopped");
            }
        });

        Ok(Self { user_db: rx })
    }

    /// A fixed user database, for development and tests.
    pub fn from_users(users: UserList) -> Self {
        let (_, rx) = watch::channel(UserDatabase { users });
        Self { user_db: rx }
    }
}

#[async_trait]
impl LoginProvider for StaticLoginProvider {
    async fn login(&self, username: &str, password: &str) -> Result<()> {
        tracing::debug!(user=%username, "login");
        let hash = {
            let user_db = self.user_db.borrow();
            match user_db.users.get(username) {
                None => bail!("User {} does not exist", username),
                Some(u) => u.password.clone(),
            }
        };

        tracing::debug!(user=%username, "verify password");
        if !verify_password(password, &hash)? {
            bail!("Wrong password");
        }

        Ok(())
    }
}

pub fn hash_password(password: &str) -> Result<String> {
    use argon2::{
        password_hash::{rand_core::OsRng, PasswordHasher, SaltString},
        Argon2,
    };
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();
    Ok(argon2
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| anyhow!("Argon2 error: {}", e))?
        .to_string())
}

pub fn verify_password(password: &str, hash: &str) -> Result<bool> {
    use argon2::{
        password_hash::{PasswordHash, PasswordVerifier},
        Argon2,
    };
    let parsed_hash =
        PasswordHash::new(hash).map_err(|e| anyhow!("Invalid hashed password: {}", e))?;
    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok())
}
