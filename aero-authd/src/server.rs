use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Result};
use futures::future::try_join_all;
use tokio::net::TcpListener;

use aero_sasl::mech::{login, plain, ArcLoginProvider};
use aero_sasl::types::{Capability, Mechanism};
use aero_sasl::{Registry, Server as AuthServer};

use crate::config::*;
use crate::login::*;

pub struct Server {
    auth: Arc<AuthServer>,
    config: Config,
}

impl Server {
    pub async fn from_config(config: Config) -> Result<Self> {
        let login = authenticator(&config.users).await?;
        let registry = registry(&config.mechanisms, login)?;
        let auth = AuthServer::new(registry)
            .with_io_timeout(config.io_timeout_secs.map(Duration::from_secs));

        Ok(Self {
            auth: Arc::new(auth),
            config,
        })
    }

    pub async fn run(self) -> Result<()> {
        tracing::info!("Starting aero-authd...");
        let auth = self.auth;

        if let Some(pid_file) = self.config.pid {
            let mut file = std::fs::OpenOptions::new()
                .write(true)
                .create(true)
                .truncate(true)
                .open(pid_file)?;
            file.write_all(std::process::id().to_string().as_bytes())?;
            drop(file);
        }

        if self.config.bind_addrs.is_empty() {
            bail!("bind_addrs is empty, there is nothing to listen on");
        }

        let mut listeners = Vec::with_capacity(self.config.bind_addrs.len());
        for addr in self.config.bind_addrs.iter() {
            listeners.push(TcpListener::bind(addr).await?);
        }

        let closer = auth.clone();
        tokio::spawn(async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => tracing::info!("Received CTRL+C, shutting down."),
                Err(e) => tracing::error!(err=?e, "failed to install CTRL+C signal handler"),
            }
            closer.close();
        });

        try_join_all(listeners.into_iter().map(|tcp| auth.clone().serve(tcp))).await?;
        Ok(())
    }
}

async fn authenticator(users: &UserManagement) -> Result<ArcLoginProvider> {
    let provider = match users {
        UserManagement::Demo => StaticLoginProvider::from_users(demo_users()?),
        UserManagement::Static(cfg) => StaticLoginProvider::new(cfg.clone()).await?,
    };
    Ok(Arc::new(provider))
}

fn demo_users() -> Result<UserList> {
    Ok(UserList::from([(
        "alice".to_string(),
        UserEntry {
            password: hash_password("hunter2")?,
        },
    )]))
}

fn registry(names: &[String], login: ArcLoginProvider) -> Result<Registry> {
    let mut builder = Registry::builder();
    for name in names {
        let provider = login.clone();
        builder = match name.as_str() {
            plain::NAME => builder.mechanism(
                plain::NAME,
                Mechanism::with(&[Capability::PlainText]),
                move |_| Box::new(plain::PlainServer::new(provider.clone())),
            ),
            login::NAME => builder.mechanism(
                login::NAME,
                Mechanism::with(&[Capability::PlainText]),
                move |_| Box::new(login::LoginServer::new(provider.clone())),
            ),
            other => bail!("Unsupported mechanism '{}' in configuration", other),
        };
    }
    Ok(builder.build())
}
