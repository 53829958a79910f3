mod config;
mod login;
mod server;

use std::io::Read;
use std::path::PathBuf;

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use nix::{sys::signal, unistd::Pid};

use aero_sasl::mech::{login::LoginClient, plain::PlainClient, ClientMechanism};
use aero_sasl::{AuthRes, Client};

use config::*;
use login::*;
use server::Server;

#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
struct Args {
    #[clap(subcommand)]
    command: Command,

    /// A special mode dedicated to developers, NOT INTENDED FOR PRODUCTION
    #[clap(long)]
    dev: bool,

    #[clap(
        short,
        long,
        env = "AERO_AUTHD_CONFIG",
        default_value = "aero-authd.toml"
    )]
    /// Path to the main configuration file
    config_file: PathBuf,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Runs the authentication daemon
    Daemon,
    /// Reload the user list of a running daemon
    Reload {
        #[clap(short, long, env = "AERO_AUTHD_PID")]
        pid: Option<i32>,
    },
    /// Try to authenticate against a running daemon
    Check {
        #[clap(short, long, default_value = "[::1]:12345")]
        addr: String,
        #[clap(short, long, default_value = "imap")]
        service: String,
        #[clap(short, long)]
        login: String,
        #[clap(short, long, default_value = "PLAIN")]
        mechanism: String,
        #[clap(env = "AERO_AUTHD_PASSWORD")]
        maybe_password: Option<String>,
    },
    /// Hash a password for the static user list
    PasswordHash {
        #[clap(env = "AERO_AUTHD_PASSWORD")]
        maybe_password: Option<String>,
    },
}

fn tracer() {
    tracing_subscriber::fmt::init();
}

#[tokio::main]
async fn main() -> Result<()> {
    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "main=info,aero_authd=info,aero_sasl=info")
    }

    // Abort on panic (same behavior as in Go)
    std::panic::set_hook(Box::new(|panic_info| {
        eprintln!("{}", panic_info);
        eprintln!("{:?}", backtrace::Backtrace::new());
        std::process::abort();
    }));

    tracer();

    let args = Args::parse();

    match &args.command {
        Command::Daemon => {
            let config = load_config(&args)?;
            let server = Server::from_config(config).await?;
            server.run().await?;
        }
        Command::Reload { pid } => {
            let config = load_config(&args)?;
            reload(*pid, config.pid)?
        }
        Command::Check {
            addr,
            service,
            login,
            mechanism,
            maybe_password,
        } => {
            let password = match maybe_password {
                Some(pwd) => pwd.clone(),
                None => rpassword::prompt_password("Enter password: ")?,
            };
            check(addr, service, login, mechanism, &password).await?;
        }
        Command::PasswordHash { maybe_password } => {
            let password = match maybe_password {
                Some(pwd) => pwd.clone(),
                None => {
                    let password = rpassword::prompt_password("Enter password: ")?;
                    let password_confirm = rpassword::prompt_password("Confirm password: ")?;
                    if password != password_confirm {
                        bail!("Passwords don't match.");
                    }
                    password
                }
            };
            println!("{}", hash_password(&password)?);
        }
    }

    Ok(())
}

fn load_config(args: &Args) -> Result<Config> {
    if args.dev {
        use std::net::*;
        return Ok(Config {
            pid: None,
            bind_addrs: vec![SocketAddr::new(
                IpAddr::V6(Ipv6Addr::new(0, 0, 0, 0, 0, 0, 0, 1)),
                12345,
            )],
            io_timeout_secs: None,
            mechanisms: vec!["PLAIN".into(), "LOGIN".into()],
            users: UserManagement::Demo,
        });
    }
    read_config(args.config_file.clone())
}

fn reload(pid: Option<i32>, pid_path: Option<PathBuf>) -> Result<()> {
    let final_pid = match (pid, pid_path) {
        (Some(pid), _) => pid,
        (_, Some(path)) => {
            let mut f = std::fs::OpenOptions::new().read(true).open(path)?;
            let mut pidstr = String::new();
            f.read_to_string(&mut pidstr)?;
            pidstr.trim().parse::<i32>()?
        }
        _ => bail!("Unable to infer your daemon's PID"),
    };
    let pid = Pid::from_raw(final_pid);
    signal::kill(pid, signal::Signal::SIGUSR1)?;
    Ok(())
}

async fn check(
    addr: &str,
    service: &str,
    login: &str,
    mechanism: &str,
    password: &str,
) -> Result<()> {
    let mut mech: Box<dyn ClientMechanism> = match mechanism {
        "PLAIN" => Box::new(PlainClient::new("", login, password)),
        "LOGIN" => Box::new(LoginClient::new(login, password)),
        other => bail!("The check command does not know mechanism '{}'", other),
    };

    let mut client = Client::connect(addr).await?;
    let info = client.info();
    let mut mechanisms: Vec<&str> = info.mechanisms.keys().map(String::as_str).collect();
    mechanisms.sort();
    println!(
        "version {}.{}, spid {}, cuid {}, mechanisms {}",
        info.version.major,
        info.version.minor,
        info.spid,
        info.cuid,
        mechanisms.join(",")
    );

    let res = client.authenticate(service, mech.as_mut(), &[]).await?;
    client.close().await?;

    match res {
        AuthRes::Success(user) => {
            println!("OK {}", user.as_deref().unwrap_or(login));
            Ok(())
        }
        AuthRes::Failed(fail) => bail!(fail),
    }
}
