use std::error::Error;

use clap::{Parser, Subcommand};
use tracing::info;

use quoteboard::auth::password;
use quoteboard::config::Config;
use quoteboard::model::{NewUser, Role, UserUpdate};
use quoteboard::{logging, server, storage, validate};

#[derive(Parser)]
#[command(name = "quoteboard", version, about)]
struct Cli {
    /// Path to the configuration file
    #[arg(long, env = "QUOTEBOARD_CONFIG", default_value = "/etc/quoteboard/config.toml")]
    config: String,
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP server (default)
    Serve,
    /// Create an account
    AddUser {
        username: String,
        email: String,
        #[arg(long)]
        password: String,
        #[arg(long, default_value = "user")]
        role: Role,
    },
    /// Change the role of an existing account
    SetRole { username: String, role: Role },
    /// Validate the configuration and test the storage connection
    Check,
}

#[tokio::main(flavor = "multi_thread")]
async fn main() -> Result<(), Box<dyn Error + Send + Sync>> {
    let cli = Cli::parse();
    let cfg = Config::from_file(&cli.config)?;
    logging::init(&cfg.log)?;

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => server::run(cfg).await,
        Command::AddUser {
            username,
            email,
            password,
            role,
        } => add_user(&cfg, username, email, password, role).await,
        Command::SetRole { username, role } => set_role(&cfg, &username, role).await,
        Command::Check => {
            let backend = storage::open(&cfg).await?;
            backend.test_connection().await?;
            println!("configuration ok, {} storage reachable", backend.kind);
            Ok(())
        }
    }
}

async fn add_user(
    cfg: &Config,
    username: String,
    email: String,
    password: String,
    role: Role,
) -> Result<(), Box<dyn Error + Send + Sync>> {
    let mut check = validate::Checker::new();
    check.username(&username);
    check.email("email", &email);
    check.password("password", &password);
    check.finish()?;

    let backend = storage::open(cfg).await?;
    let user = backend
        .users
        .create_user(NewUser {
            username: username.trim().to_string(),
            email: email.trim().to_lowercase(),
            password_hash: password::hash_password_blocking(password).await?,
            role,
            ip: None,
            user_agent: None,
        })
        .await?;
    info!(id = user.id, username = %user.username, role = %user.role, "account created");
    println!("created {} ({}) with id {}", user.username, user.role, user.id);
    Ok(())
}

async fn set_role(cfg: &Config, username: &str, role: Role) -> Result<(), Box<dyn Error + Send + Sync>> {
    let backend = storage::open(cfg).await?;
    let user = backend
        .users
        .find_user_by_login(username)
        .await?
        .ok_or_else(|| format!("no such user: {username}"))?;
    let update = UserUpdate {
        role: Some(role),
        ..UserUpdate::default()
    };
    backend
        .users
        .update_user(user.id, update)
        .await?
        .ok_or_else(|| format!("no such user: {username}"))?;
    info!(username, role = %role, "role changed");
    println!("{username} is now {role}");
    Ok(())
}
