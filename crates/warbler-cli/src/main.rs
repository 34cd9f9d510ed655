use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use serde_json::json;
use tracing::{info, warn};

use warbler_db::{ConstraintViolation, Database, NewUser, UserRow};
use warbler_types::models::{Message, User};

/// Warbler database administration
#[derive(Parser)]
#[command(name = "warbler")]
#[command(about = "Manage the Warbler user/message database", long_about = None)]
struct Cli {
    /// SQLite database file
    #[arg(long, env = "WARBLER_DB_PATH", default_value = "warbler.db")]
    db: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the database file and apply migrations
    Init,

    /// Register a new user
    Signup {
        #[arg(long)]
        username: String,
        #[arg(long)]
        email: String,
        #[arg(long, env = "WARBLER_PASSWORD", hide_env_values = true)]
        password: String,
        #[arg(long)]
        image_url: Option<String>,
        #[arg(long)]
        bio: Option<String>,
        #[arg(long)]
        location: Option<String>,
    },

    /// Check a username/password pair
    Authenticate {
        #[arg(long)]
        username: String,
        #[arg(long, env = "WARBLER_PASSWORD", hide_env_values = true)]
        password: String,
    },

    /// Post a message as a user
    Post {
        #[arg(long)]
        username: String,
        text: String,
    },

    /// Make one user follow another
    Follow {
        #[arg(long)]
        username: String,
        target: String,
    },

    /// Stop following a user
    Unfollow {
        #[arg(long)]
        username: String,
        target: String,
    },

    /// Toggle a like on a message
    Like {
        #[arg(long)]
        username: String,
        message_id: i64,
    },

    /// Show a user's profile and counters
    Profile { username: String },

    /// Show a user's home feed
    Timeline {
        username: String,
        #[arg(long, default_value_t = 100)]
        limit: u32,
    },

    /// Delete a user together with their messages, follows and likes
    DeleteUser { username: String },
}

fn main() -> ExitCode {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warbler=info,warbler_db=info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match run(cli) {
        Ok(code) => code,
        Err(e) => {
            if let Some(violation) = e.downcast_ref::<ConstraintViolation>() {
                eprintln!("error: {}", violation);
            } else {
                eprintln!("error: {:#}", e);
            }
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<ExitCode> {
    let db = Database::open(&cli.db)
        .with_context(|| format!("opening database {}", cli.db.display()))?;

    match cli.command {
        Commands::Init => {
            info!("Database ready at {}", cli.db.display());
        }
        Commands::Signup {
            username,
            email,
            password,
            image_url,
            bio,
            location,
        } => {
            let new = NewUser {
                email,
                username,
                image_url,
                header_image_url: None,
                bio,
                location,
            };
            let user = db.signup(&new, &password)?;
            info!("{}", user);
            print_json(&User::from(user))?;
        }
        Commands::Authenticate { username, password } => {
            match db.authenticate(&username, &password)? {
                Some(user) => print_json(&User::from(user))?,
                None => {
                    warn!(username = %username, "Invalid credentials");
                    return Ok(ExitCode::FAILURE);
                }
            }
        }
        Commands::Post { username, text } => {
            let user = find_user(&db, &username)?;
            let message = db.insert_message(user.id, &text)?;
            print_json(&Message::from(message))?;
        }
        Commands::Follow { username, target } => {
            let user = find_user(&db, &username)?;
            let target = find_user(&db, &target)?;
            let created = db.follow(user.id, target.id)?;
            print_json(&json!({ "following": true, "created": created }))?;
        }
        Commands::Unfollow { username, target } => {
            let user = find_user(&db, &username)?;
            let target = find_user(&db, &target)?;
            let removed = db.unfollow(user.id, target.id)?;
            print_json(&json!({ "following": false, "removed": removed }))?;
        }
        Commands::Like {
            username,
            message_id,
        } => {
            let user = find_user(&db, &username)?;
            let liked = db.toggle_like(user.id, message_id)?;
            let total = db.total_likes(user.id)?;
            print_json(&json!({ "liked": liked, "total_likes": total }))?;
        }
        Commands::Profile { username } => {
            let user = find_user(&db, &username)?;
            let profile = db
                .profile(user.id)?
                .with_context(|| format!("user {} disappeared", username))?;
            print_json(&profile)?;
        }
        Commands::Timeline { username, limit } => {
            let user = find_user(&db, &username)?;
            let messages: Vec<Message> = db
                .timeline(user.id, limit)?
                .into_iter()
                .map(Message::from)
                .collect();
            print_json(&messages)?;
        }
        Commands::DeleteUser { username } => {
            let user = find_user(&db, &username)?;
            db.delete_user(user.id)?;
            info!("Deleted {}", user);
        }
    }

    Ok(ExitCode::SUCCESS)
}

fn find_user(db: &Database, username: &str) -> Result<UserRow> {
    match db.get_user_by_username(username)? {
        Some(user) => Ok(user),
        None => bail!("no such user: {}", username),
    }
}

fn print_json<T: serde::Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
