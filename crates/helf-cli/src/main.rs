mod chat;
mod demo;
mod state;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use helf_chat::identity::IdentityResolver;
use helf_chat::{Backend, ConversationTarget, directory};
use helf_supabase::{SupabaseAuth, SupabaseConfig};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "helf", about = "helf direct messaging")]
struct Cli {
    /// Project base URL.
    #[arg(long, env = "HELF_URL", global = true)]
    url: Option<String>,

    /// Public anonymous API key.
    #[arg(long, env = "HELF_ANON_KEY", global = true, hide_env_values = true)]
    anon_key: Option<String>,

    /// Access token; overrides the session saved by `helf login`.
    #[arg(long, env = "HELF_ACCESS_TOKEN", global = true, hide_env_values = true)]
    access_token: Option<String>,

    /// State directory.
    #[arg(long, env = "HELF_STATE_DIR", global = true)]
    state_dir: Option<PathBuf>,

    /// Use a seeded in-process backend instead of a hosted project.
    #[arg(long, global = true)]
    memory: bool,

    /// Demo user to act as with --memory (ada, bob, cleo or an id).
    #[arg(long = "as", global = true, default_value = "ada")]
    as_user: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Sign in with email and password.
    Login {
        #[arg(long)]
        email: String,
        /// Prompted for when omitted.
        #[arg(long)]
        password: Option<String>,
    },
    /// Create an account.
    Signup {
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: Option<String>,
    },
    /// Sign out and forget the saved session.
    Logout,
    /// Show the signed-in user.
    Whoami,
    /// List people you can chat with.
    Users {
        /// Case-insensitive name filter.
        #[arg(long, default_value = "")]
        search: String,
    },
    /// Open a conversation.
    Chat {
        /// The other user's id (or demo name with --memory).
        other: String,
        /// Chat inside a help request instead of directly.
        #[arg(long)]
        task: Option<String>,
    },
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "helf=warn".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let state_dir = match &cli.state_dir {
        Some(dir) => dir.clone(),
        None => state::default_state_dir()?,
    };

    match &cli.command {
        Command::Login { email, password } => {
            let password = password_or_prompt(password.as_deref())?;
            let auth = hosted_auth(&cli, None)?;
            let session = auth.sign_in_with_password(email, &password).await?;
            state::save_session(&state_dir, &session)?;
            println!(
                "Signed in as {} ({})",
                session.user.email.as_deref().unwrap_or(email),
                session.user.id
            );
        }
        Command::Signup { email, password } => {
            let password = password_or_prompt(password.as_deref())?;
            let user = hosted_auth(&cli, None)?.sign_up(email, &password).await?;
            println!("Account created ({}). Run `helf login` to sign in.", user.id);
        }
        Command::Logout => {
            let Some(saved) = state::load_session(&state_dir)? else {
                println!("Not signed in.");
                return Ok(());
            };
            if let Err(e) = hosted_auth(&cli, Some(saved.access_token))?.sign_out().await {
                tracing::warn!(err = %e, "server-side sign out failed");
            }
            state::clear_session(&state_dir)?;
            println!("Signed out.");
        }
        Command::Whoami => {
            let backend = connect(&cli, &state_dir).await?;
            let Some(id) = backend.auth.current_user_id().await else {
                bail!("not signed in");
            };
            match backend.auth.current_user_email().await {
                Some(email) => println!("{email} ({id})"),
                None => println!("{id}"),
            }
        }
        Command::Users { search } => {
            let backend = connect(&cli, &state_dir).await?;
            let me = IdentityResolver::new()
                .resolve(backend.auth.as_ref())
                .await?;
            let peers = directory::list_peers(&backend, &me, search).await?;
            if peers.is_empty() {
                println!("No users found.");
            }
            for peer in peers {
                println!(
                    "{:<24} {}  {}",
                    peer.display_name(),
                    peer.user_id,
                    peer.avatar_url.as_deref().unwrap_or("-")
                );
            }
        }
        Command::Chat { other, task } => {
            let backend = connect(&cli, &state_dir).await?;
            let other_user_id = if cli.memory {
                demo::resolve_user(other).to_string()
            } else {
                other.clone()
            };
            let target = match task {
                Some(task_id) => ConversationTarget::Task {
                    task_id: task_id.clone(),
                    other_user_id,
                },
                None => ConversationTarget::Peer { other_user_id },
            };
            chat::run(backend, target).await?;
        }
    }

    Ok(())
}

/// The backend selected by the flags: the seeded demo, or the hosted project
/// authenticated with `--access-token` or the saved session.
async fn connect(cli: &Cli, state_dir: &std::path::Path) -> Result<Backend> {
    if cli.memory {
        let mem = demo::community().await;
        let me = demo::resolve_user(&cli.as_user);
        let echo = if me == demo::BOB { demo::ADA } else { demo::BOB };
        demo::spawn_echo(mem.clone(), echo).await?;
        return Ok(mem.backend_as(Some(me)));
    }

    let token = match &cli.access_token {
        Some(token) => Some(token.clone()),
        None => state::load_session(state_dir)?.map(|s| s.access_token),
    };
    let config = hosted_config(cli)?.with_access_token(token);
    helf_supabase::backend(&config)
}

fn hosted_config(cli: &Cli) -> Result<SupabaseConfig> {
    let (Some(url), Some(anon_key)) = (&cli.url, &cli.anon_key) else {
        bail!("set --url and --anon-key (or HELF_URL and HELF_ANON_KEY), or pass --memory");
    };
    SupabaseConfig::new(url, anon_key)
}

fn hosted_auth(cli: &Cli, token: Option<String>) -> Result<SupabaseAuth> {
    if cli.memory {
        bail!("account commands need a hosted project; drop --memory");
    }
    let config = hosted_config(cli)?.with_access_token(token);
    Ok(SupabaseAuth::new(helf_supabase::http_client()?, config))
}

fn password_or_prompt(password: Option<&str>) -> Result<String> {
    match password {
        Some(p) => Ok(p.to_string()),
        None => rpassword::prompt_password("Password: ").context("failed to read password"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_dir_flag_is_the_only_override() {
        let cli = Cli::try_parse_from(["helf", "--state-dir", "/tmp/helf-a", "whoami"]).unwrap();
        assert_eq!(cli.state_dir, Some(PathBuf::from("/tmp/helf-a")));

        let cli = Cli::try_parse_from(["helf", "--memory", "users"]).unwrap();
        assert!(cli.memory);
        assert_eq!(cli.as_user, "ada");
    }
}
