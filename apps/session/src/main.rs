use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use chrono::Utc;
use clap::{Args, Parser, Subcommand};
use serde_json::{json, Value};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use jobnex_session::models::{ProfileUpdate, UserType};
use jobnex_session::{BillingService, Config, SessionState, SessionStore, SupabaseClient};

/// How often `watch` proactively refreshes the access token.
const WATCH_REFRESH_INTERVAL: Duration = Duration::from_secs(600);

#[derive(Parser)]
#[command(name = "jobnex", version, about = "JobNex account and subscription client")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Args)]
struct Credentials {
    #[arg(long, env = "JOBNEX_EMAIL")]
    email: String,
    #[arg(long, env = "JOBNEX_PASSWORD", hide_env_values = true)]
    password: String,
}

#[derive(Subcommand)]
enum Command {
    /// Sign in and print the loaded session
    SignIn(Credentials),
    /// Create an account and its profile
    SignUp {
        #[command(flatten)]
        credentials: Credentials,
        #[arg(long)]
        full_name: String,
        /// candidate, freelancer or recruiter (default: candidate)
        #[arg(long)]
        user_type: Option<UserType>,
    },
    /// Sign in, then revoke the account's sessions
    SignOut(Credentials),
    /// Send a password-reset email
    ResetPassword {
        #[arg(long)]
        email: String,
    },
    /// Update profile fields; --new-email also changes the login email
    UpdateProfile {
        #[command(flatten)]
        credentials: Credentials,
        #[arg(long)]
        new_email: Option<String>,
        #[arg(long)]
        full_name: Option<String>,
        #[arg(long)]
        user_type: Option<UserType>,
        #[arg(long)]
        title: Option<String>,
        #[arg(long)]
        phone: Option<String>,
        #[arg(long)]
        location: Option<String>,
        #[arg(long)]
        linkedin: Option<String>,
        #[arg(long)]
        website: Option<String>,
    },
    /// Change the account password
    UpdatePassword {
        #[command(flatten)]
        credentials: Credentials,
        #[arg(long)]
        new_password: String,
    },
    /// Print profile, subscription and access summary
    Status(Credentials),
    /// Stay signed in and print every session change until Ctrl-C
    Watch(Credentials),
    /// Start a hosted checkout for a price
    Checkout {
        #[command(flatten)]
        credentials: Credentials,
        #[arg(long)]
        price_id: String,
    },
    /// Open the billing portal for the current subscription
    Portal(Credentials),
    /// List invoices billed to the account
    Invoices(Credentials),
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::from_env()?;

    // Logs go to stderr; stdout carries command output.
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!(
                "jobnex_session={0},jobnex={0}",
                &config.rust_log
            ))
        }))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    info!("Starting JobNex session client v{}", env!("CARGO_PKG_VERSION"));

    let client = Arc::new(SupabaseClient::new(&config)?);
    let store = Arc::new(SessionStore::new(client.clone()));
    let billing = BillingService::new(client.clone());

    match cli.command {
        Command::SignIn(creds) => {
            store.sign_in(&creds.email, &creds.password).await?;
            print_json(&render(&store.state()))?;
        }
        Command::SignUp {
            credentials,
            full_name,
            user_type,
        } => {
            store
                .sign_up(
                    &credentials.email,
                    &credentials.password,
                    &full_name,
                    user_type,
                )
                .await?;
            println!(
                "Account created for {}. Confirm the email address before signing in.",
                credentials.email
            );
        }
        Command::SignOut(creds) => {
            store.sign_in(&creds.email, &creds.password).await?;
            store.sign_out().await?;
            println!("Signed out.");
        }
        Command::ResetPassword { email } => {
            store.reset_password(&email).await?;
            println!("If an account exists for {email}, a reset link is on its way.");
        }
        Command::UpdateProfile {
            credentials,
            new_email,
            full_name,
            user_type,
            title,
            phone,
            location,
            linkedin,
            website,
        } => {
            let updates = ProfileUpdate {
                email: new_email,
                full_name,
                user_type,
                title,
                phone,
                location,
                linkedin,
                website,
            };
            if updates.is_empty() {
                bail!("Nothing to update: pass at least one profile field");
            }
            store
                .sign_in(&credentials.email, &credentials.password)
                .await?;
            store.update_profile(updates).await?;
            print_json(&render(&store.state()))?;
        }
        Command::UpdatePassword {
            credentials,
            new_password,
        } => {
            store
                .sign_in(&credentials.email, &credentials.password)
                .await?;
            store.update_password(&new_password).await?;
            println!("Password updated.");
        }
        Command::Status(creds) => {
            store.sign_in(&creds.email, &creds.password).await?;
            print_json(&render(&store.state()))?;
        }
        Command::Watch(creds) => {
            let _listener = store.listen();
            store.sign_in(&creds.email, &creds.password).await?;
            watch(&store, &client).await?;
            store.sign_out().await?;
        }
        Command::Checkout {
            credentials,
            price_id,
        } => {
            store
                .sign_in(&credentials.email, &credentials.password)
                .await?;
            let user = store.state().user.context("Signed in user has no profile")?;
            let session = billing
                .create_checkout_session(&price_id, user.id, user.user_type())
                .await?;
            print_json(&json!({
                "session_id": session.session_id,
                "url": session.url,
            }))?;
        }
        Command::Portal(creds) => {
            store.sign_in(&creds.email, &creds.password).await?;
            let subscription = store
                .state()
                .subscription
                .context("This account has no subscription to manage")?;
            let portal = billing.create_portal_session(&subscription).await?;
            println!("{}", portal.url);
        }
        Command::Invoices(creds) => {
            store.sign_in(&creds.email, &creds.password).await?;
            let user = store.state().user.context("Signed in user has no profile")?;
            let invoices = billing.list_invoices(user.id).await?;
            print_json(&serde_json::to_value(&invoices)?)?;
        }
    }

    Ok(())
}

async fn watch(store: &SessionStore, client: &SupabaseClient) -> Result<()> {
    let mut changes = store.subscribe();
    let mut refresh = tokio::time::interval(WATCH_REFRESH_INTERVAL);
    refresh.tick().await; // first tick fires immediately

    print_json(&render(&store.state()))?;
    loop {
        tokio::select! {
            changed = changes.changed() => {
                if changed.is_err() {
                    break;
                }
                let state = changes.borrow_and_update().clone();
                if !state.loading {
                    print_json(&render(&state))?;
                }
            }
            _ = refresh.tick() => {
                if let Err(e) = client.refresh_session().await {
                    warn!("Token refresh failed: {e}");
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted, signing out");
                break;
            }
        }
    }
    Ok(())
}

fn render(state: &SessionState) -> Value {
    json!({
        "phase": format!("{:?}", state.phase()),
        "user": state.user,
        "subscription": state.subscription,
        "preferences": state.preferences,
        "access": state.access(Utc::now()),
        "last_error": state.last_error.as_ref().map(|e| json!({
            "kind": e.kind().as_str(),
            "message": e.to_string(),
        })),
    })
}

fn print_json(value: &Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
