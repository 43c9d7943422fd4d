//! Mopito Accounts CLI
//!
//! Administrative entry point for the account store: create users and
//! superusers, manage passwords, groups and permission grants, and issue
//! tokens. Every command prints the JSON shape a client would receive.
//!
//! Usage:
//!   mopito-accounts create-superuser --email admin@clinic.example --password '...'
//!   mopito-accounts create-user --email nurse@clinic.example --password '...' --user-typ STAFF
//!   mopito-accounts grant --email nurse@clinic.example --permission users.view_user
//!   mopito-accounts token --email nurse@clinic.example --password '...'

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use mopito_accounts::auth::serializers::{
    CreateUserPayload, GroupDetailView, GroupPayload, PasswordReset, PermissionView,
    SelfPasswordChange, UserDetailView, UserView,
};
use mopito_accounts::auth::tokens::{self, TokenObtainRequest, TokenRefreshRequest};
use mopito_accounts::auth::ExtraFields;
use mopito_accounts::config::{load_env, AuthConfig};
use mopito_accounts::{AccountError, AuthState};
use serde::Serialize;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "mopito-accounts")]
#[command(about = "Manage Mopito user accounts, permissions and tokens")]
struct Cli {
    /// SQLite database path (overrides AUTH_DB_PATH)
    #[arg(long)]
    db_path: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Create a regular user
    CreateUser {
        #[arg(long)]
        email: String,
        #[arg(long, env = "MOPITO_PASSWORD")]
        password: String,
        /// PATIENT, STAFF or ADMIN
        #[arg(long)]
        user_typ: Option<String>,
        /// Group names to join
        #[arg(long = "group")]
        groups: Vec<String>,
    },

    /// Create a user with staff and superuser status
    CreateSuperuser {
        #[arg(long)]
        email: String,
        /// Omit to create the account without a usable password
        #[arg(long, env = "MOPITO_PASSWORD")]
        password: Option<String>,
    },

    /// Reset a password without the current one
    SetPassword {
        #[arg(long)]
        email: String,
        #[arg(long, env = "MOPITO_PASSWORD")]
        password: String,
    },

    /// Change a password, proving knowledge of the current one
    ChangePassword {
        #[arg(long)]
        email: String,
        #[arg(long)]
        old_password: String,
        #[arg(long, env = "MOPITO_PASSWORD")]
        password: String,
    },

    /// Deactivate an account (accounts are never deleted)
    Deactivate {
        #[arg(long)]
        email: String,
    },

    /// Show a user with groups and effective permissions
    Show {
        #[arg(long)]
        email: String,
    },

    /// List all users
    List,

    /// List all permissions
    Permissions,

    /// Create a group
    CreateGroup {
        #[arg(long)]
        name: String,
        /// Permission codes (`app_label.codename`) granted to the group
        #[arg(long = "permission")]
        permissions: Vec<String>,
    },

    /// Show a group with its permissions
    ShowGroup {
        #[arg(long)]
        name: String,
    },

    /// Add a user to a group
    AddToGroup {
        #[arg(long)]
        email: String,
        #[arg(long)]
        group: String,
    },

    /// Grant a permission directly to a user
    Grant {
        #[arg(long)]
        email: String,
        /// Permission code, e.g. `users.view_user`
        #[arg(long)]
        permission: String,
    },

    /// Obtain an access/refresh token pair
    Token {
        #[arg(long)]
        email: String,
        #[arg(long, env = "MOPITO_PASSWORD")]
        password: String,
    },

    /// Exchange a refresh token for a new access token
    Refresh {
        #[arg(long)]
        refresh: String,
    },
}

fn main() -> Result<()> {
    load_env();
    init_tracing();

    let cli = Cli::parse();

    let mut config = AuthConfig::from_env()?;
    if let Some(db_path) = cli.db_path {
        config.db_path = db_path;
    }
    let state = AuthState::from_config(&config)?;

    run(&state, cli.command)
}

/// Initialize tracing; logs go to stderr so stdout stays parseable JSON
fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "mopito_accounts=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn run(state: &AuthState, command: Commands) -> Result<()> {
    let manager = &state.manager;
    let store = state.store();

    match command {
        Commands::CreateUser {
            email,
            password,
            user_typ,
            groups,
        } => {
            let group_ids = groups
                .iter()
                .map(|name| group_id(state, name))
                .collect::<Result<Vec<_>>>()?;
            let payload = CreateUserPayload {
                email: Some(email),
                password: Some(password),
                user_typ,
                groups: Some(group_ids),
                ..Default::default()
            };
            print_json(&payload.create(manager)?)
        }

        Commands::CreateSuperuser { email, password } => {
            let user = manager.create_superuser(&email, password.as_deref(), ExtraFields::default())?;
            print_json(&UserView::from(&user))
        }

        Commands::SetPassword { email, password } => {
            let mut user = manager.get_user_by_email(&email)?;
            PasswordReset {
                password: Some(password),
            }
            .save(manager, &mut user)?;
            print_json(&UserView::from(&user))
        }

        Commands::ChangePassword {
            email,
            old_password,
            password,
        } => {
            let mut user = manager.get_user_by_email(&email)?;
            SelfPasswordChange {
                old_password: Some(old_password),
                password: Some(password),
            }
            .save(manager, &mut user)?;
            print_json(&UserView::from(&user))
        }

        Commands::Deactivate { email } => {
            let mut user = manager.get_user_by_email(&email)?;
            manager.deactivate(&mut user)?;
            print_json(&UserView::from(&user))
        }

        Commands::Show { email } => {
            let user = manager.get_user_by_email(&email)?;
            print_json(&UserDetailView::load(store, &user)?)
        }

        Commands::List => {
            let users: Vec<UserView> = store.list_users()?.iter().map(UserView::from).collect();
            print_json(&users)
        }

        Commands::Permissions => print_json(&PermissionView::many(&store.list_permissions()?)),

        Commands::CreateGroup { name, permissions } => {
            let permission_ids = permissions
                .iter()
                .map(|code| permission_id(state, code))
                .collect::<Result<Vec<_>>>()?;
            let payload = GroupPayload {
                name: Some(name),
                permissions: Some(permission_ids),
            };
            print_json(&payload.create(store)?)
        }

        Commands::ShowGroup { name } => {
            let group = store
                .get_group_by_name(&name)?
                .ok_or(AccountError::GroupNotFound)?;
            print_json(&GroupDetailView::load(store, &group)?)
        }

        Commands::AddToGroup { email, group } => {
            let user = manager.get_user_by_email(&email)?;
            let mut ids: Vec<i64> = store.user_groups(&user.id)?.iter().map(|g| g.id).collect();
            ids.push(group_id(state, &group)?);

            let payload = CreateUserPayload {
                groups: Some(ids),
                ..Default::default()
            };
            print_json(&payload.update(manager, &user.id)?)
        }

        Commands::Grant { email, permission } => {
            let user = manager.get_user_by_email(&email)?;
            let mut ids: Vec<i64> = store
                .user_permissions(&user.id)?
                .iter()
                .map(|p| p.id)
                .collect();
            ids.push(permission_id(state, &permission)?);

            let payload = CreateUserPayload {
                user_permissions: Some(ids),
                ..Default::default()
            };
            print_json(&payload.update(manager, &user.id)?)
        }

        Commands::Token { email, password } => {
            let response = tokens::obtain_pair(state, &TokenObtainRequest { email, password })?;
            print_json(&response)
        }

        Commands::Refresh { refresh } => {
            let response = tokens::refresh_pair(state, &TokenRefreshRequest { refresh })?;
            print_json(&response)
        }
    }
}

fn group_id(state: &AuthState, name: &str) -> Result<i64> {
    let group = state
        .store()
        .get_group_by_name(name)?
        .with_context(|| format!("Unknown group: {name}"))?;
    Ok(group.id)
}

fn permission_id(state: &AuthState, code: &str) -> Result<i64> {
    let permission = state
        .store()
        .find_permission_by_code(code)?
        .with_context(|| format!("Unknown permission: {code}"))?;
    Ok(permission.id)
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
