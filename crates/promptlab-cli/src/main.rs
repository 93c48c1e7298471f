//! PromptLab CLI
//!
//! Administration for a PromptLab database: schema setup, tenant projects,
//! and the sessions the API resolves bearer tokens against.

use clap::{Parser, Subcommand};
use promptlab_core::{migrations, validation, Session, TenantScope};
use promptlab_storage::{ProjectStore, SqliteStore};
use std::path::Path;

#[derive(Parser)]
#[command(name = "promptlab")]
#[command(version, about = "PromptLab administration CLI", long_about = None)]
struct Cli {
    /// Path to the SQLite database
    #[arg(short, long, default_value = "promptlab.db", global = true)]
    db: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a new database
    Init {
        /// Overwrite the database if it exists
        #[arg(short, long)]
        force: bool,
    },

    /// Apply pending migrations
    Migrate {
        /// Print applied migrations afterwards
        #[arg(long)]
        history: bool,
    },

    /// Manage projects
    #[command(subcommand)]
    Project(ProjectCommand),

    /// Manage API sessions
    #[command(subcommand)]
    Session(SessionCommand),

    /// Show database statistics
    Stats {
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
enum ProjectCommand {
    /// Create a project owned by a tenant
    Create {
        #[arg(short, long)]
        tenant: i64,

        #[arg(short, long)]
        name: String,
    },

    /// List a tenant's projects
    List {
        #[arg(short, long)]
        tenant: i64,
    },
}

#[derive(Subcommand)]
enum SessionCommand {
    /// Issue a session token
    Create {
        #[arg(short, long)]
        user: String,

        #[arg(short, long)]
        tenant: i64,

        /// Hours until the session expires; never expires when omitted
        #[arg(long)]
        ttl_hours: Option<i64>,
    },

    /// Revoke a session token
    Revoke { token: String },

    /// Delete expired sessions
    Purge,
}

type CliResult = Result<(), Box<dyn std::error::Error>>;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let db = cli.db.as_str();

    let result = match cli.command {
        Commands::Init { force } => init_database(db, force).await,
        Commands::Migrate { history } => migrate(db, history).await,
        Commands::Project(ProjectCommand::Create { tenant, name }) => {
            create_project(db, tenant, &name).await
        }
        Commands::Project(ProjectCommand::List { tenant }) => list_projects(db, tenant).await,
        Commands::Session(SessionCommand::Create {
            user,
            tenant,
            ttl_hours,
        }) => create_session(db, &user, tenant, ttl_hours).await,
        Commands::Session(SessionCommand::Revoke { token }) => revoke_session(db, &token).await,
        Commands::Session(SessionCommand::Purge) => purge_sessions(db).await,
        Commands::Stats { json } => show_stats(db, json).await,
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

/// Open a store on an existing database.
fn open_store(path: &str) -> Result<SqliteStore, Box<dyn std::error::Error>> {
    if !Path::new(path).exists() {
        return Err(format!(
            "Database '{}' does not exist. Run 'promptlab init' first.",
            path
        )
        .into());
    }
    Ok(SqliteStore::new(path))
}

/// Scope for administrative writes on behalf of `tenant_id`.
fn admin_scope(tenant_id: i64) -> Result<TenantScope, Box<dyn std::error::Error>> {
    let session = Session::new("cli", "cli", tenant_id);
    TenantScope::from_session(Some(&session))
        .map_err(|_| format!("Tenant {} is not a valid tenant", tenant_id).into())
}

async fn init_database(path: &str, force: bool) -> CliResult {
    if Path::new(path).exists() {
        if !force {
            return Err(format!(
                "Database already exists at '{}'. Use --force to overwrite.",
                path
            )
            .into());
        }
        println!("Removing existing database at '{}'", path);
        std::fs::remove_file(path)?;
    }

    let applied = SqliteStore::new(path).initialize().await?;
    println!(
        "Initialized database at '{}' ({} migrations applied)",
        path, applied
    );

    Ok(())
}

async fn migrate(path: &str, history: bool) -> CliResult {
    let store = open_store(path)?;
    let applied = store.initialize().await?;

    if applied == 0 {
        println!("Database is up to date");
    } else {
        println!("Applied {} migration(s)", applied);
    }

    let conn = rusqlite::Connection::open(path)?;
    println!(
        "Schema version {} (latest {})",
        migrations::schema_version(&conn)?,
        migrations::latest_version()
    );

    if history {
        println!("\nMigration history:");
        for applied in migrations::get_migration_history(&conn)? {
            println!(
                "  {:>4}  {}  ({})",
                applied.version, applied.description, applied.applied_at
            );
        }
    }

    Ok(())
}

async fn create_project(path: &str, tenant_id: i64, name: &str) -> CliResult {
    validation::validate_name(name, "Project name")?;
    let store = open_store(path)?;
    let scope = admin_scope(tenant_id)?;

    let project = store.create_project(&scope, name.trim()).await?;
    println!(
        "Created project {} '{}' for tenant {}",
        project.id, project.name, project.tenant_id
    );

    Ok(())
}

async fn list_projects(path: &str, tenant_id: i64) -> CliResult {
    let store = open_store(path)?;
    let scope = admin_scope(tenant_id)?;

    let projects = store.list_projects(&scope).await?;
    if projects.is_empty() {
        println!("No projects for tenant {}", tenant_id);
        return Ok(());
    }

    println!("{:<8} {:<40} {}", "ID", "NAME", "CREATED");
    println!("{}", "-".repeat(72));
    for project in projects {
        println!(
            "{:<8} {:<40} {}",
            project.id,
            project.name,
            project.created_at.format("%Y-%m-%d %H:%M:%S")
        );
    }

    Ok(())
}

async fn create_session(
    path: &str,
    user_id: &str,
    tenant_id: i64,
    ttl_hours: Option<i64>,
) -> CliResult {
    if user_id.trim().is_empty() {
        return Err("User ID is required".into());
    }
    let ttl = match ttl_hours {
        Some(hours) if hours <= 0 => return Err("--ttl-hours must be positive".into()),
        Some(hours) => Some(chrono::Duration::hours(hours)),
        None => None,
    };

    let store = open_store(path)?;
    let (session, expires_at) = store.create_session(user_id, tenant_id, ttl).await?;

    if !session.has_tenant() {
        eprintln!(
            "Warning: tenant {} is the no-tenant sentinel; the API will reject this session",
            tenant_id
        );
    }

    println!("{}", session.session_id);
    match expires_at {
        Some(at) => eprintln!("Expires at {}", at.to_rfc3339()),
        None => eprintln!("Never expires"),
    }

    Ok(())
}

async fn revoke_session(path: &str, token: &str) -> CliResult {
    let store = open_store(path)?;

    if store.revoke_session(token).await? {
        println!("Session revoked");
        Ok(())
    } else {
        Err("Session not found".into())
    }
}

async fn purge_sessions(path: &str) -> CliResult {
    let store = open_store(path)?;
    let purged = store.purge_expired_sessions().await?;
    println!("Purged {} expired session(s)", format_number(purged as i64));
    Ok(())
}

async fn show_stats(path: &str, json: bool) -> CliResult {
    let store = open_store(path)?;
    let stats = store.stats().await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&stats)?);
        return Ok(());
    }

    println!("Database Statistics:");
    println!("  Projects: {}", format_number(stats.projects));
    println!("  Datasets: {}", format_number(stats.datasets));
    println!("  Records: {}", format_number(stats.records));
    println!("  Prompts: {}", format_number(stats.prompts));
    println!("  Prompt versions: {}", format_number(stats.prompt_versions));
    println!("  Evaluation logs: {}", format_number(stats.evaluation_logs));
    println!("  Active sessions: {}", format_number(stats.active_sessions));

    Ok(())
}

fn format_number(n: i64) -> String {
    let negative = n.is_negative();
    let mut digits = n.unsigned_abs().to_string();
    let mut parts = Vec::new();

    while digits.len() > 3 {
        let chunk = digits.split_off(digits.len() - 3);
        parts.push(chunk);
    }
    parts.push(digits);
    parts.reverse();

    let mut formatted = parts.join(",");
    if negative {
        formatted.insert(0, '-');
    }
    formatted
}
