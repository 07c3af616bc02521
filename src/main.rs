use anyhow::{Context, Result};
use chrono::Local;
use clap::Parser;
use std::path::PathBuf;

use taskdeck::api::ApiClient;
use taskdeck::app::{ContentView, Dashboard, LoadState};
use taskdeck::storage::{Database, DatabaseError};
use taskdeck::{Config, PreferenceStore};

/// Get the config directory path (~/.config/taskdeck/)
fn get_config_dir() -> Result<PathBuf> {
    let home = std::env::var("HOME").context("HOME environment variable not set")?;
    Ok(PathBuf::from(home).join(".config").join("taskdeck"))
}

#[derive(Parser, Debug)]
#[command(name = "taskdeck", about = "Task and project dashboard for a REST task store")]
struct Args {
    /// Config file (default: ~/.config/taskdeck/config.toml)
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Task API base URL (overrides config and TASKDECK_API_URL)
    #[arg(long, value_name = "URL")]
    api_url: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();

    let config_dir = get_config_dir()?;
    if !config_dir.exists() {
        std::fs::create_dir_all(&config_dir).context("Failed to create config directory")?;
    }

    // User-only access: the preference DB may hold an avatar image
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        if let Err(e) =
            std::fs::set_permissions(&config_dir, std::fs::Permissions::from_mode(0o700))
        {
            tracing::warn!(
                path = %config_dir.display(),
                error = %e,
                "Failed to set config directory permissions to 0700"
            );
        }
    }

    let config_path = args
        .config
        .clone()
        .unwrap_or_else(|| config_dir.join("config.toml"));
    let mut config = Config::load(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path.display()))?;
    config.apply_env_overrides();
    if let Some(url) = args.api_url {
        config.api_url = url;
    }

    let db_path = config_dir.join("prefs.db");
    let db_path_str = db_path
        .to_str()
        .context("Config directory path is not valid UTF-8")?;
    let db = match Database::open(db_path_str).await {
        Ok(db) => db,
        Err(DatabaseError::InstanceLocked) => {
            anyhow::bail!("{}", DatabaseError::InstanceLocked);
        }
        Err(e) => return Err(e).context("Failed to open preference database"),
    };

    let mut prefs = match PreferenceStore::load(&config, db).await {
        Ok(prefs) => prefs,
        Err(e) => {
            tracing::warn!(error = %e, "Failed to load stored preferences, using config defaults");
            PreferenceStore::from_config(&config)
        }
    };

    if !prefs.onboarding_complete() {
        println!("Welcome to taskdeck!");
        println!("Create a project, add tasks to it, and track progress from here.");
        println!();
        if let Err(e) = prefs.complete_onboarding().await {
            tracing::warn!(error = %e, "Failed to record onboarding");
        }
    }

    let api = ApiClient::new(&config.api_url, config.request_timeout())
        .with_context(|| format!("Invalid api_url: {}", config.api_url))?;
    tracing::info!(api_url = %api.base_url(), "Connecting to task API");

    let (mut dashboard, mut events) = Dashboard::new(api);
    dashboard.reload();
    while dashboard.has_pending() {
        match events.recv().await {
            Some(event) => dashboard.handle_event(event),
            None => break,
        }
    }

    print_dashboard(&dashboard, &prefs.profile_name());
    Ok(())
}

fn print_dashboard(dashboard: &Dashboard, profile_name: &str) {
    println!("Hello, {}!", profile_name);
    println!();

    if dashboard.load_state() == LoadState::Failed {
        if let Some(notice) = dashboard.notice() {
            println!("{}", notice.message);
        }
        return;
    }

    println!(
        "{}  ({} tasks remaining)",
        dashboard.header_title(),
        dashboard.active_count()
    );

    let today = Local::now().date_naive();
    match dashboard.content_view() {
        ContentView::Loading => println!("  Loading..."),
        ContentView::NoProjects => println!("  Create a project to begin."),
        ContentView::Empty => println!("  Nothing to do. Add a task to get started."),
        ContentView::Tasks => {
            for task in dashboard.tasks() {
                let check = if task.is_complete { "x" } else { " " };
                let due = task
                    .due_date
                    .map(|d| {
                        let marker = if task.is_overdue(today) { " !" } else { "" };
                        format!("  due {}{}", d.format("%b %-d"), marker)
                    })
                    .unwrap_or_default();
                println!(
                    "  [{}] {} ({}){}",
                    check,
                    task.title,
                    task.priority.name(),
                    due
                );
            }
        }
    }

    println!();
    println!("Overdue Tasks ({})", dashboard.notification_count());
    if dashboard.notifications().is_empty() {
        println!("  No overdue tasks.");
    }
    for task in dashboard.notifications() {
        let due = task
            .due_date
            .map(|d| d.to_string())
            .unwrap_or_default();
        println!("  \"{}\" is overdue! Due on: {}", task.title, due);
    }

    if !dashboard.projects().is_empty() {
        println!();
        println!("Projects ({}% complete overall)", dashboard.overall_progress());
        for project in dashboard.projects() {
            println!(
                "  {}  {}/{} ({:.0}%)",
                project.name,
                project.completed_count,
                project.task_count,
                project.progress() * 100.0
            );
        }
    }
}
