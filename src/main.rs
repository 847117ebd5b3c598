use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use tracing_subscriber::EnvFilter;

use persistent_binder::{
    api::ProjectApi,
    codec,
    storage::StateRecords,
    FilesystemRecords,
    LaunchOptions,
    RecordKey,
    Spawner,
    SpawnerConfig,
};

#[derive(Parser)]
#[command(name = "persistent-binder", about = "Persistent per-user projects for notebook servers")]
struct Cli {
    /// Config file (default: ~/.config/persistent-binder/config.yaml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Plan and record a server start
    Launch {
        #[arg(long)]
        user: String,
        #[arg(long, default_value = "")]
        server: String,
        /// Launch options as a JSON object
        #[arg(long)]
        options: Option<String>,
        #[arg(long, value_enum, default_value_t = Format::Json)]
        format: Format,
    },
    /// Record a server stop
    Stop {
        #[arg(long)]
        user: String,
        #[arg(long, default_value = "")]
        server: String,
    },
    /// Query or delete a user's projects
    Projects {
        #[command(subcommand)]
        command: ProjectsCommand,
    },
    /// Manage known users
    User {
        #[command(subcommand)]
        command: UserCommand,
    },
    /// Print the display and directory name of a repository URL
    Name { repo_url: String },
}

#[derive(Subcommand)]
enum ProjectsCommand {
    List {
        #[arg(long)]
        user: String,
    },
    /// Body: {"repo_url": ..., "name": ..., "id": ...}
    Delete {
        #[arg(long)]
        user: String,
        #[arg(long)]
        body: String,
    },
}

#[derive(Subcommand)]
enum UserCommand {
    Add { name: String },
}

#[derive(Clone, Copy, ValueEnum)]
enum Format {
    Json,
    Yaml,
}

fn print<T: Serialize>(value: &T, format: Format) -> Result<()> {
    let text = match format {
        Format::Json => serde_json::to_string_pretty(value)?,
        Format::Yaml => serde_yaml::to_string(value)?,
    };
    println!("{}", text.trim_end());
    Ok(())
}

fn open_spawner(config_path: Option<&Path>) -> Result<Spawner<FilesystemRecords>> {
    let config = SpawnerConfig::load(config_path).context("Failed to load configuration")?;
    let records = FilesystemRecords::new(&config.state_dir)?;
    Ok(Spawner::new(&config, records))
}

fn main() -> Result<()> {
    // stdout carries results; logs go to stderr
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Launch {
            user,
            server,
            options,
            format,
        } => {
            let spawner = open_spawner(cli.config.as_deref())?;
            let options: LaunchOptions = match options {
                Some(json) => serde_json::from_str(&json).context("Invalid launch options")?,
                None => LaunchOptions::new(),
            };
            let plan = spawner.start(&RecordKey::new(user, server), &options)?;
            print(&plan, format)?;
        }
        Command::Stop { user, server } => {
            let spawner = open_spawner(cli.config.as_deref())?;
            let key = RecordKey::new(user, server);
            match spawner.stop(&key)? {
                Some(project) => print(&project, Format::Json)?,
                None => tracing::info!("Server {} was not running", key),
            }
        }
        Command::Projects { command } => {
            let spawner = open_spawner(cli.config.as_deref())?;
            let api = ProjectApi::new(spawner.sync());
            match command {
                ProjectsCommand::List { user } => {
                    print(&api.list_projects(&user)?, Format::Json)?;
                }
                ProjectsCommand::Delete { user, body } => {
                    print(&api.delete_project(&user, &body), Format::Json)?;
                }
            }
        }
        Command::User {
            command: UserCommand::Add { name },
        } => {
            let spawner = open_spawner(cli.config.as_deref())?;
            spawner.records().register_user(&name)?;
            tracing::info!("Registered user {}", name);
        }
        Command::Name { repo_url } => {
            #[derive(Serialize)]
            struct Names {
                display_name: String,
                directory_name: String,
            }
            print(
                &Names {
                    display_name: codec::display_name(&repo_url),
                    directory_name: codec::directory_name(&repo_url),
                },
                Format::Json,
            )?;
        }
    }

    Ok(())
}
