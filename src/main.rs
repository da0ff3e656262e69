//! The `lily` command line: serve a manifest, edit its configuration and
//! manage drive files.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tokio::sync::watch;
use tracing::info;
use tracing_subscriber::EnvFilter;

use lily::access::AccessSettings;
use lily::auth::user::{User, UserList};
use lily::drive::{import_root, marshal, node::Directory, Drive};
use lily::error::{Error, Result};
use lily::server::config::{
    load_manifest, save_manifest, BootstrapFile, Config, DEFAULT_MANIFEST,
};
use lily::server::{serve, Server};

#[derive(Parser)]
#[command(name = "lily", version, about = "A secure multi-tenant network file server")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load the server manifest and serve until interrupted.
    Serve {
        #[arg(long, default_value = DEFAULT_MANIFEST)]
        file: PathBuf,
        #[arg(long)]
        host: Option<String>,
        #[arg(long)]
        port: Option<u16>,
        /// Suppress log output below the warn level.
        #[arg(long)]
        quiet: bool,
    },
    /// Inspect and edit the server manifest.
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
    /// Manage drive files.
    Drive {
        #[command(subcommand)]
        command: DriveCommands,
    },
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Produce a fresh manifest from a bootstrap file.
    Init { path: PathBuf },
    Set {
        key: String,
        value: String,
        #[arg(long, default_value = DEFAULT_MANIFEST)]
        file: PathBuf,
    },
    Get {
        key: String,
        #[arg(long, default_value = DEFAULT_MANIFEST)]
        file: PathBuf,
    },
    List {
        #[arg(long, default_value = DEFAULT_MANIFEST)]
        file: PathBuf,
    },
    AddDrive {
        name: String,
        drive_file: String,
        #[arg(long, default_value = DEFAULT_MANIFEST)]
        file: PathBuf,
    },
    RemoveDrive {
        name: String,
        #[arg(long, default_value = DEFAULT_MANIFEST)]
        file: PathBuf,
    },
    RenameDrive {
        name: String,
        new_name: String,
        #[arg(long, default_value = DEFAULT_MANIFEST)]
        file: PathBuf,
    },
    AddUser {
        username: String,
        password: String,
        clearance: u8,
        #[arg(long, default_value = DEFAULT_MANIFEST)]
        file: PathBuf,
    },
    RemoveUser {
        username: String,
        #[arg(long, default_value = DEFAULT_MANIFEST)]
        file: PathBuf,
    },
    SetCerts {
        cert: String,
        key: String,
        #[arg(long, default_value = DEFAULT_MANIFEST)]
        file: PathBuf,
    },
    /// List the drive-name to drive-file map.
    ListDrive {
        #[arg(long, default_value = DEFAULT_MANIFEST)]
        file: PathBuf,
    },
}

#[derive(Subcommand)]
enum DriveCommands {
    /// Create a drive file for an absolute host directory and register it.
    Init {
        name: String,
        path: PathBuf,
        #[arg(long, default_value = DEFAULT_MANIFEST)]
        file: PathBuf,
    },
    SetPath {
        name: String,
        path: PathBuf,
        #[arg(long, default_value = DEFAULT_MANIFEST)]
        file: PathBuf,
    },
    /// Rebuild a drive's tree from its host directory.
    Reimport {
        name: String,
        #[arg(long, default_value = DEFAULT_MANIFEST)]
        file: PathBuf,
    },
    Params {
        name: String,
        #[arg(long, default_value = DEFAULT_MANIFEST)]
        file: PathBuf,
    },
    List {
        #[arg(long, default_value = DEFAULT_MANIFEST)]
        file: PathBuf,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("lily: {err}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Serve { file, host, port, quiet } => serve_cmd(file, host, port, quiet).await,
        Commands::Config { command } => config_cmd(command).await,
        Commands::Drive { command } => drive_cmd(command).await,
    }
}

fn init_logging(config: &Config, quiet: bool) -> Result<()> {
    let level = if quiet { "warn" } else { config.log_level.as_str() };
    let filter = EnvFilter::try_new(level)
        .map_err(|_| Error::InvalidLogLevel(level.to_owned()))?;
    if config.log_to_file {
        let log_file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&config.log_path)
            .map_err(|_| Error::InvalidLogPath(config.log_path.clone()))?;
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_ansi(false)
            .with_writer(std::sync::Mutex::new(log_file))
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
    Ok(())
}

async fn serve_cmd(
    file: PathBuf,
    host: Option<String>,
    port: Option<u16>,
    quiet: bool,
) -> Result<()> {
    let (mut config, users) = load_manifest(&file).await?;
    if let Some(host) = host {
        config.host = host;
    }
    if let Some(port) = port {
        config.port = port;
    }
    config.validate()?;
    init_logging(&config, quiet)?;

    let server = Server::new(config, users);
    server.load_drives().await?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        wait_for_signal().await;
        info!("shutdown signal received");
        let _ = shutdown_tx.send(true);
    });

    serve(server, shutdown_rx).await
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{signal, SignalKind};
    let mut hangup = match signal(SignalKind::hangup()) {
        Ok(stream) => stream,
        Err(_) => return,
    };
    let mut terminate = match signal(SignalKind::terminate()) {
        Ok(stream) => stream,
        Err(_) => return,
    };
    let mut quit = match signal(SignalKind::quit()) {
        Ok(stream) => stream,
        Err(_) => return,
    };
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {}
        _ = hangup.recv() => {}
        _ = terminate.recv() => {}
        _ = quit.recv() => {}
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    let _ = tokio::signal::ctrl_c().await;
}

async fn config_cmd(command: ConfigCommands) -> Result<()> {
    match command {
        ConfigCommands::Init { path } => {
            let text = tokio::fs::read_to_string(&path).await?;
            let bootstrap = BootstrapFile::parse(&text)?;
            let admin = (
                bootstrap.admin.username.clone(),
                bootstrap.admin.password.clone(),
            );
            let host_dirs = bootstrap.drives.clone();
            let manifest_path = PathBuf::from(DEFAULT_MANIFEST);
            let mut config = bootstrap.into_config(&manifest_path)?;

            // [drives] maps drive names to host directories; each gets a
            // fresh drive file beside the manifest
            config.drive_files.clear();
            for (name, host_dir) in &host_dirs {
                if !Path::new(host_dir).is_absolute() {
                    return Err(Error::InvalidDriveFilePath(host_dir.clone()));
                }
                let drive_file = format!("{name}.drive");
                write_empty_drive(name, host_dir, &drive_file, &admin.0).await?;
                config.drive_files.insert(name.clone(), drive_file);
            }

            let users = UserList::new();
            users.add(User::new(&admin.0, &admin.1, 5)?).await?;
            save_manifest(&config, &users).await?;
            println!("wrote {}", manifest_path.display());
            Ok(())
        }
        ConfigCommands::Set { key, value, file } => {
            let (mut config, users) = load_manifest(&file).await?;
            config.set_key(&key, &value)?;
            save_manifest(&config, &users).await
        }
        ConfigCommands::Get { key, file } => {
            let (config, _) = load_manifest(&file).await?;
            println!("{}", config.get_key(&key)?);
            Ok(())
        }
        ConfigCommands::List { file } => {
            let (config, _) = load_manifest(&file).await?;
            for key in Config::keys() {
                println!("{key} = {}", config.get_key(key)?);
            }
            Ok(())
        }
        ConfigCommands::AddDrive { name, drive_file, file } => {
            let (mut config, users) = load_manifest(&file).await?;
            Config::validate_drive_file_path(&drive_file)?;
            if config.drive_files.contains_key(&name) {
                return Err(Error::DriveAlreadyExists(name));
            }
            config.drive_files.insert(name, drive_file);
            config.dirty = true;
            save_manifest(&config, &users).await
        }
        ConfigCommands::RemoveDrive { name, file } => {
            let (mut config, users) = load_manifest(&file).await?;
            if config.drive_files.remove(&name).is_none() {
                return Err(Error::DriveNotFound(name));
            }
            save_manifest(&config, &users).await
        }
        ConfigCommands::RenameDrive { name, new_name, file } => {
            let (mut config, users) = load_manifest(&file).await?;
            if config.drive_files.contains_key(&new_name) {
                return Err(Error::DriveAlreadyExists(new_name));
            }
            let drive_file = config
                .drive_files
                .remove(&name)
                .ok_or(Error::DriveNotFound(name))?;
            config.drive_files.insert(new_name, drive_file);
            save_manifest(&config, &users).await
        }
        ConfigCommands::AddUser { username, password, clearance, file } => {
            let (config, users) = load_manifest(&file).await?;
            users.add(User::new(&username, &password, clearance)?).await?;
            save_manifest(&config, &users).await
        }
        ConfigCommands::RemoveUser { username, file } => {
            let (config, users) = load_manifest(&file).await?;
            users.remove(&username).await?;
            save_manifest(&config, &users).await
        }
        ConfigCommands::SetCerts { cert, key, file } => {
            let (mut config, users) = load_manifest(&file).await?;
            config.cert_files = vec![(cert, key)];
            config.dirty = true;
            save_manifest(&config, &users).await
        }
        ConfigCommands::ListDrive { file } => {
            let (config, _) = load_manifest(&file).await?;
            for (name, drive_file) in &config.drive_files {
                println!("{name} = {drive_file}");
            }
            Ok(())
        }
    }
}

async fn drive_cmd(command: DriveCommands) -> Result<()> {
    match command {
        DriveCommands::Init { name, path, file } => {
            if !path.is_absolute() {
                return Err(Error::InvalidDriveFilePath(path.display().to_string()));
            }
            let (mut config, users) = load_manifest(&file).await?;
            if config.drive_files.contains_key(&name) {
                return Err(Error::DriveAlreadyExists(name));
            }
            let drive_file = format!("{name}.drive");
            write_empty_drive(&name, &path.display().to_string(), &drive_file, "lily").await?;
            config.drive_files.insert(name.clone(), drive_file);
            config.dirty = true;
            save_manifest(&config, &users).await?;
            println!("drive {name} initialized");
            Ok(())
        }
        DriveCommands::SetPath { name, path, file } => {
            if !path.is_absolute() {
                return Err(Error::InvalidDriveFilePath(path.display().to_string()));
            }
            let (config, _) = load_manifest(&file).await?;
            let drive = load_drive(&config, &name).await?;
            drive.set_host_path(&path).await;
            save_drive(&config, &name, &drive).await
        }
        DriveCommands::Reimport { name, file } => {
            let (config, _) = load_manifest(&file).await?;
            let drive = load_drive(&config, &name).await?;
            let host = drive.host_path().await;
            let root = import_root(&host, AccessSettings::new(1, 1)?, "lily").await?;
            let rebuilt = Drive::new(name.clone(), host, root);
            save_drive(&config, &name, &rebuilt).await?;
            println!("drive {name} reimported");
            Ok(())
        }
        DriveCommands::Params { name, file } => {
            let (config, _) = load_manifest(&file).await?;
            let drive = load_drive(&config, &name).await?;
            println!("name = {}", drive.name().await);
            println!("hostpath = {}", drive.host_path().await.display());
            Ok(())
        }
        DriveCommands::List { file } => {
            let (config, _) = load_manifest(&file).await?;
            for name in config.drive_files.keys() {
                println!("{name}");
            }
            Ok(())
        }
    }
}

/// Writes a drive file holding an empty root for `host_dir`.
async fn write_empty_drive(
    name: &str,
    host_dir: &str,
    drive_file: &str,
    editor: &str,
) -> Result<()> {
    let root = Directory::new_root(AccessSettings::new(1, 1)?, editor);
    let drive = Drive::new(name, host_dir, root);
    let bytes = marshal::marshal_drive(&drive).await?;
    tokio::fs::write(drive_file, bytes).await?;
    Ok(())
}

async fn load_drive(config: &Config, name: &str) -> Result<Drive> {
    let drive_file = config
        .drive_files
        .get(name)
        .ok_or_else(|| Error::DriveNotFound(name.to_owned()))?;
    let bytes = tokio::fs::read(drive_file)
        .await
        .map_err(|_| Error::DriveFileMissing(drive_file.into()))?;
    marshal::unmarshal_drive(&bytes).await
}

async fn save_drive(config: &Config, name: &str, drive: &Drive) -> Result<()> {
    let drive_file = config
        .drive_files
        .get(name)
        .ok_or_else(|| Error::DriveNotFound(name.to_owned()))?;
    let bytes = marshal::marshal_drive(drive).await?;
    tokio::fs::write(drive_file, bytes).await?;
    Ok(())
}
