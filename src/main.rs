//! gbackup CLI - Upload files to a Google Drive folder.

use std::io;
use std::path::PathBuf;
use std::process;

use anyhow::{Context, Result};
use clap::error::ErrorKind;
use clap::{Command, CommandFactory, FromArgMatches, Parser, ValueEnum};
use tracing::debug;
use tracing_subscriber::EnvFilter;

use gbackup::config::{self, CREDENTIAL_ENV};
use gbackup::folder_id::folder_id_from_arg;
use gbackup::update::{SelfUpdater, UPDATE_URL};
use gbackup::{resolve_targets, upload_all, Authenticator, DriveClient, TransferMode};

const USAGE: &str = "Usage: gbackup <file-or-dir> <gfolderid>";

const PROJECT_URL: &str = "https://github.com/DoyunShin/gdrive-backup-script";

/// Upload a file, or every file directly inside a directory, to a Google Drive folder.
#[derive(Parser, Debug)]
#[command(name = "gbackup")]
#[command(version, about, long_about = None)]
#[command(override_usage = "gbackup <file-or-dir> <gfolderid>\n       gbackup --update")]
struct Cli {
    /// File to upload, or a directory whose files are uploaded (subdirectories are skipped).
    path: Option<PathBuf>,

    /// Destination folder ID or Drive folder URL.
    folder: Option<String>,

    /// Replace this binary with the latest release after verifying its SHA-256 checksum.
    #[arg(short = 'u', long, conflicts_with_all = ["path", "folder"])]
    update: bool,

    /// Path to service account JSON credentials file.
    #[arg(long, env = CREDENTIAL_ENV)]
    credential: Option<PathBuf>,

    /// How file content is sent to Drive.
    #[arg(long, value_enum, default_value_t = Transfer::Resumable)]
    transfer: Transfer,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum Transfer {
    /// Chunked session, resumes after an interrupted chunk.
    Resumable,
    /// One request with metadata and content.
    Multipart,
}

impl From<Transfer> for TransferMode {
    fn from(transfer: Transfer) -> Self {
        match transfer {
            Transfer::Resumable => TransferMode::Resumable,
            Transfer::Multipart => TransferMode::Multipart,
        }
    }
}

#[derive(Debug, PartialEq)]
enum Action {
    Update,
    Upload { path: PathBuf, folder: String },
    Usage,
}

impl Cli {
    fn action(&self) -> Action {
        match (&self.path, &self.folder) {
            _ if self.update => Action::Update,
            (Some(path), Some(folder)) => Action::Upload {
                path: path.clone(),
                folder: folder.clone(),
            },
            _ => Action::Usage,
        }
    }
}

/// Extra help text: where the credential lives and how to update.
fn help_footer() -> String {
    let credential = config::default_credential_path()
        .map(|p| p.display().to_string())
        .unwrap_or_else(|| format!("<config dir>/{}/{}", config::APP_DIR, config::CREDENTIAL_FILE));

    format!(
        "Credential:\n  \
         Service account key read from {credential}\n  \
         (override with --credential or {CREDENTIAL_ENV}).\n\n\
         Update:\n  \
         gbackup --update downloads {UPDATE_URL},\n  \
         checks it against {UPDATE_URL}.sha256 and replaces this binary.\n  \
         Run it with sudo if the binary is installed in a system directory.\n\n\
         Check {PROJECT_URL} for more information."
    )
}

fn command() -> Command {
    Cli::command().after_help(help_footer())
}

fn parse_args<I, T>(args: I) -> std::result::Result<Cli, clap::Error>
where
    I: IntoIterator<Item = T>,
    T: Into<std::ffi::OsString> + Clone,
{
    let matches = command().try_get_matches_from(args)?;
    Cli::from_arg_matches(&matches)
}

fn usage_error() -> ! {
    println!("{}", USAGE);
    println!("Check {} for more information", PROJECT_URL);
    process::exit(1);
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = match parse_args(std::env::args_os()) {
        Ok(cli) => cli,
        Err(e) if matches!(e.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) => {
            e.exit()
        }
        Err(e) => {
            if let Some(reason) = e.kind().as_str() {
                eprintln!("error: {}", reason);
            }
            usage_error()
        }
    };

    // Logs go to stderr; stdout only carries upload results.
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(io::stderr)
        .init();

    match cli.action() {
        Action::Usage => usage_error(),
        Action::Update => update().await,
        Action::Upload { path, folder } => upload(&cli, path, &folder).await,
    }
}

async fn upload(cli: &Cli, path: PathBuf, folder: &str) -> Result<()> {
    let credential = config::resolve_credential_path(cli.credential.clone())
        .context("No configuration directory on this platform; pass --credential")?;
    debug!("using credential {}", credential.display());

    let auth = Authenticator::from_file(&credential)
        .with_context(|| format!("Failed to load credentials from {}", credential.display()))?;

    let files = resolve_targets(&path)?;
    let root = folder_id_from_arg(folder);

    let client = DriveClient::new(auth, root)
        .with_transfer_mode(cli.transfer.into())
        .connect()
        .await?;

    let mut out = io::stdout();
    upload_all(&client, &files, None, &mut out).await?;

    Ok(())
}

async fn update() -> Result<()> {
    let updater = SelfUpdater::for_current_exe().context("Failed to locate the running executable")?;

    updater.run().await.with_context(|| {
        format!(
            "Failed to update {}; re-run with elevated privileges if it is not writable",
            updater.target().display()
        )
    })?;

    println!("gbackup updated from {}", updater.url());
    Ok(())
}
