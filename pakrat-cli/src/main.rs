//! Pakrat CLI
//!
//! Thin command wrappers over the library: run a process, download a file,
//! install a package and extract an archive, the way package installation
//! scripts compose them.

use anyhow::Context;
use clap::{Parser, Subcommand};
use pakrat_lib::archive::{self, ExtractRequest};
use pakrat_lib::checksum::ChecksumType;
use pakrat_lib::download::{DownloadEngine, DownloadRequest};
use pakrat_lib::env::EnvStore;
use pakrat_lib::error::PakratError;
use pakrat_lib::installer::{self, InstallRequest};
use pakrat_lib::process::{ProcessRequest, ProcessRunner, WindowStyle};
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

#[derive(Parser)]
#[command(name = "pakrat")]
#[command(about = "Package installation helpers: process execution, downloads, installers, archives")]
#[command(version)]
struct Cli {
    /// Increase logging verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run an external process, stream its output and classify the exit code
    Run {
        /// Executable path or command name
        exe: String,

        /// Argument string passed to the executable
        #[arg(long, default_value = "")]
        args: String,

        /// Working directory (defaults to the current location)
        #[arg(long)]
        working_dir: Option<PathBuf>,

        /// Request elevated rights
        #[arg(long)]
        elevated: bool,

        /// Start the process with a minimized window
        #[arg(long)]
        minimized: bool,

        /// Skip the post-run settle delay
        #[arg(long)]
        no_sleep: bool,

        /// Exit codes treated as success
        #[arg(long, value_delimiter = ',', default_value = "0")]
        valid_exit_codes: Vec<i32>,

        /// Extra arguments passed to the process but excluded from logs
        #[arg(long)]
        sensitive_args: Option<String>,
    },

    /// Download a file and validate it via checksum or content length
    Download {
        /// Package the download belongs to
        package_name: String,

        #[arg(long)]
        url: Option<String>,

        /// Distinct 64-bit download URL
        #[arg(long)]
        url64: Option<String>,

        /// Destination file (defaults to the package cache directory)
        #[arg(long)]
        destination: Option<PathBuf>,

        #[arg(long)]
        checksum: Option<String>,

        /// md5, sha1, sha256 or sha512
        #[arg(long)]
        checksum_type: Option<ChecksumType>,

        #[arg(long)]
        checksum64: Option<String>,

        #[arg(long)]
        checksum_type64: Option<ChecksumType>,

        /// Additional request header as name=value; repeatable
        #[arg(long = "header")]
        headers: Vec<String>,

        /// Rename the destination to the name the remote side suggests
        #[arg(long)]
        original_file_name: bool,

        /// Download even when a valid cached copy exists
        #[arg(long)]
        force: bool,
    },

    /// Download (optionally) and run a native installer (msi/msp/msu/exe)
    Install {
        package_name: String,

        /// Installer file, or the download destination when --url is given
        #[arg(long)]
        file: Option<PathBuf>,

        /// 64-bit installer file
        #[arg(long)]
        file64: Option<PathBuf>,

        /// msi, msp, msu or exe; inferred from the file extension when unset
        #[arg(long)]
        file_type: Option<String>,

        /// Silent arguments for the installer; repeatable
        #[arg(long = "silent-arg")]
        silent_args: Vec<String>,

        /// Ignore package silent arguments in favor of the environment's
        /// install arguments
        #[arg(long)]
        use_only_install_arguments: bool,

        #[arg(long, value_delimiter = ',', default_value = "0")]
        valid_exit_codes: Vec<i32>,

        #[arg(long)]
        url: Option<String>,

        #[arg(long)]
        url64: Option<String>,

        #[arg(long)]
        checksum: Option<String>,

        #[arg(long)]
        checksum_type: Option<ChecksumType>,

        #[arg(long)]
        checksum64: Option<String>,

        #[arg(long)]
        checksum_type64: Option<ChecksumType>,
    },

    /// Extract an archive with 7-Zip
    Extract {
        /// Archive file
        #[arg(long)]
        archive: Option<PathBuf>,

        /// 64-bit archive file
        #[arg(long)]
        archive64: Option<PathBuf>,

        /// Directory the archive is unpacked into
        destination: PathBuf,

        /// Specific directory within the archive to extract
        #[arg(long)]
        specific_folder: Option<String>,

        #[arg(long)]
        package_name: Option<String>,

        /// Skip the extraction log
        #[arg(long)]
        no_log: bool,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match dispatch(cli.command).await {
        Ok(exit_code) => std::process::exit(exit_code),
        Err(e) => {
            error!("{e:#}");
            let exit_code = match e.downcast_ref::<PakratError>() {
                Some(PakratError::Process { exit_code, .. }) if *exit_code != 0 => *exit_code,
                _ => 1,
            };
            std::process::exit(exit_code);
        }
    }
}

fn init_logging(verbosity: u8) {
    let default_level = match verbosity {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

/// Wire Ctrl-C to the shared cancellation token.
fn install_interrupt_handler(cancel: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            debug!("Interrupt received, cancelling");
            cancel.cancel();
        }
    });
}

async fn dispatch(command: Commands) -> anyhow::Result<i32> {
    let mut env = EnvStore::from_process();
    let cancel = CancellationToken::new();
    install_interrupt_handler(cancel.clone());
    let runner = ProcessRunner::with_cancellation(env.clone(), cancel);

    match command {
        Commands::Run {
            exe,
            args,
            working_dir,
            elevated,
            minimized,
            no_sleep,
            valid_exit_codes,
            sensitive_args,
        } => {
            let mut request = ProcessRequest::new(exe, args);
            request.working_directory = working_dir;
            request.elevated = elevated;
            request.window_style = if minimized {
                WindowStyle::Minimized
            } else {
                WindowStyle::Normal
            };
            request.no_sleep = no_sleep;
            request.valid_exit_codes = valid_exit_codes;
            request.sensitive_arguments = sensitive_args;

            let result = runner.run(&request).await?;
            println!("{}", result.exit_code);
            Ok(result.exit_code)
        }

        Commands::Download {
            package_name,
            url,
            url64,
            destination,
            checksum,
            checksum_type,
            checksum64,
            checksum_type64,
            headers,
            original_file_name,
            force,
        } => {
            let destination = match destination {
                Some(destination) => destination,
                None => default_download_destination(&package_name, url.as_deref())?,
            };

            let mut request = DownloadRequest::new(package_name.as_str(), destination);
            request.url = url;
            request.url64 = url64;
            request.checksum = checksum;
            request.checksum_type = checksum_type;
            request.checksum64 = checksum64;
            request.checksum_type64 = checksum_type64;
            request.headers = parse_headers(&headers)?;
            request.use_original_file_name = original_file_name;
            request.force_download = force;

            let engine = DownloadEngine::new(&env)?;
            let path = engine.fetch(&request, &env).await?;
            println!("{}", path.display());
            Ok(0)
        }

        Commands::Install {
            package_name,
            file,
            file64,
            file_type,
            silent_args,
            use_only_install_arguments,
            valid_exit_codes,
            url,
            url64,
            checksum,
            checksum_type,
            checksum64,
            checksum_type64,
        } => {
            // materialize the installer first when a url was supplied
            let file = if url.is_some() || url64.is_some() {
                let destination = match &file {
                    Some(file) => file.clone(),
                    None => default_download_destination(&package_name, url.as_deref())?,
                };

                let mut download = DownloadRequest::new(package_name.as_str(), destination);
                download.url = url;
                download.url64 = url64;
                download.checksum = checksum;
                download.checksum_type = checksum_type;
                download.checksum64 = checksum64;
                download.checksum_type64 = checksum_type64;

                let engine = DownloadEngine::new(&env)?;
                Some(engine.fetch(&download, &env).await?)
            } else {
                file
            };

            let mut request = InstallRequest::new(package_name.as_str());
            request.file = file;
            request.file64 = file64;
            request.file_type = file_type;
            request.silent_arguments = silent_args;
            request.use_only_install_arguments = use_only_install_arguments;
            request.valid_exit_codes = valid_exit_codes;

            let exit_code = installer::install(&request, &mut env, &runner).await?;
            println!("{exit_code}");
            Ok(exit_code)
        }

        Commands::Extract {
            archive,
            archive64,
            destination,
            specific_folder,
            package_name,
            no_log,
        } => {
            let mut request = ExtractRequest::new(destination);
            request.archive = archive;
            request.archive64 = archive64;
            request.package_name = package_name;
            request.specific_folder = specific_folder;
            request.disable_logging = no_log;

            let destination = archive::extract(&request, &mut env, &runner).await?;
            println!("{}", destination.display());
            Ok(0)
        }
    }
}

/// Default destination: `<cache>/pakrat/<package>/<file name from url>`.
fn default_download_destination(package_name: &str, url: Option<&str>) -> anyhow::Result<PathBuf> {
    let cache_dir = dirs::cache_dir()
        .context("Could not determine cache directory")?
        .join("pakrat")
        .join(package_name);

    let file_name = url
        .and_then(|u| u.split('?').next())
        .and_then(|u| u.trim_end_matches('/').rsplit('/').next())
        .filter(|name| !name.is_empty() && !name.contains(':'))
        .map(str::to_string)
        .unwrap_or_else(|| format!("{package_name}.download"));

    Ok(cache_dir.join(file_name))
}

fn parse_headers(raw: &[String]) -> anyhow::Result<Vec<(String, String)>> {
    raw.iter()
        .map(|entry| {
            entry
                .split_once('=')
                .map(|(name, value)| (name.trim().to_string(), value.trim().to_string()))
                .with_context(|| format!("Header '{entry}' is not in name=value form"))
        })
        .collect()
}
