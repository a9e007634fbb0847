use clap::{Parser, Subcommand};
use drivedrop::bootstrap::{get_initial_token, BootstrapOptions, CodeSource};
use drivedrop::settings::DEFAULT_CONFIG_FILE_PATH;
use drivedrop::{
    CredentialStore, Credentials, Error, HttpClient, Settings, SiteLocator, Uploader,
    GENERATE_MS_OAUTH2_CREDENTIALS_INSTRUCTIONS,
};
use std::env;
use std::path::PathBuf;
use std::time::SystemTime;

/// Sets up the logger for the application
fn setup_logger(log_level: log::LevelFilter) -> Result<(), fern::InitError> {
    fern::Dispatch::new()
        .format(|out, message, record| {
            out.finish(format_args!(
                "[{} {} {} {}:{}] {}",
                humantime::format_rfc3339_seconds(SystemTime::now()),
                record.level(),
                record.target(),
                record.file().unwrap_or("unknown"),
                record.line().unwrap_or(0),
                message
            ))
        })
        .level(log_level)
        .chain(std::io::stdout())
        .chain(fern::log_file("output.log")?)
        .apply()?;
    Ok(())
}

#[derive(Parser, Debug)]
#[command(name = "dropr")]
#[command(author, version, about, long_about = None)] // Read from `Cargo.toml`
/// A CLI tool that uploads the files of a local folder to SharePoint (or OneDrive)
/// and renames each local file to carry the id of its uploaded copy.
///
/// Needs a `client_secret.json` with your own Microsoft OAuth2 application and a
/// `refresh_token.txt` created once with `dropr login`.
struct Cli {
    #[command(subcommand)]
    /// The command to run
    command: SubCommand,
    #[arg(short = 'l', long, value_name = "LOG_LEVEL")]
    /// <Optional> The log level of the application (defaults to `Info`)
    log_level: Option<log::LevelFilter>,
    #[arg(short = 'c', long, value_name = "CONFIG_FILE")]
    /// <Optional> The path to the YAML configuration file (defaults to `config.yaml`)
    config_file: Option<String>,
    #[arg(short = 'v', long)]
    /// Logs the loaded client endpoints and client id
    verbose: bool,
}

#[derive(Subcommand, Debug)]
/// Subcommands
enum SubCommand {
    /// Uploads every file of the source folder
    Upload {
        /// <Optional> Folder whose files are uploaded (defaults to `/source`)
        source_folder: Option<PathBuf>,
        #[arg(long, value_name = "HOSTNAME")]
        /// <Optional> SharePoint host, e.g. `contoso.sharepoint.com`
        ///
        /// (Will look at using the `DRIVEDROP_HOSTNAME` environment variable if empty)
        hostname: Option<String>,
        #[arg(long, value_name = "SITE_PATH")]
        /// <Optional> Server relative site path, e.g. `/sites/Finance`
        ///
        /// (Will look at using the `DRIVEDROP_SITE_PATH` environment variable if empty)
        site_path: Option<String>,
        #[arg(short = 'd', long, value_name = "FOLDER")]
        /// <Optional> Folder below the drive root that receives the files (defaults to `PowerBI`)
        destination: Option<String>,
    },
    /// Runs the one-time browser consent and stores the first refresh token
    Login {
        #[arg(long)]
        /// Catch the redirect with a local listener instead of pasting the code
        listen: bool,
        #[arg(short = 'p', long, value_name = "PORT")]
        /// <Optional> Port of the redirect URI (defaults to `8080`)
        port: Option<u16>,
        #[arg(long)]
        /// Print the consent URL instead of opening a browser
        no_browser: bool,
    },
}

/// Maps a fatal error onto a sysexits code.
fn exit_code(err: &Error) -> exitcode::ExitCode {
    match err {
        Error::Config(_) => exitcode::CONFIG,
        Error::Auth(_) => exitcode::NOPERM,
        Error::Destination(_) => exitcode::UNAVAILABLE,
        Error::Io { .. } => exitcode::IOERR,
        Error::Upload(_) => exitcode::SOFTWARE,
    }
}

fn credentials(settings: &Settings, verbose: bool) -> Result<Credentials, Error> {
    let store = CredentialStore::new(&settings.client_secret_path, &settings.refresh_token_path);
    Credentials::load(store, verbose)
}

fn upload(
    mut settings: Settings,
    verbose: bool,
    source_folder: Option<PathBuf>,
    hostname: Option<String>,
    site_path: Option<String>,
    destination: Option<String>,
) -> Result<(), Error> {
    // Arguments win over the config file, which wins over the environment
    if let Some(hostname) = hostname {
        settings.hostname = hostname;
    }
    if let Some(site_path) = site_path {
        settings.site_path = site_path;
    }
    if let Some(destination) = destination {
        settings.destination_path = destination;
    }
    if let Some(source_folder) = source_folder {
        settings.source_folder = source_folder.to_string_lossy().into_owned();
    }
    settings.apply_env(|key| env::var(key).ok());

    let credentials = credentials(&settings, verbose)?;
    let http_client = HttpClient::new(settings.request_timeout(), settings.retry_policy())
        .map_err(|err| Error::Config(err.to_string()))?;
    let site = if settings.hostname.is_empty() {
        log::info!("No SharePoint hostname configured, uploading to the personal drive");
        None
    } else {
        Some(SiteLocator {
            hostname: settings.hostname.clone(),
            site_path: settings.site_path.clone(),
        })
    };

    let uploader = Uploader {
        http: &http_client,
        credentials: &credentials,
        base_url: settings.graph_base_url(),
        site,
        destination_path: settings.destination_path.clone(),
    };
    let summary = uploader.run(PathBuf::from(&settings.source_folder).as_path())?;
    if summary.failed > 0 {
        log::warn!("{} of {} file(s) were not uploaded, see the log above", summary.failed, summary.discovered);
    }
    Ok(())
}

fn login(settings: Settings, verbose: bool, listen: bool, port: Option<u16>, no_browser: bool) -> Result<(), Error> {
    println!("{}", GENERATE_MS_OAUTH2_CREDENTIALS_INSTRUCTIONS);
    let credentials = credentials(&settings, verbose)?;
    let options = BootstrapOptions {
        source: if listen { CodeSource::Listen } else { CodeSource::Paste },
        redirect_port: port.unwrap_or(settings.redirect_port),
        auto_open_auth_url: !no_browser,
    };
    get_initial_token(&credentials, &options)
}

fn main() {
    // Argument handling
    let args = Cli::parse();
    let log_level = args.log_level.unwrap_or(log::LevelFilter::Info);
    let config_file_path: String = args
        .config_file
        .unwrap_or_else(|| String::from(DEFAULT_CONFIG_FILE_PATH));

    // Logger Setup
    if let Err(err) = setup_logger(log_level) {
        eprintln!("Unable to set up logging - {}", err);
        std::process::exit(exitcode::SOFTWARE);
    }

    // Loading configuration file
    let settings = match Settings::load(&config_file_path) {
        Ok(settings) => settings,
        Err(err) => {
            log::error!("{}", err);
            std::process::exit(exit_code(&err));
        }
    };

    // Processing commands
    let result = match args.command {
        SubCommand::Upload {
            source_folder,
            hostname,
            site_path,
            destination,
        } => upload(settings, args.verbose, source_folder, hostname, site_path, destination),
        SubCommand::Login {
            listen,
            port,
            no_browser,
        } => login(settings, args.verbose, listen, port, no_browser),
    };

    if let Err(err) = result {
        log::error!("{}", err);
        std::process::exit(exit_code(&err));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_upload_with_overrides() {
        let cli = Cli::try_parse_from([
            "dropr",
            "-l",
            "debug",
            "upload",
            "/data/out",
            "--hostname",
            "contoso.sharepoint.com",
            "--site-path",
            "/sites/Finance",
            "-d",
            "Reports",
        ])
        .unwrap();
        assert_eq!(cli.log_level, Some(log::LevelFilter::Debug));
        match cli.command {
            SubCommand::Upload {
                source_folder,
                hostname,
                site_path,
                destination,
            } => {
                assert_eq!(source_folder, Some(PathBuf::from("/data/out")));
                assert_eq!(hostname.as_deref(), Some("contoso.sharepoint.com"));
                assert_eq!(site_path.as_deref(), Some("/sites/Finance"));
                assert_eq!(destination.as_deref(), Some("Reports"));
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_parse_login() {
        let cli = Cli::try_parse_from(["dropr", "login", "--listen", "-p", "9090"]).unwrap();
        match cli.command {
            SubCommand::Login { listen, port, no_browser } => {
                assert!(listen);
                assert_eq!(port, Some(9090));
                assert!(!no_browser);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_exit_codes() {
        assert_eq!(exit_code(&Error::Config(String::new())), exitcode::CONFIG);
        assert_eq!(exit_code(&Error::Auth(String::new())), exitcode::NOPERM);
        assert_eq!(exit_code(&Error::Destination(String::new())), exitcode::UNAVAILABLE);
        assert_eq!(
            exit_code(&Error::io("x", std::io::Error::new(std::io::ErrorKind::Other, "x"))),
            exitcode::IOERR
        );
    }
}
