//! Command-line surface: argument parsing, dispatch, and outcome reporting.

use std::time::Duration;

use clap::{Args, Parser, Subcommand, ValueEnum};
use reqwest::Url;
use spoctl_telemetry::{DEFAULT_LOG_LEVEL, LogFormat, LoggingConfig, init_logging};
use uuid::Uuid;

use crate::client::{AppContext, CliDependencies, CliResult, parse_access_token, parse_url};
use crate::commands::site::handle_site_swap;

const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Parses CLI arguments, executes the requested command, and handles
/// user-facing telemetry emission. Returns the process exit code.
pub async fn run() -> i32 {
    let cli = Cli::parse();
    init_cli_logging(&cli);

    let command_name = command_label(&cli.command);
    let trace_id = Uuid::new_v4().to_string();
    let deps = match CliDependencies::from_env(&cli, &trace_id) {
        Ok(deps) => deps,
        Err(err) => {
            eprintln!("error: {}", err.display_message());
            return err.exit_code();
        }
    };
    let telemetry = deps.telemetry.clone();

    let result = dispatch(cli, &deps).await;

    let (exit_code, message, outcome) = match result {
        Ok(()) => (0, None, "success"),
        Err(err) => {
            let exit_code = err.exit_code();
            let message = err.display_message();
            eprintln!("error: {message}");
            (exit_code, Some(message), "error")
        }
    };

    if let Some(emitter) = &telemetry {
        emitter
            .emit(
                &trace_id,
                command_name,
                outcome,
                exit_code,
                message.as_deref(),
            )
            .await;
    }

    exit_code
}

fn init_cli_logging(cli: &Cli) {
    let config = LoggingConfig {
        level: &cli.log_level,
        format: cli.log_format,
        build_sha: env!("CARGO_PKG_VERSION"),
    };
    if let Err(err) = init_logging(&config) {
        eprintln!("warning: {err:#}");
    }
}

async fn dispatch(cli: Cli, deps: &CliDependencies) -> CliResult<()> {
    let access_token = parse_access_token(cli.access_token)?;

    let ctx = AppContext {
        client: deps.client.clone(),
        tenant_url: cli.tenant_url,
        admin_url: cli.admin_url,
        access_token,
        timeout: Duration::from_secs(cli.timeout),
    };

    match cli.command {
        Command::Site(site) => match site {
            SiteCommand::Swap(args) => handle_site_swap(&ctx, args, cli.verbose, cli.output).await,
        },
    }
}

#[derive(Parser)]
#[command(
    name = "spoctl",
    about = "Administrative CLI for SharePoint Online tenants"
)]
pub(crate) struct Cli {
    #[arg(
        long,
        global = true,
        env = "SPOCTL_TENANT_URL",
        value_parser = parse_url,
        help = "Tenant root URL; inferred from --sourceUrl when omitted"
    )]
    pub(crate) tenant_url: Option<Url>,
    #[arg(
        long,
        global = true,
        env = "SPOCTL_ADMIN_URL",
        value_parser = parse_url,
        help = "Override the derived tenant admin URL"
    )]
    pub(crate) admin_url: Option<Url>,
    #[arg(long, global = true, env = "SPOCTL_ACCESS_TOKEN", hide_env_values = true)]
    pub(crate) access_token: Option<String>,
    #[arg(
        long,
        global = true,
        env = "SPOCTL_HTTP_TIMEOUT_SECS",
        default_value_t = DEFAULT_TIMEOUT_SECS
    )]
    pub(crate) timeout: u64,
    #[arg(long, global = true, help = "Print a completion marker on success")]
    pub(crate) verbose: bool,
    #[arg(
        long = "output",
        global = true,
        value_enum,
        default_value_t = OutputFormat::Text,
        help = "Select output format for verbose command output"
    )]
    pub(crate) output: OutputFormat,
    #[arg(long, global = true, env = "SPOCTL_LOG", default_value = DEFAULT_LOG_LEVEL)]
    pub(crate) log_level: String,
    #[arg(long, global = true, env = "SPOCTL_LOG_FORMAT", default_value = "pretty")]
    pub(crate) log_format: LogFormat,
    #[command(subcommand)]
    pub(crate) command: Command,
}

#[derive(Subcommand)]
pub(crate) enum Command {
    #[command(subcommand)]
    Site(SiteCommand),
}

#[derive(Subcommand)]
pub(crate) enum SiteCommand {
    /// Swap the location of a site with another site while archiving the original site
    Swap(SiteSwapArgs),
}

#[derive(Args, Default)]
pub(crate) struct SiteSwapArgs {
    #[arg(long = "sourceUrl", help = "URL of the source site")]
    pub(crate) source_url: Option<String>,
    #[arg(
        long = "targetUrl",
        help = "URL of the target site that the source site will be swapped to"
    )]
    pub(crate) target_url: Option<String>,
    #[arg(
        long = "archiveUrl",
        help = "URL that the target site will be archived to"
    )]
    pub(crate) archive_url: Option<String>,
    #[arg(
        long = "disableRedirection",
        help = "Disables the site redirect from being created at the source URL location"
    )]
    pub(crate) disable_redirection: bool,
    #[arg(long, help = "Wait for the job to complete")]
    pub(crate) wait: bool,
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, ValueEnum)]
pub(crate) enum OutputFormat {
    #[default]
    Text,
    Json,
}

const fn command_label(command: &Command) -> &'static str {
    match command {
        Command::Site(SiteCommand::Swap(_)) => "site_swap",
    }
}
