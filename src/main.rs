mod args;
mod cleaner;
mod clipboard;
mod controller;
mod decoder;
mod form;
mod http;
mod profile;
mod store;
mod tui;

use args::CommandLineArgs;
use cleaner::LocalCleaner;
use clipboard::{Clipboard, SystemClipboard};
use controller::FormController;
use form::Severity;
use http::{CleanService, HttpCleanClient};
use profile::{Connection, DEFAULT_INI_FILE_PATH, Profile};
use store::{IniStore, KeyValueStore, Persistence};

use anyhow::{Context, Result};
use colored::*;
use std::fs::OpenOptions;
use std::io::{self, IsTerminal, Read};
use std::process::ExitCode;
use std::sync::{Arc, Mutex};
use tracing_subscriber::{EnvFilter, fmt::time::ChronoLocal, fmt::writer::BoxMakeWriter};

const LOG_FILE_PATH: &str = "~/.cleanc.log";

#[tokio::main]
async fn main() -> ExitCode {
    let cmd_args = CommandLineArgs::get();
    match run(cmd_args).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{}: {:#}", "Error".red().bold(), e);
            ExitCode::FAILURE
        }
    }
}

/// One-shot runs log to stderr at `info` (`debug` with `-v`). The full-screen
/// form logs to a file so the screen stays intact, and only with `-v`.
/// `RUST_LOG` overrides the filter in both cases.
fn init_logging(verbose: bool, interactive: bool) -> Result<()> {
    let default_filter = if verbose { "cleanc=debug" } else { "cleanc=info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    let writer = if interactive {
        if !verbose {
            return Ok(());
        }
        let path = shellexpand::tilde(LOG_FILE_PATH).to_string();
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .with_context(|| format!("Failed to open log file {path}"))?;
        BoxMakeWriter::new(Mutex::new(file))
    } else {
        BoxMakeWriter::new(io::stderr)
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_timer(ChronoLocal::rfc_3339())
        .with_ansi(!interactive && io::stderr().is_terminal())
        .with_writer(writer)
        .init();
    Ok(())
}

async fn run(cmd_args: CommandLineArgs) -> Result<ExitCode> {
    let interactive =
        cmd_args.text().is_none() && !cmd_args.health() && io::stdin().is_terminal();
    init_logging(cmd_args.verbose(), interactive)?;

    // An unreadable profile file means built-in defaults, not a failed run.
    let ini_profile =
        Profile::load(DEFAULT_INI_FILE_PATH, cmd_args.profile()).unwrap_or_else(|e| {
            tracing::debug!(error = %format!("{e:#}"), "ignoring unreadable profile file");
            None
        });
    let connection = Connection::resolve(&cmd_args, ini_profile.as_ref())?;

    if cmd_args.health() {
        return check_health(&connection).await;
    }

    let service: Arc<dyn CleanService> = if cmd_args.offline() {
        tracing::debug!("cleaning locally");
        Arc::new(LocalCleaner)
    } else {
        let client = HttpCleanClient::new(&connection)?;
        tracing::debug!(endpoint = %client.endpoint(), "using clean service");
        Arc::new(client)
    };

    let ini_store = IniStore::new(DEFAULT_INI_FILE_PATH, cmd_args.profile());
    // tilde stays unexpanded when there is no home directory to remember into
    let persistence = if ini_store.path().starts_with("~") {
        tracing::debug!("no home directory, credential will not be remembered");
        Persistence::absent()
    } else {
        tracing::debug!(path = %ini_store.path().display(), profile = cmd_args.profile(), "credential store");
        Persistence::new(ini_store)
    };
    let mut controller =
        FormController::new(service, persistence, SystemClipboard::default());
    if let Some(token) = cmd_args.token() {
        controller.set_credential(token.as_str());
    }

    if interactive {
        tui::run(controller).await?;
        return Ok(ExitCode::SUCCESS);
    }

    let text = match cmd_args.text() {
        Some(text) => text.clone(),
        None => {
            let mut buffer = String::new();
            io::stdin()
                .read_to_string(&mut buffer)
                .context("Failed to read text from stdin")?;
            buffer
        }
    };
    clean_once(&mut controller, text, cmd_args.copy()).await
}

async fn check_health(connection: &Connection) -> Result<ExitCode> {
    let client = HttpCleanClient::new(connection)?;
    let healthy = client
        .health()
        .await
        .map_err(|e| anyhow::anyhow!(e.describe()))?;
    if healthy {
        println!("ok");
        Ok(ExitCode::SUCCESS)
    } else {
        eprintln!("{}: {} is not healthy", "Error".red().bold(), client.endpoint());
        Ok(ExitCode::FAILURE)
    }
}

/// Submits `text` once: cleaned text on stdout, status on stderr.
async fn clean_once<S, K, C>(
    controller: &mut FormController<S, K, C>,
    text: String,
    copy: bool,
) -> Result<ExitCode>
where
    S: CleanService + ?Sized,
    K: KeyValueStore,
    C: Clipboard,
{
    controller.set_input(text);
    controller.submit().await;

    if controller.view().status().severity() != Severity::Success {
        eprintln!("{}", controller.view().status().message().red());
        return Ok(ExitCode::FAILURE);
    }
    println!("{}", controller.view().output());

    if copy {
        controller.copy();
        let status = controller.view().status();
        if status.severity() == Severity::Error {
            eprintln!("{}", status.message().red());
            return Ok(ExitCode::FAILURE);
        }
        eprintln!("{}", status.message().green());
    }
    Ok(ExitCode::SUCCESS)
}
