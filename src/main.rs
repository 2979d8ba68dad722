//! SaferViewer CLI entry point

use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use anyhow::{Context, Result};
use saferviewer::app::{App, Outcome};
use saferviewer::auth::{ApplicationSecret, OAuthClient, TokenStore};
use saferviewer::config::Config;
use saferviewer::opener::SystemOpener;
use saferviewer::storage::DriveService;
use saferviewer::transfer::TransferTask;
use saferviewer::ui;

#[derive(Parser)]
#[command(name = "saferviewer")]
#[command(about = "Upload a file to Google Drive and open its shareable view")]
#[command(version)]
struct Cli {
    /// File to upload
    file: Option<PathBuf>,

    /// Title of the uploaded file (defaults to the file name)
    #[arg(short, long)]
    title: Option<String>,

    /// Forget the cached credential and authorize again
    #[arg(long)]
    reset: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match saferviewer::config::load() {
        Ok(config) => config,
        Err(e) => {
            ui::print_error(&e.to_string());
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = saferviewer::logging::init(&config.log_file) {
        ui::print_error(&e.to_string());
        return ExitCode::FAILURE;
    }
    tracing::info!("Starting");

    let Some(file) = cli.file else {
        tracing::error!("No command line arguments supplied");
        tracing::info!("This application only operates in Drag and Drop mode!");
        ui::print_error("No file given. Drop a file on SaferViewer or pass its path.");
        return ExitCode::FAILURE;
    };

    match run(&config, file, cli.title, cli.reset).await {
        Ok(Outcome::Uploaded { link, .. }) => {
            ui::print_success(&format!("Opened {}", link));
            ExitCode::SUCCESS
        }
        Ok(Outcome::AuthorizedOnly) => {
            ui::print_success("Google Drive access granted. Drop the file again to upload it.");
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::error!("FATAL: {:#}", e);
            ui::print_error(&format!("{:#} (details in {:?})", e, config.log_file));
            ExitCode::FAILURE
        }
    }
}

async fn run(config: &Config, file: PathBuf, title: Option<String>, reset: bool) -> Result<Outcome> {
    let secret = ApplicationSecret::bundled().context("Unable to parse client secret file to config")?;

    if reset {
        TokenStore::from_config(config).delete()?;
        tracing::info!("Cached credential removed");
    }

    tracing::info!("Read file: {:?}", file);
    let task = TransferTask::new(file, title, &config.folder_name)?;
    tracing::info!("Output name: {}", task.display_title);
    tracing::info!("Mime is {}", task.mime_type);

    let opener = SystemOpener;
    let exchanger = OAuthClient::new(secret.clone());
    let storage = DriveService::new(config.upload_chunk_size);
    let app = App::new(config, &secret, &storage, &opener, &exchanger);

    ui::print_step(&format!("Uploading {} to {}", task.display_title, config.folder_name));
    let bar = ui::upload_bar(&task.display_title);
    let outcome = app.run(&task, &mut |sent: u64, total: u64, rate: &str| {
        bar.set_length(total);
        bar.set_position(sent);
        bar.set_message(rate.to_string());
    }).await;
    bar.finish_and_clear();

    Ok(outcome?)
}
