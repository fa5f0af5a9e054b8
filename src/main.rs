mod airtable;
mod attendance;
mod config;
mod logging;
mod session;
mod sidelog;
mod status;
mod store;
mod swipe;

use anyhow::{Context, Result};
use clap::{Arg, ArgAction, Command};
use std::path::Path;
use tokio::io::BufReader;
use tracing::{error, info};

use crate::airtable::AirtableStore;
use crate::attendance::Recorder;
use crate::config::Config;
use crate::session::Session;
use crate::sidelog::SideLog;
use crate::status::TerminalSink;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments
    let matches = Command::new("swipe-attendance")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Records event attendance from ID card swipes into Airtable")
        .arg(
            Arg::new("config")
                .long("config")
                .value_name("PATH")
                .help("Airtable config file")
                .default_value(config::DEFAULT_CONFIG_PATH),
        )
        .arg(
            Arg::new("event")
                .long("event")
                .value_name("ID")
                .help("Event record id to mark attendance on (overrides eventId)"),
        )
        .arg(
            Arg::new("verbose")
                .long("verbose")
                .short('v')
                .action(ArgAction::SetTrue)
                .help("Also print info logs to stderr"),
        )
        .get_matches();

    logging::init_logging(Path::new(logging::LOG_FILE), matches.get_flag("verbose"))?;

    if let Err(e) = run(&matches).await {
        error!(error = %format!("{e:#}"), "unhandled error");
        eprintln!("Unhandled error:");
        return Err(e);
    }
    Ok(())
}

async fn run(matches: &clap::ArgMatches) -> Result<()> {
    let config_path = matches
        .get_one::<String>("config")
        .map(String::as_str)
        .unwrap_or(config::DEFAULT_CONFIG_PATH);
    let config = Config::load(Path::new(config_path))?
        .with_event_id(matches.get_one::<String>("event").map(String::as_str));
    config.validate()?;

    let store = AirtableStore::new(
        &config.api_url,
        &config.api_key,
        &config.base_id,
        config.request_timeout(),
    )
    .context("Failed to create Airtable client")?;
    let recorder = Recorder::new(store, &config.institution_domain, &config.contacts_view);
    let side_log = SideLog::new(&config.scan_log, &config.error_log);

    info!(event_id = %config.event_id, base_id = %config.base_id, "ready for swipes");

    let mut session = Session::new(recorder, &config.event_id, side_log, TerminalSink::new());
    session.run(BufReader::new(tokio::io::stdin())).await
}
