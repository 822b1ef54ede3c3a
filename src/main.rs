mod app;
mod config;
mod display;
mod domain;
mod fetch;
mod github;
mod scheduler;
mod state;
mod storage;

use std::rc::Rc;

use anyhow::bail;
use tracing::warn;
use tracing_subscriber::EnvFilter;

use app::App;
use config::Settings;
use display::DesktopSurface;
use domain::ApplicationState;
use storage::StateStore;

const USAGE: &str = "usage: octowatch [watch|check|unread]

  watch   poll the GitHub notifications feed and deliver alerts (default)
  check   run one fetch cycle, deliver its alerts, and exit
  unread  reset saved state, then fetch all unread notifications and exit";

fn main() -> anyhow::Result<()> {
    init_logging();

    let mut args = pico_args::Arguments::from_env();
    if args.contains(["-h", "--help"]) {
        println!("{USAGE}");
        return Ok(());
    }
    let command = args.subcommand()?;

    let settings = Settings::load()?;
    let state_store = StateStore::initialize()?;
    let initial_state = state_store.restore().unwrap_or_else(|err| {
        warn!(error = %err, "failed to restore persisted state; starting fresh");
        ApplicationState::default()
    });

    let mut app = App::new(settings, initial_state, state_store, Rc::new(DesktopSurface))?;
    match command.as_deref() {
        None | Some("watch") => app.run(),
        Some("check") => app.run_once(false),
        Some("unread") => app.run_once(true),
        Some(other) => bail!("unknown command `{other}`\n{USAGE}"),
    }
    Ok(())
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}
