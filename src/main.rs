use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use mpfb_log::config::{self, Locations, Preferences};
use mpfb_log::logging::{self, ChannelFilter, LevelStore, LogService, Severity};

#[derive(Debug, Parser)]
#[command(version, about = "Inspect and change MPFB log levels", long_about = None)]
struct Args {
    /// MPFB user data directory (overrides the mpfb_user_data preference)
    #[arg(long, env = "MPFB_USER_DATA", global = true)]
    home: Option<PathBuf>,

    /// Host user resource directory holding mpfb/mpfb.toml
    #[arg(long, global = true)]
    host_dir: Option<PathBuf>,

    /// Show the log service's own debug diagnostics
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Print the default level and all channel overrides
    Levels,
    /// Set the default level
    SetDefault { level: Severity },
    /// Give a channel its own level
    Set { channel: String, level: Severity },
    /// Remove a channel's override
    Unset { channel: String },
    /// Reset all levels to factory settings
    Reset,
    /// Print the resolved log and config locations
    Paths,
    /// Write sample messages through a live log service
    Demo,
}

fn resolve_locations(args: &Args) -> Result<(Locations, Preferences)> {
    let host_dir = args
        .host_dir
        .clone()
        .unwrap_or_else(Locations::default_host_user_dir);
    let prefs_path = Preferences::file_path(&host_dir);
    let prefs = Preferences::load_from(&prefs_path)
        .with_context(|| format!("Failed to load preferences from {}", prefs_path.display()))?;

    let locations = match &args.home {
        Some(home) => Locations::new(home),
        None => Locations::resolve(&prefs, &host_dir),
    };
    Ok((locations, prefs))
}

fn print_levels(store: &LevelStore) {
    println!("{:<40} {}", "default", store.default_level());
    for (name, level) in store.overrides() {
        println!("{:<40} {}", name, level);
    }
}

fn run_demo(locations: Locations, prefs: &Preferences) -> Result<()> {
    let service = Arc::new(LogService::open(locations).context("Failed to open log service")?);

    if config::is_enabled(prefs, config::EXCEPTHOOK_KEY) {
        logging::install_panic_hook(Arc::clone(&service));
    }

    let init = service.channel("mpfb.init");
    init.info_with("Build info", "FROM_SOURCE");
    init.reset_timer();

    let ui = service.channel("mpfb.ui.demo");
    ui.enter_named("run_demo");
    ui.warn("This is a warning");
    ui.debug_with("Debug detail", 42);
    ui.dump("Levels", &service.levels());

    service.channel("rig").error("Rig channel error");
    init.time("Milliseconds spent in demo:");

    println!();
    println!("Channels:   {}", service.list_channel_names(&ChannelFilter::All).join(", "));
    println!("Categories: {}", service.list_categories().join(", "));
    println!("Combined:   {}", service.combined_log_path().display());
    Ok(())
}

fn main() -> Result<()> {
    let args = Args::parse();
    logging::init_diagnostics(args.verbose);

    let (locations, prefs) = resolve_locations(&args)?;
    locations
        .ensure_directories()
        .context("Failed to create MPFB directories")?;

    if matches!(args.command, Command::Demo) {
        return run_demo(locations, &prefs);
    }
    if matches!(args.command, Command::Paths) {
        println!("home      {}", locations.home().display());
        println!("logs      {}", locations.logs_dir().display());
        println!("combined  {}", locations.combined_log().display());
        println!("levels    {}", locations.levels_file().display());
        return Ok(());
    }

    let (mut store, _) = LevelStore::load_from(&locations.levels_file());
    match args.command {
        Command::Levels => {
            print_levels(&store);
            return Ok(());
        }
        Command::SetDefault { level } => store.set_default(level),
        Command::Set { channel, level } => store.set(&channel, level),
        Command::Unset { channel } => {
            if store.remove(&channel).is_none() {
                println!("No override for '{}'", channel);
                return Ok(());
            }
        }
        Command::Reset => store.reset(),
        Command::Paths | Command::Demo => {}
    }

    store.save().context("Failed to save log levels")?;
    print_levels(&store);
    Ok(())
}
