use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(name = "siteclock-cli", version, about = "Siteclock CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Site administration
    Site {
        #[command(subcommand)]
        action: commands::site::SiteAction,
    },
    /// Employee-to-site assignments
    Assign {
        #[command(subcommand)]
        action: commands::assign::AssignAction,
    },
    /// Weekly tracking schedules
    Schedule {
        #[command(subcommand)]
        action: commands::schedule::ScheduleAction,
    },
    /// Attendance records and manual clock-in/out
    Record {
        #[command(subcommand)]
        action: commands::record::RecordAction,
    },
    /// Tracking sessions
    Track {
        #[command(subcommand)]
        action: commands::track::TrackAction,
    },
    /// Configuration management
    Config {
        #[command(subcommand)]
        action: commands::config::ConfigAction,
    },
}

fn main() {
    let cli = Cli::parse();
    let result = match cli.command {
        Commands::Site { action } => commands::site::run(action),
        Commands::Assign { action } => commands::assign::run(action),
        Commands::Schedule { action } => commands::schedule::run(action),
        Commands::Record { action } => commands::record::run(action),
        Commands::Track { action } => commands::track::run(action),
        Commands::Config { action } => commands::config::run(action),
    };

    if let Err(e) = result {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}
