//! arrival-announcer: speaks badge-scan arrivals and departures.

mod announcer;
mod chimes;
mod config;
mod error;
mod history;
mod phrases;
mod playback;
mod presence;
mod scans;
mod speaker;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::config::Config;
use crate::playback::PlaySamples;
use crate::scans::ScanQuery;
use crate::speaker::{AudioCache, VoiceMode, VoiceService};

#[derive(Parser, Debug)]
#[command(name = "arrival-announcer", about = "Announce badge-scan arrivals and departures")]
struct Args {
    /// Path to config.yaml
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose (debug) logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Watch the scan store and announce changes (default)
    Run {
        /// Announce everyone already present at startup
        #[arg(long)]
        no_prime: bool,
    },
    /// Synthesize every phrase the tracked persons can need into the cache
    Prepare,
    /// Speak the given words, one cached phrase per word
    Say {
        #[arg(required = true)]
        words: Vec<String>,
        /// Use the regional voice
        #[arg(long)]
        regional: bool,
    },
    /// Delete the cached clips of one voice
    Purge {
        /// Purge the regional voice instead of the standard one
        #[arg(long)]
        regional: bool,
    },
    /// Assign a badge to a person
    Register {
        badge: String,
        person: String,
        /// Lower announces first
        #[arg(long, default_value_t = 0)]
        priority: i64,
        /// Keep the holder but never announce them
        #[arg(long)]
        disabled: bool,
    },
    /// Record a scan of a badge at the current time
    Scan { badge: String },
    /// List recent scans from unregistered badges
    Unknown {
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },
    /// Print the announcement report for a day
    Report {
        /// YYYY-MM-DD or "today"
        #[arg(long, default_value = "today")]
        date: String,
        /// List days with recorded announcements instead
        #[arg(long)]
        list: bool,
    },
}

fn voice_mode(regional: bool) -> VoiceMode {
    if regional {
        VoiceMode::Regional
    } else {
        VoiceMode::Standard
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    // Initialize logging (suppress noisy HTTP client internals)
    let filter = if args.verbose {
        EnvFilter::new("debug,hyper_util=info,reqwest=info")
    } else {
        EnvFilter::new("info,hyper_util=warn,reqwest=warn")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config = Config::load(args.config.as_deref());
    let command = args.command.unwrap_or(Command::Run { no_prime: false });

    match command {
        Command::Run { no_prime } => run(config, !no_prime).await?,
        Command::Prepare => prepare(&config).await?,
        Command::Say { words, regional } => say(&config, &words, voice_mode(regional)).await?,
        Command::Purge { regional } => {
            let voice = open_voice(&config)?;
            voice.purge(voice_mode(regional))?;
        }
        Command::Register {
            badge,
            person,
            priority,
            disabled,
        } => {
            let store = scans::SqliteScanStore::open(&config.database.path)?;
            store.register_holder(&badge, &person, !disabled, priority)?;
            info!("Badge {badge} now belongs to {person}");
        }
        Command::Scan { badge } => {
            let store = scans::SqliteScanStore::open(&config.database.path)?;
            store.insert_scan(&badge, chrono::Local::now().naive_local())?;
        }
        Command::Unknown { limit } => {
            let store = scans::SqliteScanStore::open(&config.database.path)?;
            let unknown = store.recent_unregistered(limit)?;
            if unknown.is_empty() {
                println!("No scans from unregistered badges.");
            }
            for scan in unknown {
                println!("{}  {}", scan.scanned_at, scan.badge_id);
            }
        }
        Command::Report { date, list } => {
            let history = history::History::new(config.history.root());
            if list {
                for date in history.list_available_dates() {
                    println!("{date}");
                }
            } else {
                println!("{}", history.generate_report(&date));
            }
        }
    }

    Ok(())
}

fn open_voice(config: &Config) -> error::Result<VoiceService> {
    VoiceService::from_config(AudioCache::new(config.cache.root()), &config.voice)
}

async fn run(config: Config, prime: bool) -> error::Result<()> {
    info!("arrival-announcer starting");

    let store = scans::SqliteScanStore::open(&config.database.path)?;
    let voice = open_voice(&config)?;
    // Stays on this task: the output stream cannot move between threads.
    let player = playback::RodioPlayer::open()?;

    let prime = prime && config.announcer.prime_on_startup;
    let tracker = presence::PresenceTracker::new(store, config.announcer.noise_window());
    let mut announcer = announcer::Announcer::new(
        tracker,
        voice,
        player,
        phrases::Phrasebook::new(config.phrases.clone()),
        &config.announcer,
    )
    .with_chimes(chimes::Chimes::new(&config.chimes));

    if config.history.enabled {
        let history = history::History::new(config.history.root());
        info!("Recording announcements in {}", history.dir().display());
        announcer = announcer.with_history(history);
    }

    if prime {
        if let Err(e) = announcer.prime() {
            warn!("Priming failed, first poll may repeat earlier events: {e}");
        }
    }

    announcer.run().await
}

async fn prepare(config: &Config) -> error::Result<()> {
    let store = scans::SqliteScanStore::open(&config.database.path)?;
    let voice = open_voice(config)?;
    let phrasebook = phrases::Phrasebook::new(config.phrases.clone());

    let persons = store.list_tracked_persons()?;
    let mut groups = phrasebook.essentials(&persons);
    let chimes = chimes::Chimes::new(&config.chimes);
    if !chimes.is_empty() {
        groups.push((VoiceMode::Standard, chimes.phrases()));
    }

    let mut total = 0;
    for (mode, phrases) in groups {
        let synthesized = voice.prepare(&phrases, mode).await;
        info!(
            "{mode:?}: {synthesized} of {} phrases synthesized",
            phrases.len()
        );
        total += synthesized;
    }
    info!("Cache warm ({total} new clips) for {} persons", persons.len());
    Ok(())
}

async fn say(config: &Config, words: &[String], mode: VoiceMode) -> error::Result<()> {
    let voice = open_voice(config)?;
    let clip = voice.speak(words, mode).await?;
    let mut player = playback::RodioPlayer::open()?;
    player.play(&clip.samples, clip.sample_rate)?;
    tokio::time::sleep(clip.duration()).await;
    Ok(())
}
