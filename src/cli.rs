//! CLI interface for lingo-coach

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::sync::Arc;

use crate::agent::{ExchangeOrchestrator, ExchangeOutcome, ExchangeReport, HttpSender};
use crate::config::{self, Config};
use crate::learning::{recommend, LessonRecommendation, StoredAssessment, Streak, Tier, TopicTracker, Vocabulary};
use crate::storage::{keys, QuotaSafeStore};
use crate::types::Exchange;

#[derive(Parser)]
#[command(name = "lingo-coach")]
#[command(about = "Adaptive Nepali practice assistant with a rate-limited completion backend", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the completion backend
    Serve {
        /// Port to listen on
        #[arg(short, long)]
        port: Option<u16>,
        /// Host to bind to
        #[arg(long)]
        host: Option<String>,
    },
    /// Practice in an interactive session (default when no command given)
    Chat {
        /// Completion endpoint URL
        #[arg(short, long, env = "LINGO_ENDPOINT")]
        endpoint: Option<String>,
    },
    /// Show the stored profile, streak, topics and recommendations
    Status,
    /// Clear conversation history (vocabulary and streak are kept)
    Reset {
        /// Skip confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },
    /// Show configuration
    Config {
        /// Show current configuration
        #[arg(long)]
        show: bool,
        /// Print the configuration file path
        #[arg(long)]
        path: bool,
    },
}

pub async fn run() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        None => chat(None).await?,
        Some(Commands::Chat { endpoint }) => chat(endpoint).await?,
        Some(Commands::Serve { port, host }) => {
            let config = Config::load()?;
            let host = host.unwrap_or_else(|| config.server.host.clone());
            let port = port.unwrap_or(config.server.port);
            crate::server::start(config, &host, port).await?;
        }
        Some(Commands::Status) => status()?,
        Some(Commands::Reset { yes }) => reset(yes)?,
        Some(Commands::Config { show, path }) => {
            if path {
                println!("{}", config::config_path()?.display());
            } else if show {
                config::show_config(&Config::load()?)?;
            } else {
                println!("Configuration options:");
                println!("  --show    Display current configuration");
                println!("  --path    Print the configuration file path");
                println!();
                println!("Environment overrides: {}, LINGO_UPSTREAM_URL, LINGO_MODEL,", config::API_KEY_ENV);
                println!("  LINGO_RATE_LIMIT_WINDOW_MS, LINGO_RATE_LIMIT_MAX, LINGO_MAX_RETRIES,");
                println!("  LINGO_RETRY_INITIAL_DELAY_MS, LINGO_RETRY_MAX_DELAY_MS, LINGO_STORAGE_QUOTA_MB,");
                println!("  LINGO_STORAGE_CAPACITY_MB");
            }
        }
    }

    Ok(())
}

fn open_store(config: &Config) -> Result<Arc<QuotaSafeStore>> {
    Ok(Arc::new(QuotaSafeStore::from_config(config)?))
}

fn print_recommendations(lessons: &[LessonRecommendation]) {
    if lessons.is_empty() {
        println!("  (no lessons, keep conversing freely)");
        return;
    }
    for (i, lesson) in lessons.iter().enumerate() {
        println!(
            "  {}. {} [level {}, ~{} min]",
            i + 1,
            lesson.title,
            lesson.difficulty,
            lesson.estimated_minutes
        );
        println!("     {}", lesson.description);
    }
}

fn print_report(report: &ExchangeReport, last_tier: &mut Option<Tier>) {
    println!("\x1b[36m{}\x1b[0m", report.reply);

    if let Some(profile) = &report.profile {
        if *last_tier != Some(profile.tier) {
            println!();
            println!(
                "\x1b[33m★ Level: {} ({}/5, confidence {:.0}%)\x1b[0m",
                profile.tier,
                profile.standardized_level,
                profile.confidence * 100.0
            );
            println!("Suggested lessons:");
            print_recommendations(&report.recommendations);
            *last_tier = Some(profile.tier);
        }
    }
    println!();
}

async fn chat(endpoint: Option<String>) -> Result<()> {
    let config = Config::load()?;
    let endpoint = endpoint.unwrap_or_else(|| config.client.endpoint.clone());
    let store = open_store(&config)?;
    let sender = Arc::new(HttpSender::new(&endpoint)?);
    let coach = ExchangeOrchestrator::new(&config, sender, store);

    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!("     Lingo Coach - नेपाली अभ्यास");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!("Endpoint: {}", endpoint);
    println!("Commands: /status  /topics  /reset  /quit");
    if coach.streak() > 0 {
        println!("🔥 Streak: {} day(s)", coach.streak());
    }
    println!();

    let rl_config = rustyline::Config::builder()
        .edit_mode(rustyline::EditMode::Emacs)
        .auto_add_history(true)
        .build();
    let mut rl = rustyline::DefaultEditor::with_config(rl_config)?;
    let mut last_tier = coach.profile().map(|p| p.tier);

    loop {
        match rl.readline("\x1b[32m❯\x1b[0m ") {
            Ok(line) => {
                let input = line.trim();
                if input.is_empty() {
                    continue;
                }

                match input {
                    "/quit" | "/exit" | "exit" | "quit" => break,
                    "/status" => {
                        print_session(&coach);
                        continue;
                    }
                    "/topics" => {
                        println!("Recent topics: {}", coach.topics().join(", "));
                        continue;
                    }
                    "/reset" => {
                        coach.reset();
                        println!("Conversation history cleared.");
                        continue;
                    }
                    _ => {}
                }

                match coach.send(input).await {
                    Ok(ExchangeOutcome::Replied(report)) => print_report(&report, &mut last_tier),
                    Ok(ExchangeOutcome::Ignored) => println!("Still waiting for the previous reply..."),
                    Err(e) => {
                        tracing::debug!(error = %e, "Exchange failed");
                        println!("\x1b[31m✗ {}\x1b[0m", e.user_message());
                        println!();
                    }
                }
            }
            Err(rustyline::error::ReadlineError::Interrupted) => {
                println!("^C");
                continue;
            }
            Err(rustyline::error::ReadlineError::Eof) => break,
            Err(err) => {
                println!("Error: {}", err);
                break;
            }
        }
    }

    coach.flush();
    println!("फेरि भेटौंला! See you next time.");
    Ok(())
}

fn print_session(coach: &ExchangeOrchestrator) {
    match coach.profile() {
        Some(profile) => println!(
            "Level: {} ({}/5) | strengths: {} | to work on: {}",
            profile.tier,
            profile.standardized_level,
            join_or_dash(profile.strengths.iter()),
            join_or_dash(profile.weaknesses.iter())
        ),
        None => println!("Level: not assessed yet"),
    }
    println!(
        "Streak: {} day(s) | words learned: {} | exchanges: {}",
        coach.streak(),
        coach.vocabulary_size(),
        coach.history().len()
    );
}

fn join_or_dash<'a>(items: impl Iterator<Item = &'a String>) -> String {
    let joined = items.map(String::as_str).collect::<Vec<_>>().join(", ");
    if joined.is_empty() {
        "-".to_string()
    } else {
        joined
    }
}

fn status() -> Result<()> {
    let config = Config::load()?;
    let store = open_store(&config)?;

    let stored: StoredAssessment = store.get_safe(keys::PROFILE, StoredAssessment::default());
    let streak = Streak::load(&store);
    let vocabulary = Vocabulary::load(&store);
    let topics = TopicTracker::with_store(store.clone());
    let history: Vec<Exchange> = store.get_safe(keys::HISTORY, Vec::new());

    println!("Learner Status");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    match &stored.profile {
        Some(profile) => {
            println!("  Level:        {} ({}/5)", profile.tier, profile.standardized_level);
            println!("  Confidence:   {:.0}%", profile.confidence * 100.0);
            println!("  Strengths:    {}", join_or_dash(profile.strengths.iter()));
            println!("  To work on:   {}", join_or_dash(profile.weaknesses.iter()));
            println!("  Assessed:     {}", profile.last_assessed.format("%Y-%m-%d %H:%M UTC"));
        }
        None => println!("  Level:        not assessed yet"),
    }
    println!(
        "  Outcomes:     {} good / {} corrected",
        stored.counters.success_count, stored.counters.error_count
    );
    println!(
        "  Streak:       {} day(s){}",
        streak.count,
        streak
            .last_practice
            .map(|d| format!(", last practiced {}", d))
            .unwrap_or_default()
    );
    println!("  Vocabulary:   {} word(s)", vocabulary.len());
    println!("  Topics:       {}", join_or_dash(topics.topics().iter()));
    println!("  History:      {} exchange(s)", history.len());

    if let Some(profile) = &stored.profile {
        println!();
        println!("Suggested lessons:");
        print_recommendations(&recommend(profile));
    }

    Ok(())
}

fn reset(skip_confirm: bool) -> Result<()> {
    let config = Config::load()?;
    let store = open_store(&config)?;
    let history: Vec<Exchange> = store.get_safe(keys::HISTORY, Vec::new());

    if history.is_empty() {
        println!("No conversation history found.");
        return Ok(());
    }

    if !skip_confirm {
        println!("This will delete {} exchange(s) of conversation history.", history.len());
        println!("Vocabulary, profile and streak will be preserved.");
        println!();
        println!("Type 'yes' to confirm:");

        let mut input = String::new();
        std::io::stdin().read_line(&mut input)?;

        if input.trim().to_lowercase() != "yes" {
            println!("Cancelled.");
            return Ok(());
        }
    }

    if store.remove(keys::HISTORY) {
        println!("Cleared {} exchange(s).", history.len());
    } else {
        anyhow::bail!("Failed to clear conversation history");
    }

    Ok(())
}
