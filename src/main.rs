//! wordgrid - turn-based word placement for 2-4 players on a shared board
//!
//! Commands:
//! - host: serve a shared store to clients on the network
//! - play: join or create a game in the terminal
//! - browse: list store hosts advertised on the local network

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use crossterm::event::{self, Event, KeyCode, KeyEventKind};
use std::fs::File;
use std::path::PathBuf;
use std::sync::atomic::AtomicBool;
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;
use wordgrid::app::App;
use wordgrid::game::{GameId, LexiconHandle, PlayerId};
use wordgrid::network::client::parse_address;
use wordgrid::network::{HostTracker, RemoteStore, Server, ServiceDiscovery, StoreHost};
use wordgrid::storage::{SqliteStore, Store};
use wordgrid::tui::{self, Tui};
use wordgrid::{EngineConfig, GameSession, StoreConfig};

/// File the terminal client logs to, inside the data directory
const LOG_FILE_NAME: &str = "wordgrid.log";

#[derive(Parser)]
#[command(name = "wordgrid")]
#[command(about = "Networked turn-based word placement")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve a shared store to clients
    Host(HostArgs),
    /// Play in the terminal
    Play(PlayArgs),
    /// List hosts advertised on the local network
    Browse {
        /// How long to listen for advertisements
        #[arg(long, default_value = "3")]
        seconds: u64,
    },
}

#[derive(Args)]
struct HostArgs {
    /// First port to try; the next free one up to 100 above is used if taken
    #[arg(long, default_value_t = wordgrid::network::server::DEFAULT_PORT)]
    port: u16,
    /// Database file, or :memory:
    #[arg(long)]
    db: Option<PathBuf>,
    /// Advertise on the local network under this label
    #[arg(long)]
    advertise: Option<String>,
}

#[derive(Args)]
struct PlayArgs {
    /// Display name, unique within the game
    #[arg(long)]
    name: String,
    /// Start a new game
    #[arg(long, conflicts_with = "game")]
    new: bool,
    /// Join an existing game
    #[arg(long)]
    game: Option<String>,
    /// Player id from an earlier session, to reclaim that seat
    #[arg(long, requires = "game")]
    player_id: Option<String>,
    /// Store host address, IP or IP:PORT
    #[arg(long, conflicts_with = "local_db")]
    connect: Option<String>,
    /// Use a local database file instead of a host
    #[arg(long)]
    local_db: Option<PathBuf>,
    /// Extra word list, one word per line
    #[arg(long)]
    words: Option<PathBuf>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Host(args) => {
            init_stderr_logging();
            run_host(args)
        }
        Commands::Play(args) => {
            init_file_logging()?;
            run_play(args)
        }
        Commands::Browse { seconds } => {
            init_stderr_logging();
            run_browse(Duration::from_secs(seconds))
        }
    }
}

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("wordgrid=info"))
}

fn init_stderr_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(env_filter())
        .with_writer(std::io::stderr)
        .init();
}

/// The terminal UI owns stdout, so the client logs to a file
fn init_file_logging() -> Result<()> {
    let dir = SqliteStore::data_dir()?;
    std::fs::create_dir_all(&dir).with_context(|| format!("creating {}", dir.display()))?;
    let path = dir.join(LOG_FILE_NAME);
    let file = File::create(&path).with_context(|| format!("creating {}", path.display()))?;
    tracing_subscriber::fmt()
        .with_env_filter(env_filter())
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .init();
    Ok(())
}

fn run_host(args: HostArgs) -> Result<()> {
    let mut config = StoreConfig {
        port: args.port,
        ..StoreConfig::default()
    };
    if let Some(db) = &args.db {
        config = config.with_db_path(db);
    }
    let store = config.open().context("opening store")?;
    let server = Server::start_on_port(config.port).context("starting server")?;
    let mut host = StoreHost::new(server, store);
    println!("wordgrid store host listening on {}", host.addr());

    let mut discovery = None;
    if let Some(label) = &args.advertise {
        let instance = format!("wordgrid-{:08x}", rand::random::<u32>());
        let mut service = ServiceDiscovery::new(instance)?;
        service.advertise(label, host.port())?;
        discovery = Some(service);
    }

    // Runs until the process is killed
    let shutdown = AtomicBool::new(false);
    host.run(&shutdown);

    if let Some(mut service) = discovery {
        service.stop_advertising()?;
        service.shutdown()?;
    }
    Ok(())
}

fn run_browse(listen: Duration) -> Result<()> {
    let instance = format!("wordgrid-browse-{:08x}", rand::random::<u32>());
    let discovery = ServiceDiscovery::new(instance)?;
    let rx = discovery.browse()?;

    let mut tracker = HostTracker::new();
    let deadline = Instant::now() + listen;
    while let Some(left) = deadline.checked_duration_since(Instant::now()) {
        match rx.recv_timeout(left) {
            Ok(event) => tracker.apply(event),
            Err(_) => break,
        }
    }

    if tracker.count() == 0 {
        println!("no hosts found");
    }
    for host in tracker.hosts() {
        let addr = host.connect_string().unwrap_or_else(|| format!("{}:{}", host.hostname, host.port));
        println!("{:<20} {:<24} v{}", host.label, addr, host.version);
    }

    discovery.stop_browsing()?;
    discovery.shutdown()?;
    Ok(())
}

fn run_play(args: PlayArgs) -> Result<()> {
    let store: Box<dyn Store> = match (&args.connect, &args.local_db) {
        (Some(addr), _) => Box::new(RemoteStore::new(parse_address(addr).context("bad host address")?)),
        (None, Some(path)) => Box::new(SqliteStore::open(path)?),
        (None, None) => Box::new(SqliteStore::open_default()?),
    };

    let config = EngineConfig {
        extra_words: args.words.clone(),
        ..EngineConfig::default()
    };
    let lexicon = LexiconHandle::load_in_background(config.extra_words.clone());
    let mut session = GameSession::new(store, lexicon, config);

    match (&args.game, args.new) {
        (Some(game), false) => {
            let game_id = GameId::from(game.as_str());
            if let Some(player_id) = &args.player_id {
                session.remember_identity(game_id.clone(), PlayerId::from(player_id.as_str()));
            }
            session.join_game(&game_id, &args.name)?;
        }
        (None, true) => {
            session.create_game(&args.name)?;
        }
        _ => bail!("pass either --new or --game <ID>"),
    }
    if let (Some(game), Some(player)) = (session.game_id(), session.player_id()) {
        tracing::info!(game_id = %game, player_id = %player, "session ready");
    }

    let mut app = App::new(session);
    run_tui(&mut app)?;

    if let (Some(game), Some(player)) = (app.session.game_id(), app.session.player_id()) {
        println!("game {}  player {}", game, player);
    }
    Ok(())
}

fn run_tui<S: Store>(app: &mut App<S>) -> Result<()> {
    let mut terminal = Tui::new()?;
    terminal.enter()?;

    // Feeds are drained on every tick
    let tick_rate = Duration::from_millis(200);
    let mut last_tick = Instant::now();

    loop {
        let now = Instant::now();
        terminal.draw(|frame| tui::render(frame, app, now))?;

        let timeout = tick_rate
            .checked_sub(last_tick.elapsed())
            .unwrap_or(Duration::ZERO);

        if event::poll(timeout)? {
            if let Event::Key(key) = event::read()? {
                // Only handle key press events (not release)
                if key.kind == KeyEventKind::Press {
                    match key.code {
                        KeyCode::Esc => app.quit(),
                        KeyCode::Enter => app.on_submit(),
                        KeyCode::Backspace | KeyCode::Delete => app.on_backspace(),
                        KeyCode::Left => app.move_cursor(-1, 0),
                        KeyCode::Right => app.move_cursor(1, 0),
                        KeyCode::Up => app.move_cursor(0, -1),
                        KeyCode::Down => app.move_cursor(0, 1),
                        KeyCode::Char('*') => app.begin_blank_assignment(),
                        KeyCode::Char('!') => app.on_clear(),
                        KeyCode::Char('@') => app.on_reconnect(),
                        KeyCode::Char('#') => app.on_restart(),
                        KeyCode::Char(c) if c.is_ascii_alphabetic() => app.on_char(c.to_ascii_uppercase()),
                        _ => {}
                    }
                }
            }
        }

        if last_tick.elapsed() >= tick_rate {
            app.tick(Instant::now());
            last_tick = Instant::now();
        }

        if app.should_quit {
            break;
        }
    }

    app.session.leave_game();
    Ok(())
}
