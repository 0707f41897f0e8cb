use std::path::PathBuf;
use std::rc::Rc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::task::LocalSet;
use tracing_subscriber::EnvFilter;

use tg2048::config::{self, Settings};
use tg2048::engine::{Board, Move, TileIds};
use tg2048::game::MoveError;
use tg2048::runtime::{GameEvent, Session, NO_RECORD};
use tg2048::store::{FileStore, LocalStore, MemoryCloud, MemoryServer};

#[derive(Parser)]
#[command(name = "tg2048", version, about = "2048 in the terminal")]
struct Cli {
    /// Directory holding the save, best score and settings.
    #[arg(long, env = "TG2048_DATA_DIR", global = true)]
    data_dir: Option<PathBuf>,
    /// Player identity used for score submission.
    #[arg(long, env = "TG2048_IDENTITY", global = true)]
    identity: Option<String>,
    #[arg(long, global = true)]
    seed: Option<u64>,
    /// Visual-completion window of a move, in milliseconds.
    #[arg(long, global = true)]
    settle_ms: Option<u64>,
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Clone, Copy)]
enum Commands {
    /// Read moves from stdin (h/j/k/l, w/a/s/d, left/right/up/down, new, share, quit).
    Play,
    /// Play random moves.
    Autoplay {
        #[arg(long, default_value_t = 200)]
        moves: u32,
    },
    /// Print the saved game.
    Show,
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .init();
}

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    let paths = config::project_paths(cli.data_dir).context("resolving data directory")?;
    let mut settings = config::load_or_init_settings(&paths.settings_path);
    if cli.identity.is_some() {
        settings.identity = cli.identity;
    }
    if cli.seed.is_some() {
        settings.seed = cli.seed;
    }
    if let Some(ms) = cli.settle_ms {
        settings.settle_ms = ms;
    }
    let store = FileStore::open(&paths.data_dir)
        .with_context(|| format!("opening data directory {}", paths.data_dir.display()))?;

    let command = cli.command.unwrap_or(Commands::Play);
    if let Commands::Show = command {
        return show(&store);
    }

    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("building runtime")?;
    LocalSet::new().block_on(&rt, run(command, settings, store))
}

fn new_rng(seed: Option<u64>) -> StdRng {
    match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    }
}

async fn run(command: Commands, settings: Settings, store: FileStore) -> Result<()> {
    // No network transport: remotes are simulated for the lifetime of the process.
    let cloud = MemoryCloud::new(settings.cloud_latency());
    let server = MemoryServer::new(settings.server_latency());
    let (session, mut events) = Session::start(
        new_rng(settings.seed),
        Box::new(store),
        Rc::new(cloud),
        Rc::new(server),
        settings.session_options(),
    );

    match command {
        Commands::Play => play(&session, &mut events).await?,
        Commands::Autoplay { moves } => autoplay(&session, &mut events, moves, settings.seed).await,
        Commands::Show => {}
    }

    // let in-flight remote calls land before exiting
    tokio::time::sleep(settings.server_latency() * 2).await;
    report(&mut events);
    Ok(())
}

async fn play(session: &Session, events: &mut UnboundedReceiver<GameEvent>) -> Result<()> {
    print_state(session);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await.context("reading input")? {
        match line.trim() {
            "" => continue,
            "q" | "quit" | "exit" => break,
            "n" | "new" => session.new_game(),
            "share" => println!("{}", session.share_text()),
            input => match input.parse::<Move>() {
                Ok(dir) => match session.apply_move(dir) {
                    Ok(result) if !result.changed => println!("nothing moves {dir}"),
                    Ok(_) => session.settled().await,
                    Err(MoveError::Settling) => println!("still moving"),
                },
                Err(e) => {
                    println!("{e}");
                    continue;
                }
            },
        }
        report(events);
        print_state(session);
    }
    Ok(())
}

async fn autoplay(session: &Session, events: &mut UnboundedReceiver<GameEvent>, moves: u32, seed: Option<u64>) {
    let mut rng = new_rng(seed.map(|s| s.wrapping_add(1)));
    let mut made = 0;
    while made < moves && !session.game().is_over() {
        let dir = Move::ALL[rng.gen_range(0..Move::ALL.len())];
        if let Ok(result) = session.apply_move(dir) {
            if result.changed {
                made += 1;
                session.settled().await;
            }
        }
        report(events);
    }
    print_state(session);
    println!("Moves made: {made}");
}

fn report(events: &mut UnboundedReceiver<GameEvent>) {
    while let Ok(event) = events.try_recv() {
        match event {
            GameEvent::BestChanged(best) => println!("new best: {best}"),
            GameEvent::GameOver { score, best } => println!("game over! score {score}, best {best}"),
            GameEvent::Notice(notice) => println!("{notice}"),
            GameEvent::Reset { .. } | GameEvent::MoveApplied { .. } | GameEvent::MoveSettled { .. } => {}
        }
    }
}

fn print_state(session: &Session) {
    let game = session.game();
    println!("{}", game.board());
    let global = session.server_best().map_or_else(|| NO_RECORD.to_string(), |b| b.to_string());
    println!(
        "score: {}  best: {}  global: {}  highest tile: {}",
        game.score().current(),
        session.best(),
        global,
        game.board().highest_tile()
    );
    for line in game.history().lines() {
        println!("  {line}");
    }
}

fn show(store: &FileStore) -> Result<()> {
    let Some(snapshot) = store.load_snapshot().context("reading saved game")? else {
        println!("no saved game (best: {})", store.read_best());
        return Ok(());
    };
    let board = Board::from_values(&snapshot.grid, &mut TileIds::default());
    println!("{board}");
    println!(
        "score: {}  best: {}  highest tile: {}",
        snapshot.score,
        snapshot.best.max(store.read_best()),
        board.highest_tile()
    );
    for line in &snapshot.math_history {
        println!("  {line}");
    }
    Ok(())
}
