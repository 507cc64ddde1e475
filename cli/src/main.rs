use tracing_subscriber::prelude::__tracing_subscriber_SubscriberExt;

use analysis::driver::UnknownEntityPolicy;
use analysis::{Driver, DriverConfig, DriverHandle, Outcome, RecordedSource};
use common::demo_analysis::ScoreBoard;

/// Replays a recorded demo event stream and prints the resulting scoreboard
#[derive(Debug, clap::Parser)]
struct Cli {
    /// Recorded event stream (JSON)
    path: std::path::PathBuf,

    /// Print the result as JSON instead of a table
    #[arg(long)]
    json: bool,

    /// Fail the run on events that reference unknown teams or players
    #[arg(long)]
    strict: bool,

    /// Read commands from stdin: `p` toggles pause, `c` cancels, `s` prints the live state
    #[arg(long)]
    interactive: bool,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> std::process::ExitCode {
    let registry = tracing_subscriber::Registry::default()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(tracing_subscriber::filter::filter_fn(|meta| {
            meta.target().contains("analysis") || meta.target().contains("demo_replay")
        }));
    if let Err(e) = tracing::subscriber::set_global_default(registry) {
        eprintln!("Setting up tracing: {}", e);
    }

    let args = <Cli as clap::Parser>::parse();

    match run(args).await {
        Ok(code) => code,
        Err(e) => {
            tracing::error!("{}", e);
            std::process::ExitCode::FAILURE
        }
    }
}

async fn run(args: Cli) -> Result<std::process::ExitCode, String> {
    let file = std::fs::File::open(&args.path)
        .map_err(|e| format!("Opening {:?}: {}", args.path, e))?;
    let mmap = unsafe { memmap2::MmapOptions::new().map(&file) }
        .map_err(|e| format!("Mapping {:?}: {}", args.path, e))?;

    let source = RecordedSource::from_json(&mmap).map_err(|e| format!("Loading recording: {}", e))?;
    drop(mmap);

    let config = DriverConfig {
        unknown_entities: if args.strict {
            UnknownEntityPolicy::Fail
        } else {
            UnknownEntityPolicy::Skip
        },
        ..Default::default()
    };

    let started = std::time::Instant::now();
    let (handle, mut progress) = Driver::with_config(source, config)
        .start()
        .map_err(|e| format!("Starting driver: {}", e))?;

    let cancel_sampler = tokio_util::sync::CancellationToken::new();
    let (sampler, mut rates) = analysis::rate::spawn(handle.monitor(), cancel_sampler.clone());

    let mut commands = if args.interactive {
        Some(spawn_stdin_reader())
    } else {
        None
    };

    let mut last_percentage = None;
    loop {
        tokio::select! {
            p = progress.recv() => {
                let p = match p {
                    Some(p) => p,
                    None => break,
                };
                if last_percentage != Some(p.percentage) {
                    last_percentage = Some(p.percentage);
                    eprintln!("{}% - Tick : {}/{}", p.percentage, p.position, p.total);
                }
            }
            Some(rate) = rates.recv() => {
                eprintln!("{} ticks/s - avg {} ticks/s", rate.current, rate.average);
            }
            Some(command) = async {
                match commands.as_mut() {
                    Some(rx) => rx.recv().await,
                    None => std::future::pending::<Option<String>>().await,
                }
            } => {
                handle_command(&handle, command.trim());
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Interrupted, cancelling");
                handle.cancel();
            }
        }
    }

    cancel_sampler.cancel();
    if let Err(e) = sampler.await {
        tracing::warn!("Rate sampler: {}", e);
    }

    let outcome = handle.finished().await;
    eprintln!("Time: {:.3}s", started.elapsed().as_secs_f64());

    match outcome {
        Outcome::Completed { game, scoreboard } => {
            print_result(&game, &scoreboard, false, args.json)?;
            Ok(std::process::ExitCode::SUCCESS)
        }
        Outcome::Cancelled(partial) => {
            let game = partial.game();
            let scoreboard = analysis::scoreboard::build(game)
                .map_err(|e| format!("Building partial scoreboard: {}", e))?;
            print_result(game, &scoreboard, true, args.json)?;
            Ok(std::process::ExitCode::from(2))
        }
        Outcome::Failed { error, game } => {
            tracing::error!(
                rounds = game.rounds().len(),
                frags = game.frags().len(),
                "Replay failed: {}",
                error
            );
            Ok(std::process::ExitCode::FAILURE)
        }
    }
}

fn spawn_stdin_reader() -> tokio::sync::mpsc::UnboundedReceiver<String> {
    let (tx, rx) = tokio::sync::mpsc::unbounded_channel();

    // Detached, a blocking stdin read cannot be interrupted
    std::thread::spawn(move || {
        for line in std::io::stdin().lines() {
            let line = match line {
                Ok(l) => l,
                Err(_) => break,
            };
            if tx.send(line).is_err() {
                break;
            }
        }
    });

    rx
}

fn handle_command(handle: &DriverHandle, command: &str) {
    match command {
        "p" => {
            if !handle.pause() && !handle.resume() {
                eprintln!("Cannot pause or resume in state {:?}", handle.state());
            }
        }
        "c" => {
            handle.cancel();
        }
        "s" => {
            let game = handle.game();
            eprintln!(
                "{:?}: {} rounds, {} frags",
                handle.state(),
                game.rounds().len(),
                game.frags().len()
            );
        }
        other => eprintln!("Unknown command {:?}, expected p, c or s", other),
    }
}

fn print_result(
    game: &analysis::Game,
    scoreboard: &ScoreBoard,
    partial: bool,
    json: bool,
) -> Result<(), String> {
    if json {
        let info = game.header().map(|h| common::DemoInfo {
            map: h.map_name.clone(),
            server: h.server_name.clone(),
            duration_secs: h.playback_time.max(0.0) as u32,
        });
        let value = serde_json::json!({
            "partial": partial,
            "info": info,
            "scoreboard": scoreboard,
        });
        let out = serde_json::to_string_pretty(&value).map_err(|e| e.to_string())?;
        println!("{}", out);
        return Ok(());
    }

    if partial {
        println!("PARTIAL - the replay was cancelled before the end of the demo");
    }
    println!(
        "{} - {} rounds - {} frags",
        scoreboard.map,
        game.rounds().len(),
        game.frags().len()
    );

    for team in scoreboard.teams.iter() {
        println!();
        println!("Team {} - {} ({})", team.number, team.name, team.score);
        print_players(&team.players);
    }
    if !scoreboard.unassigned.is_empty() {
        println!();
        println!("Unassigned");
        print_players(&scoreboard.unassigned);
    }

    Ok(())
}

fn print_players(players: &[common::demo_analysis::ScoreBoardPlayer]) {
    println!(
        "  {:<24} {:>3} {:>3} {:>3} {:>5} {:>5} {:>3}",
        "Name", "K", "D", "A", "K/D", "HS%", "MVP"
    );
    for player in players {
        println!(
            "  {:<24} {:>3} {:>3} {:>3} {:>5.2} {:>5.1} {:>3}",
            player.name,
            player.kills,
            player.deaths,
            player.assists,
            player.kill_death_ratio(),
            player.headshot_percentage(),
            player.mvps
        );
    }
}
