use std::{
    fs,
    io::{self, BufRead, BufReader},
    rc::Rc,
};

use anyhow::{Context, Result};
use clap::Parser;
use coderip_analysis::markup::plain_text;
use coderip_engine::dialogue::transport::HttpTransport;
use coderip_engine::disclosure::{DescriptionView, FunctionInfo};
use coderip_engine::discovery::DiscoveryRecord;
use coderip_engine::error::TurnError;
use coderip_engine::events::{WorldEvent, WorldObserver};
use coderip_engine::inventory::CollectOutcome;
use coderip_engine::{Game, GameConfig, TurnOutcome};

mod cli;
use cli::{parse_line, Args, Command, HELP};

/// Prints world events as they happen.
struct ConsoleObserver;

impl WorldObserver for ConsoleObserver {
    fn on_event(&self, event: &WorldEvent) {
        match event {
            WorldEvent::Message { object, text } => println!("[coderip] {object}: {text}"),
            WorldEvent::ExecutionFailure(failure) => println!("[coderip] error: {failure}"),
            WorldEvent::Patch(report) => println!("[coderip] {}", report.acknowledgment()),
            WorldEvent::Rerender { object, functions } => {
                println!("[coderip] card for {object} updated");
                for info in functions {
                    print_function(info);
                }
            }
            WorldEvent::ObjectSpawned { object, kind } => {
                println!("[coderip] {object} ({kind}) appeared")
            }
            WorldEvent::ObjectRemoved { object } => println!("[coderip] {object} is gone"),
            WorldEvent::Unlocked {
                object,
                function,
                key,
            } => println!("[coderip] {object}.{function} unlocked with a {key} key"),
            WorldEvent::KeysGranted { kind, count } => {
                println!("[coderip] received {count} {kind} key(s)")
            }
            WorldEvent::Victory { object } => println!("[coderip] {object} opened. You escaped!"),
        }
    }
}

fn print_function(info: &FunctionInfo) {
    println!("  {} [{}]", info.display_name, info.permission);
    match &info.description {
        Some(DescriptionView::Markup { markup, .. }) => {
            println!("    description: {}", plain_text(markup))
        }
        Some(DescriptionView::Missing) => println!("    description: (none)"),
        None => {}
    }
    if let Some(body) = &info.body {
        for line in body.lines() {
            println!("    | {line}");
        }
    }
}

fn print_record(record: &DiscoveryRecord) {
    println!("[coderip] {} ({})", record.object, record.kind);
    for info in &record.functions {
        print_function(info);
    }
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default)).init();
}

fn print_outcome(game: &Game, outcome: TurnOutcome) {
    match outcome {
        TurnOutcome::Answered { reply, applied } => {
            println!("[{}] {reply}", game.config().agent.persona);
            for rejected in &applied.malformed {
                println!(
                    "[coderip] ignored malformed directive at byte {}: {}",
                    rejected.offset, rejected.error
                );
            }
        }
        TurnOutcome::Failed(error) => {
            println!("[coderip] the agent could not be reached ({error}); use retry")
        }
        TurnOutcome::Discarded => println!("[coderip] a late answer was discarded"),
    }
}

async fn run_command(game: &mut Game, transport: Option<&HttpTransport>, command: Command) {
    match command {
        Command::Look => {
            let discovered = game.world().discoveries();
            for entity in game.world().objects() {
                let marker = if discovered.contains(&entity.name) { " *" } else { "" };
                println!(
                    "[coderip] {} ({}) at ({:.0}, {:.0}){marker}",
                    entity.name,
                    entity.kind.label(),
                    entity.x(),
                    entity.y()
                );
            }
        }
        Command::Inspect(object) => match transport {
            Some(transport) => match game.analyze(transport, &object).await {
                Ok((record, outcome)) => {
                    print_record(&record);
                    print_outcome(game, outcome);
                }
                Err(error) => println!("[coderip] {error}"),
            },
            None => match game.inspect(&object) {
                Ok(record) => print_record(&record),
                Err(error) => println!("[coderip] {error}"),
            },
        },
        Command::Click { object, args } => {
            if let Err(error) = game.world_mut().click(&object, &args) {
                println!("[coderip] {error}");
            }
        }
        Command::Drag { object, x, y } => match game.world_mut().drag(&object, x, y) {
            Ok(()) => println!("[coderip] moved {object} to ({x:.0}, {y:.0})"),
            Err(error) => println!("[coderip] {error}"),
        },
        Command::Tick(count) => {
            let mut collisions = 0;
            for _ in 0..count {
                collisions += game.world_mut().tick().collisions;
            }
            println!(
                "[coderip] tick {} ({collisions} collision(s))",
                game.world().ticks()
            );
        }
        Command::Say(text) => {
            let Some(transport) = transport else {
                println!("[coderip] {}", TurnError::Offline);
                return;
            };
            match game.run_turn(transport, text, None).await {
                Ok(outcome) => print_outcome(game, outcome),
                Err(error) => println!("[coderip] {error}"),
            }
        }
        Command::Retry => {
            let Some(transport) = transport else {
                println!("[coderip] {}", TurnError::Offline);
                return;
            };
            match game.retry(transport).await {
                Ok(outcome) => print_outcome(game, outcome),
                Err(error) => println!("[coderip] {error}"),
            }
        }
        Command::Unlock { object, shown, key } => match game.unlock(&object, &shown, &key) {
            Ok(outcome) => {
                for token in &outcome.offered_tokens {
                    println!("[coderip] new token visible: {token}");
                }
            }
            Err(error) => println!("[coderip] {error}"),
        },
        Command::Collect { object, shown } => match game.collect(&object, &shown) {
            Ok(collected) if collected.is_empty() => println!("[coderip] nothing to collect"),
            Ok(collected) => {
                for (token, outcome) in collected {
                    match outcome {
                        CollectOutcome::Added => println!("[coderip] collected {token}"),
                        CollectOutcome::AlreadyHeld => println!("[coderip] already holding {token}"),
                    }
                }
            }
            Err(error) => println!("[coderip] {error}"),
        },
        Command::Inventory => {
            let inventory = game.world().inventory();
            if inventory.keys().is_empty() && inventory.tokens().is_empty() {
                println!("[coderip] inventory is empty");
            }
            for (kind, count) in inventory.keys() {
                println!("[coderip] {kind} key x{count}");
            }
            for token in inventory.tokens() {
                println!("[coderip] token {token}");
            }
        }
        Command::Apply(text) => {
            let applied = game.apply(&text);
            if applied.reports.is_empty() && applied.malformed.is_empty() {
                println!("[coderip] no directive found");
            }
            for rejected in &applied.malformed {
                println!(
                    "[coderip] ignored malformed directive at byte {}: {}",
                    rejected.offset, rejected.error
                );
            }
        }
        Command::Help => println!("{HELP}"),
        Command::Quit => {}
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.verbose);

    let mut config =
        GameConfig::from_json_file(args.config.as_deref()).context("loading configuration")?;
    if let Some(variant) = args.grammar {
        config.directive.variant = variant;
    }
    if let Some(seed) = args.seed {
        config.world.seed = seed;
    }

    let transport = if args.offline {
        None
    } else {
        let transport = HttpTransport::from_config(&config.agent);
        if transport.is_none() {
            println!(
                "[coderip] ${} is not set; the agent is offline",
                config.agent.api_key_env
            );
        }
        transport
    };

    let mut game = Game::new(config).context("building the world")?;
    game.world_mut().set_observer(Rc::new(ConsoleObserver));
    log::info!(
        "{} objects loaded, directive style {}",
        game.world().objects().count(),
        game.grammar().variant().label()
    );

    let input: Box<dyn BufRead> = match &args.script {
        Some(path) => Box::new(BufReader::new(
            fs::File::open(path).with_context(|| format!("opening script {}", path.display()))?,
        )),
        None => Box::new(io::stdin().lock()),
    };

    for line in input.lines() {
        let line = line.context("reading command")?;
        let command = match parse_line(&line) {
            Ok(Some(command)) => command,
            Ok(None) => continue,
            Err(error) => {
                println!("[coderip] {error:#}");
                continue;
            }
        };
        if command == Command::Quit {
            break;
        }
        run_command(&mut game, transport.as_ref(), command).await;
    }
    if game.world().has_won() {
        println!("[coderip] finished in {} tick(s)", game.world().ticks());
    }
    Ok(())
}
