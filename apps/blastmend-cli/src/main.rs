use anyhow::Context as _;
use blastmend_common::{BlockData, BlockPos, BlockState, Location, Material, WorldId};
use blastmend_config::{ConfigStore, RecoverConfig, RegionProviderKind};
use blastmend_engine::{
    ConsoleSender, ExplosionEvent, ExplosionOutcome, Runtime, RuntimePaths, WorldPump,
    world_channel,
};
use blastmend_kernel::{BlockWorld, World};
use blastmend_policy::RegionIndex;
use clap::{Parser, Subcommand};
use std::future::Future;
use std::path::PathBuf;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tracing_subscriber::EnvFilter;

/// One host tick at 20 ticks per second.
const TICK: Duration = Duration::from_millis(50);
const EXPLODE_USAGE: &str = "Usage: explode <x> <y> <z> [radius] [source]";
const MAX_RADIUS: i32 = 16;

#[derive(Parser)]
#[command(name = "blastmend", about = "Explosion recovery engine host")]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Directory holding config.yml, stats.json and pending restorations
    #[arg(short, long, default_value = "blastmend-data")]
    data_dir: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print version and default settings
    Info,
    /// Validate the configuration and region files in the data directory
    CheckConfig,
    /// Blow a hole in a test platform, then repair it
    Demo {
        /// Explosion radius in blocks
        #[arg(short, long, default_value = "3")]
        radius: i32,
        /// Entity type reported as the explosion source
        #[arg(short, long, default_value = "CREEPER")]
        source: String,
    },
    /// Run a simulated host and read commands from stdin
    Console {
        /// Half-width of the generated platform
        #[arg(long, default_value = "16")]
        size: i32,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .init();

    let paths = RuntimePaths::in_dir(&cli.data_dir);
    match cli.command {
        Commands::Info => {
            let defaults = RecoverConfig::default();
            println!("blastmend v{}", env!("CARGO_PKG_VERSION"));
            println!("data dir: {}", cli.data_dir.display());
            println!(
                "defaults: {} blocks every {}ms, stats flush every {}s, shutdown {:?}",
                defaults.recovery.blocks_per_run,
                defaults.recovery.interval_ms,
                defaults.stats.flush_interval_secs,
                defaults.shutdown
            );
            println!("protected: {}", join(&defaults.protected_blocks));
            println!("blacklisted: {}", join(&defaults.block_blacklist));
        }
        Commands::CheckConfig => check_config(&paths)?,
        Commands::Demo { radius, source } => {
            anyhow::ensure!(
                (1..=MAX_RADIUS).contains(&radius),
                "radius must be between 1 and {MAX_RADIUS}"
            );
            demo(paths, radius, &source).await?;
        }
        Commands::Console { size } => {
            anyhow::ensure!(size > 0, "size must be positive");
            console(paths, size).await?;
        }
    }

    Ok(())
}

fn join<'a>(materials: impl IntoIterator<Item = &'a Material>) -> String {
    let names: Vec<&str> = materials.into_iter().map(Material::as_str).collect();
    if names.is_empty() {
        "none".to_string()
    } else {
        names.join(", ")
    }
}

fn check_config(paths: &RuntimePaths) -> anyhow::Result<()> {
    anyhow::ensure!(
        paths.config.exists(),
        "no configuration at {}",
        paths.config.display()
    );
    let store = ConfigStore::open(&paths.config)
        .with_context(|| format!("reading {}", paths.config.display()))?;
    let config = store.snapshot();
    println!("config: {}", paths.config.display());
    println!("  enabled: {}", config.enabled);
    println!(
        "  recovery: {} blocks every {}ms",
        config.recovery.blocks_per_run, config.recovery.interval_ms
    );
    println!("  protected: {}", join(&config.protected_blocks));
    println!("  blacklisted: {}", join(&config.block_blacklist));
    if config.sources.is_empty() {
        println!("  sources: all");
    } else {
        println!("  sources: {}", config.sources.join(", "));
    }
    println!("  region provider: {:?}", config.regions.provider);
    if config.regions.provider == RegionProviderKind::Static {
        let file = paths.resolve(&config.regions.file);
        let index = RegionIndex::load(&file)
            .with_context(|| format!("loading regions from {}", file.display()))?;
        println!("  regions: {} cuboids in {}", index.region_count(), file.display());
    }
    println!("OK");
    Ok(())
}

async fn demo(paths: RuntimePaths, radius: i32, source: &str) -> anyhow::Result<()> {
    let (handle, mut pump) = world_channel();
    let runtime = Runtime::assemble(paths, handle)?;
    let mut world = World::new();
    let id = WorldId::new();
    world.add_world(id);
    build_platform(&mut world, id, radius + 2)?;
    let before = world.block_count();

    let outcome = explode(
        &runtime,
        &mut world,
        Location::new(id, 0.0, 2.0, 0.0),
        radius,
        source,
    )?;
    print_outcome(&outcome);
    println!("blocks: {before} before, {} after the explosion", world.block_count());

    let commands = runtime.commands().clone();
    let output = pumped(&mut pump, &mut world, async move {
        commands.dispatch(&ConsoleSender, &["fix", "all"]).await
    })
    .await?;
    for line in output.lines {
        println!("{line}");
    }
    println!("blocks: {} after repair", world.block_count());

    let report = pumped(&mut pump, &mut world, runtime.shutdown()).await??;
    println!(
        "totals: {} blocks in {} explosions",
        report.stats.blocks_recovered, report.stats.explosions_recovered
    );
    Ok(())
}

async fn console(paths: RuntimePaths, size: i32) -> anyhow::Result<()> {
    let (handle, mut pump) = world_channel();
    let mut runtime = Runtime::assemble(paths, handle)?;
    let mut world = World::new();
    let mut id = WorldId::new();
    world.add_world(id);
    build_platform(&mut world, id, size)?;
    runtime.start();

    println!("Commands: recover <args>, explode <x> <y> <z> [radius] [source], reset-world, status, stop");
    let (out_tx, mut out_rx) = mpsc::unbounded_channel::<Vec<String>>();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut ticker = tokio::time::interval(TICK);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                pump.pump(&mut world);
                world.step();
                let events = world.drain_events();
                tracing::trace!(tick = world.tick(), events = events.len(), "host tick");
            }
            Some(output) = out_rx.recv() => {
                for line in output {
                    println!("{line}");
                }
            }
            line = lines.next_line() => {
                let Some(line) = line? else {
                    break;
                };
                let words: Vec<&str> = line.split_whitespace().collect();
                match words.as_slice() {
                    [] => {}
                    ["stop" | "exit"] => break,
                    ["status"] => {
                        let stats = runtime.stats().snapshot();
                        println!(
                            "tick {}: {} blocks, {} pending in {} explosions, {} recovered",
                            world.tick(),
                            world.block_count(),
                            runtime.queue().pending_blocks(),
                            runtime.queue().pending_explosions(),
                            stats.blocks_recovered
                        );
                    }
                    ["reset-world"] => {
                        world.remove_world(id);
                        let discarded = runtime.world_removed(id);
                        id = WorldId::new();
                        world.add_world(id);
                        build_platform(&mut world, id, size)?;
                        println!("World replaced, {discarded} pending blocks discarded.");
                    }
                    ["recover", args @ ..] => {
                        let commands = runtime.commands().clone();
                        let args: Vec<String> = args.iter().map(|s| s.to_string()).collect();
                        let tx = out_tx.clone();
                        tokio::spawn(async move {
                            let args: Vec<&str> = args.iter().map(String::as_str).collect();
                            let output = commands.dispatch(&ConsoleSender, &args).await;
                            // Console loop gone means we are shutting down.
                            let _ = tx.send(output.lines);
                        });
                    }
                    ["explode", args @ ..] => match parse_explode(id, args) {
                        Ok((centre, radius, source)) => {
                            let outcome = explode(&runtime, &mut world, centre, radius, &source)?;
                            print_outcome(&outcome);
                        }
                        Err(err) => println!("{err}"),
                    },
                    [other, ..] => println!("Unknown command: {other}"),
                }
            }
        }
    }

    let report = pumped(&mut pump, &mut world, runtime.shutdown()).await??;
    println!(
        "Stopped ({:?}): {} restored, {} explosions saved for next start.",
        report.mode, report.restored, report.persisted_explosions
    );
    Ok(())
}

/// Run `fut` on the runtime while this task keeps the world context pumping.
async fn pumped<F>(pump: &mut WorldPump, world: &mut World, fut: F) -> anyhow::Result<F::Output>
where
    F: Future + Send + 'static,
    F::Output: Send + 'static,
{
    let task = tokio::spawn(fut);
    while !task.is_finished() {
        pump.pump(world);
        tokio::time::sleep(TICK).await;
    }
    Ok(task.await?)
}

fn material(name: &str) -> anyhow::Result<Material> {
    Ok(Material::parse(name)?)
}

/// Three layers of terrain with a few decorations in the middle.
fn build_platform(world: &mut World, id: WorldId, half: i32) -> anyhow::Result<()> {
    let layers = [material("STONE")?, material("DIRT")?, material("GRASS_BLOCK")?];
    for x in -half..=half {
        for z in -half..=half {
            for (y, layer) in layers.iter().enumerate() {
                world.set_block(BlockPos::new(id, x, y as i32, z), BlockData::solid(layer.clone()))?;
            }
        }
    }
    let top = |x, z| BlockPos::new(id, x, 3, z);
    world.set_block(top(0, 0), BlockData::solid(material("PLAYER_HEAD")?))?;
    world.set_block(top(1, 0), BlockData::solid(material("TNT")?))?;
    world.set_block(top(-1, 0), BlockData::passable(material("TORCH")?))?;
    world.set_block(
        top(0, 1),
        BlockData::solid(material("CHEST")?).with_state(BlockState(b"facing=north".to_vec())),
    )?;
    Ok(())
}

/// Every position within `radius` of `centre`.
fn sphere(centre: BlockPos, radius: i32) -> Vec<BlockPos> {
    let r2 = radius * radius;
    let mut out = Vec::new();
    for dx in -radius..=radius {
        for dy in -radius..=radius {
            for dz in -radius..=radius {
                if dx * dx + dy * dy + dz * dz <= r2 {
                    out.push(centre.offset(dx, dy, dz));
                }
            }
        }
    }
    out
}

/// Play the host's part: offer the explosion to the engine, then destroy what it left.
fn explode(
    runtime: &Runtime,
    world: &mut World,
    centre: Location,
    radius: i32,
    source: &str,
) -> anyhow::Result<ExplosionOutcome> {
    let mut event = ExplosionEvent {
        source: source.to_string(),
        location: centre,
        blocks: sphere(centre.block_pos(), radius),
    };
    let outcome = runtime.listener().handle(world, &mut event);
    for pos in event.blocks.drain(..) {
        world.clear_block(pos)?;
    }
    Ok(outcome)
}

fn print_outcome(outcome: &ExplosionOutcome) {
    match outcome.explosion {
        Some(id) => println!("Explosion {id}: {} blocks queued for repair.", outcome.captured),
        None => println!("Explosion not captured."),
    }
    if let Some(gate) = outcome.gate {
        println!("  gate: {gate}");
    }
    println!(
        "  protected: {}, blacklisted: {}, blocked: {}",
        outcome.protected, outcome.blacklisted, outcome.blocked
    );
}

fn parse_coord(raw: &str) -> Result<f64, String> {
    raw.parse()
        .map_err(|_| format!("Invalid coordinate: {raw}"))
}

fn parse_explode(world: WorldId, args: &[&str]) -> Result<(Location, i32, String), String> {
    let [x, y, z, rest @ ..] = args else {
        return Err(EXPLODE_USAGE.to_string());
    };
    let centre = Location::new(world, parse_coord(x)?, parse_coord(y)?, parse_coord(z)?);
    let radius = match rest.first() {
        Some(raw) => raw
            .parse::<i32>()
            .ok()
            .filter(|r| (1..=MAX_RADIUS).contains(r))
            .ok_or_else(|| format!("Invalid radius: {raw}"))?,
        None => 3,
    };
    let source = rest.get(1).copied().unwrap_or("TNT").to_ascii_uppercase();
    Ok((centre, radius, source))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sphere_is_bounded_by_radius() {
        let id = WorldId::new();
        let centre = BlockPos::new(id, 0, 0, 0);
        let blocks = sphere(centre, 2);
        assert!(blocks.contains(&centre));
        assert!(blocks.contains(&centre.offset(2, 0, 0)));
        assert!(!blocks.contains(&centre.offset(2, 2, 0)));
        assert_eq!(sphere(centre, 1).len(), 7);
    }

    #[test]
    fn explode_arguments() {
        let id = WorldId::new();
        let (centre, radius, source) = parse_explode(id, &["1", "64", "-3"]).unwrap();
        assert_eq!(centre, Location::new(id, 1.0, 64.0, -3.0));
        assert_eq!(radius, 3);
        assert_eq!(source, "TNT");

        let (_, radius, source) = parse_explode(id, &["0", "0", "0", "5", "creeper"]).unwrap();
        assert_eq!((radius, source.as_str()), (5, "CREEPER"));

        assert_eq!(parse_explode(id, &["0", "0"]), Err(EXPLODE_USAGE.to_string()));
        assert_eq!(
            parse_explode(id, &["a", "0", "0"]),
            Err("Invalid coordinate: a".to_string())
        );
        assert!(parse_explode(id, &["0", "0", "0", "99"]).is_err());
    }

    #[test]
    fn platform_has_decorations() {
        let mut world = World::new();
        let id = WorldId::new();
        world.add_world(id);
        build_platform(&mut world, id, 1).unwrap();
        assert_eq!(world.block_count(), 3 * 9 + 4);
        let torch = world.block(BlockPos::new(id, -1, 3, 0)).unwrap().unwrap();
        assert!(torch.passable);
    }
}
