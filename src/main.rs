// Entry point: parses arguments, installs logging and runs one pipeline stage.
use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use nadstim::artifact::AssignmentArtifact;
use nadstim::cli::{Args, Command};
use nadstim::config::AppConfig;
use nadstim::core::transitions::TransitionTable;
use nadstim::pipeline;

fn init_tracing(verbose: u8) {
    let default_level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();
}

fn run(args: Args) -> nadstim::Result<()> {
    let cfg = match &args.config {
        Some(path) => AppConfig::load_or_preset(path, args.preset)?,
        None => args.preset.config(),
    };
    cfg.validate()?;

    match args.command {
        Command::Sample { table, out, seed } => {
            let table = TransitionTable::load(&table)?;
            let seed = pipeline::resolve_seed(seed, cfg.seed);
            let (artifact, path) = pipeline::sample_to(&cfg, &table, &out, seed)?;
            info!(
                seed,
                rejected = artifact.rejected,
                path = %path.display(),
                "assignment ready"
            );
        }
        Command::Build {
            assignment,
            out,
            seed,
            allow_flagged,
        } => {
            let artifact = AssignmentArtifact::load(&assignment)?;
            pipeline::build(&cfg, &artifact, &out, seed, allow_flagged)?;
        }
        Command::Run {
            table,
            out,
            seed,
            allow_flagged,
        } => {
            let table = TransitionTable::load(&table)?;
            let seed = pipeline::resolve_seed(seed, cfg.seed);
            pipeline::run(&cfg, &table, &out, seed, allow_flagged)?;
        }
    }
    Ok(())
}

fn main() {
    let args = Args::parse();
    init_tracing(args.verbose);
    if let Err(err) = run(args) {
        error!("{err}");
        std::process::exit(1);
    }
}
