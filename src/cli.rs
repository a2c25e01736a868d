use std::path::PathBuf;

use clap::{ArgAction, Parser, Subcommand};

use crate::config::Preset;

#[derive(Parser, Debug, Clone)]
#[command(author, version, about)]
pub struct Args {
    /// Path to config TOML (a template is written there when missing)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Experiment preset used without a config file, and as the template for a new one
    #[arg(long, value_enum, default_value_t = Preset::Exp1, global = true)]
    pub preset: Preset,

    /// Raise log verbosity (-v debug, -vv trace); RUST_LOG takes precedence
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Sample per-subject pairs and save the assignment
    Sample {
        /// Transition table CSV with Pos1, Pos2 and time columns
        #[arg(long)]
        table: PathBuf,

        /// Output directory
        #[arg(long, default_value = "out")]
        out: PathBuf,

        /// RNG seed (overrides config)
        #[arg(long)]
        seed: Option<u64>,
    },

    /// Generate trial files from a saved assignment
    Build {
        /// Assignment JSON written by `sample`
        #[arg(long)]
        assignment: PathBuf,

        /// Output directory
        #[arg(long, default_value = "out")]
        out: PathBuf,

        /// RNG seed for trial generation (defaults to the assignment's seed)
        #[arg(long)]
        seed: Option<u64>,

        /// Build even if some pair exceeds the reuse ceiling
        #[arg(long, default_value_t = false)]
        allow_flagged: bool,
    },

    /// Sample, save the assignment, then build trial files
    Run {
        /// Transition table CSV with Pos1, Pos2 and time columns
        #[arg(long)]
        table: PathBuf,

        /// Output directory
        #[arg(long, default_value = "out")]
        out: PathBuf,

        /// RNG seed (overrides config)
        #[arg(long)]
        seed: Option<u64>,

        /// Build even if some pair exceeds the reuse ceiling
        #[arg(long, default_value_t = false)]
        allow_flagged: bool,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_build_with_global_flags_after_subcommand() {
        let args = Args::try_parse_from([
            "nadstim",
            "build",
            "--assignment",
            "out/assignment.json",
            "--preset",
            "exp2",
            "-vv",
            "--allow-flagged",
        ])
        .expect("parse");
        assert_eq!(args.preset, Preset::Exp2);
        assert_eq!(args.verbose, 2);
        match args.command {
            Command::Build {
                assignment,
                out,
                seed,
                allow_flagged,
            } => {
                assert_eq!(assignment, PathBuf::from("out/assignment.json"));
                assert_eq!(out, PathBuf::from("out"));
                assert_eq!(seed, None);
                assert!(allow_flagged);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn sample_requires_a_table() {
        assert!(Args::try_parse_from(["nadstim", "sample"]).is_err());
    }
}
