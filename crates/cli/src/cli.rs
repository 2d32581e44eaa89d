use std::path::PathBuf;

use clap::{ArgAction, Parser, Subcommand};

/// Build, check and inspect tenet rule bundles.
#[derive(Parser, Debug)]
#[command(name = "tenet", about = "Build, check and inspect tenet rule bundles")]
pub struct CliArgs {
    /// Raise log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Config profile; keys are looked up as {PROFILE}_{KEY} first
    #[arg(long, env = "TENET_PROFILE", global = true)]
    pub profile: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Work with rule bundles
    #[command(subcommand)]
    Bundle(BundleCommand),
}

#[derive(Subcommand, Debug)]
pub enum BundleCommand {
    /// Package a directory of rules and data as a .tar.gz bundle
    Create {
        /// Directory holding rule modules and data documents
        dir: PathBuf,

        /// Output archive path
        #[arg(short, long)]
        output: PathBuf,

        /// Revision recorded in the manifest, e.g. a commit hash
        #[arg(long)]
        revision: Option<String>,

        /// Version control system type recorded in the manifest
        #[arg(long)]
        vcs_type: Option<String>,

        /// Repository URI recorded in the manifest
        #[arg(long)]
        vcs_uri: Option<String>,
    },

    /// Check bundles (directories or archives); fails if any target fails
    Validate {
        #[arg(required = true)]
        targets: Vec<PathBuf>,
    },

    /// Print a JSON summary of a bundle
    Show {
        target: PathBuf,
    },
}

impl CliArgs {
    /// Filter implied by `-v` flags, if any.
    pub fn verbosity_filter(&self) -> Option<&'static str> {
        match self.verbose {
            0 => None,
            1 => Some("debug"),
            _ => Some("trace"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_bundle_create() {
        let args = CliArgs::parse_from([
            "tenet", "-v", "bundle", "create", "rules", "-o", "out.tar.gz", "--revision", "abc",
        ]);
        assert_eq!(args.verbosity_filter(), Some("debug"));
        match args.command {
            Command::Bundle(BundleCommand::Create {
                dir,
                output,
                revision,
                vcs_type,
                ..
            }) => {
                assert_eq!(dir, PathBuf::from("rules"));
                assert_eq!(output, PathBuf::from("out.tar.gz"));
                assert_eq!(revision.as_deref(), Some("abc"));
                assert!(vcs_type.is_none());
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn validate_requires_a_target() {
        assert!(CliArgs::try_parse_from(["tenet", "bundle", "validate"]).is_err());
        let args = CliArgs::try_parse_from(["tenet", "-vv", "bundle", "validate", "a", "b"]).unwrap();
        assert_eq!(args.verbosity_filter(), Some("trace"));
    }
}
