//! Command-line arguments.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Tether - peer connectivity for synchronized folders
#[derive(Parser, Debug)]
#[command(name = "tether")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Increase verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    pub log_json: bool,

    /// Configuration file (YAML)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Repository folder
    #[arg(short, long, global = true, default_value = ".")]
    pub repo: PathBuf,

    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Initialize a repository in the repository folder
    Init {
        /// Account name of this node
        name: String,
        /// Address advertised to peers
        #[arg(long, default_value = "127.0.0.1:7340")]
        addr: String,
    },

    /// Show this node's identity
    Whoami,

    /// Manage trusted remotes
    Remote {
        #[command(subcommand)]
        command: RemoteCommands,
    },

    /// Go online and answer trusted peers until interrupted
    Serve,

    /// Ask a trusted remote for its store version
    Query {
        /// Remote name or hex peer id
        peer: String,
        /// Number of queries to send
        #[arg(short = 'n', long, default_value_t = 1)]
        count: u32,
    },
}

/// Remote registry commands.
#[derive(Subcommand, Debug)]
pub enum RemoteCommands {
    /// Trust a peer
    Add {
        /// Hex peer id
        id: String,
        /// Account name of the peer
        name: String,
        /// Address of the peer
        addr: String,
        /// Local nickname
        #[arg(long)]
        display_name: Option<String>,
    },

    /// Stop trusting a peer
    #[command(alias = "remove")]
    Rm {
        /// Remote name or hex peer id
        peer: String,
    },

    /// List trusted peers
    #[command(alias = "ls")]
    List,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["tether", "query", "bob", "-n", "3", "-vv", "--repo", "/tmp/a"])
            .unwrap();
        assert_eq!(cli.verbose, 2);
        assert_eq!(cli.repo, PathBuf::from("/tmp/a"));
        match cli.command {
            Commands::Query { peer, count } => {
                assert_eq!(peer, "bob");
                assert_eq!(count, 3);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn remote_add_takes_optional_display_name() {
        let cli = Cli::try_parse_from([
            "tether", "remote", "add", "ab", "bob", "10.0.0.2:7340", "--display-name", "Bob",
        ])
        .unwrap();
        match cli.command {
            Commands::Remote {
                command: RemoteCommands::Add { display_name, .. },
            } => assert_eq!(display_name.as_deref(), Some("Bob")),
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn remote_requires_subcommand() {
        assert!(Cli::try_parse_from(["tether", "remote"]).is_err());
    }
}
