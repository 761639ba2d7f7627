use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "docfs",
    about = "docfs: a hierarchical filesystem over a document store",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Snapshot file holding the filesystem
    #[arg(long, global = true, default_value = "docfs.snap")]
    pub data: PathBuf,

    /// TOML configuration file
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

/// Targets are either absolute paths (`/docs/a.txt`) or element ids.
#[derive(Subcommand)]
pub enum Command {
    /// Create an empty filesystem, or open an existing one
    Init,
    /// Create a directory
    Mkdir(MkdirArgs),
    /// Upload a local file
    Put(PutArgs),
    /// Download a file
    Get(GetArgs),
    /// List a directory
    Ls(LsArgs),
    /// Move a file or directory
    Mv(MvArgs),
    /// Copy a file or directory
    Cp(CpArgs),
    /// Rename a file or directory
    Rename(RenameArgs),
    /// Remove a file or directory
    Rm(RmArgs),
    /// Restore a soft-deleted element
    Restore(RestoreArgs),
    /// Search beneath a directory
    Find(FindArgs),
    /// Set a custom metadata entry
    Tag(TagArgs),
    /// Remove a custom metadata entry
    Untag(UntagArgs),
    /// Reclaim removed content and drop dangling files
    Sweep,
    /// Show one element
    Info(InfoArgs),
}

#[derive(Args)]
pub struct MkdirArgs {
    /// Parent directory
    pub parent: String,
    pub name: String,
}

#[derive(Args)]
pub struct PutArgs {
    /// Local file to upload
    pub source: PathBuf,
    /// Destination directory
    #[arg(default_value = "/")]
    pub parent: String,
    /// Name to store under, defaults to the source file name
    #[arg(long)]
    pub name: Option<String>,
}

#[derive(Args)]
pub struct GetArgs {
    pub target: String,
    /// Write to this file instead of stdout
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

#[derive(Args)]
pub struct LsArgs {
    #[arg(default_value = "/")]
    pub target: String,
    #[arg(short, long)]
    pub recursive: bool,
}

#[derive(Args)]
pub struct MvArgs {
    pub target: String,
    pub destination: String,
}

#[derive(Args)]
pub struct CpArgs {
    pub target: String,
    pub destination: String,
}

#[derive(Args)]
pub struct RenameArgs {
    pub target: String,
    pub name: String,
}

#[derive(Args)]
pub struct RmArgs {
    pub target: String,
    /// Delete outright instead of moving to the bin
    #[arg(long)]
    pub permanent: bool,
}

#[derive(Args)]
pub struct RestoreArgs {
    /// Id of the removed element
    pub id: String,
}

#[derive(Args)]
pub struct FindArgs {
    #[arg(default_value = "/")]
    pub root: String,
    /// Exact name
    #[arg(long)]
    pub name: Option<String>,
    /// Name substring
    #[arg(long)]
    pub contains: Option<String>,
    /// Only removed elements
    #[arg(long)]
    pub removed: bool,
}

#[derive(Args)]
pub struct TagArgs {
    pub target: String,
    pub key: String,
    /// Parsed as bool, integer or float before falling back to text
    pub value: String,
}

#[derive(Args)]
pub struct UntagArgs {
    pub target: String,
    pub key: String,
}

#[derive(Args)]
pub struct InfoArgs {
    pub target: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_init_with_defaults() {
        let cli = Cli::try_parse_from(["docfs", "init"]).unwrap();
        assert!(matches!(cli.command, Command::Init));
        assert_eq!(cli.data, PathBuf::from("docfs.snap"));
        assert_eq!(cli.format, OutputFormat::Text);
        assert!(cli.config.is_none());
    }

    #[test]
    fn parse_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "docfs", "ls", "/docs", "--data", "/tmp/x.snap", "--format", "json", "-v",
        ])
        .unwrap();
        assert_eq!(cli.data, PathBuf::from("/tmp/x.snap"));
        assert_eq!(cli.format, OutputFormat::Json);
        assert!(cli.verbose);
        if let Command::Ls(args) = cli.command {
            assert_eq!(args.target, "/docs");
            assert!(!args.recursive);
        } else {
            panic!("wrong command");
        }
    }

    #[test]
    fn parse_put_defaults_to_root() {
        let cli = Cli::try_parse_from(["docfs", "put", "notes.txt"]).unwrap();
        if let Command::Put(args) = cli.command {
            assert_eq!(args.source, PathBuf::from("notes.txt"));
            assert_eq!(args.parent, "/");
            assert!(args.name.is_none());
        } else {
            panic!("wrong command");
        }
    }

    #[test]
    fn parse_rm_permanent() {
        let cli = Cli::try_parse_from(["docfs", "rm", "/a", "--permanent"]).unwrap();
        if let Command::Rm(args) = cli.command {
            assert!(args.permanent);
        } else {
            panic!("wrong command");
        }
    }

    #[test]
    fn parse_find_filters() {
        let cli =
            Cli::try_parse_from(["docfs", "find", "--contains", "rep", "--removed"]).unwrap();
        if let Command::Find(args) = cli.command {
            assert_eq!(args.root, "/");
            assert_eq!(args.contains, Some("rep".into()));
            assert!(args.name.is_none());
            assert!(args.removed);
        } else {
            panic!("wrong command");
        }
    }

    #[test]
    fn parse_tag_requires_value() {
        assert!(Cli::try_parse_from(["docfs", "tag", "/a", "stars"]).is_err());
        let cli = Cli::try_parse_from(["docfs", "tag", "/a", "stars", "3"]).unwrap();
        assert!(matches!(cli.command, Command::Tag(_)));
    }

    #[test]
    fn unknown_format_is_rejected() {
        assert!(Cli::try_parse_from(["docfs", "init", "--format", "xml"]).is_err());
    }
}
