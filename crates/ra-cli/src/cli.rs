use std::net::SocketAddr;
use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "ra",
    about = "RA -- browse and edit object stores, locally or through a server",
    version,
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,

    /// Talk to a server at HOST[:PORT]
    #[arg(long, global = true, value_name = "HOST[:PORT]")]
    pub remote: Option<String>,

    #[arg(long, global = true)]
    pub user: Option<String>,

    #[arg(long, global = true)]
    pub password: Option<String>,

    /// Local store root (the store served by `serve`)
    #[arg(long, global = true)]
    pub root: Option<PathBuf>,

    /// TOML configuration: client settings, or server settings for `serve`
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,
}

#[derive(Clone, Debug, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
pub enum Command {
    /// Serve a store over the RA protocol
    Serve(ServeArgs),
    /// List the files of an object
    Ls(ObjectArg),
    /// List the extensions of an object in display order
    Ext(ObjectArg),
    /// Show or rewrite the display order of an object's extensions
    Order(OrderArgs),
    /// Download a file
    Get(GetArgs),
    /// Upload a file
    Put(PutArgs),
    /// Create an extension
    Mkext(MkextArgs),
    /// Delete a file, or an object with --recursive
    Rm(RmArgs),
    /// Rename an object
    Rename(RenameArgs),
    /// Copy an object below another
    Paste(PasteArgs),
    /// Create a hyperobject aliasing an object
    Hyper(HyperArgs),
    /// Show an object's GUID, assigning one if needed
    Uuid(ObjectArg),
    /// Find where the registry places a GUID
    Lookup(LookupArgs),
    /// Search object names
    Find(FindArgs),
    /// Repair duplicated or unregistered GUIDs below an object
    Reconcile(ObjectArg),
    /// Rebuild the GUID registry from the whole store
    FixOofs,
    /// Print the object tree in display order
    Tree(ObjectArg),
}

#[derive(Args)]
pub struct ServeArgs {
    #[arg(long)]
    pub bind: Option<SocketAddr>,
    /// Accept the anonymous user
    #[arg(long)]
    pub anonymous: bool,
}

/// Object paths are either full store paths or `/`-separated object names
/// relative to the root; omitted means the root.
#[derive(Args)]
pub struct ObjectArg {
    pub path: Option<String>,
}

#[derive(Args)]
pub struct OrderArgs {
    pub path: Option<String>,
    /// New order, first to last
    #[arg(long, num_args = 1..)]
    pub set: Vec<String>,
}

#[derive(Args)]
pub struct GetArgs {
    pub path: String,
    pub local: PathBuf,
    /// Skip line-ending conversion
    #[arg(long)]
    pub binary: bool,
}

#[derive(Args)]
pub struct PutArgs {
    pub local: PathBuf,
    pub path: String,
    #[arg(long)]
    pub binary: bool,
}

#[derive(Args)]
pub struct MkextArgs {
    pub parent: String,
    pub name: String,
}

#[derive(Args)]
pub struct RmArgs {
    pub path: String,
    #[arg(short, long)]
    pub recursive: bool,
}

#[derive(Args)]
pub struct RenameArgs {
    pub path: String,
    pub new_name: String,
}

#[derive(Args)]
pub struct PasteArgs {
    pub src: String,
    pub dst_parent: String,
    /// Copy the object without its extensions
    #[arg(long)]
    pub shallow: bool,
    /// Take the source from this local store
    #[arg(long, conflicts_with = "from_remote")]
    pub from_root: Option<PathBuf>,
    /// Take the source from this server
    #[arg(long, value_name = "HOST[:PORT]")]
    pub from_remote: Option<String>,
}

#[derive(Args)]
pub struct HyperArgs {
    pub src: String,
    pub dst_parent: String,
}

#[derive(Args)]
pub struct LookupArgs {
    pub guid: String,
}

#[derive(Args)]
pub struct FindArgs {
    pub pattern: String,
    #[arg(long)]
    pub start: Option<String>,
    #[arg(short, long)]
    pub case_sensitive: bool,
    /// Match whole names only
    #[arg(short, long)]
    pub whole: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_serve() {
        let cli = Cli::try_parse_from([
            "ra", "serve", "--bind", "0.0.0.0:4401", "--root", "/srv/plants", "--anonymous",
        ])
        .unwrap();
        assert_eq!(cli.root, Some(PathBuf::from("/srv/plants")));
        if let Command::Serve(args) = cli.command {
            assert_eq!(args.bind, Some("0.0.0.0:4401".parse().unwrap()));
            assert!(args.anonymous);
        } else { panic!("wrong command"); }
    }

    #[test]
    fn parse_remote_ls() {
        let cli = Cli::try_parse_from([
            "ra", "ls", "plant/leaf", "--remote", "lab:5000", "--user", "grower",
        ])
        .unwrap();
        assert_eq!(cli.remote.as_deref(), Some("lab:5000"));
        assert_eq!(cli.user.as_deref(), Some("grower"));
        if let Command::Ls(args) = cli.command {
            assert_eq!(args.path.as_deref(), Some("plant/leaf"));
        } else { panic!("wrong command"); }
    }

    #[test]
    fn parse_order_set() {
        let cli = Cli::try_parse_from(["ra", "order", "plant", "--set", "b", "a"]).unwrap();
        if let Command::Order(args) = cli.command {
            assert_eq!(args.set, vec!["b", "a"]);
        } else { panic!("wrong command"); }
    }

    #[test]
    fn parse_paste_sources_conflict() {
        assert!(Cli::try_parse_from([
            "ra", "paste", "a", "b", "--from-root", "/x", "--from-remote", "lab",
        ])
        .is_err());
        let cli = Cli::try_parse_from(["ra", "paste", "a", "b", "--shallow"]).unwrap();
        if let Command::Paste(args) = cli.command {
            assert!(args.shallow);
            assert!(args.from_root.is_none());
        } else { panic!("wrong command"); }
    }

    #[test]
    fn parse_find_flags() {
        let cli = Cli::try_parse_from(["ra", "find", "leaf", "-c", "-w"]).unwrap();
        if let Command::Find(args) = cli.command {
            assert!(args.case_sensitive);
            assert!(args.whole);
            assert_eq!(args.start, None);
        } else { panic!("wrong command"); }
    }

    #[test]
    fn parse_fix_oofs() {
        let cli = Cli::try_parse_from(["ra", "fix-oofs"]).unwrap();
        assert!(matches!(cli.command, Command::FixOofs));
    }

    #[test]
    fn parse_json_format() {
        let cli = Cli::try_parse_from(["ra", "--format", "json", "tree"]).unwrap();
        assert!(matches!(cli.format, OutputFormat::Json));
    }
}
