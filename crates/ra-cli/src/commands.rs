use std::path::PathBuf;

use anyhow::{anyhow, bail, Context};
use colored::Colorize;
use ra_connection::{ClientConfig, Connection, ConnectionTarget, SearchOptions};
use ra_protocol::{Credentials, DEFAULT_PORT};
use ra_server::{RaServer, ServerConfig};
use ra_transfer::{
    expand_all, hyper_paste, ordered_children, paste_object, Endpoints, TransferContext,
};
use ra_types::{ExtensionKind, Guid};
use serde::Serialize;
use tracing::debug;

use crate::cli::*;

/// Connection flags shared by every store command.
struct Target {
    remote: Option<String>,
    user: Option<String>,
    password: Option<String>,
    root: Option<PathBuf>,
    config: Option<PathBuf>,
}

pub fn run_command(cli: Cli) -> anyhow::Result<()> {
    let Cli {
        command,
        format,
        remote,
        user,
        password,
        root,
        config,
        ..
    } = cli;
    let target = Target {
        remote,
        user,
        password,
        root,
        config,
    };
    if let Command::Serve(args) = command {
        return cmd_serve(&target, args);
    }

    let mut conn = target.client_config()?.connect()?;
    let conn = conn.as_mut();
    match command {
        Command::Serve(_) => bail!("serve does not run against a store connection"),
        Command::Ls(args) => {
            let path = resolve(conn, args.path.as_deref())?;
            let files = conn.get_file_list(&path)?;
            emit(&format, &files, |files| {
                for f in files {
                    println!("{f}");
                }
            })
        }
        Command::Ext(args) => {
            let path = resolve(conn, args.path.as_deref())?;
            let exts = ordered_children(conn, &path)?;
            emit(&format, &exts, |exts| {
                for e in exts {
                    println!("{} {}", kind_label(e.kind), e.name);
                }
            })
        }
        Command::Order(args) => cmd_order(conn, &format, args),
        Command::Get(args) => {
            let path = resolve_file(conn, &args.path)?;
            if !conn.get_file(&path, &args.local, !args.binary)? {
                bail!("cannot fetch {path}");
            }
            println!("{} {} -> {}", "✓".green().bold(), path, args.local.display());
            Ok(())
        }
        Command::Put(args) => {
            let path = resolve_file(conn, &args.path)?;
            if !conn.put_file(&args.local, &path, !args.binary)? {
                bail!("cannot store {}", args.local.display());
            }
            println!("{} {} -> {}", "✓".green().bold(), args.local.display(), path);
            Ok(())
        }
        Command::Mkext(args) => {
            let parent = resolve(conn, Some(&args.parent))?;
            let child = conn
                .make_ext(&parent, &args.name)?
                .ok_or_else(|| anyhow!("cannot create {} under {parent}", args.name))?;
            println!("{} Created {}", "✓".green().bold(), child.bold());
            Ok(())
        }
        Command::Rm(args) => {
            let done = if args.recursive {
                let path = resolve(conn, Some(&args.path))?;
                conn.del_tree(&path)?
            } else {
                let path = resolve_file(conn, &args.path)?;
                conn.delete_file(&path)?
            };
            if !done {
                bail!("cannot delete {}", args.path);
            }
            println!("{} Deleted {}", "✓".green().bold(), args.path);
            Ok(())
        }
        Command::Rename(args) => {
            let mut path = resolve(conn, Some(&args.path))?;
            if !conn.rename_obj(&mut path, &args.new_name)? {
                bail!("cannot rename {path} to {}", args.new_name);
            }
            println!("{} Renamed to {}", "✓".green().bold(), path.bold());
            Ok(())
        }
        Command::Paste(args) => cmd_paste(conn, &target, args),
        Command::Hyper(args) => {
            let src = resolve(conn, Some(&args.src))?;
            let dst = resolve(conn, Some(&args.dst_parent))?;
            let alias = hyper_paste(Endpoints::Same(conn), &src, &dst, &progress())?
                .ok_or_else(|| anyhow!("cannot create a hyperobject for {src} under {dst}"))?;
            println!("{} Hyperobject {}", "✓".green().bold(), alias.bold());
            Ok(())
        }
        Command::Uuid(args) => {
            let path = resolve(conn, args.path.as_deref())?;
            let guid = conn
                .get_uuid(&path)?
                .ok_or_else(|| anyhow!("{path} is not an object"))?;
            emit(&format, &guid, |guid| println!("{}", guid.to_string().cyan()))
        }
        Command::Lookup(args) => {
            let guid = Guid::parse(&args.guid)?;
            let path = conn
                .lookup_path(&guid)
                .ok_or_else(|| anyhow!("{guid} is not registered"))?;
            emit(&format, &path, |path| println!("{path}"))
        }
        Command::Find(args) => {
            let start = resolve(conn, args.start.as_deref())?;
            let options = SearchOptions {
                case_sensitive: args.case_sensitive,
                whole_name: args.whole,
            };
            let hits = conn.find_all(&start, &args.pattern, options)?;
            emit(&format, &hits, |hits| {
                if hits.is_empty() {
                    println!("No matches.");
                }
                for h in hits {
                    println!("{h}");
                }
            })
        }
        Command::Reconcile(args) => {
            let path = resolve(conn, args.path.as_deref())?;
            if !conn.reconcile_guids(&path)? {
                bail!("cannot reconcile {path}");
            }
            println!("{} Identities reconciled below {}", "✓".green().bold(), path);
            Ok(())
        }
        Command::FixOofs => {
            conn.fix_oofs()?;
            println!("{} Registry rebuilt", "✓".green().bold());
            Ok(())
        }
        Command::Tree(args) => {
            let path = resolve(conn, args.path.as_deref())?;
            let nodes = expand_all(conn, &path, &progress())?;
            emit(&format, &nodes, |nodes| {
                println!("{}", path.bold());
                for n in nodes {
                    let indent = "  ".repeat(n.depth);
                    let guid = n.guid.map(|g| g.to_string()).unwrap_or_default();
                    println!("{indent}{} {} {}", kind_label(n.kind), n.name, guid.dimmed());
                }
            })
        }
    }
}

impl Target {
    fn client_config(&self) -> anyhow::Result<ClientConfig> {
        if self.remote.is_some() && self.root.is_some() {
            bail!("--remote and --root cannot be combined");
        }
        let mut config = match &self.config {
            Some(path) => ClientConfig::load(path)?,
            None => ClientConfig::default(),
        };
        if let Some(root) = &self.root {
            config.target = ConnectionTarget::Local { root: root.clone() };
        }
        if let Some(remote) = &self.remote {
            let (host, port) = parse_remote(remote)?;
            let credentials = match &config.target {
                ConnectionTarget::Remote { user, password, .. } => {
                    Credentials::new(user.clone(), password.clone())
                }
                ConnectionTarget::Local { .. } => Credentials::anonymous(),
            };
            config.target = ConnectionTarget::Remote {
                host,
                port,
                user: credentials.user,
                password: credentials.password,
            };
        }
        if let ConnectionTarget::Remote { user, password, .. } = &mut config.target {
            if let Some(u) = &self.user {
                *user = u.clone();
            }
            if let Some(p) = &self.password {
                *password = p.clone();
            }
        }
        Ok(config)
    }

    fn server_config(&self, args: &ServeArgs) -> anyhow::Result<ServerConfig> {
        let mut config = match &self.config {
            Some(path) => ServerConfig::load(path)?,
            None => ServerConfig::default(),
        };
        if let Some(root) = &self.root {
            config.store_root = root.clone();
        }
        if let Some(bind) = args.bind {
            config.bind_addr = bind;
        }
        if args.anonymous {
            config.allow_anonymous = true;
        }
        if let Some(user) = &self.user {
            let password = self.password.clone().unwrap_or_default();
            config.users.insert(user.clone(), password);
        }
        Ok(config)
    }
}

fn cmd_serve(target: &Target, args: ServeArgs) -> anyhow::Result<()> {
    let config = target.server_config(&args)?;
    let server = RaServer::bind(config)?;
    println!(
        "RA server on {} (store: {})",
        server.local_addr()?.to_string().bold(),
        server.config().store_root.display()
    );
    server.serve()?;
    Ok(())
}

fn cmd_order(
    conn: &mut dyn Connection,
    format: &OutputFormat,
    args: OrderArgs,
) -> anyhow::Result<()> {
    let path = resolve(conn, args.path.as_deref())?;
    if !args.set.is_empty() {
        if !conn.write_ordering(&path, &args.set)? {
            bail!("cannot write the order of {path}");
        }
        println!("{} Order of {} updated", "✓".green().bold(), path);
        return Ok(());
    }
    let order = conn.get_ordering(&path)?;
    emit(format, &order, |order| {
        for (i, name) in order.iter().enumerate() {
            println!("{:>3}. {name}", i + 1);
        }
    })
}

fn cmd_paste(conn: &mut dyn Connection, target: &Target, args: PasteArgs) -> anyhow::Result<()> {
    let source = match (&args.from_root, &args.from_remote) {
        (Some(root), _) => Some(Target {
            remote: None,
            root: Some(root.clone()),
            user: None,
            password: None,
            config: None,
        }),
        (None, Some(remote)) => Some(Target {
            remote: Some(remote.clone()),
            root: None,
            user: target.user.clone(),
            password: target.password.clone(),
            config: None,
        }),
        (None, None) => None,
    };
    let dst = resolve(conn, Some(&args.dst_parent))?;
    let ctx = progress();
    let pasted = match source {
        Some(source) => {
            let mut src_conn = source
                .client_config()?
                .connect()
                .context("cannot open the paste source")?;
            let src = resolve(src_conn.as_mut(), Some(&args.src))?;
            let endpoints = Endpoints::Pair {
                src: src_conn.as_mut(),
                dst: conn,
            };
            paste_object(endpoints, &src, &dst, !args.shallow, &ctx)?
        }
        None => {
            let src = resolve(conn, Some(&args.src))?;
            paste_object(Endpoints::Same(conn), &src, &dst, !args.shallow, &ctx)?
        }
    };
    let pasted = pasted.ok_or_else(|| anyhow!("cannot paste {} into {dst}", args.src))?;
    println!("{} Pasted {}", "✓".green().bold(), pasted.bold());
    Ok(())
}

fn progress() -> TransferContext {
    TransferContext::new().with_progress(|path: &str| debug!(path, "visiting"))
}

fn emit<T: Serialize>(
    format: &OutputFormat,
    value: &T,
    text: impl FnOnce(&T),
) -> anyhow::Result<()> {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(value)?),
        OutputFormat::Text => text(value),
    }
    Ok(())
}

fn kind_label(kind: ExtensionKind) -> colored::ColoredString {
    match kind {
        ExtensionKind::Object => "obj ".blue().bold(),
        ExtensionKind::Hyperobject => "hyp ".cyan(),
        ExtensionKind::Link => "lnk ".yellow(),
        ExtensionKind::BrokenLink => "lnk!".red(),
    }
}

/// Split `HOST[:PORT]`.
fn parse_remote(addr: &str) -> anyhow::Result<(String, u16)> {
    match addr.rsplit_once(':') {
        Some((host, port)) => {
            let port = port
                .parse()
                .with_context(|| format!("bad port in {addr:?}"))?;
            Ok((host.to_string(), port))
        }
        None => Ok((addr.to_string(), DEFAULT_PORT)),
    }
}

/// Turn a command-line object argument into a store path.
///
/// A full store path is taken as is. Anything else is a `/`-separated
/// chain of object names below the root.
fn resolve(conn: &dyn Connection, arg: Option<&str>) -> anyhow::Result<String> {
    let root = conn.root().to_string();
    let arg = match arg {
        None | Some("") | Some(".") => return Ok(root),
        Some(arg) => arg,
    };
    if conn.is_valid_path(arg) {
        return Ok(arg.to_string());
    }
    let mut path = root;
    for name in arg.split('/').filter(|n| !n.is_empty()) {
        ra_types::validate_object_name(name)?;
        path = conn.rules().child(&path, name);
    }
    Ok(path)
}

/// Like [`resolve`], but the last component names a file of the object
/// before it.
fn resolve_file(conn: &dyn Connection, arg: &str) -> anyhow::Result<String> {
    if conn.is_valid_path(arg) {
        return Ok(arg.to_string());
    }
    let (object, file) = match arg.rsplit_once('/') {
        Some((object, file)) => (Some(object), file),
        None => (None, arg),
    };
    if file.is_empty() {
        bail!("{arg:?} does not name a file");
    }
    let object = resolve(conn, object)?;
    Ok(conn.rules().join(&object, file))
}
