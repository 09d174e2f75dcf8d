//! snapcache CLI - snapshot working trees and look up reusable command runs

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use serde::Deserialize;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use snapcache::ops::{history, snapshot_dir};
use snapcache::{
    refs, Cmd, CmdKind, Context, Engine, FsStore, Lookup, Matcher, RunInfo, SnapshotId,
};

#[derive(Parser)]
#[command(name = "snapcache")]
#[command(about = "command memoization over content-addressed filesystem snapshots")]
#[command(version)]
struct Cli {
    /// store path
    #[arg(short, long, env = "SNAPCACHE_STORE", default_value = ".snapcache")]
    store: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// initialize a new store
    Init,

    /// record a working directory as a snapshot
    Snapshot {
        /// directory to snapshot
        dir: PathBuf,

        /// ref to build on and advance
        #[arg(short = 'r', long = "ref")]
        ref_name: Option<String>,

        /// tag recorded on each recipe
        #[arg(short, long, default_value = "snapshot")]
        tag: String,
    },

    /// show the edit history of a snapshot
    Log {
        /// ref, snapshot id or "empty"
        rev: String,

        /// maximum number of entries to show
        #[arg(short = 'n', long)]
        max_count: Option<usize>,
    },

    /// print the key of a command
    Hash {
        /// command description (toml)
        cmd: PathBuf,
    },

    /// record a successful run of a command
    Record {
        /// command description (toml)
        cmd: PathBuf,

        /// opaque run id
        id: String,

        /// paths the run observed (preserve and plugin commands)
        #[arg(short, long = "pattern")]
        patterns: Vec<String>,
    },

    /// look for a reusable run of a command
    Lookup {
        /// command description (toml)
        cmd: PathBuf,
    },

    /// test a path against patterns
    Match {
        path: String,

        #[arg(required = true)]
        patterns: Vec<String>,
    },

    /// list refs
    Refs,
}

/// on-disk command description; `dir` is a rev
#[derive(Deserialize)]
struct CmdFile {
    dir: String,
    argv: Vec<String>,
    #[serde(default)]
    kind: CmdKind,
    #[serde(default)]
    snapshot_fs: Option<Matcher>,
    #[serde(default)]
    deps_file: String,
    #[serde(default)]
    env: BTreeMap<String, String>,
    #[serde(default)]
    owner: String,
    #[serde(default)]
    container_name: String,
    #[serde(default)]
    network: bool,
    #[serde(default)]
    artifacts: Vec<String>,
}

impl CmdFile {
    fn load(path: &Path) -> snapcache::Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| snapcache::Error::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        Ok(toml::from_str(&content)?)
    }

    fn resolve(self, store: &FsStore) -> snapcache::Result<Cmd> {
        Ok(Cmd {
            dir: refs::resolve(store, &self.dir)?,
            argv: self.argv,
            snapshot_fs: self.snapshot_fs,
            kind: self.kind,
            deps_file: self.deps_file,
            env: self.env,
            owner: self.owner,
            container_name: self.container_name,
            network: self.network,
            artifacts: self.artifacts,
        })
    }
}

fn main() -> ExitCode {
    let filter = EnvFilter::try_from_env("SNAPCACHE_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    let cli = Cli::parse();

    match run(cli) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> snapcache::Result<ExitCode> {
    let ctx = Context::background();

    match cli.command {
        Commands::Init => {
            FsStore::init(&cli.store)?;
            println!("initialized snapcache store at {}", cli.store.display());
        }

        Commands::Snapshot { dir, ref_name, tag } => {
            let store = FsStore::open(&cli.store)?;
            let _lock = store.lock()?;

            let parent = match &ref_name {
                Some(name) => match refs::read_ref(&store, name) {
                    Ok(id) => id,
                    Err(snapcache::Error::RefNotFound(_)) => SnapshotId::EMPTY,
                    Err(e) => return Err(e),
                },
                None => SnapshotId::EMPTY,
            };

            let ignore = store.config().ignore_matcher()?;
            let id = snapshot_dir(&ctx, &store, &dir, parent, &tag, &ignore)?;
            if let Some(name) = &ref_name {
                refs::write_ref(&store, name, &id)?;
            }
            println!("{}", id);
        }

        Commands::Log { rev, max_count } => {
            let store = FsStore::open(&cli.store)?;
            let id = refs::resolve(&store, &rev)?;
            for entry in history(&ctx, &store, id, max_count)? {
                println!("{}", entry);
            }
        }

        Commands::Hash { cmd } => {
            let store = FsStore::open(&cli.store)?;
            let cmd = CmdFile::load(&cmd)?.resolve(&store)?;
            let engine = Engine::new(&store, &store);
            println!("{}", engine.hash(&ctx, &cmd)?);
        }

        Commands::Record { cmd, id, patterns } => {
            let store = FsStore::open(&cli.store)?;
            let _lock = store.lock()?;
            let cmd = CmdFile::load(&cmd)?.resolve(&store)?;

            let mut info = RunInfo::new(id);
            if !patterns.is_empty() {
                info = info.with_matcher(Matcher::from_patterns(&patterns)?);
            }
            let key = store.record_run(&cmd, info)?;
            println!("{}", key);
        }

        Commands::Lookup { cmd } => {
            let store = FsStore::open(&cli.store)?;
            let cmd = CmdFile::load(&cmd)?.resolve(&store)?;
            let engine = Engine::new(&store, &store).with_max_depth(store.config().max_depth);

            match engine.get_associated_id(&ctx, &cmd)? {
                Lookup::Reuse(id) => println!("reuse {}", id),
                lookup @ Lookup::Blocked(_) => {
                    println!("blocked by:");
                    for path in lookup.blocker_paths() {
                        println!("  {}", path);
                    }
                    return Ok(ExitCode::from(1));
                }
                Lookup::Miss => {
                    println!("miss");
                    return Ok(ExitCode::from(1));
                }
            }
        }

        Commands::Match { path, patterns } => {
            let matcher = Matcher::from_patterns(&patterns)?;
            if matcher.matches(&path) {
                println!("match");
            } else {
                println!("no match");
                return Ok(ExitCode::from(1));
            }
        }

        Commands::Refs => {
            let store = FsStore::open(&cli.store)?;
            for name in refs::list_refs(&store)? {
                let id = refs::read_ref(&store, &name)?;
                println!("{} {}", id, name);
            }
        }
    }

    Ok(ExitCode::SUCCESS)
}
