use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use nix::fcntl::{Flock, FlockArg};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, trace};

use crate::cmd::{Cmd, Key, RunInfo};
use crate::config::Config;
use crate::context::Context;
use crate::error::{Error, IoResultExt, Result};
use crate::hash::SnapshotId;
use crate::store::{reaches, RecipePath, RecipeStore, RecipeWriter, RunStore};
use crate::types::{Op, Recipe};

/// a directory-backed recipe and run store
///
/// layout:
///   config.toml
///   recipes/<2 hex>/<62 hex>/<record hash>   one file per recipe of a snapshot
///   runs/<key>                               last run of a command
///   refs/<name>                              named snapshot pointers
///   tmp/                                     staging for atomic writes
///
/// records are CBOR, zstd compressed. a recipe record is named by the
/// SHA-256 of its CBOR bytes, so identical recipes coalesce.
#[derive(Debug)]
pub struct FsStore {
    path: PathBuf,
    config: Config,
}

impl FsStore {
    /// initialize a new store at the given path
    pub fn init(path: &Path) -> Result<Self> {
        Self::init_with_config(path, Config::default())
    }

    pub fn init_with_config(path: &Path, config: Config) -> Result<Self> {
        let config_path = path.join("config.toml");
        if config_path.exists() {
            return Err(Error::StoreExists(path.to_path_buf()));
        }

        fs::create_dir_all(path.join("recipes")).with_path(path)?;
        fs::create_dir_all(path.join("runs")).with_path(path)?;
        fs::create_dir_all(path.join("refs")).with_path(path)?;
        fs::create_dir_all(path.join("tmp")).with_path(path)?;

        config.save(&config_path)?;
        debug!(path = %path.display(), "initialized store");

        Ok(Self {
            path: path.to_path_buf(),
            config,
        })
    }

    /// open an existing store
    pub fn open(path: &Path) -> Result<Self> {
        let config_path = path.join("config.toml");
        if !config_path.exists() {
            return Err(Error::NoStore(path.to_path_buf()));
        }

        let config = Config::load(&config_path)?;

        Ok(Self {
            path: path.to_path_buf(),
            config,
        })
    }

    /// store root path
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn config_mut(&mut self) -> &mut Config {
        &mut self.config
    }

    pub fn save_config(&self) -> Result<()> {
        self.config.save(&self.config_path())
    }

    pub fn config_path(&self) -> PathBuf {
        self.path.join("config.toml")
    }

    pub fn recipes_path(&self) -> PathBuf {
        self.path.join("recipes")
    }

    pub fn runs_path(&self) -> PathBuf {
        self.path.join("runs")
    }

    pub fn refs_path(&self) -> PathBuf {
        self.path.join("refs")
    }

    /// path to tmp directory (for atomic writes)
    pub fn tmp_path(&self) -> PathBuf {
        self.path.join("tmp")
    }

    pub fn lock_path(&self) -> PathBuf {
        self.path.join(".lock")
    }

    /// directory holding the recipes of one snapshot
    fn snapshot_dir(&self, id: &SnapshotId) -> PathBuf {
        let (dir, rest) = id.to_path_components();
        self.recipes_path().join(dir).join(rest)
    }

    fn run_path(&self, key: &Key) -> PathBuf {
        self.runs_path().join(key.as_str())
    }

    /// acquire exclusive lock on the store
    /// returns a guard that releases the lock on drop
    pub fn lock(&self) -> Result<StoreLock> {
        let lock_path = self.lock_path();
        let file = File::create(&lock_path).with_path(&lock_path)?;

        let flock = Flock::lock(file, FlockArg::LockExclusiveNonblock)
            .map_err(|_| Error::LockContention)?;

        Ok(StoreLock { _flock: flock })
    }

    /// try to acquire exclusive lock, returning None if already locked
    pub fn try_lock(&self) -> Result<Option<StoreLock>> {
        let lock_path = self.lock_path();
        let file = File::create(&lock_path).with_path(&lock_path)?;

        match Flock::lock(file, FlockArg::LockExclusiveNonblock) {
            Ok(flock) => Ok(Some(StoreLock { _flock: flock })),
            Err((_, nix::errno::Errno::EWOULDBLOCK)) => Ok(None),
            Err(_) => Err(Error::LockContention),
        }
    }

    /// record that `recipe` produces `output`
    pub fn put_recipe(&self, output: SnapshotId, recipe: Recipe) -> Result<()> {
        if output.is_empty() {
            return Err(Error::Store("the empty snapshot has no recipe".to_string()));
        }

        let would_cycle = reaches(&recipe.inputs, &output, |id| {
            Ok(self
                .read_recipes(id)?
                .into_iter()
                .flat_map(|r| r.inputs)
                .collect())
        })?;
        if would_cycle {
            return Err(Error::Cycle(output.to_hex()));
        }

        self.put_unchecked(output, &recipe)
    }

    /// write a recipe record without walking ancestors
    ///
    /// `output` must be the recipe's own content address.
    fn put_unchecked(&self, output: SnapshotId, recipe: &Recipe) -> Result<()> {
        let cbor = recipe.to_cbor()?;
        let name = SnapshotId::digest(&cbor).to_hex();
        let dir = self.snapshot_dir(&output);
        let record = dir.join(name);

        // dedup: identical recipe already recorded
        if record.exists() {
            return Ok(());
        }

        fs::create_dir_all(&dir).with_path(&dir)?;
        self.write_atomic(&record, &cbor)?;
        debug!(output = ?output, op = %recipe.op, "recording recipe");
        Ok(())
    }

    /// apply `op` to `input`, returning the content-addressed result
    pub fn apply(&self, input: SnapshotId, op: Op, tag: &str) -> Result<SnapshotId> {
        let recipe = Recipe::linear(input, op, tag);
        let id = recipe.output_id()?;
        self.put_unchecked(id, &recipe)?;
        Ok(id)
    }

    /// union of `inputs`, later inputs win
    pub fn merge(&self, inputs: Vec<SnapshotId>, tag: &str) -> Result<SnapshotId> {
        let recipe = Recipe::merge(inputs, tag);
        let id = recipe.output_id()?;
        self.put_unchecked(id, &recipe)?;
        Ok(id)
    }

    /// store the outcome of a successful run of `cmd`
    pub fn record_run(&self, cmd: &Cmd, info: RunInfo) -> Result<Key> {
        info.validate_for(cmd.kind)?;
        let key = cmd.key()?;

        self.write_atomic(&self.run_path(&key), &encode(&info)?)?;

        debug!(key = %key, id = %info.id, "recording run");
        Ok(key)
    }

    /// recipes producing `id`, in record-name order
    pub fn read_recipes(&self, id: &SnapshotId) -> Result<Vec<Recipe>> {
        if id.is_empty() {
            return Ok(vec![]);
        }

        let dir = self.snapshot_dir(id);
        let mut names = match fs::read_dir(&dir) {
            Ok(entries) => entries
                .map(|e| e.map(|e| e.file_name().to_string_lossy().to_string()))
                .collect::<std::io::Result<Vec<_>>>()
                .with_path(&dir)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(vec![]),
            Err(e) => return Err(Error::Io { path: dir, source: e }),
        };
        names.sort();

        let mut recipes = Vec::with_capacity(names.len());
        for name in names {
            let path = dir.join(&name);
            let cbor = self.read_record(&path)?;

            // verify record name
            if SnapshotId::digest(&cbor).to_hex() != name {
                return Err(Error::Store(format!("corrupt recipe record {}", path.display())));
            }
            recipes.push(decode(&cbor)?);
        }

        trace!(snapshot = ?id, count = recipes.len(), "read recipes");
        Ok(recipes)
    }

    /// compress and write a record: temp -> fsync -> rename
    fn write_atomic(&self, path: &Path, bytes: &[u8]) -> Result<()> {
        let compressed = zstd::encode_all(bytes, self.config.compression_level).map_err(|e| {
            Error::Io {
                path: PathBuf::from("<zstd>"),
                source: e,
            }
        })?;

        let tmp_path = self.tmp_path().join(uuid::Uuid::new_v4().to_string());
        {
            let mut tmp_file = File::create(&tmp_path).with_path(&tmp_path)?;
            tmp_file.write_all(&compressed).with_path(&tmp_path)?;
            tmp_file.sync_all().with_path(&tmp_path)?;
        }

        fs::rename(&tmp_path, path).with_path(path)?;

        // fsync parent directory
        if let Some(parent) = path.parent() {
            let dir = File::open(parent).with_path(parent)?;
            dir.sync_all().with_path(parent)?;
        }

        Ok(())
    }

    /// read and decompress a record
    fn read_record(&self, path: &Path) -> Result<Vec<u8>> {
        let compressed = fs::read(path).with_path(path)?;
        zstd::decode_all(&compressed[..]).with_path(path)
    }
}

fn decode<T: DeserializeOwned>(cbor: &[u8]) -> Result<T> {
    Ok(ciborium::from_reader(cbor)?)
}

fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    let mut bytes = Vec::new();
    ciborium::into_writer(value, &mut bytes)?;
    Ok(bytes)
}

impl RecipeStore for FsStore {
    fn all_paths_to_snapshot(&self, ctx: &Context, id: &SnapshotId) -> Result<Vec<RecipePath>> {
        ctx.check()?;
        Ok(self
            .read_recipes(id)?
            .into_iter()
            .map(RecipePath::from)
            .collect())
    }
}

impl RecipeWriter for FsStore {
    fn apply(&self, input: SnapshotId, op: Op, tag: &str) -> Result<SnapshotId> {
        FsStore::apply(self, input, op, tag)
    }
}

impl RunStore for FsStore {
    fn get_run_info(&self, ctx: &Context, key: &Key) -> Result<RunInfo> {
        ctx.check()?;
        let path = self.run_path(key);
        if !path.exists() {
            return Ok(RunInfo::default());
        }
        decode(&self.read_record(&path)?)
    }
}

/// guard that holds the store lock until dropped
pub struct StoreLock {
    _flock: Flock<File>,
}
