use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::{Error, IoResultExt, Result};
use crate::hash::SnapshotId;
use crate::store::FsStore;

/// rev naming the empty snapshot
pub const EMPTY_REV: &str = "empty";

/// point a ref at a snapshot (create or update)
///
/// names may be hierarchical, e.g. "ci/main/latest"
pub fn write_ref(store: &FsStore, ref_name: &str, id: &SnapshotId) -> Result<()> {
    validate_ref_name(ref_name)?;

    let ref_path = ref_path(store, ref_name);

    if let Some(parent) = ref_path.parent() {
        fs::create_dir_all(parent).with_path(parent)?;
    }

    // atomic write: temp -> fsync -> rename
    let tmp_path = store.tmp_path().join(uuid::Uuid::new_v4().to_string());
    {
        let mut tmp_file = File::create(&tmp_path).with_path(&tmp_path)?;
        writeln!(tmp_file, "{}", id.to_hex()).with_path(&tmp_path)?;
        tmp_file.sync_all().with_path(&tmp_path)?;
    }

    fs::rename(&tmp_path, &ref_path).with_path(&ref_path)?;

    if let Some(parent) = ref_path.parent() {
        let dir = File::open(parent).with_path(parent)?;
        dir.sync_all().with_path(parent)?;
    }

    debug!(name = ref_name, id = ?id, "wrote ref");
    Ok(())
}

pub fn read_ref(store: &FsStore, ref_name: &str) -> Result<SnapshotId> {
    validate_ref_name(ref_name)?;
    let ref_path = ref_path(store, ref_name);

    let content = fs::read_to_string(&ref_path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            Error::RefNotFound(ref_name.to_string())
        } else {
            Error::Io {
                path: ref_path.clone(),
                source: e,
            }
        }
    })?;

    SnapshotId::from_hex(content.trim())
}

pub fn delete_ref(store: &FsStore, ref_name: &str) -> Result<()> {
    validate_ref_name(ref_name)?;
    let ref_path = ref_path(store, ref_name);

    fs::remove_file(&ref_path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            Error::RefNotFound(ref_name.to_string())
        } else {
            Error::Io {
                path: ref_path,
                source: e,
            }
        }
    })
}

/// resolve a rev to a snapshot id
///
/// 64 hex chars parse directly, "empty" is the empty snapshot,
/// anything else is looked up as a ref name.
pub fn resolve(store: &FsStore, rev: &str) -> Result<SnapshotId> {
    if rev == EMPTY_REV {
        return Ok(SnapshotId::EMPTY);
    }
    if rev.len() == 64 && rev.chars().all(|c| c.is_ascii_hexdigit()) {
        return SnapshotId::from_hex(rev);
    }
    read_ref(store, rev)
}

/// all ref names, sorted
pub fn list_refs(store: &FsStore) -> Result<Vec<String>> {
    let refs_dir = store.refs_path();
    let mut refs = Vec::new();

    if refs_dir.exists() {
        collect_refs(&refs_dir, &refs_dir, &mut refs)?;
    }

    refs.sort();
    Ok(refs)
}

fn ref_path(store: &FsStore, ref_name: &str) -> PathBuf {
    store.refs_path().join(ref_name)
}

fn collect_refs(base: &Path, dir: &Path, refs: &mut Vec<String>) -> Result<()> {
    for entry in fs::read_dir(dir).with_path(dir)? {
        let entry = entry.with_path(dir)?;
        let path = entry.path();

        if path.is_dir() {
            collect_refs(base, &path, refs)?;
        } else if path.is_file() {
            if let Ok(rel) = path.strip_prefix(base) {
                refs.push(rel.to_string_lossy().to_string());
            }
        }
    }
    Ok(())
}

pub fn validate_ref_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(Error::InvalidRef("empty ref name".to_string()));
    }

    if name == EMPTY_REV {
        return Err(Error::InvalidRef(format!("{:?} is reserved", name)));
    }

    if name.starts_with('/') || name.ends_with('/') {
        return Err(Error::InvalidRef(format!(
            "ref name cannot start or end with '/': {}",
            name
        )));
    }

    if name.contains("//") {
        return Err(Error::InvalidRef(format!(
            "ref name cannot contain '//': {}",
            name
        )));
    }

    if name.contains('\0') || name.chars().any(char::is_whitespace) {
        return Err(Error::InvalidRef(format!(
            "ref name cannot contain whitespace or null bytes: {:?}",
            name
        )));
    }

    // path traversal
    for component in name.split('/') {
        if component == "." || component == ".." {
            return Err(Error::InvalidRef(format!(
                "ref name cannot contain '.' or '..': {}",
                name
            )));
        }
    }

    Ok(())
}
