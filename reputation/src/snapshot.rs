//! Snapshot persistence for the reputation engine.
//!
//! The snapshot file is the only source of truth for recovery: it serializes
//! the whole engine state as one self-describing JSON object. Identity maps
//! are kept as `BTreeMap` so the rendered keys have a fixed order and
//! persisting the same state twice produces the same bytes.

use std::{
    collections::BTreeMap,
    fs,
    io::ErrorKind,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};

use crate::trs::{Address, Alpha, Epoch, Reputation};

/// Serialized form of the whole reputation engine state
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct Snapshot {
    /// Total amount of witnessing acts that happened
    pub witnessing_acts: Alpha,
    /// Reputation left undistributed by the previous epoch
    pub leftover_reputation: Reputation,
    /// Queue of reputation packets with their expiration thresholds
    pub reputation_expiry: Vec<(Alpha, BTreeMap<Address, Reputation>)>,
    /// Last epoch the engine processed
    pub epoch: Epoch,
    /// Map of identities to reputation
    pub identities: BTreeMap<Address, Reputation>,
}

/// Read a snapshot from `path`. A missing file yields `None`: the caller is
/// expected to start from a fresh engine.
pub fn load(path: &Path) -> Result<Option<Snapshot>, failure::Error> {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    let snapshot = serde_json::from_slice(&bytes)?;

    Ok(Some(snapshot))
}

/// Write `snapshot` to `path`, creating parent directories if missing.
/// The snapshot is written to a temporary sibling which is then renamed over
/// `path`, so a crash mid-write cannot leave a truncated file behind.
pub fn persist(path: &Path, snapshot: &Snapshot) -> Result<(), failure::Error> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }

    let bytes = serde_json::to_vec(snapshot)?;
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);
    fs::write(&tmp, &bytes)?;
    fs::rename(&tmp, path)?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;

    fn sample() -> Snapshot {
        let mut identities = BTreeMap::new();
        identities.insert("wit1alice".to_string(), Reputation(1));
        identities.insert("wit1bob".to_string(), Reputation(1));

        Snapshot {
            witnessing_acts: Alpha(2),
            leftover_reputation: Reputation(0),
            reputation_expiry: vec![(Alpha(20002), identities.clone())],
            epoch: 100,
            identities,
        }
    }

    #[test]
    fn json_field_layout() {
        let rendered = serde_json::to_string(&sample()).unwrap();
        assert_eq!(
            rendered,
            "{\"witnessing_acts\":2,\"leftover_reputation\":0,\
             \"reputation_expiry\":[[20002,{\"wit1alice\":1,\"wit1bob\":1}]],\
             \"epoch\":100,\"identities\":{\"wit1alice\":1,\"wit1bob\":1}}"
        );
    }

    #[test]
    fn missing_file_is_fresh() {
        let path = env::temp_dir().join(format!("trs_snapshot_missing_{}.json", std::process::id()));
        assert_eq!(load(&path).unwrap(), None);
    }

    #[test]
    fn persist_load_persist_is_byte_identical() {
        let dir = env::temp_dir().join(format!("trs_snapshot_rt_{}", std::process::id()));
        let path = dir.join("nested").join("trs.json");

        let snapshot = sample();
        persist(&path, &snapshot).unwrap();
        let first = fs::read(&path).unwrap();

        let loaded = load(&path).unwrap().unwrap();
        assert_eq!(loaded, snapshot);

        persist(&path, &loaded).unwrap();
        let second = fs::read(&path).unwrap();
        assert_eq!(first, second);

        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn persist_overwrites() {
        let dir = env::temp_dir().join(format!("trs_snapshot_ow_{}", std::process::id()));
        let path = dir.join("trs.json");

        persist(&path, &sample()).unwrap();
        let mut replacement = sample();
        replacement.epoch = 101;
        persist(&path, &replacement).unwrap();

        assert_eq!(load(&path).unwrap().unwrap().epoch, 101);

        fs::remove_dir_all(&dir).unwrap();
    }
}
