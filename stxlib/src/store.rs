//! Scoped key-value storage for account snapshots.
//!
//! Values are opaque bytes. A scope groups the keys of one network so switching networks never mixes accounts.

use std::{
    collections::BTreeMap,
    fs::File,
    io::{self, BufReader, BufWriter, Error, ErrorKind, Read, Write},
    path::{Path, PathBuf},
    sync::{Mutex, PoisonError},
};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use crate::utils::{read_bytes, read_string, write_string};

type Entries = BTreeMap<(String, String), Vec<u8>>;

/// Key-value store partitioned by scope.
pub trait ScopedStore: Send + Sync {
    /// Returns the value stored under `key`.
    fn get(&self, scope: &str, key: &str) -> io::Result<Option<Vec<u8>>>;

    /// Stores `value` under `key`, replacing any previous value.
    fn put(&self, scope: &str, key: &str, value: &[u8]) -> io::Result<()>;

    /// Removes `key`. Removing a missing key is not an error.
    fn remove(&self, scope: &str, key: &str) -> io::Result<()>;

    /// Returns the keys of `scope` in lexical order.
    fn keys(&self, scope: &str) -> io::Result<Vec<String>>;
}

fn scope_keys(entries: &Entries, scope: &str) -> Vec<String> {
    entries
        .keys()
        .filter(|(entry_scope, _)| entry_scope == scope)
        .map(|(_, key)| key.clone())
        .collect()
}

/// Store held in memory, lost when dropped.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<Entries>,
}

impl MemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

impl ScopedStore for MemoryStore {
    fn get(&self, scope: &str, key: &str) -> io::Result<Option<Vec<u8>>> {
        Ok(self
            .entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&(scope.to_string(), key.to_string()))
            .cloned())
    }

    fn put(&self, scope: &str, key: &str, value: &[u8]) -> io::Result<()> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert((scope.to_string(), key.to_string()), value.to_vec());
        Ok(())
    }

    fn remove(&self, scope: &str, key: &str) -> io::Result<()> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&(scope.to_string(), key.to_string()));
        Ok(())
    }

    fn keys(&self, scope: &str) -> io::Result<Vec<String>> {
        Ok(scope_keys(
            &self.entries.lock().unwrap_or_else(PoisonError::into_inner),
            scope,
        ))
    }
}

/// Store persisted to a single file, rewritten on every change.
///
/// Writes go to a sibling temporary file that is renamed over the store file, so a crash never leaves a partial
/// store behind.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    entries: Mutex<Entries>,
}

impl FileStore {
    /// Changes in version 1:
    /// - initial format
    #[must_use]
    pub const fn serialized_version() -> u64 {
        1
    }

    /// Opens the store at `path`, starting empty if the file does not exist.
    pub fn open(path: impl Into<PathBuf>) -> io::Result<Self> {
        let path = path.into();
        let entries = match File::open(&path) {
            Ok(file) => Self::read_entries(BufReader::new(file))?,
            Err(e) if e.kind() == ErrorKind::NotFound => Entries::new(),
            Err(e) => return Err(e),
        };
        log::debug!("Opened store at {} with {} entries", path.display(), entries.len());

        Ok(Self {
            path,
            entries: Mutex::new(entries),
        })
    }

    /// Path of the store file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_entries<R: Read>(mut reader: R) -> io::Result<Entries> {
        let version = reader.read_u64::<LittleEndian>()?;
        if version > Self::serialized_version() {
            return Err(Error::new(
                ErrorKind::InvalidData,
                format!("store version {version} is not supported"),
            ));
        }
        let count = reader.read_u64::<LittleEndian>()?;
        let mut entries = Entries::new();
        for _ in 0..count {
            let scope = read_string(&mut reader)?;
            let key = read_string(&mut reader)?;
            let len = reader.read_u64::<LittleEndian>()?;
            let value = read_bytes(&mut reader, len)?;
            entries.insert((scope, key), value);
        }

        Ok(entries)
    }

    fn write_entries<W: Write>(mut writer: W, entries: &Entries) -> io::Result<()> {
        writer.write_u64::<LittleEndian>(Self::serialized_version())?;
        writer.write_u64::<LittleEndian>(entries.len() as u64)?;
        for ((scope, key), value) in entries {
            write_string(&mut writer, scope)?;
            write_string(&mut writer, key)?;
            writer.write_u64::<LittleEndian>(value.len() as u64)?;
            writer.write_all(value)?;
        }
        writer.flush()
    }

    fn persist(&self, entries: &Entries) -> io::Result<()> {
        let mut temp_path = self.path.clone().into_os_string();
        temp_path.push(".tmp");
        let temp_path = PathBuf::from(temp_path);
        {
            let file = File::create(&temp_path)?;
            Self::write_entries(BufWriter::new(&file), entries)?;
            file.sync_all()?;
        }
        std::fs::rename(&temp_path, &self.path)
    }

    fn update<F>(&self, change: F) -> io::Result<()>
    where
        F: FnOnce(&mut Entries),
    {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        let mut updated = entries.clone();
        change(&mut updated);
        self.persist(&updated)?;
        *entries = updated;

        Ok(())
    }
}

impl ScopedStore for FileStore {
    fn get(&self, scope: &str, key: &str) -> io::Result<Option<Vec<u8>>> {
        Ok(self
            .entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&(scope.to_string(), key.to_string()))
            .cloned())
    }

    fn put(&self, scope: &str, key: &str, value: &[u8]) -> io::Result<()> {
        self.update(|entries| {
            entries.insert((scope.to_string(), key.to_string()), value.to_vec());
        })
    }

    fn remove(&self, scope: &str, key: &str) -> io::Result<()> {
        self.update(|entries| {
            entries.remove(&(scope.to_string(), key.to_string()));
        })
    }

    fn keys(&self, scope: &str) -> io::Result<Vec<String>> {
        Ok(scope_keys(
            &self.entries.lock().unwrap_or_else(PoisonError::into_inner),
            scope,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn exercise(store: &dyn ScopedStore) {
        store.put("testnet", "ST2B", b"b").unwrap();
        store.put("testnet", "ST2A", b"a").unwrap();
        store.put("mainnet", "SP2A", b"m").unwrap();
        assert_eq!(store.keys("testnet").unwrap(), ["ST2A", "ST2B"]);
        assert_eq!(store.get("testnet", "ST2A").unwrap(), Some(b"a".to_vec()));
        assert_eq!(store.get("mainnet", "ST2A").unwrap(), None);

        store.remove("testnet", "ST2A").unwrap();
        store.remove("testnet", "missing").unwrap();
        assert_eq!(store.keys("testnet").unwrap(), ["ST2B"]);
    }

    #[test]
    fn memory_store() {
        exercise(&MemoryStore::new());
    }

    #[test]
    fn file_store_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stx-sandbox.dat");
        exercise(&FileStore::open(&path).unwrap());

        let reopened = FileStore::open(&path).unwrap();
        assert_eq!(reopened.keys("testnet").unwrap(), ["ST2B"]);
        assert_eq!(reopened.get("mainnet", "SP2A").unwrap(), Some(b"m".to_vec()));
        assert!(!dir.path().join("stx-sandbox.dat.tmp").exists());
    }

    #[test]
    fn corrupt_store_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stx-sandbox.dat");
        std::fs::write(&path, [1u8, 2, 3]).unwrap();
        assert!(FileStore::open(&path).is_err());
    }

    #[test]
    fn oversized_value_length_is_an_error() {
        let mut bytes = Vec::new();
        bytes.write_u64::<LittleEndian>(FileStore::serialized_version()).unwrap();
        bytes.write_u64::<LittleEndian>(1).unwrap();
        write_string(&mut bytes, "testnet").unwrap();
        write_string(&mut bytes, "ST2A").unwrap();
        bytes.write_u64::<LittleEndian>(u64::MAX).unwrap();
        bytes.push(7);

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stx-sandbox.dat");
        std::fs::write(&path, &bytes).unwrap();
        let error = FileStore::open(&path).unwrap_err();
        assert_eq!(error.kind(), ErrorKind::UnexpectedEof);
    }
}
