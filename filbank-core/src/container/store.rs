//! Хранилище ключ → байты, на котором лежит контейнер.

use std::{
    collections::BTreeMap,
    fs,
    io::ErrorKind,
    path::{Path, PathBuf},
    sync::Arc,
};

use filbank_types::{FilbankError, FilbankResult};
use parking_lot::RwLock;

/// Хранилище блобов с адресацией по ключу (`data/c/0.0.0`, `.attrs.json`).
///
/// Методы принимают `&self`: хранилище может использоваться из потока
/// чтения и потока записи одновременно.
pub trait BlobStore: Send + Sync {
    /// Значение ключа; `None`, если ключа нет.
    fn get(
        &self,
        key: &str,
    ) -> FilbankResult<Option<Vec<u8>>>;

    fn set(
        &self,
        key: &str,
        value: &[u8],
    ) -> FilbankResult<()>;

    fn contains(
        &self,
        key: &str,
    ) -> FilbankResult<bool>;

    /// Все ключи с префиксом, по возрастанию.
    fn list(
        &self,
        prefix: &str,
    ) -> FilbankResult<Vec<String>>;
}

/// Контейнер как каталог: ключ - относительный путь файла.
#[derive(Debug, Clone)]
pub struct FilesystemStore {
    root: PathBuf,
}

/// Контейнер в памяти. Клоны разделяют одно содержимое.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    inner: Arc<RwLock<BTreeMap<String, Vec<u8>>>>,
}

////////////////////////////////////////////////////////////////////////////////
// FilesystemStore
////////////////////////////////////////////////////////////////////////////////

impl FilesystemStore {
    /// Создаёт каталог (если нужно) и хранилище поверх него.
    pub fn create<P: AsRef<Path>>(root: P) -> FilbankResult<Self> {
        fs::create_dir_all(root.as_ref())?;
        Ok(Self {
            root: root.as_ref().to_path_buf(),
        })
    }

    /// Открывает существующий каталог.
    pub fn open<P: AsRef<Path>>(root: P) -> FilbankResult<Self> {
        let root = root.as_ref();

        if !root.is_dir() {
            return Err(FilbankError::Io(std::io::Error::new(
                ErrorKind::NotFound,
                format!("container directory {} not found", root.display()),
            )));
        }

        Ok(Self {
            root: root.to_path_buf(),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_of(
        &self,
        key: &str,
    ) -> FilbankResult<PathBuf> {
        if key.is_empty() || key.split('/').any(|p| p.is_empty() || p == "..") {
            return Err(FilbankError::corrupted(format!("invalid store key '{key}'")));
        }

        Ok(key.split('/').fold(self.root.clone(), |p, part| p.join(part)))
    }

    fn collect_keys(
        &self,
        dir: &Path,
        prefix: &str,
        out: &mut Vec<String>,
    ) -> FilbankResult<()> {
        let entries = match fs::read_dir(dir) {
            Ok(e) => e,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(e.into()),
        };

        for entry in entries {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().into_owned();
            let key = if prefix.is_empty() {
                name
            } else {
                format!("{prefix}/{name}")
            };

            if entry.file_type()?.is_dir() {
                self.collect_keys(&entry.path(), &key, out)?;
            } else {
                out.push(key);
            }
        }

        Ok(())
    }
}

impl BlobStore for FilesystemStore {
    fn get(
        &self,
        key: &str,
    ) -> FilbankResult<Option<Vec<u8>>> {
        match fs::read(self.path_of(key)?) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn set(
        &self,
        key: &str,
        value: &[u8],
    ) -> FilbankResult<()> {
        let path = self.path_of(key)?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        fs::write(path, value)?;
        Ok(())
    }

    fn contains(
        &self,
        key: &str,
    ) -> FilbankResult<bool> {
        Ok(self.path_of(key)?.is_file())
    }

    fn list(
        &self,
        prefix: &str,
    ) -> FilbankResult<Vec<String>> {
        let mut keys = Vec::new();
        self.collect_keys(&self.root, "", &mut keys)?;

        keys.retain(|k| k.starts_with(prefix));
        keys.sort();
        Ok(keys)
    }
}

////////////////////////////////////////////////////////////////////////////////
// MemoryStore
////////////////////////////////////////////////////////////////////////////////

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Суммарный размер значений, байт.
    pub fn total_bytes(&self) -> usize {
        self.inner.read().values().map(Vec::len).sum()
    }
}

impl BlobStore for MemoryStore {
    fn get(
        &self,
        key: &str,
    ) -> FilbankResult<Option<Vec<u8>>> {
        Ok(self.inner.read().get(key).cloned())
    }

    fn set(
        &self,
        key: &str,
        value: &[u8],
    ) -> FilbankResult<()> {
        self.inner.write().insert(key.to_string(), value.to_vec());
        Ok(())
    }

    fn contains(
        &self,
        key: &str,
    ) -> FilbankResult<bool> {
        Ok(self.inner.read().contains_key(key))
    }

    fn list(
        &self,
        prefix: &str,
    ) -> FilbankResult<Vec<String>> {
        Ok(self
            .inner
            .read()
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn exercise(store: &dyn BlobStore) {
        assert_eq!(store.get("data/c/0.0.0").unwrap(), None);
        assert!(!store.contains("data/c/0.0.0").unwrap());

        store.set("data/c/0.0.0", b"abc").unwrap();
        store.set("data/c/0.0.1", b"de").unwrap();
        store.set(".attrs.json", b"{}").unwrap();

        assert_eq!(store.get("data/c/0.0.0").unwrap().as_deref(), Some(&b"abc"[..]));
        assert!(store.contains("data/c/0.0.1").unwrap());

        store.set("data/c/0.0.0", b"xyz").unwrap();
        assert_eq!(store.get("data/c/0.0.0").unwrap().as_deref(), Some(&b"xyz"[..]));

        assert_eq!(
            store.list("data/").unwrap(),
            vec!["data/c/0.0.0".to_string(), "data/c/0.0.1".to_string()]
        );
        assert_eq!(store.list("").unwrap().len(), 3);
    }

    #[test]
    fn test_memory_store() {
        let store = MemoryStore::new();
        exercise(&store);
        assert_eq!(store.total_bytes(), 3 + 2 + 2);

        // клон видит те же данные
        let other = store.clone();
        assert!(other.contains(".attrs.json").unwrap());
    }

    #[test]
    fn test_filesystem_store() {
        let dir = tempfile::tempdir().unwrap();
        let store = FilesystemStore::create(dir.path().join("out.fbc")).unwrap();
        exercise(&store);

        assert!(dir.path().join("out.fbc/data/c/0.0.1").is_file());

        let reopened = FilesystemStore::open(dir.path().join("out.fbc")).unwrap();
        assert_eq!(reopened.get("data/c/0.0.1").unwrap().as_deref(), Some(&b"de"[..]));
    }

    #[test]
    fn test_filesystem_store_rejects_escaping_keys() {
        let dir = tempfile::tempdir().unwrap();
        let store = FilesystemStore::create(dir.path()).unwrap();

        assert!(store.set("../evil", b"x").is_err());
        assert!(store.get("a//b").is_err());
    }

    #[test]
    fn test_open_missing_directory() {
        let dir = tempfile::tempdir().unwrap();
        assert!(FilesystemStore::open(dir.path().join("nope")).is_err());
    }
}
