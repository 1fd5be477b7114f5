use std::{path::PathBuf, str::FromStr};

pub trait StorageManager: Send + Sync {
    fn write(&self, ident: &str, data: &[u8]) -> std::io::Result<()>;
    fn read(&self, ident: &str) -> std::io::Result<Vec<u8>>;
    fn exists(&self, ident: &str) -> bool;
}

/// Filesystem-backed blob storage for uploaded media files.
#[derive(Clone)]
pub struct BackendLocal {
    pub base_dir: PathBuf,
}

impl BackendLocal {
    pub fn new(storage_dir: &str) -> std::io::Result<Self> {
        let path = PathBuf::from_str(storage_dir)
            .expect("infallible PathBuf::from_str for &str");
        std::fs::create_dir_all(&path)?;
        Ok(BackendLocal { base_dir: path })
    }
}

impl StorageManager for BackendLocal {
    fn exists(&self, ident: &str) -> bool {
        let path = self.base_dir.join(ident);

        std::fs::metadata(&path).is_ok()
    }

    fn read(&self, ident: &str) -> std::io::Result<Vec<u8>> {
        let path = self.base_dir.join(ident);

        std::fs::read(&path)
    }

    fn write(&self, ident: &str, data: &[u8]) -> std::io::Result<()> {
        let path = self.base_dir.join(ident);
        // unique temp name so concurrent writers never collide
        let temp_path = self
            .base_dir
            .join(format!("{}-{ident}", rusty_ulid::generate_ulid_string()));

        std::fs::write(&temp_path, data)?;

        std::fs::rename(&temp_path, &path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_read_exists() {
        let tmp = tempfile::tempdir().unwrap();
        let store = BackendLocal::new(tmp.path().to_str().unwrap()).unwrap();

        assert!(!store.exists("a.jpg"));
        store.write("a.jpg", b"blob").unwrap();
        assert!(store.exists("a.jpg"));
        assert_eq!(store.read("a.jpg").unwrap(), b"blob");

        // overwrite replaces, no temp files left behind
        store.write("a.jpg", b"blob2").unwrap();
        assert_eq!(store.read("a.jpg").unwrap(), b"blob2");
        assert_eq!(std::fs::read_dir(tmp.path()).unwrap().count(), 1);
    }
}
