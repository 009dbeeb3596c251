use std::path::{Path, PathBuf};

use crate::*;

/// Source of named data blobs such as shaders and textures.
pub trait DataProvider: std::fmt::Debug + Send + Sync {
    fn has_data(&self, path: &str) -> bool;

    fn get_data(&self, path: &str) -> DeviceResult<Vec<u8>>;
}

/// True for paths which are already resolved: `/x` and `\x` roots,
/// drive paths like `C:\x` or `C:/x`, and `\\server\share` UNC paths.
pub fn is_rooted(path: &str) -> bool {
    let bytes = path.as_bytes();
    match bytes {
        [b'/', ..] | [b'\\', ..] => true,
        [drive, b':', b'/', ..] | [drive, b':', b'\\', ..] =>
            drive.is_ascii_alphabetic(),
        _ => false,
    }
}

/// Loads files from disk relative to a resource directory.
#[derive(Clone, Debug)]
pub struct FileProvider {
    root: PathBuf,
}

impl FileProvider {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// A provider rooted at the directory of the running executable.
    pub fn from_executable_dir() -> DeviceResult<Self> {
        let exe = std::env::current_exe().map_err(|e| Error::Io {
            path: "<current executable>".to_owned(),
            message: e.to_string(),
        })?;
        let dir = exe.parent().map_or_else(PathBuf::new, Path::to_path_buf);
        Ok(Self::new(dir))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn full_path(&self, path: &str) -> PathBuf {
        if is_rooted(path) {
            PathBuf::from(path)
        } else {
            self.root.join(path)
        }
    }
}

impl DataProvider for FileProvider {
    fn has_data(&self, path: &str) -> bool {
        self.full_path(path).is_file()
    }

    fn get_data(&self, path: &str) -> DeviceResult<Vec<u8>> {
        let full = self.full_path(path);
        trace!("FileProvider::get_data(path: {:?})", full);
        std::fs::read(&full).map_err(|e| Error::Io {
            path: full.display().to_string(),
            message: e.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rooted_paths() {
        assert!(is_rooted("/usr/share"));
        assert!(is_rooted("\\shaders"));
        assert!(is_rooted("C:\\Data\\a.bin"));
        assert!(is_rooted("d:/data/a.bin"));
        assert!(is_rooted("\\\\server\\share\\a.bin"));
        assert!(!is_rooted("shaders/a.spv"));
        assert!(!is_rooted("C:relative"));
        assert!(!is_rooted("1:/data"));
        assert!(!is_rooted(""));
    }

    #[test]
    fn resolves_against_root() {
        let provider = FileProvider::new("/opt/app/resources");
        assert_eq!(provider.full_path("textures/a.png"),
            Path::new("/opt/app/resources/textures/a.png"));
        assert_eq!(provider.full_path("/tmp/b.png"), Path::new("/tmp/b.png"));
    }

    #[test]
    fn reads_files() {
        let dir = std::env::temp_dir()
            .join(format!("strata-provider-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("blob.bin"), [1u8, 2, 3]).unwrap();

        let provider = FileProvider::new(&dir);
        assert!(provider.has_data("blob.bin"));
        assert_eq!(provider.get_data("blob.bin").unwrap(), [1, 2, 3]);
        assert!(!provider.has_data("missing.bin"));
        match provider.get_data("missing.bin") {
            Err(Error::Io { path, .. }) => assert!(path.ends_with("missing.bin")),
            other => panic!("unexpected result {:?}", other),
        }

        std::fs::remove_dir_all(&dir).unwrap();
    }
}
