use std::path::{Path, PathBuf};

const HOME_ENV: &str = "SECOND_BRAIN_HOME";
const HOME_DIR: &str = ".second-brain";

pub struct StorePaths {
    pub root: PathBuf,
    pub db: PathBuf,
    pub config: PathBuf,
}

impl StorePaths {
    /// `$SECOND_BRAIN_HOME`, else `~/.second-brain`, else `./.second-brain`
    pub fn new() -> Self {
        let root = std::env::var_os(HOME_ENV)
            .map(PathBuf::from)
            .or_else(|| dirs::home_dir().map(|h| h.join(HOME_DIR)))
            .unwrap_or_else(|| PathBuf::from(HOME_DIR));
        Self::from_root(root)
    }

    pub fn from_root(root: PathBuf) -> Self {
        Self {
            db: root.join("second_brain.db"),
            config: root.join("config.yaml"),
            root,
        }
    }

    pub fn resolve(home: Option<&Path>) -> Self {
        match home {
            Some(root) => Self::from_root(root.to_path_buf()),
            None => Self::new(),
        }
    }

    /// Create the data directory (owner-only on unix)
    pub fn ensure(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.root)?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&self.root, std::fs::Permissions::from_mode(0o700))?;
        }
        Ok(())
    }
}

impl Default for StorePaths {
    fn default() -> Self {
        Self::new()
    }
}
