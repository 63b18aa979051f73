//! Path translation between host and workspace namespaces
//!
//! The host namespace is where the operator's files live (for example a Windows
//! drive). The workspace namespace is what the editor session sees (for example
//! the same files under `/mnt/c` inside WSL). The mount namespace is what a
//! container runtime expects when a host resource is referenced from inside an
//! environment, such as compose file paths handed to Docker Desktop.
//!
//! One [`PathAdapter`] is selected at startup from the detected [`Platform`]; the
//! transition engine only ever talks to the trait.

use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, instrument};

/// Platform types the adapters are selected for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    /// Native Linux
    Linux,
    /// macOS
    MacOS,
    /// Native Windows, environments reached through WSL
    Windows,
    /// Running inside Windows Subsystem for Linux
    Wsl,
}

impl Platform {
    /// Detect the current platform environment
    #[instrument]
    pub fn detect() -> Self {
        if cfg!(target_os = "windows") {
            return Platform::Windows;
        }

        if cfg!(target_os = "macos") {
            return Platform::MacOS;
        }

        if Self::is_wsl() {
            Platform::Wsl
        } else {
            Platform::Linux
        }
    }

    fn is_wsl() -> bool {
        // WSL kernels report "microsoft" in /proc/version
        match fs::read_to_string("/proc/version") {
            Ok(version) => {
                let is_wsl = version.to_lowercase().contains("microsoft");
                debug!("WSL detection from /proc/version: {}", is_wsl);
                is_wsl
            }
            Err(_) => false,
        }
    }

    /// Build the path adapter for this platform
    pub fn path_adapter(self, distro: Option<String>) -> Box<dyn PathAdapter> {
        match self {
            Platform::Windows => Box::new(WslPaths::new(distro)),
            Platform::Linux | Platform::MacOS | Platform::Wsl => Box::new(NativePaths),
        }
    }
}

impl std::str::FromStr for Platform {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "linux" => Ok(Self::Linux),
            "macos" | "darwin" => Ok(Self::MacOS),
            "windows" => Ok(Self::Windows),
            "wsl" => Ok(Self::Wsl),
            other => Err(format!(
                "Unknown platform: {}. Supported platforms: linux, macos, windows, wsl",
                other
            )),
        }
    }
}

/// Translation between the host, workspace and mount namespaces.
///
/// Implementations are pure: no filesystem access, no process spawning.
pub trait PathAdapter: Send + Sync {
    /// Host path as seen by the editor session
    fn to_workspace_namespace(&self, host_path: &Path) -> PathBuf;

    /// Workspace-namespace path back to the host path
    fn to_host_namespace(&self, workspace_path: &Path) -> PathBuf;

    /// Host path as referenced from inside an environment (bind mounts, compose files)
    fn to_mount_namespace(&self, host_path: &Path) -> String;

    /// Whether `path` is already in the workspace namespace
    fn looks_like_workspace_namespace_path(&self, path: &Path) -> bool;
}

/// Identity adapter for hosts where containers run natively
#[derive(Debug, Clone, Copy, Default)]
pub struct NativePaths;

impl PathAdapter for NativePaths {
    fn to_workspace_namespace(&self, host_path: &Path) -> PathBuf {
        host_path.to_path_buf()
    }

    fn to_host_namespace(&self, workspace_path: &Path) -> PathBuf {
        workspace_path.to_path_buf()
    }

    fn to_mount_namespace(&self, host_path: &Path) -> String {
        host_path.to_string_lossy().into_owned()
    }

    fn looks_like_workspace_namespace_path(&self, path: &Path) -> bool {
        path.to_string_lossy().starts_with('/')
    }
}

/// Windows host with the editor session running inside a WSL distro.
///
/// Drive paths map to `/mnt/<drive>`; `\\wsl.localhost\<distro>\...` and
/// `\\wsl$\<distro>\...` shares map to the distro's own root.
#[derive(Debug, Clone, Default)]
pub struct WslPaths {
    distro: Option<String>,
}

impl WslPaths {
    pub fn new(distro: Option<String>) -> Self {
        Self { distro }
    }
}

/// Split `C:\rest` / `C:/rest` into (drive letter, forward-slash rest)
fn split_drive(path: &str) -> Option<(char, String)> {
    let mut chars = path.chars();
    let drive = chars.next()?;
    if !drive.is_ascii_alphabetic() || chars.next() != Some(':') {
        return None;
    }
    let rest = path[2..].replace('\\', "/");
    let rest = rest.trim_end_matches('/').to_string();
    Some((drive.to_ascii_lowercase(), rest))
}

fn strip_long_prefix(path: &str) -> &str {
    path.strip_prefix(r"\\?\").unwrap_or(path)
}

fn join_rooted(root: &str, rest: &str) -> String {
    if rest.is_empty() {
        root.to_string()
    } else if rest.starts_with('/') {
        format!("{}{}", root, rest)
    } else {
        format!("{}/{}", root, rest)
    }
}

impl PathAdapter for WslPaths {
    fn to_workspace_namespace(&self, host_path: &Path) -> PathBuf {
        let raw = host_path.to_string_lossy();
        let path = strip_long_prefix(&raw);

        if let Some((drive, rest)) = split_drive(path) {
            return PathBuf::from(join_rooted(&format!("/mnt/{}", drive), &rest));
        }

        for share in [r"\\wsl.localhost\", r"\\wsl$\"] {
            if let Some(rest) = path.strip_prefix(share) {
                // Drop the distro segment, keep the path inside it
                let inner = rest.split_once('\\').map(|(_, p)| p).unwrap_or("");
                return PathBuf::from(format!("/{}", inner.replace('\\', "/")));
            }
        }

        PathBuf::from(path.replace('\\', "/"))
    }

    fn to_host_namespace(&self, workspace_path: &Path) -> PathBuf {
        let raw = workspace_path.to_string_lossy();

        if let Some(rest) = raw.strip_prefix("/mnt/") {
            let mut parts = rest.splitn(2, '/');
            if let Some(drive) = parts.next().filter(|d| {
                d.len() == 1 && d.chars().all(|c| c.is_ascii_alphabetic())
            }) {
                let tail = parts.next().unwrap_or("").replace('/', "\\");
                return PathBuf::from(format!(
                    "{}:\\{}",
                    drive.to_ascii_uppercase(),
                    tail
                ));
            }
        }

        match (&self.distro, raw.strip_prefix('/')) {
            (Some(distro), Some(inner)) => PathBuf::from(format!(
                r"\\wsl.localhost\{}\{}",
                distro,
                inner.replace('/', "\\")
            )),
            _ => workspace_path.to_path_buf(),
        }
    }

    fn to_mount_namespace(&self, host_path: &Path) -> String {
        let raw = host_path.to_string_lossy();
        let path = strip_long_prefix(&raw);

        if let Some(unc) = raw.strip_prefix(r"\\?\UNC\") {
            return format!("//{}", unc.replace('\\', "/"));
        }

        // Docker Desktop form: C:\x -> /c/x
        if let Some((drive, rest)) = split_drive(path) {
            return join_rooted(&format!("/{}", drive), &rest);
        }

        path.replace('\\', "/")
    }

    fn looks_like_workspace_namespace_path(&self, path: &Path) -> bool {
        path.to_string_lossy().starts_with('/')
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_platform_detection() {
        match Platform::detect() {
            Platform::Linux | Platform::MacOS | Platform::Windows | Platform::Wsl => {}
        }
    }

    #[test]
    fn test_platform_from_str() {
        assert_eq!("WSL".parse::<Platform>().unwrap(), Platform::Wsl);
        assert_eq!("darwin".parse::<Platform>().unwrap(), Platform::MacOS);
        assert!("plan9".parse::<Platform>().is_err());
    }

    #[test]
    fn test_native_paths_are_identity() {
        let paths = NativePaths;
        let host = Path::new("/home/dev/project");
        assert_eq!(paths.to_workspace_namespace(host), host);
        assert_eq!(paths.to_host_namespace(host), host);
        assert_eq!(paths.to_mount_namespace(host), "/home/dev/project");
        assert!(paths.looks_like_workspace_namespace_path(host));
        assert!(!paths.looks_like_workspace_namespace_path(Path::new("relative/dir")));
    }

    #[test]
    fn test_wsl_drive_paths() {
        let paths = WslPaths::new(None);
        assert_eq!(
            paths.to_workspace_namespace(Path::new(r"C:\Users\dev\project")),
            PathBuf::from("/mnt/c/Users/dev/project")
        );
        assert_eq!(
            paths.to_workspace_namespace(Path::new(r"D:\")),
            PathBuf::from("/mnt/d")
        );
        assert_eq!(
            paths.to_workspace_namespace(Path::new(r"\\?\E:\very\long\path")),
            PathBuf::from("/mnt/e/very/long/path")
        );
        assert_eq!(
            paths.to_host_namespace(Path::new("/mnt/c/Users/dev/project")),
            PathBuf::from(r"C:\Users\dev\project")
        );
    }

    #[test]
    fn test_wsl_share_paths() {
        let paths = WslPaths::new(Some("Ubuntu".to_string()));
        assert_eq!(
            paths.to_workspace_namespace(Path::new(r"\\wsl.localhost\Ubuntu\home\dev\app")),
            PathBuf::from("/home/dev/app")
        );
        assert_eq!(
            paths.to_workspace_namespace(Path::new(r"\\wsl$\Ubuntu\home\dev\app")),
            PathBuf::from("/home/dev/app")
        );
        assert_eq!(
            paths.to_host_namespace(Path::new("/home/dev/app")),
            PathBuf::from(r"\\wsl.localhost\Ubuntu\home\dev\app")
        );
    }

    #[test]
    fn test_wsl_host_namespace_without_distro_is_unchanged() {
        let paths = WslPaths::new(None);
        assert_eq!(
            paths.to_host_namespace(Path::new("/home/dev/app")),
            PathBuf::from("/home/dev/app")
        );
        // "/mnt/data" is not a drive mount
        assert_eq!(
            paths.to_host_namespace(Path::new("/mnt/data/app")),
            PathBuf::from("/mnt/data/app")
        );
    }

    #[test]
    fn test_wsl_mount_namespace() {
        let paths = WslPaths::new(None);
        assert_eq!(
            paths.to_mount_namespace(Path::new(r"C:\Users\dev\compose.yml")),
            "/c/Users/dev/compose.yml"
        );
        assert_eq!(paths.to_mount_namespace(Path::new(r"C:\")), "/c");
        assert_eq!(
            paths.to_mount_namespace(Path::new(r"\\?\UNC\server\share\folder")),
            "//server/share/folder"
        );
        assert_eq!(
            paths.to_mount_namespace(Path::new("/home/dev/compose.yml")),
            "/home/dev/compose.yml"
        );
    }

    #[test]
    fn test_wsl_namespace_detection() {
        let paths = WslPaths::new(None);
        assert!(paths.looks_like_workspace_namespace_path(Path::new("/mnt/c/x")));
        assert!(!paths.looks_like_workspace_namespace_path(Path::new(r"C:\x")));
    }

    #[test]
    fn test_adapter_selection() {
        let adapter = Platform::Windows.path_adapter(None);
        assert_eq!(
            adapter.to_workspace_namespace(Path::new(r"C:\src")),
            PathBuf::from("/mnt/c/src")
        );
        let adapter = Platform::Linux.path_adapter(None);
        assert_eq!(
            adapter.to_workspace_namespace(Path::new("/src")),
            PathBuf::from("/src")
        );
    }
}
