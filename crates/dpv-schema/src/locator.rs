//! Locations of descriptors and data: local paths or remote URLs

use crate::{DescriptorError, Result};
use reqwest::Url;
use std::fmt;
use std::path::{Path, PathBuf};

/// Where a descriptor or a resource's data lives
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Locator {
    Local(PathBuf),
    Remote(Url),
}

impl Locator {
    /// Parse a path, `file://` URL, or `http(s)://` URL
    ///
    /// # Errors
    ///
    /// Returns [`DescriptorError::InvalidLocator`] for a malformed URL.
    pub fn parse(locator: &str) -> Result<Self> {
        if is_remote(locator) {
            let url = Url::parse(locator)
                .map_err(|e| DescriptorError::InvalidLocator(format!("{locator}: {e}")))?;
            return Ok(Self::Remote(url));
        }

        if locator.starts_with("file://") {
            let path = Url::parse(locator)
                .ok()
                .and_then(|url| url.to_file_path().ok())
                .ok_or_else(|| DescriptorError::InvalidLocator(locator.to_string()))?;
            return Ok(Self::Local(path));
        }

        Ok(Self::Local(PathBuf::from(locator)))
    }

    /// Resolve `relative` against this locator.
    ///
    /// URLs and absolute paths are returned as-is; anything else is taken
    /// relative to the directory (or URL) containing this locator.
    ///
    /// # Errors
    ///
    /// Returns [`DescriptorError::InvalidLocator`] when the joined URL is invalid.
    pub fn join(&self, relative: &str) -> Result<Self> {
        if is_remote(relative) || relative.starts_with("file://") {
            return Self::parse(relative);
        }

        match self {
            Self::Local(base) => {
                let candidate = Path::new(relative);
                if candidate.is_absolute() {
                    return Ok(Self::Local(candidate.to_path_buf()));
                }
                let joined = base
                    .parent()
                    .map_or_else(|| candidate.to_path_buf(), |dir| dir.join(candidate));
                Ok(Self::Local(joined))
            }
            Self::Remote(base) => base
                .join(relative)
                .map(Self::Remote)
                .map_err(|e| DescriptorError::InvalidLocator(format!("{relative}: {e}"))),
        }
    }

    pub fn is_remote(&self) -> bool {
        matches!(self, Self::Remote(_))
    }

    /// Final path segment, if any
    pub fn file_name(&self) -> Option<String> {
        match self {
            Self::Local(path) => path.file_name().map(|n| n.to_string_lossy().into_owned()),
            Self::Remote(url) => url
                .path_segments()
                .and_then(|mut segments| segments.next_back())
                .filter(|segment| !segment.is_empty())
                .map(str::to_string),
        }
    }

    /// Lower-cased extension of the final path segment
    pub fn extension(&self) -> Option<String> {
        let name = self.file_name()?;
        Path::new(&name)
            .extension()
            .map(|ext| ext.to_string_lossy().to_lowercase())
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Local(path) => write!(f, "{}", path.display()),
            Self::Remote(url) => write!(f, "{url}"),
        }
    }
}

impl From<PathBuf> for Locator {
    fn from(path: PathBuf) -> Self {
        Self::Local(path)
    }
}

fn is_remote(locator: &str) -> bool {
    locator.starts_with("http://") || locator.starts_with("https://")
}
