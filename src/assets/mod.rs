//! Asset resolution
//!
//! Maps a logical request path (`"galaga"`, `"mame/xmen"`) to a concrete
//! file under the artwork root. Extensions are tried in priority order
//! against the exact path first; when nothing matches, the containing
//! directory is scanned and the closest file name wins if it is similar
//! enough.

mod media;

pub use media::natural_length;

use std::fs;
use std::path::{Component, Path, PathBuf};
use tracing::{debug, info, warn};

use crate::constants::extensions;
use crate::error::{DisplayError, DisplayResult};

/// What the presentation surface has to do with a file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Image,
    Video,
}

impl MediaKind {
    pub fn from_extension(ext: &str) -> Option<Self> {
        let ext = ext.trim_start_matches('.');
        if extensions::VIDEO.iter().any(|e| e.eq_ignore_ascii_case(ext)) {
            Some(Self::Video)
        } else if extensions::IMAGE.iter().any(|e| e.eq_ignore_ascii_case(ext)) {
            Some(Self::Image)
        } else {
            None
        }
    }
}

/// A resolved, existing asset
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetDescriptor {
    pub full_path: PathBuf,
    pub kind: MediaKind,
}

/// Which extensions a request may resolve to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtensionSet {
    /// Pictures and clips; clips win over stills with the same base name
    Content,
    /// Still images only (marquee, fixed pictures, score background)
    StillImage,
}

impl ExtensionSet {
    pub fn extensions(self) -> Vec<&'static str> {
        match self {
            Self::Content => extensions::VIDEO.iter().chain(extensions::IMAGE).copied().collect(),
            Self::StillImage => extensions::IMAGE.to_vec(),
        }
    }
}

/// Resolves logical paths against the artwork root
#[derive(Debug, Clone)]
pub struct AssetResolver {
    root: PathBuf,
    cutoff: u8,
}

impl AssetResolver {
    pub fn new(root: impl Into<PathBuf>, cutoff: u8) -> Self {
        Self {
            root: root.into(),
            cutoff: cutoff.min(100),
        }
    }

    pub fn resolve_set(&self, logical: &str, set: ExtensionSet) -> DisplayResult<AssetDescriptor> {
        self.resolve(logical, &set.extensions())
    }

    /// Resolve `logical` against `allowed` extensions (priority order, with
    /// or without a leading dot).
    pub fn resolve(&self, logical: &str, allowed: &[&str]) -> DisplayResult<AssetDescriptor> {
        let logical = logical.trim();
        if logical.is_empty() {
            return Err(DisplayError::AssetNotFound { logical: String::new() });
        }
        if !stays_under_root(Path::new(logical)) {
            warn!(logical = %logical, "Asset path leaves the artwork root");
            return Err(DisplayError::UnsupportedAsset {
                path: PathBuf::from(logical),
                reason: "path leaves the artwork root",
            });
        }
        let allowed: Vec<&str> = allowed.iter().map(|e| e.trim_start_matches('.')).collect();

        // Caller already named a file with an allowed extension
        let requested = self.root.join(logical);
        if let Some(ext) = allowed_extension(&requested, &allowed)
            && requested.is_file()
        {
            return described(requested, ext);
        }

        for ext in &allowed {
            let candidate = self.root.join(format!("{logical}.{ext}"));
            if candidate.is_file() {
                debug!(logical = %logical, path = %candidate.display(), "Exact asset match");
                return described(candidate, ext);
            }
        }

        match self.fuzzy_match(&requested, &allowed) {
            Some((path, ext, score)) => {
                info!(logical = %logical, path = %path.display(), score = score, "Using fuzzy asset match");
                described(path, ext)
            }
            None => {
                warn!(logical = %logical, root = %self.root.display(), "Asset not found");
                Err(DisplayError::AssetNotFound { logical: logical.to_string() })
            }
        }
    }

    /// Best-scoring file in the directory of `requested` whose extension is
    /// allowed. Ties go to the higher-priority extension.
    fn fuzzy_match<'a>(&self, requested: &Path, allowed: &[&'a str]) -> Option<(PathBuf, &'a str, u8)> {
        let dir = requested.parent().unwrap_or(&self.root);
        let wanted = match allowed_extension(requested, allowed) {
            Some(_) => requested.file_stem()?,
            None => requested.file_name()?,
        }
        .to_string_lossy()
        .to_lowercase();

        let entries = fs::read_dir(dir)
            .inspect_err(|e| debug!(dir = %dir.display(), error = %e, "Cannot scan directory for fuzzy match"))
            .ok()?;

        let mut best: Option<(PathBuf, &'a str, u8, usize)> = None;
        for entry in entries.flatten() {
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            let Some(ext) = allowed_extension(&path, allowed) else {
                continue;
            };
            let Some(stem) = path.file_stem().map(|s| s.to_string_lossy().to_lowercase()) else {
                continue;
            };
            let score = similarity(&wanted, &stem);
            let priority = allowed.iter().position(|e| *e == ext).unwrap_or(usize::MAX);

            let better = match &best {
                None => true,
                Some((_, _, best_score, best_priority)) => {
                    score > *best_score || (score == *best_score && priority < *best_priority)
                }
            };
            if better {
                best = Some((path, ext, score, priority));
            }
        }

        best.filter(|(_, _, score, _)| *score >= self.cutoff)
            .map(|(path, ext, score, _)| (path, ext, score))
    }

    /// Logical paths (relative to the root, no extension) of every animated
    /// asset under the root. Used by attract mode to pick random clips.
    pub fn animated_catalog(&self) -> Vec<String> {
        let mut found = Vec::new();
        let mut pending = vec![self.root.clone()];

        while let Some(dir) = pending.pop() {
            let Ok(entries) = fs::read_dir(&dir) else {
                debug!(dir = %dir.display(), "Skipping unreadable directory");
                continue;
            };
            for entry in entries.flatten() {
                let path = entry.path();
                if path.is_dir() {
                    pending.push(path);
                    continue;
                }
                let is_video = path
                    .extension()
                    .and_then(|e| e.to_str())
                    .and_then(MediaKind::from_extension)
                    == Some(MediaKind::Video);
                if !is_video || has_disallowed_char(&path) {
                    continue;
                }
                if let Ok(relative) = path.with_extension("").strip_prefix(&self.root) {
                    let logical: Vec<String> = relative
                        .components()
                        .map(|c| c.as_os_str().to_string_lossy().into_owned())
                        .collect();
                    found.push(logical.join("/"));
                }
            }
        }

        found.sort();
        found
    }
}

/// Similarity of two names on a 0-100 scale (normalised Levenshtein)
pub fn similarity(a: &str, b: &str) -> u8 {
    let ratio = strsim::normalized_levenshtein(&a.to_lowercase(), &b.to_lowercase());
    (ratio * 100.0).round().clamp(0.0, 100.0) as u8
}

fn allowed_extension<'a>(path: &Path, allowed: &[&'a str]) -> Option<&'a str> {
    let ext = path.extension()?.to_str()?;
    allowed.iter().copied().find(|a| a.eq_ignore_ascii_case(ext))
}

fn has_disallowed_char(path: &Path) -> bool {
    path.file_name()
        .map(|n| n.to_string_lossy().contains(extensions::DISALLOWED_CHAR))
        .unwrap_or(false)
}

fn described(path: PathBuf, ext: &str) -> DisplayResult<AssetDescriptor> {
    if has_disallowed_char(&path) {
        warn!(path = %path.display(), "Rejecting asset with '&' in its name");
        return Err(DisplayError::UnsupportedAsset {
            path,
            reason: "filename contains '&'",
        });
    }
    let kind = MediaKind::from_extension(ext).ok_or_else(|| DisplayError::UnsupportedAsset {
        path: path.clone(),
        reason: "extension is not a known media type",
    })?;
    Ok(AssetDescriptor { full_path: path, kind })
}

/// Relative, without `..`
fn stays_under_root(logical: &Path) -> bool {
    logical
        .components()
        .all(|c| matches!(c, Component::Normal(_) | Component::CurDir))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn touch(dir: &Path, name: &str) {
        let path = dir.join(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, b"x").unwrap();
    }

    #[test]
    fn test_exact_match_follows_extension_priority() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "galaga.png");
        let resolver = AssetResolver::new(dir.path(), 65);

        let asset = resolver.resolve("galaga", &[".gif", ".png"]).unwrap();
        assert_eq!(asset.full_path, dir.path().join("galaga.png"));
        assert_eq!(asset.kind, MediaKind::Image);
    }

    #[test]
    fn test_video_wins_over_still_with_same_name() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "galaga.png");
        touch(dir.path(), "galaga.gif");
        let resolver = AssetResolver::new(dir.path(), 65);

        let asset = resolver.resolve_set("galaga", ExtensionSet::Content).unwrap();
        assert_eq!(asset.kind, MediaKind::Video);

        let still = resolver.resolve_set("galaga", ExtensionSet::StillImage).unwrap();
        assert_eq!(still.full_path, dir.path().join("galaga.png"));
    }

    #[test]
    fn test_explicit_extension_is_honoured() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "mame/pacman.png");
        touch(dir.path(), "mame/pacman.gif");
        let resolver = AssetResolver::new(dir.path(), 65);

        let asset = resolver.resolve_set("mame/pacman.png", ExtensionSet::Content).unwrap();
        assert_eq!(asset.full_path, dir.path().join("mame/pacman.png"));
    }

    #[test]
    fn test_fuzzy_match_above_cutoff() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "x-men.png");
        touch(dir.path(), "galaga.png");
        let resolver = AssetResolver::new(dir.path(), 65);

        let asset = resolver.resolve("xmen", &[".gif", ".png"]).unwrap();
        assert_eq!(asset.full_path, dir.path().join("x-men.png"));
    }

    #[test]
    fn test_fuzzy_match_below_cutoff_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "galaga.png");
        let resolver = AssetResolver::new(dir.path(), 65);

        let err = resolver.resolve("xmen", &[".gif", ".png"]).unwrap_err();
        assert!(matches!(err, DisplayError::AssetNotFound { .. }));
    }

    #[test]
    fn test_fuzzy_ignores_disallowed_extensions() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "x-men.gif");
        let resolver = AssetResolver::new(dir.path(), 65);

        assert!(resolver.resolve_set("xmen", ExtensionSet::StillImage).is_err());
    }

    #[test]
    fn test_fuzzy_scans_subdirectory() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "mame/dkong.png");
        let resolver = AssetResolver::new(dir.path(), 65);

        let asset = resolver.resolve_set("mame/dkong2", ExtensionSet::Content).unwrap();
        assert_eq!(asset.full_path, dir.path().join("mame/dkong.png"));
    }

    #[test]
    fn test_ampersand_rejected() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "rock&roll.png");
        let resolver = AssetResolver::new(dir.path(), 65);

        let err = resolver.resolve_set("rock&roll", ExtensionSet::Content).unwrap_err();
        assert!(matches!(err, DisplayError::UnsupportedAsset { .. }));
    }

    #[test]
    fn test_paths_outside_root_rejected() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "outside.png");
        touch(dir.path(), "artwork/mame/galaga.png");
        let resolver = AssetResolver::new(dir.path().join("artwork"), 65);

        for logical in ["../outside", "mame/../../outside", "/etc/passwd"] {
            let err = resolver.resolve_set(logical, ExtensionSet::Content).unwrap_err();
            assert!(matches!(err, DisplayError::UnsupportedAsset { .. }), "{logical}");
        }
        let absolute = dir.path().join("outside.png");
        assert!(resolver.resolve_set(absolute.to_str().unwrap(), ExtensionSet::Content).is_err());

        assert!(resolver.resolve_set("./mame/galaga", ExtensionSet::Content).is_ok());
    }

    #[test]
    fn test_empty_path_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let resolver = AssetResolver::new(dir.path(), 65);
        assert!(resolver.resolve_set("  ", ExtensionSet::Content).is_err());
    }

    #[test]
    fn test_similarity_scale() {
        assert_eq!(similarity("galaga", "GALAGA"), 100);
        assert!(similarity("xmen", "x-men") >= 65);
        assert!(similarity("xmen", "galaga") < 65);
    }

    #[test]
    fn test_animated_catalog_lists_clips_only() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "attract.gif");
        touch(dir.path(), "mame/intro.mp4");
        touch(dir.path(), "marquee.png");
        touch(dir.path(), "bad&name.gif");
        let resolver = AssetResolver::new(dir.path(), 65);

        assert_eq!(resolver.animated_catalog(), vec!["attract".to_string(), "mame/intro".to_string()]);
    }
}
