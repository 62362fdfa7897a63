//! Change events, batches and root path sets.

use std::fmt;
use std::path::{Path, PathBuf};

use bitflags::bitflags;

use super::error::ConfigError;

bitflags! {
    /// What happened to a path. Sources may set several flags on one event.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct ChangeKind: u32 {
        const CREATED   = 0b0000_0001;
        const REMOVED   = 0b0000_0010;
        const RENAMED   = 0b0000_0100;
        const MODIFIED  = 0b0000_1000;
        const METADATA  = 0b0001_0000;
        const ACCESSED  = 0b0010_0000;
        /// The source dropped events; the subtree must be rescanned.
        const MUST_SCAN = 0b0100_0000;
        const OTHER     = 0b1000_0000;
    }
}

impl ChangeKind {
    pub fn created(self) -> bool {
        self.contains(Self::CREATED)
    }

    pub fn removed(self) -> bool {
        self.contains(Self::REMOVED)
    }

    pub fn renamed(self) -> bool {
        self.contains(Self::RENAMED)
    }

    pub fn modified(self) -> bool {
        self.contains(Self::MODIFIED)
    }

    pub fn metadata_changed(self) -> bool {
        self.contains(Self::METADATA)
    }
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (name, _) in self.iter_names() {
            if !first {
                f.write_str(" ")?;
            }
            f.write_str(name)?;
            first = false;
        }
        Ok(())
    }
}

/// One raw notification from an event source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeEvent {
    path: PathBuf,
    flags: ChangeKind,
}

impl ChangeEvent {
    pub fn new(path: impl Into<PathBuf>, flags: ChangeKind) -> Self {
        Self {
            path: path.into(),
            flags,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn flags(&self) -> ChangeKind {
        self.flags
    }

    pub fn into_parts(self) -> (PathBuf, ChangeKind) {
        (self.path, self.flags)
    }
}

impl fmt::Display for ChangeEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<{}", self.path.display())?;
        if !self.flags.is_empty() {
            write!(f, " {}", self.flags)?;
        }
        write!(f, " ({:#x})>", self.flags.bits())
    }
}

/// Events accumulated during one delivery cycle, in arrival order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventBatch {
    events: Vec<ChangeEvent>,
}

impl EventBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, event: ChangeEvent) {
        self.events.push(event);
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn paths(&self) -> impl Iterator<Item = &Path> {
        self.events.iter().map(ChangeEvent::path)
    }

    pub fn flags(&self) -> impl Iterator<Item = ChangeKind> + '_ {
        self.events.iter().map(ChangeEvent::flags)
    }

    /// Split into index-aligned path and flag sequences.
    pub fn into_parts(self) -> (Vec<PathBuf>, Vec<ChangeKind>) {
        self.events.into_iter().map(ChangeEvent::into_parts).unzip()
    }
}

/// The ordered, non-empty set of roots a monitor watches.
///
/// Roots are not checked for existence; an unresolvable root surfaces
/// when the event source is activated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RootPathSet {
    roots: Vec<PathBuf>,
}

impl RootPathSet {
    pub fn new<I, P>(roots: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        let roots: Vec<PathBuf> = roots.into_iter().map(Into::into).collect();
        if roots.is_empty() {
            return Err(ConfigError::EmptyPathSet);
        }
        Ok(Self { roots })
    }

    pub fn single(root: impl Into<PathBuf>) -> Self {
        Self {
            roots: vec![root.into()],
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Path> {
        self.roots.iter().map(PathBuf::as_path)
    }

    pub fn len(&self) -> usize {
        self.roots.len()
    }

    /// Always false for a constructed set.
    pub fn is_empty(&self) -> bool {
        self.roots.is_empty()
    }

    /// Components between the first root containing `path` and `path` itself.
    ///
    /// The root itself has depth 0, its direct children depth 1. Returns
    /// `None` when `path` is under none of the roots.
    pub fn depth_of(&self, path: &Path) -> Option<usize> {
        self.roots
            .iter()
            .find_map(|root| path.strip_prefix(root).ok())
            .map(|rest| rest.components().count())
    }
}

impl<'a> IntoIterator for &'a RootPathSet {
    type Item = &'a PathBuf;
    type IntoIter = std::slice::Iter<'a, PathBuf>;

    fn into_iter(self) -> Self::IntoIter {
        self.roots.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_root_set_is_rejected() {
        let roots: Vec<PathBuf> = Vec::new();
        assert_eq!(RootPathSet::new(roots), Err(ConfigError::EmptyPathSet));
    }

    #[test]
    fn test_root_set_keeps_order_and_skips_existence_checks() {
        let roots = RootPathSet::new(["/does/not/exist", "/tmp/watched"]).unwrap();
        let collected: Vec<&Path> = roots.iter().collect();
        assert_eq!(
            collected,
            vec![Path::new("/does/not/exist"), Path::new("/tmp/watched")]
        );
        assert_eq!(roots.len(), 2);
    }

    #[test]
    fn test_depth_of() {
        let roots = RootPathSet::new(["/tmp/watched", "/var/data"]).unwrap();
        assert_eq!(roots.depth_of(Path::new("/tmp/watched")), Some(0));
        assert_eq!(roots.depth_of(Path::new("/tmp/watched/a.txt")), Some(1));
        assert_eq!(roots.depth_of(Path::new("/var/data/x/y/z.bin")), Some(3));
        assert_eq!(roots.depth_of(Path::new("/tmp/watchedness/a.txt")), None);
        assert_eq!(roots.depth_of(Path::new("/etc/hosts")), None);
    }

    #[test]
    fn test_change_kind_predicates() {
        let flags = ChangeKind::CREATED | ChangeKind::MODIFIED;
        assert!(flags.created());
        assert!(flags.modified());
        assert!(!flags.removed());
        assert!(!flags.renamed());
        assert!(!flags.metadata_changed());
        assert!(ChangeKind::METADATA.metadata_changed());
    }

    #[test]
    fn test_event_display() {
        let event = ChangeEvent::new("/tmp/a.txt", ChangeKind::CREATED | ChangeKind::MODIFIED);
        assert_eq!(event.to_string(), "</tmp/a.txt CREATED MODIFIED (0x9)>");

        let bare = ChangeEvent::new("/tmp/b", ChangeKind::empty());
        assert_eq!(bare.to_string(), "</tmp/b (0x0)>");
    }

    #[test]
    fn test_batch_into_parts_is_index_aligned() {
        let mut batch = EventBatch::new();
        batch.push(ChangeEvent::new("/w/a", ChangeKind::MODIFIED));
        batch.push(ChangeEvent::new("/w/b", ChangeKind::REMOVED));
        batch.push(ChangeEvent::new("/w/a", ChangeKind::METADATA));

        let (paths, flags) = batch.into_parts();
        assert_eq!(
            paths,
            vec![
                PathBuf::from("/w/a"),
                PathBuf::from("/w/b"),
                PathBuf::from("/w/a")
            ]
        );
        assert_eq!(
            flags,
            vec![ChangeKind::MODIFIED, ChangeKind::REMOVED, ChangeKind::METADATA]
        );
    }
}
