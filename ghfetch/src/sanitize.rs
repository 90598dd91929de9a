//! Path containment checks for archive members and output names.

use std::path::{Component, Path, PathBuf};

/// Why a member path was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Escape {
    /// The path is absolute or carries a drive/UNC prefix.
    Absolute,
    /// A `..` component climbs above the root.
    Traversal,
}

impl Escape {
    pub fn reason(self) -> &'static str {
        match self {
            Escape::Absolute => "has an absolute path",
            Escape::Traversal => "resolves outside the extraction directory",
        }
    }
}

/// Lexically normalize a relative member path.
///
/// `.` components are dropped and `..` pops the previous component. The
/// result may be empty (for entries such as `./`). Popping past the start
/// is an escape, as is any root or prefix component.
pub fn normalize_member(member: &Path) -> Result<PathBuf, Escape> {
    let mut parts: Vec<&std::ffi::OsStr> = Vec::new();

    for component in member.components() {
        match component {
            Component::Normal(part) => parts.push(part),
            Component::CurDir => {}
            Component::ParentDir => {
                if parts.pop().is_none() {
                    return Err(Escape::Traversal);
                }
            }
            Component::RootDir | Component::Prefix(_) => return Err(Escape::Absolute),
        }
    }

    Ok(parts.iter().collect())
}

/// Join `member` onto `root` and verify the result stays beneath it.
///
/// The check compares path components, so `/out/scratch-evil` is not
/// mistaken for a child of `/out/scratch`.
pub fn contained_join(root: &Path, member: &Path) -> Result<PathBuf, Escape> {
    let relative = normalize_member(member)?;
    let joined = root.join(&relative);
    if !joined.starts_with(root) {
        return Err(Escape::Traversal);
    }
    Ok(joined)
}

/// Resolve a link target the way the filesystem would, relative to the
/// directory that holds the link, and verify it stays beneath `root`.
pub fn contained_link_target(root: &Path, link: &Path, target: &Path) -> Result<PathBuf, Escape> {
    if target.has_root() || matches!(target.components().next(), Some(Component::Prefix(_))) {
        return Err(Escape::Absolute);
    }
    let link = normalize_member(link)?;
    let base = link.parent().unwrap_or_else(|| Path::new(""));
    contained_join(root, &base.join(target))
}

/// True when `name` is exactly one normal path component.
pub fn is_single_component(name: &str) -> bool {
    let mut components = Path::new(name).components();
    matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(part)), None) if part == name
    )
}
