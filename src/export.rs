//! Export list data model.

use std::fmt;

use crate::protocol::xdr::mount::exportnode;

/// One exported directory and the client groups allowed to mount it.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct ExportEntry {
    /// Exported directory on the server, never empty
    pub path: String,
    /// Host names, netgroups or address masks permitted to mount `path`.
    /// Empty means unrestricted or not reported.
    pub allowed_groups: Vec<String>,
}

/// Exports in the order the server reported them.
pub type ExportList = Vec<ExportEntry>;

impl ExportEntry {
    pub fn new(path: impl Into<String>) -> Self {
        Self { path: path.into(), allowed_groups: Vec::new() }
    }

    pub fn with_groups<I, S>(path: impl Into<String>, groups: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self { path: path.into(), allowed_groups: groups.into_iter().map(Into::into).collect() }
    }

    /// The synthetic entry reported when only an NFSv4 root mount succeeded.
    pub fn root() -> Self {
        Self::new("/")
    }

    pub fn is_unrestricted(&self) -> bool {
        self.allowed_groups.is_empty()
    }
}

impl From<exportnode> for ExportEntry {
    fn from(node: exportnode) -> Self {
        Self { path: node.ex_dir, allowed_groups: node.ex_groups }
    }
}

impl From<&ExportEntry> for exportnode {
    fn from(entry: &ExportEntry) -> Self {
        Self { ex_dir: entry.path.clone(), ex_groups: entry.allowed_groups.clone() }
    }
}

/// `showmount -e` style: the path, then the groups separated by commas or
/// `(everyone)` when there are none.
impl fmt::Display for ExportEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.allowed_groups.is_empty() {
            write!(f, "{} (everyone)", self.path)
        } else {
            write!(f, "{} {}", self.path, self.allowed_groups.join(","))
        }
    }
}
