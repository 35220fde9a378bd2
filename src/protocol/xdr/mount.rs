//! `MOUNT` protocol (RFC 1813 Appendix I, RFC 1094 Appendix A) wire types.
//!
//! Only what export discovery needs is defined here: the program and
//! procedure numbers and the `exports`/`groups` linked
//! lists returned by `MOUNTPROC_EXPORT`. The EXPORT procedure has the same
//! number and result encoding in versions 1, 2 and 3.

// Keep RFC naming conventions
#![allow(non_camel_case_types)]

use std::io::{Read, Write};

use num_derive::{FromPrimitive, ToPrimitive};

use super::*;

/// MOUNT program number for RPC
pub const PROGRAM: u32 = 100005;
/// MOUNT protocol version used by default
pub const VERSION: u32 = 3;
/// Oldest MOUNT version that has the EXPORT procedure
pub const MIN_VERSION: u32 = 1;

/// Maximum bytes in a path name
pub const MNTPATHLEN: u32 = 1024;
/// Maximum bytes in a name
pub const MNTNAMLEN: u32 = 255;

/// Procedure numbers of the `MOUNT` program
#[allow(clippy::upper_case_acronyms)]
#[derive(Copy, Clone, Debug, PartialEq, Eq, FromPrimitive, ToPrimitive)]
pub enum MountProgram {
    MOUNTPROC_NULL = 0,
    MOUNTPROC_MNT = 1,
    MOUNTPROC_DUMP = 2,
    MOUNTPROC_UMNT = 3,
    MOUNTPROC_UMNTALL = 4,
    MOUNTPROC_EXPORT = 5,
}
impl SerializeEnum for MountProgram {}
impl DeserializeEnum for MountProgram {}

/// One node of the `exports` list.
///
/// ```text
/// struct exportnode {
///     dirpath ex_dir;
///     groups  ex_groups;
///     exports ex_next;
/// };
/// ```
///
/// `ex_next` is not stored; [`exports`] flattens the chain into a vector.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct exportnode {
    pub ex_dir: String,
    /// Flattened `groups` chain of `name<MNTNAMLEN>`
    pub ex_groups: Vec<String>,
}

/// The `exports` linked list, i.e. the result of `MOUNTPROC_EXPORT`.
///
/// On the wire each node is preceded by a TRUE "value follows" flag and the
/// list ends with FALSE. The groups of each node use the same scheme.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct exports(pub Vec<exportnode>);

impl Serialize for exports {
    fn serialize<W: Write>(&self, dest: &mut W) -> std::io::Result<()> {
        for node in &self.0 {
            true.serialize(dest)?;
            node.ex_dir.serialize(dest)?;
            for group in &node.ex_groups {
                true.serialize(dest)?;
                group.serialize(dest)?;
            }
            false.serialize(dest)?;
        }
        false.serialize(dest)
    }
}

impl Deserialize for exports {
    fn deserialize<R: Read>(&mut self, src: &mut R) -> std::io::Result<()> {
        self.0.clear();
        // Walk the chains iteratively; a long list must not grow the stack.
        while deserialize::<bool>(src)? {
            let ex_dir = read_bounded_string(src, MNTPATHLEN)?;
            let mut ex_groups = Vec::new();
            while deserialize::<bool>(src)? {
                ex_groups.push(read_bounded_string(src, MNTNAMLEN)?);
            }
            self.0.push(exportnode { ex_dir, ex_groups });
        }
        Ok(())
    }
}
