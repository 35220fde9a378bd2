//! XDR (External Data Representation, RFC 4506) encoding used by every ONC RPC
//! message this crate sends or receives.
//!
//! Only the subset of the XDR language needed by the client is implemented:
//! integers, booleans, enumerations, variable-length opaque data, strings,
//! optional data and counted arrays. Rust types stand in for the XDR ones
//! (`u32` for `unsigned int`, `Vec<u8>` for `opaque<>`, `Option<T>` for `*T`),
//! but the wire guarantees of the XDR types still apply: every item is padded
//! to a multiple of four bytes and all integers are big endian.

use std::io::{Read, Write};

use byteorder::BigEndian;
use byteorder::{ReadBytesExt, WriteBytesExt};
use num_traits::{FromPrimitive, ToPrimitive};

pub mod mount;
pub mod nfs4;
pub mod portmap;
pub mod rpc;
mod utils;

pub use utils::{invalid_data, read_bounded_string};

/// XDR assumes big endian encoding.
pub type XDREndian = BigEndian;

/// Values that can be written in XDR form.
pub trait Serialize {
    /// Serializes the value into `dest`.
    fn serialize<W: Write>(&self, dest: &mut W) -> std::io::Result<()>;
}

/// Values that can be read back from XDR form.
pub trait Deserialize {
    /// Overwrites `self` with the value decoded from `src`.
    fn deserialize<R: Read>(&mut self, src: &mut R) -> std::io::Result<()>;
}

/// Decodes a fresh `T` from `src`, starting from `T::default()`.
pub fn deserialize<T>(src: &mut impl Read) -> std::io::Result<T>
where
    T: Deserialize + Default,
{
    let mut val = T::default();
    val.deserialize(src)?;

    Ok(val)
}

/// Marker trait for XDR `enum` serialization.
pub trait SerializeEnum: ToPrimitive {}

/// Enumerations have the same representation as signed integers.
impl<T: SerializeEnum> Serialize for T {
    fn serialize<W: Write>(&self, dest: &mut W) -> std::io::Result<()> {
        match self.to_i32() {
            Some(val) => dest.write_i32::<XDREndian>(val),
            None => Err(invalid_data("enum value does not fit in an XDR int")),
        }
    }
}

/// Marker trait for XDR `enum` deserialization.
pub trait DeserializeEnum: FromPrimitive {}

impl<T: DeserializeEnum> Deserialize for T {
    fn deserialize<R: Read>(&mut self, src: &mut R) -> std::io::Result<()> {
        let raw = src.read_i32::<XDREndian>()?;
        match FromPrimitive::from_i32(raw) {
            Some(val) => {
                *self = val;
                Ok(())
            }
            None => Err(invalid_data(&format!("unknown enum discriminant {raw}"))),
        }
    }
}

/// `bool` is the enum `{ FALSE = 0, TRUE = 1 }`.
impl Serialize for bool {
    fn serialize<W: Write>(&self, dest: &mut W) -> std::io::Result<()> {
        dest.write_u32::<XDREndian>(u32::from(*self))
    }
}

impl Deserialize for bool {
    fn deserialize<R: Read>(&mut self, src: &mut R) -> std::io::Result<()> {
        *self = match src.read_u32::<XDREndian>()? {
            0 => false,
            1 => true,
            other => return Err(invalid_data(&format!("invalid XDR bool {other}"))),
        };
        Ok(())
    }
}

impl Serialize for i32 {
    fn serialize<W: Write>(&self, dest: &mut W) -> std::io::Result<()> {
        dest.write_i32::<XDREndian>(*self)
    }
}

impl Deserialize for i32 {
    fn deserialize<R: Read>(&mut self, src: &mut R) -> std::io::Result<()> {
        *self = src.read_i32::<XDREndian>()?;
        Ok(())
    }
}

impl Serialize for u32 {
    fn serialize<W: Write>(&self, dest: &mut W) -> std::io::Result<()> {
        dest.write_u32::<XDREndian>(*self)
    }
}

impl Deserialize for u32 {
    fn deserialize<R: Read>(&mut self, src: &mut R) -> std::io::Result<()> {
        *self = src.read_u32::<XDREndian>()?;
        Ok(())
    }
}

impl Serialize for u64 {
    fn serialize<W: Write>(&self, dest: &mut W) -> std::io::Result<()> {
        dest.write_u64::<XDREndian>(*self)
    }
}

impl Deserialize for u64 {
    fn deserialize<R: Read>(&mut self, src: &mut R) -> std::io::Result<()> {
        *self = src.read_u64::<XDREndian>()?;
        Ok(())
    }
}

/// XDR `void`: procedures without arguments encode nothing.
impl Serialize for () {
    fn serialize<W: Write>(&self, _dest: &mut W) -> std::io::Result<()> {
        Ok(())
    }
}

/// Lengths travel as `unsigned int`; this converts Rust's `usize` on the way out.
pub(crate) fn serialize_len<W: Write>(len: usize, dest: &mut W) -> std::io::Result<()> {
    let Some(len) = len.to_u32() else {
        return Err(invalid_data("length does not fit in an XDR unsigned int"));
    };
    len.serialize(dest)
}

pub(crate) fn deserialize_len<R: Read>(src: &mut R) -> std::io::Result<usize> {
    match deserialize::<u32>(src)?.to_usize() {
        Some(len) => Ok(len),
        None => Err(invalid_data("XDR length does not fit in usize")),
    }
}

/// Variable-length opaque data: `opaque identifier<>`.
impl Serialize for [u8] {
    fn serialize<W: Write>(&self, dest: &mut W) -> std::io::Result<()> {
        serialize_len(self.len(), dest)?;
        dest.write_all(self)?;
        utils::write_padding(self.len(), dest)
    }
}

impl Deserialize for Vec<u8> {
    fn deserialize<R: Read>(&mut self, src: &mut R) -> std::io::Result<()> {
        *self = utils::read_opaque(src, u32::MAX)?;
        Ok(())
    }
}

impl Serialize for str {
    fn serialize<W: Write>(&self, dest: &mut W) -> std::io::Result<()> {
        self.as_bytes().serialize(dest)
    }
}

impl Serialize for String {
    fn serialize<W: Write>(&self, dest: &mut W) -> std::io::Result<()> {
        self.as_str().serialize(dest)
    }
}

/// Strings are decoded as UTF-8; invalid sequences are replaced rather than
/// rejected since export paths are raw bytes on most servers.
impl Deserialize for String {
    fn deserialize<R: Read>(&mut self, src: &mut R) -> std::io::Result<()> {
        *self = read_bounded_string(src, u32::MAX)?;
        Ok(())
    }
}

/// Counted arrays: `T identifier<>`.
impl<T: Serialize> Serialize for [T] {
    fn serialize<W: Write>(&self, dest: &mut W) -> std::io::Result<()> {
        serialize_len(self.len(), dest)?;
        for item in self {
            item.serialize(dest)?;
        }
        Ok(())
    }
}

impl<T: Deserialize + Default> Deserialize for Vec<T> {
    fn deserialize<R: Read>(&mut self, src: &mut R) -> std::io::Result<()> {
        let length = deserialize_len(src)?;
        self.clear();
        // The count comes from the peer; let the reader run dry instead of
        // reserving whatever it claims.
        for _ in 0..length {
            self.push(deserialize::<T>(src)?);
        }
        Ok(())
    }
}

/// Optional data: `T *identifier`, a bool followed by the value when TRUE.
impl<T: Serialize> Serialize for Option<T> {
    fn serialize<W: Write>(&self, dest: &mut W) -> std::io::Result<()> {
        match self {
            Some(data) => {
                true.serialize(dest)?;
                data.serialize(dest)
            }
            None => false.serialize(dest),
        }
    }
}

impl<T: Deserialize + Default> Deserialize for Option<T> {
    fn deserialize<R: Read>(&mut self, src: &mut R) -> std::io::Result<()> {
        *self = if deserialize::<bool>(src)? { Some(deserialize::<T>(src)?) } else { None };
        Ok(())
    }
}

/// Implements [`Serialize`] for a struct by writing each field in order.
#[allow(non_camel_case_types)]
#[macro_export]
macro_rules! SerializeStruct {
    (
        $t:ident,
        $($element:ident),*
    ) => {
        impl Serialize for $t {
            fn serialize<W: Write>(&self, dest: &mut W) -> std::io::Result<()> {
                $(self.$element.serialize(dest)?;)*
                Ok(())
            }
        }
    };
}

/// Implements [`Deserialize`] for a struct by reading each field in order.
#[allow(non_camel_case_types)]
#[macro_export]
macro_rules! DeserializeStruct {
    (
        $t:ident,
        $($element:ident),*
    ) => {
        impl Deserialize for $t {
            fn deserialize<R: Read>(&mut self, src: &mut R) -> std::io::Result<()> {
                $(self.$element.deserialize(src)?;)*
                Ok(())
            }
        }
    };
}

pub use crate::DeserializeStruct;
pub use crate::SerializeStruct;
