use std::io::{Read, Write};

use super::deserialize_len;

pub const ALIGNMENT: usize = 4;

fn padding_len(src_len: usize) -> usize {
    (ALIGNMENT - (src_len % ALIGNMENT)) % ALIGNMENT
}

pub fn read_padding(src_len: usize, src: &mut impl Read) -> std::io::Result<()> {
    let pad_len = padding_len(src_len);
    if pad_len > 0 {
        let mut padding_buffer: [u8; ALIGNMENT] = Default::default();
        src.read_exact(&mut padding_buffer[..pad_len])?;
    }
    Ok(())
}

pub fn write_padding(src_len: usize, dest: &mut impl Write) -> std::io::Result<()> {
    let pad_len = padding_len(src_len);
    if pad_len > 0 {
        let padding_buffer: [u8; ALIGNMENT] = Default::default();
        dest.write_all(&padding_buffer[..pad_len])?;
    }
    Ok(())
}

pub fn invalid_data(m: &str) -> std::io::Error {
    std::io::Error::new(std::io::ErrorKind::InvalidData, m)
}

/// Reads `opaque<max>`, rejecting lengths above `max` before allocating.
pub fn read_opaque(src: &mut impl Read, max: u32) -> std::io::Result<Vec<u8>> {
    let length = deserialize_len(src)?;
    if length > max as usize {
        return Err(invalid_data(&format!("opaque length {length} exceeds limit {max}")));
    }
    let mut buf = Vec::new();
    src.by_ref().take(length as u64).read_to_end(&mut buf)?;
    if buf.len() != length {
        return Err(std::io::Error::new(
            std::io::ErrorKind::UnexpectedEof,
            "opaque data truncated",
        ));
    }
    read_padding(length, src)?;
    Ok(buf)
}

/// Reads `string<max>`. Non UTF-8 bytes are replaced with U+FFFD.
pub fn read_bounded_string(src: &mut impl Read, max: u32) -> std::io::Result<String> {
    let bytes = read_opaque(src, max)?;
    Ok(match String::from_utf8(bytes) {
        Ok(s) => s,
        Err(e) => String::from_utf8_lossy(e.as_bytes()).into_owned(),
    })
}
