//! Various utilities shared by the engine crates

use byteorder::{NativeEndian, WriteBytesExt};
use std::io::Cursor;
use std::mem;

mod pool;
pub use pool::*;

mod arc_pool;
pub use arc_pool::*;

mod result_ext;
pub use result_ext::AnyhowResultExt;

pub type AnyResult<T = (), E = anyhow::Error> = anyhow::Result<T, E>;

/// Shorthand for `Ok(())`, cause it looks ugly
pub const fn ok<E>() -> Result<(), E> {
    Ok(())
}

/// Packs a float slice into native endian bytes, ready for a buffer upload.
///
/// ## Example
/// ```
/// use vesper_utils::pack_floats;
/// assert_eq!(pack_floats(&[1.0, 2.0]).len(), 8);
/// ```
pub fn pack_floats(buffer: &[f32]) -> Vec<u8> {
    let mut result = Vec::with_capacity(buffer.len() * mem::size_of::<f32>());
    let mut cursor = Cursor::new(&mut result);

    for &value in buffer {
        cursor
            .write_f32::<NativeEndian>(value)
            .expect("writing into a Vec can't fail");
    }

    result
}

/// Reads back floats packed by [`pack_floats`]. Trailing bytes are ignored.
pub fn unpack_floats(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(mem::size_of::<f32>())
        .map(|chunk| f32::from_ne_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn floats_survive_packing() {
        let values = [0.5, -3.25, 1024.0];
        assert_eq!(unpack_floats(&pack_floats(&values)), values);
    }

    #[test]
    fn floats_are_packed_in_native_order() {
        let packed = pack_floats(&[1.0, -2.0]);
        assert_eq!(&packed[..4], 1.0f32.to_ne_bytes());
        assert_eq!(&packed[4..], (-2.0f32).to_ne_bytes());
    }
}
