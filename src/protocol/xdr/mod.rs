//! XDR (RFC 1832), the data representation every ONC/RPC message uses.
//!
//! <https://datatracker.ietf.org/doc/html/rfc1832>
//!
//! XDR types map onto Rust types: `int` is `i32`, `unsigned hyper` is `u64`,
//! `opaque<>` is `Vec<u8>`, `string<>` is `String`, `T<>` is `Vec<T>` and
//! `T *` is `Option<T>`. Structures implement the traits field by field with
//! [`SerializeStruct!`] and [`DeserializeStruct!`], enumerations through
//! [`SerializeEnum`] and [`DeserializeEnum`].
//!
//! Every item is big endian and padded with zero bytes to a multiple of
//! [`ALIGNMENT`]. The traits work on any [`Write`] and [`Read`]. The codecs
//! bound to a transport live in [`datagram`] (one message per datagram) and
//! [`record`] (RFC 1831 record marking over streams). Both report running
//! past the end of their buffer as an [`XdrError`].

use std::io::{self, Read, Write};

use byteorder::BigEndian;
use byteorder::{ReadBytesExt, WriteBytesExt};
use num_traits::{FromPrimitive, ToPrimitive};

pub mod buffer;
pub mod datagram;
pub mod portmap;
pub mod record;
pub mod rpc;
mod utils;

pub use buffer::{DecodeBuffer, EncodeBuffer, XdrError};
pub use utils::{invalid_data, padding_len, ALIGNMENT};

/// Byte order of every XDR item.
pub type XDREndian = BigEndian;

/// A value that can be written in XDR form.
pub trait Serialize {
    fn serialize<W: Write>(&self, dest: &mut W) -> io::Result<()>;
}

/// A value that can be read back from its XDR form.
///
/// Decoding overwrites `self`. Types that also implement [`Default`] can be
/// decoded into a fresh value with [`deserialize`].
pub trait Deserialize {
    fn deserialize<R: Read>(&mut self, src: &mut R) -> io::Result<()>;
}

/// Decodes a new `T` from `src`.
pub fn deserialize<T>(src: &mut impl Read) -> io::Result<T>
where
    T: Deserialize + Default,
{
    let mut val = T::default();
    val.deserialize(src)?;
    Ok(val)
}

/// XDR `enum`, written as the `i32` value of the variant.
pub trait SerializeEnum: ToPrimitive {}

impl<T: SerializeEnum> Serialize for T {
    fn serialize<W: Write>(&self, dest: &mut W) -> io::Result<()> {
        let val = self.to_i32().ok_or_else(|| invalid_data("Invalid enum value"))?;
        dest.write_i32::<XDREndian>(val)
    }
}

/// XDR `enum`, read as an `i32` that must name a variant.
pub trait DeserializeEnum: FromPrimitive {}

impl<T: DeserializeEnum> Deserialize for T {
    fn deserialize<R: Read>(&mut self, src: &mut R) -> io::Result<()> {
        let val = src.read_i32::<XDREndian>()?;
        *self = T::from_i32(val)
            .ok_or_else(|| invalid_data(&format!("Invalid enum value {val}")))?;
        Ok(())
    }
}

/// XDR `void`. Argument or result of procedures without data, like the
/// NULL procedure every program has.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct Void;

impl Serialize for Void {
    fn serialize<W: Write>(&self, _: &mut W) -> io::Result<()> {
        Ok(())
    }
}

impl Deserialize for Void {
    fn deserialize<R: Read>(&mut self, _: &mut R) -> io::Result<()> {
        Ok(())
    }
}

/// XDR `bool`, the enumeration `{ FALSE = 0, TRUE = 1 }`.
impl Serialize for bool {
    fn serialize<W: Write>(&self, dest: &mut W) -> io::Result<()> {
        dest.write_i32::<XDREndian>(i32::from(*self))
    }
}

impl Deserialize for bool {
    fn deserialize<R: Read>(&mut self, src: &mut R) -> io::Result<()> {
        *self = match src.read_i32::<XDREndian>()? {
            0 => false,
            1 => true,
            other => return Err(invalid_data(&format!("Invalid bool value {other}"))),
        };
        Ok(())
    }
}

macro_rules! fixed_size {
    ($($t:ty: $write:ident, $read:ident, $name:literal;)*) => {$(
        #[doc = concat!("XDR `", $name, "`.")]
        impl Serialize for $t {
            fn serialize<W: Write>(&self, dest: &mut W) -> io::Result<()> {
                dest.$write::<XDREndian>(*self)
            }
        }

        impl Deserialize for $t {
            fn deserialize<R: Read>(&mut self, src: &mut R) -> io::Result<()> {
                *self = src.$read::<XDREndian>()?;
                Ok(())
            }
        }
    )*};
}

fixed_size! {
    i32: write_i32, read_i32, "int";
    u32: write_u32, read_u32, "unsigned int";
    i64: write_i64, read_i64, "hyper";
    u64: write_u64, read_u64, "unsigned hyper";
    f32: write_f32, read_f32, "float";
    f64: write_f64, read_f64, "double";
}

/// Writes the `unsigned int` count in front of variable-length data.
fn write_length<W: Write>(length: usize, dest: &mut W) -> io::Result<()> {
    let length = u32::try_from(length)
        .map_err(|_| invalid_data(&format!("length {length} does not fit XDR")))?;
    length.serialize(dest)
}

fn read_length<R: Read>(src: &mut R) -> io::Result<usize> {
    let length = deserialize::<u32>(src)?;
    length.to_usize().ok_or_else(|| invalid_data(&format!("length {length} does not fit usize")))
}

/// XDR `opaque[n]`: the bytes and their padding, no length.
impl<const N: usize> Serialize for [u8; N] {
    fn serialize<W: Write>(&self, dest: &mut W) -> io::Result<()> {
        dest.write_all(self)?;
        utils::write_padding(N, dest)
    }
}

impl<const N: usize> Deserialize for [u8; N] {
    fn deserialize<R: Read>(&mut self, src: &mut R) -> io::Result<()> {
        src.read_exact(self)?;
        utils::read_padding(N, src)
    }
}

/// XDR `opaque<>`: length, bytes, padding.
impl Serialize for [u8] {
    fn serialize<W: Write>(&self, dest: &mut W) -> io::Result<()> {
        write_length(self.len(), dest)?;
        dest.write_all(self)?;
        utils::write_padding(self.len(), dest)
    }
}

impl Serialize for Vec<u8> {
    fn serialize<W: Write>(&self, dest: &mut W) -> io::Result<()> {
        self.as_slice().serialize(dest)
    }
}

/// Never allocates more than the source actually holds, whatever the
/// declared length.
impl Deserialize for Vec<u8> {
    fn deserialize<R: Read>(&mut self, src: &mut R) -> io::Result<()> {
        let length = read_length(src)?;
        self.clear();
        src.by_ref().take(length as u64).read_to_end(self)?;
        if self.len() != length {
            self.clear();
            return Err(XdrError::BufferUnderflow.into());
        }
        utils::read_padding(length, src)
    }
}

/// XDR `string<>`, restricted to ASCII.
impl Serialize for str {
    fn serialize<W: Write>(&self, dest: &mut W) -> io::Result<()> {
        if !self.is_ascii() {
            return Err(invalid_data("Not ASCII string"));
        }
        self.as_bytes().serialize(dest)
    }
}

impl Serialize for String {
    fn serialize<W: Write>(&self, dest: &mut W) -> io::Result<()> {
        self.as_str().serialize(dest)
    }
}

impl Deserialize for String {
    fn deserialize<R: Read>(&mut self, src: &mut R) -> io::Result<()> {
        let bytes = deserialize::<Vec<u8>>(src)?;
        self.clear();
        if !bytes.is_ascii() {
            return Err(invalid_data("Not ASCII string"));
        }
        // ASCII is valid UTF-8.
        self.extend(bytes.into_iter().map(char::from));
        Ok(())
    }
}

/// XDR fixed-length array `T[n]`: the elements, no count.
impl<const N: usize, T: Serialize> Serialize for [T; N] {
    fn serialize<W: Write>(&self, dest: &mut W) -> io::Result<()> {
        self.iter().try_for_each(|item| item.serialize(dest))
    }
}

impl<const N: usize, T: Deserialize> Deserialize for [T; N] {
    fn deserialize<R: Read>(&mut self, src: &mut R) -> io::Result<()> {
        self.iter_mut().try_for_each(|item| item.deserialize(src))
    }
}

/// XDR variable-length array `T<>`: count, then the elements.
impl<T: Serialize> Serialize for [T] {
    fn serialize<W: Write>(&self, dest: &mut W) -> io::Result<()> {
        write_length(self.len(), dest)?;
        self.iter().try_for_each(|item| item.serialize(dest))
    }
}

impl<T: Serialize> Serialize for Vec<T> {
    fn serialize<W: Write>(&self, dest: &mut W) -> io::Result<()> {
        self.as_slice().serialize(dest)
    }
}

/// Elements are pushed as they decode; a bogus count runs into the end of
/// the source instead of a huge reservation.
impl<T: Deserialize + Default> Deserialize for Vec<T> {
    fn deserialize<R: Read>(&mut self, src: &mut R) -> io::Result<()> {
        let length = read_length(src)?;
        self.clear();
        for _ in 0..length {
            self.push(deserialize::<T>(src)?);
        }
        Ok(())
    }
}

/// XDR optional data `T *`: a `bool` saying whether the value follows.
impl<T: Serialize> Serialize for Option<T> {
    fn serialize<W: Write>(&self, dest: &mut W) -> io::Result<()> {
        self.is_some().serialize(dest)?;
        match self {
            Some(data) => data.serialize(dest),
            None => Ok(()),
        }
    }
}

impl<T: Deserialize + Default> Deserialize for Option<T> {
    fn deserialize<R: Read>(&mut self, src: &mut R) -> io::Result<()> {
        *self = match deserialize::<bool>(src)? {
            true => Some(deserialize::<T>(src)?),
            false => None,
        };
        Ok(())
    }
}

/// Implements [`Serialize`] for a struct by writing the listed fields in
/// order.
///
/// ```text
/// SerializeStruct!(mapping, prog, vers, prot, port);
/// ```
#[allow(non_camel_case_types)]
#[macro_export]
macro_rules! SerializeStruct {
    (
        $t:ident,
        $($element:ident),*
    ) => {
        impl $crate::xdr::Serialize for $t {
            fn serialize<W: std::io::Write>(&self, dest: &mut W) -> std::io::Result<()> {
                $(self.$element.serialize(dest)?;)*
                Ok(())
            }
        }
    };
}

/// Implements [`Deserialize`] for a struct by reading the listed fields in
/// order.
#[allow(non_camel_case_types)]
#[macro_export]
macro_rules! DeserializeStruct {
    (
        $t:ident,
        $($element:ident),*
    ) => {
        impl $crate::xdr::Deserialize for $t {
            fn deserialize<R: std::io::Read>(&mut self, src: &mut R) -> std::io::Result<()> {
                $(self.$element.deserialize(src)?;)*
                Ok(())
            }
        }
    };
}

pub use crate::DeserializeStruct;
pub use crate::SerializeStruct;
