//! Binary tensor formats.
//!
//! Two layouts are supported, both little-endian:
//!
//! - **Single tensor**: `ndim:u8, dims:[i32; ndim], count:i64, strides:[i64; ndim]`
//!   followed by the f32 payload. One file holds one tensor.
//! - **TBF1 container**: magic `TBF1`, `count:u64`, then per entry
//!   `name_len:u16, name, dtype:u8, ndim:u8, dims:[u32; ndim], offset:u64, nbytes:u64`.
//!   Payloads live at absolute `offset`.

use crate::errors::{MiniLmError, Result};
use crate::model::tensor::{checked_numel, payload_bytes, Tensor, MAX_RANK};
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::{self, Cursor, Read, Write};
use std::path::Path;
use tracing::{debug, warn};

/// Container magic: "TBF1".
const TBF_MAGIC: &[u8; 4] = b"TBF1";

/// Container dtype code for float32. Other codes (f16, f64, ints) are not loadable.
const DTYPE_F32: u8 = 1;

/// Smallest possible container entry header: name_len, dtype, ndim, one dim, offset, nbytes.
const MIN_ENTRY_HEADER: u64 = 2 + 1 + 1 + 4 + 8 + 8;

/// How the 8-byte count field of a single-tensor file is written.
///
/// Both interpretations occur in real fixture files; the reader accepts either.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CountUnit {
    Elements,
    Bytes,
}

fn truncated(what: &str) -> impl Fn(io::Error) -> MiniLmError + '_ {
    move |e| {
        if e.kind() == io::ErrorKind::UnexpectedEof {
            MiniLmError::Format(format!("truncated {}", what))
        } else {
            MiniLmError::Format(format!("reading {}: {}", what, e))
        }
    }
}

/// Decide whether `count` is an element or byte count by matching it against the dims.
fn payload_elements(count: i64, numel: usize) -> Result<usize> {
    if count < 0 {
        return Err(MiniLmError::Format(format!("negative count field {}", count)));
    }
    let count = count as u64;
    let bytes = payload_bytes(numel)?;
    if count == numel as u64 || count == bytes {
        Ok(numel)
    } else {
        Err(MiniLmError::Format(format!(
            "count field {} matches neither element count {} nor byte count {}",
            count, numel, bytes
        )))
    }
}

/// Parse one single-tensor record. `remaining` is the number of bytes left in the source.
pub fn read_tensor<R: Read>(r: &mut R, remaining: u64) -> Result<Tensor> {
    let ndim = r.read_u8().map_err(truncated("tensor header"))? as usize;
    if ndim == 0 || ndim > MAX_RANK {
        return Err(MiniLmError::Format(format!(
            "ndim {} outside [1, {}]",
            ndim, MAX_RANK
        )));
    }
    let mut dims = Vec::with_capacity(ndim);
    for _ in 0..ndim {
        let d = r.read_i32::<LittleEndian>().map_err(truncated("dims"))?;
        if d <= 0 {
            return Err(MiniLmError::Format(format!(
                "dimension {} must be positive",
                d
            )));
        }
        dims.push(d as u32);
    }
    let count = r.read_i64::<LittleEndian>().map_err(truncated("count"))?;
    let mut strides = vec![0i64; ndim];
    for s in strides.iter_mut() {
        *s = r.read_i64::<LittleEndian>().map_err(truncated("strides"))?;
    }

    let elements = payload_elements(count, checked_numel(&dims)?)?;
    let header_len = 1 + 4 * ndim as u64 + 8 + 8 * ndim as u64;
    let available = remaining.saturating_sub(header_len);
    let payload_len = payload_bytes(elements)?;
    if payload_len > available {
        return Err(MiniLmError::Format(format!(
            "payload of {} bytes declared but only {} remain",
            payload_len, available
        )));
    }

    let mut data = vec![0f32; elements];
    r.read_f32_into::<LittleEndian>(&mut data)
        .map_err(truncated("payload"))?;
    Tensor::from_strided(dims, &strides, data)
}

/// Load a single-tensor file.
pub fn load_tensor_file(path: impl AsRef<Path>) -> Result<Tensor> {
    let path = path.as_ref();
    let bytes = std::fs::read(path).map_err(|e| MiniLmError::resource(path, e))?;
    let len = bytes.len() as u64;
    let mut cursor = Cursor::new(bytes);
    let tensor = read_tensor(&mut cursor, len).map_err(|e| match e {
        MiniLmError::Format(msg) => MiniLmError::Format(format!("{}: {}", path.display(), msg)),
        other => other,
    })?;
    let trailing = len - cursor.position();
    if trailing > 0 {
        warn!(path = %path.display(), trailing, "ignoring trailing bytes after tensor payload");
    }
    Ok(tensor)
}

fn invalid_input(msg: String) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidInput, msg)
}

/// Write one single-tensor record.
pub fn write_tensor<W: Write>(w: &mut W, tensor: &Tensor, unit: CountUnit) -> io::Result<()> {
    let ndim = u8::try_from(tensor.dims().len())
        .map_err(|_| invalid_input(format!("rank {} too large", tensor.dims().len())))?;
    let mut dims = Vec::with_capacity(tensor.dims().len());
    for &d in tensor.dims() {
        dims.push(
            i32::try_from(d)
                .map_err(|_| invalid_input(format!("dimension {} exceeds i32", d)))?,
        );
    }
    w.write_u8(ndim)?;
    for d in dims {
        w.write_i32::<LittleEndian>(d)?;
    }
    let count = match unit {
        CountUnit::Elements => tensor.numel() as i64,
        CountUnit::Bytes => tensor.numel() as i64 * 4,
    };
    w.write_i64::<LittleEndian>(count)?;
    for &s in tensor.strides() {
        w.write_i64::<LittleEndian>(s)?;
    }
    for &f in tensor.data() {
        w.write_f32::<LittleEndian>(f)?;
    }
    Ok(())
}

/// Write a single-tensor file with an element count field.
pub fn save_tensor_file(tensor: &Tensor, path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    let mut buf = Vec::with_capacity(tensor.numel() * 4 + 64);
    write_tensor(&mut buf, tensor, CountUnit::Elements)
        .map_err(|e| MiniLmError::resource(path, e))?;
    std::fs::write(path, buf).map_err(|e| MiniLmError::resource(path, e))
}

/// Container entry metadata, as listed in the header.
#[derive(Debug, Clone)]
struct ContainerEntry {
    name: String,
    dtype: u8,
    dims: Vec<u32>,
    offset: u64,
    nbytes: u64,
}

fn read_entry<R: Read>(r: &mut R) -> Result<ContainerEntry> {
    let name_len = r
        .read_u16::<LittleEndian>()
        .map_err(truncated("entry name length"))? as usize;
    let mut name = vec![0u8; name_len];
    r.read_exact(&mut name).map_err(truncated("entry name"))?;
    let name = String::from_utf8(name)
        .map_err(|_| MiniLmError::Format("entry name is not valid UTF-8".into()))?;
    let dtype = r.read_u8().map_err(truncated("entry dtype"))?;
    let ndim = r.read_u8().map_err(truncated("entry ndim"))? as usize;
    if ndim == 0 || ndim > MAX_RANK {
        return Err(MiniLmError::Format(format!(
            "{}: ndim {} outside [1, {}]",
            name, ndim, MAX_RANK
        )));
    }
    let mut dims = vec![0u32; ndim];
    for d in dims.iter_mut() {
        *d = r.read_u32::<LittleEndian>().map_err(truncated("entry dims"))?;
        if *d == 0 {
            return Err(MiniLmError::Format(format!(
                "{}: zero-sized dimension",
                name
            )));
        }
    }
    let offset = r.read_u64::<LittleEndian>().map_err(truncated("entry offset"))?;
    let nbytes = r.read_u64::<LittleEndian>().map_err(truncated("entry nbytes"))?;
    Ok(ContainerEntry {
        name,
        dtype,
        dims,
        offset,
        nbytes,
    })
}

/// Parse a TBF1 container held in memory into named tensors, in file order.
pub fn parse_container(bytes: &[u8]) -> Result<Vec<(String, Tensor)>> {
    let file_len = bytes.len() as u64;
    let mut r = Cursor::new(bytes);
    let mut magic = [0u8; 4];
    r.read_exact(&mut magic).map_err(truncated("container magic"))?;
    if &magic != TBF_MAGIC {
        return Err(MiniLmError::Format("invalid TBF magic".into()));
    }
    let count = r.read_u64::<LittleEndian>().map_err(truncated("tensor count"))?;
    if count.saturating_mul(MIN_ENTRY_HEADER) > file_len {
        return Err(MiniLmError::Format(format!(
            "tensor count {} cannot fit in {} bytes",
            count, file_len
        )));
    }

    let entries = (0..count)
        .map(|_| read_entry(&mut r))
        .collect::<Result<Vec<_>>>()?;

    let mut tensors = Vec::with_capacity(entries.len());
    for entry in entries {
        if entry.dtype != DTYPE_F32 {
            return Err(MiniLmError::Format(format!(
                "{}: unsupported dtype {} (only float32 is loadable)",
                entry.name, entry.dtype
            )));
        }
        let elements = checked_numel(&entry.dims)
            .map_err(|e| MiniLmError::Format(format!("{}: {}", entry.name, e)))?;
        if entry.nbytes != payload_bytes(elements)? {
            return Err(MiniLmError::Format(format!(
                "{}: {} bytes declared for {} float32 elements",
                entry.name, entry.nbytes, elements
            )));
        }
        let end = entry.offset.checked_add(entry.nbytes).unwrap_or(u64::MAX);
        if end > file_len {
            return Err(MiniLmError::Format(format!(
                "{}: payload [{}, {}) runs past end of file ({} bytes)",
                entry.name, entry.offset, end, file_len
            )));
        }
        let mut data = vec![0f32; elements];
        let mut payload = &bytes[entry.offset as usize..end as usize];
        payload
            .read_f32_into::<LittleEndian>(&mut data)
            .map_err(truncated("container payload"))?;
        debug!(name = %entry.name, dims = ?entry.dims, "loaded tensor");
        tensors.push((entry.name, Tensor::new(entry.dims, data)?));
    }
    Ok(tensors)
}

/// Load a TBF1 container file.
pub fn load_container(path: impl AsRef<Path>) -> Result<Vec<(String, Tensor)>> {
    let path = path.as_ref();
    let bytes = std::fs::read(path).map_err(|e| MiniLmError::resource(path, e))?;
    parse_container(&bytes).map_err(|e| match e {
        MiniLmError::Format(msg) => MiniLmError::Format(format!("{}: {}", path.display(), msg)),
        other => other,
    })
}

/// Serialize named tensors into a TBF1 container.
///
/// Names longer than `u16::MAX` bytes are rejected with `InvalidInput` before anything is written.
pub fn write_container<W: Write>(w: &mut W, tensors: &[(&str, &Tensor)]) -> io::Result<()> {
    let mut headers = Vec::with_capacity(tensors.len());
    for (name, tensor) in tensors {
        let name_len = u16::try_from(name.len()).map_err(|_| {
            invalid_input(format!("tensor name of {} bytes exceeds u16", name.len()))
        })?;
        let ndim = u8::try_from(tensor.dims().len())
            .map_err(|_| invalid_input(format!("{}: rank too large", name)))?;
        headers.push((name_len, ndim));
    }
    let header_len: u64 = 4
        + 8
        + tensors
            .iter()
            .map(|(name, t)| 2 + name.len() as u64 + 1 + 1 + 4 * t.dims().len() as u64 + 16)
            .sum::<u64>();

    w.write_all(TBF_MAGIC)?;
    w.write_u64::<LittleEndian>(tensors.len() as u64)?;
    let mut offset = header_len;
    for ((name, tensor), (name_len, ndim)) in tensors.iter().zip(headers) {
        let nbytes = tensor.numel() as u64 * 4;
        w.write_u16::<LittleEndian>(name_len)?;
        w.write_all(name.as_bytes())?;
        w.write_u8(DTYPE_F32)?;
        w.write_u8(ndim)?;
        for &d in tensor.dims() {
            w.write_u32::<LittleEndian>(d)?;
        }
        w.write_u64::<LittleEndian>(offset)?;
        w.write_u64::<LittleEndian>(nbytes)?;
        offset += nbytes;
    }
    for (_, tensor) in tensors {
        for &f in tensor.data() {
            w.write_f32::<LittleEndian>(f)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode(tensor: &Tensor, unit: CountUnit) -> Vec<u8> {
        let mut buf = Vec::new();
        write_tensor(&mut buf, tensor, unit).unwrap();
        buf
    }

    fn decode(bytes: &[u8]) -> Result<Tensor> {
        read_tensor(&mut Cursor::new(bytes), bytes.len() as u64)
    }

    #[test]
    fn count_field_accepts_elements_or_bytes() {
        let t = Tensor::new(vec![1, 3], vec![0.5, -1.0, 2.0]).unwrap();
        assert_eq!(decode(&encode(&t, CountUnit::Elements)).unwrap(), t);
        assert_eq!(decode(&encode(&t, CountUnit::Bytes)).unwrap(), t);
    }

    #[test]
    fn count_field_mismatch_is_format_error() {
        let t = Tensor::new(vec![3], vec![1.0, 2.0, 3.0]).unwrap();
        let mut bytes = encode(&t, CountUnit::Elements);
        // count lives right after ndim + one dim
        bytes[5..13].copy_from_slice(&7i64.to_le_bytes());
        assert!(decode(&bytes).unwrap_err().is_format_error());
    }

    #[test]
    fn rejects_bad_ndim() {
        assert!(decode(&[0u8]).unwrap_err().is_format_error());
        assert!(decode(&[5u8, 0, 0, 0]).unwrap_err().is_format_error());
    }

    #[test]
    fn rejects_non_positive_dims() {
        let mut bytes = vec![1u8];
        bytes.extend_from_slice(&(-2i32).to_le_bytes());
        bytes.extend_from_slice(&0i64.to_le_bytes());
        bytes.extend_from_slice(&1i64.to_le_bytes());
        assert!(decode(&bytes).unwrap_err().is_format_error());
    }

    #[test]
    fn truncated_payload_is_format_error() {
        let t = Tensor::new(vec![4], vec![1.0; 4]).unwrap();
        let bytes = encode(&t, CountUnit::Elements);
        for cut in [1, 4, 12, bytes.len() - 1] {
            let err = decode(&bytes[..cut]).unwrap_err();
            assert!(err.is_format_error(), "cut at {}: {:?}", cut, err);
        }
    }

    #[test]
    fn container_round_trip_keeps_order() {
        let a = Tensor::new(vec![2, 2], vec![1.0, 2.0, 3.0, 4.0]).unwrap();
        let b = Tensor::new(vec![3], vec![5.0, 6.0, 7.0]).unwrap();
        let mut buf = Vec::new();
        write_container(&mut buf, &[("a.weight", &a), ("b.bias", &b)]).unwrap();
        let parsed = parse_container(&buf).unwrap();
        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed[0].0, "a.weight");
        assert_eq!(parsed[0].1, a);
        assert_eq!(parsed[1].1, b);
    }

    #[test]
    fn container_rejects_bad_magic_and_overrun() {
        assert!(parse_container(b"TBF2\0\0\0\0\0\0\0\0")
            .unwrap_err()
            .is_format_error());

        let a = Tensor::new(vec![8], vec![1.0; 8]).unwrap();
        let mut buf = Vec::new();
        write_container(&mut buf, &[("a", &a)]).unwrap();
        buf.truncate(buf.len() - 3);
        assert!(parse_container(&buf).unwrap_err().is_format_error());
    }

    #[test]
    fn overflowing_tensor_dims_are_format_errors() {
        let mut bytes = vec![4u8];
        for _ in 0..4 {
            bytes.extend_from_slice(&i32::MAX.to_le_bytes());
        }
        bytes.extend_from_slice(&0i64.to_le_bytes());
        for _ in 0..4 {
            bytes.extend_from_slice(&1i64.to_le_bytes());
        }
        assert!(decode(&bytes).unwrap_err().is_format_error());
    }

    #[test]
    fn overflowing_container_dims_are_format_errors() {
        let mut buf = TBF_MAGIC.to_vec();
        buf.extend_from_slice(&1u64.to_le_bytes());
        buf.extend_from_slice(&1u16.to_le_bytes());
        buf.push(b'x');
        buf.push(DTYPE_F32);
        buf.push(4);
        for _ in 0..4 {
            buf.extend_from_slice(&65_536u32.to_le_bytes());
        }
        buf.extend_from_slice(&0u64.to_le_bytes());
        buf.extend_from_slice(&0u64.to_le_bytes());
        assert!(parse_container(&buf).unwrap_err().is_format_error());

        // u32::MAX dims overflow even a 64-bit element count
        let mut buf = TBF_MAGIC.to_vec();
        buf.extend_from_slice(&1u64.to_le_bytes());
        buf.extend_from_slice(&1u16.to_le_bytes());
        buf.push(b'y');
        buf.push(DTYPE_F32);
        buf.push(4);
        for _ in 0..4 {
            buf.extend_from_slice(&u32::MAX.to_le_bytes());
        }
        buf.extend_from_slice(&0u64.to_le_bytes());
        buf.extend_from_slice(&0u64.to_le_bytes());
        assert!(parse_container(&buf).unwrap_err().is_format_error());
    }

    #[test]
    fn writers_reject_unrepresentable_headers() {
        let t = Tensor::new(vec![1], vec![0.0]).unwrap();
        let long_name = "w".repeat(u16::MAX as usize + 1);
        let mut buf = Vec::new();
        let err = write_container(&mut buf, &[(long_name.as_str(), &t)]).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
        assert!(buf.is_empty());
    }

    #[test]
    fn container_rejects_huge_count() {
        let mut buf = TBF_MAGIC.to_vec();
        buf.extend_from_slice(&u64::MAX.to_le_bytes());
        assert!(parse_container(&buf).unwrap_err().is_format_error());
    }
}
