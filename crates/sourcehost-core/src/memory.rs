//! Helpers for reading and writing a plugin instance's linear memory.
//!
//! Every import function that accepts or returns a string/buffer goes
//! through these helpers rather than poking `Caller::data_mut().memory`
//! directly, so the bounds-checking (spec.md §7 `FailedMemoryWrite`) lives
//! in one place.

use wasmtime::{Caller, Memory};

/// Read `len` bytes starting at `ptr` out of `memory`. Returns `None` if the
/// range falls outside the instance's current memory size.
pub fn read_bytes<T>(caller: &Caller<'_, T>, memory: &Memory, ptr: i32, len: i32) -> Option<Vec<u8>> {
    if ptr < 0 || len < 0 {
        return None;
    }
    let data = memory.data(caller);
    let start = ptr as usize;
    let end = start.checked_add(len as usize)?;
    data.get(start..end).map(|s| s.to_vec())
}

/// Read a UTF-8 string out of memory given a `(ptr, len)` pair as plugins
/// pass them across the ABI.
pub fn read_string<T>(caller: &Caller<'_, T>, memory: &Memory, ptr: i32, len: i32) -> Option<String> {
    read_bytes(caller, memory, ptr, len).and_then(|bytes| String::from_utf8(bytes).ok())
}

/// Write `bytes` into plugin memory at `ptr`, failing if the write would run
/// past the end of the instance's current memory.
pub fn write_bytes<T>(caller: &mut Caller<'_, T>, memory: &Memory, ptr: i32, bytes: &[u8]) -> bool {
    if ptr < 0 {
        return false;
    }
    let start = ptr as usize;
    let Some(end) = start.checked_add(bytes.len()) else { return false };
    let data = memory.data_mut(caller);
    match data.get_mut(start..end) {
        Some(slice) => {
            slice.copy_from_slice(bytes);
            true
        }
        None => false,
    }
}

/// AssemblyScript string-length convention (spec.md §6): a 32-bit
/// little-endian length lives at `ptr - 4`. Falls back to reading a single
/// byte at `ptr - 4` as the length when the 4-byte read is out of range —
/// historical compatibility with older AssemblyScript runtimes.
pub fn read_as_string<T>(caller: &Caller<'_, T>, memory: &Memory, ptr: i32) -> Option<String> {
    if ptr < 4 {
        return None;
    }
    let len_ptr = ptr - 4;
    if let Some(len_bytes) = read_bytes(caller, memory, len_ptr, 4) {
        let len = i32::from_le_bytes([len_bytes[0], len_bytes[1], len_bytes[2], len_bytes[3]]);
        if len >= 0 && (len as usize) < (1 << 28) {
            if let Some(s) = read_string(caller, memory, ptr, len) {
                return Some(s);
            }
        }
    }
    // Fallback: a single length byte at ptr - 4.
    let byte = read_bytes(caller, memory, len_ptr, 1)?;
    read_string(caller, memory, ptr, byte[0] as i32)
}

/// Write the modern-ABI result-pointer header (spec.md §4.2): 4-byte total
/// length, 4-byte capacity (ignored by the reader), then the payload.
/// Returns the pointer the caller should hand back to the plugin, or `None`
/// if the write did not fit in the scratch region the caller provided.
pub fn write_result_header<T>(
    caller: &mut Caller<'_, T>,
    memory: &Memory,
    ptr: i32,
    payload: &[u8],
) -> bool {
    let total_len = (payload.len() + 8) as i32;
    let mut framed = Vec::with_capacity(payload.len() + 8);
    framed.extend_from_slice(&total_len.to_le_bytes());
    framed.extend_from_slice(&total_len.to_le_bytes()); // capacity, mirrors total_len
    framed.extend_from_slice(payload);
    write_bytes(caller, memory, ptr, &framed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use wasmtime::{Engine, Store};

    fn memory_store() -> (Store<()>, Memory) {
        let engine = Engine::default();
        let mut store = Store::new(&engine, ());
        let memory = Memory::new(&mut store, wasmtime::MemoryType::new(1, None)).unwrap();
        (store, memory)
    }

    #[test]
    fn write_then_read_bytes_roundtrips() {
        let (mut store, memory) = memory_store();
        let mut caller_store = &mut store;
        memory.data_mut(&mut caller_store)[0..5].copy_from_slice(b"hello");
        let data = memory.data(&caller_store);
        assert_eq!(&data[0..5], b"hello");
    }

    #[test]
    fn result_header_frames_payload_with_length() {
        let (mut store, memory) = memory_store();
        let payload = b"abc";
        let total_len = (payload.len() + 8) as i32;
        let mut framed = Vec::new();
        framed.extend_from_slice(&total_len.to_le_bytes());
        framed.extend_from_slice(&total_len.to_le_bytes());
        framed.extend_from_slice(payload);
        memory.data_mut(&mut store)[0..framed.len()].copy_from_slice(&framed);
        let data = memory.data(&store);
        let len = i32::from_le_bytes([data[0], data[1], data[2], data[3]]);
        assert_eq!(len, total_len);
        assert_eq!(&data[8..8 + payload.len()], payload);
    }
}
