/*!
 * Snapshot Loader
 *
 * Decodes the RDB-style snapshot read once at startup:
 *
 * ```text
 * <9-byte header>
 * { [0xFD <expiry: i64 BE ms>] <type: u8> <len><key> <len><value> }*
 * 0xFE
 * ```
 *
 * Lengths use the two-bit prefix encoding implemented by `read_length`.
 * Loading is best-effort: a failure keeps everything decoded before it.
 */

use crate::error::SnapshotError;
use crate::storage::Store;
use bytes::Bytes;
use std::fs::File;
use std::io::{BufReader, ErrorKind, Read};
use std::path::Path;

/// Size of the header skipped at the start of the file
pub const HEADER_LEN: usize = 9;
/// End of database marker
pub const OPCODE_EOF: u8 = 0xFE;
/// Marks a record preceded by an 8-byte millisecond expiry
pub const OPCODE_EXPIRE_MS: u8 = 0xFD;

/// Counters reported after a load
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct LoadStats {
    /// Records inserted (including overwrites)
    pub keys: usize,
    /// Records that carried an expiry
    pub expiring: usize,
}

/// Build a store from the snapshot at `path`
///
/// A missing file yields an empty store. A corrupt or truncated file yields
/// whatever was decoded before the failure.
pub fn load(path: &Path) -> Store {
    let store = Store::new();

    let file = match File::open(path) {
        Ok(f) => f,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            log::info!("no snapshot found at {}, starting empty", path.display());
            return store;
        }
        Err(e) => {
            log::warn!("cannot open snapshot {}: {}", path.display(), e);
            return store;
        }
    };

    match load_into(BufReader::new(file), &store) {
        Ok(stats) => log::info!(
            "loaded {} keys ({} with expiry) from {}",
            stats.keys,
            stats.expiring,
            path.display()
        ),
        Err(e) => log::warn!(
            "error reading snapshot {}: {}; continuing with {} keys",
            path.display(),
            e,
            store.len()
        ),
    }

    store
}

/// Decode a snapshot stream into `store`
///
/// Each record is inserted as soon as it is complete, so on error the store
/// holds every record before the failing one.
pub fn load_into<R: Read>(mut r: R, store: &Store) -> Result<LoadStats, SnapshotError> {
    let mut header = [0u8; HEADER_LEN];
    r.read_exact(&mut header).map_err(|e| match e.kind() {
        ErrorKind::UnexpectedEof => SnapshotError::Header(HEADER_LEN),
        _ => SnapshotError::Io(e),
    })?;

    let mut stats = LoadStats::default();

    loop {
        let mut opcode = match read_opcode(&mut r)? {
            Some(b) => b,
            None => {
                log::debug!("snapshot ended without EOF marker");
                break;
            }
        };
        if opcode == OPCODE_EOF {
            break;
        }

        let mut expires_at = None;
        if opcode == OPCODE_EXPIRE_MS {
            let mut ts = [0u8; 8];
            read_field(&mut r, &mut ts, "expiry")?;
            expires_at = Some(i64::from_be_bytes(ts));
            let mut ty = [0u8; 1];
            read_field(&mut r, &mut ty, "value type")?;
            opcode = ty[0];
        }
        log::trace!("record type 0x{:02x}", opcode);

        let key = read_string(&mut r, "key")?;
        let value = read_string(&mut r, "value")?;

        store.insert(key, value, expires_at);
        stats.keys += 1;
        if expires_at.is_some() {
            stats.expiring += 1;
        }
    }

    Ok(stats)
}

/// Decode a length field
///
/// The top two bits of the first byte select the form:
/// * `00` - the remaining 6 bits are the length
/// * `01` - 14 bits: the next byte, OR'd with the low 6 bits shifted by 8
/// * `10`/`11` - the next 4 bytes as a big-endian `i32`
pub fn read_length<R: Read>(r: &mut R) -> Result<usize, SnapshotError> {
    let mut first = [0u8; 1];
    read_field(r, &mut first, "length")?;
    let b = first[0];

    match b >> 6 {
        0b00 => Ok(b as usize),
        0b01 => {
            let mut next = [0u8; 1];
            read_field(r, &mut next, "length")?;
            Ok(next[0] as usize | (((b & 0x3F) as usize) << 8))
        }
        _ => {
            let mut raw = [0u8; 4];
            read_field(r, &mut raw, "length")?;
            let len = i32::from_be_bytes(raw);
            usize::try_from(len).map_err(|_| SnapshotError::InvalidLength(len))
        }
    }
}

/// Read one opcode, or `None` on a clean end of stream
fn read_opcode<R: Read>(r: &mut R) -> Result<Option<u8>, SnapshotError> {
    let mut b = [0u8; 1];
    loop {
        match r.read(&mut b) {
            Ok(0) => return Ok(None),
            Ok(_) => return Ok(Some(b[0])),
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        }
    }
}

fn read_string<R: Read>(r: &mut R, what: &'static str) -> Result<Bytes, SnapshotError> {
    let len = read_length(r)?;
    // Read through `take` so a bogus length cannot force a huge allocation
    // up front.
    let mut buf = Vec::new();
    r.by_ref().take(len as u64).read_to_end(&mut buf)?;
    if buf.len() < len {
        return Err(SnapshotError::Truncated(what));
    }
    Ok(Bytes::from(buf))
}

fn read_field<R: Read>(r: &mut R, buf: &mut [u8], what: &'static str) -> Result<(), SnapshotError> {
    r.read_exact(buf).map_err(|e| match e.kind() {
        ErrorKind::UnexpectedEof => SnapshotError::Truncated(what),
        _ => SnapshotError::Io(e),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn len_of(bytes: &[u8]) -> usize {
        read_length(&mut &bytes[..]).unwrap()
    }

    #[test]
    fn six_bit_lengths() {
        assert_eq!(len_of(&[0x00]), 0);
        assert_eq!(len_of(&[0x0A]), 10);
        assert_eq!(len_of(&[0x3F]), 63);
    }

    #[test]
    fn fourteen_bit_lengths() {
        assert_eq!(len_of(&[0x40, 0x00]), 0);
        assert_eq!(len_of(&[0x40, 0x3F]), 63);
        assert_eq!(len_of(&[0x40, 0x40]), 64);
        assert_eq!(len_of(&[0x41, 0x00]), 256);
        assert_eq!(len_of(&[0x7F, 0xFF]), 16383);
    }

    #[test]
    fn four_byte_lengths() {
        assert_eq!(len_of(&[0x80, 0x00, 0x00, 0x00, 0x00]), 0);
        assert_eq!(len_of(&[0x80, 0x00, 0x00, 0x40, 0x00]), 16384);
        // 0b11 prefixes are not special-cased; they read a raw length too
        assert_eq!(len_of(&[0xC0, 0x00, 0x01, 0x00, 0x00]), 65536);
    }

    #[test]
    fn negative_four_byte_length_is_rejected() {
        let err = read_length(&mut &[0x80, 0xFF, 0xFF, 0xFF, 0xFF][..]).unwrap_err();
        assert!(matches!(err, SnapshotError::InvalidLength(-1)));
    }

    #[test]
    fn short_length_is_truncated() {
        let err = read_length(&mut &[0x40][..]).unwrap_err();
        assert!(matches!(err, SnapshotError::Truncated("length")));
        let err = read_length(&mut &[0x80, 0x00, 0x01][..]).unwrap_err();
        assert!(matches!(err, SnapshotError::Truncated("length")));
    }

    #[test]
    fn short_header_is_rejected() {
        let store = Store::new();
        let err = load_into(&b"REDIS"[..], &store).unwrap_err();
        assert!(matches!(err, SnapshotError::Header(HEADER_LEN)));
    }

    #[test]
    fn header_only_is_empty() {
        let store = Store::new();
        let stats = load_into(&b"REDIS0011"[..], &store).unwrap();
        assert_eq!(stats, LoadStats::default());
        assert!(store.is_empty());
    }
}
