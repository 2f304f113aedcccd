//! # Resource Directory Codec
//!
//! Reads and writes the typed-record index stored inside a resource fork.
//!
//! ## Format
//!
//! All integers are big-endian.
//!
//! 1.  **Header** (16 bytes): data offset, map offset, data length, map length.
//! 2.  **Data region**: each resource is a `u32` length followed by its bytes.
//! 3.  **Map**: a copy of the header, 8 reserved bytes, then the offsets of the
//!     type list and the name list (both relative to the map start).
//!     - Type list: `u16` type count minus one, then per type the four-byte
//!       code, `u16` resource count minus one and the `u16` offset of its
//!       reference list (relative to the type list).
//!     - Reference entry (12 bytes): `i16` id, `u16` name offset or `0xFFFF`,
//!       attribute byte, 24-bit offset into the data region, 4 reserved bytes.
//!     - Name list: Pascal strings.
//!
//! A fork may be the whole file, or live inside an AppleSingle/AppleDouble or
//! MacBinary II wrapper; [`locate_resource_fork`] finds it.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::str::FromStr;

use tracing::debug;

use crate::error::{FileError, Result};
use crate::opened_file::{ForkWindow, OpenedFile};

const HEADER_SIZE: usize = 16;
/// The builder leaves the classic 240 reserved bytes after the header.
const DATA_START: u32 = 256;
const MAP_PREAMBLE: usize = 28;
const REF_ENTRY_SIZE: usize = 12;
const TYPE_ENTRY_SIZE: usize = 8;
const NO_NAME: u16 = 0xFFFF;
const MAX_DATA_OFFSET: u64 = 1 << 24;

const APPLE_SINGLE_MAGIC: u32 = 0x0005_1600;
const APPLE_DOUBLE_MAGIC: u32 = 0x0005_1607;
const APPLE_RESOURCE_FORK_ID: u32 = 2;
const MACBINARY_HEADER: usize = 128;

/// A four-character resource type code.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResType(pub [u8; 4]);

impl ResType {
    pub const fn new(code: [u8; 4]) -> Self {
        ResType(code)
    }

    pub const fn from_chars(a: u8, b: u8, c: u8, d: u8) -> Self {
        ResType([a, b, c, d])
    }

    pub const fn as_u32(self) -> u32 {
        u32::from_be_bytes(self.0)
    }
}

impl From<u32> for ResType {
    fn from(code: u32) -> Self {
        ResType(code.to_be_bytes())
    }
}

impl From<ResType> for u32 {
    fn from(t: ResType) -> Self {
        t.as_u32()
    }
}

impl fmt::Display for ResType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for &b in &self.0 {
            let c = if b.is_ascii_graphic() || b == b' ' { b as char } else { '?' };
            write!(f, "{c}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for ResType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ResType({self})")
    }
}

impl FromStr for ResType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let bytes: [u8; 4] = s
            .as_bytes()
            .try_into()
            .map_err(|_| format!("type code must be exactly 4 bytes, got '{s}'"))?;
        Ok(ResType(bytes))
    }
}

/// Location of one resource's bytes within the fork.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceEntry {
    /// Fork-relative offset of the first payload byte.
    pub offset: u64,
    pub length: u32,
    pub attributes: u8,
    pub name: Option<String>,
}

/// In-memory index of one fork's resource map.
#[derive(Debug, Clone, Default)]
pub struct ResourceDirectory {
    entries: HashMap<(ResType, i16), ResourceEntry>,
}

impl ResourceDirectory {
    /// Builds the index from the fork the handle is currently windowed to.
    pub fn parse(file: &mut OpenedFile) -> Result<Self> {
        let fork_len = file.len()?;
        if fork_len < HEADER_SIZE as u64 {
            return Err(FileError::InvalidFormat("too short for a resource header".into()));
        }
        let mut header = [0u8; HEADER_SIZE];
        file.set_position(0)?;
        file.read(&mut header)?;
        let data_off = be_u32(&header, 0)? as u64;
        let map_off = be_u32(&header, 4)? as u64;
        let data_len = be_u32(&header, 8)? as u64;
        let map_len = be_u32(&header, 12)? as u64;
        if data_off + data_len > fork_len || map_off + map_len > fork_len {
            return Err(FileError::InvalidFormat("header regions exceed the fork".into()));
        }
        if map_len < (MAP_PREAMBLE + 2) as u64 {
            return Err(FileError::InvalidFormat("resource map too small".into()));
        }

        let mut map = vec![0u8; map_len as usize];
        file.set_position(map_off)?;
        file.read(&mut map)?;

        let type_list = be_u16(&map, 24)? as usize;
        let name_list = be_u16(&map, 26)? as usize;
        let type_count = be_u16(&map, type_list)?.wrapping_add(1) as usize;

        let mut entries = HashMap::new();
        for t in 0..type_count {
            let rec = type_list + 2 + t * TYPE_ENTRY_SIZE;
            let kind = ResType(slice(&map, rec, 4)?.try_into().unwrap_or_default());
            let count = be_u16(&map, rec + 4)? as usize + 1;
            let refs = type_list + be_u16(&map, rec + 6)? as usize;
            for r in 0..count {
                let at = refs + r * REF_ENTRY_SIZE;
                let id = be_u16(&map, at)? as i16;
                let name_off = be_u16(&map, at + 2)?;
                let word = be_u32(&map, at + 4)?;
                let attributes = (word >> 24) as u8;
                let rel = (word & 0x00FF_FFFF) as u64;

                if rel + 4 > data_len {
                    return Err(FileError::InvalidFormat(format!("'{kind}' #{id} lies outside the data region")));
                }
                let mut len_bytes = [0u8; 4];
                file.set_position(data_off + rel)?;
                file.read(&mut len_bytes)?;
                let length = u32::from_be_bytes(len_bytes);
                if rel + 4 + length as u64 > data_len {
                    return Err(FileError::InvalidFormat(format!(
                        "'{kind}' #{id} claims {length} bytes past the end of the data region"
                    )));
                }

                let name = if name_off == NO_NAME {
                    None
                } else {
                    let at = name_list + name_off as usize;
                    let n = *map.get(at).ok_or_else(|| FileError::InvalidFormat("name list truncated".into()))?;
                    Some(slice(&map, at + 1, n as usize)?.iter().map(|&b| b as char).collect())
                };

                let entry = ResourceEntry { offset: data_off + rel + 4, length, attributes, name };
                if entries.insert((kind, id), entry).is_some() {
                    debug!(%kind, id, "duplicate resource reference; keeping the later one");
                }
            }
        }
        debug!(count = entries.len(), "parsed resource map");
        Ok(Self { entries })
    }

    pub fn contains(&self, kind: ResType, id: i16) -> bool {
        self.entries.contains_key(&(kind, id))
    }

    pub fn entry(&self, kind: ResType, id: i16) -> Option<&ResourceEntry> {
        self.entries.get(&(kind, id))
    }

    pub fn name(&self, kind: ResType, id: i16) -> Option<&str> {
        self.entry(kind, id)?.name.as_deref()
    }

    /// Distinct types present, sorted.
    pub fn types(&self) -> Vec<ResType> {
        let mut types: Vec<ResType> = self.entries.keys().map(|(t, _)| *t).collect();
        types.sort();
        types.dedup();
        types
    }

    /// Ids present for `kind`, sorted.
    pub fn ids(&self, kind: ResType) -> Vec<i16> {
        let mut ids: Vec<i16> = self.entries.keys().filter(|(t, _)| *t == kind).map(|(_, id)| *id).collect();
        ids.sort();
        ids
    }

    pub fn count(&self, kind: ResType) -> usize {
        self.entries.keys().filter(|(t, _)| *t == kind).count()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Finds where the resource fork lives inside the file. `None` means the
/// whole file is the fork.
pub fn locate_resource_fork(file: &mut OpenedFile) -> Result<Option<ForkWindow>> {
    let total = file.len()?;
    let mut head = vec![0u8; total.min(MACBINARY_HEADER as u64) as usize];
    file.set_position(0)?;
    file.read(&mut head)?;

    if let Some(window) = apple_single_fork(file, &head, total)? {
        debug!(offset = window.offset, length = window.length, "AppleSingle resource fork");
        return Ok(Some(window));
    }
    if let Some(window) = macbinary_fork(&head, total) {
        debug!(offset = window.offset, length = window.length, "MacBinary resource fork");
        return Ok(Some(window));
    }
    Ok(None)
}

fn apple_single_fork(file: &mut OpenedFile, head: &[u8], total: u64) -> Result<Option<ForkWindow>> {
    let Ok(magic) = be_u32(head, 0) else { return Ok(None) };
    if magic != APPLE_SINGLE_MAGIC && magic != APPLE_DOUBLE_MAGIC {
        return Ok(None);
    }
    let count = be_u16(head, 24)? as u64;
    let mut table = vec![0u8; (count * 12) as usize];
    if 26 + table.len() as u64 > total {
        return Err(FileError::InvalidFormat("AppleSingle entry table truncated".into()));
    }
    file.set_position(26)?;
    file.read(&mut table)?;
    for e in table.chunks_exact(12) {
        if be_u32(e, 0)? == APPLE_RESOURCE_FORK_ID {
            let window = ForkWindow { offset: be_u32(e, 4)? as u64, length: be_u32(e, 8)? as u64 };
            if window.offset + window.length > total {
                return Err(FileError::InvalidFormat("AppleSingle resource fork truncated".into()));
            }
            return Ok(Some(window));
        }
    }
    Err(FileError::InvalidFormat("AppleSingle file has no resource fork".into()))
}

fn macbinary_fork(head: &[u8], total: u64) -> Option<ForkWindow> {
    if head.len() < MACBINARY_HEADER || head[0] != 0 || head[1] == 0 || head[1] > 63 || head[74] != 0 || head[82] != 0 {
        return None;
    }
    let stored = u16::from_be_bytes([head[124], head[125]]);
    if crc16_xmodem(&head[..124]) != stored {
        return None;
    }
    let data_len = u32::from_be_bytes(head[83..87].try_into().ok()?) as u64;
    let rsrc_len = u32::from_be_bytes(head[87..91].try_into().ok()?) as u64;
    let offset = MACBINARY_HEADER as u64 + data_len.div_ceil(128) * 128;
    (offset + rsrc_len <= total).then_some(ForkWindow { offset, length: rsrc_len })
}

/// CRC-16/XMODEM, as used by the MacBinary II header.
pub(crate) fn crc16_xmodem(bytes: &[u8]) -> u16 {
    let mut crc: u16 = 0;
    for &b in bytes {
        crc ^= (b as u16) << 8;
        for _ in 0..8 {
            crc = if crc & 0x8000 != 0 { (crc << 1) ^ 0x1021 } else { crc << 1 };
        }
    }
    crc
}

/// Whether the stream holds a parseable resource fork in any supported wrapper.
pub fn looks_like_resource_container(file: &mut OpenedFile) -> bool {
    let found = locate_resource_fork(file).and_then(|w| file.set_fork_window(w));
    let ok = found.is_ok() && ResourceDirectory::parse(file).is_ok();
    let _ = file.set_fork_window(None);
    ok
}

/// Accumulates resources and serialises them as a bare resource fork.
#[derive(Debug, Clone, Default)]
pub struct ResourceBuilder {
    entries: BTreeMap<(ResType, i16), (Option<String>, Vec<u8>)>,
}

impl ResourceBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces a resource.
    pub fn add(&mut self, kind: ResType, id: i16, data: impl Into<Vec<u8>>) -> &mut Self {
        self.entries.insert((kind, id), (None, data.into()));
        self
    }

    pub fn add_named(&mut self, kind: ResType, id: i16, name: &str, data: impl Into<Vec<u8>>) -> &mut Self {
        self.entries.insert((kind, id), (Some(name.to_string()), data.into()));
        self
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut data = Vec::new();
        let mut names = Vec::new();
        // per type: (code, [(id, name_off, data_off)])
        let mut types: BTreeMap<ResType, Vec<(i16, u16, u32)>> = BTreeMap::new();
        for ((kind, id), (name, bytes)) in &self.entries {
            let rel = data.len() as u64;
            if rel >= MAX_DATA_OFFSET {
                return Err(FileError::InvalidFormat("data region exceeds 24-bit offsets".into()));
            }
            let len = u32::try_from(bytes.len())
                .map_err(|_| FileError::InvalidFormat(format!("'{kind}' #{id} is too large")))?;
            data.extend_from_slice(&len.to_be_bytes());
            data.extend_from_slice(bytes);

            let name_off = match name {
                None => NO_NAME,
                Some(n) => {
                    let n = n.as_bytes();
                    if n.len() > 255 || names.len() >= NO_NAME as usize {
                        return Err(FileError::InvalidFormat(format!("name of '{kind}' #{id} cannot be stored")));
                    }
                    let off = names.len() as u16;
                    names.push(n.len() as u8);
                    names.extend_from_slice(n);
                    off
                }
            };
            types.entry(*kind).or_default().push((*id, name_off, rel as u32));
        }

        let type_list_len = 2 + types.len() * TYPE_ENTRY_SIZE + self.entries.len() * REF_ENTRY_SIZE;
        let map_len = MAP_PREAMBLE + type_list_len + names.len();
        if map_len > u16::MAX as usize {
            return Err(FileError::InvalidFormat("resource map exceeds 64 KiB".into()));
        }
        let (data_len, map_off) = data_region(data.len())?;

        let mut header = Vec::with_capacity(HEADER_SIZE);
        for v in [DATA_START, map_off, data_len, map_len as u32] {
            header.extend_from_slice(&v.to_be_bytes());
        }

        let mut map = Vec::with_capacity(map_len);
        map.extend_from_slice(&header);
        map.extend_from_slice(&[0u8; 8]);
        map.extend_from_slice(&(MAP_PREAMBLE as u16).to_be_bytes());
        map.extend_from_slice(&((MAP_PREAMBLE + type_list_len) as u16).to_be_bytes());
        map.extend_from_slice(&(types.len() as u16).wrapping_sub(1).to_be_bytes());
        let mut ref_off = 2 + types.len() * TYPE_ENTRY_SIZE;
        for (kind, refs) in &types {
            map.extend_from_slice(&kind.0);
            map.extend_from_slice(&(refs.len() as u16 - 1).to_be_bytes());
            map.extend_from_slice(&(ref_off as u16).to_be_bytes());
            ref_off += refs.len() * REF_ENTRY_SIZE;
        }
        for refs in types.values() {
            for &(id, name_off, rel) in refs {
                map.extend_from_slice(&id.to_be_bytes());
                map.extend_from_slice(&name_off.to_be_bytes());
                map.extend_from_slice(&rel.to_be_bytes());
                map.extend_from_slice(&[0u8; 4]);
            }
        }
        map.extend_from_slice(&names);

        let mut out = Vec::with_capacity(DATA_START as usize + data.len() + map.len());
        out.extend_from_slice(&header);
        out.resize(DATA_START as usize, 0);
        out.extend_from_slice(&data);
        out.extend_from_slice(&map);
        Ok(out)
    }

    /// Replaces the whole content of `file` with the serialised fork.
    pub fn write_to(&self, file: &mut OpenedFile) -> Result<()> {
        let bytes = self.to_bytes()?;
        file.set_len(0)?;
        file.set_position(0)?;
        file.write(&bytes)?;
        file.sync()
    }
}

/// Length of the data region and the map offset that follows it, both of
/// which must fit the header's 32-bit fields.
fn data_region(len: usize) -> Result<(u32, u32)> {
    let too_big = || FileError::InvalidFormat(format!("data region of {len} bytes does not fit a resource fork"));
    let data_len = u32::try_from(len).map_err(|_| too_big())?;
    let map_off = DATA_START.checked_add(data_len).ok_or_else(too_big)?;
    Ok((data_len, map_off))
}

fn slice(buf: &[u8], at: usize, len: usize) -> Result<&[u8]> {
    buf.get(at..at + len)
        .ok_or_else(|| FileError::InvalidFormat(format!("resource map truncated at offset {at}")))
}

fn be_u16(buf: &[u8], at: usize) -> Result<u16> {
    let b = slice(buf, at, 2)?;
    Ok(u16::from_be_bytes([b[0], b[1]]))
}

fn be_u32(buf: &[u8], at: usize) -> Result<u32> {
    let b = slice(buf, at, 4)?;
    Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
}
