use std::fmt;

use md5::{Digest, Md5};

use crate::{Argument, CallSiteId, IdentityToken};

/// 128-bit cache key derived from a call site and its normalized arguments.
///
/// Keys are deterministic: equal `(CallSiteId, [Argument])` pairs always give
/// equal keys, within a process and across runs.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey([u8; 16]);

impl CacheKey {
    #[inline]
    pub const fn from_bytes(bytes: [u8; 16]) -> Self {
        Self(bytes)
    }

    #[inline]
    pub fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in self.0 {
            write!(f, "{:02x}", byte)?;
        }
        Ok(())
    }
}

impl fmt::Debug for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CacheKey({})", self)
    }
}

// Tag bytes of the key serialization. Changing any of them changes every key.
const TAG_SITE: u8 = 0x01;
const TAG_LOCATION: u8 = 0x02;
const TAG_NO_LOCATION: u8 = 0x03;
const TAG_ARGS: u8 = 0x04;
const TAG_NULL: u8 = 0x10;
const TAG_BOOL: u8 = 0x11;
const TAG_INT: u8 = 0x12;
const TAG_WIDE: u8 = 0x13;
const TAG_FLOAT: u8 = 0x14;
const TAG_CHAR: u8 = 0x15;
const TAG_STR: u8 = 0x16;
const TAG_LIST: u8 = 0x17;
const TAG_ISSUED: u8 = 0x18;
const TAG_ADDRESS: u8 = 0x19;

/// Derives the cache key for a call site and its normalized arguments.
///
/// The call site is hashed as a prefix, so the same arguments at two call
/// sites never share a key. Argument order is part of the key. With no
/// arguments the key depends on the call site alone, giving the call site a
/// single cache slot.
///
/// # Examples
///
/// ```
/// use oncely_core::{derive_key, normalize, CallSiteId};
///
/// let site = CallSiteId::named("number_for_letter");
/// let a = derive_key(&site, &normalize(&[&'A']).unwrap());
/// let b = derive_key(&site, &normalize(&[&'B']).unwrap());
/// assert_ne!(a, b);
/// assert_eq!(a, derive_key(&site, &normalize(&[&'A']).unwrap()));
/// ```
pub fn derive_key(site: &CallSiteId, args: &[Argument]) -> CacheKey {
    let mut hasher = Md5::new();
    write_call_site(&mut hasher, site);
    if !args.is_empty() {
        hasher.update([TAG_ARGS]);
        write_len(&mut hasher, args.len());
        for arg in args {
            write_argument(&mut hasher, arg);
        }
    }
    let digest = hasher.finalize();
    let mut bytes = [0u8; 16];
    bytes.copy_from_slice(&digest);
    CacheKey(bytes)
}

fn write_len(hasher: &mut Md5, len: usize) {
    hasher.update((len as u64).to_le_bytes());
}

fn write_str(hasher: &mut Md5, s: &str) {
    write_len(hasher, s.len());
    hasher.update(s.as_bytes());
}

fn write_call_site(hasher: &mut Md5, site: &CallSiteId) {
    hasher.update([TAG_SITE]);
    write_str(hasher, site.operation());
    match site.location() {
        Some(location) => {
            hasher.update([TAG_LOCATION]);
            write_str(hasher, location.file);
            hasher.update(location.line.to_le_bytes());
            hasher.update(location.column.to_le_bytes());
        }
        None => hasher.update([TAG_NO_LOCATION]),
    }
}

fn write_argument(hasher: &mut Md5, arg: &Argument) {
    match arg {
        Argument::Null => hasher.update([TAG_NULL]),
        Argument::Bool(b) => hasher.update([TAG_BOOL, u8::from(*b)]),
        Argument::Int(v) => {
            hasher.update([TAG_INT]);
            hasher.update(v.to_le_bytes());
        }
        Argument::Wide(v) => {
            hasher.update([TAG_WIDE]);
            hasher.update(v.to_le_bytes());
        }
        Argument::Float(bits) => {
            hasher.update([TAG_FLOAT]);
            hasher.update(bits.to_le_bytes());
        }
        Argument::Char(c) => {
            hasher.update([TAG_CHAR]);
            hasher.update(u32::from(*c).to_le_bytes());
        }
        Argument::Str(s) => {
            hasher.update([TAG_STR]);
            write_str(hasher, s);
        }
        Argument::List(items) => {
            hasher.update([TAG_LIST]);
            write_len(hasher, items.len());
            for item in items {
                write_argument(hasher, item);
            }
        }
        Argument::Identity(IdentityToken::Issued(id)) => {
            hasher.update([TAG_ISSUED]);
            hasher.update(id.to_le_bytes());
        }
        Argument::Identity(IdentityToken::Address(addr)) => {
            hasher.update([TAG_ADDRESS]);
            hasher.update((*addr as u64).to_le_bytes());
        }
    }
}
