//! Account addresses: raw `wc:hex`, user-friendly base64 and the
//! `MsgAddress` TL-B forms found in messages.

use std::fmt;
use std::str::FromStr;

use base64::Engine;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::builder::CellBuilder;
use crate::cell::HashBytes;
use crate::error::{CellError, CellResult};
use crate::slice::CellSlice;

const TAG_BOUNCEABLE: u8 = 0x11;
const TAG_NON_BOUNCEABLE: u8 = 0x51;
const FLAG_TESTNET: u8 = 0x80;

/// CRC-16/XMODEM, used by friendly addresses and get-method ids.
pub fn crc16(data: &[u8]) -> u16 {
    let mut crc = 0u16;
    for &byte in data {
        crc ^= (byte as u16) << 8;
        for _ in 0..8 {
            crc = if crc & 0x8000 != 0 {
                (crc << 1) ^ 0x1021
            } else {
                crc << 1
            };
        }
    }
    crc
}

// ---------------------------------------------------------------------------
// StdAddress
// ---------------------------------------------------------------------------

#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct StdAddress {
    pub workchain: i8,
    pub hash: HashBytes,
}

/// Flags carried by a user-friendly address string.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FriendlyFlags {
    pub bounceable: bool,
    pub testnet: bool,
}

impl StdAddress {
    pub fn new(workchain: i8, hash: HashBytes) -> Self {
        Self { workchain, hash }
    }

    pub fn is_masterchain(&self) -> bool {
        self.workchain == -1
    }

    /// `wc:hex` form.
    pub fn to_raw(&self) -> String {
        format!("{}:{}", self.workchain, self.hash.to_hex())
    }

    /// Url-safe base64 of tag, workchain, hash and CRC16.
    pub fn to_friendly(&self, bounceable: bool, testnet: bool) -> String {
        let mut tag = if bounceable {
            TAG_BOUNCEABLE
        } else {
            TAG_NON_BOUNCEABLE
        };
        if testnet {
            tag |= FLAG_TESTNET;
        }
        let mut bytes = Vec::with_capacity(36);
        bytes.push(tag);
        bytes.push(self.workchain as u8);
        bytes.extend_from_slice(&self.hash.0);
        let crc = crc16(&bytes);
        bytes.extend_from_slice(&crc.to_be_bytes());
        base64::engine::general_purpose::URL_SAFE.encode(bytes)
    }

    pub fn parse_raw(s: &str) -> CellResult<Self> {
        let (wc, hash) = s
            .split_once(':')
            .ok_or_else(|| CellError::InvalidAddress(format!("'{s}' is not wc:hex")))?;
        let workchain: i8 = wc
            .parse()
            .map_err(|_| CellError::InvalidAddress(format!("bad workchain '{wc}'")))?;
        if hash.len() != 64 {
            return Err(CellError::InvalidAddress(format!("bad account id '{hash}'")));
        }
        let hash = hash
            .parse()
            .map_err(|_| CellError::InvalidAddress(format!("bad account id '{hash}'")))?;
        Ok(Self { workchain, hash })
    }

    pub fn parse_friendly(s: &str) -> CellResult<(Self, FriendlyFlags)> {
        if s.len() != 48 {
            return Err(CellError::InvalidAddress(format!("'{s}' is not 48 characters")));
        }
        let normalized: String = s
            .chars()
            .map(|c| match c {
                '-' => '+',
                '_' => '/',
                other => other,
            })
            .collect();
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(normalized)
            .map_err(|e| CellError::InvalidAddress(format!("bad base64: {e}")))?;
        if bytes.len() != 36 {
            return Err(CellError::InvalidAddress("friendly address must be 36 bytes".into()));
        }
        let crc = u16::from_be_bytes([bytes[34], bytes[35]]);
        if crc16(&bytes[..34]) != crc {
            return Err(CellError::InvalidAddress("checksum mismatch".into()));
        }
        let mut tag = bytes[0];
        let testnet = tag & FLAG_TESTNET != 0;
        tag &= !FLAG_TESTNET;
        let bounceable = match tag {
            TAG_BOUNCEABLE => true,
            TAG_NON_BOUNCEABLE => false,
            other => return Err(CellError::InvalidAddress(format!("unknown tag {other:#x}"))),
        };
        let hash = HashBytes::from_slice(&bytes[2..34])?;
        Ok((
            Self {
                workchain: bytes[1] as i8,
                hash,
            },
            FriendlyFlags {
                bounceable,
                testnet,
            },
        ))
    }

    /// `addr_std$10 anycast:(Maybe Anycast) workchain_id:int8 address:bits256`.
    pub fn load(slice: &mut CellSlice<'_>) -> CellResult<Self> {
        match slice.load_uint(2)? {
            0b10 => Self::load_after_tag(slice),
            tag => Err(CellError::InvalidTag {
                what: "MsgAddressInt",
                tag,
            }),
        }
    }

    fn load_after_tag(slice: &mut CellSlice<'_>) -> CellResult<Self> {
        if slice.load_bit()? {
            return Err(CellError::Unsupported("anycast addresses".into()));
        }
        let workchain = slice.load_int(8)? as i8;
        let hash = slice.load_hash()?;
        Ok(Self { workchain, hash })
    }

    pub fn store(&self, builder: &mut CellBuilder) -> CellResult<()> {
        builder.store_uint(0b10, 2)?;
        builder.store_bit(false)?;
        builder.store_int(self.workchain as i64, 8)?;
        builder.store_hash(&self.hash)?;
        Ok(())
    }
}

impl fmt::Display for StdAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_raw())
    }
}

impl fmt::Debug for StdAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "StdAddress({})", self.to_raw())
    }
}

/// Accepts both the raw and the user-friendly form.
impl FromStr for StdAddress {
    type Err = CellError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.contains(':') {
            Self::parse_raw(s)
        } else {
            Self::parse_friendly(s).map(|(addr, _)| addr)
        }
    }
}

impl Serialize for StdAddress {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_raw())
    }
}

impl<'de> Deserialize<'de> for StdAddress {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

// ---------------------------------------------------------------------------
// MsgAddress
// ---------------------------------------------------------------------------

/// Any address that may appear in a message header.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum MsgAddress {
    #[default]
    None,
    External {
        bits: usize,
        data: Vec<u8>,
    },
    Std(StdAddress),
}

impl MsgAddress {
    pub fn as_std(&self) -> Option<&StdAddress> {
        match self {
            MsgAddress::Std(addr) => Some(addr),
            _ => None,
        }
    }

    pub fn load(slice: &mut CellSlice<'_>) -> CellResult<Self> {
        match slice.load_uint(2)? {
            0b00 => Ok(MsgAddress::None),
            0b01 => {
                let bits = slice.load_uint(9)? as usize;
                let data = slice.load_raw(bits)?;
                Ok(MsgAddress::External { bits, data })
            }
            0b10 => StdAddress::load_after_tag(slice).map(MsgAddress::Std),
            _ => Err(CellError::Unsupported("addr_var addresses".into())),
        }
    }

    pub fn store(&self, builder: &mut CellBuilder) -> CellResult<()> {
        match self {
            MsgAddress::None => {
                builder.store_uint(0b00, 2)?;
            }
            MsgAddress::External { bits, data } => {
                builder.store_uint(0b01, 2)?;
                builder.store_uint(*bits as u64, 9)?;
                builder.store_raw(data, *bits)?;
            }
            MsgAddress::Std(addr) => addr.store(builder)?,
        }
        Ok(())
    }
}

impl From<StdAddress> for MsgAddress {
    fn from(addr: StdAddress) -> Self {
        MsgAddress::Std(addr)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    const FRIENDLY: &str = "EQDa4VOnTYlLvDJ0gZjNYm5PXfSmmtL6Vs6A_CZEtXCNICq_";
    const RAW: &str = "0:dae153a74d894bbc32748198cd626e4f5df4a69ad2fa56ce80fc2644b5708d20";

    #[test]
    fn crc16_check_value() {
        assert_eq!(crc16(b"123456789"), 0x31c3);
    }

    #[test]
    fn parses_friendly_address() {
        let (addr, flags) = StdAddress::parse_friendly(FRIENDLY).unwrap();
        assert_eq!(addr.to_raw(), RAW);
        assert!(flags.bounceable);
        assert!(!flags.testnet);
        assert_eq!(addr.to_friendly(true, false), FRIENDLY);
        assert_eq!(
            addr.to_friendly(false, false),
            "UQDa4VOnTYlLvDJ0gZjNYm5PXfSmmtL6Vs6A_CZEtXCNIHd6"
        );
    }

    #[test]
    fn from_str_accepts_both_forms() {
        let a: StdAddress = FRIENDLY.parse().unwrap();
        let b: StdAddress = RAW.parse().unwrap();
        assert_eq!(a, b);
        let testnet: StdAddress = "kQDa4VOnTYlLvDJ0gZjNYm5PXfSmmtL6Vs6A_CZEtXCNIJE1".parse().unwrap();
        assert_eq!(testnet, a);
    }

    #[test]
    fn bad_checksum_is_rejected() {
        let mut broken = FRIENDLY.to_string();
        broken.replace_range(47..48, "A");
        assert!(StdAddress::parse_friendly(&broken).is_err());
        assert!("-1:abcd".parse::<StdAddress>().is_err());
    }

    #[test]
    fn msg_address_variants_store_and_load() {
        let std = MsgAddress::Std(RAW.parse().unwrap());
        let ext = MsgAddress::External {
            bits: 12,
            data: vec![0xab, 0xc0],
        };
        let mut b = CellBuilder::new();
        std.store(&mut b).unwrap();
        ext.store(&mut b).unwrap();
        MsgAddress::None.store(&mut b).unwrap();
        let cell = b.build().unwrap();
        let mut s = cell.parse();
        assert_eq!(MsgAddress::load(&mut s).unwrap(), std);
        assert_eq!(MsgAddress::load(&mut s).unwrap(), ext);
        assert_eq!(MsgAddress::load(&mut s).unwrap(), MsgAddress::None);
    }

    #[test]
    fn masterchain_raw_address() {
        let addr: StdAddress = format!("-1:{}", "33".repeat(32)).parse().unwrap();
        assert!(addr.is_masterchain());
        assert_eq!(addr.workchain, -1);
    }
}
