use crate::address::{MsgAddress, StdAddress};
use crate::builder::CellBuilder;
use crate::cell::Cell;
use crate::dict;
use crate::error::{CellError, CellResult};
use crate::slice::CellSlice;

use super::CurrencyCollection;

// ---------------------------------------------------------------------------
// StateInit
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StateInit {
    pub split_depth: Option<u8>,
    /// `(tick, tock)`
    pub special: Option<(bool, bool)>,
    pub code: Option<Cell>,
    pub data: Option<Cell>,
    /// `HashmapE 256 SimpleLib` root.
    pub library: Option<Cell>,
}

impl StateInit {
    pub fn new(code: Cell, data: Cell) -> Self {
        Self {
            code: Some(code),
            data: Some(data),
            ..Self::default()
        }
    }

    pub fn load(slice: &mut CellSlice<'_>) -> CellResult<Self> {
        let split_depth = if slice.load_bit()? {
            Some(slice.load_uint(5)? as u8)
        } else {
            None
        };
        let special = if slice.load_bit()? {
            Some((slice.load_bit()?, slice.load_bit()?))
        } else {
            None
        };
        let code = slice.load_maybe_ref()?;
        let data = slice.load_maybe_ref()?;
        let library = dict::load_dict(slice)?.cloned();
        Ok(Self {
            split_depth,
            special,
            code,
            data,
            library,
        })
    }

    pub fn store(&self, builder: &mut CellBuilder) -> CellResult<()> {
        match self.split_depth {
            Some(depth) => {
                builder.store_bit(true)?;
                builder.store_uint(depth as u64, 5)?;
            }
            None => {
                builder.store_bit(false)?;
            }
        }
        match self.special {
            Some((tick, tock)) => {
                builder.store_bit(true)?;
                builder.store_bit(tick)?;
                builder.store_bit(tock)?;
            }
            None => {
                builder.store_bit(false)?;
            }
        }
        builder.store_maybe_ref(self.code.as_ref())?;
        builder.store_maybe_ref(self.data.as_ref())?;
        dict::store_dict(builder, self.library.as_ref())
    }

    pub fn to_cell(&self) -> CellResult<Cell> {
        let mut b = CellBuilder::new();
        self.store(&mut b)?;
        b.build()
    }
}

// ---------------------------------------------------------------------------
// CommonMsgInfo
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommonMsgInfo {
    Internal {
        ihr_disabled: bool,
        bounce: bool,
        bounced: bool,
        src: MsgAddress,
        dest: StdAddress,
        value: CurrencyCollection,
        ihr_fee: u128,
        fwd_fee: u128,
        created_lt: u64,
        created_at: u32,
    },
    ExternalIn {
        src: MsgAddress,
        dest: StdAddress,
        import_fee: u128,
    },
    ExternalOut {
        src: StdAddress,
        dest: MsgAddress,
        created_lt: u64,
        created_at: u32,
    },
}

impl CommonMsgInfo {
    pub fn load(slice: &mut CellSlice<'_>) -> CellResult<Self> {
        if !slice.load_bit()? {
            let ihr_disabled = slice.load_bit()?;
            let bounce = slice.load_bit()?;
            let bounced = slice.load_bit()?;
            let src = MsgAddress::load(slice)?;
            let dest = StdAddress::load(slice)?;
            let value = CurrencyCollection::load(slice)?;
            let ihr_fee = slice.load_coins()?;
            let fwd_fee = slice.load_coins()?;
            let created_lt = slice.load_u64()?;
            let created_at = slice.load_u32()?;
            return Ok(CommonMsgInfo::Internal {
                ihr_disabled,
                bounce,
                bounced,
                src,
                dest,
                value,
                ihr_fee,
                fwd_fee,
                created_lt,
                created_at,
            });
        }
        if !slice.load_bit()? {
            let src = MsgAddress::load(slice)?;
            if matches!(src, MsgAddress::Std(_)) {
                return Err(CellError::InvalidAddress("external-in source must be external".into()));
            }
            let dest = StdAddress::load(slice)?;
            let import_fee = slice.load_coins()?;
            return Ok(CommonMsgInfo::ExternalIn { src, dest, import_fee });
        }
        let src = StdAddress::load(slice)?;
        let dest = MsgAddress::load(slice)?;
        let created_lt = slice.load_u64()?;
        let created_at = slice.load_u32()?;
        Ok(CommonMsgInfo::ExternalOut {
            src,
            dest,
            created_lt,
            created_at,
        })
    }

    pub fn store(&self, builder: &mut CellBuilder) -> CellResult<()> {
        match self {
            CommonMsgInfo::Internal {
                ihr_disabled,
                bounce,
                bounced,
                src,
                dest,
                value,
                ihr_fee,
                fwd_fee,
                created_lt,
                created_at,
            } => {
                builder.store_bit(false)?;
                builder.store_bit(*ihr_disabled)?;
                builder.store_bit(*bounce)?;
                builder.store_bit(*bounced)?;
                src.store(builder)?;
                dest.store(builder)?;
                value.store(builder)?;
                builder.store_coins(*ihr_fee)?;
                builder.store_coins(*fwd_fee)?;
                builder.store_u64(*created_lt)?;
                builder.store_u32(*created_at)?;
            }
            CommonMsgInfo::ExternalIn { src, dest, import_fee } => {
                builder.store_uint(0b10, 2)?;
                src.store(builder)?;
                dest.store(builder)?;
                builder.store_coins(*import_fee)?;
            }
            CommonMsgInfo::ExternalOut {
                src,
                dest,
                created_lt,
                created_at,
            } => {
                builder.store_uint(0b11, 2)?;
                src.store(builder)?;
                dest.store(builder)?;
                builder.store_u64(*created_lt)?;
                builder.store_u32(*created_at)?;
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Message
// ---------------------------------------------------------------------------

/// `message$_ info:CommonMsgInfo init:(Maybe (Either StateInit ^StateInit))
/// body:(Either X ^X)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub info: CommonMsgInfo,
    pub init: Option<StateInit>,
    pub body: Cell,
}

impl Message {
    pub fn load(cell: &Cell) -> CellResult<Self> {
        let mut s = cell.parse();
        let info = CommonMsgInfo::load(&mut s)?;
        let init = if s.load_bit()? {
            if s.load_bit()? {
                let init_cell = s.load_reference()?;
                let mut init_slice = init_cell.parse();
                Some(StateInit::load(&mut init_slice)?)
            } else {
                Some(StateInit::load(&mut s)?)
            }
        } else {
            None
        };
        let body = if s.load_bit()? {
            s.load_reference()?.clone()
        } else {
            s.to_cell()?
        };
        Ok(Self { info, init, body })
    }

    /// Serializes with the init always in a ref; the body is inlined when it
    /// fits.
    pub fn to_cell(&self) -> CellResult<Cell> {
        let mut b = CellBuilder::new();
        self.info.store(&mut b)?;
        match &self.init {
            Some(init) => {
                b.store_uint(0b11, 2)?;
                b.store_reference(init.to_cell()?)?;
            }
            None => {
                b.store_bit(false)?;
            }
        }
        if b.has_capacity(1 + self.body.bit_len(), self.body.refs().len()) {
            b.store_bit(false)?;
            b.store_slice(&self.body.parse())?;
        } else {
            b.store_bit(true)?;
            b.store_reference(self.body.clone())?;
        }
        b.build()
    }

    pub fn destination(&self) -> Option<StdAddress> {
        match &self.info {
            CommonMsgInfo::Internal { dest, .. } | CommonMsgInfo::ExternalIn { dest, .. } => Some(*dest),
            CommonMsgInfo::ExternalOut { .. } => None,
        }
    }

    pub fn source(&self) -> Option<StdAddress> {
        match &self.info {
            CommonMsgInfo::Internal { src, .. } => src.as_std().copied(),
            CommonMsgInfo::ExternalOut { src, .. } => Some(*src),
            CommonMsgInfo::ExternalIn { .. } => None,
        }
    }

    pub fn is_internal(&self) -> bool {
        matches!(self.info, CommonMsgInfo::Internal { .. })
    }

    pub fn is_external_in(&self) -> bool {
        matches!(self.info, CommonMsgInfo::ExternalIn { .. })
    }

    pub fn value(&self) -> u128 {
        match &self.info {
            CommonMsgInfo::Internal { value, .. } => value.grams,
            _ => 0,
        }
    }

    /// The 32-bit opcode at the start of the body, if there is one.
    pub fn opcode(&self) -> Option<u32> {
        self.body.parse().load_u32().ok()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cell::HashBytes;

    fn addr(byte: u8) -> StdAddress {
        StdAddress::new(0, HashBytes([byte; 32]))
    }

    fn body(op: u32) -> Cell {
        let mut b = CellBuilder::new();
        b.store_u32(op).unwrap();
        b.store_u64(7).unwrap();
        b.build().unwrap()
    }

    #[test]
    fn internal_message_with_init_and_body() {
        let msg = Message {
            info: CommonMsgInfo::Internal {
                ihr_disabled: true,
                bounce: true,
                bounced: false,
                src: addr(1).into(),
                dest: addr(2),
                value: CurrencyCollection::from_grams(1_500_000_000),
                ihr_fee: 0,
                fwd_fee: 666_672,
                created_lt: 42,
                created_at: 1_700_000_000,
            },
            init: Some(StateInit::new(Cell::empty(), body(1))),
            body: body(0x0f8a_7ea5),
        };
        let cell = msg.to_cell().unwrap();
        let back = Message::load(&cell).unwrap();
        assert_eq!(back, msg);
        assert_eq!(back.destination(), Some(addr(2)));
        assert_eq!(back.source(), Some(addr(1)));
        assert_eq!(back.value(), 1_500_000_000);
        assert_eq!(back.opcode(), Some(0x0f8a_7ea5));
    }

    #[test]
    fn external_in_message() {
        let msg = Message {
            info: CommonMsgInfo::ExternalIn {
                src: MsgAddress::None,
                dest: addr(3),
                import_fee: 0,
            },
            init: None,
            body: body(5),
        };
        let back = Message::load(&msg.to_cell().unwrap()).unwrap();
        assert!(back.is_external_in());
        assert_eq!(back.source(), None);
        assert_eq!(back.body, body(5));
    }

    #[test]
    fn external_out_has_no_destination() {
        let msg = Message {
            info: CommonMsgInfo::ExternalOut {
                src: addr(4),
                dest: MsgAddress::None,
                created_lt: 1,
                created_at: 2,
            },
            init: None,
            body: Cell::empty(),
        };
        let back = Message::load(&msg.to_cell().unwrap()).unwrap();
        assert_eq!(back.destination(), None);
        assert_eq!(back.opcode(), None);
    }
}
