use crate::builder::CellBuilder;
use crate::cell::Cell;
use crate::dict;
use crate::error::CellResult;
use crate::slice::CellSlice;

/// `currencies$_ grams:Grams other:ExtraCurrencyCollection`. Extra
/// currencies are kept as the raw dictionary root.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CurrencyCollection {
    pub grams: u128,
    pub other: Option<Cell>,
}

impl CurrencyCollection {
    pub fn from_grams(grams: u128) -> Self {
        Self { grams, other: None }
    }

    pub fn load(slice: &mut CellSlice<'_>) -> CellResult<Self> {
        let grams = slice.load_coins()?;
        let other = dict::load_dict(slice)?.cloned();
        Ok(Self { grams, other })
    }

    pub fn store(&self, builder: &mut CellBuilder) -> CellResult<()> {
        builder.store_coins(self.grams)?;
        dict::store_dict(builder, self.other.as_ref())
    }
}
