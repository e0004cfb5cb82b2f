use std::borrow::Cow;

use h3o::CellIndex;
use heed::{
    BoxedError,
    byteorder::{BigEndian, ByteOrder},
};
use roaring::RoaringBitmap;

/// Cells are stored big endian so a cursor walks them in index order.
pub struct CellKeyCodec;

impl<'a> heed::BytesEncode<'a> for CellKeyCodec {
    type EItem = CellIndex;

    fn bytes_encode(cell: &'a Self::EItem) -> Result<Cow<'a, [u8]>, BoxedError> {
        let output: u64 = (*cell).into();
        Ok(Cow::Owned(output.to_be_bytes().to_vec()))
    }
}

impl heed::BytesDecode<'_> for CellKeyCodec {
    type DItem = CellIndex;

    fn bytes_decode(bytes: &'_ [u8]) -> Result<Self::DItem, BoxedError> {
        if bytes.len() != size_of::<u64>() {
            return Err(format!("a cell key is 8 bytes long, got {}", bytes.len()).into());
        }
        let cell = BigEndian::read_u64(bytes);
        Ok(cell.try_into()?)
    }
}

/// The ids of the keys registered in a cell.
pub struct RoaringBitmapCodec;

impl heed::BytesDecode<'_> for RoaringBitmapCodec {
    type DItem = RoaringBitmap;

    fn bytes_decode(bytes: &[u8]) -> Result<Self::DItem, BoxedError> {
        RoaringBitmap::deserialize_from(bytes).map_err(Into::into)
    }
}

impl heed::BytesEncode<'_> for RoaringBitmapCodec {
    type EItem = RoaringBitmap;

    fn bytes_encode(item: &Self::EItem) -> Result<Cow<'_, [u8]>, BoxedError> {
        let mut bytes = Vec::with_capacity(item.serialized_size());
        item.serialize_into(&mut bytes)?;
        Ok(Cow::Owned(bytes))
    }
}
