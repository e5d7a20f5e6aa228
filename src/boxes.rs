//! ボックス群を定義するためのモジュール
//!
//! 具体的な種別を持つボックスは、種別ごとのレイアウトに従ってデコード・エンコードされる。
//! [`BoxRegistry`](crate::BoxRegistry) に登録されていない種別のボックスは [`UnknownBox`] として扱われ、
//! ペイロードがそのまま保持される。
use crate::{BaseBox, BoxHeader, BoxSize, BoxType, Decode, Encode, Error, Result};

pub use crate::boxes_moov_tree::StssBox;
pub use crate::boxes_sample_entry::{
    AudioSampleEntryBox, AudioSampleEntryFields, EsdsBox, FrmaBox, SinfBox,
};

/// 未知のボックスをペイロードごと保持するための構造体
///
/// ヘッダーのサイズフィールドの形式（32 ビット / 64 ビット / 0）も保持するので、
/// デコード結果をそのままエンコードすると元と同じバイト列になる
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct UnknownBox {
    /// ボックス種別
    pub box_type: BoxType,

    /// デコード時のヘッダーに記載されていたサイズ
    pub box_size: BoxSize,

    /// ペイロード
    pub payload: Vec<u8>,
}

impl UnknownBox {
    /// 種別とペイロードを指定して、未知のボックスを作成する
    pub fn new(box_type: BoxType, payload: Vec<u8>) -> Self {
        Self {
            box_type,
            box_size: BoxSize::with_payload_size(box_type, payload.len() as u64),
            payload,
        }
    }

    pub(crate) fn from_header_and_payload(header: BoxHeader, payload: &[u8]) -> Self {
        Self {
            box_type: header.box_type,
            box_size: header.box_size,
            payload: payload.to_vec(),
        }
    }

    fn header(&self) -> BoxHeader {
        BoxHeader {
            box_type: self.box_type,
            box_size: self.box_size,
        }
    }
}

impl Encode for UnknownBox {
    fn encode(&self, buf: &mut [u8]) -> Result<usize> {
        let header = self.header();
        let actual = header.external_size() as u64 + self.payload.len() as u64;
        if header.box_size != BoxSize::VARIABLE_SIZE && header.box_size.get() != actual {
            return Err(Error::invalid_input(format!(
                "Box size field ({}) does not match the payload size ({actual})",
                header.box_size.get()
            ))
            .with_box_type(self.box_type));
        }

        let mut offset = header.encode(buf)?;
        offset += self.payload.encode(&mut buf[offset..])?;
        Ok(offset)
    }
}

impl Decode for UnknownBox {
    fn decode(buf: &[u8]) -> Result<(Self, usize)> {
        let (header, payload) = BoxHeader::decode_header_and_payload(buf)?;
        Ok((
            Self::from_header_and_payload(header, payload),
            header.external_size() + payload.len(),
        ))
    }
}

impl BaseBox for UnknownBox {
    fn box_type(&self) -> BoxType {
        self.box_type
    }

    fn box_size(&self) -> u64 {
        self.header().external_size() as u64 + self.payload.len() as u64
    }

    fn is_unknown_box(&self) -> bool {
        true
    }

    fn children<'a>(&'a self) -> Box<dyn 'a + Iterator<Item = &'a dyn BaseBox>> {
        Box::new(core::iter::empty())
    }
}

/// ペイロードの末尾まで消費されたかどうかを確認する
pub(crate) fn check_fully_consumed(payload: &[u8], offset: usize, box_type: BoxType) -> Result<()> {
    if offset != payload.len() {
        return Err(Error::invalid_data(format!(
            "Unconsumed {} bytes at the end of the box '{box_type}'",
            payload.len().saturating_sub(offset)
        )));
    }
    Ok(())
}

pub(crate) fn check_mandatory_box<T>(maybe_box: Option<T>, expected: &str, parent: &str) -> Result<T> {
    maybe_box.ok_or_else(|| {
        Error::invalid_data(format!(
            "Missing mandatory '{expected}' box in '{parent}' box"
        ))
    })
}
