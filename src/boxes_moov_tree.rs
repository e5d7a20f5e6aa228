//! moov の下（stbl 以下）に配置されるボックスをまとめたモジュール
//!
//! このモジュールは内部的なもので、構造体などの外部への提供は boxes モジュールを通して行う
use crate::{
    BaseBox, BoxHeader, BoxType, Decode, Encode, Error, FullBox, FullBoxFlags, FullBoxHeader,
    Result,
    boxes::check_fully_consumed,
    registry::{DecodeBox, DecodeContext, decode_standalone},
};

/// [ISO/IEC 14496-12] SyncSampleBox class (親: StblBox)
///
/// ランダムアクセス可能なサンプル（映像ならキーフレーム）の番号を昇順に並べたもの。
/// このボックスが存在しないトラックでは、全てのサンプルが同期サンプルとなる。
#[derive(Debug, Default, Clone, PartialEq, Eq, Hash)]
pub struct StssBox {
    /// フルボックスのバージョン
    pub version: u8,

    /// フルボックスのフラグ
    pub flags: FullBoxFlags,

    /// 同期サンプルの番号（1 始まり）
    ///
    /// [`StssBox::is_sync_sample()`] は昇順に並んでいることを前提としており、
    /// デコード時に並び替えは行わない
    pub sample_numbers: Vec<u32>,
}

impl StssBox {
    /// ボックス種別
    pub const TYPE: BoxType = BoxType::Normal(*b"stss");

    /// 同期サンプルの数
    pub fn entry_count(&self) -> u32 {
        self.sample_numbers.len() as u32
    }

    /// 指定のサンプル番号（1 始まり）が同期サンプルかどうかを二分探索で判定する
    ///
    /// `sample_numbers` が昇順でない場合は偽陰性になり得るが、パニックはしない
    pub fn is_sync_sample(&self, sample_number: u32) -> bool {
        // 昇順に並んでいるならば、要素 >= sample_number となる最初の位置が候補となる
        let i = self.sample_numbers.partition_point(|&n| n < sample_number);
        self.sample_numbers.get(i) == Some(&sample_number)
    }
}

impl Encode for StssBox {
    fn encode(&self, buf: &mut [u8]) -> Result<usize> {
        let header = BoxHeader::from_payload_size(Self::TYPE, self.box_size() - 8);
        let mut offset = header.encode(buf)?;
        offset += FullBoxHeader::from_box(self).encode(&mut buf[offset..])?;
        offset += self.entry_count().encode(&mut buf[offset..])?;
        for sample_number in &self.sample_numbers {
            offset += sample_number.encode(&mut buf[offset..])?;
        }
        Ok(offset)
    }
}

impl DecodeBox for StssBox {
    fn decode_payload(
        header: BoxHeader,
        payload: &[u8],
        _start_pos: u64,
        _ctx: &DecodeContext<'_>,
    ) -> Result<Self> {
        header.box_type.expect(Self::TYPE)?;

        let mut offset = 0;
        let full_header = FullBoxHeader::decode_at(payload, &mut offset)?;
        let count = u32::decode_at(payload, &mut offset)? as usize;

        // 細工されたエントリー数で巨大なメモリ確保をしないように、先に残りサイズと照合する
        let remaining = payload.len() - offset;
        if remaining / 4 < count {
            return Err(Error::with_reason(
                crate::ErrorKind::InsufficientBuffer,
                format!(
                    "entry_count={count} requires {} bytes, but only {remaining} bytes remain",
                    count.saturating_mul(4)
                ),
            ));
        }

        let mut sample_numbers = Vec::with_capacity(count);
        for _ in 0..count {
            sample_numbers.push(u32::decode_at(payload, &mut offset)?);
        }

        check_fully_consumed(payload, offset, Self::TYPE)?;

        Ok(Self {
            version: full_header.version,
            flags: full_header.flags,
            sample_numbers,
        })
    }
}

impl Decode for StssBox {
    fn decode(buf: &[u8]) -> Result<(Self, usize)> {
        decode_standalone(buf)
    }
}

impl BaseBox for StssBox {
    fn box_type(&self) -> BoxType {
        Self::TYPE
    }

    fn box_size(&self) -> u64 {
        // ヘッダー + バージョンとフラグ + エントリー数 + エントリー
        8 + 4 + 4 + 4 * self.sample_numbers.len() as u64
    }

    fn children<'a>(&'a self) -> Box<dyn 'a + Iterator<Item = &'a dyn BaseBox>> {
        Box::new(core::iter::empty())
    }
}

impl FullBox for StssBox {
    fn full_box_version(&self) -> u8 {
        self.version
    }

    fn full_box_flags(&self) -> FullBoxFlags {
        self.flags
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorKind;

    fn stss(sample_numbers: &[u32]) -> StssBox {
        StssBox {
            sample_numbers: sample_numbers.to_vec(),
            ..Default::default()
        }
    }

    #[test]
    fn decode_stss() {
        let bytes = [
            0, 0, 0, 24, b's', b't', b's', b's', // header
            1, 0, 0, 2, // version, flags
            0, 0, 0, 2, // entry_count
            0, 0, 0, 1, 0, 0, 0, 61, // entries
        ];
        let (b, size) = StssBox::decode(&bytes).unwrap();
        assert_eq!(size, bytes.len());
        assert_eq!(b.version, 1);
        assert_eq!(b.flags.get(), 2);
        assert_eq!(b.sample_numbers, [1, 61]);
        assert_eq!(b.entry_count(), 2);
        assert_eq!(b.box_size(), 24);
        assert_eq!(b.encode_to_vec().unwrap(), bytes);
    }

    #[test]
    fn is_sync_sample() {
        let b = stss(&[1, 61, 121, 181]);
        for n in [1, 61, 121, 181] {
            assert!(b.is_sync_sample(n), "{n}");
        }
        for n in [0, 2, 60, 62, 180, 182, u32::MAX] {
            assert!(!b.is_sync_sample(n), "{n}");
        }
    }

    #[test]
    fn is_sync_sample_on_empty_box() {
        let b = stss(&[]);
        assert!(!b.is_sync_sample(0));
        assert!(!b.is_sync_sample(1));
    }

    #[test]
    fn unsorted_entries_do_not_panic() {
        let b = stss(&[10, 1, 5]);
        // 結果は不定だが、パニックしないことだけを確認する
        let _ = b.is_sync_sample(1);
        let _ = b.is_sync_sample(7);
    }

    #[test]
    fn huge_entry_count_is_rejected_without_allocation() {
        let bytes = [
            0, 0, 0, 20, b's', b't', b's', b's', 0, 0, 0, 0, 0xff, 0xff, 0xff, 0xff, 0, 0, 0, 1,
        ];
        let e = StssBox::decode(&bytes).unwrap_err();
        assert_eq!(e.kind, ErrorKind::InsufficientBuffer);
        assert_eq!(e.box_type, Some(StssBox::TYPE));
    }

    #[test]
    fn trailing_bytes_are_rejected() {
        let bytes = [
            0, 0, 0, 18, b's', b't', b's', b's', 0, 0, 0, 0, 0, 0, 0, 0, 0xab, 0xcd,
        ];
        let e = StssBox::decode(&bytes).unwrap_err();
        assert_eq!(e.kind, ErrorKind::InvalidData);
    }

    #[test]
    fn wrong_box_type_is_rejected() {
        let bytes = [0, 0, 0, 16, b's', b't', b's', b'z', 0, 0, 0, 0, 0, 0, 0, 0];
        assert!(StssBox::decode(&bytes).is_err());
    }
}
