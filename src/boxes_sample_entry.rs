//! サンプルエントリーとその下に配置されるボックスをまとめたモジュール
//!
//! このモジュールは内部的なもので、構造体などの外部への提供は boxes モジュールを通して行う
use crate::{
    BaseBox, BoxHeader, BoxSize, BoxType, Decode, Encode, Error, FixedPointNumber, FullBox,
    FullBoxFlags, FullBoxHeader, Result,
    basic_types::as_box_object,
    boxes::{check_fully_consumed, check_mandatory_box},
    registry::{DecodeBox, DecodeContext, decode_standalone},
};

/// 音声系のサンプルエントリーに共通のフィールドをまとめた構造体
///
/// エンコード後のサイズは常に [`AudioSampleEntryFields::SIZE`] バイトとなる
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AudioSampleEntryFields {
    /// 参照するデータエントリーのインデックス
    pub data_reference_index: u16,

    /// チャンネル数
    pub channelcount: u16,

    /// サンプルあたりのビット数
    pub samplesize: u16,

    /// サンプリングレート（16.16 固定小数点数の整数部のみ）
    ///
    /// 小数部はデコード時に切り捨てられ、エンコード時には 0 として書き込まれる
    pub samplerate: u16,
}

impl AudioSampleEntryFields {
    /// エンコード後のサイズ（SampleEntry の 8 バイトと AudioSampleEntry の 20 バイト）
    pub const SIZE: usize = 8 + 20;

    /// [`AudioSampleEntryFields::data_reference_index`] のデフォルト値
    pub const DEFAULT_DATA_REFERENCE_INDEX: u16 = 1;

    /// [`AudioSampleEntryFields::samplesize`] のデフォルト値 (16)
    pub const DEFAULT_SAMPLESIZE: u16 = 16;
}

impl Default for AudioSampleEntryFields {
    fn default() -> Self {
        Self {
            data_reference_index: Self::DEFAULT_DATA_REFERENCE_INDEX,
            channelcount: 0,
            samplesize: 0,
            samplerate: 0,
        }
    }
}

impl Encode for AudioSampleEntryFields {
    fn encode(&self, buf: &mut [u8]) -> Result<usize> {
        let mut offset = 0;
        offset += [0u8; 6].encode(&mut buf[offset..])?;
        offset += self.data_reference_index.encode(&mut buf[offset..])?;
        offset += [0u8; 4 * 2].encode(&mut buf[offset..])?;
        offset += self.channelcount.encode(&mut buf[offset..])?;
        offset += self.samplesize.encode(&mut buf[offset..])?;
        offset += [0u8; 2].encode(&mut buf[offset..])?; // pre_defined
        offset += [0u8; 2].encode(&mut buf[offset..])?; // reserved
        offset += FixedPointNumber::new(self.samplerate, 0u16).encode(&mut buf[offset..])?;
        Ok(offset)
    }
}

impl Decode for AudioSampleEntryFields {
    fn decode(buf: &[u8]) -> Result<(Self, usize)> {
        let mut offset = 0;
        let _ = <[u8; 6]>::decode_at(buf, &mut offset)?;
        let data_reference_index = u16::decode_at(buf, &mut offset)?;
        let _ = <[u8; 4 * 2]>::decode_at(buf, &mut offset)?;
        let channelcount = u16::decode_at(buf, &mut offset)?;
        let samplesize = u16::decode_at(buf, &mut offset)?;
        let _ = <[u8; 2]>::decode_at(buf, &mut offset)?;
        let _ = <[u8; 2]>::decode_at(buf, &mut offset)?;
        let samplerate = FixedPointNumber::<u16, u16>::decode_at(buf, &mut offset)?;
        Ok((
            Self {
                data_reference_index,
                channelcount,
                samplesize,
                samplerate: samplerate.integer,
            },
            offset,
        ))
    }
}

/// [ISO/IEC 14496-12] AudioSampleEntry class (親: StsdBox)
///
/// `mp4a` や、暗号化された音声を表す `enca` などのサンプルエントリーを表現する。
/// 固定長のフィールドの後に任意の子ボックスが続き、そのうち `esds` と `sinf` については
/// 型付きで参照できるようになっている。
///
/// ボックス種別は可変で、[`AudioSampleEntryBox::remove_encryption()`] によって書き換わる。
#[derive(Debug)]
pub struct AudioSampleEntryBox {
    /// ボックス種別
    pub box_type: BoxType,

    /// 音声系サンプルエントリーの固定長フィールド
    pub audio: AudioSampleEntryFields,

    children: Vec<Box<dyn BaseBox>>,
    esds_index: Option<usize>,
    sinf_index: Option<usize>,
}

impl AudioSampleEntryBox {
    /// MPEG-4 Audio 用のボックス種別
    pub const TYPE_MP4A: BoxType = BoxType::Normal(*b"mp4a");

    /// 暗号化された音声用のボックス種別
    pub const TYPE_ENCA: BoxType = BoxType::Normal(*b"enca");

    /// AC-3 用のボックス種別
    pub const TYPE_AC3: BoxType = BoxType::Normal(*b"ac-3");

    /// Enhanced AC-3 用のボックス種別
    pub const TYPE_EC3: BoxType = BoxType::Normal(*b"ec-3");

    /// 既定のレジストリでこの構造体に対応付けられるボックス種別
    pub const KNOWN_TYPES: [BoxType; 4] = [
        Self::TYPE_MP4A,
        Self::TYPE_ENCA,
        Self::TYPE_AC3,
        Self::TYPE_EC3,
    ];

    /// 子ボックスを持たない空のサンプルエントリーを作成する
    pub fn new(box_type: BoxType) -> Self {
        Self {
            box_type,
            audio: AudioSampleEntryFields::default(),
            children: Vec::new(),
            esds_index: None,
            sinf_index: None,
        }
    }

    /// 各フィールドの値と、省略可能な子ボックスを指定してサンプルエントリーを作成する
    pub fn with_fields(
        box_type: BoxType,
        channelcount: u16,
        samplesize: u16,
        samplerate: u16,
        child: Option<Box<dyn BaseBox>>,
    ) -> Self {
        let mut entry = Self::new(box_type);
        entry.audio.channelcount = channelcount;
        entry.audio.samplesize = samplesize;
        entry.audio.samplerate = samplerate;
        if let Some(child) = child {
            entry.add_child(child);
        }
        entry
    }

    /// 子ボックスを末尾に追加する
    ///
    /// [`EsdsBox`] や [`SinfBox`] の場合には、型付きの参照も更新される（同じ種別が複数ある場合は最後のものが優先）
    ///
    /// 参照の対象になるのは具体的な型としてデコード済みの子ボックスのみ。
    /// [`BoxRegistry`](crate::BoxRegistry) に `esds` や `sinf` が登録されていない場合には、
    /// それらは [`UnknownBox`](crate::boxes::UnknownBox) として追加され、参照は更新されない
    pub fn add_child(&mut self, child: Box<dyn BaseBox>) {
        let index = self.children.len();
        if child.is::<EsdsBox>() {
            self.esds_index = Some(index);
        } else if child.is::<SinfBox>() {
            self.sinf_index = Some(index);
        }
        self.children.push(child);
    }

    /// 指定位置の子ボックスを取り除いて返す
    ///
    /// 取り除かれたボックスを指していた型付きの参照はクリアされる
    pub fn remove_child(&mut self, index: usize) -> Option<Box<dyn BaseBox>> {
        if index >= self.children.len() {
            return None;
        }
        let child = self.children.remove(index);
        self.esds_index = index_after_removal(self.esds_index, index);
        self.sinf_index = index_after_removal(self.sinf_index, index);
        Some(child)
    }

    /// 子ボックス群を、元の順番で返す
    pub fn child_boxes(&self) -> &[Box<dyn BaseBox>] {
        &self.children
    }

    /// `esds` 子ボックスへの参照を返す
    pub fn esds_box(&self) -> Option<&EsdsBox> {
        self.esds_index
            .and_then(|i| self.children.get(i))
            .and_then(|b| b.downcast_ref::<EsdsBox>())
    }

    /// `sinf` 子ボックスへの参照を返す
    pub fn sinf_box(&self) -> Option<&SinfBox> {
        self.sinf_index
            .and_then(|i| self.children.get(i))
            .and_then(|b| b.downcast_ref::<SinfBox>())
    }

    /// 暗号化情報を取り除いて、暗号化前のサンプルエントリーに戻す
    ///
    /// ボックス種別が `enca` で、[`SinfBox`] としてデコードされた `sinf` 子ボックスを持つ場合にのみ成功する。
    /// 成功時には `sinf` ボックスが子ボックス群から取り除かれ、
    /// ボックス種別が `sinf` 内の `frma` ボックスに記録された元の種別に書き換えられる。
    /// 取り除かれた `sinf` ボックスは、元のコーデックパラメーターの復元などに使えるように呼び出し元に返される。
    pub fn remove_encryption(&mut self) -> Result<SinfBox> {
        if self.box_type != Self::TYPE_ENCA {
            return Err(Error::invalid_input(format!(
                "Sample entry is not encrypted: {}",
                self.box_type
            ))
            .with_box_type(self.box_type));
        }
        let (Some(index), Some(sinf)) = (self.sinf_index, self.sinf_box()) else {
            if self.children.iter().any(|b| b.box_type() == SinfBox::TYPE) {
                return Err(Error::invalid_input(
                    "Sample entry has a 'sinf' box, but it was not decoded as SinfBox (not registered?)",
                )
                .with_box_type(self.box_type));
            }
            return Err(
                Error::invalid_input("Sample entry does not have 'sinf' box")
                    .with_box_type(self.box_type),
            );
        };
        let original_format = sinf.frma_box.data_format_box_type();

        let removed = self
            .remove_child(index)
            .ok_or_else(|| Error::invalid_data("'sinf' box index is out of range"))?;
        let sinf = removed
            .downcast::<SinfBox>()
            .map_err(|_| Error::invalid_data("'sinf' lookup does not point to a 'sinf' box"))?;

        tracing::debug!(
            from = %self.box_type,
            to = %original_format,
            "removed encryption from audio sample entry"
        );
        self.box_type = original_format;
        Ok(*sinf)
    }

    fn payload_size(&self) -> u64 {
        AudioSampleEntryFields::SIZE as u64
            + self.children.iter().map(|b| b.box_size()).sum::<u64>()
    }
}

fn index_after_removal(current: Option<usize>, removed: usize) -> Option<usize> {
    match current {
        Some(i) if i == removed => None,
        Some(i) if i > removed => Some(i - 1),
        other => other,
    }
}

impl Encode for AudioSampleEntryBox {
    fn encode(&self, buf: &mut [u8]) -> Result<usize> {
        let header = BoxHeader::from_payload_size(self.box_type, self.payload_size());
        let mut offset = header.encode(buf)?;
        offset += self.audio.encode(&mut buf[offset..])?;
        for b in &self.children {
            offset += b.encode(&mut buf[offset..])?;
        }
        Ok(offset)
    }
}

impl DecodeBox for AudioSampleEntryBox {
    fn decode_payload(
        header: BoxHeader,
        payload: &[u8],
        start_pos: u64,
        ctx: &DecodeContext<'_>,
    ) -> Result<Self> {
        let mut offset = 0;
        let audio = AudioSampleEntryFields::decode_at(payload, &mut offset)?;

        let mut entry = Self::new(header.box_type);
        entry.audio = audio;

        let children_pos = start_pos.saturating_add((header.external_size() + offset) as u64);
        ctx.decode_children(header.box_type, &payload[offset..], children_pos, |child| {
            entry.add_child(child)
        })?;
        Ok(entry)
    }
}

impl Decode for AudioSampleEntryBox {
    fn decode(buf: &[u8]) -> Result<(Self, usize)> {
        decode_standalone(buf)
    }
}

impl BaseBox for AudioSampleEntryBox {
    fn box_type(&self) -> BoxType {
        self.box_type
    }

    fn box_size(&self) -> u64 {
        BoxSize::with_payload_size(self.box_type, self.payload_size()).get()
    }

    fn children<'a>(&'a self) -> Box<dyn 'a + Iterator<Item = &'a dyn BaseBox>> {
        Box::new(self.children.iter().map(|b| &**b))
    }
}

/// [ISO/IEC 14496-12] ProtectionSchemeInfoBox class (親: [`AudioSampleEntryBox`] など)
///
/// `frma` 以外の子ボックス（`schm`, `schi` など）は中身を解釈せずに元の順番で保持する
#[derive(Debug)]
pub struct SinfBox {
    /// 暗号化前のフォーマットを保持する `frma` ボックス
    pub frma_box: FrmaBox,

    /// `frma` 以外の子ボックス
    pub other_boxes: Vec<Box<dyn BaseBox>>,
}

impl SinfBox {
    /// ボックス種別
    pub const TYPE: BoxType = BoxType::Normal(*b"sinf");

    fn payload_size(&self) -> u64 {
        self.frma_box.box_size() + self.other_boxes.iter().map(|b| b.box_size()).sum::<u64>()
    }
}

impl Encode for SinfBox {
    fn encode(&self, buf: &mut [u8]) -> Result<usize> {
        let header = BoxHeader::from_payload_size(Self::TYPE, self.payload_size());
        let mut offset = header.encode(buf)?;
        offset += self.frma_box.encode(&mut buf[offset..])?;
        for b in &self.other_boxes {
            offset += b.encode(&mut buf[offset..])?;
        }
        Ok(offset)
    }
}

impl DecodeBox for SinfBox {
    fn decode_payload(
        header: BoxHeader,
        payload: &[u8],
        start_pos: u64,
        ctx: &DecodeContext<'_>,
    ) -> Result<Self> {
        header.box_type.expect(Self::TYPE)?;

        let mut frma_box = None;
        let mut other_boxes = Vec::new();
        let children_pos = start_pos.saturating_add(header.external_size() as u64);
        ctx.decode_children(Self::TYPE, payload, children_pos, |child| {
            if frma_box.is_some() {
                other_boxes.push(child);
                return;
            }
            match child.downcast::<FrmaBox>() {
                Ok(b) => frma_box = Some(*b),
                Err(child) => other_boxes.push(child),
            }
        })?;

        Ok(Self {
            frma_box: check_mandatory_box(frma_box, "frma", "sinf")?,
            other_boxes,
        })
    }
}

impl Decode for SinfBox {
    fn decode(buf: &[u8]) -> Result<(Self, usize)> {
        decode_standalone(buf)
    }
}

impl BaseBox for SinfBox {
    fn box_type(&self) -> BoxType {
        Self::TYPE
    }

    fn box_size(&self) -> u64 {
        BoxSize::with_payload_size(Self::TYPE, self.payload_size()).get()
    }

    fn children<'a>(&'a self) -> Box<dyn 'a + Iterator<Item = &'a dyn BaseBox>> {
        Box::new(
            core::iter::empty()
                .chain(core::iter::once(&self.frma_box).map(as_box_object))
                .chain(self.other_boxes.iter().map(|b| &**b)),
        )
    }
}

/// [ISO/IEC 14496-12] OriginalFormatBox class (親: [`SinfBox`])
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FrmaBox {
    /// 暗号化前のサンプルエントリーの四文字コード（例: `mp4a`）
    pub data_format: [u8; 4],
}

impl FrmaBox {
    /// ボックス種別
    pub const TYPE: BoxType = BoxType::Normal(*b"frma");

    /// [`FrmaBox::data_format`] をボックス種別として返す
    pub fn data_format_box_type(&self) -> BoxType {
        BoxType::Normal(self.data_format)
    }
}

impl Encode for FrmaBox {
    fn encode(&self, buf: &mut [u8]) -> Result<usize> {
        let header = BoxHeader::from_payload_size(Self::TYPE, 4);
        let mut offset = header.encode(buf)?;
        offset += self.data_format.encode(&mut buf[offset..])?;
        Ok(offset)
    }
}

impl DecodeBox for FrmaBox {
    fn decode_payload(
        header: BoxHeader,
        payload: &[u8],
        _start_pos: u64,
        _ctx: &DecodeContext<'_>,
    ) -> Result<Self> {
        header.box_type.expect(Self::TYPE)?;

        let mut offset = 0;
        let data_format = <[u8; 4]>::decode_at(payload, &mut offset)?;
        check_fully_consumed(payload, offset, Self::TYPE)?;
        Ok(Self { data_format })
    }
}

impl Decode for FrmaBox {
    fn decode(buf: &[u8]) -> Result<(Self, usize)> {
        decode_standalone(buf)
    }
}

impl BaseBox for FrmaBox {
    fn box_type(&self) -> BoxType {
        Self::TYPE
    }

    fn box_size(&self) -> u64 {
        BoxHeader::MIN_SIZE as u64 + 4
    }

    fn children<'a>(&'a self) -> Box<dyn 'a + Iterator<Item = &'a dyn BaseBox>> {
        Box::new(core::iter::empty())
    }
}

/// [ISO/IEC 14496-14] ESDBox class (親: [`AudioSampleEntryBox`])
///
/// ES_Descriptor の中身は解釈せず、バイト列のまま保持する
#[derive(Debug, Default, Clone, PartialEq, Eq, Hash)]
pub struct EsdsBox {
    /// フルボックスのバージョン
    pub version: u8,

    /// フルボックスのフラグ
    pub flags: FullBoxFlags,

    /// ES_Descriptor のバイト列
    pub descriptor: Vec<u8>,
}

impl EsdsBox {
    /// ボックス種別
    pub const TYPE: BoxType = BoxType::Normal(*b"esds");
}

impl Encode for EsdsBox {
    fn encode(&self, buf: &mut [u8]) -> Result<usize> {
        let payload_size = FullBoxHeader::SIZE as u64 + self.descriptor.len() as u64;
        let header = BoxHeader::from_payload_size(Self::TYPE, payload_size);
        let mut offset = header.encode(buf)?;
        offset += FullBoxHeader::from_box(self).encode(&mut buf[offset..])?;
        offset += self.descriptor.encode(&mut buf[offset..])?;
        Ok(offset)
    }
}

impl DecodeBox for EsdsBox {
    fn decode_payload(
        header: BoxHeader,
        payload: &[u8],
        _start_pos: u64,
        _ctx: &DecodeContext<'_>,
    ) -> Result<Self> {
        header.box_type.expect(Self::TYPE)?;

        let mut offset = 0;
        let full_header = FullBoxHeader::decode_at(payload, &mut offset)?;
        Ok(Self {
            version: full_header.version,
            flags: full_header.flags,
            descriptor: payload[offset..].to_vec(),
        })
    }
}

impl Decode for EsdsBox {
    fn decode(buf: &[u8]) -> Result<(Self, usize)> {
        decode_standalone(buf)
    }
}

impl BaseBox for EsdsBox {
    fn box_type(&self) -> BoxType {
        Self::TYPE
    }

    fn box_size(&self) -> u64 {
        let payload_size = FullBoxHeader::SIZE as u64 + self.descriptor.len() as u64;
        BoxSize::with_payload_size(Self::TYPE, payload_size).get()
    }

    fn children<'a>(&'a self) -> Box<dyn 'a + Iterator<Item = &'a dyn BaseBox>> {
        Box::new(core::iter::empty())
    }
}

impl FullBox for EsdsBox {
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
    use crate::{ErrorKind, boxes::UnknownBox};

    fn boxed(ty: &[u8; 4], payload: &[u8]) -> Vec<u8> {
        let mut bytes = ((8 + payload.len()) as u32).to_be_bytes().to_vec();
        bytes.extend_from_slice(ty);
        bytes.extend_from_slice(payload);
        bytes
    }

    fn audio_fields() -> Vec<u8> {
        let mut fields = vec![0; 6];
        fields.extend_from_slice(&1u16.to_be_bytes()); // data_reference_index
        fields.extend_from_slice(&[0; 8]);
        fields.extend_from_slice(&2u16.to_be_bytes()); // channelcount
        fields.extend_from_slice(&16u16.to_be_bytes()); // samplesize
        fields.extend_from_slice(&[0; 4]);
        fields.extend_from_slice(&[0xbb, 0x80, 0, 0]); // 48000.0
        fields
    }

    fn encrypted_entry_bytes() -> Vec<u8> {
        let esds = boxed(b"esds", &[0, 0, 0, 0, 3, 1, 0]);
        let sinf = [
            boxed(b"frma", b"mp4a"),
            boxed(b"schm", &[0, 0, 0, 0, b'c', b'e', b'n', b'c', 0, 1, 0, 0]),
            boxed(b"schi", &[]),
        ]
        .concat();
        let sinf = boxed(b"sinf", &sinf);
        boxed(b"enca", &[audio_fields(), esds, sinf].concat())
    }

    #[test]
    fn decode_audio_sample_entry() {
        let bytes = encrypted_entry_bytes();
        let (entry, size) = AudioSampleEntryBox::decode(&bytes).unwrap();
        assert_eq!(size, bytes.len());
        assert_eq!(entry.box_type, AudioSampleEntryBox::TYPE_ENCA);
        assert_eq!(entry.audio.data_reference_index, 1);
        assert_eq!(entry.audio.channelcount, 2);
        assert_eq!(entry.audio.samplesize, 16);
        assert_eq!(entry.audio.samplerate, 48000);
        assert_eq!(entry.child_boxes().len(), 2);
        assert_eq!(entry.esds_box().map(|b| b.descriptor.len()), Some(3));

        let sinf = entry.sinf_box().unwrap();
        assert_eq!(sinf.frma_box.data_format, *b"mp4a");
        assert_eq!(sinf.other_boxes.len(), 2);

        assert_eq!(entry.box_size(), bytes.len() as u64);
        assert_eq!(entry.encode_to_vec().unwrap(), bytes);
    }

    #[test]
    fn sample_rate_fraction_is_dropped() {
        let mut fields = audio_fields();
        let len = fields.len();
        fields[len - 2..].copy_from_slice(&[0x80, 0x00]); // 48000.5
        let bytes = boxed(b"mp4a", &fields);

        let (entry, _) = AudioSampleEntryBox::decode(&bytes).unwrap();
        assert_eq!(entry.audio.samplerate, 48000);

        let encoded = entry.encode_to_vec().unwrap();
        assert_eq!(encoded.len(), bytes.len());
        assert_eq!(&encoded[encoded.len() - 4..], &[0xbb, 0x80, 0, 0]);
    }

    #[test]
    fn child_overshooting_declared_size_is_rejected() {
        let esds = boxed(b"esds", &[0, 0, 0, 0, 3, 1, 0]);
        let mut bytes = boxed(b"mp4a", &[audio_fields(), esds].concat());
        // 宣言サイズを子ボックスの途中までに縮める
        let declared = (bytes.len() - 4) as u32;
        bytes[..4].copy_from_slice(&declared.to_be_bytes());

        let e = AudioSampleEntryBox::decode(&bytes).unwrap_err();
        assert_eq!(e.kind, ErrorKind::InvalidData);
        assert_eq!(e.box_type, Some(AudioSampleEntryBox::TYPE_MP4A));
    }

    #[test]
    fn trailing_bytes_shorter_than_header_are_rejected() {
        let bytes = boxed(b"mp4a", &[audio_fields(), vec![0, 0, 0]].concat());
        let e = AudioSampleEntryBox::decode(&bytes).unwrap_err();
        assert_eq!(e.kind, ErrorKind::InvalidData);
        assert_eq!(e.box_type, Some(AudioSampleEntryBox::TYPE_MP4A));
    }

    #[test]
    fn truncated_fixed_fields_are_rejected() {
        let bytes = boxed(b"mp4a", &audio_fields()[..20]);
        let e = AudioSampleEntryBox::decode(&bytes).unwrap_err();
        assert_eq!(e.kind, ErrorKind::InsufficientBuffer);
    }

    #[test]
    fn new_entry_size() {
        let entry = AudioSampleEntryBox::new(AudioSampleEntryBox::TYPE_MP4A);
        assert_eq!(entry.box_size(), 36);
        assert_eq!(entry.encode_to_vec().unwrap().len(), 36);

        let esds = EsdsBox {
            descriptor: vec![1, 2, 3],
            ..Default::default()
        };
        let entry = AudioSampleEntryBox::with_fields(
            AudioSampleEntryBox::TYPE_MP4A,
            2,
            16,
            44100,
            Some(Box::new(esds)),
        );
        assert_eq!(entry.box_size(), 36 + 15);
        assert_eq!(entry.encode_to_vec().unwrap().len(), 36 + 15);
        assert!(entry.esds_box().is_some());
    }

    #[test]
    fn last_added_child_wins() {
        let mut entry = AudioSampleEntryBox::new(AudioSampleEntryBox::TYPE_MP4A);
        entry.add_child(Box::new(EsdsBox {
            descriptor: vec![1],
            ..Default::default()
        }));
        entry.add_child(Box::new(EsdsBox {
            descriptor: vec![2],
            ..Default::default()
        }));
        assert_eq!(entry.esds_box().unwrap().descriptor, [2]);
    }

    #[test]
    fn remove_child_updates_lookups() {
        let (mut entry, _) = AudioSampleEntryBox::decode(&encrypted_entry_bytes()).unwrap();
        entry.add_child(Box::new(UnknownBox::new(BoxType::Normal(*b"btrt"), vec![0; 12])));

        // esds を消すと sinf の位置が前にずれる
        let removed = entry.remove_child(0).unwrap();
        assert_eq!(removed.box_type(), EsdsBox::TYPE);
        assert!(entry.esds_box().is_none());
        assert!(entry.sinf_box().is_some());
        assert!(entry.remove_child(10).is_none());
    }

    #[test]
    fn remove_encryption() {
        let (mut entry, _) = AudioSampleEntryBox::decode(&encrypted_entry_bytes()).unwrap();
        let size_before = entry.box_size();

        let sinf = entry.remove_encryption().unwrap();
        assert_eq!(sinf.frma_box.data_format, *b"mp4a");
        assert_eq!(entry.box_type, AudioSampleEntryBox::TYPE_MP4A);
        assert!(entry.sinf_box().is_none());
        assert!(entry.child_boxes().iter().all(|b| b.box_type() != SinfBox::TYPE));
        assert!(entry.esds_box().is_some());
        assert_eq!(entry.box_size(), size_before - sinf.box_size());

        let encoded = entry.encode_to_vec().unwrap();
        assert_eq!(&encoded[4..8], b"mp4a");
        assert_eq!(encoded.len() as u64, entry.box_size());
    }

    #[test]
    fn remove_encryption_requires_enca() {
        let bytes = boxed(b"mp4a", &audio_fields());
        let (mut entry, _) = AudioSampleEntryBox::decode(&bytes).unwrap();
        let e = entry.remove_encryption().unwrap_err();
        assert_eq!(e.kind, ErrorKind::InvalidInput);
        assert_eq!(entry.box_type, AudioSampleEntryBox::TYPE_MP4A);
    }

    #[test]
    fn remove_encryption_requires_sinf() {
        let bytes = boxed(b"enca", &audio_fields());
        let (mut entry, _) = AudioSampleEntryBox::decode(&bytes).unwrap();
        let e = entry.remove_encryption().unwrap_err();
        assert_eq!(e.kind, ErrorKind::InvalidInput);
        assert_eq!(entry.box_type, AudioSampleEntryBox::TYPE_ENCA);
    }

    #[test]
    fn sinf_without_frma_is_rejected() {
        let bytes = boxed(b"sinf", &boxed(b"schi", &[]));
        let e = SinfBox::decode(&bytes).unwrap_err();
        assert_eq!(e.kind, ErrorKind::InvalidData);
        assert_eq!(e.box_type, Some(SinfBox::TYPE));
    }

    #[test]
    fn frma_with_extra_bytes_is_rejected() {
        let bytes = boxed(b"frma", b"mp4a!");
        assert!(FrmaBox::decode(&bytes).is_err());
    }
}
