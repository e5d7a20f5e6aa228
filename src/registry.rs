//! ボックス種別からデコード関数を引くためのレジストリと、それを使って再帰的にボックスをデコードする仕組み
use std::{collections::BTreeMap, sync::OnceLock};

use crate::{
    BaseBox, BoxHeader, BoxSize, BoxType, Decode, Error, ErrorKind, Result,
    boxes::{AudioSampleEntryBox, EsdsBox, FrmaBox, SinfBox, StssBox, UnknownBox},
    codec::with_box_type,
};

/// レジストリに登録されるデコード関数の型
///
/// 引数はデコード済みのヘッダー、ヘッダーを除いたペイロード、ボックス先頭の入力全体における位置、
/// そして子ボックスのデコードに使うコンテキスト
pub type DecodeBoxFn =
    fn(BoxHeader, &[u8], u64, &DecodeContext<'_>) -> Result<Box<dyn BaseBox>>;

/// レジストリ経由でデコード可能なボックスが実装するトレイト
pub trait DecodeBox: BaseBox + Sized {
    /// ヘッダーのデコードが済んだ状態で、ペイロード部分からボックスを構築する
    ///
    /// `payload` はヘッダーで宣言されたサイズちょうどの長さを持ち、実装はその全てを消費する必要がある
    fn decode_payload(
        header: BoxHeader,
        payload: &[u8],
        start_pos: u64,
        ctx: &DecodeContext<'_>,
    ) -> Result<Self>;
}

fn decode_as<T: DecodeBox>(
    header: BoxHeader,
    payload: &[u8],
    start_pos: u64,
    ctx: &DecodeContext<'_>,
) -> Result<Box<dyn BaseBox>> {
    let b = T::decode_payload(header, payload, start_pos, ctx)?;
    Ok(Box::new(b))
}

/// 単体のボックスを既定のレジストリを使ってデコードする
///
/// 各ボックスの [`Decode`](crate::Decode) 実装から利用される
pub(crate) fn decode_standalone<T: DecodeBox>(buf: &[u8]) -> Result<(T, usize)> {
    let (header, payload) = BoxHeader::decode_header_and_payload(buf)?;
    let ctx = DecodeContext::root(BoxRegistry::shared(), BoxDecoderOptions::default());
    let b = with_box_type(header.box_type, || {
        T::decode_payload(header, payload, 0, &ctx)
    })?;
    Ok((b, header.external_size() + payload.len()))
}

/// ボックス種別とデコード関数の対応表
#[derive(Debug, Clone)]
pub struct BoxRegistry {
    decoders: BTreeMap<BoxType, DecodeBoxFn>,
}

impl BoxRegistry {
    /// 何も登録されていない空のレジストリを作成する
    ///
    /// この場合は全てのボックスが [`UnknownBox`] としてデコードされる
    pub fn new() -> Self {
        Self {
            decoders: BTreeMap::new(),
        }
    }

    /// このライブラリが提供するボックスを全て登録したレジストリを作成する
    pub fn with_default_boxes() -> Self {
        let mut registry = Self::new();
        for ty in AudioSampleEntryBox::KNOWN_TYPES {
            registry.register_box::<AudioSampleEntryBox>(ty);
        }
        registry.register_box::<StssBox>(StssBox::TYPE);
        registry.register_box::<SinfBox>(SinfBox::TYPE);
        registry.register_box::<FrmaBox>(FrmaBox::TYPE);
        registry.register_box::<EsdsBox>(EsdsBox::TYPE);
        registry
    }

    /// プロセス内で共有される、既定のボックスを登録済みのレジストリを返す
    pub fn shared() -> &'static Self {
        static SHARED: OnceLock<BoxRegistry> = OnceLock::new();
        SHARED.get_or_init(Self::with_default_boxes)
    }

    /// デコード関数を登録する
    ///
    /// 既に同じ種別の関数が登録されていた場合には置き換えて、古い関数を返す
    pub fn register(&mut self, box_type: BoxType, decode: DecodeBoxFn) -> Option<DecodeBoxFn> {
        self.decoders.insert(box_type, decode)
    }

    /// [`DecodeBox`] を実装する型を、指定の種別のデコーダーとして登録する
    pub fn register_box<T: DecodeBox>(&mut self, box_type: BoxType) -> Option<DecodeBoxFn> {
        self.register(box_type, decode_as::<T>)
    }

    /// 指定の種別に対応するデコード関数を返す
    pub fn get(&self, box_type: BoxType) -> Option<DecodeBoxFn> {
        self.decoders.get(&box_type).copied()
    }

    /// 指定の種別が登録済みかどうかを判定する
    pub fn contains(&self, box_type: BoxType) -> bool {
        self.decoders.contains_key(&box_type)
    }
}

impl Default for BoxRegistry {
    fn default() -> Self {
        Self::with_default_boxes()
    }
}

/// [`BoxDecoder`] の設定
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoxDecoderOptions {
    /// ボックスの入れ子の深さの上限
    ///
    /// 細工された入力によって再帰が深くなり過ぎることを防ぐためのもの
    pub max_depth: usize,
}

impl BoxDecoderOptions {
    /// [`BoxDecoderOptions::max_depth`] のデフォルト値
    pub const DEFAULT_MAX_DEPTH: usize = 32;
}

impl Default for BoxDecoderOptions {
    fn default() -> Self {
        Self {
            max_depth: Self::DEFAULT_MAX_DEPTH,
        }
    }
}

/// バイト列からボックス列をデコードするためのデコーダー
#[derive(Debug, Clone)]
pub struct BoxDecoder {
    registry: BoxRegistry,
    options: BoxDecoderOptions,
}

impl BoxDecoder {
    /// 既定のレジストリと設定でデコーダーを作成する
    #[expect(clippy::new_without_default)]
    pub fn new() -> Self {
        Self::with_options(BoxDecoderOptions::default())
    }

    /// 既定のレジストリと指定の設定でデコーダーを作成する
    pub fn with_options(options: BoxDecoderOptions) -> Self {
        Self::with_registry(BoxRegistry::with_default_boxes(), options)
    }

    /// 指定のレジストリと設定でデコーダーを作成する
    pub fn with_registry(registry: BoxRegistry, options: BoxDecoderOptions) -> Self {
        Self { registry, options }
    }

    /// デコーダーが使うレジストリを返す
    pub fn registry(&self) -> &BoxRegistry {
        &self.registry
    }

    /// デコーダーが使うレジストリを変更するための可変参照を返す
    pub fn registry_mut(&mut self) -> &mut BoxRegistry {
        &mut self.registry
    }

    /// デコーダーの設定を返す
    pub fn options(&self) -> &BoxDecoderOptions {
        &self.options
    }

    /// `buf` の先頭にあるボックスを一つデコードする
    ///
    /// `start_pos` は `buf` の先頭が入力全体のどの位置にあたるかを示す値で、子ボックスの位置の計算に使われる。
    ///
    /// 成功時にはデコードされたボックスと、消費したバイト数（宣言されたボックスサイズと常に等しい）が返される。
    /// `buf` が空の場合はボックス境界で入力が終わったことを意味するので、エラーではなく `Ok(None)` が返される。
    pub fn decode_box(
        &self,
        buf: &[u8],
        start_pos: u64,
    ) -> Result<Option<(Box<dyn BaseBox>, usize)>> {
        self.root_context().decode_box(buf, start_pos)
    }

    /// `buf` に含まれるトップレベルのボックスを末尾まで全てデコードする
    pub fn decode_boxes(&self, buf: &[u8]) -> Result<Vec<Box<dyn BaseBox>>> {
        let ctx = self.root_context();
        let mut boxes = Vec::new();
        let mut offset = 0;
        while let Some((b, size)) = ctx.decode_box(&buf[offset..], offset as u64)? {
            boxes.push(b);
            offset += size;
        }
        Ok(boxes)
    }

    fn root_context(&self) -> DecodeContext<'_> {
        DecodeContext::root(&self.registry, self.options.clone())
    }
}

/// ボックスを再帰的にデコードする際に、各階層のデコード関数に渡されるコンテキスト
#[derive(Debug, Clone)]
pub struct DecodeContext<'a> {
    registry: &'a BoxRegistry,
    options: BoxDecoderOptions,
    depth: usize,
}

impl<'a> DecodeContext<'a> {
    fn root(registry: &'a BoxRegistry, options: BoxDecoderOptions) -> Self {
        Self {
            registry,
            options,
            depth: 0,
        }
    }

    /// 現在の入れ子の深さ（トップレベルは 0）
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// `buf` の先頭にあるボックスを、この階層のボックスとしてデコードする
    ///
    /// 戻り値の意味は [`BoxDecoder::decode_box()`] と同じ
    pub fn decode_box(
        &self,
        buf: &[u8],
        start_pos: u64,
    ) -> Result<Option<(Box<dyn BaseBox>, usize)>> {
        if buf.is_empty() {
            return Ok(None);
        }

        let (header, payload) = BoxHeader::decode_header_and_payload(buf)?;
        let consumed = header.external_size() + payload.len();

        let b = match self.registry.get(header.box_type) {
            Some(decode) => {
                with_box_type(header.box_type, || decode(header, payload, start_pos, self))?
            }
            None => {
                tracing::debug!(
                    box_type = %header.box_type,
                    start_pos,
                    size = consumed,
                    "unregistered box type, keeping it as an unknown box"
                );
                Box::new(UnknownBox::from_header_and_payload(header, payload))
            }
        };

        if b.box_size() != consumed as u64 {
            // 64 ビットのサイズフィールドやサイズ 0 を使った既知のボックスは、
            // 再エンコード時に 32 ビットのサイズフィールドに正規化される
            tracing::warn!(
                box_type = %header.box_type,
                start_pos,
                declared = consumed,
                encoded = b.box_size(),
                "box header will be normalized on re-encoding"
            );
        }

        Ok(Some((b, consumed)))
    }

    /// コンテナボックスのペイロード中の子ボックス群を、宣言されたサイズを使い切るまでデコードする
    ///
    /// `parent` はコンテナボックスの種別、`start_pos` は `buf` の先頭の入力全体における位置。
    /// 子ボックスのサイズが残りのバイト数を越える場合や、末尾にボックスヘッダーに満たない半端なバイトが残る場合には、
    /// コンテナのサイズ情報に矛盾があるものとして [`ErrorKind::InvalidData`] エラーを返す。
    pub fn decode_children<F>(
        &self,
        parent: BoxType,
        buf: &[u8],
        start_pos: u64,
        mut f: F,
    ) -> Result<()>
    where
        F: FnMut(Box<dyn BaseBox>),
    {
        if buf.is_empty() {
            return Ok(());
        }
        let child_ctx = self.nested(parent)?;
        let mut offset = 0;

        while offset < buf.len() {
            let rest = &buf[offset..];
            let pos = start_pos.saturating_add(offset as u64);
            let (child_header, _) = BoxHeader::decode(rest).map_err(|e| {
                if e.kind == ErrorKind::InsufficientBuffer {
                    Error::invalid_data(format!(
                        "{} trailing bytes at position {pos} cannot hold a child box header",
                        rest.len()
                    ))
                    .with_box_type(parent)
                } else {
                    e
                }
            })?;
            // 64 ビットのサイズフィールドは u64::MAX 近くの値も取り得るので、加算せずに残りサイズと比較する
            if child_header.box_size != BoxSize::VARIABLE_SIZE
                && child_header.box_size.get() > rest.len() as u64
            {
                return Err(Error::invalid_data(format!(
                    "Bad size when decoding {parent}: child '{}' at position {pos} has size {}, but only {} bytes remain",
                    child_header.box_type,
                    child_header.box_size.get(),
                    rest.len()
                ))
                .with_box_type(parent));
            }

            let Some((child, size)) = child_ctx.decode_box(rest, pos)? else {
                break;
            };
            f(child);
            offset += size;
        }

        Ok(())
    }

    fn nested(&self, parent: BoxType) -> Result<Self> {
        let depth = self.depth + 1;
        if depth > self.options.max_depth {
            return Err(Error::invalid_data(format!(
                "Box nesting exceeds the maximum depth ({})",
                self.options.max_depth
            ))
            .with_box_type(parent));
        }
        Ok(Self {
            registry: self.registry,
            options: self.options.clone(),
            depth,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn free_box(payload: &[u8]) -> Vec<u8> {
        let mut bytes = ((8 + payload.len()) as u32).to_be_bytes().to_vec();
        bytes.extend_from_slice(b"free");
        bytes.extend_from_slice(payload);
        bytes
    }

    #[test]
    fn empty_input_is_clean_end() {
        let decoder = BoxDecoder::new();
        assert!(decoder.decode_box(&[], 0).unwrap().is_none());
        assert!(decoder.decode_boxes(&[]).unwrap().is_empty());
    }

    #[test]
    fn partial_header_is_truncation() {
        let decoder = BoxDecoder::new();
        let e = decoder.decode_box(&[0, 0, 0], 0).unwrap_err();
        assert_eq!(e.kind, ErrorKind::InsufficientBuffer);
    }

    #[test]
    fn unregistered_box_falls_back_to_unknown() {
        let bytes = free_box(&[1, 2, 3]);
        let decoder = BoxDecoder::new();
        let (b, size) = decoder.decode_box(&bytes, 0).unwrap().unwrap();
        assert_eq!(size, bytes.len());
        assert!(b.is_unknown_box());
        assert_eq!(b.box_type(), BoxType::Normal(*b"free"));
        assert_eq!(b.encode_to_vec().unwrap(), bytes);
    }

    #[test]
    fn decode_multiple_top_level_boxes() {
        let mut bytes = free_box(&[1]);
        bytes.extend(free_box(&[]));
        bytes.extend(free_box(&[2, 3]));

        let boxes = BoxDecoder::new().decode_boxes(&bytes).unwrap();
        assert_eq!(boxes.len(), 3);
        let sizes: Vec<_> = boxes.iter().map(|b| b.box_size()).collect();
        assert_eq!(sizes, [9, 8, 10]);
    }

    #[test]
    fn empty_registry_keeps_everything_opaque() {
        let stss = [0, 0, 0, 16, b's', b't', b's', b's', 0, 0, 0, 0, 0, 0, 0, 0];
        let decoder = BoxDecoder::with_registry(BoxRegistry::new(), BoxDecoderOptions::default());
        let (b, _) = decoder.decode_box(&stss, 0).unwrap().unwrap();
        assert!(b.is::<UnknownBox>());

        let (b, _) = BoxDecoder::new().decode_box(&stss, 0).unwrap().unwrap();
        assert!(b.is::<StssBox>());
    }

    #[test]
    fn registering_replaces_decoder() {
        let mut registry = BoxRegistry::new();
        assert!(registry.register_box::<StssBox>(StssBox::TYPE).is_none());
        assert!(registry.register_box::<StssBox>(StssBox::TYPE).is_some());
        assert!(registry.contains(StssBox::TYPE));
        assert!(!registry.contains(SinfBox::TYPE));
    }
}
