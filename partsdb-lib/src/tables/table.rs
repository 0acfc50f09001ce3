use crate::Result;
use ohno::{IntoAppError, bail};
use serde::{Deserialize, Serialize};
use std::io::{Read, Write};
use strum::{Display, EnumIter, EnumString, IntoStaticStr};

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];
const ZSTD_MAGIC: [u8; 4] = [0x28, 0xb5, 0x2f, 0xfd];

/// Level 0 selects the zstd library default.
const ZSTD_LEVEL: i32 = 0;

const JSONLINES_SUFFIX: &str = ".jsonlines.";

/// The logical tables of a published catalogue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Display, EnumIter, EnumString, IntoStaticStr)]
#[strum(serialize_all = "kebab-case")]
pub enum TableName {
    AttributesLut,
    Subcategories,
    Components,
}

impl TableName {
    pub const ALL: [Self; 3] = [Self::AttributesLut, Self::Subcategories, Self::Components];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        self.into()
    }

    /// Whether line 0 of the table is a schema header.
    #[must_use]
    pub const fn has_header(self) -> bool {
        !matches!(self, Self::AttributesLut)
    }

    /// Archive member name, e.g. `components.jsonlines.gz`.
    #[must_use]
    pub fn file_name(self, codec: Codec) -> String {
        format!("{self}{JSONLINES_SUFFIX}{}", codec.extension())
    }

    /// Parse an archive member name back into its table and codec.
    #[must_use]
    pub fn from_file_name(name: &str) -> Option<(Self, Codec)> {
        let (table, ext) = name.split_once(JSONLINES_SUFFIX)?;
        let codec = Codec::from_extension(ext)?;
        let table = table.parse().ok()?;
        Some((table, codec))
    }
}

/// Compression applied to a whole table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, Display, EnumIter, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Codec {
    #[default]
    Gzip,
    Zstd,
}

impl Codec {
    #[must_use]
    pub const fn extension(self) -> &'static str {
        match self {
            Self::Gzip => "gz",
            Self::Zstd => "zst",
        }
    }

    #[must_use]
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext {
            "gz" => Some(Self::Gzip),
            "zst" => Some(Self::Zstd),
            _ => None,
        }
    }

    /// Identify the codec of a stored blob from its magic bytes.
    pub fn detect(blob: &[u8]) -> Result<Self> {
        if blob.starts_with(&GZIP_MAGIC) {
            Ok(Self::Gzip)
        } else if blob.starts_with(&ZSTD_MAGIC) {
            Ok(Self::Zstd)
        } else if blob.is_empty() {
            bail!("unsupported compression: blob is empty")
        } else {
            let shown = blob.len().min(4);
            bail!("unsupported compression: unrecognized header {:02x?}", &blob[..shown])
        }
    }

    /// Streaming decompressor over an in-memory blob.
    pub fn decoder<'a>(self, blob: &'a [u8]) -> Result<Box<dyn Read + Send + 'a>> {
        Ok(match self {
            Self::Gzip => Box::new(flate2::bufread::GzDecoder::new(blob)),
            Self::Zstd => Box::new(zstd::stream::read::Decoder::with_buffer(blob).into_app_err("unable to initialize zstd decoder")?),
        })
    }

    pub(crate) fn compressor(self) -> Result<Compressor> {
        Ok(match self {
            Self::Gzip => Compressor::Gzip(flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default())),
            Self::Zstd => Compressor::Zstd(zstd::stream::write::Encoder::new(Vec::new(), ZSTD_LEVEL).into_app_err("unable to initialize zstd encoder")?),
        })
    }
}

pub(crate) enum Compressor {
    Gzip(flate2::write::GzEncoder<Vec<u8>>),
    Zstd(zstd::stream::write::Encoder<'static, Vec<u8>>),
}

impl Compressor {
    pub(crate) fn finish(self) -> Result<Vec<u8>> {
        match self {
            Self::Gzip(e) => e.finish().into_app_err("unable to finish gzip stream"),
            Self::Zstd(e) => e.finish().into_app_err("unable to finish zstd stream"),
        }
    }
}

impl Write for Compressor {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        match self {
            Self::Gzip(e) => e.write(buf),
            Self::Zstd(e) => e.write(buf),
        }
    }

    fn flush(&mut self) -> std::io::Result<()> {
        match self {
            Self::Gzip(e) => e.flush(),
            Self::Zstd(e) => e.flush(),
        }
    }
}

impl core::fmt::Debug for Compressor {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Gzip(_) => f.write_str("Compressor::Gzip"),
            Self::Zstd(_) => f.write_str("Compressor::Zstd"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_names() {
        assert_eq!(TableName::AttributesLut.file_name(Codec::Gzip), "attributes-lut.jsonlines.gz");
        assert_eq!(TableName::Components.file_name(Codec::Zstd), "components.jsonlines.zst");
        assert_eq!(
            TableName::from_file_name("subcategories.jsonlines.gz"),
            Some((TableName::Subcategories, Codec::Gzip))
        );
        assert_eq!(TableName::from_file_name("components.jsonlines.bz2"), None);
        assert_eq!(TableName::from_file_name("index.json"), None);
    }

    #[test]
    fn test_detect() {
        assert_eq!(Codec::detect(&[0x1f, 0x8b, 0x08]).unwrap(), Codec::Gzip);
        assert_eq!(Codec::detect(&[0x28, 0xb5, 0x2f, 0xfd, 0x00]).unwrap(), Codec::Zstd);
        let err = Codec::detect(b"BZh91AY").unwrap_err();
        assert!(err.to_string().contains("unsupported compression"));
        let _ = Codec::detect(&[]).unwrap_err();
    }

    #[test]
    fn test_encoder_output_is_detected() {
        for codec in [Codec::Gzip, Codec::Zstd] {
            let mut compressor = codec.compressor().unwrap();
            compressor.write_all(b"hello\n").unwrap();
            let blob = compressor.finish().unwrap();
            assert_eq!(Codec::detect(&blob).unwrap(), codec);

            let mut text = String::new();
            let _ = codec.decoder(&blob).unwrap().read_to_string(&mut text).unwrap();
            assert_eq!(text, "hello\n");
        }
    }
}
