use super::LOG_TARGET;
use crate::model::{AttributePair, PricePoint, parse_schedule};
use crate::tables::{RowReader, SchemaHeader};
use crate::{HashMap, Result};
use flate2::read::GzDecoder;
use ohno::{IntoAppError, app_err, bail};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

/// Stock levels keyed by component id.
pub type StockSnapshot = HashMap<String, u64>;

/// What a file in a source directory holds, judged by its name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    Category,
    Stock,
    Ignored,
}

impl SourceKind {
    #[must_use]
    pub fn classify(file_name: &str) -> Self {
        if file_name.ends_with(".stock.json") {
            Self::Stock
        } else if file_name == "index.json" {
            Self::Ignored
        } else if file_name.ends_with(".json.gz") || file_name.ends_with(".json") {
            Self::Category
        } else {
            Self::Ignored
        }
    }
}

/// The source name of a category file: its file name up to the first `.`.
#[must_use]
pub fn source_name(file_name: &str) -> &str {
    file_name.split('.').next().unwrap_or(file_name)
}

/// Read a JSON document, transparently decompressing `.gz` files.
pub fn read_json_file<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let file = File::open(path).into_app_err_with(|| format!("unable to open '{}'", path.display()))?;
    let reader = BufReader::new(file);
    let is_gz = path.extension().is_some_and(|ext| ext == "gz");

    let value = if is_gz {
        serde_json::from_reader(GzDecoder::new(reader))
    } else {
        serde_json::from_reader(reader)
    };

    value.into_app_err_with(|| format!("unable to parse '{}'", path.display()))
}

/// Parse a JSON document from bytes that may be gzip-compressed.
pub fn parse_json_bytes<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    if bytes.starts_with(&[0x1f, 0x8b]) {
        let mut text = Vec::new();
        let _ = GzDecoder::new(bytes).read_to_end(&mut text).into_app_err("unable to decompress document")?;
        serde_json::from_slice(&text).into_app_err("unable to parse document")
    } else {
        serde_json::from_slice(bytes).into_app_err("unable to parse document")
    }
}

#[derive(Debug, Deserialize)]
struct RawSourceFile {
    #[serde(default)]
    category: String,
    #[serde(default)]
    subcategory: String,
    schema: Value,
    components: Vec<Vec<Value>>,
}

/// A per-category source file: a schema naming the positional columns of every component.
#[derive(Debug, Clone)]
pub struct SourceFile {
    pub category: String,
    pub subcategory: String,
    pub schema: SchemaHeader,
    pub components: Vec<Vec<Value>>,
}

impl SourceFile {
    pub fn read(path: &Path) -> Result<Self> {
        let raw: RawSourceFile = read_json_file(path)?;
        Self::from_raw(raw).into_app_err_with(|| format!("invalid category file '{}'", path.display()))
    }

    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        Self::from_raw(parse_json_bytes(bytes)?)
    }

    pub fn from_value(value: Value) -> Result<Self> {
        Self::from_raw(serde_json::from_value(value).into_app_err("malformed category file")?)
    }

    fn from_raw(raw: RawSourceFile) -> Result<Self> {
        Ok(Self {
            category: raw.category,
            subcategory: raw.subcategory,
            schema: SchemaHeader::from_value(&raw.schema)?,
            components: raw.components,
        })
    }

    /// Resolve every component row through the file's schema.
    ///
    /// Fails on the first malformed row, so callers never see a partially decoded file.
    pub fn records(&self) -> Result<Vec<ComponentRecord>> {
        self.components
            .iter()
            .enumerate()
            .map(|(i, row)| ComponentRecord::from_row(&self.schema, row).into_app_err_with(|| format!("component #{i}")))
            .collect()
    }
}

/// A source component with its fields resolved by name.
#[derive(Debug, Clone, PartialEq)]
pub struct ComponentRecord {
    pub lcsc: String,
    pub manufacturer: String,
    pub description: String,
    pub attributes: Vec<AttributePair>,
    pub joints: Option<u64>,
    pub datasheet: String,
    pub price: Vec<PricePoint>,
    pub image: Option<String>,
    pub url: String,
}

impl ComponentRecord {
    pub fn from_row(schema: &SchemaHeader, row: &[Value]) -> Result<Self> {
        let r = RowReader::new(schema, row);
        let lcsc = r.str("lcsc")?.to_string();
        if lcsc.is_empty() {
            bail!("component id is empty");
        }

        let price = price_schedule(&lcsc, r.value("price"));
        Ok(Self {
            lcsc,
            manufacturer: r.opt_string("mfr").unwrap_or_default(),
            description: r.opt_string("description").unwrap_or_default(),
            attributes: flatten_attributes(r.value("attributes"))?,
            joints: r.opt_u64("joints"),
            datasheet: r.opt_string("datasheet").unwrap_or_default(),
            price,
            image: image(r.value("img").or_else(|| r.value("images"))),
            url: r.opt_string("url").unwrap_or_default(),
        })
    }
}

/// A component keeps its other fields when its price schedule is unusable.
fn price_schedule(lcsc: &str, value: Option<&Value>) -> Vec<PricePoint> {
    value.map_or_else(Vec::new, |v| {
        parse_schedule(v).unwrap_or_else(|e| {
            log::warn!(target: LOG_TARGET, "Dropping the price schedule of {lcsc}: {e:#}");
            Vec::new()
        })
    })
}

fn flatten_attributes(value: Option<&Value>) -> Result<Vec<AttributePair>> {
    match value {
        None => Ok(Vec::new()),
        Some(Value::Object(map)) => Ok(map.iter().map(|(name, v)| AttributePair::new(name.clone(), v.clone())).collect()),

        // Empty collections are sometimes serialized as arrays
        Some(Value::Array(items)) if items.is_empty() => Ok(Vec::new()),
        Some(other) => Err(app_err!("attributes must be an object, found: {other}")),
    }
}

fn image(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Array(items) => items.iter().find_map(|v| v.as_str().filter(|s| !s.is_empty()).map(str::to_string)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_classify() {
        assert_eq!(SourceKind::classify("resistors.json.gz"), SourceKind::Category);
        assert_eq!(SourceKind::classify("resistors.json"), SourceKind::Category);
        assert_eq!(SourceKind::classify("resistors.stock.json"), SourceKind::Stock);
        assert_eq!(SourceKind::classify("index.json"), SourceKind::Ignored);
        assert_eq!(SourceKind::classify("resistors.stock.json.sha256"), SourceKind::Ignored);
        assert_eq!(SourceKind::classify("README.md"), SourceKind::Ignored);
        assert_eq!(source_name("resistors.json.gz"), "resistors");
    }

    #[test]
    fn test_record_from_row() {
        let schema = SchemaHeader::from_fields(["lcsc", "mfr", "joints", "description", "datasheet", "price", "img", "url", "attributes"]).unwrap();
        let row = [
            json!("C25744"),
            json!("0402WGF1002TCE"),
            json!(2),
            json!("10kΩ ±1% 62.5mW 0402"),
            json!("https://example.com/ds.pdf"),
            json!([{"qFrom": 1, "qTo": null, "price": 0.001}]),
            json!(null),
            json!("/product/C25744"),
            json!({"Resistance": "10kΩ", "Package": "0402"}),
        ];

        let record = ComponentRecord::from_row(&schema, &row).unwrap();
        assert_eq!(record.lcsc, "C25744");
        assert_eq!(record.joints, Some(2));
        assert_eq!(record.image, None);
        assert_eq!(record.attributes.len(), 2);
        assert_eq!(record.price.len(), 1);
    }

    #[test]
    fn test_record_keeps_fields_when_price_schedule_is_malformed() {
        let schema = SchemaHeader::from_fields(["lcsc", "mfr", "price"]).unwrap();

        let row = [json!("C1"), json!("UNI"), json!({"qFrom": 1})];
        let record = ComponentRecord::from_row(&schema, &row).unwrap();
        assert_eq!(record.manufacturer, "UNI");
        assert!(record.price.is_empty());

        let gap = json!([{"qFrom": 1, "qTo": 9, "price": 1.0}, {"qFrom": 20, "qTo": null, "price": 0.5}]);
        let record = ComponentRecord::from_row(&schema, &[json!("C2"), json!("UNI"), gap]).unwrap();
        assert!(record.price.is_empty());

        let record = ComponentRecord::from_row(&schema, &[json!("C3"), json!("UNI"), Value::Null]).unwrap();
        assert!(record.price.is_empty());
    }

    #[test]
    fn test_record_accepts_empty_attribute_array_and_images_alias() {
        let schema = SchemaHeader::from_fields(["lcsc", "attributes", "images"]).unwrap();
        let row = [json!("C1"), json!([]), json!(["", "https://img/1.jpg"])];
        let record = ComponentRecord::from_row(&schema, &row).unwrap();
        assert!(record.attributes.is_empty());
        assert_eq!(record.image.as_deref(), Some("https://img/1.jpg"));
    }

    #[test]
    fn test_record_rejects_bad_rows() {
        let schema = SchemaHeader::from_fields(["lcsc", "attributes"]).unwrap();
        let _ = ComponentRecord::from_row(&schema, &[json!(5), json!({})]).unwrap_err();
        let _ = ComponentRecord::from_row(&schema, &[json!("C1"), json!("oops")]).unwrap_err();
        let _ = ComponentRecord::from_row(&schema, &[json!(""), json!({})]).unwrap_err();
    }

    #[test]
    fn test_parse_json_bytes_handles_gzip() {
        use flate2::Compression;
        use flate2::write::GzEncoder;
        use std::io::Write;

        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(br#"{"C1": 4}"#).unwrap();
        let compressed = encoder.finish().unwrap();

        let plain: StockSnapshot = parse_json_bytes(br#"{"C1": 4}"#).unwrap();
        let unzipped: StockSnapshot = parse_json_bytes(&compressed).unwrap();
        assert_eq!(plain, unzipped);
    }
}
