use super::SchemaHeader;
use crate::Result;
use ohno::{IntoAppError, app_err};
use serde::de::DeserializeOwned;
use serde_json::Value;

/// Typed, name-addressed access to one positional row.
#[derive(Debug, Clone, Copy)]
pub struct RowReader<'a> {
    header: &'a SchemaHeader,
    values: &'a [Value],
}

impl<'a> RowReader<'a> {
    #[must_use]
    pub const fn new(header: &'a SchemaHeader, values: &'a [Value]) -> Self {
        Self { header, values }
    }

    /// Raw value of a field; `None` when the field is unknown, the column is missing or the value is null.
    #[must_use]
    pub fn value(&self, name: &str) -> Option<&'a Value> {
        self.header.get(self.values, name).filter(|v| !v.is_null())
    }

    pub fn required(&self, name: &str) -> Result<&'a Value> {
        self.value(name).ok_or_else(|| app_err!("missing field '{name}'"))
    }

    pub fn str(&self, name: &str) -> Result<&'a str> {
        self.required(name)?
            .as_str()
            .ok_or_else(|| app_err!("field '{name}' is not a string"))
    }

    /// String field that may be absent; numbers are rendered as text.
    #[must_use]
    pub fn opt_string(&self, name: &str) -> Option<String> {
        match self.value(name)? {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }

    #[must_use]
    pub fn opt_u64(&self, name: &str) -> Option<u64> {
        let value = self.value(name)?;
        value.as_u64().or_else(|| value.as_str().and_then(|s| s.trim().parse().ok()))
    }

    pub fn u64(&self, name: &str) -> Result<u64> {
        self.opt_u64(name).ok_or_else(|| app_err!("field '{name}' is not an unsigned integer"))
    }

    pub fn parse<T: DeserializeOwned>(&self, name: &str) -> Result<T> {
        serde_json::from_value(self.required(name)?.clone()).into_app_err_with(|| format!("decoding field '{name}'"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_typed_access() {
        let header = SchemaHeader::from_fields(["lcsc", "stock", "joints", "img", "attrsIdx"]).unwrap();
        let values = [json!("C1"), json!(12), json!("8"), Value::Null, json!([3, 1])];
        let row = RowReader::new(&header, &values);

        assert_eq!(row.str("lcsc").unwrap(), "C1");
        assert_eq!(row.u64("stock").unwrap(), 12);
        assert_eq!(row.opt_u64("joints"), Some(8));
        assert_eq!(row.opt_string("img"), None);
        assert_eq!(row.parse::<Vec<u32>>("attrsIdx").unwrap(), vec![3, 1]);
        let _ = row.str("stock").unwrap_err();
        let _ = row.required("img").unwrap_err();
        let _ = row.required("nope").unwrap_err();
    }

    #[test]
    fn test_short_row_yields_missing_fields() {
        let header = SchemaHeader::from_fields(["lcsc", "mfr"]).unwrap();
        let values = [json!("C1")];
        let row = RowReader::new(&header, &values);
        assert_eq!(row.value("mfr"), None);
    }
}
