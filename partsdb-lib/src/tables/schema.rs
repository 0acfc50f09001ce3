use crate::{HashMap, Result};
use ohno::{app_err, bail};
use serde_json::{Map, Value};

/// Field-name to column-position mapping for a positional table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaHeader {
    fields: Vec<String>,
    positions: HashMap<String, usize>,
}

impl SchemaHeader {
    /// Build a header from field names listed in column order.
    pub fn from_fields<I, S>(fields: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let fields: Vec<String> = fields.into_iter().map(Into::into).collect();
        let mut positions = HashMap::default();
        for (i, name) in fields.iter().enumerate() {
            if positions.insert(name.clone(), i).is_some() {
                bail!("duplicate field '{name}' in schema");
            }
        }
        Ok(Self { fields, positions })
    }

    /// Parse a schema from either a header row object (`{"name": column}`) or an ordered
    /// array of field names, as used by source files.
    pub fn from_value(value: &Value) -> Result<Self> {
        match value {
            Value::Array(names) => {
                let names = names
                    .iter()
                    .map(|v| v.as_str().map(str::to_string).ok_or_else(|| app_err!("schema field name is not a string: {v}")))
                    .collect::<Result<Vec<_>>>()?;
                Self::from_fields(names)
            }
            Value::Object(map) => Self::from_header_map(map),
            other => bail!("schema header must be an object or an array, found: {other}"),
        }
    }

    fn from_header_map(map: &Map<String, Value>) -> Result<Self> {
        let mut slots: Vec<Option<String>> = vec![None; map.len()];
        for (name, column) in map {
            let column = column
                .as_u64()
                .and_then(|c| usize::try_from(c).ok())
                .ok_or_else(|| app_err!("column of field '{name}' is not a valid position: {column}"))?;
            let slot = slots
                .get_mut(column)
                .ok_or_else(|| app_err!("column {column} of field '{name}' is out of range for {} fields", map.len()))?;
            if slot.is_some() {
                bail!("column {column} is assigned to more than one field");
            }
            *slot = Some(name.clone());
        }

        // every slot is filled once the positions are unique and in range
        Self::from_fields(slots.into_iter().flatten())
    }

    /// Header row as written on line 0 of a table.
    #[must_use]
    pub fn to_header_row(&self) -> Value {
        let map: Map<String, Value> = self.fields.iter().enumerate().map(|(i, name)| (name.clone(), Value::from(i))).collect();
        Value::Object(map)
    }

    #[must_use]
    pub fn position(&self, name: &str) -> Option<usize> {
        self.positions.get(name).copied()
    }

    /// The value of field `name` in a positional row, if both the field and the column exist.
    #[must_use]
    pub fn get<'a>(&self, row: &'a [Value], name: &str) -> Option<&'a Value> {
        self.position(name).and_then(|pos| row.get(pos))
    }

    #[must_use]
    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_header_row_round_trip() {
        let header = SchemaHeader::from_fields(["subcategory", "category", "sourcename"]).unwrap();
        let row = header.to_header_row();
        assert_eq!(row, json!({"subcategory": 0, "category": 1, "sourcename": 2}));
        assert_eq!(SchemaHeader::from_value(&row).unwrap(), header);
    }

    #[test]
    fn test_resolves_fields_regardless_of_column_order() {
        let a = SchemaHeader::from_value(&json!(["lcsc", "mfr", "joints"])).unwrap();
        let b = SchemaHeader::from_value(&json!({"joints": 0, "lcsc": 1, "mfr": 2})).unwrap();
        let row_a = [json!("C1"), json!("TI"), json!(8)];
        let row_b = [json!(8), json!("C1"), json!("TI")];

        for field in ["lcsc", "mfr", "joints"] {
            assert_eq!(a.get(&row_a, field), b.get(&row_b, field));
        }
        assert_eq!(a.get(&row_a, "missing"), None);
    }

    #[test]
    fn test_rejects_bad_headers() {
        let _ = SchemaHeader::from_fields(["a", "a"]).unwrap_err();
        let _ = SchemaHeader::from_value(&json!({"a": 0, "b": 0})).unwrap_err();
        let _ = SchemaHeader::from_value(&json!({"a": 0, "b": 5})).unwrap_err();
        let _ = SchemaHeader::from_value(&json!({"a": "zero"})).unwrap_err();
        let _ = SchemaHeader::from_value(&json!([1, 2])).unwrap_err();
        let _ = SchemaHeader::from_value(&json!("lcsc")).unwrap_err();
    }
}
