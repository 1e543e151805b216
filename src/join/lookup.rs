use std::{collections::HashMap, io, path::Path};

use anyhow::{anyhow, Context};

use crate::geofile::feature::{AttributeValue, FeatureMap};

/// Attribute rows keyed by the text of one column, loaded from a CSV table.
#[derive(Debug, Clone, PartialEq)]
pub struct LookupTable {
    key_column: String,
    rows: HashMap<String, FeatureMap>,
}

impl LookupTable {
    pub fn from_csv(path: &Path, key_column: &str) -> anyhow::Result<Self> {
        let reader = csv::Reader::from_path(path)
            .with_context(|| format!("Opening lookup table {:?}", path))?;
        let table = Self::from_reader(reader, key_column)
            .with_context(|| format!("Reading lookup table {:?}", path))?;
        log::info!("Read {} lookup rows from {:?}", table.len(), path);
        Ok(table)
    }

    /// Read a table with a header row. Cells are typed with [`AttributeValue::parse_typed`], empty cells
    /// are left out. Keys must be unique.
    pub fn from_reader<R: io::Read>(
        mut reader: csv::Reader<R>,
        key_column: &str,
    ) -> anyhow::Result<Self> {
        let headers = reader.headers()?.clone();
        let key_index = headers
            .iter()
            .position(|header| header == key_column)
            .ok_or_else(|| anyhow!("Key column '{}' not found in the table header", key_column))?;

        let mut rows = HashMap::new();
        for record in reader.records() {
            let record = record?;
            let key = record
                .get(key_index)
                .map(str::trim)
                .filter(|key| !key.is_empty())
                .ok_or_else(|| {
                    anyhow!("Row {:?} has no key", record.position().map(|pos| pos.line()))
                })?
                .to_string();
            let attributes: FeatureMap = headers
                .iter()
                .zip(record.iter())
                .enumerate()
                .filter(|(index, (_, cell))| *index != key_index && !cell.trim().is_empty())
                .map(|(_, (header, cell))| (header.to_string(), AttributeValue::parse_typed(cell)))
                .collect();
            if rows.insert(key.clone(), attributes).is_some() {
                return Err(anyhow!("Duplicate key '{}' in column '{}'", key, key_column));
            }
        }
        Ok(Self {
            key_column: key_column.to_string(),
            rows,
        })
    }

    pub fn key_column(&self) -> &str {
        &self.key_column
    }

    pub fn get(&self, key: &str) -> Option<&FeatureMap> {
        self.rows.get(key)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use testdir::testdir;

    use crate::geofile::feature::AttributeValue;

    use super::LookupTable;

    fn table(contents: &str) -> anyhow::Result<LookupTable> {
        LookupTable::from_reader(csv::Reader::from_reader(contents.as_bytes()), "park_id")
    }

    #[test]
    fn test_typed_cells() {
        let lookup =
            table("park_id,category,acres,borough\n1,regional,843.0,Manhattan\n2,local,12,\n")
                .unwrap();
        assert_eq!(2, lookup.len());
        let first = lookup.get("1").unwrap();
        assert_eq!(Some(&AttributeValue::from("regional")), first.get("category"));
        assert_eq!(Some(&AttributeValue::Real(843.0)), first.get("acres"));
        assert!(first.get("park_id").is_none());
        let second = lookup.get("2").unwrap();
        assert_eq!(Some(&AttributeValue::Integer(12)), second.get("acres"));
        assert!(second.get("borough").is_none());
    }

    #[test]
    fn test_missing_key_column() {
        assert!(table("id,category\n1,regional\n").is_err());
    }

    #[test]
    fn test_duplicate_keys() {
        assert!(table("park_id,category\n1,regional\n1,local\n").is_err());
    }

    #[test]
    fn test_from_csv_file() {
        let test_dir = testdir!();
        let csv_path = test_dir.join("parks.csv");
        std::fs::write(&csv_path, "park_id,category\n7,regional\n").unwrap();
        let lookup = LookupTable::from_csv(&csv_path, "park_id").unwrap();
        assert_eq!("park_id", lookup.key_column());
        assert_eq!(
            Some(&AttributeValue::from("regional")),
            lookup.get("7").and_then(|row| row.get("category"))
        );
    }
}
