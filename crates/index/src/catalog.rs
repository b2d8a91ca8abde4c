//! Identifier table and the index/table pair.

use std::hash::Hasher;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::ann::{AnnConfig, AnnIndex};
use crate::persist::{self, ArtifactPaths};
use crate::{CompressionConfig, IndexError};

/// Product identifiers aligned by position with an [`AnnIndex`]: entry `i`
/// names internal id `i`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IdentifierTable {
    entries: Vec<String>,
}

impl IdentifierTable {
    pub fn new(entries: Vec<String>) -> Self {
        Self { entries }
    }

    pub fn get(&self, id: usize) -> Option<&str> {
        self.entries.get(id).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(String::as_str)
    }

    pub fn as_slice(&self) -> &[String] {
        &self.entries
    }

    /// Stable 64-bit digest of the table contents and order.
    pub fn digest(&self) -> u64 {
        let mut hasher = fxhash::FxHasher64::default();
        hasher.write_u64(self.entries.len() as u64);
        for entry in &self.entries {
            hasher.write_u64(entry.len() as u64);
            hasher.write(entry.as_bytes());
        }
        hasher.finish()
    }
}

impl From<Vec<String>> for IdentifierTable {
    fn from(entries: Vec<String>) -> Self {
        Self::new(entries)
    }
}

impl FromIterator<String> for IdentifierTable {
    fn from_iter<I: IntoIterator<Item = String>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

/// Decomposition of an identifier table entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProductRef<'a> {
    /// `<digits>_<name>`: numeric product id plus display name.
    Structured { id: &'a str, name: &'a str },
    /// Any other shape; the raw string serves as both id and name.
    Opaque { raw: &'a str },
}

impl<'a> ProductRef<'a> {
    /// Split `raw` at its first underscore when the prefix is a non-empty run
    /// of ASCII digits and the remainder is non-empty.
    pub fn parse(raw: &'a str) -> Self {
        match raw.split_once('_') {
            Some((id, name))
                if !id.is_empty() && !name.is_empty() && id.bytes().all(|b| b.is_ascii_digit()) =>
            {
                ProductRef::Structured { id, name }
            }
            _ => ProductRef::Opaque { raw },
        }
    }

    pub fn external_id(&self) -> &'a str {
        match self {
            ProductRef::Structured { id, .. } => id,
            ProductRef::Opaque { raw } => raw,
        }
    }

    pub fn display_name(&self) -> &'a str {
        match self {
            ProductRef::Structured { name, .. } => name,
            ProductRef::Opaque { raw } => raw,
        }
    }

    pub fn is_structured(&self) -> bool {
        matches!(self, ProductRef::Structured { .. })
    }
}

/// An index and its identifier table, always built, saved and loaded
/// together since position is their only linkage.
#[derive(Debug)]
pub struct Catalog {
    index: AnnIndex,
    table: IdentifierTable,
}

impl Catalog {
    /// Pair an index with its table; fails on [`IndexError::SizeMismatch`].
    pub fn new(index: AnnIndex, table: IdentifierTable) -> Result<Self, IndexError> {
        if index.len() != table.len() {
            return Err(IndexError::SizeMismatch {
                index: index.len(),
                table: table.len(),
            });
        }
        Ok(Self { index, table })
    }

    /// A catalog with no products.
    pub fn empty(dimension: usize, config: AnnConfig) -> Self {
        Self {
            index: AnnIndex::new(dimension, config),
            table: IdentifierTable::default(),
        }
    }

    pub fn index(&self) -> &AnnIndex {
        &self.index
    }

    pub fn table(&self) -> &IdentifierTable {
        &self.table
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    pub fn into_parts(self) -> (AnnIndex, IdentifierTable) {
        (self.index, self.table)
    }

    /// Persist both artifacts under `prefix` with default compression.
    pub fn save(&self, prefix: impl AsRef<Path>) -> Result<ArtifactPaths, IndexError> {
        self.save_with(prefix, &CompressionConfig::default())
    }

    pub fn save_with(
        &self,
        prefix: impl AsRef<Path>,
        compression: &CompressionConfig,
    ) -> Result<ArtifactPaths, IndexError> {
        persist::save_pair(&self.index, &self.table, prefix, compression)
    }

    /// Load the pair saved under `prefix`.
    pub fn load(prefix: impl AsRef<Path>) -> Result<Self, IndexError> {
        let (index, table) = persist::load_pair(prefix)?;
        Self::new(index, table)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_structured_identifier() {
        let parsed = ProductRef::parse("3_cherry");
        assert_eq!(
            parsed,
            ProductRef::Structured {
                id: "3",
                name: "cherry"
            }
        );
        assert_eq!(parsed.external_id(), "3");
        assert_eq!(parsed.display_name(), "cherry");
        assert!(parsed.is_structured());
    }

    #[test]
    fn parse_keeps_leading_zeros_and_later_underscores() {
        let parsed = ProductRef::parse("006_beach_sandal");
        assert_eq!(parsed.external_id(), "006");
        assert_eq!(parsed.display_name(), "beach_sandal");
    }

    #[test]
    fn parse_opaque_identifier() {
        let parsed = ProductRef::parse("widget");
        assert_eq!(parsed, ProductRef::Opaque { raw: "widget" });
        assert_eq!(parsed.external_id(), "widget");
        assert_eq!(parsed.display_name(), "widget");
        assert!(!parsed.is_structured());
    }

    #[test]
    fn parse_rejects_near_misses() {
        for raw in ["abc_shoe", "12_", "_shoe", "1a_shoe", "", "42"] {
            assert_eq!(ProductRef::parse(raw), ProductRef::Opaque { raw }, "{raw:?}");
        }
    }

    #[test]
    fn table_digest_tracks_content_and_order() {
        let a = IdentifierTable::new(vec!["1_a".into(), "2_b".into()]);
        let b = IdentifierTable::new(vec!["2_b".into(), "1_a".into()]);
        let c = IdentifierTable::new(vec!["1_a".into(), "2_b".into()]);

        assert_eq!(a.digest(), c.digest());
        assert_ne!(a.digest(), b.digest());
        // Length prefixes keep ["ab"] and ["a", "b"] apart.
        let joined = IdentifierTable::new(vec!["ab".into()]);
        let split = IdentifierTable::new(vec!["a".into(), "b".into()]);
        assert_ne!(joined.digest(), split.digest());
    }

    #[test]
    fn table_serializes_as_plain_list() {
        let table = IdentifierTable::new(vec!["1_apple".into(), "widget".into()]);
        let json = serde_json::to_string(&table).unwrap();
        assert_eq!(json, r#"["1_apple","widget"]"#);
    }

    #[test]
    fn catalog_rejects_misaligned_pair() {
        let index = AnnIndex::build(&[vec![1.0, 0.0], vec![0.0, 1.0]], AnnConfig::default())
            .unwrap();
        let table = IdentifierTable::new(vec!["only-one".into()]);
        assert_eq!(
            Catalog::new(index, table).unwrap_err(),
            IndexError::SizeMismatch { index: 2, table: 1 }
        );
    }

    #[test]
    fn empty_catalog() {
        let catalog = Catalog::empty(512, AnnConfig::default());
        assert!(catalog.is_empty());
        assert_eq!(catalog.index().dimension(), 512);
        assert!(catalog.table().is_empty());
    }
}
