//! Test-vector file loader
//!
//! The format is line based: `Key = Value` pairs, `Function` lines
//! delimiting a group of functions the following vectors apply to, and
//! `Name` lines opening a new vector. Hex values are case-insensitive
//! and separator-tolerant; integers decode as signed decimal with a
//! per-caller default.

use crate::error::{Error, Result};

use itertools::Itertools;

/// One named vector: ordered `Key = Value` fields.
#[derive(Debug, Clone, Default)]
pub struct Vector {
    name: String,
    fields: Vec<(String, String)>,
}

impl Vector {
    /// Vector name from its `Name` line.
    pub fn name(&self) -> &str {
        &self.name
    }

    fn raw(&self, key: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Whether `key` is present.
    pub fn has(&self, key: &str) -> bool {
        self.raw(key).is_some()
    }

    /// Decode a hex-valued field, ignoring separators and case.
    pub fn bytes(&self, key: &str) -> Result<Vec<u8>> {
        let raw = self
            .raw(key)
            .ok_or_else(|| Error::TestVectorMissing(key.to_string()))?;
        let digits: Vec<u8> = raw
            .bytes()
            .filter(|b| !matches!(b, b' ' | b'\t' | b':' | b',' | b'_'))
            .collect();
        if digits.len() % 2 != 0 {
            return Err(Error::InvalidArgument("odd hex digit count"));
        }
        let nibble = |b: u8| -> Result<u8> {
            match b {
                b'0'..=b'9' => Ok(b - b'0'),
                b'a'..=b'f' => Ok(b - b'a' + 10),
                b'A'..=b'F' => Ok(b - b'A' + 10),
                _ => Err(Error::InvalidArgument("bad hex digit")),
            }
        };
        digits
            .into_iter()
            .tuples()
            .map(|(hi, lo)| Ok((nibble(hi)? << 4) | nibble(lo)?))
            .collect()
    }

    /// Decode a signed decimal field, with `default` when absent.
    pub fn int(&self, key: &str, default: i64) -> Result<i64> {
        match self.raw(key) {
            None => Ok(default),
            Some(raw) => raw
                .trim()
                .parse::<i64>()
                .map_err(|_| Error::InvalidArgument("bad integer field")),
        }
    }
}

/// A `Function` group and the vectors that follow it.
#[derive(Debug, Clone, Default)]
pub struct VectorGroup {
    functions: Vec<String>,
    vectors: Vec<Vector>,
}

impl VectorGroup {
    /// The function names this group applies to.
    pub fn functions(&self) -> &[String] {
        &self.functions
    }

    /// Whether the group names `func`.
    pub fn applies_to(&self, func: &str) -> bool {
        self.functions.iter().any(|f| f == func)
    }

    /// The vectors in file order.
    pub fn vectors(&self) -> &[Vector] {
        &self.vectors
    }
}

/// A parsed vector file.
#[derive(Debug, Clone, Default)]
pub struct VectorFile {
    groups: Vec<VectorGroup>,
}

impl VectorFile {
    /// All groups in file order.
    pub fn groups(&self) -> &[VectorGroup] {
        &self.groups
    }

    /// Every vector applying to `func`.
    pub fn for_function<'a>(&'a self, func: &str) -> Vec<&'a Vector> {
        self.groups
            .iter()
            .filter(|g| g.applies_to(func))
            .flat_map(|g| g.vectors.iter())
            .collect()
    }
}

/// Parse the vector file format.
pub fn parse(text: &str) -> Result<VectorFile> {
    let mut file = VectorFile::default();
    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let (key, value) = line
            .split_once('=')
            .ok_or(Error::InvalidArgument("line without '='"))?;
        let key = key.trim();
        let value = value.trim();
        if key == "Function" {
            file.groups.push(VectorGroup {
                functions: value.split_whitespace().map(str::to_string).collect(),
                vectors: Vec::new(),
            });
            continue;
        }
        let group = file
            .groups
            .last_mut()
            .ok_or(Error::InvalidArgument("field before any Function group"))?;
        if key == "Name" {
            group.vectors.push(Vector {
                name: value.to_string(),
                fields: Vec::new(),
            });
            continue;
        }
        let vector = group
            .vectors
            .last_mut()
            .ok_or(Error::InvalidArgument("field before any Name line"))?;
        vector.fields.push((key.to_string(), value.to_string()));
    }
    Ok(file)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\
# sample vectors
Function = demo_permute other_permute
Name = demo 1
Key = 00 11 22 33
Count = 8

Name = demo 2
Key = aabbCCdd
";

    #[test]
    fn parses_groups_and_vectors() {
        let file = parse(SAMPLE).unwrap();
        assert_eq!(file.groups().len(), 1);
        let vecs = file.for_function("demo_permute");
        assert_eq!(vecs.len(), 2);
        assert_eq!(vecs[0].name(), "demo 1");
        assert_eq!(vecs[0].bytes("Key").unwrap(), vec![0x00, 0x11, 0x22, 0x33]);
        assert_eq!(vecs[0].int("Count", 1).unwrap(), 8);
        assert_eq!(vecs[1].int("Count", 1).unwrap(), 1);
        assert_eq!(vecs[1].bytes("Key").unwrap(), vec![0xaa, 0xbb, 0xcc, 0xdd]);
    }

    #[test]
    fn missing_field_is_reported() {
        let file = parse(SAMPLE).unwrap();
        let vecs = file.for_function("demo_permute");
        assert!(matches!(
            vecs[0].bytes("Plaintext"),
            Err(Error::TestVectorMissing(_))
        ));
    }
}
