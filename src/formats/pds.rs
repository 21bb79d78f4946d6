//! A reader for PDS3 Object Description Language labels, enough to locate
//! and describe the arrays and tables of an attached-label product.

use anyhow::{bail, Context, Result};

/// An `OBJECT = NAME … END_OBJECT = NAME` block (`GROUP` blocks alike).
#[derive(Debug, Clone, PartialEq, Default)]
pub struct OdlObject {
    pub name: String,
    pub attributes: Vec<(String, String)>,
    pub children: Vec<OdlObject>,
}

impl OdlObject {
    /// Raw value of `key`, quotes removed.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_str())
    }

    pub fn require(&self, key: &str) -> Result<&str> {
        self.get(key)
            .with_context(|| format!("{} is missing {key}", self.describe()))
    }

    pub fn usize(&self, key: &str) -> Result<usize> {
        let raw = self.require(key)?;
        strip_unit(raw)
            .parse()
            .with_context(|| format!("{} {key} = {raw} is not a count", self.describe()))
    }

    /// A number if present, `None` otherwise; present but malformed fails.
    pub fn f64_opt(&self, key: &str) -> Result<Option<f64>> {
        self.get(key)
            .map(|raw| {
                strip_unit(raw)
                    .parse()
                    .with_context(|| format!("{} {key} = {raw} is not a number", self.describe()))
            })
            .transpose()
    }

    /// A `(a, b, c)` sequence, or a single value as a one-element list.
    pub fn list(&self, key: &str) -> Result<Vec<String>> {
        Ok(parse_sequence(self.require(key)?))
    }

    pub fn child(&self, name: &str) -> Option<&OdlObject> {
        self.children.iter().find(|c| c.name == name)
    }

    fn describe(&self) -> String {
        if self.name.is_empty() {
            "label".to_string()
        } else {
            format!("object {}", self.name)
        }
    }
}

/// A parsed label: the root attributes plus the top-level objects.
pub type Label = OdlObject;

/// Where a `^POINTER` says an object's data starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pointer {
    /// 1-based byte offset into the file.
    Bytes(usize),
    /// 1-based record number; multiply by `RECORD_BYTES`.
    Record(usize),
}

impl Pointer {
    /// Zero-based byte offset.
    pub fn byte_offset(self, record_bytes: Option<usize>) -> Result<usize> {
        match self {
            Pointer::Bytes(n) => Ok(n.saturating_sub(1)),
            Pointer::Record(n) => {
                let record_bytes = record_bytes.context("record pointer without RECORD_BYTES")?;
                n.saturating_sub(1)
                    .checked_mul(record_bytes)
                    .with_context(|| format!("record pointer {n} of {record_bytes} bytes overflows"))
            }
        }
    }
}

impl Label {
    /// The `^NAME` pointer of an object in the same file.
    pub fn pointer(&self, name: &str) -> Result<Pointer> {
        let raw = self
            .get(&format!("^{name}"))
            .with_context(|| format!("label has no ^{name} pointer"))?;
        // Detached form: ("FILE.DAT", 12 <BYTES>); only the offset is used.
        let raw = match parse_sequence(raw).as_slice() {
            [_, offset] => offset.clone(),
            _ => raw.to_string(),
        };
        let (number, unit) = match raw.split_once('<') {
            Some((n, u)) => (n.trim(), Some(u.trim_end_matches('>').trim())),
            None => (raw.trim(), None),
        };
        let n: usize = number
            .parse()
            .with_context(|| format!("^{name} = {raw} is not an offset"))?;
        match unit {
            Some(u) if u.eq_ignore_ascii_case("BYTES") => Ok(Pointer::Bytes(n)),
            Some(u) => bail!("^{name} uses unsupported unit <{u}>"),
            None => Ok(Pointer::Record(n)),
        }
    }
}

/// Split the attached label off the front of a product.
///
/// Returns the label text and the number of bytes it spans, including the
/// terminating `END` line.
pub fn split_label(bytes: &[u8]) -> Result<(&str, usize)> {
    let mut offset = 0;
    for line in bytes.split_inclusive(|&b| b == b'\n') {
        offset += line.len();
        let text = std::str::from_utf8(line).context("label is not valid text")?;
        if text.trim() == "END" {
            let label = std::str::from_utf8(&bytes[..offset]).context("label is not valid text")?;
            return Ok((label, offset));
        }
    }
    bail!("no END statement terminating the label")
}

/// Parse label text into nested objects.
pub fn parse_label(text: &str) -> Result<Label> {
    let mut stack: Vec<OdlObject> = vec![OdlObject::default()];
    let mut pending: Option<(String, String)> = None;

    for (number, line) in text.lines().enumerate() {
        let line = strip_comment(line).trim();
        if line.is_empty() {
            continue;
        }

        // Continuation of a parenthesised or quoted value.
        if let Some((key, mut value)) = pending.take() {
            value.push(' ');
            value.push_str(line);
            if is_balanced(&value) {
                push_attribute(&mut stack, key, value)?;
            } else {
                pending = Some((key, value));
            }
            continue;
        }

        if line == "END" {
            break;
        }
        let (key, value) = line
            .split_once('=')
            .with_context(|| format!("line {}: expected KEY = VALUE", number + 1))?;
        let key = key.trim().to_string();
        let value = value.trim().to_string();

        if key == "OBJECT" || key == "GROUP" {
            stack.push(OdlObject {
                name: value,
                ..OdlObject::default()
            });
        } else if key == "END_OBJECT" || key == "END_GROUP" {
            let done = stack
                .pop()
                .filter(|_| !stack.is_empty())
                .with_context(|| format!("line {}: {key} without an open block", number + 1))?;
            if done.name != value {
                bail!(
                    "line {}: {key} = {value} closes {}",
                    number + 1,
                    done.name
                );
            }
            if let Some(parent) = stack.last_mut() {
                parent.children.push(done);
            }
        } else if is_balanced(&value) {
            push_attribute(&mut stack, key, value)?;
        } else {
            pending = Some((key, value));
        }
    }

    if let Some((key, _)) = pending {
        bail!("unterminated value for {key}");
    }
    if stack.len() != 1 {
        let open: Vec<&str> = stack[1..].iter().map(|o| o.name.as_str()).collect();
        bail!("unclosed OBJECT(s): {}", open.join(", "));
    }
    stack.pop().context("empty label")
}

fn push_attribute(stack: &mut [OdlObject], key: String, value: String) -> Result<()> {
    let object = stack.last_mut().context("attribute outside any object")?;
    object.attributes.push((key, unquote(&value).to_string()));
    Ok(())
}

fn strip_comment(line: &str) -> &str {
    match line.find("/*") {
        Some(pos) => &line[..pos],
        None => line,
    }
}

fn is_balanced(value: &str) -> bool {
    let opens = value.matches(['(', '{']).count();
    let closes = value.matches([')', '}']).count();
    let quotes = value.matches('"').count();
    opens == closes && quotes % 2 == 0
}

fn unquote(value: &str) -> &str {
    let v = value.trim();
    v.strip_prefix('"')
        .and_then(|v| v.strip_suffix('"'))
        .unwrap_or(v)
        .trim()
}

fn strip_unit(raw: &str) -> &str {
    raw.split('<').next().unwrap_or(raw).trim()
}

/// Items of `(a, b)` / `{a, b}`, quotes removed. A bare value is one item.
pub fn parse_sequence(value: &str) -> Vec<String> {
    let inner = value
        .trim()
        .trim_start_matches(['(', '{'])
        .trim_end_matches([')', '}']);
    inner
        .split(',')
        .map(|s| unquote(s).to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const LABEL: &str = r#"PDS_VERSION_ID = PDS3
RECORD_TYPE = UNDEFINED
^SP_SPECTRUM_WAV = 1025 <BYTES>
^ANCILLARY_AND_SUPPLEMENT_DATA = ("SP_2C_02_01.DAT", 77 <BYTES>)
/* spectrum arrays */
OBJECT = SP_SPECTRUM_WAV
  AXES = 1
  AXIS_ITEMS = 296
  ITEM_TYPE = MSB_UNSIGNED_INTEGER
  ITEM_BYTES = 2
  SCALING_FACTOR = 0.1 <nm>
END_OBJECT = SP_SPECTRUM_WAV
OBJECT = ANCILLARY_AND_SUPPLEMENT_DATA
  ROWS = 4
  DESCRIPTION = "Per-spectrum geometry,
    one row per observation"
  OBJECT = COLUMN
    NAME = "EMISSION_ANGLE"
  END_OBJECT = COLUMN
END_OBJECT = ANCILLARY_AND_SUPPLEMENT_DATA
END
"#;

    #[test]
    fn test_parse_nested_objects() {
        let label = parse_label(LABEL).unwrap();
        assert_eq!(label.get("PDS_VERSION_ID"), Some("PDS3"));
        assert_eq!(label.children.len(), 2);

        let wav = label.child("SP_SPECTRUM_WAV").unwrap();
        assert_eq!(wav.usize("AXIS_ITEMS").unwrap(), 296);
        assert_eq!(wav.f64_opt("SCALING_FACTOR").unwrap(), Some(0.1));
        assert_eq!(wav.f64_opt("OFFSET").unwrap(), None);

        let table = label.child("ANCILLARY_AND_SUPPLEMENT_DATA").unwrap();
        assert!(table.get("DESCRIPTION").unwrap().starts_with("Per-spectrum"));
        assert_eq!(table.children[0].get("NAME"), Some("EMISSION_ANGLE"));
    }

    #[test]
    fn test_pointers() {
        let label = parse_label(LABEL).unwrap();
        assert_eq!(label.pointer("SP_SPECTRUM_WAV").unwrap(), Pointer::Bytes(1025));
        assert_eq!(
            label.pointer("ANCILLARY_AND_SUPPLEMENT_DATA").unwrap(),
            Pointer::Bytes(77)
        );
        assert_eq!(Pointer::Bytes(1025).byte_offset(None).unwrap(), 1024);
        assert_eq!(Pointer::Record(3).byte_offset(Some(512)).unwrap(), 1024);
        assert!(Pointer::Record(3).byte_offset(None).is_err());
        assert!(label.pointer("SP_SPECTRUM_RAD").is_err());
    }

    #[test]
    fn test_sequences() {
        assert_eq!(parse_sequence("(296, 12)"), vec!["296", "12"]);
        assert_eq!(parse_sequence("7"), vec!["7"]);
        assert_eq!(parse_sequence(r#"{"A", "B"}"#), vec!["A", "B"]);
    }

    #[test]
    fn test_split_label() {
        let mut bytes = b"PDS_VERSION_ID = PDS3\r\nEND\r\n".to_vec();
        bytes.extend_from_slice(&[0xff, 0x00, 0x10]);
        let (text, len) = split_label(&bytes).unwrap();
        assert_eq!(len, 28);
        assert!(text.ends_with("END\r\n"));
        assert!(split_label(b"PDS_VERSION_ID = PDS3\n").is_err());
    }

    #[test]
    fn test_mismatched_objects() {
        assert!(parse_label("OBJECT = A\nEND_OBJECT = B\nEND\n").is_err());
        assert!(parse_label("OBJECT = A\nEND\n").is_err());
        assert!(parse_label("END_OBJECT = A\nEND\n").is_err());
    }
}
