//! PDF object serialization.
//!
//! Dictionary keys are written sorted and reals with at most five
//! decimals, so the same object always serializes to the same bytes.
//! When a [`SecurityState`] is supplied, strings and stream data are
//! encrypted with the key of the indirect object that contains them.

use crate::encryption::SecurityState;
use crate::error::Result;
use crate::object::{Dict, Object, ObjectRef};
use std::cell::Cell;
use std::io::Write;

/// Format a number the way it is written into PDF syntax.
///
/// ```
/// use pdf_engine::writer::format_number;
///
/// assert_eq!(format_number(612.0), "612");
/// assert_eq!(format_number(0.1 + 0.2), "0.3");
/// assert_eq!(format_number(-1.25), "-1.25");
/// ```
pub fn format_number(value: f64) -> String {
    if !value.is_finite() {
        log::warn!("Writing non-finite number {} as 0", value);
        return "0".to_string();
    }
    if value.fract() == 0.0 && value.abs() < 1e15 {
        return format!("{}", value as i64);
    }
    let formatted = format!("{:.5}", value);
    let trimmed = formatted.trim_end_matches('0').trim_end_matches('.');
    match trimmed {
        "-0" | "" => "0".to_string(),
        t => t.to_string(),
    }
}

/// Ordinal reserved for stream data; strings count up from 0.
const STREAM_ORDINAL: u32 = u32::MAX;

/// Encryption context for one indirect object.
struct Encrypting<'a> {
    state: &'a SecurityState,
    id: ObjectRef,
    ordinal: Cell<u32>,
}

impl Encrypting<'_> {
    fn encrypt(&self, data: &[u8]) -> Result<Vec<u8>> {
        let ordinal = self.ordinal.get();
        self.ordinal.set(ordinal + 1);
        self.state.encrypt_bytes(self.id, ordinal, data)
    }
}

/// Serializer for PDF objects.
#[derive(Debug, Clone, Default)]
pub struct ObjectSerializer {
    /// Whether to use compact formatting (minimal whitespace)
    compact: bool,
}

impl ObjectSerializer {
    /// Create a new object serializer with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a compact serializer (minimal whitespace).
    pub fn compact() -> Self {
        Self { compact: true }
    }

    /// Serialize a direct object.
    pub fn serialize(&self, obj: &Object) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        self.write_object(&mut buf, obj, None)?;
        Ok(buf)
    }

    /// Serialize a direct object to a string (for logs and tests).
    pub fn serialize_to_string(&self, obj: &Object) -> Result<String> {
        Ok(String::from_utf8_lossy(&self.serialize(obj)?).into_owned())
    }

    /// Serialize an indirect object definition, encrypting its strings and
    /// stream data when `security` is given.
    ///
    /// Format: `{num} {gen} obj\n{object}\nendobj\n`
    pub fn serialize_indirect(
        &self,
        id: ObjectRef,
        obj: &Object,
        security: Option<&SecurityState>,
    ) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        writeln!(buf, "{} {} obj", id.num, id.gen)?;
        let ctx = security.map(|state| Encrypting {
            state,
            id,
            ordinal: Cell::new(0),
        });
        self.write_object(&mut buf, obj, ctx.as_ref())?;
        buf.extend_from_slice(b"\nendobj\n");
        Ok(buf)
    }

    fn write_object<W: Write>(&self, w: &mut W, obj: &Object, enc: Option<&Encrypting>) -> Result<()> {
        match obj {
            Object::Null => write!(w, "null")?,
            Object::Boolean(b) => write!(w, "{}", b)?,
            Object::Integer(i) => write!(w, "{}", i)?,
            Object::Real(r) => write!(w, "{}", format_number(*r))?,
            Object::String(s) => match enc {
                Some(enc) => write_string(w, &enc.encrypt(s)?)?,
                None => write_string(w, s)?,
            },
            Object::Name(n) => write_name(w, n)?,
            Object::Array(arr) => {
                write!(w, "[")?;
                for (i, item) in arr.iter().enumerate() {
                    if i > 0 {
                        write!(w, " ")?;
                    }
                    self.write_object(w, item, enc)?;
                }
                write!(w, "]")?;
            },
            Object::Dictionary(dict) => self.write_dictionary(w, dict, enc)?,
            Object::Stream { dict, data } => self.write_stream(w, dict, data, enc)?,
            Object::Reference(r) => write!(w, "{} {} R", r.num, r.gen)?,
        }
        Ok(())
    }

    fn write_dictionary<W: Write>(&self, w: &mut W, dict: &Dict, enc: Option<&Encrypting>) -> Result<()> {
        write!(w, "<<")?;
        let mut keys: Vec<_> = dict.keys().collect();
        keys.sort();
        for key in keys {
            if self.compact {
                write!(w, " ")?;
            } else {
                write!(w, "\n  ")?;
            }
            write_name(w, key)?;
            write!(w, " ")?;
            self.write_object(w, &dict[key], enc)?;
        }
        if self.compact {
            write!(w, " >>")?;
        } else {
            if !dict.is_empty() {
                writeln!(w)?;
            }
            write!(w, ">>")?;
        }
        Ok(())
    }

    /// `/Length` is always replaced with the direct length of the bytes
    /// actually written.
    fn write_stream<W: Write>(
        &self,
        w: &mut W,
        dict: &Dict,
        data: &[u8],
        enc: Option<&Encrypting>,
    ) -> Result<()> {
        let body = match enc {
            Some(e) if !e.state.is_exempt_stream(dict) => {
                e.state.encrypt_bytes(e.id, STREAM_ORDINAL, data)?
            },
            _ => data.to_vec(),
        };
        let mut dict = dict.clone();
        dict.insert("Length".to_string(), Object::Integer(body.len() as i64));
        self.write_dictionary(w, &dict, enc)?;
        w.write_all(b"\nstream\n")?;
        w.write_all(&body)?;
        w.write_all(b"\nendstream")?;
        Ok(())
    }
}

/// Literal syntax for printable data, hex otherwise.
fn write_string<W: Write>(w: &mut W, data: &[u8]) -> std::io::Result<()> {
    let printable = data
        .iter()
        .all(|&b| b == b'\n' || b == b'\r' || b == b'\t' || (0x20..=0x7E).contains(&b));

    if printable {
        w.write_all(b"(")?;
        for &byte in data {
            match byte {
                b'(' => w.write_all(b"\\(")?,
                b')' => w.write_all(b"\\)")?,
                b'\\' => w.write_all(b"\\\\")?,
                b'\n' => w.write_all(b"\\n")?,
                b'\r' => w.write_all(b"\\r")?,
                b'\t' => w.write_all(b"\\t")?,
                _ => w.write_all(&[byte])?,
            }
        }
        w.write_all(b")")
    } else {
        w.write_all(b"<")?;
        for byte in data {
            write!(w, "{:02X}", byte)?;
        }
        w.write_all(b">")
    }
}

/// Names start with `/`; bytes outside the regular set are `#XX` escaped.
fn write_name<W: Write>(w: &mut W, name: &str) -> std::io::Result<()> {
    w.write_all(b"/")?;
    for byte in name.bytes() {
        match byte {
            b'!'..=b'~'
                if !matches!(
                    byte,
                    b'#' | b'(' | b')' | b'<' | b'>' | b'[' | b']' | b'{' | b'}' | b'/' | b'%'
                ) =>
            {
                w.write_all(&[byte])?
            },
            _ => write!(w, "#{:02X}", byte)?,
        }
    }
    Ok(())
}
