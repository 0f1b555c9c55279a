//! Hessian 2.0 serialization for [`Value`].
//!
//! The encoder always emits the most compact form the grammar allows and
//! never emits back-references, since a [`Value`] tree cannot share nodes.
//! The decoder accepts the full grammar produced by Java's
//! `Hessian2Output`, including chunked strings and binaries, typed lists
//! and maps, class definitions and back-references.
//!
//! String lengths count UTF-16 code units, and characters outside the
//! basic multilingual plane travel as surrogate pairs (CESU-8), which is
//! what Java peers expect.

use crate::protocol::error::{Result, ZoorpcError};
use crate::protocol::value::Value;

const CHUNK_SIZE: usize = 0x8000;

/// Deepest list, map or object nesting the decoder accepts.
pub const MAX_DEPTH: usize = 256;

/// Streaming hessian2 writer.
///
/// Class definitions are remembered for the lifetime of the encoder, so a
/// single encoder must be used for one whole message body.
#[derive(Default)]
pub struct HessianEncoder {
    buf: Vec<u8>,
    classes: Vec<(String, Vec<String>)>,
}

impl HessianEncoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }

    pub fn write_value(&mut self, value: &Value) {
        match value {
            Value::Null => self.write_null(),
            Value::Bool(b) => self.write_bool(*b),
            Value::Int(i) => self.write_int(*i),
            Value::Long(l) => self.write_long(*l),
            Value::Double(d) => self.write_double(*d),
            Value::String(s) => self.write_string(s),
            Value::Binary(bytes) => self.write_binary(bytes),
            Value::Date(ms) => self.write_date(*ms),
            Value::List(items) => self.write_list(items),
            Value::Map(entries) => self.write_map(entries),
            Value::Object { class, fields } => self.write_object(class, fields),
        }
    }

    pub fn write_null(&mut self) {
        self.buf.push(b'N');
    }

    pub fn write_bool(&mut self, b: bool) {
        self.buf.push(if b { b'T' } else { b'F' });
    }

    pub fn write_int(&mut self, v: i32) {
        if (-0x10..=0x2f).contains(&v) {
            self.buf.push((0x90 + v) as u8);
        } else if (-0x800..=0x7ff).contains(&v) {
            self.buf.push((0xc8 + (v >> 8)) as u8);
            self.buf.push(v as u8);
        } else if (-0x40000..=0x3ffff).contains(&v) {
            self.buf.push((0xd4 + (v >> 16)) as u8);
            self.buf.push((v >> 8) as u8);
            self.buf.push(v as u8);
        } else {
            self.buf.push(b'I');
            self.buf.extend_from_slice(&v.to_be_bytes());
        }
    }

    pub fn write_long(&mut self, v: i64) {
        if (-0x08..=0x0f).contains(&v) {
            self.buf.push((0xe0 + v) as u8);
        } else if (-0x800..=0x7ff).contains(&v) {
            self.buf.push((0xf8 + (v >> 8)) as u8);
            self.buf.push(v as u8);
        } else if (-0x40000..=0x3ffff).contains(&v) {
            self.buf.push((0x3c + (v >> 16)) as u8);
            self.buf.push((v >> 8) as u8);
            self.buf.push(v as u8);
        } else if let Ok(small) = i32::try_from(v) {
            self.buf.push(0x59);
            self.buf.extend_from_slice(&small.to_be_bytes());
        } else {
            self.buf.push(b'L');
            self.buf.extend_from_slice(&v.to_be_bytes());
        }
    }

    pub fn write_double(&mut self, v: f64) {
        let as_int = v as i64;
        // exact integral values only; -0.0 and NaN take the long form
        let integral = (as_int as f64).to_bits() == v.to_bits();

        if v.to_bits() == 0.0f64.to_bits() {
            self.buf.push(0x5b);
        } else if v.to_bits() == 1.0f64.to_bits() {
            self.buf.push(0x5c);
        } else if integral && (i64::from(i8::MIN)..=i64::from(i8::MAX)).contains(&as_int) {
            self.buf.push(0x5d);
            self.buf.push(as_int as i8 as u8);
        } else if integral && (i64::from(i16::MIN)..=i64::from(i16::MAX)).contains(&as_int) {
            self.buf.push(0x5e);
            self.buf.extend_from_slice(&(as_int as i16).to_be_bytes());
        } else {
            self.buf.push(b'D');
            self.buf.extend_from_slice(&v.to_be_bytes());
        }
    }

    pub fn write_date(&mut self, ms: i64) {
        self.buf.push(0x4a);
        self.buf.extend_from_slice(&ms.to_be_bytes());
    }

    pub fn write_string(&mut self, s: &str) {
        let units: Vec<u16> = s.encode_utf16().collect();
        let mut rest = units.as_slice();

        while rest.len() > CHUNK_SIZE {
            let (chunk, tail) = rest.split_at(CHUNK_SIZE);
            self.buf.push(b'R');
            self.buf.extend_from_slice(&(CHUNK_SIZE as u16).to_be_bytes());
            self.write_utf16_units(chunk);
            rest = tail;
        }

        let len = rest.len();
        if len <= 0x1f {
            self.buf.push(len as u8);
        } else if len <= 0x3ff {
            self.buf.push(0x30 + (len >> 8) as u8);
            self.buf.push(len as u8);
        } else {
            self.buf.push(b'S');
            self.buf.extend_from_slice(&(len as u16).to_be_bytes());
        }
        self.write_utf16_units(rest);
    }

    fn write_utf16_units(&mut self, units: &[u16]) {
        for &unit in units {
            let u = u32::from(unit);
            if u < 0x80 {
                self.buf.push(u as u8);
            } else if u < 0x800 {
                self.buf.push((0xc0 | (u >> 6)) as u8);
                self.buf.push((0x80 | (u & 0x3f)) as u8);
            } else {
                self.buf.push((0xe0 | (u >> 12)) as u8);
                self.buf.push((0x80 | ((u >> 6) & 0x3f)) as u8);
                self.buf.push((0x80 | (u & 0x3f)) as u8);
            }
        }
    }

    pub fn write_binary(&mut self, bytes: &[u8]) {
        let mut rest = bytes;

        while rest.len() > CHUNK_SIZE {
            let (chunk, tail) = rest.split_at(CHUNK_SIZE);
            self.buf.push(b'A');
            self.buf.extend_from_slice(&(CHUNK_SIZE as u16).to_be_bytes());
            self.buf.extend_from_slice(chunk);
            rest = tail;
        }

        let len = rest.len();
        if len <= 0x0f {
            self.buf.push(0x20 + len as u8);
        } else if len <= 0x3ff {
            self.buf.push(0x34 + (len >> 8) as u8);
            self.buf.push(len as u8);
        } else {
            self.buf.push(b'B');
            self.buf.extend_from_slice(&(len as u16).to_be_bytes());
        }
        self.buf.extend_from_slice(rest);
    }

    pub fn write_list(&mut self, items: &[Value]) {
        if items.len() <= 7 {
            self.buf.push(0x78 + items.len() as u8);
        } else {
            self.buf.push(0x58);
            self.write_int(items.len() as i32);
        }
        for item in items {
            self.write_value(item);
        }
    }

    pub fn write_map(&mut self, entries: &[(Value, Value)]) {
        self.buf.push(b'H');
        for (key, value) in entries {
            self.write_value(key);
            self.write_value(value);
        }
        self.buf.push(b'Z');
    }

    /// Writes a map whose keys and values are all strings.
    pub fn write_string_map<'a, I>(&mut self, entries: I)
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        self.buf.push(b'H');
        for (key, value) in entries {
            self.write_string(key);
            self.write_string(value);
        }
        self.buf.push(b'Z');
    }

    pub fn write_object(&mut self, class: &str, fields: &[(String, Value)]) {
        let names: Vec<String> = fields.iter().map(|(name, _)| name.clone()).collect();

        let index = match self
            .classes
            .iter()
            .position(|(c, f)| c == class && *f == names)
        {
            Some(index) => index,
            None => {
                self.buf.push(b'C');
                self.write_string(class);
                self.write_int(names.len() as i32);
                for name in &names {
                    self.write_string(name);
                }
                self.classes.push((class.to_string(), names));
                self.classes.len() - 1
            }
        };

        if index <= 0x0f {
            self.buf.push(0x60 + index as u8);
        } else {
            self.buf.push(b'O');
            self.write_int(index as i32);
        }
        for (_, value) in fields {
            self.write_value(value);
        }
    }
}

struct ClassDef {
    name: String,
    fields: Vec<String>,
}

/// Hessian2 reader over a complete message body.
pub struct HessianDecoder<'a> {
    input: &'a [u8],
    pos: usize,
    classes: Vec<ClassDef>,
    types: Vec<String>,
    refs: Vec<Value>,
    depth: usize,
}

impl<'a> HessianDecoder<'a> {
    pub fn new(input: &'a [u8]) -> Self {
        Self {
            input,
            pos: 0,
            classes: Vec::new(),
            types: Vec::new(),
            refs: Vec::new(),
            depth: 0,
        }
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn is_empty(&self) -> bool {
        self.pos >= self.input.len()
    }

    fn read_u8(&mut self) -> Result<u8> {
        let byte = *self.input.get(self.pos).ok_or_else(|| {
            ZoorpcError::Serialization(format!("unexpected end of input at offset {}", self.pos))
        })?;
        self.pos += 1;
        Ok(byte)
    }

    fn peek_u8(&self) -> Result<u8> {
        self.input.get(self.pos).copied().ok_or_else(|| {
            ZoorpcError::Serialization(format!("unexpected end of input at offset {}", self.pos))
        })
    }

    fn read_bytes(&mut self, len: usize) -> Result<&'a [u8]> {
        let end = self.pos.checked_add(len).filter(|end| *end <= self.input.len());
        let end = end.ok_or_else(|| {
            ZoorpcError::Serialization(format!(
                "need {} bytes at offset {}, only {} remain",
                len,
                self.pos,
                self.input.len().saturating_sub(self.pos)
            ))
        })?;
        let bytes = &self.input[self.pos..end];
        self.pos = end;
        Ok(bytes)
    }

    fn read_array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.read_bytes(N)?);
        Ok(out)
    }

    fn read_u16(&mut self) -> Result<usize> {
        Ok(u16::from_be_bytes(self.read_array()?) as usize)
    }

    fn unexpected(&self, tag: u8, expecting: &str) -> ZoorpcError {
        ZoorpcError::Serialization(format!(
            "unexpected tag 0x{:02x} at offset {} while reading {}",
            tag,
            self.pos.saturating_sub(1),
            expecting
        ))
    }

    pub fn read_value(&mut self) -> Result<Value> {
        let mut tag = self.read_u8()?;
        while tag == b'C' {
            self.class_def()?;
            tag = self.read_u8()?;
        }

        match tag {
            b'N' => Ok(Value::Null),
            b'T' => Ok(Value::Bool(true)),
            b'F' => Ok(Value::Bool(false)),
            0x80..=0xd7 | b'I' => self.int_body(tag).map(Value::Int),
            0xd8..=0xff | 0x38..=0x3f | 0x59 | b'L' => self.long_body(tag).map(Value::Long),
            0x5b..=0x5f | b'D' => self.double_body(tag).map(Value::Double),
            0x4a => Ok(Value::Date(i64::from_be_bytes(self.read_array()?))),
            0x4b => {
                let minutes = i32::from_be_bytes(self.read_array()?);
                Ok(Value::Date(i64::from(minutes) * 60_000))
            }
            0x00..=0x1f | 0x30..=0x33 | b'S' | b'R' => self.string_body(tag).map(Value::String),
            0x20..=0x2f | 0x34..=0x37 | b'B' | b'A' => self.binary_body(tag).map(Value::Binary),
            0x55..=0x58 | 0x70..=0x7f => self.nested(|d| d.list_body(tag)),
            b'H' | b'M' => self.nested(|d| d.map_body(tag)),
            b'O' => {
                let index = self.read_int()?;
                self.nested(|d| d.object_body(index))
            }
            0x60..=0x6f => self.nested(|d| d.object_body(i32::from(tag - 0x60))),
            0x51 => {
                let index = self.read_int()?;
                usize::try_from(index)
                    .ok()
                    .and_then(|i| self.refs.get(i))
                    .cloned()
                    .ok_or_else(|| {
                        ZoorpcError::Serialization(format!("dangling reference #{}", index))
                    })
            }
            other => Err(self.unexpected(other, "value")),
        }
    }

    /// Runs `read` one container level deeper, failing past [`MAX_DEPTH`].
    fn nested(&mut self, read: impl FnOnce(&mut Self) -> Result<Value>) -> Result<Value> {
        if self.depth >= MAX_DEPTH {
            return Err(ZoorpcError::Serialization(format!(
                "nesting too deep at offset {} (limit {})",
                self.pos.saturating_sub(1),
                MAX_DEPTH
            )));
        }
        self.depth += 1;
        let value = read(self);
        self.depth -= 1;
        value
    }

    pub fn read_int(&mut self) -> Result<i32> {
        let tag = self.read_u8()?;
        match tag {
            0x80..=0xd7 | b'I' => self.int_body(tag),
            other => Err(self.unexpected(other, "int")),
        }
    }

    pub fn read_string(&mut self) -> Result<String> {
        let tag = self.read_u8()?;
        match tag {
            0x00..=0x1f | 0x30..=0x33 | b'S' | b'R' => self.string_body(tag),
            other => Err(self.unexpected(other, "string")),
        }
    }

    /// Reads a string that may be encoded as null.
    pub fn read_nullable_string(&mut self) -> Result<Option<String>> {
        if self.peek_u8()? == b'N' {
            self.pos += 1;
            return Ok(None);
        }
        self.read_string().map(Some)
    }

    fn int_body(&mut self, tag: u8) -> Result<i32> {
        Ok(match tag {
            0x80..=0xbf => i32::from(tag) - 0x90,
            0xc0..=0xcf => ((i32::from(tag) - 0xc8) << 8) + i32::from(self.read_u8()?),
            0xd0..=0xd7 => {
                let b1 = i32::from(self.read_u8()?);
                let b0 = i32::from(self.read_u8()?);
                ((i32::from(tag) - 0xd4) << 16) + (b1 << 8) + b0
            }
            _ => i32::from_be_bytes(self.read_array()?),
        })
    }

    fn long_body(&mut self, tag: u8) -> Result<i64> {
        Ok(match tag {
            0xd8..=0xef => i64::from(tag) - 0xe0,
            0xf0..=0xff => ((i64::from(tag) - 0xf8) << 8) + i64::from(self.read_u8()?),
            0x38..=0x3f => {
                let b1 = i64::from(self.read_u8()?);
                let b0 = i64::from(self.read_u8()?);
                ((i64::from(tag) - 0x3c) << 16) + (b1 << 8) + b0
            }
            0x59 => i64::from(i32::from_be_bytes(self.read_array()?)),
            _ => i64::from_be_bytes(self.read_array()?),
        })
    }

    fn double_body(&mut self, tag: u8) -> Result<f64> {
        Ok(match tag {
            0x5b => 0.0,
            0x5c => 1.0,
            0x5d => f64::from(self.read_u8()? as i8),
            0x5e => f64::from(i16::from_be_bytes(self.read_array()?)),
            0x5f => 0.001 * f64::from(i32::from_be_bytes(self.read_array()?)),
            _ => f64::from_be_bytes(self.read_array()?),
        })
    }

    fn string_body(&mut self, first: u8) -> Result<String> {
        let mut units: Vec<u16> = Vec::new();
        let mut tag = first;

        loop {
            let (len, last) = match tag {
                0x00..=0x1f => (tag as usize, true),
                0x30..=0x33 => ((((tag - 0x30) as usize) << 8) | self.read_u8()? as usize, true),
                b'S' => (self.read_u16()?, true),
                b'R' => (self.read_u16()?, false),
                other => return Err(self.unexpected(other, "string chunk")),
            };

            let mut read = 0;
            while read < len {
                read += self.read_char(&mut units)?;
            }

            if last {
                break;
            }
            tag = self.read_u8()?;
        }

        String::from_utf16(&units)
            .map_err(|e| ZoorpcError::Serialization(format!("invalid UTF-16 in string: {}", e)))
    }

    /// Reads one encoded character, returning how many UTF-16 units it
    /// contributed.
    fn read_char(&mut self, units: &mut Vec<u16>) -> Result<usize> {
        let b0 = u32::from(self.read_u8()?);

        if b0 < 0x80 {
            units.push(b0 as u16);
            return Ok(1);
        }

        let continuation = |decoder: &mut Self| -> Result<u32> {
            let b = decoder.read_u8()?;
            if b & 0xc0 != 0x80 {
                return Err(decoder.unexpected(b, "utf-8 continuation byte"));
            }
            Ok(u32::from(b & 0x3f))
        };

        if b0 & 0xe0 == 0xc0 {
            let c = ((b0 & 0x1f) << 6) | continuation(self)?;
            units.push(c as u16);
            Ok(1)
        } else if b0 & 0xf0 == 0xe0 {
            let c = ((b0 & 0x0f) << 12) | (continuation(self)? << 6) | continuation(self)?;
            units.push(c as u16);
            Ok(1)
        } else if b0 & 0xf8 == 0xf0 {
            // four-byte UTF-8 from non-Java writers
            let c = ((b0 & 0x07) << 18)
                | (continuation(self)? << 12)
                | (continuation(self)? << 6)
                | continuation(self)?;
            let ch = char::from_u32(c).ok_or_else(|| {
                ZoorpcError::Serialization(format!("invalid code point U+{:X}", c))
            })?;
            let mut pair = [0u16; 2];
            let encoded = ch.encode_utf16(&mut pair);
            units.extend_from_slice(encoded);
            Ok(encoded.len())
        } else {
            Err(self.unexpected(b0 as u8, "utf-8 lead byte"))
        }
    }

    fn binary_body(&mut self, first: u8) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        let mut tag = first;

        loop {
            let (len, last) = match tag {
                0x20..=0x2f => ((tag - 0x20) as usize, true),
                0x34..=0x37 => ((((tag - 0x34) as usize) << 8) | self.read_u8()? as usize, true),
                b'B' => (self.read_u16()?, true),
                b'A' => (self.read_u16()?, false),
                other => return Err(self.unexpected(other, "binary chunk")),
            };
            out.extend_from_slice(self.read_bytes(len)?);

            if last {
                break;
            }
            tag = self.read_u8()?;
        }

        Ok(out)
    }

    /// Reads a type name, either inline or as a reference to an earlier one.
    fn read_type(&mut self) -> Result<String> {
        let tag = self.peek_u8()?;
        match tag {
            0x00..=0x1f | 0x30..=0x33 | b'S' | b'R' => {
                let name = self.read_string()?;
                self.types.push(name.clone());
                Ok(name)
            }
            _ => {
                let index = self.read_int()?;
                usize::try_from(index)
                    .ok()
                    .and_then(|i| self.types.get(i))
                    .cloned()
                    .ok_or_else(|| {
                        ZoorpcError::Serialization(format!("dangling type reference #{}", index))
                    })
            }
        }
    }

    fn read_length(&mut self) -> Result<usize> {
        let len = self.read_int()?;
        usize::try_from(len)
            .map_err(|_| ZoorpcError::Serialization(format!("negative length {}", len)))
    }

    fn list_body(&mut self, tag: u8) -> Result<Value> {
        let slot = self.refs.len();
        self.refs.push(Value::Null);

        let fixed_len = match tag {
            0x55 => {
                self.read_type()?;
                None
            }
            0x56 => {
                self.read_type()?;
                Some(self.read_length()?)
            }
            0x57 => None,
            0x58 => Some(self.read_length()?),
            0x70..=0x77 => {
                self.read_type()?;
                Some((tag - 0x70) as usize)
            }
            _ => Some((tag - 0x78) as usize),
        };

        let mut items = Vec::new();
        match fixed_len {
            Some(len) => {
                for _ in 0..len {
                    items.push(self.read_value()?);
                }
            }
            None => {
                while self.peek_u8()? != b'Z' {
                    items.push(self.read_value()?);
                }
                self.pos += 1;
            }
        }

        let list = Value::List(items);
        self.refs[slot] = list.clone();
        Ok(list)
    }

    fn map_body(&mut self, tag: u8) -> Result<Value> {
        let slot = self.refs.len();
        self.refs.push(Value::Null);

        if tag == b'M' {
            self.read_type()?;
        }

        let mut entries = Vec::new();
        while self.peek_u8()? != b'Z' {
            let key = self.read_value()?;
            let value = self.read_value()?;
            entries.push((key, value));
        }
        self.pos += 1;

        let map = Value::Map(entries);
        self.refs[slot] = map.clone();
        Ok(map)
    }

    fn class_def(&mut self) -> Result<()> {
        let name = self.read_string()?;
        let count = self.read_length()?;
        let mut fields = Vec::with_capacity(count.min(256));
        for _ in 0..count {
            fields.push(self.read_string()?);
        }
        self.classes.push(ClassDef { name, fields });
        Ok(())
    }

    fn object_body(&mut self, index: i32) -> Result<Value> {
        let def = usize::try_from(index)
            .ok()
            .and_then(|i| self.classes.get(i))
            .ok_or_else(|| {
                ZoorpcError::Serialization(format!("undefined class definition #{}", index))
            })?;
        let class = def.name.clone();
        let names = def.fields.clone();

        // cyclic references to an object still being read resolve to Null
        let slot = self.refs.len();
        self.refs.push(Value::Null);

        let mut fields = Vec::with_capacity(names.len());
        for name in names {
            let value = self.read_value()?;
            fields.push((name, value));
        }

        let object = Value::Object { class, fields };
        self.refs[slot] = object.clone();
        Ok(object)
    }
}
