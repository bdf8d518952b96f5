//! Typed tuple elements and their order-preserving byte encoding.

use bytes::{BufMut, Bytes, BytesMut};

use crate::{Result, TR_VERSION_LEN, TupleError, VERSIONSTAMP_LEN, Versionstamp};

// ============================================================================
// Type Codes
// ============================================================================

const BYTES_CODE: u8 = 0x01;
const STRING_CODE: u8 = 0x02;
const INT_ZERO_CODE: u8 = 0x14;
const VERSIONSTAMP_CODE: u8 = 0x33;

/// Terminator for bytes/string bodies.
const NIL: u8 = 0x00;

/// Escape byte: a literal 0x00 inside a bytes/string body is written as
/// `0x00 0xFF` so the terminator stays unambiguous without breaking order.
const ESCAPE: u8 = 0xFF;

/// Largest integer width the encoding supports, in bytes.
const MAX_INT_BYTES: u8 = 8;

/// A single typed element of a [`Tuple`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Element {
    /// An opaque byte string.
    Bytes(Bytes),
    /// A UTF-8 string.
    String(String),
    /// A signed 64-bit integer.
    Int(i64),
    /// A 12-byte versionstamp.
    Versionstamp(Versionstamp),
}

impl Element {
    fn type_name(&self) -> &'static str {
        match self {
            Element::Bytes(_) => "bytes",
            Element::String(_) => "string",
            Element::Int(_) => "int",
            Element::Versionstamp(_) => "versionstamp",
        }
    }
}

impl From<i64> for Element {
    fn from(value: i64) -> Self {
        Element::Int(value)
    }
}

impl From<&str> for Element {
    fn from(value: &str) -> Self {
        Element::String(value.to_string())
    }
}

impl From<String> for Element {
    fn from(value: String) -> Self {
        Element::String(value)
    }
}

impl From<Bytes> for Element {
    fn from(value: Bytes) -> Self {
        Element::Bytes(value)
    }
}

impl From<Vec<u8>> for Element {
    fn from(value: Vec<u8>) -> Self {
        Element::Bytes(Bytes::from(value))
    }
}

impl From<Versionstamp> for Element {
    fn from(value: Versionstamp) -> Self {
        Element::Versionstamp(value)
    }
}

/// An ordered sequence of typed elements with an order-preserving byte
/// encoding.
///
/// Packing preserves element-wise ordering: for tuples `a` and `b`,
/// `a.pack() < b.pack()` under unsigned byte comparison exactly when
/// `a < b` element-wise. Appending an element to a tuple always produces
/// a packed form with the original as a strict prefix.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Tuple {
    elements: Vec<Element>,
}

impl Tuple {
    /// Creates an empty tuple.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a tuple from a list of elements.
    pub fn from_elements(elements: Vec<Element>) -> Self {
        Self { elements }
    }

    /// Appends an element.
    pub fn push(&mut self, element: impl Into<Element>) {
        self.elements.push(element.into());
    }

    /// Builder-style [`push`](Self::push).
    pub fn with(mut self, element: impl Into<Element>) -> Self {
        self.push(element);
        self
    }

    /// Returns the number of elements.
    pub fn len(&self) -> usize {
        self.elements.len()
    }

    /// Returns `true` if the tuple has no elements.
    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    /// Returns the element at `index`, if any.
    pub fn element(&self, index: usize) -> Option<&Element> {
        self.elements.get(index)
    }

    /// Returns all elements.
    pub fn elements(&self) -> &[Element] {
        &self.elements
    }

    /// Returns the integer at `index`.
    pub fn int(&self, index: usize) -> Result<i64> {
        match self.elements.get(index) {
            Some(Element::Int(v)) => Ok(*v),
            Some(other) => Err(TupleError::UnexpectedType {
                expected: "int",
                found: other.type_name(),
            }),
            None => Err(TupleError::Truncated { offset: index }),
        }
    }

    /// Returns the versionstamp at `index`.
    pub fn versionstamp(&self, index: usize) -> Result<&Versionstamp> {
        match self.elements.get(index) {
            Some(Element::Versionstamp(v)) => Ok(v),
            Some(other) => Err(TupleError::UnexpectedType {
                expected: "versionstamp",
                found: other.type_name(),
            }),
            None => Err(TupleError::Truncated { offset: index }),
        }
    }

    /// Returns a new tuple containing the first `len` elements.
    pub fn truncated(&self, len: usize) -> Tuple {
        Tuple {
            elements: self.elements[..len.min(self.elements.len())].to_vec(),
        }
    }

    /// Packs the tuple into its byte encoding.
    pub fn pack(&self) -> Bytes {
        let mut buf = BytesMut::new();
        self.pack_into(&mut buf);
        buf.freeze()
    }

    /// Packs the tuple into an existing buffer.
    pub fn pack_into(&self, buf: &mut BytesMut) {
        for element in &self.elements {
            pack_element(element, buf);
        }
    }

    /// Packs a tuple containing exactly one incomplete versionstamp and
    /// appends the 4-byte little-endian offset of the stamp's placeholder
    /// transaction bytes.
    ///
    /// The resulting buffer is suitable for a versionstamped-value
    /// mutation: the store overwrites the placeholder at commit and strips
    /// the trailing offset, so the offset itself is never durable.
    pub fn pack_with_versionstamp(&self) -> Result<Bytes> {
        let mut buf = BytesMut::new();
        let mut stamp_offset: Option<usize> = None;
        let mut incomplete = 0usize;
        for element in &self.elements {
            if let Element::Versionstamp(vs) = element {
                if !vs.is_complete() {
                    incomplete += 1;
                    // Skip the type code byte to point at the placeholder.
                    stamp_offset = Some(buf.len() + 1);
                }
            }
            pack_element(element, &mut buf);
        }
        match (incomplete, stamp_offset) {
            (1, Some(offset)) => {
                buf.put_u32_le(offset as u32);
                Ok(buf.freeze())
            }
            _ => Err(TupleError::IncompleteVersionstampCount { found: incomplete }),
        }
    }

    /// Unpacks a tuple from its byte encoding, consuming all input.
    pub fn unpack(data: &[u8]) -> Result<Tuple> {
        let mut elements = Vec::new();
        let mut pos = 0;
        while pos < data.len() {
            let (element, next) = unpack_element(data, pos)?;
            elements.push(element);
            pos = next;
        }
        Ok(Tuple { elements })
    }
}

impl FromIterator<Element> for Tuple {
    fn from_iter<I: IntoIterator<Item = Element>>(iter: I) -> Self {
        Tuple {
            elements: iter.into_iter().collect(),
        }
    }
}

// ============================================================================
// Element Encoding
// ============================================================================

fn pack_element(element: &Element, buf: &mut BytesMut) {
    match element {
        Element::Bytes(b) => {
            buf.put_u8(BYTES_CODE);
            pack_escaped(b, buf);
        }
        Element::String(s) => {
            buf.put_u8(STRING_CODE);
            pack_escaped(s.as_bytes(), buf);
        }
        Element::Int(v) => pack_int(*v, buf),
        Element::Versionstamp(vs) => {
            buf.put_u8(VERSIONSTAMP_CODE);
            buf.put_slice(&vs.to_bytes());
        }
    }
}

fn pack_escaped(body: &[u8], buf: &mut BytesMut) {
    for &b in body {
        buf.put_u8(b);
        if b == NIL {
            buf.put_u8(ESCAPE);
        }
    }
    buf.put_u8(NIL);
}

/// Minimal big-endian width of a magnitude, in bytes (at least 1).
fn int_width(magnitude: u64) -> u8 {
    let bits = 64 - magnitude.leading_zeros();
    (bits.div_ceil(8)).max(1) as u8
}

fn pack_int(value: i64, buf: &mut BytesMut) {
    if value == 0 {
        buf.put_u8(INT_ZERO_CODE);
    } else if value > 0 {
        let width = int_width(value as u64);
        buf.put_u8(INT_ZERO_CODE + width);
        buf.put_slice(&value.to_be_bytes()[8 - width as usize..]);
    } else {
        // Negative values are stored as an offset complement: value plus
        // the largest unsigned integer of the same width. Larger widths
        // get smaller type codes, so byte order matches numeric order.
        let width = int_width(value.unsigned_abs());
        let max = if width == 8 {
            u64::MAX as u128
        } else {
            (1u128 << (u32::from(width) * 8)) - 1
        };
        let encoded = (max as i128 + i128::from(value)) as u64;
        buf.put_u8(INT_ZERO_CODE - width);
        buf.put_slice(&encoded.to_be_bytes()[8 - width as usize..]);
    }
}

fn unpack_element(data: &[u8], pos: usize) -> Result<(Element, usize)> {
    let code = data[pos];
    match code {
        BYTES_CODE => {
            let (body, next) = unpack_escaped(data, pos + 1)?;
            Ok((Element::Bytes(Bytes::from(body)), next))
        }
        STRING_CODE => {
            let (body, next) = unpack_escaped(data, pos + 1)?;
            let s = String::from_utf8(body).map_err(|_| TupleError::InvalidUtf8)?;
            Ok((Element::String(s), next))
        }
        VERSIONSTAMP_CODE => {
            let end = pos + 1 + VERSIONSTAMP_LEN;
            if data.len() < end {
                return Err(TupleError::Truncated { offset: pos });
            }
            let vs = Versionstamp::from_bytes(&data[pos + 1..end])?;
            Ok((Element::Versionstamp(vs), end))
        }
        code if int_code(code) => {
            let (value, next) = unpack_int(data, pos)?;
            Ok((Element::Int(value), next))
        }
        code => Err(TupleError::UnknownTypeCode { code, offset: pos }),
    }
}

fn int_code(code: u8) -> bool {
    (INT_ZERO_CODE - MAX_INT_BYTES..=INT_ZERO_CODE + MAX_INT_BYTES).contains(&code)
}

fn unpack_escaped(data: &[u8], mut pos: usize) -> Result<(Vec<u8>, usize)> {
    let start = pos;
    let mut body = Vec::new();
    loop {
        match data.get(pos) {
            Some(&NIL) => {
                if data.get(pos + 1) == Some(&ESCAPE) {
                    body.push(NIL);
                    pos += 2;
                } else {
                    return Ok((body, pos + 1));
                }
            }
            Some(&b) => {
                body.push(b);
                pos += 1;
            }
            None => return Err(TupleError::Truncated { offset: start }),
        }
    }
}

fn unpack_int(data: &[u8], pos: usize) -> Result<(i64, usize)> {
    let code = data[pos];
    if code == INT_ZERO_CODE {
        return Ok((0, pos + 1));
    }
    let negative = code < INT_ZERO_CODE;
    let width = usize::from(if negative {
        INT_ZERO_CODE - code
    } else {
        code - INT_ZERO_CODE
    });
    let end = pos + 1 + width;
    if data.len() < end {
        return Err(TupleError::Truncated { offset: pos });
    }
    let mut raw = [0u8; 8];
    raw[8 - width..].copy_from_slice(&data[pos + 1..end]);
    let magnitude = u64::from_be_bytes(raw);
    let value = if negative {
        let max = if width == 8 {
            u64::MAX as i128
        } else {
            (1i128 << (width * 8)) - 1
        };
        let v = i128::from(magnitude) - max;
        if v < i128::from(i64::MIN) {
            return Err(TupleError::IntOutOfRange);
        }
        v as i64
    } else {
        if i64::try_from(magnitude).is_err() {
            return Err(TupleError::IntOutOfRange);
        }
        magnitude as i64
    };
    Ok((value, end))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pack_one(value: i64) -> Bytes {
        Tuple::new().with(value).pack()
    }

    #[test]
    fn int_encoding_is_bit_exact_at_the_suffix_boundary() {
        // The record layer depends on -1 < 0 < 1 < 2 at the byte level.
        assert_eq!(&pack_one(-1)[..], &[0x13, 0xFE]);
        assert_eq!(&pack_one(0)[..], &[0x14]);
        assert_eq!(&pack_one(1)[..], &[0x15, 0x01]);
        assert_eq!(&pack_one(2)[..], &[0x15, 0x02]);
    }

    #[test]
    fn int_roundtrip_extremes() {
        for v in [i64::MIN, i64::MIN + 1, -300, -1, 0, 1, 255, 256, i64::MAX] {
            let packed = pack_one(v);
            let tuple = Tuple::unpack(&packed).unwrap();
            assert_eq!(tuple.int(0).unwrap(), v, "value {v}");
        }
    }

    #[test]
    fn bytes_with_nul_roundtrip() {
        let raw = Bytes::from_static(b"a\x00b\x00\x00c");
        let packed = Tuple::new().with(raw.clone()).pack();
        let tuple = Tuple::unpack(&packed).unwrap();
        assert_eq!(tuple.element(0), Some(&Element::Bytes(raw)));
    }

    #[test]
    fn string_roundtrip() {
        let packed = Tuple::new().with("hällo").with(7i64).pack();
        let tuple = Tuple::unpack(&packed).unwrap();
        assert_eq!(tuple.element(0), Some(&Element::String("hällo".into())));
        assert_eq!(tuple.int(1).unwrap(), 7);
    }

    #[test]
    fn appending_preserves_prefix() {
        let base = Tuple::new().with("rec").with(42i64);
        let extended = base.clone().with(3i64);
        assert!(extended.pack().starts_with(&base.pack()));
    }

    #[test]
    fn pack_with_versionstamp_offsets_the_placeholder() {
        let tuple = Tuple::new().with(Versionstamp::incomplete(7));
        let packed = tuple.pack_with_versionstamp().unwrap();
        // code byte + 12 stamp bytes + 4 offset bytes
        assert_eq!(packed.len(), 17);
        let offset = u32::from_le_bytes(packed[13..17].try_into().unwrap()) as usize;
        assert_eq!(offset, 1);
        assert_eq!(&packed[offset..offset + TR_VERSION_LEN], &[0xFF; TR_VERSION_LEN]);
    }

    #[test]
    fn pack_with_versionstamp_requires_exactly_one_incomplete() {
        let none = Tuple::new().with(1i64);
        assert!(matches!(
            none.pack_with_versionstamp(),
            Err(TupleError::IncompleteVersionstampCount { found: 0 })
        ));

        let two = Tuple::new()
            .with(Versionstamp::incomplete(1))
            .with(Versionstamp::incomplete(2));
        assert!(matches!(
            two.pack_with_versionstamp(),
            Err(TupleError::IncompleteVersionstampCount { found: 2 })
        ));
    }

    #[test]
    fn versionstamp_roundtrip() {
        let vs = Versionstamp::complete([9; 10], 3);
        let packed = Tuple::new().with(vs.clone()).pack();
        let tuple = Tuple::unpack(&packed).unwrap();
        assert_eq!(tuple.versionstamp(0).unwrap(), &vs);
    }

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn int_order_is_preserved(a in any::<i64>(), b in any::<i64>()) {
                let (pa, pb) = (pack_one(a), pack_one(b));
                prop_assert_eq!(a.cmp(&b), pa.cmp(&pb));
            }

            #[test]
            fn int_roundtrips(v in any::<i64>()) {
                let tuple = Tuple::unpack(&pack_one(v)).unwrap();
                prop_assert_eq!(tuple.int(0).unwrap(), v);
            }

            #[test]
            fn bytes_roundtrip(raw in prop::collection::vec(any::<u8>(), 0..64)) {
                let packed = Tuple::new().with(raw.clone()).pack();
                let tuple = Tuple::unpack(&packed).unwrap();
                prop_assert_eq!(tuple.element(0), Some(&Element::Bytes(Bytes::from(raw))));
            }
        }
    }
}
