//! Parsers for NumPy `.npy` files

use crate::error::{Result, TraceError};
use crate::types::npy_header::{NpyDtype, NpyHeader};
use ndarray::{Array1, Array2, ShapeBuilder};
use winnow::{
    Parser,
    ascii::multispace0,
    binary::{le_u16, le_u32, le_u8},
    combinator::{alt, delimited, opt, preceded, separated, terminated},
    error::ContextError,
    token::{literal, take, take_till, take_while},
};

const MAGIC: &[u8] = b"\x93NUMPY";

/// Value of one entry in the header dict
#[derive(Debug, Clone, PartialEq)]
enum HeaderValue {
    Str(String),
    Bool(bool),
    Shape(Vec<usize>),
}

fn quoted<'a>(input: &mut &'a str) -> std::result::Result<&'a str, ContextError> {
    alt((
        delimited('\'', take_till(0.., '\''), '\''),
        delimited('"', take_till(0.., '"'), '"'),
    ))
    .parse_next(input)
}

fn dimension(input: &mut &str) -> std::result::Result<usize, ContextError> {
    delimited(
        multispace0,
        take_while(1.., |c: char| c.is_ascii_digit()).try_map(|digits: &str| digits.parse::<usize>()),
        multispace0,
    )
    .parse_next(input)
}

/// Parses a Python tuple of integers: `()`, `(5,)`, `(3, 1000)`
fn shape_tuple(input: &mut &str) -> std::result::Result<Vec<usize>, ContextError> {
    delimited(
        '(',
        terminated(separated(0.., dimension, ','), opt(',')),
        (multispace0, ')'),
    )
    .parse_next(input)
}

fn header_value(input: &mut &str) -> std::result::Result<HeaderValue, ContextError> {
    alt((
        quoted.map(|s: &str| HeaderValue::Str(s.to_string())),
        literal("True").value(HeaderValue::Bool(true)),
        literal("False").value(HeaderValue::Bool(false)),
        shape_tuple.map(HeaderValue::Shape),
    ))
    .parse_next(input)
}

fn header_entry<'a>(
    input: &mut &'a str,
) -> std::result::Result<(&'a str, HeaderValue), ContextError> {
    let key = preceded(multispace0, quoted).parse_next(input)?;
    let _ = (multispace0, ':', multispace0).parse_next(input)?;
    let value = header_value.parse_next(input)?;
    let _ = multispace0.parse_next(input)?;
    Ok((key, value))
}

/// Parses the header dict literal into its entries
fn header_dict<'a>(
    input: &mut &'a str,
) -> std::result::Result<Vec<(&'a str, HeaderValue)>, ContextError> {
    delimited(
        (multispace0, '{'),
        terminated(separated(0.., header_entry, ','), opt(',')),
        (multispace0, '}', multispace0),
    )
    .parse_next(input)
}

/// Parses the magic, version and header dict, leaving `input` at the payload
pub fn parse_npy_header(input: &mut &[u8]) -> Result<NpyHeader> {
    let preamble = (take(6usize), le_u8, le_u8).parse_next(input);
    let (magic, major_version, minor_version): (&[u8], u8, u8) =
        preamble.map_err(|e: ContextError| TraceError::NpyFormat(format!("truncated preamble: {e}")))?;
    if magic != MAGIC {
        return Err(TraceError::NpyFormat("missing \\x93NUMPY magic".to_string()));
    }

    let header_len = match major_version {
        1 => le_u16.parse_next(input).map(usize::from),
        2 | 3 => le_u32.parse_next(input).map(|len| len as usize),
        other => {
            return Err(TraceError::NpyFormat(format!("unsupported version {other}.{minor_version}")));
        }
    }
    .map_err(|e: ContextError| TraceError::NpyFormat(format!("truncated header length: {e}")))?;

    let dict_bytes: &[u8] = take(header_len)
        .parse_next(input)
        .map_err(|e: ContextError| TraceError::NpyFormat(format!("truncated header: {e}")))?;
    let dict_text = std::str::from_utf8(dict_bytes)
        .map_err(|e| TraceError::NpyFormat(format!("header is not UTF-8: {e}")))?;

    let entries = header_dict
        .parse(dict_text)
        .map_err(|e| TraceError::NpyFormat(format!("malformed header dict: {e}")))?;

    let mut dtype = None;
    let mut fortran_order = None;
    let mut shape = None;
    for (key, value) in entries {
        match (key, value) {
            ("descr", HeaderValue::Str(descr)) => {
                dtype = Some(NpyDtype::from_descr(&descr).ok_or_else(|| {
                    TraceError::NpyFormat(format!("unsupported dtype '{descr}'"))
                })?);
            }
            ("fortran_order", HeaderValue::Bool(flag)) => fortran_order = Some(flag),
            ("shape", HeaderValue::Shape(dims)) => shape = Some(dims),
            (key, value) => {
                return Err(TraceError::NpyFormat(format!("unexpected header entry {key}: {value:?}")));
            }
        }
    }

    Ok(NpyHeader::builder()
        .major_version(major_version)
        .minor_version(minor_version)
        .dtype(dtype.ok_or_else(|| TraceError::NpyFormat("header has no descr".to_string()))?)
        .fortran_order(fortran_order.unwrap_or(false))
        .shape(shape.ok_or_else(|| TraceError::NpyFormat("header has no shape".to_string()))?)
        .build())
}

/// Decodes the payload into `f64` values in file order
fn decode_payload(payload: &[u8], header: &NpyHeader) -> Result<Vec<f64>> {
    let expected = header.payload_len().ok_or_else(|| {
        TraceError::NpyFormat(format!("shape {:?} is too large to address", header.shape))
    })?;
    if payload.len() < expected {
        return Err(TraceError::NpyFormat(format!(
            "payload holds {} bytes, shape {:?} needs {}",
            payload.len(),
            header.shape,
            expected
        )));
    }
    let payload = &payload[..expected];

    let values = match header.dtype {
        NpyDtype::F32Le => payload
            .chunks_exact(4)
            .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]) as f64)
            .collect(),
        NpyDtype::F32Be => payload
            .chunks_exact(4)
            .map(|b| f32::from_be_bytes([b[0], b[1], b[2], b[3]]) as f64)
            .collect(),
        NpyDtype::F64Le => payload
            .chunks_exact(8)
            .map(|b| f64::from_le_bytes([b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7]]))
            .collect(),
        NpyDtype::F64Be => payload
            .chunks_exact(8)
            .map(|b| f64::from_be_bytes([b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7]]))
            .collect(),
    };
    Ok(values)
}

/// Parses a complete 2-D `.npy` buffer (cells × frames)
pub fn parse_npy_matrix(data: &[u8]) -> Result<Array2<f64>> {
    let mut input = data;
    let header = parse_npy_header(&mut input)?;
    let (rows, cols) = match header.shape.as_slice() {
        [rows, cols] => (*rows, *cols),
        other => {
            return Err(TraceError::InvalidInputShape(format!(
                "expected a 2-D array, found shape {other:?}"
            )));
        }
    };
    let values = decode_payload(input, &header)?;
    let shape = (rows, cols).set_f(header.fortran_order);
    let matrix = Array2::from_shape_vec(shape, values)
        .map_err(|e| TraceError::NpyFormat(format!("shape mismatch: {e}")))?;
    Ok(matrix.as_standard_layout().into_owned())
}

/// Parses a complete 1-D `.npy` buffer
pub fn parse_npy_vector(data: &[u8]) -> Result<Array1<f64>> {
    let mut input = data;
    let header = parse_npy_header(&mut input)?;
    if header.shape.len() != 1 {
        return Err(TraceError::InvalidInputShape(format!(
            "expected a 1-D array, found shape {:?}",
            header.shape
        )));
    }
    Ok(Array1::from_vec(decode_payload(input, &header)?))
}
