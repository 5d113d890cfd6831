//! Binary encoding of an embeddings matrix.
//!
//! Layout, all little-endian:
//!
//! ```text
//! [magic "DKE1"][rows u32][dimension u32][rows * dimension f32][crc32 u32]
//! ```
//!
//! The CRC32 covers every byte before the footer.

use thiserror::Error;

const MAGIC: &[u8; 4] = b"DKE1";
const HEADER_LEN: usize = 12;
const FOOTER_LEN: usize = 4;

/// Reasons a matrix file cannot be decoded.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MatrixError {
    #[error("embeddings file truncated ({0} bytes)")]
    Truncated(usize),

    #[error("embeddings file has unknown header")]
    BadMagic,

    #[error("embeddings header declares {rows} x {dimension}, which does not fit in memory")]
    HeaderOverflow { rows: u32, dimension: u32 },

    #[error("embeddings payload is {actual} bytes, header says {expected}")]
    LengthMismatch { expected: usize, actual: usize },

    #[error("embeddings CRC32 mismatch: stored {stored:#010x}, computed {computed:#010x}")]
    Checksum { stored: u32, computed: u32 },
}

/// A decoded matrix.
#[derive(Debug, Clone, PartialEq)]
pub struct Matrix {
    pub rows: usize,
    pub dimension: usize,
    pub values: Vec<f32>,
}

/// Encode `values` (row-major, `rows * dimension` long).
#[must_use]
pub fn encode(rows: usize, dimension: usize, values: &[f32]) -> Vec<u8> {
    debug_assert_eq!(values.len(), rows * dimension);
    let mut out = Vec::with_capacity(HEADER_LEN + values.len() * 4 + FOOTER_LEN);
    out.extend_from_slice(MAGIC);
    out.extend_from_slice(&(rows as u32).to_le_bytes());
    out.extend_from_slice(&(dimension as u32).to_le_bytes());
    for v in values {
        out.extend_from_slice(&v.to_le_bytes());
    }
    let crc = crc32fast::hash(&out);
    out.extend_from_slice(&crc.to_le_bytes());
    out
}

/// Decode and verify a matrix file.
pub fn decode(bytes: &[u8]) -> Result<Matrix, MatrixError> {
    if bytes.len() < HEADER_LEN + FOOTER_LEN {
        return Err(MatrixError::Truncated(bytes.len()));
    }
    let (body, footer) = bytes.split_at(bytes.len() - FOOTER_LEN);
    let stored = u32::from_le_bytes([footer[0], footer[1], footer[2], footer[3]]);
    let computed = crc32fast::hash(body);
    if stored != computed {
        return Err(MatrixError::Checksum { stored, computed });
    }
    if &body[..4] != MAGIC {
        return Err(MatrixError::BadMagic);
    }

    let header_rows = u32::from_le_bytes([body[4], body[5], body[6], body[7]]);
    let header_dimension = u32::from_le_bytes([body[8], body[9], body[10], body[11]]);
    let rows = header_rows as usize;
    let dimension = header_dimension as usize;
    let payload = &body[HEADER_LEN..];
    let expected = rows
        .checked_mul(dimension)
        .and_then(|n| n.checked_mul(4))
        .ok_or(MatrixError::HeaderOverflow {
            rows: header_rows,
            dimension: header_dimension,
        })?;
    if payload.len() != expected {
        return Err(MatrixError::LengthMismatch {
            expected,
            actual: payload.len(),
        });
    }

    let values = payload
        .chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect();

    Ok(Matrix {
        rows,
        dimension,
        values,
    })
}
