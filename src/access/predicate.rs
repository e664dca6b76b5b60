//! Predicate evaluation for filtered scans.

use crate::access::error::{AccessError, AccessResult};
use std::cmp::Ordering;

/// Type of the attribute a predicate compares on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttrType {
    /// 4-byte little-endian signed integer.
    Int,
    /// 4-byte little-endian IEEE 754 float.
    Float,
    /// Raw bytes, compared lexicographically.
    Str,
}

/// Comparison operator of a predicate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompOp {
    Lt,
    Lte,
    Eq,
    Gte,
    Gt,
    Ne,
}

impl CompOp {
    fn matches(self, ord: Ordering) -> bool {
        match self {
            CompOp::Lt => ord == Ordering::Less,
            CompOp::Lte => ord != Ordering::Greater,
            CompOp::Eq => ord == Ordering::Equal,
            CompOp::Gte => ord != Ordering::Less,
            CompOp::Gt => ord == Ordering::Greater,
            CompOp::Ne => ord != Ordering::Equal,
        }
    }
}

/// Filter over a fixed-position field of each record.
///
/// The field is the byte range `[offset, offset + length)` of the record,
/// interpreted per `attr_type` and compared against `operand`. Records too
/// short to contain the field never match.
#[derive(Debug, Clone)]
pub struct ScanPredicate {
    offset: usize,
    length: usize,
    attr_type: AttrType,
    op: CompOp,
    operand: Vec<u8>,
}

impl ScanPredicate {
    pub fn new(
        offset: usize,
        length: usize,
        attr_type: AttrType,
        op: CompOp,
        operand: Vec<u8>,
    ) -> Self {
        Self {
            offset,
            length,
            attr_type,
            op,
            operand,
        }
    }

    /// Predicate over a 4-byte integer field at `offset`.
    pub fn int(offset: usize, op: CompOp, value: i32) -> Self {
        Self::new(offset, 4, AttrType::Int, op, value.to_le_bytes().to_vec())
    }

    /// Predicate over a 4-byte float field at `offset`.
    pub fn float(offset: usize, op: CompOp, value: f32) -> Self {
        Self::new(offset, 4, AttrType::Float, op, value.to_le_bytes().to_vec())
    }

    /// Predicate over a byte-string field at `offset`; the field length is
    /// the operand length.
    pub fn string(offset: usize, op: CompOp, operand: &[u8]) -> Self {
        Self::new(offset, operand.len(), AttrType::Str, op, operand.to_vec())
    }

    pub fn validate(&self) -> AccessResult<()> {
        if self.length == 0 {
            return Err(AccessError::InvalidScanParameters(
                "filter length must be at least 1".to_string(),
            ));
        }
        match self.attr_type {
            AttrType::Int | AttrType::Float if self.length != 4 => {
                return Err(AccessError::InvalidScanParameters(format!(
                    "numeric filters compare exactly 4 bytes, got length {}",
                    self.length
                )));
            }
            _ => {}
        }
        if self.operand.len() != self.length {
            return Err(AccessError::InvalidScanParameters(format!(
                "operand is {} bytes but filter length is {}",
                self.operand.len(),
                self.length
            )));
        }
        Ok(())
    }

    pub fn matches(&self, record: &[u8]) -> bool {
        let end = match self.offset.checked_add(self.length) {
            Some(end) => end,
            None => return false,
        };
        if record.len() < end {
            return false;
        }
        let field = &record[self.offset..end];

        match self.attr_type {
            AttrType::Int => match (Self::as_i32(field), Self::as_i32(&self.operand)) {
                (Some(field), Some(operand)) => self.op.matches(field.cmp(&operand)),
                _ => false,
            },
            AttrType::Float => match (Self::as_f32(field), Self::as_f32(&self.operand)) {
                (Some(field), Some(operand)) => match field.partial_cmp(&operand) {
                    Some(ord) => self.op.matches(ord),
                    // NaN compares unequal to everything, including itself
                    None => self.op == CompOp::Ne,
                },
                _ => false,
            },
            AttrType::Str => self.op.matches(field.cmp(self.operand.as_slice())),
        }
    }

    fn as_i32(bytes: &[u8]) -> Option<i32> {
        Some(i32::from_le_bytes(bytes.try_into().ok()?))
    }

    fn as_f32(bytes: &[u8]) -> Option<f32> {
        Some(f32::from_le_bytes(bytes.try_into().ok()?))
    }
}
