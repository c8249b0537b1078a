//! Header of a NumPy `.npy` array file

use bon::Builder;

/// Element type of the array payload. Only floating point payloads are accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NpyDtype {
    F32Le,
    F32Be,
    F64Le,
    F64Be,
}

impl NpyDtype {
    pub fn from_descr(descr: &str) -> Option<Self> {
        match descr {
            "<f4" => Some(NpyDtype::F32Le),
            ">f4" => Some(NpyDtype::F32Be),
            "<f8" => Some(NpyDtype::F64Le),
            ">f8" => Some(NpyDtype::F64Be),
            _ => None,
        }
    }

    pub fn descr(&self) -> &'static str {
        match self {
            NpyDtype::F32Le => "<f4",
            NpyDtype::F32Be => ">f4",
            NpyDtype::F64Le => "<f8",
            NpyDtype::F64Be => ">f8",
        }
    }

    pub fn item_size(&self) -> usize {
        match self {
            NpyDtype::F32Le | NpyDtype::F32Be => 4,
            NpyDtype::F64Le | NpyDtype::F64Be => 8,
        }
    }
}

/// Parsed header:
/// - 6 bytes magic `\x93NUMPY`
/// - 2 bytes version (major, minor)
/// - header length (u16 for v1, u32 for v2/v3)
/// - Python dict literal with `descr`, `fortran_order` and `shape`
#[derive(Debug, Clone, PartialEq, Builder)]
pub struct NpyHeader {
    pub major_version: u8,
    pub minor_version: u8,
    pub dtype: NpyDtype,
    pub fortran_order: bool,
    pub shape: Vec<usize>,
}

impl NpyHeader {
    /// `None` if the shape product overflows `usize`
    pub fn element_count(&self) -> Option<usize> {
        self.shape.iter().try_fold(1usize, |count, &dim| count.checked_mul(dim))
    }

    pub fn payload_len(&self) -> Option<usize> {
        self.element_count()?.checked_mul(self.dtype.item_size())
    }
}
