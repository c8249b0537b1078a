//! NPY file parsing functionality

mod npy_parser;

// Re-export the parsing functions
pub use npy_parser::{parse_npy_header, parse_npy_matrix, parse_npy_vector};
