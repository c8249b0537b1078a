use crate::error::Result;
use crate::parser::{parse_npy_matrix, parse_npy_vector};
use crate::types::npy_header::NpyDtype;
use ndarray::{Array1, Array2, ArrayBase, Data, Dimension};
use memmap2::Mmap;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

/// Read a binary file using memory mapping for improved performance
/// This is more efficient for large files as it doesn't load the entire file into RAM
pub fn read_binary_file_mmap(path: impl AsRef<Path>) -> io::Result<Mmap> {
    let file = File::open(path)?;
    // Safety: The file is not modified while the mmap is active
    unsafe { Mmap::map(&file) }
}

/// Load a 2-D `.npy` file (e.g. suite2p `F.npy`) as `f64`
pub fn read_npy_matrix(path: impl AsRef<Path>) -> Result<Array2<f64>> {
    let mmap = read_binary_file_mmap(path)?;
    parse_npy_matrix(&mmap)
}

/// Load a 1-D `.npy` file as `f64`
pub fn read_npy_vector(path: impl AsRef<Path>) -> Result<Array1<f64>> {
    let mmap = read_binary_file_mmap(path)?;
    parse_npy_vector(&mmap)
}

/// Builds a version 1.0 header for a C-ordered little-endian `f64` array.
/// Magic, version, length and dict together are padded to a multiple of 64 bytes.
fn npy_header_bytes(shape: &[usize]) -> Vec<u8> {
    let shape_text = match shape {
        [single] => format!("({single},)"),
        dims => format!(
            "({})",
            dims.iter().map(|d| d.to_string()).collect::<Vec<_>>().join(", ")
        ),
    };
    let descr = NpyDtype::F64Le.descr();
    let mut dict = format!("{{'descr': '{descr}', 'fortran_order': False, 'shape': {shape_text}, }}");
    let preamble_len = 6 + 2 + 2;
    let padding = (64 - (preamble_len + dict.len() + 1) % 64) % 64;
    dict.push_str(&" ".repeat(padding));
    dict.push('\n');

    let mut bytes = Vec::with_capacity(preamble_len + dict.len());
    bytes.extend_from_slice(b"\x93NUMPY");
    bytes.extend_from_slice(&[1, 0]);
    bytes.extend_from_slice(&(dict.len() as u16).to_le_bytes());
    bytes.extend_from_slice(dict.as_bytes());
    bytes
}

/// Write any `f64` array as a `.npy` file in C order
pub fn write_npy<S, D>(path: impl AsRef<Path>, array: &ArrayBase<S, D>) -> Result<()>
where
    S: Data<Elem = f64>,
    D: Dimension,
{
    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);
    writer.write_all(&npy_header_bytes(array.shape()))?;
    // Logical iteration order is row-major regardless of memory layout
    for value in array.iter() {
        writer.write_all(&value.to_le_bytes())?;
    }
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn scratch_path(name: &str) -> std::path::PathBuf {
        std::env::temp_dir().join(format!("caburst-{}-{}", std::process::id(), name))
    }

    #[test]
    fn test_header_is_aligned() {
        for shape in [vec![3usize], vec![12, 4000], vec![1, 0]] {
            let header = npy_header_bytes(&shape);
            assert_eq!(header.len() % 64, 0);
            assert_eq!(header.last(), Some(&b'\n'));
        }
    }

    #[test]
    fn test_matrix_with_nan_survives_disk() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let path = scratch_path("matrix.npy");
        let matrix = array![[1.5, f64::NAN, 3.0], [4.0, 5.0, 6.25]];
        write_npy(&path, &matrix)?;
        let loaded = read_npy_matrix(&path)?;
        std::fs::remove_file(&path)?;

        assert_eq!(loaded.dim(), (2, 3));
        assert!(loaded[[0, 1]].is_nan());
        assert_eq!(loaded[[1, 2]], 6.25);
        assert_eq!(loaded[[0, 0]], 1.5);
        Ok(())
    }

    #[test]
    fn test_transposed_view_is_written_logically() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let path = scratch_path("transposed.npy");
        let matrix = array![[1.0, 2.0], [3.0, 4.0], [5.0, 6.0]];
        write_npy(&path, &matrix.t())?;
        let loaded = read_npy_matrix(&path)?;
        std::fs::remove_file(&path)?;
        assert_eq!(loaded, matrix.t().to_owned());
        Ok(())
    }

    #[test]
    fn test_vector_file() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let path = scratch_path("vector.npy");
        let vector = Array1::linspace(0.0, 1.0, 11);
        write_npy(&path, &vector)?;
        let loaded = read_npy_vector(&path)?;
        std::fs::remove_file(&path)?;
        assert_eq!(loaded, vector);
        Ok(())
    }
}
