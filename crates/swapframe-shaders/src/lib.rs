//! Shaders for the fullscreen triangle frame body.
//!
//! The GLSL sources are always available. With the `compile` feature they
//! are compiled to SPIR-V at build time using shaderc and embedded.

use swapframe_core::{try_align_up, Error, Result};

/// SPIR-V magic number, first word of every module.
pub const SPIRV_MAGIC: u32 = 0x0723_0203;

/// Fullscreen triangle vertex shader source.
pub const FULLSCREEN_TRI_VERT_GLSL: &str = include_str!("../shaders/fullscreen_tri.vert");

/// Fullscreen triangle fragment shader source.
pub const FULLSCREEN_TRI_FRAG_GLSL: &str = include_str!("../shaders/fullscreen_tri.frag");

/// Convert SPIR-V bytes to words.
///
/// Embedded bytes carry no alignment guarantee, so they are copied. Fails if
/// the length is not a whole number of words or the magic number is missing.
pub fn spirv_words(bytes: &[u8]) -> Result<Vec<u32>> {
    let len = u32::try_from(bytes.len())
        .map_err(|_| Error::Precondition(format!("SPIR-V module of {} bytes", bytes.len())))?;
    if try_align_up(len, 4)? != len {
        return Err(Error::Precondition(format!(
            "SPIR-V length {len} is not a multiple of 4"
        )));
    }

    let words: Vec<u32> = bytes
        .chunks_exact(4)
        .map(|chunk| u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect();

    if words.first() != Some(&SPIRV_MAGIC) {
        return Err(Error::Precondition("missing SPIR-V magic number".into()));
    }
    Ok(words)
}

#[cfg(feature = "compile")]
mod compiled {
    use std::sync::OnceLock;

    use swapframe_core::Result;

    static VERT_BYTES: &[u8] = include_bytes!(concat!(env!("OUT_DIR"), "/fullscreen_tri_vert.spv"));
    static FRAG_BYTES: &[u8] = include_bytes!(concat!(env!("OUT_DIR"), "/fullscreen_tri_frag.spv"));

    static VERT: OnceLock<Result<Vec<u32>>> = OnceLock::new();
    static FRAG: OnceLock<Result<Vec<u32>>> = OnceLock::new();

    /// Fullscreen triangle vertex shader as SPIR-V words.
    pub fn fullscreen_tri_vert() -> Result<&'static [u32]> {
        match VERT.get_or_init(|| super::spirv_words(VERT_BYTES)) {
            Ok(words) => Ok(words.as_slice()),
            Err(e) => Err(e.clone()),
        }
    }

    /// Fullscreen triangle fragment shader as SPIR-V words.
    pub fn fullscreen_tri_frag() -> Result<&'static [u32]> {
        match FRAG.get_or_init(|| super::spirv_words(FRAG_BYTES)) {
            Ok(words) => Ok(words.as_slice()),
            Err(e) => Err(e.clone()),
        }
    }
}

#[cfg(feature = "compile")]
pub use compiled::{fullscreen_tri_frag, fullscreen_tri_vert};

#[cfg(test)]
mod tests {
    use super::*;

    fn module(words: &[u32]) -> Vec<u8> {
        words.iter().flat_map(|w| w.to_le_bytes()).collect()
    }

    #[test]
    fn words_from_bytes() {
        let bytes = module(&[SPIRV_MAGIC, 0x0001_0000, 7]);
        assert_eq!(spirv_words(&bytes).unwrap(), vec![SPIRV_MAGIC, 0x0001_0000, 7]);
    }

    #[test]
    fn rejects_partial_word() {
        let mut bytes = module(&[SPIRV_MAGIC]);
        bytes.push(0);
        assert!(matches!(spirv_words(&bytes), Err(Error::Precondition(_))));
    }

    #[test]
    fn rejects_missing_magic() {
        assert!(spirv_words(&module(&[0xdead_beef])).is_err());
        assert!(spirv_words(&[]).is_err());
    }

    #[test]
    fn glsl_sources_embedded() {
        assert!(FULLSCREEN_TRI_VERT_GLSL.contains("gl_VertexIndex"));
        assert!(FULLSCREEN_TRI_FRAG_GLSL.contains("out_color"));
    }

    #[cfg(feature = "compile")]
    #[test]
    fn compiled_shaders_load() {
        let vert = fullscreen_tri_vert().unwrap();
        let frag = fullscreen_tri_frag().unwrap();
        assert_eq!(vert[0], SPIRV_MAGIC, "Invalid SPIR-V magic number");
        assert_eq!(frag[0], SPIRV_MAGIC, "Invalid SPIR-V magic number");
    }
}
