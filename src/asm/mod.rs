//! Text images and disassembly for Sigma programs.
//!
//! This module provides:
//! - A loader for hexadecimal memory images
//! - A disassembler (instruction word → listing text)

pub mod disasm;
pub mod image;

pub use disasm::{disassemble, disassemble_instruction};
pub use image::{load_image, parse_image, Image, ImageError, Segment};
