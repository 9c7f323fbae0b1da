//! Text memory images.
//!
//! An image is a plain text file:
//! - One or more hexadecimal words per line, optionally written `.1A2B`
//! - `@addr` moves the load address (also hexadecimal)
//! - `;` starts a comment; blank lines are ignored

use crate::cpu::memory::MemoryFault;
use crate::cpu::Cpu;
use std::path::Path;
use thiserror::Error;

/// A run of consecutive words.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    pub origin: u32,
    pub words: Vec<u32>,
}

/// A parsed image.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Image {
    pub segments: Vec<Segment>,
}

impl Image {
    /// Total number of words.
    pub fn len(&self) -> usize {
        self.segments.iter().map(|s| s.words.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Origin of the first segment.
    pub fn origin(&self) -> Option<u32> {
        self.segments.first().map(|s| s.origin)
    }

    /// Write every segment into physical memory.
    pub fn load_into(&self, cpu: &mut Cpu) -> Result<(), ImageError> {
        for segment in &self.segments {
            cpu.load_words(segment.origin, &segment.words)
                .map_err(|source| ImageError::Load {
                    origin: segment.origin,
                    source,
                })?;
        }
        tracing::info!(words = self.len(), segments = self.segments.len(), "image loaded");
        Ok(())
    }
}

fn parse_hex(token: &str) -> Option<u32> {
    let digits = token.strip_prefix('.').unwrap_or(token);
    u32::from_str_radix(digits, 16).ok()
}

/// Parse image text; words before the first `@` line load at `origin`.
pub fn parse_image(text: &str, origin: u32) -> Result<Image, ImageError> {
    let mut image = Image::default();
    let mut current = Segment {
        origin,
        words: Vec::new(),
    };

    for (line_num, line) in text.lines().enumerate() {
        let code = line.split(';').next().unwrap_or("").trim();
        if code.is_empty() {
            continue;
        }
        let parse_error = |message: String| ImageError::Parse {
            line: line_num + 1,
            message,
        };

        if let Some(addr) = code.strip_prefix('@') {
            let addr = parse_hex(addr.trim())
                .filter(|&a| a <= 0x1_ffff)
                .ok_or_else(|| parse_error(format!("bad origin {addr:?}")))?;
            let done = std::mem::replace(
                &mut current,
                Segment {
                    origin: addr,
                    words: Vec::new(),
                },
            );
            if !done.words.is_empty() {
                image.segments.push(done);
            }
            continue;
        }

        for token in code.split_whitespace() {
            let word = parse_hex(token).ok_or_else(|| parse_error(format!("bad word {token:?}")))?;
            current.words.push(word);
        }
    }

    if !current.words.is_empty() {
        image.segments.push(current);
    }
    Ok(image)
}

/// Read and parse an image file.
pub fn load_image(path: impl AsRef<Path>, origin: u32) -> Result<Image, ImageError> {
    let text = std::fs::read_to_string(path)?;
    parse_image(&text, origin)
}

/// Errors raised while reading or loading an image.
#[derive(Debug, Error)]
pub enum ImageError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("parse error on line {line}: {message}")]
    Parse { line: usize, message: String },

    #[error("segment at .{origin:X} does not fit in memory: {source}")]
    Load {
        origin: u32,
        #[source]
        source: MemoryFault,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MachineConfig;

    #[test]
    fn test_parse_segments() {
        let text = "\
; boot
22000005
.68000026   ; loop
@100
1 2 3
";
        let image = parse_image(text, 0x26).unwrap();
        assert_eq!(image.segments.len(), 2);
        assert_eq!(image.segments[0], Segment { origin: 0x26, words: vec![0x2200_0005, 0x6800_0026] });
        assert_eq!(image.segments[1].origin, 0x100);
        assert_eq!(image.len(), 5);
        assert_eq!(image.origin(), Some(0x26));
    }

    #[test]
    fn test_parse_errors() {
        let err = parse_image("12\nzz\n", 0).unwrap_err();
        assert!(matches!(err, ImageError::Parse { line: 2, .. }));
        let err = parse_image("@40000\n", 0).unwrap_err();
        assert!(matches!(err, ImageError::Parse { line: 1, .. }));
    }

    #[test]
    fn test_load_into() {
        let mut cpu = Cpu::default();
        parse_image("@200\n11 22\n", 0).unwrap().load_into(&mut cpu).unwrap();
        assert_eq!(cpu.read_word(0x201), Some(0x22));
    }

    #[test]
    fn test_load_beyond_memory() {
        let mut cpu = Cpu::new(MachineConfig {
            memory_bytes: 2048,
            ..MachineConfig::default()
        });
        let err = parse_image("@1000\n1\n", 0).unwrap().load_into(&mut cpu).unwrap_err();
        assert!(matches!(err, ImageError::Load { origin: 0x1000, .. }));
    }
}
