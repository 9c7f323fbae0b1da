//! Disassembler for Sigma instruction words.
//!
//! Produces the fixed-width text used in listings and the IA trace:
//! `NAME,R` padded to nine columns, then the operand.

use crate::cpu::alu::sign_extend;
use crate::cpu::decode::{AddrMode, InstructionWord};
use crate::cpu::ops::shift::SHIFT_NAMES;
use crate::cpu::table;

/// Extended mnemonics of BCR for R = 0..4.
const BCR_NAMES: [&str; 5] = ["B", "BGE", "BLE", "BE", "BAZ"];
/// Extended mnemonics of BCS for R = 0..4.
const BCS_NAMES: [&str; 5] = ["BCS", "BL", "BG", "BNE", "BANZ"];

const NAME_COLUMNS: usize = 9;

fn unknown(word: InstructionWord) -> String {
    format!("?.{:X}", word.opcode())
}

fn padded(name: &str) -> String {
    format!("{name:<NAME_COLUMNS$}")
}

fn reference_operand(word: InstructionWord) -> String {
    let mut text = String::new();
    if word.indirect() {
        text.push('*');
    }
    text.push_str(&format!(".{:X}", word.reference()));
    if word.x() != 0 {
        text.push_str(&format!(",{}", word.x()));
    }
    text
}

/// Disassemble a single instruction word.
pub fn disassemble_instruction(word: u32) -> String {
    let word = InstructionWord(word);
    let desc = table::descriptor(word.opcode());
    if !desc.exists() {
        return unknown(word);
    }
    let r = word.r();

    let name = match word.opcode() {
        0x68 if r < BCR_NAMES.len() => BCR_NAMES[r].to_string(),
        0x69 if r < BCS_NAMES.len() => BCS_NAMES[r].to_string(),
        0x25 if !word.indirect() => {
            let kind = SHIFT_NAMES[((word.0 >> 8) & 0x7) as usize];
            let count = sign_extend(word.0 & 0x7f, 7);
            let mut text = format!("{}{count}", padded(&format!("{kind},{r}")));
            if word.x() != 0 {
                text.push_str(&format!(",{}", word.x()));
            }
            return text;
        }
        _ => format!("{},{r}", desc.mnemonic),
    };

    if desc.mode == AddrMode::Immediate {
        if word.indirect() {
            return unknown(word);
        }
        let value = word.immediate();
        return format!("{}.{:X} ({value})", padded(&name), word.0 & 0xf_ffff);
    }
    format!("{}{}", padded(&name), reference_operand(word))
}

/// Disassemble a block of words loaded at `origin`, one listing line each.
pub fn disassemble(words: &[u32], origin: u32) -> String {
    let mut output = String::new();
    for (i, &word) in words.iter().enumerate() {
        let addr = origin.wrapping_add(i as u32);
        output.push_str(&format!(
            ".{addr:05X}  {word:08X}  {}\n",
            disassemble_instruction(word)
        ));
    }
    output
}
