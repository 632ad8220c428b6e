use std::ops::Range;
use std::str::FromStr;

use miette::SourceSpan;

/// Location within the source file.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct Span {
    offs: SrcOffset,
    len: usize,
}

impl Span {
    pub fn new(offs: SrcOffset, len: usize) -> Self {
        Span { offs, len }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn offs(&self) -> usize {
        self.offs.0
    }

    pub fn end(&self) -> usize {
        self.offs.0 + self.len
    }

    /// Returns a range that can be used to index the source
    pub fn as_range(&self) -> Range<usize> {
        self.offs()..self.end()
    }
}

// Used for miette conversion
impl From<Span> for SourceSpan {
    fn from(value: Span) -> Self {
        SourceSpan::new(value.offs().into(), value.len())
    }
}

/// Byte offset from the start of a source file.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Debug)]
pub struct SrcOffset(pub usize);

/// The CPU registers.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Debug)]
pub enum Register {
    R0 = 0,
    R1,
    R2,
    R3,
    R4,
    R5,
    R6,
    /// Doubles as the stack pointer; `sp` is accepted as an alias in source.
    R7,
}

impl Register {
    pub fn bits(self) -> u16 {
        self as u16
    }
}

impl FromStr for Register {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("sp") {
            return Ok(Register::R7);
        }
        let mut chars = s.chars();
        if !matches!(chars.next(), Some('r' | 'R')) {
            return Err(());
        }
        match chars.as_str() {
            "0" => Ok(Register::R0),
            "1" => Ok(Register::R1),
            "2" => Ok(Register::R2),
            "3" => Ok(Register::R3),
            "4" => Ok(Register::R4),
            "5" => Ok(Register::R5),
            "6" => Ok(Register::R6),
            "7" => Ok(Register::R7),
            _ => Err(()),
        }
    }
}

/// Source-level mnemonics. `Ld`/`St` cover both the absolute and indirect
/// encodings; the operand decides which opcode is emitted.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum InstrKind {
    Nop,
    Mov,
    Add,
    Sub,
    And,
    Or,
    Xor,
    Not,
    Shl,
    Shr,
    Cmp,
    Push,
    Pop,
    Ld,
    St,
    Ldi,
    Jmp,
    Jz,
    Jnz,
    Jc,
    Jn,
    Call,
    Ret,
    Halt,
    Lea,
    Addi,
    Subi,
    Mul,
}

impl FromStr for InstrKind {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        use InstrKind::*;
        let kind = match s.to_ascii_uppercase().as_str() {
            "NOP" => Nop,
            "MOV" => Mov,
            "ADD" => Add,
            "SUB" => Sub,
            "AND" => And,
            "OR" => Or,
            "XOR" => Xor,
            "NOT" => Not,
            "SHL" => Shl,
            "SHR" => Shr,
            "CMP" => Cmp,
            "PUSH" => Push,
            "POP" => Pop,
            "LD" => Ld,
            "ST" => St,
            "LDI" => Ldi,
            "JMP" => Jmp,
            "JZ" => Jz,
            "JNZ" => Jnz,
            "JC" => Jc,
            "JN" => Jn,
            "CALL" => Call,
            "RET" => Ret,
            "HALT" => Halt,
            "LEA" => Lea,
            "ADDI" => Addi,
            "SUBI" => Subi,
            "MUL" => Mul,
            _ => return Err(()),
        };
        Ok(kind)
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum DirKind {
    Org,
    Word,
    Asciiz,
}

impl FromStr for DirKind {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            ".org" => Ok(DirKind::Org),
            ".word" => Ok(DirKind::Word),
            ".asciiz" => Ok(DirKind::Asciiz),
            _ => Err(()),
        }
    }
}
