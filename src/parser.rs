//! Two-pass symbolic assembler over the lexed line items. Pass 1 (`layout`)
//! walks the items with a word cursor and binds every label; pass 2 (`emit`)
//! re-walks them, resolves operands through the symbol table and writes the
//! encoded words into a sparse image. Both passes consume the same
//! classified tokens, so they cannot disagree on instruction widths.

use std::str::FromStr;

use fxhash::FxHashMap;
use miette::Result;

use crate::error;
use crate::image::Image;
use crate::isa::{self, Opcode};
use crate::lexer::{self, LineItem, LineKind, MemTarget, Token, TokenKind};
use crate::symbol::{InstrKind, Register, Span};

pub struct Assembler<'a> {
    src: &'a str,
    items: Vec<LineItem>,
    symbols: FxHashMap<String, u16>,
}

impl<'a> Assembler<'a> {
    /// Lex the source into line items. Lexical errors are fatal here.
    pub fn new(src: &'a str) -> Result<Self> {
        Ok(Assembler {
            src,
            items: lexer::lex(src)?,
            symbols: FxHashMap::default(),
        })
    }

    /// Run both passes and return the finished image.
    pub fn assemble(mut self) -> Result<Image> {
        self.layout()?;
        self.emit()
    }

    /// Label addresses assigned by [`Assembler::layout`].
    pub fn symbols(&self) -> &FxHashMap<String, u16> {
        &self.symbols
    }

    fn slice(&self, span: Span) -> &str {
        &self.src[span.as_range()]
    }

    /// Pass 1: assign an address to every label.
    pub fn layout(&mut self) -> Result<()> {
        let mut loc: u16 = 0;
        for item in &self.items {
            match &item.kind {
                LineKind::Label(name) => {
                    if self.symbols.insert(name.clone(), loc).is_some() {
                        return Err(error::layout_duplicate_label(self.src, item.span));
                    }
                }
                LineKind::Org(tok) => match tok.kind {
                    TokenKind::Lit(addr) => loc = addr,
                    _ => return Err(error::layout_org_operand(self.src, tok.span)),
                },
                LineKind::Word(vals) => loc = loc.wrapping_add(vals.len() as u16),
                LineKind::Asciiz(text) => {
                    loc = loc.wrapping_add(text.chars().count() as u16 + 1);
                }
                LineKind::Instr { mnemonic, operands } => {
                    let kind = InstrKind::from_str(self.slice(mnemonic.span)).ok();
                    loc = loc.wrapping_add(instr_words(kind, operands));
                }
            }
        }
        Ok(())
    }

    /// Pass 2: emit encoded words. Must run after [`Assembler::layout`].
    pub fn emit(&self) -> Result<Image> {
        let mut image = Image::new();
        let mut loc: u16 = 0;
        for item in &self.items {
            match &item.kind {
                LineKind::Label(_) => (),
                LineKind::Org(tok) => {
                    // Shape was validated during layout
                    if let TokenKind::Lit(addr) = tok.kind {
                        loc = addr;
                        image.pad_to(loc);
                    }
                }
                LineKind::Word(vals) => {
                    for tok in vals {
                        image.put(loc, self.resolve(tok)?);
                        loc = loc.wrapping_add(1);
                    }
                }
                LineKind::Asciiz(text) => {
                    for c in text.chars() {
                        image.put(loc, c as u16);
                        loc = loc.wrapping_add(1);
                    }
                    image.put(loc, 0);
                    loc = loc.wrapping_add(1);
                }
                LineKind::Instr { mnemonic, operands } => {
                    loc = self.emit_instr(&mut image, loc, item.span, mnemonic, operands)?;
                }
            }
        }
        Ok(image)
    }

    fn emit_instr(
        &self,
        image: &mut Image,
        loc: u16,
        line_span: Span,
        mnemonic: &Token,
        operands: &[Token],
    ) -> Result<u16> {
        use InstrKind::*;
        let Ok(kind) = InstrKind::from_str(self.slice(mnemonic.span)) else {
            return Err(error::emit_unknown_instr(self.src, mnemonic.span));
        };
        match kind {
            Nop => self.bare(image, loc, Opcode::Nop, line_span, operands, "NOP"),
            Halt => self.bare(image, loc, Opcode::Halt, line_span, operands, "HALT"),
            Ret => self.bare(image, loc, Opcode::Ret, line_span, operands, "RET"),
            Push => {
                let [tok] = self.expect_n(line_span, operands, "PUSH rs")?;
                let rs = self.expect_reg(tok, "PUSH rs")?;
                image.put(loc, isa::encode_r(Opcode::Push, 0, rs.bits()));
                Ok(loc.wrapping_add(1))
            }
            Pop => {
                let [tok] = self.expect_n(line_span, operands, "POP rd")?;
                let rd = self.expect_reg(tok, "POP rd")?;
                image.put(loc, isa::encode_r(Opcode::Pop, rd.bits(), 0));
                Ok(loc.wrapping_add(1))
            }
            Not => {
                let [tok] = self.expect_n(line_span, operands, "NOT rd")?;
                let rd = self.expect_reg(tok, "NOT rd")?;
                image.put(loc, isa::encode_r(Opcode::Not, rd.bits(), 0));
                Ok(loc.wrapping_add(1))
            }
            Mov => self.two_reg(image, loc, Opcode::Mov, line_span, operands, "MOV rd, rs"),
            Add => self.two_reg(image, loc, Opcode::Add, line_span, operands, "ADD rd, rs"),
            Sub => self.two_reg(image, loc, Opcode::Sub, line_span, operands, "SUB rd, rs"),
            And => self.two_reg(image, loc, Opcode::And, line_span, operands, "AND rd, rs"),
            Or => self.two_reg(image, loc, Opcode::Or, line_span, operands, "OR rd, rs"),
            Xor => self.two_reg(image, loc, Opcode::Xor, line_span, operands, "XOR rd, rs"),
            Shl => self.two_reg(image, loc, Opcode::Shl, line_span, operands, "SHL rd, rs"),
            Shr => self.two_reg(image, loc, Opcode::Shr, line_span, operands, "SHR rd, rs"),
            Cmp => self.two_reg(image, loc, Opcode::Cmp, line_span, operands, "CMP rd, rs"),
            Mul => self.two_reg(image, loc, Opcode::Mul, line_span, operands, "MUL rd, rs"),
            Ldi => self.reg_imm(image, loc, Opcode::Ldi, line_span, operands, "LDI rd, imm16"),
            Lea => self.reg_imm(image, loc, Opcode::Lea, line_span, operands, "LEA rd, imm16"),
            Addi => self.reg_imm(image, loc, Opcode::Addi, line_span, operands, "ADDI rd, imm16"),
            Subi => self.reg_imm(image, loc, Opcode::Subi, line_span, operands, "SUBI rd, imm16"),
            Jmp => self.jump(image, loc, Opcode::Jmp, line_span, operands, "JMP addr"),
            Jz => self.jump(image, loc, Opcode::Jz, line_span, operands, "JZ addr"),
            Jnz => self.jump(image, loc, Opcode::Jnz, line_span, operands, "JNZ addr"),
            Jc => self.jump(image, loc, Opcode::Jc, line_span, operands, "JC addr"),
            Jn => self.jump(image, loc, Opcode::Jn, line_span, operands, "JN addr"),
            Call => self.jump(image, loc, Opcode::Call, line_span, operands, "CALL addr"),
            Ld => {
                let usage = "LD rd, [addr] or LD rd, [rs]";
                let [dst, mem] = self.expect_n(line_span, operands, usage)?;
                let rd = self.expect_reg(dst, usage)?;
                match mem.kind {
                    TokenKind::Mem {
                        target: MemTarget::Reg(rs),
                        ..
                    } => {
                        image.put(loc, isa::encode_r(Opcode::LdInd, rd.bits(), rs.bits()));
                        Ok(loc.wrapping_add(1))
                    }
                    TokenKind::Mem { target, inner } => {
                        image.put(loc, isa::encode_i(Opcode::LdAbs, rd.bits()));
                        image.put(loc.wrapping_add(1), self.resolve_mem(target, inner)?);
                        Ok(loc.wrapping_add(2))
                    }
                    _ => Err(error::emit_wrong_operands(self.src, mem.span, usage)),
                }
            }
            St => {
                let usage = "ST rs, [addr] or ST rs, [rd]";
                let [src_tok, mem] = self.expect_n(line_span, operands, usage)?;
                let rs = self.expect_reg(src_tok, usage)?;
                match mem.kind {
                    TokenKind::Mem {
                        target: MemTarget::Reg(addr_reg),
                        ..
                    } => {
                        // Address register rides in rd, the source in rs
                        image.put(loc, isa::encode_r(Opcode::StInd, addr_reg.bits(), rs.bits()));
                        Ok(loc.wrapping_add(1))
                    }
                    TokenKind::Mem { target, inner } => {
                        image.put(loc, isa::encode_r(Opcode::StAbs, 0, rs.bits()));
                        image.put(loc.wrapping_add(1), self.resolve_mem(target, inner)?);
                        Ok(loc.wrapping_add(2))
                    }
                    _ => Err(error::emit_wrong_operands(self.src, mem.span, usage)),
                }
            }
        }
    }

    fn bare(
        &self,
        image: &mut Image,
        loc: u16,
        opc: Opcode,
        line_span: Span,
        operands: &[Token],
        usage: &'static str,
    ) -> Result<u16> {
        let [] = self.expect_n(line_span, operands, usage)?;
        image.put(loc, isa::encode_r(opc, 0, 0));
        Ok(loc.wrapping_add(1))
    }

    fn two_reg(
        &self,
        image: &mut Image,
        loc: u16,
        opc: Opcode,
        line_span: Span,
        operands: &[Token],
        usage: &'static str,
    ) -> Result<u16> {
        let [a, b] = self.expect_n(line_span, operands, usage)?;
        let rd = self.expect_reg(a, usage)?;
        let rs = self.expect_reg(b, usage)?;
        image.put(loc, isa::encode_r(opc, rd.bits(), rs.bits()));
        Ok(loc.wrapping_add(1))
    }

    fn reg_imm(
        &self,
        image: &mut Image,
        loc: u16,
        opc: Opcode,
        line_span: Span,
        operands: &[Token],
        usage: &'static str,
    ) -> Result<u16> {
        let [a, b] = self.expect_n(line_span, operands, usage)?;
        let rd = self.expect_reg(a, usage)?;
        image.put(loc, isa::encode_i(opc, rd.bits()));
        image.put(loc.wrapping_add(1), self.resolve(b)?);
        Ok(loc.wrapping_add(2))
    }

    fn jump(
        &self,
        image: &mut Image,
        loc: u16,
        opc: Opcode,
        line_span: Span,
        operands: &[Token],
        usage: &'static str,
    ) -> Result<u16> {
        let [target] = self.expect_n(line_span, operands, usage)?;
        image.put(loc, isa::encode_i(opc, 0));
        image.put(loc.wrapping_add(1), self.resolve(target)?);
        Ok(loc.wrapping_add(2))
    }

    /// Immediate operand: a literal as-is, or a label through the table.
    fn resolve(&self, tok: &Token) -> Result<u16> {
        match tok.kind {
            TokenKind::Lit(val) => Ok(val),
            TokenKind::Ident => self.lookup(tok.span),
            _ => Err(error::emit_wrong_operands(
                self.src,
                tok.span,
                "a literal or label",
            )),
        }
    }

    fn resolve_mem(&self, target: MemTarget, inner: Span) -> Result<u16> {
        match target {
            MemTarget::Lit(val) => Ok(val),
            MemTarget::Label => self.lookup(inner),
            MemTarget::Reg(_) => unreachable!("indirect form handled by caller"),
        }
    }

    fn lookup(&self, span: Span) -> Result<u16> {
        let name = self.slice(span);
        self.symbols
            .get(name)
            .copied()
            .ok_or_else(|| error::emit_undefined_label(self.src, span, name))
    }

    fn expect_reg(&self, tok: &Token, usage: &'static str) -> Result<Register> {
        match tok.kind {
            TokenKind::Reg(reg) => Ok(reg),
            _ => Err(error::emit_wrong_operands(self.src, tok.span, usage)),
        }
    }

    fn expect_n<'t, const N: usize>(
        &self,
        line_span: Span,
        operands: &'t [Token],
        usage: &'static str,
    ) -> Result<&'t [Token; N]> {
        operands
            .try_into()
            .map_err(|_| error::emit_wrong_operands(self.src, line_span, usage))
    }
}

/// Width in words of one instruction line. The `LD`/`ST` split rides on the
/// lexer's memory-operand classification; unknown mnemonics size as one word
/// so pass 2 can report them at the canonical place.
fn instr_words(kind: Option<InstrKind>, operands: &[Token]) -> u16 {
    use InstrKind::*;
    match kind {
        Some(Ldi | Lea | Addi | Subi | Jmp | Jz | Jnz | Jc | Jn | Call) => 2,
        Some(Ld | St) => match operands.get(1).map(|tok| &tok.kind) {
            Some(TokenKind::Mem {
                target: MemTarget::Reg(_),
                ..
            }) => 1,
            _ => 2,
        },
        _ => 1,
    }
}

/// Assemble a complete source file into an image.
pub fn assemble(src: &str) -> Result<Image> {
    Assembler::new(src)?.assemble()
}
