//! Line lexer. One pass over the raw source produces a vector of tagged
//! line items with classified, span-carrying operand tokens; both assembler
//! passes then walk that vector instead of re-parsing text. Comments start
//! at the first `;` or `#` outside a double-quoted string.

use std::borrow::Cow;
use std::str::FromStr;

use lazy_static::lazy_static;
use miette::Result;
use regex::Regex;

use crate::error;
use crate::symbol::{DirKind, Register, Span, SrcOffset};

lazy_static! {
    // Also the shape of a label reference in operand position.
    static ref LABEL: Regex = Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").unwrap();
}

/// A source line reduced to what the assembler passes need.
#[derive(PartialEq, Eq, Debug)]
pub struct LineItem {
    pub kind: LineKind,
    /// Trimmed line content; for label lines, the name without its colon.
    pub span: Span,
}

#[derive(PartialEq, Eq, Debug)]
pub enum LineKind {
    /// `name:` alone on its line.
    Label(String),
    /// `.org` with its single operand.
    Org(Token),
    /// `.word` values.
    Word(Vec<Token>),
    /// `.asciiz` payload, already unescaped. Emitted one word per character
    /// plus a terminating zero word.
    Asciiz(String),
    /// The mnemonic stays an unresolved token so that unknown mnemonics are
    /// sized as one word in pass 1 and reported in pass 2.
    Instr {
        mnemonic: Token,
        operands: Vec<Token>,
    },
}

#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Token {
    pub kind: TokenKind,
    pub span: Span,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum TokenKind {
    Reg(Register),
    /// Numeric or character literal, already wrapped to 16 bits.
    Lit(u16),
    /// Label reference; the name is sliced from the span.
    Ident,
    /// `[..]` memory operand; the inner span excludes the brackets.
    Mem { target: MemTarget, inner: Span },
}

/// Decided here, once, so pass 1 sizing and pass 2 encoding cannot disagree
/// on the indirect/absolute split.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum MemTarget {
    /// `[rN]`: one-word indirect encoding.
    Reg(Register),
    /// `[literal]`: two-word absolute encoding.
    Lit(u16),
    /// `[label]`: two-word absolute encoding, resolved in pass 2.
    Label,
}

pub fn lex(src: &str) -> Result<Vec<LineItem>> {
    let mut items = Vec::new();
    let mut offs = 0;
    for raw in src.split_inclusive('\n') {
        let line = raw.strip_suffix('\n').unwrap_or(raw);
        let line = line.strip_suffix('\r').unwrap_or(line);
        if let Some(item) = lex_line(src, offs, line)? {
            items.push(item);
        }
        offs += raw.len();
    }
    Ok(items)
}

fn lex_line(src: &str, line_offs: usize, line: &str) -> Result<Option<LineItem>> {
    let content = &line[..comment_start(line)];
    let trimmed = content.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    let t_offs = line_offs + (content.len() - content.trim_start().len());
    let line_span = Span::new(SrcOffset(t_offs), trimmed.len());

    if let Some(name) = trimmed.strip_suffix(':') {
        let name_span = Span::new(SrcOffset(t_offs), name.len());
        if !LABEL.is_match(name) {
            return Err(error::lex_invalid_label(src, name_span));
        }
        return Ok(Some(LineItem {
            kind: LineKind::Label(name.to_string()),
            span: name_span,
        }));
    }

    if trimmed.starts_with('.') {
        return lex_directive(src, t_offs, trimmed).map(Some);
    }

    let mut toks = split_tokens(trimmed, t_offs).into_iter();
    let Some((_, mnemonic_span)) = toks.next() else {
        // Nothing but separators on this line
        return Ok(None);
    };
    let mnemonic = Token {
        kind: TokenKind::Ident,
        span: mnemonic_span,
    };
    let operands = toks
        .map(|(text, span)| classify(src, text, span))
        .collect::<Result<Vec<_>>>()?;
    Ok(Some(LineItem {
        kind: LineKind::Instr { mnemonic, operands },
        span: line_span,
    }))
}

fn lex_directive(src: &str, t_offs: usize, trimmed: &str) -> Result<LineItem> {
    let (dir_text, rest, rest_rel) = match trimmed.find(char::is_whitespace) {
        Some(i) => (&trimmed[..i], &trimmed[i..], i),
        None => (trimmed, "", trimmed.len()),
    };
    let dir_span = Span::new(SrcOffset(t_offs), dir_text.len());
    let line_span = Span::new(SrcOffset(t_offs), trimmed.len());
    let Ok(dir) = DirKind::from_str(dir_text) else {
        return Err(error::lex_invalid_dir(src, dir_span));
    };

    match dir {
        DirKind::Org => {
            let mut toks = split_tokens(rest, t_offs + rest_rel).into_iter();
            let (Some((text, span)), None) = (toks.next(), toks.next()) else {
                return Err(error::lex_dir_operands(
                    src,
                    line_span,
                    ".org takes exactly one address operand.",
                ));
            };
            Ok(LineItem {
                kind: LineKind::Org(classify(src, text, span)?),
                span: line_span,
            })
        }
        DirKind::Word => {
            let toks = split_tokens(rest, t_offs + rest_rel);
            if toks.is_empty() {
                return Err(error::lex_dir_operands(
                    src,
                    line_span,
                    ".word takes one or more values.",
                ));
            }
            let values = toks
                .into_iter()
                .map(|(text, span)| classify(src, text, span))
                .collect::<Result<Vec<_>>>()?;
            Ok(LineItem {
                kind: LineKind::Word(values),
                span: line_span,
            })
        }
        DirKind::Asciiz => {
            let Some(open) = rest.find('"') else {
                return Err(error::lex_dir_operands(
                    src,
                    line_span,
                    ".asciiz takes a double-quoted string.",
                ));
            };
            let body = &rest[open + 1..];
            let Some(close) = unescaped_quote(body) else {
                let span = Span::new(SrcOffset(t_offs + rest_rel + open), rest.len() - open);
                return Err(error::lex_unterminated_str(src, span));
            };
            Ok(LineItem {
                kind: LineKind::Asciiz(unescape(&body[..close]).into_owned()),
                span: line_span,
            })
        }
    }
}

/// Byte index where the comment begins, or the line length. `;` and `#`
/// inside a string literal do not open a comment.
fn comment_start(line: &str) -> usize {
    let mut in_str = false;
    let mut escaped = false;
    for (i, c) in line.char_indices() {
        match c {
            _ if escaped => escaped = false,
            '\\' if in_str => escaped = true,
            '"' => in_str = !in_str,
            ';' | '#' if !in_str => return i,
            _ => (),
        }
    }
    line.len()
}

/// Index of the first unescaped `"` in `body`, if any.
fn unescaped_quote(body: &str) -> Option<usize> {
    let mut escaped = false;
    for (i, c) in body.char_indices() {
        match c {
            _ if escaped => escaped = false,
            '\\' => escaped = true,
            '"' => return Some(i),
            _ => (),
        }
    }
    None
}

/// Split on commas and whitespace, keeping byte spans into the source.
fn split_tokens(text: &str, base: usize) -> Vec<(&str, Span)> {
    let mut toks = Vec::new();
    let mut start: Option<usize> = None;
    for (i, c) in text.char_indices() {
        if c == ',' || c.is_whitespace() {
            if let Some(s) = start.take() {
                toks.push((&text[s..i], Span::new(SrcOffset(base + s), i - s)));
            }
        } else if start.is_none() {
            start = Some(i);
        }
    }
    if let Some(s) = start {
        toks.push((&text[s..], Span::new(SrcOffset(base + s), text.len() - s)));
    }
    toks
}

fn classify(src: &str, text: &str, span: Span) -> Result<Token> {
    if let Some(stripped) = text.strip_prefix('[') {
        let Some(inside) = stripped.strip_suffix(']') else {
            return Err(error::lex_stray_char(src, span));
        };
        if inside.is_empty() {
            return Err(error::lex_stray_char(src, span));
        }
        let inner = Span::new(SrcOffset(span.offs() + 1), inside.len());
        let target = if let Ok(reg) = Register::from_str(inside) {
            MemTarget::Reg(reg)
        } else if starts_like_literal(inside) {
            match parse_int(inside) {
                Some(val) => MemTarget::Lit(val),
                None => return Err(error::lex_bad_lit(src, inner)),
            }
        } else if LABEL.is_match(inside) {
            MemTarget::Label
        } else {
            return Err(error::lex_stray_char(src, inner));
        };
        return Ok(Token {
            kind: TokenKind::Mem { target, inner },
            span,
        });
    }

    if let Ok(reg) = Register::from_str(text) {
        return Ok(Token {
            kind: TokenKind::Reg(reg),
            span,
        });
    }
    if starts_like_literal(text) {
        return match parse_int(text) {
            Some(val) => Ok(Token {
                kind: TokenKind::Lit(val),
                span,
            }),
            None => Err(error::lex_bad_lit(src, span)),
        };
    }
    if LABEL.is_match(text) {
        return Ok(Token {
            kind: TokenKind::Ident,
            span,
        });
    }
    Err(error::lex_stray_char(src, span))
}

fn starts_like_literal(text: &str) -> bool {
    text.starts_with(|c: char| c.is_ascii_digit()) || text.starts_with(['-', '\''])
}

/// Unsigned 16-bit literal: decimal (optionally negated), `0x` hex, or a
/// single quoted character. Values wrap silently to 16 bits.
fn parse_int(text: &str) -> Option<u16> {
    let bytes = text.as_bytes();
    if bytes.first() == Some(&b'\'') {
        if bytes.len() == 3 && bytes[2] == b'\'' {
            return Some(u16::from(bytes[1]));
        }
        return None;
    }
    let (neg, body) = match text.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, text),
    };
    let val = if let Some(hex) = body.strip_prefix("0x").or_else(|| body.strip_prefix("0X")) {
        u64::from_str_radix(hex, 16).ok()?
    } else {
        body.parse::<u64>().ok()?
    };
    let word = val as u16;
    Some(if neg { word.wrapping_neg() } else { word })
}

fn unescape(s: &str) -> Cow<str> {
    if !s.contains('\\') {
        return Cow::Borrowed(s);
    }
    let mut result = String::new();
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            result.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => result.push('\n'),
            Some('t') => result.push('\t'),
            Some('r') => result.push('\r'),
            Some('\\') => result.push('\\'),
            Some('"') => result.push('"'),
            Some(other) => {
                result.push('\\');
                result.push(other);
            }
            // Trailing backslash; include it as is
            None => result.push('\\'),
        }
    }
    Cow::Owned(result)
}

#[cfg(test)]
mod test {
    use super::*;

    fn lex_one(src: &str) -> LineItem {
        let mut items = lex(src).unwrap();
        assert_eq!(items.len(), 1);
        items.remove(0)
    }

    #[test]
    fn comments_and_blanks_are_skipped() {
        let items = lex("; full line comment\n\n   # hash comment\nnop ; tail\n").unwrap();
        assert_eq!(items.len(), 1);
        assert!(matches!(items[0].kind, LineKind::Instr { .. }));
    }

    #[test]
    fn comment_chars_inside_strings_survive() {
        let item = lex_one(r#".asciiz "a;b#c" ; real comment"#);
        assert_eq!(item.kind, LineKind::Asciiz("a;b#c".to_string()));
    }

    #[test]
    fn label_line() {
        let item = lex_one("_loop:\n");
        assert_eq!(item.kind, LineKind::Label("_loop".to_string()));
    }

    #[test]
    fn label_must_be_well_formed() {
        assert!(lex("1st:\n").is_err());
        assert!(lex("a-b:\n").is_err());
    }

    #[test]
    fn org_takes_one_operand() {
        let item = lex_one(".org 0x0100");
        match item.kind {
            LineKind::Org(tok) => assert_eq!(tok.kind, TokenKind::Lit(0x0100)),
            other => panic!("expected org, got {other:?}"),
        }
        assert!(lex(".org").is_err());
        assert!(lex(".org 1 2").is_err());
    }

    #[test]
    fn word_values() {
        let item = lex_one(".word 1, 0x2, 'a', msg");
        match item.kind {
            LineKind::Word(vals) => {
                assert_eq!(vals.len(), 4);
                assert_eq!(vals[0].kind, TokenKind::Lit(1));
                assert_eq!(vals[1].kind, TokenKind::Lit(2));
                assert_eq!(vals[2].kind, TokenKind::Lit(u16::from(b'a')));
                assert_eq!(vals[3].kind, TokenKind::Ident);
            }
            other => panic!("expected word, got {other:?}"),
        }
        assert!(lex(".word").is_err());
    }

    #[test]
    fn asciiz_unescapes() {
        let item = lex_one(r#".asciiz "line\n\"q\"""#);
        assert_eq!(item.kind, LineKind::Asciiz("line\n\"q\"".to_string()));
    }

    #[test]
    fn asciiz_unterminated() {
        assert!(lex(r#".asciiz "oops"#).is_err());
        assert!(lex(".asciiz").is_err());
    }

    #[test]
    fn unknown_directive_rejected() {
        assert!(lex(".blkw 3").is_err());
    }

    #[test]
    fn operand_classification() {
        let item = lex_one("ld r3, [sp]");
        let LineKind::Instr { operands, .. } = item.kind else {
            panic!("expected instr");
        };
        assert_eq!(operands[0].kind, TokenKind::Reg(Register::R3));
        assert!(matches!(
            operands[1].kind,
            TokenKind::Mem {
                target: MemTarget::Reg(Register::R7),
                ..
            }
        ));
    }

    #[test]
    fn memory_operand_absolute_forms() {
        let item = lex_one("st r0, [0xFF12]");
        let LineKind::Instr { operands, .. } = item.kind else {
            panic!("expected instr");
        };
        assert!(matches!(
            operands[1].kind,
            TokenKind::Mem {
                target: MemTarget::Lit(0xFF12),
                ..
            }
        ));

        let item = lex_one("ld r1, [counter]");
        let LineKind::Instr { operands, .. } = item.kind else {
            panic!("expected instr");
        };
        assert!(matches!(
            operands[1].kind,
            TokenKind::Mem {
                target: MemTarget::Label,
                ..
            }
        ));
    }

    #[test]
    fn literal_forms() {
        let item = lex_one("ldi r0, -1");
        let LineKind::Instr { operands, .. } = item.kind else {
            panic!("expected instr");
        };
        assert_eq!(operands[1].kind, TokenKind::Lit(0xFFFF));

        // Wraps silently to 16 bits
        let item = lex_one("ldi r0, 0x12345");
        let LineKind::Instr { operands, .. } = item.kind else {
            panic!("expected instr");
        };
        assert_eq!(operands[1].kind, TokenKind::Lit(0x2345));
    }

    #[test]
    fn bad_literals_are_fatal() {
        assert!(lex("ldi r0, 12ab").is_err());
        assert!(lex("ldi r0, 0x").is_err());
        assert!(lex("ldi r0, 'ab'").is_err());
        assert!(lex("ldi r0, [").is_err());
    }

    #[test]
    fn mnemonic_is_not_resolved_by_the_lexer() {
        // Unknown mnemonics must survive to pass 2
        let item = lex_one("frobnicate r0");
        assert!(matches!(item.kind, LineKind::Instr { .. }));
    }

    #[test]
    fn spans_index_the_source() {
        let src = "  ldi  r0, 0x10\n";
        let item = lex_one(src);
        let LineKind::Instr { mnemonic, operands } = item.kind else {
            panic!("expected instr");
        };
        assert_eq!(&src[mnemonic.span.as_range()], "ldi");
        assert_eq!(&src[operands[0].span.as_range()], "r0");
        assert_eq!(&src[operands[1].span.as_range()], "0x10");
    }
}
