use miette::{miette, LabeledSpan, Report, Severity};

use crate::symbol::Span;

// Lexer errors

pub fn lex_stray_char(src: &str, span: Span) -> Report {
    miette!(
        severity = Severity::Error,
        code = "lex::stray_char",
        help = "operands are registers (r0..r7, sp), literals, labels, or [..] memory operands.",
        labels = vec![LabeledSpan::at(span, "unrecognised token")],
        "Encountered an unrecognised token.",
    )
    .with_source_code(src.to_string())
}

pub fn lex_bad_lit(src: &str, span: Span) -> Report {
    miette!(
        severity = Severity::Error,
        code = "lex::bad_lit",
        help = "literals are decimal (with optional -), 0x hex, or a single quoted character.",
        labels = vec![LabeledSpan::at(span, "malformed literal")],
        "Encountered a malformed literal.",
    )
    .with_source_code(src.to_string())
}

pub fn lex_unterminated_str(src: &str, span: Span) -> Report {
    miette!(
        severity = Severity::Error,
        code = "lex::str_lit",
        help = "close the string literal with a \" character.",
        labels = vec![LabeledSpan::at(span, "unterminated string")],
        "Encountered an unterminated string literal.",
    )
    .with_source_code(src.to_string())
}

pub fn lex_invalid_dir(src: &str, span: Span) -> Report {
    miette!(
        severity = Severity::Error,
        code = "lex::dir",
        help = "available directives are .org, .word and .asciiz.",
        labels = vec![LabeledSpan::at(span, "unknown directive")],
        "Encountered an invalid directive.",
    )
    .with_source_code(src.to_string())
}

pub fn lex_invalid_label(src: &str, span: Span) -> Report {
    miette!(
        severity = Severity::Error,
        code = "lex::label",
        help = "labels start with a letter or underscore, followed by letters, digits or underscores.",
        labels = vec![LabeledSpan::at(span, "invalid label name")],
        "Encountered an invalid label name.",
    )
    .with_source_code(src.to_string())
}

pub fn lex_dir_operands(src: &str, span: Span, help: &'static str) -> Report {
    miette!(
        severity = Severity::Error,
        code = "lex::dir_operands",
        help = help,
        labels = vec![LabeledSpan::at(span, "incomplete directive")],
        "Directive is missing its operand.",
    )
    .with_source_code(src.to_string())
}

// Layout (pass 1) errors

pub fn layout_duplicate_label(src: &str, span: Span) -> Report {
    miette!(
        severity = Severity::Error,
        code = "layout::duplicate_label",
        help = "each label may be defined only once per file.",
        labels = vec![LabeledSpan::at(span, "duplicate label")],
        "Duplicate label definition.",
    )
    .with_source_code(src.to_string())
}

pub fn layout_org_operand(src: &str, span: Span) -> Report {
    miette!(
        severity = Severity::Error,
        code = "layout::org",
        help = ".org takes a numeric address like 0x0100.",
        labels = vec![LabeledSpan::at(span, "not a numeric address")],
        "Expected a numeric address for .org.",
    )
    .with_source_code(src.to_string())
}

// Emit (pass 2) errors

pub fn emit_unknown_instr(src: &str, span: Span) -> Report {
    miette!(
        severity = Severity::Error,
        code = "emit::unknown_instr",
        help = "check the mnemonic against the instruction set listing.",
        labels = vec![LabeledSpan::at(span, "unknown instruction")],
        "Unknown instruction.",
    )
    .with_source_code(src.to_string())
}

pub fn emit_wrong_operands(src: &str, span: Span, usage: &'static str) -> Report {
    miette!(
        severity = Severity::Error,
        code = "emit::operands",
        help = format!("expected: {usage}"),
        labels = vec![LabeledSpan::at(span, "incorrect operands")],
        "Incorrect operands for instruction.",
    )
    .with_source_code(src.to_string())
}

pub fn emit_undefined_label(src: &str, span: Span, name: &str) -> Report {
    miette!(
        severity = Severity::Error,
        code = "emit::undefined_label",
        help = "labels must be defined somewhere in the same file.",
        labels = vec![LabeledSpan::at(span, "undefined label")],
        "Reference to undefined label '{name}'.",
    )
    .with_source_code(src.to_string())
}
