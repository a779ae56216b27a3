// irmodel.rs — Lowered-IR text reader
//
// Reads the textual IR the lowering compiler emits (`-S -emit-llvm -g`) into
// a walkable module: functions, labeled basic blocks, and the instructions
// the profile builder cares about — allocas with byte sizes, atomic
// operations with explicit ordering, fences, calls with direct/indirect
// distinction, and debug-location attachments. No full IR grammar: each
// instruction line has a fixed positional shape that maps to token scanning,
// and unrecognized instructions are skipped without error.
//
// Preconditions: input is the textual output of a supported compiler.
// Postconditions: every `define` with a body yields an `IrFunction`; block
//   successor labels are collected from terminators.
// Failure modes: `IrParseError` on an unreadable file or a module with no
//   parseable content; malformed individual lines degrade to skips.
// Side effects: none.

use std::collections::HashMap;
use std::path::Path;

use logos::Logos;

// ── Token scanner ───────────────────────────────────────────────────────────

#[derive(Logos, Debug, Clone, Copy, PartialEq, Eq)]
#[logos(skip r"[ \t,]+")]
enum Tok {
    #[regex(r"@[-a-zA-Z$._][-a-zA-Z$._0-9]*")]
    GlobalIdent,
    #[regex(r#"@"[^"]*""#)]
    QuotedGlobalIdent,
    #[regex(r"%[-a-zA-Z$._0-9]+")]
    LocalIdent,
    #[regex(r"![-a-zA-Z$._0-9]+")]
    MetaRef,
    #[regex(r"i[0-9]+", priority = 10)]
    IntType,
    #[regex(r"-?[0-9]+")]
    Int,
    #[token("[")]
    LBracket,
    #[token("]")]
    RBracket,
    #[token("(")]
    LParen,
    #[token(")")]
    RParen,
    #[token("{")]
    LBrace,
    #[token("}")]
    RBrace,
    #[token("=")]
    Eq,
    #[token(":")]
    Colon,
    #[token("*")]
    Star,
    #[token("#")]
    Hash,
    #[regex(r#""[^"]*""#)]
    Str,
    #[regex(r"[a-zA-Z$._][a-zA-Z$._0-9]*")]
    Word,
}

fn scan(line: &str) -> Vec<(Tok, &str)> {
    let mut out = Vec::new();
    let mut lexer = Tok::lexer(line);
    while let Some(tok) = lexer.next() {
        if let Ok(tok) = tok {
            out.push((tok, lexer.slice()));
        }
    }
    out
}

// ── Parsed structures ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IrOrdering {
    Unordered,
    Monotonic,
    Acquire,
    Release,
    AcqRel,
    SeqCst,
}

impl IrOrdering {
    fn from_word(word: &str) -> Option<Self> {
        match word {
            "unordered" => Some(IrOrdering::Unordered),
            "monotonic" => Some(IrOrdering::Monotonic),
            "acquire" => Some(IrOrdering::Acquire),
            "release" => Some(IrOrdering::Release),
            "acq_rel" => Some(IrOrdering::AcqRel),
            "seq_cst" => Some(IrOrdering::SeqCst),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            IrOrdering::Unordered => "unordered",
            IrOrdering::Monotonic => "monotonic",
            IrOrdering::Acquire => "acquire",
            IrOrdering::Release => "release",
            IrOrdering::AcqRel => "acq_rel",
            IrOrdering::SeqCst => "seq_cst",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IrAtomicOp {
    Load,
    Store,
    Rmw,
    CmpXchg,
    Fence,
}

#[derive(Debug, Clone)]
pub enum IrInstr {
    Alloca {
        name: String,
        size_bytes: u64,
        is_array: bool,
    },
    Atomic {
        op: IrAtomicOp,
        ordering: IrOrdering,
        dbg_ref: Option<u32>,
    },
    Call {
        /// Demangleable symbol for a direct call; `None` for indirect.
        callee: Option<String>,
        dbg_ref: Option<u32>,
    },
}

#[derive(Debug, Clone, Default)]
pub struct IrBlock {
    pub label: String,
    pub instructions: Vec<IrInstr>,
    pub successors: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct IrFunction {
    /// Mangled symbol name, without the sigil.
    pub name: String,
    pub blocks: Vec<IrBlock>,
}

#[derive(Debug, Clone, Default)]
pub struct IrModule {
    pub source_filename: String,
    pub functions: Vec<IrFunction>,
    /// Debug metadata id → source line, from `!DILocation` records.
    pub dbg_lines: HashMap<u32, u32>,
}

#[derive(Debug, thiserror::Error)]
pub enum IrParseError {
    #[error("cannot read IR file '{path}': {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("no parseable IR content in '{path}'")]
    Empty { path: String },
}

// ── Parser ──────────────────────────────────────────────────────────────────

pub fn parse_ir_file(path: &Path) -> Result<IrModule, IrParseError> {
    let text = std::fs::read_to_string(path).map_err(|e| IrParseError::Io {
        path: path.display().to_string(),
        source: e,
    })?;
    let module = parse_ir_text(&text);
    if module.functions.is_empty() && module.dbg_lines.is_empty() {
        return Err(IrParseError::Empty {
            path: path.display().to_string(),
        });
    }
    Ok(module)
}

pub fn parse_ir_text(text: &str) -> IrModule {
    let mut module = IrModule::default();
    let mut current: Option<IrFunction> = None;

    for raw in text.lines() {
        let line = strip_comment(raw).trim();
        if line.is_empty() {
            continue;
        }

        if let Some(func) = current.as_mut() {
            if line == "}" {
                module.functions.push(current.take().unwrap());
                continue;
            }
            if let Some(label) = block_label(line) {
                func.blocks.push(IrBlock {
                    label,
                    ..IrBlock::default()
                });
                continue;
            }
            if func.blocks.is_empty() {
                // Implicit entry block without a written label.
                func.blocks.push(IrBlock {
                    label: "entry".into(),
                    ..IrBlock::default()
                });
            }
            let toks = scan(line);
            let block = func.blocks.last_mut().unwrap();
            parse_instruction(&toks, block);
            continue;
        }

        let toks = scan(line);
        if let Some(name) = define_header(&toks) {
            current = Some(IrFunction {
                name,
                blocks: Vec::new(),
            });
            continue;
        }
        if let Some((id, src_line)) = dilocation(&toks) {
            module.dbg_lines.insert(id, src_line);
            continue;
        }
        if let Some(name) = source_filename(&toks) {
            module.source_filename = name;
        }
    }

    module
}

fn strip_comment(line: &str) -> &str {
    // Comments start at ';' outside string literals; metadata strings are
    // the only place quotes appear, so a simple quote-aware scan suffices.
    let mut in_str = false;
    for (i, c) in line.char_indices() {
        match c {
            '"' => in_str = !in_str,
            ';' if !in_str => return &line[..i],
            _ => {}
        }
    }
    line
}

fn block_label(line: &str) -> Option<String> {
    let (head, _) = line.split_once(':')?;
    if head.is_empty()
        || !head
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "._$-".contains(c))
    {
        return None;
    }
    Some(head.to_string())
}

fn strip_global(slice: &str) -> String {
    slice
        .trim_start_matches('@')
        .trim_matches('"')
        .to_string()
}

fn define_header(toks: &[(Tok, &str)]) -> Option<String> {
    if toks.first().map(|t| t.1) != Some("define") {
        return None;
    }
    toks.iter()
        .find(|(t, _)| matches!(t, Tok::GlobalIdent | Tok::QuotedGlobalIdent))
        .map(|(_, s)| strip_global(s))
}

fn source_filename(toks: &[(Tok, &str)]) -> Option<String> {
    match toks {
        [(Tok::Word, "source_filename"), (Tok::Eq, _), (Tok::Str, s), ..] => {
            Some(s.trim_matches('"').to_string())
        }
        _ => None,
    }
}

fn dilocation(toks: &[(Tok, &str)]) -> Option<(u32, u32)> {
    // !10 = !DILocation(line: 42, column: 3, scope: !7)
    let [(Tok::MetaRef, id), (Tok::Eq, _), (Tok::MetaRef, "!DILocation"), rest @ ..] = toks
    else {
        return None;
    };
    let id: u32 = id.trim_start_matches('!').parse().ok()?;
    let mut iter = rest.iter();
    while let Some((tok, s)) = iter.next() {
        if *tok == Tok::Word && *s == "line" {
            let (colon, _) = iter.next()?;
            let (int, value) = iter.next()?;
            if *colon == Tok::Colon && *int == Tok::Int {
                return Some((id, value.parse().ok()?));
            }
            return None;
        }
    }
    None
}

fn dbg_ref(toks: &[(Tok, &str)]) -> Option<u32> {
    let mut iter = toks.iter().peekable();
    while let Some((tok, s)) = iter.next() {
        if *tok == Tok::MetaRef && *s == "!dbg" {
            if let Some((Tok::MetaRef, id)) = iter.peek() {
                return id.trim_start_matches('!').parse().ok();
            }
        }
    }
    None
}

fn find_word(toks: &[(Tok, &str)], word: &str) -> Option<usize> {
    toks.iter()
        .position(|(t, s)| *t == Tok::Word && *s == word)
}

fn first_ordering(toks: &[(Tok, &str)]) -> Option<IrOrdering> {
    toks.iter().find_map(|(t, s)| {
        if *t == Tok::Word {
            IrOrdering::from_word(s)
        } else {
            None
        }
    })
}

fn parse_instruction(toks: &[(Tok, &str)], block: &mut IrBlock) {
    if toks.is_empty() {
        return;
    }

    // Successor labels appear on br/switch/invoke lines and on the operand
    // lines of a multi-line switch.
    if find_word(toks, "label").is_some() {
        collect_successor_labels(toks, block);
    }
    if let Some((Tok::Word, "br" | "switch")) = toks.first() {
        return;
    }

    if let Some(pos) = find_word(toks, "alloca") {
        parse_alloca(toks, pos, block);
        return;
    }

    if find_word(toks, "fence").is_some() {
        if let Some(ordering) = first_ordering(toks) {
            block.instructions.push(IrInstr::Atomic {
                op: IrAtomicOp::Fence,
                ordering,
                dbg_ref: dbg_ref(toks),
            });
        }
        return;
    }

    if let Some(pos) = find_word(toks, "atomicrmw") {
        if let Some(ordering) = first_ordering(&toks[pos..]) {
            block.instructions.push(IrInstr::Atomic {
                op: IrAtomicOp::Rmw,
                ordering,
                dbg_ref: dbg_ref(toks),
            });
        }
        return;
    }

    if let Some(pos) = find_word(toks, "cmpxchg") {
        // Success ordering comes first; the failure ordering follows it.
        if let Some(ordering) = first_ordering(&toks[pos..]) {
            block.instructions.push(IrInstr::Atomic {
                op: IrAtomicOp::CmpXchg,
                ordering,
                dbg_ref: dbg_ref(toks),
            });
        }
        return;
    }

    if let Some(pos) = find_word(toks, "load") {
        if toks.get(pos + 1).map(|t| t.1) == Some("atomic") {
            if let Some(ordering) = first_ordering(&toks[pos..]) {
                block.instructions.push(IrInstr::Atomic {
                    op: IrAtomicOp::Load,
                    ordering,
                    dbg_ref: dbg_ref(toks),
                });
            }
        }
        return;
    }

    if let Some(pos) = find_word(toks, "store") {
        if toks.get(pos + 1).map(|t| t.1) == Some("atomic") {
            if let Some(ordering) = first_ordering(&toks[pos..]) {
                block.instructions.push(IrInstr::Atomic {
                    op: IrAtomicOp::Store,
                    ordering,
                    dbg_ref: dbg_ref(toks),
                });
            }
        }
        return;
    }

    if let Some(pos) = find_word(toks, "call").or_else(|| find_word(toks, "invoke")) {
        parse_call(toks, pos, block);
    }
}

fn collect_successor_labels(toks: &[(Tok, &str)], block: &mut IrBlock) {
    let mut iter = toks.iter().peekable();
    while let Some((tok, s)) = iter.next() {
        if *tok == Tok::Word && *s == "label" {
            if let Some((Tok::LocalIdent, target)) = iter.peek() {
                block
                    .successors
                    .push(target.trim_start_matches('%').to_string());
            }
        }
    }
}

fn parse_alloca(toks: &[(Tok, &str)], pos: usize, block: &mut IrBlock) {
    let name = match toks {
        [(Tok::LocalIdent, n), (Tok::Eq, _), ..] => n.trim_start_matches('%').to_string(),
        _ => "<anon>".to_string(),
    };

    let rest = &toks[pos + 1..];
    let (elem_size, consumed) = parse_type_size(rest);

    // Optional array-count operand: `, i64 20` (constant) or `, i64 %n` (VLA,
    // recorded as one element).
    let mut size = elem_size;
    let mut is_array = false;
    if let Some((Tok::IntType, _)) = rest.get(consumed) {
        match rest.get(consumed + 1) {
            Some((Tok::Int, count)) => {
                is_array = true;
                size = elem_size * count.parse::<u64>().unwrap_or(1);
            }
            Some((Tok::LocalIdent, _)) => {
                is_array = true;
            }
            _ => {}
        }
    }

    block.instructions.push(IrInstr::Alloca {
        name,
        size_bytes: size,
        is_array,
    });
}

/// Size in bytes of the leading type in `toks`, plus the token count it
/// occupies. Opaque named types default to a pointer-sized placeholder.
fn parse_type_size(toks: &[(Tok, &str)]) -> (u64, usize) {
    match toks.first() {
        Some((Tok::IntType, s)) => {
            let bits: u64 = s[1..].parse().unwrap_or(8);
            (bits.div_ceil(8), 1)
        }
        Some((Tok::LBracket, _)) => {
            // [N x T]
            let Some((Tok::Int, count)) = toks.get(1) else {
                return (8, 1);
            };
            if toks.get(2).map(|t| t.1) != Some("x") {
                return (8, 1);
            }
            let (inner, inner_len) = parse_type_size(&toks[3..]);
            let count: u64 = count.parse().unwrap_or(1);
            // 3 leading tokens + inner + closing bracket.
            (count * inner, 3 + inner_len + 1)
        }
        Some((Tok::Word, w)) => {
            let size = match *w {
                "ptr" => 8,
                "half" => 2,
                "float" => 4,
                "double" => 8,
                "x86_fp80" | "fp128" => 16,
                _ => 8,
            };
            (size, 1)
        }
        Some((Tok::LocalIdent, _)) => (8, 1), // %struct.X — opaque here
        _ => (8, 1),
    }
}

fn parse_call(toks: &[(Tok, &str)], pos: usize, block: &mut IrBlock) {
    let rest = &toks[pos + 1..];
    let Some(paren) = rest.iter().position(|(t, _)| *t == Tok::LParen) else {
        return;
    };
    if paren == 0 {
        return;
    }
    let (callee_tok, slice) = &rest[paren - 1];
    match callee_tok {
        Tok::GlobalIdent | Tok::QuotedGlobalIdent => {
            let name = strip_global(slice);
            if name.starts_with("llvm.") {
                return; // intrinsic, not a real call
            }
            block.instructions.push(IrInstr::Call {
                callee: Some(name),
                dbg_ref: dbg_ref(toks),
            });
        }
        Tok::LocalIdent => {
            block.instructions.push(IrInstr::Call {
                callee: None,
                dbg_ref: dbg_ref(toks),
            });
        }
        _ => {}
    }
}
