//! Instruction accumulation.
//!
//! The builder is a pure sink: one emission method per instruction
//! shape, each appending a formatted line to whichever stream is
//! currently selected. All sequencing decisions belong to the
//! generator; nothing here inspects what it is asked to emit.

use rustc_hash::FxHashMap;
use std::fmt::Display;

/// Which stream `emit` currently appends to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Context {
    /// The main routine.
    Main,
    /// The per-function blocks appended after the exit sequence.
    Local,
    /// A transient stream flushed later into main or local.
    Staging,
}

/// Accumulates the data section and the instruction streams, and owns
/// label minting and the string-constant pool.
#[derive(Debug)]
pub struct InstructionBuilder {
    context: Context,
    main: Vec<String>,
    local: Vec<String>,
    /// Open function blocks, innermost last. While a block is open,
    /// local emission lands in it instead of `local`.
    blocks: Vec<Vec<String>>,
    staging: Vec<String>,
    data: Vec<String>,
    /// Interned string literals, literal text to pool label.
    strings: FxHashMap<String, String>,
    next_string: u32,
    next_label: u32,
    has_buffer: bool,
}

impl InstructionBuilder {
    pub fn new() -> Self {
        Self {
            context: Context::Main,
            main: Vec::new(),
            local: Vec::new(),
            blocks: Vec::new(),
            staging: Vec::new(),
            data: Vec::new(),
            strings: FxHashMap::default(),
            next_string: 0,
            next_label: 0,
            has_buffer: false,
        }
    }

    // ------------------------------------------------------------------
    // Streams
    // ------------------------------------------------------------------

    pub fn switch_context(&mut self, context: Context) {
        self.context = context;
    }

    pub fn context(&self) -> Context {
        self.context
    }

    /// Append the staged instructions to the current stream and clear
    /// the staging area.
    pub fn flush_staging(&mut self) {
        let staged = std::mem::take(&mut self.staging);
        self.stream_mut().extend(staged);
    }

    /// Open a function block. Emission in [`Context::Local`] collects
    /// into the block until [`end_block`](Self::end_block) closes it, so
    /// a block declared inside another never interleaves with its
    /// enclosing block's instructions.
    pub fn begin_block(&mut self) {
        self.blocks.push(Vec::new());
    }

    /// Close the innermost open block and append it whole to the local
    /// stream.
    pub fn end_block(&mut self) {
        let block = self
            .blocks
            .pop()
            .expect("end_block without a matching begin_block");
        self.local.extend(block);
    }

    fn stream_mut(&mut self) -> &mut Vec<String> {
        match self.context {
            Context::Main => &mut self.main,
            Context::Local => match self.blocks.last_mut() {
                Some(block) => block,
                None => &mut self.local,
            },
            Context::Staging => &mut self.staging,
        }
    }

    fn emit(&mut self, line: String) {
        self.stream_mut().push(format!("    {line}"));
    }

    // ------------------------------------------------------------------
    // Instructions
    // ------------------------------------------------------------------

    /// Three-operand ALU instruction: `add`, `sub`, `mult`, `slt`.
    pub fn binary(&mut self, op: &str, dst: impl Display, lhs: impl Display, rhs: impl Display) {
        self.emit(format!("{op} {dst}, {lhs}, {rhs}"));
    }

    /// Two-operand divide; quotient and remainder land in the dedicated
    /// result locations read back by [`mflo`](Self::mflo)/[`mfhi`](Self::mfhi).
    pub fn div(&mut self, lhs: impl Display, rhs: impl Display) {
        self.emit(format!("div {lhs}, {rhs}"));
    }

    pub fn mflo(&mut self, dst: impl Display) {
        self.emit(format!("mflo {dst}"));
    }

    pub fn mfhi(&mut self, dst: impl Display) {
        self.emit(format!("mfhi {dst}"));
    }

    /// String concatenation pseudo-op backed by the scratch buffer.
    pub fn concat(&mut self, dst: impl Display, lhs: impl Display, rhs: impl Display) {
        self.emit(format!("concat {dst}, {lhs}, {rhs}"));
    }

    pub fn load(&mut self, dst: impl Display, src: impl Display) {
        self.emit(format!("load {dst}, {src}"));
    }

    pub fn save(&mut self, src: impl Display, dst: impl Display) {
        self.emit(format!("save {src}, {dst}"));
    }

    pub fn move_to(&mut self, dst: impl Display, src: impl Display) {
        self.emit(format!("move {dst}, {src}"));
    }

    pub fn label(&mut self, name: &str) {
        self.stream_mut().push(format!("{name}:"));
    }

    pub fn beq(&mut self, lhs: impl Display, rhs: impl Display, target: &str) {
        self.emit(format!("beq {lhs}, {rhs}, {target}"));
    }

    pub fn bne(&mut self, lhs: impl Display, rhs: impl Display, target: &str) {
        self.emit(format!("bne {lhs}, {rhs}, {target}"));
    }

    pub fn jump(&mut self, target: &str) {
        self.emit(format!("j {target}"));
    }

    pub fn call(&mut self, target: &str) {
        self.emit(format!("jal {target}"));
    }

    pub fn ret(&mut self) {
        self.emit("jr $ra".to_string());
    }

    /// Print syscall; the caller has already placed the value (mode 1,
    /// integer) or address (mode 4, string) in `$a0`.
    pub fn print_syscall(&mut self, mode: u32) {
        self.load("$v0", mode);
        self.emit("syscall".to_string());
    }

    // ------------------------------------------------------------------
    // Labels and data
    // ------------------------------------------------------------------

    /// Mint a fresh label with the given prefix.
    pub fn new_label(&mut self, prefix: &str) -> String {
        let label = format!("{prefix}_{}", self.next_label);
        self.next_label += 1;
        label
    }

    /// Intern a string literal in the data-section pool, reusing the
    /// existing entry for a repeated literal.
    pub fn intern_string(&mut self, text: &str) -> String {
        if let Some(label) = self.strings.get(text) {
            return label.clone();
        }
        let label = format!("str_{}", self.next_string);
        self.next_string += 1;
        self.data.push(format!("{label}: .asciiz \"{text}\""));
        self.strings.insert(text.to_string(), label.clone());
        label
    }

    /// A labeled word initialized to `value`.
    pub fn word(&mut self, name: &str, value: i64) {
        self.data.push(format!("{name}: .word {value}"));
    }

    /// A labeled null-terminated string.
    pub fn asciiz(&mut self, name: &str, text: &str) {
        self.data.push(format!("{name}: .asciiz \"{text}\""));
    }

    /// Labeled reserved storage of `bytes` bytes.
    pub fn space(&mut self, name: &str, bytes: u32) {
        self.data.push(format!("{name}: .space {bytes}"));
    }

    /// Reserve the shared concatenation scratch buffer, at most once per
    /// compilation.
    pub fn ensure_buffer(&mut self) {
        if !self.has_buffer {
            self.data.push("BUFFER: .space 200".to_string());
            self.has_buffer = true;
        }
    }

    // ------------------------------------------------------------------
    // Output
    // ------------------------------------------------------------------

    /// Finalize the instruction set: data section, main routine with the
    /// mandatory exit sequence, then all local blocks.
    pub fn finish(mut self) -> String {
        debug_assert!(self.staging.is_empty(), "unflushed staging instructions");
        debug_assert!(self.blocks.is_empty(), "unclosed function block");

        self.context = Context::Main;
        self.load("$v0", 10);
        self.emit("syscall".to_string());

        let mut out = Vec::new();
        out.push(".data".to_string());
        out.extend(self.data);
        out.push(".text".to_string());
        out.push(".globl main".to_string());
        out.push("main:".to_string());
        out.extend(self.main);
        out.extend(self.local);
        out.push(String::new());
        out.join("\n")
    }
}

impl Default for InstructionBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn emits_into_selected_stream() {
        let mut b = InstructionBuilder::new();
        b.binary("add", "$t0", "$t1", "$t2");
        b.switch_context(Context::Local);
        b.label("f");
        b.ret();

        let out = b.finish();
        let main_pos = out.find("add $t0, $t1, $t2").unwrap();
        let exit_pos = out.find("load $v0, 10").unwrap();
        let local_pos = out.find("f:").unwrap();
        assert!(main_pos < exit_pos);
        assert!(exit_pos < local_pos);
    }

    #[test]
    fn repeated_literal_reuses_pool_entry() {
        let mut b = InstructionBuilder::new();
        let first = b.intern_string("hola");
        let second = b.intern_string("hola");
        let other = b.intern_string("adios");
        assert_eq!(first, second);
        assert_ne!(first, other);

        let out = b.finish();
        assert_eq!(out.matches(".asciiz \"hola\"").count(), 1);
    }

    #[test]
    fn buffer_reserved_at_most_once() {
        let mut b = InstructionBuilder::new();
        b.ensure_buffer();
        b.ensure_buffer();
        let out = b.finish();
        assert_eq!(out.matches("BUFFER: .space 200").count(), 1);
    }

    #[test]
    fn labels_are_unique() {
        let mut b = InstructionBuilder::new();
        assert_eq!(b.new_label("true"), "true_0");
        assert_eq!(b.new_label("false"), "false_1");
        assert_eq!(b.new_label("true"), "true_2");
    }

    #[test]
    fn nested_blocks_do_not_interleave() {
        let mut b = InstructionBuilder::new();
        b.switch_context(Context::Local);
        b.begin_block();
        b.label("outer");
        b.begin_block();
        b.label("inner");
        b.ret();
        b.end_block();
        b.ret();
        b.end_block();

        let out = b.finish();
        let inner_pos = out.find("inner:").unwrap();
        let outer_pos = out.find("outer:").unwrap();
        assert!(inner_pos < outer_pos);
        let outer_body = &out[outer_pos..];
        assert!(!outer_body.contains("inner:"));
        assert!(outer_body.contains("jr $ra"));
    }

    #[test]
    fn staging_flushes_into_current_stream() {
        let mut b = InstructionBuilder::new();
        b.switch_context(Context::Staging);
        b.binary("add", "$t0", "$t0", "$t1");
        b.switch_context(Context::Main);
        b.move_to("$a0", "$t0");
        b.flush_staging();

        let out = b.finish();
        let move_pos = out.find("move $a0, $t0").unwrap();
        let add_pos = out.find("add $t0, $t0, $t1").unwrap();
        assert!(move_pos < add_pos);
    }

    #[test]
    fn output_shape() {
        let mut b = InstructionBuilder::new();
        b.word("x_0", 3);
        let out = b.finish();
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines[0], ".data");
        assert_eq!(lines[1], "x_0: .word 3");
        assert_eq!(lines[2], ".text");
        assert_eq!(lines[3], ".globl main");
        assert_eq!(lines[4], "main:");
    }
}
