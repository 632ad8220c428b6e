//! CPU core: register file, PC, flags and the fetch/decode/execute loop.
//! Dispatch runs through a 32-entry table indexed by the 5-bit opcode field;
//! the two unassigned codes route to a handler that halts cleanly. After
//! every executed instruction the device layer gets a chance to drain an
//! armed string print.

use crate::alu::{self, Flags};
use crate::isa;
use crate::memory::Memory;

const SP: usize = 7;

/// Reset stack pointer, below the device window and typical code.
const SP_RESET: u16 = 0xF000;

/// Complete machine state during execution.
pub struct RunState {
    mem: Memory,
    /// 8x 16-bit registers; index 7 is the stack pointer.
    reg: [u16; 8],
    pc: u16,
    flags: Flags,
    halted: bool,
    cycles: u64,
    trace: bool,
}

impl RunState {
    pub fn new(trace: bool) -> Self {
        let mut state = RunState {
            mem: Memory::new(),
            reg: [0; 8],
            pc: 0,
            flags: Flags::default(),
            halted: false,
            cycles: 0,
            trace,
        };
        state.reset();
        state
    }

    /// Zero memory, registers, PC, flags and cycles; park SP at its reset
    /// address.
    pub fn reset(&mut self) {
        self.mem.clear();
        self.reg = [0; 8];
        self.pc = 0;
        self.flags = Flags::default();
        self.halted = false;
        self.cycles = 0;
        self.reg[SP] = SP_RESET;
    }

    /// Overlay an image at `base`, truncating at the top of memory.
    pub fn load(&mut self, image: &[u16], base: u16) {
        self.mem.load(image, base);
    }

    pub fn reg(&self, idx: usize) -> u16 {
        self.reg[idx]
    }

    pub fn sp(&self) -> u16 {
        self.reg[SP]
    }

    pub fn pc(&self) -> u16 {
        self.pc
    }

    pub fn flags(&self) -> Flags {
        self.flags
    }

    pub fn cycles(&self) -> u64 {
        self.cycles
    }

    pub fn halted(&self) -> bool {
        self.halted
    }

    pub fn memory(&self) -> &Memory {
        &self.mem
    }

    const OP_TABLE: [fn(&mut RunState, u16); 32] = [
        Self::nop,     // 0x00
        Self::mov,     // 0x01
        Self::add,     // 0x02
        Self::sub,     // 0x03
        Self::and,     // 0x04
        Self::or,      // 0x05
        Self::xor,     // 0x06
        Self::not,     // 0x07
        Self::shl,     // 0x08
        Self::shr,     // 0x09
        Self::cmp,     // 0x0A
        Self::push,    // 0x0B
        Self::pop,     // 0x0C
        Self::ld_abs,  // 0x0D
        Self::st_abs,  // 0x0E
        Self::ldi,     // 0x0F
        Self::jmp,     // 0x10
        Self::jz,      // 0x11
        Self::jnz,     // 0x12
        Self::jc,      // 0x13
        Self::jn,      // 0x14
        Self::call,    // 0x15
        Self::ret,     // 0x16
        Self::halt,    // 0x17
        Self::ld_ind,  // 0x18
        Self::st_ind,  // 0x19
        Self::ldi,     // 0x1A LEA loads its payload like LDI
        Self::addi,    // 0x1B
        Self::subi,    // 0x1C
        Self::mul,     // 0x1D
        Self::unknown, // 0x1E
        Self::unknown, // 0x1F
    ];

    /// Execute until halt.
    pub fn run(&mut self) {
        while !self.halted {
            self.step();
        }
    }

    /// Execute a single instruction, then drain any armed device output.
    pub fn step(&mut self) {
        let instr = self.fetch();
        Self::OP_TABLE[isa::opcode_bits(instr) as usize](self, instr);
        self.mem.service_pending();
        if self.trace {
            eprintln!(
                "[state] pc={:#06X} sp={:#06X} r0={:#06X} r1={:#06X} flags={} cyc={}",
                self.pc, self.reg[SP], self.reg[0], self.reg[1], self.flags, self.cycles
            );
        }
    }

    fn fetch(&mut self) -> u16 {
        let word = self.mem.read(self.pc, self.cycles);
        if self.trace {
            eprintln!("[fetch] pc={:#06X} w={:#06X}", self.pc, word);
        }
        self.pc = self.pc.wrapping_add(1);
        self.cycles += 1;
        word
    }

    /// Every register write recomputes Z/N and costs a cycle.
    fn write_reg(&mut self, rd: usize, val: u16) {
        self.reg[rd] = val;
        self.flags.set_zn(val);
        self.cycles += 1;
    }

    fn nop(&mut self, _instr: u16) {}

    fn mov(&mut self, instr: u16) {
        self.write_reg(isa::rd(instr), self.reg[isa::rs(instr)]);
    }

    fn add(&mut self, instr: u16) {
        let rd = isa::rd(instr);
        let res = alu::add(self.reg[rd], self.reg[isa::rs(instr)], &mut self.flags);
        self.write_reg(rd, res);
    }

    fn sub(&mut self, instr: u16) {
        let rd = isa::rd(instr);
        let res = alu::sub(self.reg[rd], self.reg[isa::rs(instr)], &mut self.flags);
        self.write_reg(rd, res);
    }

    fn and(&mut self, instr: u16) {
        let rd = isa::rd(instr);
        let res = alu::and(self.reg[rd], self.reg[isa::rs(instr)], &mut self.flags);
        self.write_reg(rd, res);
    }

    fn or(&mut self, instr: u16) {
        let rd = isa::rd(instr);
        let res = alu::or(self.reg[rd], self.reg[isa::rs(instr)], &mut self.flags);
        self.write_reg(rd, res);
    }

    fn xor(&mut self, instr: u16) {
        let rd = isa::rd(instr);
        let res = alu::xor(self.reg[rd], self.reg[isa::rs(instr)], &mut self.flags);
        self.write_reg(rd, res);
    }

    fn not(&mut self, instr: u16) {
        let rd = isa::rd(instr);
        let res = alu::not(self.reg[rd], &mut self.flags);
        self.write_reg(rd, res);
    }

    fn shl(&mut self, instr: u16) {
        let rd = isa::rd(instr);
        let res = alu::shl(self.reg[rd], self.reg[isa::rs(instr)], &mut self.flags);
        self.write_reg(rd, res);
    }

    fn shr(&mut self, instr: u16) {
        let rd = isa::rd(instr);
        let res = alu::shr(self.reg[rd], self.reg[isa::rs(instr)], &mut self.flags);
        self.write_reg(rd, res);
    }

    fn cmp(&mut self, instr: u16) {
        alu::sub(
            self.reg[isa::rd(instr)],
            self.reg[isa::rs(instr)],
            &mut self.flags,
        );
    }

    fn push(&mut self, instr: u16) {
        self.reg[SP] = self.reg[SP].wrapping_sub(1);
        self.mem.write(self.reg[SP], self.reg[isa::rs(instr)]);
        self.cycles += 1;
    }

    fn pop(&mut self, instr: u16) {
        let val = self.mem.read(self.reg[SP], self.cycles);
        self.write_reg(isa::rd(instr), val);
        self.reg[SP] = self.reg[SP].wrapping_add(1);
        self.cycles += 1;
    }

    fn ld_abs(&mut self, instr: u16) {
        let addr = self.fetch();
        let val = self.mem.read(addr, self.cycles);
        self.write_reg(isa::rd(instr), val);
    }

    fn st_abs(&mut self, instr: u16) {
        let addr = self.fetch();
        self.mem.write(addr, self.reg[isa::rs(instr)]);
        self.cycles += 1;
    }

    fn ldi(&mut self, instr: u16) {
        let imm = self.fetch();
        self.write_reg(isa::rd(instr), imm);
    }

    fn jmp(&mut self, _instr: u16) {
        self.pc = self.fetch();
    }

    fn jz(&mut self, _instr: u16) {
        let addr = self.fetch();
        if self.flags.z {
            self.pc = addr;
        }
    }

    fn jnz(&mut self, _instr: u16) {
        let addr = self.fetch();
        if !self.flags.z {
            self.pc = addr;
        }
    }

    fn jc(&mut self, _instr: u16) {
        let addr = self.fetch();
        if self.flags.c {
            self.pc = addr;
        }
    }

    fn jn(&mut self, _instr: u16) {
        let addr = self.fetch();
        if self.flags.n {
            self.pc = addr;
        }
    }

    /// Pushes the address of the instruction after the payload word, so RET
    /// resumes at the call site's successor.
    fn call(&mut self, _instr: u16) {
        let addr = self.fetch();
        self.reg[SP] = self.reg[SP].wrapping_sub(1);
        self.mem.write(self.reg[SP], self.pc);
        self.pc = addr;
        self.cycles += 1;
    }

    fn ret(&mut self, _instr: u16) {
        let ra = self.mem.read(self.reg[SP], self.cycles);
        self.reg[SP] = self.reg[SP].wrapping_add(1);
        self.pc = ra;
        self.cycles += 1;
    }

    fn halt(&mut self, _instr: u16) {
        self.halted = true;
    }

    fn ld_ind(&mut self, instr: u16) {
        let val = self.mem.read(self.reg[isa::rs(instr)], self.cycles);
        self.write_reg(isa::rd(instr), val);
    }

    fn st_ind(&mut self, instr: u16) {
        self.mem.write(self.reg[isa::rd(instr)], self.reg[isa::rs(instr)]);
        self.cycles += 1;
    }

    fn addi(&mut self, instr: u16) {
        let imm = self.fetch();
        let rd = isa::rd(instr);
        let res = alu::add(self.reg[rd], imm, &mut self.flags);
        self.write_reg(rd, res);
    }

    fn subi(&mut self, instr: u16) {
        let imm = self.fetch();
        let rd = isa::rd(instr);
        let res = alu::sub(self.reg[rd], imm, &mut self.flags);
        self.write_reg(rd, res);
    }

    fn mul(&mut self, instr: u16) {
        let rd = isa::rd(instr);
        let res = alu::mul(self.reg[rd], self.reg[isa::rs(instr)], &mut self.flags);
        self.write_reg(rd, res);
    }

    /// Unassigned opcode: report, rewind PC onto the faulting word, halt.
    fn unknown(&mut self, instr: u16) {
        self.pc = self.pc.wrapping_sub(1);
        eprintln!(
            "Unknown opcode {:#04X} at {:#06X}",
            isa::opcode_bits(instr),
            self.pc
        );
        self.halted = true;
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::isa::{encode_i, encode_r, Opcode};
    use crate::memory::TIMER;

    fn run_words(words: &[u16]) -> RunState {
        let mut state = RunState::new(false);
        state.load(words, 0);
        state.run();
        state
    }

    #[test]
    fn reset_state() {
        let mut state = RunState::new(false);
        state.load(&[encode_r(Opcode::Halt, 0, 0)], 0);
        state.run();
        state.reset();
        assert_eq!(state.sp(), 0xF000);
        assert_eq!(state.pc(), 0);
        assert_eq!(state.cycles(), 0);
        assert!(!state.halted());
        assert_eq!(state.memory().word(0), 0);
    }

    #[test]
    fn pc_advances_by_instruction_width() {
        let words = [
            encode_i(Opcode::Ldi, 0),
            5,
            encode_r(Opcode::Nop, 0, 0),
            encode_r(Opcode::Halt, 0, 0),
        ];
        let state = run_words(&words);
        // One past the halt word
        assert_eq!(state.pc(), words.len() as u16);
    }

    #[test]
    fn mov_sets_zero_flag() {
        let state = run_words(&[
            encode_i(Opcode::Ldi, 1),
            0,
            encode_r(Opcode::Mov, 0, 1),
            encode_r(Opcode::Halt, 0, 0),
        ]);
        assert_eq!(state.reg(0), 0);
        assert!(state.flags().z);
        assert!(!state.flags().n);
    }

    #[test]
    fn add_carries_through_registers() {
        let state = run_words(&[
            encode_i(Opcode::Ldi, 0),
            0xFFFF,
            encode_i(Opcode::Ldi, 1),
            1,
            encode_r(Opcode::Add, 0, 1),
            encode_r(Opcode::Halt, 0, 0),
        ]);
        assert_eq!(state.reg(0), 0);
        assert!(state.flags().z);
        assert!(state.flags().c);
    }

    #[test]
    fn cmp_leaves_registers_alone() {
        let state = run_words(&[
            encode_i(Opcode::Ldi, 0),
            5,
            encode_i(Opcode::Ldi, 1),
            7,
            encode_r(Opcode::Cmp, 0, 1),
            encode_r(Opcode::Halt, 0, 0),
        ]);
        assert_eq!(state.reg(0), 5);
        assert_eq!(state.reg(1), 7);
        // 5 - 7 borrows and is negative
        assert!(state.flags().c);
        assert!(state.flags().n);
        assert!(!state.flags().z);
    }

    #[test]
    fn push_pop_roundtrip() {
        let state = run_words(&[
            encode_i(Opcode::Ldi, 0),
            0xBEEF,
            encode_r(Opcode::Push, 0, 0),
            encode_r(Opcode::Pop, 1, 0),
            encode_r(Opcode::Halt, 0, 0),
        ]);
        assert_eq!(state.reg(1), 0xBEEF);
        assert_eq!(state.sp(), 0xF000);
        assert_eq!(state.memory().word(0xEFFF), 0xBEEF);
    }

    #[test]
    fn call_pushes_return_address() {
        // 0: CALL 3 / 2: HALT / 3: RET
        let state = run_words(&[
            encode_i(Opcode::Call, 0),
            3,
            encode_r(Opcode::Halt, 0, 0),
            encode_r(Opcode::Ret, 0, 0),
        ]);
        assert_eq!(state.pc(), 3);
        assert_eq!(state.sp(), 0xF000);
        // The pushed return address pointed past the payload word
        assert_eq!(state.memory().word(0xEFFF), 2);
    }

    #[test]
    fn conditional_jump_taken_and_not() {
        // LDI r0, 0 sets Z, so JZ lands on the second LDI
        let state = run_words(&[
            encode_i(Opcode::Ldi, 0),
            0,
            encode_i(Opcode::Jz, 0),
            5,
            encode_r(Opcode::Halt, 0, 0),
            encode_i(Opcode::Ldi, 1),
            1,
            encode_r(Opcode::Halt, 0, 0),
        ]);
        assert_eq!(state.reg(1), 1);

        // LDI r0, 1 clears Z, so JZ falls through to the halt
        let state = run_words(&[
            encode_i(Opcode::Ldi, 0),
            1,
            encode_i(Opcode::Jz, 0),
            5,
            encode_r(Opcode::Halt, 0, 0),
            encode_i(Opcode::Ldi, 1),
            1,
            encode_r(Opcode::Halt, 0, 0),
        ]);
        assert_eq!(state.reg(1), 0);
    }

    #[test]
    fn indirect_store_and_load() {
        let state = run_words(&[
            encode_i(Opcode::Ldi, 0),
            0x1234,
            encode_i(Opcode::Ldi, 1),
            0x2000,
            encode_r(Opcode::StInd, 1, 0),
            encode_r(Opcode::LdInd, 2, 1),
            encode_r(Opcode::Halt, 0, 0),
        ]);
        assert_eq!(state.memory().word(0x2000), 0x1234);
        assert_eq!(state.reg(2), 0x1234);
    }

    #[test]
    fn load_immediate_does_not_touch_carry() {
        // ADD sets C; the following LDI and SHL-by-zero must not clear it
        let state = run_words(&[
            encode_i(Opcode::Ldi, 0),
            0xFFFF,
            encode_i(Opcode::Ldi, 1),
            1,
            encode_r(Opcode::Add, 0, 1),
            encode_i(Opcode::Ldi, 2),
            0x1234,
            encode_i(Opcode::Ldi, 3),
            0,
            encode_r(Opcode::Shl, 2, 3),
            encode_r(Opcode::Halt, 0, 0),
        ]);
        assert_eq!(state.reg(2), 0x1234);
        assert!(state.flags().c);
    }

    #[test]
    fn unknown_opcode_halts_on_faulting_word() {
        let state = run_words(&[0x1E << 11]);
        assert!(state.halted());
        assert_eq!(state.pc(), 0);
        assert!(state.cycles() > 0);
    }

    #[test]
    fn timer_advances_between_reads() {
        let state = run_words(&[
            encode_i(Opcode::LdAbs, 1),
            TIMER,
            encode_i(Opcode::LdAbs, 2),
            TIMER,
            encode_r(Opcode::Halt, 0, 0),
        ]);
        assert_ne!(state.reg(1), state.reg(2));
    }

    #[test]
    fn cycles_only_increase() {
        let mut state = RunState::new(false);
        state.load(
            &[
                encode_i(Opcode::Ldi, 0),
                3,
                encode_r(Opcode::Push, 0, 0),
                encode_r(Opcode::Pop, 1, 0),
                encode_r(Opcode::Halt, 0, 0),
            ],
            0,
        );
        let mut last = 0;
        while !state.halted() {
            state.step();
            assert!(state.cycles() > last);
            last = state.cycles();
        }
    }
}
