//! 64K-word store with a device window overlaid at the top page. Reads and
//! writes inside the window are routed to the device layer; everything else
//! hits the backing array. The string-print device is armed by a store and
//! drained by the CPU between instructions, so a program's writes to the
//! string bytes always land before the characters go out.

use std::io::{self, Write as _};

/// Addressable words.
pub const MEMORY_WORDS: usize = 0x10000;

/// Start of the device window.
pub const MMIO_BASE: u16 = 0xFF00;

/// Write-only; emits the low 8 bits as a character.
pub const TX_CHAR: u16 = 0xFF00;
/// Write latches a string address and arms a deferred print.
pub const TX_STR_ADDR: u16 = 0xFF10;
/// Write-only; emits the whole word as unsigned decimal plus newline.
pub const TX_INT: u16 = 0xFF12;
/// Read-only; returns the low 16 bits of the cycle counter.
pub const TIMER: u16 = 0xFF20;

/// Memory-mapped devices. Reads are pure apart from `TIMER` observing the
/// cycle counter.
#[derive(Default)]
struct Mmio {
    pending_str: Option<u16>,
}

impl Mmio {
    fn write(&mut self, addr: u16, value: u16) {
        match addr {
            TX_CHAR => {
                print!("{}", (value & 0xFF) as u8 as char);
                let _ = io::stdout().flush();
            }
            TX_STR_ADDR => self.pending_str = Some(value),
            TX_INT => println!("{value}"),
            _ => (),
        }
    }

    fn read(&self, addr: u16, cycles: u64) -> u16 {
        if addr == TIMER {
            return (cycles & 0xFFFF) as u16;
        }
        0
    }
}

pub struct Memory {
    words: [u16; MEMORY_WORDS],
    io: Mmio,
}

impl Memory {
    pub fn new() -> Self {
        Memory {
            words: [0; MEMORY_WORDS],
            io: Mmio::default(),
        }
    }

    pub fn clear(&mut self) {
        self.words.fill(0);
        self.io.pending_str = None;
    }

    pub fn read(&self, addr: u16, cycles: u64) -> u16 {
        if addr >= MMIO_BASE {
            return self.io.read(addr, cycles);
        }
        self.words[addr as usize]
    }

    pub fn write(&mut self, addr: u16, value: u16) {
        if addr >= MMIO_BASE {
            self.io.write(addr, value);
            return;
        }
        self.words[addr as usize] = value;
    }

    /// The backing word, bypassing device routing.
    pub fn word(&self, addr: u16) -> u16 {
        self.words[addr as usize]
    }

    /// Copy an image into the store starting at `base`, truncating at the
    /// end of the address space.
    pub fn load(&mut self, image: &[u16], base: u16) {
        for (i, &w) in image.iter().enumerate() {
            let addr = base as usize + i;
            if addr >= MEMORY_WORDS {
                break;
            }
            self.words[addr] = w;
        }
    }

    /// Drain an armed string print, if any: scan the backing store upward
    /// from the latched address and emit low bytes until a zero word. At
    /// most one dump per arming.
    pub fn service_pending(&mut self) {
        let Memory { words, io } = self;
        if let Some(start) = io.pending_str.take() {
            let mut out = io::stdout();
            let mut addr = start;
            loop {
                let b = (words[addr as usize] & 0xFF) as u8;
                if b == 0 {
                    break;
                }
                let _ = out.write_all(&[b]);
                addr = addr.wrapping_add(1);
            }
            let _ = out.flush();
        }
    }

    /// Full-memory dump, one `AAAA VVVV` line per address.
    pub fn dump<W: io::Write>(&self, out: &mut W) -> io::Result<()> {
        for (addr, word) in self.words.iter().enumerate() {
            writeln!(out, "{addr:04X} {word:04X}")?;
        }
        Ok(())
    }
}

impl Default for Memory {
    fn default() -> Self {
        Self::new()
    }
}
