//! Compact bytecode-offset to source-line tables.
//!
//! Each entry advances the bytecode offset by `B` and the line by `L`:
//!
//! ```text
//! 0b0LLBBBBB              B: 5 bits, L: 2 bits
//! 0b1LLLBBBB 0bLLLLLLLL   B: 4 bits, L: 11 bits (high 3 in the first byte)
//! 0x00                    end of table
//! ```

use alloc::vec::Vec;
use bit_field::BitField;
use log::trace;

const SHORT_MAX_BC: usize = 0x1f;
const SHORT_MAX_LINE: usize = 0x3;
const LONG_MAX_BC: usize = 0xf;
const LONG_MAX_LINE: usize = 0x7ff;

#[derive(Debug, Clone, Copy)]
pub struct LineTable<'a> {
    data: &'a [u8],
}

impl<'a> LineTable<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data }
    }

    pub fn entries(&self) -> LineEntries<'a> {
        LineEntries {
            data: self.data,
            pos: 0,
        }
    }

    /// Source line of the instruction at `offset`. Lines start at 1.
    pub fn line_for_offset(&self, offset: usize) -> u32 {
        let mut remaining = offset;
        let mut line = 1usize;
        for (bc, l) in self.entries() {
            if remaining < bc {
                break;
            }
            remaining -= bc;
            line += l;
        }
        line as u32
    }

    /// `(instruction delta, line delta)` byte pairs for every offset in
    /// `start..stop` where the source line moves forward.
    pub fn lnotab(&self, start: usize, stop: usize) -> Vec<u8> {
        let mut table = Vec::new();
        let mut last_line = self.line_for_offset(start);
        let mut last_index = 0;
        for i in start..stop {
            let line = self.line_for_offset(i);
            if line > last_line {
                push_lnotab_pair(&mut table, (i - start) - last_index, (line - last_line) as usize);
                trace!("lnotab @{}: line {} -> {}", i, last_line, line);
                last_line = line;
                last_index = i - start;
            }
        }
        table
    }
}

fn push_lnotab_pair(table: &mut Vec<u8>, mut instr: usize, mut line: usize) {
    while instr > 0xff {
        table.extend_from_slice(&[0xff, 0]);
        instr -= 0xff;
    }
    while line > 0xff {
        table.extend_from_slice(&[instr as u8, 0xff]);
        instr = 0;
        line -= 0xff;
    }
    table.extend_from_slice(&[instr as u8, line as u8]);
}

/// Iterator over `(bytecode delta, line delta)` entries.
pub struct LineEntries<'a> {
    data: &'a [u8],
    pos: usize,
}

impl Iterator for LineEntries<'_> {
    type Item = (usize, usize);

    fn next(&mut self) -> Option<Self::Item> {
        let c = *self.data.get(self.pos)?;
        if c == 0 {
            return None;
        }
        if !c.get_bit(7) {
            self.pos += 1;
            return Some((c.get_bits(0..5) as usize, c.get_bits(5..7) as usize));
        }
        // A long entry cut short by the end of the table ends it.
        let low = *self.data.get(self.pos + 1)?;
        self.pos += 2;
        let mut line = 0usize;
        line.set_bits(0..8, low as usize);
        line.set_bits(8..11, c.get_bits(4..7) as usize);
        Some((c.get_bits(0..4) as usize, line))
    }
}

/// Encodes `(bytecode delta, line delta)` steps into a [`LineTable`] byte
/// stream, splitting steps that do not fit one entry.
#[derive(Debug, Default, Clone)]
pub struct LineTableBuilder {
    data: Vec<u8>,
}

impl LineTableBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, mut bc: usize, mut line: usize) -> &mut Self {
        // Offset-only entries go first so the line change lands on the
        // final offset of the step.
        while bc > SHORT_MAX_BC || (line > SHORT_MAX_LINE && bc > LONG_MAX_BC) {
            let step = bc.min(SHORT_MAX_BC);
            self.push_short(step, 0);
            bc -= step;
        }
        if line <= SHORT_MAX_LINE {
            if bc != 0 || line != 0 {
                self.push_short(bc, line);
            }
            return self;
        }
        while line > 0 {
            let step = line.min(LONG_MAX_LINE);
            self.push_long(bc, step);
            bc = 0;
            line -= step;
        }
        self
    }

    pub fn finish(mut self) -> Vec<u8> {
        self.data.push(0);
        self.data
    }

    fn push_short(&mut self, bc: usize, line: usize) {
        let mut byte = 0u8;
        byte.set_bits(0..5, bc as u8);
        byte.set_bits(5..7, line as u8);
        self.data.push(byte);
    }

    fn push_long(&mut self, bc: usize, line: usize) {
        let mut byte = 0u8;
        byte.set_bit(7, true);
        byte.set_bits(4..7, line.get_bits(8..11) as u8);
        byte.set_bits(0..4, bc as u8);
        self.data.push(byte);
        self.data.push(line.get_bits(0..8) as u8);
    }
}
