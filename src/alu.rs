//! Pure 16-bit arithmetic with explicit flag computation. Every function
//! returns the result word and updates the flag block in place; the CPU core
//! decides what to do with both.

use std::fmt;

/// Processor status flags.
#[derive(Clone, Copy, Default, PartialEq, Eq, Debug)]
pub struct Flags {
    /// Result was zero.
    pub z: bool,
    /// Bit 15 of the result.
    pub n: bool,
    /// Carry/borrow out of bit 15. Shifts move the last shifted-out bit
    /// here; a shift by zero leaves it untouched.
    pub c: bool,
    /// Signed overflow.
    pub v: bool,
}

impl Flags {
    pub fn set_zn(&mut self, val: u16) {
        self.z = val == 0;
        self.n = val & 0x8000 != 0;
    }

    fn set_logic(&mut self, val: u16) {
        self.set_zn(val);
        self.c = false;
        self.v = false;
    }
}

impl fmt::Display for Flags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{}{}{}",
            if self.n { 'N' } else { '-' },
            if self.z { 'Z' } else { '-' },
            if self.c { 'C' } else { '-' },
            if self.v { 'V' } else { '-' },
        )
    }
}

pub fn add(a: u16, b: u16, f: &mut Flags) -> u16 {
    let r = u32::from(a) + u32::from(b);
    let res = r as u16;
    f.set_zn(res);
    f.c = (r >> 16) & 1 != 0;
    f.v = !(a ^ b) & (res ^ a) & 0x8000 != 0;
    res
}

pub fn sub(a: u16, b: u16, f: &mut Flags) -> u16 {
    let r = u32::from(a).wrapping_sub(u32::from(b));
    let res = r as u16;
    f.set_zn(res);
    // Borrow out of bit 15
    f.c = (r >> 16) & 1 != 0;
    f.v = (a ^ b) & (a ^ res) & 0x8000 != 0;
    res
}

pub fn and(a: u16, b: u16, f: &mut Flags) -> u16 {
    let res = a & b;
    f.set_logic(res);
    res
}

pub fn or(a: u16, b: u16, f: &mut Flags) -> u16 {
    let res = a | b;
    f.set_logic(res);
    res
}

pub fn xor(a: u16, b: u16, f: &mut Flags) -> u16 {
    let res = a ^ b;
    f.set_logic(res);
    res
}

pub fn not(a: u16, f: &mut Flags) -> u16 {
    let res = !a;
    f.set_logic(res);
    res
}

pub fn shl(a: u16, b: u16, f: &mut Flags) -> u16 {
    let sh = (b & 0xF) as u32;
    let res = ((u32::from(a)) << sh) as u16;
    f.set_zn(res);
    if sh != 0 {
        f.c = (u32::from(a) << (sh - 1)) & 0x8000 != 0;
    }
    f.v = false;
    res
}

pub fn shr(a: u16, b: u16, f: &mut Flags) -> u16 {
    let sh = (b & 0xF) as u32;
    let res = a >> sh;
    f.set_zn(res);
    if sh != 0 {
        f.c = (a >> (sh - 1)) & 1 != 0;
    }
    f.v = false;
    res
}

pub fn mul(a: u16, b: u16, f: &mut Flags) -> u16 {
    let r = u32::from(a) * u32::from(b);
    let res = r as u16;
    f.set_zn(res);
    // High half non-zero means the true product did not fit
    f.c = r >> 16 != 0;
    f.v = false;
    res
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn add_carry_wraps() {
        let mut f = Flags::default();
        assert_eq!(add(0xFFFF, 1, &mut f), 0);
        assert!(f.z && f.c);
        assert!(!f.n && !f.v);
    }

    #[test]
    fn add_signed_overflow() {
        let mut f = Flags::default();
        // 0x7FFF + 1 overflows into the sign bit
        assert_eq!(add(0x7FFF, 1, &mut f), 0x8000);
        assert!(f.v && f.n);
        assert!(!f.c && !f.z);
    }

    #[test]
    fn sub_borrow() {
        let mut f = Flags::default();
        assert_eq!(sub(2, 3, &mut f), 0xFFFF);
        assert!(f.c && f.n);
        assert!(!f.z && !f.v);
    }

    #[test]
    fn sub_equal_sets_zero() {
        let mut f = Flags::default();
        assert_eq!(sub(7, 7, &mut f), 0);
        assert!(f.z);
        assert!(!f.c && !f.n && !f.v);
    }

    #[test]
    fn sub_signed_overflow() {
        let mut f = Flags::default();
        // min_int - 1 overflows positive
        assert_eq!(sub(0x8000, 1, &mut f), 0x7FFF);
        assert!(f.v);
        assert!(!f.n && !f.c);
    }

    #[test]
    fn logic_clears_carry_and_overflow() {
        let mut f = Flags {
            c: true,
            v: true,
            ..Flags::default()
        };
        assert_eq!(and(0xF0F0, 0x0F0F, &mut f), 0);
        assert!(f.z && !f.c && !f.v);

        f.c = true;
        assert_eq!(or(0x8000, 1, &mut f), 0x8001);
        assert!(f.n && !f.c);

        f.c = true;
        assert_eq!(xor(0xAAAA, 0xAAAA, &mut f), 0);
        assert!(f.z && !f.c);

        f.c = true;
        assert_eq!(not(0xFFFF, &mut f), 0);
        assert!(f.z && !f.c);
    }

    #[test]
    fn shl_carry_is_last_bit_out() {
        let mut f = Flags::default();
        assert_eq!(shl(0x8001, 1, &mut f), 0x0002);
        assert!(f.c);
        assert_eq!(shl(0x4000, 1, &mut f), 0x8000);
        assert!(!f.c && f.n);
    }

    #[test]
    fn shr_carry_is_last_bit_out() {
        let mut f = Flags::default();
        assert_eq!(shr(0x0003, 1, &mut f), 0x0001);
        assert!(f.c);
        assert_eq!(shr(0x0004, 1, &mut f), 0x0002);
        assert!(!f.c);
    }

    #[test]
    fn shift_by_zero_preserves_carry() {
        let mut f = Flags {
            c: true,
            ..Flags::default()
        };
        assert_eq!(shl(0x1234, 0, &mut f), 0x1234);
        assert!(f.c);
        assert_eq!(shr(0x1234, 0, &mut f), 0x1234);
        assert!(f.c);
    }

    #[test]
    fn shift_amount_masked_to_four_bits() {
        let mut f = Flags::default();
        // 17 & 0xF == 1
        assert_eq!(shl(1, 17, &mut f), 2);
        assert_eq!(shr(2, 17, &mut f), 1);
    }

    #[test]
    fn mul_carry_on_wide_product() {
        let mut f = Flags::default();
        assert_eq!(mul(0x1000, 0x10, &mut f), 0);
        assert!(f.c && f.z);
        assert_eq!(mul(100, 100, &mut f), 10_000);
        assert!(!f.c && !f.z);
    }
}
