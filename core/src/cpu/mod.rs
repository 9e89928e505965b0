pub mod alu;

use crate::machine::Machine;
use crate::registers::{Reg16, Reg16Stack, Reg8};
use self::alu as a;

fn fetch8(m: &mut Machine) -> u8 {
    let pc = m.reg.pc;
    m.reg.pc = pc.wrapping_add(1);
    m.read_byte(pc)
}

fn fetch16(m: &mut Machine) -> u16 {
    let lo = fetch8(m) as u16;
    let hi = fetch8(m) as u16;
    (hi << 8) | lo
}

fn push16(m: &mut Machine, value: u16) {
    m.reg.sp = m.reg.sp.wrapping_sub(1);
    m.write_byte(m.reg.sp, (value >> 8) as u8);
    m.reg.sp = m.reg.sp.wrapping_sub(1);
    m.write_byte(m.reg.sp, value as u8);
}

fn pop16(m: &mut Machine) -> u16 {
    let lo = m.read_byte(m.reg.sp) as u16;
    m.reg.sp = m.reg.sp.wrapping_add(1);
    let hi = m.read_byte(m.reg.sp) as u16;
    m.reg.sp = m.reg.sp.wrapping_add(1);
    (hi << 8) | lo
}

/// Reads the operand named by a 3-bit register-select field; index 6 names `(HL)`
/// rather than a register, which costs a bus cycle the plain `Registers` accessors
/// don't model.
fn get_r8(m: &mut Machine, idx: u8) -> u8 {
    match Reg8::from_index(idx) {
        Some(reg) => m.reg.get8(reg),
        None => {
            let addr = m.reg.hl();
            m.read_byte(addr)
        }
    }
}

fn set_r8(m: &mut Machine, idx: u8, value: u8) {
    match Reg8::from_index(idx) {
        Some(reg) => m.reg.set8(reg, value),
        None => {
            let addr = m.reg.hl();
            m.write_byte(addr, value);
        }
    }
}

fn get_r16(m: &Machine, idx: u8) -> u16 {
    m.reg.get16(Reg16::from_index(idx))
}

fn set_r16(m: &mut Machine, idx: u8, value: u16) {
    m.reg.set16(Reg16::from_index(idx), value);
}

fn get_r16_stack(m: &Machine, idx: u8) -> u16 {
    m.reg.get16_stack(Reg16Stack::from_index(idx))
}

fn set_r16_stack(m: &mut Machine, idx: u8, value: u16) {
    m.reg.set16_stack(Reg16Stack::from_index(idx), value);
}

fn check_cc(m: &Machine, idx: u8) -> bool {
    match idx {
        0 => !m.reg.zf(),
        1 => m.reg.zf(),
        2 => !m.reg.cf(),
        3 => m.reg.cf(),
        _ => unreachable!(),
    }
}

fn jr(m: &mut Machine, offset: i8) {
    m.reg.pc = m.reg.pc.wrapping_add(offset as i16 as u16);
    m.tick();
}

fn do_ret(m: &mut Machine) {
    let pc = pop16(m);
    m.reg.pc = pc;
    m.tick();
}

fn do_call(m: &mut Machine, addr: u16) {
    m.tick();
    push16(m, m.reg.pc);
    m.reg.pc = addr;
}

/// Services the highest-priority pending, enabled interrupt, if any. Exits HALT
/// regardless of IME; only pushes PC and jumps to the vector if IME is set.
fn service_interrupts(m: &mut Machine) {
    if let Some(interrupt) = m.interrupts.pending() {
        if m.halted {
            m.halted = false;
        }
        if m.ime {
            m.ime = false;
            m.tick();
            m.tick();
            push16(m, m.reg.pc);
            m.reg.pc = interrupt.vector();
            m.interrupts.clear(interrupt);
        }
    }
}

/// Runs exactly one instruction (or one HALT-idle M-cycle, or one interrupt dispatch).
pub fn step(m: &mut Machine) {
    service_interrupts(m);

    if m.halted {
        m.tick();
        return;
    }

    let opcode = fetch8(m);
    if m.halt_bug {
        // The HALT bug: PC fails to advance past the byte following HALT, so it is
        // fetched and executed twice.
        m.reg.pc = m.reg.pc.wrapping_sub(1);
        m.halt_bug = false;
    }

    #[cfg(feature = "cpu-logging")]
    log::trace!("{} | op={:#04x}", m.reg, opcode);

    execute(m, opcode);
}

fn execute(m: &mut Machine, opcode: u8) {
    match opcode {
        0x00 => {}
        0x10 => {
            fetch8(m); // STOP's second byte; double-speed switching is not modeled.
        }
        0x76 => {
            if !m.ime && m.interrupts.any_pending() {
                m.halt_bug = true;
            } else {
                m.halted = true;
            }
        }
        0x02 => {
            let addr = m.reg.bc();
            m.write_byte(addr, m.reg.a);
        }
        0x12 => {
            let addr = m.reg.de();
            m.write_byte(addr, m.reg.a);
        }
        0x0A => {
            let addr = m.reg.bc();
            m.reg.a = m.read_byte(addr);
        }
        0x1A => {
            let addr = m.reg.de();
            m.reg.a = m.read_byte(addr);
        }
        0x22 => {
            let addr = m.reg.hl();
            m.write_byte(addr, m.reg.a);
            m.reg.set_hl(addr.wrapping_add(1));
        }
        0x2A => {
            let addr = m.reg.hl();
            m.reg.a = m.read_byte(addr);
            m.reg.set_hl(addr.wrapping_add(1));
        }
        0x32 => {
            let addr = m.reg.hl();
            m.write_byte(addr, m.reg.a);
            m.reg.set_hl(addr.wrapping_sub(1));
        }
        0x3A => {
            let addr = m.reg.hl();
            m.reg.a = m.read_byte(addr);
            m.reg.set_hl(addr.wrapping_sub(1));
        }
        0x08 => {
            let addr = fetch16(m);
            let sp = m.reg.sp;
            m.write_byte(addr, sp as u8);
            m.write_byte(addr.wrapping_add(1), (sp >> 8) as u8);
        }
        0x07 => {
            let v = m.reg.a;
            m.reg.a = a::rlc(&mut m.reg, v, true);
        }
        0x0F => {
            let v = m.reg.a;
            m.reg.a = a::rrc(&mut m.reg, v, true);
        }
        0x17 => {
            let v = m.reg.a;
            m.reg.a = a::rl(&mut m.reg, v, true);
        }
        0x1F => {
            let v = m.reg.a;
            m.reg.a = a::rr(&mut m.reg, v, true);
        }
        0x27 => a::daa(&mut m.reg),
        0x2F => {
            m.reg.a = !m.reg.a;
            m.reg.set_n(true);
            m.reg.set_h(true);
        }
        0x37 => {
            m.reg.set_n(false);
            m.reg.set_h(false);
            m.reg.set_cf(true);
        }
        0x3F => {
            m.reg.set_n(false);
            m.reg.set_h(false);
            let c = m.reg.cf();
            m.reg.set_cf(!c);
        }
        0x18 => {
            let off = fetch8(m) as i8;
            jr(m, off);
        }
        0x20 | 0x28 | 0x30 | 0x38 => {
            let cc = (opcode >> 3) & 0x03;
            let off = fetch8(m) as i8;
            if check_cc(m, cc) {
                jr(m, off);
            }
        }
        0xC3 => {
            let addr = fetch16(m);
            m.reg.pc = addr;
            m.tick();
        }
        0xE9 => {
            m.reg.pc = m.reg.hl();
        }
        0xC2 | 0xCA | 0xD2 | 0xDA => {
            let cc = (opcode >> 3) & 0x03;
            let addr = fetch16(m);
            if check_cc(m, cc) {
                m.reg.pc = addr;
                m.tick();
            }
        }
        0xCD => {
            let addr = fetch16(m);
            do_call(m, addr);
        }
        0xC4 | 0xCC | 0xD4 | 0xDC => {
            let cc = (opcode >> 3) & 0x03;
            let addr = fetch16(m);
            if check_cc(m, cc) {
                do_call(m, addr);
            }
        }
        0xC9 => do_ret(m),
        0xD9 => {
            do_ret(m);
            m.ime = true;
        }
        0xC0 | 0xC8 | 0xD0 | 0xD8 => {
            let cc = (opcode >> 3) & 0x03;
            m.tick();
            if check_cc(m, cc) {
                do_ret(m);
            }
        }
        0xC6 => {
            let v = fetch8(m);
            a::add8(&mut m.reg, v);
        }
        0xCE => {
            let v = fetch8(m);
            a::adc8(&mut m.reg, v);
        }
        0xD6 => {
            let v = fetch8(m);
            a::sub8(&mut m.reg, v);
        }
        0xDE => {
            let v = fetch8(m);
            a::sbc8(&mut m.reg, v);
        }
        0xE6 => {
            let v = fetch8(m);
            a::and8(&mut m.reg, v);
        }
        0xEE => {
            let v = fetch8(m);
            a::xor8(&mut m.reg, v);
        }
        0xF6 => {
            let v = fetch8(m);
            a::or8(&mut m.reg, v);
        }
        0xFE => {
            let v = fetch8(m);
            a::cp8(&mut m.reg, v);
        }
        0xE0 => {
            let off = fetch8(m) as u16;
            m.write_byte(0xFF00 + off, m.reg.a);
        }
        0xF0 => {
            let off = fetch8(m) as u16;
            m.reg.a = m.read_byte(0xFF00 + off);
        }
        0xE2 => {
            let addr = 0xFF00 + m.reg.c as u16;
            m.write_byte(addr, m.reg.a);
        }
        0xF2 => {
            let addr = 0xFF00 + m.reg.c as u16;
            m.reg.a = m.read_byte(addr);
        }
        0xEA => {
            let addr = fetch16(m);
            m.write_byte(addr, m.reg.a);
        }
        0xFA => {
            let addr = fetch16(m);
            m.reg.a = m.read_byte(addr);
        }
        0xE8 => {
            let sp = m.reg.sp;
            let off = fetch8(m) as i8;
            m.reg.sp = a::add_sp_signed(&mut m.reg, sp, off);
            m.tick();
            m.tick();
        }
        0xF8 => {
            let sp = m.reg.sp;
            let off = fetch8(m) as i8;
            let result = a::add_sp_signed(&mut m.reg, sp, off);
            m.reg.set_hl(result);
            m.tick();
        }
        0xF9 => {
            m.reg.sp = m.reg.hl();
            m.tick();
        }
        0xF3 => {
            m.ime = false;
            m.cancel_ei();
        }
        0xFB => m.schedule_ei(),
        0xCB => {
            let cb_op = fetch8(m);
            execute_cb(m, cb_op);
        }
        0xD3 | 0xDB | 0xDD | 0xE3 | 0xE4 | 0xEB | 0xEC | 0xED | 0xF4 | 0xFC | 0xFD => {
            // Undefined opcodes: the fetch above already consumed their only cycle.
        }
        0x40..=0x7F => {
            let dst = (opcode >> 3) & 0x07;
            let src = opcode & 0x07;
            let v = get_r8(m, src);
            set_r8(m, dst, v);
        }
        0x80..=0xBF => {
            let src = opcode & 0x07;
            let v = get_r8(m, src);
            match (opcode >> 3) & 0x07 {
                0 => a::add8(&mut m.reg, v),
                1 => a::adc8(&mut m.reg, v),
                2 => a::sub8(&mut m.reg, v),
                3 => a::sbc8(&mut m.reg, v),
                4 => a::and8(&mut m.reg, v),
                5 => a::xor8(&mut m.reg, v),
                6 => a::or8(&mut m.reg, v),
                7 => a::cp8(&mut m.reg, v),
                _ => unreachable!(),
            }
        }
        _ if opcode & 0xC7 == 0xC7 => {
            let n = (opcode >> 3) & 0x07;
            m.tick();
            push16(m, m.reg.pc);
            m.reg.pc = (n as u16) * 8;
        }
        _ if opcode & 0xCF == 0xC5 => {
            let rr = (opcode >> 4) & 0x03;
            let v = get_r16_stack(m, rr);
            m.tick();
            push16(m, v);
        }
        _ if opcode & 0xCF == 0xC1 => {
            let rr = (opcode >> 4) & 0x03;
            let v = pop16(m);
            set_r16_stack(m, rr, v);
        }
        _ if opcode & 0xCF == 0x01 => {
            let rr = (opcode >> 4) & 0x03;
            let v = fetch16(m);
            set_r16(m, rr, v);
        }
        _ if opcode & 0xCF == 0x03 => {
            let rr = (opcode >> 4) & 0x03;
            let v = get_r16(m, rr).wrapping_add(1);
            set_r16(m, rr, v);
            m.tick();
        }
        _ if opcode & 0xCF == 0x0B => {
            let rr = (opcode >> 4) & 0x03;
            let v = get_r16(m, rr).wrapping_sub(1);
            set_r16(m, rr, v);
            m.tick();
        }
        _ if opcode & 0xCF == 0x09 => {
            let rr = (opcode >> 4) & 0x03;
            let rhs = get_r16(m, rr);
            let hl = m.reg.hl();
            let result = a::add16(&mut m.reg, hl, rhs);
            m.reg.set_hl(result);
            m.tick();
        }
        _ if opcode & 0xC7 == 0x04 => {
            let r = (opcode >> 3) & 0x07;
            let v = get_r8(m, r);
            let result = a::inc8(&mut m.reg, v);
            set_r8(m, r, result);
        }
        _ if opcode & 0xC7 == 0x05 => {
            let r = (opcode >> 3) & 0x07;
            let v = get_r8(m, r);
            let result = a::dec8(&mut m.reg, v);
            set_r8(m, r, result);
        }
        _ if opcode & 0xC7 == 0x06 => {
            let r = (opcode >> 3) & 0x07;
            let v = fetch8(m);
            set_r8(m, r, v);
        }
        _ => {}
    }
}

fn execute_cb(m: &mut Machine, op: u8) {
    let r = op & 0x07;
    let sub = (op >> 3) & 0x07;
    let v = get_r8(m, r);

    match op >> 6 {
        0 => {
            let result = match sub {
                0 => a::rlc(&mut m.reg, v, false),
                1 => a::rrc(&mut m.reg, v, false),
                2 => a::rl(&mut m.reg, v, false),
                3 => a::rr(&mut m.reg, v, false),
                4 => a::sla(&mut m.reg, v),
                5 => a::sra(&mut m.reg, v),
                6 => a::swap(&mut m.reg, v),
                7 => a::srl(&mut m.reg, v),
                _ => unreachable!(),
            };
            set_r8(m, r, result);
        }
        1 => a::bit(&mut m.reg, v, sub),
        2 => {
            let result = a::res(v, sub);
            set_r8(m, r, result);
        }
        3 => {
            let result = a::set(v, sub);
            set_r8(m, r, result);
        }
        _ => unreachable!(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Machine;
    use pretty_assertions::assert_eq;

    fn blank_machine(program: &[u8]) -> Machine {
        let mut rom = vec![0u8; 0x8000];
        rom[0x0100..0x0100 + program.len()].copy_from_slice(program);
        rom[0x0147] = 0x00; // ROM only
        rom[0x0148] = 0x00; // 32KiB
        rom[0x0149] = 0x00;
        let mut checksum: u8 = 0;
        for &byte in &rom[0x134..=0x14C] {
            checksum = checksum.wrapping_sub(byte).wrapping_sub(1);
        }
        rom[0x14D] = checksum;
        let mut machine = Machine::init(rom, None).unwrap();
        machine.ime = true;
        machine
    }

    #[test]
    fn test_basic_arithmetic_and_flags() {
        // LD A,0x0F ; ADD A,0x01 ; HALT
        let mut m = blank_machine(&[0x3E, 0x0F, 0xC6, 0x01, 0x76]);
        step(&mut m);
        step(&mut m);
        assert_eq!(m.reg.a, 0x10);
        assert!(m.reg.h());
        assert!(!m.reg.zf());
    }

    #[test]
    fn test_backward_jr_loop() {
        // LD B,0x03 ; DEC B ; JR NZ,-3 ; HALT
        let mut m = blank_machine(&[0x06, 0x03, 0x05, 0x20, 0xFD, 0x76]);
        for _ in 0..20 {
            if m.reg.pc == 0x0105 {
                break;
            }
            step(&mut m);
        }
        assert_eq!(m.reg.b, 0);
        assert_eq!(m.reg.pc, 0x0105);
    }

    #[test]
    fn test_push_pop_round_trip() {
        // LD BC,0x1234 ; PUSH BC ; POP DE ; HALT
        let mut m = blank_machine(&[0x01, 0x34, 0x12, 0xC5, 0xD1, 0x76]);
        step(&mut m);
        step(&mut m);
        step(&mut m);
        assert_eq!(m.reg.de(), 0x1234);
    }
}
