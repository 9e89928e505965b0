//! External, `Machine`-level tests, as opposed to the unit tests embedded in each
//! subsystem module: these exercise behaviour that only emerges from several
//! subsystems interacting through the shared bus.

use gb_core::Machine;

fn rom_with_program(program: &[u8]) -> Vec<u8> {
    let mut rom = vec![0u8; 0x8000];
    rom[0x0100..0x0100 + program.len()].copy_from_slice(program);
    rom[0x0147] = 0x00;
    rom[0x0148] = 0x00;
    rom[0x0149] = 0x00;
    let mut checksum: u8 = 0;
    for &byte in &rom[0x134..=0x14C] {
        checksum = checksum.wrapping_sub(byte).wrapping_sub(1);
    }
    rom[0x14D] = checksum;
    rom
}

#[test]
fn boots_and_runs_a_frame_without_panicking() {
    // An infinite JR loop is enough to drive the PPU/timer/APU through a full frame.
    let rom = rom_with_program(&[0x18, 0xFE]);
    let mut machine = Machine::init(rom, None).unwrap();
    machine.step_frame([0; 8]);
    assert_eq!(machine.screen_buffer().len(), gb_core::SCREEN_WIDTH * gb_core::SCREEN_HEIGHT);
}

#[test]
fn oam_dma_masks_non_hram_reads_while_active() {
    // LD A,0xC0 ; LDH (0x46),A ; LD A,(0xC000) ; HALT
    // Starts a DMA from 0xC000, then immediately tries to read WRAM: the CPU should
    // see 0xFF until the 160-M-cycle transfer finishes, since only HRAM/IE stay visible.
    let rom = rom_with_program(&[0x3E, 0xC0, 0xE0, 0x46, 0xFA, 0x00, 0xC0, 0x76]);
    let mut machine = Machine::init(rom, None).unwrap();
    machine.write_byte(0xC000, 0x42); // the byte DMA will eventually copy to OAM, also a normal WRAM byte
    machine.ime = true;

    for _ in 0..4 {
        gb_core::cpu::step(&mut machine);
    }

    assert_eq!(machine.reg.a, 0xFF);
}

#[test]
fn disabling_lcd_parks_ly_at_zero() {
    // LDH (0x40),A with A=0 disables the LCD.
    let rom = rom_with_program(&[0xAF, 0xE0, 0x40, 0x76]);
    let mut machine = Machine::init(rom, None).unwrap();
    for _ in 0..3 {
        gb_core::cpu::step(&mut machine);
    }
    assert_eq!(machine.reg.pc, 0x0104);
    assert_eq!(machine.ppu.get_ly(), 0);
}

#[test]
fn powerup_resets_cpu_state_without_reparsing_the_cartridge() {
    let rom = rom_with_program(&[0x3E, 0x07, 0x3C, 0x76]); // LD A,7 ; INC A ; HALT
    let mut machine = Machine::init(rom, None).unwrap();
    machine.step_frame([0; 8]);
    assert_eq!(machine.reg.a, 0x08);

    machine.powerup();
    assert_eq!(machine.reg.pc, 0x0100);
    assert!(!machine.ime);
    assert_eq!(machine.ppu.get_ly(), 0);

    machine.step_frame([0; 8]);
    assert_eq!(machine.reg.a, 0x08);
}

#[test]
fn registered_audio_callback_receives_samples_instead_of_the_drain_buffer() {
    use std::cell::RefCell;
    use std::rc::Rc;

    let rom = rom_with_program(&[0x18, 0xFE]); // infinite JR loop
    let mut machine = Machine::init(rom, None).unwrap();

    let received = Rc::new(RefCell::new(Vec::new()));
    let sink = received.clone();
    machine.set_audio_callback(move |sample| sink.borrow_mut().push(sample));

    machine.step_frame([0; 8]);

    assert!(!received.borrow().is_empty());
    assert!(machine.drain_audio_samples().is_empty());
}
