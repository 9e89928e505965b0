use crate::apu::Apu;
use crate::cartridge::{Cartridge, CartridgeHeader};
use crate::interrupts::{InterruptFlags, Interrupts};
use crate::joypad::Joypad;
use crate::ppu::Ppu;
use crate::registers::Registers;
use crate::timer::Timer;
use crate::CoreError;

struct OamDma {
    active: bool,
    source_base: u16,
    index: u16,
}

impl Default for OamDma {
    fn default() -> Self {
        OamDma { active: false, source_base: 0, index: 0 }
    }
}

/// The whole console: a flat struct owning every subsystem directly, with `tick()` as
/// the single heartbeat driving all of them in lockstep. Replaces the teacher's
/// `BinaryHeap`-scheduled `Scheduler`/`EventType` design (which modeled hardware as
/// independently-scheduled future events) with a direct call graph: every subsystem
/// advances by exactly one M-cycle each time `tick()` runs, and nothing here reaches
/// back into its owner.
pub struct Machine {
    pub reg: Registers,
    pub ime: bool,
    ei_delay: bool,
    pub halted: bool,
    pub halt_bug: bool,

    pub cartridge: Cartridge,
    pub timer: Timer,
    pub joypad: Joypad,
    pub interrupts: Interrupts,
    pub ppu: Ppu,
    pub apu: Apu,

    wram: [u8; 0x2000],
    hram: [u8; 0x7F],
    sb: u8,
    sc: u8,

    oam_dma: OamDma,
    prev_apu_clock_bit: bool,
    audio_callback: Option<Box<dyn FnMut(u8)>>,
}

impl Machine {
    /// Parses the header and builds the bank controller, then calls [`Machine::powerup`]
    /// to reach the same register/IO state the hardware would after running its internal
    /// boot sequence (the sequence itself is not modeled; see the design notes on the
    /// boot-ROM open question). The host may call `powerup` again later to restart the
    /// same cartridge without re-parsing it.
    pub fn init(rom: Vec<u8>, saved_ram: Option<Vec<u8>>) -> Result<Self, CoreError> {
        let header = CartridgeHeader::parse(&rom)?;
        let cartridge = Cartridge::new(rom, header, saved_ram);

        let mut machine = Machine {
            reg: Registers::post_boot(),
            ime: false,
            ei_delay: false,
            halted: false,
            halt_bug: false,
            cartridge,
            timer: Timer::default(),
            joypad: Joypad::default(),
            interrupts: Interrupts::default(),
            ppu: Ppu::new(),
            apu: Apu::new(),
            wram: [0; 0x2000],
            hram: [0; 0x7F],
            sb: 0,
            sc: 0,
            oam_dma: OamDma::default(),
            prev_apu_clock_bit: false,
            audio_callback: None,
        };
        machine.powerup();
        Ok(machine)
    }

    /// Resets CPU, timer, PPU and APU state to post-boot values, leaving the loaded
    /// cartridge (and any registered audio callback) untouched.
    pub fn powerup(&mut self) {
        self.reg = Registers::post_boot();
        self.ime = false;
        self.ei_delay = false;
        self.halted = false;
        self.halt_bug = false;
        self.timer = Timer::default();
        self.joypad = Joypad::default();
        self.interrupts = Interrupts::default();
        self.interrupts.interrupt_enable = InterruptFlags::empty();
        self.interrupts.interrupt_flag = InterruptFlags::from_bits_truncate(0xE1);
        self.ppu = Ppu::new();
        self.apu = Apu::new();
        self.wram = [0; 0x2000];
        self.hram = [0; 0x7F];
        self.sb = 0;
        self.sc = 0;
        self.oam_dma = OamDma::default();
        self.prev_apu_clock_bit = false;
    }

    pub fn battery_ram(&self) -> Option<&[u8]> {
        self.cartridge.battery_ram()
    }

    /// Registers the upward audio callback. Samples are forwarded to it as they're
    /// emitted rather than buffered, so the callback must not call back into the
    /// `Machine` it was registered on.
    pub fn set_audio_callback(&mut self, callback: impl FnMut(u8) + 'static) {
        self.audio_callback = Some(Box::new(callback));
    }

    /// Renders one whole frame, feeding `inputs` (one byte per `InputKey`, nonzero =
    /// pressed) to the joypad before the frame's first CPU step. Runs until the PPU's
    /// `LY` wraps from 153 back to 0, i.e. a full 160x144 frame is ready in
    /// `screen_buffer()`, and always returns `true` since a frame is synchronous and
    /// unconditional here.
    pub fn step_frame(&mut self, inputs: [u8; 8]) -> bool {
        self.joypad.set_frame_input(inputs);
        self.ppu.frame_complete = false;
        while !self.ppu.frame_complete {
            crate::cpu::step(self);
        }
        true
    }

    pub fn screen_buffer(&self) -> &[u8] {
        &self.ppu.frame_buffer
    }

    /// Samples not claimed by a registered audio callback accumulate here; drains and
    /// returns them.
    pub fn drain_audio_samples(&mut self) -> Vec<u8> {
        self.apu.drain_samples()
    }

    /// The heartbeat: advances every subsystem by one M-cycle (4 T-cycles), in the
    /// fixed order OAM-DMA, input, timer, PPU, APU frame-sequencer check, APU channels.
    /// Called once per CPU-visible bus access and once per CPU-internal cycle; never
    /// called from anywhere else, so the whole machine's timing falls directly out of
    /// how many times the CPU calls into the bus.
    pub fn tick(&mut self) {
        self.step_oam_dma();
        self.joypad.tick(&mut self.interrupts);
        self.timer.tick(&mut self.interrupts);
        self.ppu.tick(&mut self.interrupts);

        let apu_bit = self.timer.apu_clock_bit_high();
        let fs_clock = self.prev_apu_clock_bit && !apu_bit;
        self.prev_apu_clock_bit = apu_bit;
        self.apu.tick(fs_clock);

        if let Some(callback) = &mut self.audio_callback {
            for sample in self.apu.drain_samples() {
                callback(sample);
            }
        }

        if self.ei_delay {
            self.ime = true;
            self.ei_delay = false;
        }
    }

    pub fn schedule_ei(&mut self) {
        self.ei_delay = true;
    }

    pub fn cancel_ei(&mut self) {
        self.ei_delay = false;
    }

    fn step_oam_dma(&mut self) {
        if !self.oam_dma.active {
            return;
        }
        let source = self.oam_dma.source_base + self.oam_dma.index;
        let byte = self.read_byte_unmasked(source);
        self.ppu.write_oam_raw(self.oam_dma.index as usize, byte);
        self.oam_dma.index += 1;
        if self.oam_dma.index >= 0xA0 {
            self.oam_dma.active = false;
        }
    }

    fn dma_blocks(&self, address: u16) -> bool {
        self.oam_dma.active && address != 0xFFFF && !(0xFF80..=0xFFFE).contains(&address)
    }

    /// A bus read that costs one M-cycle, as observed by the CPU.
    pub fn read_byte(&mut self, address: u16) -> u8 {
        let value = self.read_byte_pure(address);
        self.tick();
        value
    }

    /// A bus write that costs one M-cycle, as observed by the CPU.
    pub fn write_byte(&mut self, address: u16, value: u8) {
        self.write_byte_pure(address, value);
        self.tick();
    }

    fn read_byte_pure(&self, address: u16) -> u8 {
        if self.dma_blocks(address) {
            return 0xFF;
        }
        self.read_byte_unmasked(address)
    }

    fn read_byte_unmasked(&self, address: u16) -> u8 {
        match address {
            0x0000..=0x3FFF => self.cartridge.read_rom_low(address),
            0x4000..=0x7FFF => self.cartridge.read_rom_high(address),
            0x8000..=0x9FFF => {
                if self.ppu.vram_blocked() {
                    0xFF
                } else {
                    self.ppu.read_vram(address)
                }
            }
            0xA000..=0xBFFF => self.cartridge.read_ram(address),
            0xC000..=0xDFFF => self.wram[(address - 0xC000) as usize],
            0xE000..=0xFDFF => self.wram[(address - 0xE000) as usize],
            0xFE00..=0xFE9F => {
                if self.ppu.oam_blocked() {
                    0xFF
                } else {
                    self.ppu.read_oam(address)
                }
            }
            0xFEA0..=0xFEFF => 0xFF,
            0xFF00 => self.joypad.read_register(),
            0xFF01 => self.sb,
            0xFF02 => self.sc | 0x7E,
            0xFF04 => self.timer.div(),
            0xFF05 => self.timer.tima(),
            0xFF06 => self.timer.tma(),
            0xFF07 => self.timer.tac(),
            0xFF0F => self.interrupts.interrupt_flag.bits() | 0xE0,
            0xFF10..=0xFF3F => self.apu.read_register(address),
            0xFF40 => self.ppu.get_lcdc(),
            0xFF41 => self.ppu.get_stat(),
            0xFF42 => self.ppu.get_scy(),
            0xFF43 => self.ppu.get_scx(),
            0xFF44 => self.ppu.get_ly(),
            0xFF45 => self.ppu.get_lyc(),
            0xFF46 => (self.oam_dma.source_base >> 8) as u8,
            0xFF47 => self.ppu.get_bgp(),
            0xFF48 => self.ppu.get_obp0(),
            0xFF49 => self.ppu.get_obp1(),
            0xFF4A => self.ppu.get_wy(),
            0xFF4B => self.ppu.get_wx(),
            0xFF80..=0xFFFE => self.hram[(address - 0xFF80) as usize],
            0xFFFF => self.interrupts.interrupt_enable.bits(),
            _ => 0xFF,
        }
    }

    fn write_byte_pure(&mut self, address: u16, value: u8) {
        if self.dma_blocks(address) {
            return;
        }
        match address {
            0x0000..=0x7FFF => self.cartridge.write_rom(address, value),
            0x8000..=0x9FFF => {
                if !self.ppu.vram_blocked() {
                    self.ppu.write_vram(address, value);
                }
            }
            0xA000..=0xBFFF => self.cartridge.write_ram(address, value),
            0xC000..=0xDFFF => self.wram[(address - 0xC000) as usize] = value,
            0xE000..=0xFDFF => self.wram[(address - 0xE000) as usize] = value,
            0xFE00..=0xFE9F => {
                if !self.ppu.oam_blocked() {
                    self.ppu.write_oam(address, value);
                }
            }
            0xFEA0..=0xFEFF => {}
            0xFF00 => self.joypad.write_register(value),
            0xFF01 => self.sb = value,
            0xFF02 => self.sc = value & 0x81,
            0xFF04 => self.timer.write_div(),
            0xFF05 => self.timer.write_tima(value),
            0xFF06 => self.timer.write_tma(value),
            0xFF07 => self.timer.write_tac(value),
            0xFF0F => self.interrupts.interrupt_flag = InterruptFlags::from_bits_truncate(value),
            0xFF10..=0xFF3F => self.apu.write_register(address, value),
            0xFF40 => self.ppu.set_lcdc(value, &mut self.interrupts),
            0xFF41 => self.ppu.set_stat(value, &mut self.interrupts),
            0xFF42 => self.ppu.set_scy(value),
            0xFF43 => self.ppu.set_scx(value),
            0xFF44 => self.ppu.set_ly(value),
            0xFF45 => self.ppu.set_lyc(value, &mut self.interrupts),
            0xFF46 => {
                self.oam_dma.active = true;
                self.oam_dma.source_base = (value as u16) << 8;
                self.oam_dma.index = 0;
            }
            0xFF47 => self.ppu.set_bgp(value),
            0xFF48 => self.ppu.set_obp0(value),
            0xFF49 => self.ppu.set_obp1(value),
            0xFF4A => self.ppu.set_wy(value),
            0xFF4B => self.ppu.set_wx(value),
            0xFF80..=0xFFFE => self.hram[(address - 0xFF80) as usize] = value,
            0xFFFF => self.interrupts.interrupt_enable = InterruptFlags::from_bits_truncate(value),
            _ => {}
        }
    }
}
