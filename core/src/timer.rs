use crate::interrupts::{Interrupt, Interrupts};

/// TAC bits {1,0} select which bit of the internal 16-bit counter drives TIMA.
#[derive(Debug, Copy, Clone)]
enum InputClock {
    Div1024 = 0,
    Div16 = 1,
    Div64 = 2,
    Div256 = 3,
}

impl InputClock {
    fn from_bits(bits: u8) -> Self {
        match bits & 0x3 {
            0 => InputClock::Div1024,
            1 => InputClock::Div16,
            2 => InputClock::Div64,
            _ => InputClock::Div256,
        }
    }

    /// Index of the counter bit this clock selects, per §4.3's {9,3,5,7} table.
    fn selected_bit(self) -> u8 {
        match self {
            InputClock::Div1024 => 9,
            InputClock::Div16 => 3,
            InputClock::Div64 => 5,
            InputClock::Div256 => 7,
        }
    }
}

/// DIV/TIMA/TMA/TAC. TIMA increments on a falling edge of a TAC-selected bit of the
/// internal 16-bit counter (whose upper byte is DIV), with a 4-T-cycle reload delay
/// on overflow.
#[derive(Debug)]
pub struct Timer {
    counter: u16,
    tima: u8,
    tma: u8,
    enabled: bool,
    clock: InputClock,
    /// Set for the 4 T-cycles between TIMA wrapping to 0 and the TMA reload + interrupt.
    reload_pending: Option<u8>,
}

impl Default for Timer {
    fn default() -> Self {
        Timer {
            counter: 0xABCC,
            tima: 0,
            tma: 0,
            enabled: false,
            clock: InputClock::Div1024,
            reload_pending: None,
        }
    }
}

impl Timer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn div(&self) -> u8 {
        (self.counter >> 8) as u8
    }

    pub fn tima(&self) -> u8 {
        if self.reload_pending.is_some() {
            0x00
        } else {
            self.tima
        }
    }

    pub fn tma(&self) -> u8 {
        self.tma
    }

    pub fn tac(&self) -> u8 {
        0xF8 | (self.clock as u8) | if self.enabled { 0x04 } else { 0x00 }
    }

    fn selected_bit_high(&self) -> bool {
        self.enabled && (self.counter & (1 << self.clock.selected_bit())) != 0
    }

    /// Advances the internal counter by 4 T-cycles and resolves any pending TIMA
    /// reload. Called once per `tick()`.
    pub fn tick(&mut self, interrupts: &mut Interrupts) {
        if let Some(remaining) = self.reload_pending {
            let remaining = remaining.saturating_sub(4);
            if remaining == 0 {
                self.tima = self.tma;
                interrupts.request(Interrupt::Timer);
                self.reload_pending = None;
            } else {
                self.reload_pending = Some(remaining);
            }
        }

        let was_high = self.selected_bit_high();
        self.counter = self.counter.wrapping_add(4);
        let is_high = self.selected_bit_high();

        if was_high && !is_high {
            self.increment_tima();
        }
    }

    fn increment_tima(&mut self) {
        let (new_val, overflow) = self.tima.overflowing_add(1);
        if overflow {
            self.tima = 0;
            // 4 T-cycles where TIMA reads 0, then reload from TMA + interrupt.
            self.reload_pending = Some(4);
        } else {
            self.tima = new_val;
        }
    }

    /// Writing DIV zeroes the whole 16-bit counter. If this causes a falling edge on
    /// the selected bit, TIMA still increments.
    pub fn write_div(&mut self) {
        let was_high = self.selected_bit_high();
        self.counter = 0;
        if was_high {
            self.increment_tima();
        }
    }

    /// Writes to TIMA during the reload-delay window are ignored.
    pub fn write_tima(&mut self, value: u8) {
        if self.reload_pending.is_none() {
            self.tima = value;
        }
    }

    pub fn write_tma(&mut self, value: u8) {
        self.tma = value;
        // A write during the reload window immediately affects the value reloaded.
        if self.reload_pending.is_some() {
            self.tima = value;
        }
    }

    /// Disabling the timer while the selected bit is high causes the same
    /// falling-edge increment as a DIV write would.
    pub fn write_tac(&mut self, value: u8) {
        let was_high = self.selected_bit_high();
        self.enabled = value & 0x04 != 0;
        self.clock = InputClock::from_bits(value);
        let is_high = self.selected_bit_high();
        if was_high && !is_high {
            self.increment_tima();
        }
    }

    /// Whether the counter bit feeding the APU frame sequencer (bit 12, single-speed)
    /// is currently high; used by the APU to detect its own falling edge.
    pub fn apu_clock_bit_high(&self) -> bool {
        self.counter & (1 << 12) != 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timer_overflow_reload_sequence() {
        let mut timer = Timer::new();
        let mut interrupts = Interrupts::default();
        timer.write_tma(0xFE);
        timer.write_tima(0xFF);
        timer.write_tac(0x05); // enabled, clock bit 3 (Div16): one TIMA edge per 16 T-cycles.
        timer.counter = 0;

        // 4 ticks = 16 T-cycles: exactly one falling edge on bit 3, overflowing TIMA
        // into the 4-cycle reload window where it reads 0x00.
        for _ in 0..4 {
            timer.tick(&mut interrupts);
        }
        assert_eq!(timer.tima(), 0x00);
        assert!(interrupts.interrupt_flag.bits() & 0x04 == 0);

        // One more tick (4 T-cycles) completes the reload from TMA and requests the interrupt.
        timer.tick(&mut interrupts);
        assert_eq!(timer.tima(), 0xFE);
        assert!(interrupts.interrupt_flag.bits() & 0x04 == 0x04);
    }

    #[test]
    fn test_div_write_resets_counter() {
        let mut timer = Timer::new();
        timer.counter = 0xFF00;
        timer.write_div();
        assert_eq!(timer.div(), 0);
    }
}
