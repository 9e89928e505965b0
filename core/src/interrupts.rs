use bitflags::bitflags;

bitflags! {
    #[derive(Default)]
    pub struct InterruptFlags: u8 {
        const VBLANK = 0b0000_0001;
        const LCD_STAT = 0b0000_0010;
        const TIMER = 0b0000_0100;
        const SERIAL = 0b0000_1000;
        const JOYPAD = 0b0001_0000;
        const UNUSED = 0b1110_0000;
    }
}

/// The five interrupt sources, in their fixed servicing priority order.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Interrupt {
    VBlank = 0x01,
    LcdStat = 0x02,
    Timer = 0x04,
    Serial = 0x08,
    Joypad = 0x10,
}

impl Interrupt {
    pub fn iter() -> impl Iterator<Item = Interrupt> {
        [
            Interrupt::VBlank,
            Interrupt::LcdStat,
            Interrupt::Timer,
            Interrupt::Serial,
            Interrupt::Joypad,
        ]
        .iter()
        .copied()
    }

    pub fn vector(self) -> u16 {
        match self {
            Interrupt::VBlank => 0x40,
            Interrupt::LcdStat => 0x48,
            Interrupt::Timer => 0x50,
            Interrupt::Serial => 0x58,
            Interrupt::Joypad => 0x60,
        }
    }

    pub fn flag(self) -> InterruptFlags {
        InterruptFlags::from_bits_truncate(self as u8)
    }
}

/// IE/IF register pair. Only the low 5 bits of each are meaningful.
#[derive(Debug, Default)]
pub struct Interrupts {
    pub interrupt_enable: InterruptFlags,
    pub interrupt_flag: InterruptFlags,
}

impl Interrupts {
    pub fn request(&mut self, interrupt: Interrupt) {
        self.interrupt_flag.insert(interrupt.flag());
    }

    pub fn request_flags(&mut self, flags: InterruptFlags) {
        self.interrupt_flag.insert(flags);
    }

    /// The next pending, enabled interrupt in priority order, if any.
    pub fn pending(&self) -> Option<Interrupt> {
        Interrupt::iter().find(|i| self.interrupt_flag.contains(i.flag()) && self.interrupt_enable.contains(i.flag()))
    }

    pub fn any_pending(&self) -> bool {
        !(self.interrupt_flag & self.interrupt_enable & InterruptFlags::all()).is_empty()
    }

    pub fn clear(&mut self, interrupt: Interrupt) {
        self.interrupt_flag.remove(interrupt.flag());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interrupt_priority_order() {
        let order: Vec<_> = Interrupt::iter().collect();
        assert_eq!(
            order,
            vec![
                Interrupt::VBlank,
                Interrupt::LcdStat,
                Interrupt::Timer,
                Interrupt::Serial,
                Interrupt::Joypad,
            ]
        );
    }

    #[test]
    fn test_pending_respects_priority() {
        let mut interrupts = Interrupts::default();
        interrupts.interrupt_enable = InterruptFlags::all();
        interrupts.request(Interrupt::Timer);
        interrupts.request(Interrupt::VBlank);

        assert_eq!(interrupts.pending(), Some(Interrupt::VBlank));
    }
}
