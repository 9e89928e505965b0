use bitflags::bitflags;

use crate::interrupts::{Interrupt, Interrupts};

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum InputKey {
    Right,
    Left,
    Up,
    Down,
    A,
    B,
    Select,
    Start,
}

bitflags! {
    #[derive(Default)]
    struct Buttons: u8 {
        const RIGHT_A  = 0b0000_0001;
        const LEFT_B   = 0b0000_0010;
        const UP_SELECT = 0b0000_0100;
        const DOWN_START = 0b0000_1000;
    }
}

bitflags! {
    #[derive(Default)]
    struct Select: u8 {
        const DIRECTIONS = 0b0001_0000;
        const ACTIONS    = 0b0010_0000;
    }
}

/// P1/JOYP (0xFF00). The host supplies raw key state; the joypad folds it into the
/// register according to the CPU-selected row and raises an interrupt on any
/// high->low transition of the visible nibble.
#[derive(Debug)]
pub struct Joypad {
    directions: Buttons,
    actions: Buttons,
    select: Select,
    last_nibble: u8,
}

impl Default for Joypad {
    fn default() -> Self {
        Joypad {
            directions: Buttons::all(),
            actions: Buttons::all(),
            select: Select::empty(),
            last_nibble: 0x0F,
        }
    }
}

impl Joypad {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn press(&mut self, key: InputKey) {
        match key {
            InputKey::Right => self.directions.remove(Buttons::RIGHT_A),
            InputKey::Left => self.directions.remove(Buttons::LEFT_B),
            InputKey::Up => self.directions.remove(Buttons::UP_SELECT),
            InputKey::Down => self.directions.remove(Buttons::DOWN_START),
            InputKey::A => self.actions.remove(Buttons::RIGHT_A),
            InputKey::B => self.actions.remove(Buttons::LEFT_B),
            InputKey::Select => self.actions.remove(Buttons::UP_SELECT),
            InputKey::Start => self.actions.remove(Buttons::DOWN_START),
        }
        self.clear_opposing_pairs();
    }

    pub fn release(&mut self, key: InputKey) {
        match key {
            InputKey::Right => self.directions.insert(Buttons::RIGHT_A),
            InputKey::Left => self.directions.insert(Buttons::LEFT_B),
            InputKey::Up => self.directions.insert(Buttons::UP_SELECT),
            InputKey::Down => self.directions.insert(Buttons::DOWN_START),
            InputKey::A => self.actions.insert(Buttons::RIGHT_A),
            InputKey::B => self.actions.insert(Buttons::LEFT_B),
            InputKey::Select => self.actions.insert(Buttons::UP_SELECT),
            InputKey::Start => self.actions.insert(Buttons::DOWN_START),
        }
    }

    /// Sets the full 8-key state for a frame from the host's input vector, in the
    /// order {Right, Left, Up, Down, A, B, Select, Start} with a nonzero byte meaning
    /// "pressed".
    pub fn set_frame_input(&mut self, keys: [u8; 8]) {
        let order = [
            InputKey::Right,
            InputKey::Left,
            InputKey::Up,
            InputKey::Down,
            InputKey::A,
            InputKey::B,
            InputKey::Select,
            InputKey::Start,
        ];
        for (key, &state) in order.iter().zip(keys.iter()) {
            if state != 0 {
                self.press(*key);
            } else {
                self.release(*key);
            }
        }
    }

    /// Physically impossible opposing pairs are mutually exclusive: pressing one
    /// clears the other.
    fn clear_opposing_pairs(&mut self) {
        if !self.directions.contains(Buttons::RIGHT_A) && !self.directions.contains(Buttons::LEFT_B) {
            self.directions.insert(Buttons::RIGHT_A);
            self.directions.insert(Buttons::LEFT_B);
        }
        if !self.directions.contains(Buttons::UP_SELECT) && !self.directions.contains(Buttons::DOWN_START) {
            self.directions.insert(Buttons::UP_SELECT);
            self.directions.insert(Buttons::DOWN_START);
        }
    }

    pub fn read_register(&self) -> u8 {
        0xC0 | self.select.bits() | self.selected_nibble()
    }

    pub fn write_register(&mut self, value: u8) {
        self.select = Select::from_bits_truncate(value & 0x30);
    }

    fn selected_nibble(&self) -> u8 {
        let mut nibble = 0x0F;
        if self.select.contains(Select::DIRECTIONS) {
            nibble &= self.directions.bits();
        }
        if self.select.contains(Select::ACTIONS) {
            nibble &= self.actions.bits();
        }
        if !self.select.contains(Select::DIRECTIONS) && !self.select.contains(Select::ACTIONS) {
            nibble = 0x0F;
        }
        nibble
    }

    /// Recomputes the visible nibble and requests the joypad interrupt on any
    /// high->low transition. Called once per `tick()`.
    pub fn tick(&mut self, interrupts: &mut Interrupts) {
        let nibble = self.selected_nibble();
        // A bit going from 1 (released) to 0 (pressed) is a falling edge.
        let fell = self.last_nibble & !nibble;
        if fell != 0 {
            interrupts.request(Interrupt::Joypad);
        }
        self.last_nibble = nibble;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_opposing_pair_cleared() {
        let mut pad = Joypad::new();
        pad.press(InputKey::Left);
        pad.press(InputKey::Right);
        // Both pressed simultaneously is impossible; both should read released.
        pad.write_register(0x10);
        assert_eq!(pad.read_register() & 0x03, 0x03);
    }

    #[test]
    fn test_edge_triggered_interrupt() {
        let mut pad = Joypad::new();
        let mut interrupts = Interrupts::default();
        pad.write_register(0x10); // select directions
        pad.tick(&mut interrupts);
        assert!(!interrupts.any_pending());

        pad.press(InputKey::Up);
        pad.tick(&mut interrupts);
        assert!(interrupts.interrupt_flag.bits() & 0x10 == 0x10);
    }
}
