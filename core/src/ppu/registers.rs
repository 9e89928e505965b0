use bitflags::bitflags;

bitflags! {
    pub struct LcdControl: u8 {
        const BG_WINDOW_PRIORITY   = 0b0000_0001;
        const SPRITE_DISPLAY       = 0b0000_0010;
        const SPRITE_SIZE          = 0b0000_0100;
        const BG_TILE_MAP_SELECT   = 0b0000_1000;
        const BG_WINDOW_TILE_SELECT = 0b0001_0000;
        const WINDOW_DISPLAY       = 0b0010_0000;
        const WINDOW_MAP_SELECT    = 0b0100_0000;
        const LCD_DISPLAY          = 0b1000_0000;
    }
}

impl Default for LcdControl {
    fn default() -> Self {
        LcdControl::from_bits_truncate(0x91)
    }
}

bitflags! {
    pub struct StatFlags: u8 {
        const MODE_0 = 0b0000_0001;
        const MODE_1 = 0b0000_0010;
        const COINCIDENCE  = 0b0000_0100;
        const HBLANK_INT   = 0b0000_1000;
        const VBLANK_INT   = 0b0001_0000;
        const OAM_INT      = 0b0010_0000;
        const LYC_INT      = 0b0100_0000;
        const UNUSED       = 0b1000_0000;
    }
}

impl Default for StatFlags {
    fn default() -> Self {
        StatFlags::UNUSED
    }
}

bitflags! {
    pub struct AttributeFlags: u8 {
        const PALETTE_NUMBER = 0b0001_0000;
        const X_FLIP = 0b0010_0000;
        const Y_FLIP = 0b0100_0000;
        const BG_OVER_OBJ = 0b1000_0000;
    }
}

#[derive(Debug, Copy, Clone, Default)]
pub struct Sprite {
    pub y: u8,
    pub x: u8,
    pub tile: u8,
    pub attr: AttributeFlags,
}

impl Default for AttributeFlags {
    fn default() -> Self {
        AttributeFlags::empty()
    }
}
