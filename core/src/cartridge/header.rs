use crate::error::CoreError;

pub const HEADER_START: usize = 0x0100;
pub const HEADER_END: usize = 0x014F;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum MbcKind {
    None,
    Mbc1,
    Mbc2,
    Mbc3,
    Mbc5,
}

#[derive(Debug, Clone)]
pub struct CartridgeHeader {
    /// Upper-case ASCII, NUL-padded, up to 16 bytes.
    pub title: String,
    pub cartridge_type: u8,
    pub mbc: MbcKind,
    pub has_battery: bool,
    pub has_rtc: bool,
    pub rom_banks: usize,
    pub ram_banks: usize,
    pub header_checksum: u8,
}

impl CartridgeHeader {
    pub fn parse(rom: &[u8]) -> Result<Self, CoreError> {
        if rom.len() < HEADER_END + 1 {
            return Err(CoreError::RomTooSmall {
                declared: HEADER_END + 1,
                actual: rom.len(),
            });
        }

        let cartridge_type = rom[0x147];
        let (mbc, has_battery, has_rtc) = decode_cartridge_type(cartridge_type)?;
        let rom_banks = decode_rom_banks(rom[0x148]);
        let ram_banks = decode_ram_banks(rom[0x149]);

        if rom.len() < rom_banks * 0x4000 {
            return Err(CoreError::RomTooSmall {
                declared: rom_banks * 0x4000,
                actual: rom.len(),
            });
        }

        let computed_checksum = compute_header_checksum(rom);
        let declared_checksum = rom[0x14D];
        if computed_checksum != declared_checksum {
            return Err(CoreError::BadHeaderChecksum {
                expected: declared_checksum,
                actual: computed_checksum,
            });
        }

        Ok(CartridgeHeader {
            title: read_title(rom),
            cartridge_type,
            mbc,
            has_battery,
            has_rtc,
            rom_banks,
            ram_banks,
            header_checksum: declared_checksum,
        })
    }
}

fn read_title(rom: &[u8]) -> String {
    String::from_utf8_lossy(&rom[0x134..=0x143])
        .trim_matches(char::from(0))
        .trim()
        .to_owned()
}

fn decode_cartridge_type(byte: u8) -> Result<(MbcKind, bool, bool), CoreError> {
    use MbcKind::*;
    let (mbc, battery, rtc) = match byte {
        0x00 => (None, false, false),
        0x01 | 0x02 => (Mbc1, false, false),
        0x03 => (Mbc1, true, false),
        0x05 => (Mbc2, false, false),
        0x06 => (Mbc2, true, false),
        0x0F => (Mbc3, true, true),
        0x10 => (Mbc3, true, true),
        0x11 | 0x12 => (Mbc3, false, false),
        0x13 => (Mbc3, true, false),
        0x19 | 0x1A | 0x1C | 0x1D => (Mbc5, false, false),
        0x1B | 0x1E => (Mbc5, true, false),
        _ => return Err(CoreError::UnsupportedCartridgeType(byte)),
    };
    Ok((mbc, battery, rtc))
}

fn decode_rom_banks(code: u8) -> usize {
    // 32 KiB << code, in 16 KiB banks: 2 << code.
    2usize << code
}

fn decode_ram_banks(code: u8) -> usize {
    match code {
        0x00 => 0,
        0x01 => 1, // 2 KiB, treated as a single partial bank
        0x02 => 1,
        0x03 => 4,
        0x04 => 16,
        0x05 => 8,
        _ => 0,
    }
}

fn compute_header_checksum(rom: &[u8]) -> u8 {
    let mut checksum: u8 = 0;
    for &byte in &rom[0x134..=0x14C] {
        checksum = checksum.wrapping_sub(byte).wrapping_sub(1);
    }
    checksum
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rom_with_title(title: &[u8]) -> Vec<u8> {
        let mut rom = vec![0u8; 0x8000];
        rom[0x134..0x134 + title.len()].copy_from_slice(title);
        rom[0x147] = 0x00;
        rom[0x148] = 0x00;
        rom[0x149] = 0x00;
        rom[0x14D] = compute_header_checksum(&rom);
        rom
    }

    #[test]
    fn test_read_title() {
        let rom = rom_with_title(b"HELLO WORLD\0\0\0\0\0");
        let header = CartridgeHeader::parse(&rom).unwrap();
        assert_eq!(header.title, "HELLO WORLD");
    }

    #[test]
    fn test_rejects_truncated_rom() {
        let rom = vec![0u8; 0x100];
        assert!(CartridgeHeader::parse(&rom).is_err());
    }

    #[test]
    fn test_mbc3_has_battery_and_rtc() {
        let mut rom = rom_with_title(b"RTC GAME");
        rom[0x147] = 0x10;
        rom[0x14D] = compute_header_checksum(&rom);
        let header = CartridgeHeader::parse(&rom).unwrap();
        assert_eq!(header.mbc, MbcKind::Mbc3);
        assert!(header.has_battery && header.has_rtc);
    }
}
