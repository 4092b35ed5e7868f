use clap::ValueEnum;
use nom::number::Endianness;

/// Byte order of the raw records. AutoPerf writes in the byte order of the
/// machine that produced the log.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default, ValueEnum)]
pub enum ByteOrder {
    #[default]
    Native,
    Little,
    Big,
}

impl ByteOrder {
    pub fn endianness(self) -> Endianness {
        match self {
            ByteOrder::Native => Endianness::Native,
            ByteOrder::Little => Endianness::Little,
            ByteOrder::Big => Endianness::Big,
        }
    }

    pub fn u64_bytes(self, value: u64) -> [u8; 8] {
        match self {
            ByteOrder::Native => value.to_ne_bytes(),
            ByteOrder::Little => value.to_le_bytes(),
            ByteOrder::Big => value.to_be_bytes(),
        }
    }

    pub fn i64_bytes(self, value: i64) -> [u8; 8] {
        self.u64_bytes(value as u64)
    }

    pub fn u32_bytes(self, value: u32) -> [u8; 4] {
        match self {
            ByteOrder::Native => value.to_ne_bytes(),
            ByteOrder::Little => value.to_le_bytes(),
            ByteOrder::Big => value.to_be_bytes(),
        }
    }

    pub fn f64_bytes(self, value: f64) -> [u8; 8] {
        self.u64_bytes(value.to_bits())
    }
}

/// What to do when a header's magic number is not the module's.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub enum MagicCheck {
    #[default]
    Strict,
    Warn,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub struct Config {
    pub byte_order: ByteOrder,
    pub magic_check: MagicCheck,
}

impl Config {
    pub fn new(byte_order: ByteOrder, magic_check: MagicCheck) -> Self {
        Config {
            byte_order,
            magic_check,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_byte_order() {
        assert_eq!(ByteOrder::Big.u64_bytes(1), [0, 0, 0, 0, 0, 0, 0, 1]);
        assert_eq!(ByteOrder::Little.u32_bytes(1), [1, 0, 0, 0]);
        assert_eq!(ByteOrder::Native.i64_bytes(-1), [0xff; 8]);
        assert_eq!(ByteOrder::Little.f64_bytes(1.0), 1.0f64.to_le_bytes());
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.byte_order, ByteOrder::Native);
        assert_eq!(config.magic_check, MagicCheck::Strict);
    }
}
