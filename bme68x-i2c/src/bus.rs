pub mod i2c;

pub use i2c::{BusError, I2cBus, I2cDevice};

/// Bus type enum for the supported communication interfaces
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BusType {
    I2C,
}

impl BusType {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "i2c" => Some(BusType::I2C),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bus_type_is_case_insensitive() {
        assert_eq!(BusType::from_str("I2C"), Some(BusType::I2C));
        assert_eq!(BusType::from_str("i2c"), Some(BusType::I2C));
        assert_eq!(BusType::from_str("serial"), None);
    }
}
