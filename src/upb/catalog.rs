//! Manufacturer and product names for UPB devices.
//!
//! A device reports its manufacturer id in registers 0x06-0x07 and its product id in
//! 0x08-0x09, both big endian. The tables below are the published UPB export list; some
//! products are missing from it.

use super::types::UpbRegister;

pub const MANUFACTURERS: &[(u16, &str)] = &[
    (1, "PCS Lighting"),
    (2, "MD Manufacturing"),
    (3, "Web Mountain"),
    (4, "Simply Automated"),
    (5, "Home Automation Inc."),
];

/// `(manufacturer, product, name, kind)`
pub const PRODUCTS: &[(u16, u16, &str, &str)] = &[
    (1, 1, "(WS1) Wall Switch - 1 Channel", "Switch"),
    (1, 2, "(WS1R) Wall switch - Relay", "Switch"),
    (1, 3, "(WMC6) Wall Mount Controller - 6 Button", "Keypad"),
    (1, 4, "(WMC8) Wall Mount Controller - 8 Button", "Keypad"),
    (1, 6, "(OCM2) Output Control Module - 2 Channel", "Module"),
    (1, 7, "(LCM1) Load Control Module 1", "Module"),
    (1, 9, "(LM1) Lamp Module - 1 Channel", "Module"),
    (1, 10, "(LM2) Lamp Module - 2 Channel", "Module"),
    (1, 11, "(ICM2) Input Control Module - 2 Channel", "Input"),
    (1, 13, "(DTC6) Desktop Controller - 6 Button", "Keypad"),
    (1, 14, "(DTC8) Desktop Controller - 8 Button", "Keypad"),
    (1, 15, "(AM1) Appliance Module - 1 Channel", "Module"),
    (1, 24, "(WS1E) Wall Switch - Electronic Low Voltage", "Switch"),
    (1, 25, "(LSM) Load Shedding Module", "Module"),
    (1, 36, "(DCM) Doorbell Control Module", "Input"),
    (1, 37, "(TCM) Telephone Control Module", "Input"),
    (1, 58, "(RM1) Receptacle Module", "Module"),
    (1, 60, "(FMD2) Fixture Module - Dimmer", "Module"),
    (1, 61, "(FMR) Fixture Module - Relay", "Module"),
    (1, 62, "(WS2D) LED Wall Switch", "Switch"),
    (1, 63, "(KPLD6) Keypad Light Dimmer", "Keypad"),
    (1, 65, "(KPC6) Controller - 6 Button", "Keypad"),
    (1, 66, "(KPC8) Controller - 8 Button", "Keypad"),
    (1, 69, "(KPLD8) Keypad Load Dimmer - 8 Button", "Keypad"),
    (1, 70, "(KPLR6) Keypad Load Relay - 6 Button", "Keypad"),
    (1, 71, "(KPLR8) Keypad Load Relay - 8 Button", "Keypad"),
    (1, 72, "(WS1L) Wall Switch - LED", "CFL Dimmer"),
    (1, 73, "(KPC7) Controller - 7 Button", "Keypad"),
    (1, 74, "(KPLR7) Keypad Load Relay - 7 Button", "Keypad"),
    (1, 75, "(KPLD7) Keypad Load Dimmer - 7 Button", "Keypad"),
    (2, 32, "(VHC) Vacuum Handle Controller", "VHC"),
    (2, 33, "(VPM) Vacuum Power Module", "VPM"),
    (2, 35, "(VIM) Vacuum Input Module", "Input"),
    (2, 36, "(DSM) Doorbell Sense Module", "Input"),
    (2, 37, "(TSM) Telephone Sense Module", "Input"),
    (3, 1, "LM01 Lamp Module - Basic", "Switch"),
    (3, 5, "AM01 Appliance Module - Basic", "Switch"),
    (3, 7, "FXR01 Fixture, Relay", "Switch"),
    (3, 8, "OUT01 Switched Receptacle Outlet", "Switch"),
    (3, 29, "SW7 Dimmer switch", "Switch"),
    (3, 30, "SPIM01 Serial Powerline Interface Module", "Switch"),
    (4, 1, "UML Lamp Module", "Module"),
    (4, 5, "UMA Appliance Module", "Module"),
    (4, 7, "UFR Fixture Relay / URD Receptacle", "Module"),
    (4, 9, "UMA Appliance Module - Timer", "Module"),
    (4, 10, "UFD Fixture Dimmer", "Switch or Module"),
    (4, 12, "UML Lamp Module - Timer", "Module"),
    (4, 13, "UFR Fixture / URD Receptacle - Timer", "Module"),
    (4, 14, "UFD Fixture Dimmer - Timer", "Switch or Module"),
    (4, 15, "UCT Tabletop Controller", "Keypad"),
    (4, 20, "USM1 Switch Motorized", "Switch"),
    (4, 22, "US1 / US2 Series Dimming Switch", "Switch"),
    (4, 26, "UCQ / UCQT Quad Output Module", "Module"),
    (4, 27, "US4 Series Quad Dimming Switch", "Switch"),
    (4, 28, "US1-40 Series Dimming Switch", "Switch"),
    (4, 29, "US2-40 Series Dimming Switch", "Switch"),
    (4, 34, "US1-40 Series Dimming Switch - Timer", "Switch"),
    (4, 36, "UCQTX Quad Output Module", "Module"),
    (4, 40, "UMI-32 3-Input / 2-Output Module", "Input"),
    (4, 44, "USM1R", "Switch"),
    (4, 45, "USM2R", "Switch"),
    (4, 62, "US22-40T Series Dimming Switch", "Switch"),
    (4, 201, "Lamp Module (UML-E)", "Module"),
    (4, 205, "Appliance Module (UMA-E)", "Module"),
    (4, 222, "Retail Dimming Switch (RS101)", "Switch"),
    (4, 240, "Retail I/O 32 Module", "Input"),
    (5, 1, "35A00-1 600W Dimming Switch", "Switch"),
    (5, 2, "35A00-2 1000W Dimming Switch", "Switch"),
    (5, 3, "55A00-1 1000W Dimming Switch", "Switch"),
    (5, 4, "55A00-2 1500W Dimming Switch", "Switch"),
    (5, 5, "55A00-3 2400W Dimming Switch", "Switch"),
    (5, 16, "35A00-3 600W Non-Dimming Switch", "Switch"),
    (5, 17, "35A00-4 1000W Non-Dimming Switch", "Switch"),
    (5, 18, "40A00-1 15A Relay Switch", "Switch"),
    (5, 32, "59A00-1 300W Lamp Module", "Module"),
    (5, 48, "60A00-1 15A Appliance Module", "Module"),
    (5, 80, "38A00-1 6-Button Room Controller", "Keypad"),
    (5, 96, "38A00-2 8-Button House Controller", "Keypad"),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Product {
    pub name: &'static str,
    pub kind: &'static str,
}

pub fn manufacturer(id: u16) -> Option<&'static str> {
    MANUFACTURERS
        .iter()
        .find(|(m, _)| *m == id)
        .map(|(_, name)| *name)
}

pub fn product(manufacturer: u16, product: u16) -> Option<Product> {
    PRODUCTS
        .iter()
        .find(|(m, p, _, _)| *m == manufacturer && *p == product)
        .map(|(_, _, name, kind)| Product {
            name: *name,
            kind: *kind,
        })
}

/// Manufacturer and product ids found in a block of register values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceIdentity {
    pub manufacturer_id: u16,
    pub product_id: u16,
}

impl DeviceIdentity {
    /// Pull the ids out of `values`, which start at register `start`. Both 16-bit
    /// registers must be fully covered.
    pub fn from_registers(start: u8, values: &[u8]) -> Option<Self> {
        let read_u16 = |reg: UpbRegister| {
            let offset = reg.address().checked_sub(start)? as usize;
            let hi = *values.get(offset)?;
            let lo = *values.get(offset + 1)?;
            Some(u16::from_be_bytes([hi, lo]))
        };
        Some(Self {
            manufacturer_id: read_u16(UpbRegister::ManufacturerId)?,
            product_id: read_u16(UpbRegister::ProductId)?,
        })
    }

    pub fn manufacturer(&self) -> Option<&'static str> {
        manufacturer(self.manufacturer_id)
    }

    pub fn product(&self) -> Option<Product> {
        product(self.manufacturer_id, self.product_id)
    }
}

impl std::fmt::Display for DeviceIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.manufacturer() {
            Some(m) => write!(f, "{}", m)?,
            None => write!(f, "manufacturer {}", self.manufacturer_id)?,
        }
        match self.product() {
            Some(p) => write!(f, " {} [{}]", p.name, p.kind),
            None => write!(f, " product {}", self.product_id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookups() {
        assert_eq!(manufacturer(4), Some("Simply Automated"));
        assert_eq!(manufacturer(99), None);
        assert_eq!(product(5, 96).map(|p| p.kind), Some("Keypad"));
        assert!(product(1, 5).is_none());
    }

    #[test]
    fn identity_from_register_block() {
        // Registers 0x04..=0x09: options, version, manufacturer, product.
        let values = [0x00, 0x01, 0x00, 0x04, 0x00, 0x1C];
        let id = DeviceIdentity::from_registers(0x04, &values).unwrap();
        assert_eq!(id.manufacturer_id, 4);
        assert_eq!(id.product_id, 28);
        assert_eq!(
            id.to_string(),
            "Simply Automated US1-40 Series Dimming Switch [Switch]"
        );
        assert!(DeviceIdentity::from_registers(0x04, &values[..5]).is_none());
        assert!(DeviceIdentity::from_registers(0x07, &values).is_none());
    }
}
