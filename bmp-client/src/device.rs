use std::fmt::Display;

/// Value of [`JtagDevice::current_ir`] while the IR contents are unknown (all ones, i.e. BYPASS).
pub const IR_UNKNOWN: u64 = u64::MAX;

/// A 32 bit JTAG IDCODE.
///
/// Layout (IEEE 1149.1): version in bits 31..28, part number in 27..12, JEP106 manufacturer in
/// 11..1 and a constant `1` in bit 0.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct IdCode(pub u32);

impl IdCode {
    pub fn version(&self) -> u8 {
        (self.0 >> 28) as u8
    }

    pub fn part_number(&self) -> u16 {
        (self.0 >> 12) as u16
    }

    /// The raw 11 bit manufacturer field.
    pub fn manufacturer_id(&self) -> u16 {
        ((self.0 >> 1) & 0x7FF) as u16
    }

    /// The manufacturer field split into JEP106 bank (continuation count, modulo 16) and identity.
    pub fn manufacturer(&self) -> jep106::JEP106Code {
        let field = self.manufacturer_id();
        jep106::JEP106Code::new((field >> 7) as u8, (field & 0x7F) as u8)
    }

    pub fn manufacturer_name(&self) -> Option<&'static str> {
        self.manufacturer().get()
    }

    /// Whether bit 0 is set, as every IDCODE register requires. A clear bit means the TAP shifted
    /// out a BYPASS register or the chain is not connected properly.
    pub fn has_marker_bit(&self) -> bool {
        self.0 & 1 == 1
    }
}

impl Display for IdCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:08X}", self.0)
    }
}

/// A TAP found on the scan chain.
///
/// Devices are created by the IDCODE scan and completed by the IR-length scan. A device whose
/// IR geometry has not been resolved yet reports an `ir_len` of 0.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct JtagDevice {
    idcode: IdCode,
    ir_len: usize,
    ir_prescan: usize,
    current_ir: u64,
}

impl JtagDevice {
    pub fn new(idcode: u32) -> JtagDevice {
        JtagDevice {
            idcode: IdCode(idcode),
            ir_len: 0,
            ir_prescan: 0,
            current_ir: IR_UNKNOWN,
        }
    }

    pub fn idcode(&self) -> IdCode {
        self.idcode
    }

    /// Width of the instruction register in bits
    pub fn ir_len(&self) -> usize {
        self.ir_len
    }

    /// Bit offset of this device's IR within the whole chain's IR
    pub fn ir_prescan(&self) -> usize {
        self.ir_prescan
    }

    /// Last known IR contents, [`IR_UNKNOWN`] if not known
    pub fn current_ir(&self) -> u64 {
        self.current_ir
    }

    pub(crate) fn resolve_ir(&mut self, ir_len: usize, ir_prescan: usize) {
        self.ir_len = ir_len;
        self.ir_prescan = ir_prescan;
        self.current_ir = IR_UNKNOWN;
    }
}

impl Display for JtagDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "<JTAGDevice id = {} ir = {}>", self.idcode, self.ir_len)
    }
}
