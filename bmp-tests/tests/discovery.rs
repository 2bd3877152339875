use bmp_client::{ChainError, Probe, ProbeError};
use bmp_protocol::{Packet, ProtocolVersion};
use bmp_tests::{SimulatedProbe, SimulatedTap};

fn probe(taps: Vec<SimulatedTap>) -> Probe<SimulatedProbe> {
    Probe::new(SimulatedProbe::new(taps))
}

fn count(probe: &Probe<SimulatedProbe>, packet: &Packet) -> usize {
    probe
        .transport()
        .requests()
        .iter()
        .filter(|request| *request == packet)
        .count()
}

#[test]
fn connect_reports_versions() {
    let mut probe = Probe::new(
        SimulatedProbe::new(Vec::new()).with_firmware("Black Magic Probe v1.10.2"),
    );
    let info = probe.connect().unwrap();
    assert_eq!(info.firmware_version, "Black Magic Probe v1.10.2");
    assert_eq!(info.protocol_version, ProtocolVersion::V3);
    assert!(probe.is_connected());
    assert_eq!(
        probe.to_string(),
        "<BMP FW: Black Magic Probe v1.10.2 PROTO: v3>"
    );
}

#[test]
fn legacy_firmware_is_protocol_v0() {
    let mut probe = Probe::new(SimulatedProbe::new(Vec::new()).with_protocol_version(None));
    let info = probe.connect().unwrap();
    assert_eq!(info.protocol_version, ProtocolVersion::V0);
}

#[test]
fn empty_chain() {
    let mut probe = probe(Vec::new());
    assert!(probe.jtag_scan().unwrap().is_empty());
    assert!(probe.jtag_initialized());
}

#[test]
fn single_device() {
    let mut probe = probe(vec![SimulatedTap::new(0x12345678, 4)]);
    let devices = probe.jtag_scan().unwrap();
    assert_eq!(devices.len(), 1);
    assert_eq!(devices[0].idcode().0, 0x12345678);
    assert_eq!(devices[0].ir_len(), 4);
    assert_eq!(devices[0].ir_prescan(), 0);
    assert_eq!(
        devices[0].to_string(),
        "<JTAGDevice id = 12345678 ir = 4>"
    );
}

#[test]
fn devices_keep_scan_order() {
    let mut probe = probe(vec![
        SimulatedTap::new(0x4BA00477, 4),
        SimulatedTap::new(0x06431041, 5),
        SimulatedTap::new(0x0BA00477, 8),
    ]);
    let devices = probe.jtag_scan().unwrap();
    let found: Vec<_> = devices
        .iter()
        .map(|device| (device.idcode().0, device.ir_len(), device.ir_prescan()))
        .collect();
    assert_eq!(
        found,
        [(0x4BA00477, 4, 0), (0x06431041, 5, 4), (0x0BA00477, 8, 9)]
    );
    assert_eq!(
        devices[0].idcode().manufacturer_name(),
        Some("ARM Ltd")
    );
}

#[test]
fn scan_initializes_once() {
    let mut probe = probe(vec![SimulatedTap::new(0x12345678, 4)]);
    probe.jtag_init().unwrap();
    probe.jtag_scan().unwrap();
    probe.jtag_scan().unwrap();
    assert_eq!(count(&probe, &Packet::JtagInit), 1);
    assert_eq!(count(&probe, &Packet::JtagReset), 2);
    assert_eq!(probe.devices().len(), 1);
}

#[test]
fn trailing_one_bit_ir_fails_scan() {
    let mut probe = probe(vec![
        SimulatedTap::new(0x4BA00477, 4),
        SimulatedTap::new(0x12345678, 1),
    ]);
    let err = probe.jtag_scan().unwrap_err();
    assert!(matches!(
        err,
        ProbeError::Chain(ChainError::IrCountMismatch {
            devices: 2,
            resolved: 1
        })
    ));
    assert!(probe.devices().is_empty());
}

#[test]
fn lost_probe_clears_previous_devices() {
    // init plus one scan of a single device take 14 requests, the second scan then loses the
    // probe while reading the first IDCODE
    let mut probe = Probe::new(
        SimulatedProbe::new(vec![SimulatedTap::new(0x12345678, 4)]).answer_limit(16),
    );
    assert_eq!(probe.jtag_scan().unwrap().len(), 1);
    let err = probe.jtag_scan().unwrap_err();
    assert!(matches!(err, ProbeError::Chain(ChainError::ReadFailure(_))));
    assert!(probe.devices().is_empty());
}

#[test]
fn close_forgets_devices() {
    let mut probe = probe(vec![SimulatedTap::new(0x12345678, 4)]);
    probe.connect().unwrap();
    assert_eq!(probe.jtag_scan().unwrap().len(), 1);
    probe.close();
    assert!(!probe.is_connected());
    assert!(!probe.jtag_initialized());
    assert!(probe.devices().is_empty());
}

#[test]
fn short_write_is_transport_error() {
    let mut probe = Probe::new(SimulatedProbe::new(Vec::new()).write_limit(2));
    let err = probe.connect().unwrap_err();
    assert!(matches!(
        err,
        ProbeError::ShortWrite {
            written: 2,
            expected: 6
        }
    ));
    assert!(err.is_transport());
    assert!(!probe.is_connected());
    assert!(probe.transport().requests().is_empty());
}

#[test]
fn jtag_requires_init() {
    let mut probe = probe(Vec::new());
    assert!(matches!(
        probe.jtag_tms(1, 0),
        Err(ProbeError::NotInitialized)
    ));
    assert!(probe.transport().requests().is_empty());
}
