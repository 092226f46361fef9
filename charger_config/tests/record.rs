use charger_config::record::{CHECKSUM_SEED, RECORD_LEN, checksum};
use charger_config::{ConfigRecord, RecordError, RecordStore, Schedule, SlotRecord};
use rstest::rstest;
use tempfile::tempdir;

fn sample() -> ConfigRecord {
    ConfigRecord {
        slots: [
            SlotRecord {
                capacity_mah: 2500,
                schedule: Schedule::Fast,
                loops: 2,
                flags: 0,
            },
            SlotRecord {
                capacity_mah: 800,
                schedule: Schedule::Restore,
                loops: 0,
                flags: 1,
            },
        ],
    }
}

#[test]
fn layout_matches_wire_format() {
    let bytes = sample().encode();
    assert_eq!(bytes.len(), RECORD_LEN);
    // capacity little-endian
    assert_eq!(&bytes[4..6], &2500u16.to_le_bytes());
    assert_eq!(&bytes[6..8], &800u16.to_le_bytes());
    assert_eq!(&bytes[8..10], &[2, 1]);
    assert_eq!(&bytes[10..12], &[2, 0]);
    assert_eq!(&bytes[12..14], &[0, 1]);
    // checksum big-endian over the payload
    let crc = u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
    assert_eq!(crc, checksum(&bytes[4..]));
}

#[test]
fn checksum_folds_bytes_from_seed() {
    assert_eq!(checksum(&[]), CHECKSUM_SEED);
    assert_eq!(checksum(&[1]), (CHECKSUM_SEED << 2) + 1);
    assert_eq!(checksum(&[1, 2]), (((CHECKSUM_SEED << 2) + 1) << 2) + 2);
}

#[test]
fn round_trip_is_valid_and_unchanged() {
    let rec = sample();
    let (valid, back) = ConfigRecord::load_or_default(&rec.encode());
    assert!(valid);
    assert_eq!(back, rec);
}

#[rstest]
#[case(4)]
#[case(7)]
#[case(9)]
#[case(11)]
#[case(13)]
fn corrupting_a_payload_byte_yields_defaults(#[case] at: usize) {
    let mut bytes = sample().encode();
    bytes[at] ^= 0x40;
    let (valid, rec) = ConfigRecord::load_or_default(&bytes);
    assert!(!valid);
    assert_eq!(rec, ConfigRecord::default());
    assert_eq!(rec.slots[0].capacity_mah, 2000);
    assert_eq!(rec.slots[0].schedule, Schedule::Slow);
}

#[test]
fn wrong_length_is_rejected() {
    let bytes = sample().encode();
    match ConfigRecord::decode(&bytes[..10]) {
        Err(RecordError::Length { expected, actual }) => {
            assert_eq!(expected, RECORD_LEN);
            assert_eq!(actual, 10);
        }
        other => panic!("unexpected: {other:?}"),
    }
}

#[test]
fn unknown_schedule_with_valid_checksum_is_rejected() {
    let mut bytes = sample().encode();
    bytes[8] = 7;
    let crc = checksum(&bytes[4..]);
    bytes[..4].copy_from_slice(&crc.to_be_bytes());
    match ConfigRecord::decode(&bytes) {
        Err(RecordError::Schedule { slot: 0, value: 7 }) => {}
        other => panic!("unexpected: {other:?}"),
    }
}

#[test]
fn skip_discharge_forces_zero_loops_on_save() {
    let dir = tempdir().unwrap();
    let store = RecordStore::new(dir.path().join("charger.rec"));
    let mut rec = sample();
    rec.slots[0].set_skip_discharge(true);
    let saved = store.save(&rec).unwrap();
    assert_eq!(saved.slots[0].loops, 0);
    assert!(saved.slots[0].skip_discharge());

    let (valid, loaded) = store.load().unwrap();
    assert!(valid);
    assert_eq!(loaded, saved);
}

#[test]
fn missing_file_loads_defaults() {
    let dir = tempdir().unwrap();
    let store = RecordStore::new(dir.path().join("nope.rec"));
    let (valid, rec) = store.load().unwrap();
    assert!(!valid);
    assert_eq!(rec, ConfigRecord::default());
}
