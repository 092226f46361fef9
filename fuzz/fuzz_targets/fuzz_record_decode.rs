#![no_main]
use charger_config::record::{ConfigRecord, RECORD_LEN};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    match ConfigRecord::decode(data) {
        Ok(rec) => {
            // Anything that decodes must re-encode to the same bytes.
            let bytes = rec.encode();
            assert_eq!(&bytes[..], &data[..RECORD_LEN]);
        }
        Err(_e) => {
            let (valid, rec) = ConfigRecord::load_or_default(data);
            assert!(!valid);
            assert_eq!(rec, ConfigRecord::default());
        }
    }
});
