#![no_main]
use libfuzzer_sys::fuzz_target;
use vcdec::decoder::StreamingDecoder;

fuzz_target!(|data: &[u8]| {
    // Fuzz the decoder with arbitrary bytes.
    // The decoder must never panic — only return errors.
    let mut decoder = StreamingDecoder::new();
    decoder.set_maximum_target_file_size(1 << 20).unwrap();
    decoder.start(&[]).unwrap();
    let mut out = Vec::new();
    if decoder.decode_chunk(data, &mut out).is_ok() {
        let _ = decoder.finish();
    }
    assert!(out.len() <= 1 << 20);

    // Also fuzz with a non-empty dictionary.
    if data.len() >= 2 {
        let split = data.len() / 2;
        let (dict, delta) = data.split_at(split);
        let mut decoder = StreamingDecoder::new();
        decoder.set_maximum_target_file_size(1 << 20).unwrap();
        decoder.start(dict).unwrap();
        let mut out = Vec::new();
        if decoder.decode_chunk(delta, &mut out).is_ok() {
            let _ = decoder.finish();
        }
        assert!(out.len() <= 1 << 20);
    }
});
